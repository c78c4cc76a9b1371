//! Passes over an assembled block, making derived fields match what an RPC
//! node reports.
//!
//! They run in a fixed order, later passes rely on the earlier ones:
//! 1. state reverted propagation,
//! 2. system transaction combination (Bor only, opt-in),
//! 3. transaction reordering and ordinal renumbering (opt-in),
//! 4. status and signature normalization,
//! 5. log block index population,
//! 6. schema 2 to 3 upgrade (opt-in).
//!
//! Running them again over their own output changes nothing.

use std::collections::HashMap;

use ethereum_types::{Address, H256, U256};
use firehose_common::{
    derived_system_tx_hash, logs_bloom, POLYGON_FEE_LOG_ADDRESS, POLYGON_FEE_LOG_TOPIC,
    POLYGON_STATE_RECEIVER_ADDRESS, POLYGON_SYSTEM_ADDRESS, POLYGON_VALIDATOR_SET_ADDRESS,
};
use itertools::Itertools as _;

use crate::{
    types::{Block, Call, CallType, Log, TransactionReceipt, TransactionStatus, TransactionTrace},
    Chain, DecoderConfig, NormalizeError,
};

/// Runs every applicable pass over `block`.
pub fn normalize(block: &mut Block, config: &DecoderConfig) -> Result<(), NormalizeError> {
    for trace in &mut block.transaction_traces {
        propagate_state_reverted(trace)?;
    }
    let features = config.normalization;
    if features.combine_system_transactions && config.chain.has_system_transactions() {
        combine_system_transactions(block);
    }
    if features.reorder_and_renumber_ordinals {
        reorder_and_renumber_ordinals(block)?;
    }
    normalize_status_and_signatures(block);
    populate_log_block_indexes(block, config.chain)?;
    if features.upgrade_block_v2_to_v3 && block.ver == 2 {
        upgrade_v2_to_v3(block);
    }
    Ok(())
}

/// A call's state is reverted when it failed or its parent's state is.
///
/// Calls are ordered by index, parents come first.
pub(crate) fn propagate_state_reverted(
    trace: &mut TransactionTrace,
) -> Result<(), NormalizeError> {
    for position in 0..trace.calls.len() {
        let call = &trace.calls[position];
        let parent_reverted = match call.parent_index {
            0 => false,
            parent => {
                parent_of(&trace.calls, parent)
                    .ok_or(NormalizeError::UnknownParent {
                        trace: trace.index as usize,
                        index: call.index,
                        parent,
                    })?
                    .state_reverted
            }
        };
        let call = &mut trace.calls[position];
        call.state_reverted = call.status_failed || parent_reverted;
    }
    Ok(())
}

fn parent_of(calls: &[Call], parent: u32) -> Option<&Call> {
    calls
        .get(parent as usize - 1)
        .filter(|call| call.index == parent)
}

enum SystemKind {
    Normal,
    Mergeable,
    Unmergeable,
}

fn system_kind(trace: &TransactionTrace, merged_hash: &H256) -> SystemKind {
    if trace.from != Some(POLYGON_SYSTEM_ADDRESS) || trace.hash == *merged_hash {
        return SystemKind::Normal;
    }
    match trace.to {
        Some(to) if to == POLYGON_STATE_RECEIVER_ADDRESS => SystemKind::Mergeable,
        Some(to) if to == POLYGON_VALIDATOR_SET_ADDRESS => SystemKind::Unmergeable,
        _ => SystemKind::Normal,
    }
}

fn is_fee_log(chain: Chain, log: &Log) -> bool {
    chain.has_system_transactions()
        && log.address == POLYGON_FEE_LOG_ADDRESS
        && log.topics.first() == Some(&POLYGON_FEE_LOG_TOPIC)
}

/// Bor runs its state syncs as system transactions, which RPC reports as a
/// single transaction with a derived hash. Validator set commits stay
/// separate but come last.
fn combine_system_transactions(block: &mut Block) {
    let merged_hash = derived_system_tx_hash(block.number, &block.hash);
    let mut normal = Vec::new();
    let mut mergeable = Vec::new();
    let mut unmergeable = Vec::new();
    for trace in block.transaction_traces.drain(..) {
        match system_kind(&trace, &merged_hash) {
            SystemKind::Normal => normal.push(trace),
            SystemKind::Mergeable => mergeable.push(trace),
            SystemKind::Unmergeable => unmergeable.push(trace),
        }
    }
    if !mergeable.is_empty() {
        normal.push(merge(mergeable, merged_hash));
    }
    normal.extend(unmergeable);
    for (position, trace) in normal.iter_mut().enumerate() {
        trace.index = position as u32;
    }
    block.transaction_traces = normal;
}

fn merge(traces: Vec<TransactionTrace>, hash: H256) -> TransactionTrace {
    let begin_ordinal = traces.iter().map(|trace| trace.begin_ordinal).min();
    let end_ordinal = traces.iter().map(|trace| trace.end_ordinal).max();
    let mut calls = vec![Call {
        index: 1,
        call_type: CallType::Call,
        caller: Some(POLYGON_SYSTEM_ADDRESS),
        address: Some(POLYGON_STATE_RECEIVER_ADDRESS),
        value: Some(U256::zero()),
        begin_ordinal: begin_ordinal.unwrap_or_default(),
        end_ordinal: end_ordinal.unwrap_or_default(),
        ..Default::default()
    }];
    let mut logs = Vec::new();
    let mut gas_used = 0u64;
    let mut cumulative_gas_used = 0u64;
    for trace in traces {
        gas_used = gas_used.saturating_add(trace.gas_used);
        if let Some(receipt) = &trace.receipt {
            cumulative_gas_used = cumulative_gas_used.max(receipt.cumulative_gas_used);
        }
        let offset = calls.len() as u32;
        let mut trace_logs = Vec::new();
        for mut call in trace.calls {
            call.index += offset;
            call.parent_index = match call.parent_index {
                0 => 1,
                parent => parent + offset,
            };
            call.depth += 1;
            trace_logs.extend(
                call.logs
                    .iter()
                    .filter(|log| !call.state_reverted || is_fee_log(Chain::Polygon, log))
                    .cloned(),
            );
            calls.push(call);
        }
        // pre-merge block indexes
        trace_logs.sort_by_key(|log| log.block_index);
        logs.extend(trace_logs);
    }
    TransactionTrace {
        to: Some(POLYGON_STATE_RECEIVER_ADDRESS),
        from: Some(POLYGON_SYSTEM_ADDRESS),
        gas_price: Some(U256::zero()),
        value: Some(U256::zero()),
        gas_used,
        hash,
        begin_ordinal: begin_ordinal.unwrap_or_default(),
        end_ordinal: end_ordinal.unwrap_or_default(),
        status: TransactionStatus::Succeeded,
        receipt: Some(TransactionReceipt {
            state_root: Vec::new(),
            cumulative_gas_used,
            logs_bloom: logs_bloom(logs.iter().map(|log| (&log.address, &log.topics))),
            logs,
        }),
        calls,
        ..Default::default()
    }
}

/// Lays transactions out by index, each one's ordinals following the previous
/// transaction's end.
fn reorder_and_renumber_ordinals(block: &mut Block) -> Result<(), NormalizeError> {
    let traces = &mut block.transaction_traces;
    traces.sort_by_key(|trace| trace.index);
    let (Some(baseline), Some(original_end)) = (
        traces.iter().map(|trace| trace.begin_ordinal).min(),
        traces.iter().map(|trace| trace.end_ordinal).max(),
    ) else {
        return Ok(());
    };

    let mut next = baseline;
    let mut end = baseline;
    for (position, trace) in traces.iter_mut().enumerate() {
        let delta = i128::from(next) - i128::from(trace.begin_ordinal);
        shift_trace(trace, delta).ok_or(NormalizeError::OrdinalOverflow(position))?;
        end = trace.end_ordinal;
        next = end
            .checked_add(1)
            .ok_or(NormalizeError::OrdinalOverflow(position))?;
    }

    let delta = i128::from(end) - i128::from(original_end);
    let overflow = NormalizeError::OrdinalOverflow(traces.len());
    for change in &mut block.balance_changes {
        if change.ordinal >= baseline {
            shift(&mut change.ordinal, delta).ok_or(overflow.clone())?;
        }
    }
    for change in &mut block.code_changes {
        if change.ordinal >= baseline {
            shift(&mut change.ordinal, delta).ok_or(overflow.clone())?;
        }
    }
    Ok(())
}

fn shift(ordinal: &mut u64, delta: i128) -> Option<()> {
    *ordinal = u64::try_from(i128::from(*ordinal) + delta).ok()?;
    Some(())
}

fn shift_trace(trace: &mut TransactionTrace, delta: i128) -> Option<()> {
    if delta == 0 {
        return Some(());
    }
    shift(&mut trace.begin_ordinal, delta)?;
    shift(&mut trace.end_ordinal, delta)?;
    if let Some(receipt) = &mut trace.receipt {
        for log in &mut receipt.logs {
            shift(&mut log.ordinal, delta)?;
        }
    }
    for call in &mut trace.calls {
        shift(&mut call.begin_ordinal, delta)?;
        shift(&mut call.end_ordinal, delta)?;
        let ordinals = call
            .logs
            .iter_mut()
            .map(|it| &mut it.ordinal)
            .chain(call.account_creations.iter_mut().map(|it| &mut it.ordinal))
            .chain(call.balance_changes.iter_mut().map(|it| &mut it.ordinal))
            .chain(call.nonce_changes.iter_mut().map(|it| &mut it.ordinal))
            .chain(call.storage_changes.iter_mut().map(|it| &mut it.ordinal))
            .chain(call.code_changes.iter_mut().map(|it| &mut it.ordinal))
            .chain(call.gas_changes.iter_mut().map(|it| &mut it.ordinal));
        for ordinal in ordinals {
            shift(ordinal, delta)?;
        }
    }
    Some(())
}

fn normalize_status_and_signatures(block: &mut Block) {
    for trace in &mut block.transaction_traces {
        if let Some(root) = trace.root_call() {
            trace.status = match (root.status_reverted, root.status_failed) {
                (true, _) => TransactionStatus::Reverted,
                (false, true) => TransactionStatus::Failed,
                (false, false) => TransactionStatus::Succeeded,
            };
        }
        pad_signature_point(&mut trace.r);
        pad_signature_point(&mut trace.s);
    }
}

/// Left pads to 32 bytes, unsigned transactions keep an empty point.
fn pad_signature_point(point: &mut Vec<u8>) {
    if !point.is_empty() && point.len() < 32 {
        let mut padded = vec![0; 32 - point.len()];
        padded.append(point);
        *point = padded;
    }
}

/// Numbers call logs the way RPC numbers receipt logs, and checks both
/// agree.
fn populate_log_block_indexes(block: &mut Block, chain: Chain) -> Result<(), NormalizeError> {
    if block.ver < 2 {
        populate_log_block_indexes_v1(block);
        return Ok(());
    }

    let mut receipt_logs = HashMap::new();
    for log in block
        .transaction_traces
        .iter_mut()
        .filter_map(|trace| trace.receipt.as_mut())
        .flat_map(|receipt| receipt.logs.iter_mut())
    {
        log.block_index = receipt_logs.len() as u32;
        receipt_logs.insert(log.block_index, (log.ordinal, log.index));
    }

    let merged_hash = chain
        .has_system_transactions()
        .then(|| derived_system_tx_hash(block.number, &block.hash));
    let mut block_index = 0u32;
    for trace in &mut block.transaction_traces {
        // merged logs keep the order they were combined in
        let receipt_order = match Some(trace.hash) == merged_hash {
            true => trace.receipt.as_ref().map(|receipt| {
                receipt
                    .logs
                    .iter()
                    .enumerate()
                    .map(|(position, log)| (log.ordinal, position))
                    .collect::<HashMap<_, _>>()
            }),
            false => None,
        };
        let mut surviving = Vec::new();
        for call in &mut trace.calls {
            let reverted = call.state_reverted;
            for log in &mut call.logs {
                match reverted && !is_fee_log(chain, log) {
                    true => log.block_index = 0,
                    false => surviving.push(log),
                }
            }
        }
        let surviving = match &receipt_order {
            Some(order) => surviving
                .into_iter()
                .sorted_by_key(|log| {
                    let position = order.get(&log.ordinal).copied();
                    (position.unwrap_or(usize::MAX), log.ordinal)
                })
                .collect_vec(),
            None => surviving
                .into_iter()
                .sorted_by_key(|log| log.ordinal)
                .collect_vec(),
        };
        for log in surviving {
            log.block_index = block_index;
            let receipt = *receipt_logs
                .get(&block_index)
                .ok_or(NormalizeError::MissingReceiptLog { block_index })?;
            if receipt != (log.ordinal, log.index) {
                return Err(NormalizeError::ReceiptMismatch {
                    block_index,
                    call: (log.ordinal, log.index),
                    receipt,
                });
            }
            block_index += 1;
        }
    }
    match block_index as usize == receipt_logs.len() {
        true => Ok(()),
        false => Err(NormalizeError::LogCountMismatch {
            calls: block_index as usize,
            receipts: receipt_logs.len(),
        }),
    }
}

fn populate_log_block_indexes_v1(block: &mut Block) {
    let mut block_index = 0;
    for trace in &mut block.transaction_traces {
        for call in &mut trace.calls {
            for log in &mut call.logs {
                match call.state_reverted {
                    true => log.block_index = 0,
                    false => {
                        log.block_index = block_index;
                        block_index += 1;
                    }
                }
            }
        }
    }
    let receipt_logs = block
        .transaction_traces
        .iter_mut()
        .filter_map(|trace| trace.receipt.as_mut())
        .flat_map(|receipt| receipt.logs.iter_mut());
    for (block_index, log) in receipt_logs.enumerate() {
        log.block_index = block_index as u32;
    }
}

/// Schema 2 reported the code owner as the caller of delegate calls, schema 3
/// reports the storage context the call runs in, i.e. the address of the
/// closest non-delegate ancestor.
fn upgrade_v2_to_v3(block: &mut Block) {
    for trace in &mut block.transaction_traces {
        // storage context of each call, by position
        let mut contexts: Vec<Option<Address>> = Vec::with_capacity(trace.calls.len());
        for call in &mut trace.calls {
            let parent_context = match call.parent_index {
                0 => None,
                parent => contexts.get(parent as usize - 1).copied().flatten(),
            };
            let context = match call.call_type {
                CallType::Delegate => {
                    if parent_context.is_some() {
                        call.caller = parent_context;
                    }
                    parent_context
                }
                _ => call.address,
            };
            contexts.push(context);
        }
    }
    block.ver = 3;
}
