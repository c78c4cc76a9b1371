//! Line dispatch and block lifecycle.
//!
//! A [`Decoder`] owns everything in flight: the block being assembled, the
//! transaction being traced and its call stack. Lines are fed one at a time,
//! completed transactions and blocks are reported as [`Event`]s.

use std::{
    mem,
    time::{Duration, Instant},
};

use ethereum_types::{H256, U256};
use log::{debug, info, warn};
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::{
    call_stack::CallStack,
    config::schema_version,
    irreversibility::{proof_of_stake_lib_num, proof_of_work_lib_num},
    normalize::normalize,
    types::{BalanceChange, Block, BlockHeader, CodeChange, DecodedBlock, TransactionTrace},
    wire, DecoderConfig, Error, LineError,
};

/// Every tag of the instrumentation protocol.
///
/// Variants are ordered roughly by how often they show up.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Tag {
    GasChange,
    EvmKeccak,
    StorageChange,
    BalanceChange,
    EvmRunCall,
    EvmParam,
    EvmEndCall,
    AddLog,
    NonceChange,
    AccountWithoutCode,
    EvmCallFailed,
    EvmReverted,
    CreatedAccount,
    CodeChange,
    SuicideChange,
    BeginApplyTrx,
    TrxFrom,
    EndApplyTrx,
    SkippedTrx,
    FailedApplyTrx,
    BeginBlock,
    FinalizeBlock,
    EndBlock,
    Init,
    TrxEnterPool,
    TrxDiscarded,
}

/// What a fed line completed, if anything.
#[derive(Debug)]
pub enum Event {
    /// A transaction trace was appended to the pending ones.
    TransactionCompleted,
    /// A block was assembled and normalized.
    BlockCompleted {
        #[allow(missing_docs)]
        block: DecodedBlock,
        /// From `BEGIN_BLOCK` to the normalized block.
        parse_time: Duration,
    },
}

/// Stateful decoder for one instrumentation stream.
///
/// Not meant to be shared: each stream gets its own decoder.
#[derive(Debug)]
pub struct Decoder {
    pub(crate) config: DecoderConfig,
    /// Learned from `INIT`.
    pub(crate) schema: Option<u32>,
    pub(crate) block: Option<ActiveBlock>,
    pub(crate) trace: Option<TransactionTrace>,
    pub(crate) stack: CallStack,
    /// Completed transaction traces of the current block.
    pub(crate) traces: Vec<TransactionTrace>,
    /// Number of logs emitted so far by the current transaction.
    pub(crate) log_index: u32,
}

#[derive(Debug)]
pub(crate) struct ActiveBlock {
    pub number: u64,
    pub finalizing: bool,
    pub balance_changes: Vec<BalanceChange>,
    pub code_changes: Vec<CodeChange>,
    pub started: Instant,
}

/// The JSON tail of `END_BLOCK`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndBlockData {
    header: BlockHeader,
    #[serde(default)]
    uncles: Vec<BlockHeader>,
    #[serde(default)]
    total_difficulty: Option<U256>,
    #[serde(default, with = "crate::quantity::option")]
    finalized_block_num: Option<u64>,
    #[serde(default)]
    #[allow(dead_code)]
    finalized_block_hash: Option<H256>,
}

impl Decoder {
    /// A decoder waiting for `INIT`.
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            schema: None,
            block: None,
            trace: None,
            stack: CallStack::default(),
            traces: Vec::new(),
            log_index: 0,
        }
    }

    /// Schema version announced by `INIT`, if seen.
    pub fn schema_version(&self) -> Option<u32> {
        self.schema
    }

    /// Handle one line of output of the instrumented node.
    ///
    /// Lines without a `FIRE ` or `DMLOG ` prefix are not instrumentation and
    /// are skipped.
    pub fn feed(&mut self, line: &str) -> Result<Option<Event>, Error> {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        let Some(rest) = line
            .strip_prefix("FIRE ")
            .or_else(|| line.strip_prefix("DMLOG "))
        else {
            return Ok(None);
        };
        let (tag, fields) = rest.split_once(' ').unwrap_or((rest, ""));
        let tag = tag.parse::<Tag>().map_err(|_| Error::UnknownTag {
            tag: tag.to_owned(),
            line: line.to_owned(),
        })?;
        self.dispatch(tag, fields).map_err(|kind| Error::Line {
            tag,
            line: line.to_owned(),
            kind,
        })
    }

    /// Completed transaction traces not yet claimed by a block.
    pub(crate) fn take_transactions(&mut self) -> Vec<TransactionTrace> {
        mem::take(&mut self.traces)
    }

    fn dispatch(&mut self, tag: Tag, rest: &str) -> Result<Option<Event>, LineError> {
        match tag {
            Tag::Init => return self.on_init(rest).map(|()| None),
            // consumed by mempool readers
            Tag::TrxEnterPool | Tag::TrxDiscarded => return Ok(None),
            _ if self.schema.is_none() => return Err(LineError::NotInitialized),
            _ => {}
        }
        match tag {
            Tag::GasChange => self.on_gas_change(rest)?,
            Tag::EvmKeccak => self.on_keccak(rest)?,
            Tag::StorageChange => self.on_storage_change(rest)?,
            Tag::BalanceChange => self.on_balance_change(rest)?,
            Tag::EvmRunCall => self.on_run_call(rest)?,
            Tag::EvmParam => self.on_call_params(rest)?,
            Tag::EvmEndCall => self.on_end_call(rest)?,
            Tag::AddLog => self.on_add_log(rest)?,
            Tag::NonceChange => self.on_nonce_change(rest)?,
            Tag::AccountWithoutCode => self.on_account_without_code(rest)?,
            Tag::EvmCallFailed => self.on_call_failed(rest)?,
            Tag::EvmReverted => self.on_call_reverted(rest)?,
            Tag::CreatedAccount => self.on_created_account(rest)?,
            Tag::CodeChange => self.on_code_change(rest)?,
            Tag::SuicideChange => self.on_suicide(rest)?,
            Tag::BeginApplyTrx => self.on_begin_transaction(rest)?,
            Tag::TrxFrom => self.on_transaction_from(rest)?,
            Tag::EndApplyTrx => return self.on_end_transaction(rest).map(Some),
            Tag::SkippedTrx => self.on_skipped_transaction(rest)?,
            Tag::FailedApplyTrx => self.on_failed_transaction(rest)?,
            Tag::BeginBlock => self.on_begin_block(rest)?,
            Tag::FinalizeBlock => self.on_finalize_block(rest)?,
            Tag::EndBlock => return self.on_end_block(rest).map(Some),
            Tag::Init | Tag::TrxEnterPool | Tag::TrxDiscarded => {}
        }
        Ok(None)
    }

    fn on_init(&mut self, rest: &str) -> Result<(), LineError> {
        let [version, variant, node] = wire::bounded_fields(rest)?;
        let schema = schema_version(version)
            .ok_or_else(|| LineError::UnsupportedProtocolVersion(version.to_owned()))?;
        let node_version = node.split(' ').next().unwrap_or(node);
        info!(
            "reading firehose protocol {version} from {variant} {node_version}, \
             producing schema version {schema} blocks"
        );
        self.schema = Some(schema);
        Ok(())
    }

    fn on_begin_block(&mut self, rest: &str) -> Result<(), LineError> {
        let [number] = wire::fields(rest)?;
        let number = wire::uint("number", number)?;
        if let Some(active) = &self.block {
            return Err(LineError::BlockAlreadyActive(active.number));
        }
        self.block = Some(ActiveBlock {
            number,
            finalizing: false,
            balance_changes: Vec::new(),
            code_changes: Vec::new(),
            started: Instant::now(),
        });
        Ok(())
    }

    fn on_finalize_block(&mut self, rest: &str) -> Result<(), LineError> {
        let [number] = wire::fields(rest)?;
        let number = wire::uint("number", number)?;
        let active = self.active_block_mut(number)?;
        active.finalizing = true;
        Ok(())
    }

    fn on_end_block(&mut self, rest: &str) -> Result<Event, LineError> {
        let [number, size, data] = wire::bounded_fields(rest)?;
        let number = wire::uint("number", number)?;
        let size = wire::uint("size", size)?;
        let active = self.active_block_mut(number)?;
        if !active.finalizing {
            return Err(LineError::NotFinalizing(number));
        }
        if self.trace.is_some() {
            return Err(LineError::DanglingTransaction);
        }
        let EndBlockData {
            mut header,
            uncles,
            total_difficulty,
            finalized_block_num,
            finalized_block_hash: _,
        } = wire::json("data", data)?;
        let ActiveBlock {
            balance_changes,
            code_changes,
            started,
            ..
        } = self.block.take().ok_or(LineError::NoActiveBlock)?;

        if total_difficulty.is_some() {
            header.total_difficulty = total_difficulty;
        }
        let mut block = Block {
            ver: self.schema.ok_or(LineError::NotInitialized)?,
            hash: header.hash,
            number,
            size,
            header,
            uncles,
            transaction_traces: self.take_transactions(),
            balance_changes,
            code_changes,
        };
        let first_streamable = self.config.first_streamable_block;
        let lib_num = match finalized_block_num {
            Some(finalized) => proof_of_stake_lib_num(number, finalized, first_streamable),
            None => proof_of_work_lib_num(number, first_streamable),
        };
        self.reset();
        normalize(&mut block, &self.config)?;
        debug!(
            "block #{number} assembled with {} transactions, LIB #{lib_num}",
            block.transaction_traces.len()
        );
        Ok(Event::BlockCompleted {
            block: DecodedBlock { block, lib_num },
            parse_time: started.elapsed(),
        })
    }

    /// The node could not apply a transaction of a block it was handed (e.g.
    /// signed for another chain), the whole block is abandoned.
    fn on_failed_transaction(&mut self, rest: &str) -> Result<(), LineError> {
        let [message] = wire::bounded_fields(rest)?;
        match &self.block {
            Some(active) => warn!(
                "discarding block #{} after failed transaction: {message}",
                active.number
            ),
            None => warn!("failed transaction outside of a block: {message}"),
        }
        self.reset();
        Ok(())
    }

    fn on_skipped_transaction(&mut self, rest: &str) -> Result<(), LineError> {
        let [reason] = wire::bounded_fields(rest)?;
        debug!("skipping transaction: {reason}");
        self.trace = None;
        self.stack.clear();
        Ok(())
    }

    fn active_block_mut(&mut self, number: u64) -> Result<&mut ActiveBlock, LineError> {
        let active = self.block.as_mut().ok_or(LineError::NoActiveBlock)?;
        match active.number == number {
            true => Ok(active),
            false => Err(LineError::BlockNumberMismatch {
                expected: active.number,
                found: number,
            }),
        }
    }

    fn reset(&mut self) {
        self.block = None;
        self.trace = None;
        self.stack.clear();
        self.traces.clear();
        self.log_index = 0;
    }
}
