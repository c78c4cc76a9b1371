use assert2::check;
use dmlog_decoder::types::{Block, Call, TransactionTrace};

/// Structural properties every decoded block has, whatever the stream.
pub fn check_consistent(block: &Block) {
    for trace in &block.transaction_traces {
        check_call_tree(trace);
        check_ordinals(trace);
    }
}

/// Indices are 1..=n in order, and walking up from any call reaches the root.
fn check_call_tree(trace: &TransactionTrace) {
    let indices = trace.calls.iter().map(|call| call.index).collect::<Vec<_>>();
    check!(indices == (1..=trace.calls.len() as u32).collect::<Vec<_>>());
    check!(trace.calls.iter().filter(|call| call.parent_index == 0).count() == 1);

    for call in &trace.calls {
        let mut current = call;
        while let Some(parent) = parent_of(trace, current) {
            current = parent;
        }
        check!(current.index == 1, "call #{} never reaches the root", call.index);
        check!(current.parent_index == 0);
    }
}

/// Only parents created before their child count, so walks always end.
fn parent_of<'a>(trace: &'a TransactionTrace, call: &Call) -> Option<&'a Call> {
    let parent = call.parent_index.checked_sub(1)?;
    trace
        .calls
        .get(parent as usize)
        .filter(|parent| parent.index < call.index)
}

/// Calls start in index order, each call's records are ordered and sit within
/// the call, and everything sits within the transaction.
fn check_ordinals(trace: &TransactionTrace) {
    check!(trace.begin_ordinal < trace.end_ordinal);
    let begins = trace.calls.iter().map(|call| call.begin_ordinal).collect::<Vec<_>>();
    check!(begins.windows(2).all(|pair| pair[0] < pair[1]), "{begins:?}");

    for call in &trace.calls {
        check!(trace.begin_ordinal < call.begin_ordinal);
        check!(call.begin_ordinal < call.end_ordinal);
        check!(call.end_ordinal < trace.end_ordinal);
        if let Some(parent) = parent_of(trace, call) {
            check!(parent.begin_ordinal < call.begin_ordinal);
            check!(call.end_ordinal < parent.end_ordinal);
        }

        // the root also holds what happened before and after its frame
        let (lower, upper) = match call.index {
            1 => (trace.begin_ordinal, trace.end_ordinal),
            _ => (call.begin_ordinal, call.end_ordinal),
        };
        for ordinals in record_ordinals(call) {
            check!(ordinals.windows(2).all(|pair| pair[0] < pair[1]), "{ordinals:?}");
            check!(
                ordinals.iter().all(|it| lower < *it && *it < upper),
                "{ordinals:?} outside of call #{} ({lower}, {upper})",
                call.index
            );
        }
    }
}

fn record_ordinals(call: &Call) -> [Vec<u64>; 7] {
    fn of<T>(records: &[T], ordinal: impl Fn(&T) -> u64) -> Vec<u64> {
        records.iter().map(ordinal).collect()
    }
    [
        of(&call.logs, |it| it.ordinal),
        of(&call.account_creations, |it| it.ordinal),
        of(&call.balance_changes, |it| it.ordinal),
        of(&call.nonce_changes, |it| it.ordinal),
        of(&call.storage_changes, |it| it.ordinal),
        of(&call.code_changes, |it| it.ordinal),
        of(&call.gas_changes, |it| it.ordinal),
    ]
}
