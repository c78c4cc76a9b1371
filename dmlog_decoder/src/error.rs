use std::num::ParseIntError;

use crate::assembler::Tag;

/// Any failure of the decoder. None of them are recoverable, the stream
/// must be restarted from a known point.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A line carried a recognized prefix but its tag is unknown, the
    /// instrumented node speaks another protocol version.
    #[error("unknown tag {tag:?} in line {line:?}")]
    UnknownTag {
        #[allow(missing_docs)]
        tag: String,
        #[allow(missing_docs)]
        line: String,
    },
    /// Handling a known tag failed.
    #[error("failed to handle {tag} line {line:?}: {kind}")]
    Line {
        #[allow(missing_docs)]
        tag: Tag,
        #[allow(missing_docs)]
        line: String,
        #[source]
        #[allow(missing_docs)]
        kind: LineError,
    },
    /// Reading a single transaction accumulated more (or less) than one
    /// transaction trace.
    #[error("expected exactly one transaction trace, got {0}")]
    UnexpectedTransactionCount(usize),
}

/// Field decoding and structural errors raised while handling one line.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("field `{field}` is not valid hex: {source}")]
    Hex {
        field: &'static str,
        source: hex::FromHexError,
    },
    #[error("field `{field}` is not a valid integer: {source}")]
    Integer {
        field: &'static str,
        source: ParseIntError,
    },
    #[error("field `{field}` has {found} bytes, expected {expected}")]
    ByteLength {
        field: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("field `{field}` has unknown value {value:?}")]
    UnknownVariant { field: &'static str, value: String },
    #[error("field `{field}` is not valid JSON: {source}")]
    Json {
        field: &'static str,
        source: serde_json::Error,
    },
    #[error("invalid access list: {0}")]
    AccessList(String),

    #[error("unsupported protocol version {0:?}")]
    UnsupportedProtocolVersion(String),
    #[error("block content received before INIT")]
    NotInitialized,
    #[error("block #{0} is already in progress")]
    BlockAlreadyActive(u64),
    #[error("no block in progress")]
    NoActiveBlock,
    #[error("block #{expected} is in progress, got #{found}")]
    BlockNumberMismatch { expected: u64, found: u64 },
    #[error("block #{0} ended before being finalized")]
    NotFinalizing(u64),
    #[error("a transaction is already in progress")]
    TransactionAlreadyActive,
    #[error("no transaction in progress")]
    NoActiveTransaction,
    #[error("block ended with a transaction still in progress")]
    DanglingTransaction,
    #[error("more call pops than pushes")]
    StackUnderflow,
    #[error("call stack top is #{expected}, got #{found}")]
    CallStackMismatch { expected: u32, found: u32 },
    #[error("call #{found} is out of sequence, expected #{expected}")]
    CallOutOfSequence { expected: u32, found: u32 },
    #[error("no call #{0} in the current transaction")]
    UnknownCall(u32),
    #[error("call #{0} already failed")]
    CallAlreadyFailed(u32),
    #[error("call #{index} left {gas_left} gas of a {gas_limit} limit")]
    GasUnderflow {
        index: u32,
        gas_limit: u64,
        gas_left: u64,
    },
    #[error("suicide recorded outside of any call")]
    SuicideOutsideCall,
    #[error("transaction has no recipient and its root call is not a CREATE")]
    MissingCreateCall,
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Consistency failures found while normalizing an assembled block.
#[allow(missing_docs)]
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("transaction {trace} call #{index} has unknown parent #{parent}")]
    UnknownParent { trace: usize, index: u32, parent: u32 },
    #[error("ordinal overflow while renumbering transaction {0}")]
    OrdinalOverflow(usize),
    #[error("log with block index {block_index} has no receipt counterpart")]
    MissingReceiptLog { block_index: u32 },
    #[error(
        "log with block index {block_index} differs from its receipt, \
         (ordinal, index) is {call:?} in the call and {receipt:?} in the receipt"
    )]
    ReceiptMismatch {
        block_index: u32,
        call: (u64, u32),
        receipt: (u64, u32),
    },
    #[error("{calls} surviving call logs but {receipts} receipt logs")]
    LogCountMismatch { calls: usize, receipts: usize },
}
