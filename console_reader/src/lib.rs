//! Plumbing between an instrumented node's console output and
//! [`dmlog_decoder`].
//!
//! Lines are read by an async producer and handed over a bounded channel to
//! a blocking task running the decoder, see [`pipeline`].

firehose_common::check_chain_features!();

pub mod env;
pub mod pipeline;
pub mod stats;
pub mod tracing;

/// Lines buffered between the producer and the decoder before the producer
/// waits.
pub const LINE_CHANNEL_SIZE: usize = 4096;
