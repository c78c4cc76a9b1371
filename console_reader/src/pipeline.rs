//! Two cooperating tasks: an async producer reading lines, and the decoder
//! consuming them on a blocking thread.
//!
//! The channel between them is bounded, a slow decoder makes the producer
//! wait and no line is ever dropped. Dropping the receiving side (e.g. after
//! a decoding error) stops the producer.

use anyhow::Context as _;
use dmlog_decoder::{ConsoleReader, DecodedBlock, DecoderConfig, Observer};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt as _},
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{debug, info};

/// Forward every line of `input`, in order, on a channel holding at most
/// `capacity` lines.
///
/// The task resolves to the number of lines forwarded.
pub fn spawn_line_producer<R>(
    input: R,
    capacity: usize,
) -> (mpsc::Receiver<String>, JoinHandle<anyhow::Result<u64>>)
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);
    let producer = tokio::spawn(async move {
        let mut lines = input.lines();
        let mut forwarded = 0u64;
        while let Some(line) = lines
            .next_line()
            .await
            .context("failed to read the next line")?
        {
            if tx.send(line).await.is_err() {
                debug!("decoder went away after {forwarded} lines");
                break;
            }
            forwarded += 1;
        }
        Ok(forwarded)
    });
    (rx, producer)
}

/// Blocking iterator over a channel, ends when every sender is gone.
#[derive(Debug)]
struct ChannelLines(mpsc::Receiver<String>);

impl Iterator for ChannelLines {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.blocking_recv()
    }
}

/// Decode the lines received on `lines`, handing each block to `sink`.
///
/// Returns the observer once the channel is closed and drained. The first
/// decoding or sink error ends decoding.
pub async fn decode_blocks<O, F>(
    lines: mpsc::Receiver<String>,
    config: DecoderConfig,
    observer: O,
    mut sink: F,
) -> anyhow::Result<O>
where
    O: Observer + Send + 'static,
    F: FnMut(DecodedBlock) -> anyhow::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> anyhow::Result<O> {
        let mut reader = ConsoleReader::new(ChannelLines(lines), config).with_observer(observer);
        while let Some(block) = reader.read_block()? {
            sink(block)?;
        }
        info!("end of stream");
        Ok(reader.into_observer())
    })
    .await
    .context("decoder task panicked")?
}
