use std::time::{Duration, Instant};

use dmlog_decoder::{DecodedBlock, Observer};
use tracing::info;

/// Periodically logs decoding throughput.
///
/// A report is logged from [`Observer::on_block`] once `interval` has passed
/// since the previous one.
#[derive(Debug)]
pub struct Stats {
    interval: Duration,
    blocks: u64,
    parse_time: Duration,
    /// `(number, lib_num)`
    last_block: Option<(u64, u64)>,
    window_start: Instant,
    window_blocks: u64,
}

impl Stats {
    /// Stats reporting every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            blocks: 0,
            parse_time: Duration::ZERO,
            last_block: None,
            window_start: Instant::now(),
            window_blocks: 0,
        }
    }

    /// Blocks seen since creation.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// `(number, lib_num)` of the latest block.
    pub fn last_block(&self) -> Option<(u64, u64)> {
        self.last_block
    }

    pub fn average_parse_time(&self) -> Option<Duration> {
        let blocks = u32::try_from(self.blocks).ok()?;
        self.parse_time.checked_div(blocks)
    }

    /// Log the totals.
    pub fn log_summary(&self) {
        info!(
            blocks = self.blocks,
            average_parse_time = ?self.average_parse_time(),
            last_block = ?self.last_block,
            "decoding summary"
        );
    }

    fn report(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.window_start);
        let per_minute = match elapsed.as_secs_f64() {
            secs if secs > 0.0 => self.window_blocks as f64 * 60.0 / secs,
            _ => 0.0,
        };
        info!(
            blocks_per_minute = per_minute,
            average_parse_time = ?self.average_parse_time(),
            last_block = ?self.last_block,
            "decoding progress"
        );
        self.window_start = now;
        self.window_blocks = 0;
    }
}

impl Observer for Stats {
    fn on_block(&mut self, block: &DecodedBlock, parse_time: Duration) {
        self.blocks += 1;
        self.window_blocks += 1;
        self.parse_time += parse_time;
        self.last_block = Some((block.block.number, block.lib_num));
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.interval {
            self.report(now);
        }
    }
}
