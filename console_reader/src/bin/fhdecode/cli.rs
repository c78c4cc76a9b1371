use std::path::PathBuf;

use clap::{Parser, ValueHint};
use dmlog_decoder::{Chain, DecoderConfig, NormalizationFeatures};

const HELP_HEADING: &str = "Normalization options";

/// Decode an instrumented node's output into JSON blocks, one per line.
#[derive(Parser, Debug)]
#[command(version, about)]
pub(crate) struct Cli {
    /// File holding the node output. Reads stdin when absent.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub(crate) input: Option<PathBuf>,
    /// Chain the node runs, enables chain specific normalizations.
    #[arg(long, env = "FHDECODE_CHAIN", default_value_t = Chain::default())]
    pub(crate) chain: Chain,
    /// No LIB is ever reported below this block.
    #[arg(long, env = "FHDECODE_FIRST_STREAMABLE_BLOCK", default_value_t = 0)]
    pub(crate) first_streamable_block: u64,
    /// Merge Bor state-sync transactions into a single one.
    #[arg(long, env = "FHDECODE_COMBINE_SYSTEM_TRANSACTIONS", help_heading = HELP_HEADING, default_value_t = false)]
    pub(crate) combine_system_transactions: bool,
    /// Sort transactions by index and renumber their ordinals.
    #[arg(long, env = "FHDECODE_REORDER_ORDINALS", help_heading = HELP_HEADING, default_value_t = false)]
    pub(crate) reorder_ordinals: bool,
    /// Upgrade schema 2 blocks to schema 3.
    #[arg(long, env = "FHDECODE_UPGRADE_V2_TO_V3", help_heading = HELP_HEADING, default_value_t = false)]
    pub(crate) upgrade_v2_to_v3: bool,
    /// Lines buffered ahead of the decoder. Must be greater than zero.
    #[arg(long, env = "FHDECODE_CHANNEL_CAPACITY", default_value_t = console_reader::LINE_CHANNEL_SIZE)]
    pub(crate) channel_capacity: usize,
    /// Seconds between two progress reports.
    #[arg(long, env = "FHDECODE_STATS_INTERVAL_SECS", default_value_t = 30)]
    pub(crate) stats_interval_secs: u64,
}

impl From<&Cli> for DecoderConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            chain: cli.chain,
            first_streamable_block: cli.first_streamable_block,
            normalization: NormalizationFeatures {
                combine_system_transactions: cli.combine_system_transactions,
                reorder_and_renumber_ordinals: cli.reorder_ordinals,
                upgrade_block_v2_to_v3: cli.upgrade_v2_to_v3,
            },
        }
    }
}
