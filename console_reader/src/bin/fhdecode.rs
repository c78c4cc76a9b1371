firehose_common::check_chain_features!();

use std::{io::Write as _, time::Duration};

use anyhow::{Context as _, Result};
use clap::Parser;
use console_reader::{env::load_dotenvy_vars_if_present, pipeline, stats::Stats};
use dmlog_decoder::DecoderConfig;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;

use self::fhdecode::*;
mod fhdecode {
    pub mod cli;
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenvy_vars_if_present();
    console_reader::tracing::init();

    let args = cli::Cli::parse();
    anyhow::ensure!(
        args.channel_capacity > 0,
        "channel-capacity must be greater than 0"
    );
    let config = DecoderConfig::from(&args);
    info!("decoding with {config:?}");

    let input: Box<dyn AsyncBufRead + Unpin + Send> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("couldn't open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let (lines, producer) = pipeline::spawn_line_producer(input, args.channel_capacity);

    let stats = Stats::new(Duration::from_secs(args.stats_interval_secs));
    let stats = pipeline::decode_blocks(lines, config, stats, |block| {
        let mut stdout = std::io::stdout().lock();
        serde_json::to_writer(&mut stdout, &block)?;
        writeln!(stdout)?;
        Ok(())
    })
    .await?;

    let forwarded = producer.await.context("line producer panicked")??;
    info!("read {forwarded} lines");
    stats.log_summary();
    Ok(())
}
