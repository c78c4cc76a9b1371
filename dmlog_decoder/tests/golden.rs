//! Decode every `tests/data/*.dmlog` stream and check the blocks against the
//! sibling `*.golden.json`, which holds the complete expected output.
//!
//! A `*.config.json` sibling, if any, holds the [`DecoderConfig`].

mod common;

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use dmlog_decoder::{ConsoleReader, DecodedBlock, DecoderConfig};
use libtest_mimic::{Arguments, Trial};
use serde::de::DeserializeOwned;
use serde_json::Value;

fn main() -> anyhow::Result<()> {
    let _ = pretty_env_logger::try_init();
    let mut trials = vec![];
    for path in glob::glob(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/*.dmlog"))
        .expect("valid glob pattern")
    {
        let path = path.context("filesystem error discovering test vectors")?;
        let name = path
            .file_stem()
            .and_then(|it| it.to_str())
            .context("non-UTF-8 case name")?
            .to_owned();
        trials.push(Trial::test(name, move || {
            run_case(&path).map_err(|e| format!("{e:?}"))?; // get the full cause chain
            Ok(())
        }));
    }
    libtest_mimic::run(&Arguments::from_args(), trials).exit()
}

fn run_case(dmlog: &Path) -> anyhow::Result<()> {
    let config = match sibling(dmlog, "config.json") {
        path if path.exists() => json::<DecoderConfig>(&path)?,
        _ => DecoderConfig::default(),
    };
    let expected = match json::<Value>(sibling(dmlog, "golden.json"))? {
        Value::Array(blocks) => blocks,
        block => vec![block],
    };

    let text = fs::read_to_string(dmlog)?;
    let blocks = ConsoleReader::new(text.lines(), config)
        .collect::<Result<Vec<DecodedBlock>, _>>()
        .context("decoding failed")?;
    anyhow::ensure!(
        blocks.len() == expected.len(),
        "decoded {} blocks, expected {}",
        blocks.len(),
        expected.len()
    );
    for (ix, (block, expected)) in blocks.iter().zip(&expected).enumerate() {
        common::check_consistent(&block.block);
        let mut differences = vec![];
        diff(
            &serde_json::to_value(block)?,
            expected,
            format!("[{ix}]"),
            &mut differences,
        );
        anyhow::ensure!(
            differences.is_empty(),
            "decoded block differs from the golden file:\n{}",
            differences.join("\n")
        );
    }
    Ok(())
}

/// Every path at which `actual` and `expected` disagree.
fn diff(actual: &Value, expected: &Value, at: String, out: &mut Vec<String>) {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => {
            for key in expected.keys().filter(|key| !actual.contains_key(*key)) {
                out.push(format!("{at}.{key}: missing"));
            }
            for (key, actual) in actual {
                match expected.get(key) {
                    Some(expected) => diff(actual, expected, format!("{at}.{key}"), out),
                    None => out.push(format!("{at}.{key}: unexpected {actual}")),
                }
            }
        }
        (Value::Array(actual), Value::Array(expected)) if actual.len() == expected.len() => {
            for (ix, (actual, expected)) in actual.iter().zip(expected).enumerate() {
                diff(actual, expected, format!("{at}[{ix}]"), out);
            }
        }
        (actual, expected) if actual != expected => {
            out.push(format!("{at}: {actual} != {expected} (expected)"))
        }
        _ => {}
    }
}

fn sibling(dmlog: &Path, extension: &str) -> PathBuf {
    dmlog.with_extension(extension)
}

fn json<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
    fn _imp<T: DeserializeOwned>(path: impl AsRef<Path>) -> anyhow::Result<T> {
        let file = File::open(path)?;
        Ok(serde_path_to_error::deserialize(
            &mut serde_json::Deserializer::from_reader(file),
        )?)
    }

    _imp(&path).context(format!("couldn't load {}", path.as_ref().display()))
}
