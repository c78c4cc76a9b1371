use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Per-stream decoder settings.
///
/// The protocol version learned from `INIT` lives next to these in the
/// [`crate::Decoder`], so independent decoders never share state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecoderConfig {
    /// Which chain specific normalizations apply.
    pub chain: Chain,
    /// Lower bound of every computed LIB, the first block a consumer can
    /// ever ask for.
    pub first_streamable_block: u64,
    /// Opt-in normalization passes.
    pub normalization: NormalizationFeatures,
}

/// Normalization passes that only run when requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NormalizationFeatures {
    /// Merge Bor state-sync transactions in one synthetic transaction and move
    /// the validator set transactions last.
    pub combine_system_transactions: bool,
    /// Sort transactions by index and lay their ordinals out contiguously.
    pub reorder_and_renumber_ordinals: bool,
    /// Rewrite delegate call callers and bump schema 2 blocks to 3.
    pub upgrade_block_v2_to_v3: bool,
}

#[allow(missing_docs)]
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Chain {
    Ethereum,
    /// Bor, carries system transactions.
    Polygon,
}

impl Chain {
    /// Whether the chain injects system transactions in its blocks.
    pub fn has_system_transactions(self) -> bool {
        matches!(self, Self::Polygon)
    }
}

impl Default for Chain {
    fn default() -> Self {
        match cfg!(feature = "polygon_pos") {
            true => Self::Polygon,
            false => Self::Ethereum,
        }
    }
}

/// Schema version of the blocks produced for a given `INIT` protocol
/// version.
pub(crate) fn schema_version(protocol_version: &str) -> Option<u32> {
    match protocol_version {
        "2.0" | "2.1" | "2.2" => Some(2),
        "2.3" | "3.0" => Some(3),
        _ => None,
    }
}

#[test]
fn protocol_versions() {
    assert_eq!(schema_version("2.2"), Some(2));
    assert_eq!(schema_version("3.0"), Some(3));
    assert_eq!(schema_version("1.0"), None);
    assert_eq!(schema_version("3.0.1"), None);
}

#[test]
fn chain_names() {
    assert_eq!("polygon".parse::<Chain>(), Ok(Chain::Polygon));
    assert_eq!(Chain::Ethereum.to_string(), "ethereum");
}
