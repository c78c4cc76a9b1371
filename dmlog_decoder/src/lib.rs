//! Instrumented Ethereum nodes print their execution as a stream of text
//! lines, one per event, to their standard output. This library turns those
//! lines back into complete, normalized [`types::Block`]s.
//!
//! Each relevant line looks like
//!
//! ```text
//! FIRE <TAG> <field> <field> ...
//! ```
//!
//! (older nodes print `DMLOG` instead of `FIRE`). Every other line is the
//! node's own logging and is ignored.
//!
//! The broad overview is as follows:
//!
//! 1. A [`Decoder`] is fed one line at a time. It splits the line into
//!    fields, decodes them, and updates the block, the transaction and the
//!    call stack in progress.
//! 2. When a transaction ends, [`Event::TransactionCompleted`] is emitted.
//! 3. When a block ends it is validated, its last irreversible block is
//!    estimated (see [`irreversibility`]), it goes through [`normalize`], and
//!    [`Event::BlockCompleted`] is emitted.
//!
//! [`ConsoleReader`] wraps a [`Decoder`] over any iterator of lines and
//! returns whole blocks.
//!
//! # Non-Goals
//! - Recovery - any malformed line is a fatal [`Error`], the stream must be
//!   restarted from a known point.
//! - Deciding what a block means - no state is replayed or verified.

#![deny(rustdoc::broken_intra_doc_links)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]

firehose_common::check_chain_features!();

mod assembler;
mod call_stack;
mod config;
mod error;
mod handlers;
pub mod irreversibility;
mod normalize;
mod observer;
mod reader;
pub mod types;
mod wire;

pub use assembler::{Decoder, Event, Tag};
pub use config::{Chain, DecoderConfig, NormalizationFeatures};
pub use error::{Error, LineError, NormalizeError};
pub use normalize::normalize;
pub use observer::{BlocksObserver, DummyObserver, Observer};
pub use reader::ConsoleReader;
pub use types::DecodedBlock;

mod hex {
    use serde::{de::Error as _, Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer, T>(data: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: hex::ToHex,
    {
        let s = data.encode_hex::<String>();
        serializer.serialize_str(&format!("0x{}", s))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, T>(deserializer: D) -> Result<T, D::Error>
    where
        T: hex::FromHex,
        T::Error: std::fmt::Display,
    {
        let s = String::deserialize(deserializer)?;
        match s.strip_prefix("0x") {
            Some(rest) => T::from_hex(rest),
            None => T::from_hex(&*s),
        }
        .map_err(D::Error::custom)
    }
}

/// `u64` quantities, serialized as [`ethereum_types::U64`] (`0x`-prefixed hex
/// like the JSON-RPC does). Plain JSON numbers are accepted on input.
mod quantity {
    use ethereum_types::U64;
    use serde::{Deserialize, Deserializer, Serialize as _, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Quantity(U64),
    }

    impl From<Repr> for u64 {
        fn from(value: Repr) -> Self {
            match value {
                Repr::Number(n) => n,
                Repr::Quantity(q) => q.as_u64(),
            }
        }
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        U64::from(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        Repr::deserialize(deserializer).map(u64::from)
    }

    pub mod option {
        use serde::{Deserialize as _, Deserializer, Serializer};

        use super::Repr;

        pub fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => super::serialize(v, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            Ok(Option::<Repr>::deserialize(deserializer)?.map(u64::from))
        }
    }

    #[test]
    fn accepts_numbers_and_hex() {
        let parse = |s: &str| serde_json::from_str::<Repr>(s).map(u64::from);
        assert_eq!(parse("16").unwrap(), 16);
        assert_eq!(parse("\"0x10\"").unwrap(), 16);
        assert!(parse("\"0xzz\"").is_err());
        assert!(parse("-1").is_err());

        let to_json = |value: u64| {
            serialize(&value, serde_json::value::Serializer)
                .unwrap()
                .to_string()
        };
        assert_eq!(to_json(250), "\"0xfa\"");
        assert_eq!(to_json(0), "\"0x0\"");
    }
}
