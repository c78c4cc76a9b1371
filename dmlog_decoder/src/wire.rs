//! Field level decoding of instrumentation lines.
//!
//! Lines are `TAG field1 field2 ...`, fields separated by a single space.
//! Hex fields use `.` for "absent", with an optional `0x` prefix. Odd length
//! hex gets a leading zero nibble.
//!
//! The EIP-2930 access list is the only binary field:
//! ```text
//! list  := uvarint(len) tuple{len}
//! tuple := address[20] uvarint(len) key[32]{len}
//! ```

use std::str::FromStr;

use ethereum_types::{Address, Bloom, H160, H256, U256};
use winnow::{
    combinator::{fail, trace},
    error::{ContextError, StrContext},
    token::{any, take},
    Parser as _,
};

use crate::{types::AccessTuple, LineError};

type PResult<T> = winnow::PResult<T, ContextError>;

/// Splits `rest` in exactly `N` fields.
pub fn fields<const N: usize>(rest: &str) -> Result<[&str; N], LineError> {
    let parts = rest.split(' ').collect::<Vec<_>>();
    let found = parts.len();
    parts.try_into().map_err(|_| LineError::FieldCount {
        expected: N,
        found,
    })
}

/// Splits `rest` in `N` fields, the last one taking the remainder of the line
/// (spaces included).
pub fn bounded_fields<const N: usize>(rest: &str) -> Result<[&str; N], LineError> {
    let parts = rest.splitn(N, ' ').collect::<Vec<_>>();
    let found = parts.len();
    parts.try_into().map_err(|_| LineError::FieldCount {
        expected: N,
        found,
    })
}

pub fn hex_bytes(field: &'static str, s: &str) -> Result<Vec<u8>, LineError> {
    if s == "." {
        return Ok(Vec::new());
    }
    let s = s.strip_prefix("0x").unwrap_or(s);
    let decoded = match s.len() % 2 {
        0 => hex::decode(s),
        _ => hex::decode(format!("0{s}")),
    };
    decoded.map_err(|source| LineError::Hex { field, source })
}

/// A big-endian unsigned integer of at most 256 bits, [`None`] when absent.
pub fn big_int(field: &'static str, s: &str) -> Result<Option<U256>, LineError> {
    if s == "." {
        return Ok(None);
    }
    let bytes = hex_bytes(field, s)?;
    if bytes.len() > 32 {
        return Err(LineError::ByteLength {
            field,
            expected: "at most 32",
            found: bytes.len(),
        });
    }
    Ok(Some(U256::from_big_endian(&bytes)))
}

pub fn address(field: &'static str, s: &str) -> Result<Address, LineError> {
    let bytes = hex_bytes(field, s)?;
    match bytes.len() {
        20 => Ok(H160::from_slice(&bytes)),
        found => Err(LineError::ByteLength {
            field,
            expected: "20",
            found,
        }),
    }
}

pub fn opt_address(field: &'static str, s: &str) -> Result<Option<Address>, LineError> {
    match s {
        "." => Ok(None),
        _ => address(field, s).map(Some),
    }
}

/// Left pads values shorter than 32 bytes.
pub fn h256(field: &'static str, s: &str) -> Result<H256, LineError> {
    let bytes = hex_bytes(field, s)?;
    if bytes.len() > 32 {
        return Err(LineError::ByteLength {
            field,
            expected: "at most 32",
            found: bytes.len(),
        });
    }
    let mut out = H256::zero();
    out.0[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

pub fn bloom(field: &'static str, s: &str) -> Result<Bloom, LineError> {
    let bytes = hex_bytes(field, s)?;
    match bytes.len() {
        0 => Ok(Bloom::zero()),
        256 => Ok(Bloom::from_slice(&bytes)),
        found => Err(LineError::ByteLength {
            field,
            expected: "256",
            found,
        }),
    }
}

pub fn uint<T>(field: &'static str, s: &str) -> Result<T, LineError>
where
    T: FromStr<Err = std::num::ParseIntError>,
{
    s.parse()
        .map_err(|source| LineError::Integer { field, source })
}

/// A named enum value, see [`strum::EnumString`].
pub fn variant<T: FromStr>(field: &'static str, s: &str) -> Result<T, LineError> {
    s.parse().map_err(|_| LineError::UnknownVariant {
        field,
        value: s.to_owned(),
    })
}

pub fn json<T: serde::de::DeserializeOwned>(field: &'static str, s: &str) -> Result<T, LineError> {
    serde_json::from_str(s).map_err(|source| LineError::Json { field, source })
}

pub fn access_list(field: &'static str, s: &str) -> Result<Vec<AccessTuple>, LineError> {
    let bytes = hex_bytes(field, s)?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    let mut input = &bytes[..];
    let list = tuples.parse_next(&mut input).map_err(|e| {
        LineError::AccessList(format!("at offset {}: {e}", bytes.len() - input.len()))
    })?;
    match input.len() {
        0 => Ok(list),
        trailing => Err(LineError::AccessList(format!(
            "{trailing} trailing bytes after {} entries",
            list.len()
        ))),
    }
}

fn tuples(input: &mut &[u8]) -> PResult<Vec<AccessTuple>> {
    trace("tuples", |input: &mut &[u8]| {
        let count = uvarint(input)?;
        let mut list = Vec::new();
        for _ in 0..count {
            list.push(tuple(input)?);
        }
        Ok(list)
    })
    .parse_next(input)
}

fn tuple(input: &mut &[u8]) -> PResult<AccessTuple> {
    let address = array::<20>.map(H160).parse_next(input)?;
    let count = uvarint(input)?;
    let mut storage_keys = Vec::new();
    for _ in 0..count {
        storage_keys.push(array::<32>.map(H256).parse_next(input)?);
    }
    Ok(AccessTuple {
        address,
        storage_keys,
    })
}

/// LEB128, as Go's `binary.Uvarint`.
fn uvarint(input: &mut &[u8]) -> PResult<u64> {
    trace("uvarint", |input: &mut &[u8]| {
        let mut value = 0u64;
        for i in 0..10 {
            let byte = any::<_, ContextError>.parse_next(input)?;
            if i == 9 && byte > 1 {
                break;
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        fail.context(StrContext::Label("uvarint overflows u64"))
            .parse_next(input)
    })
    .parse_next(input)
}

fn array<const N: usize>(input: &mut &[u8]) -> PResult<[u8; N]> {
    take(N)
        .map(|it: &[u8]| it.try_into().expect("take has already selected N bytes"))
        .parse_next(input)
}

#[cfg(test)]
#[track_caller]
fn do_test<'a, T: PartialEq + core::fmt::Debug>(
    src: &'a [u8],
    expected: T,
    mut parser: impl winnow::Parser<&'a [u8], T, winnow::error::ContextError>,
) {
    let actual = parser.parse(src).unwrap();
    assert_eq!(expected, actual)
}

#[test]
fn uvarint_test_cases() {
    do_test(b"\x00", 0, uvarint);
    do_test(b"\x01", 1, uvarint);
    do_test(b"\x7f", 127, uvarint);
    do_test(b"\x80\x01", 128, uvarint);
    do_test(b"\xac\x02", 300, uvarint);
    do_test(
        b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x01",
        u64::MAX,
        uvarint,
    );
    assert!(uvarint
        .parse(b"\xff\xff\xff\xff\xff\xff\xff\xff\xff\x02".as_slice())
        .is_err());
    assert!(uvarint.parse(b"\x80".as_slice()).is_err());
}

#[test]
fn access_list_empty() {
    assert_eq!(access_list("accessList", ".").unwrap(), vec![]);
    assert_eq!(access_list("accessList", "00").unwrap(), vec![]);
}

#[test]
fn access_list_entries() {
    let address = "00000000000000000000000000000000000000aa";
    let key = format!("{:064x}", 1);
    let s = format!("02{address}01{key}{address}00");
    let list = access_list("accessList", &s).unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].address, H160::from_low_u64_be(0xaa));
    assert_eq!(list[0].storage_keys, vec![H256::from_low_u64_be(1)]);
    assert!(list[1].storage_keys.is_empty());
}

#[test]
fn access_list_trailing_bytes() {
    assert!(matches!(
        access_list("accessList", "00ff"),
        Err(LineError::AccessList(_))
    ));
    // declares one entry, holds none
    assert!(access_list("accessList", "01").is_err());
}

#[test]
fn hex_fields() {
    assert_eq!(hex_bytes("f", ".").unwrap(), Vec::<u8>::new());
    assert_eq!(hex_bytes("f", "0x").unwrap(), Vec::<u8>::new());
    assert_eq!(hex_bytes("f", "abc").unwrap(), vec![0x0a, 0xbc]);
    assert_eq!(hex_bytes("f", "0x0abc").unwrap(), vec![0x0a, 0xbc]);
    assert!(hex_bytes("f", "zz").is_err());

    assert_eq!(big_int("f", ".").unwrap(), None);
    assert_eq!(big_int("f", "0x100").unwrap(), Some(U256::from(256)));
    assert!(big_int("f", &"ff".repeat(33)).is_err());

    assert_eq!(h256("f", "01").unwrap(), H256::from_low_u64_be(1));
    assert_eq!(opt_address("f", ".").unwrap(), None);
    assert!(matches!(
        address("f", "0xaa"),
        Err(LineError::ByteLength { found: 1, .. })
    ));
    assert_eq!(bloom("f", ".").unwrap(), Bloom::zero());
    assert!(bloom("f", "00").is_err());
}

#[test]
fn field_splitting() {
    assert_eq!(fields::<3>("a b c").unwrap(), ["a", "b", "c"]);
    assert!(matches!(
        fields::<3>("a b c d"),
        Err(LineError::FieldCount {
            expected: 3,
            found: 4
        })
    ));
    assert_eq!(
        bounded_fields::<2>("a {\"b\": 1, \"c\": 2}").unwrap(),
        ["a", "{\"b\": 1, \"c\": 2}"]
    );
    assert!(bounded_fields::<3>("a b").is_err());
    assert_eq!(uint::<u64>("f", "42").unwrap(), 42);
    assert!(uint::<u64>("f", "0x2a").is_err());
}
