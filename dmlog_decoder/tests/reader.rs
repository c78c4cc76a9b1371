mod common;

use assert2::{check, let_assert};
use dmlog_decoder::{
    types::{CallType, TransactionStatus},
    BlocksObserver, Chain, ConsoleReader, DecoderConfig, Error, LineError,
    NormalizationFeatures,
};
use ethereum_types::{H160, H256};
use firehose_common::{
    derived_system_tx_hash, POLYGON_STATE_RECEIVER_ADDRESS, POLYGON_SYSTEM_ADDRESS,
    POLYGON_VALIDATOR_SET_ADDRESS,
};
use hex_literal::hex;
use serde_json::json;

const ALICE: &str = "00000000000000000000000000000000000000a1";
const BOB: &str = "00000000000000000000000000000000000000b0";

fn hex_of(address: H160) -> String {
    hex::encode(address.as_bytes())
}

fn block_hash(number: u64) -> H256 {
    H256::from_low_u64_be(0xb10c_0000 + number)
}

fn end_block(number: u64, finalized: Option<u64>) -> String {
    let header = json!({
        "hash": block_hash(number),
        "parentHash": block_hash(number - 1),
        "sha3Uncles": H256::zero(),
        "miner": H160::zero(),
        "stateRoot": H256::zero(),
        "transactionsRoot": H256::zero(),
        "receiptsRoot": H256::zero(),
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "difficulty": "0x0",
        "number": format!("{number:#x}"),
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x0",
        "timestamp": "0x6553f100",
        "extraData": "0x",
        "mixHash": H256::zero(),
        "nonce": "0x0000000000000000",
    });
    let data = match finalized {
        Some(finalized) => json!({ "header": header, "finalizedBlockNum": finalized }),
        None => json!({ "header": header }),
    };
    format!("FIRE END_BLOCK {number} 1000 {data}")
}

/// A transaction with a single call and no logs.
fn transaction(hash: u8, from: &str, to: &str, ordinal: u64) -> Vec<String> {
    vec![
        format!(
            "FIRE BEGIN_APPLY_TRX {} {to} . . . . 100000 . 0 . . . . 0 {ordinal}",
            format!("{hash:02x}").repeat(32)
        ),
        format!("FIRE TRX_FROM {from}"),
        format!("FIRE EVM_RUN_CALL CALL 1 {}", ordinal + 1),
        format!("FIRE EVM_PARAM CALL 1 {from} {to} . 100000 . 0"),
        format!("FIRE EVM_END_CALL 1 50000 . {}", ordinal + 2),
        format!("FIRE END_APPLY_TRX 50000 . 50000 . {} []", ordinal + 3),
    ]
}

fn block(number: u64, transactions: Vec<Vec<String>>, finalized: Option<u64>) -> Vec<String> {
    let mut lines = vec![format!("FIRE BEGIN_BLOCK {number}")];
    lines.extend(transactions.into_iter().flatten());
    lines.push(format!("FIRE FINALIZE_BLOCK {number}"));
    lines.push(end_block(number, finalized));
    lines
}

fn stream(blocks: impl IntoIterator<Item = Vec<String>>) -> Vec<String> {
    let mut lines = vec!["FIRE INIT 3.0 geth 1.14.0-fh3.0".to_owned()];
    lines.extend(blocks.into_iter().flatten());
    lines
}

#[test]
fn reads_consecutive_blocks() {
    let lines = stream([
        block(1000, vec![transaction(1, ALICE, BOB, 1)], None),
        block(1001, vec![], Some(990)),
        block(1002, vec![transaction(2, ALICE, BOB, 1), transaction(3, BOB, ALICE, 5)], Some(1002)),
    ]);
    let mut reader =
        ConsoleReader::new(lines.iter(), DecoderConfig::default()).with_observer(BlocksObserver::new());

    let_assert!(Ok(Some(first)) = reader.read_block());
    common::check_consistent(&first.block);
    check!(first.block.number == 1000);
    check!(first.block.hash == block_hash(1000));
    check!(first.block.transaction_traces.len() == 1);
    let trace = &first.block.transaction_traces[0];
    check!(trace.status == TransactionStatus::Succeeded);
    check!(trace.calls[0].gas_consumed == 50000);

    let_assert!(Ok(Some(second)) = reader.read_block());
    common::check_consistent(&second.block);
    let_assert!(Ok(Some(third)) = reader.read_block());
    common::check_consistent(&third.block);
    let indexes = third
        .block
        .transaction_traces
        .iter()
        .map(|trace| trace.index)
        .collect::<Vec<_>>();
    check!(indexes == vec![0, 1]);
    let_assert!(Ok(None) = reader.read_block());

    check!(reader.observer().data == vec![(1000, 800), (1001, 990), (1002, 1002)]);
}

#[test]
fn partial_block_is_not_returned() {
    let mut lines = stream([block(5, vec![], None)]);
    lines.push("FIRE BEGIN_BLOCK 6".to_owned());
    lines.extend(transaction(1, ALICE, BOB, 1));
    let blocks = ConsoleReader::new(lines.iter(), DecoderConfig::default())
        .collect::<Result<Vec<_>, _>>();
    let_assert!(Ok(blocks) = blocks);
    check!(blocks.len() == 1);
    check!(blocks[0].block.number == 5);
    check!(blocks[0].lib_num == 0);
}

#[test]
fn first_streamable_block_bounds_lib() {
    let config = DecoderConfig {
        first_streamable_block: 900,
        ..Default::default()
    };
    let lines = stream([block(1000, vec![], None)]);
    let mut reader = ConsoleReader::new(lines.iter(), config);
    let_assert!(Ok(Some(block)) = reader.read_block());
    check!(block.lib_num == 900);
}

#[test]
fn reads_standalone_transactions() {
    let mut lines = vec!["FIRE INIT 3.0 geth 1.14.0-fh3.0".to_owned()];
    lines.extend(transaction(1, ALICE, BOB, 1));
    lines.extend(transaction(2, BOB, ALICE, 1));
    let mut reader = ConsoleReader::new(lines.iter(), DecoderConfig::default());

    let_assert!(Ok(Some(first)) = reader.read_transaction());
    check!(
        first.hash
            == H256(hex!(
                "0101010101010101010101010101010101010101010101010101010101010101"
            ))
    );
    check!(first.calls[0].call_type == CallType::Call);
    let_assert!(Ok(Some(second)) = reader.read_transaction());
    check!(second.hash == H256::repeat_byte(2));
    check!(second.from == Some(H160::from_low_u64_be(0xb0)));
    let_assert!(Ok(None) = reader.read_transaction());
}

#[test]
fn malformed_line_is_fatal() {
    let lines = [
        "FIRE INIT 3.0 geth 1.14.0-fh3.0",
        "FIRE BEGIN_BLOCK 1",
        "FIRE EVM_RUN_CALL CALL 1 2",
    ];
    let mut reader = ConsoleReader::new(lines.iter(), DecoderConfig::default());
    let_assert!(
        Err(Error::Line {
            kind: LineError::NoActiveTransaction,
            ..
        }) = reader.read_block()
    );
}

#[test]
fn combines_polygon_system_transactions() {
    let system = hex_of(POLYGON_SYSTEM_ADDRESS);
    let state_receiver = hex_of(POLYGON_STATE_RECEIVER_ADDRESS);
    let validator_set = hex_of(POLYGON_VALIDATOR_SET_ADDRESS);
    let lines = stream([block(
        64,
        vec![
            transaction(1, &system, &validator_set, 1),
            transaction(2, ALICE, BOB, 5),
            transaction(3, &system, &state_receiver, 9),
            transaction(4, &system, &state_receiver, 13),
        ],
        None,
    )]);
    let config = DecoderConfig {
        chain: Chain::Polygon,
        normalization: NormalizationFeatures {
            combine_system_transactions: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let mut reader = ConsoleReader::new(lines.iter(), config);
    let_assert!(Ok(Some(decoded)) = reader.read_block());

    let traces = &decoded.block.transaction_traces;
    let hashes = traces.iter().map(|trace| trace.hash).collect::<Vec<_>>();
    check!(
        hashes
            == vec![
                H256::repeat_byte(2),
                derived_system_tx_hash(64, &block_hash(64)),
                H256::repeat_byte(1),
            ]
    );
    check!(traces.iter().map(|trace| trace.index).collect::<Vec<_>>() == vec![0, 1, 2]);

    let merged = &traces[1];
    check!(merged.from == Some(POLYGON_SYSTEM_ADDRESS));
    check!(merged.to == Some(POLYGON_STATE_RECEIVER_ADDRESS));
    check!(merged.status == TransactionStatus::Succeeded);
    check!(merged.gas_used == 100000);
    check!(merged.begin_ordinal == 9);
    check!(merged.end_ordinal == 16);
    let tree = merged
        .calls
        .iter()
        .map(|call| (call.index, call.parent_index, call.depth))
        .collect::<Vec<_>>();
    check!(tree == vec![(1, 0, 0), (2, 1, 1), (3, 1, 1)]);
}

#[test]
fn every_tag_in_one_block() {
    let new_contract = "000000000000000000000000000000000000c0de";
    let code_hash = "cc".repeat(32);
    let lines = [
        "FIRE INIT 3.0 geth 1.14.0-fh3.0".to_owned(),
        format!("FIRE TRX_ENTER_POOL {}", "ee".repeat(32)),
        "FIRE BEGIN_BLOCK 7".to_owned(),
        format!(
            "FIRE BEGIN_APPLY_TRX {} . . 1b {} {} 200000 01 1 6080 . . . 0 1",
            "01".repeat(32),
            "aa".repeat(32),
            "bb".repeat(32)
        ),
        format!("FIRE TRX_FROM {ALICE}"),
        "FIRE EVM_RUN_CALL CREATE 1 2".to_owned(),
        format!("FIRE EVM_PARAM CREATE 1 {ALICE} {new_contract} . 200000 6080 0"),
        format!("FIRE CREATED_ACCOUNT 1 {new_contract} 3"),
        "FIRE GAS_CHANGE 1 200000 199000 contract_creation 4".to_owned(),
        format!("FIRE EVM_KECCAK 1 {} 00", "dd".repeat(32)),
        format!("FIRE STORAGE_CHANGE 1 {new_contract} 01 . 2a 5"),
        format!("FIRE NONCE_CHANGE 1 {ALICE} 1 2 6"),
        "FIRE EVM_RUN_CALL CALL 2 7".to_owned(),
        format!("FIRE EVM_PARAM CALL 2 {new_contract} {BOB} 01 1000 . 0"),
        "FIRE ACCOUNT_WITHOUT_CODE 2".to_owned(),
        format!("FIRE BALANCE_CHANGE 2 {BOB} . 01 transfer 8"),
        "FIRE SUICIDE_CHANGE 2".to_owned(),
        "FIRE EVM_END_CALL 2 1000 . 9".to_owned(),
        format!("FIRE CODE_CHANGE 1 {new_contract} . . {code_hash} 6080 10"),
        "FIRE EVM_END_CALL 1 150000 6080 11".to_owned(),
        "FIRE END_APPLY_TRX 50000 . 50000 . 12 []".to_owned(),
        format!(
            "FIRE BEGIN_APPLY_TRX {} {BOB} . . . . 21000 . 0 . . . . 0 13",
            "02".repeat(32)
        ),
        "FIRE SKIPPED_TRX nonce too low".to_owned(),
        format!("FIRE TRX_DISCARDED {}", "ee".repeat(32)),
        "FIRE FINALIZE_BLOCK 7".to_owned(),
        end_block(7, None),
    ];
    let mut reader = ConsoleReader::new(lines.iter(), DecoderConfig::default());
    let_assert!(Ok(Some(decoded)) = reader.read_block());
    common::check_consistent(&decoded.block);

    let_assert!([trace] = &decoded.block.transaction_traces[..]);
    let contract = H160(hex!("000000000000000000000000000000000000c0de"));
    check!(trace.to == Some(contract));
    check!(trace.status == TransactionStatus::Succeeded);
    check!(trace.input == hex!("6080"));

    let_assert!([root, child] = &trace.calls[..]);
    check!(root.call_type == CallType::Create);
    check!(root.gas_consumed == 50000);
    check!(root.return_data == vec![0x60, 0x80]);
    check!(root.account_creations.len() == 1);
    check!(root.account_creations[0].account == contract);
    check!(root.gas_changes[0].new_value == 199000);
    check!(root.keccak_preimages.get(&"dd".repeat(32)).map(String::as_str) == Some("00"));
    check!(root.storage_changes[0].new_value == H256::from_low_u64_be(0x2a));
    check!(root.nonce_changes[0].new_value == 2);
    check!(
        root.code_changes[0].new_hash
            == hex!("cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc")
    );
    check!(root.executed_code);

    check!((child.parent_index, child.depth) == (1, 1));
    check!(!child.executed_code);
    check!(child.suicide);
    check!(child.balance_changes[0].address == H160::from_low_u64_be(0xb0));
    check!(child.gas_consumed == 0);
}
