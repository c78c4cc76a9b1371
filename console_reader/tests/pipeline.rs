use std::{io::Cursor, sync::mpsc};

use console_reader::{pipeline, stats::Stats};
use dmlog_decoder::{BlocksObserver, DecoderConfig};
use serde_json::json;

fn end_block(number: u64) -> String {
    let hash = |n: u64| format!("0x{n:064x}");
    let data = json!({
        "header": {
            "hash": hash(number),
            "parentHash": hash(number - 1),
            "sha3Uncles": hash(0),
            "miner": format!("0x{}", "00".repeat(20)),
            "stateRoot": hash(0),
            "transactionsRoot": hash(0),
            "receiptsRoot": hash(0),
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "difficulty": "0x0",
            "number": number,
            "gasLimit": 30_000_000,
            "gasUsed": 0,
            "timestamp": 1_700_000_000,
            "extraData": "0x",
            "mixHash": hash(0),
            "nonce": "0x0000000000000000",
        },
        "uncles": [],
    });
    format!("FIRE END_BLOCK {number} 512 {data}")
}

fn node_output(blocks: std::ops::Range<u64>) -> Vec<u8> {
    let mut lines = vec!["FIRE INIT 3.0 geth 1.14.0-fh3.0".to_owned()];
    for number in blocks {
        lines.push(format!("INFO imported block {number}"));
        lines.push(format!("FIRE BEGIN_BLOCK {number}"));
        lines.push(format!("FIRE FINALIZE_BLOCK {number}"));
        lines.push(end_block(number));
    }
    (lines.join("\n") + "\n").into_bytes()
}

#[tokio::test]
async fn decodes_every_block_in_order() {
    // a single slot forces the producer to wait on the decoder
    let (lines, producer) = pipeline::spawn_line_producer(Cursor::new(node_output(1..51)), 1);
    let (tx, rx) = mpsc::channel();
    let observer = pipeline::decode_blocks(lines, DecoderConfig::default(), BlocksObserver::new(), move |block| {
        tx.send(block.block.number)?;
        Ok(())
    })
    .await
    .unwrap();

    assert_eq!(rx.iter().collect::<Vec<_>>(), (1..51).collect::<Vec<_>>());
    assert_eq!(observer.data.len(), 50);
    assert_eq!(observer.data.last(), Some(&(50, 0)));
    assert_eq!(producer.await.unwrap().unwrap(), 1 + 4 * 50);
}

#[tokio::test]
async fn decoding_error_stops_the_producer() {
    let mut output = node_output(1..3);
    output.extend_from_slice(b"FIRE BEGIN_BLOCK nope\n");
    output.extend(node_output(3..200));
    let (lines, producer) = pipeline::spawn_line_producer(Cursor::new(output), 1);

    let result = pipeline::decode_blocks(
        lines,
        DecoderConfig::default(),
        Stats::new(std::time::Duration::from_secs(60)),
        |_| Ok(()),
    )
    .await;
    let error = result.unwrap_err();
    assert!(format!("{error:#}").contains("BEGIN_BLOCK nope"));

    // the receiver is gone, the producer gives up instead of blocking forever
    let forwarded = producer.await.unwrap().unwrap();
    assert!(forwarded < 1 + 4 * 200);
}

#[tokio::test]
async fn sink_error_is_returned() {
    let (lines, _producer) = pipeline::spawn_line_producer(Cursor::new(node_output(1..4)), 8);
    let result = pipeline::decode_blocks(lines, DecoderConfig::default(), BlocksObserver::new(), |block| {
        anyhow::ensure!(block.block.number < 2, "sink is full");
        Ok(())
    })
    .await;
    assert_eq!(result.unwrap_err().to_string(), "sink is full");
}
