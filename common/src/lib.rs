use ethereum_types::{Address, Bloom, H160, H256};
use hex_literal::hex;
use keccak_hash::keccak;

/// Sender of the Bor system transactions (state syncs and span commits).
/// 0xfffffffffffffffffffffffffffffffffffffffe
pub const POLYGON_SYSTEM_ADDRESS: Address = H160(hex!("fffffffffffffffffffffffffffffffffffffffe"));

/// Bor `StateReceiver` contract, target of the state-sync transactions that
/// get combined into a single synthetic transaction per block.
pub const POLYGON_STATE_RECEIVER_ADDRESS: Address =
    H160(hex!("0000000000000000000000000000000000001001"));

/// Bor `ValidatorSet` contract. System transactions to it are kept separate
/// and moved after all the other transactions of the block.
pub const POLYGON_VALIDATOR_SET_ADDRESS: Address =
    H160(hex!("0000000000000000000000000000000000001000"));

/// The MRC20 native token contract, emitter of the `LogFeeTransfer` event.
pub const POLYGON_FEE_LOG_ADDRESS: Address = H160(hex!("0000000000000000000000000000000000001010"));

/// `keccak256("LogFeeTransfer(address,address,address,uint256,uint256,uint256,uint256,uint256)")`
pub const POLYGON_FEE_LOG_TOPIC: H256 = H256(hex!(
    "4dfe1bbbcf077ddc3e01291eea2d5c70c2b422b415d95645b9adcfd678cb1d63"
));

/// Prefix of the preimage hashed into the synthetic state-sync transaction
/// hash.
pub const POLYGON_SYSTEM_RECEIPT_PREFIX: &[u8] = b"matic-bor-receipt-";

#[macro_export]
/// A convenience macro to check the feature flags activating chain specific
/// behaviors. Only one of these flags may be activated at a time.
macro_rules! check_chain_features {
    () => {
        #[cfg(any(
            all(feature = "eth_mainnet", feature = "polygon_pos"),
            not(any(feature = "eth_mainnet", feature = "polygon_pos"))
        ))]
        compile_error!("One and only one of the feature chains `eth_mainnet` or `polygon_pos` must be selected");
    };
}

/// Computes the 2048-bit logs bloom of `(address, topics)` pairs, the way an
/// Ethereum node fills a receipt's `logsBloom`.
pub fn logs_bloom<'a, LogsT, TopicsT>(logs: LogsT) -> Bloom
where
    LogsT: IntoIterator<Item = (&'a Address, TopicsT)>,
    TopicsT: IntoIterator<Item = &'a H256>,
{
    let mut bloom = Bloom::zero();
    for (address, topics) in logs {
        accrue(&mut bloom, address.as_bytes());
        for topic in topics {
            accrue(&mut bloom, topic.as_bytes());
        }
    }
    bloom
}

fn accrue(bloom: &mut Bloom, input: &[u8]) {
    let hash = keccak(input).0;
    for offset in [0, 2, 4] {
        // 11-bit window selects one of the 2048 bits
        let window = u16::from_be_bytes([hash[offset], hash[offset + 1]]) & 0x7ff;
        bloom.0[255 - usize::from(window >> 3)] |= 1 << (hash[offset + 1] & 0x7);
    }
}

/// Hash of the synthetic transaction standing in for all the state-sync
/// transactions of a block.
pub fn derived_system_tx_hash(block_number: u64, block_hash: &H256) -> H256 {
    let mut preimage = Vec::with_capacity(POLYGON_SYSTEM_RECEIPT_PREFIX.len() + 8 + 32);
    preimage.extend_from_slice(POLYGON_SYSTEM_RECEIPT_PREFIX);
    preimage.extend_from_slice(&block_number.to_be_bytes());
    preimage.extend_from_slice(block_hash.as_bytes());
    keccak(preimage)
}

#[cfg(test)]
fn bloom_fixture() -> Vec<(Address, Vec<H256>)> {
    let address = |s: &str| Address::from_slice(&hex::decode(s).unwrap());
    let topic = |s: &str| H256::from_slice(&hex::decode(s).unwrap());
    let transfer = topic("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");
    let approval = topic("8c5be1e5ebec7d5bd14f71427d1e84f3dd0314c0f7b2291e5b200ac8c7c3b925");
    let holder = topic("000000000000000000000000ab5801a7d398351b8be11c439e05c5b3259aec9b");
    let spender = topic("0000000000000000000000007a250d5630b4cf539739df2c5dacb4c659f2488d");
    vec![
        (
            address("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
            vec![transfer, holder, spender],
        ),
        (
            address("dac17f958d2ee523a2206206994597c13d831ec7"),
            vec![approval, holder, spender],
        ),
        (address("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"), vec![]),
        (
            address("6b175474e89094c44da98b954eedeac495271d0f"),
            vec![transfer],
        ),
        (
            address("1f9840a85d5af5bf1d1762f925bdaddc4201f984"),
            vec![transfer, spender, holder],
        ),
        (
            address("7a250d5630b4cf539739df2c5dacb4c659f2488d"),
            vec![approval],
        ),
        (
            address("ab5801a7d398351b8be11c439e05c5b3259aec9b"),
            vec![holder, holder],
        ),
        (
            address("0000000000000000000000000000000000001010"),
            vec![POLYGON_FEE_LOG_TOPIC, holder],
        ),
        (
            address("514910771af9ca656af840dff83e8264ecf986ca"),
            vec![transfer, holder, spender],
        ),
        (
            address("95ad61b0a150d79219dcf64e1e6cc01f0b64c4ce"),
            vec![approval, spender],
        ),
        (address("0000000000000000000000000000000000000000"), vec![]),
    ]
}

#[test]
fn test_logs_bloom_matches_reference() {
    let fixture = bloom_fixture();
    assert_eq!(fixture.len(), 11);

    let mut expected = Bloom::zero();
    for (address, topics) in &fixture {
        expected.accrue(ethereum_types::BloomInput::Raw(address.as_bytes()));
        for topic in topics {
            expected.accrue(ethereum_types::BloomInput::Raw(topic.as_bytes()));
        }
    }

    let actual = logs_bloom(fixture.iter().map(|(address, topics)| (address, topics)));
    assert_eq!(hex::encode(expected.0), hex::encode(actual.0));
    assert_eq!(actual, Bloom(FIXTURE_BLOOM));
}

#[cfg(test)]
const FIXTURE_BLOOM: [u8; 256] = hex!(
    "0000010000000000008000000000100000000000000000000001002000000000"
    "0000000000000000000000000000011202000000080004000000000000200000"
    "0000000000000000480000081000008000000000000000000001000000000000"
    "1800000000000000000000000000000000000000001000008000001000000000"
    "0000000020000000004000000100000500000000010000000000000000108000"
    "2200000000002000000000800000000000000004000000000000000000000000"
    "0000200200000040000100000000000400000200000000000000000000002000"
    "0010200000000000000000000000000000000000000000000000000000100000"
);

#[test]
fn test_logs_bloom_empty() {
    assert_eq!(logs_bloom(std::iter::empty::<(&Address, Vec<&H256>)>()), Bloom::zero());
}

#[test]
fn test_logs_bloom_sets_at_most_three_bits_per_entry() {
    let address = POLYGON_FEE_LOG_ADDRESS;
    let bloom = logs_bloom([(&address, Vec::<&H256>::new())]);
    let bits = bloom.0.iter().map(|byte| byte.count_ones()).sum::<u32>();
    assert!((1..=3).contains(&bits));
    assert!(bloom.contains_input(ethereum_types::BloomInput::Raw(address.as_bytes())));
}

#[test]
fn test_derived_system_tx_hash() {
    let block_hash = H256::repeat_byte(0xab);
    let mut preimage = b"matic-bor-receipt-".to_vec();
    preimage.extend_from_slice(&[0, 0, 0, 0, 0, 0x01, 0xe2, 0x40]);
    preimage.extend_from_slice(&[0xab; 32]);
    assert_eq!(derived_system_tx_hash(123_456, &block_hash), keccak(preimage));
    assert_ne!(
        derived_system_tx_hash(123_456, &block_hash),
        derived_system_tx_hash(123_457, &block_hash)
    );
}

#[test]
fn test_fee_log_topic() {
    assert_eq!(
        POLYGON_FEE_LOG_TOPIC,
        keccak(b"LogFeeTransfer(address,address,address,uint256,uint256,uint256,uint256,uint256)")
    );
}
