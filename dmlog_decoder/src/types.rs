//! The block model reconstructed from the instrumentation stream.
//!
//! Every type serializes to camelCase JSON, byte strings as `0x` hex.

use std::collections::BTreeMap;

use ethereum_types::{Address, Bloom, H256, H64, U256};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A fully assembled block.
///
/// Produced by the decoder once `END_BLOCK` is seen, then normalized.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Schema version of the block, see [`crate::DecoderConfig`].
    pub ver: u32,
    pub hash: H256,
    pub number: u64,
    pub size: u64,
    pub header: BlockHeader,
    pub uncles: Vec<BlockHeader>,
    pub transaction_traces: Vec<TransactionTrace>,
    /// Balance changes observed outside of any transaction, e.g. mining
    /// rewards and withdrawals.
    pub balance_changes: Vec<BalanceChange>,
    /// Code changes observed outside of any transaction, e.g. hard fork
    /// irregular state changes.
    pub code_changes: Vec<CodeChange>,
}

/// A block header, in the shape `eth_getBlockByNumber` reports it.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub hash: H256,
    pub parent_hash: H256,
    #[serde(rename = "sha3Uncles")]
    pub uncle_hash: H256,
    #[serde(rename = "miner")]
    pub coinbase: Address,
    pub state_root: H256,
    pub transactions_root: H256,
    #[serde(rename = "receiptsRoot")]
    pub receipt_root: H256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    /// Only known for the block itself, never for its uncles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_difficulty: Option<U256>,
    #[serde(with = "crate::quantity")]
    pub number: u64,
    #[serde(with = "crate::quantity")]
    pub gas_limit: u64,
    #[serde(with = "crate::quantity")]
    pub gas_used: u64,
    #[serde(with = "crate::quantity")]
    pub timestamp: u64,
    #[serde(with = "crate::hex")]
    pub extra_data: Vec<u8>,
    pub mix_hash: H256,
    pub nonce: H64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals_root: Option<H256>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::quantity::option"
    )]
    pub blob_gas_used: Option<u64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::quantity::option"
    )]
    pub excess_blob_gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<H256>,
}

/// The execution trace of one transaction.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTrace {
    /// [`None`] only while a contract creation is in flight, the created
    /// address is filled in when the transaction ends.
    pub to: Option<Address>,
    pub nonce: u64,
    pub gas_price: Option<U256>,
    pub gas_limit: u64,
    pub value: Option<U256>,
    #[serde(with = "crate::hex")]
    pub input: Vec<u8>,
    #[serde(with = "crate::hex")]
    pub v: Vec<u8>,
    #[serde(with = "crate::hex")]
    pub r: Vec<u8>,
    #[serde(with = "crate::hex")]
    pub s: Vec<u8>,
    pub gas_used: u64,
    #[serde(rename = "type")]
    pub r#type: TransactionType,
    pub access_list: Vec<AccessTuple>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    /// Position of the transaction within its block.
    pub index: u32,
    pub hash: H256,
    pub from: Option<Address>,
    pub begin_ordinal: u64,
    pub end_ordinal: u64,
    pub status: TransactionStatus,
    pub receipt: Option<TransactionReceipt>,
    /// Ordered by [`Call::index`], the root call first.
    pub calls: Vec<Call>,
}

impl TransactionTrace {
    /// The call with index 1.
    pub fn root_call(&self) -> Option<&Call> {
        self.calls.first()
    }
}

/// EIP-2718 transaction envelope types.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    #[default]
    Legacy,
    /// EIP-2930
    AccessList,
    /// EIP-1559
    DynamicFee,
    /// EIP-4844
    Blob,
    /// EIP-7702
    SetCode,
}

impl TryFrom<u8> for TransactionType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Legacy),
            1 => Ok(Self::AccessList),
            2 => Ok(Self::DynamicFee),
            3 => Ok(Self::Blob),
            4 => Ok(Self::SetCode),
            other => Err(other),
        }
    }
}

#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Unknown,
    Succeeded,
    Failed,
    Reverted,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    #[serde(with = "crate::hex")]
    pub state_root: Vec<u8>,
    pub cumulative_gas_used: u64,
    pub logs_bloom: Bloom,
    pub logs: Vec<Log>,
}

/// EIP-2930 access list entry.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTuple {
    pub address: Address,
    pub storage_keys: Vec<H256>,
}

/// One EVM message call or contract creation frame.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// 1-based, in creation order.
    pub index: u32,
    /// 0 for the root call.
    pub parent_index: u32,
    pub depth: u32,
    pub call_type: CallType,
    pub caller: Option<Address>,
    pub address: Option<Address>,
    pub value: Option<U256>,
    pub gas_limit: u64,
    pub gas_consumed: u64,
    #[serde(with = "crate::hex")]
    pub return_data: Vec<u8>,
    #[serde(with = "crate::hex")]
    pub input: Vec<u8>,
    pub executed_code: bool,
    pub suicide: bool,
    /// `hash -> preimage`, both hex encoded.
    pub keccak_preimages: BTreeMap<String, String>,
    pub storage_changes: Vec<StorageChange>,
    pub balance_changes: Vec<BalanceChange>,
    pub nonce_changes: Vec<NonceChange>,
    pub logs: Vec<Log>,
    pub code_changes: Vec<CodeChange>,
    pub gas_changes: Vec<GasChange>,
    pub status_failed: bool,
    pub status_reverted: bool,
    pub failure_reason: String,
    /// Set when this call or any of its ancestors failed.
    pub state_reverted: bool,
    pub begin_ordinal: u64,
    pub end_ordinal: u64,
    pub account_creations: Vec<AccountCreation>,
}

#[allow(missing_docs)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    #[default]
    Call,
    #[strum(serialize = "CALLCODE")]
    #[serde(rename = "CALLCODE")]
    Callcode,
    #[strum(to_string = "DELEGATE", serialize = "DELEGATECALL")]
    Delegate,
    #[strum(to_string = "STATIC", serialize = "STATICCALL")]
    Static,
    #[strum(to_string = "CREATE", serialize = "CREATE2")]
    Create,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<H256>,
    #[serde(with = "crate::hex")]
    pub data: Vec<u8>,
    /// Position among the logs of the transaction at emission time.
    pub index: u32,
    /// Position among the logs of the block, as an RPC node reports it.
    pub block_index: u32,
    pub ordinal: u64,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageChange {
    pub address: Address,
    pub key: H256,
    pub old_value: H256,
    pub new_value: H256,
    pub ordinal: u64,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub address: Address,
    pub old_value: Option<U256>,
    pub new_value: Option<U256>,
    pub reason: BalanceChangeReason,
    pub ordinal: u64,
}

#[allow(missing_docs)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BalanceChangeReason {
    #[default]
    Unknown,
    RewardMineUncle,
    RewardMineBlock,
    DaoRefundContract,
    DaoAdjustBalance,
    Transfer,
    GenesisBalance,
    GasBuy,
    RewardTransactionFee,
    RewardFeeReset,
    GasRefund,
    TouchAccount,
    SuicideRefund,
    SuicideWithdraw,
    CallBalanceOverride,
    Burn,
    Withdrawal,
    RewardBlobFee,
    IncreaseMint,
    Revert,
}

impl BalanceChangeReason {
    /// Rewards are credited by consensus code, sometimes outside any block.
    pub fn is_reward(&self) -> bool {
        matches!(
            self,
            Self::RewardMineUncle
                | Self::RewardMineBlock
                | Self::RewardTransactionFee
                | Self::RewardFeeReset
                | Self::RewardBlobFee
        )
    }
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceChange {
    pub address: Address,
    pub old_value: u64,
    pub new_value: u64,
    pub ordinal: u64,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeChange {
    pub address: Address,
    #[serde(with = "crate::hex")]
    pub old_hash: Vec<u8>,
    #[serde(with = "crate::hex")]
    pub old_code: Vec<u8>,
    #[serde(with = "crate::hex")]
    pub new_hash: Vec<u8>,
    #[serde(with = "crate::hex")]
    pub new_code: Vec<u8>,
    pub ordinal: u64,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasChange {
    pub old_value: u64,
    pub new_value: u64,
    pub reason: GasChangeReason,
    pub ordinal: u64,
}

#[allow(missing_docs)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GasChangeReason {
    #[default]
    Unknown,
    Call,
    CallCode,
    CallDataCopy,
    CodeCopy,
    CodeStorage,
    ContractCreation,
    #[serde(rename = "contract_creation2")]
    #[strum(serialize = "contract_creation2")]
    ContractCreation2,
    DelegateCall,
    EventLog,
    ExtCodeCopy,
    FailedExecution,
    IntrinsicGas,
    PrecompiledContract,
    RefundAfterExecution,
    Return,
    ReturnDataCopy,
    Revert,
    SelfDestruct,
    StaticCall,
    StateColdAccess,
    TxInitialBalance,
    TxRefunds,
    TxLeftoverReturned,
    CallInitialBalance,
    CallLeftoverReturned,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountCreation {
    pub account: Address,
    pub ordinal: u64,
}

/// A normalized block and the last irreversible block number at the time
/// it was produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedBlock {
    #[allow(missing_docs)]
    pub block: Block,
    #[allow(missing_docs)]
    pub lib_num: u64,
}

#[test]
fn call_type_aliases() {
    use std::str::FromStr as _;
    assert_eq!(CallType::from_str("DELEGATECALL"), Ok(CallType::Delegate));
    assert_eq!(CallType::from_str("CREATE2"), Ok(CallType::Create));
    assert_eq!(CallType::from_str("CALLCODE"), Ok(CallType::Callcode));
    assert!(CallType::from_str("call").is_err());
}

#[test]
fn reason_names() {
    use std::str::FromStr as _;
    assert_eq!(
        BalanceChangeReason::from_str("reward_mine_block"),
        Ok(BalanceChangeReason::RewardMineBlock)
    );
    assert!(BalanceChangeReason::RewardMineBlock.is_reward());
    assert!(!BalanceChangeReason::GasBuy.is_reward());
    assert_eq!(
        GasChangeReason::from_str("contract_creation2"),
        Ok(GasChangeReason::ContractCreation2)
    );
    assert_eq!(
        serde_json::to_string(&GasChangeReason::TxLeftoverReturned).unwrap(),
        "\"tx_leftover_returned\""
    );
}
