//! Transaction, call and state change handlers.
//!
//! Change records carry the index of the call they happened in. Index `0`
//! means "no call", and where such a record lands depends on the tag:
//!
//! | tag                              | index 0 goes to                                   |
//! |----------------------------------|---------------------------------------------------|
//! | `GAS_CHANGE`, `NONCE_CHANGE`     | root call, dropped outside a transaction          |
//! | `BALANCE_CHANGE`, `CODE_CHANGE`  | root call, else the block, else dropped           |
//! | `CREATED_ACCOUNT`, `ADD_LOG`     | root call, error outside a transaction            |
//! | `STORAGE_CHANGE`                 | root call within a block, dropped otherwise       |
//! | `SUICIDE_CHANGE`                 | always an error                                   |
//!
//! The asymmetries mirror what instrumented nodes actually emit.

use log::{debug, warn};

use crate::{
    assembler::{Decoder, Event},
    normalize::propagate_state_reverted,
    types::{
        AccountCreation, BalanceChange, Call, CallType, CodeChange, GasChange, Log, NonceChange,
        StorageChange, TransactionReceipt, TransactionTrace, TransactionType,
    },
    wire, LineError,
};

impl Decoder {
    pub(crate) fn on_begin_transaction(&mut self, rest: &str) -> Result<(), LineError> {
        let [hash, to, value, v, r, s, gas, gas_price, nonce, input, access_list, max_fee, max_priority_fee, trx_type, begin_ordinal] =
            wire::fields(rest)?;
        if self.trace.is_some() {
            return Err(LineError::TransactionAlreadyActive);
        }
        let to = wire::opt_address("to", to)?;
        let value = wire::big_int("value", value)?;
        let gas_limit = wire::uint("gas", gas)?;
        let input = wire::hex_bytes("input", input)?;
        let begin_ordinal = wire::uint("beginOrdinal", begin_ordinal)?;
        let r#type = TransactionType::try_from(wire::uint::<u8>("trxType", trx_type)?).map_err(
            |other| LineError::UnknownVariant {
                field: "trxType",
                value: other.to_string(),
            },
        )?;

        // The root call is known upfront, a transaction without any call
        // event (e.g. a genesis dummy one) still has it.
        let root = Call {
            index: 1,
            call_type: CallType::Call,
            address: to,
            value,
            gas_limit,
            input: input.clone(),
            begin_ordinal,
            ..Default::default()
        };
        self.trace = Some(TransactionTrace {
            to,
            nonce: wire::uint("nonce", nonce)?,
            gas_price: wire::big_int("gasPrice", gas_price)?,
            gas_limit,
            value,
            input,
            v: wire::hex_bytes("v", v)?,
            r: wire::hex_bytes("r", r)?,
            s: wire::hex_bytes("s", s)?,
            r#type,
            access_list: wire::access_list("accessList", access_list)?,
            max_fee_per_gas: wire::big_int("maxFeePerGas", max_fee)?,
            max_priority_fee_per_gas: wire::big_int("maxPriorityFeePerGas", max_priority_fee)?,
            index: self.traces.len() as u32,
            hash: wire::h256("hash", hash)?,
            begin_ordinal,
            calls: vec![root],
            ..Default::default()
        });
        self.stack.clear();
        self.log_index = 0;
        Ok(())
    }

    pub(crate) fn on_transaction_from(&mut self, rest: &str) -> Result<(), LineError> {
        let [from] = wire::fields(rest)?;
        let from = wire::address("from", from)?;
        let trace = self.trace_mut()?;
        trace.from = Some(from);
        if let [root] = &mut trace.calls[..] {
            if root.caller.is_none() {
                root.caller = Some(from);
            }
        }
        Ok(())
    }

    pub(crate) fn on_end_transaction(&mut self, rest: &str) -> Result<Event, LineError> {
        let [gas_used, state_root, cumulative_gas_used, logs_bloom, end_ordinal, logs] =
            wire::bounded_fields(rest)?;
        let gas_used = wire::uint("gasUsed", gas_used)?;
        let state_root = wire::hex_bytes("stateRoot", state_root)?;
        let cumulative_gas_used = wire::uint("cumulativeGasUsed", cumulative_gas_used)?;
        let logs_bloom = wire::bloom("logsBloom", logs_bloom)?;
        let end_ordinal = wire::uint("endOrdinal", end_ordinal)?;
        let logs = wire::json::<Option<Vec<Log>>>("logs", logs)?.unwrap_or_default();

        let mut trace = self.trace.take().ok_or(LineError::NoActiveTransaction)?;
        trace.gas_used = gas_used;
        trace.end_ordinal = end_ordinal;
        trace.receipt = Some(TransactionReceipt {
            state_root,
            cumulative_gas_used,
            logs_bloom,
            logs,
        });
        // calls the node never ended are closed with the transaction
        while self.stack.peek().is_some() {
            let popped = self.stack.pop()?;
            warn!(
                "transaction {:?} ended with call #{} still open",
                trace.hash, popped.index
            );
            let call = call_at(&mut trace.calls, popped.index)?;
            call.parent_index = popped.parent_index;
            call.depth = popped.depth;
            if call.end_ordinal == 0 {
                call.end_ordinal = end_ordinal;
            }
        }
        if let Some(root) = trace.calls.first_mut() {
            if root.end_ordinal == 0 {
                root.end_ordinal = end_ordinal;
            }
        }
        if trace.to.is_none() {
            trace.to = match trace.root_call() {
                Some(root) if root.call_type == CallType::Create => root.address,
                _ => None,
            };
            if trace.to.is_none() {
                return Err(LineError::MissingCreateCall);
            }
        }
        propagate_state_reverted(&mut trace)?;
        self.traces.push(trace);
        Ok(Event::TransactionCompleted)
    }

    pub(crate) fn on_run_call(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_type, index, ordinal] = wire::fields(rest)?;
        let call_type = wire::variant::<CallType>("type", call_type)?;
        let index = wire::uint("index", index)?;
        let begin_ordinal = wire::uint("ordinal", ordinal)?;

        let trace = self.trace_mut()?;
        if index == 1 {
            let root = call_at(&mut trace.calls, 1)?;
            root.call_type = call_type;
            root.begin_ordinal = begin_ordinal;
            root.executed_code = true;
        } else {
            let expected = trace.calls.len() as u32 + 1;
            if index != expected {
                return Err(LineError::CallOutOfSequence {
                    expected,
                    found: index,
                });
            }
            trace.calls.push(Call {
                index,
                call_type,
                begin_ordinal,
                executed_code: true,
                ..Default::default()
            });
        }
        self.stack.push(index);
        Ok(())
    }

    pub(crate) fn on_call_params(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_type, index, caller, address, value, gas, input, _reserved] =
            wire::fields(rest)?;
        let call_type = wire::variant::<CallType>("type", call_type)?;
        let index = wire::uint("index", index)?;
        let caller = wire::address("caller", caller)?;
        let address = wire::address("address", address)?;
        let value = wire::big_int("value", value)?;
        let gas_limit = wire::uint("gas", gas)?;
        let input = wire::hex_bytes("input", input)?;

        let call = self.call_mut(index)?;
        call.call_type = call_type;
        call.caller = Some(caller);
        call.address = Some(address);
        call.value = value;
        call.gas_limit = gas_limit;
        call.input = input;
        Ok(())
    }

    pub(crate) fn on_end_call(&mut self, rest: &str) -> Result<(), LineError> {
        let [index, gas_left, return_data, ordinal] = wire::fields(rest)?;
        let index = wire::uint("index", index)?;
        let gas_left = wire::uint("gasLeft", gas_left)?;
        let return_data = wire::hex_bytes("returnData", return_data)?;
        let end_ordinal = wire::uint("ordinal", ordinal)?;

        let popped = self.stack.pop()?;
        if popped.index != index {
            return Err(LineError::CallStackMismatch {
                expected: popped.index,
                found: index,
            });
        }
        let call = self.call_mut(index)?;
        call.parent_index = popped.parent_index;
        call.depth = popped.depth;
        call.gas_consumed =
            call.gas_limit
                .checked_sub(gas_left)
                .ok_or(LineError::GasUnderflow {
                    index,
                    gas_limit: call.gas_limit,
                    gas_left,
                })?;
        call.return_data = return_data;
        call.end_ordinal = end_ordinal;
        Ok(())
    }

    pub(crate) fn on_call_failed(&mut self, rest: &str) -> Result<(), LineError> {
        let [index, gas_left, reason] = wire::bounded_fields(rest)?;
        let index = wire::uint("index", index)?;
        let _: u64 = wire::uint("gasLeft", gas_left)?;

        let call = self.call_mut(index)?;
        if call.status_failed {
            return Err(LineError::CallAlreadyFailed(index));
        }
        call.status_failed = true;
        call.failure_reason = reason.to_owned();
        Ok(())
    }

    pub(crate) fn on_call_reverted(&mut self, rest: &str) -> Result<(), LineError> {
        let [index] = wire::fields(rest)?;
        let index = wire::uint("index", index)?;
        self.call_mut(index)?.status_reverted = true;
        Ok(())
    }

    pub(crate) fn on_keccak(&mut self, rest: &str) -> Result<(), LineError> {
        let [index, hash, preimage] = wire::fields(rest)?;
        let index = wire::uint("index", index)?;
        let hash = hex::encode(wire::hex_bytes("hashResult", hash)?);
        let preimage = hex::encode(wire::hex_bytes("hashInput", preimage)?);
        self.root_or_call_mut(index)?
            .keccak_preimages
            .insert(hash, preimage);
        Ok(())
    }

    pub(crate) fn on_add_log(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_index, block_index, address, topics, data, ordinal] = wire::fields(rest)?;
        let call_index = wire::uint("callIndex", call_index)?;
        let log = Log {
            address: wire::address("address", address)?,
            topics: topics
                .split(',')
                .filter(|topic| !topic.is_empty() && *topic != ".")
                .map(|topic| wire::h256("topics", topic))
                .collect::<Result<_, _>>()?,
            data: wire::hex_bytes("data", data)?,
            index: self.log_index,
            block_index: wire::uint("blockIndex", block_index)?,
            ordinal: wire::uint("ordinal", ordinal)?,
        };
        self.root_or_call_mut(call_index)?.logs.push(log);
        self.log_index += 1;
        Ok(())
    }

    pub(crate) fn on_created_account(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_index, address, ordinal] = wire::fields(rest)?;
        let call_index = wire::uint("callIndex", call_index)?;
        let creation = AccountCreation {
            account: wire::address("address", address)?,
            ordinal: wire::uint("ordinal", ordinal)?,
        };
        self.root_or_call_mut(call_index)?
            .account_creations
            .push(creation);
        Ok(())
    }

    pub(crate) fn on_account_without_code(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_index] = wire::fields(rest)?;
        let call_index = wire::uint("callIndex", call_index)?;
        self.root_or_call_mut(call_index)?.executed_code = false;
        Ok(())
    }

    pub(crate) fn on_suicide(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_index] = wire::fields(rest)?;
        match wire::uint("callIndex", call_index)? {
            0 => Err(LineError::SuicideOutsideCall),
            index => {
                self.call_mut(index)?.suicide = true;
                Ok(())
            }
        }
    }

    pub(crate) fn on_gas_change(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_index, old, new, reason, ordinal] = wire::fields(rest)?;
        let call_index = wire::uint("callIndex", call_index)?;
        let change = GasChange {
            old_value: wire::uint("old", old)?,
            new_value: wire::uint("new", new)?,
            reason: wire::variant("reason", reason)?,
            ordinal: wire::uint("ordinal", ordinal)?,
        };
        match call_index {
            0 => match self.root_call_mut() {
                Some(root) => root.gas_changes.push(change),
                None => debug!("dropping gas change outside of a transaction: {change:?}"),
            },
            index => self.call_mut(index)?.gas_changes.push(change),
        }
        Ok(())
    }

    pub(crate) fn on_nonce_change(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_index, address, old, new, ordinal] = wire::fields(rest)?;
        let call_index = wire::uint("callIndex", call_index)?;
        let change = NonceChange {
            address: wire::address("address", address)?,
            old_value: wire::uint("old", old)?,
            new_value: wire::uint("new", new)?,
            ordinal: wire::uint("ordinal", ordinal)?,
        };
        match call_index {
            0 => match self.root_call_mut() {
                Some(root) => root.nonce_changes.push(change),
                None => debug!("dropping nonce change outside of a transaction: {change:?}"),
            },
            index => self.call_mut(index)?.nonce_changes.push(change),
        }
        Ok(())
    }

    pub(crate) fn on_balance_change(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_index, address, old, new, reason, ordinal] = wire::fields(rest)?;
        let call_index = wire::uint("callIndex", call_index)?;
        let change = BalanceChange {
            address: wire::address("address", address)?,
            old_value: wire::big_int("old", old)?,
            new_value: wire::big_int("new", new)?,
            reason: wire::variant("reason", reason)?,
            ordinal: wire::uint("ordinal", ordinal)?,
        };
        if call_index != 0 {
            self.call_mut(call_index)?.balance_changes.push(change);
            return Ok(());
        }
        if let Some(root) = self.root_call_mut() {
            root.balance_changes.push(change);
        } else if let Some(active) = &mut self.block {
            active.balance_changes.push(change);
        } else if change.reason.is_reward() {
            warn!("dropping {} balance change outside of a block: {change:?}", change.reason);
        } else {
            debug!("dropping balance change outside of a block: {change:?}");
        }
        Ok(())
    }

    pub(crate) fn on_code_change(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_index, address, old_hash, old_code, new_hash, new_code, ordinal] =
            wire::fields(rest)?;
        let call_index = wire::uint("callIndex", call_index)?;
        let change = CodeChange {
            address: wire::address("address", address)?,
            old_hash: wire::hex_bytes("oldHash", old_hash)?,
            old_code: wire::hex_bytes("oldCode", old_code)?,
            new_hash: wire::hex_bytes("newHash", new_hash)?,
            new_code: wire::hex_bytes("newCode", new_code)?,
            ordinal: wire::uint("ordinal", ordinal)?,
        };
        if call_index != 0 {
            self.call_mut(call_index)?.code_changes.push(change);
            return Ok(());
        }
        if let Some(root) = self.root_call_mut() {
            root.code_changes.push(change);
        } else if let Some(active) = &mut self.block {
            active.code_changes.push(change);
        } else {
            debug!("dropping code change outside of a block: {change:?}");
        }
        Ok(())
    }

    pub(crate) fn on_storage_change(&mut self, rest: &str) -> Result<(), LineError> {
        let [call_index, address, key, old, new, ordinal] = wire::fields(rest)?;
        let call_index = wire::uint("callIndex", call_index)?;
        let change = StorageChange {
            address: wire::address("address", address)?,
            key: wire::h256("key", key)?,
            old_value: wire::h256("old", old)?,
            new_value: wire::h256("new", new)?,
            ordinal: wire::uint("ordinal", ordinal)?,
        };
        if call_index == 0 && (self.block.is_none() || self.trace.is_none()) {
            debug!("dropping storage change outside of a block transaction: {change:?}");
            return Ok(());
        }
        self.root_or_call_mut(call_index)?
            .storage_changes
            .push(change);
        Ok(())
    }

    fn trace_mut(&mut self) -> Result<&mut TransactionTrace, LineError> {
        self.trace.as_mut().ok_or(LineError::NoActiveTransaction)
    }

    fn root_call_mut(&mut self) -> Option<&mut Call> {
        self.trace.as_mut().and_then(|trace| trace.calls.first_mut())
    }

    fn call_mut(&mut self, index: u32) -> Result<&mut Call, LineError> {
        call_at(&mut self.trace_mut()?.calls, index)
    }

    /// Index 0 resolves to the root call.
    fn root_or_call_mut(&mut self, index: u32) -> Result<&mut Call, LineError> {
        match index {
            0 => self.root_call_mut().ok_or(LineError::NoActiveTransaction),
            index => self.call_mut(index),
        }
    }
}

fn call_at(calls: &mut [Call], index: u32) -> Result<&mut Call, LineError> {
    index
        .checked_sub(1)
        .and_then(|position| calls.get_mut(position as usize))
        .filter(|call| call.index == index)
        .ok_or(LineError::UnknownCall(index))
}
