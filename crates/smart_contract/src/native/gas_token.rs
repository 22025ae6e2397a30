//! The GasToken native: the divisible fee currency.

use super::{arg_hash, arg_int, arg_item, NativeContract, NativeMethod};
use crate::application_engine::{ApplicationEngine, ScriptContainer};
use crate::{ContractError, ContractResult};
use neo3_core::UInt160;
use neo3_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable};
use neo3_persistence::{DataCache, StorageItem, StorageKey};
use neo3_vm::StackItem;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::cell::RefCell;
use std::rc::Rc;

/// Reserved storage id.
pub const ID: i32 = -6;

/// Token decimals.
pub const DECIMALS: u8 = 8;

pub(crate) const PREFIX_TOTAL_SUPPLY: u8 = 11;
pub(crate) const PREFIX_ACCOUNT: u8 = 20;

/// Balance record of one GAS account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasAccountState {
    /// Balance in datoshi.
    pub balance: BigInt,
}

impl Serializable for GasAccountState {
    fn size(&self) -> usize {
        let bytes = neo3_vm::stack_item::encode_integer(&self.balance);
        helper::get_var_bytes_size(&bytes)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&neo3_vm::stack_item::encode_integer(&self.balance));
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let bytes = reader.read_var_bytes(32)?;
        let balance = if bytes.is_empty() {
            BigInt::zero()
        } else {
            BigInt::from_signed_bytes_le(&bytes)
        };
        Ok(Self { balance })
    }
}

fn account_key(account: &UInt160) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_ACCOUNT).with_bytes(account.as_bytes())
}

/// GAS balance of an account, in datoshi.
pub fn balance_of(snapshot: &DataCache, account: &UInt160) -> BigInt {
    snapshot
        .try_get(&account_key(account))
        .and_then(|item| item.get_interoperable::<GasAccountState>().ok())
        .map(|state| state.balance.clone())
        .unwrap_or_else(BigInt::zero)
}

/// Total GAS supply, in datoshi.
pub fn total_supply(snapshot: &DataCache) -> BigInt {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, PREFIX_TOTAL_SUPPLY))
        .map(|item| item.as_int())
        .unwrap_or_else(BigInt::zero)
}

/// Credits freshly minted GAS to an account.
pub fn mint(
    engine: &mut ApplicationEngine,
    account: &UInt160,
    amount: &BigInt,
    with_notification: bool,
) -> ContractResult<()> {
    if amount.is_negative() {
        return Err(ContractError::invalid_argument("negative mint"));
    }
    if amount.is_zero() {
        return Ok(());
    }
    add_balance(engine.snapshot_mut(), account, amount)?;
    adjust_total_supply(engine.snapshot_mut(), amount)?;
    if with_notification {
        emit_transfer(engine, None, Some(*account), amount)?;
    }
    Ok(())
}

/// Destroys GAS held by an account.
pub fn burn(engine: &mut ApplicationEngine, account: &UInt160, amount: &BigInt) -> ContractResult<()> {
    if amount.is_negative() {
        return Err(ContractError::invalid_argument("negative burn"));
    }
    if amount.is_zero() {
        return Ok(());
    }
    let balance = balance_of(engine.snapshot(), account);
    if balance < *amount {
        return Err(ContractError::invalid_operation(format!(
            "insufficient GAS: {balance} < {amount}"
        )));
    }
    add_balance(engine.snapshot_mut(), account, &-amount)?;
    adjust_total_supply(engine.snapshot_mut(), &-amount)?;
    emit_transfer(engine, Some(*account), None, amount)?;
    Ok(())
}

fn add_balance(snapshot: &mut DataCache, account: &UInt160, delta: &BigInt) -> ContractResult<()> {
    let key = account_key(account);
    let item = snapshot.get_or_add(&key, || {
        StorageItem::new(neo3_io::SerializableExt::to_array(&GasAccountState::default()))
    })?;
    let mut state = (*item.get_interoperable::<GasAccountState>()?).clone();
    state.balance += delta;
    if state.balance.is_negative() {
        return Err(ContractError::invalid_operation("balance underflow"));
    }
    let drop_row = state.balance.is_zero();
    item.set_interoperable(state);
    if drop_row {
        snapshot.delete(&key)?;
    }
    Ok(())
}

fn adjust_total_supply(snapshot: &mut DataCache, delta: &BigInt) -> ContractResult<()> {
    let key = StorageKey::from_prefix(ID, PREFIX_TOTAL_SUPPLY);
    let item = snapshot.get_or_add(&key, || StorageItem::from_int(0))?;
    item.add_int(delta);
    Ok(())
}

fn emit_transfer(
    engine: &mut ApplicationEngine,
    from: Option<UInt160>,
    to: Option<UInt160>,
    amount: &BigInt,
) -> ContractResult<()> {
    let encode = |hash: Option<UInt160>| match hash {
        Some(hash) => StackItem::from_bytes(hash.to_vec()),
        None => StackItem::Null,
    };
    // Attribute the event to GasToken even when minting on behalf of
    // another native.
    engine.push_native_frame(super::native_hash("GasToken"), ID);
    let result = engine.notify(
        "Transfer".into(),
        StackItem::Array(Rc::new(RefCell::new(vec![
            encode(from),
            encode(to),
            StackItem::Integer(amount.clone()),
        ]))),
    );
    engine.pop_native_frame();
    result
}

fn transfer(
    engine: &mut ApplicationEngine,
    from: UInt160,
    to: UInt160,
    amount: BigInt,
    data: StackItem,
) -> ContractResult<bool> {
    if amount.is_negative() {
        return Err(ContractError::invalid_argument("negative transfer"));
    }
    if from != engine.calling_script_hash().unwrap_or_else(UInt160::zero)
        && !engine.check_witness(&from)?
    {
        return Ok(false);
    }
    if balance_of(engine.snapshot(), &from) < amount {
        return Ok(false);
    }
    if !amount.is_zero() && from != to {
        add_balance(engine.snapshot_mut(), &from, &-&amount)?;
        add_balance(engine.snapshot_mut(), &to, &amount)?;
    }
    emit_transfer(engine, Some(from), Some(to), &amount)?;

    // Contract recipients are told about the payment.
    if let Some(recipient) =
        super::contract_management::get_contract(engine.snapshot(), &to)?
    {
        engine.call_contract_hook(
            &recipient,
            "onNEP17Payment",
            vec![
                StackItem::from_bytes(from.to_vec()),
                StackItem::Integer(amount),
                data,
            ],
        )?;
    }
    Ok(true)
}

/// The GasToken native.
pub struct GasToken;

static METHODS: &[NativeMethod] = &[
    NativeMethod::pure("symbol", 0, 0),
    NativeMethod::pure("decimals", 0, 0),
    NativeMethod::safe("totalSupply", 0, 1 << 15),
    NativeMethod::safe("balanceOf", 1, 1 << 15),
    NativeMethod::unsafe_method("transfer", 4, 1 << 17),
];

impl NativeContract for GasToken {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "GasToken"
    }

    fn methods(&self) -> &[NativeMethod] {
        METHODS
    }

    fn initialize(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        // The initial distribution goes to the standby committee multisig.
        let committee = super::neo_token::committee_address(engine.snapshot())?;
        let amount = BigInt::from(engine.settings().initial_gas_distribution);
        mint(engine, &committee, &amount, false)
    }

    fn on_persist(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let Some(ScriptContainer::Block(block)) = engine.container().cloned() else {
            return Err(ContractError::invalid_operation("OnPersist without a block"));
        };
        // Fees are burned from the senders; network fees re-minted to the
        // primary keep consensus nodes paid.
        let mut total_network_fee = BigInt::zero();
        for tx in &block.transactions {
            let fees = BigInt::from(tx.system_fee) + BigInt::from(tx.network_fee);
            burn(engine, &tx.sender(), &fees)?;
            total_network_fee += BigInt::from(tx.network_fee);
        }
        if !total_network_fee.is_zero() {
            let validators = super::neo_token::next_block_validators(
                engine.snapshot(),
                engine.settings().validators_count,
            )?;
            let primary_index = block.header.primary_index as usize;
            let primary = validators.get(primary_index).ok_or_else(|| {
                ContractError::invalid_operation("primary index outside validator set")
            })?;
            let primary_account = crate::account::create_signature_contract_hash(primary);
            mint(engine, &primary_account, &total_network_fee, false)?;
        }
        Ok(())
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine,
        method: &str,
        args: Vec<StackItem>,
    ) -> ContractResult<Option<StackItem>> {
        match method {
            "symbol" => Ok(Some(StackItem::from_bytes(b"GAS".to_vec()))),
            "decimals" => Ok(Some(StackItem::from_int(DECIMALS as i64))),
            "totalSupply" => Ok(Some(StackItem::Integer(total_supply(engine.snapshot())))),
            "balanceOf" => {
                let account = arg_hash(&args, 0)?;
                Ok(Some(StackItem::Integer(balance_of(
                    engine.snapshot(),
                    &account,
                ))))
            }
            "transfer" => {
                let from = arg_hash(&args, 0)?;
                let to = arg_hash(&args, 1)?;
                let amount = arg_int(engine, &args, 2)?;
                let data = arg_item(&args, 3)?.clone();
                let result = transfer(engine, from, to, amount, data)?;
                Ok(Some(StackItem::from_bool(result)))
            }
            other => Err(ContractError::not_found(format!("GasToken::{other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neo3_io::SerializableExt;

    #[test]
    fn account_state_round_trip() {
        let state = GasAccountState {
            balance: BigInt::from(123_456_789),
        };
        let restored: GasAccountState =
            SerializableExt::from_array(&state.to_array()).unwrap();
        assert_eq!(restored, state);
    }
}
