//! The NeoToken native: the indivisible governance token, candidate voting
//! and committee computation.

use super::{arg_hash, arg_int, check_committee, NativeContract, NativeMethod};
use crate::application_engine::{ApplicationEngine, ScriptContainer};
use crate::{ContractError, ContractResult};
use neo3_config::{GAS_FACTOR, NEO_TOTAL_SUPPLY};
use neo3_core::UInt160;
use neo3_cryptography::ECPoint;
use neo3_io::{helper, BinaryWriter, IoResult, MemoryReader, Serializable, SerializableExt};
use neo3_persistence::{DataCache, SeekDirection, StorageItem, StorageKey};
use neo3_vm::StackItem;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::cell::RefCell;
use std::rc::Rc;

/// Reserved storage id.
pub const ID: i32 = -5;

const PREFIX_VOTERS_COUNT: u8 = 1;
const PREFIX_TOTAL_SUPPLY: u8 = 11;
const PREFIX_REGISTER_PRICE: u8 = 13;
const PREFIX_COMMITTEE: u8 = 14;
const PREFIX_ACCOUNT: u8 = 20;
const PREFIX_GAS_PER_BLOCK: u8 = 29;
const PREFIX_CANDIDATE: u8 = 33;

/// Share of each block's GAS that accrues to NEO holders, in percent.
const NEO_HOLDER_REWARD_RATIO: i64 = 10;
/// Share paid to the committee member of the block, in percent.
const COMMITTEE_REWARD_RATIO: i64 = 10;

const DEFAULT_GAS_PER_BLOCK: i64 = 5 * GAS_FACTOR;
const DEFAULT_REGISTER_PRICE: i64 = 1000 * GAS_FACTOR;

// ---- storage records ----

/// Balance record of one NEO account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NeoAccountState {
    /// Whole-token balance.
    pub balance: BigInt,
    /// Height at which holder GAS was last settled into GasToken.
    pub balance_height: u32,
    /// The candidate this account votes for, if any.
    pub vote_to: Option<ECPoint>,
}

impl Serializable for NeoAccountState {
    fn size(&self) -> usize {
        let balance = neo3_vm::stack_item::encode_integer(&self.balance);
        helper::get_var_bytes_size(&balance)
            + 4
            + 1
            + self
                .vote_to
                .map(|_| neo3_cryptography::EC_POINT_SIZE)
                .unwrap_or(0)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_bytes(&neo3_vm::stack_item::encode_integer(&self.balance));
        writer.write_u32(self.balance_height);
        match &self.vote_to {
            Some(candidate) => {
                writer.write_bool(true);
                writer.write_bytes(candidate.as_bytes());
            }
            None => writer.write_bool(false),
        }
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let balance_bytes = reader.read_var_bytes(32)?;
        let balance = if balance_bytes.is_empty() {
            BigInt::zero()
        } else {
            BigInt::from_signed_bytes_le(&balance_bytes)
        };
        let balance_height = reader.read_u32()?;
        let vote_to = if reader.read_bool()? {
            let bytes = reader.read_bytes(neo3_cryptography::EC_POINT_SIZE)?;
            Some(
                ECPoint::from_bytes(&bytes).map_err(|e| neo3_io::IoError::InvalidFormat {
                    context: "neo-account",
                    reason: e.to_string(),
                })?,
            )
        } else {
            None
        };
        Ok(Self {
            balance,
            balance_height,
            vote_to,
        })
    }
}

/// Registration and vote tally of one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateState {
    /// Whether the candidate is currently registered.
    pub registered: bool,
    /// Total NEO voted to this candidate.
    pub votes: BigInt,
}

impl Serializable for CandidateState {
    fn size(&self) -> usize {
        let votes = neo3_vm::stack_item::encode_integer(&self.votes);
        1 + helper::get_var_bytes_size(&votes)
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_bool(self.registered);
        writer.write_var_bytes(&neo3_vm::stack_item::encode_integer(&self.votes));
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let registered = reader.read_bool()?;
        let bytes = reader.read_var_bytes(32)?;
        let votes = if bytes.is_empty() {
            BigInt::zero()
        } else {
            BigInt::from_signed_bytes_le(&bytes)
        };
        Ok(Self { registered, votes })
    }
}

/// The cached committee: members with the votes that elected them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedCommittee(pub Vec<(ECPoint, BigInt)>);

impl Serializable for CachedCommittee {
    fn size(&self) -> usize {
        helper::get_var_size(self.0.len() as u64)
            + self
                .0
                .iter()
                .map(|(_, votes)| {
                    neo3_cryptography::EC_POINT_SIZE
                        + helper::get_var_bytes_size(&neo3_vm::stack_item::encode_integer(votes))
                })
                .sum::<usize>()
    }

    fn serialize(&self, writer: &mut BinaryWriter) {
        writer.write_var_int(self.0.len() as u64);
        for (member, votes) in &self.0 {
            writer.write_bytes(member.as_bytes());
            writer.write_var_bytes(&neo3_vm::stack_item::encode_integer(votes));
        }
    }

    fn deserialize(reader: &mut MemoryReader<'_>) -> IoResult<Self> {
        let count = reader.read_var_int(1024)? as usize;
        let mut members = Vec::with_capacity(count);
        for _ in 0..count {
            let bytes = reader.read_bytes(neo3_cryptography::EC_POINT_SIZE)?;
            let member =
                ECPoint::from_bytes(&bytes).map_err(|e| neo3_io::IoError::InvalidFormat {
                    context: "committee",
                    reason: e.to_string(),
                })?;
            let votes_bytes = reader.read_var_bytes(32)?;
            let votes = if votes_bytes.is_empty() {
                BigInt::zero()
            } else {
                BigInt::from_signed_bytes_le(&votes_bytes)
            };
            members.push((member, votes));
        }
        Ok(Self(members))
    }
}

// ---- storage keys ----

fn account_key(account: &UInt160) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_ACCOUNT).with_bytes(account.as_bytes())
}

fn candidate_key(candidate: &ECPoint) -> StorageKey {
    StorageKey::from_prefix(ID, PREFIX_CANDIDATE).with_bytes(candidate.as_bytes())
}

// ---- read helpers used across the core ----

/// NEO balance of an account.
pub fn balance_of(snapshot: &DataCache, account: &UInt160) -> BigInt {
    snapshot
        .try_get(&account_key(account))
        .and_then(|item| item.get_interoperable::<NeoAccountState>().ok())
        .map(|state| state.balance.clone())
        .unwrap_or_else(BigInt::zero)
}

/// The cached committee, falling back to the standby committee at genesis.
pub fn committee(snapshot: &DataCache) -> ContractResult<Vec<ECPoint>> {
    let cached = snapshot
        .try_get(&StorageKey::from_prefix(ID, PREFIX_COMMITTEE))
        .map(|item| SerializableExt::from_array(item.value()))
        .transpose()?
        .unwrap_or_default();
    let CachedCommittee(members) = cached;
    Ok(members.into_iter().map(|(member, _)| member).collect())
}

/// The committee multisig address (majority threshold).
pub fn committee_address(snapshot: &DataCache) -> ContractResult<UInt160> {
    let members = committee(snapshot)?;
    if members.is_empty() {
        return Err(ContractError::invalid_operation("committee not initialized"));
    }
    let m = members.len() - (members.len() - 1) / 2;
    crate::account::create_multisig_contract_hash(m, &members)
}

/// The validators that will sign the next block: the top of the committee,
/// sorted into canonical key order.
pub fn next_block_validators(
    snapshot: &DataCache,
    validators_count: usize,
) -> ContractResult<Vec<ECPoint>> {
    let members = committee(snapshot)?;
    let mut validators: Vec<ECPoint> =
        members.into_iter().take(validators_count).collect();
    validators.sort();
    Ok(validators)
}

/// The multisig address the next block's `next_consensus` must match.
pub fn next_consensus_address(
    snapshot: &DataCache,
    validators_count: usize,
) -> ContractResult<UInt160> {
    let validators = next_block_validators(snapshot, validators_count)?;
    if validators.is_empty() {
        return Err(ContractError::invalid_operation("no validators"));
    }
    let m = validators.len() - (validators.len() - 1) / 3;
    crate::account::create_multisig_contract_hash(m, &validators)
}

/// The gas-per-block schedule: (activation height, rate) in ascending order.
fn gas_per_block_records(snapshot: &DataCache) -> Vec<(u32, i64)> {
    let prefix = StorageKey::from_prefix(ID, PREFIX_GAS_PER_BLOCK).to_array();
    snapshot
        .find(&prefix, SeekDirection::Forward)
        .into_iter()
        .filter_map(|(key, item)| {
            if key.key.len() != 5 {
                return None;
            }
            let mut height_bytes = [0u8; 4];
            height_bytes.copy_from_slice(&key.key[1..]);
            Some((
                u32::from_be_bytes(height_bytes),
                item.as_int().to_i64().unwrap_or(DEFAULT_GAS_PER_BLOCK),
            ))
        })
        .collect()
}

/// GAS generated per block at the given height: the last schedule entry at
/// or below it.
pub fn gas_per_block_at(snapshot: &DataCache, index: u32) -> i64 {
    let mut rate = DEFAULT_GAS_PER_BLOCK;
    for (height, value) in gas_per_block_records(snapshot) {
        if height > index {
            break;
        }
        rate = value;
    }
    rate
}

fn register_price(snapshot: &DataCache) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, PREFIX_REGISTER_PRICE))
        .map(|item| item.as_int().to_i64().unwrap_or(DEFAULT_REGISTER_PRICE))
        .unwrap_or(DEFAULT_REGISTER_PRICE)
}

/// Holder GAS accrued by `balance` NEO over the heights
/// `[from_height, to_height)`, walking the rate schedule segment-wise.
fn holder_bonus(snapshot: &DataCache, balance: &BigInt, from_height: u32, to_height: u32) -> BigInt {
    if balance.is_zero() || from_height >= to_height {
        return BigInt::zero();
    }
    let records = gas_per_block_records(snapshot);
    let mut total = BigInt::zero();
    let mut rate = DEFAULT_GAS_PER_BLOCK;
    let mut cursor = from_height;
    for (height, value) in records {
        if height >= to_height {
            break;
        }
        if height > cursor {
            total += BigInt::from(rate) * (height - cursor);
            cursor = height;
        }
        rate = value;
    }
    total += BigInt::from(rate) * (to_height - cursor);
    balance * total * NEO_HOLDER_REWARD_RATIO / 100 / NEO_TOTAL_SUPPLY
}

fn settle_holder_gas(
    engine: &mut ApplicationEngine,
    account: &UInt160,
    state: &mut NeoAccountState,
) -> ContractResult<()> {
    let current_height = engine
        .persisting_block()
        .map(|block| block.header.index)
        .unwrap_or(0);
    let bonus = holder_bonus(
        engine.snapshot(),
        &state.balance,
        state.balance_height,
        current_height,
    );
    state.balance_height = current_height;
    if !bonus.is_zero() {
        super::gas_token::mint(engine, account, &bonus, true)?;
    }
    Ok(())
}

fn save_account(
    snapshot: &mut DataCache,
    account: &UInt160,
    state: &NeoAccountState,
) -> ContractResult<()> {
    let key = account_key(account);
    if state.balance.is_zero() && state.vote_to.is_none() {
        snapshot.delete(&key)?;
    } else {
        snapshot.put(key, StorageItem::new(state.to_array()))?;
    }
    Ok(())
}

fn load_account(snapshot: &DataCache, account: &UInt160) -> ContractResult<Option<NeoAccountState>> {
    match snapshot.try_get(&account_key(account)) {
        Some(item) => Ok(Some((*item.get_interoperable::<NeoAccountState>()?).clone())),
        None => Ok(None),
    }
}

fn adjust_candidate_votes(
    snapshot: &mut DataCache,
    candidate: &ECPoint,
    delta: &BigInt,
) -> ContractResult<()> {
    let key = candidate_key(candidate);
    let Some(item) = snapshot.get_and_change(&key)? else {
        return Err(ContractError::not_found("candidate"));
    };
    let mut state = (*item.get_interoperable::<CandidateState>()?).clone();
    state.votes += delta;
    if state.votes.is_negative() {
        return Err(ContractError::invalid_operation("candidate votes underflow"));
    }
    let remove = !state.registered && state.votes.is_zero();
    item.set_interoperable(state);
    if remove {
        snapshot.delete(&key)?;
    }
    Ok(())
}

fn adjust_voters_count(snapshot: &mut DataCache, delta: &BigInt) -> ContractResult<()> {
    let key = StorageKey::from_prefix(ID, PREFIX_VOTERS_COUNT);
    let item = snapshot.get_or_add(&key, || StorageItem::from_int(0))?;
    item.add_int(delta);
    Ok(())
}

/// All registered candidates with their votes, sorted for election:
/// descending votes, ascending key.
fn candidates(snapshot: &DataCache) -> ContractResult<Vec<(ECPoint, BigInt)>> {
    let prefix = StorageKey::from_prefix(ID, PREFIX_CANDIDATE).to_array();
    let mut result = Vec::new();
    for (key, item) in snapshot.find(&prefix, SeekDirection::Forward) {
        if key.key.len() != 1 + neo3_cryptography::EC_POINT_SIZE {
            continue;
        }
        let candidate = ECPoint::from_bytes(&key.key[1..])?;
        let state: CandidateState = SerializableExt::from_array(item.value())?;
        if state.registered {
            result.push((candidate, state.votes));
        }
    }
    result.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(result)
}

fn compute_committee(
    engine: &ApplicationEngine,
) -> ContractResult<CachedCommittee> {
    let committee_size = engine.settings().committee_members_count;
    let mut elected = candidates(engine.snapshot())?;
    elected.truncate(committee_size);

    if elected.len() < committee_size {
        // Not enough live candidates: the standby committee fills the gap.
        for hex in &engine.settings().standby_committee {
            if elected.len() >= committee_size {
                break;
            }
            let standby = ECPoint::from_hex(hex)?;
            if !elected.iter().any(|(member, _)| *member == standby) {
                elected.push((standby, BigInt::zero()));
            }
        }
    }
    Ok(CachedCommittee(elected))
}

fn should_refresh_committee(index: u32, committee_size: usize) -> bool {
    committee_size > 0 && index as usize % committee_size == 0
}

// ---- the native itself ----

/// The NeoToken native.
pub struct NeoToken;

static METHODS: &[NativeMethod] = &[
    NativeMethod::pure("symbol", 0, 0),
    NativeMethod::pure("decimals", 0, 0),
    NativeMethod::safe("totalSupply", 0, 1 << 15),
    NativeMethod::safe("balanceOf", 1, 1 << 15),
    NativeMethod::safe("unclaimedGas", 2, 1 << 17),
    NativeMethod::safe("getCandidates", 0, 1 << 22),
    NativeMethod::safe("getCommittee", 0, 1 << 16),
    NativeMethod::safe("getNextBlockValidators", 0, 1 << 16),
    NativeMethod::safe("getGasPerBlock", 0, 1 << 15),
    NativeMethod::safe("getRegisterPrice", 0, 1 << 15),
    NativeMethod::safe("getAccountState", 1, 1 << 15),
    NativeMethod::unsafe_method("transfer", 4, 1 << 17),
    NativeMethod::unsafe_method("registerCandidate", 1, 0),
    NativeMethod::unsafe_method("unregisterCandidate", 1, 1 << 16),
    NativeMethod::unsafe_method("vote", 2, 1 << 16),
    NativeMethod::unsafe_method("setGasPerBlock", 1, 1 << 15),
    NativeMethod::unsafe_method("setRegisterPrice", 1, 1 << 15),
];

impl NeoToken {
    fn transfer(
        &self,
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

        let Some(mut from_state) = load_account(engine.snapshot(), &from)? else {
            return Ok(amount.is_zero());
        };
        if from_state.balance < amount {
            return Ok(false);
        }

        if !amount.is_zero() && from != to {
            // Settle accrued holder GAS on both sides before moving balance.
            settle_holder_gas(engine, &from, &mut from_state)?;
            if let Some(candidate) = from_state.vote_to {
                adjust_candidate_votes(engine.snapshot_mut(), &candidate, &-&amount)?;
                adjust_voters_count(engine.snapshot_mut(), &-&amount)?;
            }
            from_state.balance -= &amount;
            save_account(engine.snapshot_mut(), &from, &from_state)?;

            let mut to_state =
                load_account(engine.snapshot(), &to)?.unwrap_or_default();
            settle_holder_gas(engine, &to, &mut to_state)?;
            if let Some(candidate) = to_state.vote_to {
                adjust_candidate_votes(engine.snapshot_mut(), &candidate, &amount)?;
                adjust_voters_count(engine.snapshot_mut(), &amount)?;
            }
            to_state.balance += &amount;
            save_account(engine.snapshot_mut(), &to, &to_state)?;
        }

        let encode = |hash: UInt160| StackItem::from_bytes(hash.to_vec());
        engine.notify(
            "Transfer".into(),
            StackItem::Array(Rc::new(RefCell::new(vec![
                encode(from),
                encode(to),
                StackItem::Integer(amount.clone()),
            ]))),
        )?;

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

    fn register_candidate(
        &self,
        engine: &mut ApplicationEngine,
        candidate: ECPoint,
    ) -> ContractResult<bool> {
        let account = crate::account::create_signature_contract_hash(&candidate);
        if !engine.check_witness(&account)? {
            return Ok(false);
        }
        // The registration fee is burned by charging it to the execution.
        engine.add_fee(register_price(engine.snapshot()))?;

        let key = candidate_key(&candidate);
        let item = engine
            .snapshot_mut()
            .get_or_add(&key, || {
                StorageItem::new(CandidateState::default().to_array())
            })?;
        let mut state = (*item.get_interoperable::<CandidateState>()?).clone();
        state.registered = true;
        item.set_interoperable(state);

        engine.notify(
            "CandidateStateChanged".into(),
            StackItem::Array(Rc::new(RefCell::new(vec![
                StackItem::from_bytes(candidate.to_vec()),
                StackItem::from_bool(true),
            ]))),
        )?;
        Ok(true)
    }

    fn unregister_candidate(
        &self,
        engine: &mut ApplicationEngine,
        candidate: ECPoint,
    ) -> ContractResult<bool> {
        let account = crate::account::create_signature_contract_hash(&candidate);
        if !engine.check_witness(&account)? {
            return Ok(false);
        }
        let key = candidate_key(&candidate);
        let Some(item) = engine.snapshot_mut().get_and_change(&key)? else {
            return Ok(true);
        };
        let mut state = (*item.get_interoperable::<CandidateState>()?).clone();
        state.registered = false;
        let remove = state.votes.is_zero();
        item.set_interoperable(state);
        if remove {
            engine.snapshot_mut().delete(&key)?;
        }

        engine.notify(
            "CandidateStateChanged".into(),
            StackItem::Array(Rc::new(RefCell::new(vec![
                StackItem::from_bytes(candidate.to_vec()),
                StackItem::from_bool(false),
            ]))),
        )?;
        Ok(true)
    }

    fn vote(
        &self,
        engine: &mut ApplicationEngine,
        account: UInt160,
        candidate: Option<ECPoint>,
    ) -> ContractResult<bool> {
        if !engine.check_witness(&account)? {
            return Ok(false);
        }
        let Some(mut state) = load_account(engine.snapshot(), &account)? else {
            return Ok(false);
        };

        // A vote for an unregistered candidate is rejected up front.
        if let Some(candidate) = &candidate {
            let registered = engine
                .snapshot()
                .try_get(&candidate_key(candidate))
                .and_then(|item| item.get_interoperable::<CandidateState>().ok())
                .map(|c| c.registered)
                .unwrap_or(false);
            if !registered {
                return Ok(false);
            }
        }

        settle_holder_gas(engine, &account, &mut state)?;

        // Voters count moves by the balance when the account enters or
        // leaves the voting set.
        let voters_delta = match (&state.vote_to, &candidate) {
            (None, Some(_)) => state.balance.clone(),
            (Some(_), None) => -state.balance.clone(),
            _ => BigInt::zero(),
        };
        if !voters_delta.is_zero() {
            adjust_voters_count(engine.snapshot_mut(), &voters_delta)?;
        }

        if let Some(previous) = state.vote_to {
            adjust_candidate_votes(engine.snapshot_mut(), &previous, &-&state.balance)?;
        }
        if let Some(next) = &candidate {
            adjust_candidate_votes(engine.snapshot_mut(), next, &state.balance)?;
        }

        let old_vote = state.vote_to;
        state.vote_to = candidate;
        save_account(engine.snapshot_mut(), &account, &state)?;

        let encode_vote = |vote: &Option<ECPoint>| match vote {
            Some(candidate) => StackItem::from_bytes(candidate.to_vec()),
            None => StackItem::Null,
        };
        engine.notify(
            "Vote".into(),
            StackItem::Array(Rc::new(RefCell::new(vec![
                StackItem::from_bytes(account.to_vec()),
                encode_vote(&old_vote),
                encode_vote(&state.vote_to),
                StackItem::Integer(state.balance),
            ]))),
        )?;
        Ok(true)
    }
}

impl NativeContract for NeoToken {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "NeoToken"
    }

    fn methods(&self) -> &[NativeMethod] {
        METHODS
    }

    fn initialize(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        // Standby committee with zero votes.
        let mut members = Vec::new();
        for hex in &engine.settings().standby_committee {
            members.push((ECPoint::from_hex(hex)?, BigInt::zero()));
        }
        let committee = CachedCommittee(members);
        engine.snapshot_mut().put(
            StorageKey::from_prefix(ID, PREFIX_COMMITTEE),
            StorageItem::new(committee.to_array()),
        )?;
        engine.snapshot_mut().put(
            StorageKey::from_prefix(ID, PREFIX_VOTERS_COUNT),
            StorageItem::from_int(0),
        )?;
        engine.snapshot_mut().put(
            StorageKey::from_prefix(ID, PREFIX_GAS_PER_BLOCK).with_u32_be(0),
            StorageItem::from_int(DEFAULT_GAS_PER_BLOCK),
        )?;
        engine.snapshot_mut().put(
            StorageKey::from_prefix(ID, PREFIX_REGISTER_PRICE),
            StorageItem::from_int(DEFAULT_REGISTER_PRICE),
        )?;

        // The whole supply starts in the committee's hands.
        engine.snapshot_mut().put(
            StorageKey::from_prefix(ID, PREFIX_TOTAL_SUPPLY),
            StorageItem::from_int(NEO_TOTAL_SUPPLY),
        )?;
        let committee_account = committee_address(engine.snapshot())?;
        let genesis_state = NeoAccountState {
            balance: BigInt::from(NEO_TOTAL_SUPPLY),
            balance_height: 0,
            vote_to: None,
        };
        save_account(engine.snapshot_mut(), &committee_account, &genesis_state)?;
        Ok(())
    }

    fn on_persist(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let Some(ScriptContainer::Block(block)) = engine.container().cloned() else {
            return Err(ContractError::invalid_operation("OnPersist without a block"));
        };
        let committee_size = engine.settings().committee_members_count;
        if should_refresh_committee(block.header.index, committee_size) {
            let refreshed = compute_committee(engine)?;
            engine.snapshot_mut().put(
                StorageKey::from_prefix(ID, PREFIX_COMMITTEE),
                StorageItem::new(refreshed.to_array()),
            )?;
        }
        Ok(())
    }

    fn post_persist(&self, engine: &mut ApplicationEngine) -> ContractResult<()> {
        let Some(ScriptContainer::Block(block)) = engine.container().cloned() else {
            return Err(ContractError::invalid_operation(
                "PostPersist without a block",
            ));
        };
        // The committee member of this block collects the committee share.
        let members = committee(engine.snapshot())?;
        if members.is_empty() {
            return Ok(());
        }
        let index = block.header.index as usize % members.len();
        let member_account =
            crate::account::create_signature_contract_hash(&members[index]);
        let reward = BigInt::from(gas_per_block_at(engine.snapshot(), block.header.index))
            * COMMITTEE_REWARD_RATIO
            / 100;
        if !reward.is_zero() {
            super::gas_token::mint(engine, &member_account, &reward, false)?;
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
            "symbol" => Ok(Some(StackItem::from_bytes(b"NEO".to_vec()))),
            "decimals" => Ok(Some(StackItem::from_int(0))),
            "totalSupply" => Ok(Some(StackItem::from_int(NEO_TOTAL_SUPPLY))),
            "balanceOf" => {
                let account = arg_hash(&args, 0)?;
                Ok(Some(StackItem::Integer(balance_of(
                    engine.snapshot(),
                    &account,
                ))))
            }
            "unclaimedGas" => {
                let account = arg_hash(&args, 0)?;
                let end: u32 = arg_int(engine, &args, 1)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("height"))?;
                let bonus = match load_account(engine.snapshot(), &account)? {
                    Some(state) => holder_bonus(
                        engine.snapshot(),
                        &state.balance,
                        state.balance_height,
                        end,
                    ),
                    None => BigInt::zero(),
                };
                Ok(Some(StackItem::Integer(bonus)))
            }
            "getCandidates" => {
                let list = candidates(engine.snapshot())?;
                let items: Vec<StackItem> = list
                    .into_iter()
                    .map(|(candidate, votes)| {
                        StackItem::Struct(Rc::new(RefCell::new(vec![
                            StackItem::from_bytes(candidate.to_vec()),
                            StackItem::Integer(votes),
                        ])))
                    })
                    .collect();
                Ok(Some(StackItem::Array(Rc::new(RefCell::new(items)))))
            }
            "getCommittee" => {
                let members = committee(engine.snapshot())?;
                let items: Vec<StackItem> = members
                    .into_iter()
                    .map(|member| StackItem::from_bytes(member.to_vec()))
                    .collect();
                Ok(Some(StackItem::Array(Rc::new(RefCell::new(items)))))
            }
            "getNextBlockValidators" => {
                let validators = next_block_validators(
                    engine.snapshot(),
                    engine.settings().validators_count,
                )?;
                let items: Vec<StackItem> = validators
                    .into_iter()
                    .map(|validator| StackItem::from_bytes(validator.to_vec()))
                    .collect();
                Ok(Some(StackItem::Array(Rc::new(RefCell::new(items)))))
            }
            "getGasPerBlock" => {
                let index = engine
                    .persisting_block()
                    .map(|block| block.header.index)
                    .unwrap_or(u32::MAX);
                Ok(Some(StackItem::from_int(gas_per_block_at(
                    engine.snapshot(),
                    index,
                ))))
            }
            "getRegisterPrice" => Ok(Some(StackItem::from_int(register_price(
                engine.snapshot(),
            )))),
            "getAccountState" => {
                let account = arg_hash(&args, 0)?;
                match load_account(engine.snapshot(), &account)? {
                    Some(state) => {
                        let vote = match &state.vote_to {
                            Some(candidate) => StackItem::from_bytes(candidate.to_vec()),
                            None => StackItem::Null,
                        };
                        Ok(Some(StackItem::Struct(Rc::new(RefCell::new(vec![
                            StackItem::Integer(state.balance),
                            StackItem::from_int(state.balance_height as i64),
                            vote,
                        ])))))
                    }
                    None => Ok(Some(StackItem::Null)),
                }
            }
            "transfer" => {
                let from = arg_hash(&args, 0)?;
                let to = arg_hash(&args, 1)?;
                let amount = arg_int(engine, &args, 2)?;
                let data = super::arg_item(&args, 3)?.clone();
                let result = self.transfer(engine, from, to, amount, data)?;
                Ok(Some(StackItem::from_bool(result)))
            }
            "registerCandidate" => {
                let candidate = ECPoint::from_bytes(&super::arg_bytes(&args, 0)?)?;
                let result = self.register_candidate(engine, candidate)?;
                Ok(Some(StackItem::from_bool(result)))
            }
            "unregisterCandidate" => {
                let candidate = ECPoint::from_bytes(&super::arg_bytes(&args, 0)?)?;
                let result = self.unregister_candidate(engine, candidate)?;
                Ok(Some(StackItem::from_bool(result)))
            }
            "vote" => {
                let account = arg_hash(&args, 0)?;
                let candidate = match super::arg_item(&args, 1)? {
                    item if item.is_null() => None,
                    item => Some(ECPoint::from_bytes(&item.get_bytes()?)?),
                };
                let result = self.vote(engine, account, candidate)?;
                Ok(Some(StackItem::from_bool(result)))
            }
            "setGasPerBlock" => {
                let value: i64 = arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("gas per block"))?;
                if !(0..=10 * GAS_FACTOR).contains(&value) {
                    return Err(ContractError::invalid_argument("gas per block out of range"));
                }
                if !check_committee(engine)? {
                    return Err(ContractError::invalid_operation(
                        "requires the committee witness",
                    ));
                }
                // Takes effect from the next block.
                let next_index = engine
                    .persisting_block()
                    .map(|block| block.header.index + 1)
                    .unwrap_or(0);
                engine.snapshot_mut().put(
                    StorageKey::from_prefix(ID, PREFIX_GAS_PER_BLOCK).with_u32_be(next_index),
                    StorageItem::from_int(value),
                )?;
                Ok(None)
            }
            "setRegisterPrice" => {
                let value: i64 = arg_int(engine, &args, 0)?
                    .try_into()
                    .map_err(|_| ContractError::invalid_argument("register price"))?;
                if value <= 0 {
                    return Err(ContractError::invalid_argument("register price must be positive"));
                }
                if !check_committee(engine)? {
                    return Err(ContractError::invalid_operation(
                        "requires the committee witness",
                    ));
                }
                engine.snapshot_mut().put(
                    StorageKey::from_prefix(ID, PREFIX_REGISTER_PRICE),
                    StorageItem::from_int(value),
                )?;
                Ok(None)
            }
            other => Err(ContractError::not_found(format!("NeoToken::{other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_state_round_trip() {
        let state = NeoAccountState {
            balance: BigInt::from(1234),
            balance_height: 77,
            vote_to: None,
        };
        let restored: NeoAccountState =
            SerializableExt::from_array(&state.to_array()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn candidate_state_round_trip() {
        let state = CandidateState {
            registered: true,
            votes: BigInt::from(999),
        };
        let restored: CandidateState =
            SerializableExt::from_array(&state.to_array()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn committee_refresh_cadence() {
        assert!(should_refresh_committee(0, 21));
        assert!(should_refresh_committee(21, 21));
        assert!(!should_refresh_committee(22, 21));
    }
}
