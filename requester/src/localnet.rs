//! In-process ledger for tests and local runs.
//!
//! Executes the same instructions the requester submits to a cluster: system
//! transfers, wrapped-SOL accounts, the oracle program (permissions, requests,
//! prove-and-verify with callback dispatch) and the client program. Each
//! transaction runs against a copy of the ledger and is committed only if
//! every instruction succeeds.
//!
//! A callback that fails after a verified fulfillment does not roll back the
//! oracle's counter advance. Its changes are discarded, the VRF account is
//! marked `CallbackFailed` and the outcome is recorded in [`Localnet::callback_log`].

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use tracing::{debug, warn};

use crate::callback::{
    compute_randomness, expected_callback, sign_proof, verify_descriptor, verify_proof, CallbackDescriptor,
    CallbackTarget, CONSUME_RANDOMNESS_IX,
};
use crate::client::{ClientState, ClientStatus};
use crate::derivation::{
    client_state_address, permission_address, raffle_list_address, wrapped_sol_address, ASSOCIATED_TOKEN_PROGRAM_ID,
    NATIVE_MINT, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
use crate::error::{DenialReason, RequesterError, Result};
use crate::layout::{instruction_discriminator, ByteReader, ByteWriter};
use crate::network::{unix_timestamp, AccountSnapshot, OracleNetwork};
use crate::oracle::{
    prove_and_verify_ix, OracleQueue, PermissionFlags, PermissionRecord, TokenAccount, VrfAccount, VrfStatus,
};
use crate::permission::authorize;
use crate::raffle::RaffleList;

/// Queue parameters for [`Localnet::create_queue`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub authority: Pubkey,
    pub reward: u64,
    pub min_stake: u64,
    pub oracle_timeout: u32,
    pub unpermissioned_feeds_enabled: bool,
    pub unpermissioned_vrf_enabled: bool,
    pub max_size: u32,
}

impl QueueConfig {
    /// Open queue with no reward.
    pub fn new(authority: Pubkey) -> Self {
        Self {
            authority,
            reward: 0,
            min_stake: 0,
            oracle_timeout: 900,
            unpermissioned_feeds_enabled: true,
            unpermissioned_vrf_enabled: true,
            max_size: 16,
        }
    }

    pub fn reward(mut self, reward: u64) -> Self {
        self.reward = reward;
        self
    }

    /// Require a permission record for VRF requests.
    pub fn gated(mut self) -> Self {
        self.unpermissioned_vrf_enabled = false;
        self
    }
}

/// Outcome of one callback dispatched after a verified fulfillment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRecord {
    pub vrf: Pubkey,
    pub counter: u64,
    pub error: Option<String>,
}

impl CallbackRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
struct Ledger {
    accounts: HashMap<Pubkey, AccountSnapshot>,
    slot: u64,
    transactions: u64,
    callbacks: Vec<CallbackRecord>,
}

pub struct Localnet {
    client_program: Pubkey,
    oracle_program: Pubkey,
    ledger: Mutex<Ledger>,
}

impl Localnet {
    pub fn new(client_program: Pubkey, oracle_program: Pubkey) -> Self {
        Self {
            client_program,
            oracle_program,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    pub fn client_program(&self) -> Pubkey {
        self.client_program
    }

    pub fn oracle_program(&self) -> Pubkey {
        self.oracle_program
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>> {
        self.ledger
            .lock()
            .map_err(|_| RequesterError::Transaction("localnet ledger lock poisoned".into()))
    }

    pub fn account(&self, address: &Pubkey) -> Result<Option<AccountSnapshot>> {
        Ok(self.lock()?.accounts.get(address).cloned())
    }

    pub fn lamports(&self, address: &Pubkey) -> Result<u64> {
        Ok(self.account(address)?.map(|account| account.lamports).unwrap_or(0))
    }

    pub fn airdrop(&self, to: &Pubkey, lamports: u64) -> Result<()> {
        let mut ledger = self.lock()?;
        let account = ledger.accounts.entry(*to).or_insert_with(|| AccountSnapshot {
            owner: SYSTEM_PROGRAM_ID,
            lamports: 0,
            data: Vec::new(),
        });
        account.lamports = account.lamports.saturating_add(lamports);
        Ok(())
    }

    /// Create an empty oracle queue and return its address.
    pub fn create_queue(&self, config: QueueConfig) -> Result<Pubkey> {
        let queue_key = Pubkey::new_unique();
        let queue = OracleQueue {
            authority: config.authority,
            reward: config.reward,
            min_stake: config.min_stake,
            oracle_timeout: config.oracle_timeout,
            unpermissioned_feeds_enabled: config.unpermissioned_feeds_enabled,
            unpermissioned_vrf_enabled: config.unpermissioned_vrf_enabled,
            max_size: config.max_size,
            oracles: Vec::new(),
            curr_idx: 0,
        };
        let mut ledger = self.lock()?;
        put(&mut ledger, queue_key, self.oracle_program, queue.encode());
        debug!(queue = %queue_key, authority = %config.authority, "Created oracle queue");
        Ok(queue_key)
    }

    /// Change a queue's configuration in place, as its authority would.
    pub fn update_queue(&self, queue_key: &Pubkey, update: impl FnOnce(&mut OracleQueue)) -> Result<()> {
        let mut ledger = self.lock()?;
        let mut queue = decode_owned(&ledger, queue_key, &self.oracle_program, OracleQueue::decode)?;
        update(&mut queue);
        put(&mut ledger, *queue_key, self.oracle_program, queue.encode());
        Ok(())
    }

    /// Register `oracle` on the queue and open its reward wallet. Returns the wallet.
    pub fn add_oracle(&self, queue_key: &Pubkey, oracle: &Pubkey) -> Result<Pubkey> {
        let mut ledger = self.lock()?;
        let mut queue = decode_owned(&ledger, queue_key, &self.oracle_program, OracleQueue::decode)?;
        if queue.oracles.len() >= queue.max_size as usize {
            return Err(RequesterError::QueueUnavailable(*queue_key, "queue is full".into()));
        }
        if !queue.oracles.contains(oracle) {
            queue.oracles.push(*oracle);
        }
        put(&mut ledger, *queue_key, self.oracle_program, queue.encode());

        let wallet = wrapped_sol_address(oracle)?;
        if !ledger.accounts.contains_key(&wallet) {
            put(&mut ledger, wallet, TOKEN_PROGRAM_ID, wrapped_sol(*oracle, 0).encode());
        }
        Ok(wallet)
    }

    /// Create a VRF account on `queue` with a frozen callback and an empty escrow.
    pub fn create_vrf_account(
        &self,
        vrf_key: &Pubkey,
        authority: &Pubkey,
        queue_key: &Pubkey,
        callback: CallbackDescriptor,
    ) -> Result<()> {
        let mut ledger = self.lock()?;
        if ledger.accounts.contains_key(vrf_key) {
            return Err(RequesterError::Transaction(format!("account {vrf_key} already in use")));
        }
        decode_owned(&ledger, queue_key, &self.oracle_program, OracleQueue::decode)?;

        let escrow = wrapped_sol_address(vrf_key)?;
        put(&mut ledger, escrow, TOKEN_PROGRAM_ID, wrapped_sol(*vrf_key, 0).encode());
        let vrf = VrfAccount {
            authority: *authority,
            oracle_queue: *queue_key,
            escrow,
            counter: 0,
            status: VrfStatus::None,
            request_slot: 0,
            request_seed: [0; 32],
            assigned_oracle: Pubkey::default(),
            result: [0; 32],
            proof: Vec::new(),
            callback,
        };
        put(&mut ledger, *vrf_key, self.oracle_program, vrf.encode());
        debug!(vrf = %vrf_key, authority = %authority, "Created VRF account");
        Ok(())
    }

    pub fn vrf_account(&self, vrf_key: &Pubkey) -> Result<VrfAccount> {
        decode_owned(&*self.lock()?, vrf_key, &self.oracle_program, VrfAccount::decode)
    }

    /// Answer the outstanding request the way an honest oracle would.
    pub fn fulfill(&self, oracle: &Keypair, vrf_key: &Pubkey, secret: &[u8]) -> Result<String> {
        let vrf = self.vrf_account(vrf_key)?;
        let counter = vrf.counter + 1;
        let result = compute_randomness(secret, vrf_key, counter, &vrf.request_seed);
        self.fulfill_with(oracle, vrf_key, counter, result)
    }

    /// Submit a signed response carrying `result` for `counter`.
    pub fn fulfill_with(&self, oracle: &Keypair, vrf_key: &Pubkey, counter: u64, result: [u8; 32]) -> Result<String> {
        let vrf = self.vrf_account(vrf_key)?;
        let proof = sign_proof(oracle, vrf_key, counter, &vrf.request_seed, &result);
        let ix = prove_and_verify_ix(
            &self.oracle_program,
            vrf_key,
            &oracle.pubkey(),
            &vrf.oracle_queue,
            &vrf.escrow,
            &wrapped_sol_address(&oracle.pubkey())?,
            counter,
            &result,
            &proof,
        );
        self.send(&[ix], &[oracle])
    }

    /// Deliver an arbitrary callback instruction to its target as the oracle
    /// program would, bypassing proof verification.
    pub fn invoke_callback(&self, ix: &Instruction) -> Result<String> {
        self.transact(|exec| exec.run_callback(ix))
    }

    pub fn callback_log(&self) -> Result<Vec<CallbackRecord>> {
        Ok(self.lock()?.callbacks.clone())
    }

    fn send(&self, instructions: &[Instruction], signers: &[&Keypair]) -> Result<String> {
        let signer_keys: HashSet<Pubkey> = signers.iter().map(|keypair| keypair.pubkey()).collect();
        self.transact(|exec| {
            for ix in instructions {
                if let Some(missing) = ix
                    .accounts
                    .iter()
                    .find(|meta| meta.is_signer && !signer_keys.contains(&meta.pubkey))
                {
                    return Err(RequesterError::Transaction(format!(
                        "missing signature for {}",
                        missing.pubkey
                    )));
                }
                exec.execute(ix, &signer_keys)?;
            }
            Ok(())
        })
    }

    fn transact(&self, run: impl FnOnce(&mut Executor<'_>) -> Result<()>) -> Result<String> {
        let mut ledger = self.lock()?;
        let mut working = ledger.clone();
        working.slot += 1;
        working.transactions += 1;
        run(&mut Executor {
            ledger: &mut working,
            client_program: self.client_program,
            oracle_program: self.oracle_program,
        })?;

        let signature = transaction_signature(&working);
        *ledger = working;
        Ok(signature)
    }
}

impl OracleNetwork for Localnet {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountSnapshot>> {
        self.account(address)
    }

    async fn send_instructions(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        signers: &[&Keypair],
    ) -> Result<String> {
        let mut all_signers = Vec::with_capacity(signers.len() + 1);
        all_signers.push(payer);
        all_signers.extend_from_slice(signers);
        let signature = self.send(instructions, &all_signers)?;
        debug!(signature = %signature, instructions = instructions.len(), "Executed localnet transaction");
        Ok(signature)
    }

    async fn current_slot(&self) -> Result<u64> {
        Ok(self.lock()?.slot)
    }
}

fn put(ledger: &mut Ledger, key: Pubkey, owner: Pubkey, data: Vec<u8>) {
    let account = ledger.accounts.entry(key).or_insert_with(|| AccountSnapshot {
        owner,
        lamports: 0,
        data: Vec::new(),
    });
    account.owner = owner;
    account.data = data;
}

fn decode_owned<T>(
    ledger: &Ledger,
    key: &Pubkey,
    owner: &Pubkey,
    decode: impl FnOnce(&[u8]) -> Result<T>,
) -> Result<T> {
    let account = ledger.accounts.get(key).ok_or(RequesterError::AccountNotFound(*key))?;
    if account.owner != *owner {
        return Err(RequesterError::Transaction(format!(
            "account {key} is owned by {}, expected {owner}",
            account.owner
        )));
    }
    decode(&account.data)
}

fn wrapped_sol(owner: Pubkey, amount: u64) -> TokenAccount {
    TokenAccount {
        mint: NATIVE_MINT,
        owner,
        amount,
    }
}

fn transaction_signature(ledger: &Ledger) -> String {
    let mut bytes = [0u8; 64];
    let digest = Sha256::new()
        .chain_update(ledger.slot.to_le_bytes())
        .chain_update(ledger.transactions.to_le_bytes())
        .finalize();
    bytes[..32].copy_from_slice(&digest);
    bytes[32..].copy_from_slice(&Sha256::digest(digest));
    Signature::from(bytes).to_string()
}

fn meta(ix: &Instruction, idx: usize) -> Result<&AccountMeta> {
    ix.accounts.get(idx).ok_or_else(|| {
        RequesterError::Transaction(format!("instruction for {} is missing account #{idx}", ix.program_id))
    })
}

fn key(ix: &Instruction, idx: usize) -> Result<Pubkey> {
    meta(ix, idx).map(|meta| meta.pubkey)
}

fn writable(ix: &Instruction, idx: usize) -> Result<Pubkey> {
    let meta = meta(ix, idx)?;
    if !meta.is_writable {
        return Err(RequesterError::Transaction(format!("account {} must be writable", meta.pubkey)));
    }
    Ok(meta.pubkey)
}

fn signer(ix: &Instruction, idx: usize, signers: &HashSet<Pubkey>) -> Result<Pubkey> {
    let meta = meta(ix, idx)?;
    if !meta.is_signer || !signers.contains(&meta.pubkey) {
        return Err(RequesterError::Transaction(format!("account {} must sign", meta.pubkey)));
    }
    Ok(meta.pubkey)
}

fn split_data(ix: &Instruction) -> Result<([u8; 8], &[u8])> {
    if ix.data.len() < 8 {
        return Err(RequesterError::Transaction(format!(
            "instruction for {} has no discriminator",
            ix.program_id
        )));
    }
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&ix.data[..8]);
    Ok((disc, &ix.data[8..]))
}

struct Executor<'a> {
    ledger: &'a mut Ledger,
    client_program: Pubkey,
    oracle_program: Pubkey,
}

impl Executor<'_> {
    fn execute(&mut self, ix: &Instruction, signers: &HashSet<Pubkey>) -> Result<()> {
        if ix.program_id == SYSTEM_PROGRAM_ID {
            self.system(ix, signers)
        } else if ix.program_id == ASSOCIATED_TOKEN_PROGRAM_ID {
            self.associated_token(ix, signers)
        } else if ix.program_id == TOKEN_PROGRAM_ID {
            self.token(ix)
        } else if ix.program_id == self.client_program {
            self.client(ix, signers)
        } else if ix.program_id == self.oracle_program {
            self.oracle(ix, signers)
        } else {
            Err(RequesterError::Transaction(format!("program {} is not deployed", ix.program_id)))
        }
    }

    fn load<T>(&self, key: &Pubkey, owner: &Pubkey, decode: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
        decode_owned(&*self.ledger, key, owner, decode)
    }

    fn exists(&self, key: &Pubkey) -> bool {
        self.ledger.accounts.contains_key(key)
    }

    fn store(&mut self, key: Pubkey, owner: Pubkey, data: Vec<u8>) {
        put(&mut *self.ledger, key, owner, data);
    }

    fn move_lamports(&mut self, from: &Pubkey, to: &Pubkey, lamports: u64) -> Result<()> {
        let available = self.ledger.accounts.get(from).map(|a| a.lamports).unwrap_or(0);
        if available < lamports {
            return Err(RequesterError::InsufficientFunds {
                required: lamports,
                available,
            });
        }
        if let Some(source) = self.ledger.accounts.get_mut(from) {
            source.lamports -= lamports;
        }
        let target = self.ledger.accounts.entry(*to).or_insert_with(|| AccountSnapshot {
            owner: SYSTEM_PROGRAM_ID,
            lamports: 0,
            data: Vec::new(),
        });
        target.lamports = target.lamports.saturating_add(lamports);
        Ok(())
    }

    /// Wrapped-SOL transfer: token amount and backing lamports move together.
    fn transfer_tokens(&mut self, from: &Pubkey, to: &Pubkey, amount: u64) -> Result<()> {
        let mut source = self.load(from, &TOKEN_PROGRAM_ID, TokenAccount::decode)?;
        let mut target = self.load(to, &TOKEN_PROGRAM_ID, TokenAccount::decode)?;
        if source.amount < amount {
            return Err(RequesterError::InsufficientFunds {
                required: amount,
                available: source.amount,
            });
        }
        self.move_lamports(from, to, amount)?;
        source.amount -= amount;
        target.amount += amount;
        self.store(*from, TOKEN_PROGRAM_ID, source.encode());
        self.store(*to, TOKEN_PROGRAM_ID, target.encode());
        Ok(())
    }

    // --- system, associated token and token programs -----------------------

    fn system(&mut self, ix: &Instruction, signers: &HashSet<Pubkey>) -> Result<()> {
        let mut r = ByteReader::new("system instruction", &ix.data);
        let tag = r.read_u32()?;
        if tag != 2 {
            return Err(RequesterError::Transaction(format!("unsupported system instruction {tag}")));
        }
        let lamports = r.read_u64()?;
        let from = signer(ix, 0, signers)?;
        let to = writable(ix, 1)?;
        self.move_lamports(&from, &to, lamports)
    }

    fn associated_token(&mut self, ix: &Instruction, signers: &HashSet<Pubkey>) -> Result<()> {
        signer(ix, 0, signers)?;
        let wallet = writable(ix, 1)?;
        let owner = key(ix, 2)?;
        let mint = key(ix, 3)?;
        if mint != NATIVE_MINT {
            return Err(RequesterError::Transaction(format!("mint {mint} is not supported")));
        }
        if wallet != wrapped_sol_address(&owner)? {
            return Err(RequesterError::InvalidSeeds(format!(
                "{wallet} is not the associated token account of {owner}"
            )));
        }
        if !self.exists(&wallet) {
            self.store(wallet, TOKEN_PROGRAM_ID, wrapped_sol(owner, 0).encode());
        }
        Ok(())
    }

    fn token(&mut self, ix: &Instruction) -> Result<()> {
        if ix.data.first() != Some(&17) {
            return Err(RequesterError::Transaction("unsupported token instruction".into()));
        }
        let wallet = writable(ix, 0)?;
        let mut account = self.load(&wallet, &TOKEN_PROGRAM_ID, TokenAccount::decode)?;
        account.amount = self.ledger.accounts.get(&wallet).map(|a| a.lamports).unwrap_or(0);
        self.store(wallet, TOKEN_PROGRAM_ID, account.encode());
        Ok(())
    }

    // --- client program -----------------------------------------------------

    fn client(&mut self, ix: &Instruction, signers: &HashSet<Pubkey>) -> Result<()> {
        let (disc, args) = split_data(ix)?;
        if disc == instruction_discriminator("init_client") {
            self.init_client(ix, args, signers)
        } else if disc == instruction_discriminator("request_randomness") {
            self.request_randomness(ix, args, signers)
        } else if disc == instruction_discriminator(CONSUME_RANDOMNESS_IX) {
            self.consume_randomness(ix)
        } else if disc == instruction_discriminator("add_raffle_list") {
            self.add_raffle_list(ix, args, signers)
        } else {
            Err(RequesterError::Transaction("unknown client program instruction".into()))
        }
    }

    fn init_client(&mut self, ix: &Instruction, args: &[u8], signers: &HashSet<Pubkey>) -> Result<()> {
        let state_key = writable(ix, 0)?;
        let vrf_key = key(ix, 1)?;
        signer(ix, 2, signers)?;
        let max_result = ByteReader::new("init_client", args).read_u64()?;

        let (expected_state, bump) = client_state_address(&vrf_key, &self.client_program)?;
        if state_key != expected_state {
            return Err(RequesterError::InvalidSeeds(format!(
                "client state {state_key} is not derived from VRF {vrf_key}"
            )));
        }
        if self.exists(&state_key) {
            return Err(RequesterError::AlreadyInitialized(state_key));
        }
        let vrf = self.load(&vrf_key, &self.oracle_program, VrfAccount::decode)?;
        if vrf.authority != state_key {
            return Err(RequesterError::InvalidVrfAuthority {
                vrf: vrf_key,
                expected: state_key,
                actual: vrf.authority,
            });
        }

        let state = ClientState::init(bump, max_result, vrf_key, self.oracle_program)?;
        self.store(state_key, self.client_program, state.encode());
        Ok(())
    }

    fn request_randomness(&mut self, ix: &Instruction, args: &[u8], signers: &HashSet<Pubkey>) -> Result<()> {
        let state_key = writable(ix, 0)?;
        let vrf_key = writable(ix, 1)?;
        let oracle_program = key(ix, 9)?;
        let permission_bump = ByteReader::new("request_randomness", args).read_u8()?;

        let mut state = self.load(&state_key, &self.client_program, ClientState::decode)?;
        if vrf_key != state.vrf {
            return Err(RequesterError::InvalidVrfAccount(
                vrf_key,
                format!("client state is bound to {}", state.vrf),
            ));
        }
        if oracle_program != state.oracle_program {
            return Err(RequesterError::Transaction(format!(
                "oracle program {oracle_program} does not match {}",
                state.oracle_program
            )));
        }
        let vrf = self.load(&vrf_key, &oracle_program, VrfAccount::decode)?;
        let expected_counter = state.begin_request(vrf.counter)?;

        // The state PDA signs for the CPI as the VRF authority.
        let mut accounts = ix.accounts[..9].to_vec();
        accounts[0] = AccountMeta::new_readonly(state_key, true);
        let cpi = Instruction {
            program_id: oracle_program,
            accounts,
            data: ByteWriter::with_discriminator(instruction_discriminator("vrf_request_randomness"))
                .u8(permission_bump)
                .finish(),
        };
        let mut cpi_signers = signers.clone();
        cpi_signers.insert(state_key);
        self.oracle(&cpi, &cpi_signers)?;

        self.store(state_key, self.client_program, state.encode());
        debug!(state = %state_key, expected_counter, "Client requested randomness");
        Ok(())
    }

    /// Callback entry point: the invocation must match the registered
    /// descriptor exactly and the VRF counter must be the awaited one.
    fn consume_randomness(&mut self, ix: &Instruction) -> Result<()> {
        let state_key = key(ix, 0)?;
        let vrf_key = key(ix, 1)?;
        if !self.exists(&state_key) {
            return Err(RequesterError::NotInitialized(state_key));
        }
        let mut state = self.load(&state_key, &self.client_program, ClientState::decode)?;

        let expected = expected_callback(&self.client_program, &state_key, &state.vrf);
        verify_descriptor(
            &expected,
            &CallbackDescriptor::from_invocation(ix.program_id, &ix.accounts, &ix.data),
        )?;
        let vrf = self.load(&vrf_key, &state.oracle_program, VrfAccount::decode)?;
        verify_descriptor(&expected, &vrf.callback)?;

        let result = state.apply_callback(&vrf_key, &vrf, unix_timestamp())?;
        self.store(state_key, self.client_program, state.encode());
        debug!(state = %state_key, counter = result.counter, value = result.value, "Client consumed randomness");
        Ok(())
    }

    fn add_raffle_list(&mut self, ix: &Instruction, args: &[u8], signers: &HashSet<Pubkey>) -> Result<()> {
        signer(ix, 0, signers)?;
        let raffle_key = writable(ix, 1)?;
        let state_key = meta(ix, 2)?.pubkey;
        let state = self.load(&state_key, &self.client_program, ClientState::decode)?;
        if let ClientStatus::AwaitingResult { expected_counter } = state.status() {
            return Err(RequesterError::RequestInFlight { expected_counter });
        }

        let (expected, bump) = raffle_list_address(&state_key, &self.client_program)?;
        if raffle_key != expected {
            return Err(RequesterError::InvalidSeeds(format!(
                "raffle list {raffle_key} is not derived from {state_key}"
            )));
        }
        if self.exists(&raffle_key) {
            return Err(RequesterError::AlreadyInitialized(raffle_key));
        }
        let entrants = String::from_utf8(ByteReader::new("add_raffle_list", args).read_bytes()?)
            .map_err(|e| RequesterError::malformed("add_raffle_list", e.to_string()))?;
        let list = RaffleList::new(&entrants, bump)?;
        self.store(raffle_key, self.client_program, list.encode());
        Ok(())
    }

    // --- oracle program -----------------------------------------------------

    fn oracle(&mut self, ix: &Instruction, signers: &HashSet<Pubkey>) -> Result<()> {
        let (disc, args) = split_data(ix)?;
        if disc == instruction_discriminator("permission_init") {
            self.permission_init(ix, signers)
        } else if disc == instruction_discriminator("permission_set") {
            self.permission_set(ix, args, signers)
        } else if disc == instruction_discriminator("vrf_request_randomness") {
            self.vrf_request_randomness(ix, args, signers)
        } else if disc == instruction_discriminator("vrf_prove_and_verify") {
            self.vrf_prove_and_verify(ix, args, signers)
        } else {
            Err(RequesterError::Transaction("unknown oracle program instruction".into()))
        }
    }

    fn permission_init(&mut self, ix: &Instruction, signers: &HashSet<Pubkey>) -> Result<()> {
        let permission = writable(ix, 0)?;
        let authority = key(ix, 1)?;
        let granter = key(ix, 2)?;
        let grantee = key(ix, 3)?;
        signer(ix, 4, signers)?;

        let (expected, _) = permission_address(&authority, &granter, &grantee, &self.oracle_program)?;
        if permission != expected {
            return Err(RequesterError::InvalidSeeds(format!(
                "permission {permission} is not derived from its granter and grantee"
            )));
        }
        if self.exists(&permission) {
            return Err(RequesterError::Transaction(format!("account {permission} already in use")));
        }
        let record = PermissionRecord {
            authority,
            permissions: PermissionFlags::default(),
            granter,
            grantee,
            expiration: 0,
        };
        self.store(permission, self.oracle_program, record.encode());
        Ok(())
    }

    fn permission_set(&mut self, ix: &Instruction, args: &[u8], signers: &HashSet<Pubkey>) -> Result<()> {
        let permission = writable(ix, 0)?;
        let authority = signer(ix, 1, signers)?;
        let mut r = ByteReader::new("permission_set", args);
        let flag = r.read_u32()?;
        let enable = r.read_bool()?;

        let mut record = self.load(&permission, &self.oracle_program, PermissionRecord::decode)?;
        if record.authority != authority {
            return Err(RequesterError::PermissionDenied(DenialReason::AuthorityMismatch));
        }
        record.permissions = record.permissions.set(flag, enable);
        self.store(permission, self.oracle_program, record.encode());
        Ok(())
    }

    fn vrf_request_randomness(&mut self, ix: &Instruction, args: &[u8], signers: &HashSet<Pubkey>) -> Result<()> {
        let authority = signer(ix, 0, signers)?;
        let vrf_key = writable(ix, 1)?;
        let queue_key = writable(ix, 2)?;
        let queue_authority = key(ix, 3)?;
        let permission_key = key(ix, 4)?;
        let escrow_key = writable(ix, 5)?;
        let payer_wallet = writable(ix, 6)?;
        let payer_authority = signer(ix, 7, signers)?;
        let permission_bump = ByteReader::new("vrf_request_randomness", args).read_u8()?;

        let mut vrf = self.load(&vrf_key, &self.oracle_program, VrfAccount::decode)?;
        if vrf.authority != authority {
            return Err(RequesterError::InvalidVrfAuthority {
                vrf: vrf_key,
                expected: vrf.authority,
                actual: authority,
            });
        }
        if vrf.oracle_queue != queue_key {
            return Err(RequesterError::InvalidVrfAccount(
                vrf_key,
                format!("bound to queue {}", vrf.oracle_queue),
            ));
        }
        let mut queue = self.load(&queue_key, &self.oracle_program, OracleQueue::decode)?;
        if queue.authority != queue_authority {
            return Err(RequesterError::PermissionDenied(DenialReason::AuthorityMismatch));
        }
        let assigned = queue
            .next_oracle()
            .ok_or_else(|| RequesterError::QueueUnavailable(queue_key, "no oracles are serving the queue".into()))?;

        let (expected_permission, bump) =
            permission_address(&queue.authority, &queue_key, &vrf_key, &self.oracle_program)?;
        if permission_key != expected_permission || permission_bump != bump {
            return Err(RequesterError::InvalidSeeds(
                "permission account does not match its derived address".into(),
            ));
        }
        let record = match self.ledger.accounts.get(&permission_key) {
            Some(account) if account.owner == self.oracle_program => Some(PermissionRecord::decode(&account.data)?),
            _ => None,
        };
        authorize(&queue_key, &queue, &vrf_key, record.as_ref(), unix_timestamp()).into_result()?;

        if escrow_key != vrf.escrow {
            return Err(RequesterError::EscrowUnavailable(format!(
                "{escrow_key} is not the escrow of {vrf_key}"
            )));
        }
        let wallet = self.load(&payer_wallet, &TOKEN_PROGRAM_ID, TokenAccount::decode)?;
        if wallet.owner != payer_authority {
            return Err(RequesterError::EscrowUnavailable(format!(
                "wallet {payer_wallet} is not owned by {payer_authority}"
            )));
        }
        let escrow = self.load(&escrow_key, &TOKEN_PROGRAM_ID, TokenAccount::decode)?;
        let shortfall = queue.reward.saturating_sub(escrow.amount);
        if shortfall > 0 {
            self.transfer_tokens(&payer_wallet, &escrow_key, shortfall)?;
        }

        vrf.status = VrfStatus::RequestPending;
        vrf.request_slot = self.ledger.slot;
        vrf.request_seed = self.request_seed(&vrf_key, vrf.counter);
        vrf.assigned_oracle = assigned;
        queue.curr_idx = queue.curr_idx.wrapping_add(1);
        self.store(vrf_key, self.oracle_program, vrf.encode());
        self.store(queue_key, self.oracle_program, queue.encode());
        Ok(())
    }

    /// Unpredictable per-request seed, standing in for a recent blockhash.
    fn request_seed(&self, vrf_key: &Pubkey, counter: u64) -> [u8; 32] {
        let mut seed = [0u8; 32];
        seed.copy_from_slice(
            &Sha256::new()
                .chain_update(self.ledger.slot.to_le_bytes())
                .chain_update(self.ledger.transactions.to_le_bytes())
                .chain_update(vrf_key)
                .chain_update(counter.to_le_bytes())
                .finalize(),
        );
        seed
    }

    fn vrf_prove_and_verify(&mut self, ix: &Instruction, args: &[u8], signers: &HashSet<Pubkey>) -> Result<()> {
        let vrf_key = writable(ix, 0)?;
        let oracle = signer(ix, 1, signers)?;
        let queue_key = key(ix, 2)?;
        let escrow_key = writable(ix, 3)?;
        let oracle_wallet = writable(ix, 4)?;
        let mut r = ByteReader::new("vrf_prove_and_verify", args);
        let counter = r.read_u64()?;
        let result: [u8; 32] = r.read_array()?;
        let proof = r.read_bytes()?;

        let mut vrf = self.load(&vrf_key, &self.oracle_program, VrfAccount::decode)?;
        if vrf.oracle_queue != queue_key {
            return Err(RequesterError::InvalidVrfAccount(
                vrf_key,
                format!("bound to queue {}", vrf.oracle_queue),
            ));
        }
        let queue = self.load(&queue_key, &self.oracle_program, OracleQueue::decode)?;
        if !queue.oracles.contains(&oracle) {
            return Err(RequesterError::UnknownOracle(oracle));
        }
        if vrf.status != VrfStatus::RequestPending {
            return Err(RequesterError::NoPendingRequest);
        }
        let next = vrf.counter + 1;
        if counter != next {
            return Err(RequesterError::CounterMismatch {
                expected: next,
                observed: counter,
            });
        }
        verify_proof(&oracle, &vrf_key, counter, &vrf.request_seed, &result, &proof)?;

        if escrow_key != vrf.escrow {
            return Err(RequesterError::EscrowUnavailable(format!(
                "{escrow_key} is not the escrow of {vrf_key}"
            )));
        }
        let escrow = self.load(&escrow_key, &TOKEN_PROGRAM_ID, TokenAccount::decode)?;
        let reward = queue.reward.min(escrow.amount);
        if reward > 0 {
            self.transfer_tokens(&escrow_key, &oracle_wallet, reward)?;
        }

        vrf.counter = counter;
        vrf.result = result;
        vrf.proof = proof;
        vrf.status = VrfStatus::CallbackSuccess;
        self.store(vrf_key, self.oracle_program, vrf.encode());

        let callback = Instruction {
            program_id: vrf.callback.program_id,
            accounts: vrf.callback.accounts.clone(),
            data: vrf.callback.ix_data.clone(),
        };
        let outcome = self.dispatch_callback(&callback);
        if let Err(err) = &outcome {
            warn!(vrf = %vrf_key, counter, error = %err, "Callback failed");
            vrf.status = VrfStatus::CallbackFailed;
            self.store(vrf_key, self.oracle_program, vrf.encode());
        }
        self.ledger.callbacks.push(CallbackRecord {
            vrf: vrf_key,
            counter,
            error: outcome.err().map(|err| err.to_string()),
        });
        Ok(())
    }

    /// Run a callback, discarding its writes if it fails.
    fn dispatch_callback(&mut self, ix: &Instruction) -> Result<()> {
        let checkpoint = self.ledger.accounts.clone();
        let outcome = self.run_callback(ix);
        if outcome.is_err() {
            self.ledger.accounts = checkpoint;
        }
        outcome
    }

    fn run_callback(&mut self, ix: &Instruction) -> Result<()> {
        match CallbackTarget::decode(&self.client_program, &ix.program_id, &ix.data) {
            CallbackTarget::ConsumeRandomness => self.consume_randomness(ix),
            CallbackTarget::Unknown => Err(RequesterError::DescriptorMismatch(format!(
                "no callback entry point in program {}",
                ix.program_id
            ))),
        }
    }
}
