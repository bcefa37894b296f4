//! Client state: the requester's durable record and its state machine.
//!
//! ```text
//! Uninitialized --init--> Idle --request--> AwaitingResult --callback--> Idle
//! ```
//!
//! The record lives at `["CLIENTSEED", vrf]` under the client program and is
//! mutated by `init_client`, `request_randomness` (which only arms
//! `pending_counter`) and the `consume_randomness` callback, the single path
//! that writes `result`. Reads never transition.
//!
//! Account layout (Anchor `VrfClientState`, 153 bytes):
//!
//! ```text
//! [0..8]     discriminator
//! [8]        bump
//! [9..17]    max_result       u64
//! [17..49]   result_buffer    [u8; 32]
//! [49..65]   result           u128
//! [65..73]   counter          u64   last consumed VRF counter
//! [73..81]   pending_counter  u64   0 = idle
//! [81..89]   timestamp        i64
//! [89..121]  vrf              Pubkey
//! [121..153] oracle_program   Pubkey
//! ```

use sha2::{Digest, Sha256};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use crate::derivation::SYSTEM_PROGRAM_ID;
use crate::error::{RequesterError, Result};
use crate::layout::{account_discriminator, instruction_discriminator, ByteReader, ByteWriter};
use crate::network::OracleNetwork;
use crate::oracle::{VrfAccount, VrfRequestAccounts};

pub const CLIENT_STATE_ACCOUNT: &str = "VrfClientState";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientState {
    pub bump: u8,
    pub max_result: u64,
    /// Raw VRF output the current result was bounded from.
    pub result_buffer: [u8; 32],
    pub result: u128,
    pub counter: u64,
    pub pending_counter: u64,
    pub timestamp: i64,
    pub vrf: Pubkey,
    pub oracle_program: Pubkey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientStatus {
    Uninitialized,
    Idle,
    AwaitingResult { expected_counter: u64 },
}

/// Last consumed result and the VRF counter it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientResult {
    pub value: u128,
    pub counter: u64,
    pub raw: [u8; 32],
    pub timestamp: i64,
}

impl ClientState {
    pub const LEN: usize = 8 + 1 + 8 + 32 + 16 + 8 + 8 + 8 + 32 + 32;

    /// `Uninitialized -> Idle`.
    pub fn init(bump: u8, max_result: u64, vrf: Pubkey, oracle_program: Pubkey) -> Result<Self> {
        if max_result == 0 {
            return Err(RequesterError::InvalidMaxResult);
        }
        Ok(Self {
            bump,
            max_result,
            result_buffer: [0; 32],
            result: 0,
            counter: 0,
            pending_counter: 0,
            timestamp: 0,
            vrf,
            oracle_program,
        })
    }

    pub fn status(&self) -> ClientStatus {
        match self.pending_counter {
            0 => ClientStatus::Idle,
            expected_counter => ClientStatus::AwaitingResult { expected_counter },
        }
    }

    pub fn result(&self) -> ClientResult {
        ClientResult {
            value: self.result,
            counter: self.counter,
            raw: self.result_buffer,
            timestamp: self.timestamp,
        }
    }

    /// `Idle -> AwaitingResult`. Returns the counter the callback must carry.
    ///
    /// While awaiting, a new request is only accepted if the VRF counter shows
    /// the outstanding one never resolved; the expected counter is unchanged
    /// in that case so whichever oracle answers first settles it.
    pub fn begin_request(&mut self, vrf_counter: u64) -> Result<u64> {
        if self.pending_counter != 0 {
            if vrf_counter >= self.pending_counter {
                return Err(RequesterError::RequestInFlight {
                    expected_counter: self.pending_counter,
                });
            }
            return Ok(self.pending_counter);
        }
        let expected = vrf_counter.checked_add(1).ok_or_else(|| {
            RequesterError::InvalidVrfAccount(self.vrf, "counter overflow".into())
        })?;
        self.pending_counter = expected;
        Ok(expected)
    }

    /// `AwaitingResult -> Idle`. Validation happens before any field is
    /// written, so a rejected callback leaves the state untouched.
    pub fn apply_callback(&mut self, vrf_key: &Pubkey, vrf: &VrfAccount, now: i64) -> Result<ClientResult> {
        if *vrf_key != self.vrf {
            return Err(RequesterError::InvalidVrfAccount(
                *vrf_key,
                format!("client state is bound to {}", self.vrf),
            ));
        }
        if self.pending_counter == 0 {
            return Err(RequesterError::NoPendingRequest);
        }
        if vrf.counter != self.pending_counter {
            return Err(RequesterError::CounterMismatch {
                expected: self.pending_counter,
                observed: vrf.counter,
            });
        }

        self.result_buffer = vrf.result;
        self.result = bounded_result(&vrf.result, self.max_result);
        self.counter = vrf.counter;
        self.pending_counter = 0;
        self.timestamp = now;
        Ok(self.result())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::with_discriminator(CLIENT_STATE_ACCOUNT, data)?;
        Ok(Self {
            bump: r.read_u8()?,
            max_result: r.read_u64()?,
            result_buffer: r.read_array()?,
            result: r.read_u128()?,
            counter: r.read_u64()?,
            pending_counter: r.read_u64()?,
            timestamp: r.read_i64()?,
            vrf: r.read_pubkey()?,
            oracle_program: r.read_pubkey()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        ByteWriter::with_discriminator(account_discriminator(CLIENT_STATE_ACCOUNT))
            .u8(self.bump)
            .u64(self.max_result)
            .raw(&self.result_buffer)
            .u128(self.result)
            .u64(self.counter)
            .u64(self.pending_counter)
            .i64(self.timestamp)
            .pubkey(&self.vrf)
            .pubkey(&self.oracle_program)
            .finish()
    }
}

/// Map a raw 32-byte VRF output uniformly onto `0..max_result`.
///
/// The output is read as two little-endian `u128` lanes. A lane `v` is used
/// when it lies below the largest multiple of `max_result` that fits in 128
/// bits, giving `v % max_result`; lanes in the biased tail are skipped and
/// the buffer is re-hashed with SHA-256 when both are rejected.
pub fn bounded_result(raw: &[u8; 32], max_result: u64) -> u128 {
    let bound = u128::from(max_result.max(1));
    // 2^128 mod bound: size of the biased tail.
    let tail = (u128::MAX % bound + 1) % bound;
    let accept = |v: u128| tail == 0 || v <= u128::MAX - tail;

    let mut block = *raw;
    loop {
        for lane in block.chunks_exact(16) {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(lane);
            let v = u128::from_le_bytes(bytes);
            if accept(v) {
                return v % bound;
            }
        }
        let digest = Sha256::digest(block);
        block.copy_from_slice(&digest);
    }
}

/// Fetch and decode the client state; `None` while uninitialized.
pub async fn fetch_client_state<N: OracleNetwork>(network: &N, address: &Pubkey) -> Result<Option<ClientState>> {
    match network.get_account(address).await? {
        Some(account) => ClientState::decode(&account.data).map(Some),
        None => Ok(None),
    }
}

pub async fn client_status<N: OracleNetwork>(network: &N, address: &Pubkey) -> Result<ClientStatus> {
    Ok(match fetch_client_state(network, address).await? {
        Some(state) => state.status(),
        None => ClientStatus::Uninitialized,
    })
}

/// `init_client(max_result)`: accounts `[state (w), vrf, payer (s, w), system_program]`.
pub fn init_client_ix(
    client_program: &Pubkey,
    state: &Pubkey,
    vrf: &Pubkey,
    payer: &Pubkey,
    max_result: u64,
) -> Instruction {
    Instruction {
        program_id: *client_program,
        accounts: vec![
            AccountMeta::new(*state, false),
            AccountMeta::new_readonly(*vrf, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data: ByteWriter::with_discriminator(instruction_discriminator("init_client"))
            .u64(max_result)
            .finish(),
    }
}

/// `request_randomness(permission_bump)`: the client state PDA signs the CPI
/// into the oracle program as the VRF authority, so it is not a signer here.
pub fn request_randomness_ix(
    client_program: &Pubkey,
    oracle_program: &Pubkey,
    accounts: &VrfRequestAccounts,
    permission_bump: u8,
) -> Instruction {
    let mut metas = vec![AccountMeta::new(accounts.authority, false)];
    metas.extend(accounts.to_metas().into_iter().skip(1));
    metas.push(AccountMeta::new_readonly(*oracle_program, false));
    Instruction {
        program_id: *client_program,
        accounts: metas,
        data: ByteWriter::with_discriminator(instruction_discriminator("request_randomness"))
            .u8(permission_bump)
            .finish(),
    }
}

/// `add_raffle_list(raffle_list)`: accounts `[payer (s, w), raffle_list (w), state (w), system_program]`.
pub fn add_raffle_list_ix(
    client_program: &Pubkey,
    payer: &Pubkey,
    raffle_list: &Pubkey,
    state: &Pubkey,
    entrants: &str,
) -> Instruction {
    Instruction {
        program_id: *client_program,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*raffle_list, false),
            AccountMeta::new_readonly(*state, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data: ByteWriter::with_discriminator(instruction_discriminator("add_raffle_list"))
            .bytes(entrants.as_bytes())
            .finish(),
    }
}
