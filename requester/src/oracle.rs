//! Read-only views of the oracle network's accounts.
//!
//! Queue, VRF and permission accounts are owned by the oracle program and are
//! authoritative external state. They are decoded on demand from raw account
//! bytes and never cached: queue and permission configuration can change
//! between two reads.
//!
//! Layouts (after the 8-byte Anchor discriminator, little-endian, vectors
//! `u32`-length-prefixed):
//!
//! ```text
//! OracleQueueAccountData  authority(32) reward(8) min_stake(8) oracle_timeout(4)
//!                         unpermissioned_feeds(1) unpermissioned_vrf(1) max_size(4)
//!                         oracles(vec<32>) curr_idx(4)
//! VrfAccountData          authority(32) oracle_queue(32) escrow(32) counter(8) status(1)
//!                         request_slot(8) request_seed(32) assigned_oracle(32) result(32)
//!                         proof(vec<u8>) callback{program_id(32) accounts(vec<34>) ix_data(vec<u8>)}
//! PermissionAccountData   authority(32) permissions(4) granter(32) grantee(32) expiration(8)
//! ```

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use crate::callback::CallbackDescriptor;
use crate::derivation::{SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID};
use crate::error::{RequesterError, Result};
use crate::layout::{account_discriminator, instruction_discriminator, ByteReader, ByteWriter};

pub const QUEUE_ACCOUNT: &str = "OracleQueueAccountData";
pub const VRF_ACCOUNT: &str = "VrfAccountData";
pub const PERMISSION_ACCOUNT: &str = "PermissionAccountData";

/// Configuration and membership of an oracle queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleQueue {
    pub authority: Pubkey,
    /// Reward paid from the VRF escrow to the fulfilling oracle.
    pub reward: u64,
    pub min_stake: u64,
    /// Seconds an assigned oracle has to respond before reassignment.
    pub oracle_timeout: u32,
    pub unpermissioned_feeds_enabled: bool,
    pub unpermissioned_vrf_enabled: bool,
    pub max_size: u32,
    pub oracles: Vec<Pubkey>,
    pub curr_idx: u32,
}

impl OracleQueue {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::with_discriminator(QUEUE_ACCOUNT, data)?;
        let queue = Self {
            authority: r.read_pubkey()?,
            reward: r.read_u64()?,
            min_stake: r.read_u64()?,
            oracle_timeout: r.read_u32()?,
            unpermissioned_feeds_enabled: r.read_bool()?,
            unpermissioned_vrf_enabled: r.read_bool()?,
            max_size: r.read_u32()?,
            oracles: r.read_vec(|r| r.read_pubkey())?,
            curr_idx: r.read_u32()?,
        };
        if queue.oracles.len() > queue.max_size as usize {
            return Err(RequesterError::malformed(
                QUEUE_ACCOUNT,
                format!("{} oracles exceed max size {}", queue.oracles.len(), queue.max_size),
            ));
        }
        Ok(queue)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_discriminator(account_discriminator(QUEUE_ACCOUNT));
        w.pubkey(&self.authority)
            .u64(self.reward)
            .u64(self.min_stake)
            .u32(self.oracle_timeout)
            .bool(self.unpermissioned_feeds_enabled)
            .bool(self.unpermissioned_vrf_enabled)
            .u32(self.max_size)
            .u32(self.oracles.len() as u32);
        for oracle in &self.oracles {
            w.pubkey(oracle);
        }
        w.u32(self.curr_idx).finish()
    }

    pub fn has_oracles(&self) -> bool {
        !self.oracles.is_empty()
    }

    /// Oracle that the next request is assigned to (round-robin).
    pub fn next_oracle(&self) -> Option<Pubkey> {
        if self.oracles.is_empty() {
            return None;
        }
        Some(self.oracles[self.curr_idx as usize % self.oracles.len()])
    }
}

/// Lifecycle of the request currently attached to a VRF account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VrfStatus {
    None,
    RequestPending,
    CallbackSuccess,
    CallbackFailed,
}

impl VrfStatus {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(VrfStatus::None),
            1 => Ok(VrfStatus::RequestPending),
            2 => Ok(VrfStatus::CallbackSuccess),
            3 => Ok(VrfStatus::CallbackFailed),
            other => Err(RequesterError::malformed(VRF_ACCOUNT, format!("unknown status {other}"))),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            VrfStatus::None => 0,
            VrfStatus::RequestPending => 1,
            VrfStatus::CallbackSuccess => 2,
            VrfStatus::CallbackFailed => 3,
        }
    }
}

/// One randomness source and its frozen callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VrfAccount {
    pub authority: Pubkey,
    pub oracle_queue: Pubkey,
    pub escrow: Pubkey,
    /// Incremented once per verified fulfillment.
    pub counter: u64,
    pub status: VrfStatus,
    pub request_slot: u64,
    pub request_seed: [u8; 32],
    pub assigned_oracle: Pubkey,
    pub result: [u8; 32],
    pub proof: Vec<u8>,
    pub callback: CallbackDescriptor,
}

impl VrfAccount {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::with_discriminator(VRF_ACCOUNT, data)?;
        Ok(Self {
            authority: r.read_pubkey()?,
            oracle_queue: r.read_pubkey()?,
            escrow: r.read_pubkey()?,
            counter: r.read_u64()?,
            status: VrfStatus::from_u8(r.read_u8()?)?,
            request_slot: r.read_u64()?,
            request_seed: r.read_array()?,
            assigned_oracle: r.read_pubkey()?,
            result: r.read_array()?,
            proof: r.read_bytes()?,
            callback: CallbackDescriptor::read(&mut r)?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_discriminator(account_discriminator(VRF_ACCOUNT));
        w.pubkey(&self.authority)
            .pubkey(&self.oracle_queue)
            .pubkey(&self.escrow)
            .u64(self.counter)
            .u8(self.status.as_u8())
            .u64(self.request_slot)
            .raw(&self.request_seed)
            .pubkey(&self.assigned_oracle)
            .raw(&self.result)
            .bytes(&self.proof);
        self.callback.write(&mut w);
        w.finish()
    }
}

/// Capability bits carried by a permission record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionFlags(pub u32);

impl PermissionFlags {
    pub const ORACLE_HEARTBEAT: u32 = 1 << 0;
    pub const ORACLE_QUEUE_USAGE: u32 = 1 << 1;
    pub const VRF_REQUESTS: u32 = 1 << 2;

    pub fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub fn set(self, flag: u32, enable: bool) -> Self {
        if enable {
            PermissionFlags(self.0 | flag)
        } else {
            PermissionFlags(self.0 & !flag)
        }
    }
}

/// Grant from a queue (granter) to a VRF account (grantee).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionRecord {
    pub authority: Pubkey,
    pub permissions: PermissionFlags,
    pub granter: Pubkey,
    pub grantee: Pubkey,
    /// Unix timestamp; `0` never expires.
    pub expiration: i64,
}

impl PermissionRecord {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::with_discriminator(PERMISSION_ACCOUNT, data)?;
        Ok(Self {
            authority: r.read_pubkey()?,
            permissions: PermissionFlags(r.read_u32()?),
            granter: r.read_pubkey()?,
            grantee: r.read_pubkey()?,
            expiration: r.read_i64()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        ByteWriter::with_discriminator(account_discriminator(PERMISSION_ACCOUNT))
            .pubkey(&self.authority)
            .u32(self.permissions.0)
            .pubkey(&self.granter)
            .pubkey(&self.grantee)
            .i64(self.expiration)
            .finish()
    }
}

/// Minimal view of an SPL token account (165-byte layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAccount {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
}

impl TokenAccount {
    pub const LEN: usize = 165;

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(RequesterError::malformed(
                "TokenAccount",
                format!("{} bytes, expected {}", data.len(), Self::LEN),
            ));
        }
        let mut r = ByteReader::new("TokenAccount", data);
        Ok(Self {
            mint: r.read_pubkey()?,
            owner: r.read_pubkey()?,
            amount: r.read_u64()?,
        })
    }

    /// Initialized account with no delegate and no close authority.
    pub fn encode(&self) -> Vec<u8> {
        let mut data = ByteWriter::new()
            .pubkey(&self.mint)
            .pubkey(&self.owner)
            .u64(self.amount)
            .finish();
        // delegate option (36), state = Initialized at offset 108
        data.resize(Self::LEN, 0);
        data[108] = 1;
        data
    }
}

/// `permission_init`: creates an empty permission record at its derived address.
pub fn permission_init_ix(
    oracle_program: &Pubkey,
    permission: &Pubkey,
    queue_authority: &Pubkey,
    queue: &Pubkey,
    vrf: &Pubkey,
    payer: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: *oracle_program,
        accounts: vec![
            AccountMeta::new(*permission, false),
            AccountMeta::new_readonly(*queue_authority, false),
            AccountMeta::new_readonly(*queue, false),
            AccountMeta::new_readonly(*vrf, false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ],
        data: instruction_discriminator("permission_init").to_vec(),
    }
}

/// `permission_set`: toggles a capability bit; the queue authority must sign.
pub fn permission_set_ix(
    oracle_program: &Pubkey,
    permission: &Pubkey,
    queue_authority: &Pubkey,
    flag: u32,
    enable: bool,
) -> Instruction {
    Instruction {
        program_id: *oracle_program,
        accounts: vec![
            AccountMeta::new(*permission, false),
            AccountMeta::new_readonly(*queue_authority, true),
        ],
        data: ByteWriter::with_discriminator(instruction_discriminator("permission_set"))
            .u32(flag)
            .bool(enable)
            .finish(),
    }
}

/// Accounts the oracle program expects for `vrf_request_randomness`, in order.
/// The client program forwards them through its CPI.
pub struct VrfRequestAccounts {
    pub authority: Pubkey,
    pub vrf: Pubkey,
    pub oracle_queue: Pubkey,
    pub queue_authority: Pubkey,
    pub permission: Pubkey,
    pub escrow: Pubkey,
    pub payer_wallet: Pubkey,
    pub payer_authority: Pubkey,
}

impl VrfRequestAccounts {
    pub fn to_metas(&self) -> Vec<AccountMeta> {
        vec![
            AccountMeta::new_readonly(self.authority, true),
            AccountMeta::new(self.vrf, false),
            AccountMeta::new(self.oracle_queue, false),
            AccountMeta::new_readonly(self.queue_authority, false),
            AccountMeta::new_readonly(self.permission, false),
            AccountMeta::new(self.escrow, false),
            AccountMeta::new(self.payer_wallet, false),
            AccountMeta::new_readonly(self.payer_authority, true),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ]
    }
}

/// `vrf_prove_and_verify`: an oracle's response for `counter`.
pub fn prove_and_verify_ix(
    oracle_program: &Pubkey,
    vrf: &Pubkey,
    oracle: &Pubkey,
    oracle_queue: &Pubkey,
    escrow: &Pubkey,
    oracle_wallet: &Pubkey,
    counter: u64,
    result: &[u8; 32],
    proof: &[u8],
) -> Instruction {
    Instruction {
        program_id: *oracle_program,
        accounts: vec![
            AccountMeta::new(*vrf, false),
            AccountMeta::new_readonly(*oracle, true),
            AccountMeta::new_readonly(*oracle_queue, false),
            AccountMeta::new(*escrow, false),
            AccountMeta::new(*oracle_wallet, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: ByteWriter::with_discriminator(instruction_discriminator("vrf_prove_and_verify"))
            .u64(counter)
            .raw(result)
            .bytes(proof)
            .finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::expected_callback;

    fn sample_vrf() -> VrfAccount {
        let program = Pubkey::new_unique();
        let state = Pubkey::new_unique();
        let vrf = Pubkey::new_unique();
        VrfAccount {
            authority: state,
            oracle_queue: Pubkey::new_unique(),
            escrow: Pubkey::new_unique(),
            counter: 7,
            status: VrfStatus::RequestPending,
            request_slot: 42,
            request_seed: [9; 32],
            assigned_oracle: Pubkey::new_unique(),
            result: [3; 32],
            proof: vec![1, 2, 3],
            callback: expected_callback(&program, &state, &vrf),
        }
    }

    #[test]
    fn vrf_account_decodes_what_the_oracle_program_writes() {
        let vrf = sample_vrf();
        assert_eq!(VrfAccount::decode(&vrf.encode()).unwrap(), vrf);
    }

    #[test]
    fn queue_with_more_oracles_than_capacity_is_rejected() {
        let queue = OracleQueue {
            authority: Pubkey::new_unique(),
            reward: 0,
            min_stake: 0,
            oracle_timeout: 900,
            unpermissioned_feeds_enabled: true,
            unpermissioned_vrf_enabled: true,
            max_size: 1,
            oracles: vec![Pubkey::new_unique(), Pubkey::new_unique()],
            curr_idx: 0,
        };
        assert!(OracleQueue::decode(&queue.encode()).is_err());
    }

    #[test]
    fn next_oracle_round_robins() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let mut queue = OracleQueue {
            authority: Pubkey::new_unique(),
            reward: 0,
            min_stake: 0,
            oracle_timeout: 900,
            unpermissioned_feeds_enabled: false,
            unpermissioned_vrf_enabled: false,
            max_size: 10,
            oracles: vec![a, b],
            curr_idx: 0,
        };
        assert_eq!(queue.next_oracle(), Some(a));
        queue.curr_idx = 3;
        assert_eq!(queue.next_oracle(), Some(b));
        queue.oracles.clear();
        assert_eq!(queue.next_oracle(), None);
    }

    #[test]
    fn permission_flags_toggle_independently() {
        let flags = PermissionFlags::default()
            .set(PermissionFlags::VRF_REQUESTS, true)
            .set(PermissionFlags::ORACLE_HEARTBEAT, true);
        assert!(flags.contains(PermissionFlags::VRF_REQUESTS));
        let flags = flags.set(PermissionFlags::VRF_REQUESTS, false);
        assert!(!flags.contains(PermissionFlags::VRF_REQUESTS));
        assert!(flags.contains(PermissionFlags::ORACLE_HEARTBEAT));
    }

    #[test]
    fn token_account_reads_amount_at_offset_64() {
        let account = TokenAccount {
            mint: Pubkey::new_unique(),
            owner: Pubkey::new_unique(),
            amount: 2_000_000,
        };
        let data = account.encode();
        assert_eq!(data.len(), TokenAccount::LEN);
        assert_eq!(u64::from_le_bytes(data[64..72].try_into().unwrap()), 2_000_000);
        assert_eq!(TokenAccount::decode(&data).unwrap(), account);
    }
}
