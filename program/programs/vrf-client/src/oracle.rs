//! Raw views of the oracle program's VRF account and its request instruction.
//!
//! The oracle program is not a crate dependency, so its account layout and
//! instruction are described here and (de)serialized with Borsh.

use anchor_lang::prelude::*;
use anchor_lang::solana_program::instruction::Instruction;

use crate::errors::VrfClientError;

/// `sha256("account:VrfAccountData")[..8]`
const VRF_ACCOUNT_DISCRIMINATOR: [u8; 8] = [101, 35, 62, 239, 103, 151, 6, 18];

/// `sha256("global:vrf_request_randomness")[..8]`
const VRF_REQUEST_RANDOMNESS_DISCRIMINATOR: [u8; 8] = [230, 121, 14, 164, 28, 222, 117, 118];

/// `sha256("global:consume_randomness")[..8]`
pub const CONSUME_RANDOMNESS_DISCRIMINATOR: [u8; 8] = [190, 217, 49, 162, 99, 26, 73, 234];

pub const TOKEN_PROGRAM_ID: Pubkey = pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct CallbackAccount {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// Callback frozen on the VRF account at creation.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct CallbackData {
    pub program_id: Pubkey,
    pub accounts: Vec<CallbackAccount>,
    pub ix_data: Vec<u8>,
}

impl CallbackData {
    /// `consume_randomness` on this program with `[state (w), vrf]`.
    pub fn expected(state: Pubkey, vrf: Pubkey) -> Self {
        Self {
            program_id: crate::ID,
            accounts: vec![
                CallbackAccount {
                    pubkey: state,
                    is_signer: false,
                    is_writable: true,
                },
                CallbackAccount {
                    pubkey: vrf,
                    is_signer: false,
                    is_writable: false,
                },
            ],
            ix_data: CONSUME_RANDOMNESS_DISCRIMINATOR.to_vec(),
        }
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Debug)]
pub struct VrfAccountData {
    pub authority: Pubkey,
    pub oracle_queue: Pubkey,
    pub escrow: Pubkey,
    pub counter: u64,
    pub status: u8,
    pub request_slot: u64,
    pub request_seed: [u8; 32],
    pub assigned_oracle: Pubkey,
    pub result: [u8; 32],
    pub proof: Vec<u8>,
    pub callback: CallbackData,
}

impl VrfAccountData {
    /// Decode a VRF account. Ownership is checked by the caller's constraints.
    pub fn load(account: &AccountInfo) -> Result<Self> {
        let data = account.try_borrow_data()?;
        require!(
            data.len() >= 8 && data[..8] == VRF_ACCOUNT_DISCRIMINATOR,
            VrfClientError::InvalidVrfAccount
        );
        let mut body: &[u8] = &data[8..];
        Self::deserialize(&mut body).map_err(|_| error!(VrfClientError::InvalidVrfAccount))
    }
}

/// Accounts forwarded to the oracle's `vrf_request_randomness`, in order.
pub struct VrfRequestAccounts<'a, 'info> {
    pub authority: &'a AccountInfo<'info>,
    pub vrf: &'a AccountInfo<'info>,
    pub oracle_queue: &'a AccountInfo<'info>,
    pub queue_authority: &'a AccountInfo<'info>,
    pub permission: &'a AccountInfo<'info>,
    pub escrow: &'a AccountInfo<'info>,
    pub payer_wallet: &'a AccountInfo<'info>,
    pub payer_authority: &'a AccountInfo<'info>,
    pub token_program: &'a AccountInfo<'info>,
}

impl<'info> VrfRequestAccounts<'_, 'info> {
    pub fn instruction(&self, oracle_program: Pubkey, permission_bump: u8) -> Instruction {
        let mut data = Vec::with_capacity(9);
        data.extend_from_slice(&VRF_REQUEST_RANDOMNESS_DISCRIMINATOR);
        data.push(permission_bump);
        Instruction {
            program_id: oracle_program,
            accounts: vec![
                AccountMeta::new_readonly(self.authority.key(), true),
                AccountMeta::new(self.vrf.key(), false),
                AccountMeta::new(self.oracle_queue.key(), false),
                AccountMeta::new_readonly(self.queue_authority.key(), false),
                AccountMeta::new_readonly(self.permission.key(), false),
                AccountMeta::new(self.escrow.key(), false),
                AccountMeta::new(self.payer_wallet.key(), false),
                AccountMeta::new_readonly(self.payer_authority.key(), true),
                AccountMeta::new_readonly(self.token_program.key(), false),
            ],
            data,
        }
    }

    pub fn infos(&self) -> Vec<AccountInfo<'info>> {
        vec![
            self.authority.clone(),
            self.vrf.clone(),
            self.oracle_queue.clone(),
            self.queue_authority.clone(),
            self.permission.clone(),
            self.escrow.clone(),
            self.payer_wallet.clone(),
            self.payer_authority.clone(),
            self.token_program.clone(),
        ]
    }
}
