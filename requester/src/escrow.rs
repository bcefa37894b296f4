//! Escrow funding: keep the payer's wrapped-SOL wallet topped up so the
//! oracle program can move the queue reward into the VRF escrow.
//!
//! The escrow is drawn down by the fulfilling oracle's reward claim and is not
//! refunded when a request times out.

use std::future::Future;
use std::sync::Arc;

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::{debug, info};

use crate::derivation::{
    wrapped_sol_address, ASSOCIATED_TOKEN_PROGRAM_ID, NATIVE_MINT, SYSTEM_PROGRAM_ID, TOKEN_PROGRAM_ID,
};
use crate::error::{RequesterError, Result};
use crate::network::{fetch_token_account, OracleNetwork};

/// A funded wrapped-SOL wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowHandle {
    pub wallet: Pubkey,
    pub owner: Pubkey,
    /// Token amount after any top-up.
    pub balance: u64,
}

pub trait FundingAdapter: Send + Sync {
    /// Create or reuse the owner's funding account and top it up to at least
    /// `minimum_balance`. Idempotent.
    fn ensure_funded(&self, owner: &Keypair, minimum_balance: u64)
        -> impl Future<Output = Result<EscrowHandle>> + Send;
}

/// [`FundingAdapter`] over the associated wrapped-SOL account.
pub struct WrappedSolFunding<N> {
    network: Arc<N>,
}

impl<N> WrappedSolFunding<N> {
    pub fn new(network: Arc<N>) -> Self {
        Self { network }
    }
}

impl<N: OracleNetwork> FundingAdapter for WrappedSolFunding<N> {
    async fn ensure_funded(&self, owner: &Keypair, minimum_balance: u64) -> Result<EscrowHandle> {
        let owner_key = owner.pubkey();
        let wallet = wrapped_sol_address(&owner_key)?;
        let existing = fetch_token_account(self.network.as_ref(), &wallet).await?;
        let balance = existing.map(|account| account.amount).unwrap_or(0);

        if existing.is_some() && balance >= minimum_balance {
            debug!(wallet = %wallet, balance, "Funding wallet already covers minimum");
            return Ok(EscrowHandle {
                wallet,
                owner: owner_key,
                balance,
            });
        }

        let top_up = minimum_balance.saturating_sub(balance);
        let available = self
            .network
            .get_account(&owner_key)
            .await?
            .map(|account| account.lamports)
            .unwrap_or(0);
        if available < top_up {
            return Err(RequesterError::InsufficientFunds {
                required: top_up,
                available,
            });
        }

        let mut instructions = Vec::with_capacity(3);
        if existing.is_none() {
            instructions.push(create_wrapped_account_ix(&owner_key, &wallet, &owner_key));
        }
        if top_up > 0 {
            instructions.push(system_transfer_ix(&owner_key, &wallet, top_up));
            instructions.push(sync_native_ix(&wallet));
        }

        let signature = self.network.send_instructions(&instructions, owner, &[]).await?;
        info!(
            wallet = %wallet,
            top_up,
            created = existing.is_none(),
            signature = %signature,
            "Funded wrapped SOL wallet"
        );
        Ok(EscrowHandle {
            wallet,
            owner: owner_key,
            balance: balance + top_up,
        })
    }
}

/// Associated token account `CreateIdempotent` for the native mint.
pub fn create_wrapped_account_ix(payer: &Pubkey, wallet: &Pubkey, owner: &Pubkey) -> Instruction {
    Instruction {
        program_id: ASSOCIATED_TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(*wallet, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(NATIVE_MINT, false),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![1],
    }
}

/// System program `Transfer` (instruction index 2).
pub fn system_transfer_ix(from: &Pubkey, to: &Pubkey, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    Instruction {
        program_id: SYSTEM_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    }
}

/// SPL token `SyncNative` (instruction index 17).
pub fn sync_native_ix(wallet: &Pubkey) -> Instruction {
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![AccountMeta::new(*wallet, false)],
        data: vec![17],
    }
}
