//! Boundary to the ledger: account reads and transaction submission.
//!
//! Two implementations live in this crate: [`crate::rpc::RpcNetwork`] talks to
//! a cluster over JSON-RPC, [`crate::localnet::Localnet`] executes the same
//! instructions in process for tests.

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;

use crate::error::{RequesterError, Result};
use crate::oracle::{OracleQueue, PermissionRecord, TokenAccount, VrfAccount};

/// Raw account as fetched from the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub owner: Pubkey,
    pub lamports: u64,
    pub data: Vec<u8>,
}

pub trait OracleNetwork: Send + Sync {
    /// Fetch an account, `None` if it does not exist.
    fn get_account(&self, address: &Pubkey) -> impl Future<Output = Result<Option<AccountSnapshot>>> + Send;

    /// Sign with `payer` plus `signers` and submit `instructions` atomically.
    /// Returns the transaction signature.
    fn send_instructions(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        signers: &[&Keypair],
    ) -> impl Future<Output = Result<String>> + Send;

    /// Current slot, used to stamp requests.
    fn current_slot(&self) -> impl Future<Output = Result<u64>> + Send;
}

/// Fetch an account that must exist.
pub async fn require_account<N: OracleNetwork>(network: &N, address: &Pubkey) -> Result<AccountSnapshot> {
    network
        .get_account(address)
        .await?
        .ok_or(RequesterError::AccountNotFound(*address))
}

pub async fn fetch_queue<N: OracleNetwork>(network: &N, address: &Pubkey) -> Result<Option<OracleQueue>> {
    match network.get_account(address).await? {
        Some(account) => OracleQueue::decode(&account.data).map(Some),
        None => Ok(None),
    }
}

/// VRF account together with its owning program.
pub async fn fetch_vrf<N: OracleNetwork>(network: &N, address: &Pubkey) -> Result<Option<(Pubkey, VrfAccount)>> {
    match network.get_account(address).await? {
        Some(account) => Ok(Some((account.owner, VrfAccount::decode(&account.data)?))),
        None => Ok(None),
    }
}

pub async fn fetch_permission<N: OracleNetwork>(
    network: &N,
    address: &Pubkey,
) -> Result<Option<PermissionRecord>> {
    match network.get_account(address).await? {
        Some(account) => PermissionRecord::decode(&account.data).map(Some),
        None => Ok(None),
    }
}

pub async fn fetch_token_account<N: OracleNetwork>(
    network: &N,
    address: &Pubkey,
) -> Result<Option<TokenAccount>> {
    match network.get_account(address).await? {
        Some(account) => TokenAccount::decode(&account.data).map(Some),
        None => Ok(None),
    }
}

/// Wall-clock unix seconds, used for permission expiry and result stamps.
pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
