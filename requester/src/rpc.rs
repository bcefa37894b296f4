//! [`OracleNetwork`] over a cluster's JSON-RPC endpoint.
//!
//! Each submission is one transaction:
//! 1. (Optional) A `set_compute_unit_price` instruction for priority fees.
//! 2. The caller's instructions, in order.
//!
//! `BlockhashNotFound` is retried with exponential backoff. Nothing else is:
//! a program error means a precondition failed and is mapped back to the
//! matching [`RequesterError`].

use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::Transaction;
use tracing::{debug, warn};

use crate::error::{RequesterError, Result};
use crate::network::{AccountSnapshot, OracleNetwork};

/// Custom error codes of the client program (`VrfClientError`, Anchor offset 6000).
pub(crate) const ERROR_INVALID_VRF_AUTHORITY: u32 = 6000;
pub(crate) const ERROR_INVALID_MAX_RESULT: u32 = 6001;
pub(crate) const ERROR_INVALID_VRF_ACCOUNT: u32 = 6002;
pub(crate) const ERROR_INVALID_ORACLE_ACCOUNT: u32 = 6003;
pub(crate) const ERROR_REQUEST_IN_FLIGHT: u32 = 6004;
pub(crate) const ERROR_NO_PENDING_REQUEST: u32 = 6005;
pub(crate) const ERROR_COUNTER_MISMATCH: u32 = 6006;
pub(crate) const ERROR_CALLBACK_MISMATCH: u32 = 6007;
pub(crate) const ERROR_RAFFLE_LIST_TOO_LONG: u32 = 6008;

const COMPUTE_BUDGET_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    3, 6, 70, 111, 229, 33, 23, 50, 255, 236, 173, 186, 114, 195, 155, 231, 188, 140, 229, 187, 197, 247, 18, 107,
    44, 67, 155, 58, 64, 0, 0, 0,
]);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    /// Priority fee in micro-lamports per compute unit, `0` to omit.
    pub priority_fee_micro_lamports: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_retry_delay: Duration::from_millis(500),
            priority_fee_micro_lamports: 0,
        }
    }
}

pub struct RpcNetwork {
    client: RpcClient,
    policy: RetryPolicy,
}

impl RpcNetwork {
    pub fn new(rpc_url: String, policy: RetryPolicy) -> Self {
        Self {
            client: RpcClient::new_with_commitment(rpc_url, CommitmentConfig::confirmed()),
            policy,
        }
    }

    pub fn url(&self) -> String {
        self.client.url()
    }

    /// Send a transaction with exponential backoff on BlockhashNotFound.
    async fn send_with_retries(&self, instructions: &[Instruction], payer: &Keypair, signers: &[&Keypair]) -> Result<String> {
        let mut keypairs = Vec::with_capacity(signers.len() + 1);
        keypairs.push(payer);
        keypairs.extend(signers.iter().copied().filter(|signer| signer.pubkey() != payer.pubkey()));

        let mut retry_delay = self.policy.initial_retry_delay;
        let attempts = self.policy.max_retries.max(1);
        for attempt in 0..attempts {
            let blockhash = self
                .client
                .get_latest_blockhash()
                .await
                .map_err(|e| RequesterError::Rpc(format!("failed to fetch latest blockhash: {e}")))?;
            let tx = Transaction::new_signed_with_payer(instructions, Some(&payer.pubkey()), &keypairs[..], blockhash);

            match self.client.send_and_confirm_transaction(&tx).await {
                Ok(signature) => return Ok(signature.to_string()),
                Err(e) if e.to_string().contains("BlockhashNotFound") && attempt + 1 < attempts => {
                    warn!(
                        attempt = attempt + 1,
                        delay = ?retry_delay,
                        "BlockhashNotFound, retrying"
                    );
                    tokio::time::sleep(retry_delay).await;
                    retry_delay = retry_delay.saturating_mul(2).min(Duration::from_secs(60));
                }
                Err(e) => return Err(classify_send_error(&e.to_string())),
            }
        }

        Err(RequesterError::Transaction(format!("max retries ({attempts}) exceeded")))
    }
}

impl OracleNetwork for RpcNetwork {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<AccountSnapshot>> {
        let response = self
            .client
            .get_account_with_commitment(address, self.client.commitment())
            .await
            .map_err(|e| RequesterError::Rpc(format!("get_account {address}: {e}")))?;
        Ok(response.value.map(|account| AccountSnapshot {
            owner: account.owner,
            lamports: account.lamports,
            data: account.data,
        }))
    }

    async fn send_instructions(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        signers: &[&Keypair],
    ) -> Result<String> {
        let mut all = Vec::with_capacity(instructions.len() + 1);
        if self.policy.priority_fee_micro_lamports > 0 {
            all.push(set_compute_unit_price_ix(self.policy.priority_fee_micro_lamports));
        }
        all.extend_from_slice(instructions);

        let signature = self.send_with_retries(&all, payer, signers).await?;
        debug!(signature = %signature, instructions = all.len(), "Transaction confirmed");
        Ok(signature)
    }

    async fn current_slot(&self) -> Result<u64> {
        self.client
            .get_slot()
            .await
            .map_err(|e| RequesterError::Rpc(format!("get_slot: {e}")))
    }
}

/// Build a `SetComputeUnitPrice` instruction.
fn set_compute_unit_price_ix(micro_lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(3u8);
    data.extend_from_slice(&micro_lamports.to_le_bytes());
    Instruction {
        program_id: COMPUTE_BUDGET_PROGRAM_ID,
        accounts: vec![],
        data,
    }
}

/// Extract a custom program error code (`custom program error: 0x1770`).
fn custom_error_code(err: &str) -> Option<u32> {
    let (_, tail) = err.split_once("custom program error: 0x")?;
    let hex: String = tail.chars().take_while(char::is_ascii_hexdigit).collect();
    u32::from_str_radix(&hex, 16).ok()
}

/// Map a failed submission back to the precondition it violated.
fn classify_send_error(err: &str) -> RequesterError {
    match custom_error_code(err) {
        Some(ERROR_INVALID_MAX_RESULT) => RequesterError::InvalidMaxResult,
        Some(ERROR_NO_PENDING_REQUEST) => RequesterError::NoPendingRequest,
        Some(ERROR_CALLBACK_MISMATCH) => RequesterError::DescriptorMismatch(err.to_owned()),
        // The remaining codes need the accounts the transaction was built
        // from; the request manager fills those in.
        Some(code @ ERROR_INVALID_VRF_AUTHORITY..=ERROR_RAFFLE_LIST_TOO_LONG) => RequesterError::ProgramRejected {
            code,
            message: err.to_owned(),
        },
        _ if err.contains("insufficient funds") || err.contains("insufficient lamports") => {
            RequesterError::EscrowUnavailable(err.to_owned())
        }
        _ => RequesterError::Transaction(err.to_owned()),
    }
}
