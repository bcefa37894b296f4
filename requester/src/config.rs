//! Application configuration loaded from environment variables.
//!
//! Required: `CLIENT_PROGRAM_ID`, `ORACLE_PROGRAM_ID`, `VRF_ACCOUNT`, `ORACLE_QUEUE`
//! Optional: `RPC_URL`, `PAYER_KEYPAIR_PATH`, `MAX_RESULT`, `RESULT_TIMEOUT_MS`,
//!           `POLL_INTERVAL_MS`, `FUND_UP_TO_LAMPORTS`, `DRAW_INTERVAL_SECS`,
//!           `CLUSTER`, `HTTP_PORT`, `MAX_RETRIES`, `INITIAL_RETRY_DELAY_MS`,
//!           `PRIORITY_FEE_MICRO_LAMPORTS`

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair};

use crate::poll::PollConfig;
use crate::request::ClientBinding;
use crate::rpc::RetryPolicy;

/// Configuration for the requester service.
#[derive(Clone)]
pub struct AppConfig {
    /// Solana JSON-RPC endpoint (HTTP).
    pub rpc_url: String,
    /// Pays for transactions and funds the escrow.
    pub payer_keypair: Arc<Keypair>,
    pub client_program_id: Pubkey,
    pub oracle_program_id: Pubkey,
    pub vrf_account: Pubkey,
    pub oracle_queue: Pubkey,
    /// Result bound used when the client state is first initialised.
    pub max_result: u64,
    pub result_timeout: Duration,
    pub poll_interval: Duration,
    /// Minimum wrapped-SOL balance kept in the payer wallet.
    pub fund_up_to_lamports: u64,
    /// Pause between draws of the background loop.
    pub draw_interval: Duration,
    /// Cluster name for explorer URLs.
    pub cluster: String,
    pub http_port: u16,
    pub max_retries: u32,
    pub initial_retry_delay_ms: u64,
    /// Priority fee in micro-lamports per compute unit.
    pub priority_fee_micro_lamports: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let rpc_url = lookup("RPC_URL").unwrap_or_else(|| "http://127.0.0.1:8899".into());

        let keypair_path = lookup("PAYER_KEYPAIR_PATH").unwrap_or_else(|| "~/.config/solana/id.json".into());
        let keypair_path = shellexpand::tilde(&keypair_path).to_string();
        let payer_keypair = read_keypair_file(&keypair_path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("failed to read keypair from {keypair_path}"))?;

        let pubkey = |key: &str| -> Result<Pubkey> {
            let value = lookup(key).with_context(|| format!("{key} env var must be set"))?;
            Pubkey::from_str(&value).with_context(|| format!("invalid {key}: {value}"))
        };
        let number = |key: &str, default: u64| -> Result<u64> {
            match lookup(key) {
                Some(value) => value.parse().with_context(|| format!("invalid {key}: {value}")),
                None => Ok(default),
            }
        };

        let max_result = number("MAX_RESULT", 1337)?;
        anyhow::ensure!(max_result > 0, "MAX_RESULT must be greater than zero");

        Ok(Self {
            rpc_url,
            payer_keypair: Arc::new(payer_keypair),
            client_program_id: pubkey("CLIENT_PROGRAM_ID")?,
            oracle_program_id: pubkey("ORACLE_PROGRAM_ID")?,
            vrf_account: pubkey("VRF_ACCOUNT")?,
            oracle_queue: pubkey("ORACLE_QUEUE")?,
            max_result,
            result_timeout: Duration::from_millis(number("RESULT_TIMEOUT_MS", 45_000)?),
            poll_interval: Duration::from_millis(number("POLL_INTERVAL_MS", 1_000)?),
            fund_up_to_lamports: number("FUND_UP_TO_LAMPORTS", 2_000_000)?,
            draw_interval: Duration::from_secs(number("DRAW_INTERVAL_SECS", 60)?),
            cluster: lookup("CLUSTER").unwrap_or_else(|| "devnet".into()),
            http_port: number("HTTP_PORT", 8080)?
                .try_into()
                .context("HTTP_PORT out of range")?,
            max_retries: number("MAX_RETRIES", 5)?
                .try_into()
                .context("MAX_RETRIES out of range")?,
            initial_retry_delay_ms: number("INITIAL_RETRY_DELAY_MS", 500)?,
            priority_fee_micro_lamports: number("PRIORITY_FEE_MICRO_LAMPORTS", 0)?,
        })
    }

    pub fn binding(&self) -> ClientBinding {
        ClientBinding {
            client_program: self.client_program_id,
            oracle_program: self.oracle_program_id,
            vrf: self.vrf_account,
            queue: self.oracle_queue,
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            timeout: self.result_timeout,
            interval: self.poll_interval,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_retry_delay: Duration::from_millis(self.initial_retry_delay_ms),
            priority_fee_micro_lamports: self.priority_fee_micro_lamports,
        }
    }

    /// Return the Solscan explorer URL for a given transaction signature.
    pub fn explorer_url(&self, signature: &str) -> String {
        match self.cluster.as_str() {
            "mainnet-beta" => format!("https://solscan.io/tx/{signature}"),
            cluster => format!("https://solscan.io/tx/{signature}?cluster={cluster}"),
        }
    }
}
