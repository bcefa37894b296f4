//! Error taxonomy for the requester.
//!
//! Every variant names the precondition that failed so the caller can pick
//! the right remedy. Nothing in this crate retries on its own: a blind retry
//! of a request could spend escrow twice.

use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a [`RequesterError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad seeds, derivation exhaustion, bad parameters. Fatal.
    Configuration,
    /// Permission denied. Surfaced, never bypassed.
    Authorization,
    /// Escrow or queue not usable. Retryable after the caller remediates.
    Resource,
    /// Descriptor mismatch, counter regression, malformed account data.
    Protocol,
    /// Caller-side polling budget exceeded.
    Timeout,
    /// RPC or transaction submission failure.
    Transport,
}

/// Why the permission gate refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// No permission record exists at the derived address.
    MissingPermission,
    /// The record's granter or grantee does not match the queue / VRF pair.
    RecordMismatch,
    /// The record was not granted by the queue authority.
    AuthorityMismatch,
    /// The record exists but the VRF request bit is not set.
    VrfPermitNotSet,
    /// The record carries an expiration in the past.
    Expired,
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            DenialReason::MissingPermission => "queue requires permission and no permission record exists",
            DenialReason::RecordMismatch => "permission record does not bind this queue and VRF account",
            DenialReason::AuthorityMismatch => "queue requires permission and authority mismatch",
            DenialReason::VrfPermitNotSet => "permission record does not permit VRF requests",
            DenialReason::Expired => "permission record has expired",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Error)]
pub enum RequesterError {
    #[error("invalid seeds: {0}")]
    InvalidSeeds(String),

    #[error("no bump in 0..=255 yields an off-curve address")]
    DerivationExhausted,

    #[error("max result must be greater than zero")]
    InvalidMaxResult,

    #[error("raffle list of {len} bytes exceeds {max}")]
    RaffleListTooLong { len: usize, max: usize },

    #[error("VRF account {vrf} authority is {actual}, expected client state {expected}")]
    InvalidVrfAuthority {
        vrf: Pubkey,
        expected: Pubkey,
        actual: Pubkey,
    },

    #[error("client state {0} is already initialized")]
    AlreadyInitialized(Pubkey),

    #[error("client state {0} is not initialized")]
    NotInitialized(Pubkey),

    #[error("permission denied: {0}")]
    PermissionDenied(DenialReason),

    #[error("insufficient funds: required {required} lamports, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("escrow unavailable: {0}")]
    EscrowUnavailable(String),

    #[error("oracle queue {0} unavailable: {1}")]
    QueueUnavailable(Pubkey, String),

    #[error("account {0} not found")]
    AccountNotFound(Pubkey),

    #[error("callback descriptor mismatch: {0}")]
    DescriptorMismatch(String),

    #[error("VRF account {0} mismatch: {1}")]
    InvalidVrfAccount(Pubkey, String),

    #[error("request already in flight for counter {expected_counter}")]
    RequestInFlight { expected_counter: u64 },

    #[error("no request is awaiting a result")]
    NoPendingRequest,

    #[error("counter {observed} does not match expected {expected}")]
    CounterMismatch { expected: u64, observed: u64 },

    #[error("oracle proof failed verification for counter {0}")]
    InvalidProof(u64),

    #[error("oracle {0} is not a member of the queue")]
    UnknownOracle(Pubkey),

    #[error("malformed {account} data: {reason}")]
    MalformedAccount {
        account: &'static str,
        reason: String,
    },

    #[error("no result for counter {expected_counter} within {waited:?}")]
    Timeout {
        expected_counter: u64,
        waited: Duration,
    },

    #[error("client program rejected the transaction with code {code}: {message}")]
    ProgramRejected { code: u32, message: String },

    #[error("transaction failed: {0}")]
    Transaction(String),

    #[error("rpc error: {0}")]
    Rpc(String),
}

impl RequesterError {
    pub fn kind(&self) -> ErrorKind {
        use RequesterError::*;
        match self {
            InvalidSeeds(_)
            | DerivationExhausted
            | InvalidMaxResult
            | RaffleListTooLong { .. }
            | InvalidVrfAuthority { .. }
            | AlreadyInitialized(_)
            | NotInitialized(_) => ErrorKind::Configuration,
            PermissionDenied(_) => ErrorKind::Authorization,
            InsufficientFunds { .. } | EscrowUnavailable(_) | QueueUnavailable(..) | AccountNotFound(_)
            | RequestInFlight { .. } => ErrorKind::Resource,
            DescriptorMismatch(_) | InvalidVrfAccount(..) | NoPendingRequest | CounterMismatch { .. }
            | InvalidProof(_) | UnknownOracle(_) | MalformedAccount { .. } | ProgramRejected { .. } => ErrorKind::Protocol,
            Timeout { .. } => ErrorKind::Timeout,
            Transaction(_) | Rpc(_) => ErrorKind::Transport,
        }
    }

    pub(crate) fn malformed(account: &'static str, reason: impl Into<String>) -> Self {
        RequesterError::MalformedAccount {
            account,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = RequesterError> = std::result::Result<T, E>;
