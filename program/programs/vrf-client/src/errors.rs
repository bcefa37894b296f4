use anchor_lang::prelude::*;

/// Error codes for the VRF client program.
///
/// Anchor encodes these as `6000 + variant index` in on-chain error responses.
#[error_code]
pub enum VrfClientError {
    /// The VRF account's authority is not this client state.
    #[msg("VRF account authority should be set to the client's state pubkey")]
    InvalidVrfAuthorityError,
    /// A result bound of zero cannot map any value.
    #[msg("Max result must be greater than zero")]
    InvalidMaxResult,
    /// The VRF account is not the one this client state is bound to, or its data is malformed.
    #[msg("Invalid VRF account provided")]
    InvalidVrfAccount,
    /// The account is not owned by, or is not, the bound oracle program.
    #[msg("Not a valid oracle program account")]
    InvalidOracleAccount,
    /// The VRF counter already reached the awaited value; consume it first.
    #[msg("A request is already awaiting its result")]
    RequestInFlight,
    /// The callback arrived while no request was outstanding.
    #[msg("No request is awaiting a result")]
    NoPendingRequest,
    /// The VRF counter is not the awaited successor (duplicate or stale response).
    #[msg("VRF counter does not match the awaited counter")]
    CounterMismatch,
    /// The invocation or registered callback differs from the expected descriptor.
    #[msg("Callback descriptor mismatch")]
    CallbackMismatch,
    /// The raffle list exceeds its fixed capacity.
    #[msg("Raffle list is too long")]
    RaffleListTooLong,
}
