use anchor_lang::prelude::*;

pub mod errors;
pub mod events;
pub mod instructions;
pub mod oracle;
pub mod state;

use instructions::*;

declare_id!("5pictcJV8SRJVKX1Kpi8kXRzDcUubKR8J2xVpevG2Ngm");

/// Client program consuming verifiable randomness from an oracle queue.
///
/// A client state PDA is derived from the VRF account it serves and is that
/// account's authority. Results arrive through a callback frozen on the VRF
/// account when it was created.
///
/// ## Request lifecycle
///
/// 1. **Init**: `init_client` binds a state to a VRF account and fixes the
///    result bound.
/// 2. **Request**: `request_randomness` records the counter the next result
///    must carry and CPIs into the oracle program, signing as the state PDA.
/// 3. **Consume**: after verifying the oracle's proof, the oracle program
///    invokes `consume_randomness`, which stores the bounded result once.
#[program]
pub mod vrf_client {
    use super::*;

    /// Create the client state for a VRF account.
    pub fn init_client(ctx: Context<InitClient>, max_result: u64) -> Result<()> {
        instructions::init_client::handler(ctx, max_result)
    }

    /// Ask the oracle queue for the next result.
    ///
    /// Fails with `RequestInFlight` while a fulfilled result is still unconsumed.
    pub fn request_randomness(ctx: Context<RequestRandomness>, permission_bump: u8) -> Result<()> {
        instructions::request_randomness::handler(ctx, permission_bump)
    }

    /// Oracle callback storing a verified result.
    pub fn consume_randomness(ctx: Context<ConsumeRandomness>) -> Result<()> {
        instructions::consume_randomness::handler(ctx)
    }

    pub fn add_raffle_list(ctx: Context<AddRaffleList>, raffle_list: String) -> Result<()> {
        instructions::add_raffle_list::handler(ctx, raffle_list)
    }
}
