use anchor_lang::prelude::*;

use crate::errors::VrfClientError;
use crate::events::VrfClientUpdated;
use crate::oracle::{CallbackData, VrfAccountData};
use crate::state::{VrfClientState, STATE_SEED};

/// Callback invoked by the oracle program once a result is verified.
///
/// The account list must be exactly `[state (w), vrf]`, matching the
/// descriptor registered on the VRF account.
#[derive(Accounts)]
pub struct ConsumeRandomness<'info> {
    #[account(
        mut,
        seeds = [STATE_SEED, vrf.key().as_ref()],
        bump = state.bump,
        has_one = vrf @ VrfClientError::InvalidVrfAccount,
    )]
    pub state: Account<'info, VrfClientState>,

    /// CHECK: Owner checked against the bound oracle program in the handler.
    pub vrf: UncheckedAccount<'info>,
}

pub fn handler(ctx: Context<ConsumeRandomness>) -> Result<()> {
    require!(ctx.remaining_accounts.is_empty(), VrfClientError::CallbackMismatch);
    require!(!ctx.accounts.vrf.is_writable, VrfClientError::CallbackMismatch);
    require_keys_eq!(
        *ctx.accounts.vrf.owner,
        ctx.accounts.state.oracle_program,
        VrfClientError::InvalidOracleAccount
    );

    let state_key = ctx.accounts.state.key();
    let vrf_key = ctx.accounts.vrf.key();
    let vrf = VrfAccountData::load(&ctx.accounts.vrf)?;
    require!(
        vrf.callback == CallbackData::expected(state_key, vrf_key),
        VrfClientError::CallbackMismatch
    );

    let now = Clock::get()?.unix_timestamp;
    let state = &mut ctx.accounts.state;
    state.apply_callback(&vrf, now)?;

    msg!("Result {} consumed at counter {}", state.result, state.counter);
    emit!(VrfClientUpdated {
        vrf_client: state_key,
        counter: state.counter,
        max_result: state.max_result,
        result: state.result,
        result_buffer: state.result_buffer,
        timestamp: now,
    });
    Ok(())
}
