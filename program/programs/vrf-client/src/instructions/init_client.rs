use anchor_lang::prelude::*;

use crate::errors::VrfClientError;
use crate::events::VrfClientCreated;
use crate::oracle::VrfAccountData;
use crate::state::{VrfClientState, STATE_SEED};

/// Accounts required to create the client state for a VRF account.
#[derive(Accounts)]
#[instruction(max_result: u64)]
pub struct InitClient<'info> {
    /// Client state PDA. Seeds: `["CLIENTSEED", vrf]`.
    #[account(
        init,
        payer = payer,
        space = 8 + VrfClientState::INIT_SPACE,
        seeds = [STATE_SEED, vrf.key().as_ref()],
        bump,
    )]
    pub state: Account<'info, VrfClientState>,

    /// VRF account the state binds to. Its owner becomes the bound oracle program.
    /// CHECK: Decoded and validated in the handler.
    pub vrf: UncheckedAccount<'info>,

    #[account(mut)]
    pub payer: Signer<'info>,

    pub system_program: Program<'info, System>,
}

/// Bind a new client state to `vrf`.
///
/// The VRF account must already name the state PDA as its authority.
pub fn handler(ctx: Context<InitClient>, max_result: u64) -> Result<()> {
    require!(max_result > 0, VrfClientError::InvalidMaxResult);

    let state_key = ctx.accounts.state.key();
    let vrf_key = ctx.accounts.vrf.key();
    let vrf = VrfAccountData::load(&ctx.accounts.vrf)?;
    require_keys_eq!(vrf.authority, state_key, VrfClientError::InvalidVrfAuthorityError);

    let now = Clock::get()?.unix_timestamp;
    let state = &mut ctx.accounts.state;
    state.bump = ctx.bumps.state;
    state.max_result = max_result;
    state.vrf = vrf_key;
    state.oracle_program = *ctx.accounts.vrf.owner;

    emit!(VrfClientCreated {
        vrf_client: state_key,
        vrf: vrf_key,
        max_result,
        timestamp: now,
    });
    Ok(())
}
