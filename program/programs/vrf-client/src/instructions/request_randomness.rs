use anchor_lang::prelude::*;
use anchor_lang::solana_program::program::invoke_signed;

use crate::errors::VrfClientError;
use crate::events::RandomnessRequested;
use crate::oracle::{VrfAccountData, VrfRequestAccounts, TOKEN_PROGRAM_ID};
use crate::state::{VrfClientState, STATE_SEED};

/// Accounts required to ask the oracle queue for randomness.
///
/// Everything after `state` is forwarded to the oracle program, with the
/// state PDA signing as the VRF authority.
#[derive(Accounts)]
pub struct RequestRandomness<'info> {
    #[account(
        mut,
        seeds = [STATE_SEED, vrf.key().as_ref()],
        bump = state.bump,
        has_one = vrf @ VrfClientError::InvalidVrfAccount,
        has_one = oracle_program @ VrfClientError::InvalidOracleAccount,
    )]
    pub state: Account<'info, VrfClientState>,

    /// CHECK: Owned by the bound oracle program; decoded in the handler.
    #[account(mut, owner = oracle_program.key() @ VrfClientError::InvalidOracleAccount)]
    pub vrf: UncheckedAccount<'info>,

    /// CHECK: Validated by the oracle program.
    #[account(mut)]
    pub oracle_queue: UncheckedAccount<'info>,

    /// CHECK: Validated by the oracle program.
    pub queue_authority: UncheckedAccount<'info>,

    /// CHECK: Validated by the oracle program.
    pub permission: UncheckedAccount<'info>,

    /// CHECK: Validated by the oracle program.
    #[account(mut)]
    pub escrow: UncheckedAccount<'info>,

    /// CHECK: Wrapped SOL account debited for any escrow shortfall.
    #[account(mut)]
    pub payer_wallet: UncheckedAccount<'info>,

    pub payer_authority: Signer<'info>,

    /// CHECK: Address constrained to the SPL token program.
    #[account(address = TOKEN_PROGRAM_ID)]
    pub token_program: UncheckedAccount<'info>,

    /// CHECK: Matched against the program recorded on the state.
    #[account(executable)]
    pub oracle_program: UncheckedAccount<'info>,
}

/// Arm the client state and CPI into `vrf_request_randomness`.
pub fn handler(ctx: Context<RequestRandomness>, permission_bump: u8) -> Result<()> {
    let vrf = VrfAccountData::load(&ctx.accounts.vrf)?;
    let state_key = ctx.accounts.state.key();
    require_keys_eq!(vrf.authority, state_key, VrfClientError::InvalidVrfAuthorityError);

    let expected_counter = ctx.accounts.state.begin_request(vrf.counter)?;

    let accounts = &ctx.accounts;
    let state_info = accounts.state.to_account_info();
    let payer_authority = accounts.payer_authority.to_account_info();
    let cpi = VrfRequestAccounts {
        authority: &state_info,
        vrf: &accounts.vrf,
        oracle_queue: &accounts.oracle_queue,
        queue_authority: &accounts.queue_authority,
        permission: &accounts.permission,
        escrow: &accounts.escrow,
        payer_wallet: &accounts.payer_wallet,
        payer_authority: &payer_authority,
        token_program: &accounts.token_program,
    };
    let ix = cpi.instruction(accounts.oracle_program.key(), permission_bump);

    // The state must be serialized before the CPI reads it as a signer.
    accounts.state.exit(&crate::ID)?;

    let vrf_key = accounts.vrf.key();
    let signer_seeds: &[&[u8]] = &[STATE_SEED, vrf_key.as_ref(), &[accounts.state.bump]];
    let mut infos = cpi.infos();
    infos.push(accounts.oracle_program.to_account_info());
    invoke_signed(&ix, &infos, &[signer_seeds])?;

    msg!("Randomness requested, awaiting counter {}", expected_counter);
    emit!(RandomnessRequested {
        vrf_client: state_key,
        expected_counter,
        timestamp: Clock::get()?.unix_timestamp,
    });
    Ok(())
}
