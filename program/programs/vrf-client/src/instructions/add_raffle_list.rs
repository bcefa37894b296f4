use anchor_lang::prelude::*;

use crate::errors::VrfClientError;
use crate::state::{RaffleList, VrfClientState, MAX_RAFFLE_LIST_LEN, RAFFLE_LIST_SEED, STATE_SEED};

#[derive(Accounts)]
#[instruction(raffle_list: String)]
pub struct AddRaffleList<'info> {
    #[account(mut)]
    pub payer: Signer<'info>,

    /// Seeds: `["raffle_list", state]`. Written once.
    #[account(
        init,
        payer = payer,
        space = 8 + RaffleList::INIT_SPACE,
        seeds = [RAFFLE_LIST_SEED, state.key().as_ref()],
        bump,
    )]
    pub raffle_list: Account<'info, RaffleList>,

    #[account(
        seeds = [STATE_SEED, state.vrf.as_ref()],
        bump = state.bump,
    )]
    pub state: Account<'info, VrfClientState>,

    pub system_program: Program<'info, System>,
}

/// Store the entrant list drawn against the client's results.
pub fn handler(ctx: Context<AddRaffleList>, raffle_list: String) -> Result<()> {
    ctx.accounts.state.ensure_idle()?;
    require!(raffle_list.len() <= MAX_RAFFLE_LIST_LEN, VrfClientError::RaffleListTooLong);

    let list = &mut ctx.accounts.raffle_list;
    list.raffle_list = raffle_list;
    list.bump = ctx.bumps.raffle_list;
    Ok(())
}
