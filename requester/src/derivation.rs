//! Deterministic program-derived addresses.
//!
//! An address is derived from a fixed tag plus variable seeds and a one-byte
//! bump. The bump search walks `255..=0` and keeps the first candidate that is
//! off the ed25519 curve, which is the canonical bump the runtime and Anchor's
//! `seeds`/`bump` constraints verify against. An off-curve address has no
//! private key, so only the owning program can sign for it.

use solana_sdk::pubkey::Pubkey;

use crate::error::{RequesterError, Result};

/// Seed tag of the client state account.
pub const CLIENT_STATE_SEED: &[u8] = b"CLIENTSEED";
/// Seed tag of oracle permission records.
pub const PERMISSION_SEED: &[u8] = b"PermissionAccountData";
/// Seed tag of the raffle list attached to a client state.
pub const RAFFLE_LIST_SEED: &[u8] = b"raffle_list";

/// Runtime limits on seeds (the bump occupies the last slot).
pub const MAX_SEEDS: usize = 16;
pub const MAX_SEED_LEN: usize = 32;

pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey::new_from_array([0; 32]);
pub const TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey = Pubkey::new_from_array([
    140, 151, 37, 143, 78, 36, 137, 241, 187, 61, 16, 41, 20, 142, 13, 131, 11, 90, 19, 153, 218,
    255, 16, 132, 4, 142, 123, 216, 219, 233, 248, 89,
]);
pub const NATIVE_MINT: Pubkey = Pubkey::new_from_array([
    6, 155, 136, 87, 254, 171, 129, 132, 251, 104, 127, 99, 70, 24, 192, 53, 218, 196, 57, 220,
    26, 235, 59, 85, 152, 160, 240, 0, 0, 0, 0, 1,
]);

/// Derive `(address, bump)` for `seeds` under `program_id`.
///
/// Fails with [`RequesterError::InvalidSeeds`] when the seeds break the
/// runtime limits and with [`RequesterError::DerivationExhausted`] when every
/// bump lands on the curve.
pub fn derive(seeds: &[&[u8]], program_id: &Pubkey) -> Result<(Pubkey, u8)> {
    if seeds.len() >= MAX_SEEDS {
        return Err(RequesterError::InvalidSeeds(format!(
            "{} seeds given, at most {} allowed",
            seeds.len(),
            MAX_SEEDS - 1
        )));
    }
    if let Some(long) = seeds.iter().find(|seed| seed.len() > MAX_SEED_LEN) {
        return Err(RequesterError::InvalidSeeds(format!(
            "seed of {} bytes exceeds {MAX_SEED_LEN}",
            long.len()
        )));
    }

    for bump in (0..=u8::MAX).rev() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);
        if let Ok(address) = Pubkey::create_program_address(&with_bump, program_id) {
            return Ok((address, bump));
        }
    }
    Err(RequesterError::DerivationExhausted)
}

/// Client state: `["CLIENTSEED", vrf]` under the client program.
pub fn client_state_address(vrf: &Pubkey, client_program: &Pubkey) -> Result<(Pubkey, u8)> {
    derive(&[CLIENT_STATE_SEED, vrf.as_ref()], client_program)
}

/// Permission record: `["PermissionAccountData", authority, granter, grantee]`
/// under the oracle program.
pub fn permission_address(
    queue_authority: &Pubkey,
    queue: &Pubkey,
    vrf: &Pubkey,
    oracle_program: &Pubkey,
) -> Result<(Pubkey, u8)> {
    derive(
        &[
            PERMISSION_SEED,
            queue_authority.as_ref(),
            queue.as_ref(),
            vrf.as_ref(),
        ],
        oracle_program,
    )
}

/// Raffle list: `["raffle_list", client_state]` under the client program.
pub fn raffle_list_address(client_state: &Pubkey, client_program: &Pubkey) -> Result<(Pubkey, u8)> {
    derive(&[RAFFLE_LIST_SEED, client_state.as_ref()], client_program)
}

/// Associated wrapped-SOL token account of `owner`.
pub fn wrapped_sol_address(owner: &Pubkey) -> Result<Pubkey> {
    derive(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), NATIVE_MINT.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .map(|(address, _)| address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let program = Pubkey::new_unique();
        let vrf = Pubkey::new_unique();
        let first = client_state_address(&vrf, &program).unwrap();
        let second = client_state_address(&vrf, &program).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn derived_address_is_off_curve() {
        let program = Pubkey::new_unique();
        let (address, _) = derive(&[b"tag", Pubkey::new_unique().as_ref()], &program).unwrap();
        assert!(!address.is_on_curve());
    }

    #[test]
    fn matches_runtime_canonical_bump() {
        let program = Pubkey::new_unique();
        let vrf = Pubkey::new_unique();
        let ours = client_state_address(&vrf, &program).unwrap();
        let runtime = Pubkey::find_program_address(&[CLIENT_STATE_SEED, vrf.as_ref()], &program);
        assert_eq!(ours, runtime);
    }

    #[test]
    fn different_vrf_accounts_get_different_state() {
        let program = Pubkey::new_unique();
        let a = client_state_address(&Pubkey::new_unique(), &program).unwrap();
        let b = client_state_address(&Pubkey::new_unique(), &program).unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn rejects_oversized_seed() {
        let program = Pubkey::new_unique();
        let err = derive(&[&[0u8; 33]], &program).unwrap_err();
        assert!(matches!(err, RequesterError::InvalidSeeds(_)));
    }

    #[test]
    fn rejects_too_many_seeds() {
        let program = Pubkey::new_unique();
        let seeds: Vec<&[u8]> = vec![b"s".as_slice(); MAX_SEEDS];
        let err = derive(&seeds, &program).unwrap_err();
        assert!(matches!(err, RequesterError::InvalidSeeds(_)));
    }
}
