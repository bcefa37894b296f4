//! Permission gate: may this VRF account request randomness from a queue?
//!
//! Evaluated from freshly fetched queue and permission accounts before every
//! request. Nothing here is cached.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::{debug, info};

use crate::derivation::permission_address;
use crate::error::{DenialReason, RequesterError, Result};
use crate::network::{fetch_permission, OracleNetwork};
use crate::oracle::{permission_init_ix, permission_set_ix, OracleQueue, PermissionFlags, PermissionRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Allowed,
    Denied(DenialReason),
}

impl Authorization {
    pub fn into_result(self) -> Result<()> {
        match self {
            Authorization::Allowed => Ok(()),
            Authorization::Denied(reason) => Err(RequesterError::PermissionDenied(reason)),
        }
    }
}

/// Decide whether `vrf` may request randomness from `queue`.
///
/// Queues with unpermissioned VRF enabled always allow. Otherwise a record
/// granted by the queue authority to exactly this (queue, vrf) pair with the
/// VRF request bit set, and not expired at `now`, is required.
pub fn authorize(
    queue_key: &Pubkey,
    queue: &OracleQueue,
    vrf: &Pubkey,
    permission: Option<&PermissionRecord>,
    now: i64,
) -> Authorization {
    if queue.unpermissioned_vrf_enabled {
        return Authorization::Allowed;
    }
    let Some(record) = permission else {
        return Authorization::Denied(DenialReason::MissingPermission);
    };
    if record.granter != *queue_key || record.grantee != *vrf {
        return Authorization::Denied(DenialReason::RecordMismatch);
    }
    if record.authority != queue.authority {
        return Authorization::Denied(DenialReason::AuthorityMismatch);
    }
    if !record.permissions.contains(PermissionFlags::VRF_REQUESTS) {
        return Authorization::Denied(DenialReason::VrfPermitNotSet);
    }
    if record.expiration != 0 && record.expiration <= now {
        return Authorization::Denied(DenialReason::Expired);
    }
    Authorization::Allowed
}

/// Create the permission record if absent and enable VRF requests on it.
///
/// Only the queue authority can enable the record; any other signer is
/// refused before a transaction is built. Returns the record address and
/// bump, which is the single source of truth for where the record lives.
pub async fn ensure_permission<N: OracleNetwork>(
    network: &N,
    oracle_program: &Pubkey,
    queue_key: &Pubkey,
    queue: &OracleQueue,
    vrf: &Pubkey,
    queue_authority: &Keypair,
    payer: &Keypair,
) -> Result<(Pubkey, u8)> {
    let (permission, bump) = permission_address(&queue.authority, queue_key, vrf, oracle_program)?;
    if queue.unpermissioned_vrf_enabled {
        debug!(queue = %queue_key, "Queue allows unpermissioned VRF requests");
        return Ok((permission, bump));
    }
    if queue_authority.pubkey() != queue.authority {
        return Err(RequesterError::PermissionDenied(DenialReason::AuthorityMismatch));
    }

    let existing = fetch_permission(network, &permission).await?;
    if let Some(record) = &existing {
        if record.permissions.contains(PermissionFlags::VRF_REQUESTS) {
            return Ok((permission, bump));
        }
    }

    let mut instructions = Vec::with_capacity(2);
    if existing.is_none() {
        instructions.push(permission_init_ix(
            oracle_program,
            &permission,
            &queue.authority,
            queue_key,
            vrf,
            &payer.pubkey(),
        ));
    }
    instructions.push(permission_set_ix(
        oracle_program,
        &permission,
        &queue.authority,
        PermissionFlags::VRF_REQUESTS,
        true,
    ));

    let signature = network
        .send_instructions(&instructions, payer, &[queue_authority])
        .await?;
    info!(
        permission = %permission,
        vrf = %vrf,
        created = existing.is_none(),
        signature = %signature,
        "Enabled VRF permission"
    );
    Ok((permission, bump))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gated_queue(authority: Pubkey) -> OracleQueue {
        OracleQueue {
            authority,
            reward: 0,
            min_stake: 0,
            oracle_timeout: 900,
            unpermissioned_feeds_enabled: false,
            unpermissioned_vrf_enabled: false,
            max_size: 10,
            oracles: vec![Pubkey::new_unique()],
            curr_idx: 0,
        }
    }

    fn granted(authority: Pubkey, queue: Pubkey, vrf: Pubkey) -> PermissionRecord {
        PermissionRecord {
            authority,
            permissions: PermissionFlags(PermissionFlags::VRF_REQUESTS),
            granter: queue,
            grantee: vrf,
            expiration: 0,
        }
    }

    #[test]
    fn unpermissioned_queue_always_allows() {
        let mut queue = gated_queue(Pubkey::new_unique());
        queue.unpermissioned_vrf_enabled = true;
        let auth = authorize(&Pubkey::new_unique(), &queue, &Pubkey::new_unique(), None, 0);
        assert_eq!(auth, Authorization::Allowed);
    }

    #[test]
    fn gated_queue_requires_matching_record() {
        let authority = Pubkey::new_unique();
        let queue_key = Pubkey::new_unique();
        let vrf = Pubkey::new_unique();
        let queue = gated_queue(authority);

        assert_eq!(
            authorize(&queue_key, &queue, &vrf, None, 0),
            Authorization::Denied(DenialReason::MissingPermission)
        );
        let record = granted(authority, queue_key, vrf);
        assert_eq!(authorize(&queue_key, &queue, &vrf, Some(&record), 0), Authorization::Allowed);
        assert_eq!(
            authorize(&queue_key, &queue, &Pubkey::new_unique(), Some(&record), 0),
            Authorization::Denied(DenialReason::RecordMismatch)
        );
    }

    #[test]
    fn record_from_foreign_authority_is_denied() {
        let queue_key = Pubkey::new_unique();
        let vrf = Pubkey::new_unique();
        let queue = gated_queue(Pubkey::new_unique());
        let record = granted(Pubkey::new_unique(), queue_key, vrf);
        let auth = authorize(&queue_key, &queue, &vrf, Some(&record), 0);
        assert_eq!(auth, Authorization::Denied(DenialReason::AuthorityMismatch));
        assert!(matches!(
            auth.into_result(),
            Err(RequesterError::PermissionDenied(DenialReason::AuthorityMismatch))
        ));
    }

    #[test]
    fn missing_bit_and_expiry_are_denied() {
        let authority = Pubkey::new_unique();
        let queue_key = Pubkey::new_unique();
        let vrf = Pubkey::new_unique();
        let queue = gated_queue(authority);

        let mut record = granted(authority, queue_key, vrf);
        record.permissions = PermissionFlags(PermissionFlags::ORACLE_HEARTBEAT);
        assert_eq!(
            authorize(&queue_key, &queue, &vrf, Some(&record), 0),
            Authorization::Denied(DenialReason::VrfPermitNotSet)
        );

        let mut record = granted(authority, queue_key, vrf);
        record.expiration = 100;
        assert_eq!(authorize(&queue_key, &queue, &vrf, Some(&record), 99), Authorization::Allowed);
        assert_eq!(
            authorize(&queue_key, &queue, &vrf, Some(&record), 100),
            Authorization::Denied(DenialReason::Expired)
        );
    }
}
