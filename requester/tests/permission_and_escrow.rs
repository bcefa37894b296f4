mod common;

use solana_sdk::signature::{Keypair, Signer};

use common::Fixture;
use vrf_requester::client::ClientStatus;
use vrf_requester::derivation::{permission_address, wrapped_sol_address};
use vrf_requester::error::DenialReason;
use vrf_requester::localnet::QueueConfig;
use vrf_requester::oracle::{PermissionFlags, PermissionRecord, VrfStatus};
use vrf_requester::poll::PollConfig;
use vrf_requester::{ErrorKind, RequesterError};

#[tokio::test]
async fn gated_queue_without_permission_denies_and_leaves_state_idle() {
    let fx = Fixture::with_queue(QueueConfig::gated);
    fx.manager.init_client(1337).await.unwrap();

    let err = fx.manager.request_randomness().await.unwrap_err();
    assert!(matches!(err, RequesterError::PermissionDenied(DenialReason::MissingPermission)));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    assert_eq!(fx.manager.status().await.unwrap(), ClientStatus::Idle);
    let vrf = fx.net.vrf_account(&fx.vrf).unwrap();
    assert_eq!(vrf.counter, 0);
    assert_eq!(vrf.status, VrfStatus::None);
}

#[tokio::test]
async fn queue_authority_can_grant_permission() {
    let fx = Fixture::with_queue(QueueConfig::gated);
    fx.manager.init_client(1337).await.unwrap();

    let (permission, bump) = fx.manager.ensure_permission(&fx.queue_authority).await.unwrap();
    let (expected, expected_bump) = permission_address(
        &fx.queue_authority.pubkey(),
        &fx.queue,
        &fx.vrf,
        &fx.net.oracle_program(),
    )
    .unwrap();
    assert_eq!((permission, bump), (expected, expected_bump));

    let record = PermissionRecord::decode(&fx.net.account(&permission).unwrap().unwrap().data).unwrap();
    assert!(record.permissions.contains(PermissionFlags::VRF_REQUESTS));
    assert_eq!(record.grantee, fx.vrf);

    // Granting again is a no-op.
    assert_eq!(
        fx.manager.ensure_permission(&fx.queue_authority).await.unwrap(),
        (permission, bump)
    );

    let ticket = fx.manager.request_randomness().await.unwrap();
    fx.net.fulfill(&fx.oracle, &fx.vrf, b"secret").unwrap();
    let result = fx.manager.await_result(&ticket, &PollConfig::default()).await.unwrap();
    assert_eq!(result.counter, 1);
}

#[tokio::test]
async fn only_queue_authority_can_grant_permission() {
    let fx = Fixture::with_queue(QueueConfig::gated);
    fx.manager.init_client(1337).await.unwrap();

    let err = fx.manager.ensure_permission(&Keypair::new()).await.unwrap_err();
    assert!(matches!(err, RequesterError::PermissionDenied(DenialReason::AuthorityMismatch)));
    let err = fx.manager.request_randomness().await.unwrap_err();
    assert!(matches!(err, RequesterError::PermissionDenied(DenialReason::MissingPermission)));
}

#[tokio::test]
async fn queue_without_oracles_is_unavailable() {
    let fx = Fixture::initialized(1337).await;
    fx.net.update_queue(&fx.queue, |queue| queue.oracles.clear()).unwrap();

    let err = fx.manager.request_randomness().await.unwrap_err();
    assert!(matches!(err, RequesterError::QueueUnavailable(key, _) if key == fx.queue));
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert_eq!(fx.manager.status().await.unwrap(), ClientStatus::Idle);
}

#[tokio::test]
async fn reward_moves_from_payer_through_escrow_to_oracle() {
    let fx = Fixture::with_queue(|config| config.reward(5_000));
    fx.manager.init_client(1337).await.unwrap();

    let ticket = fx.manager.request_randomness().await.unwrap();
    let escrow = fx.net.vrf_account(&fx.vrf).unwrap().escrow;
    let payer_wallet = wrapped_sol_address(&fx.payer.pubkey()).unwrap();
    assert_eq!(fx.token_balance(&escrow), 5_000);
    assert_eq!(fx.token_balance(&payer_wallet), 0);

    fx.net.fulfill(&fx.oracle, &fx.vrf, b"secret").unwrap();
    fx.manager.await_result(&ticket, &PollConfig::default()).await.unwrap();

    let oracle_wallet = wrapped_sol_address(&fx.oracle.pubkey()).unwrap();
    assert_eq!(fx.token_balance(&escrow), 0);
    assert_eq!(fx.token_balance(&oracle_wallet), 5_000);
}

#[tokio::test]
async fn underfunded_payer_cannot_request() {
    let fx = Fixture::with_queue(|config| config.reward(common::PAYER_LAMPORTS * 2));
    fx.manager.init_client(1337).await.unwrap();

    let err = fx.manager.request_randomness().await.unwrap_err();
    assert!(matches!(err, RequesterError::EscrowUnavailable(_)));
    assert_eq!(err.kind(), ErrorKind::Resource);
    assert_eq!(fx.manager.status().await.unwrap(), ClientStatus::Idle);
    assert_eq!(fx.net.lamports(&fx.payer.pubkey()).unwrap(), common::PAYER_LAMPORTS);
}
