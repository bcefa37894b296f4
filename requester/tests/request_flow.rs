mod common;

use std::time::Duration;

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::signature::{Keypair, Signer};

use common::{raw_lane, Fixture};
use vrf_requester::client::add_raffle_list_ix;
use vrf_requester::derivation::raffle_list_address;
use vrf_requester::network::OracleNetwork;
use vrf_requester::client::ClientStatus;
use vrf_requester::layout::instruction_discriminator;
use vrf_requester::oracle::VrfStatus;
use vrf_requester::poll::PollConfig;
use vrf_requester::{ErrorKind, RequesterError};

#[tokio::test]
async fn fulfilled_request_is_consumed_with_bounded_value() {
    let fx = Fixture::initialized(1337).await;
    assert_eq!(fx.manager.status().await.unwrap(), ClientStatus::Idle);

    let ticket = fx.manager.request_randomness().await.unwrap();
    assert_eq!(ticket.expected_counter, 1);
    assert_eq!(ticket.client_state, fx.client_state);
    assert_eq!(fx.net.vrf_account(&fx.vrf).unwrap().request_slot, ticket.submitted_slot);
    assert_eq!(
        fx.manager.status().await.unwrap(),
        ClientStatus::AwaitingResult { expected_counter: 1 }
    );

    fx.net.fulfill_with(&fx.oracle, &fx.vrf, 1, raw_lane(999_999)).unwrap();

    let result = fx.manager.await_result(&ticket, &PollConfig::default()).await.unwrap();
    assert_eq!(result.counter, 1);
    assert_eq!(result.value, 999_999 % 1337);
    assert_eq!(result.raw, raw_lane(999_999));
    assert_eq!(fx.manager.get_result().await.unwrap(), result);
    assert_eq!(fx.manager.status().await.unwrap(), ClientStatus::Idle);

    let log = fx.net.callback_log().unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].succeeded());
    assert_eq!(log[0].counter, 1);
}

#[tokio::test]
async fn honest_oracle_results_stay_in_range_across_requests() {
    let fx = Fixture::initialized(6).await;
    for expected in 1..=5u64 {
        let ticket = fx.manager.request_randomness().await.unwrap();
        assert_eq!(ticket.expected_counter, expected);
        fx.net.fulfill(&fx.oracle, &fx.vrf, b"oracle secret").unwrap();

        let result = fx.manager.await_result(&ticket, &PollConfig::default()).await.unwrap();
        assert_eq!(result.counter, expected);
        assert!(result.value < 6);
    }
    assert_eq!(fx.net.vrf_account(&fx.vrf).unwrap().counter, 5);
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_without_touching_state() {
    let fx = Fixture::initialized(1337).await;
    let ticket = fx.manager.request_randomness().await.unwrap();

    let config = PollConfig::default();
    let err = fx.manager.await_result(&ticket, &config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    match err {
        RequesterError::Timeout { expected_counter, waited } => {
            assert_eq!(expected_counter, 1);
            assert!(waited >= Duration::from_secs(45));
            assert!(waited < Duration::from_secs(46));
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    let result = fx.manager.get_result().await.unwrap();
    assert_eq!(result.counter, 0);
    assert_eq!(
        fx.manager.status().await.unwrap(),
        ClientStatus::AwaitingResult { expected_counter: 1 }
    );
}

#[tokio::test]
async fn unresolved_request_may_be_resubmitted() {
    let fx = Fixture::initialized(100).await;
    let first = fx.manager.request_randomness().await.unwrap();
    let first_seed = fx.net.vrf_account(&fx.vrf).unwrap().request_seed;

    let second = fx.manager.request_randomness().await.unwrap();
    assert_eq!(second.expected_counter, first.expected_counter);
    assert_ne!(fx.net.vrf_account(&fx.vrf).unwrap().request_seed, first_seed);

    fx.net.fulfill(&fx.oracle, &fx.vrf, b"secret").unwrap();
    let result = fx.manager.await_result(&second, &PollConfig::default()).await.unwrap();
    assert_eq!(result.counter, 1);
}

#[tokio::test]
async fn duplicate_and_stale_oracle_responses_are_rejected() {
    let fx = Fixture::initialized(1337).await;
    let ticket = fx.manager.request_randomness().await.unwrap();

    let err = fx.net.fulfill_with(&fx.oracle, &fx.vrf, 2, raw_lane(7)).unwrap_err();
    assert!(matches!(err, RequesterError::CounterMismatch { expected: 1, observed: 2 }));

    fx.net.fulfill_with(&fx.oracle, &fx.vrf, 1, raw_lane(42)).unwrap();
    let result = fx.manager.await_result(&ticket, &PollConfig::default()).await.unwrap();

    let err = fx.net.fulfill_with(&fx.oracle, &fx.vrf, 1, raw_lane(43)).unwrap_err();
    assert!(matches!(err, RequesterError::NoPendingRequest));
    assert_eq!(err.kind(), ErrorKind::Protocol);

    assert_eq!(fx.manager.get_result().await.unwrap(), result);
    assert_eq!(result.value, 42);
}

#[tokio::test]
async fn response_from_outside_the_queue_is_rejected() {
    let fx = Fixture::initialized(1337).await;
    fx.manager.request_randomness().await.unwrap();

    let impostor = Keypair::new();
    let err = fx.net.fulfill(&impostor, &fx.vrf, b"secret").unwrap_err();
    assert!(matches!(err, RequesterError::UnknownOracle(_)));
    assert_eq!(fx.net.vrf_account(&fx.vrf).unwrap().status, VrfStatus::RequestPending);
}

#[tokio::test]
async fn callback_with_wrong_accounts_is_rejected_without_mutation() {
    let fx = Fixture::initialized(1337).await;
    fx.manager.request_randomness().await.unwrap();
    let before = fx.net.account(&fx.client_state).unwrap();

    let forged = Instruction {
        program_id: fx.net.client_program(),
        accounts: vec![
            AccountMeta::new(fx.client_state, false),
            AccountMeta::new(fx.vrf, false),
        ],
        data: instruction_discriminator("consume_randomness").to_vec(),
    };
    let err = fx.net.invoke_callback(&forged).unwrap_err();
    assert!(matches!(err, RequesterError::DescriptorMismatch(_)));
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(fx.net.account(&fx.client_state).unwrap(), before);
}

#[tokio::test]
async fn mismatched_callback_is_refused_before_submission() {
    let fx = Fixture::with_callback(|mut callback| {
        callback.accounts[1].is_writable = true;
        callback
    });
    fx.manager.init_client(1337).await.unwrap();
    let before = fx.net.account(&fx.client_state).unwrap();

    let err = fx.manager.request_randomness().await.unwrap_err();
    assert!(matches!(err, RequesterError::DescriptorMismatch(_)), "{err:?}");
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert_eq!(fx.net.account(&fx.client_state).unwrap(), before);
    assert_eq!(fx.net.vrf_account(&fx.vrf).unwrap().status, VrfStatus::None);
}

#[tokio::test]
async fn callback_before_any_fulfillment_is_rejected() {
    let fx = Fixture::initialized(1337).await;
    fx.manager.request_randomness().await.unwrap();

    let genuine = Instruction {
        program_id: fx.net.client_program(),
        accounts: vec![
            AccountMeta::new(fx.client_state, false),
            AccountMeta::new_readonly(fx.vrf, false),
        ],
        data: instruction_discriminator("consume_randomness").to_vec(),
    };
    let err = fx.net.invoke_callback(&genuine).unwrap_err();
    assert!(matches!(err, RequesterError::CounterMismatch { expected: 1, observed: 0 }));
    assert_eq!(fx.manager.get_result().await.unwrap().counter, 0);
}

#[tokio::test]
async fn request_before_init_is_refused() {
    let fx = Fixture::open();
    assert_eq!(fx.manager.status().await.unwrap(), ClientStatus::Uninitialized);
    let err = fx.manager.request_randomness().await.unwrap_err();
    assert!(matches!(err, RequesterError::NotInitialized(key) if key == fx.client_state));
    assert!(fx.net.account(&fx.client_state).unwrap().is_none());
}

#[tokio::test]
async fn init_is_rejected_twice_and_for_zero_bound() {
    let fx = Fixture::open();
    let err = fx.manager.init_client(0).await.unwrap_err();
    assert!(matches!(err, RequesterError::InvalidMaxResult));
    assert_eq!(err.kind(), ErrorKind::Configuration);

    fx.manager.init_client(10).await.unwrap();
    let err = fx.manager.init_client(10).await.unwrap_err();
    assert!(matches!(err, RequesterError::AlreadyInitialized(key) if key == fx.client_state));
}

#[tokio::test]
async fn raffle_winner_follows_consumed_result() {
    let fx = Fixture::initialized(1337).await;
    fx.manager.add_raffle_list("alice, bob, carol").await.unwrap();

    let ticket = fx.manager.request_randomness().await.unwrap();
    fx.net.fulfill_with(&fx.oracle, &fx.vrf, 1, raw_lane(999_999)).unwrap();
    let result = fx.manager.await_result(&ticket, &PollConfig::default()).await.unwrap();

    let list = fx.manager.raffle_list().await.unwrap().unwrap();
    assert_eq!(list.entrants(), ["alice", "bob", "carol"]);
    let expected = ["alice", "bob", "carol"][(result.value % 3) as usize];
    assert_eq!(list.pick_winner(result.value), Some(expected));
}

#[tokio::test]
async fn raffle_list_is_written_once() {
    let fx = Fixture::initialized(1337).await;
    let raffle_list = fx.manager.add_raffle_list("alice,bob").await.unwrap();

    let err = fx.manager.add_raffle_list("bob,bob").await.unwrap_err();
    assert!(matches!(err, RequesterError::AlreadyInitialized(key) if key == raffle_list));

    // Straight to the ledger, skipping the manager's own check.
    let ix = add_raffle_list_ix(
        &fx.net.client_program(),
        &fx.payer.pubkey(),
        &raffle_list,
        &fx.client_state,
        "bob,bob",
    );
    let err = fx.net.send_instructions(&[ix], &fx.payer, &[]).await.unwrap_err();
    assert!(matches!(err, RequesterError::AlreadyInitialized(key) if key == raffle_list));

    let list = fx.manager.raffle_list().await.unwrap().unwrap();
    assert_eq!(list.entrants(), ["alice", "bob"]);
}

#[tokio::test]
async fn raffle_list_cannot_be_attached_while_awaiting_a_result() {
    let fx = Fixture::initialized(1337).await;
    let ticket = fx.manager.request_randomness().await.unwrap();

    let err = fx.manager.add_raffle_list("alice,bob").await.unwrap_err();
    assert!(matches!(
        err,
        RequesterError::RequestInFlight { expected_counter } if expected_counter == ticket.expected_counter
    ));

    let (raffle_list, _) = raffle_list_address(&fx.client_state, &fx.net.client_program()).unwrap();
    let ix = add_raffle_list_ix(
        &fx.net.client_program(),
        &fx.payer.pubkey(),
        &raffle_list,
        &fx.client_state,
        "alice,bob",
    );
    let err = fx.net.send_instructions(&[ix], &fx.payer, &[]).await.unwrap_err();
    assert!(matches!(err, RequesterError::RequestInFlight { .. }));
    assert!(fx.net.account(&raffle_list).unwrap().is_none());
}
