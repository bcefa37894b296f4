#![allow(dead_code)]

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

use vrf_requester::callback::{expected_callback, CallbackDescriptor};
use vrf_requester::derivation::client_state_address;
use vrf_requester::localnet::{Localnet, QueueConfig};
use vrf_requester::oracle::TokenAccount;
use vrf_requester::{ClientBinding, RequestManager};

pub const PAYER_LAMPORTS: u64 = 1_000_000_000;

/// One queue served by one oracle, one VRF account wired to this client's
/// callback, and a funded payer.
pub struct Fixture {
    pub net: Arc<Localnet>,
    pub manager: RequestManager<Localnet>,
    pub payer: Arc<Keypair>,
    pub oracle: Keypair,
    pub queue_authority: Keypair,
    pub queue: Pubkey,
    pub vrf: Pubkey,
    pub client_state: Pubkey,
}

impl Fixture {
    pub fn open() -> Self {
        Self::with_queue(|config| config)
    }

    pub fn with_queue(configure: impl FnOnce(QueueConfig) -> QueueConfig) -> Self {
        Self::build(configure, |callback| callback)
    }

    /// VRF account registered with `register(expected callback)` instead of
    /// this client's own callback.
    pub fn with_callback(register: impl FnOnce(CallbackDescriptor) -> CallbackDescriptor) -> Self {
        Self::build(|config| config, register)
    }

    fn build(
        configure: impl FnOnce(QueueConfig) -> QueueConfig,
        register: impl FnOnce(CallbackDescriptor) -> CallbackDescriptor,
    ) -> Self {
        let net = Arc::new(Localnet::new(Pubkey::new_unique(), Pubkey::new_unique()));
        let queue_authority = Keypair::new();
        let queue = net
            .create_queue(configure(QueueConfig::new(queue_authority.pubkey())))
            .unwrap();
        let oracle = Keypair::new();
        net.add_oracle(&queue, &oracle.pubkey()).unwrap();

        let vrf = Pubkey::new_unique();
        let (client_state, _) = client_state_address(&vrf, &net.client_program()).unwrap();
        net.create_vrf_account(
            &vrf,
            &client_state,
            &queue,
            register(expected_callback(&net.client_program(), &client_state, &vrf)),
        )
        .unwrap();

        let payer = Arc::new(Keypair::new());
        net.airdrop(&payer.pubkey(), PAYER_LAMPORTS).unwrap();

        let binding = ClientBinding {
            client_program: net.client_program(),
            oracle_program: net.oracle_program(),
            vrf,
            queue,
        };
        let manager = RequestManager::new(net.clone(), binding, payer.clone()).unwrap();
        Self {
            net,
            manager,
            payer,
            oracle,
            queue_authority,
            queue,
            vrf,
            client_state,
        }
    }

    /// Same as [`Fixture::open`] with the client state already initialised.
    pub async fn initialized(max_result: u64) -> Self {
        let fixture = Self::open();
        fixture.manager.init_client(max_result).await.unwrap();
        fixture
    }

    pub fn token_balance(&self, wallet: &Pubkey) -> u64 {
        self.net
            .account(wallet)
            .unwrap()
            .map(|account| TokenAccount::decode(&account.data).unwrap().amount)
            .unwrap_or(0)
    }
}

/// Raw VRF output whose first little-endian lane is `value`.
pub fn raw_lane(value: u128) -> [u8; 32] {
    let mut raw = [0u8; 32];
    raw[..16].copy_from_slice(&value.to_le_bytes());
    raw
}
