//! Request manager: the client-facing surface over one VRF account.
//!
//! Every precondition is checked against freshly fetched accounts, in order,
//! before anything is signed:
//!
//! 1. client state initialised and not awaiting a reachable counter
//! 2. queue present with at least one oracle
//! 3. VRF account owned by the oracle program, bound to this client state
//!    and queue
//! 4. registered callback equal to the expected one
//! 5. permission gate
//! 6. escrow present and payer wallet funded to cover the queue reward
//!
//! A failed precondition sends nothing, so client state is never touched.

use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tokio::time::Instant;
use tracing::{info, instrument};

use crate::callback::{expected_callback, verify_descriptor};
use crate::client::{
    add_raffle_list_ix, client_status, fetch_client_state, init_client_ix, request_randomness_ix, ClientResult,
    ClientStatus,
};
use crate::derivation::{client_state_address, permission_address, raffle_list_address};
use crate::error::{RequesterError, Result};
use crate::escrow::{FundingAdapter, WrappedSolFunding};
use crate::network::{fetch_permission, fetch_queue, fetch_token_account, fetch_vrf, unix_timestamp, OracleNetwork};
use crate::oracle::{OracleQueue, VrfAccount, VrfRequestAccounts};
use crate::permission::{authorize, ensure_permission};
use crate::poll::{self, PollConfig};
use crate::raffle::{RaffleList, MAX_RAFFLE_LIST_LEN};
use crate::rpc::{
    ERROR_COUNTER_MISMATCH, ERROR_INVALID_ORACLE_ACCOUNT, ERROR_INVALID_VRF_ACCOUNT, ERROR_INVALID_VRF_AUTHORITY,
    ERROR_RAFFLE_LIST_TOO_LONG, ERROR_REQUEST_IN_FLIGHT,
};

/// Program and account identities a [`RequestManager`] is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientBinding {
    pub client_program: Pubkey,
    pub oracle_program: Pubkey,
    pub vrf: Pubkey,
    pub queue: Pubkey,
}

/// Handle for one submitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    /// VRF counter the fulfilling callback must carry.
    pub expected_counter: u64,
    pub vrf: Pubkey,
    pub client_state: Pubkey,
    pub submitted_at: Instant,
    /// Slot observed right after the request landed.
    pub submitted_slot: u64,
    pub signature: String,
}

pub struct RequestManager<N, F = WrappedSolFunding<N>> {
    network: Arc<N>,
    funding: F,
    binding: ClientBinding,
    payer: Arc<Keypair>,
    client_state: Pubkey,
    fund_up_to: u64,
}

impl<N: OracleNetwork> RequestManager<N> {
    /// Manager funding requests from the payer's wrapped-SOL wallet.
    pub fn new(network: Arc<N>, binding: ClientBinding, payer: Arc<Keypair>) -> Result<Self> {
        let funding = WrappedSolFunding::new(network.clone());
        Self::with_funding(network, funding, binding, payer)
    }
}

impl<N: OracleNetwork, F: FundingAdapter> RequestManager<N, F> {
    pub fn with_funding(network: Arc<N>, funding: F, binding: ClientBinding, payer: Arc<Keypair>) -> Result<Self> {
        let (client_state, _) = client_state_address(&binding.vrf, &binding.client_program)?;
        Ok(Self {
            network,
            funding,
            binding,
            payer,
            client_state,
            fund_up_to: 0,
        })
    }

    /// Keep at least `lamports` in the payer wallet on every request, on top
    /// of what the queue reward requires.
    pub fn fund_up_to(mut self, lamports: u64) -> Self {
        self.fund_up_to = lamports;
        self
    }

    pub fn client_state(&self) -> Pubkey {
        self.client_state
    }

    pub fn binding(&self) -> &ClientBinding {
        &self.binding
    }

    pub async fn status(&self) -> Result<ClientStatus> {
        client_status(self.network.as_ref(), &self.client_state).await
    }

    /// Create the client state for this VRF account with result bound `max_result`.
    #[instrument(skip(self), fields(vrf = %self.binding.vrf))]
    pub async fn init_client(&self, max_result: u64) -> Result<Pubkey> {
        if max_result == 0 {
            return Err(RequesterError::InvalidMaxResult);
        }
        if fetch_client_state(self.network.as_ref(), &self.client_state).await?.is_some() {
            return Err(RequesterError::AlreadyInitialized(self.client_state));
        }
        let vrf = self.load_vrf().await?;

        let ix = init_client_ix(
            &self.binding.client_program,
            &self.client_state,
            &self.binding.vrf,
            &self.payer.pubkey(),
            max_result,
        );
        let signature = self
            .network
            .send_instructions(&[ix], &self.payer, &[])
            .await
            .map_err(|err| self.explain_rejection(err, &vrf, None))?;
        info!(
            client_state = %self.client_state,
            max_result,
            signature = %signature,
            "Initialized client state"
        );
        Ok(self.client_state)
    }

    /// Create the permission record for this VRF account on a gated queue.
    /// `queue_authority` must be the queue's authority.
    pub async fn ensure_permission(&self, queue_authority: &Keypair) -> Result<(Pubkey, u8)> {
        let queue = self.load_queue().await?;
        ensure_permission(
            self.network.as_ref(),
            &self.binding.oracle_program,
            &self.binding.queue,
            &queue,
            &self.binding.vrf,
            queue_authority,
            &self.payer,
        )
        .await
    }

    /// Submit one randomness request and return its ticket.
    #[instrument(skip(self), fields(vrf = %self.binding.vrf, queue = %self.binding.queue))]
    pub async fn request_randomness(&self) -> Result<RequestTicket> {
        let network = self.network.as_ref();
        let mut state = fetch_client_state(network, &self.client_state)
            .await?
            .ok_or(RequesterError::NotInitialized(self.client_state))?;
        let vrf_view = fetch_vrf(network, &self.binding.vrf).await?;
        if let ClientStatus::AwaitingResult { expected_counter } = state.status() {
            let reached = vrf_view.as_ref().is_some_and(|(_, vrf)| vrf.counter >= expected_counter);
            if reached {
                return Err(RequesterError::RequestInFlight { expected_counter });
            }
        }

        let queue = self.load_queue().await?;
        if !queue.has_oracles() {
            return Err(RequesterError::QueueUnavailable(
                self.binding.queue,
                "no oracles are serving the queue".into(),
            ));
        }

        let (owner, vrf) = vrf_view.ok_or(RequesterError::AccountNotFound(self.binding.vrf))?;
        self.check_vrf(&owner, &vrf)?;
        if vrf.oracle_queue != self.binding.queue {
            return Err(RequesterError::InvalidVrfAccount(
                self.binding.vrf,
                format!("bound to queue {}", vrf.oracle_queue),
            ));
        }
        let expected_counter = state.begin_request(vrf.counter)?;

        verify_descriptor(
            &expected_callback(&self.binding.client_program, &self.client_state, &self.binding.vrf),
            &vrf.callback,
        )?;

        let (permission, permission_bump) = permission_address(
            &queue.authority,
            &self.binding.queue,
            &self.binding.vrf,
            &self.binding.oracle_program,
        )?;
        let record = fetch_permission(network, &permission).await?;
        authorize(&self.binding.queue, &queue, &self.binding.vrf, record.as_ref(), unix_timestamp()).into_result()?;

        let escrow = fetch_token_account(network, &vrf.escrow)
            .await?
            .ok_or_else(|| RequesterError::EscrowUnavailable(format!("VRF escrow {} does not exist", vrf.escrow)))?;
        let required = queue.reward.saturating_sub(escrow.amount);
        let wallet = self
            .funding
            .ensure_funded(&self.payer, required.max(self.fund_up_to))
            .await
            .map_err(|err| RequesterError::EscrowUnavailable(format!("payer wallet: {err}")))?;
        if wallet.balance < required {
            return Err(RequesterError::EscrowUnavailable(format!(
                "payer wallet holds {} of the {required} reward",
                wallet.balance
            )));
        }

        let accounts = VrfRequestAccounts {
            authority: self.client_state,
            vrf: self.binding.vrf,
            oracle_queue: self.binding.queue,
            queue_authority: queue.authority,
            permission,
            escrow: vrf.escrow,
            payer_wallet: wallet.wallet,
            payer_authority: self.payer.pubkey(),
        };
        let ix = request_randomness_ix(
            &self.binding.client_program,
            &self.binding.oracle_program,
            &accounts,
            permission_bump,
        );
        let submitted_at = Instant::now();
        let signature = network
            .send_instructions(&[ix], &self.payer, &[])
            .await
            .map_err(|err| self.explain_rejection(err, &vrf, Some(expected_counter)))?;
        let submitted_slot = network.current_slot().await?;
        info!(
            expected_counter,
            slot = submitted_slot,
            reward = queue.reward,
            signature = %signature,
            "Requested randomness"
        );

        Ok(RequestTicket {
            expected_counter,
            vrf: self.binding.vrf,
            client_state: self.client_state,
            submitted_at,
            submitted_slot,
            signature,
        })
    }

    /// Last consumed result and its counter. Never transitions.
    pub async fn get_result(&self) -> Result<ClientResult> {
        fetch_client_state(self.network.as_ref(), &self.client_state)
            .await?
            .map(|state| state.result())
            .ok_or(RequesterError::NotInitialized(self.client_state))
    }

    pub async fn await_result(&self, ticket: &RequestTicket, config: &PollConfig) -> Result<ClientResult> {
        poll::await_result(self.network.as_ref(), &self.client_state, ticket, config).await
    }

    /// Attach a comma-separated entrant list to the client state.
    ///
    /// The list is written once and never while a request is outstanding.
    pub async fn add_raffle_list(&self, entrants: &str) -> Result<Pubkey> {
        let (raffle_list, bump) = raffle_list_address(&self.client_state, &self.binding.client_program)?;
        RaffleList::new(entrants, bump)?;
        let state = fetch_client_state(self.network.as_ref(), &self.client_state)
            .await?
            .ok_or(RequesterError::NotInitialized(self.client_state))?;
        if let ClientStatus::AwaitingResult { expected_counter } = state.status() {
            return Err(RequesterError::RequestInFlight { expected_counter });
        }
        if self.network.get_account(&raffle_list).await?.is_some() {
            return Err(RequesterError::AlreadyInitialized(raffle_list));
        }
        let ix = add_raffle_list_ix(
            &self.binding.client_program,
            &self.payer.pubkey(),
            &raffle_list,
            &self.client_state,
            entrants,
        );
        let signature = self
            .network
            .send_instructions(&[ix], &self.payer, &[])
            .await
            .map_err(|err| match err {
                RequesterError::ProgramRejected {
                    code: ERROR_RAFFLE_LIST_TOO_LONG,
                    ..
                } => RequesterError::RaffleListTooLong {
                    len: entrants.len(),
                    max: MAX_RAFFLE_LIST_LEN,
                },
                RequesterError::ProgramRejected {
                    code: ERROR_REQUEST_IN_FLIGHT,
                    ..
                } => RequesterError::RequestInFlight {
                    expected_counter: state.pending_counter,
                },
                other => other,
            })?;
        info!(raffle_list = %raffle_list, signature = %signature, "Stored raffle list");
        Ok(raffle_list)
    }

    pub async fn raffle_list(&self) -> Result<Option<RaffleList>> {
        let (raffle_list, _) = raffle_list_address(&self.client_state, &self.binding.client_program)?;
        match self.network.get_account(&raffle_list).await? {
            Some(account) => RaffleList::decode(&account.data).map(Some),
            None => Ok(None),
        }
    }

    async fn load_queue(&self) -> Result<OracleQueue> {
        fetch_queue(self.network.as_ref(), &self.binding.queue)
            .await?
            .ok_or_else(|| RequesterError::QueueUnavailable(self.binding.queue, "queue account not found".into()))
    }

    async fn load_vrf(&self) -> Result<VrfAccount> {
        let (owner, vrf) = fetch_vrf(self.network.as_ref(), &self.binding.vrf)
            .await?
            .ok_or(RequesterError::AccountNotFound(self.binding.vrf))?;
        self.check_vrf(&owner, &vrf)?;
        Ok(vrf)
    }

    /// Name the precondition behind a bare client-program rejection, using
    /// the VRF account the transaction was built from. `expected_counter` is
    /// the counter a request was armed for, `None` outside a request.
    fn explain_rejection(&self, err: RequesterError, vrf: &VrfAccount, expected_counter: Option<u64>) -> RequesterError {
        let RequesterError::ProgramRejected { code, message } = err else {
            return err;
        };
        match (code, expected_counter) {
            (ERROR_INVALID_VRF_AUTHORITY, _) => RequesterError::InvalidVrfAuthority {
                vrf: self.binding.vrf,
                expected: self.client_state,
                actual: vrf.authority,
            },
            (ERROR_INVALID_VRF_ACCOUNT | ERROR_INVALID_ORACLE_ACCOUNT, _) => {
                RequesterError::InvalidVrfAccount(self.binding.vrf, message)
            }
            (ERROR_REQUEST_IN_FLIGHT, Some(expected_counter)) => RequesterError::RequestInFlight { expected_counter },
            (ERROR_COUNTER_MISMATCH, Some(expected)) => RequesterError::CounterMismatch {
                expected,
                observed: vrf.counter,
            },
            _ => RequesterError::ProgramRejected { code, message },
        }
    }

    fn check_vrf(&self, owner: &Pubkey, vrf: &VrfAccount) -> Result<()> {
        if *owner != self.binding.oracle_program {
            return Err(RequesterError::InvalidVrfAccount(
                self.binding.vrf,
                format!("owned by {owner}, expected {}", self.binding.oracle_program),
            ));
        }
        if vrf.authority != self.client_state {
            return Err(RequesterError::InvalidVrfAuthority {
                vrf: self.binding.vrf,
                expected: self.client_state,
                actual: vrf.authority,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackDescriptor;
    use crate::localnet::Localnet;
    use crate::oracle::VrfStatus;

    fn manager() -> RequestManager<Localnet> {
        let network = Arc::new(Localnet::new(Pubkey::new_unique(), Pubkey::new_unique()));
        let binding = ClientBinding {
            client_program: network.client_program(),
            oracle_program: network.oracle_program(),
            vrf: Pubkey::new_unique(),
            queue: Pubkey::new_unique(),
        };
        RequestManager::new(network, binding, Arc::new(Keypair::new())).unwrap()
    }

    fn vrf(counter: u64) -> VrfAccount {
        VrfAccount {
            authority: Pubkey::new_unique(),
            oracle_queue: Pubkey::new_unique(),
            escrow: Pubkey::new_unique(),
            counter,
            status: VrfStatus::RequestPending,
            request_slot: 0,
            request_seed: [0; 32],
            assigned_oracle: Pubkey::default(),
            result: [0; 32],
            proof: Vec::new(),
            callback: CallbackDescriptor {
                program_id: Pubkey::new_unique(),
                accounts: Vec::new(),
                ix_data: Vec::new(),
            },
        }
    }

    fn rejected(code: u32) -> RequesterError {
        RequesterError::ProgramRejected {
            code,
            message: format!("custom program error: {code:#x}"),
        }
    }

    #[test]
    fn program_rejections_name_the_failed_precondition() {
        let manager = manager();
        let vrf = vrf(7);

        let err = manager.explain_rejection(rejected(ERROR_REQUEST_IN_FLIGHT), &vrf, Some(5));
        assert!(matches!(err, RequesterError::RequestInFlight { expected_counter: 5 }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Resource);

        let err = manager.explain_rejection(rejected(ERROR_COUNTER_MISMATCH), &vrf, Some(5));
        assert!(matches!(err, RequesterError::CounterMismatch { expected: 5, observed: 7 }));

        let err = manager.explain_rejection(rejected(ERROR_INVALID_VRF_AUTHORITY), &vrf, None);
        assert!(matches!(
            err,
            RequesterError::InvalidVrfAuthority { vrf: key, expected, actual }
                if key == manager.binding.vrf && expected == manager.client_state && actual == vrf.authority
        ));

        for code in [ERROR_INVALID_VRF_ACCOUNT, ERROR_INVALID_ORACLE_ACCOUNT] {
            let err = manager.explain_rejection(rejected(code), &vrf, Some(5));
            assert!(matches!(err, RequesterError::InvalidVrfAccount(key, _) if key == manager.binding.vrf));
        }
    }

    #[test]
    fn counter_codes_outside_a_request_keep_the_program_code() {
        let manager = manager();
        let vrf = vrf(7);

        let err = manager.explain_rejection(rejected(ERROR_COUNTER_MISMATCH), &vrf, None);
        assert!(matches!(err, RequesterError::ProgramRejected { code: ERROR_COUNTER_MISMATCH, .. }));

        let err = manager.explain_rejection(RequesterError::NoPendingRequest, &vrf, Some(5));
        assert!(matches!(err, RequesterError::NoPendingRequest));
    }
}
