//! Bounded wait for a submitted request's result.
//!
//! The client state's consumed counter is the only fulfillment signal.
//! Elapsed time never implies a result, and hitting the deadline does not
//! cancel anything on the ledger: the request may still be answered later.

use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::time::{sleep, Instant};
use tracing::{debug, instrument, warn};

use crate::client::{fetch_client_state, ClientResult};
use crate::error::{RequesterError, Result};
use crate::network::OracleNetwork;
use crate::request::RequestTicket;

pub const DEFAULT_RESULT_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RESULT_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Re-read the client state every `interval` until it has consumed
/// `ticket.expected_counter` or `timeout` elapses.
///
/// A consumed counter beyond the expected one means another request settled
/// in between and this ticket can no longer be correlated with a result.
#[instrument(skip_all, fields(vrf = %ticket.vrf, expected_counter = ticket.expected_counter))]
pub async fn await_result<N: OracleNetwork>(
    network: &N,
    client_state: &Pubkey,
    ticket: &RequestTicket,
    config: &PollConfig,
) -> Result<ClientResult> {
    let started = Instant::now();
    let deadline = started + config.timeout;

    loop {
        let state = fetch_client_state(network, client_state)
            .await?
            .ok_or(RequesterError::NotInitialized(*client_state))?;

        if state.counter == ticket.expected_counter {
            let result = state.result();
            debug!(value = result.value, waited = ?started.elapsed(), "Result consumed");
            return Ok(result);
        }
        if state.counter > ticket.expected_counter {
            return Err(RequesterError::CounterMismatch {
                expected: ticket.expected_counter,
                observed: state.counter,
            });
        }

        let now = Instant::now();
        if now >= deadline {
            let waited = now - started;
            warn!(?waited, counter = state.counter, "No result before deadline");
            return Err(RequesterError::Timeout {
                expected_counter: ticket.expected_counter,
                waited,
            });
        }
        sleep(config.interval.min(deadline - now)).await;
    }
}
