use anchor_lang::prelude::*;
use anchor_lang::solana_program::hash::hash;

use crate::errors::VrfClientError;
use crate::oracle::VrfAccountData;

pub const STATE_SEED: &[u8] = b"CLIENTSEED";
pub const RAFFLE_LIST_SEED: &[u8] = b"raffle_list";
pub const MAX_RAFFLE_LIST_LEN: usize = 256;

/// Client state bound to one VRF account.
///
/// Seeds: `["CLIENTSEED", vrf]`
///
/// The state PDA is the VRF account's authority, so only this program can
/// request randomness for it. `pending_counter` is the VRF counter the next
/// callback must carry, `0` while idle.
#[account]
#[derive(InitSpace)]
pub struct VrfClientState {
    /// PDA bump seed cached for efficient re-derivation.
    pub bump: u8,
    /// Results are mapped uniformly onto `0..max_result`.
    pub max_result: u64,
    /// Raw VRF output the current result was bounded from.
    pub result_buffer: [u8; 32],
    pub result: u128,
    /// VRF counter of the last consumed result.
    pub counter: u64,
    pub pending_counter: u64,
    pub timestamp: i64,
    pub vrf: Pubkey,
    /// Program owning `vrf`, fixed at initialisation.
    pub oracle_program: Pubkey,
}

impl VrfClientState {
    /// Arm the state for the next result. Returns the awaited counter.
    ///
    /// While a request is outstanding a new one is accepted only if the VRF
    /// counter shows it never resolved; the awaited counter is unchanged.
    pub fn begin_request(&mut self, vrf_counter: u64) -> Result<u64> {
        if self.pending_counter != 0 {
            require!(vrf_counter < self.pending_counter, VrfClientError::RequestInFlight);
            return Ok(self.pending_counter);
        }
        let expected = vrf_counter
            .checked_add(1)
            .ok_or(VrfClientError::InvalidVrfAccount)?;
        self.pending_counter = expected;
        Ok(expected)
    }

    /// Refuse while a request is awaiting its result.
    pub fn ensure_idle(&self) -> Result<()> {
        require!(self.pending_counter == 0, VrfClientError::RequestInFlight);
        Ok(())
    }

    /// Store a verified result. All checks happen before any write.
    pub fn apply_callback(&mut self, vrf: &VrfAccountData, now: i64) -> Result<()> {
        require!(self.pending_counter != 0, VrfClientError::NoPendingRequest);
        require!(vrf.counter == self.pending_counter, VrfClientError::CounterMismatch);

        self.result_buffer = vrf.result;
        self.result = bounded_result(&vrf.result, self.max_result);
        self.counter = vrf.counter;
        self.pending_counter = 0;
        self.timestamp = now;
        Ok(())
    }
}

/// Entrant list attached to a client state.
///
/// Seeds: `["raffle_list", vrf_client]`
#[account]
#[derive(InitSpace)]
pub struct RaffleList {
    /// Comma-separated entrant names.
    #[max_len(256)]
    pub raffle_list: String,
    pub bump: u8,
}

/// Map a raw VRF output uniformly onto `0..max_result`.
///
/// Each 16-byte little-endian lane below the largest multiple of
/// `max_result` is accepted as `lane % max_result`. When both lanes fall in
/// the biased tail the buffer is re-hashed.
pub fn bounded_result(raw: &[u8; 32], max_result: u64) -> u128 {
    let bound = u128::from(max_result.max(1));
    let tail = (u128::MAX % bound + 1) % bound;

    let mut block = *raw;
    loop {
        for lane in block.chunks_exact(16) {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(lane);
            let v = u128::from_le_bytes(bytes);
            if tail == 0 || v <= u128::MAX - tail {
                return v % bound;
            }
        }
        block = hash(&block).to_bytes();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::CallbackData;

    fn lane(v: u128) -> [u8; 32] {
        let mut raw = [0u8; 32];
        raw[..16].copy_from_slice(&v.to_le_bytes());
        raw
    }

    fn key(byte: u8) -> Pubkey {
        Pubkey::new_from_array([byte; 32])
    }

    fn client(max_result: u64) -> VrfClientState {
        VrfClientState {
            bump: 254,
            max_result,
            result_buffer: [0; 32],
            result: 0,
            counter: 0,
            pending_counter: 0,
            timestamp: 0,
            vrf: key(1),
            oracle_program: key(2),
        }
    }

    fn fulfilled(counter: u64, result: [u8; 32]) -> VrfAccountData {
        VrfAccountData {
            authority: key(3),
            oracle_queue: key(4),
            escrow: key(5),
            counter,
            status: 0,
            request_slot: 0,
            request_seed: [0; 32],
            assigned_oracle: key(6),
            result,
            proof: Vec::new(),
            callback: CallbackData::expected(key(7), key(1)),
        }
    }

    fn snapshot(state: &VrfClientState) -> Vec<u8> {
        let mut out = Vec::new();
        AnchorSerialize::serialize(state, &mut out).unwrap();
        out
    }

    fn assert_code(result: Result<impl std::fmt::Debug>, expected: VrfClientError) {
        match result {
            Err(Error::AnchorError(err)) => assert_eq!(err.error_code_number, u32::from(expected)),
            other => panic!("expected {expected:?}, got {other:?}"),
        }
    }

    #[test]
    fn in_zone_lane_is_plain_modulo() {
        assert_eq!(bounded_result(&lane(999_999), 1337), 999_999 % 1337);
    }

    #[test]
    fn biased_lane_is_skipped() {
        let mut raw = lane(u128::MAX);
        raw[16..].copy_from_slice(&10u128.to_le_bytes());
        assert_eq!(bounded_result(&raw, 3), 1);
    }

    #[test]
    fn both_biased_lanes_are_rehashed() {
        let raw = [0xff; 32];
        let value = bounded_result(&raw, 3);
        assert!(value < 3);
        assert_eq!(value, bounded_result(&raw, 3));

        let digest = hash(&raw).to_bytes();
        let mut first = [0u8; 16];
        first.copy_from_slice(&digest[..16]);
        assert_eq!(value, u128::from_le_bytes(first) % 3);
    }

    #[test]
    fn request_arms_the_successor_counter() {
        let mut state = client(10);
        assert_eq!(state.begin_request(4).unwrap(), 5);
        assert_eq!(state.pending_counter, 5);
    }

    #[test]
    fn unresolved_request_may_be_resubmitted() {
        let mut state = client(10);
        state.begin_request(4).unwrap();

        // The VRF counter has not moved, so the first request never resolved.
        assert_eq!(state.begin_request(4).unwrap(), 5);
        assert_eq!(state.pending_counter, 5);
    }

    #[test]
    fn request_is_refused_once_the_vrf_counter_reaches_the_awaited_value() {
        let mut state = client(10);
        state.begin_request(4).unwrap();
        let before = snapshot(&state);

        assert_code(state.begin_request(5), VrfClientError::RequestInFlight);
        assert_code(state.begin_request(6), VrfClientError::RequestInFlight);
        assert_eq!(snapshot(&state), before);
        assert_code(state.ensure_idle(), VrfClientError::RequestInFlight);
    }

    #[test]
    fn callback_with_awaited_counter_stores_the_bounded_result() {
        let mut state = client(1337);
        state.begin_request(0).unwrap();

        state.apply_callback(&fulfilled(1, lane(999_999)), 1_700_000_000).unwrap();
        assert_eq!(state.result, 999_999 % 1337);
        assert_eq!(state.result_buffer, lane(999_999));
        assert_eq!(state.counter, 1);
        assert_eq!(state.pending_counter, 0);
        assert_eq!(state.timestamp, 1_700_000_000);
        state.ensure_idle().unwrap();
    }

    #[test]
    fn duplicate_and_stale_callbacks_leave_state_untouched() {
        let mut state = client(1337);
        state.begin_request(0).unwrap();
        state.apply_callback(&fulfilled(1, lane(7)), 100).unwrap();
        state.begin_request(1).unwrap();
        let before = snapshot(&state);

        // Replay of the consumed counter, then a counter that skipped ahead.
        assert_code(state.apply_callback(&fulfilled(1, lane(8)), 200), VrfClientError::CounterMismatch);
        assert_code(state.apply_callback(&fulfilled(3, lane(9)), 200), VrfClientError::CounterMismatch);
        assert_eq!(snapshot(&state), before);
    }

    #[test]
    fn callback_without_pending_request_is_rejected() {
        let mut state = client(1337);
        let before = snapshot(&state);

        assert_code(state.apply_callback(&fulfilled(1, lane(7)), 100), VrfClientError::NoPendingRequest);
        assert_eq!(snapshot(&state), before);
    }
}
