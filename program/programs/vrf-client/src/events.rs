use anchor_lang::prelude::*;

/// Emitted when a client state is created for a VRF account.
#[event]
pub struct VrfClientCreated {
    pub vrf_client: Pubkey,
    pub vrf: Pubkey,
    pub max_result: u64,
    pub timestamp: i64,
}

/// Emitted when the client asks the oracle queue for randomness.
#[event]
pub struct RandomnessRequested {
    pub vrf_client: Pubkey,
    pub expected_counter: u64,
    pub timestamp: i64,
}

/// Emitted when a verified result is consumed.
#[event]
pub struct VrfClientUpdated {
    pub vrf_client: Pubkey,
    pub counter: u64,
    pub max_result: u64,
    pub result: u128,
    pub result_buffer: [u8; 32],
    pub timestamp: i64,
}
