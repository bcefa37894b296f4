//! Callback descriptors and oracle proof verification.
//!
//! A VRF account freezes its callback at creation: target program, an ordered
//! account list with signer/writable flags, and opaque instruction data. The
//! oracle replays exactly that descriptor after a verified fulfillment and has
//! no authority to change it. The descriptor is a plain value so the requester
//! can re-derive what it expects and compare before submitting and again when
//! the callback arrives.
//!
//! Randomness follows the same keyed construction the fulfilling oracle uses:
//!
//! ```text
//! result = HMAC-SHA256(secret, vrf || counter_le || seed)
//! proof  = Ed25519_sign(oracle_key, vrf || counter_le || seed || result)
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;
use solana_sdk::instruction::AccountMeta;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};

use crate::error::{RequesterError, Result};
use crate::layout::{instruction_discriminator, ByteReader, ByteWriter};

type HmacSha256 = Hmac<Sha256>;

/// Instruction name of the client program's callback entry point.
pub const CONSUME_RANDOMNESS_IX: &str = "consume_randomness";

/// Immutable callback registration stored on a VRF account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackDescriptor {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub ix_data: Vec<u8>,
}

impl CallbackDescriptor {
    pub(crate) fn read(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            program_id: r.read_pubkey()?,
            accounts: r.read_vec(|r| {
                let pubkey = r.read_pubkey()?;
                let is_signer = r.read_bool()?;
                let is_writable = r.read_bool()?;
                Ok(AccountMeta {
                    pubkey,
                    is_signer,
                    is_writable,
                })
            })?,
            ix_data: r.read_bytes()?,
        })
    }

    pub(crate) fn write(&self, w: &mut ByteWriter) {
        w.pubkey(&self.program_id).u32(self.accounts.len() as u32);
        for meta in &self.accounts {
            w.pubkey(&meta.pubkey).bool(meta.is_signer).bool(meta.is_writable);
        }
        w.bytes(&self.ix_data);
    }

    /// Descriptor describing an actual invocation, for comparison against the
    /// registered one.
    pub fn from_invocation(program_id: Pubkey, accounts: &[AccountMeta], data: &[u8]) -> Self {
        Self {
            program_id,
            accounts: accounts.to_vec(),
            ix_data: data.to_vec(),
        }
    }
}

/// Callback a client state expects its VRF account to carry:
/// `consume_randomness` with `[client_state (writable), vrf (read-only)]`.
pub fn expected_callback(client_program: &Pubkey, client_state: &Pubkey, vrf: &Pubkey) -> CallbackDescriptor {
    CallbackDescriptor {
        program_id: *client_program,
        accounts: vec![
            AccountMeta::new(*client_state, false),
            AccountMeta::new_readonly(*vrf, false),
        ],
        ix_data: instruction_discriminator(CONSUME_RANDOMNESS_IX).to_vec(),
    }
}

/// Compare a registered (or invoked) descriptor with the expected one and
/// report the first difference.
pub fn verify_descriptor(expected: &CallbackDescriptor, actual: &CallbackDescriptor) -> Result<()> {
    if expected.program_id != actual.program_id {
        return Err(RequesterError::DescriptorMismatch(format!(
            "target program {} != expected {}",
            actual.program_id, expected.program_id
        )));
    }
    if expected.accounts.len() != actual.accounts.len() {
        return Err(RequesterError::DescriptorMismatch(format!(
            "{} accounts != expected {}",
            actual.accounts.len(),
            expected.accounts.len()
        )));
    }
    for (idx, (want, got)) in expected.accounts.iter().zip(&actual.accounts).enumerate() {
        if want != got {
            return Err(RequesterError::DescriptorMismatch(format!(
                "account #{idx}: {} (signer={}, writable={}) != expected {} (signer={}, writable={})",
                got.pubkey, got.is_signer, got.is_writable, want.pubkey, want.is_signer, want.is_writable
            )));
        }
    }
    if expected.ix_data != actual.ix_data {
        return Err(RequesterError::DescriptorMismatch("instruction data differs".into()));
    }
    Ok(())
}

/// Known callback entry points, decoded from a descriptor or invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackTarget {
    ConsumeRandomness,
    Unknown,
}

impl CallbackTarget {
    pub fn decode(client_program: &Pubkey, program_id: &Pubkey, data: &[u8]) -> Self {
        if program_id == client_program && data.starts_with(&instruction_discriminator(CONSUME_RANDOMNESS_IX)) {
            CallbackTarget::ConsumeRandomness
        } else {
            CallbackTarget::Unknown
        }
    }
}

/// Oracle-side randomness for `(vrf, counter, seed)`.
pub fn compute_randomness(secret: &[u8], vrf: &Pubkey, counter: u64, seed: &[u8; 32]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any size");
    mac.update(vrf.as_ref());
    mac.update(&counter.to_le_bytes());
    mac.update(seed);

    let mut output = [0u8; 32];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// Message an oracle signs to vouch for `result`.
pub fn proof_message(vrf: &Pubkey, counter: u64, seed: &[u8; 32], result: &[u8; 32]) -> Vec<u8> {
    let mut message = Vec::with_capacity(32 + 8 + 32 + 32);
    message.extend_from_slice(vrf.as_ref());
    message.extend_from_slice(&counter.to_le_bytes());
    message.extend_from_slice(seed);
    message.extend_from_slice(result);
    message
}

pub fn sign_proof(oracle: &Keypair, vrf: &Pubkey, counter: u64, seed: &[u8; 32], result: &[u8; 32]) -> Vec<u8> {
    oracle
        .sign_message(&proof_message(vrf, counter, seed, result))
        .as_ref()
        .to_vec()
}

/// Check an oracle's proof against its public key.
pub fn verify_proof(
    oracle: &Pubkey,
    vrf: &Pubkey,
    counter: u64,
    seed: &[u8; 32],
    result: &[u8; 32],
    proof: &[u8],
) -> Result<()> {
    let signature = Signature::try_from(proof).map_err(|_| RequesterError::InvalidProof(counter))?;
    if signature.verify(oracle.as_ref(), &proof_message(vrf, counter, seed, result)) {
        Ok(())
    } else {
        Err(RequesterError::InvalidProof(counter))
    }
}
