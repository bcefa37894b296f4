//! Raffle list attached to a client state, and winner selection from a
//! consumed result.

use crate::error::{RequesterError, Result};
use crate::layout::{account_discriminator, ByteReader, ByteWriter};

pub const RAFFLE_LIST_ACCOUNT: &str = "RaffleList";
/// Upper bound on the stored entrant list, in bytes.
pub const MAX_RAFFLE_LIST_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaffleList {
    pub raffle_list: String,
    pub bump: u8,
}

impl RaffleList {
    pub fn new(raffle_list: &str, bump: u8) -> Result<Self> {
        if raffle_list.len() > MAX_RAFFLE_LIST_LEN {
            return Err(RequesterError::RaffleListTooLong {
                len: raffle_list.len(),
                max: MAX_RAFFLE_LIST_LEN,
            });
        }
        Ok(Self {
            raffle_list: raffle_list.to_owned(),
            bump,
        })
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::with_discriminator(RAFFLE_LIST_ACCOUNT, data)?;
        let bytes = r.read_bytes()?;
        let raffle_list = String::from_utf8(bytes)
            .map_err(|e| RequesterError::malformed(RAFFLE_LIST_ACCOUNT, e.to_string()))?;
        Ok(Self {
            raffle_list,
            bump: r.read_u8()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        ByteWriter::with_discriminator(account_discriminator(RAFFLE_LIST_ACCOUNT))
            .bytes(self.raffle_list.as_bytes())
            .u8(self.bump)
            .finish()
    }

    /// Comma-separated entrants, trimmed, empty names dropped.
    pub fn entrants(&self) -> Vec<&str> {
        self.raffle_list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// Entrant selected by a consumed result, `None` for an empty list.
    pub fn pick_winner(&self, result: u128) -> Option<&str> {
        let entrants = self.entrants();
        if entrants.is_empty() {
            return None;
        }
        let idx = (result % entrants.len() as u128) as usize;
        Some(entrants[idx])
    }
}
