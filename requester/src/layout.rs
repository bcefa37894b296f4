//! Anchor-compatible discriminators and little-endian byte cursors used to
//! decode account data and encode instruction data.

use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;

use crate::error::{RequesterError, Result};

fn discriminator(preimage: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    let hash = hasher.finalize();
    let mut disc = [0u8; 8];
    disc.copy_from_slice(&hash[..8]);
    disc
}

/// Anchor account discriminator: `sha256("account:<Name>")[..8]`.
pub fn account_discriminator(account_name: &str) -> [u8; 8] {
    discriminator(&format!("account:{account_name}"))
}

/// Anchor instruction discriminator: `sha256("global:<name>")[..8]`.
pub fn instruction_discriminator(ix_name: &str) -> [u8; 8] {
    discriminator(&format!("global:{ix_name}"))
}

/// Forward-only reader over account bytes.
pub struct ByteReader<'a> {
    account: &'static str,
    data: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(account: &'static str, data: &'a [u8]) -> Self {
        Self {
            account,
            data,
            offset: 0,
        }
    }

    /// Start reading after checking the 8-byte discriminator.
    pub fn with_discriminator(account: &'static str, data: &'a [u8]) -> Result<Self> {
        let mut reader = Self::new(account, data);
        let disc = reader.take(8)?;
        if disc != account_discriminator(account) {
            return Err(RequesterError::malformed(account, "discriminator mismatch"));
        }
        Ok(reader)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                RequesterError::malformed(
                    self.account,
                    format!("need {len} bytes at offset {}, have {}", self.offset, self.data.len()),
                )
            })?;
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u128(&mut self) -> Result<u128> {
        Ok(u128::from_le_bytes(self.read_array()?))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_pubkey(&mut self) -> Result<Pubkey> {
        Ok(Pubkey::new_from_array(self.read_array()?))
    }

    /// `u32` length prefix followed by raw bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    /// `u32` length prefix followed by `len` items.
    pub fn read_vec<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        let len = self.read_u32()? as usize;
        let remaining = self.data.len() - self.offset;
        if len > remaining {
            return Err(RequesterError::malformed(
                self.account,
                format!("vector length {len} exceeds remaining {remaining} bytes"),
            ));
        }
        (0..len).map(|_| item(self)).collect()
    }
}

/// Little-endian writer producing account or instruction bytes.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_discriminator(disc: [u8; 8]) -> Self {
        let mut writer = Self::new();
        writer.buf.extend_from_slice(&disc);
        writer
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u8(value as u8)
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i64(&mut self, value: i64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u128(&mut self, value: u128) -> &mut Self {
        self.buf.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn pubkey(&mut self, key: &Pubkey) -> &mut Self {
        self.raw(key.as_ref())
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.u32(bytes.len() as u32).raw(bytes)
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_discriminator_matches_anchor() {
        // sha256("global:initialize")[..8], as emitted by every Anchor IDL.
        assert_eq!(
            instruction_discriminator("initialize"),
            [175, 175, 109, 31, 13, 152, 155, 237]
        );
    }

    #[test]
    fn reader_rejects_truncated_data() {
        let mut reader = ByteReader::new("Test", &[1, 2, 3]);
        assert!(reader.read_u32().is_err());
    }

    #[test]
    fn reader_rejects_oversized_vector_prefix() {
        let data = ByteWriter::new().u32(1_000).u8(7).finish();
        let mut reader = ByteReader::new("Test", &data);
        let err = reader.read_vec(|r| r.read_u8()).unwrap_err();
        assert!(err.to_string().contains("vector length 1000"));
    }

    #[test]
    fn discriminator_is_checked() {
        let data = ByteWriter::with_discriminator(account_discriminator("Other")).u64(5).finish();
        assert!(ByteReader::with_discriminator("Test", &data).is_err());
        let data = ByteWriter::with_discriminator(account_discriminator("Test")).u64(5).finish();
        let mut reader = ByteReader::with_discriminator("Test", &data).unwrap();
        assert_eq!(reader.read_u64().unwrap(), 5);
    }
}
