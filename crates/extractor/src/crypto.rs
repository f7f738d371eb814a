//! Traditional PKWARE ("ZipCrypto") decryption.
//!
//! The cipher is a byte-wise stream cipher keyed by three 32-bit registers.
//! Each entry starts with a 12-byte encryption header whose last decrypted
//! byte doubles as a one-byte password check.

use crate::error::ExtractError;
use crate::header::read_exact_or_truncated;
use std::io::{self, BufRead, Read};

/// CRC-32 lookup table (polynomial 0xEDB88320, reflected).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Size of the encryption header in front of every encrypted payload.
pub const ENCRYPTION_HEADER_SIZE: usize = 12;

/// Key registers of the ZipCrypto cipher.
#[derive(Debug, Clone)]
pub struct ZipCryptoKeys {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl ZipCryptoKeys {
    /// Derive the initial key state from a password.
    pub fn derive(password: &[u8]) -> Self {
        let mut keys = Self {
            key0: 0x1234_5678,
            key1: 0x2345_6789,
            key2: 0x3456_7890,
        };
        for &byte in password {
            keys.update(byte);
        }
        keys
    }

    #[inline]
    fn update(&mut self, plain: u8) {
        self.key0 = crc32_update(self.key0, plain);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.key2 = crc32_update(self.key2, (self.key1 >> 24) as u8);
    }

    #[inline]
    fn stream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    #[inline]
    pub fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.stream_byte();
        self.update(plain);
        plain
    }

    #[cfg(test)]
    pub fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.stream_byte();
        self.update(plain);
        cipher
    }
}

#[inline]
fn crc32_update(crc: u32, byte: u8) -> u32 {
    CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
}

/// Decrypting view over a buffered source.
///
/// Bytes are decrypted ahead into a private buffer but the keys only advance,
/// and the source is only consumed, as far as the caller consumes. Whatever a
/// self-terminating decoder leaves unread stays untouched in the source, which
/// is what lets a data descriptor be read right after the payload.
pub struct ZipCryptoReader<B> {
    inner: B,
    keys: ZipCryptoKeys,
    plain: Vec<u8>,
    pos: usize,
}

impl<B: BufRead> ZipCryptoReader<B> {
    /// Consume and check the encryption header, returning a reader positioned
    /// at the first payload byte.
    pub fn new(
        inner: B,
        keys: ZipCryptoKeys,
        check_byte: u8,
        entry: &str,
    ) -> Result<Self, ExtractError> {
        let mut reader = Self {
            inner,
            keys,
            plain: Vec::new(),
            pos: 0,
        };

        let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
        read_exact_or_truncated(&mut reader, &mut header, "encryption header")?;
        if header[ENCRYPTION_HEADER_SIZE - 1] != check_byte {
            return Err(ExtractError::InvalidPassword(entry.to_string()));
        }

        Ok(reader)
    }
}

impl<B: BufRead> BufRead for ZipCryptoReader<B> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos >= self.plain.len() {
            let available = self.inner.fill_buf()?;
            let mut lookahead = self.keys.clone();
            self.plain.clear();
            self.plain
                .extend(available.iter().map(|&b| lookahead.decrypt_byte(b)));
            self.pos = 0;
        }
        Ok(&self.plain[self.pos..])
    }

    fn consume(&mut self, amt: usize) {
        let amt = amt.min(self.plain.len() - self.pos);
        for &plain in &self.plain[self.pos..self.pos + amt] {
            self.keys.update(plain);
        }
        self.pos += amt;
        self.inner.consume(amt);
    }
}

impl<B: BufRead> Read for ZipCryptoReader<B> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}
