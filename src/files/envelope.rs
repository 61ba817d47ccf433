//! # Chunked File Envelope
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       FILE ENVELOPE                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Input: raw file bytes, one-time FileKey                               │
//! │                                                                         │
//! │  1. Split into fixed-size chunks (≤ 64 MiB, last may be shorter)       │
//! │  2. Encrypt each chunk with a fresh IV,                                │
//! │     aad = index (u32 BE) ‖ is_last (u8)                                │
//! │  3. Emit one record per chunk:                                         │
//! │                                                                         │
//! │     ┌──────────────┬──────────┬──────────────────────────┐            │
//! │     │ len (u32 BE) │ iv (12)  │ ciphertext ‖ tag (len-12)│            │
//! │     └──────────────┴──────────┴──────────────────────────┘            │
//! │                                                                         │
//! │  `len` counts everything after the prefix. An empty file is one       │
//! │  record holding an empty final chunk.                                  │
//! │                                                                         │
//! │  Decryption walks the records in order; a record that fails to        │
//! │  open fails on its own and never yields bytes.                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use super::FileKey;
use crate::config::MAX_FILE_CHUNK_SIZE;
use crate::crypto::{decrypt_with_aad, encrypt_with_aad, Nonce, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};

const LENGTH_PREFIX: usize = 4;

// ---------------------------------------------------------------------------
// Encryption
// ---------------------------------------------------------------------------

fn chunk_aad(index: u32, is_last: bool) -> [u8; 5] {
    let mut aad = [0u8; 5];
    aad[..4].copy_from_slice(&index.to_be_bytes());
    aad[4] = is_last as u8;
    aad
}

/// Encrypt a file with the maximum chunk size
pub fn encrypt_file(key: &FileKey, data: &[u8]) -> Result<Vec<u8>> {
    encrypt_file_with_chunk_size(key, data, MAX_FILE_CHUNK_SIZE)
}

/// Encrypt a file into length-prefixed records
///
/// # Arguments
/// * `key` - One-time key for this file
/// * `data` - Raw file bytes
/// * `chunk_size` - Plaintext bytes per record, `1..=MAX_FILE_CHUNK_SIZE`
pub fn encrypt_file_with_chunk_size(
    key: &FileKey,
    data: &[u8],
    chunk_size: usize,
) -> Result<Vec<u8>> {
    if chunk_size == 0 || chunk_size > MAX_FILE_CHUNK_SIZE {
        return Err(Error::InvalidConfig(format!(
            "File chunk size must be 1..={}, got {}",
            MAX_FILE_CHUNK_SIZE, chunk_size
        )));
    }

    let total_chunks = if data.is_empty() {
        1
    } else {
        (data.len() + chunk_size - 1) / chunk_size
    };
    if total_chunks > u32::MAX as usize {
        return Err(Error::MalformedInput("File has too many chunks".into()));
    }

    let mut out =
        Vec::with_capacity(data.len() + total_chunks * (LENGTH_PREFIX + NONCE_SIZE + TAG_SIZE));

    let chunks: Vec<&[u8]> = if data.is_empty() {
        vec![data]
    } else {
        data.chunks(chunk_size).collect()
    };

    for (i, chunk) in chunks.into_iter().enumerate() {
        let is_last = i + 1 == total_chunks;
        let sealed = encrypt_with_aad(key.as_symmetric(), chunk, &chunk_aad(i as u32, is_last))?;

        let record_len = (NONCE_SIZE + sealed.ciphertext.len()) as u32;
        out.extend_from_slice(&record_len.to_be_bytes());
        out.extend_from_slice(sealed.nonce.as_bytes());
        out.extend_from_slice(&sealed.ciphertext);
    }

    tracing::debug!(
        "Encrypted file: {} bytes in {} chunks",
        data.len(),
        total_chunks
    );
    Ok(out)
}

// ---------------------------------------------------------------------------
// Decryption
// ---------------------------------------------------------------------------

/// Decrypt a whole file
///
/// Fails on the first bad record; no partial plaintext is returned.
pub fn decrypt_file(key: &FileKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.is_empty() {
        return Err(Error::MalformedInput("File envelope has no records".into()));
    }

    let mut out = Vec::with_capacity(blob.len());
    for chunk in FileDecryptor::new(key, blob) {
        match chunk {
            Ok(bytes) => out.extend_from_slice(&bytes),
            Err(e) => {
                tracing::warn!("File decryption aborted: {}", e);
                return Err(e);
            }
        }
    }
    Ok(out)
}

/// Progressive decryption, one record at a time
///
/// Yields `Ok(plaintext)` or `Err` per record. An authentication failure on
/// one record does not stop the following records from being attempted; a
/// structural error (bad length prefix) ends iteration because record
/// boundaries can no longer be trusted.
pub struct FileDecryptor<'a> {
    key: &'a FileKey,
    blob: &'a [u8],
    offset: usize,
    index: u32,
    done: bool,
}

impl<'a> FileDecryptor<'a> {
    /// Start decrypting `blob` with `key`
    pub fn new(key: &'a FileKey, blob: &'a [u8]) -> Self {
        Self {
            key,
            blob,
            offset: 0,
            index: 0,
            done: false,
        }
    }

    fn next_record(&mut self) -> Result<Vec<u8>> {
        let rest = &self.blob[self.offset..];
        if rest.len() < LENGTH_PREFIX {
            return Err(Error::MalformedInput(format!(
                "Truncated length prefix at chunk {}",
                self.index
            )));
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&rest[..LENGTH_PREFIX]);
        let record_len = u32::from_be_bytes(prefix) as usize;

        if record_len < NONCE_SIZE + TAG_SIZE || record_len > NONCE_SIZE + MAX_FILE_CHUNK_SIZE + TAG_SIZE {
            return Err(Error::MalformedInput(format!(
                "Invalid record length {} at chunk {}",
                record_len, self.index
            )));
        }
        let body = rest
            .get(LENGTH_PREFIX..LENGTH_PREFIX + record_len)
            .ok_or_else(|| {
                Error::MalformedInput(format!("Truncated record at chunk {}", self.index))
            })?;

        self.offset += LENGTH_PREFIX + record_len;
        let index = self.index;
        self.index += 1;
        let is_last = self.offset == self.blob.len();

        let (iv, ciphertext) = body.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(iv)?;

        decrypt_with_aad(self.key.as_symmetric(), &nonce, ciphertext, &chunk_aad(index, is_last))
            .ok_or_else(|| {
                Error::AuthenticationFailed(format!(
                    "Chunk {} is corrupted or the key is wrong",
                    index
                ))
            })
    }
}

impl Iterator for FileDecryptor<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.blob.len() {
            return None;
        }

        let result = self.next_record();
        if matches!(result, Err(Error::MalformedInput(_))) {
            self.done = true;
        }
        Some(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CHUNK: usize = 1024;

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn record_offsets(blob: &[u8]) -> Vec<usize> {
        let mut offsets = Vec::new();
        let mut offset = 0;
        while offset < blob.len() {
            offsets.push(offset);
            let len = u32::from_be_bytes(blob[offset..offset + 4].try_into().unwrap()) as usize;
            offset += 4 + len;
        }
        offsets
    }

    #[test]
    fn test_round_trip_three_chunks_plus_tail() {
        let key = FileKey::generate().unwrap();
        let data = sample(3 * CHUNK + 17);

        let blob = encrypt_file_with_chunk_size(&key, &data, CHUNK).unwrap();
        assert_eq!(record_offsets(&blob).len(), 4);
        assert_eq!(blob.len(), data.len() + 4 * (4 + NONCE_SIZE + TAG_SIZE));

        assert_eq!(decrypt_file(&key, &blob).unwrap(), data);
    }

    #[test]
    fn test_tampered_chunk_fails_alone() {
        let key = FileKey::generate().unwrap();
        let data = sample(3 * CHUNK + 17);
        let mut blob = encrypt_file_with_chunk_size(&key, &data, CHUNK).unwrap();

        let offsets = record_offsets(&blob);
        blob[offsets[1] + 4 + NONCE_SIZE + 5] ^= 0x01;

        let results: Vec<_> = FileDecryptor::new(&key, &blob).collect();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap(), &data[..CHUNK]);
        assert!(matches!(results[1], Err(Error::AuthenticationFailed(_))));
        assert_eq!(results[2].as_ref().unwrap(), &data[2 * CHUNK..3 * CHUNK]);
        assert_eq!(results[3].as_ref().unwrap(), &data[3 * CHUNK..]);

        assert!(matches!(
            decrypt_file(&key, &blob),
            Err(Error::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn test_wrong_key_fails() {
        let data = sample(100);
        let blob = encrypt_file(&FileKey::generate().unwrap(), &data).unwrap();
        assert!(decrypt_file(&FileKey::generate().unwrap(), &blob).is_err());
    }

    #[test]
    fn test_empty_file() {
        let key = FileKey::generate().unwrap();
        let blob = encrypt_file(&key, &[]).unwrap();

        assert_eq!(blob.len(), 4 + NONCE_SIZE + TAG_SIZE);
        assert!(decrypt_file(&key, &blob).unwrap().is_empty());
        assert!(decrypt_file(&key, &[]).is_err());
    }

    #[test]
    fn test_truncation_detected() {
        let key = FileKey::generate().unwrap();
        let data = sample(2 * CHUNK + 5);
        let blob = encrypt_file_with_chunk_size(&key, &data, CHUNK).unwrap();

        // Drop the final record: the new last record was not sealed as last
        let offsets = record_offsets(&blob);
        assert!(decrypt_file(&key, &blob[..offsets[2]]).is_err());

        // Cut inside a record
        assert!(matches!(
            decrypt_file(&key, &blob[..blob.len() - 3]),
            Err(Error::MalformedInput(_))
        ));
    }

    #[test]
    fn test_reordering_detected() {
        let key = FileKey::generate().unwrap();
        let data = sample(3 * CHUNK);
        let blob = encrypt_file_with_chunk_size(&key, &data, CHUNK).unwrap();

        let offsets = record_offsets(&blob);
        let mut swapped = Vec::new();
        swapped.extend_from_slice(&blob[offsets[1]..offsets[2]]);
        swapped.extend_from_slice(&blob[offsets[0]..offsets[1]]);
        swapped.extend_from_slice(&blob[offsets[2]..]);

        assert!(decrypt_file(&key, &swapped).is_err());
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let key = FileKey::generate().unwrap();
        assert!(encrypt_file_with_chunk_size(&key, b"x", 0).is_err());
        assert!(encrypt_file_with_chunk_size(&key, b"x", MAX_FILE_CHUNK_SIZE + 1).is_err());
    }
}
