//! Streams a delivery url to disk, undoing the partial stream encryption.
//!
//! The cdn encrypts every third 2048-byte block (block index 0, 3, 6, ...)
//! with Blowfish in ECB mode, counted from the start of the file. Network
//! chunks have arbitrary sizes, so they are re-cut into blocks first.

use std::path::Path;
use std::time::Duration;

use blowfish::Blowfish;
use blowfish::cipher::generic_array::GenericArray;
use blowfish::cipher::{BlockDecrypt, KeyInit};
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{DecodeError, TransferError};
use crate::keys::DecodeKey;
use crate::progress::ProgressTracker;

pub const BLOCK_SIZE: usize = 2048;
const CIPHER_BLOCK: usize = 8;

/// What to do when the cipher cannot be built from the key. Decrypting a
/// block never fails once the cipher exists, so this is the only decision
/// point; a derived [`DecodeKey`] is always a valid Blowfish key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeFailure {
    /// Fail the transfer with a [`DecodeError`].
    #[default]
    Abort,
    /// Write the encrypted blocks as they are.
    Passthrough,
}

pub struct BlockDecoder {
    cipher: Option<Blowfish>,
    buffer: BytesMut,
    processed: u64,
}

impl BlockDecoder {
    pub fn new(key: &DecodeKey, on_failure: DecodeFailure) -> Result<Self, DecodeError> {
        Self::from_key_bytes(key.as_bytes(), on_failure)
    }

    /// Like [`BlockDecoder::new`] for keys that did not come from
    /// [`crate::keys::derive_key`]. Blowfish takes 4 to 56 key bytes.
    pub fn from_key_bytes(key: &[u8], on_failure: DecodeFailure) -> Result<Self, DecodeError> {
        let cipher: Option<Blowfish> = match Blowfish::new_from_slice(key) {
            Ok(cipher) => Some(cipher),
            Err(e) if on_failure == DecodeFailure::Passthrough => {
                warn!("Cannot build cipher ({}), writing stream undecoded", e);
                None
            }
            Err(e) => return Err(DecodeError::InvalidKey(e.to_string())),
        };
        Ok(Self {
            cipher,
            buffer: BytesMut::with_capacity(BLOCK_SIZE * 4),
            processed: 0,
        })
    }

    /// Buffers `chunk` and appends every block it completes to `out`.
    pub fn push(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        self.buffer.extend_from_slice(chunk);
        while self.buffer.len() >= BLOCK_SIZE {
            let block = self.buffer.split_to(BLOCK_SIZE);
            self.emit(block, out);
        }
    }

    /// Flushes the tail. It is shorter than a block, so it is never decoded.
    pub fn finish(mut self, out: &mut Vec<u8>) {
        if !self.buffer.is_empty() {
            let tail = self.buffer.split();
            self.emit(tail, out);
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    fn emit(&mut self, mut block: BytesMut, out: &mut Vec<u8>) {
        let index = self.processed / BLOCK_SIZE as u64;
        if block.len() == BLOCK_SIZE && index % 3 == 0 {
            if let Some(cipher) = &self.cipher {
                for chunk in block.chunks_exact_mut(CIPHER_BLOCK) {
                    cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
                }
            }
        }
        self.processed += block.len() as u64;
        out.extend_from_slice(&block);
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Longest wait for the response headers, and then for each chunk,
    /// before the download counts as stalled.
    pub read_timeout: Duration,
    pub show_progress: bool,
}

/// Downloads `url` into `path`. `decoder` is `None` for previews, which are
/// written through untouched. Returns the number of bytes written. A failed
/// transfer leaves whatever was written so far on disk.
pub async fn download(
    client: &Client,
    url: &str,
    decoder: Option<BlockDecoder>,
    path: &Path,
    options: &TransferOptions,
) -> Result<u64, TransferError> {
    let io_err = |source: std::io::Error| TransferError::Io {
        path: path.to_path_buf(),
        source,
    };

    let request = client
        .get(url)
        .header("Accept", "*/*")
        .header("Accept-Language", "en-US,en;q=0.5")
        .send();
    let response = match tokio::time::timeout(options.read_timeout, request).await {
        Ok(response) => response?.error_for_status()?,
        Err(_) => {
            return Err(TransferError::Stalled {
                secs: options.read_timeout.as_secs(),
            });
        }
    };

    let total = response.content_length();
    debug!("Content length: {:?}", total);
    let progress = ProgressTracker::new(total, "Downloading", options.show_progress);

    let mut file = File::create(path).await.map_err(io_err)?;
    let mut stream = Box::pin(response.bytes_stream());
    let mut decoder = decoder;
    let mut out = Vec::with_capacity(BLOCK_SIZE * 8);
    let mut written = 0u64;

    loop {
        let next = match tokio::time::timeout(options.read_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                progress.abandon();
                return Err(TransferError::Stalled {
                    secs: options.read_timeout.as_secs(),
                });
            }
        };
        let Some(chunk) = next else { break };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                progress.abandon();
                return Err(e.into());
            }
        };

        match decoder.as_mut() {
            Some(decoder) => decoder.push(&chunk, &mut out),
            None => out.extend_from_slice(&chunk),
        }
        if !out.is_empty() {
            file.write_all(&out).await.map_err(io_err)?;
            written += out.len() as u64;
            out.clear();
        }
        progress.step(chunk.len() as u64);
    }

    if let Some(decoder) = decoder {
        decoder.finish(&mut out);
        file.write_all(&out).await.map_err(io_err)?;
        written += out.len() as u64;
    }
    file.flush().await.map_err(io_err)?;
    progress.finish(Some("Done".to_string()));

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::derive_key;

    fn key() -> DecodeKey {
        derive_key("3135556")
    }

    fn decrypt_block(key: &DecodeKey, block: &[u8]) -> Vec<u8> {
        let cipher: Blowfish = Blowfish::new_from_slice(key.as_bytes()).unwrap();
        let mut block = block.to_vec();
        for chunk in block.chunks_exact_mut(CIPHER_BLOCK) {
            cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
        }
        block
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    fn run(input: &[u8], chunk_sizes: &[usize]) -> Vec<u8> {
        let mut decoder = BlockDecoder::new(&key(), DecodeFailure::Abort).unwrap();
        let mut out = Vec::new();
        let mut rest = input;
        for &size in chunk_sizes.iter().cycle() {
            if rest.is_empty() {
                break;
            }
            let (chunk, tail) = rest.split_at(size.min(rest.len()));
            decoder.push(chunk, &mut out);
            rest = tail;
        }
        decoder.finish(&mut out);
        out
    }

    #[test]
    fn output_does_not_depend_on_chunking() {
        let input = pattern(6000);
        let whole = run(&input, &[6000]);
        assert_eq!(whole, run(&input, &[2000]));
        assert_eq!(whole, run(&input, &[1, 7, 2047, 4096]));
        assert_eq!(whole.len(), 6000);
    }

    #[test]
    fn only_every_third_block_is_decoded() {
        let input = pattern(3 * BLOCK_SIZE);
        let out = run(&input, &[BLOCK_SIZE * 3]);

        assert_ne!(out[..BLOCK_SIZE], input[..BLOCK_SIZE]);
        assert_eq!(out[..BLOCK_SIZE], decrypt_block(&key(), &input[..BLOCK_SIZE])[..]);
        assert_eq!(out[BLOCK_SIZE..], input[BLOCK_SIZE..]);
    }

    #[test]
    fn fourth_block_is_decoded_again() {
        let input = pattern(4 * BLOCK_SIZE);
        let out = run(&input, &[1000]);
        let b3 = 3 * BLOCK_SIZE..4 * BLOCK_SIZE;
        assert_eq!(out[b3.clone()], decrypt_block(&key(), &input[b3])[..]);
    }

    #[test]
    fn short_tail_is_written_verbatim() {
        let input = pattern(BLOCK_SIZE + 500);
        let out = run(&input, &[700]);
        assert_eq!(out.len(), BLOCK_SIZE + 500);
        assert_eq!(out[..BLOCK_SIZE], decrypt_block(&key(), &input[..BLOCK_SIZE])[..]);
        assert_eq!(out[BLOCK_SIZE..], input[BLOCK_SIZE..]);
    }

    #[test]
    fn tail_at_a_decode_index_is_not_decoded() {
        // the tail sits at block index 3 but is shorter than a block
        let input = pattern(3 * BLOCK_SIZE + 100);
        let out = run(&input, &[4096]);
        assert_eq!(out[3 * BLOCK_SIZE..], input[3 * BLOCK_SIZE..]);
    }

    #[test]
    fn stream_shorter_than_a_block_passes_through() {
        let input = pattern(500);
        assert_eq!(run(&input, &[64]), input);
    }

    #[test]
    fn processed_counts_emitted_bytes() {
        let mut decoder = BlockDecoder::new(&key(), DecodeFailure::Abort).unwrap();
        let mut out = Vec::new();
        decoder.push(&pattern(3000), &mut out);
        assert_eq!(decoder.processed(), BLOCK_SIZE as u64);
        assert_eq!(out.len(), BLOCK_SIZE);
    }

    #[test]
    fn unusable_key_aborts_by_default() {
        let result = BlockDecoder::from_key_bytes(&[], DecodeFailure::Abort);
        assert!(matches!(result, Err(DecodeError::InvalidKey(_))));
    }

    #[test]
    fn unusable_key_with_passthrough_writes_blocks_verbatim() {
        let mut decoder = BlockDecoder::from_key_bytes(&[], DecodeFailure::Passthrough).unwrap();
        let input = pattern(3 * BLOCK_SIZE + 10);
        let mut out = Vec::new();
        decoder.push(&input, &mut out);
        decoder.finish(&mut out);
        assert_eq!(out, input);
    }
}
