use md5::{Digest, Md5};

// shared by every client that decodes the stream, not per account
const TRACK_SECRET: &[u8; 16] = b"g4el58wc0zvf9na1";

/// Blowfish key for one track.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DecodeKey([u8; 16]);

impl DecodeKey {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl std::fmt::Debug for DecodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecodeKey({})", hex::encode(self.0))
    }
}

/// Lowercase hex md5 of `data`.
pub fn md5_hex(data: impl AsRef<[u8]>) -> String {
    hex::encode(Md5::digest(data.as_ref()))
}

/// Derives the key from the decimal track id: the two halves of the id's
/// hex md5 are xored together with the static secret, character by character.
pub fn derive_key(track_id: &str) -> DecodeKey {
    let digest = md5_hex(track_id);
    let d = digest.as_bytes();
    let mut key = [0u8; 16];
    for (i, byte) in key.iter_mut().enumerate() {
        *byte = d[i] ^ d[i + 16] ^ TRACK_SECRET[i];
    }
    DecodeKey(key)
}
