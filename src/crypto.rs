use anyhow::anyhow;
use chacha20poly1305::aead::{AeadInPlace, NewAead};
use chacha20poly1305::ChaCha8Poly1305;

/// The server-held key of the identifier envelope.
#[derive(Clone, Copy)]
pub struct Key([u8; 32]);

impl Key {
    /// Generates a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0; 32];
        getrandom::getrandom(&mut key).unwrap();
        Self(key)
    }

    /// Seals an `(id, user)` pair into an opaque string.
    ///
    /// The pair's own bytes double as the nonce, so equal inputs give equal
    /// outputs for the lifetime of the key. The envelope serves as the
    /// shadow-table key for revoked subtrees and as the reclaim token left
    /// on anonymized records; nothing here aims for more than determinism,
    /// per-pair uniqueness and opacity to clients.
    pub fn conceal(&self, id: i64, user: i64) -> String {
        let mut pair = [0u8; 16];
        pair[..8].copy_from_slice(&id.to_le_bytes());
        pair[8..].copy_from_slice(&user.to_le_bytes());
        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&pair[..12]);
        let mut payload = pair.to_vec();
        let tag = ChaCha8Poly1305::new(&self.0.into())
            .encrypt_in_place_detached(&nonce.into(), &[], &mut payload)
            .unwrap();
        payload.extend_from_slice(&tag);
        base64::encode_config(&payload, base64::URL_SAFE)
    }
}

impl std::str::FromStr for Key {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(anyhow!("invalid key length {}", bytes.len()));
        }
        let mut key = [0; 32];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Key({})", hex::encode(&self.0[0..2]))
    }
}
