//! Envelope codec: AES-GCM seal/open with the IV carried in front of the ciphertext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;

/// IV length in bytes. Transport layout is `iv || ciphertext`.
pub const IV_LEN: usize = 12;

/// AES-GCM tag length; appended to the ciphertext by the cipher.
pub const TAG_LEN: usize = 16;

/// Symmetric AEAD key. 16 bytes selects AES-128-GCM, 32 bytes AES-256-GCM.
#[derive(Clone)]
pub enum Key {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl Key {
    /// Build a key from raw key material.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        match bytes.len() {
            16 => Aes128Gcm::new_from_slice(bytes)
                .map(|c| Key::Aes128(Box::new(c)))
                .map_err(|_| KeyError::Length(16)),
            32 => Aes256Gcm::new_from_slice(bytes)
                .map(|c| Key::Aes256(Box::new(c)))
                .map_err(|_| KeyError::Length(32)),
            n => Err(KeyError::Length(n)),
        }
    }

    /// Use the UTF-8 bytes of a shared passphrase directly as key material.
    ///
    /// There is no KDF, salt or negotiation here: anyone who knows the
    /// passphrase can read every file. Suitable for demos only.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, KeyError> {
        Self::from_bytes(passphrase.as_bytes())
    }

    /// Random AES-256 key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Key::Aes256(Box::new(Aes256Gcm::new(
            aes_gcm::Key::<Aes256Gcm>::from_slice(&bytes),
        )))
    }

    /// Key size in bits.
    pub fn bits(&self) -> usize {
        match self {
            Key::Aes128(_) => 128,
            Key::Aes256(_) => 256,
        }
    }

    fn encrypt(&self, iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        let nonce = Nonce::from_slice(&iv[..]);
        match self {
            Key::Aes128(cipher) => cipher.encrypt(nonce, plaintext),
            Key::Aes256(cipher) => cipher.encrypt(nonce, plaintext),
        }
    }

    fn decrypt(&self, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        let nonce = Nonce::from_slice(&iv[..]);
        match self {
            Key::Aes128(cipher) => cipher.decrypt(nonce, ciphertext),
            Key::Aes256(cipher) => cipher.decrypt(nonce, ciphertext),
        }
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key(AES-{}-GCM)", self.bits())
    }
}

/// Sealed payload: random IV plus ciphertext with the tag appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    iv: [u8; IV_LEN],
    ciphertext: Vec<u8>,
}

impl Envelope {
    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Transport form: `iv || ciphertext`. No length prefix.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IV_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Split transport bytes at the fixed IV offset.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecryptionError> {
        if bytes.len() < IV_LEN + TAG_LEN {
            return Err(DecryptionError::Truncated { len: bytes.len() });
        }
        let (iv, ciphertext) = bytes.split_at(IV_LEN);
        let mut iv_arr = [0u8; IV_LEN];
        iv_arr.copy_from_slice(iv);
        Ok(Self {
            iv: iv_arr,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Encrypt `plaintext` under a fresh random IV. Never reuses an IV.
pub fn seal(plaintext: &[u8], key: &Key) -> Result<Envelope, SealError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = key.encrypt(&iv, plaintext).map_err(|_| SealError)?;
    Ok(Envelope { iv, ciphertext })
}

/// Authenticated decryption. Fails instead of returning unverified plaintext.
pub fn open(envelope: &Envelope, key: &Key) -> Result<Vec<u8>, DecryptionError> {
    key.decrypt(&envelope.iv, &envelope.ciphertext)
        .map_err(|_| DecryptionError::Authentication)
}

/// Parse `iv || ciphertext` and open it.
pub fn open_bytes(sealed: &[u8], key: &Key) -> Result<Vec<u8>, DecryptionError> {
    open(&Envelope::from_bytes(sealed)?, key)
}

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("key must be 16 or 32 bytes, got {0}")]
    Length(usize),
}

#[derive(Debug, thiserror::Error)]
#[error("encryption failed")]
pub struct SealError;

#[derive(Debug, thiserror::Error)]
pub enum DecryptionError {
    #[error("sealed payload too short ({len} bytes)")]
    Truncated { len: usize },
    #[error("authentication tag mismatch")]
    Authentication,
}
