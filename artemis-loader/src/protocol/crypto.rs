//! HMAC-SHA256 and AES-128/256-CBC primitives used by the Image Builder.
//!
//! The SVL and WU protocols themselves carry no cryptography; these are
//! used only when building an OTA blob or wired-update blob with
//! authentication or encryption enabled (see [`crate::image`]).

use aes::{Aes128, Aes256};
use cbc::cipher::{BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;
type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// Size in bytes of an HMAC-SHA256 digest.
pub const HMAC_SIG_SIZE: usize = 32;

/// AES-CBC block size in bytes.
pub const AES_CBC_BLOCK_SIZE: usize = 16;

/// Compute HMAC-SHA256 over `data` with the given key.
///
/// The key is typically a 32-byte slot from a dummy key table (see
/// [`crate::image::keys`]); real deployments must supply real key material.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; HMAC_SIG_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    let result = mac.finalize().into_bytes();
    let mut out = [0u8; HMAC_SIG_SIZE];
    out.copy_from_slice(&result);
    out
}

/// Encrypt `plaintext` with AES-CBC. `plaintext` must already be
/// block-aligned (the caller pads before calling); `iv` must be 16 bytes.
/// `key` selects the cipher: 16 bytes for AES-128, 32 bytes for AES-256; any
/// other length is rejected rather than silently truncated.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    if iv.len() != AES_CBC_BLOCK_SIZE {
        return Err(Error::InvalidImage("AES-CBC IV must be 16 bytes".to_string()));
    }
    if plaintext.len() % AES_CBC_BLOCK_SIZE != 0 {
        return Err(Error::InvalidImage(
            "AES-CBC plaintext must be block-aligned".to_string(),
        ));
    }

    let mut buf = plaintext.to_vec();
    let len = buf.len();
    let ciphertext = match key.len() {
        16 => {
            let encryptor = Aes128CbcEnc::new(key.into(), iv.into());
            encryptor
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|e| Error::InvalidImage(format!("AES-CBC encryption failed: {e}")))?
                .to_vec()
        },
        32 => {
            let encryptor = Aes256CbcEnc::new(key.into(), iv.into());
            encryptor
                .encrypt_padded_mut::<NoPadding>(&mut buf, len)
                .map_err(|e| Error::InvalidImage(format!("AES-CBC encryption failed: {e}")))?
                .to_vec()
        },
        other => {
            return Err(Error::InvalidImage(format!(
                "AES-CBC key must be 16 (AES-128) or 32 (AES-256) bytes, got {other}"
            )));
        },
    };
    Ok(ciphertext)
}

/// Fill `buf` with cryptographically secure random bytes, for IVs and
/// ephemeral session keys drawn by the Image Builder.
pub fn fill_random(buf: &mut [u8]) {
    rand::thread_rng().fill_bytes(buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hmac_is_deterministic_and_right_length() {
        let key = [0u8; 32];
        let data = b"artemis";
        let a = hmac_sha256(&key, data);
        let b = hmac_sha256(&key, data);
        assert_eq!(a, b);
        assert_eq!(a.len(), HMAC_SIG_SIZE);
    }

    #[test]
    fn hmac_changes_with_data() {
        let key = [0u8; 32];
        assert_ne!(hmac_sha256(&key, b"a"), hmac_sha256(&key, b"b"));
    }

    #[test]
    fn aes_cbc_roundtrips_block_aligned_input() {
        let key = [0x42u8; 16];
        let iv = [0u8; 16];
        let plaintext = [0xAAu8; 32];
        let ciphertext = aes_cbc_encrypt(&key, &iv, &plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext, plaintext);
    }

    #[test]
    fn aes_cbc_rejects_unaligned_input() {
        let key = [0u8; 16];
        let iv = [0u8; 16];
        assert!(aes_cbc_encrypt(&key, &iv, &[0u8; 5]).is_err());
    }

    #[test]
    fn aes_256_cbc_roundtrips_block_aligned_input() {
        let key = [0x7Eu8; 32];
        let iv = [0u8; 16];
        let plaintext = [0xAAu8; 32];
        let ciphertext = aes_cbc_encrypt(&key, &iv, &plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext, plaintext);
        // AES-128 and AES-256 must not agree on the same plaintext/IV.
        let aes128_ciphertext = aes_cbc_encrypt(&key[..16], &iv, &plaintext).unwrap();
        assert_ne!(ciphertext, aes128_ciphertext);
    }

    #[test]
    fn aes_cbc_rejects_key_length_other_than_128_or_256() {
        let key = [0u8; 24];
        let iv = [0u8; 16];
        assert!(aes_cbc_encrypt(&key, &iv, &[0u8; 16]).is_err());
    }

    #[test]
    fn fill_random_does_not_leave_buffer_zeroed() {
        let mut buf = [0u8; 32];
        fill_random(&mut buf);
        assert!(buf.iter().any(|&b| b != 0));
    }
}
