//! Wired-update blob builder: chunks an application image (typically an
//! already-built OTA blob) into independently authenticated/encrypted pieces
//! for the WU protocol, each prefixed with a 96-byte header.

use crate::error::{Error, Result};
use crate::image::keys;
use crate::protocol::crypto::{aes_cbc_encrypt, fill_random, hmac_sha256, AES_CBC_BLOCK_SIZE};

/// `AM_SECBOOT_WIRED_IMAGETYPE_SBL`.
pub const IMAGE_TYPE_SBL: u8 = 0;
/// `AM_SECBOOT_WIRED_IMAGETYPE_AM3P`.
pub const IMAGE_TYPE_AM3P: u8 = 1;
/// `AM_SECBOOT_WIRED_IMAGETYPE_PATCH`.
pub const IMAGE_TYPE_PATCH: u8 = 2;
/// `AM_SECBOOT_WIRED_IMAGETYPE_MAIN`.
pub const IMAGE_TYPE_MAIN: u8 = 3;
/// `AM_SECBOOT_WIRED_IMAGETYPE_CHILD`.
pub const IMAGE_TYPE_CHILD: u8 = 4;
/// `AM_SECBOOT_WIRED_IMAGETYPE_CUSTPATCH`.
pub const IMAGE_TYPE_CUSTPATCH: u8 = 5;
/// `AM_SECBOOT_WIRED_IMAGETYPE_NONSECURE`: the default image type.
pub const IMAGE_TYPE_NONSECURE: u8 = 6;
/// `AM_SECBOOT_WIRED_IMAGETYPE_INFO0`.
pub const IMAGE_TYPE_INFO0: u8 = 7;
/// `AM_SECBOOT_WIRED_IMAGETYPE_INFO0_NOOTA`: addresses this image type in
/// words rather than bytes, and wraps its session key under [`keys::INFO_KEY`]
/// instead of [`keys::FLASH_KEY`].
pub const IMAGE_TYPE_INFO0_NOOTA: u8 = 32;
/// `AM_SECBOOT_WIRED_IMAGETYPE_INVALID`.
pub const IMAGE_TYPE_INVALID: u8 = 0xFF;

/// Flash page size; `split` must be a multiple of this.
pub const FLASH_PAGE_SIZE: usize = 0x2000;

const OFFSET_SIG: usize = 16;
const OFFSET_IV: usize = 48;
const OFFSET_KEK: usize = 64;
const KEK_SIZE: usize = 16;
const HMAC_SIG_SIZE: usize = 32;
const OFFSET_IMAGETYPE: usize = OFFSET_KEK + KEK_SIZE;
const OFFSET_OPTIONS: usize = OFFSET_IMAGETYPE + 1;
const OFFSET_KEY: usize = OFFSET_IMAGETYPE + 4;
const OFFSET_ADDR: usize = OFFSET_KEY + 4;
const OFFSET_SIZE: usize = OFFSET_ADDR + 4;
const START_HMAC: usize = OFFSET_SIG + HMAC_SIG_SIZE;
const START_ENCRYPT: usize = OFFSET_KEK + KEK_SIZE;

/// Fixed header length prepended to each chunk of a wired-update blob.
pub const WIRED_IMAGEHDR_SIZE: usize = START_ENCRYPT + 16;

/// Parameters for chunking an application image into a wired-update blob,
/// mirroring the wired-update-specific "Recognized configuration options"
/// in `SPEC_FULL.md` §6.
#[derive(Debug, Clone)]
pub struct WiredOptions {
    pub load_address: u32,
    pub image_type: u8,
    pub authalgo: u8,
    pub encalgo: u8,
    pub auth_key_idx: u32,
    pub enc_key_idx: u32,
    pub options: u8,
    /// Maximum size, in bytes, of the application data carried by one chunk
    /// (excluding this chunk's own header). Must be a multiple of
    /// [`FLASH_PAGE_SIZE`].
    pub split: usize,
}

impl Default for WiredOptions {
    fn default() -> Self {
        Self {
            load_address: 0x20000,
            image_type: IMAGE_TYPE_NONSECURE,
            authalgo: 0,
            encalgo: 0,
            auth_key_idx: 8,
            enc_key_idx: 8,
            options: 0x1,
            split: 0x4_8000,
        }
    }
}

fn fill_word(buf: &mut [u8], offset: usize, word: u32) {
    buf[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
}

fn pad_to_block_size(mut data: Vec<u8>, block_size: usize, zero_pad_if_aligned: bool) -> Vec<u8> {
    let remainder = data.len() % block_size;
    let mut amount = block_size - remainder;
    if amount == block_size && !zero_pad_if_aligned {
        amount = 0;
    }
    data.resize(data.len() + amount, 0);
    data
}

/// Split `app` (typically an OTA blob produced by [`crate::image::ota::build_ota_blob`])
/// into one or more wired-update chunks, each its own
/// `header(96 bytes) | body` pair, concatenated in ascending load-address order.
pub fn build_wired_blob(options: &WiredOptions, app: &[u8]) -> Result<Vec<u8>> {
    if options.split & (FLASH_PAGE_SIZE - 1) != 0 {
        return Err(Error::InvalidImage(
            "split size must be a multiple of the flash page size".to_string(),
        ));
    }

    if options.encalgo != 0 {
        if options.enc_key_idx < keys::MIN_AES_KEY_IDX || options.enc_key_idx > keys::MAX_AES_KEY_IDX {
            return Err(Error::InvalidImage(format!(
                "invalid encryption key index {}",
                options.enc_key_idx
            )));
        }
        // The 96-byte wired-update header reserves a bit-exact 16-byte KEK
        // field (AM_KEK_SIZE): a wrapped AES-256 session key is 32 bytes and
        // does not fit, so encAlgo=2 is rejected here rather than silently
        // dropping half the wrapped key into the following header fields.
        if options.encalgo == 2 {
            return Err(Error::InvalidImage(
                "AES-256 (encAlgo=2) is not supported: the wired-update header's KEK field is a fixed 16 bytes and cannot hold a wrapped 32-byte key".to_string(),
            ));
        }
    }
    let key_size = 16;

    if options.authalgo != 0
        && (options.auth_key_idx < keys::MIN_HMAC_KEY_IDX
            || options.auth_key_idx > keys::MAX_HMAC_KEY_IDX
            || options.auth_key_idx & 1 != 0)
    {
        return Err(Error::InvalidImage(format!(
            "invalid auth key index {}",
            options.auth_key_idx
        )));
    }

    let app_padded = if options.encalgo != 0 {
        pad_to_block_size(app.to_vec(), key_size, true)
    } else {
        pad_to_block_size(app.to_vec(), 4, false)
    };
    let app_length = app_padded.len();

    let w0 = (u32::from(options.authalgo) & 0xF)
        | ((options.auth_key_idx << 8) & 0xF00)
        | ((u32::from(options.encalgo) << 16) & 0xF_0000)
        | ((options.enc_key_idx << 24) & 0x0F00_0000);

    let mut out = Vec::new();
    let mut start = 0usize;
    let mut load_address = options.load_address;

    while start < app_length {
        let end = (start + options.split).min(app_length);

        let mut hdr = vec![0u8; WIRED_IMAGEHDR_SIZE];

        let key_marker = if options.image_type == IMAGE_TYPE_INFO0_NOOTA {
            fill_word(&mut hdr, OFFSET_ADDR, load_address >> 2);
            keys::INFO_KEY
        } else {
            fill_word(&mut hdr, OFFSET_ADDR, load_address);
            keys::FLASH_KEY
        };

        hdr[OFFSET_IMAGETYPE] = options.image_type;
        hdr[OFFSET_OPTIONS] = if start == 0 { options.options } else { 0 };
        fill_word(&mut hdr, OFFSET_KEY, key_marker);
        fill_word(&mut hdr, OFFSET_SIZE, (end - start) as u32);
        fill_word(&mut hdr, 0, w0);

        let enc_body = if options.encalgo != 0 {
            let enc_key_rel = options.enc_key_idx - keys::MIN_AES_KEY_IDX;
            let mut iv = [0u8; AES_CBC_BLOCK_SIZE];
            fill_random(&mut iv);
            let mut session_key = vec![0u8; key_size];
            fill_random(&mut session_key);

            let mut to_encrypt = hdr[START_ENCRYPT..WIRED_IMAGEHDR_SIZE].to_vec();
            to_encrypt.extend_from_slice(&app_padded[start..end]);
            let encrypted = aes_cbc_encrypt(&session_key, &iv, &to_encrypt)?;

            let wrap_key = keys::aes_key_slot(enc_key_rel, key_size);
            let encrypted_session_key = aes_cbc_encrypt(wrap_key, &keys::IV_VAL_0, &session_key)?;

            hdr[OFFSET_IV..OFFSET_IV + AES_CBC_BLOCK_SIZE].copy_from_slice(&iv);
            hdr[OFFSET_KEK..OFFSET_KEK + key_size].copy_from_slice(&encrypted_session_key);
            encrypted
        } else {
            let mut body = hdr[START_ENCRYPT..WIRED_IMAGEHDR_SIZE].to_vec();
            body.extend_from_slice(&app_padded[start..end]);
            body
        };

        if options.authalgo != 0 {
            let auth_key_rel = options.auth_key_idx - keys::MIN_HMAC_KEY_IDX;
            let key = keys::hmac_key_slot(auth_key_rel);
            let mut signed = hdr[START_HMAC..START_ENCRYPT].to_vec();
            signed.extend_from_slice(&enc_body);
            let sig = hmac_sha256(key, &signed);
            hdr[OFFSET_SIG..OFFSET_SIG + HMAC_SIG_SIZE].copy_from_slice(&sig);
        }

        out.extend_from_slice(&hdr[0..START_ENCRYPT]);
        out.extend_from_slice(&enc_body);

        start = end;
        load_address += options.split as u32;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_for_small_image() {
        let options = WiredOptions::default();
        let blob = build_wired_blob(&options, &[1, 2, 3, 4]).unwrap();
        assert_eq!(blob.len(), WIRED_IMAGEHDR_SIZE + 4);
    }

    #[test]
    fn rejects_split_not_page_multiple() {
        let options = WiredOptions {
            split: 0x2001,
            ..WiredOptions::default()
        };
        assert!(build_wired_blob(&options, &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn chunks_app_across_split_boundaries_in_ascending_address_order() {
        let options = WiredOptions {
            split: FLASH_PAGE_SIZE,
            load_address: 0x1000,
            ..WiredOptions::default()
        };
        let app = vec![0xAAu8; FLASH_PAGE_SIZE * 2 + 16];
        let blob = build_wired_blob(&options, &app).unwrap();

        // Three chunks: two full split-sized pieces plus a short remainder.
        let chunk0_addr = u32::from_le_bytes([blob[OFFSET_ADDR], blob[OFFSET_ADDR + 1], blob[OFFSET_ADDR + 2], blob[OFFSET_ADDR + 3]]);
        assert_eq!(chunk0_addr, 0x1000);

        let chunk0_size = (WIRED_IMAGEHDR_SIZE + FLASH_PAGE_SIZE) as u32;
        let second_hdr_start = START_ENCRYPT + FLASH_PAGE_SIZE + (WIRED_IMAGEHDR_SIZE - START_ENCRYPT);
        let _ = chunk0_size;
        let second_addr_off = second_hdr_start + OFFSET_ADDR;
        let chunk1_addr = u32::from_le_bytes([
            blob[second_addr_off],
            blob[second_addr_off + 1],
            blob[second_addr_off + 2],
            blob[second_addr_off + 3],
        ]);
        assert_eq!(chunk1_addr, 0x1000 + FLASH_PAGE_SIZE as u32);
    }

    #[test]
    fn info0_noota_addresses_in_words() {
        let options = WiredOptions {
            image_type: IMAGE_TYPE_INFO0_NOOTA,
            load_address: 0x1000,
            ..WiredOptions::default()
        };
        let blob = build_wired_blob(&options, &[1, 2, 3, 4]).unwrap();
        let addr = u32::from_le_bytes([blob[OFFSET_ADDR], blob[OFFSET_ADDR + 1], blob[OFFSET_ADDR + 2], blob[OFFSET_ADDR + 3]]);
        assert_eq!(addr, 0x1000 >> 2);

        let key = u32::from_le_bytes([blob[OFFSET_KEY], blob[OFFSET_KEY + 1], blob[OFFSET_KEY + 2], blob[OFFSET_KEY + 3]]);
        assert_eq!(key, keys::INFO_KEY);
    }

    #[test]
    fn options_byte_only_set_on_first_chunk() {
        let options = WiredOptions {
            split: FLASH_PAGE_SIZE,
            options: 0x7,
            ..WiredOptions::default()
        };
        let app = vec![0u8; FLASH_PAGE_SIZE + 16];
        let blob = build_wired_blob(&options, &app).unwrap();
        assert_eq!(blob[OFFSET_OPTIONS], 0x7);

        let second_hdr_start = START_ENCRYPT + FLASH_PAGE_SIZE + (WIRED_IMAGEHDR_SIZE - START_ENCRYPT);
        assert_eq!(blob[second_hdr_start + OFFSET_OPTIONS], 0);
    }

    #[test]
    fn builds_with_aes_128_at_highest_valid_key_idx() {
        let options = WiredOptions {
            encalgo: 1,
            enc_key_idx: 15,
            ..WiredOptions::default()
        };
        let blob = build_wired_blob(&options, &[1, 2, 3, 4]).unwrap();
        let kek = &blob[OFFSET_KEK..OFFSET_KEK + 16];
        assert_ne!(kek, &[0u8; 16]);
    }

    #[test]
    fn rejects_aes_256() {
        // The 16-byte KEK field can't hold a wrapped 32-byte key; encAlgo=2
        // must be rejected rather than truncated or silently corrupted.
        let options = WiredOptions {
            encalgo: 2,
            enc_key_idx: 8,
            ..WiredOptions::default()
        };
        assert!(build_wired_blob(&options, &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn rejects_invalid_enc_key_idx() {
        let options = WiredOptions {
            encalgo: 1,
            enc_key_idx: 20,
            ..WiredOptions::default()
        };
        assert!(build_wired_blob(&options, &[1, 2, 3, 4]).is_err());
    }
}
