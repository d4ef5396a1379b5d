//! OTA blob builder: wraps an application binary in the signed/encrypted
//! image header the secure bootloader expects.

use crate::error::{Error, Result};
use crate::image::keys;
use crate::protocol::crc32;
use crate::protocol::crypto::{aes_cbc_encrypt, fill_random, hmac_sha256, AES_CBC_BLOCK_SIZE};

/// `AM_IMAGE_MAGIC_MAIN`: main-image header (256 bytes).
pub const MAGIC_MAIN: u8 = 0xC0;
/// `AM_IMAGE_MAGIC_CHILD`.
pub const MAGIC_CHILD: u8 = 0xCC;
/// `AM_IMAGE_MAGIC_NONSECURE`: the default magic for this system.
pub const MAGIC_NONSECURE: u8 = 0xCB;
/// `AM_IMAGE_MAGIC_INFO0`.
pub const MAGIC_INFO0: u8 = 0xCF;
/// `AM_IMAGE_MAGIC_CUSTPATCH`.
pub const MAGIC_CUSTPATCH: u8 = 0xC1;

const IMAGEHDR_SIZE_MAIN: usize = 256;
const IMAGEHDR_SIZE_AUX: usize = 128;

const OFFSET_CRC: usize = 4;
const OFFSET_SIG: usize = 16;
const OFFSET_IV: usize = 48;
const OFFSET_KEK: usize = 64;
const KEK_SIZE: usize = 16;
const HMAC_SIG_SIZE: usize = 32;
const OFFSET_SIGCLR: usize = OFFSET_KEK + KEK_SIZE;
const START_CRC: usize = OFFSET_CRC + 4;
const START_HMAC_INST: usize = OFFSET_SIG + HMAC_SIG_SIZE;
const START_ENCRYPT: usize = OFFSET_KEK + KEK_SIZE;
const START_HMAC: usize = OFFSET_SIGCLR + HMAC_SIG_SIZE;
const OFFSET_ADDR: usize = START_HMAC;
const OFFSET_VERKEY: usize = OFFSET_ADDR + 4;
const OFFSET_CHILDPTR: usize = OFFSET_VERKEY + 4;

const INFO_SIZE_BYTES: usize = 8 * 1024;

/// Parameters for building one OTA blob from an application binary, mirroring
/// the "Recognized configuration options" in `SPEC_FULL.md` §6.
#[derive(Debug, Clone)]
pub struct OtaOptions {
    pub load_address: u32,
    pub magic_num: u8,
    pub crc_install: u8,
    pub crc_boot: u8,
    pub auth_install: u8,
    pub auth_boot: u8,
    pub protection: u8,
    pub auth_key_idx: u32,
    pub enc_key_idx: u32,
    pub version: u16,
    pub erase_prev: u8,
    pub child0: u32,
    pub child1: u32,
    pub authalgo: u8,
    pub encalgo: u8,
}

impl Default for OtaOptions {
    fn default() -> Self {
        Self {
            load_address: 0xC000,
            magic_num: MAGIC_NONSECURE,
            crc_install: 0,
            crc_boot: 0,
            auth_install: 0,
            auth_boot: 0,
            protection: 0,
            auth_key_idx: 8,
            enc_key_idx: 8,
            version: 0,
            erase_prev: 0,
            child0: 0xFFFF_FFFF,
            child1: 0xFFFF_FFFF,
            authalgo: 0,
            encalgo: 0,
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

/// Build an OTA blob from `app` per `options`. Returns the finished blob:
/// `header[0..start_encrypt] || encrypted_or_plain_body`.
pub fn build_ota_blob(options: &OtaOptions, app: &[u8]) -> Result<Vec<u8>> {
    let enc_enabled = options.encalgo != 0;
    if enc_enabled {
        if options.enc_key_idx < keys::MIN_AES_KEY_IDX || options.enc_key_idx > keys::MAX_AES_KEY_IDX {
            return Err(Error::InvalidImage(format!(
                "invalid encryption key index {}",
                options.enc_key_idx
            )));
        }
        // The image header reserves a bit-exact 16-byte KEK field
        // (AM_KEK_SIZE): a wrapped AES-256 session key is 32 bytes and does
        // not fit, so encAlgo=2 is rejected here rather than silently
        // dropping half the wrapped key into the following header fields.
        if options.encalgo == 2 {
            return Err(Error::InvalidImage(
                "AES-256 (encAlgo=2) is not supported: the image header's KEK field is a fixed 16 bytes and cannot hold a wrapped 32-byte key".to_string(),
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

    let hdr_length = match options.magic_num {
        MAGIC_MAIN => IMAGEHDR_SIZE_MAIN,
        MAGIC_CHILD | MAGIC_CUSTPATCH | MAGIC_NONSECURE | MAGIC_INFO0 => IMAGEHDR_SIZE_AUX,
        other => return Err(Error::InvalidImage(format!("magic number {other:#x} not supported"))),
    };

    if options.load_address & 0x3 != 0 {
        return Err(Error::InvalidImage("load address must be word-aligned".to_string()));
    }

    let orig_app_length = app.len();
    if options.magic_num == MAGIC_INFO0 {
        if orig_app_length & 0x3 != 0 {
            return Err(Error::InvalidImage("INFO0 blob length must be a multiple of 4".to_string()));
        }
        if options.load_address as usize + orig_app_length > INFO_SIZE_BYTES {
            return Err(Error::InvalidImage("INFO0 offset and length exceed size".to_string()));
        }
    }

    let app_padded = if enc_enabled {
        pad_to_block_size(app.to_vec(), AES_CBC_BLOCK_SIZE, true)
    } else {
        pad_to_block_size(app.to_vec(), 4, false)
    };
    let app_length = app_padded.len();

    let mut hdr = vec![0u8; hdr_length];

    let blob_len = (hdr_length + app_length) as u32;
    let w0 = (u32::from(options.magic_num) << 24) | (u32::from(enc_enabled) << 23) | blob_len;
    fill_word(&mut hdr, 0, w0);

    let security_val = (((u32::from(options.auth_install) << 1) | u32::from(options.crc_install)) << 4)
        | (u32::from(options.auth_boot) << 1)
        | u32::from(options.crc_boot);
    let w2 = ((security_val << 24) & 0xFF00_0000)
        | (u32::from(options.authalgo) & 0xF)
        | ((options.auth_key_idx << 4) & 0xF0)
        | ((u32::from(options.encalgo) << 8) & 0xF00)
        | ((options.enc_key_idx << 12) & 0xF000);
    fill_word(&mut hdr, 8, w2);

    let (addr_word, version_key_word) = if options.magic_num == MAGIC_INFO0 {
        let addr_word = ((orig_app_length as u32 >> 2) << 16) | ((options.load_address >> 2) & 0xFFFF);
        (addr_word, keys::INFO_KEY)
    } else {
        let addr_word = options.load_address | u32::from(options.protection & 0x3);
        let version_key_word = u32::from(options.version & 0x7FFF) | (u32::from(options.erase_prev & 0x1) << 15);
        (addr_word, version_key_word)
    };
    fill_word(&mut hdr, OFFSET_ADDR, addr_word);
    fill_word(&mut hdr, OFFSET_VERKEY, version_key_word);
    fill_word(&mut hdr, OFFSET_CHILDPTR, options.child0);
    fill_word(&mut hdr, OFFSET_CHILDPTR + 4, options.child1);

    let auth_key_rel = options.auth_key_idx - keys::MIN_HMAC_KEY_IDX;
    if options.auth_boot != 0 {
        let key = keys::hmac_key_slot(auth_key_rel);
        let mut signed = hdr[START_HMAC..hdr_length].to_vec();
        signed.extend_from_slice(&app_padded);
        let sig_clr = hmac_sha256(key, &signed);
        hdr[OFFSET_SIGCLR..OFFSET_SIGCLR + HMAC_SIG_SIZE].copy_from_slice(&sig_clr);
    }

    let enc_body = if enc_enabled {
        let enc_key_rel = options.enc_key_idx - keys::MIN_AES_KEY_IDX;
        let mut iv = [0u8; AES_CBC_BLOCK_SIZE];
        fill_random(&mut iv);
        let mut session_key = vec![0u8; key_size];
        fill_random(&mut session_key);

        let mut to_encrypt = hdr[START_ENCRYPT..hdr_length].to_vec();
        to_encrypt.extend_from_slice(&app_padded);
        let encrypted = aes_cbc_encrypt(&session_key, &iv, &to_encrypt)?;

        let wrap_key = keys::aes_key_slot(enc_key_rel, key_size);
        let encrypted_session_key = aes_cbc_encrypt(wrap_key, &keys::IV_VAL_0, &session_key)?;

        hdr[OFFSET_IV..OFFSET_IV + AES_CBC_BLOCK_SIZE].copy_from_slice(&iv);
        hdr[OFFSET_KEK..OFFSET_KEK + key_size].copy_from_slice(&encrypted_session_key);
        encrypted
    } else {
        let mut body = hdr[START_ENCRYPT..hdr_length].to_vec();
        body.extend_from_slice(&app_padded);
        body
    };

    if options.crc_install != 0 {
        let auth_key_rel = options.auth_key_idx - keys::MIN_HMAC_KEY_IDX;
        let key = keys::hmac_key_slot(auth_key_rel);
        let mut signed = hdr[START_HMAC_INST..START_ENCRYPT].to_vec();
        signed.extend_from_slice(&enc_body);
        let sig = hmac_sha256(key, &signed);
        hdr[OFFSET_SIG..OFFSET_SIG + HMAC_SIG_SIZE].copy_from_slice(&sig);
    }

    let mut crc_input = hdr[START_CRC..hdr_length].to_vec();
    crc_input.extend_from_slice(&app_padded);
    let w1 = crc32(&crc_input);
    fill_word(&mut hdr, OFFSET_CRC, w1);

    let mut blob = hdr[0..START_ENCRYPT].to_vec();
    blob.extend_from_slice(&enc_body);
    Ok(blob)
}
