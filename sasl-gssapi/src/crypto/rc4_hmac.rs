//! [The RC4-HMAC Kerberos Encryption Types Used by Microsoft Windows](https://datatracker.ietf.org/doc/html/rfc4757)

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::Rng;
use rc4::consts::U16;
use rc4::{Key, KeyInit, Rc4, StreamCipher};

use crate::crypto::checksums_match;

pub const RC4_KEY_SIZE: usize = 16;
pub const RC4_CHECKSUM_SIZE: usize = 16;
pub const RC4_CONFOUNDER_SIZE: usize = 8;

/// https://datatracker.ietf.org/doc/html/rfc4757#section-4
/// the 13-octet ASCII string "signaturekey" with its null terminator
const SIGNATURE_KEY: &[u8; 13] = b"signaturekey\0";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Rc4HmacError {
    #[error("invalid RC4-HMAC key length: {0} (expected {RC4_KEY_SIZE})")]
    KeyLength(usize),
    #[error("RC4-HMAC cipher data is too short: {0}")]
    CipherLength(usize),
    #[error("RC4-HMAC integrity check failed")]
    IntegrityCheck,
}

pub type Rc4HmacResult<T> = Result<T, Rc4HmacError>;

/// Translates a Kerberos key usage into the Microsoft message type used as salt.
///
/// https://datatracker.ietf.org/doc/html/rfc4757#section-3
pub fn ms_usage(key_usage: i32) -> u32 {
    match key_usage {
        3 => 8,
        9 => 8,
        23 => 13,
        usage => usage as u32,
    }
}

pub fn hmac_md5(key: &[u8], parts: &[&[u8]]) -> Rc4HmacResult<Vec<u8>> {
    let mut hmacker = <Hmac<Md5> as Mac>::new_from_slice(key).map_err(|_| Rc4HmacError::KeyLength(key.len()))?;

    for part in parts {
        hmacker.update(part);
    }

    Ok(hmacker.finalize().into_bytes().to_vec())
}

/// Applies the RC4 key stream in place.
pub fn rc4_apply(key: &[u8], data: &mut [u8]) -> Rc4HmacResult<()> {
    if key.len() != RC4_KEY_SIZE {
        return Err(Rc4HmacError::KeyLength(key.len()));
    }

    let mut cipher = Rc4::<U16>::new(Key::<U16>::from_slice(key));
    cipher.apply_keystream(data);

    Ok(())
}

fn usage_key(key: &[u8], key_usage: i32) -> Rc4HmacResult<Vec<u8>> {
    hmac_md5(key, &[&ms_usage(key_usage).to_le_bytes()])
}

fn check_key(key: &[u8]) -> Rc4HmacResult<()> {
    if key.len() != RC4_KEY_SIZE {
        return Err(Rc4HmacError::KeyLength(key.len()));
    }

    Ok(())
}

pub fn encrypt(key: &[u8], key_usage: i32, payload: &[u8]) -> Rc4HmacResult<Vec<u8>> {
    let confounder = OsRng.gen::<[u8; RC4_CONFOUNDER_SIZE]>();

    encrypt_with_confounder(key, key_usage, payload, &confounder)
}

pub(crate) fn encrypt_with_confounder(
    key: &[u8],
    key_usage: i32,
    payload: &[u8],
    confounder: &[u8; RC4_CONFOUNDER_SIZE],
) -> Rc4HmacResult<Vec<u8>> {
    check_key(key)?;

    let k1 = usage_key(key, key_usage)?;

    let mut data = Vec::with_capacity(RC4_CONFOUNDER_SIZE + payload.len());
    data.extend_from_slice(confounder);
    data.extend_from_slice(payload);

    let checksum = hmac_md5(&k1, &[&data])?;
    let k3 = hmac_md5(&k1, &[&checksum])?;
    rc4_apply(&k3, &mut data)?;

    let mut cipher_data = checksum;
    cipher_data.append(&mut data);

    Ok(cipher_data)
}

pub fn decrypt(key: &[u8], key_usage: i32, cipher_data: &[u8]) -> Rc4HmacResult<Vec<u8>> {
    check_key(key)?;

    if cipher_data.len() < RC4_CHECKSUM_SIZE + RC4_CONFOUNDER_SIZE {
        return Err(Rc4HmacError::CipherLength(cipher_data.len()));
    }

    let (checksum, encrypted) = cipher_data.split_at(RC4_CHECKSUM_SIZE);

    let k1 = usage_key(key, key_usage)?;
    let k3 = hmac_md5(&k1, &[checksum])?;

    let mut data = encrypted.to_vec();
    rc4_apply(&k3, &mut data)?;

    if !checksums_match(&hmac_md5(&k1, &[&data])?, checksum) {
        return Err(Rc4HmacError::IntegrityCheck);
    }

    Ok(data.split_off(RC4_CONFOUNDER_SIZE))
}

/// HMAC-MD5 keyed checksum (checksum type -138).
pub fn checksum(key: &[u8], key_usage: i32, payload: &[u8]) -> Rc4HmacResult<Vec<u8>> {
    check_key(key)?;

    let ksign = hmac_md5(key, &[SIGNATURE_KEY])?;

    let mut hasher = Md5::new();
    hasher.update(ms_usage(key_usage).to_le_bytes());
    hasher.update(payload);
    let digest = hasher.finalize();

    hmac_md5(&ksign, &[&digest])
}
