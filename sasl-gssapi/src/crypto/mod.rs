//! Kerberos keyed encryption and checksums by encryption type.
//!
//! AES and DES3 are delegated to `picky-krb`, RC4-HMAC is implemented in [`rc4_hmac`].

pub mod rc4_hmac;

use std::fmt;

use picky_asn1::wrapper::{ExplicitContextTag0, ExplicitContextTag1, IntegerAsn1, OctetStringAsn1};
use picky_krb::crypto::{ChecksumSuite, CipherSuite};
use picky_krb::data_types::EncryptionKey;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::constants::cksum_types::{HMAC_MD5_RC4, HMAC_SHA1_96_AES128, HMAC_SHA1_96_AES256, HMAC_SHA1_DES3_KD};
use crate::constants::etypes::{AES128_CTS_HMAC_SHA1_96, AES256_CTS_HMAC_SHA1_96, DES3_CBC_SHA1_KD, RC4_HMAC};
use crate::error::EncodingError;

/// Encryption types accepted for session keys and long-term keys, in preference order.
pub const SUPPORTED_ETYPES: [i64; 4] = [
    AES256_CTS_HMAC_SHA1_96,
    AES128_CTS_HMAC_SHA1_96,
    RC4_HMAC,
    DES3_CBC_SHA1_KD,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCipher {
    Aes256CtsHmacSha196,
    Aes128CtsHmacSha196,
    Des3CbcSha1Kd,
    Rc4Hmac,
}

impl KeyCipher {
    pub fn from_etype(etype: i64) -> Result<Self, EncodingError> {
        match etype {
            AES256_CTS_HMAC_SHA1_96 => Ok(KeyCipher::Aes256CtsHmacSha196),
            AES128_CTS_HMAC_SHA1_96 => Ok(KeyCipher::Aes128CtsHmacSha196),
            DES3_CBC_SHA1_KD => Ok(KeyCipher::Des3CbcSha1Kd),
            RC4_HMAC => Ok(KeyCipher::Rc4Hmac),
            etype => Err(EncodingError::UnsupportedEncryptionType(etype)),
        }
    }

    pub fn etype(&self) -> i64 {
        match self {
            KeyCipher::Aes256CtsHmacSha196 => AES256_CTS_HMAC_SHA1_96,
            KeyCipher::Aes128CtsHmacSha196 => AES128_CTS_HMAC_SHA1_96,
            KeyCipher::Des3CbcSha1Kd => DES3_CBC_SHA1_KD,
            KeyCipher::Rc4Hmac => RC4_HMAC,
        }
    }

    /// Checksum type paired with this encryption type (RFC 3961 "required checksum mechanism").
    pub fn checksum_type(&self) -> i64 {
        match self {
            KeyCipher::Aes256CtsHmacSha196 => HMAC_SHA1_96_AES256 as i64,
            KeyCipher::Aes128CtsHmacSha196 => HMAC_SHA1_96_AES128 as i64,
            KeyCipher::Des3CbcSha1Kd => HMAC_SHA1_DES3_KD as i64,
            KeyCipher::Rc4Hmac => HMAC_MD5_RC4,
        }
    }

    fn cipher_suite(&self) -> Result<CipherSuite, EncodingError> {
        CipherSuite::try_from([self.etype() as u8].as_slice())
            .map_err(|_| EncodingError::UnsupportedEncryptionType(self.etype()))
    }

    fn checksum_suite(&self) -> Result<ChecksumSuite, EncodingError> {
        ChecksumSuite::try_from(self.checksum_type() as usize)
            .map_err(|_| EncodingError::UnsupportedEncryptionType(self.etype()))
    }

    pub fn encrypt(&self, key: &[u8], key_usage: i32, payload: &[u8]) -> Result<Vec<u8>, EncodingError> {
        match self {
            KeyCipher::Rc4Hmac => Ok(rc4_hmac::encrypt(key, key_usage, payload)?),
            _ => Ok(self.cipher_suite()?.cipher().encrypt(key, key_usage, payload)?),
        }
    }

    pub fn decrypt(&self, key: &[u8], key_usage: i32, cipher_data: &[u8]) -> Result<Vec<u8>, EncodingError> {
        match self {
            KeyCipher::Rc4Hmac => Ok(rc4_hmac::decrypt(key, key_usage, cipher_data)?),
            _ => Ok(self.cipher_suite()?.cipher().decrypt(key, key_usage, cipher_data)?),
        }
    }

    pub fn checksum(&self, key: &[u8], key_usage: i32, payload: &[u8]) -> Result<Vec<u8>, EncodingError> {
        match self {
            KeyCipher::Rc4Hmac => Ok(rc4_hmac::checksum(key, key_usage, payload)?),
            _ => Ok(self.checksum_suite()?.hasher().checksum(key, key_usage, payload)?),
        }
    }

    /// String-to-key. RC4-HMAC (MD4 of the UTF-16 password) is not available.
    pub fn generate_key_from_password(&self, password: &[u8], salt: &[u8]) -> Result<Vec<u8>, EncodingError> {
        match self {
            KeyCipher::Rc4Hmac => Err(EncodingError::UnsupportedEncryptionType(RC4_HMAC)),
            _ => Ok(self.cipher_suite()?.cipher().generate_key_from_password(password, salt)?),
        }
    }
}

/// Kerberos key material tagged with its encryption type. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey {
    etype: i64,
    value: Vec<u8>,
}

impl SessionKey {
    pub fn new(etype: i64, value: Vec<u8>) -> Self {
        Self { etype, value }
    }

    pub fn etype(&self) -> i64 {
        self.etype
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn cipher(&self) -> Result<KeyCipher, EncodingError> {
        KeyCipher::from_etype(self.etype)
    }

    pub fn to_encryption_key(&self) -> EncryptionKey {
        EncryptionKey {
            key_type: ExplicitContextTag0::from(integer_asn1(self.etype)),
            key_value: ExplicitContextTag1::from(OctetStringAsn1::from(self.value.clone())),
        }
    }
}

impl TryFrom<&EncryptionKey> for SessionKey {
    type Error = EncodingError;

    fn try_from(key: &EncryptionKey) -> Result<Self, Self::Error> {
        Ok(Self {
            etype: integer_to_i64(&key.key_type.0)?,
            value: key.key_value.0 .0.clone(),
        })
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("etype", &self.etype)
            .field("value", &"<redacted>")
            .finish()
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.value.zeroize();
    }
}

/// Minimal two's complement encoding of `value`.
pub fn integer_asn1(value: i64) -> IntegerAsn1 {
    let bytes = value.to_be_bytes();

    let mut start = 0;
    while start < bytes.len() - 1 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xff && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }

    IntegerAsn1::from(bytes[start..].to_vec())
}

pub fn integer_to_i64(integer: &IntegerAsn1) -> Result<i64, EncodingError> {
    let raw = &integer.0;

    if raw.is_empty() || raw.len() > 8 {
        return Err(EncodingError::malformed(
            "integer",
            format!("{} bytes do not fit in 64 bits", raw.len()),
        ));
    }

    let mut value: i64 = if raw[0] & 0x80 != 0 { -1 } else { 0 };
    for byte in raw.iter() {
        value = (value << 8) | i64::from(*byte);
    }

    Ok(value)
}

/// Compares two checksums in time independent of their contents.
pub fn checksums_match(computed: &[u8], received: &[u8]) -> bool {
    computed.ct_eq(received).into()
}
