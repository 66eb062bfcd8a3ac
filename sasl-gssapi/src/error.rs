use std::io;

use picky_asn1_der::Asn1DerError;
use picky_krb::crypto::KerberosCryptoError;

use crate::crypto::rc4_hmac::Rc4HmacError;
use crate::handshake::HandshakeStep;

pub type Result<T, E = GssapiError> = std::result::Result<T, E>;

/// Wire format generation of a wrap token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapTokenVersion {
    /// RFC 1964 / RFC 4757 token inside the generic GSS-API framing.
    V1,
    /// RFC 4121 token.
    V2,
}

impl std::fmt::Display for WrapTokenVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WrapTokenVersion::V1 => write!(f, "v1"),
            WrapTokenVersion::V2 => write!(f, "v2"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum GssapiError {
    #[error("kerberos credential acquisition failed: {0}")]
    CredentialAcquisition(#[from] CredentialError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("payload of {len} bytes does not fit in a 32-bit frame")]
    Oversize { len: usize },
    #[error("stream ended after {read} of {expected} bytes")]
    TruncatedRead { expected: usize, read: usize },
    #[error("{version} wrap token verification failed: {reason}")]
    TokenVerification {
        version: WrapTokenVersion,
        reason: &'static str,
    },
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error("no token can be produced at step {step:?}")]
    OutOfSequence { step: HandshakeStep },
}

impl GssapiError {
    pub(crate) fn verification(version: WrapTokenVersion, reason: &'static str) -> Self {
        GssapiError::TokenVerification { version, reason }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EncodingError {
    #[error(transparent)]
    Asn1(#[from] Asn1DerError),
    #[error(transparent)]
    Crypto(#[from] KerberosCryptoError),
    #[error(transparent)]
    Rc4Hmac(#[from] Rc4HmacError),
    #[error("malformed {context}: {reason}")]
    MalformedToken { context: &'static str, reason: String },
    #[error("unsupported encryption type: {0}")]
    UnsupportedEncryptionType(i64),
    #[error("unsupported {context}: {value:#06x}")]
    UnsupportedAlgorithm { context: &'static str, value: u16 },
    #[error("invalid kerberos string: {0}")]
    InvalidString(String),
    #[error("invalid object identifier: {0}")]
    InvalidOid(String),
}

impl EncodingError {
    pub(crate) fn malformed(context: &'static str, reason: impl Into<String>) -> Self {
        EncodingError::MalformedToken {
            context,
            reason: reason.into(),
        }
    }
}

impl From<Asn1DerError> for GssapiError {
    fn from(e: Asn1DerError) -> Self {
        GssapiError::Encoding(e.into())
    }
}

impl From<KerberosCryptoError> for GssapiError {
    fn from(e: KerberosCryptoError) -> Self {
        GssapiError::Encoding(e.into())
    }
}

impl From<Rc4HmacError> for GssapiError {
    fn from(e: Rc4HmacError) -> Self {
        GssapiError::Encoding(e.into())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CredentialError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid kerberos configuration: {0}")]
    Config(String),
    #[error("invalid keytab: {0}")]
    Keytab(String),
    #[error("invalid credential cache: {0}")]
    CredentialCache(String),
    #[error("KDC returned error {code}{}", .text.as_deref().map(|t| format!(": {t}")).unwrap_or_default())]
    Kdc { code: i64, text: Option<String> },
    #[error("no KDC reachable for realm {realm}")]
    NoKdc { realm: String },
    #[error("no ticket-granting ticket: login first")]
    NotLoggedIn,
    #[error("no key for {principal} with a supported encryption type")]
    KeyNotFound { principal: String },
    #[error("unexpected KDC reply: {0}")]
    UnexpectedReply(&'static str),
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

impl From<Asn1DerError> for CredentialError {
    fn from(e: Asn1DerError) -> Self {
        CredentialError::Encoding(e.into())
    }
}

impl From<KerberosCryptoError> for CredentialError {
    fn from(e: KerberosCryptoError) -> Self {
        CredentialError::Encoding(e.into())
    }
}

impl From<Rc4HmacError> for CredentialError {
    fn from(e: Rc4HmacError) -> Self {
        CredentialError::Encoding(e.into())
    }
}
