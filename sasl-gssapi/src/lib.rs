//! # sasl-gssapi
//!
//! Client side of the SASL GSSAPI (Kerberos V5) handshake used by Kafka-compatible brokers.
//!
//! ```no_run
//! use std::net::TcpStream;
//!
//! use sasl_gssapi::{authorize_with_kdc, AuthConfig, AuthType, BrokerStream};
//!
//! let config = AuthConfig {
//!     auth_type: AuthType::Keytab,
//!     keytab_path: Some("/etc/security/client.keytab".into()),
//!     username: String::from("client@EXAMPLE.COM"),
//!     ..AuthConfig::default()
//! };
//!
//! let addr = "broker-1.example.com:9092";
//! let mut conn = BrokerStream::new(TcpStream::connect(addr)?, addr);
//! authorize_with_kdc(&mut conn, &config)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ap_req;
pub mod authorize;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod framing;
pub mod gss_api;
pub mod handshake;
pub mod names;

#[cfg(test)]
mod test_utils;

pub use authorize::{authorize, authorize_with_kdc};
pub use config::{AuthConfig, AuthType, SpnBuilder};
pub use credentials::{ClientGuard, KdcClient, KerberosClient};
pub use crypto::SessionKey;
pub use error::{CredentialError, EncodingError, GssapiError, Result, WrapTokenVersion};
pub use framing::{BrokerConnection, BrokerStream, TrafficMetrics};
pub use handshake::{HandshakeSession, HandshakeStep};
