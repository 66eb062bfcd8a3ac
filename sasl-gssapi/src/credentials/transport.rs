//! KDC transport: Kerberos over TCP (RFC 4120 section 7.2.2), framed like the broker traffic.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, warn};

use crate::error::{CredentialError, GssapiError};
use crate::framing::{read_frame, write_frame};

pub trait KdcTransport {
    /// Sends one DER encoded request to a KDC of `realm` and returns the raw reply.
    fn exchange(&mut self, realm: &str, kdcs: &[String], request: &[u8]) -> Result<Vec<u8>, CredentialError>;
}

#[derive(Debug, Clone)]
pub struct TcpKdcTransport {
    timeout: Duration,
}

impl TcpKdcTransport {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn exchange_with(&self, kdc: &str, request: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let address = kdc
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{} did not resolve", kdc)))?;

        let mut stream = TcpStream::connect_timeout(&address, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;

        write_frame(&mut stream, request).map_err(into_io)?;
        let (reply, _) = read_frame(&mut stream).map_err(into_io)?;

        Ok(reply)
    }
}

impl KdcTransport for TcpKdcTransport {
    fn exchange(&mut self, realm: &str, kdcs: &[String], request: &[u8]) -> Result<Vec<u8>, CredentialError> {
        for kdc in kdcs {
            match self.exchange_with(kdc, request) {
                Ok(reply) => {
                    debug!("KDC {} replied with {} bytes", kdc, reply.len());
                    return Ok(reply);
                }
                Err(e) => warn!("KDC {} of realm {} failed: {}", kdc, realm, e),
            }
        }

        Err(CredentialError::NoKdc {
            realm: realm.to_owned(),
        })
    }
}

fn into_io(e: GssapiError) -> io::Error {
    match e {
        GssapiError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn framed_exchange_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let kdc = listener.local_addr().unwrap().to_string();

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let (request, _) = read_frame(&mut stream).unwrap();
            write_frame(&mut stream, &[request, vec![0xee]].concat()).unwrap();
        });

        let mut transport = TcpKdcTransport::new(Duration::from_secs(5));
        let reply = transport
            .exchange("EXAMPLE.COM", &[kdc], &[0x6a, 0x01, 0x02])
            .unwrap();
        server.join().unwrap();

        assert_eq!(reply, vec![0x6a, 0x01, 0x02, 0xee]);
    }

    #[test]
    fn unreachable_kdcs() {
        // bound then dropped: nothing listens on this port
        let kdc = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .to_string();

        let mut transport = TcpKdcTransport::new(Duration::from_secs(1));

        assert!(matches!(
            transport.exchange("EXAMPLE.COM", &[kdc], &[0x6a]),
            Err(CredentialError::NoKdc { realm }) if realm == "EXAMPLE.COM"
        ));
        assert!(matches!(
            transport.exchange("EXAMPLE.COM", &[], &[0x6a]),
            Err(CredentialError::NoKdc { .. })
        ));
    }
}
