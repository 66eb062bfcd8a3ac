use std::time::Instant;

use log::{debug, error, trace};

use crate::config::AuthConfig;
use crate::credentials::{ClientGuard, KdcClient, KerberosClient};
use crate::error::{GssapiError, Result};
use crate::framing::{read_frame_counting, write_frame, BrokerConnection};
use crate::handshake::{HandshakeSession, HandshakeStep};

/// Authenticates `conn` with SASL GSSAPI (Kerberos V5).
///
/// `client` is released once before returning, whatever the outcome.
pub fn authorize<C>(conn: &mut C, config: &AuthConfig, client: impl KerberosClient) -> Result<()>
where
    C: BrokerConnection + ?Sized,
{
    let mut client = ClientGuard::new(client);

    if let Err(e) = client.login() {
        error!("Kerberos client error: {}", e);
        return Err(e.into());
    }

    let spn = config.spn(broker_host(conn.broker_addr()));
    debug!("requesting service ticket for {}", spn);

    let (ticket, session_key) = client.service_ticket(&spn).map_err(|e| {
        error!("Error getting Kerberos service ticket: {}", e);
        GssapiError::from(e)
    })?;

    let mut session = HandshakeSession::new(ticket, session_key);

    run_handshake(conn, &mut session, &*client).map_err(|e| {
        error!("Error while performing GSSAPI Kerberos Authentication: {}", e);
        e
    })
}

/// [`authorize`] with a [`KdcClient`] built from `config`.
pub fn authorize_with_kdc<C>(conn: &mut C, config: &AuthConfig) -> Result<()>
where
    C: BrokerConnection + ?Sized,
{
    let client = KdcClient::new(config).map_err(|e| {
        error!("Kerberos client error: {}", e);
        GssapiError::from(e)
    })?;

    authorize(conn, config, client)
}

fn run_handshake<C, K>(conn: &mut C, session: &mut HandshakeSession, client: &K) -> Result<()>
where
    C: BrokerConnection + ?Sized,
    K: KerberosClient + ?Sized,
{
    let domain = client.domain().to_owned();
    let cname = client.client_name();
    let mut received: Option<Vec<u8>> = None;

    loop {
        let token = session.next_token(&domain, &cname, received.as_deref())?;
        trace!("GSSAPI token of {} bytes at step {:?}", token.len(), session.step());

        let request_time = Instant::now();
        let written = write_frame(&mut *conn, &token)?;
        conn.update_outgoing_metrics(written);

        match session.step() {
            HandshakeStep::Verify => {
                let mut read = 0;
                let frame = read_frame_counting(&mut *conn, &mut read);
                conn.update_incoming_metrics(read, request_time.elapsed());
                debug!("received {} bytes from the broker", read);

                received = Some(frame?);
            }
            HandshakeStep::Finish => return Ok(()),
            step @ HandshakeStep::Initial => return Err(GssapiError::OutOfSequence { step }),
        }
    }
}

/// Host part of `host[:port]`.
fn broker_host(addr: &str) -> &str {
    addr.split(':').next().unwrap_or(addr)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("broker-1.example.com:9092", "broker-1.example.com")]
    #[case("broker-1.example.com", "broker-1.example.com")]
    #[case("", "")]
    fn host_without_port(#[case] addr: &str, #[case] host: &str) {
        assert_eq!(broker_host(addr), host);
    }
}
