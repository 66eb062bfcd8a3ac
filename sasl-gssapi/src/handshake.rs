//! Client side of the SASL GSSAPI exchange.
//!
//! ```not_rust
//!  step      token produced                              next
//!  Initial   generic framing | 01 00 | AP-REQ            Verify
//!  Verify    wrap token echoing the broker wrap token    Finish
//!  Finish    -
//! ```

use log::debug;
use picky_krb::constants::key_usages::{ACCEPTOR_SEAL, ACCEPTOR_SIGN};
use picky_krb::data_types::{PrincipalName, Ticket};

use crate::ap_req::build_initial_token;
use crate::constants::gss_api::GSS_API_GENERIC_TAG;
use crate::crypto::SessionKey;
use crate::error::{EncodingError, GssapiError, Result};
use crate::gss_api::wrap_in_generic_envelope;
use crate::gss_api::wrap_token::WrapToken;
use crate::gss_api::wrap_token_v1::WrapTokenV1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Initial,
    Verify,
    Finish,
}

/// State of one authentication attempt. Never shared between attempts.
#[derive(Debug)]
pub struct HandshakeSession {
    step: HandshakeStep,
    ticket: Ticket,
    session_key: SessionKey,
}

impl HandshakeSession {
    pub fn new(ticket: Ticket, session_key: SessionKey) -> Self {
        Self {
            step: HandshakeStep::Initial,
            ticket,
            session_key,
        }
    }

    pub fn step(&self) -> HandshakeStep {
        self.step
    }

    pub fn is_finished(&self) -> bool {
        self.step == HandshakeStep::Finish
    }

    /// Produces the next outbound token.
    ///
    /// `input` is the last payload received from the broker and is required at [`HandshakeStep::Verify`].
    /// The step only advances when a token is produced.
    pub fn next_token(&mut self, domain: &str, cname: &PrincipalName, input: Option<&[u8]>) -> Result<Vec<u8>> {
        let (token, next) = match self.step {
            HandshakeStep::Initial => {
                let inner = build_initial_token(domain, cname, &self.ticket, &self.session_key)?;
                (wrap_in_generic_envelope(&inner)?, HandshakeStep::Verify)
            }
            HandshakeStep::Verify => {
                let input = input.ok_or(GssapiError::OutOfSequence { step: self.step })?;
                (self.respond(input)?, HandshakeStep::Finish)
            }
            HandshakeStep::Finish => return Err(GssapiError::OutOfSequence { step: self.step }),
        };

        debug!("GSSAPI step {:?} -> {:?}", self.step, next);
        self.step = next;

        Ok(token)
    }

    /// Verifies the wrap token of the broker and builds the initiator reply.
    fn respond(&self, input: &[u8]) -> Result<Vec<u8>> {
        let first = *input
            .first()
            .ok_or_else(|| EncodingError::malformed("wrap token", "empty broker token"))?;

        if first == GSS_API_GENERIC_TAG {
            debug!("broker sent a v1 wrap token");

            let request = WrapTokenV1::decode(input)?;
            // usage 23 maps to the RC4 salt 13 used by deployed acceptors, not the MIC salt 15
            let payload = request.verify(&self.session_key, ACCEPTOR_SIGN)?;

            WrapTokenV1::new_initiator(&payload, &self.session_key)?.encode()
        } else {
            debug!("broker sent a v2 wrap token");

            let request = WrapToken::decode(input)?;
            let payload = request.verify(&self.session_key, ACCEPTOR_SEAL)?;

            Ok(WrapToken::new_initiator(payload, &self.session_key)?.encode())
        }
    }
}
