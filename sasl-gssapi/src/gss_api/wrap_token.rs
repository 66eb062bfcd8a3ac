//! [Wrap Tokens](https://datatracker.ietf.org/doc/html/rfc4121#section-4.2.6.2)
//!
//! ```not_rust
//! Octet no   Name        Description
//! 0..1       TOK_ID      0x05 0x04
//! 2          Flags       SentByAcceptor, Sealed, AcceptorSubkey
//! 3          Filler      0xff
//! 4..5       EC          extra count, big-endian
//! 6..7       RRC         right rotation count, big-endian
//! 8..15      SND_SEQ     sequence number, big-endian
//! 16..last   Data        payload | checksum, or the sealed cipher text
//! ```

use byteorder::{BigEndian, ByteOrder};
use log::trace;
use picky_krb::constants::key_usages::INITIATOR_SEAL;

use crate::constants::gss_api::{FLAG_SEALED, FLAG_SENT_BY_ACCEPTOR, WRAP_FILLER, WRAP_HEADER_LEN, WRAP_TOKEN_ID};
use crate::crypto::{checksums_match, SessionKey};
use crate::error::{EncodingError, GssapiError, Result, WrapTokenVersion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapToken {
    pub flags: u8,
    pub ec: u16,
    pub rrc: u16,
    pub snd_seq: u64,
    pub payload: Vec<u8>,
    /// Checksum of an integrity-only token, or the whole cipher text of a sealed token.
    pub checksum: Vec<u8>,
}

impl WrapToken {
    pub fn header_len() -> usize {
        WRAP_HEADER_LEN
    }

    pub fn is_sealed(&self) -> bool {
        self.flags & FLAG_SEALED != 0
    }

    pub fn sent_by_acceptor(&self) -> bool {
        self.flags & FLAG_SENT_BY_ACCEPTOR != 0
    }

    /// Builds the reply of the initiator: same payload, integrity-only, sequence number 0.
    pub fn new_initiator(payload: Vec<u8>, key: &SessionKey) -> Result<Self> {
        let mut token = WrapToken {
            flags: 0,
            ec: 0,
            rrc: 0,
            snd_seq: 0,
            payload,
            checksum: Vec::new(),
        };
        token.sign(key, INITIATOR_SEAL)?;

        Ok(token)
    }

    /// Computes the checksum of an integrity-only token and sets EC accordingly.
    pub fn sign(&mut self, key: &SessionKey, key_usage: i32) -> Result<()> {
        let checksum = self.compute_checksum(key, key_usage)?;

        self.ec = u16::try_from(checksum.len())
            .map_err(|_| EncodingError::malformed("wrap token", "checksum does not fit in EC"))?;
        self.checksum = checksum;

        Ok(())
    }

    fn compute_checksum(&self, key: &SessionKey, key_usage: i32) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.payload.len() + WRAP_HEADER_LEN);
        data.extend_from_slice(&self.payload);
        data.extend_from_slice(&header(self.flags, 0, 0, self.snd_seq));

        Ok(key.cipher()?.checksum(key.value(), key_usage, &data)?)
    }

    /// Verifies the token and returns the protected payload.
    pub fn verify(&self, key: &SessionKey, key_usage: i32) -> Result<Vec<u8>> {
        if !self.sent_by_acceptor() {
            return Err(GssapiError::verification(
                WrapTokenVersion::V2,
                "token was not sent by the acceptor",
            ));
        }

        if self.is_sealed() {
            return self.unseal(key, key_usage);
        }

        let expected = self.compute_checksum(key, key_usage)?;
        if !checksums_match(&expected, &self.checksum) {
            return Err(GssapiError::verification(WrapTokenVersion::V2, "checksum mismatch"));
        }

        Ok(self.payload.clone())
    }

    // decrypted: plaintext | filler (EC bytes) | header copy with RRC = 0
    fn unseal(&self, key: &SessionKey, key_usage: i32) -> Result<Vec<u8>> {
        let mut plaintext = key
            .cipher()?
            .decrypt(key.value(), key_usage, &self.checksum)
            .map_err(|_| GssapiError::verification(WrapTokenVersion::V2, "sealed data integrity check failed"))?;

        let trailer_len = self.ec as usize + WRAP_HEADER_LEN;
        if plaintext.len() < trailer_len {
            return Err(EncodingError::malformed("wrap token", "sealed data shorter than EC and header").into());
        }

        let encrypted_header = plaintext.split_off(plaintext.len() - WRAP_HEADER_LEN);
        if !checksums_match(&encrypted_header, &header(self.flags, self.ec, 0, self.snd_seq)) {
            return Err(GssapiError::verification(
                WrapTokenVersion::V2,
                "encrypted header does not match",
            ));
        }

        plaintext.truncate(plaintext.len() - self.ec as usize);

        Ok(plaintext)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < WRAP_HEADER_LEN {
            return Err(EncodingError::malformed(
                "wrap token",
                format!("{} bytes is shorter than the header", data.len()),
            )
            .into());
        }

        if data[0..2] != WRAP_TOKEN_ID {
            return Err(EncodingError::malformed(
                "wrap token",
                format!("invalid token id {}", hex_pair(&data[0..2])),
            )
            .into());
        }

        if data[3] != WRAP_FILLER {
            return Err(EncodingError::malformed("wrap token", format!("invalid filler {:#04x}", data[3])).into());
        }

        let flags = data[2];
        let ec = BigEndian::read_u16(&data[4..6]);
        let rrc = BigEndian::read_u16(&data[6..8]);
        let snd_seq = BigEndian::read_u64(&data[8..16]);

        let mut body = data[WRAP_HEADER_LEN..].to_vec();
        if !body.is_empty() {
            let rotation = rrc as usize % body.len();
            body.rotate_left(rotation);
        }

        trace!("v2 wrap token: flags={:#04x} ec={} rrc={} len={}", flags, ec, rrc, body.len());

        let (payload, checksum) = if flags & FLAG_SEALED != 0 {
            (Vec::new(), body)
        } else {
            let ec = ec as usize;
            if body.len() < ec {
                return Err(EncodingError::malformed("wrap token", "EC exceeds the token data").into());
            }

            let checksum = body.split_off(body.len() - ec);
            (body, checksum)
        };

        Ok(Self {
            flags,
            ec,
            rrc,
            snd_seq,
            payload,
            checksum,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.payload.len() + self.checksum.len());
        body.extend_from_slice(&self.payload);
        body.extend_from_slice(&self.checksum);

        if !body.is_empty() {
            let rotation = self.rrc as usize % body.len();
            body.rotate_right(rotation);
        }

        let mut token = header(self.flags, self.ec, self.rrc, self.snd_seq).to_vec();
        token.append(&mut body);

        token
    }
}

pub(crate) fn header(flags: u8, ec: u16, rrc: u16, snd_seq: u64) -> [u8; WRAP_HEADER_LEN] {
    let mut header = [0; WRAP_HEADER_LEN];

    header[0..2].copy_from_slice(&WRAP_TOKEN_ID);
    header[2] = flags;
    header[3] = WRAP_FILLER;
    BigEndian::write_u16(&mut header[4..6], ec);
    BigEndian::write_u16(&mut header[6..8], rrc);
    BigEndian::write_u64(&mut header[8..16], snd_seq);

    header
}

fn hex_pair(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
