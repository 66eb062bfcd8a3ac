//! [RC4-HMAC GSS-API wrap token](https://datatracker.ietf.org/doc/html/rfc4757#section-7.3), sent inside the
//! generic token framing.
//!
//! ```not_rust
//! Octet no   Name        Description
//! 0..1       TOK_ID      0x02 0x01
//! 2..3       SGN_ALG     0x11 0x00 (HMAC-MD5)
//! 4..5       SEAL_ALG    0x10 0x00 (RC4) or 0xff 0xff (none)
//! 6..7       Filler      0xff 0xff
//! 8..15      SND_SEQ     encrypted sequence number and direction
//! 16..23     SGN_CKSUM   first 8 bytes of the HMAC-MD5 checksum
//! 24..31     Confounder  random, encrypted when sealed
//! 32..last   Data        payload with padding, encrypted when sealed
//! ```

use byteorder::{BigEndian, ByteOrder};
use log::trace;
use picky_krb::constants::key_usages::ACCEPTOR_SIGN;
use rand::rngs::OsRng;
use rand::Rng;

use crate::constants::etypes::RC4_HMAC;
use crate::constants::gss_api_v1::{
    CHECKSUM_LEN, CONFOUNDER_LEN, DIRECTION_ACCEPTOR, DIRECTION_INITIATOR, FILLER, SEAL_ALG_NONE, SEAL_ALG_RC4,
    SGN_ALG_HMAC_MD5, SIGNED_HEADER_LEN, WRAP_HEADER_LEN, WRAP_TOKEN_ID,
};
use crate::crypto::rc4_hmac::{self, hmac_md5, rc4_apply};
use crate::crypto::{checksums_match, SessionKey};
use crate::error::{EncodingError, GssapiError, Result, WrapTokenVersion};
use crate::gss_api::{unwrap_generic_envelope, wrap_in_generic_envelope};

const SEQ_NUM_LEN: usize = 8;
const PADDING: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapTokenV1 {
    pub sgn_alg: u16,
    pub seal_alg: u16,
    /// Encrypted sequence number, as on the wire.
    pub snd_seq: [u8; SEQ_NUM_LEN],
    pub checksum: [u8; CHECKSUM_LEN],
    pub confounder: [u8; CONFOUNDER_LEN],
    /// Padded data, encrypted when the token is sealed.
    pub data: Vec<u8>,
}

impl WrapTokenV1 {
    pub fn is_sealed(&self) -> bool {
        self.seal_alg == SEAL_ALG_RC4
    }

    /// Builds the reply of the initiator: same payload, not sealed, sequence number 0.
    ///
    /// Signed with the acceptor-sign usage like the acceptor token, which resolves to the wrap salt 13.
    pub fn new_initiator(payload: &[u8], key: &SessionKey) -> Result<Self> {
        let confounder = OsRng.gen::<[u8; CONFOUNDER_LEN]>();

        Self::build(
            payload,
            key,
            ACCEPTOR_SIGN,
            0,
            DIRECTION_INITIATOR,
            false,
            confounder,
        )
    }

    pub(crate) fn build(
        payload: &[u8],
        key: &SessionKey,
        key_usage: i32,
        seq_num: u32,
        direction: [u8; 4],
        sealed: bool,
        confounder: [u8; CONFOUNDER_LEN],
    ) -> Result<Self> {
        check_key(key)?;

        let seal_alg = if sealed { SEAL_ALG_RC4 } else { SEAL_ALG_NONE };

        let mut data = Vec::with_capacity(payload.len() + 1);
        data.extend_from_slice(payload);
        data.push(PADDING);

        let checksum = signature(key, key_usage, SGN_ALG_HMAC_MD5, seal_alg, &confounder, &data)?;

        let mut confounder = confounder;
        if sealed {
            let kcrypt = sealing_key(key, seq_num)?;
            let mut encrypted = confounder.to_vec();
            encrypted.extend_from_slice(&data);
            rc4_apply(&kcrypt, &mut encrypted)?;

            data = encrypted.split_off(CONFOUNDER_LEN);
            confounder.copy_from_slice(&encrypted);
        }

        let mut plain_seq = [0; SEQ_NUM_LEN];
        BigEndian::write_u32(&mut plain_seq[0..4], seq_num);
        plain_seq[4..8].copy_from_slice(&direction);

        let mut snd_seq = plain_seq;
        rc4_apply(&sequence_key(key, &checksum)?, &mut snd_seq)?;

        Ok(Self {
            sgn_alg: SGN_ALG_HMAC_MD5,
            seal_alg,
            snd_seq,
            checksum,
            confounder,
            data,
        })
    }

    /// Verifies an acceptor token and returns the payload without padding.
    pub fn verify(&self, key: &SessionKey, key_usage: i32) -> Result<Vec<u8>> {
        check_key(key)?;

        let mut plain_seq = self.snd_seq;
        rc4_apply(&sequence_key(key, &self.checksum)?, &mut plain_seq)?;

        if plain_seq[4..8] != DIRECTION_ACCEPTOR {
            return Err(GssapiError::verification(
                WrapTokenVersion::V1,
                "token was not sent by the acceptor",
            ));
        }

        let mut confounder = self.confounder;
        let mut data = self.data.clone();
        if self.is_sealed() {
            let seq_num = BigEndian::read_u32(&plain_seq[0..4]);
            let kcrypt = sealing_key(key, seq_num)?;

            let mut decrypted = confounder.to_vec();
            decrypted.append(&mut data);
            rc4_apply(&kcrypt, &mut decrypted)?;

            data = decrypted.split_off(CONFOUNDER_LEN);
            confounder.copy_from_slice(&decrypted);
        }

        let expected = signature(key, key_usage, self.sgn_alg, self.seal_alg, &confounder, &data)?;
        if !checksums_match(&expected, &self.checksum) {
            return Err(GssapiError::verification(WrapTokenVersion::V1, "checksum mismatch"));
        }

        strip_padding(data)
    }

    pub fn decode(token: &[u8]) -> Result<Self> {
        let inner = unwrap_generic_envelope(token)?;

        if inner.len() < WRAP_HEADER_LEN {
            return Err(EncodingError::malformed(
                "v1 wrap token",
                format!("{} bytes is shorter than the header", inner.len()),
            )
            .into());
        }

        if inner[0..2] != WRAP_TOKEN_ID {
            return Err(EncodingError::malformed(
                "v1 wrap token",
                format!("invalid token id {:02x}{:02x}", inner[0], inner[1]),
            )
            .into());
        }

        let sgn_alg = BigEndian::read_u16(&inner[2..4]);
        if sgn_alg != SGN_ALG_HMAC_MD5 {
            return Err(EncodingError::UnsupportedAlgorithm {
                context: "SGN_ALG",
                value: sgn_alg,
            }
            .into());
        }

        let seal_alg = BigEndian::read_u16(&inner[4..6]);
        if seal_alg != SEAL_ALG_NONE && seal_alg != SEAL_ALG_RC4 {
            return Err(EncodingError::UnsupportedAlgorithm {
                context: "SEAL_ALG",
                value: seal_alg,
            }
            .into());
        }

        if inner[6..8] != FILLER {
            return Err(EncodingError::malformed("v1 wrap token", "invalid filler").into());
        }

        let mut snd_seq = [0; SEQ_NUM_LEN];
        snd_seq.copy_from_slice(&inner[8..16]);
        let mut checksum = [0; CHECKSUM_LEN];
        checksum.copy_from_slice(&inner[16..24]);
        let mut confounder = [0; CONFOUNDER_LEN];
        confounder.copy_from_slice(&inner[24..32]);

        trace!(
            "v1 wrap token: seal_alg={:#06x} len={}",
            seal_alg,
            inner.len() - WRAP_HEADER_LEN
        );

        Ok(Self {
            sgn_alg,
            seal_alg,
            snd_seq,
            checksum,
            confounder,
            data: inner[WRAP_HEADER_LEN..].to_vec(),
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut inner = Vec::with_capacity(WRAP_HEADER_LEN + self.data.len());
        inner.extend_from_slice(&signed_header(self.sgn_alg, self.seal_alg));
        inner.extend_from_slice(&self.snd_seq);
        inner.extend_from_slice(&self.checksum);
        inner.extend_from_slice(&self.confounder);
        inner.extend_from_slice(&self.data);

        Ok(wrap_in_generic_envelope(&inner)?)
    }
}

fn check_key(key: &SessionKey) -> Result<()> {
    if key.etype() != RC4_HMAC {
        return Err(EncodingError::UnsupportedEncryptionType(key.etype()).into());
    }

    Ok(())
}

fn signed_header(sgn_alg: u16, seal_alg: u16) -> [u8; SIGNED_HEADER_LEN] {
    let mut header = [0; SIGNED_HEADER_LEN];

    header[0..2].copy_from_slice(&WRAP_TOKEN_ID);
    BigEndian::write_u16(&mut header[2..4], sgn_alg);
    BigEndian::write_u16(&mut header[4..6], seal_alg);
    header[6..8].copy_from_slice(&FILLER);

    header
}

// SGN_CKSUM = HMAC-MD5 checksum of header | confounder | data, truncated to 8 bytes
fn signature(
    key: &SessionKey,
    key_usage: i32,
    sgn_alg: u16,
    seal_alg: u16,
    confounder: &[u8; CONFOUNDER_LEN],
    data: &[u8],
) -> Result<[u8; CHECKSUM_LEN]> {
    let mut signed = Vec::with_capacity(SIGNED_HEADER_LEN + CONFOUNDER_LEN + data.len());
    signed.extend_from_slice(&signed_header(sgn_alg, seal_alg));
    signed.extend_from_slice(confounder);
    signed.extend_from_slice(data);

    let full = rc4_hmac::checksum(key.value(), key_usage, &signed)?;

    let mut checksum = [0; CHECKSUM_LEN];
    checksum.copy_from_slice(&full[..CHECKSUM_LEN]);

    Ok(checksum)
}

// Kseq = HMAC(HMAC(K, 0), SGN_CKSUM)
fn sequence_key(key: &SessionKey, checksum: &[u8; CHECKSUM_LEN]) -> Result<Vec<u8>> {
    let kseq = hmac_md5(key.value(), &[&0u32.to_le_bytes()])?;

    Ok(hmac_md5(&kseq, &[checksum])?)
}

// Kcrypt = HMAC(HMAC(K ^ 0xf0, 0), seq_num)
fn sealing_key(key: &SessionKey, seq_num: u32) -> Result<Vec<u8>> {
    let klocal = key.value().iter().map(|b| b ^ 0xf0).collect::<Vec<u8>>();
    let kcrypt = hmac_md5(&klocal, &[&0u32.to_le_bytes()])?;

    Ok(hmac_md5(&kcrypt, &[&seq_num.to_be_bytes()])?)
}

fn strip_padding(mut data: Vec<u8>) -> Result<Vec<u8>> {
    let pad = match data.last() {
        Some(pad) => *pad as usize,
        None => return Err(EncodingError::malformed("v1 wrap token", "missing padding").into()),
    };

    if pad == 0 || pad > 8 || pad > data.len() || data[data.len() - pad..].iter().any(|b| *b as usize != pad) {
        return Err(EncodingError::malformed("v1 wrap token", "invalid padding").into());
    }

    data.truncate(data.len() - pad);

    Ok(data)
}
