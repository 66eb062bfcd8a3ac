//! Initial context token: `TOK_ID (01 00) | KRB_AP_REQ`.
//!
//! [RFC 4121 section 4.1](https://datatracker.ietf.org/doc/html/rfc4121#section-4.1)

use byteorder::{ByteOrder, LittleEndian};
use picky_asn1::bit_string::BitString;
use picky_asn1::date::GeneralizedTime;
use picky_asn1::wrapper::{
    ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag2, ExplicitContextTag3, ExplicitContextTag4,
    ExplicitContextTag5, ExplicitContextTag7, IntegerAsn1, OctetStringAsn1, Optional,
};
use picky_krb::constants::gss_api::AUTHENTICATOR_CHECKSUM_TYPE;
use picky_krb::constants::key_usages::AP_REQ_AUTHENTICATOR;
use picky_krb::data_types::{
    Authenticator, AuthenticatorInner, Checksum, EncryptedData, KerberosFlags, KerberosTime, Microseconds,
    PrincipalName, Realm, Ticket,
};
use picky_krb::messages::{ApReq, ApReqInner};
use rand::rngs::OsRng;
use rand::Rng;
use time::OffsetDateTime;

use crate::constants::gss_api::{
    AUTHENTICATOR_CHECKSUM_BND_LEN, AUTHENTICATOR_CHECKSUM_LEN, CONTEXT_FLAG_CONF, CONTEXT_FLAG_INTEG,
    TOK_ID_KRB_AP_REQ,
};
use crate::constants::types::{AP_OPTIONS_NONE, AP_REQ_MSG_TYPE, KERBEROS_VERSION};
use crate::crypto::{integer_asn1, SessionKey};
use crate::error::EncodingError;
use crate::names;

/// ```not_rust
/// Octet   Name      Description
/// 0..3    Lgth      Number of octets in Bnd field (16), little-endian
/// 4..19   Bnd       Channel binding MD5 hash, zero
/// 20..23  Flags     Context establishment flags, little-endian
/// ```
pub fn authenticator_checksum() -> [u8; AUTHENTICATOR_CHECKSUM_LEN] {
    let mut checksum = [0; AUTHENTICATOR_CHECKSUM_LEN];

    LittleEndian::write_u32(&mut checksum[0..4], AUTHENTICATOR_CHECKSUM_BND_LEN);
    LittleEndian::write_u32(&mut checksum[20..24], CONTEXT_FLAG_INTEG | CONTEXT_FLAG_CONF);

    checksum
}

pub fn build_authenticator(
    crealm: Realm,
    cname: PrincipalName,
    cksum: Option<Checksum>,
    seq_number: Option<u32>,
) -> Authenticator {
    let now = OffsetDateTime::now_utc();
    // Microseconds ::= INTEGER (0..999999)
    let microseconds = now.microsecond().min(999_999);

    Authenticator::from(AuthenticatorInner {
        authenticator_bno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        crealm: ExplicitContextTag1::from(crealm),
        cname: ExplicitContextTag2::from(cname),
        cksum: Optional::from(cksum.map(ExplicitContextTag3::from)),
        cusec: ExplicitContextTag4::from(Microseconds::from(integer_asn1(i64::from(microseconds)))),
        ctime: ExplicitContextTag5::from(KerberosTime::from(GeneralizedTime::from(now))),
        subkey: Optional::from(None),
        seq_number: Optional::from(seq_number.map(|n| ExplicitContextTag7::from(integer_asn1(i64::from(n))))),
        authorization_data: Optional::from(None),
    })
}

/// Encrypts `authenticator` with the ticket session key and wraps it with `ticket`.
pub fn build_ap_req(
    ticket: &Ticket,
    key: &SessionKey,
    authenticator: &Authenticator,
    key_usage: i32,
) -> Result<ApReq, EncodingError> {
    let cipher = key.cipher()?;
    let encrypted = cipher.encrypt(key.value(), key_usage, &picky_asn1_der::to_vec(authenticator)?)?;

    Ok(ApReq::from(ApReqInner {
        pvno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        msg_type: ExplicitContextTag1::from(IntegerAsn1::from(vec![AP_REQ_MSG_TYPE])),
        ap_options: ExplicitContextTag2::from(KerberosFlags::from(BitString::with_bytes(AP_OPTIONS_NONE.to_vec()))),
        ticket: ExplicitContextTag3::from(ticket.clone()),
        authenticator: ExplicitContextTag4::from(EncryptedData {
            etype: ExplicitContextTag0::from(integer_asn1(cipher.etype())),
            kvno: Optional::from(None),
            cipher: ExplicitContextTag2::from(OctetStringAsn1::from(encrypted)),
        }),
    }))
}

/// The inner token of the first handshake frame, not yet wrapped in the generic framing.
pub fn build_initial_token(
    domain: &str,
    cname: &PrincipalName,
    ticket: &Ticket,
    key: &SessionKey,
) -> Result<Vec<u8>, EncodingError> {
    let cksum = Checksum {
        cksumtype: ExplicitContextTag0::from(IntegerAsn1::from(AUTHENTICATOR_CHECKSUM_TYPE.to_vec())),
        checksum: ExplicitContextTag1::from(OctetStringAsn1::from(authenticator_checksum().to_vec())),
    };

    // positive, below 2^30
    let seq_number = OsRng.gen::<u32>() & 0x3fff_ffff;

    let authenticator = build_authenticator(names::realm(domain)?, cname.clone(), Some(cksum), Some(seq_number));
    let ap_req = build_ap_req(ticket, key, &authenticator, AP_REQ_AUTHENTICATOR)?;

    let mut token = TOK_ID_KRB_AP_REQ.to_be_bytes().to_vec();
    token.extend_from_slice(&picky_asn1_der::to_vec(&ap_req)?);

    Ok(token)
}
