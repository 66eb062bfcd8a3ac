//! [Mechanism-Independent Token Format](https://datatracker.ietf.org/doc/html/rfc2743#section-3.1)
//!
//! ```not_rust
//! InitialContextToken ::=
//!     [APPLICATION 0] IMPLICIT SEQUENCE {
//!         thisMech MechType,
//!         innerContextToken ANY DEFINED BY thisMech
//!     }
//! ```

pub mod wrap_token;
pub mod wrap_token_v1;

use oid::ObjectIdentifier;
use picky_asn1::wrapper::ObjectIdentifierAsn1;

use crate::constants::gss_api::{GSS_API_GENERIC_TAG, KRB5_MECHANISM_OID};
use crate::error::EncodingError;

/// DER encoding (tag, length and value) of the Kerberos V5 mechanism identifier.
pub fn krb5_mechanism_oid() -> Result<Vec<u8>, EncodingError> {
    let oid = ObjectIdentifier::try_from(KRB5_MECHANISM_OID)
        .map_err(|e| EncodingError::InvalidOid(format!("{}: {:?}", KRB5_MECHANISM_OID, e)))?;

    Ok(picky_asn1_der::to_vec(&ObjectIdentifierAsn1::from(oid))?)
}

/// Wraps a mechanism specific token as `0x60 | DER length | mechanism OID | inner token`.
pub fn wrap_in_generic_envelope(inner_token: &[u8]) -> Result<Vec<u8>, EncodingError> {
    let oid = krb5_mechanism_oid()?;
    let length = encode_der_length(oid.len() + inner_token.len());

    let mut token = Vec::with_capacity(1 + length.len() + oid.len() + inner_token.len());
    token.push(GSS_API_GENERIC_TAG);
    token.extend_from_slice(&length);
    token.extend_from_slice(&oid);
    token.extend_from_slice(inner_token);

    Ok(token)
}

/// Strips the generic framing and returns the inner token.
///
/// The declared length must cover the rest of the buffer exactly and the mechanism must be Kerberos V5.
pub fn unwrap_generic_envelope(token: &[u8]) -> Result<&[u8], EncodingError> {
    let (tag, rest) = token
        .split_first()
        .ok_or_else(|| EncodingError::malformed("generic token", "empty buffer"))?;

    if *tag != GSS_API_GENERIC_TAG {
        return Err(EncodingError::malformed(
            "generic token",
            format!("invalid tag {:#04x}", tag),
        ));
    }

    let (length, length_len) = decode_der_length(rest)?;
    let contents = &rest[length_len..];

    if contents.len() != length {
        return Err(EncodingError::malformed(
            "generic token",
            format!("declared length {} but {} bytes follow", length, contents.len()),
        ));
    }

    let oid = krb5_mechanism_oid()?;
    contents
        .strip_prefix(oid.as_slice())
        .ok_or_else(|| EncodingError::malformed("generic token", "mechanism is not Kerberos V5"))
}

/// DER definite length: short form below 128, long form otherwise.
pub(crate) fn encode_der_length(length: usize) -> Vec<u8> {
    if length < 0x80 {
        return vec![length as u8];
    }

    let bytes = length.to_be_bytes();
    let significant = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);

    let mut encoded = Vec::with_capacity(1 + bytes.len() - significant);
    encoded.push(0x80 | (bytes.len() - significant) as u8);
    encoded.extend_from_slice(&bytes[significant..]);

    encoded
}

/// Returns the decoded length and the number of bytes it occupied.
pub(crate) fn decode_der_length(data: &[u8]) -> Result<(usize, usize), EncodingError> {
    let first = *data
        .first()
        .ok_or_else(|| EncodingError::malformed("DER length", "missing"))?;

    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let count = (first & 0x7f) as usize;
    if count == 0 || count > std::mem::size_of::<usize>() {
        return Err(EncodingError::malformed(
            "DER length",
            format!("unsupported length of length {}", count),
        ));
    }

    let bytes = data
        .get(1..1 + count)
        .ok_or_else(|| EncodingError::malformed("DER length", "truncated"))?;

    let length = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);

    Ok((length, 1 + count))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn mechanism_oid_encoding() {
        assert_eq!(hex::encode(krb5_mechanism_oid().unwrap()), "06092a864886f712010202");
    }

    #[test]
    fn envelope_layout() {
        let token = wrap_in_generic_envelope(&[0x01, 0x00, 0xaa]).unwrap();

        assert_eq!(hex::encode(&token), "600e06092a864886f7120102020100aa");
    }

    #[test]
    fn envelope_with_long_form_length() {
        let inner = vec![0x5a; 500];

        let token = wrap_in_generic_envelope(&inner).unwrap();

        // 11 bytes of OID + 500 bytes of inner token
        assert_eq!(&token[..4], &[0x60, 0x82, 0x01, 0xff]);
        assert_eq!(unwrap_generic_envelope(&token).unwrap(), inner.as_slice());
    }

    #[rstest]
    #[case(0, &[0x00])]
    #[case(0x7f, &[0x7f])]
    #[case(0x80, &[0x81, 0x80])]
    #[case(0xff, &[0x81, 0xff])]
    #[case(0x0100, &[0x82, 0x01, 0x00])]
    #[case(0x01_0000, &[0x83, 0x01, 0x00, 0x00])]
    fn der_length(#[case] length: usize, #[case] expected: &[u8]) {
        let encoded = encode_der_length(length);

        assert_eq!(encoded, expected);
        assert_eq!(decode_der_length(&encoded).unwrap(), (length, expected.len()));
    }

    #[rstest]
    #[case::empty("")]
    #[case::wrong_tag("610e06092a864886f7120102020100aa")]
    #[case::length_too_long("600f06092a864886f7120102020100aa")]
    #[case::length_too_short("600d06092a864886f7120102020100aa")]
    #[case::wrong_mechanism("600e06092a864886f7120102030100aa")]
    #[case::truncated_length("6082")]
    fn invalid_envelope(#[case] token: &str) {
        let token = hex::decode(token).unwrap();

        assert!(matches!(
            unwrap_generic_envelope(&token),
            Err(EncodingError::MalformedToken { .. })
        ));
    }
}
