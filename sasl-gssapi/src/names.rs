//! Kerberos realm and principal name conversions.

use picky_asn1::restricted_string::IA5String;
use picky_asn1::wrapper::{Asn1SequenceOf, ExplicitContextTag0, ExplicitContextTag1, IntegerAsn1};
use picky_krb::data_types::{KerberosStringAsn1, PrincipalName, Realm};

use crate::constants::types::{NT_PRINCIPAL, NT_SRV_INST};
use crate::error::EncodingError;

pub fn kerberos_string(value: &str) -> Result<KerberosStringAsn1, EncodingError> {
    IA5String::from_string(value.to_owned())
        .map(KerberosStringAsn1::from)
        .map_err(|_| EncodingError::InvalidString(value.to_owned()))
}

pub fn realm(name: &str) -> Result<Realm, EncodingError> {
    Ok(Realm::from(kerberos_string(name)?))
}

pub fn principal_name(name_type: u8, components: &[&str]) -> Result<PrincipalName, EncodingError> {
    let name_string = components
        .iter()
        .map(|component| kerberos_string(component))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PrincipalName {
        name_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![name_type])),
        name_string: ExplicitContextTag1::from(Asn1SequenceOf::from(name_string)),
    })
}

/// `user` or `user/instance` as an NT-PRINCIPAL name.
pub fn client_principal(name: &str) -> Result<PrincipalName, EncodingError> {
    principal_name(NT_PRINCIPAL, &name.split('/').collect::<Vec<_>>())
}

/// `service/host` as an NT-SRV-INST name.
pub fn service_principal(spn: &str) -> Result<PrincipalName, EncodingError> {
    principal_name(NT_SRV_INST, &spn.split('/').collect::<Vec<_>>())
}

/// Splits `name@REALM`, the realm being optional.
pub fn split_realm(principal: &str) -> (&str, Option<&str>) {
    match principal.rsplit_once('@') {
        Some((name, realm)) if !realm.is_empty() => (name, Some(realm)),
        _ => (principal, None),
    }
}

pub fn components(name: &PrincipalName) -> Vec<String> {
    name.name_string
        .0
         .0
        .iter()
        .map(|component| kerberos_string_to_string(component))
        .collect()
}

pub fn kerberos_string_to_string(value: &KerberosStringAsn1) -> String {
    String::from_utf8_lossy(value.0.as_bytes()).into_owned()
}

/// Components joined with `/`, without realm.
pub fn principal_to_string(name: &PrincipalName) -> String {
    components(name).join("/")
}
