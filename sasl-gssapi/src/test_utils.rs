use picky_asn1::wrapper::{
    ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag2, ExplicitContextTag3, IntegerAsn1, OctetStringAsn1,
    Optional,
};
use picky_krb::data_types::{EncryptedData, PrincipalName, Ticket, TicketInner};

use crate::constants::etypes::AES256_CTS_HMAC_SHA1_96;
use crate::constants::types::KERBEROS_VERSION;
use crate::names;

pub const REALM: &str = "EXAMPLE.COM";

pub fn client_name() -> PrincipalName {
    names::client_principal("alice").unwrap()
}

/// Ticket with an opaque encrypted part, as seen by the client.
pub fn service_ticket(service: &str, host: &str) -> Ticket {
    Ticket::from(TicketInner {
        tkt_vno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        realm: ExplicitContextTag1::from(names::realm(REALM).unwrap()),
        sname: ExplicitContextTag2::from(names::service_principal(&format!("{service}/{host}")).unwrap()),
        enc_part: ExplicitContextTag3::from(EncryptedData {
            etype: ExplicitContextTag0::from(IntegerAsn1::from(vec![AES256_CTS_HMAC_SHA1_96 as u8])),
            kvno: Optional::from(Some(ExplicitContextTag1::from(IntegerAsn1::from(vec![2])))),
            cipher: ExplicitContextTag2::from(OctetStringAsn1::from(vec![0xa5; 64])),
        }),
    })
}
