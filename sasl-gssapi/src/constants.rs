//= [Generic Security Service API Version 2](https://datatracker.ietf.org/doc/html/rfc2743#section-3.1) =//
pub mod gss_api {
    /// Tag of the mechanism-independent token framing: `[APPLICATION 0] IMPLICIT SEQUENCE`.
    pub const GSS_API_GENERIC_TAG: u8 = 0x60;

    /// Kerberos V5 mechanism: `{ iso(1) member-body(2) United States(840) mit(113554) infosys(1) gssapi(2) krb5(2) }`
    pub const KRB5_MECHANISM_OID: &str = "1.2.840.113554.1.2.2";

    //= [Context Establishment Tokens](https://datatracker.ietf.org/doc/html/rfc4121#section-4.1) =//
    /// TOK_ID of the initial context token, 01 00 (KRB_AP_REQ).
    pub const TOK_ID_KRB_AP_REQ: u16 = 256;

    //= [Authenticator Checksum](https://datatracker.ietf.org/doc/html/rfc4121#section-4.1.1) =//
    pub const AUTHENTICATOR_CHECKSUM_LEN: usize = 24;
    /// Lgth: number of octets in the Bnd field.
    pub const AUTHENTICATOR_CHECKSUM_BND_LEN: u32 = 16;

    pub const CONTEXT_FLAG_CONF: u32 = 16;
    pub const CONTEXT_FLAG_INTEG: u32 = 32;

    //= [Per-Message Tokens](https://datatracker.ietf.org/doc/html/rfc4121#section-4.2.2) =//
    pub const WRAP_TOKEN_ID: [u8; 2] = [0x05, 0x04];
    pub const WRAP_FILLER: u8 = 0xff;
    pub const WRAP_HEADER_LEN: usize = 16;

    pub const FLAG_SENT_BY_ACCEPTOR: u8 = 0x01;
    pub const FLAG_SEALED: u8 = 0x02;
}

//= [The RC4-HMAC Kerberos Encryption Types Used by Microsoft Windows](https://datatracker.ietf.org/doc/html/rfc4757#section-7) =//
pub mod gss_api_v1 {
    pub const WRAP_TOKEN_ID: [u8; 2] = [0x02, 0x01];
    pub const SGN_ALG_HMAC_MD5: u16 = 0x1100;
    pub const SEAL_ALG_NONE: u16 = 0xffff;
    pub const SEAL_ALG_RC4: u16 = 0x1000;
    pub const FILLER: [u8; 2] = [0xff, 0xff];

    /// TOK_ID + SGN_ALG + SEAL_ALG + Filler + SND_SEQ + SGN_CKSUM + Confounder
    pub const WRAP_HEADER_LEN: usize = 32;
    pub const SIGNED_HEADER_LEN: usize = 8;
    pub const CHECKSUM_LEN: usize = 8;
    pub const CONFOUNDER_LEN: usize = 8;

    pub const DIRECTION_INITIATOR: [u8; 4] = [0x00, 0x00, 0x00, 0x00];
    pub const DIRECTION_ACCEPTOR: [u8; 4] = [0xff, 0xff, 0xff, 0xff];
}

//= [Assigned Numbers](https://datatracker.ietf.org/doc/html/rfc3961#section-8) =//
pub mod etypes {
    pub const DES3_CBC_SHA1_KD: i64 = 16;
    pub const AES128_CTS_HMAC_SHA1_96: i64 = 17;
    pub const AES256_CTS_HMAC_SHA1_96: i64 = 18;
    pub const RC4_HMAC: i64 = 23;
}

pub mod cksum_types {
    pub const HMAC_SHA1_DES3_KD: usize = 12;
    pub const HMAC_SHA1_96_AES128: usize = 15;
    pub const HMAC_SHA1_96_AES256: usize = 16;
    /// [RFC 4757 section 4](https://datatracker.ietf.org/doc/html/rfc4757#section-4)
    pub const HMAC_MD5_RC4: i64 = -138;
}

pub mod types {
    pub const KERBEROS_VERSION: u8 = 5;

    //= [Message Types](https://datatracker.ietf.org/doc/html/rfc4120#section-7.5.7) =//
    pub const AS_REQ_MSG_TYPE: u8 = 10;
    pub const AS_REP_MSG_TYPE: u8 = 11;
    pub const TGS_REQ_MSG_TYPE: u8 = 12;
    pub const TGS_REP_MSG_TYPE: u8 = 13;
    pub const AP_REQ_MSG_TYPE: u8 = 14;
    pub const KRB_ERROR_MSG_TYPE: u8 = 30;
    pub const ENC_AS_REP_PART_TYPE: u8 = 25;
    pub const ENC_TGS_REP_PART_TYPE: u8 = 26;

    //= [Name Types](https://datatracker.ietf.org/doc/html/rfc4120#section-6.2) =//
    pub const NT_PRINCIPAL: u8 = 1;
    pub const NT_SRV_INST: u8 = 2;

    //= [PreAuthentication Data Types](https://datatracker.ietf.org/doc/html/rfc4120#section-7.5.2) =//
    pub const PA_TGS_REQ: i64 = 1;
    pub const PA_ENC_TIMESTAMP: i64 = 2;
    pub const PA_ETYPE_INFO2: i64 = 19;
    //= [Kerberos Pre-Authentication](https://datatracker.ietf.org/doc/html/rfc6806#section-11) =//
    pub const PA_REQ_ENC_PA_REP: i64 = 149;

    //= [KDC Options](https://datatracker.ietf.org/doc/html/rfc4120#section-5.4.1) =//
    /// forwardable, renewable, canonicalize, renewable-ok
    pub const KDC_OPTIONS: [u8; 4] = [0x40, 0x81, 0x00, 0x10];
    pub const AP_OPTIONS_NONE: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

    pub const KRBTGT: &str = "krbtgt";
}

pub mod error_codes {
    pub const KDC_ERR_PREAUTH_FAILED: i64 = 24;
    pub const KDC_ERR_PREAUTH_REQUIRED: i64 = 25;
}
