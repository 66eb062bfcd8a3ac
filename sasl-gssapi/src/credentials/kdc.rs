//! [`KerberosClient`] backed by the KDCs of `krb5.conf`.
//!
//! Login is an AS exchange (password or keytab) or a credential cache read, service tickets come from the
//! cache or from a TGS exchange.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use log::{debug, info};
use picky_asn1::bit_string::BitString;
use picky_asn1::date::GeneralizedTime;
use picky_asn1::wrapper::{
    Asn1SequenceOf, ExplicitContextTag0, ExplicitContextTag1, ExplicitContextTag2, ExplicitContextTag3,
    ExplicitContextTag4, ExplicitContextTag5, ExplicitContextTag6, ExplicitContextTag7, ExplicitContextTag8,
    IntegerAsn1, OctetStringAsn1, Optional,
};
use picky_krb::constants::key_usages::{
    AS_REP_ENC, TGS_REP_ENC_SESSION_KEY, TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR,
    TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR_CKSUM,
};
use picky_krb::constants::types::PA_ENC_TIMESTAMP_KEY_USAGE;
use picky_krb::data_types::{
    Checksum, EncryptedData, EtypeInfo2Entry, KerberosFlags, KerberosTime, Microseconds, PaData, PaEncTsEnc,
    PrincipalName, Ticket,
};
use picky_krb::messages::{
    AsRep, AsReq, EncAsRepPart, EncKdcRepPart, EncTgsRepPart, KdcRep, KdcReq, KdcReqBody, KrbError, KrbErrorInner,
    TgsRep, TgsReq,
};
use rand::rngs::OsRng;
use rand::Rng;
use time::{Duration, OffsetDateTime};
use zeroize::Zeroize;

use super::ccache::CredentialCache;
use super::keytab::Keytab;
use super::krb5_conf::Krb5Conf;
use super::transport::{KdcTransport, TcpKdcTransport};
use super::KerberosClient;
use crate::ap_req::{build_ap_req, build_authenticator};
use crate::config::{AuthConfig, AuthType};
use crate::constants::error_codes::KDC_ERR_PREAUTH_REQUIRED;
use crate::constants::etypes::{AES128_CTS_HMAC_SHA1_96, AES256_CTS_HMAC_SHA1_96};
use crate::constants::types::{
    AS_REP_MSG_TYPE, AS_REQ_MSG_TYPE, ENC_AS_REP_PART_TYPE, ENC_TGS_REP_PART_TYPE, KDC_OPTIONS, KERBEROS_VERSION,
    KRBTGT, KRB_ERROR_MSG_TYPE, NT_PRINCIPAL, NT_SRV_INST, PA_ENC_TIMESTAMP, PA_ETYPE_INFO2, PA_REQ_ENC_PA_REP,
    PA_TGS_REQ, TGS_REP_MSG_TYPE, TGS_REQ_MSG_TYPE,
};
use crate::crypto::{integer_asn1, integer_to_i64, KeyCipher, SessionKey, SUPPORTED_ETYPES};
use crate::error::{CredentialError, EncodingError};
use crate::names;

const TICKET_LIFETIME: Duration = Duration::days(1);
const RENEW_LIFETIME: Duration = Duration::days(7);

/// Long-term key material of the client principal.
enum LongTermKeys {
    Password(String),
    Keytab(Keytab),
}

impl LongTermKeys {
    fn etypes(&self, components: &[&str], realm: &str) -> Vec<i64> {
        match self {
            LongTermKeys::Password(_) => vec![AES256_CTS_HMAC_SHA1_96, AES128_CTS_HMAC_SHA1_96],
            LongTermKeys::Keytab(keytab) => keytab.etypes(components, realm),
        }
    }

    fn key(&self, etype: i64, salt: &str, components: &[&str], realm: &str) -> Result<SessionKey, CredentialError> {
        match self {
            LongTermKeys::Password(password) => {
                let cipher = KeyCipher::from_etype(etype)?;
                let key = cipher.generate_key_from_password(password.as_bytes(), salt.as_bytes())?;

                Ok(SessionKey::new(etype, key))
            }
            LongTermKeys::Keytab(keytab) => keytab
                .find_for_etype(components, realm, etype)
                .map(|entry| entry.key.clone())
                .ok_or_else(|| CredentialError::KeyNotFound {
                    principal: format!("{}@{}", components.join("/"), realm),
                }),
        }
    }
}

impl Drop for LongTermKeys {
    fn drop(&mut self) {
        if let LongTermKeys::Password(password) = self {
            password.zeroize();
        }
    }
}

enum KdcReply {
    Rep(Box<KdcRep>),
    Error(Box<KrbErrorInner>),
}

pub struct KdcClient {
    auth_type: AuthType,
    keytab_path: Option<PathBuf>,
    ccache_path: Option<PathBuf>,
    disable_pa_fx_fast: bool,
    realm: String,
    components: Vec<String>,
    cname: PrincipalName,
    long_term_keys: Option<LongTermKeys>,
    krb5_conf: Krb5Conf,
    transport: Box<dyn KdcTransport + Send>,
    tgt: Option<(Ticket, SessionKey)>,
    service_tickets: HashMap<String, (Ticket, SessionKey)>,
}

impl KdcClient {
    /// Reads `kerberos_config_path` and talks to the configured KDCs over TCP.
    pub fn new(config: &AuthConfig) -> Result<Self, CredentialError> {
        let krb5_conf = Krb5Conf::load(&config.kerberos_config_path)?;
        let transport = Box::new(TcpKdcTransport::new(config.kdc_timeout));

        Self::with_transport(config, krb5_conf, transport)
    }

    pub fn with_transport(
        config: &AuthConfig,
        krb5_conf: Krb5Conf,
        transport: Box<dyn KdcTransport + Send>,
    ) -> Result<Self, CredentialError> {
        let (name, principal_realm) = names::split_realm(&config.username);

        let realm = config
            .realm
            .as_deref()
            .or(principal_realm)
            .or_else(|| krb5_conf.default_realm())
            .map(str::to_owned);
        let realm = match (realm, config.auth_type) {
            (Some(realm), _) => realm,
            // known once the cache is read
            (None, AuthType::Ccache) => String::new(),
            (None, _) => return Err(CredentialError::Config(String::from("no realm configured"))),
        };

        let components: Vec<String> = name.split('/').filter(|c| !c.is_empty()).map(str::to_owned).collect();
        if components.is_empty() && config.auth_type != AuthType::Ccache {
            return Err(CredentialError::Config(String::from("username is required")));
        }

        let long_term_keys = match config.auth_type {
            AuthType::User if config.password.is_empty() => {
                return Err(CredentialError::Config(String::from("password is required")))
            }
            AuthType::User => Some(LongTermKeys::Password(config.password.clone())),
            AuthType::Keytab if config.keytab_path.is_none() => {
                return Err(CredentialError::Config(String::from("keytab_path is required")))
            }
            _ => None,
        };

        let ccache_path = config
            .ccache_path
            .clone()
            .or_else(|| env::var_os("KRB5CCNAME").map(PathBuf::from));
        if config.auth_type == AuthType::Ccache && ccache_path.is_none() {
            return Err(CredentialError::Config(String::from(
                "ccache_path is required when KRB5CCNAME is not set",
            )));
        }

        Ok(Self {
            auth_type: config.auth_type,
            keytab_path: config.keytab_path.clone(),
            ccache_path,
            disable_pa_fx_fast: config.disable_pa_fx_fast,
            realm,
            cname: client_principal(&components)?,
            components,
            long_term_keys,
            krb5_conf,
            transport,
            tgt: None,
            service_tickets: HashMap::new(),
        })
    }

    fn principal(&self) -> String {
        format!("{}@{}", self.components.join("/"), self.realm)
    }

    fn send(&mut self, request: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let kdcs = self.krb5_conf.kdcs(&self.realm);
        self.transport.exchange(&self.realm, &kdcs, request)
    }

    fn load_ccache(&mut self) -> Result<(), CredentialError> {
        let path = self
            .ccache_path
            .as_ref()
            .ok_or_else(|| CredentialError::Config(String::from("ccache_path is required")))?;
        let cache = CredentialCache::load(path)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let principal = &cache.default_principal;
        let tgt = cache
            .tgt(&principal.realm)
            .filter(|credential| !credential.is_expired(now))
            .ok_or_else(|| {
                CredentialError::CredentialCache(format!("no valid ticket-granting ticket for {}", principal.realm))
            })?;

        self.tgt = Some((tgt.ticket()?, tgt.key.clone()));

        for credential in cache.credentials.iter().filter(|credential| {
            !credential.is_expired(now) && credential.server.components.first().map(String::as_str) != Some(KRBTGT)
        }) {
            self.service_tickets.insert(
                credential.server.components.join("/"),
                (credential.ticket()?, credential.key.clone()),
            );
        }

        self.cname = client_principal(&principal.components)?;
        self.components = principal.components.clone();
        self.realm = principal.realm.clone();

        debug!(
            "loaded {} cached service tickets for {}",
            self.service_tickets.len(),
            self.principal()
        );

        Ok(())
    }

    fn as_exchange(&mut self, keys: &LongTermKeys) -> Result<(Ticket, SessionKey), CredentialError> {
        let realm = self.realm.clone();
        let owned_components = self.components.clone();
        let components: Vec<&str> = owned_components.iter().map(String::as_str).collect();

        let etypes = keys.etypes(&components, &realm);
        if etypes.is_empty() {
            return Err(CredentialError::KeyNotFound {
                principal: self.principal(),
            });
        }

        // RFC 4120 section 4: realm followed by the name components
        let default_salt = format!("{}{}", realm, components.concat());
        let mut preauth_key: Option<SessionKey> = None;

        loop {
            let nonce = nonce();

            let mut pa_datas = Vec::new();
            if let Some(key) = &preauth_key {
                pa_datas.push(encrypted_timestamp(key)?);
            }
            if !self.disable_pa_fx_fast {
                pa_datas.push(pa_data(PA_REQ_ENC_PA_REP, Vec::new()));
            }

            let sname = names::principal_name(NT_SRV_INST, &[KRBTGT, realm.as_str()])?;
            let body = req_body(&realm, Some(self.cname.clone()), sname, nonce, &etypes)?;
            let request = AsReq::from(kdc_req(AS_REQ_MSG_TYPE, pa_datas, body));

            debug!(
                "AS-REQ for {} (pre-authenticated: {})",
                self.principal(),
                preauth_key.is_some()
            );
            let reply = self.send(&picky_asn1_der::to_vec(&request)?)?;

            match decode_reply(&reply, AS_REP_MSG_TYPE)? {
                KdcReply::Rep(rep) => {
                    let etype = integer_to_i64(&rep.enc_part.0.etype.0)?;
                    let reply_key = match preauth_key {
                        Some(key) if key.etype() == etype => key,
                        _ => {
                            let pa_datas = rep.padata.0.as_ref().map(|p| p.0 .0.as_slice()).unwrap_or_default();
                            let salt = etype_info(pa_datas)?
                                .into_iter()
                                .find(|(entry_etype, _)| *entry_etype == etype)
                                .and_then(|(_, salt)| salt)
                                .unwrap_or(default_salt);

                            keys.key(etype, &salt, &components, &realm)?
                        }
                    };

                    let enc_part = decrypt_enc_part(&rep.enc_part.0, &reply_key, AS_REP_ENC)?;
                    check_nonce(&enc_part, nonce)?;

                    return Ok((rep.ticket.0, SessionKey::try_from(&enc_part.key.0)?));
                }
                KdcReply::Error(error) => {
                    let code = i64::from(error.error_code.0);

                    if code != KDC_ERR_PREAUTH_REQUIRED || preauth_key.is_some() {
                        return Err(kdc_error(&error));
                    }

                    let method_data = match &error.e_data.0 {
                        Some(e_data) => picky_asn1_der::from_bytes::<Asn1SequenceOf<PaData>>(&e_data.0 .0)?.0,
                        None => Vec::new(),
                    };
                    let (etype, salt) = etype_info(&method_data)?
                        .into_iter()
                        .find(|(etype, _)| etypes.contains(etype))
                        .unwrap_or((etypes[0], None));
                    let salt = salt.unwrap_or_else(|| default_salt.clone());

                    debug!("KDC requires pre-authentication, using etype {}", etype);
                    preauth_key = Some(keys.key(etype, &salt, &components, &realm)?);
                }
            }
        }
    }

    fn tgs_exchange(&mut self, spn: &str) -> Result<(Ticket, SessionKey), CredentialError> {
        let (tgt, tgt_key) = self.tgt.clone().ok_or(CredentialError::NotLoggedIn)?;

        let nonce = nonce();
        let sname = names::service_principal(spn)?;
        let body = req_body(&self.realm, None, sname, nonce, &SUPPORTED_ETYPES)?;

        let cipher = tgt_key.cipher()?;
        let body_checksum = cipher.checksum(
            tgt_key.value(),
            TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR_CKSUM,
            &picky_asn1_der::to_vec(&body)?,
        )?;
        let cksum = Checksum {
            cksumtype: ExplicitContextTag0::from(integer_asn1(cipher.checksum_type())),
            checksum: ExplicitContextTag1::from(OctetStringAsn1::from(body_checksum)),
        };

        let authenticator = build_authenticator(names::realm(&self.realm)?, self.cname.clone(), Some(cksum), None);
        let ap_req = build_ap_req(&tgt, &tgt_key, &authenticator, TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR)?;

        let pa_tgs_req = pa_data(PA_TGS_REQ, picky_asn1_der::to_vec(&ap_req)?);
        let request = TgsReq::from(kdc_req(TGS_REQ_MSG_TYPE, vec![pa_tgs_req], body));

        debug!("TGS-REQ for {}", spn);
        let reply = self.send(&picky_asn1_der::to_vec(&request)?)?;

        match decode_reply(&reply, TGS_REP_MSG_TYPE)? {
            KdcReply::Rep(rep) => {
                let enc_part = decrypt_enc_part(&rep.enc_part.0, &tgt_key, TGS_REP_ENC_SESSION_KEY)?;
                check_nonce(&enc_part, nonce)?;

                let ticket = rep.ticket.0;
                debug!("KDC issued a ticket for {}", names::principal_to_string(&ticket.0.sname.0));

                Ok((ticket, SessionKey::try_from(&enc_part.key.0)?))
            }
            KdcReply::Error(error) => Err(kdc_error(&error)),
        }
    }
}

impl KerberosClient for KdcClient {
    fn login(&mut self) -> Result<(), CredentialError> {
        match self.auth_type {
            AuthType::User => {}
            AuthType::Keytab => {
                let path = self
                    .keytab_path
                    .as_ref()
                    .ok_or_else(|| CredentialError::Config(String::from("keytab_path is required")))?;
                self.long_term_keys = Some(LongTermKeys::Keytab(Keytab::load(path)?));
            }
            AuthType::Ccache => return self.load_ccache(),
        }

        let keys = self
            .long_term_keys
            .take()
            .ok_or_else(|| CredentialError::KeyNotFound {
                principal: self.principal(),
            })?;
        let tgt = self.as_exchange(&keys);
        self.long_term_keys = Some(keys);

        self.tgt = Some(tgt?);
        info!("obtained ticket-granting ticket for {}", self.principal());

        Ok(())
    }

    fn service_ticket(&mut self, spn: &str) -> Result<(Ticket, SessionKey), CredentialError> {
        let (spn, _) = names::split_realm(spn);

        if let Some(cached) = self.service_tickets.get(spn) {
            debug!("service ticket for {} found in cache", spn);
            return Ok(cached.clone());
        }

        let ticket = self.tgs_exchange(spn)?;
        self.service_tickets.insert(spn.to_owned(), ticket.clone());

        Ok(ticket)
    }

    fn domain(&self) -> &str {
        &self.realm
    }

    fn client_name(&self) -> PrincipalName {
        self.cname.clone()
    }

    fn release(&mut self) {
        self.tgt = None;
        self.service_tickets.clear();
        self.long_term_keys = None;
    }
}

fn client_principal(components: &[String]) -> Result<PrincipalName, EncodingError> {
    names::principal_name(
        NT_PRINCIPAL,
        &components.iter().map(String::as_str).collect::<Vec<_>>(),
    )
}

/// Constructed application tag byte, for tag numbers below 31.
const fn application_tag(number: u8) -> u8 {
    0x60 | number
}

fn nonce() -> u32 {
    OsRng.gen::<u32>() & 0x7fff_ffff
}

fn kerberos_time(time: OffsetDateTime) -> KerberosTime {
    KerberosTime::from(GeneralizedTime::from(time))
}

fn pa_data(padata_type: i64, data: Vec<u8>) -> PaData {
    PaData {
        padata_type: ExplicitContextTag1::from(integer_asn1(padata_type)),
        padata_data: ExplicitContextTag2::from(OctetStringAsn1::from(data)),
    }
}

fn kdc_req(msg_type: u8, pa_datas: Vec<PaData>, body: KdcReqBody) -> KdcReq {
    let padata = if pa_datas.is_empty() {
        None
    } else {
        Some(ExplicitContextTag3::from(Asn1SequenceOf::from(pa_datas)))
    };

    KdcReq {
        pvno: ExplicitContextTag1::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
        msg_type: ExplicitContextTag2::from(IntegerAsn1::from(vec![msg_type])),
        padata: Optional::from(padata),
        req_body: ExplicitContextTag4::from(body),
    }
}

fn req_body(
    realm: &str,
    cname: Option<PrincipalName>,
    sname: PrincipalName,
    nonce: u32,
    etypes: &[i64],
) -> Result<KdcReqBody, EncodingError> {
    let now = OffsetDateTime::now_utc();

    Ok(KdcReqBody {
        kdc_options: ExplicitContextTag0::from(KerberosFlags::from(BitString::with_bytes(KDC_OPTIONS.to_vec()))),
        cname: Optional::from(cname.map(ExplicitContextTag1::from)),
        realm: ExplicitContextTag2::from(names::realm(realm)?),
        sname: Optional::from(Some(ExplicitContextTag3::from(sname))),
        from: Optional::from(None),
        till: ExplicitContextTag5::from(kerberos_time(now + TICKET_LIFETIME)),
        rtime: Optional::from(Some(ExplicitContextTag6::from(kerberos_time(now + RENEW_LIFETIME)))),
        nonce: ExplicitContextTag7::from(integer_asn1(i64::from(nonce))),
        etype: ExplicitContextTag8::from(Asn1SequenceOf::from(
            etypes.iter().map(|etype| integer_asn1(*etype)).collect::<Vec<_>>(),
        )),
        addresses: Optional::from(None),
        enc_authorization_data: Optional::from(None),
        additional_tickets: Optional::from(None),
    })
}

/// PA-ENC-TIMESTAMP encrypted with the client long-term key.
fn encrypted_timestamp(key: &SessionKey) -> Result<PaData, CredentialError> {
    let now = OffsetDateTime::now_utc();
    let timestamp = PaEncTsEnc {
        patimestamp: ExplicitContextTag0::from(kerberos_time(now)),
        pausec: Optional::from(Some(ExplicitContextTag1::from(Microseconds::from(integer_asn1(
            i64::from(now.microsecond().min(999_999)),
        ))))),
    };

    let cipher = key.cipher()?;
    let encrypted = cipher.encrypt(
        key.value(),
        PA_ENC_TIMESTAMP_KEY_USAGE,
        &picky_asn1_der::to_vec(&timestamp)?,
    )?;

    let enc_data = EncryptedData {
        etype: ExplicitContextTag0::from(integer_asn1(key.etype())),
        kvno: Optional::from(None),
        cipher: ExplicitContextTag2::from(OctetStringAsn1::from(encrypted)),
    };

    Ok(pa_data(PA_ENC_TIMESTAMP, picky_asn1_der::to_vec(&enc_data)?))
}

/// `(etype, salt)` pairs of the PA-ETYPE-INFO2 entries, in KDC preference order.
fn etype_info(pa_datas: &[PaData]) -> Result<Vec<(i64, Option<String>)>, CredentialError> {
    let mut entries = Vec::new();

    for pa_data in pa_datas {
        if integer_to_i64(&pa_data.padata_type.0)? != PA_ETYPE_INFO2 {
            continue;
        }

        let info: Asn1SequenceOf<EtypeInfo2Entry> = picky_asn1_der::from_bytes(&pa_data.padata_data.0 .0)?;
        for entry in info.0 {
            let salt = entry.salt.0.map(|salt| names::kerberos_string_to_string(&salt.0));
            entries.push((integer_to_i64(&entry.etype.0)?, salt));
        }
    }

    Ok(entries)
}

fn decode_reply(reply: &[u8], rep_type: u8) -> Result<KdcReply, CredentialError> {
    let tag = reply.first().copied();

    if tag == Some(application_tag(KRB_ERROR_MSG_TYPE)) {
        let error: KrbError = picky_asn1_der::from_bytes(reply)?;
        return Ok(KdcReply::Error(Box::new(error.0)));
    }

    if tag != Some(application_tag(rep_type)) {
        return Err(CredentialError::UnexpectedReply("reply is neither the expected message nor an error"));
    }

    let rep = if rep_type == AS_REP_MSG_TYPE {
        picky_asn1_der::from_bytes::<AsRep>(reply)?.0
    } else {
        picky_asn1_der::from_bytes::<TgsRep>(reply)?.0
    };

    Ok(KdcReply::Rep(Box::new(rep)))
}

/// Some KDCs answer an AS-REQ with an EncTgsRepPart, both are accepted.
fn decrypt_enc_part(
    enc_data: &EncryptedData,
    key: &SessionKey,
    key_usage: i32,
) -> Result<EncKdcRepPart, CredentialError> {
    if integer_to_i64(&enc_data.etype.0)? != key.etype() {
        return Err(CredentialError::UnexpectedReply("reply encrypted with another encryption type"));
    }

    let plain = key.cipher()?.decrypt(key.value(), key_usage, &enc_data.cipher.0 .0)?;

    match plain.first().copied() {
        Some(tag) if tag == application_tag(ENC_AS_REP_PART_TYPE) => {
            Ok(picky_asn1_der::from_bytes::<EncAsRepPart>(&plain)?.0)
        }
        Some(tag) if tag == application_tag(ENC_TGS_REP_PART_TYPE) => {
            Ok(picky_asn1_der::from_bytes::<EncTgsRepPart>(&plain)?.0)
        }
        _ => Err(CredentialError::UnexpectedReply("unknown encrypted reply part")),
    }
}

fn check_nonce(enc_part: &EncKdcRepPart, nonce: u32) -> Result<(), CredentialError> {
    if integer_to_i64(&enc_part.nonce.0)? != i64::from(nonce) {
        return Err(CredentialError::UnexpectedReply("nonce mismatch"));
    }

    Ok(())
}

fn kdc_error(error: &KrbErrorInner) -> CredentialError {
    CredentialError::Kdc {
        code: i64::from(error.error_code.0),
        text: error
            .e_text
            .0
            .as_ref()
            .map(|text| names::kerberos_string_to_string(&text.0)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use picky_asn1::wrapper::{ExplicitContextTag10, ExplicitContextTag11, ExplicitContextTag12, ExplicitContextTag9};
    use picky_krb::data_types::{Authenticator, LastReq, LastReqInner};
    use picky_krb::messages::ApReq;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::constants::error_codes::KDC_ERR_PREAUTH_FAILED;
    use crate::credentials::ccache;
    use crate::credentials::keytab::tests::{encode_keytab, TestEntry};
    use crate::test_utils::service_ticket;

    const PASSWORD: &str = "correct horse";
    const SALT: &str = "EXAMPLE.COMalice-custom";
    const TGT_SESSION_KEY: [u8; 32] = [0x42; 32];
    const SERVICE_SESSION_KEY: [u8; 32] = [0x43; 32];

    fn password_key(password: &str, salt: &str) -> Vec<u8> {
        KeyCipher::Aes256CtsHmacSha196
            .generate_key_from_password(password.as_bytes(), salt.as_bytes())
            .unwrap()
    }

    #[derive(Default)]
    struct MockState {
        client_key: Vec<u8>,
        salt: String,
        require_preauth: bool,
        error: Option<(u32, Option<String>)>,
        tgt_key: Option<SessionKey>,
        as_padata: Vec<Vec<i64>>,
        tgs_snames: Vec<String>,
    }

    #[derive(Clone)]
    struct MockKdc(Arc<Mutex<MockState>>);

    impl MockKdc {
        fn new(require_preauth: bool) -> Self {
            Self(Arc::new(Mutex::new(MockState {
                client_key: password_key(PASSWORD, SALT),
                salt: SALT.to_owned(),
                require_preauth,
                ..MockState::default()
            })))
        }

        fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.0.lock().unwrap()
        }
    }

    impl KdcTransport for MockKdc {
        fn exchange(&mut self, realm: &str, kdcs: &[String], request: &[u8]) -> Result<Vec<u8>, CredentialError> {
            assert_eq!(realm, "EXAMPLE.COM");
            assert_eq!(kdcs, ["kdc.example.com:88"]);

            let mut state = self.state();
            let reply = match request[0] {
                0x6a => state.as_reply(picky_asn1_der::from_bytes::<AsReq>(request).unwrap().0),
                0x6c => state.tgs_reply(picky_asn1_der::from_bytes::<TgsReq>(request).unwrap().0),
                other => panic!("unexpected request tag {:#04x}", other),
            };

            Ok(reply)
        }
    }

    fn pa_types(pa_datas: &[PaData]) -> Vec<i64> {
        pa_datas
            .iter()
            .map(|pa_data| integer_to_i64(&pa_data.padata_type.0).unwrap())
            .collect()
    }

    fn etype_info2(salt: &str) -> PaData {
        let entries = Asn1SequenceOf::from(vec![EtypeInfo2Entry {
            etype: ExplicitContextTag0::from(integer_asn1(AES256_CTS_HMAC_SHA1_96)),
            salt: Optional::from(Some(ExplicitContextTag1::from(names::kerberos_string(salt).unwrap()))),
            s2kparams: Optional::from(None),
        }]);

        pa_data(PA_ETYPE_INFO2, picky_asn1_der::to_vec(&entries).unwrap())
    }

    fn krb_error(code: u32, text: Option<String>, e_data: Vec<PaData>) -> Vec<u8> {
        let now = OffsetDateTime::now_utc();
        let error = KrbError::from(KrbErrorInner {
            pvno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
            msg_type: ExplicitContextTag1::from(IntegerAsn1::from(vec![KRB_ERROR_MSG_TYPE])),
            ctime: Optional::from(None),
            cusec: Optional::from(None),
            stime: ExplicitContextTag4::from(kerberos_time(now)),
            susec: ExplicitContextTag5::from(Microseconds::from(integer_asn1(0))),
            error_code: ExplicitContextTag6::from(code),
            crealm: Optional::from(None),
            cname: Optional::from(None),
            realm: ExplicitContextTag9::from(names::realm("EXAMPLE.COM").unwrap()),
            sname: ExplicitContextTag10::from(names::service_principal("krbtgt/EXAMPLE.COM").unwrap()),
            e_text: Optional::from(text.map(|t| ExplicitContextTag11::from(names::kerberos_string(&t).unwrap()))),
            e_data: Optional::from(Some(ExplicitContextTag12::from(OctetStringAsn1::from(
                picky_asn1_der::to_vec(&Asn1SequenceOf::from(e_data)).unwrap(),
            )))),
        });

        picky_asn1_der::to_vec(&error).unwrap()
    }

    fn enc_kdc_rep_part(key: &[u8], nonce: IntegerAsn1, sname: PrincipalName) -> EncKdcRepPart {
        let now = OffsetDateTime::now_utc();

        EncKdcRepPart {
            key: ExplicitContextTag0::from(SessionKey::new(AES256_CTS_HMAC_SHA1_96, key.to_vec()).to_encryption_key()),
            last_req: ExplicitContextTag1::from(LastReq::from(vec![LastReqInner {
                lr_type: ExplicitContextTag0::from(IntegerAsn1::from(vec![0])),
                lr_value: ExplicitContextTag1::from(kerberos_time(now)),
            }])),
            nonce: ExplicitContextTag2::from(nonce),
            key_expiration: Optional::from(None),
            flags: ExplicitContextTag4::from(KerberosFlags::from(BitString::with_bytes(vec![0x40, 0, 0, 0]))),
            auth_time: ExplicitContextTag5::from(kerberos_time(now)),
            start_time: Optional::from(None),
            end_time: ExplicitContextTag7::from(kerberos_time(now + TICKET_LIFETIME)),
            renew_till: Optional::from(None),
            srealm: ExplicitContextTag9::from(names::realm("EXAMPLE.COM").unwrap()),
            sname: ExplicitContextTag10::from(sname),
            caadr: Optional::from(None),
            encrypted_pa_data: Optional::from(None),
        }
    }

    fn kdc_rep(
        msg_type: u8,
        padata: Vec<PaData>,
        cname: PrincipalName,
        sname: &PrincipalName,
        cipher: Vec<u8>,
    ) -> KdcRep {
        let sname = names::components(sname);

        KdcRep {
            pvno: ExplicitContextTag0::from(IntegerAsn1::from(vec![KERBEROS_VERSION])),
            msg_type: ExplicitContextTag1::from(IntegerAsn1::from(vec![msg_type])),
            padata: Optional::from(if padata.is_empty() {
                None
            } else {
                Some(ExplicitContextTag2::from(Asn1SequenceOf::from(padata)))
            }),
            crealm: ExplicitContextTag3::from(names::realm("EXAMPLE.COM").unwrap()),
            cname: ExplicitContextTag4::from(cname),
            ticket: ExplicitContextTag5::from(service_ticket(&sname[0], &sname[1])),
            enc_part: ExplicitContextTag6::from(EncryptedData {
                etype: ExplicitContextTag0::from(integer_asn1(AES256_CTS_HMAC_SHA1_96)),
                kvno: Optional::from(None),
                cipher: ExplicitContextTag2::from(OctetStringAsn1::from(cipher)),
            }),
        }
    }

    impl MockState {
        fn as_reply(&mut self, request: KdcReq) -> Vec<u8> {
            let pa_datas = request.padata.0.map(|padata| padata.0 .0).unwrap_or_default();
            self.as_padata.push(pa_types(&pa_datas));

            if let Some((code, text)) = self.error.clone() {
                return krb_error(code, text, Vec::new());
            }

            let cipher = KeyCipher::Aes256CtsHmacSha196;
            let timestamp = pa_datas
                .iter()
                .find(|pa_data| integer_to_i64(&pa_data.padata_type.0).unwrap() == PA_ENC_TIMESTAMP);

            match timestamp {
                Some(timestamp) => {
                    let enc_data: EncryptedData = picky_asn1_der::from_bytes(&timestamp.padata_data.0 .0).unwrap();
                    let plain = cipher.decrypt(&self.client_key, PA_ENC_TIMESTAMP_KEY_USAGE, &enc_data.cipher.0 .0);
                    match plain {
                        Ok(plain) => {
                            picky_asn1_der::from_bytes::<PaEncTsEnc>(&plain).unwrap();
                        }
                        Err(_) => return krb_error(KDC_ERR_PREAUTH_FAILED as u32, None, Vec::new()),
                    }
                }
                None if self.require_preauth => {
                    return krb_error(
                        KDC_ERR_PREAUTH_REQUIRED as u32,
                        None,
                        vec![etype_info2(&self.salt), pa_data(PA_ENC_TIMESTAMP, Vec::new())],
                    )
                }
                None => {}
            }

            let body = request.req_body.0;
            let sname = body.sname.0.unwrap().0;
            let cname = body.cname.0.unwrap().0;

            let enc_part = EncAsRepPart::from(enc_kdc_rep_part(
                &TGT_SESSION_KEY,
                body.nonce.0.clone(),
                sname.clone(),
            ));
            let encrypted = cipher
                .encrypt(&self.client_key, AS_REP_ENC, &picky_asn1_der::to_vec(&enc_part).unwrap())
                .unwrap();
            self.tgt_key = Some(SessionKey::new(AES256_CTS_HMAC_SHA1_96, TGT_SESSION_KEY.to_vec()));

            let rep = AsRep::from(kdc_rep(
                AS_REP_MSG_TYPE,
                vec![etype_info2(&self.salt)],
                cname,
                &sname,
                encrypted,
            ));

            picky_asn1_der::to_vec(&rep).unwrap()
        }

        fn tgs_reply(&mut self, request: KdcReq) -> Vec<u8> {
            let pa_datas = request.padata.0.unwrap().0 .0;
            let pa_tgs_req = pa_datas
                .iter()
                .find(|pa_data| integer_to_i64(&pa_data.padata_type.0).unwrap() == PA_TGS_REQ)
                .unwrap();
            let ap_req: ApReq = picky_asn1_der::from_bytes(&pa_tgs_req.padata_data.0 .0).unwrap();

            let tgt_key = self.tgt_key.clone().expect("TGS-REQ before AS exchange");
            let cipher = tgt_key.cipher().unwrap();

            let plain = cipher
                .decrypt(
                    tgt_key.value(),
                    TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR,
                    &ap_req.0.authenticator.0.cipher.0 .0,
                )
                .unwrap();
            let authenticator: Authenticator = picky_asn1_der::from_bytes(&plain).unwrap();

            let body = request.req_body.0;
            let expected_checksum = cipher
                .checksum(
                    tgt_key.value(),
                    TGS_REQ_PA_DATA_AP_REQ_AUTHENTICATOR_CKSUM,
                    &picky_asn1_der::to_vec(&body).unwrap(),
                )
                .unwrap();
            assert_eq!(authenticator.0.cksum.0.unwrap().0.checksum.0 .0, expected_checksum);

            let sname = body.sname.0.unwrap().0;
            self.tgs_snames.push(names::principal_to_string(&sname));

            let enc_part = EncTgsRepPart::from(enc_kdc_rep_part(
                &SERVICE_SESSION_KEY,
                body.nonce.0.clone(),
                sname.clone(),
            ));
            let encrypted = cipher
                .encrypt(
                    tgt_key.value(),
                    TGS_REP_ENC_SESSION_KEY,
                    &picky_asn1_der::to_vec(&enc_part).unwrap(),
                )
                .unwrap();

            let rep = TgsRep::from(kdc_rep(
                TGS_REP_MSG_TYPE,
                Vec::new(),
                authenticator.0.cname.0,
                &sname,
                encrypted,
            ));

            picky_asn1_der::to_vec(&rep).unwrap()
        }
    }

    fn krb5_conf() -> Krb5Conf {
        Krb5Conf::parse(
            "[libdefaults]\n default_realm = EXAMPLE.COM\n[realms]\n EXAMPLE.COM = {\n  kdc = kdc.example.com\n }\n",
        )
        .unwrap()
    }

    fn user_config() -> AuthConfig {
        AuthConfig {
            auth_type: AuthType::User,
            username: String::from("alice"),
            password: String::from(PASSWORD),
            ..AuthConfig::default()
        }
    }

    fn client(config: &AuthConfig, kdc: &MockKdc) -> KdcClient {
        KdcClient::with_transport(config, krb5_conf(), Box::new(kdc.clone())).unwrap()
    }

    #[test]
    fn password_login_with_pre_authentication() {
        let kdc = MockKdc::new(true);
        let mut client = client(&user_config(), &kdc);

        client.login().unwrap();

        assert_eq!(client.domain(), "EXAMPLE.COM");
        assert_eq!(names::principal_to_string(&client.client_name()), "alice");
        assert_eq!(
            kdc.state().as_padata,
            vec![vec![PA_REQ_ENC_PA_REP], vec![PA_ENC_TIMESTAMP, PA_REQ_ENC_PA_REP]]
        );

        let (ticket, key) = client.tgt.clone().unwrap();
        assert_eq!(names::principal_to_string(&ticket.0.sname.0), "krbtgt/EXAMPLE.COM");
        assert_eq!(key, SessionKey::new(AES256_CTS_HMAC_SHA1_96, TGT_SESSION_KEY.to_vec()));
    }

    #[test]
    fn salt_from_reply_without_pre_authentication() {
        let kdc = MockKdc::new(false);
        let mut client = client(&user_config(), &kdc);

        client.login().unwrap();

        assert_eq!(kdc.state().as_padata.len(), 1);
        assert!(client.tgt.is_some());
    }

    #[test]
    fn fast_negotiation_can_be_disabled() {
        let kdc = MockKdc::new(true);
        let config = AuthConfig {
            disable_pa_fx_fast: true,
            ..user_config()
        };
        let mut client = client(&config, &kdc);

        client.login().unwrap();

        assert_eq!(kdc.state().as_padata, vec![vec![], vec![PA_ENC_TIMESTAMP]]);
    }

    #[test]
    fn wrong_password() {
        let kdc = MockKdc::new(true);
        let config = AuthConfig {
            password: String::from("wrong"),
            ..user_config()
        };
        let mut client = client(&config, &kdc);

        assert!(matches!(
            client.login(),
            Err(CredentialError::Kdc { code, .. }) if code == KDC_ERR_PREAUTH_FAILED
        ));
        assert!(client.tgt.is_none());
    }

    #[test]
    fn kdc_error_text() {
        let kdc = MockKdc::new(true);
        kdc.state().error = Some((6, Some(String::from("client not found"))));
        let mut client = client(&user_config(), &kdc);

        match client.login() {
            Err(CredentialError::Kdc { code, text }) => {
                assert_eq!(code, 6);
                assert_eq!(text.as_deref(), Some("client not found"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn keytab_login() {
        let keytab = encode_keytab(&[TestEntry {
            components: &["alice"],
            realm: "EXAMPLE.COM",
            kvno: 5,
            etype: AES256_CTS_HMAC_SHA1_96 as u16,
            key: &password_key(PASSWORD, SALT),
        }]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.keytab");
        std::fs::write(&path, keytab).unwrap();

        let kdc = MockKdc::new(true);
        let config = AuthConfig {
            auth_type: AuthType::Keytab,
            keytab_path: Some(path),
            username: String::from("alice@EXAMPLE.COM"),
            ..AuthConfig::default()
        };
        let mut client = client(&config, &kdc);

        client.login().unwrap();
        assert!(client.tgt.is_some());

        let (_, key) = client.service_ticket("kafka/broker.example.com").unwrap();
        assert_eq!(key.value(), &SERVICE_SESSION_KEY);
    }

    #[test]
    fn keytab_without_principal() {
        let keytab = encode_keytab(&[TestEntry {
            components: &["bob"],
            realm: "EXAMPLE.COM",
            kvno: 1,
            etype: AES256_CTS_HMAC_SHA1_96 as u16,
            key: &[0; 32],
        }]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &keytab).unwrap();

        let kdc = MockKdc::new(true);
        let config = AuthConfig {
            auth_type: AuthType::Keytab,
            keytab_path: Some(file.path().to_owned()),
            username: String::from("alice"),
            ..AuthConfig::default()
        };
        let mut client = client(&config, &kdc);

        assert!(matches!(client.login(), Err(CredentialError::KeyNotFound { .. })));
        assert!(kdc.state().as_padata.is_empty());
    }

    #[test]
    fn service_ticket_from_tgs_exchange_is_cached() {
        let kdc = MockKdc::new(true);
        let mut client = client(&user_config(), &kdc);
        client.login().unwrap();

        let (ticket, key) = client.service_ticket("kafka/broker.example.com").unwrap();
        assert_eq!(
            names::principal_to_string(&ticket.0.sname.0),
            "kafka/broker.example.com"
        );
        assert_eq!(key, SessionKey::new(AES256_CTS_HMAC_SHA1_96, SERVICE_SESSION_KEY.to_vec()));

        let (again, _) = client.service_ticket("kafka/broker.example.com@EXAMPLE.COM").unwrap();
        assert_eq!(again, ticket);
        assert_eq!(kdc.state().tgs_snames, vec!["kafka/broker.example.com"]);
    }

    #[test]
    fn service_ticket_requires_login() {
        let kdc = MockKdc::new(true);
        let mut client = client(&user_config(), &kdc);

        assert!(matches!(
            client.service_ticket("kafka/broker.example.com"),
            Err(CredentialError::NotLoggedIn)
        ));
    }

    #[test]
    fn release_drops_tickets() {
        let kdc = MockKdc::new(true);
        let mut client = client(&user_config(), &kdc);
        client.login().unwrap();
        client.service_ticket("kafka/broker.example.com").unwrap();

        client.release();

        assert!(client.tgt.is_none());
        assert!(client.service_tickets.is_empty());
        assert!(client.long_term_keys.is_none());
        assert!(matches!(
            client.service_ticket("kafka/broker.example.com"),
            Err(CredentialError::NotLoggedIn)
        ));
    }

    #[test]
    fn credential_cache_login() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &ccache::tests::sample()).unwrap();

        let kdc = MockKdc::new(true);
        kdc.state().tgt_key = Some(SessionKey::new(AES256_CTS_HMAC_SHA1_96, vec![0x77; 32]));
        let config = AuthConfig {
            auth_type: AuthType::Ccache,
            ccache_path: Some(file.path().to_owned()),
            ..AuthConfig::default()
        };
        let mut client = client(&config, &kdc);

        client.login().unwrap();
        assert_eq!(client.domain(), "EXAMPLE.COM");
        assert_eq!(names::principal_to_string(&client.client_name()), "alice");

        let (_, cached_key) = client.service_ticket("kafka/broker.example.com").unwrap();
        assert_eq!(cached_key.value(), &[0x88; 32]);
        assert!(kdc.state().tgs_snames.is_empty());

        let (_, key) = client.service_ticket("kafka/broker-2.example.com").unwrap();
        assert_eq!(key.value(), &SERVICE_SESSION_KEY);
        assert_eq!(kdc.state().tgs_snames, vec!["kafka/broker-2.example.com"]);
        assert!(kdc.state().as_padata.is_empty());
    }

    #[test]
    fn configuration_errors() {
        let kdc = MockKdc::new(true);
        let no_realm = Krb5Conf::default();

        assert!(matches!(
            KdcClient::with_transport(&user_config(), no_realm, Box::new(kdc.clone())),
            Err(CredentialError::Config(_))
        ));

        let no_password = AuthConfig {
            password: String::new(),
            ..user_config()
        };
        assert!(matches!(
            KdcClient::with_transport(&no_password, krb5_conf(), Box::new(kdc.clone())),
            Err(CredentialError::Config(_))
        ));

        let no_keytab = AuthConfig {
            auth_type: AuthType::Keytab,
            ..user_config()
        };
        assert!(matches!(
            KdcClient::with_transport(&no_keytab, krb5_conf(), Box::new(kdc)),
            Err(CredentialError::Config(_))
        ));
    }
}
