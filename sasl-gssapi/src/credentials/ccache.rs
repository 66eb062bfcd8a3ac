//! MIT credential cache reader (`FILE:` caches, formats 0x0503 and 0x0504).
//!
//! ```not_rust
//! ccache     ::= 0x05 0x04 header_len:u16 header[header_len] principal credential*
//! principal  ::= name_type:u32 num_components:u32 realm:data32 component:data32*
//! credential ::= client:principal server:principal
//!                keytype:u16 key:data32
//!                authtime:u32 starttime:u32 endtime:u32 renew_till:u32
//!                is_skey:u8 ticket_flags:u32
//!                num_addresses:u32 (addrtype:u16 data32)*
//!                num_authdata:u32 (ad_type:u16 data32)*
//!                ticket:data32 second_ticket:data32
//! ```
//!
//! All integers are big-endian.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};
use picky_krb::data_types::Ticket;

use crate::constants::types::KRBTGT;
use crate::crypto::SessionKey;
use crate::error::CredentialError;

pub const CCACHE_V3: u16 = 0x0503;
pub const CCACHE_V4: u16 = 0x0504;

/// Realm of the configuration entries stored next to credentials.
const CONFIG_REALM: &str = "X-CACHECONF:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcachePrincipal {
    pub name_type: u32,
    pub realm: String,
    pub components: Vec<String>,
}

impl CcachePrincipal {
    pub fn is(&self, components: &[&str], realm: &str) -> bool {
        self.realm == realm && self.components.iter().map(String::as_str).eq(components.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CcacheCredential {
    pub client: CcachePrincipal,
    pub server: CcachePrincipal,
    pub key: SessionKey,
    pub auth_time: u32,
    pub start_time: u32,
    pub end_time: u32,
    pub renew_till: u32,
    pub is_skey: bool,
    pub ticket_flags: u32,
    /// DER encoded `Ticket`.
    pub ticket: Vec<u8>,
}

impl CcacheCredential {
    pub fn ticket(&self) -> Result<Ticket, CredentialError> {
        Ok(picky_asn1_der::from_bytes(&self.ticket)?)
    }

    /// `now` in seconds since the Unix epoch.
    pub fn is_expired(&self, now: i64) -> bool {
        i64::from(self.end_time) <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCache {
    pub default_principal: CcachePrincipal,
    pub credentials: Vec<CcacheCredential>,
}

impl CredentialCache {
    /// Accepts a plain path or a `FILE:` cache name.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let path = path
            .to_str()
            .and_then(|p| p.strip_prefix("FILE:"))
            .map(Path::new)
            .unwrap_or(path);

        let data = fs::read(path)
            .map_err(|e| CredentialError::CredentialCache(format!("cannot read {}: {}", path.display(), e)))?;

        Self::decode(&data)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CredentialError> {
        read_cache(data).map_err(|e| CredentialError::CredentialCache(e.to_string()))
    }

    /// Ticket-granting ticket `krbtgt/REALM@REALM`.
    pub fn tgt(&self, realm: &str) -> Option<&CcacheCredential> {
        self.find(&[KRBTGT, realm], realm)
    }

    /// Latest credential for the server principal.
    pub fn find(&self, components: &[&str], realm: &str) -> Option<&CcacheCredential> {
        self.credentials
            .iter()
            .filter(|credential| credential.server.is(components, realm))
            .max_by_key(|credential| credential.end_time)
    }
}

fn read_cache(data: &[u8]) -> io::Result<CredentialCache> {
    let mut reader = Cursor::new(data);

    match reader.read_u16::<BigEndian>()? {
        CCACHE_V4 => {
            let header_len = reader.read_u16::<BigEndian>()?;
            skip(&mut reader, u64::from(header_len))?;
        }
        CCACHE_V3 => {}
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported version {:#06x}", other),
            ))
        }
    }

    let default_principal = read_principal(&mut reader)?;

    let mut credentials = Vec::new();
    while (reader.position() as usize) < data.len() {
        let credential = read_credential(&mut reader)?;
        if credential.server.realm != CONFIG_REALM {
            credentials.push(credential);
        }
    }

    Ok(CredentialCache {
        default_principal,
        credentials,
    })
}

fn read_credential(reader: &mut Cursor<&[u8]>) -> io::Result<CcacheCredential> {
    let client = read_principal(reader)?;
    let server = read_principal(reader)?;

    let keytype = reader.read_u16::<BigEndian>()?;
    let key = read_data(reader)?;

    let auth_time = reader.read_u32::<BigEndian>()?;
    let start_time = reader.read_u32::<BigEndian>()?;
    let end_time = reader.read_u32::<BigEndian>()?;
    let renew_till = reader.read_u32::<BigEndian>()?;
    let is_skey = reader.read_u8()? != 0;
    let ticket_flags = reader.read_u32::<BigEndian>()?;

    // addresses, then authorization data
    for _ in 0..2 {
        let count = reader.read_u32::<BigEndian>()?;
        for _ in 0..count {
            reader.read_u16::<BigEndian>()?;
            read_data(reader)?;
        }
    }

    let ticket = read_data(reader)?;
    let _second_ticket = read_data(reader)?;

    Ok(CcacheCredential {
        client,
        server,
        key: SessionKey::new(i64::from(keytype), key),
        auth_time,
        start_time,
        end_time,
        renew_till,
        is_skey,
        ticket_flags,
        ticket,
    })
}

fn read_principal(reader: &mut Cursor<&[u8]>) -> io::Result<CcachePrincipal> {
    let name_type = reader.read_u32::<BigEndian>()?;
    let num_components = reader.read_u32::<BigEndian>()?;
    let realm = read_string(reader)?;
    let components = (0..num_components)
        .map(|_| read_string(reader))
        .collect::<io::Result<Vec<_>>>()?;

    Ok(CcachePrincipal {
        name_type,
        realm,
        components,
    })
}

fn read_data(reader: &mut Cursor<&[u8]>) -> io::Result<Vec<u8>> {
    let len = reader.read_u32::<BigEndian>()? as usize;

    let remaining = reader.get_ref().len().saturating_sub(reader.position() as usize);
    if len > remaining {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("field of {} bytes exceeds the {} remaining", len, remaining),
        ));
    }

    let mut data = vec![0; len];
    reader.read_exact(&mut data)?;

    Ok(data)
}

fn read_string(reader: &mut Cursor<&[u8]>) -> io::Result<String> {
    String::from_utf8(read_data(reader)?).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn skip(reader: &mut Cursor<&[u8]>, len: u64) -> io::Result<()> {
    let copied = io::copy(&mut reader.by_ref().take(len), &mut io::sink())?;
    if copied != len {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated header"));
    }

    Ok(())
}
