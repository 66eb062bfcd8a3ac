//! MIT keytab reader.
//!
//! ```not_rust
//! keytab  ::= 0x05 version(1|2) entry*
//! entry   ::= size:i32 (negative: |size| bytes of hole)
//!             num_components:u16 realm:data16 component:data16*
//!             name_type:u32 (version 2 only) timestamp:u32 vno8:u8
//!             keytype:u16 key:data16 [vno:u32]
//! ```
//!
//! Version 2 is big-endian. Version 1 uses the byte order of the writing host, taken as little-endian, and
//! counts the realm in `num_components`.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};

use crate::crypto::{SessionKey, SUPPORTED_ETYPES};
use crate::error::CredentialError;

pub const KEYTAB_MAGIC: u8 = 0x05;
pub const KEYTAB_V1: u8 = 0x01;
pub const KEYTAB_V2: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeytabEntry {
    pub realm: String,
    pub components: Vec<String>,
    pub name_type: u32,
    pub timestamp: u32,
    pub kvno: u32,
    pub key: SessionKey,
}

impl KeytabEntry {
    pub fn matches(&self, components: &[&str], realm: &str) -> bool {
        self.realm == realm && self.components.iter().map(String::as_str).eq(components.iter().copied())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Keytab {
    pub entries: Vec<KeytabEntry>,
}

impl Keytab {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let data =
            fs::read(path).map_err(|e| CredentialError::Keytab(format!("cannot read {}: {}", path.display(), e)))?;

        Self::decode(&data)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CredentialError> {
        let (magic, version) = match data {
            [magic, version, ..] => (*magic, *version),
            _ => return Err(CredentialError::Keytab(String::from("missing header"))),
        };

        if magic != KEYTAB_MAGIC {
            return Err(CredentialError::Keytab(format!("bad magic {:#04x}", magic)));
        }

        let entries = match version {
            KEYTAB_V1 => read_entries::<LittleEndian>(&data[2..], version),
            KEYTAB_V2 => read_entries::<BigEndian>(&data[2..], version),
            other => return Err(CredentialError::Keytab(format!("unsupported version {:#04x}", other))),
        }
        .map_err(|e| CredentialError::Keytab(e.to_string()))?;

        Ok(Self { entries })
    }

    /// Entry of the principal with the highest kvno; for equal kvno the preferred encryption type wins.
    pub fn find(&self, components: &[&str], realm: &str) -> Option<&KeytabEntry> {
        self.candidates(components, realm)
            .into_iter()
            .max_by_key(|entry| (entry.kvno, etype_preference(entry.key.etype())))
    }

    /// Entry of the principal for `etype` with the highest kvno.
    pub fn find_for_etype(&self, components: &[&str], realm: &str, etype: i64) -> Option<&KeytabEntry> {
        self.candidates(components, realm)
            .into_iter()
            .filter(|entry| entry.key.etype() == etype)
            .max_by_key(|entry| entry.kvno)
    }

    /// Supported encryption types available for the principal at its highest kvno, in preference order.
    pub fn etypes(&self, components: &[&str], realm: &str) -> Vec<i64> {
        let candidates = self.candidates(components, realm);
        let Some(kvno) = candidates.iter().map(|entry| entry.kvno).max() else {
            return Vec::new();
        };

        SUPPORTED_ETYPES
            .iter()
            .copied()
            .filter(|etype| {
                candidates
                    .iter()
                    .any(|entry| entry.kvno == kvno && entry.key.etype() == *etype)
            })
            .collect()
    }

    fn candidates(&self, components: &[&str], realm: &str) -> Vec<&KeytabEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.matches(components, realm) && SUPPORTED_ETYPES.contains(&entry.key.etype()))
            .collect()
    }
}

fn etype_preference(etype: i64) -> usize {
    SUPPORTED_ETYPES.len() - SUPPORTED_ETYPES.iter().position(|e| *e == etype).unwrap_or(SUPPORTED_ETYPES.len())
}

fn read_entries<E: ByteOrder>(data: &[u8], version: u8) -> io::Result<Vec<KeytabEntry>> {
    let mut reader = Cursor::new(data);
    let mut entries = Vec::new();

    while (reader.position() as usize) < data.len() {
        let size = reader.read_i32::<E>()?;
        let start = reader.position() as usize;
        let len = size.unsigned_abs() as usize;

        let record = data
            .get(start..start + len)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "entry exceeds keytab size"))?;
        reader.set_position((start + len) as u64);

        // deleted entry
        if size < 0 {
            continue;
        }

        entries.push(read_entry::<E>(record, version)?);
    }

    Ok(entries)
}

fn read_entry<E: ByteOrder>(record: &[u8], version: u8) -> io::Result<KeytabEntry> {
    let mut reader = Cursor::new(record);

    let mut num_components = reader.read_u16::<E>()?;
    if version == KEYTAB_V1 {
        num_components = num_components.saturating_sub(1);
    }

    let realm = read_string::<E>(&mut reader)?;
    let components = (0..num_components)
        .map(|_| read_string::<E>(&mut reader))
        .collect::<io::Result<Vec<_>>>()?;

    let name_type = if version == KEYTAB_V1 {
        0
    } else {
        reader.read_u32::<E>()?
    };
    let timestamp = reader.read_u32::<E>()?;
    let vno8 = reader.read_u8()?;
    let etype = reader.read_u16::<E>()?;
    let key = read_data::<E>(&mut reader)?;

    // 32-bit kvno extension, present when the record has room for it
    let remaining = record.len() - reader.position() as usize;
    let kvno = match reader.read_u32::<E>() {
        Ok(kvno) if remaining >= 4 && kvno != 0 => kvno,
        _ => u32::from(vno8),
    };

    Ok(KeytabEntry {
        realm,
        components,
        name_type,
        timestamp,
        kvno,
        key: SessionKey::new(i64::from(etype), key),
    })
}

fn read_data<E: ByteOrder>(reader: &mut impl Read) -> io::Result<Vec<u8>> {
    let len = reader.read_u16::<E>()?;
    let mut data = vec![0; usize::from(len)];
    reader.read_exact(&mut data)?;

    Ok(data)
}

fn read_string<E: ByteOrder>(reader: &mut impl Read) -> io::Result<String> {
    String::from_utf8(read_data::<E>(reader)?).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
