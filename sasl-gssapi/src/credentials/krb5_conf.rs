//! Subset of the MIT `krb5.conf` format: `[libdefaults]`, `[realms]` and `[domain_realm]`.
//!
//! ```not_rust
//! [libdefaults]
//!     default_realm = EXAMPLE.COM
//!
//! [realms]
//!     EXAMPLE.COM = {
//!         kdc = kdc1.example.com:88
//!         kdc = kdc2.example.com
//!     }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::CredentialError;

pub const DEFAULT_KDC_PORT: u16 = 88;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RealmConfig {
    pub kdcs: Vec<String>,
    pub admin_servers: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Krb5Conf {
    pub libdefaults: HashMap<String, String>,
    pub realms: HashMap<String, RealmConfig>,
    pub domain_realm: HashMap<String, String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    LibDefaults,
    Realms,
    DomainRealm,
    Other,
}

impl Krb5Conf {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CredentialError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| CredentialError::Config(format!("cannot read {}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CredentialError> {
        let mut conf = Krb5Conf::default();
        let mut section = Section::Other;
        // realm currently opened with `REALM = {`, and the depth of nested braces inside it
        let mut open_realm: Option<String> = None;
        let mut depth = 0usize;

        for (index, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if depth == 0 && line.starts_with('[') {
                let name = line
                    .strip_prefix('[')
                    .and_then(|l| l.strip_suffix(']'))
                    .ok_or_else(|| syntax_error(index, "unterminated section header"))?;
                section = match name.trim() {
                    "libdefaults" => Section::LibDefaults,
                    "realms" => Section::Realms,
                    "domain_realm" => Section::DomainRealm,
                    _ => Section::Other,
                };
                continue;
            }

            if line == "}" {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| syntax_error(index, "unbalanced closing brace"))?;
                if depth == 0 {
                    open_realm = None;
                }
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| syntax_error(index, "expected `key = value`"))?;
            let key = key.trim();
            let value = value.trim();

            if value == "{" {
                if depth == 0 && section == Section::Realms {
                    conf.realms.entry(key.to_owned()).or_default();
                    open_realm = Some(key.to_owned());
                }
                depth += 1;
                continue;
            }

            match (section, depth, &open_realm) {
                (Section::LibDefaults, 0, _) => {
                    conf.libdefaults.insert(key.to_owned(), value.to_owned());
                }
                (Section::DomainRealm, 0, _) => {
                    conf.domain_realm.insert(key.to_lowercase(), value.to_owned());
                }
                (Section::Realms, 1, Some(realm)) => {
                    let realm = conf.realms.entry(realm.clone()).or_default();
                    match key {
                        "kdc" => realm.kdcs.push(value.to_owned()),
                        "admin_server" => realm.admin_servers.push(value.to_owned()),
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if depth != 0 {
            return Err(CredentialError::Config(String::from("unterminated realm block")));
        }

        Ok(conf)
    }

    pub fn default_realm(&self) -> Option<&str> {
        self.libdefaults.get("default_realm").map(String::as_str)
    }

    /// KDC addresses of `realm` as `host:port`, in configuration order.
    pub fn kdcs(&self, realm: &str) -> Vec<String> {
        self.realms
            .get(realm)
            .map(|config| config.kdcs.iter().map(|kdc| with_default_port(kdc)).collect())
            .unwrap_or_default()
    }

    /// Realm of `host` from `[domain_realm]`, the most specific entry winning.
    pub fn realm_for_host(&self, host: &str) -> Option<&str> {
        let host = host.to_lowercase();

        if let Some(realm) = self.domain_realm.get(&host) {
            return Some(realm);
        }

        let mut domain = host.as_str();
        while let Some(position) = domain.find('.') {
            if let Some(realm) = self.domain_realm.get(&domain[position..]) {
                return Some(realm);
            }
            domain = &domain[position + 1..];
        }

        None
    }
}

fn with_default_port(kdc: &str) -> String {
    let has_port = match kdc.strip_prefix('[') {
        // [ipv6]:port
        Some(rest) => rest.contains("]:"),
        None => kdc.contains(':'),
    };

    if has_port {
        kdc.to_owned()
    } else {
        format!("{}:{}", kdc, DEFAULT_KDC_PORT)
    }
}

fn syntax_error(index: usize, reason: &str) -> CredentialError {
    CredentialError::Config(format!("line {}: {}", index + 1, reason))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    const KRB5_CONF: &str = r#"
# managed by configuration management
[libdefaults]
    default_realm = EXAMPLE.COM
    dns_lookup_kdc = false
    ticket_lifetime = 24h

[realms]
    EXAMPLE.COM = {
        kdc = kdc1.example.com:88
        kdc = kdc2.example.com
        admin_server = kadmin.example.com
        auth_to_local = {
            kdc = ignored.example.com
        }
    }
    OTHER.ORG = {
        kdc = [2001:db8::1]
    }

[domain_realm]
    .example.com = EXAMPLE.COM
    broker.other.org = OTHER.ORG

[logging]
    default = FILE:/var/log/krb5libs.log
"#;

    #[test]
    fn parses_sections() {
        let conf = Krb5Conf::parse(KRB5_CONF).unwrap();

        assert_eq!(conf.default_realm(), Some("EXAMPLE.COM"));
        assert_eq!(conf.libdefaults.get("dns_lookup_kdc").map(String::as_str), Some("false"));
        assert_eq!(
            conf.kdcs("EXAMPLE.COM"),
            vec!["kdc1.example.com:88", "kdc2.example.com:88"]
        );
        assert_eq!(conf.realms["EXAMPLE.COM"].admin_servers, vec!["kadmin.example.com"]);
        assert_eq!(conf.kdcs("OTHER.ORG"), vec!["[2001:db8::1]:88"]);
        assert!(conf.kdcs("UNKNOWN.NET").is_empty());
    }

    #[rstest]
    #[case("broker-1.example.com", Some("EXAMPLE.COM"))]
    #[case("a.b.example.com", Some("EXAMPLE.COM"))]
    #[case("BROKER.OTHER.ORG", Some("OTHER.ORG"))]
    #[case("other.org", None)]
    #[case("localhost", None)]
    fn host_to_realm(#[case] host: &str, #[case] expected: Option<&str>) {
        let conf = Krb5Conf::parse(KRB5_CONF).unwrap();

        assert_eq!(conf.realm_for_host(host), expected);
    }

    #[rstest]
    #[case("[realms]\n EXAMPLE.COM = {\n kdc = a\n")]
    #[case("[libdefaults]\n }\n")]
    #[case("[libdefaults\n")]
    #[case("[libdefaults]\n default_realm\n")]
    fn syntax_errors(#[case] content: &str) {
        assert!(matches!(Krb5Conf::parse(content), Err(CredentialError::Config(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(KRB5_CONF.as_bytes()).unwrap();

        let conf = Krb5Conf::load(file.path()).unwrap();

        assert_eq!(conf.default_realm(), Some("EXAMPLE.COM"));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            Krb5Conf::load(dir.path().join("krb5.conf")),
            Err(CredentialError::Config(_))
        ));
    }
}
