use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Builds the service principal name from `(service_name, host)`.
pub type SpnBuilder = Arc<dyn Fn(&str, &str) -> String + Send + Sync>;

fn default_kerberos_config_path() -> PathBuf {
    Path::new("/etc/krb5.conf").to_owned()
}

fn default_service_name() -> String {
    String::from("kafka")
}

const fn default_kdc_timeout() -> Duration {
    Duration::from_secs(10)
}

const fn default_disable_pa_fx_fast() -> bool {
    false
}

#[derive(PartialEq, Eq, Clone, Copy, Serialize, Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// Username and password.
    User,
    Keytab,
    /// Existing MIT credential cache.
    Ccache,
}

impl Default for AuthType {
    fn default() -> Self {
        AuthType::User
    }
}

impl TryFrom<u8> for AuthType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(AuthType::User),
            2 => Ok(AuthType::Keytab),
            3 => Ok(AuthType::Ccache),
            other => Err(other),
        }
    }
}

impl From<&str> for AuthType {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "keytab" => Self::Keytab,
            "ccache" => Self::Ccache,
            _ => Self::default(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub auth_type: AuthType,
    #[serde(default)]
    pub keytab_path: Option<PathBuf>,
    #[serde(default)]
    pub ccache_path: Option<PathBuf>,
    #[serde(default = "default_kerberos_config_path")]
    pub kerberos_config_path: PathBuf,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Overrides `default_realm` of the Kerberos configuration.
    #[serde(default)]
    pub realm: Option<String>,
    #[serde(default = "default_disable_pa_fx_fast")]
    pub disable_pa_fx_fast: bool,
    #[serde(default = "default_kdc_timeout", with = "duration_secs")]
    pub kdc_timeout: Duration,

    #[serde(skip)]
    pub spn_builder: Option<SpnBuilder>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_type: AuthType::default(),
            keytab_path: None,
            ccache_path: None,
            kerberos_config_path: default_kerberos_config_path(),
            service_name: default_service_name(),
            username: String::new(),
            password: String::new(),
            realm: None,
            disable_pa_fx_fast: default_disable_pa_fx_fast(),
            kdc_timeout: default_kdc_timeout(),
            spn_builder: None,
        }
    }
}

impl AuthConfig {
    /// Service principal name for `host`, `<service_name>/<host>` unless a builder is set.
    pub fn spn(&self, host: &str) -> String {
        match &self.spn_builder {
            Some(builder) => builder(&self.service_name, host),
            None => format!("{}/{}", self.service_name, host),
        }
    }

    pub fn with_spn_builder(mut self, builder: impl Fn(&str, &str) -> String + Send + Sync + 'static) -> Self {
        self.spn_builder = Some(Arc::new(builder));
        self
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("auth_type", &self.auth_type)
            .field("keytab_path", &self.keytab_path)
            .field("ccache_path", &self.ccache_path)
            .field("kerberos_config_path", &self.kerberos_config_path)
            .field("service_name", &self.service_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("realm", &self.realm)
            .field("disable_pa_fx_fast", &self.disable_pa_fx_fast)
            .field("kdc_timeout", &self.kdc_timeout)
            .field("spn_builder", &self.spn_builder.as_ref().map(|_| "<custom>"))
            .finish()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
