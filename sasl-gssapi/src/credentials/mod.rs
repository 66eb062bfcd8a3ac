//! Kerberos credential acquisition.
//!
//! The handshake only needs the capabilities of [`KerberosClient`]; [`KdcClient`] is the production
//! implementation talking to a KDC, optionally seeded from a keytab or a credential cache.

pub mod ccache;
pub mod kdc;
pub mod keytab;
pub mod krb5_conf;
pub mod transport;

use std::ops::{Deref, DerefMut};

use picky_krb::data_types::{PrincipalName, Ticket};

pub use self::kdc::KdcClient;
use crate::crypto::SessionKey;
use crate::error::CredentialError;

pub trait KerberosClient {
    /// Acquires the ticket-granting ticket.
    fn login(&mut self) -> Result<(), CredentialError>;

    /// Returns a ticket for `spn` (`service/host`) with its session key.
    fn service_ticket(&mut self, spn: &str) -> Result<(Ticket, SessionKey), CredentialError>;

    /// Realm of the client principal.
    fn domain(&self) -> &str;

    fn client_name(&self) -> PrincipalName;

    /// Drops tickets and keys. Called once per authorization attempt.
    fn release(&mut self);
}

impl<T: KerberosClient + ?Sized> KerberosClient for &mut T {
    fn login(&mut self) -> Result<(), CredentialError> {
        (**self).login()
    }

    fn service_ticket(&mut self, spn: &str) -> Result<(Ticket, SessionKey), CredentialError> {
        (**self).service_ticket(spn)
    }

    fn domain(&self) -> &str {
        (**self).domain()
    }

    fn client_name(&self) -> PrincipalName {
        (**self).client_name()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// Releases the wrapped client when dropped.
pub struct ClientGuard<C: KerberosClient> {
    client: C,
}

impl<C: KerberosClient> ClientGuard<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: KerberosClient> Deref for ClientGuard<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl<C: KerberosClient> DerefMut for ClientGuard<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.client
    }
}

impl<C: KerberosClient> Drop for ClientGuard<C> {
    fn drop(&mut self) {
        self.client.release();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::constants::etypes::AES256_CTS_HMAC_SHA1_96;
    use crate::test_utils::{client_name, service_ticket, REALM};

    #[derive(Default)]
    struct CountingClient {
        logins: usize,
        releases: usize,
    }

    impl KerberosClient for CountingClient {
        fn login(&mut self) -> Result<(), CredentialError> {
            self.logins += 1;
            Ok(())
        }

        fn service_ticket(&mut self, spn: &str) -> Result<(Ticket, SessionKey), CredentialError> {
            let (service, host) = spn.split_once('/').unwrap();
            Ok((
                service_ticket(service, host),
                SessionKey::new(AES256_CTS_HMAC_SHA1_96, vec![1; 32]),
            ))
        }

        fn domain(&self) -> &str {
            REALM
        }

        fn client_name(&self) -> PrincipalName {
            client_name()
        }

        fn release(&mut self) {
            self.releases += 1;
        }
    }

    #[test]
    fn guard_releases_once_on_drop() {
        let mut client = CountingClient::default();

        {
            let mut guard = ClientGuard::new(&mut client);
            guard.login().unwrap();
            assert_eq!(guard.domain(), REALM);
        }

        assert_eq!(client.logins, 1);
        assert_eq!(client.releases, 1);
    }

    #[test]
    fn guard_releases_on_early_return() {
        fn failing(client: &mut CountingClient) -> Result<(), CredentialError> {
            let mut guard = ClientGuard::new(client);
            guard.login()?;
            Err(CredentialError::NotLoggedIn)
        }

        let mut client = CountingClient::default();

        assert!(failing(&mut client).is_err());
        assert_eq!(client.releases, 1);
    }
}
