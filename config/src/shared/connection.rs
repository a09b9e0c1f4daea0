use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::shared::ValidationError;

/// Application name reported to Postgres by every relabeling connection.
pub const APPLICATION_NAME: &str = "relabeler";

/// Session settings applied to every connection so that text renderings are stable.
const SESSION_OPTIONS: &[(&str, &str)] = &[
    ("datestyle", "ISO"),
    ("intervalstyle", "postgres"),
    ("client_encoding", "UTF8"),
];

/// Connection settings for the Postgres record store.
///
/// Only [`Deserialize`] is implemented, since serializing the password would leak it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Name of the database holding the `relabel.records` table.
    pub name: String,
    pub username: String,
    /// Redacted in debug output.
    pub password: Option<SecretString>,
    #[serde(default)]
    pub tls: TlsConfig,
}

impl PgConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.tls.validate()
    }
}

/// TLS settings for Postgres connections.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    #[serde(default)]
    pub trusted_root_certs: String,
    #[serde(default)]
    pub enabled: bool,
}

impl TlsConfig {
    /// Returns [`ValidationError::MissingTrustedRootCerts`] when TLS is enabled without roots.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

/// Converts connection settings into driver specific connect options.
pub trait IntoConnectOptions<Output> {
    /// Options targeting the server without selecting a database, used to create or drop
    /// databases.
    fn without_db(&self) -> Output;

    /// Options targeting the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<PgConnectOptions> for PgConnectionConfig {
    fn without_db(&self) -> PgConnectOptions {
        let ssl_mode = if self.tls.enabled {
            PgSslMode::VerifyFull
        } else {
            PgSslMode::Prefer
        };

        let mut options = PgConnectOptions::new_without_pgpass()
            .application_name(APPLICATION_NAME)
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .ssl_mode(ssl_mode)
            .options(SESSION_OPTIONS.iter().copied());

        if self.tls.enabled {
            options =
                options.ssl_root_cert_from_pem(self.tls.trusted_root_certs.as_bytes().to_vec());
        }

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    fn with_db(&self) -> PgConnectOptions {
        let options: PgConnectOptions = self.without_db();
        options.database(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_config(tls_enabled: bool) -> PgConnectionConfig {
        PgConnectionConfig {
            host: "localhost".to_string(),
            port: 5432,
            name: "records".to_string(),
            username: "postgres".to_string(),
            password: Some(SecretString::new("hunter2".to_string())),
            tls: TlsConfig {
                trusted_root_certs: String::new(),
                enabled: tls_enabled,
            },
        }
    }

    #[test]
    fn tls_without_roots_is_rejected() {
        assert_eq!(
            connection_config(true).validate(),
            Err(ValidationError::MissingTrustedRootCerts)
        );
        assert_eq!(connection_config(false).validate(), Ok(()));
    }

    #[test]
    fn connect_options_select_database() {
        let options: PgConnectOptions = connection_config(false).with_db();
        assert_eq!(options.get_database(), Some("records"));
        assert_eq!(options.get_host(), "localhost");
        assert_eq!(options.get_port(), 5432);
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        let rendered = format!("{:?}", connection_config(false));
        assert!(!rendered.contains("hunter2"));
    }
}
