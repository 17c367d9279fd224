use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};

use crate::SerializableSecretString;
use crate::shared::ValidationError;

/// Configuration for connecting to the MySQL server holding the history table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct MySqlConnectionConfig {
    /// Hostname or IP address of the MySQL server.
    pub host: String,
    /// Port number on which the MySQL server is listening.
    pub port: u16,
    /// Default database of the connection. Statements always qualify the history schema, so
    /// this is only needed when the account requires one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Username for authenticating with the MySQL server.
    pub username: String,
    /// Password for the specified user. This field is sensitive and redacted in debug output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<SerializableSecretString>,
    /// Maximum time, in seconds, to wait for the connection handshake.
    pub connect_timeout_secs: u64,
    /// Maximum time, in seconds, a single statement may run before the session fails.
    pub statement_timeout_secs: u64,
    /// TLS configuration for secure connections.
    pub tls: TlsConfig,
}

impl Default for MySqlConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 3306,
            name: None,
            username: "tungsten".to_owned(),
            password: None,
            connect_timeout_secs: 30,
            statement_timeout_secs: 3600,
            tls: TlsConfig::default(),
        }
    }
}

impl MySqlConnectionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::EmptyDatabaseHost);
        }

        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::TimeoutZero("database.connect_timeout_secs"));
        }

        if self.statement_timeout_secs == 0 {
            return Err(ValidationError::TimeoutZero("database.statement_timeout_secs"));
        }

        self.tls.validate()
    }

    /// Builds the [`MySqlConnectOptions`] for a single session connection.
    pub fn connect_options(&self) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username);

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        if let Some(name) = &self.name {
            options = options.database(name);
        }

        if self.tls.enabled {
            options
                .ssl_mode(MySqlSslMode::VerifyIdentity)
                .ssl_ca_from_pem(self.tls.trusted_root_certs.clone().into_bytes())
        } else {
            options.ssl_mode(MySqlSslMode::Preferred)
        }
    }
}

/// TLS settings for secure MySQL connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct TlsConfig {
    /// PEM-encoded trusted root certificates.
    pub trusted_root_certs: String,
    /// Whether TLS is enabled for the connection.
    pub enabled: bool,
}

impl TlsConfig {
    /// Validates the [`TlsConfig`].
    ///
    /// Returns [`ValidationError::MissingTrustedRootCerts`] if TLS is enabled but no
    /// certificates are provided.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.enabled && self.trusted_root_certs.is_empty() {
            return Err(ValidationError::MissingTrustedRootCerts);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tls_requires_root_certs() {
        let config = MySqlConnectionConfig {
            tls: TlsConfig {
                trusted_root_certs: String::new(),
                enabled: true,
            },
            ..Default::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::MissingTrustedRootCerts)
        );
    }

    #[test]
    fn zero_connect_timeout_is_rejected() {
        let config = MySqlConnectionConfig {
            connect_timeout_secs: 0,
            ..Default::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::TimeoutZero("database.connect_timeout_secs"))
        );
    }

    #[test]
    fn zero_statement_timeout_is_rejected() {
        let config = MySqlConnectionConfig {
            statement_timeout_secs: 0,
            ..Default::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::TimeoutZero(
                "database.statement_timeout_secs"
            ))
        );
    }
}
