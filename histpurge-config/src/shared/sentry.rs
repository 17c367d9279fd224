use serde::{Deserialize, Serialize};

/// Sentry error tracking configuration.
///
/// When present, fatal purge session errors are reported to Sentry in addition to the
/// audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentryConfig {
    /// Sentry DSN (Data Source Name) for error reporting.
    pub dsn: String,
}
