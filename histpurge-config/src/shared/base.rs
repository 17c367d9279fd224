use thiserror::Error;

/// Maximum length of a MySQL identifier, in characters.
const MAX_IDENTIFIER_LENGTH: usize = 64;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// The delete batch size must be a positive integer.
    #[error("`purge.batch_size` cannot be zero")]
    BatchSizeZero,
    /// The target node identifier was set but is empty.
    #[error("`purge.node` cannot be empty")]
    EmptyNode,
    /// A timeout setting is zero.
    #[error("`{0}` cannot be zero")]
    TimeoutZero(&'static str),
    /// The database host is empty.
    #[error("`database.host` cannot be empty")]
    EmptyDatabaseHost,
    /// The cluster control console path is empty.
    #[error("`cluster.cctrl_path` cannot be empty")]
    EmptyCctrlPath,
    /// A schema, table or column name is not a plain SQL identifier.
    #[error("`{field}` is not a valid identifier: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
}

/// Checks that `value` is a plain identifier which can be safely back-quoted into a statement.
///
/// Only ASCII letters, digits, `_` and `$` are accepted, which is the unquoted identifier
/// alphabet of MySQL.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), ValidationError> {
    let valid = !value.is_empty()
        && value.len() <= MAX_IDENTIFIER_LENGTH
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if !valid {
        return Err(ValidationError::InvalidIdentifier {
            field,
            value: value.to_owned(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_identifier("history.schema", "tungsten_alpha").is_ok());
        assert!(validate_identifier("history.table", "trep$history2").is_ok());
    }

    #[test]
    fn rejects_identifiers_that_need_quoting() {
        for value in ["", "my table", "hist`ory", "a;drop", "naïve", &"x".repeat(65)] {
            let err = validate_identifier("history.table", value).unwrap_err();
            assert_eq!(
                err,
                ValidationError::InvalidIdentifier {
                    field: "history.table",
                    value: value.to_owned(),
                }
            );
        }
    }
}
