use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;

/// Text written in place of a secret whenever configuration is serialized.
const REDACTED: &str = "[REDACTED]";

/// Database password as read from configuration files or `APP_` environment variables.
///
/// The value is only reachable through [`secrecy::ExposeSecret`]. `Debug` output and
/// serialized configuration never contain it, so a dumped configuration is safe to keep
/// next to the audit log.
#[derive(Clone, Debug)]
pub struct SerializableSecretString(SecretString);

/// Gives access to the wrapped [`SecretString`] when building connect options.
impl Deref for SerializableSecretString {
    type Target = SecretString;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Wraps a password passed on the command line.
impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

/// Wraps a password that is already held as a [`SecretString`].
impl From<SecretString> for SerializableSecretString {
    fn from(value: SecretString) -> Self {
        Self(value)
    }
}

/// Unwraps into the [`SecretString`].
impl From<SerializableSecretString> for SecretString {
    fn from(value: SerializableSecretString) -> Self {
        value.0
    }
}

/// Writes a fixed placeholder, never the password.
impl Serialize for SerializableSecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(REDACTED)
    }
}

/// Reads the password as a plain string.
impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(deserializer)?;
        Ok(Self(string.into()))
    }
}
