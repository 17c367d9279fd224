use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Variable selecting the environment, read once at startup.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

const PROD_ENV_NAME: &str = "prod";
const STAGING_ENV_NAME: &str = "staging";
const DEV_ENV_NAME: &str = "dev";

/// Extension of the environment specific configuration file.
const CONFIG_FILE_EXTENSION: &str = "yaml";

/// `APP_ENVIRONMENT` holds a value that names no known environment.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{0}` is not a supported environment, expected `prod`, `staging` or `dev`")]
pub struct UnknownEnvironment(String);

/// Deployment the controller runs in.
///
/// Selects the configuration file layered over `base.yaml` and whether console output is
/// colored. Database hosts run the controller from cron, so anything that is not `dev` is
/// treated as unattended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Prod,
    Staging,
    Dev,
}

impl Environment {
    /// Reads `APP_ENVIRONMENT`, falling back to [`Environment::Prod`] when it is unset.
    pub fn load() -> Result<Environment, UnknownEnvironment> {
        match std::env::var(APP_ENVIRONMENT_ENV_NAME) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Environment::Prod),
        }
    }

    /// Name of the configuration file applied on top of `base.yaml`.
    pub fn config_file_name(&self) -> String {
        format!("{self}.{CONFIG_FILE_EXTENSION}")
    }

    /// Returns `true` for the cron-driven deployments, prod and staging.
    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod | Self::Staging)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Environment::Prod => PROD_ENV_NAME,
            Environment::Staging => STAGING_ENV_NAME,
            Environment::Dev => DEV_ENV_NAME,
        };

        f.write_str(name)
    }
}

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    /// Surrounding whitespace and case are ignored, `APP_ENVIRONMENT=Staging` selects
    /// `staging.yaml`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            PROD_ENV_NAME => Ok(Self::Prod),
            STAGING_ENV_NAME => Ok(Self::Staging),
            DEV_ENV_NAME => Ok(Self::Dev),
            _ => Err(UnknownEnvironment(value.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_matched_loosely() {
        assert_eq!("PROD".parse(), Ok(Environment::Prod));
        assert_eq!(" Staging ".parse(), Ok(Environment::Staging));
        assert_eq!("dev".parse(), Ok(Environment::Dev));
        assert_eq!(
            "qa".parse::<Environment>(),
            Err(UnknownEnvironment("qa".to_owned()))
        );
    }

    #[test]
    fn each_environment_has_its_own_config_file() {
        assert_eq!(Environment::Prod.config_file_name(), "prod.yaml");
        assert_eq!(Environment::Dev.config_file_name(), "dev.yaml");
    }

    #[test]
    fn staging_counts_as_prod() {
        assert!(Environment::Staging.is_prod());
        assert!(!Environment::Dev.is_prod());
    }
}
