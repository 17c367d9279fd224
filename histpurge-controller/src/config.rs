use histpurge_config::load_config;
use histpurge_config::shared::{LoggingConfig, PurgeControllerConfig};

use crate::AppArgs;

/// Loads the [`PurgeControllerConfig`], applies the command line flags on top of it and
/// validates the result.
pub fn load_controller_config(args: &AppArgs) -> anyhow::Result<PurgeControllerConfig> {
    let mut config = load_config::<PurgeControllerConfig>(&args.config_dir)?;
    apply_cli_overrides(&mut config, args);
    config.validate()?;

    Ok(config)
}

/// Directory of the audit log when the configuration could not be loaded: `--log-dir` if
/// given, the built-in default otherwise.
pub fn startup_log_dir(args: &AppArgs) -> String {
    args.log_dir
        .clone()
        .unwrap_or_else(|| LoggingConfig::default().log_dir)
}

/// Command line flags take precedence over files and `APP_` environment variables. Switches
/// can only turn a setting on.
fn apply_cli_overrides(config: &mut PurgeControllerConfig, args: &AppArgs) {
    if let Some(retention_days) = args.retention_days {
        config.purge.retention_days = retention_days;
    }
    if let Some(batch_size) = args.batch_size {
        config.purge.batch_size = batch_size;
    }
    if let Some(node) = &args.node {
        config.purge.node = Some(node.clone());
    }
    config.purge.isolate |= args.isolate;
    config.purge.estimate |= args.estimate;

    let db_args = &args.db_args;
    if let Some(host) = &db_args.db_host {
        config.database.host = host.clone();
    }
    if let Some(port) = db_args.db_port {
        config.database.port = port;
    }
    if let Some(name) = &db_args.db_name {
        config.database.name = Some(name.clone());
    }
    if let Some(username) = &db_args.db_username {
        config.database.username = username.clone();
    }
    if let Some(password) = &db_args.db_password {
        config.database.password = Some(password.clone().into());
    }

    if let Some(log_dir) = &args.log_dir {
        config.logging.log_dir = log_dir.clone();
    }
    config.logging.verbose |= args.verbose;
}
