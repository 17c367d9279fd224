use histpurge_config::shared::ClusterControlConfig;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::cluster::ClusterControlClient;
use crate::error::{ErrorKind, PurgeResult};
use crate::types::{PolicyMode, ReplicatorState};
use crate::{bail, purge_error};

/// Marker of the coordinator line in the `ls` listing, e.g. `COORDINATOR[db1:AUTOMATIC:ONLINE]`.
const COORDINATOR_MARKER: &str = "COORDINATOR[";

/// Heading after which the `ls` listing describes one block per datasource.
const DATASOURCES_HEADING: &str = "DATASOURCES:";

/// Marker of the replicator line inside a datasource block.
const REPLICATOR_MARKER: &str = "REPLICATOR(";

/// Key of the run-state inside the replicator line.
const STATE_KEY: &str = "state=";

/// Prefix the console uses for failed commands, which still exit with status zero.
const ERROR_PREFIX: &str = "ERROR";

/// [`ClusterControlClient`] driving the `cctrl` console.
///
/// Each call starts the console, writes a single command on its standard input and parses
/// the text it prints. All knowledge of the console output format lives in this module.
#[derive(Debug, Clone)]
pub struct CctrlClient {
    program: String,
    args: Vec<String>,
    command_timeout: Duration,
}

impl CctrlClient {
    pub fn new(config: &ClusterControlConfig) -> Self {
        Self {
            program: config.cctrl_path.clone(),
            args: config.args.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    /// Runs `command` in a fresh console and returns its standard output.
    ///
    /// The console is killed if the returned future is dropped, which happens when the
    /// session is interrupted while a command is in flight.
    async fn run(&self, command: &str) -> PurgeResult<String> {
        debug!(command, "sending cluster control command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                purge_error!(
                    ErrorKind::ControlError,
                    "Failed to start the cluster control console",
                    format!("{}: {err}", self.program)
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = format!("{command}\n");
            stdin.write_all(input.as_bytes()).await.map_err(|err| {
                purge_error!(
                    ErrorKind::ControlError,
                    "Failed to send command to the cluster control console",
                    format!("`{command}`: {err}")
                )
            })?;
            // Dropping stdin closes it, which ends the console session.
        }

        let output = match tokio::time::timeout(self.command_timeout, child.wait_with_output())
            .await
        {
            Ok(output) => output?,
            Err(_) => bail!(
                ErrorKind::ControlTimeout,
                "Cluster control command timed out",
                format!(
                    "`{command}` gave no answer after {}s",
                    self.command_timeout.as_secs()
                )
            ),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            bail!(
                ErrorKind::ControlError,
                "Cluster control command failed",
                format!(
                    "`{command}` exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )
            );
        }

        if let Some(line) = stdout
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with(ERROR_PREFIX))
        {
            bail!(
                ErrorKind::ControlError,
                "Cluster control command failed",
                format!("`{command}`: {line}")
            );
        }

        Ok(stdout)
    }
}

impl ClusterControlClient for CctrlClient {
    async fn policy_mode(&self) -> PurgeResult<PolicyMode> {
        let listing = self.run("ls").await?;

        parse_policy_mode(&listing)
    }

    async fn replicator_state(&self, node: &str) -> PurgeResult<ReplicatorState> {
        let listing = self.run("ls").await?;

        parse_replicator_state(&listing, node)
    }

    async fn set_policy_mode(&self, mode: &PolicyMode) -> PurgeResult<()> {
        let command = format!("set policy {}", mode.to_string().to_lowercase());
        self.run(&command).await?;

        Ok(())
    }

    async fn set_replicator_state(&self, node: &str, state: &ReplicatorState) -> PurgeResult<()> {
        let command = format!("replicator {node} {}", state.to_string().to_lowercase());
        self.run(&command).await?;

        Ok(())
    }
}

/// Extracts the policy mode from the coordinator line of an `ls` listing.
pub fn parse_policy_mode(listing: &str) -> PurgeResult<PolicyMode> {
    let coordinator = listing
        .lines()
        .find_map(|line| {
            let start = line.find(COORDINATOR_MARKER)? + COORDINATOR_MARKER.len();
            let rest = &line[start..];
            let end = rest.find(']')?;

            Some(&rest[..end])
        })
        .ok_or_else(|| {
            purge_error!(
                ErrorKind::ControlParseError,
                "Coordinator line missing from cluster listing"
            )
        })?;

    // The coordinator line reads `host:MODE:state`.
    match coordinator.split(':').nth(1) {
        Some(mode) if !mode.trim().is_empty() => Ok(PolicyMode::parse(mode)),
        _ => bail!(
            ErrorKind::ControlParseError,
            "Coordinator line has no policy mode",
            coordinator
        ),
    }
}

/// Returns the host named by a datasource header line such as `|db1(slave:ONLINE, ...)`.
fn datasource_header(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix('|')?;
    let (host, _) = rest.split_once('(')?;

    if host.is_empty() || host.contains(char::is_whitespace) {
        return None;
    }

    Some(host)
}

/// Extracts the run-state from the replicator line of `node`'s datasource block.
pub fn parse_replicator_state(listing: &str, node: &str) -> PurgeResult<ReplicatorState> {
    let mut lines = listing
        .lines()
        .skip_while(|line| !line.trim().starts_with(DATASOURCES_HEADING));

    if !lines.any(|line| datasource_header(line) == Some(node)) {
        bail!(
            ErrorKind::ControlParseError,
            "Node missing from cluster listing",
            node
        );
    }

    for line in lines {
        if datasource_header(line).is_some() {
            break;
        }

        let Some(start) = line.find(REPLICATOR_MARKER) else {
            continue;
        };
        let replicator = &line[start + REPLICATOR_MARKER.len()..];

        let Some(state_start) = replicator.find(STATE_KEY) else {
            break;
        };
        let state = &replicator[state_start + STATE_KEY.len()..];
        let state_end = state.find([',', ')']).unwrap_or(state.len());
        let state = state[..state_end].trim();

        if state.is_empty() {
            break;
        }

        return Ok(ReplicatorState::parse(state));
    }

    bail!(
        ErrorKind::ControlParseError,
        "Replicator state missing from cluster listing",
        node
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
Tungsten Clustering 7.1.2 build 3
alpha: session established
[LOGICAL:EXPERT] /alpha > ls

COORDINATOR[db1:AUTOMATIC:ONLINE]

ROUTERS:
+----------------------------------------------------------------------------+
|connector@db1[11287](ONLINE, created=19, active=0)                          |
+----------------------------------------------------------------------------+

DATASOURCES:
+----------------------------------------------------------------------------+
|db1(master:ONLINE, progress=8123, THL latency=0.512)                        |
|STATUS [OK] [2026/10/15 02:10:41 AM UTC]                                    |
+----------------------------------------------------------------------------+
|  MANAGER(state=ONLINE)                                                     |
|  REPLICATOR(role=master, state=ONLINE)                                     |
|  DATASERVER(state=ONLINE)                                                  |
|  CONNECTIONS(created=19, active=0)                                         |
+----------------------------------------------------------------------------+

+----------------------------------------------------------------------------+
|db2(slave:ONLINE, progress=8123, latency=0.620)                             |
|STATUS [OK] [2026/10/15 02:10:42 AM UTC]                                    |
+----------------------------------------------------------------------------+
|  MANAGER(state=ONLINE)                                                     |
|  REPLICATOR(role=slave, master=db1, state=OFFLINE)                         |
|  DATASERVER(state=ONLINE)                                                  |
|  CONNECTIONS(created=0, active=0)                                          |
+----------------------------------------------------------------------------+
"#;

    #[test]
    fn parses_policy_mode_from_coordinator_line() {
        assert_eq!(parse_policy_mode(LISTING).unwrap(), PolicyMode::Automatic);

        let manual = LISTING.replace("db1:AUTOMATIC:ONLINE", "db1:MANUAL:ONLINE");
        assert_eq!(parse_policy_mode(&manual).unwrap(), PolicyMode::Manual);
    }

    #[test]
    fn missing_coordinator_is_a_parse_error() {
        let err = parse_policy_mode("DATASOURCES:\n").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ControlParseError);
    }

    #[test]
    fn parses_replicator_state_of_each_node() {
        assert_eq!(
            parse_replicator_state(LISTING, "db1").unwrap(),
            ReplicatorState::Online
        );
        assert_eq!(
            parse_replicator_state(LISTING, "db2").unwrap(),
            ReplicatorState::Offline
        );
    }

    #[test]
    fn router_lines_do_not_match_nodes() {
        // `connector@db1[...]` appears before DATASOURCES and must never be taken for db1.
        let err = parse_replicator_state(LISTING, "connector@db1[11287]").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ControlParseError);
    }

    #[test]
    fn unknown_node_is_a_parse_error() {
        let err = parse_replicator_state(LISTING, "db3").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ControlParseError);
        assert_eq!(err.detail(), Some("db3"));
    }

    #[test]
    fn block_without_replicator_line_is_a_parse_error() {
        let listing = concat!(
            "DATASOURCES:\n",
            "|db1(master:ONLINE)\n",
            "|  MANAGER(state=ONLINE)\n",
            "|db2(slave:ONLINE)\n",
            "|  REPLICATOR(role=slave, state=ONLINE)\n",
        );
        let err = parse_replicator_state(listing, "db1").unwrap_err();

        assert_eq!(err.description(), "Replicator state missing from cluster listing");
    }

    #[test]
    fn unusual_states_are_kept_verbatim() {
        let listing = LISTING.replace(
            "role=slave, master=db1, state=OFFLINE",
            "role=slave, master=db1, state=GOING-ONLINE:SYNCHRONIZING",
        );

        assert_eq!(
            parse_replicator_state(&listing, "db2").unwrap(),
            ReplicatorState::Other("GOING-ONLINE:SYNCHRONIZING".to_owned())
        );
    }

    #[tokio::test]
    async fn console_error_lines_fail_the_command() {
        let client = CctrlClient {
            program: "sh".to_owned(),
            args: vec![
                "-c".to_owned(),
                "read cmd; echo \"ERROR: unknown command $cmd\"".to_owned(),
            ],
            command_timeout: Duration::from_secs(10),
        };

        let err = client.run("set policy bogus").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ControlError);
        assert!(err.detail().unwrap().contains("set policy bogus"));
    }

    #[tokio::test]
    async fn non_zero_exit_fails_the_command() {
        let client = CctrlClient {
            program: "sh".to_owned(),
            args: vec!["-c".to_owned(), "cat >/dev/null; exit 3".to_owned()],
            command_timeout: Duration::from_secs(10),
        };

        let err = client.run("ls").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ControlError);
        assert!(err.detail().unwrap().starts_with("`ls` exited with"));
    }

    #[tokio::test]
    async fn listing_is_parsed_from_console_output() {
        let client = CctrlClient {
            program: "sh".to_owned(),
            args: vec![
                "-c".to_owned(),
                "cat >/dev/null; printf 'COORDINATOR[db1:MAINTENANCE:ONLINE]\\n'".to_owned(),
            ],
            command_timeout: Duration::from_secs(10),
        };

        assert_eq!(
            client.policy_mode().await.unwrap(),
            PolicyMode::Maintenance
        );
    }
}
