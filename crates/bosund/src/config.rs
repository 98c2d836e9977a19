//! Startup configuration.
//!
//! Every flag can also come from a `BOSUND_*` environment variable, so the
//! agent deploys cleanly both as a CLI invocation and as a service unit with
//! an environment file.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Bosun build agent daemon.
#[derive(Debug, Parser)]
#[command(name = "bosund")]
#[command(version)]
#[command(about = "Bosun build agent", long_about = None)]
pub struct AgentConfig {
    /// Address to listen on for master connections.
    #[arg(long, env = "BOSUND_LISTEN", default_value = "127.0.0.1:7300")]
    pub listen: SocketAddr,

    /// Shared access token a master must present.
    #[arg(long, env = "BOSUND_TOKEN")]
    pub token: String,

    /// Labels under which this agent's runners are advertised.
    #[arg(long, env = "BOSUND_LABELS", value_delimiter = ',', required = true)]
    pub labels: Vec<String>,

    /// Root directory holding per-project workspaces.
    #[arg(long, env = "BOSUND_WORKSPACE")]
    pub workspace: PathBuf,

    /// Number of build scripts allowed to run concurrently.
    #[arg(long, env = "BOSUND_EXECUTORS", default_value_t = default_executors())]
    pub executors: usize,

    /// Emit JSON-formatted log lines.
    #[arg(long, env = "BOSUND_LOG_JSON")]
    pub json: bool,
}

/// Default executor count: one per available processing unit.
pub fn default_executors() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "bosund",
            "--token",
            "secret",
            "--labels",
            "linux,fast",
            "--workspace",
            "/var/lib/bosun",
        ]
    }

    #[test]
    fn parses_minimal_invocation() {
        let config = AgentConfig::try_parse_from(base_args()).unwrap();
        assert_eq!(config.token, "secret");
        assert_eq!(config.labels, vec!["linux", "fast"]);
        assert_eq!(config.workspace, PathBuf::from("/var/lib/bosun"));
        assert!(config.executors >= 1);
        assert!(!config.json);
    }

    #[test]
    fn executors_can_be_overridden() {
        let mut args = base_args();
        args.extend(["--executors", "3"]);
        let config = AgentConfig::try_parse_from(args).unwrap();
        assert_eq!(config.executors, 3);
    }

    #[test]
    fn token_is_required() {
        let args = vec!["bosund", "--labels", "linux", "--workspace", "/tmp/ws"];
        assert!(AgentConfig::try_parse_from(args).is_err());
    }

    #[test]
    fn default_executors_is_positive() {
        assert!(default_executors() >= 1);
    }
}
