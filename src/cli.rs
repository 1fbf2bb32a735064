use std::path::PathBuf;

use clap::{Parser, Subcommand};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nbuild date: ",
    env!("DBLAB_BUILD_DATE"),
    "\ntarget: ",
    env!("DBLAB_BUILD_TARGET"),
    "\nprofile: ",
    env!("DBLAB_BUILD_PROFILE"),
    "\nrustc: ",
    env!("DBLAB_BUILD_RUSTC"),
);

/// Validate `--flag name=value` pairs for clone containers
fn parse_flag(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => {
            Ok((k.trim().trim_start_matches("--").to_string(), v.to_string()))
        }
        _ => Err("must be NAME=VALUE".to_string()),
    }
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CloneCmd {
    /// List all existing clones
    List,

    /// Display clone's information
    Status {
        #[arg(value_name = "CLONE_ID")]
        clone_id: Option<String>,
    },

    /// Create new clone
    Create {
        /// Database username
        #[arg(long, required = true)]
        username: String,
        /// Database password
        #[arg(long, required = true)]
        password: String,
        /// Clone ID (optional)
        #[arg(long)]
        id: Option<String>,
        /// Snapshot ID (optional)
        #[arg(long = "snapshot-id")]
        snapshot_id: Option<String>,
        /// Project name (optional)
        #[arg(long)]
        project: Option<String>,
        /// Mark instance as protected from deletion
        #[arg(long, short = 'p')]
        protected: bool,
        /// Run the command asynchronously
        #[arg(long = "async", short = 'a')]
        async_mode: bool,
    },

    /// Update existing clone
    Update {
        #[arg(value_name = "CLONE_ID")]
        clone_id: Option<String>,
        /// Mark instance as protected from deletion
        #[arg(long, short = 'p')]
        protected: bool,
    },

    /// Reset clone's state
    Reset {
        #[arg(value_name = "CLONE_ID")]
        clone_id: Option<String>,
        /// Run the command asynchronously
        #[arg(long = "async", short = 'a')]
        async_mode: bool,
    },

    /// Destroy clone
    Destroy {
        #[arg(value_name = "CLONE_ID")]
        clone_id: Option<String>,
        /// Run the command asynchronously
        #[arg(long = "async", short = 'a')]
        async_mode: bool,
    },

    /// Monitor clone state
    Observe {
        #[arg(value_name = "CLONE_ID")]
        clone_id: Option<String>,
        /// Clone database password
        #[arg(long, env = "CLONE_PASSWORD", hide_env_values = true, required = true)]
        password: String,
        /// Connection SSL mode
        #[arg(long, env = "SSLMODE", default_value = "disable")]
        sslmode: String,
        /// Follow state monitor output
        #[arg(long, short = 'f')]
        follow: bool,
        /// Interval of status sampling and output
        #[arg(long = "interval-seconds", env = "DBLAB_INTERVAL_SECONDS", default_value_t = 5)]
        interval_seconds: u64,
        /// Maximum allowed duration for locks
        #[arg(long = "max-lock-duration-seconds", env = "DBLAB_MAX_LOCK_DURATION_SECONDS")]
        max_lock_duration_seconds: Option<u64>,
        /// Maximum allowed duration for the observed operation
        #[arg(long = "max-duration-seconds", env = "DBLAB_MAX_DURATION_SECONDS")]
        max_duration_seconds: Option<u64>,
    },

    /// Summarize stored clone observation sessions
    ObserveSummary,
}

impl CloneCmd {
    /// Positional CLONE_ID for subcommands that address one clone.
    pub(crate) fn clone_id(&self) -> Option<Option<&str>> {
        match self {
            CloneCmd::Status { clone_id }
            | CloneCmd::Update { clone_id, .. }
            | CloneCmd::Reset { clone_id, .. }
            | CloneCmd::Destroy { clone_id, .. }
            | CloneCmd::Observe { clone_id, .. } => Some(clone_id.as_deref()),
            CloneCmd::List | CloneCmd::Create { .. } | CloneCmd::ObserveSummary => None,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum EngineCmd {
    /// Prepare the image, reset the socket directory and start a clone container
    Run {
        /// Clone container name
        name: String,
        /// Port published identically on host and container
        #[arg(long)]
        port: u16,
        /// Override the configured image
        #[arg(long)]
        image: Option<String>,
        /// Override the configured engine network
        #[arg(long)]
        network: Option<String>,
        /// Extra runtime flag rendered as --NAME=VALUE (repeatable)
        #[arg(long = "flag", value_parser = parse_flag)]
        flags: Vec<(String, String)>,
        /// Do not pull the image when it is missing locally
        #[arg(long = "no-pull")]
        no_pull: bool,
        /// Print the docker invocation without executing it
        #[arg(long = "dry-run")]
        dry_run: bool,
    },

    /// Stop a clone container
    Stop { name: String },

    /// Force-remove a clone container and its anonymous volumes
    Rm {
        name: String,
        /// Proceed without interactive confirmation
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// List clone containers of a pool
    Ls {
        /// Pool name (defaults to the configured pool)
        #[arg(long)]
        pool: Option<String>,
    },

    /// Show timestamped clone container logs
    Logs {
        name: String,
        /// Trailing window in minutes
        #[arg(long = "since-minutes", default_value_t = 10)]
        since_minutes: u64,
    },

    /// Run a command inside a clone container via `sh -c`
    Exec {
        name: String,
        /// Command (joined with spaces)
        #[arg(trailing_var_arg = true, required = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Report whether a clone container is running
    Status { name: String },

    /// Print the socket directory and volumes a clone would get
    Volumes {
        name: String,
        #[arg(long, default_value_t = 0)]
        port: u16,
    },

    /// Make sure an image is present locally, pulling it when missing
    PrepareImage {
        /// Image reference (defaults to the configured image)
        image: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Manage clones through the API
    Clone {
        #[command(subcommand)]
        cmd: CloneCmd,
    },

    /// Drive clone containers on this host directly
    #[command(
        after_long_help = "Examples:\n  dblab engine volumes dblab_clone_6000\n  dblab engine run dblab_clone_6000 --port 6000 --dry-run\n  dblab engine exec dblab_clone_6000 -- psql -U postgres -c 'select 1'\n"
    )]
    Engine {
        #[command(subcommand)]
        cmd: EngineCmd,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "dblab",
    version,
    long_version = LONG_VERSION,
    about = "Provision and manage disposable database clones.",
    after_help = "\n"
)]
pub(crate) struct Cli {
    /// Clone API base URL
    #[arg(long, global = true, env = "DBLAB_URL", default_value = dblab_engine::api::DEFAULT_API_URL)]
    pub(crate) url: String,

    /// Verification token for the clone API
    #[arg(long, global = true, env = "DBLAB_TOKEN", hide_env_values = true)]
    pub(crate) token: Option<String>,

    /// Engine configuration file (YAML)
    #[arg(long, global = true, env = "DBLAB_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Print detailed execution info
    #[arg(long, global = true)]
    pub(crate) verbose: bool,

    /// Colorize output: auto|always|never
    #[arg(long = "color", global = true, value_enum)]
    pub(crate) color: Option<dblab_engine::ColorMode>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(
            parse_flag("shm-size=1g"),
            Ok(("shm-size".to_string(), "1g".to_string()))
        );
        assert_eq!(
            parse_flag("--ulimit=nofile=1024"),
            Ok(("ulimit".to_string(), "nofile=1024".to_string()))
        );
        assert!(parse_flag("=x").is_err());
        assert!(parse_flag("novalue").is_err());
    }

    #[test]
    fn test_clone_id_is_optional_at_parse_time() {
        let cli = Cli::try_parse_from(["dblab", "clone", "status"]).unwrap();
        match cli.command {
            Command::Clone { cmd } => assert_eq!(cmd.clone_id(), Some(None)),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_observe_flags_and_env() {
        std::env::remove_var("CLONE_PASSWORD");
        std::env::remove_var("SSLMODE");
        std::env::remove_var("DBLAB_MAX_LOCK_DURATION_SECONDS");
        assert!(Cli::try_parse_from(["dblab", "clone", "observe", "c1"]).is_err());
        let cli = Cli::try_parse_from([
            "dblab",
            "clone",
            "observe",
            "c1",
            "--password",
            "pw",
            "--max-lock-duration-seconds",
            "10",
            "-f",
        ])
        .unwrap();
        match cli.command {
            Command::Clone {
                cmd:
                    CloneCmd::Observe {
                        password,
                        sslmode,
                        max_lock_duration_seconds,
                        follow,
                        ..
                    },
            } => {
                assert_eq!(password, "pw");
                assert_eq!(sslmode, "disable");
                assert_eq!(max_lock_duration_seconds, Some(10));
                assert!(follow);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_create_requires_credentials() {
        assert!(Cli::try_parse_from(["dblab", "clone", "create", "--username", "u"]).is_err());
        let cli = Cli::try_parse_from([
            "dblab", "clone", "create", "--username", "u", "--password", "p", "-p", "-a",
        ])
        .unwrap();
        match cli.command {
            Command::Clone {
                cmd: CloneCmd::Create {
                    protected,
                    async_mode,
                    ..
                },
            } => assert!(protected && async_mode),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
