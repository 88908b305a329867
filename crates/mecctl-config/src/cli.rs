use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use mecctl_types::model::MigrateMethod;

/// `mecctl` command-line arguments (§6 CLI).
#[derive(Parser, Debug)]
#[command(name = "mecctl")]
#[command(about = "Centralized live-migration orchestration controller")]
pub struct Args {
    /// SQLite database file; created with schema if it does not exist.
    #[arg(long, value_name = "PATH")]
    pub database_file: PathBuf,

    /// Topology profile YAML (servers + base stations) to seed the store at boot.
    #[arg(long, value_name = "PATH")]
    pub profile_file: Option<PathBuf>,

    /// Log file path; defaults to stderr when absent.
    #[arg(long, value_name = "PATH")]
    pub log: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, value_enum, default_value = "pre_copy")]
    pub migrate_method: MigrateMethodArg,

    #[arg(long, value_enum, default_value = "nearest")]
    pub planner: PlannerArg,

    /// Broker host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    pub broker_host: String,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// `--migrate_method∈{pre_copy,non_live_migration}` (§6), spelled as the CLI documents it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MigrateMethodArg {
    #[value(name = "pre_copy")]
    PreCopy,
    #[value(name = "non_live_migration")]
    NonLive,
}

impl From<MigrateMethodArg> for MigrateMethod {
    fn from(value: MigrateMethodArg) -> Self {
        match value {
            MigrateMethodArg::PreCopy => MigrateMethod::PreCopy,
            MigrateMethodArg::NonLive => MigrateMethod::NonLive,
        }
    }
}

/// `--planner∈{nearest,random,optimization,cloud}` (§6). The in-process type for the
/// fourth is `Optimised`, but the CLI token stays `optimization` per the documented flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlannerArg {
    Nearest,
    Random,
    Optimization,
    Cloud,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_args() {
        let args = Args::parse_from(["mecctl", "--database_file", "/tmp/mec.db"]);
        assert_eq!(args.planner, PlannerArg::Nearest);
        assert_eq!(args.migrate_method, MigrateMethodArg::PreCopy);
        assert!(!args.verbose);
    }

    #[test]
    fn parses_optimization_planner_token() {
        let args =
            Args::parse_from(["mecctl", "--database_file", "/tmp/mec.db", "--planner", "optimization"]);
        assert_eq!(args.planner, PlannerArg::Optimization);
    }
}
