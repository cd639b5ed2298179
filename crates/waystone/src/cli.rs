//! Command-line interface for the Waystone console host.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

pub const DEFAULT_CONFIG: &str = "waystone.toml";

/// Options given on the command line. Everything except the config path
/// overrides the matching setting in the config file.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub data_dir: Option<PathBuf>,
    pub world_name: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl CliArgs {
    pub fn command() -> Command {
        Command::new("waystone")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Runs the Waystone teleport plugin on a console-driven local server")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value(DEFAULT_CONFIG),
            )
            .arg(
                Arg::new("data-dir")
                    .short('d')
                    .long("data-dir")
                    .value_name("DIR")
                    .help("Directory plugin data is stored under"),
            )
            .arg(
                Arg::new("world")
                    .short('w')
                    .long("world")
                    .value_name("NAME")
                    .help("World name, selects the per-world player data"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG)),
            data_dir: matches.get_one::<String>("data-dir").map(PathBuf::from),
            world_name: matches.get_one::<String>("world").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_from(args: &[&str]) -> CliArgs {
        CliArgs::from_matches(&CliArgs::command().get_matches_from(args))
    }

    #[test]
    fn test_defaults() {
        let args = parse_from(&["waystone"]);
        assert_eq!(args.config_path, PathBuf::from("waystone.toml"));
        assert!(args.data_dir.is_none());
        assert!(args.world_name.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn test_overrides() {
        let args = parse_from(&[
            "waystone", "-c", "alt.toml", "-d", "/srv/data", "-w", "nether", "-l", "debug",
            "--json-logs",
        ]);
        assert_eq!(args.config_path, PathBuf::from("alt.toml"));
        assert_eq!(args.data_dir, Some(PathBuf::from("/srv/data")));
        assert_eq!(args.world_name.as_deref(), Some("nether"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }
}
