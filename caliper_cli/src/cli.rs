// caliper_cli/src/cli.rs

use clap::Parser;
use std::path::PathBuf;

/// Caliper: metric measurements from image points and phone sensors.
///
/// Replays a recorded measurement session (sensor samples, calibration and
/// measurement requests) through the measurement engine and prints the
/// results.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the session TOML file to run.
    #[arg(short, long, default_value = "assets/sessions/credit_card.toml")]
    pub session: PathBuf,

    /// Print the report as JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Print the effective session (file plus CALIPER_* overrides) as TOML and exit.
    #[arg(long, default_value_t = false)]
    pub dump_config: bool,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let cli = Cli::parse_from(["caliper", "--session", "s.toml", "--json", "-vv"]);
        assert_eq!(cli.session, PathBuf::from("s.toml"));
        assert!(cli.json);
        assert_eq!(cli.log_filter(), "trace");

        let defaults = Cli::parse_from(["caliper"]);
        assert!(!defaults.json);
        assert_eq!(defaults.log_filter(), "info");
    }
}
