// caliper_cli/src/main.rs

use std::io::Write;

use anyhow::Result;
use caliper_cli::cli::Cli;
use caliper_cli::report;
use caliper_cli::session::{self, SessionConfig};
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let config = SessionConfig::load(&cli.session)?;
    if cli.dump_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let report = session::run(&config)?;
    if cli.json {
        println!("{}", report::to_json(&report)?);
    } else {
        print!("{}", report::to_text(&report));
    }
    Ok(())
}
