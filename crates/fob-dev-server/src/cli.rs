//! Command-line interface of the `fob-dev` binary.

use crate::config::CliOverrides;
use clap::Parser;
use fob_multi_compiler::TargetConfig;
use std::path::PathBuf;

/// fob-dev - Multi-target development server
#[derive(Parser, Debug)]
#[command(
    name = "fob-dev",
    version,
    about = "Multi-target development server with hot module replacement",
    long_about = "Serves build artifacts for several deployment targets at once.\n\
                  Each target's output directory is watched; requests made while a\n\
                  build is running wait for it to finish."
)]
pub struct Cli {
    /// Port to listen on [default: 8081]
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Interface to bind [default: 127.0.0.1]
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Config file (defaults to fob.dev.json in the working directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Build target as NAME or NAME=OUTPUT_DIR (repeatable)
    ///
    /// Without a directory the target's output is read from build/NAME.
    /// Targets given here replace the ones in the config file.
    #[arg(short, long = "target", value_name = "NAME[=DIR]", value_parser = parse_target)]
    pub targets: Vec<TargetConfig>,

    /// Directory relative output directories are resolved against
    #[arg(long, value_name = "DIR")]
    pub root_dir: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Cli {
    /// Values that override file and environment configuration.
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            host: self.host.clone(),
            port: self.port,
            root_dir: self.root_dir.clone(),
            targets: self.targets.clone(),
        }
    }
}

/// Parse `NAME` or `NAME=DIR` into a target.
pub fn parse_target(s: &str) -> Result<TargetConfig, String> {
    let (name, dir) = match s.split_once('=') {
        Some((name, dir)) => (name.trim(), dir.trim()),
        None => (s.trim(), ""),
    };

    if name.is_empty() {
        return Err("Target name cannot be empty".to_string());
    }

    let output_dir = if dir.is_empty() {
        PathBuf::from("build").join(name)
    } else {
        PathBuf::from(dir)
    };

    Ok(TargetConfig::new(name, output_dir))
}
