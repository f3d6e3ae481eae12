mod config;
mod replay_cmd;
mod rules_cmd;
mod run_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use quietrun_core::Renderer;

use config::{CliOverrides, QuietrunConfig};

#[derive(Parser)]
#[command(
    name = "quietrun",
    version,
    about = "Run noisy deployment scripts and show only their progress"
)]
struct Cli {
    /// Rule table TOML file (overrides QUIETRUN_RULES and the config file)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default quietrun config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Run a program and render its output as progress
    Run {
        /// Forward the program's output unchanged
        #[arg(short, long)]
        verbose: bool,
        /// Style progress lines with ANSI colors
        #[arg(long)]
        color: bool,
        /// Print per-step timings after the program exits
        #[arg(long)]
        summary: bool,
        /// Program to run, followed by its arguments (use `--` before them)
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Classify a captured log file (`-` for stdin)
    Replay {
        /// Style progress lines with ANSI colors
        #[arg(long)]
        color: bool,
        /// Print per-step timings at the end
        #[arg(long)]
        summary: bool,
        /// Log file to replay
        file: PathBuf,
    },
    /// List the effective rule table
    Rules,
}

/// Execute the `quietrun init` command: write config file.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile::default();
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  output.verbose = {}", cfg.output.verbose);
    println!("  output.color = {}", cfg.output.color);
    println!("  rules.path = (built-in deployment rules)");

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Diagnostics go to stderr and stay quiet by default so they never mix
    // with progress output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cmd_init(force)?;
        }
        Commands::Run {
            verbose,
            color,
            summary,
            command,
        } => {
            let resolved = QuietrunConfig::resolve(&CliOverrides {
                verbose,
                color,
                rules: cli.rules,
            })?;
            let rules = Arc::new(resolved.load_rules()?);
            let (program, args) = command
                .split_first()
                .context("no program given to run")?;

            let outcome = run_cmd::run_command(&resolved, rules, program, args, summary).await?;
            let code = outcome.process_exit_code();
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Replay {
            color,
            summary,
            file,
        } => {
            let resolved = QuietrunConfig::resolve(&CliOverrides {
                verbose: false,
                color,
                rules: cli.rules,
            })?;
            let rules = Arc::new(resolved.load_rules()?);
            let mut out = std::io::stdout().lock();
            replay_cmd::run_replay(
                &file,
                rules,
                Renderer::with_color(resolved.color),
                summary,
                &mut out,
            )?;
        }
        Commands::Rules => {
            let resolved = QuietrunConfig::resolve(&CliOverrides {
                rules: cli.rules,
                ..Default::default()
            })?;
            let table = resolved.load_rules()?;
            let mut out = std::io::stdout().lock();
            rules_cmd::write_rules(&mut out, &resolved.rules_source(), &table)?;
        }
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_takes_program_and_hyphenated_args() {
        let cli = Cli::try_parse_from([
            "quietrun", "run", "-v", "--summary", "--", "deploy.sh", "--env", "stage",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                verbose,
                summary,
                color,
                command,
            } => {
                assert!(verbose);
                assert!(summary);
                assert!(!color);
                assert_eq!(command, ["deploy.sh", "--env", "stage"]);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_a_program() {
        assert!(Cli::try_parse_from(["quietrun", "run"]).is_err());
    }

    #[test]
    fn rules_flag_is_global() {
        let cli = Cli::try_parse_from(["quietrun", "rules", "--rules", "/tmp/r.toml"]).unwrap();
        assert_eq!(cli.rules, Some(PathBuf::from("/tmp/r.toml")));
        assert!(matches!(cli.command, Commands::Rules));
    }
}
