//! AppSec configuration inspector.
//!
//! Resolves the AppSec configuration from the process environment exactly as
//! the WAF layer would at startup and prints it.

use std::io::Write;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use appsec_config::config::{is_enabled, new_config, with_rc_config, ClientConfig, ProcessEnv};
use appsec_config::observability::init_logging;

#[derive(Parser)]
#[command(name = "appsec-config")]
#[command(about = "Resolve and inspect the AppSec configuration", long_about = None)]
struct Cli {
    /// Log every resolution decision
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration as JSON
    Resolve {
        /// Also resolve the remote configuration client settings
        #[arg(long)]
        remote_config: bool,
    },
    /// Show the active security rules
    Rules {
        /// Print the compiled rules document instead of an overview
        #[arg(long)]
        raw: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let enablement = is_enabled(&ProcessEnv)?;
    if enablement.set && !enablement.enabled {
        tracing::info!("appsec: explicitly disabled by DD_APPSEC_ENABLED; resolving for inspection only");
    }

    match cli.command {
        Commands::Resolve { remote_config } => {
            let mut options = Vec::new();
            if remote_config {
                options.push(with_rc_config(ClientConfig::from_env(&ProcessEnv)));
            }
            let config = new_config(&ProcessEnv, options)?;

            let mut summary = serde_json::to_value(config.summary())?;
            if let Value::Object(map) = &mut summary {
                map.insert("enabled".into(), json!(enablement.enabled));
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Rules { raw } => {
            let config = new_config(&ProcessEnv, Vec::new())?;
            let ruleset = config.rules_manager().latest();

            if raw {
                let mut stdout = std::io::stdout().lock();
                stdout.write_all(&ruleset.raw()?)?;
                writeln!(stdout)?;
            } else {
                let ids: Vec<&str> = ruleset
                    .fragment()
                    .rules
                    .iter()
                    .chain(&ruleset.fragment().custom_rules)
                    .filter_map(|rule| rule.get("id").and_then(Value::as_str))
                    .collect();
                let overview = json!({
                    "version": ruleset.fragment().version,
                    "rules_version": ruleset.version(),
                    "revision": ruleset.revision(),
                    "rules_count": ruleset.rules_count(),
                    "rule_ids": ids,
                });
                println!("{}", serde_json::to_string_pretty(&overview)?);
            }
        }
    }

    Ok(())
}
