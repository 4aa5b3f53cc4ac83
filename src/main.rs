//! Binary entrypoint for the Meshgate CLI.
//!
//! Commands:
//! - `start` - run the gateway on the console transport (`node_id: text` lines on stdin)
//! - `init` - create a starter `config.toml`
//! - `status` - print the configuration summary and the rendered main menu
//!
//! See the library crate docs for module-level details: `meshgate::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use std::sync::Arc;

use meshgate::config::Config;
use meshgate::gateway::{GatewayServer, MessageRouter, PluginRegistry};
use meshgate::plugins::register_builtin;
use meshgate::transport::{ConsoleSink, ConsoleTransport};

#[derive(Parser)]
#[command(name = "meshgate")]
#[command(about = "A numbered-menu plugin gateway for Meshtastic mesh networks")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway on the console transport
    Start {
        /// Node id used for stdin lines without a `node_id:` prefix
        #[arg(long, default_value = meshgate::transport::console::DEFAULT_NODE)]
        node: String,
    },
    /// Write a default configuration file
    Init,
    /// Show configuration summary and the main menu
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { node } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            config.validate()?;
            info!("Starting Meshgate v{}", env!("CARGO_PKG_VERSION"));

            let mut registry = PluginRegistry::new();
            register_builtin(&config, &mut registry)?;

            let server = GatewayServer::new(&config, registry, Arc::new(ConsoleSink::new()))?;
            info!("Reading `node_id: text` lines from stdin (default node {})", node);
            server.run(ConsoleTransport::with_default_node(&node)).await?;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new gateway configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            config.validate()?;
            show_status(&config)?;
        }
    }

    Ok(())
}

fn show_status(config: &Config) -> Result<()> {
    let mut registry = PluginRegistry::new();
    register_builtin(config, &mut registry)?;
    let router = MessageRouter::new(config, registry)?;

    let server = &config.server;
    let security = &config.security;
    println!("Meshgate v{}", env!("CARGO_PKG_VERSION"));
    println!("Max message size: {} bytes", server.max_message_size);
    println!(
        "Sessions: timeout {}m, cleanup every {}m, max {}",
        server.session_timeout_minutes,
        server.session_cleanup_interval_minutes,
        if server.max_sessions == 0 {
            "unlimited".to_string()
        } else {
            server.max_sessions.to_string()
        }
    );
    println!("Plugin timeout: {}s", server.plugin_timeout_seconds);
    println!(
        "Admission: {} allowlisted, {} denylisted, allowlist {}",
        security.node_allowlist.len(),
        security.node_denylist.len(),
        if security.require_allowlist { "required" } else { "optional" }
    );
    if security.rate_limit_enabled {
        println!(
            "Rate limit: {} messages / {}s",
            security.rate_limit_messages, security.rate_limit_window_seconds
        );
    } else {
        println!("Rate limit: disabled");
    }
    println!();
    println!("{}", router.render_menu());
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
    let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());

    let write_mutex = log_file.map(|f| std::sync::Arc::new(std::sync::Mutex::new(f)));
    // Log records go to stderr; replies own stdout.
    let to_console = write_mutex.is_none() || atty::is(atty::Stream::Stderr);

    builder.format(move |fmt, record| {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let line = format!("{} [{}] {}", ts, record.level(), record.args());

        if let Some(ref file) = write_mutex {
            if let Ok(mut guard) = file.lock() {
                let _ = writeln!(guard, "{}", line);
            }
        }
        append_security_record(record.target(), &line, security_path.as_deref());

        if to_console {
            writeln!(fmt, "{}", line)
        } else {
            Ok(())
        }
    });
    let _ = builder.try_init();
}

/// Copy a `security` target record to the security log, if one is configured.
fn append_security_record(target: &str, line: &str, path: Option<&str>) {
    use std::io::Write;
    if target != "security" {
        return;
    }
    if let Some(path) = path {
        if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_records_are_copied_without_main_log_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("security.log");
        let path_str = path.to_str().unwrap();

        append_security_record("security", "denied !bad", Some(path_str));
        append_security_record("meshgate::gateway::router", "routine", Some(path_str));
        append_security_record("security", "dropped", None);
        append_security_record("security", "limited !a", Some(path_str));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "denied !bad\nlimited !a\n");
    }
}
