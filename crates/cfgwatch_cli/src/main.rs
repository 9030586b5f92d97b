//! cfgwatch CLI
//!
//! Command-line client for etcd-backed server configuration.
//!
//! # Commands
//!
//! - `config` - Set one configuration variable of a server
//! - `server` - Mirror a server's configuration and print every change

mod commands;
mod http;

use cfgwatch_store::{EtcdConfig, EtcdStore};
use clap::{Parser, Subcommand};
use commands::server::OutputFormat;
use http::ReqwestClient;
use tracing_subscriber::EnvFilter;

/// Default etcd endpoints (legacy and current client ports).
const DEFAULT_PEERS: &str = "http://127.0.0.1:4001,http://127.0.0.1:2379";

/// etcd-backed configuration client.
#[derive(Parser)]
#[command(name = "cfgwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Comma-separated etcd endpoints
    #[arg(global = true, short, long, env = "EX_PEERS", default_value = DEFAULT_PEERS)]
    peers: String,

    /// etcd user name
    #[arg(global = true, short, long, env = "EX_USER", default_value = "")]
    user: String,

    /// etcd password
    #[arg(global = true, long, env = "EX_PASS", default_value = "", hide_env_values = true)]
    pass: String,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set a configuration variable for a server
    Config {
        /// Server name
        server: String,

        /// Variable name
        var: String,

        /// New value
        val: String,
    },

    /// Mirror a server's configuration and print each snapshot
    Server {
        /// Server name
        server: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Splits a comma-separated endpoint list, dropping empty items.
fn parse_peers(peers: &str) -> Vec<String> {
    peers
        .split(',')
        .map(str::trim)
        .filter(|peer| !peer.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let endpoints = parse_peers(&cli.peers);
    if endpoints.is_empty() {
        return Err("at least one etcd endpoint is required".into());
    }
    let config = EtcdConfig::new(endpoints).with_credentials(&cli.user, &cli.pass);
    let store = EtcdStore::new(config, ReqwestClient::new()?);

    match cli.command {
        Commands::Config { server, var, val } => {
            commands::config::run(&store, &server, &var, &val).await?;
        }
        Commands::Server { server, format } => {
            commands::server::run(store, &server, format).await?;
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
    fn peers_are_split_and_trimmed() {
        assert_eq!(
            parse_peers(" http://a:2379, ,http://b:2379,"),
            vec!["http://a:2379".to_string(), "http://b:2379".to_string()]
        );
        assert!(parse_peers("").is_empty());
    }

    #[test]
    fn parses_config_command() {
        let cli = Cli::try_parse_from([
            "cfgwatch", "--peers", "http://etcd:2379", "config", "web1", "timeout", "30",
        ])
        .unwrap();
        assert_eq!(cli.peers, "http://etcd:2379");
        match cli.command {
            Commands::Config { server, var, val } => {
                assert_eq!((server.as_str(), var.as_str(), val.as_str()), ("web1", "timeout", "30"));
            }
            Commands::Server { .. } => panic!("expected config command"),
        }
    }

    #[test]
    fn parses_server_command_with_format() {
        let cli = Cli::try_parse_from(["cfgwatch", "server", "web1", "--format", "json", "-v"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Server { server, format } => {
                assert_eq!(server, "web1");
                assert_eq!(format, OutputFormat::Json);
            }
            Commands::Config { .. } => panic!("expected server command"),
        }
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(Cli::try_parse_from(["cfgwatch", "server", "web1", "--format", "yaml"]).is_err());
    }
}
