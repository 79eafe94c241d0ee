mod config;
mod error;
mod ethereum;
mod execution;
mod forms;
mod schema;
mod server;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::{Arg, Command};
use config::Config;
use ethereum::abi::DefinitionCache;
use server::ContractFormServer;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (important for MCP stdio servers)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = Command::new("contract-form-mcp")
        .version("0.1.0")
        .about("MCP server that builds and executes forms for smart contract functions")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .help("Default network to use (ethereum, sepolia, polygon, arbitrum)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .help("RPC endpoint URL"),
        )
        .arg(
            Arg::new("allow-writes")
                .long("allow-writes")
                .help("Allow write operations (transactions)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("max-proxy-depth")
                .long("max-proxy-depth")
                .value_name("HOPS")
                .help("Proxy hops to follow when resolving a contract")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("clear-cache")
                .long("clear-cache")
                .help("Delete cached contract definitions and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    // Handle special commands first
    if matches.get_flag("generate-config") {
        let sample_config = Config::generate_sample();
        println!("{}", sample_config);
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    // Load configuration
    let config_path = matches.get_one::<String>("config").map(|s| s.as_str());
    let mut config = Config::load_or_default(config_path).await;

    // Override with command line arguments
    if let Some(network) = matches.get_one::<String>("network") {
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        if let Some(network_config) = config.networks.get_mut(&config.default_network) {
            network_config.rpc_url = rpc_url.clone();
        }
    }

    if matches.get_flag("allow-writes") {
        config.security.allow_write_operations = true;
    }

    if let Some(depth) = matches.get_one::<u32>("max-proxy-depth") {
        config.resolver.max_proxy_depth = *depth;
    }

    if matches.get_flag("clear-cache") {
        let cache_dir = config.cache_dir();
        DefinitionCache::new(cache_dir.clone()).clear().await?;
        println!("Cleared {}", cache_dir.display());
        return Ok(());
    }

    info!("Starting Contract Form MCP Server");
    info!("Default network: {}", config.default_network);
    info!(
        "Write operations allowed: {}",
        config.security.allow_write_operations
    );
    info!("Definition providers: {}", config.resolver.providers.join(", "));

    // Create and run the server
    let server = ContractFormServer::new(config)?;

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
