use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use powerdns_consul::config::Config;
use powerdns_consul::resolver::Resolver;
use powerdns_consul::server::{self, ResolverLookup};
use powerdns_consul::store;

#[derive(Parser, Debug)]
#[command(
    name = "powerdns-consul",
    about = "PowerDNS pipe backend answering from a distributed KV store",
    version
)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "/etc/powerdns-consul/config.json")]
    config: String,
}

#[tokio::main]
async fn main() {
    // stdout belongs to the frontend protocol; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("cannot load configuration from {}: {}", args.config, err);
            std::process::exit(1);
        }
    };

    let kv = match store::new_store(&config.kv_backend, &config.kv_address) {
        Ok(kv) => kv,
        Err(err) => {
            error!("cannot set up KV store: {}", err);
            std::process::exit(1);
        }
    };

    info!(
        backend = %config.kv_backend,
        address = %config.kv_address,
        "starting powerdns-consul backend"
    );

    let resolver = Resolver::new(config, kv);
    if let Err(err) = server::run(ResolverLookup::new(resolver)).await {
        error!("backend terminated: {}", err);
        std::process::exit(1);
    }
}
