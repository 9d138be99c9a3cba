use std::{fs, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use inventory_plus::{
    logging::init_logging,
    server::{self, ServerConfig},
};

#[derive(Parser, Debug, Clone)]
struct Args {
    /// Bind host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Bind port
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Cache directory; photos are stored under its photos/ subdirectory
    #[arg(long, default_value = "./cache")]
    cache_dir: PathBuf,
}

#[actix_web::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let photos_dir = args.cache_dir.join("photos");
    fs::create_dir_all(&photos_dir)?;

    let cfg = ServerConfig {
        host: args.host.clone(),
        port: args.port,
        photos_dir,
    };
    server::run(cfg).await
}
