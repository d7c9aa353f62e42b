use std::path::PathBuf;

use clap::Parser;

/// Stagecraft image editing gateway
#[derive(Debug, Parser)]
#[command(name = "stagecraft", about = "AI image editing gateway for virtual staging")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "stagecraft.toml", env = "STAGECRAFT_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "STAGECRAFT_LISTEN")]
    pub listen: Option<std::net::SocketAddr>,
}
