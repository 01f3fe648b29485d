use std::path::PathBuf;

use clap::Parser;

/// bv-monitor CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "bv-monitor",
    version,
    about = "Periodically records bilibili video statistics"
)]
pub struct Cli {
    /// Port for the HTTP control API
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory holding config, monitor list and stats logs
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Bilibili API base URL
    #[arg(long)]
    pub api_url: Option<String>,
}
