use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "speech-server", version = VERSION)]
pub struct Args {
    /// Optional server config file (TOML). Defaults to config.toml next to the executable.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// HTTP bind address, e.g. 0.0.0.0:8912
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Fallback log filter when RUST_LOG is unset, e.g. "debug" or "info,speech_player=trace"
    #[arg(long)]
    pub log_level: Option<String>,
}
