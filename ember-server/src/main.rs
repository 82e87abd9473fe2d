//! Binary entrypoint for `ember-server`.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

use ember_common::config::ServerConfig;

mod app;
mod connection;
mod dispatch;
mod reply;
mod resp;
mod server;

#[derive(Parser, Debug)]
#[command(name = "ember-server", about = "Wire-compatible in-memory cache server", version)]
struct Args {
    /// TCP bind address; a bare `:port` form binds all interfaces
    #[arg(long = "port", default_value = ":6380")]
    port: String,

    /// Directory for the journal and the cold-tier snapshot
    #[arg(long = "dir", default_value = "./cache-files")]
    dir: PathBuf,

    /// Password required by AUTH (empty disables authentication)
    #[arg(long = "auth", default_value = "")]
    auth: String,

    /// Maximum hot-tier keys before LRU eviction kicks in (0 = unlimited)
    #[arg(long = "max-keys", default_value_t = 0)]
    max_keys: i64,
}

fn subscriber_config() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting tracing default subscriber failed");
}

fn main() {
    subscriber_config();
    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: args.port,
        dir: args.dir,
        auth: (!args.auth.is_empty()).then_some(args.auth),
        max_keys: args.max_keys,
    };

    if let Err(err) = app::run(&config) {
        error!(%err, "ember-server failed");
        process::exit(1);
    }
}
