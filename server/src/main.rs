use clap::{Parser, Subcommand};
use mesh_server::config::ConfigFile;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[clap(name = "mesh-server", author, version, about)]
struct Opts {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the coordinating server, reading process configuration from
    /// `--config`.
    Serve {
        #[clap(short, long, default_value = "/etc/mesh-server/config.toml")]
        config: PathBuf,
    },

    /// Write a starter config file to `--config`, for first-time setup.
    Init {
        #[clap(short, long, default_value = "/etc/mesh-server/config.toml")]
        config: PathBuf,

        #[clap(long, default_value = "0.0.0.0:8080")]
        listen_addr: String,

        #[clap(long, default_value = "/var/lib/mesh-server/mesh.db")]
        database_path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    match opts.command {
        Command::Serve { config } => {
            let config = ConfigFile::from_file(&config)?;
            let shutdown = CancellationToken::new();
            let shutdown_signal = shutdown.clone();

            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("received shutdown signal");
                shutdown_signal.cancel();
            });

            mesh_server::run(config, shutdown).await
        },
        Command::Init { config, listen_addr, database_path } => {
            let file = ConfigFile { listen_addr, database_path, upstream_resolvers: vec![], detector_thresholds: None };
            file.write_to_path(&config)?;
            println!("wrote starter config to {}", config.display());
            Ok(())
        },
    }
}
