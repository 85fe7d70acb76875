// src/main.rs
use cassandra_dbplugin::cli::Cli;
use cassandra_dbplugin::server;
use cassandra_dbplugin::CassandraPlugin;
use clap::Parser;
use tokio::io::{stdin, stdout, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries responses, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let plugin = CassandraPlugin::new();
    server::serve(&plugin, BufReader::new(stdin()), stdout(), cli.verify_on_init).await
}
