use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "cassandra-dbplugin",
    about = "Dynamic Cassandra credential plugin (requests on stdin, responses on stdout)",
    version
)]
pub struct Cli {
    /// Log filter directive, e.g. `info` or `cassandra_dbplugin=debug`.
    #[arg(long, default_value = "info", env = "CASSANDRA_PLUGIN_LOG")]
    pub log_level: String,

    /// Open a session during `initialize` when the request does not say otherwise.
    #[arg(long, env = "CASSANDRA_PLUGIN_VERIFY_ON_INIT")]
    pub verify_on_init: bool,
}
