use clap::Parser;

use crate::locustfile::DEFAULT_LOCUSTFILE;

/// Locust load-testing launcher
#[derive(Parser, Debug, Clone)]
#[command(name = "locust")]
#[command(about = "Run the Locust scenarios of a locustfile, standalone or distributed")]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Name of the Locust class to run
    pub locust: Option<String>,

    /// Comma-separated list of hosts to operate on
    #[arg(short = 'H', long, value_delimiter = ',')]
    pub hosts: Vec<String>,

    /// Locustfile to load, e.g. '../other.toml'
    #[arg(short = 'f', long, default_value = DEFAULT_LOCUSTFILE)]
    pub locustfile: String,

    /// Show program's version number and exit
    #[arg(short = 'V', long)]
    pub version: bool,

    /// Print list of possible Locusts and exit
    #[arg(short = 'l', long)]
    pub list: bool,

    /// Print non-verbose list of possible Locusts and exit
    #[arg(long)]
    pub shortlist: bool,

    /// Print stats in the console
    #[arg(long)]
    pub print_stats: bool,

    /// Disable the web monitor and start hatching right away
    #[arg(long)]
    pub no_web: bool,

    /// Run in distributed mode with this process as master
    #[arg(long, conflicts_with = "slave")]
    pub master: bool,

    /// Run in distributed mode with this process as slave
    #[arg(long, conflicts_with = "master")]
    pub slave: bool,

    /// Number of concurrent clients
    #[arg(short = 'c', long = "clients", default_value_t = 1)]
    pub num_clients: u32,

    /// The rate per second at which clients are spawned
    #[arg(short = 'r', long, default_value_t = 1)]
    pub hatch_rate: u32,

    /// Redis host to use for distributed load testing
    #[arg(long, default_value = "localhost")]
    pub redis_host: String,

    /// Redis port to use for distributed load testing
    #[arg(long, default_value_t = 6379)]
    pub redis_port: u16,

    /// Interface the web monitor binds to (overrides settings)
    #[arg(long)]
    pub web_host: Option<String>,

    /// Port the web monitor listens on (overrides settings)
    #[arg(long)]
    pub web_port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
