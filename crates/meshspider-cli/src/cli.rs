//! Command line definition.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use meshspider::config::{
    DEFAULT_NODE_TIMEOUT, DEFAULT_POOL_SIZE, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRIES,
};

#[derive(Parser, Debug)]
#[command(
    name = "meshspider",
    about = "Spider the web interfaces of mesh network nodes",
    version
)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Turn on debug logging.
    #[arg(short = 'D', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Log filter used when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.log_level
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Probe nodes, merge earlier dumps and write results.
    Probe(ProbeArgs),

    /// Load a dump file and print a summary.
    Validate {
        /// Dump file, `-` for stdin.
        dump: String,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   meshspider completions bash > ~/.local/share/bash-completion/completions/meshspider
    ///   meshspider completions zsh > ~/.zfunc/_meshspider
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProbeArgs {
    /// Node addresses, optionally with a port (ADDR[:PORT]).
    pub nodes: Vec<String>,

    /// File or URL with OLSR txtinfo output listing candidate nodes.
    #[arg(long, value_name = "SRC")]
    pub topology: Option<String>,

    /// Probe at most this many nodes from the topology.
    #[arg(short = 'n', long = "limit", value_name = "N")]
    pub limit: Option<usize>,

    /// Number of nodes probed at once.
    #[arg(short = 'p', long = "pool-size", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Seconds allowed per node.
    #[arg(short = 't', long = "timeout", default_value_t = DEFAULT_NODE_TIMEOUT.as_secs())]
    pub timeout: u64,

    /// Seconds allowed per HTTP request.
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    pub request_timeout: u64,

    /// Retries per HTTP request on connection errors and 5xx answers.
    #[arg(long, default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,

    /// Web interface port of one node (ADDR:PORT); may be repeated.
    #[arg(short = 'i', long = "ip-port", value_name = "ADDR:PORT")]
    pub ip_port: Vec<String>,

    /// Earlier dump to merge, in order; may be repeated.
    #[arg(short = 'r', long = "read-dump", value_name = "DUMP")]
    pub read_dump: Vec<String>,

    /// Dump whose nodes are not probed again.
    #[arg(long, value_name = "DUMP")]
    pub resume: Option<String>,

    /// Dump output file. Also reads from MESHSPIDER_DUMP.
    #[arg(short = 'o', long = "output", value_name = "OUT")]
    pub output: Option<String>,

    /// Write version statistics as CSV (`-` for stdout).
    #[arg(short = 'V', long = "version-statistics", value_name = "CSV")]
    pub version_statistics: Option<String>,

    /// Write interface information as CSV (`-` for stdout).
    #[arg(short = 'I', long = "interface-info", value_name = "CSV")]
    pub interface_info: Option<String>,

    /// Show results; repeat for interface details.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Read pages from a directory of saved pages instead of the network.
    #[arg(long, value_name = "DIR")]
    pub local: Option<String>,
}
