//! Command line of the `coral-expand` binary.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "coral-expand")]
#[command(
    about = "Serve expand/collapse commands for a comment thread over stdin/stdout",
    long_about = "Reads one JSON request per line on stdin, e.g. {\"action\":\"expand\"}, \
                  and writes one JSON response per line on stdout."
)]
pub struct Cli {
    /// Config file (default: <config dir>/coral-expand/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// JSON file with the comments of the thread
    #[arg(long, value_name = "FILE")]
    pub thread: Option<PathBuf>,

    /// Number of lookups before the widget is found (0 = never)
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub appear_after: usize,

    /// Write the effective config to the config file and exit
    #[arg(long)]
    pub write_config: bool,
}
