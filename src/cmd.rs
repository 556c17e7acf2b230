use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Validate a traffic description and print its normalized fields
    Show {
        #[arg(short, long, help = "Path to the TOML traffic description")]
        config: String,
    },
    /// Compile a traffic description into transmit and receive pipelines
    Compile {
        #[arg(short, long, help = "Path to the TOML traffic description")]
        config: String,
        #[arg(
            long,
            default_value = trafficgraph::modes::DEFAULT_PORT_OUT,
            help = "Output port the tunnel testing receive pipeline forwards to"
        )]
        port_out: String,
        #[arg(
            short,
            long,
            default_value = None,
            help = "Sample the producer policy of each transmit pipeline this many times"
        )]
        draws: Option<usize>,
        #[arg(short, long, default_value_t = 0, help = "Seed for producer sampling")]
        seed: u64,
        #[arg(
            long,
            default_value_t = false,
            help = "Print the pipelines as JSON instead of text"
        )]
        json: bool,
    },
}
