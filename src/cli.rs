use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use xdrop_extender::device::DEFAULT_DEVICE_MEMORY;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct CliArgs {
    /// Set verbosity level. Use multiple times to increase the verbosity level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<CliSubcommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliSubcommand {
    /// Extend seed pairs between a query and a target sequence and report high scoring segments
    Extend(ExtendArgs),
}

#[derive(Args, Debug)]
pub struct ExtendArgs {
    /// Query sequence in FASTA format. Only the first record is used.
    #[clap(help_heading = "Inputs")]
    pub query: PathBuf,

    /// Target sequence in FASTA format. Only the first record is used.
    #[clap(help_heading = "Inputs")]
    pub target: PathBuf,

    /// Seed pairs, one per line: query position and target position.
    #[clap(help_heading = "Inputs")]
    pub seeds: PathBuf,

    /// The seed pair file lists the target position first
    #[arg(long)]
    #[clap(help_heading = "Inputs")]
    pub target_first: bool,

    /// Output filename. If not given, defaults to stdout
    #[arg(short, long)]
    #[clap(help_heading = "Outputs")]
    pub output: Option<PathBuf>,

    /// Extender configuration in JSON format. Options given on the command line take precedence.
    #[arg(short, long)]
    #[clap(help_heading = "Extension configuration")]
    pub config: Option<PathBuf>,

    /// Substitution score matrix in JSON format, e.g. {"alphabet_size": 8, "scores": [...]}
    #[arg(long)]
    #[clap(help_heading = "Extension configuration")]
    pub score_matrix: Option<PathBuf>,

    /// X-drop threshold
    #[arg(short = 'x', long)]
    #[clap(help_heading = "Extension configuration")]
    pub xdrop: Option<i32>,

    /// Minimum score of reported segments
    #[arg(short = 's', long, default_value = "3000")]
    #[clap(help_heading = "Extension configuration")]
    pub score_threshold: i32,

    /// Report raw substitution scores, without adjusting for low sequence complexity
    #[arg(long)]
    #[clap(help_heading = "Extension configuration")]
    pub no_entropy: bool,

    /// Stage the inputs in device memory manually and use the device buffer interface
    #[arg(short, long)]
    #[clap(help_heading = "Processing")]
    pub device_api: bool,

    /// Number of threads for the extension kernels. Defaults to the number of CPUs.
    #[arg(short = 'j', long)]
    #[clap(help_heading = "Processing")]
    pub num_threads: Option<usize>,

    /// Amount of device memory available to the extender, in bytes
    #[arg(long, default_value_t = DEFAULT_DEVICE_MEMORY)]
    #[clap(help_heading = "Processing")]
    pub device_memory: usize,
}
