use clap::{Args, Parser, Subcommand};
use distgeom::engine::config::Partiality;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "distgeom - Distance geometry conformer generation for molecular graphs with stereochemical annotations.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel computation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate conformers for a molecule described in TOML.
    Generate(GenerateArgs),
}

/// Arguments for the `generate` subcommand.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    // --- Core Arguments ---
    /// Path to the molecule description file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the output XYZ file. With several conformers, a running index
    /// is inserted before the extension (e.g., out-1.xyz, out-2.xyz).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Path to a configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Number of conformers to generate.
    #[arg(short = 'n', long, default_value_t = 1, value_name = "INT")]
    pub num_conformers: usize,

    // --- Configuration Overrides ---
    /// Seed for reproducible generation, overriding the config file.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Metrization partiality: none, four-atom or all.
    #[arg(long, value_name = "MODE")]
    pub partiality: Option<Partiality>,

    /// Multiplier widening all modelled bounds.
    #[arg(long, value_name = "FLOAT")]
    pub loosening: Option<f64>,

    /// Maximum number of refinement iterations per stage.
    #[arg(long, value_name = "INT")]
    pub steps: Option<usize>,

    /// Retry failed attempts until the requested number of conformers is
    /// reached or the failure ratio is exceeded.
    #[arg(long)]
    pub ensemble: bool,
}
