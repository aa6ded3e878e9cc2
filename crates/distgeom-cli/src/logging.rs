use crate::error::{CliError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, Layer, Registry, filter::LevelFilter, fmt, prelude::*};

/// Environment variable holding a full `tracing` filter directive. It takes
/// precedence over the verbosity flags.
const LOG_ENV: &str = "DISTGEOM_LOG";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn level_filter(verbosity: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbosity) {
        (true, _) => LevelFilter::ERROR,
        (false, 0) => LevelFilter::WARN,
        (false, 1) => LevelFilter::INFO,
        (false, 2) => LevelFilter::DEBUG,
        (false, _) => LevelFilter::TRACE,
    }
}

fn console_layer() -> BoxedLayer {
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .boxed()
}

/// Plain-text layer for `--log-file`. Records threads so that interleaved
/// attempts can be told apart.
fn file_layer(path: &Path) -> Result<BoxedLayer> {
    let file = File::create(path)?;
    Ok(fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_ids(true)
        .boxed())
}

pub fn setup_logging(verbosity: u8, quiet: bool, log_file: Option<PathBuf>) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(verbosity, quiet).into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let mut layers = vec![console_layer()];
    if let Some(path) = &log_file {
        layers.push(file_layer(path)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to install logger: {e}")))
}
