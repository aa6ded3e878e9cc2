use crate::cli::GenerateArgs;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use distgeom::{
    core::io::{
        description::DescriptionFile,
        traits::MoleculeFile,
        xyz::{XyzFile, XyzMetadata},
    },
    core::models::molecule::Molecule,
    engine::config::Configuration,
    engine::progress::ProgressReporter,
    engine::units::AngstromPositions,
    workflows,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub fn run(args: GenerateArgs) -> Result<()> {
    if args.num_conformers == 0 {
        return Err(CliError::Argument(
            "the number of conformers must be at least one".to_string(),
        ));
    }

    let config = build_configuration(&args)?;

    info!("Loading molecule description from {:?}", &args.input);
    let (molecule, metadata) =
        DescriptionFile::read_from_path(&args.input).map_err(|e| CliError::FileParsing {
            path: args.input.clone(),
            source: e.into(),
        })?;
    info!(
        atoms = molecule.num_atoms(),
        bonds = molecule.bonds().len(),
        stereocenters = molecule.stereocenters().len(),
        "Molecule loaded."
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Generating {} conformer(s)...", args.num_conformers);
    let conformers = if args.ensemble {
        let ensemble = workflows::generate_ensemble(&molecule, args.num_conformers, &config, &reporter)?;
        if ensemble.failure_count() > 0 {
            warn!(failures = ensemble.failure_count(), "Some attempts failed and were retried.");
        }
        ensemble.conformers
    } else {
        let results = workflows::run(&molecule, args.num_conformers, &config, &reporter);
        if let Some(Err(first)) = results.iter().find(|r| r.is_err()) {
            if results.iter().all(|r| r.is_err()) {
                return Err(first.clone().into());
            }
        }
        results.into_iter().filter_map(|r| r.ok()).collect()
    };

    let failures = progress_handler.failures();
    if conformers.is_empty() {
        warn!("No conformer could be generated.");
        println!("Warning: no conformer could be generated ({failures} failed attempt(s)).");
        return Ok(());
    }

    let name = metadata.name.unwrap_or_else(|| "conformer".to_string());
    write_conformers(&molecule, &conformers, &name, &args.output)?;
    println!(
        "Wrote {} conformer(s); {} attempt(s) failed.",
        conformers.len(),
        failures
    );
    Ok(())
}

/// Starts from the configuration file, if any, and applies command line
/// overrides on top.
fn build_configuration(args: &GenerateArgs) -> Result<Configuration> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Configuration::load(path)?
        }
        None => Configuration::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(partiality) = args.partiality {
        config.partiality = partiality;
    }
    if let Some(loosening) = args.loosening {
        config.spatial_model_loosening = loosening;
    }
    if let Some(steps) = args.steps {
        config.refinement_step_limit = steps;
    }
    config.validate()?;
    Ok(config)
}

fn write_conformers(
    molecule: &Molecule,
    conformers: &[AngstromPositions],
    name: &str,
    output: &Path,
) -> Result<()> {
    for (i, conformer) in conformers.iter().enumerate() {
        let output_path = generate_output_path(output, i + 1, conformers.len());
        let metadata = XyzMetadata {
            comment: format!("{name} conformer {} of {}", i + 1, conformers.len()),
            positions: conformer.positions().to_vec(),
        };
        info!("Writing conformer {} to {:?}", i + 1, &output_path);
        XyzFile::write_to_path(molecule, &metadata, &output_path).map_err(|e| CliError::FileWriting {
            path: output_path.clone(),
            source: e.into(),
        })?;
        println!("  Conformer {} written to: {}", i + 1, output_path.display());
    }
    Ok(())
}

/// `out.xyz` stays as is for a single conformer and becomes `out-3.xyz` for
/// the third of several.
fn generate_output_path(base: &Path, index: usize, total: usize) -> PathBuf {
    if total <= 1 {
        return base.to_path_buf();
    }
    let stem = base.file_stem().map_or_else(
        || "conformer".to_string(),
        |s| s.to_string_lossy().to_string(),
    );
    let file_name = match base.extension() {
        Some(extension) => format!("{stem}-{index}.{}", extension.to_string_lossy()),
        None => format!("{stem}-{index}"),
    };
    base.with_file_name(file_name)
}
