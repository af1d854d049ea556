//! Main executable for griddock

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use nalgebra::Vector3;

use griddock::atom::NUM_XS_TYPES;
use griddock::grid::SearchBox;
use griddock::io::{self, LogRecord};
use griddock::ligand::Ligand;
use griddock::optimization::local::BfgsParams;
use griddock::optimization::monte_carlo::{MonteCarlo, MonteCarloParams};
use griddock::receptor::Receptor;
use griddock::scoring::ScoringFunction;

/// Command-line arguments for the application
#[derive(Parser, Debug)]
#[clap(
    name = "griddock",
    version = griddock::VERSION,
    about = "Grid-accelerated virtual screening by Monte Carlo / BFGS molecular docking"
)]
struct Cli {
    /// Receptor in PDBQT format
    #[clap(long, value_parser)]
    receptor: Option<PathBuf>,

    /// Folder of ligands in PDBQT format
    #[clap(long, value_parser)]
    input_folder: Option<PathBuf>,

    /// X coordinate of the search space center
    #[clap(long)]
    center_x: Option<f64>,

    /// Y coordinate of the search space center
    #[clap(long)]
    center_y: Option<f64>,

    /// Z coordinate of the search space center
    #[clap(long)]
    center_z: Option<f64>,

    /// Size in the X dimension in Angstroms
    #[clap(long)]
    size_x: Option<f64>,

    /// Size in the Y dimension in Angstroms
    #[clap(long)]
    size_y: Option<f64>,

    /// Size in the Z dimension in Angstroms
    #[clap(long)]
    size_z: Option<f64>,

    /// Folder of output models in PDBQT format [default: output]
    #[clap(long, value_parser)]
    output_folder: Option<PathBuf>,

    /// Log file [default: log.csv]
    #[clap(long, value_parser)]
    log: Option<PathBuf>,

    /// Explicit non-negative random seed [default: wall clock]
    #[clap(long)]
    seed: Option<u64>,

    /// Number of worker threads [default: hardware concurrency]
    #[clap(long)]
    threads: Option<usize>,

    /// Number of Monte Carlo tasks for global search [default: 256]
    #[clap(long)]
    tasks: Option<usize>,

    /// Number of BFGS iterations per local refinement [default: 300]
    #[clap(long)]
    generations: Option<usize>,

    /// Number of binding conformations to write [default: 9]
    #[clap(long)]
    max_conformations: Option<usize>,

    /// Density of probe atoms of grid maps [default: 0.15625]
    #[clap(long)]
    granularity: Option<f64>,

    /// Reject poses with cross-frame steric clashes
    #[clap(long)]
    steric_check: bool,

    /// Load any of the above options from a `key = value` file
    #[clap(long, value_parser)]
    config: Option<PathBuf>,
}

/// Fully resolved options: command line first, then the configuration
/// file, then the defaults.
struct Settings {
    receptor: PathBuf,
    input_folder: PathBuf,
    center: Vector3<f64>,
    size: Vector3<f64>,
    output_folder: PathBuf,
    log: PathBuf,
    seed: u64,
    threads: usize,
    tasks: usize,
    generations: usize,
    max_conformations: usize,
    granularity: f64,
    steric_check: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let settings = resolve(Cli::parse())?;

    if !settings.receptor.is_file() {
        return Err(anyhow!(
            "Receptor {} does not exist or is not a regular file",
            settings.receptor.display()
        ));
    }
    if !settings.input_folder.is_dir() {
        return Err(anyhow!(
            "Input folder {} does not exist or is not a directory",
            settings.input_folder.display()
        ));
    }
    if settings.output_folder.exists() {
        if !settings.output_folder.is_dir() {
            return Err(anyhow!(
                "Output folder {} is not a directory",
                settings.output_folder.display()
            ));
        }
    } else {
        fs::create_dir_all(&settings.output_folder).with_context(|| {
            format!(
                "Failed to create output folder {}",
                settings.output_folder.display()
            )
        })?;
    }

    if settings.threads == 0 {
        error!("No usable worker threads");
        return Ok(ExitCode::from(2));
    }
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(settings.threads)
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to create a worker pool of {} threads: {e}", settings.threads);
            return Ok(ExitCode::from(2));
        }
    };
    info!("Created a worker pool of {} threads", settings.threads);

    info!(
        "Precalculating a scoring function of {} atom types in parallel",
        NUM_XS_TYPES
    );
    let mut sf = ScoringFunction::default();
    pool.install(|| sf.precalculate())?;

    info!("Parsing receptor {}", settings.receptor.display());
    let search_box = SearchBox::new(settings.center, settings.size, settings.granularity)?;
    let rec = Receptor::from_path(&settings.receptor, search_box).with_context(|| {
        format!("Failed to parse receptor {}", settings.receptor.display())
    })?;

    let mc = MonteCarlo::with_params(MonteCarloParams {
        num_tasks: settings.tasks,
        max_conformations: settings.max_conformations,
        bfgs: BfgsParams {
            max_iterations: settings.generations,
            ..BfgsParams::default()
        },
        ..MonteCarloParams::default()
    });

    let mut ligand_paths: Vec<PathBuf> = fs::read_dir(&settings.input_folder)
        .with_context(|| {
            format!(
                "Failed to read input folder {}",
                settings.input_folder.display()
            )
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    ligand_paths.sort();

    info!(
        "Executing {} optimization runs of {} BFGS iterations per ligand with seed {}",
        settings.tasks, settings.generations, settings.seed
    );

    let mut records: Vec<LogRecord> = Vec::new();
    for path in ligand_paths {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut lig = match Ligand::from_path(&path) {
            Ok(lig) => lig,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        lig.steric_clash_check = settings.steric_check;

        // Lazily populate the grid maps this ligand needs; ligands whose
        // types are already mapped dispatch immediately.
        pool.install(|| rec.ensure_maps(&sf, &lig.atom_types()));

        let results = mc.generate_poses(&lig, &sf, &rec, settings.seed, &pool);
        if results.is_empty() {
            warn!("No binding conformations found for {}", stem);
            continue;
        }

        let energies: Vec<f64> = results
            .iter()
            .map(|r| r.e * lig.flexibility_penalty_factor)
            .collect();

        let output_path = settings
            .output_folder
            .join(path.file_name().expect("ligand path has a file name"));
        io::write_models(&output_path, &lig, &results, &energies).with_context(|| {
            format!("Failed to write models to {}", output_path.display())
        })?;

        info!(
            "{:>8} {:<20}{}",
            records.len() + 1,
            stem,
            energies
                .iter()
                .map(|e| format!("{:7.2}", e))
                .collect::<String>()
        );
        records.push(LogRecord { stem, energies });
    }

    if !records.is_empty() {
        info!(
            "Writing log records of {} ligands to {}",
            records.len(),
            settings.log.display()
        );
        io::write_log(&settings.log, &mut records)
            .with_context(|| format!("Failed to write log {}", settings.log.display()))?;
    }

    Ok(ExitCode::SUCCESS)
}

fn resolve(cli: Cli) -> Result<Settings> {
    let config = match &cli.config {
        Some(path) => parse_config_file(path)?,
        None => HashMap::new(),
    };

    let receptor = cli
        .receptor
        .or_else(|| config.get("receptor").map(PathBuf::from))
        .ok_or_else(|| anyhow!("Required option --receptor is missing"))?;
    let input_folder = cli
        .input_folder
        .or_else(|| config.get("input_folder").map(PathBuf::from))
        .ok_or_else(|| anyhow!("Required option --input_folder is missing"))?;

    let center = Vector3::new(
        required(cli.center_x, &config, "center_x")?,
        required(cli.center_y, &config, "center_y")?,
        required(cli.center_z, &config, "center_z")?,
    );
    let size = Vector3::new(
        required(cli.size_x, &config, "size_x")?,
        required(cli.size_y, &config, "size_y")?,
        required(cli.size_z, &config, "size_z")?,
    );

    let default_seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let default_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    Ok(Settings {
        receptor,
        input_folder,
        center,
        size,
        output_folder: cli
            .output_folder
            .or_else(|| config.get("output_folder").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("output")),
        log: cli
            .log
            .or_else(|| config.get("log").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("log.csv")),
        seed: optional(cli.seed, &config, "seed")?.unwrap_or(default_seed),
        threads: optional(cli.threads, &config, "threads")?.unwrap_or(default_threads),
        tasks: optional(cli.tasks, &config, "tasks")?.unwrap_or(256),
        generations: optional(cli.generations, &config, "generations")?.unwrap_or(300),
        max_conformations: optional(cli.max_conformations, &config, "max_conformations")?
            .unwrap_or(9),
        granularity: optional(cli.granularity, &config, "granularity")?
            .unwrap_or(SearchBox::DEFAULT_GRANULARITY),
        steric_check: cli.steric_check
            || optional(None, &config, "steric_check")?.unwrap_or(false),
    })
}

/// Parse a `key = value` configuration file; empty lines and `#` comments
/// are ignored.
fn parse_config_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let mut values = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    Ok(values)
}

fn optional<T: std::str::FromStr>(
    cli: Option<T>,
    config: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>> {
    if cli.is_some() {
        return Ok(cli);
    }
    match config.get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow!("Invalid value '{}' for option {}", raw, key)),
        None => Ok(None),
    }
}

fn required<T: std::str::FromStr>(
    cli: Option<T>,
    config: &HashMap<String, String>,
    key: &str,
) -> Result<T> {
    optional(cli, config, key)?.ok_or_else(|| anyhow!("Required option --{} is missing", key))
}
