//! Command-line interface for the IMU timesync pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::writers::RunLog;
use crate::processors::{diagnostics, fixing, pipeline, reconstruct, SessionHints};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "imu-timesync")]
#[command(about = "IMU logger timestamp repair and synchronization", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge, trim and synchronize every configured patient session
    Process {
        /// Root data directory (overrides config)
        #[arg(long)]
        root: Option<PathBuf>,
        /// Patients to process (overrides config)
        #[arg(long, num_args = 1..)]
        patients: Option<Vec<String>>,
        /// Session prefixes to process (overrides config)
        #[arg(long, num_args = 1..)]
        sessions: Option<Vec<String>>,
        /// Logger folders to process (overrides config)
        #[arg(long, num_args = 1..)]
        loggers: Option<Vec<String>>,
        /// Minutes trimmed from the start of each logger
        #[arg(long)]
        trim_minutes: Option<f64>,
    },

    /// Identify and rename the clock columns of raw logger files
    Fix {
        /// Directory containing raw CSV files
        input_dir: PathBuf,
        /// Output directory for fixed files
        output_dir: PathBuf,
        /// Session date as yymmdd (e.g., 250320)
        #[arg(long)]
        date: String,
        /// Session starting hour, 0-23 (overrides config)
        #[arg(long)]
        hour: Option<u32>,
    },

    /// Rebuild the global clock from the local hundredths counter
    Reconstruct {
        /// Directory containing CSV files
        input_dir: PathBuf,
        /// Output directory for reconstructed files
        output_dir: PathBuf,
        /// Disable the register-aliasing correction
        #[arg(long)]
        no_alias_correction: bool,
    },

    /// Overwrite g_year, g_month and g_day in every CSV of a folder
    FillDate {
        /// Folder containing CSV files
        folder: PathBuf,
        /// Two-digit year (e.g., 25)
        year: u32,
        month: u32,
        day: u32,
    },

    /// Report duration and sample rate of processed logger files
    Check {
        /// Directory containing processed CSV files
        directory: PathBuf,
        /// Log file (defaults to <directory>/sampling_log.txt)
        #[arg(long)]
        log: Option<PathBuf>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Process {
            root,
            patients,
            sessions,
            loggers,
            trim_minutes,
        } => {
            if let Some(root) = root {
                config.data.root_dir = root;
            }
            if let Some(patients) = patients {
                config.data.patients = patients;
            }
            if let Some(sessions) = sessions {
                config.data.sessions = sessions;
            }
            if let Some(loggers) = loggers {
                config.data.loggers = loggers;
            }
            if let Some(minutes) = trim_minutes {
                config.processing.trim_minutes = minutes;
            }
            cmd_process(&config);
        }
        Commands::Fix {
            input_dir,
            output_dir,
            date,
            hour,
        } => {
            cmd_fix(&input_dir, &output_dir, &date, hour, &config);
        }
        Commands::Reconstruct {
            input_dir,
            output_dir,
            no_alias_correction,
        } => {
            if no_alias_correction {
                config.reconstruction.alias_correction = false;
            }
            cmd_reconstruct(&input_dir, &output_dir, &config);
        }
        Commands::FillDate {
            folder,
            year,
            month,
            day,
        } => {
            cmd_fill_date(&folder, year, month, day);
        }
        Commands::Check { directory, log } => {
            cmd_check(&directory, log, &config);
        }
    }
}

fn cmd_process(config: &PipelineConfig) {
    let start = Instant::now();

    println!("Processing sessions under {}", config.data.root_dir.display());
    println!("Patients: {:?}", config.data.patients);
    println!("Sessions: {:?}", config.data.sessions);
    println!("Loggers: {:?}", config.data.loggers);

    let spinner = create_spinner("Merging and synchronizing loggers...");
    let reports = pipeline::run_pipeline(config);
    spinner.finish_and_clear();

    if reports.is_empty() {
        warn!("No logger folders found");
    }

    for report in &reports {
        let session = report
            .session_dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut items: Vec<(&str, String)> = Vec::new();
        items.push(("Patient", report.patient.clone()));
        items.push(("Session", session));
        if let Some(e) = &report.error {
            items.push(("Error", e.clone()));
        }
        match (&report.window, &report.issue) {
            (Some(window), _) => items.push(("Window", format!("{:.1} s", window.duration()))),
            (None, Some(issue)) => items.push(("Window", issue.to_string())),
            (None, None) => {}
        }
        for logger in &report.loggers {
            let status = match &logger.error {
                Some(e) => format!("FAILED: {}", e),
                None => format!("{} rows", logger.rows_written),
            };
            items.push((logger.logger.as_str(), status));
        }
        if let Some(path) = &report.log_path {
            items.push(("Log", path.display().to_string()));
        }
        print_summary("Session Processed", &items);
    }

    let failed: usize = reports.iter().map(|r| r.failed_loggers()).sum();
    let unscanned = reports.iter().filter(|r| r.error.is_some()).count();
    print_summary(
        "Processing Complete",
        &[
            ("Sessions", reports.len().to_string()),
            ("Unreadable sessions", unscanned.to_string()),
            ("Failed loggers", failed.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_fix(input_dir: &Path, output_dir: &Path, date: &str, hour: Option<u32>, config: &PipelineConfig) {
    let start = Instant::now();
    let ident = &config.identification;

    let Some(hour) = hour.or(ident.session_hour) else {
        error!("No session hour given: pass --hour or set identification.session_hour");
        std::process::exit(1);
    };
    let hints = match SessionHints::from_date_part(date, hour) {
        Ok(hints) => hints,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let settings = fixing::FixSettings {
        hints,
        candidates: &ident.candidate_columns,
        quarantine_folder: &ident.quarantine_folder,
    };
    let log = RunLog::new(output_dir.join(&ident.log_file_name));

    println!("Fixing files in {}", input_dir.display());
    println!("Session date: {}, hour: {}", date, hour);

    let spinner = create_spinner("Identifying time columns...");
    match fixing::fix_folder(input_dir, output_dir, &settings, &log) {
        Ok(outcomes) => {
            spinner.finish_and_clear();
            let fixed = outcomes.iter().filter(|(_, o)| o.is_fixed()).count();
            let skipped = outcomes
                .iter()
                .filter(|(_, o)| matches!(o, fixing::FixOutcome::Skipped { .. }))
                .count();

            print_summary(
                "Fix Complete",
                &[
                    ("Input directory", input_dir.display().to_string()),
                    ("Output directory", output_dir.display().to_string()),
                    ("Files", outcomes.len().to_string()),
                    ("Fixed", fixed.to_string()),
                    ("Skipped", skipped.to_string()),
                    ("Quarantined", (outcomes.len() - fixed - skipped).to_string()),
                    ("Log", log.path().display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Fix failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_reconstruct(input_dir: &Path, output_dir: &Path, config: &PipelineConfig) {
    let start = Instant::now();
    let log = RunLog::new(output_dir.join(&config.identification.log_file_name));
    let alias_correction = config.reconstruction.alias_correction;

    let spinner = create_spinner("Reconstructing local time...");
    match reconstruct::reconstruct_folder(
        input_dir,
        output_dir,
        &config.identification.quarantine_folder,
        alias_correction,
        &log,
    ) {
        Ok(outcomes) => {
            spinner.finish_and_clear();
            let written: Vec<&reconstruct::ReconstructReport> = outcomes
                .iter()
                .filter_map(|(_, o)| match o {
                    reconstruct::ReconstructOutcome::Written { report, .. } => Some(report),
                    _ => None,
                })
                .collect();
            let corrections: usize = written.iter().map(|r| r.alias_corrections).sum();

            print_summary(
                "Reconstruction Complete",
                &[
                    ("Input directory", input_dir.display().to_string()),
                    ("Output directory", output_dir.display().to_string()),
                    ("Files", outcomes.len().to_string()),
                    ("Written", written.len().to_string()),
                    ("Alias correction", alias_correction.to_string()),
                    ("Corrected rows", corrections.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Reconstruction failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_fill_date(folder: &Path, year: u32, month: u32, day: u32) {
    let start = Instant::now();

    match crate::processors::fill_global_date(folder, year, month, day) {
        Ok(report) => {
            print_summary(
                "Date Fill Complete",
                &[
                    ("Folder", folder.display().to_string()),
                    ("Date", format!("{:02}-{:02}-{:02}", year, month, day)),
                    ("Updated", report.updated.len().to_string()),
                    ("Skipped", report.skipped.len().to_string()),
                    ("Failed", report.failed.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            error!("Date fill failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_check(directory: &Path, log_path: Option<PathBuf>, config: &PipelineConfig) {
    let log = RunLog::new(log_path.unwrap_or_else(|| directory.join("sampling_log.txt")));

    match diagnostics::check_folder(directory, &config.diagnostics, &log) {
        Ok(outcomes) => {
            let mut items: Vec<(&str, String)> = Vec::new();
            let names: Vec<String> = outcomes
                .iter()
                .map(|(p, _)| {
                    p.file_name()
                        .map(|s| s.to_string_lossy().to_string())
                        .unwrap_or_default()
                })
                .collect();
            for (name, (_, outcome)) in names.iter().zip(&outcomes) {
                let status = match outcome {
                    diagnostics::SamplingOutcome::Checked(r) if r.within_tolerance => {
                        format!("OK {:.2} Hz", r.mean_rate_hz)
                    }
                    diagnostics::SamplingOutcome::Checked(r) => {
                        format!("WARNING {:.2} Hz", r.mean_rate_hz)
                    }
                    diagnostics::SamplingOutcome::Skipped { reason } => format!("SKIP {}", reason),
                };
                items.push((name.as_str(), status));
            }
            items.push(("Log", log.path().display().to_string()));
            print_summary("Sampling Check Complete", &items);
        }
        Err(e) => {
            error!("Check failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
