//! Ingest CLI - Command-line interface for Synheart Ingest
//!
//! Commands:
//! - tandem: Normalize a Tandem export folder (CGM, basal, bolus)
//! - dexcom: Normalize a Dexcom Clarity glucose export
//! - polar: Normalize a Polar Flow heart-rate session
//! - cloud: Query the HRV measurement service (requires the `cloud` feature)
//! - doctor: Diagnose configuration and folder layout

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use synheart_ingest::encoder::{OutputFormat, TableEncoder};
use synheart_ingest::logging::{LogEvent, LogSink, TracingSink};
use synheart_ingest::pipeline::{FileKind, FileOutcome, FileStatus, TandemProcessor};
use synheart_ingest::{process_dexcom, process_polar, IngestConfig, IngestError};
use synheart_ingest::{INGEST_VERSION, PRODUCER_NAME};

/// Ingest - Normalize glucose, insulin and heart-rate device exports
#[derive(Parser)]
#[command(name = "ingest")]
#[command(author = "Synheart AI Inc")]
#[command(version = INGEST_VERSION)]
#[command(about = "Normalize biometric device exports into canonical tables", long_about = None)]
struct Cli {
    /// Configuration file (JSON) overriding export layouts
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize a Tandem export folder
    Tandem {
        /// Folder containing cgm_data_*.csv and an "Insulin data" subfolder
        #[arg(short, long)]
        folder: PathBuf,

        /// Output directory for glucose, basal and bolus tables
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "csv")]
        format: Format,
    },

    /// Normalize a Dexcom Clarity export
    Dexcom {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "csv")]
        format: Format,
    },

    /// Normalize a Polar Flow session export
    Polar {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "csv")]
        format: Format,
    },

    /// Query the HRV measurement service
    #[cfg(feature = "cloud")]
    Cloud {
        /// Credentials file (JSON with username, password, client_id)
        #[arg(long, required_unless_present = "tokens", conflicts_with = "tokens")]
        credentials: Option<PathBuf>,

        /// Previously issued tokens (JSON with id_token, access_token)
        #[arg(long)]
        tokens: Option<PathBuf>,

        /// Use the staging environment
        #[arg(long)]
        staging: bool,

        /// User id ("self" for the authenticated user)
        #[arg(long, default_value = "self")]
        user: String,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        #[command(subcommand)]
        resource: CloudResource,
    },

    /// Diagnose configuration and folder layout
    Doctor {
        /// Tandem folder to inspect
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(feature = "cloud")]
#[derive(Subcommand)]
enum CloudResource {
    /// User details
    User,
    /// All measurement sessions (paginated)
    Measurements {
        /// Measurement state filter
        #[arg(long)]
        state: Option<String>,

        /// Only sessions after this ISO-8601 timestamp
        #[arg(long)]
        from: Option<String>,
    },
    /// One measurement session
    Measurement {
        /// Measurement id
        #[arg(long)]
        id: String,
    },
    /// Analysis results
    Results,
    /// Subjects of the authenticated user
    Subjects,
    /// Create a subject from a JSON file
    CreateSubject {
        /// Subject definition (JSON)
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// Comma-separated values with header row
    Csv,
    /// JSON array
    Json,
    /// Pretty-printed JSON array
    JsonPretty,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => OutputFormat::Csv,
            Format::Json => OutputFormat::Json,
            Format::JsonPretty => OutputFormat::JsonPretty,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .init();
}

fn run(cli: Cli) -> Result<(), IngestCliError> {
    let config = match &cli.config {
        Some(path) => IngestConfig::from_file(path)?,
        None => IngestConfig::default(),
    };

    match cli.command {
        Commands::Tandem {
            folder,
            output,
            format,
        } => cmd_tandem(&config, &folder, &output, format.into()),

        Commands::Dexcom {
            input,
            output,
            format,
        } => {
            let mut log = TracingSink::new();
            let outcome = process_dexcom(&input, &config, &mut log);
            write_single(outcome, FileKind::Dexcom, &output, format.into())
        }

        Commands::Polar {
            input,
            output,
            format,
        } => {
            let mut log = TracingSink::new();
            let outcome = process_polar(&input, &config, &mut log);
            write_single(outcome, FileKind::Polar, &output, format.into())
        }

        #[cfg(feature = "cloud")]
        Commands::Cloud {
            credentials,
            tokens,
            staging,
            user,
            output,
            resource,
        } => cmd_cloud(
            credentials.as_deref(),
            tokens.as_deref(),
            staging,
            &user,
            &output,
            resource,
        ),

        Commands::Doctor { folder, json } => cmd_doctor(&config, cli.config.as_deref(), folder.as_deref(), json),
    }
}

fn cmd_tandem(
    config: &IngestConfig,
    folder: &Path,
    output: &Path,
    format: OutputFormat,
) -> Result<(), IngestCliError> {
    let mut log = TracingSink::new();
    let report = TandemProcessor::new(config.clone()).process(folder, &mut log);

    fs::create_dir_all(output)?;
    let encoder = TableEncoder::new(format);
    let ext = encoder.format().extension();

    encoder.write(&report.glucose, &output.join(format!("glucose.{ext}")))?;
    encoder.write(report.basal.values(), &output.join(format!("basal.{ext}")))?;
    encoder.write(&report.bolus, &output.join(format!("bolus.{ext}")))?;

    log.emit(
        LogEvent::info("batch", "tables written")
            .field("output", output.display())
            .field("format", ext),
    );

    let summary = BatchSummary {
        producer: PRODUCER_NAME.to_string(),
        version: INGEST_VERSION.to_string(),
        run_id: log.run_id().to_string(),
        files: report.files,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn write_single<T>(
    outcome: FileOutcome<T>,
    kind: FileKind,
    output: &Path,
    format: OutputFormat,
) -> Result<(), IngestCliError>
where
    T: serde::Serialize + synheart_ingest::encoder::Columns,
{
    let status = outcome.status(kind);
    if !status.loaded {
        return Err(IngestCliError::FileFailed(status));
    }

    let records = outcome.into_records();
    if records.is_empty() {
        return Err(IngestCliError::NoRecords);
    }

    let encoder = TableEncoder::new(format);
    if output.to_string_lossy() == "-" {
        println!("{}", encoder.encode(&records)?);
    } else {
        encoder.write(&records, output)?;
    }
    Ok(())
}

#[cfg(feature = "cloud")]
fn cmd_cloud(
    credentials: Option<&Path>,
    tokens: Option<&Path>,
    staging: bool,
    user: &str,
    output: &Path,
    resource: CloudResource,
) -> Result<(), IngestCliError> {
    use synheart_ingest::cloud::{CloudClient, CloudConfig, Credentials, MeasurementQuery, Tokens};

    let mut log = TracingSink::new();
    let config = if staging {
        CloudConfig::staging()
    } else {
        CloudConfig::production()
    };
    let client = match (tokens, credentials) {
        (Some(path), _) => {
            let tokens: Tokens = serde_json::from_str(&fs::read_to_string(path)?)?;
            CloudClient::with_tokens(config, tokens)?
        }
        (None, Some(path)) => CloudClient::login(config, &Credentials::from_file(path)?, &mut log)?,
        (None, None) => return Err(IngestCliError::MissingCredentials),
    };

    let value = match resource {
        CloudResource::User => client.user_info(user)?,
        CloudResource::Measurements { state, from } => {
            let query = MeasurementQuery {
                state,
                from,
                details: true,
            };
            serde_json::Value::Array(client.measurements(user, &query, &mut log))
        }
        CloudResource::Measurement { id } => client.measurement(user, &id)?,
        CloudResource::Results => client.results(user)?,
        CloudResource::Subjects => client.subjects()?,
        CloudResource::CreateSubject { file } => {
            let subject: serde_json::Value = serde_json::from_str(&fs::read_to_string(file)?)?;
            client.create_subject(&subject)?
        }
    };

    let json = serde_json::to_string_pretty(&value)?;
    if output.to_string_lossy() == "-" {
        println!("{json}");
    } else {
        fs::write(output, json)?;
    }
    Ok(())
}

fn cmd_doctor(
    config: &IngestConfig,
    config_path: Option<&Path>,
    folder: Option<&Path>,
    json: bool,
) -> Result<(), IngestCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "ingest_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Ingest version {}", INGEST_VERSION),
    });

    checks.push(DoctorCheck {
        name: "config".to_string(),
        status: CheckStatus::Ok,
        message: match config_path {
            Some(path) => format!("Configuration loaded from {}", path.display()),
            None => "Using built-in export layouts".to_string(),
        },
    });

    checks.push(DoctorCheck {
        name: "bucket_minutes".to_string(),
        status: CheckStatus::Ok,
        message: format!("Basal bucket width {} min", config.bucket_minutes()),
    });

    if let Some(folder) = folder {
        if folder.is_dir() {
            let mut log = TracingSink::new();
            let files = TandemProcessor::new(config.clone()).discover(folder, &mut log);
            for (name, count) in [
                ("cgm_files", files.cgm.len()),
                ("basal_files", files.basal.len()),
                ("bolus_files", files.bolus.len()),
            ] {
                checks.push(DoctorCheck {
                    name: name.to_string(),
                    status: if count > 0 {
                        CheckStatus::Ok
                    } else {
                        CheckStatus::Warning
                    },
                    message: format!("{} file(s) found", count),
                });
            }
        } else {
            checks.push(DoctorCheck {
                name: "folder".to_string(),
                status: CheckStatus::Error,
                message: format!("{} is not a directory", folder.display()),
            });
        }
    }

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: INGEST_VERSION.to_string(),
        checks,
    };
    let failed = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{} {}", report.producer, report.version);
        for check in &report.checks {
            let mark = match check.status {
                CheckStatus::Ok => "ok",
                CheckStatus::Warning => "warn",
                CheckStatus::Error => "FAIL",
            };
            println!("  [{mark:>4}] {}: {}", check.name, check.message);
        }
    }

    if failed {
        Err(IngestCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum IngestCliError {
    Io(io::Error),
    Ingest(IngestError),
    Json(serde_json::Error),
    FileFailed(FileStatus),
    NoRecords,
    DoctorFailed,
    #[cfg(feature = "cloud")]
    MissingCredentials,
}

impl From<io::Error> for IngestCliError {
    fn from(e: io::Error) -> Self {
        IngestCliError::Io(e)
    }
}

impl From<IngestError> for IngestCliError {
    fn from(e: IngestError) -> Self {
        IngestCliError::Ingest(e)
    }
}

impl From<serde_json::Error> for IngestCliError {
    fn from(e: serde_json::Error) -> Self {
        IngestCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<IngestCliError> for CliError {
    fn from(e: IngestCliError) -> Self {
        match e {
            IngestCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            IngestCliError::Ingest(IngestError::AuthenticationError(msg)) => CliError {
                code: "AUTH_ERROR".to_string(),
                message: msg,
                hint: Some("Check username, password and client_id".to_string()),
            },
            IngestCliError::Ingest(e) => CliError {
                code: "INGEST_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the input file and configuration".to_string()),
            },
            IngestCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            IngestCliError::FileFailed(status) => CliError {
                code: "FILE_FAILED".to_string(),
                message: format!(
                    "{}: {}",
                    status.path.display(),
                    status.reason.unwrap_or_default()
                ),
                hint: Some("Ensure the file matches the configured export layout".to_string()),
            },
            IngestCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No usable rows found in input".to_string(),
                hint: Some("Run with --verbose to see dropped rows".to_string()),
            },
            #[cfg(feature = "cloud")]
            IngestCliError::MissingCredentials => CliError {
                code: "MISSING_CREDENTIALS".to_string(),
                message: "No credentials or tokens given".to_string(),
                hint: Some("Pass --credentials FILE or --tokens FILE".to_string()),
            },
            IngestCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct BatchSummary {
    producer: String,
    version: String,
    run_id: String,
    files: Vec<FileStatus>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
