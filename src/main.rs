use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use rand::Rng;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use fhir::{Bundle, BusinessStatus, LastModified, TransactionBundle};
use nhs_identifiers::{
    NhsNumber, OdsCode, complete_nhs_number, generate_nhs_numbers, generate_ods_code,
    generate_prescription_id, validate_nhs_number, validate_prescription_id,
};
use psu_core::config::{
    http_timeout_from_env_value, resolve_endpoints, resolve_private_key,
};
use psu_core::{
    Credentials, PsuClient, PsuConfig, PsuError, PsuRequestOptions, SubmissionResult,
    generate_psu_bundle,
};

#[derive(Parser)]
#[command(name = "psu")]
#[command(about = "NHS identifier and Prescription Status Update tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate NHS numbers
    NhsNumbers {
        /// How many numbers to generate
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Give every number a wrong check digit
        #[arg(long)]
        invalid: bool,
        /// Use the reserved 999 test prefix
        #[arg(long)]
        dummy: bool,
        /// Complete these 9 subject digits with a check digit instead of generating
        #[arg(short, long, conflicts_with_all = ["count", "dummy"])]
        complete: Option<String>,
    },
    /// Check an NHS number's check digit
    ValidateNhsNumber {
        /// 10-digit NHS number
        number: String,
    },
    /// Generate prescription order numbers
    PrescriptionIds {
        /// How many ids to generate
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// ODS code to embed (a random 6-character code if omitted)
        #[arg(long)]
        ods_code: Option<String>,
    },
    /// Check a prescription order number's check character
    ValidatePrescriptionId {
        /// Prescription id, e.g. 9A822C-A83008-13DCAB
        id: String,
    },
    /// Generate ODS organisation codes
    OdsCodes {
        /// How many codes to generate
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Code length, 3 to 6
        #[arg(long, default_value_t = 5)]
        length: usize,
    },
    /// Generate a PSU bundle and print it
    GeneratePsu {
        #[command(flatten)]
        request: PsuRequestArgs,
        /// Print compact JSON instead of indented
        #[arg(long)]
        dense: bool,
    },
    /// Send a PSU bundle read from a file (or stdin)
    SendPsu {
        /// Path to a JSON bundle; reads stdin if omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Generate a PSU bundle and send it
    SendGeneratedPsu {
        #[command(flatten)]
        request: PsuRequestArgs,
    },
}

#[derive(Args)]
struct PsuRequestArgs {
    #[arg(long, help = format!("Business status (case-insensitive). One of: {}", BusinessStatus::choices()))]
    business_status: String,
    /// Prescription order number (generated if omitted)
    #[arg(long)]
    order_number: Option<String>,
    /// Prescription order item number, a UUID (generated if omitted)
    #[arg(long)]
    order_item_number: Option<String>,
    /// Patient NHS number (generated if omitted)
    #[arg(long)]
    nhs_number: Option<String>,
    /// Owning pharmacy ODS code (generated if omitted)
    #[arg(long)]
    ods_code: Option<String>,
    /// lastModified override, RFC 3339 (defaults to now)
    #[arg(long, conflicts_with = "post_dated")]
    last_modified: Option<String>,
    /// Post-date lastModified by this many hours (fractions allowed, e.g. 1.5)
    #[arg(long)]
    post_dated: Option<f64>,
    /// Number of Task entries in the bundle
    #[arg(long, default_value_t = 1)]
    num_entries: usize,
}

impl PsuRequestArgs {
    fn into_options(self) -> anyhow::Result<PsuRequestOptions> {
        let mut options = PsuRequestOptions::new(self.business_status);
        options.num_entries = self.num_entries;

        options.order_number = self
            .order_number
            .map(|v| nhs_identifiers::PrescriptionId::parse(&v))
            .transpose()?;
        options.order_item_number = self
            .order_item_number
            .map(|v| uuid::Uuid::parse_str(v.trim()))
            .transpose()
            .context("order item number must be a UUID")?;
        options.nhs_number = self
            .nhs_number
            .map(|v| NhsNumber::parse(&v))
            .transpose()?;
        options.ods_code = self.ods_code.map(|v| OdsCode::parse(&v)).transpose()?;

        options.last_modified = match (self.last_modified, self.post_dated) {
            (Some(raw), _) => {
                let at = DateTime::parse_from_rfc3339(raw.trim())
                    .with_context(|| format!("invalid --last-modified '{raw}'"))?;
                LastModified::At(at.with_timezone(&Utc))
            }
            (None, Some(hours)) => LastModified::PostDated(post_dating_offset(hours)?),
            (None, None) => LastModified::Now,
        };

        Ok(options)
    }
}

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

fn post_dating_offset(hours: f64) -> anyhow::Result<Duration> {
    let millis = (hours * MILLIS_PER_HOUR).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        anyhow::bail!("--post-dated {hours} is out of range");
    }
    Duration::try_milliseconds(millis as i64)
        .with_context(|| format!("--post-dated {hours} is out of range"))
}

const DEFAULT_LOG_DIRECTIVES: [&str; 3] = ["psu=info", "fhir=info", "nhs_identifiers=info"];

/// `RUST_LOG` plus info-level logging for this workspace's crates.
fn log_filter() -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_LOG_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

fn nhs_numbers<R: Rng + ?Sized>(
    count: usize,
    invalid: bool,
    dummy: bool,
    complete: Option<&str>,
    rng: &mut R,
) -> anyhow::Result<Vec<String>> {
    match complete {
        Some(digits) => Ok(vec![complete_nhs_number(digits.trim(), invalid, rng)?]),
        None => Ok(generate_nhs_numbers(count, invalid, dummy, rng)?),
    }
}

/// Entry point for the `psu` command-line tool.
///
/// Identifier commands need no configuration. The sending commands read their configuration
/// from the environment (or a `.env` file) once, here, before any request is made.
///
/// # Environment Variables
/// - `API_KEY`: application API key
/// - `HOST`: API host, e.g. `internal-dev.api.service.nhs.uk`
/// - `KID`: key id registered for the signing key
/// - `PRIVATE_KEY` or `PRIVATE_KEY_PATH`: PEM-encoded RSA private key
/// - `IS_PR` / `PR_NUMBER`: send to a pull-request deployment
/// - `PSU_BASE_URL`: replaces `https://{HOST}` for both endpoints
/// - `PSU_HTTP_TIMEOUT_SECS`: request timeout (default 30)
#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(log_filter()?)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut rng = rand::thread_rng();

    match cli.command {
        Commands::NhsNumbers {
            count,
            invalid,
            dummy,
            complete,
        } => {
            for number in nhs_numbers(count, invalid, dummy, complete.as_deref(), &mut rng)? {
                println!("{number}");
            }
        }
        Commands::ValidateNhsNumber { number } => {
            return Ok(report_validity(validate_nhs_number(number.trim())));
        }
        Commands::PrescriptionIds { count, ods_code } => {
            let ods_code = ods_code.map(|v| OdsCode::parse(&v)).transpose()?;
            for _ in 0..count {
                println!("{}", generate_prescription_id(ods_code.as_ref(), &mut rng)?);
            }
        }
        Commands::ValidatePrescriptionId { id } => {
            let normalised = id.trim().to_ascii_uppercase();
            return Ok(report_validity(validate_prescription_id(&normalised)));
        }
        Commands::OdsCodes { count, length } => {
            for _ in 0..count {
                println!("{}", generate_ods_code(length, &mut rng)?);
            }
        }
        Commands::GeneratePsu { request, dense } => {
            let bundle = generate_psu_bundle(&request.into_options()?, &mut rng)?;
            let rendered = if dense {
                Bundle::render(&bundle)?
            } else {
                Bundle::render_pretty(&bundle)?
            };
            println!("{rendered}");
        }
        Commands::SendPsu { input } => {
            let json = read_bundle_text(input)?;
            Bundle::parse(&json)?;
            let config = resolve_config()?;
            return send(&config, Payload::Text(&json)).await;
        }
        Commands::SendGeneratedPsu { request } => {
            let config = resolve_config()?;
            let bundle = generate_psu_bundle(&request.into_options()?, &mut rng)?;
            println!("{}", Bundle::render_pretty(&bundle)?);
            return send(&config, Payload::Bundle(&bundle)).await;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn report_validity(valid: bool) -> ExitCode {
    if valid {
        println!("valid");
        ExitCode::SUCCESS
    } else {
        println!("invalid");
        ExitCode::FAILURE
    }
}

fn read_bundle_text(input: Option<PathBuf>) -> anyhow::Result<String> {
    match &input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bundle from {}", path.display())),
        None => std::io::read_to_string(std::io::stdin()).context("failed to read bundle from stdin"),
    }
}

/// What `send` posts: a bundle file's text as-is, or a freshly generated bundle.
enum Payload<'a> {
    Text(&'a str),
    Bundle(&'a TransactionBundle),
}

fn resolve_config() -> anyhow::Result<PsuConfig> {
    let env = |name: &str| std::env::var(name).ok();

    let endpoints = resolve_endpoints(
        env("HOST"),
        env("PSU_BASE_URL"),
        env("IS_PR"),
        env("PR_NUMBER"),
    )?;
    let private_key = resolve_private_key(
        env("PRIVATE_KEY"),
        env("PRIVATE_KEY_PATH").map(PathBuf::from),
    )?;
    let credentials = Credentials::new(
        &env("API_KEY").unwrap_or_default(),
        &env("KID").unwrap_or_default(),
        private_key,
    )?;
    let http_timeout = http_timeout_from_env_value(env("PSU_HTTP_TIMEOUT_SECS"))?;

    if let Some(pr_number) = endpoints.pull_request() {
        tracing::info!(pr_number, "routing submissions to pull-request deployment");
    }

    Ok(PsuConfig::new(credentials, endpoints, http_timeout))
}

async fn send(config: &PsuConfig, payload: Payload<'_>) -> anyhow::Result<ExitCode> {
    let mut client = PsuClient::new(config)?;

    let outcome = match payload {
        Payload::Text(json) => client.send_json(json).await,
        Payload::Bundle(bundle) => client.send(bundle).await,
    };
    match outcome {
        Ok(result) => {
            print_result(&result);
            Ok(ExitCode::SUCCESS)
        }
        Err(PsuError::SubmissionFailure(result)) => {
            print_result(&result);
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            if let Some(body) = err.response_body() {
                eprintln!("{body}");
            }
            Err(err.into())
        }
    }
}

fn print_result(result: &SubmissionResult) {
    println!("Request ID: {}", result.request_id);
    println!("Correlation ID: {}", result.correlation_id);
    println!("Response: {}", result.status);
    println!("{}", result.body_pretty());
}
