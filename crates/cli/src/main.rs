use anyhow::Context;
use assist_core::user::CurrentUserResponse;
use assist_core::{
    decode, reconcile, AssistConfig, AuthenticatedUser, ConfigSources, LaunchContext, NonEmptyText,
};
use clap::{Parser, Subcommand};
use fhir::PatientResource;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ai-assist")]
#[command(about = "AI Assist SMART launch tooling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a base64 `launch` parameter
    Decode {
        /// The raw launch parameter
        launch: String,
    },
    /// Encode a launch context as a `launch` parameter
    Encode {
        /// Patient identifier (ICN)
        #[arg(long)]
        patient: String,
        /// Station number
        #[arg(long)]
        sta3n: String,
        /// User id at the station
        #[arg(long)]
        duz: String,
        /// FHIR server base URL for the printed launch URL (default: AUTH_ISS)
        #[arg(long)]
        iss: Option<String>,
    },
    /// Normalize a FHIR Patient JSON file
    Normalize {
        /// Path to a FHIR Patient resource
        file: PathBuf,
    },
    /// Reconcile a FHIR Patient with an optional launch context and user
    Reconcile {
        /// Path to a FHIR Patient resource
        file: PathBuf,
        /// Raw launch parameter
        #[arg(long)]
        launch: Option<String>,
        /// Path to an `/api/me` response
        #[arg(long)]
        user: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Decode { launch }) => match decode(&launch) {
            Ok(ctx) => {
                println!("patient: {}", ctx.patient_identifier());
                println!("sta3n:   {}", ctx.station_id());
                println!("duz:     {}", ctx.user_id());
            }
            Err(e) => eprintln!("Invalid launch parameter: {}", e),
        },
        Some(Commands::Encode {
            patient,
            sta3n,
            duz,
            iss,
        }) => {
            let ctx = LaunchContext::new(
                NonEmptyText::new(&patient).context("--patient must not be empty")?,
                NonEmptyText::new(&sta3n).context("--sta3n must not be empty")?,
                NonEmptyText::new(&duz).context("--duz must not be empty")?,
            );
            let launch = ctx.encode();
            println!("{launch}");

            match load_config() {
                Ok(config) => match config.launch_url(&launch, iss.as_deref()) {
                    Some(url) => println!("{url}"),
                    None => eprintln!("No --iss given and AUTH_ISS is not set; skipping launch URL"),
                },
                Err(e) => eprintln!("Launch URL unavailable: {e:#}"),
            }
        }
        Some(Commands::Normalize { file }) => {
            let patient = read_patient(&file)?;
            let normalized = fhir::normalize(&patient);
            println!("{}", serde_json::to_string_pretty(&normalized)?);
        }
        Some(Commands::Reconcile { file, launch, user }) => {
            let patient = read_patient(&file)?;
            let context = launch
                .as_deref()
                .map(decode)
                .transpose()
                .context("Invalid launch parameter")?;
            let user = user.as_deref().map(read_user).transpose()?;

            let canonical = reconcile(
                context.as_ref(),
                &fhir::normalize(&patient),
                patient.resource_id(),
                user.as_ref(),
            );
            println!("{}", serde_json::to_string_pretty(&canonical)?);
        }
        None => {
            println!("Use 'ai-assist --help' for commands");
        }
    }

    Ok(())
}

/// Same sources as the service: process env plus an optional `AI_ASSIST_CONFIG_FILE`.
fn load_config() -> anyhow::Result<AssistConfig> {
    let mut sources = ConfigSources::from_process_env();
    if let Some(path) = std::env::var_os("AI_ASSIST_CONFIG_FILE").map(PathBuf::from) {
        sources = sources.with_injected_file(&path)?;
    }
    Ok(AssistConfig::resolve(&sources)?)
}

fn read_patient(path: &Path) -> anyhow::Result<PatientResource> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    PatientResource::parse(&text).with_context(|| format!("{} is not a FHIR Patient", path.display()))
}

fn read_user(path: &Path) -> anyhow::Result<AuthenticatedUser> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let response: CurrentUserResponse = serde_json::from_str(&text)
        .with_context(|| format!("{} is not an /api/me response", path.display()))?;
    Ok(response.into())
}
