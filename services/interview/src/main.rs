use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use interview_client::AgentClient;
use interview_core::ReportSource;
use interview_service::agent_adapter::AgentExchange;
use interview_service::config::Config;
use interview_service::report_view::{await_report, render_fit, render_report};
use interview_service::session_runner::{self, Entry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(name = "interview", about = "Voice interview client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score a resume against a job description
    Fit {
        /// Resume PDF
        #[arg(long)]
        resume: PathBuf,
        /// Job description file, or `-` for stdin
        #[arg(long)]
        job: String,
    },
    /// Run an interview session
    Session {
        /// Resume PDF to start the session with
        #[arg(long, conflicts_with = "admission_token")]
        resume: Option<PathBuf>,
        /// Token granted by `fit`
        #[arg(long)]
        admission_token: Option<String>,
        /// Type answers instead of speaking them
        #[arg(long)]
        text: bool,
        /// Skip waiting for the report afterwards
        #[arg(long)]
        no_report: bool,
    },
    /// Fetch the report of a finished session
    Report { session_id: String },
    /// Check the agent service and the audio devices
    Check,
    /// List audio devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    // --- 3. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 4. Initialize API Client ---
    let client = Arc::new(
        AgentClient::new(config.client_config()).context("Failed to build the HTTP client")?,
    );
    tracing::info!("Using interview agent at {}", config.api_url);

    match args.command {
        Command::Fit { resume, job } => fit(&client, resume, &job).await?,
        Command::Session {
            resume,
            admission_token,
            text,
            no_report,
        } => {
            let entry = match admission_token {
                Some(token) => Entry::AdmissionToken(token),
                None => Entry::Resume(resume),
            };
            let started = session_runner::open_session(client.as_ref(), &entry)
                .await
                .context("Failed to start the interview")?;
            let finished = if text {
                let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
                session_runner::run_text(client.as_ref(), started, &mut stdin).await?
            } else {
                session_runner::run_voice(Arc::clone(&client), &config, started).await?
            };
            if let (Some(session_id), false) = (finished, no_report) {
                report(&client, &config, &session_id).await?;
            }
        }
        Command::Report { session_id } => report(&client, &config, &session_id).await?,
        Command::Check => check(&client, &config).await?,
        Command::Devices => {
            println!("Input devices:\n{}", interview_native_utils::device::get_available_inputs()?);
            println!("Output devices:\n{}", interview_native_utils::device::get_available_outputs()?);
        }
    }

    tracing::debug!("Client stats: {:?}", client.stats());
    Ok(())
}

async fn fit(client: &AgentClient, resume: PathBuf, job: &str) -> Result<()> {
    let upload = session_runner::read_pdf(&resume).await?;
    let job_description = if job == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        text
    } else {
        tokio::fs::read_to_string(job)
            .await
            .with_context(|| format!("Failed to read {job}"))?
    };
    if job_description.trim().is_empty() {
        bail!("The job description is empty");
    }
    let evaluation = client
        .evaluate_fit(upload, &job_description)
        .await
        .context("Fit evaluation failed")?;
    print!("{}", render_fit(&evaluation));
    Ok(())
}

async fn report(client: &Arc<AgentClient>, config: &Config, session_id: &str) -> Result<()> {
    let source: Arc<dyn ReportSource> = Arc::new(AgentExchange::new(Arc::clone(client)));
    let mut answers = tokio::io::BufReader::new(tokio::io::stdin());
    match await_report(source, session_id, config.report_poll_interval, &mut answers).await? {
        Some(report) => print!("{}", render_report(&report)),
        None => println!("Report not retrieved. Fetch it later with: interview report {session_id}"),
    }
    Ok(())
}

async fn check(client: &AgentClient, config: &Config) -> Result<()> {
    let mut ok = true;
    match client.health().await {
        Ok(health) if health.is_healthy() => match health.service() {
            Some(service) => println!("Agent service: ok ({service})"),
            None => println!("Agent service: ok"),
        },
        Ok(health) => {
            ok = false;
            println!("Agent service: {}", health.status());
        }
        Err(e) => {
            ok = false;
            println!("Agent service: unreachable ({e})");
        }
    }

    let input = interview_native_utils::device::get_or_default_input(config.input_device.as_deref());
    let output = interview_native_utils::device::get_or_default_output(config.output_device.as_deref());
    for (label, found) in [("Microphone", input.map(|_| ())), ("Speaker", output.map(|_| ()))] {
        match found {
            Ok(()) => println!("{label}: ok"),
            Err(e) => {
                ok = false;
                println!("{label}: {e:#}");
            }
        }
    }

    if !ok {
        bail!("System check failed");
    }
    println!("All checks passed.");
    Ok(())
}
