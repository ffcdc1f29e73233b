mod api;
mod config;
mod consts;
mod environment;
mod error;
mod harness;
mod pretty;
mod submission;
mod ui;
mod validate;
mod watch;

use crate::api::{ApiClient, JobApi};
use crate::config::{HarnessConfig, get_config_path};
use crate::environment::EnvironmentType;
use crate::harness::{RunSettings, Verdict, check_result, preflight, verify, watch_and_validate};
use crate::submission::SubmissionRequest;
use crate::ui::{UiSurface, WebDriverSurface};
use clap::{ArgAction, Parser, Subcommand};
use log::{info, warn};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
/// Verifies AlphaFold-Multimer pair jobs end to end through the web UI and the job API.
struct Args {
    /// Path to the harness config file.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Backend mode of the stack under test.
    #[arg(long, global = true, value_enum)]
    env: Option<EnvironmentType>,

    /// Job API base URL, e.g. http://127.0.0.1:5090
    #[arg(long, global = true, value_name = "URL")]
    api_base: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Print the verdict as JSON
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    json: bool,

    /// Command to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a pair job through the UI and verify it end to end
    Verify {
        /// UniProt reference of the first protein
        #[arg(long, value_name = "UNIPROT")]
        protein_a: Option<String>,

        /// UniProt reference of the second protein
        #[arg(long, value_name = "UNIPROT")]
        protein_b: Option<String>,

        /// Prediction preset selected in the form
        #[arg(long)]
        preset: Option<String>,

        /// Overall deadline in milliseconds
        #[arg(long, value_name = "MS")]
        deadline_ms: Option<u64>,

        /// Show the browser window
        #[arg(long, action = ArgAction::SetTrue)]
        headed: bool,

        /// Leave the browser session open afterwards
        #[arg(long, action = ArgAction::SetTrue)]
        keep_session: bool,
    },
    /// Watch a job already shown in an open browser session and verify it
    Watch {
        #[arg(long, value_name = "JOB_ID")]
        job_id: String,

        /// WebDriver session whose page shows the job
        #[arg(long, value_name = "SESSION_ID")]
        session: String,

        /// Overall deadline in milliseconds
        #[arg(long, value_name = "MS")]
        deadline_ms: Option<u64>,
    },
    /// Validate the stored result of a finished job through the API only
    CheckResult {
        #[arg(long, value_name = "JOB_ID")]
        job_id: String,

        /// Fetch the result this many times and require identical documents
        #[arg(long, default_value = "1")]
        repeat: usize,
    },
    /// Check that the job API is up
    Health,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Defaults, then the config file, then `SHENLAB_E2E_*` variables, then flags.
fn load_config(args: &Args) -> Result<HarnessConfig, Box<dyn Error>> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_path()?,
    };
    let mut config = HarnessConfig::load_or_default(&config_path)?;
    config.apply_env_overrides(|name| std::env::var(name).ok())?;

    if let Some(env) = args.env {
        config.environment = env.to_string();
    }
    if let Some(api_base) = &args.api_base {
        config.api_base = Some(api_base.clone());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(args.verbose);
    let mut config = load_config(&args)?;

    let api = ApiClient::new(&config.api_base()?, config.request_timeout())?;
    let verdict = match args.command {
        Command::Health => {
            let health = preflight(&api).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&health)?);
            } else {
                for line in pretty::render_health(&api.api_base(), &health) {
                    println!("{}", line);
                }
            }
            return Ok(());
        }
        Command::CheckResult { job_id, repeat } => {
            let result = check_result(&api, &job_id, &config.scoring, repeat).await;
            Verdict::from_result("check-result", Some(job_id), &result)
        }
        Command::Verify {
            protein_a,
            protein_b,
            preset,
            deadline_ms,
            headed,
            keep_session,
        } => {
            if deadline_ms.is_some() {
                config.deadline_ms = deadline_ms;
            }
            if headed {
                config.headless = false;
            }
            let settings = RunSettings::from_config(&config)?;
            let request = SubmissionRequest {
                frontend_url: config.frontend_url()?,
                api_base: config.api_base()?,
                protein_a: protein_a.unwrap_or_else(|| config.protein_a.clone()),
                protein_b: protein_b.unwrap_or_else(|| config.protein_b.clone()),
                preset: Some(preset.unwrap_or_else(|| config.preset.clone())),
            };
            info!(
                "Verifying {} + {} on {} (API {})",
                request.protein_a, request.protein_b, request.frontend_url, request.api_base
            );

            let ui = WebDriverSurface::connect(
                &config.webdriver_url,
                &config.browser,
                config.headless,
                config.request_timeout().max(config.ui_wait()),
            )
            .await?;
            let verdict = verify(&ui, &api, &request, &settings).await;
            if keep_session {
                info!("Leaving WebDriver session {} open", ui.session_id());
            } else if let Err(e) = ui.close().await {
                warn!("Failed to close browser session: {}", e);
            }
            verdict
        }
        Command::Watch {
            job_id,
            session,
            deadline_ms,
        } => {
            if deadline_ms.is_some() {
                config.deadline_ms = deadline_ms;
            }
            let settings = RunSettings::from_config(&config)?;
            let ui = WebDriverSurface::attach(
                &config.webdriver_url,
                &session,
                config.request_timeout().max(config.ui_wait()),
            )
            .await?;
            let result = watch_and_validate(&ui, &api, &job_id, &settings).await;
            Verdict::from_result("watch", Some(job_id), &result)
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&verdict)?);
    } else {
        for line in pretty::render_verdict(&verdict) {
            println!("{}", line);
        }
    }

    if !verdict.passed {
        std::process::exit(1);
    }
    Ok(())
}
