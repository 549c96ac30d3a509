use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, info_span, Instrument, Level};
use uuid::Uuid;

use reviewbot_cli::config::Config;
use reviewbot_cli::obs::ObsClient;
use reviewbot_core::{BatchReport, EngineConfig, IncidentPolicyKind, RequestId, ReviewEngine};

/// Reviewbot: checks that request sources are already accepted in a reference project
#[derive(Parser, Debug)]
#[command(name = "reviewbot")]
#[command(about = "Review bot for build service requests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Build service API URL (defaults to OBS_APIURL)
    #[arg(long, short = 'A', global = true)]
    apiurl: Option<String>,

    /// Reviewer user name (defaults to OBS_USER)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Project submissions are checked against
    #[arg(long, alias = "factory", global = true)]
    reference_project: Option<String>,

    /// Classify and log, but do not change any review
    #[arg(long, global = true)]
    dry: bool,

    /// Debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Verbose output
    #[arg(long, global = true)]
    verbose: bool,

    /// Print the batch report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Extra reviewers for maintenance incidents
    #[arg(long, default_value = "fixed", global = true)]
    incident_policy: IncidentPolicyKind,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check the requests with the given ids
    Id {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Check every request waiting for a review by the user
    Review,
}

fn log_level(cli: &Cli) -> Level {
    if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    }
}

fn engine_config(cli: &Cli, config: &Config, user: &str) -> EngineConfig {
    let reference_project = cli
        .reference_project
        .clone()
        .unwrap_or_else(|| config.reference_project.clone());

    let mut engine_config = EngineConfig::new(reference_project, user);
    engine_config.classifier.history_limit = config.history_limit;
    engine_config.classifier.secondary_release_project = config.secondary_release_project.clone();
    engine_config.secondary_reviewer = config.secondary_reviewer.clone();
    engine_config.incident_policy = cli.incident_policy;
    engine_config.dry_run = cli.dry;
    engine_config
}

fn print_summary(report: &BatchReport) {
    for outcome in &report.outcomes {
        println!("{}: {}", outcome.id, outcome.verdict);
        for action in &outcome.actions {
            println!(
                "  {} {}: {} ({})",
                action.kind,
                action.package.as_deref().unwrap_or("-"),
                action.verdict,
                action.reason
            );
        }
        for target in &outcome.added_reviews {
            println!("  added review by {}", target);
        }
    }
    for failure in &report.failures {
        println!("{}: failed: {}", failure.id, failure.error);
    }
}

async fn run(cli: Cli, config: Config, correlation_id: String) -> Result<()> {
    let apiurl = cli
        .apiurl
        .clone()
        .or_else(|| config.apiurl.clone())
        .context("missing apiurl: pass --apiurl or set OBS_APIURL")?;
    let user = cli
        .user
        .clone()
        .or_else(|| config.user.clone())
        .context("missing user: pass --user or set OBS_USER")?;

    let client = ObsClient::new(&apiurl, Some(user.clone()), config.password.clone())?
        .with_correlation_id(correlation_id);
    let engine = ReviewEngine::new(Arc::new(client), engine_config(&cli, &config, &user));

    info!(
        "Checking against {} as {}{}",
        engine.config().classifier.reference_project,
        user,
        if cli.dry { " (dry run)" } else { "" }
    );

    let report = match &cli.command {
        Commands::Id { ids } => {
            let ids: Vec<RequestId> = ids.iter().map(|id| RequestId::from(id.as_str())).collect();
            engine.check_ids(&ids).await
        }
        Commands::Review => engine
            .check_awaiting_review()
            .await
            .context("Failed to search for requests awaiting review")?,
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
    } else {
        print_summary(&report);
    }

    if !report.is_success() {
        return Err(anyhow!("{} request(s) could not be checked", report.failures.len()));
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(log_level(&cli))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;

    let correlation_id = Uuid::new_v4().to_string();
    let span = info_span!("reviewbot", correlation_id = %correlation_id);
    run(cli, config, correlation_id).instrument(span).await
}
