use anyhow::Context;
use autopilot_core::Department;
use autopilot_engine::{CycleOutcome, Engine, HttpInvoker, OracleClient};
use autopilot_store::SqliteStore;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use uuid::Uuid;

/// Autopilot - autonomous per-department decision engine
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the SQLite database (overrides AUTOPILOT_DB_PATH)
    #[arg(long, value_name = "FILE")]
    db: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cycles for one company immediately, bypassing the frequency gate
    Run {
        /// Company id
        #[arg(long)]
        company: Uuid,

        /// Single department (all enabled departments when omitted)
        #[arg(long, value_parser = parse_department)]
        department: Option<Department>,
    },

    /// Run every (company, department) whose frequency window has elapsed
    RunDue,
}

fn parse_department(s: &str) -> Result<Department, String> {
    Department::parse(s).ok_or_else(|| format!("unknown department '{s}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autopilot=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let db_path = cli
        .db
        .or_else(|| std::env::var("AUTOPILOT_DB_PATH").ok())
        .unwrap_or_else(|| "autopilot.db".to_string());
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("opening database at {db_path}"))?;

    let base_url = std::env::var("AUTOPILOT_LLM_BASE_URL")
        .context("AUTOPILOT_LLM_BASE_URL is not set")?;
    let api_key = std::env::var("AUTOPILOT_LLM_API_KEY").ok();
    let model = std::env::var("AUTOPILOT_LLM_MODEL")
        .unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let oracle = OracleClient::new(&base_url, api_key, &model);

    let engine = Engine::new(
        Arc::new(store),
        Arc::new(oracle),
        Arc::new(HttpInvoker::new()),
    );

    match cli.command {
        Commands::Run {
            company,
            department,
        } => {
            let outcomes = engine.run_for(company, department).await;
            for outcome in &outcomes {
                print_outcome(outcome);
            }
            if outcomes.is_empty() {
                println!("no enabled departments for {company}");
            }
        }
        Commands::RunDue => {
            let outcomes = engine.run_due().await;
            println!("{} department(s) were due", outcomes.len());
            for outcome in &outcomes {
                print_outcome(outcome);
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &CycleOutcome) {
    match outcome {
        CycleOutcome::Completed(report) => println!(
            "{} [{}]: {} decisions, {} executed, {} blocked, {} pending review, {:.1} credits, {}ms",
            report.department,
            report.cycle_id,
            report.total_decisions,
            report.passed,
            report.blocked,
            report.pending_review,
            report.credits_consumed,
            report.execution_time_ms,
        ),
        CycleOutcome::Aborted {
            company_id,
            department,
            reason,
            missing,
        } => {
            if missing.is_empty() {
                println!("{department} [{company_id}]: aborted ({reason})");
            } else {
                println!(
                    "{department} [{company_id}]: aborted ({reason}), missing: {}",
                    missing.join(", ")
                );
            }
        }
        CycleOutcome::Failed {
            company_id,
            department,
            error,
        } => println!("{department} [{company_id}]: failed: {error}"),
    }
}
