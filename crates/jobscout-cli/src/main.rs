use anyhow::Result;
use clap::{Parser, Subcommand};
use jobscout_core::Freshness;
use jobscout_sync::SyncConfig;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobscout")]
#[command(about = "ATS job freshness aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch every configured source once and update the corpus.
    Sync,
    /// Print corpus statistics and the freshest postings.
    Report {
        #[arg(long, default_value_t = 20)]
        top: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show the priority tier and score for a posting age.
    Score {
        #[arg(long)]
        hours: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = jobscout_sync::run_sync_once_from_env().await?;
            println!(
                "sync complete: run_id={} orgs={}/{} candidates={} new={} duplicates={} corpus={}",
                summary.run_id,
                summary.organizations_succeeded,
                summary.organizations_attempted,
                summary.total_candidates,
                summary.new_jobs,
                summary.duplicates,
                summary.corpus_size
            );
            println!(
                "priorities: HIGH={} MEDIUM={} LOW={} EXPIRED={}",
                summary.priorities.high,
                summary.priorities.medium,
                summary.priorities.low,
                summary.priorities.expired
            );
        }
        Commands::Report { top, json } => {
            let config = SyncConfig::from_env()?;
            let report = jobscout_sync::corpus_report(&config, top).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.to_markdown());
            }
        }
        Commands::Score { hours } => {
            if !hours.is_finite() {
                anyhow::bail!("--hours must be a finite number");
            }
            let freshness = Freshness::from_hours(hours);
            println!(
                "hours_old={} days_old={} priority={} score={}",
                freshness.hours_old,
                freshness.days_old,
                freshness.apply_priority,
                freshness.freshness_score
            );
        }
    }

    Ok(())
}
