use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use pulse_store::config::Config;
use pulse_store::service::DataService;
use pulse_store::types::{CsvUploadLog, KpiFact, NewWorkspace, WorkspaceUpdate};

/// How long exit waits for in-flight snapshot refreshes.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(about = "Resilient access to ProductPulse workspaces, KPIs and integrations")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./pulse.yaml, then $XDG_CONFIG_HOME/pulse/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Act as this user id instead of asking the auth service
  #[arg(long)]
  user: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List workspaces (served from the local snapshot when present)
  Workspaces,
  /// Create a workspace owned by the current user
  CreateWorkspace {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "product")]
    kind: String,
    #[arg(long, default_value = "")]
    description: String,
  },
  /// Rename or re-describe a workspace
  UpdateWorkspace {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    description: Option<String>,
  },
  /// Tenants with KPI facts
  Tenants,
  /// Daily KPI facts of a tenant
  Facts {
    #[arg(long)]
    tenant: String,
    /// Only the last N days
    #[arg(long)]
    days: Option<i64>,
  },
  /// Upsert KPI facts from a JSON array file and record the upload
  Ingest {
    #[arg(long)]
    tenant: String,
    file: PathBuf,
  },
  Thresholds {
    #[arg(long)]
    tenant: String,
  },
  /// KPI definitions, optionally restricted to the given keys
  Dictionary {
    #[arg(long = "key")]
    keys: Vec<String>,
  },
  Ga4Settings,
  JiraConnection,
  Reports,
  /// Column headers of the CSV upload template
  Headers,
  /// Drop every local snapshot
  ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _guard = init_logging(config.log_dir.as_deref());

  let service = DataService::from_config(&config, args.user)?;
  let result = run(&service, args.command).await;

  // Let snapshot refreshes land before exiting, within reason
  let pending = service.cache().tasks().drain(SHUTDOWN_GRACE).await;
  if pending > 0 {
    warn!(pending, "abandoned background refreshes at exit");
  }

  result
}

/// Log to stderr, or to a daily rolling file when a directory is configured.
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let filter = EnvFilter::try_from_env("PULSE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "pulse.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      None
    }
  }
}

async fn run(service: &DataService, command: Command) -> Result<()> {
  match command {
    Command::Workspaces => {
      let loaded = service.workspaces().await;
      info!(source = ?loaded.source, count = loaded.data.len(), "workspaces loaded");
      print_json(&loaded.data)
    }
    Command::CreateWorkspace {
      name,
      kind,
      description,
    } => {
      let workspace = service
        .create_workspace(&NewWorkspace {
          name,
          kind,
          description,
        })
        .await?;
      print_json(&workspace)
    }
    Command::UpdateWorkspace {
      id,
      name,
      description,
    } => {
      let update = WorkspaceUpdate {
        name,
        kind: None,
        description,
      };
      print_json(&service.update_workspace(&id, &update).await?)
    }
    Command::Tenants => print_json(&service.available_tenants().await),
    Command::Facts { tenant, days } => {
      let facts = match days {
        Some(days) => service.facts_for_range(&tenant, days).await,
        None => service.tenant_facts(&tenant).await,
      };
      print_json(&facts)
    }
    Command::Ingest { tenant, file } => ingest(service, &tenant, &file).await,
    Command::Thresholds { tenant } => print_json(&service.tenant_thresholds(&tenant).await),
    Command::Dictionary { keys } => print_json(&service.kpi_dictionary(&keys).await),
    Command::Ga4Settings => print_json(&service.ga4_settings().await),
    Command::JiraConnection => print_json(&service.jira_connection().await),
    Command::Reports => print_json(&service.release_reports().await),
    Command::Headers => print_json(&service.csv_template_headers().await),
    Command::ClearCache => {
      service.cache().clear()?;
      info!("local snapshots cleared");
      Ok(())
    }
  }
}

async fn ingest(service: &DataService, tenant: &str, file: &Path) -> Result<()> {
  let raw = std::fs::read_to_string(file)?;
  let mut facts: Vec<KpiFact> = serde_json::from_str(&raw)?;
  for fact in &mut facts {
    fact.tenant_id = tenant.to_string();
  }

  let file_name = file
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let outcome = service.bulk_ingest_facts(&facts).await;

  let log = CsvUploadLog {
    id: None,
    tenant_id: tenant.to_string(),
    file_name,
    rows_ingested: if outcome.is_ok() { facts.len() as u64 } else { 0 },
    status: if outcome.is_ok() { "success" } else { "failed" }.to_string(),
    uploaded_at: None,
  };
  if let Err(e) = service.log_upload(&log).await {
    warn!("failed to record upload: {}", e);
  }

  outcome?;
  info!(rows = facts.len(), tenant, "facts ingested");
  Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
