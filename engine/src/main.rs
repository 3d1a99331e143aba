use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use kindwatch_client::BackendClient;
use kindwatch_core::{ConfigStore, ReconcileError, WatchState, WatchTarget};
use kindwatch_observability::{
    canonical_logs_dir_from_root, emit_event, init_process_logging, redact_text,
    ObservabilityEvent, ProcessKind,
};
use kindwatch_types::{ExistenceVerdict, Operation, ReconciliationOutcome};

mod console;

use console::ConsoleObserver;

#[derive(Parser, Debug)]
#[command(name = "kindwatch")]
#[command(about = "Submit kind cluster operations and confirm what actually happened")]
struct Cli {
    /// Config file; defaults to $KINDWATCH_CONFIG or the user config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(long, global = true, env = "KINDWATCH_API_TOKEN", hide_env_values = true)]
    token: Option<String>,
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,
    /// Print results as JSON on stdout.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,
    #[arg(long, short, global = true, default_value_t = false)]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Create {
        name: String,
        #[arg(long, default_value_t = 1)]
        workers: u32,
        #[arg(long, default_value = "dev")]
        environment: String,
        /// Extra request parameter, `key=value`; values parse as JSON when they can.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    Delete {
        name: String,
    },
    SetLimits {
        name: String,
        #[arg(long)]
        worker_cpu: u32,
        #[arg(long)]
        worker_memory: String,
        #[arg(long = "cp-cpu")]
        control_plane_cpu: u32,
        #[arg(long = "cp-memory")]
        control_plane_memory: String,
    },
    /// Poll the existence probes until the cluster shows up (or disappears).
    Watch {
        name: String,
        #[arg(long, default_value_t = false)]
        absent: bool,
    },
    /// Run one existence check and print every probe's answer.
    Probe {
        name: String,
    },
    Health {
        name: Option<String>,
    },
    /// Print the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let logs_dir = resolve_logs_dir(cli.logs_dir.clone());
    let (_log_guard, log_info) = init_process_logging(ProcessKind::Cli, &logs_dir, 14)?;
    emit_event(
        tracing::Level::INFO,
        ProcessKind::Cli,
        ObservabilityEvent {
            event: "logging.initialized",
            component: "cli.main",
            status: Some("ok"),
            detail: Some("cli jsonl logging initialized"),
            ..Default::default()
        },
    );
    info!("cli logging initialized: {:?}", log_info);

    let overrides = build_cli_overrides(cli.base_url.clone(), cli.token.clone());
    let store = ConfigStore::load(cli.config.clone(), overrides)
        .await
        .context("failed to load configuration")?;

    if let Command::Config = cli.command {
        let mut effective = store.get_effective_value().await;
        redact_token(&mut effective);
        println!("{}", serde_json::to_string_pretty(&effective)?);
        return Ok(ExitCode::SUCCESS);
    }

    let config = store.get().await?;
    let client = BackendClient::connect(config).context("failed to set up backend client")?;
    let observer = Arc::new(ConsoleObserver::new(cli.quiet));
    let cancel = cancel_on_ctrl_c();

    match cli.command {
        Command::Create {
            name,
            workers,
            environment,
            params,
        } => {
            let mut operation = Operation::create(name)
                .with_param("worker_nodes", workers)
                .with_param("environment", environment);
            for (key, value) in params {
                operation = operation.with_param(key, value);
            }
            reconcile(&client, operation, observer, cancel, cli.json).await
        }
        Command::Delete { name } => {
            reconcile(&client, Operation::delete(name), observer, cancel, cli.json).await
        }
        Command::SetLimits {
            name,
            worker_cpu,
            worker_memory,
            control_plane_cpu,
            control_plane_memory,
        } => {
            let operation = Operation::update_limits(name)
                .with_param(
                    "worker_config",
                    json!({"cpu": worker_cpu, "memory": worker_memory}),
                )
                .with_param(
                    "control_plane_config",
                    json!({"cpu": control_plane_cpu, "memory": control_plane_memory}),
                );
            reconcile(&client, operation, observer, cancel, cli.json).await
        }
        Command::Watch { name, absent } => {
            let target = if absent {
                WatchTarget::Absent
            } else {
                WatchTarget::Present
            };
            let report = client
                .watcher()
                .run(&name, target, cancel, observer.as_ref())
                .await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{}: {:?} after {} checks",
                    report.resource, report.state, report.attempts
                );
            }
            Ok(exit_code(report.state == WatchState::Found))
        }
        Command::Probe { name } => {
            let report = client.oracle().check(&name).await;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "resource": report.resource,
                        "verdict": report.verdict,
                        "budget_exhausted": report.budget_exhausted,
                        "elapsed_ms": report.elapsed.as_millis() as u64,
                        "probes": report.results,
                    }))?
                );
            } else {
                for result in &report.results {
                    let answer = match (&result.error, result.found) {
                        (Some(err), _) => format!("error: {err}"),
                        (None, true) => "found".to_string(),
                        (None, false) => "not found".to_string(),
                    };
                    println!("{:<18} {:>6} ms  {}", result.probe, result.elapsed_ms, answer);
                }
                println!("verdict: {}", report.verdict.as_str());
            }
            Ok(exit_code(report.verdict == ExistenceVerdict::Found))
        }
        Command::Health { name } => {
            let value = match name {
                Some(name) => client.cluster_health(&name).await,
                None => client.health().await,
            }
            .context("health check failed")?;
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => Ok(ExitCode::SUCCESS),
    }
}

async fn reconcile(
    client: &BackendClient,
    operation: Operation,
    observer: Arc<ConsoleObserver>,
    cancel: CancellationToken,
    as_json: bool,
) -> anyhow::Result<ExitCode> {
    let result = client
        .reconciler()
        .run_with_cancel(operation, observer, cancel)
        .await;
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(ReconcileError::Cancelled) => return Ok(ExitCode::from(130)),
        Err(err) => return Err(err).context("operation rejected"),
    };
    print_outcome(&outcome, as_json)?;
    Ok(exit_code(outcome.success))
}

fn print_outcome(outcome: &ReconciliationOutcome, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    let verdict = if outcome.success { "succeeded" } else { "failed" };
    let overridden = if outcome.overridden { " (overridden)" } else { "" };
    println!(
        "{} {} {}{}: {}",
        outcome.kind,
        outcome.resource,
        verdict,
        overridden,
        outcome.message
    );
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}

fn resolve_logs_dir(flag: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = flag {
        return dir;
    }
    let root = dirs::data_local_dir()
        .map(|dir| dir.join("kindwatch"))
        .unwrap_or_else(|| PathBuf::from(".kindwatch"));
    canonical_logs_dir_from_root(&root)
}

fn build_cli_overrides(base_url: Option<String>, token: Option<String>) -> Option<Value> {
    let mut backend = Map::new();
    if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
        backend.insert("base_url".to_string(), Value::String(url.trim().to_string()));
    }
    if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
        backend.insert("api_token".to_string(), Value::String(token.trim().to_string()));
    }
    if backend.is_empty() {
        return None;
    }
    Some(json!({ "backend": backend }))
}

fn redact_token(effective: &mut Value) {
    if let Some(token) = effective
        .get_mut("backend")
        .and_then(|backend| backend.get_mut("api_token"))
    {
        if let Some(raw) = token.as_str() {
            *token = Value::String(redact_text(raw));
        }
    }
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in `{raw}`"));
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}
