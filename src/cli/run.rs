use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use action_flow::{ExecutionRecord, ExecutionStatus, StepStatus};
use action_primitives::Host;
use anyhow::{bail, Context, Result};
use clap::Args;
use soulflow::hosts::{remote::DEFAULT_REQUEST_TIMEOUT, FixtureHost, RemoteHost, Surface};
use soulflow::loader::load_workflow;
use soulflow::Engine;
use soulflow_core_types::SessionId;
use soulflow_scheduler::SchedulerError;
use tokio::signal;
use tracing::{info, warn};

use crate::cli::context::CliContext;
use crate::cli::output::{emit, OutputFormat};
use crate::cli::runtime::parse_var;

/// Grace period for a cancelled execution to reach its terminal record.
const CANCEL_GRACE: Duration = Duration::from_secs(30);

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Workflow definition (JSON)
    pub workflow: PathBuf,

    /// Surface fixture for a local dry run
    #[arg(long, value_name = "FILE", conflicts_with = "remote")]
    pub fixture: Option<PathBuf>,

    /// Base url of a remote job host
    #[arg(long, value_name = "URL")]
    pub remote: Option<String>,

    /// Session reference handed to the host
    #[arg(long)]
    pub session: Option<String>,

    /// Extra workflow variables (KEY=VALUE, JSON values accepted)
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// Overall wait for the execution to finish
    #[arg(long, default_value = "10m", value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: &OutputFormat) -> Result<()> {
    let mut workflow = load_workflow(&args.workflow).await?;
    for var in &args.vars {
        let (key, value) = parse_var(var)?;
        workflow.variables.insert(key, value);
    }
    for issue in workflow.validate() {
        warn!(step = issue.step, action = %issue.action, "{}", issue.message);
    }

    let session = args
        .session
        .as_deref()
        .map(SessionId::from)
        .unwrap_or_default();
    let config = ctx.config();
    let monitor = Engine::monitor_for(config);

    let host: Arc<dyn Host> = match (&args.fixture, &args.remote) {
        (Some(path), _) => {
            let surface = Surface::load(path)
                .await
                .with_context(|| format!("loading fixture {}", path.display()))?;
            let host = FixtureHost::new(surface, Arc::clone(&monitor));
            host.open(&session)
                .await
                .context("opening the fixture start page")?;
            Arc::new(host)
        }
        (None, Some(base)) => Arc::new(RemoteHost::new(base, DEFAULT_REQUEST_TIMEOUT)?),
        (None, None) => bail!("either --fixture or --remote is required"),
    };

    let engine = Engine::new(config, host, monitor);
    let service = engine.service();
    let id = engine.submit(workflow, session.clone());
    info!(execution_id = %id, %session, "execution submitted");

    let record = tokio::select! {
        finished = service.wait_for_completion(&id, args.timeout) => match finished {
            Err(SchedulerError::WaitTimedOut(..)) => {
                warn!(execution_id = %id, timeout = ?args.timeout, "run timed out, cancelling");
                service.cancel(&id);
                service.wait_for_completion(&id, CANCEL_GRACE).await?
            }
            other => other?,
        },
        _ = signal::ctrl_c() => {
            warn!(execution_id = %id, "interrupt received, cancelling");
            service.cancel(&id);
            service.wait_for_completion(&id, CANCEL_GRACE).await?
        }
    };

    emit(&record, output, || describe(&record))?;
    if record.status != ExecutionStatus::Succeeded {
        bail!("execution {} finished {}", record.id, record.status);
    }
    Ok(())
}

fn describe(record: &ExecutionRecord) -> String {
    let mut lines = vec![format!(
        "execution {} {} ({}/{} steps, {} retries)",
        record.id,
        record.status,
        record.progress.completed,
        record.progress.total,
        record.total_retries()
    )];
    for step in &record.steps {
        let marker = match step.status {
            StepStatus::Succeeded => "ok",
            StepStatus::Failed => "FAILED",
            StepStatus::Cancelled => "cancelled",
            StepStatus::Pending => "-",
            StepStatus::Running | StepStatus::Retrying => "…",
        };
        let mut line = format!(
            "  [{}] {:<10} {:<9} attempts={}",
            step.index, step.action, marker, step.attempts
        );
        if let Some(selector) = &step.selector {
            line.push_str(&format!(" selector={}", selector));
            if step.healed {
                line.push_str(" (healed)");
            }
        }
        lines.push(line);
    }
    if let Some(error) = &record.last_error {
        lines.push(format!("  last error [{}]: {}", error.category, error.message));
        if !error.selectors.is_empty() {
            lines.push(format!("  tried: {}", error.selectors.join(", ")));
        }
    }
    lines.join("\n")
}
