use std::path::PathBuf;

use action_flow::{Step, ValidationIssue};
use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use soulflow::loader::load_workflow;

use crate::cli::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Workflow definition (JSON)
    pub workflow: PathBuf,
}

#[derive(Serialize)]
struct StepSummary {
    index: usize,
    label: String,
    action: String,
    target: Option<String>,
}

#[derive(Serialize)]
struct ValidationReport {
    workflow: Option<String>,
    steps: Vec<StepSummary>,
    issues: Vec<ValidationIssue>,
}

pub async fn cmd_validate(args: ValidateArgs, output: &OutputFormat) -> Result<()> {
    let workflow = load_workflow(&args.workflow).await?;

    let report = ValidationReport {
        workflow: workflow.reference(),
        steps: workflow
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| StepSummary {
                index,
                label: step.label(index),
                action: step.action.to_string(),
                target: target_of(step),
            })
            .collect(),
        issues: workflow.validate(),
    };

    emit(&report, output, || {
        let mut lines: Vec<String> = report
            .steps
            .iter()
            .map(|step| match &step.target {
                Some(target) => format!(
                    "  [{}] {} {} -> {}",
                    step.index, step.label, step.action, target
                ),
                None => format!("  [{}] {} {}", step.index, step.label, step.action),
            })
            .collect();
        lines.insert(0, format!("{} step(s)", report.steps.len()));
        for issue in &report.issues {
            lines.push(format!("  ! {}", issue));
        }
        lines.join("\n")
    })?;

    if !report.issues.is_empty() {
        bail!("{} validation issue(s)", report.issues.len());
    }
    Ok(())
}

fn target_of(step: &Step) -> Option<String> {
    if let Some(selector) = step.parameters.get("selector").and_then(|v| v.as_str()) {
        return Some(selector.to_string());
    }
    if let Some(first) = step.selectors.as_ref().and_then(|s| s.first()) {
        return Some(first.clone());
    }
    if let Some(url) = step.parameters.get("url").and_then(|v| v.as_str()) {
        return Some(url.to_string());
    }
    step.descriptor.as_ref().map(|_| "<descriptor>".to_string())
}
