use std::path::PathBuf;

use action_locator::SelectorGenerator;
use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use soulflow::loader::load_descriptor;

use crate::cli::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct SelectorsArgs {
    /// Element descriptor (JSON)
    pub descriptor: PathBuf,
}

#[derive(Serialize)]
struct Candidate {
    rank: usize,
    strategy: &'static str,
    selector: String,
}

pub async fn cmd_selectors(args: SelectorsArgs, output: &OutputFormat) -> Result<()> {
    let descriptor = load_descriptor(&args.descriptor).await?;

    let candidates: Vec<Candidate> = SelectorGenerator::new()
        .ranked(&descriptor)
        .into_iter()
        .enumerate()
        .map(|(rank, (strategy, selector))| Candidate {
            rank: rank + 1,
            strategy: strategy.name(),
            selector,
        })
        .collect();
    if candidates.is_empty() {
        bail!("descriptor yields no selectors");
    }

    emit(&candidates, output, || {
        candidates
            .iter()
            .map(|c| format!("{:>2}. {:<12} {}", c.rank, c.strategy, c.selector))
            .collect::<Vec<_>>()
            .join("\n")
    })
}
