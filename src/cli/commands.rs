use clap::Subcommand;

use super::config::ConfigArgs;
use super::run::RunArgs;
use super::selectors::SelectorsArgs;
use super::validate::ValidateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Execute a workflow against a fixture surface or a remote host
    Run(RunArgs),

    /// Parse a workflow and report steps missing required parameters
    Validate(ValidateArgs),

    /// Print the ranked selector set generated from an element descriptor
    Selectors(SelectorsArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),
}
