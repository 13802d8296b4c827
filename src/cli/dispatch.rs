use super::config::cmd_config;
use super::env::CliArgs;
use super::run::cmd_run;
use super::selectors::cmd_selectors;
use super::validate::cmd_validate;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx, &cli.output).await,
        Commands::Validate(args) => cmd_validate(args, &cli.output).await,
        Commands::Selectors(args) => cmd_selectors(args, &cli.output).await,
        Commands::Config(args) => cmd_config(args, ctx, &cli.output).await,
    }
}
