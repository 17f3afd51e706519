use super::config::cmd_config;
use super::env::CliArgs;
use super::run::cmd_run;
use super::script::cmd_script;
use super::selectors::cmd_selectors;
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;
use anyhow::Result;

pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<()> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Config(args) => cmd_config(args, ctx).await,
        Commands::Selectors(args) => cmd_selectors(args, ctx).await,
        Commands::Script(args) => cmd_script(args, ctx).await,
    }
}
