use std::path::PathBuf;

use action_capture::capture_script;
use anyhow::{Context, Result};
use clap::Args;
use tokio::fs;
use tracing::info;

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct ScriptArgs {
    /// Write the script to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub async fn cmd_script(args: ScriptArgs, ctx: &CliContext) -> Result<()> {
    let source = capture_script(&ctx.config().recording.script_options());
    match args.output {
        Some(path) => {
            fs::write(&path, source)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!("Capture script written to {}", path.display());
        }
        None => println!("{source}"),
    }
    Ok(())
}
