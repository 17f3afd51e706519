use clap::Subcommand;

use super::config::ConfigArgs;
use super::run::RunArgs;
use super::script::ScriptArgs;
use super::selectors::SelectorsArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Start the shell: browser surfaces, server channel and operator console
    Run(RunArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),

    /// Report the selectors generated for a live page's interactive elements
    Selectors(SelectorsArgs),

    /// Print the capture listener injected into recording surfaces
    Script(ScriptArgs),
}
