use std::sync::Arc;

use action_capture::SimulatedBrowser;
use anyhow::{Context, Result};
use cdp_adapter::{
    resolve_mode, AdapterMode, BrowserPreference, BrowsingSurface, CdpBrowser, SurfaceFactory,
};
use clap::Args;
use tokio::io::BufReader;
use tracing::{info, warn};

use crate::channel::ServerChannel;
use crate::cli::context::CliContext;
use crate::host::{HostWindow, HostWindowState};
use crate::mode::{ControllerSettings, ModeController};
use crate::shell::Shell;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Surface backend: auto, real or stub
    #[arg(long)]
    pub browser: Option<BrowserPreference>,

    /// Do not connect to the automation server
    #[arg(long)]
    pub offline: bool,

    /// URL loaded into the hidden surface at startup
    #[arg(long)]
    pub start_url: Option<String>,
}

struct Surfaces {
    factory: Arc<dyn SurfaceFactory>,
    hidden: Arc<dyn BrowsingSurface>,
    cdp: Option<Arc<CdpBrowser>>,
}

async fn open_surfaces(ctx: &CliContext, preference: BrowserPreference) -> Result<Surfaces> {
    let config = ctx.config();
    let mut cdp_cfg = config.cdp_config();
    match resolve_mode(preference, &mut cdp_cfg)? {
        AdapterMode::Real => {
            let browser = Arc::new(CdpBrowser::new(cdp_cfg));
            Arc::clone(&browser)
                .start()
                .await
                .context("Failed to start Chromium")?;
            let hidden = browser
                .open_hidden()
                .await
                .context("Failed to open the hidden surface")?;
            Ok(Surfaces {
                factory: browser.clone() as Arc<dyn SurfaceFactory>,
                hidden: hidden as Arc<dyn BrowsingSurface>,
                cdp: Some(browser),
            })
        }
        AdapterMode::Stub => {
            let browser = Arc::new(SimulatedBrowser::new(
                config.recording.simulated_options(),
            ));
            let hidden = browser.hidden();
            Ok(Surfaces {
                factory: browser as Arc<dyn SurfaceFactory>,
                hidden: hidden as Arc<dyn BrowsingSurface>,
                cdp: None,
            })
        }
    }
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let preference = args.browser.unwrap_or(config.browser.mode);
    let surfaces = open_surfaces(ctx, preference).await?;

    if let Some(url) = &args.start_url {
        surfaces
            .hidden
            .load_url(url)
            .await
            .with_context(|| format!("Failed to load {url}"))?;
    }

    let host = Arc::new(HostWindowState::new(config.window.width, config.window.height));
    let controller = Arc::new(ModeController::new(
        ControllerSettings::from_config(config),
        Arc::clone(&surfaces.factory),
        host.clone() as Arc<dyn HostWindow>,
    ));
    controller.attach_hidden(Arc::clone(&surfaces.hidden));

    let mut shell = Shell::new(controller, Arc::clone(&host));
    if args.offline {
        info!("Running without automation server");
    } else {
        match ServerChannel::connect(&config.server).await {
            Ok((channel, updates)) => shell = shell.with_channel(channel, updates),
            Err(err) => warn!(
                url = %config.server.url,
                %err,
                "Automation server unreachable; continuing offline"
            ),
        }
    }

    println!(
        "workflow-shell ready ({} surfaces, metrics port {}). Type 'help' for commands.",
        if surfaces.cdp.is_some() { "chromium" } else { "simulated" },
        ctx.metrics_port()
    );
    let outcome = shell.run(BufReader::new(tokio::io::stdin())).await;

    if let Some(browser) = surfaces.cdp {
        browser.shutdown().await;
    }
    outcome.context("Shell terminated with an error")
}
