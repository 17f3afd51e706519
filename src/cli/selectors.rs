use std::sync::Arc;

use action_locator::{
    count_matches_script, diagnose, dump_script, parse_match_counts, DomSnapshot, SelectorReport,
};
use anyhow::{Context, Result};
use cdp_adapter::{
    resolve_mode, BrowserPreference, BrowsingSurface, CdpBrowser, InteractiveSurface, Isolation,
};
use clap::Args;
use tracing::{info, warn};
use url::Url;

use crate::cli::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct SelectorsArgs {
    /// Page to analyse
    #[arg(long)]
    pub url: String,

    /// Print the reports as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn cmd_selectors(args: SelectorsArgs, ctx: &CliContext) -> Result<()> {
    let url = Url::parse(&args.url).context("Invalid --url")?;
    let mut cdp_cfg = ctx.config().cdp_config();
    resolve_mode(BrowserPreference::Real, &mut cdp_cfg)?;

    let browser = Arc::new(CdpBrowser::new(cdp_cfg));
    Arc::clone(&browser)
        .start()
        .await
        .context("Failed to start Chromium")?;
    let outcome = diagnose_page(&browser, url.as_str()).await;
    browser.shutdown().await;
    let reports = outcome?;

    info!(url = %url, elements = reports.len(), "selector diagnosis finished");
    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print!("{}", render_reports(&reports));
    }
    Ok(())
}

async fn diagnose_page(browser: &CdpBrowser, url: &str) -> Result<Vec<SelectorReport>> {
    let page = browser.open_page(Isolation::Sandboxed).await?;
    let outcome = async {
        page.load_url(url).await?;
        let raw = page.execute_script(&dump_script()).await?;
        let raw = raw.as_str().context("DOM dump returned no JSON string")?;
        let (tree, targets) = DomSnapshot::from_json(raw)?.into_tree()?;
        let mut reports = diagnose(&tree, &targets);

        let selectors: Vec<String> = reports.iter().map(|r| r.selector.clone()).collect();
        let counts = page.execute_script(&count_matches_script(&selectors)).await?;
        let counts = parse_match_counts(counts.as_str().unwrap_or("[]"))?;
        for (report, matches) in reports.iter_mut().zip(counts) {
            report.matches = matches;
        }
        Ok::<_, anyhow::Error>(reports)
    }
    .await;
    if let Err(err) = page.close().await {
        warn!(%err, "closing diagnosis page failed");
    }
    outcome
}

/// One line per element: live match count, tag, selector.
pub fn render_reports(reports: &[SelectorReport]) -> String {
    let mut out = String::new();
    for report in reports {
        let matches = report
            .matches
            .map(|count| count.to_string())
            .unwrap_or_else(|| "?".to_string());
        let flag = if report.is_unique() { ' ' } else { '!' };
        out.push_str(&format!(
            "{flag}{matches:>4}  {:<10} {}\n",
            report.tag, report.selector
        ));
    }
    let ambiguous = reports.iter().filter(|r| !r.is_unique()).count();
    out.push_str(&format!(
        "{} elements, {} without a unique selector\n",
        reports.len(),
        ambiguous
    ));
    out
}
