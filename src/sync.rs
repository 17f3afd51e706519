//! Dual-surface URL synchronisation.
//!
//! Each direction is driven by its own trigger: mode entry copies hidden →
//! interactive, interactive navigations and manual-mode exit copy
//! interactive → hidden. A surface's own navigation never triggers a load
//! back into it. Every failure is logged and reported, never propagated.

use std::sync::Arc;

use cdp_adapter::BrowsingSurface;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one best-effort synchronisation step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    Synced(String),
    Skipped,
    Failed(String),
}

impl SyncOutcome {
    pub fn url(&self) -> Option<&str> {
        match self {
            SyncOutcome::Synced(url) => Some(url),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Synchronizer {
    blank_url: String,
}

impl Synchronizer {
    pub fn new(blank_url: impl Into<String>) -> Self {
        Self {
            blank_url: blank_url.into(),
        }
    }

    /// Whether `url` points at real content.
    pub fn is_meaningful(&self, url: &str) -> bool {
        let url = url.trim();
        !url.is_empty() && url != self.blank_url && url != "about:blank"
    }

    /// Current URL of `surface` when it is meaningful. Read failures are
    /// logged and treated as "no URL".
    pub async fn meaningful_url<S>(&self, surface: &S) -> Option<String>
    where
        S: BrowsingSurface + ?Sized,
    {
        match surface.current_url().await {
            Ok(url) if self.is_meaningful(&url) => Some(url),
            Ok(_) => None,
            Err(err) => {
                warn!(target: "surface-sync", error = %err, "reading surface url failed");
                None
            }
        }
    }

    /// Loads the URL of `source` (or `fallback`) into `dest`.
    pub async fn mirror<S, D>(&self, source: &S, dest: &D, fallback: Option<&str>) -> SyncOutcome
    where
        S: BrowsingSurface + ?Sized,
        D: BrowsingSurface + ?Sized,
    {
        let url = match self.meaningful_url(source).await {
            Some(url) => url,
            None => match fallback {
                Some(fallback) => fallback.to_string(),
                None => return SyncOutcome::Skipped,
            },
        };
        self.load(dest, &url).await
    }

    /// Loads `url` into `dest` unless it is blank.
    pub async fn load<D>(&self, dest: &D, url: &str) -> SyncOutcome
    where
        D: BrowsingSurface + ?Sized,
    {
        if !self.is_meaningful(url) {
            return SyncOutcome::Skipped;
        }
        match dest.load_url(url).await {
            Ok(()) => {
                info!(target: "surface-sync", url, "surface synchronised");
                SyncOutcome::Synced(url.to_string())
            }
            Err(err) => {
                warn!(target: "surface-sync", url, error = %err, "surface sync failed");
                SyncOutcome::Failed(err.to_string())
            }
        }
    }

    /// Spawns a worker loading navigated URLs into `hidden` in order. When
    /// several are queued only the latest is loaded.
    pub fn spawn_follower<H>(
        &self,
        hidden: Arc<H>,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedSender<String>, JoinHandle<()>)
    where
        H: BrowsingSurface + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let sync = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let mut url = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = rx.recv() => match next {
                        Some(url) => url,
                        None => break,
                    },
                };
                while let Ok(newer) = rx.try_recv() {
                    debug!(target: "surface-sync", skipped = %url, "coalescing navigation");
                    url = newer;
                }
                sync.load(hidden.as_ref(), &url).await;
            }
        });
        (tx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use action_capture::SimulatedBrowser;
    use cdp_adapter::Isolation;
    use std::time::Duration;

    #[tokio::test]
    async fn mirror_falls_back_when_source_blank() {
        let browser = SimulatedBrowser::default();
        let hidden = browser.hidden();
        let interactive = browser.open(Isolation::Sandboxed).unwrap();
        let sync = Synchronizer::new("about:blank");

        let outcome = sync
            .mirror(hidden.as_ref(), interactive.as_ref(), Some("https://www.duckduckgo.com"))
            .await;
        assert_eq!(outcome, SyncOutcome::Synced("https://www.duckduckgo.com".into()));
        assert_eq!(interactive.url(), "https://www.duckduckgo.com");

        assert_eq!(
            sync.mirror(hidden.as_ref(), interactive.as_ref(), None).await,
            SyncOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn load_failure_is_reported_not_raised() {
        let browser = SimulatedBrowser::default();
        let hidden = browser.hidden();
        hidden.failures().fail_loads(true);
        let sync = Synchronizer::new("about:blank");
        assert!(matches!(
            sync.load(hidden.as_ref(), "https://example.com").await,
            SyncOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn follower_loads_latest_url() {
        let browser = SimulatedBrowser::default();
        let hidden = browser.hidden();
        let sync = Synchronizer::new("about:blank");
        let cancel = CancellationToken::new();
        let (tx, handle) = sync.spawn_follower(Arc::clone(&hidden), cancel.clone());

        tx.send("https://example.com/a".into()).unwrap();
        tx.send("https://example.com/b".into()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while hidden.url() != "https://example.com/b" {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        handle.await.unwrap();
    }
}
