//! Registry routing CDP sessions to the surfaces that own them.

use dashmap::DashMap;
use tokio::sync::broadcast;
use workflow_core_types::SurfaceId;

use crate::surface::SurfaceEvent;

#[derive(Clone, Debug)]
pub struct SurfaceRoute {
    pub surface: SurfaceId,
    pub target_id: String,
    pub cdp_session: String,
    pub events: broadcast::Sender<SurfaceEvent>,
}

/// Concurrent registry keyed by CDP session id, with a target index.
#[derive(Default)]
pub struct Registry {
    sessions: DashMap<String, SurfaceRoute>,
    targets: DashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, route: SurfaceRoute) {
        self.targets
            .insert(route.target_id.clone(), route.cdp_session.clone());
        self.sessions.insert(route.cdp_session.clone(), route);
    }

    pub fn by_session(&self, session: &str) -> Option<SurfaceRoute> {
        self.sessions.get(session).map(|entry| entry.value().clone())
    }

    pub fn by_target(&self, target_id: &str) -> Option<SurfaceRoute> {
        let session = self.targets.get(target_id)?.value().clone();
        self.by_session(&session)
    }

    pub fn remove_session(&self, session: &str) -> Option<SurfaceRoute> {
        let (_, route) = self.sessions.remove(session)?;
        self.targets.remove(&route.target_id);
        Some(route)
    }

    pub fn remove_target(&self, target_id: &str) -> Option<SurfaceRoute> {
        let (_, session) = self.targets.remove(target_id)?;
        self.sessions.remove(&session).map(|(_, route)| route)
    }

    /// Removes and returns every route.
    pub fn drain(&self) -> Vec<SurfaceRoute> {
        let keys: Vec<String> = self.sessions.iter().map(|kv| kv.key().clone()).collect();
        keys.iter()
            .filter_map(|key| self.remove_session(key))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(target: &str, session: &str) -> SurfaceRoute {
        let (events, _) = broadcast::channel(4);
        SurfaceRoute {
            surface: SurfaceId::new(),
            target_id: target.into(),
            cdp_session: session.into(),
            events,
        }
    }

    #[test]
    fn indexes_by_session_and_target() {
        let registry = Registry::new();
        registry.insert(route("T1", "S1"));
        registry.insert(route("T2", "S2"));

        assert_eq!(registry.by_target("T2").unwrap().cdp_session, "S2");
        assert!(registry.remove_target("T1").is_some());
        assert!(registry.by_session("S1").is_none());
        assert_eq!(registry.drain().len(), 1);
        assert!(registry.is_empty());
    }
}
