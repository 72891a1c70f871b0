//! Sink registry and routing.
//!
//! A record is routed to exactly one sink. Selection order, first match
//! wins:
//!
//! 1. the sink named by the caller, if it supports the record type
//! 2. the configured default sink, if it supports the record type
//! 3. the first registered sink that supports the record type
//! 4. the no-op sink
//!
//! Resolutions are cached per (request, record type). A cached sink is
//! re-checked with `supports` on every hit, and registering a sink clears
//! the cache.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace};

use logship_core::{Error, LogSink, RecordKind, Result};
use logship_core::logging;

use crate::noop::{NoopSink, NOOP_SINK};

/// Whether a route came from a caller-named sink or fell through to
/// the default. Kept apart so a default resolution never answers a
/// later explicit request, or the reverse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Requested {
    Explicit(String),
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    requested: Requested,
    record_type: TypeId,
}

/// Registered sinks plus the route cache.
pub struct SinkRegistry {
    sinks: RwLock<Vec<Arc<dyn LogSink>>>,
    default_sink: String,
    noop: Arc<NoopSink>,
    routes: RwLock<HashMap<RouteKey, Arc<dyn LogSink>>>,
}

impl SinkRegistry {
    pub fn new(default_sink: impl Into<String>) -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
            default_sink: default_sink.into(),
            noop: Arc::new(NoopSink::new()),
            routes: RwLock::new(HashMap::new()),
        }
    }

    pub fn default_sink(&self) -> &str {
        &self.default_sink
    }

    pub fn noop(&self) -> &Arc<NoopSink> {
        &self.noop
    }

    /// Add a sink. A sink with the same name is replaced in place, so
    /// registration order is kept.
    pub fn register(&self, sink: Arc<dyn LogSink>) {
        let name = sink.name().to_string();
        {
            let mut sinks = self.sinks.write().unwrap_or_else(PoisonError::into_inner);
            match sinks.iter().position(|s| s.name() == name) {
                Some(i) => sinks[i] = sink,
                None => sinks.push(sink),
            }
        }
        self.clear_routes();
        debug!(
            subsystem = logging::SUBSYSTEM_DISPATCH,
            component = "router",
            sink = %name,
            "Registered sink"
        );
    }

    /// Registered sink names in registration order, no-op excluded.
    pub fn names(&self) -> Vec<String> {
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Look up a sink by name, including the no-op sink.
    pub fn get(&self, name: &str) -> Result<Arc<dyn LogSink>> {
        if name == NOOP_SINK {
            return Ok(self.noop.clone());
        }
        self.sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| Error::SinkUnavailable(format!("no sink named '{}'", name)))
    }

    pub fn clear_routes(&self) {
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Pick the sink for a record of `kind`. Never fails: the no-op sink
    /// is the last resort. An empty `requested` counts as no request.
    pub fn resolve(&self, kind: &RecordKind, requested: Option<&str>) -> Arc<dyn LogSink> {
        let requested = match requested {
            Some(name) if !name.is_empty() => Requested::Explicit(name.to_string()),
            _ => Requested::Default,
        };
        let key = RouteKey {
            requested,
            record_type: kind.type_id(),
        };

        let cached = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(sink) = cached {
            if sink.supports(kind) {
                return sink;
            }
        }

        match self.select(kind, &key.requested) {
            Some(sink) => {
                trace!(
                    subsystem = logging::SUBSYSTEM_DISPATCH,
                    component = "router",
                    record_type = kind.name(),
                    sink = sink.name(),
                    "Resolved sink"
                );
                self.routes
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(key, sink.clone());
                sink
            }
            // Not cached: a sink switched on later should win next time.
            None => self.noop.clone(),
        }
    }

    fn select(&self, kind: &RecordKind, requested: &Requested) -> Option<Arc<dyn LogSink>> {
        let sinks = self.sinks.read().unwrap_or_else(PoisonError::into_inner);
        let named = |name: &str| -> Option<Arc<dyn LogSink>> {
            if name == NOOP_SINK {
                return Some(self.noop.clone() as Arc<dyn LogSink>);
            }
            sinks
                .iter()
                .find(|s| s.name() == name && s.supports(kind))
                .cloned()
        };

        if let Requested::Explicit(name) = requested {
            if let Some(sink) = named(name) {
                return Some(sink);
            }
        }
        named(&self.default_sink).or_else(|| sinks.iter().find(|s| s.supports(kind)).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSink;
    use logship_core::{DefaultLog, OperationLog, UserAccessLog};

    fn kinds() -> (RecordKind, RecordKind) {
        (
            RecordKind::of::<OperationLog>(),
            RecordKind::of::<UserAccessLog>(),
        )
    }

    #[test]
    fn test_requested_sink_wins_when_supported() {
        let (x, _) = kinds();
        let registry = SinkRegistry::new("b");
        registry.register(Arc::new(MockSink::new("a").accepting(x)));
        registry.register(Arc::new(MockSink::new("b")));

        assert_eq!(registry.resolve(&x, Some("a")).name(), "a");
    }

    #[test]
    fn test_unsupported_request_falls_through() {
        let (x, y) = kinds();
        let registry = SinkRegistry::new("missing");
        registry.register(Arc::new(MockSink::new("a").accepting(x)));
        registry.register(Arc::new(MockSink::new("b")));

        assert_eq!(registry.resolve(&y, Some("a")).name(), "b");
    }

    #[test]
    fn test_empty_request_uses_default() {
        let (x, y) = kinds();
        let registry = SinkRegistry::new("b");
        registry.register(Arc::new(MockSink::new("a")));
        registry.register(Arc::new(MockSink::new("b")));

        assert_eq!(registry.resolve(&x, Some("")).name(), "b");
        assert_eq!(registry.resolve(&y, None).name(), "b");
    }

    #[test]
    fn test_first_capable_then_noop() {
        let (x, y) = kinds();
        let registry = SinkRegistry::new("missing");
        registry.register(Arc::new(MockSink::new("a").accepting(x)));

        assert_eq!(registry.resolve(&x, None).name(), "a");
        assert_eq!(registry.resolve(&y, None).name(), NOOP_SINK);
    }

    #[test]
    fn test_empty_registry_resolves_noop() {
        let registry = SinkRegistry::new("queue");
        let sink = registry.resolve(&RecordKind::of::<DefaultLog>(), Some("queue"));
        assert_eq!(sink.name(), NOOP_SINK);
    }

    #[test]
    fn test_explicit_and_default_routes_are_cached_apart() {
        let (x, _) = kinds();
        let registry = SinkRegistry::new("b");
        registry.register(Arc::new(MockSink::new("a")));
        registry.register(Arc::new(MockSink::new("b")));

        assert_eq!(registry.resolve(&x, None).name(), "b");
        assert_eq!(registry.resolve(&x, Some("a")).name(), "a");
        assert_eq!(registry.resolve(&x, None).name(), "b");
    }

    #[test]
    fn test_cached_route_rechecked_after_switch_off() {
        let (x, _) = kinds();
        let a = Arc::new(MockSink::new("a"));
        let registry = SinkRegistry::new("a");
        registry.register(a.clone());
        registry.register(Arc::new(MockSink::new("b")));

        assert_eq!(registry.resolve(&x, None).name(), "a");
        a.switch().set_enabled(false);
        assert_eq!(registry.resolve(&x, None).name(), "b");
    }

    #[test]
    fn test_noop_fallback_not_cached() {
        let (x, _) = kinds();
        let a = Arc::new(MockSink::new("a"));
        a.switch().set_enabled(false);
        let registry = SinkRegistry::new("a");
        registry.register(a.clone());

        assert_eq!(registry.resolve(&x, None).name(), NOOP_SINK);
        a.switch().set_enabled(true);
        assert_eq!(registry.resolve(&x, None).name(), "a");
    }

    #[test]
    fn test_register_replaces_same_name_and_clears_routes() {
        let (x, _) = kinds();
        let registry = SinkRegistry::new("a");
        registry.register(Arc::new(MockSink::new("a").accepting(RecordKind::of::<DefaultLog>())));
        registry.register(Arc::new(MockSink::new("b")));
        assert_eq!(registry.resolve(&x, None).name(), "b");

        registry.register(Arc::new(MockSink::new("a")));
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.resolve(&x, None).name(), "a");
    }

    #[test]
    fn test_get_by_name() {
        let registry = SinkRegistry::new("queue");
        registry.register(Arc::new(MockSink::new("http")));

        assert_eq!(registry.get("http").unwrap().name(), "http");
        assert_eq!(registry.get(NOOP_SINK).unwrap().name(), NOOP_SINK);
        assert!(matches!(
            registry.get("search"),
            Err(Error::SinkUnavailable(_))
        ));
    }

    #[test]
    fn test_requesting_noop_by_name() {
        let registry = SinkRegistry::new("b");
        registry.register(Arc::new(MockSink::new("b")));
        let sink = registry.resolve(&RecordKind::of::<DefaultLog>(), Some(NOOP_SINK));
        assert_eq!(sink.name(), NOOP_SINK);
    }
}
