use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(any(feature = "metrics", test))]
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};

/// Live counters of a [`Group`](crate::Group).
///
/// Counters only ever grow and are updated with relaxed ordering; read them through
/// [`snapshot`](Self::snapshot). With the `metrics` feature, a group built with
/// [`GroupBuilder::metrics`](crate::GroupBuilder::metrics) also publishes every increment
/// to the `shardcache.group.event.count` OpenTelemetry counter.
#[derive(Debug, Default)]
pub struct GroupStats {
    gets: AtomicU64,
    cache_hits: AtomicU64,
    peer_loads: AtomicU64,
    peer_errors: AtomicU64,
    loads: AtomicU64,
    loads_deduped: AtomicU64,
    local_loads: AtomicU64,
    local_load_errs: AtomicU64,
    server_requests: AtomicU64,
    #[cfg(any(feature = "metrics", test))]
    exported: Option<EventCounter>,
}

#[cfg(any(feature = "metrics", test))]
#[derive(Debug)]
struct EventCounter {
    counter: Counter<u64>,
    group: KeyValue,
}

/// Something a group counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GroupEvent {
    Get,
    CacheHit,
    PeerLoad,
    PeerError,
    Load,
    LoadDeduped,
    LocalLoad,
    LocalLoadErr,
    ServerRequest,
}

impl GroupEvent {
    #[cfg_attr(not(any(feature = "metrics", test)), expect(dead_code, reason = "only exported as a metric attribute"))]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "group.get",
            Self::CacheHit => "group.cache_hit",
            Self::PeerLoad => "group.peer_load",
            Self::PeerError => "group.peer_error",
            Self::Load => "group.load",
            Self::LoadDeduped => "group.load_deduped",
            Self::LocalLoad => "group.local_load",
            Self::LocalLoadErr => "group.local_load_err",
            Self::ServerRequest => "group.server_request",
        }
    }
}

/// A point-in-time copy of [`GroupStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct GroupStatsSnapshot {
    /// Lookups issued, including ones rejected for an empty key.
    pub gets: u64,
    /// Lookups answered from the local cache.
    pub cache_hits: u64,
    /// Values obtained from a peer.
    pub peer_loads: u64,
    /// Failed or timed out peer fetches.
    pub peer_errors: u64,
    /// Lookups that missed the local cache.
    pub loads: u64,
    /// Loads that actually executed after request coalescing.
    pub loads_deduped: u64,
    /// Successful origin loads.
    pub local_loads: u64,
    /// Failed origin loads.
    pub local_load_errs: u64,
    /// Requests served to peers by a transport.
    pub server_requests: u64,
}

impl GroupStats {
    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> GroupStatsSnapshot {
        GroupStatsSnapshot {
            gets: read(&self.gets),
            cache_hits: read(&self.cache_hits),
            peer_loads: read(&self.peer_loads),
            peer_errors: read(&self.peer_errors),
            loads: read(&self.loads),
            loads_deduped: read(&self.loads_deduped),
            local_loads: read(&self.local_loads),
            local_load_errs: read(&self.local_load_errs),
            server_requests: read(&self.server_requests),
        }
    }

    #[cfg(any(feature = "metrics", test))]
    pub(crate) fn exported(group: &str, meter: &Meter) -> Self {
        Self {
            exported: Some(EventCounter {
                counter: crate::metrics::create_event_counter(meter),
                group: KeyValue::new(crate::metrics::GROUP_NAME, group.to_owned()),
            }),
            ..Self::default()
        }
    }

    pub(crate) fn record_get(&self) {
        self.record(GroupEvent::Get);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.record(GroupEvent::CacheHit);
    }

    pub(crate) fn record_peer_load(&self) {
        self.record(GroupEvent::PeerLoad);
    }

    pub(crate) fn record_peer_error(&self) {
        self.record(GroupEvent::PeerError);
    }

    pub(crate) fn record_load(&self) {
        self.record(GroupEvent::Load);
    }

    pub(crate) fn record_load_deduped(&self) {
        self.record(GroupEvent::LoadDeduped);
    }

    pub(crate) fn record_local_load(&self) {
        self.record(GroupEvent::LocalLoad);
    }

    pub(crate) fn record_local_load_err(&self) {
        self.record(GroupEvent::LocalLoadErr);
    }

    pub(crate) fn record_server_request(&self) {
        self.record(GroupEvent::ServerRequest);
    }

    fn record(&self, event: GroupEvent) {
        self.counter(event).fetch_add(1, Ordering::Relaxed);

        #[cfg(any(feature = "metrics", test))]
        if let Some(exported) = &self.exported {
            let attributes = [
                exported.group.clone(),
                KeyValue::new(crate::metrics::GROUP_EVENT, event.as_str()),
            ];
            exported.counter.add(1, &attributes);
        }
    }

    fn counter(&self, event: GroupEvent) -> &AtomicU64 {
        match event {
            GroupEvent::Get => &self.gets,
            GroupEvent::CacheHit => &self.cache_hits,
            GroupEvent::PeerLoad => &self.peer_loads,
            GroupEvent::PeerError => &self.peer_errors,
            GroupEvent::Load => &self.loads,
            GroupEvent::LoadDeduped => &self.loads_deduped,
            GroupEvent::LocalLoad => &self.local_loads,
            GroupEvent::LocalLoadErr => &self.local_load_errs,
            GroupEvent::ServerRequest => &self.server_requests,
        }
    }
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use opentelemetry::metrics::MeterProvider;

    use super::*;
    use crate::testing::MetricTester;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = GroupStats::default();
        stats.record_get();
        stats.record_get();
        stats.record_cache_hit();
        stats.record_server_request();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.gets, 2);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.server_requests, 1);
        assert_eq!(snapshot.loads, 0);
    }

    #[test]
    fn exported_counter_follows_snapshot() {
        let tester = MetricTester::new();
        let meter = tester.meter_provider().meter("shardcache");
        let stats = GroupStats::exported("scores", &meter);

        stats.record_get();
        stats.record_get();
        stats.record_load();
        stats.record_local_load_err();

        assert_eq!(tester.event_count("scores", GroupEvent::Get), 2);
        assert_eq!(tester.event_count("scores", GroupEvent::Load), 1);
        assert_eq!(tester.event_count("scores", GroupEvent::LocalLoadErr), 1);
        assert_eq!(tester.event_count("scores", GroupEvent::CacheHit), 0);
        assert_eq!(tester.event_count("other", GroupEvent::Get), 0);
        assert_eq!(stats.snapshot().gets, 2);
    }

    #[test]
    fn event_names_are_distinct() {
        let events = [
            GroupEvent::Get,
            GroupEvent::CacheHit,
            GroupEvent::PeerLoad,
            GroupEvent::PeerError,
            GroupEvent::Load,
            GroupEvent::LoadDeduped,
            GroupEvent::LocalLoad,
            GroupEvent::LocalLoadErr,
            GroupEvent::ServerRequest,
        ];
        let names: std::collections::HashSet<_> = events.iter().map(|event| event.as_str()).collect();
        assert_eq!(names.len(), events.len());
    }
}
