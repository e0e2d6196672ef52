/// Channel cache behavior tests driven through a stub probe.
/// These verify the lazy population, fallback, and reset semantics
/// without touching the network.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use nixscout_mcp::common::channels::{ChannelCache, CountProbe};
use nixscout_mcp::common::config::{
    fallback_channels, CHANNEL_GENERATIONS, CHANNEL_VERSION_TOKENS,
};

struct StubProbe {
    counts: HashMap<String, u64>,
    calls: AtomicUsize,
}

impl StubProbe {
    fn new(entries: &[(&str, u64)]) -> Self {
        Self {
            counts: entries
                .iter()
                .map(|(pattern, count)| (pattern.to_string(), *count))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CountProbe for StubProbe {
    async fn count(&self, pattern: &str) -> Option<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.counts.get(pattern).copied()
    }
}

fn candidate_count() -> usize {
    CHANNEL_GENERATIONS.len() * CHANNEL_VERSION_TOKENS.len()
}

#[tokio::test]
async fn test_discovery_probes_every_candidate_once() {
    let cache = ChannelCache::with_probe(StubProbe::new(&[
        ("latest-44-nixos-unstable", 160_000),
        ("latest-44-nixos-25.11", 155_000),
    ]));

    let first = cache.get_available().await;
    assert_eq!(cache.probe_ref().calls(), candidate_count());
    assert_eq!(first.len(), 2);
    assert_eq!(
        first.get("latest-44-nixos-unstable"),
        Some("160,000 documents")
    );

    // Subsequent calls are served from the cache with no further probes.
    let second = cache.get_available().await;
    assert_eq!(first, second);
    let _ = cache.get_resolved().await;
    let _ = cache.get_resolved().await;
    assert_eq!(cache.probe_ref().calls(), candidate_count());
}

#[tokio::test]
async fn test_total_failure_yields_fallback() {
    let cache = ChannelCache::with_probe(StubProbe::new(&[]));

    let available = cache.get_available().await;
    assert!(available.is_empty());

    let resolved = cache.get_resolved().await;
    assert_eq!(resolved, fallback_channels());
    assert!(cache.using_fallback().await);
}

#[tokio::test]
async fn test_zero_counts_are_filtered_and_fall_back() {
    // HTTP 200 with count 0 must not appear in the availability map.
    let cache = ChannelCache::with_probe(StubProbe::new(&[
        ("latest-43-nixos-25.05", 0),
        ("latest-44-nixos-25.11", 0),
    ]));

    let available = cache.get_available().await;
    assert!(available.is_empty());

    let resolved = cache.get_resolved().await;
    assert_eq!(resolved, fallback_channels());
    assert!(cache.using_fallback().await);
}

#[tokio::test]
async fn test_resolution_scenario() {
    let cache = ChannelCache::with_probe(StubProbe::new(&[
        ("latest-44-nixos-unstable", 160_000),
        ("latest-44-nixos-25.11", 155_000),
        ("latest-44-nixos-25.05", 152_000),
        ("latest-43-nixos-25.05", 151_000),
    ]));

    let resolved = cache.get_resolved().await;
    assert_eq!(resolved["stable"], "latest-44-nixos-25.11");
    assert_eq!(resolved["unstable"], "latest-44-nixos-unstable");
    assert_eq!(resolved["25.11"], "latest-44-nixos-25.11");
    // Generation 44 wins the 25.05 slot over generation 43 by count.
    assert_eq!(resolved["25.05"], "latest-44-nixos-25.05");
    assert_eq!(resolved["beta"], "latest-44-nixos-25.11");
    assert!(!cache.using_fallback().await);
}

#[tokio::test]
async fn test_reset_forces_rediscovery_and_clears_fallback_flag() {
    let cache = ChannelCache::with_probe(StubProbe::new(&[]));

    let _ = cache.get_resolved().await;
    assert!(cache.using_fallback().await);
    assert_eq!(cache.probe_ref().calls(), candidate_count());

    cache.reset().await;
    assert!(!cache.using_fallback().await);

    let _ = cache.get_resolved().await;
    assert!(cache.using_fallback().await);
    assert_eq!(cache.probe_ref().calls(), 2 * candidate_count());
}

#[tokio::test]
async fn test_unstable_only_discovery_has_no_stable() {
    let cache = ChannelCache::with_probe(StubProbe::new(&[(
        "latest-43-nixos-unstable",
        140_000,
    )]));

    let resolved = cache.get_resolved().await;
    assert_eq!(resolved["unstable"], "latest-43-nixos-unstable");
    assert!(!resolved.contains_key("stable"));
    assert!(!resolved.contains_key("beta"));
    assert!(!cache.using_fallback().await);
}
