//! Channel discovery and resolution for the NixOS search backend.
//!
//! The backend names its indices `latest-{generation}-nixos-{version}` and
//! renames them as releases ship, so nothing downstream can hardcode an
//! index. This module probes the cross product of known generations and
//! version tokens once per process, classifies what it finds, and exposes a
//! small stable vocabulary of logical channel names (`unstable`, `stable`,
//! `beta`, and each numeric version) mapped onto real index patterns.
//!
//! Discovery never fails: a candidate that times out, errors, or reports
//! zero documents is simply absent. When nothing at all can be classified,
//! the static fallback table from [`config`](crate::common::config) is used
//! and the sticky `using_fallback` flag is raised for callers that want to
//! print a warning.

use std::collections::BTreeMap;
use std::future::Future;

use tokio::sync::Mutex;

use crate::common::config::{
    fallback_channels, CHANNEL_GENERATIONS, CHANNEL_VERSION_TOKENS,
};
use crate::common::format::group_thousands;
use crate::common::http::HttpClient;

/// Insertion-ordered map of index pattern to a document-count label such as
/// `"151,798 documents"`.
///
/// Order matters: resolution picks the first unstable pattern it sees, and
/// discovery inserts in a fixed order (generation ascending, then version
/// list order), which makes that pick deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilityMap {
    entries: Vec<(String, String)>,
}

impl AvailabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any existing entry for the same pattern
    /// in place.
    pub fn insert(&mut self, pattern: impl Into<String>, label: impl Into<String>) {
        let pattern = pattern.into();
        let label = label.into();
        match self.entries.iter_mut().find(|(p, _)| *p == pattern) {
            Some(entry) => entry.1 = label,
            None => self.entries.push((pattern, label)),
        }
    }

    pub fn get(&self, pattern: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == pattern)
            .map(|(_, label)| label.as_str())
    }

    pub fn contains(&self, pattern: &str) -> bool {
        self.get(pattern).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(p, l)| (p.as_str(), l.as_str()))
    }
}

impl FromIterator<(String, String)> for AvailabilityMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (pattern, label) in iter {
            map.insert(pattern, label);
        }
        map
    }
}

/// Resolved logical-name to index-pattern mapping.
pub type ResolvedChannels = BTreeMap<String, String>;

/// Document-count probe for one candidate index.
///
/// `None` means "not available" whatever the cause - unreachable backend,
/// non-2xx status, or an unreadable body. Discovery treats every failure
/// the same way, but keeping the probe behind a trait lets tests drive the
/// cache without a network and leaves room for finer telemetry later.
pub trait CountProbe: Send + Sync {
    fn count(&self, pattern: &str) -> impl Future<Output = Option<u64>> + Send;
}

/// Probe backed by the search backend's `_count` endpoint.
pub struct EsCountProbe {
    http: HttpClient,
}

impl EsCountProbe {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }
}

impl CountProbe for EsCountProbe {
    async fn count(&self, pattern: &str) -> Option<u64> {
        match self
            .http
            .es_count(pattern, serde_json::json!({ "match_all": {} }))
            .await
        {
            Ok(count) => Some(count),
            Err(err) => {
                tracing::debug!(pattern, %err, "channel probe failed");
                None
            }
        }
    }
}

#[derive(Default)]
struct ChannelState {
    available: Option<AvailabilityMap>,
    resolved: Option<ResolvedChannels>,
    using_fallback: bool,
}

/// Process-wide cache of discovered and resolved channels.
///
/// Each field is populated at most once, on the first call of the
/// corresponding getter, and reused for the process lifetime; [`reset`]
/// (used by tests and administrative reloads) is the only way back. The
/// mutex is held across discovery so concurrent first callers probe once.
///
/// [`reset`]: ChannelCache::reset
pub struct ChannelCache<P = EsCountProbe> {
    probe: P,
    state: Mutex<ChannelState>,
}

impl ChannelCache<EsCountProbe> {
    pub fn new(http: HttpClient) -> Self {
        Self::with_probe(EsCountProbe::new(http))
    }
}

impl<P: CountProbe> ChannelCache<P> {
    pub fn with_probe(probe: P) -> Self {
        Self {
            probe,
            state: Mutex::new(ChannelState::default()),
        }
    }

    /// The injected probe. Tests use this to count issued requests.
    pub fn probe_ref(&self) -> &P {
        &self.probe
    }

    /// Discovered index patterns with document counts. Probes the backend
    /// on first call; never fails - total discovery failure yields an
    /// empty map.
    pub async fn get_available(&self) -> AvailabilityMap {
        let mut state = self.state.lock().await;
        if state.available.is_none() {
            state.available = Some(self.discover().await);
        }
        state.available.clone().unwrap_or_default()
    }

    /// Logical channel names resolved onto index patterns. Triggers
    /// discovery if needed; degrades to the static fallback table when
    /// nothing usable was discovered.
    pub async fn get_resolved(&self) -> ResolvedChannels {
        let mut state = self.state.lock().await;
        if let Some(resolved) = &state.resolved {
            return resolved.clone();
        }
        if state.available.is_none() {
            state.available = Some(self.discover().await);
        }
        let available = state.available.clone().unwrap_or_default();
        let resolved = match resolve_channels(&available) {
            Some(resolved) => resolved,
            None => {
                tracing::warn!("channel discovery unusable, using fallback table");
                state.using_fallback = true;
                fallback_channels()
            }
        };
        state.resolved = Some(resolved.clone());
        resolved
    }

    /// True when the resolved map came from the fallback table. Sticky
    /// until [`reset`](Self::reset).
    pub async fn using_fallback(&self) -> bool {
        self.state.lock().await.using_fallback
    }

    /// Drop all cached state, forcing rediscovery on the next getter call.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = ChannelState::default();
    }

    async fn discover(&self) -> AvailabilityMap {
        let mut available = AvailabilityMap::new();
        for generation in CHANNEL_GENERATIONS {
            for version in CHANNEL_VERSION_TOKENS {
                let pattern = format!("latest-{}-nixos-{}", generation, version);
                if let Some(count) = self.probe.count(&pattern).await {
                    if count > 0 {
                        available.insert(pattern, format!("{} documents", group_thousands(count)));
                    }
                }
            }
        }
        tracing::info!(indices = available.len(), "channel discovery finished");
        available
    }
}

/// One classifiable non-unstable entry of the availability map.
#[derive(Debug)]
struct VersionCandidate {
    major: u32,
    minor: u32,
    version: String,
    pattern: String,
    count: u64,
}

impl VersionCandidate {
    /// Parse `latest-{gen}-nixos-{major}.{minor}` plus its count label.
    /// Anything that does not fit stays in the availability map but takes
    /// no part in stable/version classification.
    fn parse(pattern: &str, label: &str) -> Option<Self> {
        let parts: Vec<&str> = pattern.split('-').collect();
        if parts.len() < 4 {
            return None;
        }
        let version = parts[3];
        let (major_str, minor_str) = version.split_once('.')?;
        if minor_str.contains('.') {
            return None;
        }
        let major: u32 = major_str.parse().ok()?;
        let minor: u32 = minor_str.parse().ok()?;
        let count: u64 = label
            .replace(',', "")
            .replace(" documents", "")
            .parse()
            .ok()?;
        Some(Self {
            major,
            minor,
            version: version.to_string(),
            pattern: pattern.to_string(),
            count,
        })
    }
}

/// Classify an availability map into logical channel names.
///
/// Returns `None` when the map is empty or nothing in it can be classified,
/// in which case the caller switches to the fallback table.
pub fn resolve_channels(available: &AvailabilityMap) -> Option<ResolvedChannels> {
    if available.is_empty() {
        return None;
    }

    let mut resolved = ResolvedChannels::new();

    // First unstable pattern in availability order wins. Discovery inserts
    // generation-ascending, so this is the lowest probed generation.
    if let Some((pattern, _)) = available.iter().find(|(p, _)| p.contains("unstable")) {
        resolved.insert("unstable".to_string(), pattern.to_string());
    }

    let candidates: Vec<VersionCandidate> = available
        .iter()
        .filter(|(pattern, _)| !pattern.contains("unstable"))
        .filter_map(|(pattern, label)| VersionCandidate::parse(pattern, label))
        .collect();

    if !candidates.is_empty() {
        // Per-version best document count, first seen winning ties.
        let mut per_version: Vec<(String, String, u64)> = Vec::new();
        for candidate in &candidates {
            match per_version.iter_mut().find(|(v, _, _)| *v == candidate.version) {
                Some(entry) => {
                    if candidate.count > entry.2 {
                        entry.1 = candidate.pattern.clone();
                        entry.2 = candidate.count;
                    }
                }
                None => per_version.push((
                    candidate.version.clone(),
                    candidate.pattern.clone(),
                    candidate.count,
                )),
            }
        }

        // Stable is the globally best candidate: highest (major, minor)
        // outright, document count only breaking exact version ties, and
        // the lexicographically smallest pattern deciding full ties.
        let mut ranked: Vec<&VersionCandidate> = candidates.iter().collect();
        ranked.sort_by(|a, b| {
            (b.major, b.minor, b.count)
                .cmp(&(a.major, a.minor, a.count))
                .then_with(|| a.pattern.cmp(&b.pattern))
        });
        let stable = ranked[0];
        resolved.insert("stable".to_string(), stable.pattern.clone());
        resolved.insert(stable.version.clone(), stable.pattern.clone());

        for (version, pattern, _count) in per_version {
            resolved.insert(version, pattern);
        }
    }

    if let Some(stable) = resolved.get("stable").cloned() {
        resolved.insert("beta".to_string(), stable);
    }

    if resolved.is_empty() {
        return None;
    }
    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn map(entries: &[(&str, &str)]) -> AvailabilityMap {
        entries
            .iter()
            .map(|(p, l)| (p.to_string(), l.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_availability_is_unclassifiable() {
        assert!(resolve_channels(&AvailabilityMap::new()).is_none());
    }

    #[test]
    fn test_higher_version_beats_higher_count() {
        let available = map(&[
            ("latest-44-nixos-24.11", "150,000 documents"),
            ("latest-44-nixos-25.05", "140,000 documents"),
            ("latest-44-nixos-unstable", "155,000 documents"),
        ]);
        let resolved = resolve_channels(&available).unwrap();
        assert_eq!(resolved["stable"], "latest-44-nixos-25.05");
        assert_eq!(resolved["unstable"], "latest-44-nixos-unstable");
    }

    #[test]
    fn test_count_breaks_version_tie() {
        let available = map(&[
            ("latest-43-nixos-25.05", "150,000 documents"),
            ("latest-44-nixos-25.05", "155,000 documents"),
        ]);
        let resolved = resolve_channels(&available).unwrap();
        assert_eq!(resolved["stable"], "latest-44-nixos-25.05");
        assert_eq!(resolved["25.05"], "latest-44-nixos-25.05");
    }

    #[test]
    fn test_version_alias_tracks_best_count_not_stable() {
        // 25.05 is not the global stable, but its alias still points at
        // the generation with the most documents for that version.
        let available = map(&[
            ("latest-44-nixos-unstable", "160,000 documents"),
            ("latest-44-nixos-25.11", "155,000 documents"),
            ("latest-44-nixos-25.05", "152,000 documents"),
            ("latest-43-nixos-25.05", "151,000 documents"),
        ]);
        let resolved = resolve_channels(&available).unwrap();
        assert_eq!(resolved["stable"], "latest-44-nixos-25.11");
        assert_eq!(resolved["unstable"], "latest-44-nixos-unstable");
        assert_eq!(resolved["25.11"], "latest-44-nixos-25.11");
        assert_eq!(resolved["25.05"], "latest-44-nixos-25.05");
        assert_eq!(resolved["beta"], "latest-44-nixos-25.11");
    }

    #[test]
    fn test_first_unstable_wins() {
        let available = map(&[
            ("latest-43-nixos-unstable", "140,000 documents"),
            ("latest-44-nixos-unstable", "160,000 documents"),
        ]);
        let resolved = resolve_channels(&available).unwrap();
        assert_eq!(resolved["unstable"], "latest-43-nixos-unstable");
        // No numeric versions available: no stable, hence no beta.
        assert!(!resolved.contains_key("stable"));
        assert!(!resolved.contains_key("beta"));
    }

    #[test]
    fn test_malformed_version_is_ignored() {
        let available = map(&[
            ("latest-43-nixos-badversion", "120,000 documents"),
            ("latest-44-nixos-25.05", "100,000 documents"),
        ]);
        let resolved = resolve_channels(&available).unwrap();
        assert_eq!(resolved["stable"], "latest-44-nixos-25.05");
        assert!(!resolved.contains_key("badversion"));
        assert!(!resolved.values().any(|p| p.contains("badversion")));
    }

    #[test]
    fn test_only_malformed_versions_fall_back() {
        let available = map(&[("latest-43-nixos-badversion", "120,000 documents")]);
        assert!(resolve_channels(&available).is_none());
    }

    #[test]
    fn test_malformed_count_label_is_ignored() {
        let available = map(&[
            ("latest-44-nixos-25.05", "lots of documents"),
            ("latest-44-nixos-25.11", "90,000 documents"),
        ]);
        let resolved = resolve_channels(&available).unwrap();
        assert_eq!(resolved["stable"], "latest-44-nixos-25.11");
        assert!(!resolved.values().any(|p| p == "latest-44-nixos-25.05"));
    }

    #[test]
    fn test_full_tie_resolves_to_smallest_pattern() {
        let available = map(&[
            ("latest-45-nixos-25.05", "100,000 documents"),
            ("latest-44-nixos-25.05", "100,000 documents"),
        ]);
        let resolved = resolve_channels(&available).unwrap();
        assert_eq!(resolved["stable"], "latest-44-nixos-25.05");
    }

    #[test]
    fn test_three_component_version_is_rejected() {
        let available = map(&[
            ("latest-44-nixos-25.05.1", "100,000 documents"),
            ("latest-44-nixos-25.05", "90,000 documents"),
        ]);
        let resolved = resolve_channels(&available).unwrap();
        assert_eq!(resolved["stable"], "latest-44-nixos-25.05");
    }

    #[test]
    fn test_candidate_parse() {
        let c = VersionCandidate::parse("latest-44-nixos-25.05", "151,798 documents").unwrap();
        assert_eq!((c.major, c.minor, c.count), (25, 5, 151_798));
        assert_eq!(c.version, "25.05");

        assert!(VersionCandidate::parse("too-short", "1 documents").is_none());
        assert!(VersionCandidate::parse("latest-44-nixos-x.y", "1 documents").is_none());
        assert!(VersionCandidate::parse("latest-44-nixos-25.05", "no count here").is_none());
    }

    #[test]
    fn test_availability_map_insert_order_and_replace() {
        let mut available = AvailabilityMap::new();
        available.insert("a", "1 documents");
        available.insert("b", "2 documents");
        available.insert("a", "3 documents");
        let keys: Vec<&str> = available.iter().map(|(p, _)| p).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(available.get("a"), Some("3 documents"));
        assert_eq!(available.len(), 2);
    }

    proptest! {
        /// beta is present exactly when stable is, and always equal to it.
        #[test]
        fn prop_beta_aliases_stable(entries in proptest::collection::vec(
            (43u32..=46, 20u32..=30, prop_oneof![Just(5u32), Just(11u32)], 1u64..1_000_000),
            0..12,
        )) {
            let available: AvailabilityMap = entries
                .iter()
                .map(|(generation, major, minor, count)| {
                    (
                        format!("latest-{}-nixos-{}.{:02}", generation, major, minor),
                        format!("{} documents", group_thousands(*count)),
                    )
                })
                .collect();

            match resolve_channels(&available) {
                Some(resolved) => {
                    prop_assert_eq!(
                        resolved.contains_key("beta"),
                        resolved.contains_key("stable")
                    );
                    if let Some(stable) = resolved.get("stable") {
                        prop_assert_eq!(resolved.get("beta"), Some(stable));
                        // stable carries the numerically highest version.
                        let best = entries
                            .iter()
                            .map(|(_, major, minor, _)| (*major, *minor))
                            .max()
                            .unwrap();
                        let token = format!("{}.{:02}", best.0, best.1);
                        prop_assert!(stable.ends_with(&token));
                    }
                }
                None => prop_assert!(available.is_empty()),
            }
        }
    }
}
