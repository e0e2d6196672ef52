//! Configuration constants for the NixScout MCP server.
//!
//! Everything here is a versioned constant: endpoints move rarely, and the
//! channel discovery lists are extended by hand as NixOS releases ship (the
//! backend offers no enumeration endpoint).

use std::collections::BTreeMap;

/// NixOS search backend (Elasticsearch).
pub const NIXOS_API: &str = "https://search.nixos.org/backend";

/// Public read-only credential pair used by search.nixos.org itself.
pub const NIXOS_AUTH_USER: &str = "aWVSALXpZv";
pub const NIXOS_AUTH_PASS: &str = "X8gPHnzL52wFEekuxsfQ9cSh";

/// Index generations to probe during channel discovery. Extend as the
/// backend rolls new generations.
pub const CHANNEL_GENERATIONS: &[u32] = &[43, 44, 45, 46];

/// Version tokens to probe during channel discovery. Extend as NixOS
/// releases ship.
pub const CHANNEL_VERSION_TOKENS: &[&str] = &["unstable", "25.05", "25.11", "26.05", "26.11"];

/// Static channel table used when live discovery yields nothing. Must be
/// refreshed manually as releases age.
pub fn fallback_channels() -> BTreeMap<String, String> {
    let mut channels = BTreeMap::new();
    channels.insert("unstable".to_string(), "latest-44-nixos-unstable".to_string());
    channels.insert("stable".to_string(), "latest-44-nixos-25.11".to_string());
    channels.insert("25.05".to_string(), "latest-44-nixos-25.05".to_string());
    channels.insert("25.11".to_string(), "latest-44-nixos-25.11".to_string());
    channels.insert("beta".to_string(), "latest-44-nixos-25.11".to_string());
    channels
}

pub const HOME_MANAGER_URL: &str = "https://nix-community.github.io/home-manager/options.xhtml";
pub const DARWIN_URL: &str = "https://nix-darwin.github.io/nix-darwin/manual/index.html";
pub const FLAKE_INDEX: &str = "latest-44-group-manual";

/// FlakeHub API (Determinate Systems).
pub const FLAKEHUB_API: &str = "https://api.flakehub.com";

/// Nixvim options via NuschtOS search infrastructure (paginated, ~300
/// options per chunk). Credit: https://github.com/NuschtOS/search
pub const NIXVIM_META_BASE: &str = "https://nix-community.github.io/nixvim/search/meta";

/// NixOS Wiki (MediaWiki API).
pub const WIKI_API: &str = "https://wiki.nixos.org/w/api.php";

/// nix.dev documentation (Sphinx search index).
pub const NIXDEV_SEARCH_INDEX: &str = "https://nix.dev/searchindex.js";
pub const NIXDEV_BASE_URL: &str = "https://nix.dev";

/// Noogle API (Nix function search).
pub const NOOGLE_API: &str = "https://noogle.dev/api/v1/data";

/// NixHub API (package metadata) and the public binary cache.
pub const NIXHUB_API: &str = "https://search.devbox.sh";
pub const CACHE_NIXOS_ORG: &str = "https://cache.nixos.org";

/// Maximum file size for flake-inputs reads (1 MB).
pub const MAX_FILE_SIZE: u64 = 1024 * 1024;
/// Default and maximum line limits for flake-inputs reads.
pub const DEFAULT_LINE_LIMIT: usize = 500;
pub const MAX_LINE_LIMIT: usize = 2000;

/// Source names understood by the `nix` tool. Anything else passed as
/// `source` for the flake-inputs action is treated as a flake directory.
pub const KNOWN_SOURCES: &[&str] = &[
    "nixos",
    "home-manager",
    "darwin",
    "flakes",
    "flakehub",
    "nixvim",
    "wiki",
    "nix-dev",
    "noogle",
    "nixhub",
];

/// User-Agent sent to every external API.
pub fn user_agent() -> String {
    format!("nixscout-mcp/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_channels_complete() {
        let channels = fallback_channels();
        for name in ["unstable", "stable", "beta", "25.05", "25.11"] {
            assert!(channels.contains_key(name), "missing fallback: {}", name);
        }
        // beta is always an alias of stable
        assert_eq!(channels["beta"], channels["stable"]);
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(user_agent().starts_with("nixscout-mcp/"));
    }
}
