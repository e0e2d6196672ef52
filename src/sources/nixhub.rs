//! NixHub package metadata (search.devbox.sh) and cache.nixos.org
//! binary cache status checks.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::common::config::{CACHE_NIXOS_ORG, NIXHUB_API};
use crate::common::error::{error, error_with, ApiError};
use crate::common::format::{format_date, format_size, truncate};
use crate::common::http::{HttpClient, API_TIMEOUT, NARINFO_TIMEOUT};
use crate::sources::SourceContext;

static COMMIT_HASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-fA-F0-9]{40}$").unwrap());

fn str_field<'a>(value: &'a Value, field: &str) -> &'a str {
    value.get(field).and_then(Value::as_str).unwrap_or("")
}

/// Map NixHub transport errors onto the shared error text taxonomy.
/// 400/404 responses mean "no such package" on every NixHub endpoint.
fn nixhub_error(err: &ApiError, name: &str) -> String {
    match err {
        ApiError::Status { code: 400 | 404 } => {
            error_with("NOT_FOUND", format!("Package '{}' not found", name))
        }
        ApiError::Status { code } if *code >= 500 => {
            error_with("SERVICE_ERROR", "NixHub API temporarily unavailable")
        }
        ApiError::Timeout => error_with("TIMEOUT", "NixHub API timed out"),
        _ => error_with("API_ERROR", format!("NixHub API error: {}", err)),
    }
}

// =========================================================================
// narinfo parsing
// =========================================================================

/// Key fields of a narinfo document.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NarInfo {
    pub file_size: Option<u64>,
    pub nar_size: Option<u64>,
    pub compression: Option<String>,
    pub store_path: Option<String>,
    pub url: Option<String>,
}

/// Parse a narinfo file. Malformed numeric values drop the field rather
/// than failing the parse.
pub fn parse_narinfo(text: &str) -> NarInfo {
    let mut result = NarInfo::default();
    for line in text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_lowercase().as_str() {
            "filesize" => {
                if let Ok(size) = value.parse() {
                    result.file_size = Some(size);
                }
            }
            "narsize" => {
                if let Ok(size) = value.parse() {
                    result.nar_size = Some(size);
                }
            }
            "compression" => result.compression = Some(value.to_string()),
            "storepath" => result.store_path = Some(value.to_string()),
            "url" => result.url = Some(value.to_string()),
            _ => {}
        }
    }
    result
}

/// The 32-character base32 hash of `/nix/store/{hash}-{name}`, or `None`
/// when the path does not look like a store path.
pub(crate) fn store_hash(store_path: &str) -> Option<String> {
    let parts: Vec<&str> = store_path.split('/').collect();
    if parts.len() < 4 {
        return None;
    }
    let hash = parts[3].split('-').next().unwrap_or("");
    if hash.len() == 32 {
        Some(hash.to_string())
    } else {
        None
    }
}

// =========================================================================
// Release formatting (shared by nix_versions and info)
// =========================================================================

/// Format one release entry: version, update date, platforms, nixpkgs
/// commit, and attribute path.
pub(crate) fn format_release(release: &Value) -> Vec<String> {
    let mut results = Vec::new();
    let version = release
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    results.push(format!("* {}", version));

    if let Some(last_updated) = release.get("last_updated") {
        if let Some(date) = format_date(last_updated) {
            results.push(format!("  Updated: {}", date));
        }
    }

    // Platforms arrive either as system name strings or as dicts with a
    // "system" key (old format).
    if let Some(platforms) = release.get("platforms").and_then(Value::as_array) {
        let mut systems: Vec<String> = Vec::new();
        for platform in platforms {
            let system = match platform {
                Value::String(s) => s.clone(),
                Value::Object(_) => str_field(platform, "system").to_string(),
                _ => String::new(),
            };
            if !system.is_empty() && !systems.contains(&system) {
                systems.push(system);
            }
        }
        if !systems.is_empty() {
            let has_linux = systems.iter().any(|s| s.contains("linux"));
            let has_darwin = systems.iter().any(|s| s.contains("darwin"));
            let label = if has_linux && has_darwin {
                "Linux and macOS".to_string()
            } else if has_linux {
                "Linux".to_string()
            } else if has_darwin {
                "macOS".to_string()
            } else {
                systems.sort();
                systems.join(", ")
            };
            results.push(format!("  Platforms: {}", label));
        }
    }

    let commit = str_field(release, "commit_hash");
    if COMMIT_HASH.is_match(commit) {
        results.push(format!("  Nixpkgs commit: {}", commit));
        if let Some(attr) = first_attr_path(release) {
            results.push(format!("  Attribute: {}", attr));
        }
    }
    results
}

/// First attribute path found in the per-system info of a release.
fn first_attr_path(release: &Value) -> Option<String> {
    let systems = release.get("systems").and_then(Value::as_object)?;
    for sys_info in systems.values() {
        if let Some(attr) = sys_info
            .get("attr_paths")
            .and_then(Value::as_array)
            .and_then(|paths| paths.first())
            .and_then(Value::as_str)
        {
            return Some(attr.to_string());
        }
    }
    None
}

/// Programs list from the per-system info (identical across systems).
fn programs(release: &Value) -> Vec<String> {
    let Some(systems) = release.get("systems").and_then(Value::as_object) else {
        return Vec::new();
    };
    for sys_info in systems.values() {
        if let Some(programs) = sys_info.get("programs").and_then(Value::as_array) {
            if !programs.is_empty() {
                return programs
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect();
            }
        }
    }
    Vec::new()
}

fn programs_line(programs: &[String]) -> Option<String> {
    if programs.is_empty() {
        return None;
    }
    let shown: Vec<&str> = programs.iter().map(String::as_str).take(10).collect();
    let mut line = shown.join(", ");
    if programs.len() > 10 {
        line.push_str(&format!(" ... ({} total)", programs.len()));
    }
    Some(format!("Programs: {}", line))
}

// =========================================================================
// API fetches
// =========================================================================

async fn fetch_pkg(http: &HttpClient, name: &str) -> Result<Value, ApiError> {
    let url = format!("{}/v1/pkg", NIXHUB_API);
    http.get_json_query(&url, &[("name", name)], API_TIMEOUT)
        .await
}

async fn fetch_resolve(http: &HttpClient, name: &str, version: &str) -> Result<Value, ApiError> {
    let url = format!("{}/v2/resolve", NIXHUB_API);
    let version = if version.is_empty() { "latest" } else { version };
    http.get_json_query(&url, &[("name", name), ("version", version)], API_TIMEOUT)
        .await
}

// =========================================================================
// Tool operations
// =========================================================================

pub async fn search(ctx: &SourceContext, query: &str, limit: usize) -> String {
    let url = format!("{}/v2/search", NIXHUB_API);
    let data = match ctx
        .http
        .get_json_query(&url, &[("q", query)], API_TIMEOUT)
        .await
    {
        Ok(data) => data,
        Err(err) => return nixhub_error(&err, query),
    };

    let packages = data
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if packages.is_empty() {
        return format!("No packages found on NixHub matching '{}'", query);
    }
    let total_results = data
        .get("total_results")
        .and_then(Value::as_u64)
        .unwrap_or(packages.len() as u64);
    let packages = &packages[..packages.len().min(limit)];

    let mut results = vec![format!(
        "Found {} of {} packages on NixHub matching '{}':\n",
        packages.len(),
        total_results,
        query
    )];
    for pkg in packages {
        results.push(format!("* {}", str_field(pkg, "name")));
        let version = str_field(pkg, "version");
        if !version.is_empty() {
            results.push(format!("  Version: {}", version));
        }
        let summary = {
            let summary = str_field(pkg, "summary");
            if summary.is_empty() {
                str_field(pkg, "description")
            } else {
                summary
            }
        };
        if !summary.is_empty() {
            results.push(format!("  {}", truncate(summary, 200)));
        }
        if let Some(last_updated) = pkg.get("last_updated") {
            if let Some(date) = format_date(last_updated) {
                results.push(format!("  Updated: {}", date));
            }
        }
        results.push(String::new());
    }
    results.join("\n").trim().to_string()
}

/// Detailed package info, combining v1/pkg metadata with v2/resolve flake
/// references and store paths. Resolve failures are silent - the metadata
/// alone is still useful.
pub async fn info(ctx: &SourceContext, name: &str) -> String {
    let pkg_array = match fetch_pkg(&ctx.http, name).await {
        Ok(data) => data,
        Err(err) => return nixhub_error(&err, name),
    };
    let Some(releases) = pkg_array.as_array().filter(|arr| !arr.is_empty()) else {
        return error_with("NOT_FOUND", format!("Package '{}' not found", name));
    };
    // First element is the latest version
    let pkg_data = &releases[0];
    let version = {
        let v = str_field(pkg_data, "version");
        if v.is_empty() {
            "latest"
        } else {
            v
        }
    };

    let mut flake_ref = String::new();
    let mut store_paths: Vec<(String, String)> = Vec::new();
    if let Ok(resolve_data) = fetch_resolve(&ctx.http, name, version).await {
        if let Some(systems) = resolve_data.get("systems").and_then(Value::as_object) {
            for (sys_name, sys_info) in systems {
                if flake_ref.is_empty() {
                    if let Some(fi) = sys_info.get("flake_installable") {
                        let attr_path = str_field(fi, "attr_path");
                        let reference = fi.get("ref").cloned().unwrap_or_default();
                        if str_field(&reference, "type") == "github" {
                            let owner = str_field(&reference, "owner");
                            let repo = str_field(&reference, "repo");
                            let rev: String =
                                str_field(&reference, "rev").chars().take(8).collect();
                            if !owner.is_empty() && !repo.is_empty() {
                                flake_ref =
                                    format!("github:{}/{}/{}#{}", owner, repo, rev, attr_path);
                            }
                        }
                    }
                }
                if let Some(path) = default_output_path(sys_info) {
                    store_paths.push((sys_name.clone(), path));
                }
            }
        }
    }

    let mut results = vec![format!("Package: {}", {
        let n = str_field(pkg_data, "name");
        if n.is_empty() {
            name
        } else {
            n
        }
    })];
    results.push(format!("Version: {}", version));

    let summary = str_field(pkg_data, "summary");
    if !summary.is_empty() {
        results.push(format!("Summary: {}", summary));
    }
    let description = str_field(pkg_data, "description");
    if !description.is_empty() && description != summary {
        results.push(format!("Description: {}", truncate(description, 500)));
    }
    results.push(String::new());

    let license = str_field(pkg_data, "license");
    if !license.is_empty() {
        results.push(format!("License: {}", license));
    }
    let homepage = str_field(pkg_data, "homepage");
    if !homepage.is_empty() {
        results.push(format!("Homepage: {}", homepage));
    }
    if let Some(line) = programs_line(&programs(pkg_data)) {
        results.push(line);
    }
    if let Some(platforms) = pkg_data.get("platforms").and_then(Value::as_array) {
        let mut names: Vec<&str> = platforms.iter().filter_map(Value::as_str).collect();
        if !names.is_empty() {
            names.sort_unstable();
            results.push(format!("Platforms: {}", names.join(", ")));
        }
    }

    if !flake_ref.is_empty() {
        results.push(String::new());
        results.push("Flake Reference:".to_string());
        results.push(format!("  {}", flake_ref));
    }
    if !store_paths.is_empty() {
        store_paths.sort();
        results.push(String::new());
        results.push("Store Paths:".to_string());
        for (sys_name, path) in &store_paths {
            results.push(format!("  {}: {}", sys_name, path));
        }
    }

    results.join("\n").trim().to_string()
}

/// Default (or first) output store path of a resolved system entry.
fn default_output_path(sys_info: &Value) -> Option<String> {
    let outputs = sys_info.get("outputs").and_then(Value::as_array)?;
    let default = outputs
        .iter()
        .find(|o| o.get("default").and_then(Value::as_bool).unwrap_or(false))
        .or_else(|| outputs.first())?;
    let path = str_field(default, "path");
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// Version history for the `nix_versions` tool.
pub async fn versions(ctx: &SourceContext, package: &str, version: &str, limit: usize) -> String {
    let data = match fetch_pkg(&ctx.http, package).await {
        Ok(data) => data,
        Err(err) => return nixhub_error(&err, package),
    };
    let Some(releases) = data.as_array().filter(|arr| !arr.is_empty()) else {
        return error_with("NOT_FOUND", format!("Package '{}' not found", package));
    };

    if !version.is_empty() {
        for release in releases {
            if str_field(release, "version") == version {
                let mut lines = vec![format!("Found {} version {}\n", package, version)];
                let commit = str_field(release, "commit_hash");
                if COMMIT_HASH.is_match(commit) {
                    lines.push(format!("Nixpkgs commit: {}", commit));
                    if let Some(attr) = first_attr_path(release) {
                        lines.push(format!("  Attribute: {}", attr));
                    }
                }
                return lines.join("\n");
            }
        }
        let available: Vec<&str> = releases
            .iter()
            .take(limit)
            .map(|r| str_field(r, "version"))
            .collect();
        return format!(
            "Version {} not found for {}\nAvailable: {}",
            version,
            package,
            available.join(", ")
        );
    }

    let latest = &releases[0];
    let mut results = vec![format!("Package: {}", package)];
    let license = str_field(latest, "license");
    if !license.is_empty() {
        results.push(format!("License: {}", license));
    }
    let homepage = str_field(latest, "homepage");
    if !homepage.is_empty() {
        results.push(format!("Homepage: {}", homepage));
    }
    if let Some(line) = programs_line(&programs(latest)) {
        results.push(line);
    }
    results.push(format!("Total versions: {}", releases.len()));
    results.push(String::new());

    let shown = &releases[..releases.len().min(limit)];
    results.push(format!(
        "Recent versions ({} of {}):\n",
        shown.len(),
        releases.len()
    ));
    for release in shown {
        results.extend(format_release(release));
        results.push(String::new());
    }
    results.join("\n").trim().to_string()
}

// =========================================================================
// Binary cache status
// =========================================================================

/// Check cache.nixos.org for one system's store path. Returns the
/// formatted result block for that system.
async fn check_system_cache(http: HttpClient, system: String, store_path: String) -> Vec<String> {
    let mut results = vec![format!("System: {}", system)];

    if store_path.is_empty() {
        results.push("  Store path: Not available".to_string());
        results.push("  Status: UNKNOWN".to_string());
        results.push(String::new());
        return results;
    }
    results.push(format!("  Store path: {}", store_path));

    let Some(hash) = store_hash(&store_path) else {
        results.push("  Status: UNKNOWN (invalid store path)".to_string());
        results.push(String::new());
        return results;
    };

    let narinfo_url = format!("{}/{}.narinfo", CACHE_NIXOS_ORG, hash);
    match http.head_status(&narinfo_url, NARINFO_TIMEOUT).await {
        Ok(200) => {
            // Fetch the full narinfo for size details.
            match http.get_text_status(&narinfo_url, NARINFO_TIMEOUT).await {
                Ok((200, body)) => {
                    let narinfo = parse_narinfo(&body);
                    results.push("  Status: CACHED".to_string());
                    if let Some(file_size) = narinfo.file_size {
                        results.push(format!("  Download size: {}", format_size(file_size)));
                    }
                    if let Some(nar_size) = narinfo.nar_size {
                        results.push(format!("  Unpacked size: {}", format_size(nar_size)));
                    }
                    if let Some(compression) = narinfo.compression {
                        results.push(format!("  Compression: {}", compression));
                    }
                }
                _ => results.push("  Status: CACHED".to_string()),
            }
        }
        Ok(404) => results.push("  Status: NOT CACHED".to_string()),
        Ok(code) => results.push(format!("  Status: UNKNOWN (HTTP {})", code)),
        Err(_) => results.push("  Status: UNKNOWN (cache check failed)".to_string()),
    }

    results.push(String::new());
    results
}

/// Binary cache status for a package: resolve store paths via NixHub, then
/// check each system against cache.nixos.org concurrently.
pub async fn check_binary_cache(
    ctx: &SourceContext,
    name: &str,
    version: &str,
    system: &str,
) -> String {
    let data = match fetch_resolve(&ctx.http, name, version).await {
        Ok(data) => data,
        Err(err) => return nixhub_error(&err, name),
    };

    let pkg_name = {
        let n = str_field(&data, "name");
        if n.is_empty() {
            name
        } else {
            n
        }
    };
    let pkg_version = {
        let v = str_field(&data, "version");
        if v.is_empty() {
            version
        } else {
            v
        }
    };

    let empty_map = serde_json::Map::new();
    let systems_data = match data.get("systems") {
        // Absent means "no systems", handled below
        None => &empty_map,
        Some(value) => match value.as_object() {
            Some(map) => map,
            None => return error_with("API_ERROR", "Invalid systems data from NixHub"),
        },
    };

    let mut systems: Vec<(String, String)> = Vec::new();
    for (sys_name, sys_info) in systems_data {
        systems.push((
            sys_name.clone(),
            default_output_path(sys_info).unwrap_or_default(),
        ));
    }
    if systems.is_empty() {
        return error_with(
            "NOT_FOUND",
            format!("No systems found for {}@{}", name, pkg_version),
        );
    }

    if !system.is_empty() {
        systems.retain(|(sys_name, _)| sys_name == system);
        if systems.is_empty() {
            let mut available: Vec<&str> = systems_data.keys().map(String::as_str).collect();
            available.sort_unstable();
            return error_with(
                "NOT_FOUND",
                format!(
                    "System '{}' not available. Available: {}",
                    system,
                    available.join(", ")
                ),
            );
        }
    }

    let mut results = vec![format!("Binary Cache Status: {}@{}", pkg_name, pkg_version), String::new()];

    // Fan out the per-system checks; join in input order.
    let handles: Vec<_> = systems
        .into_iter()
        .map(|(sys_name, store_path)| {
            tokio::spawn(check_system_cache(ctx.http.clone(), sys_name, store_path))
        })
        .collect();
    for handle in handles {
        match handle.await {
            Ok(lines) => results.extend(lines),
            Err(err) => results.push(error(format!("cache check task failed: {}", err))),
        }
    }

    results.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_narinfo() {
        let text = "StorePath: /nix/store/abc-hello\nURL: nar/xyz.nar.xz\nCompression: xz\nFileSize: 12345\nNarSize: 67890\nBadLine\nNarSize: junk\n";
        let info = parse_narinfo(text);
        assert_eq!(info.store_path.as_deref(), Some("/nix/store/abc-hello"));
        assert_eq!(info.url.as_deref(), Some("nar/xyz.nar.xz"));
        assert_eq!(info.compression.as_deref(), Some("xz"));
        assert_eq!(info.file_size, Some(12345));
        // Malformed re-declaration keeps the earlier value
        assert_eq!(info.nar_size, Some(67890));
    }

    #[test]
    fn test_store_hash() {
        let path = "/nix/store/1f2g3h4j5k6l7m8n9p0q1r2s3t4v5w6x-hello-2.12";
        assert_eq!(
            store_hash(path).as_deref(),
            Some("1f2g3h4j5k6l7m8n9p0q1r2s3t4v5w6x")
        );
        assert_eq!(store_hash("/nix/store/short-hello"), None);
        assert_eq!(store_hash("not-a-store-path"), None);
    }

    #[test]
    fn test_format_release_full() {
        let release = json!({
            "version": "2.12.1",
            "last_updated": 1700000000,
            "platforms": ["x86_64-linux", "aarch64-darwin"],
            "commit_hash": "a".repeat(40),
            "systems": {
                "x86_64-linux": {"attr_paths": ["hello"]},
            },
        });
        let lines = format_release(&release);
        assert_eq!(lines[0], "* 2.12.1");
        assert!(lines.iter().any(|l| l == "  Updated: 2023-11-14"));
        assert!(lines.iter().any(|l| l == "  Platforms: Linux and macOS"));
        assert!(lines.iter().any(|l| l.starts_with("  Nixpkgs commit: aaaa")));
        assert!(lines.iter().any(|l| l == "  Attribute: hello"));
    }

    #[test]
    fn test_format_release_ignores_bad_commit() {
        let release = json!({"version": "1.0", "commit_hash": "nothex"});
        let lines = format_release(&release);
        assert_eq!(lines, vec!["* 1.0"]);
    }

    #[test]
    fn test_format_release_dict_platforms() {
        let release = json!({
            "version": "1.0",
            "platforms": [{"system": "riscv64-linux"}, {"system": "wasm32-wasi"}],
        });
        let lines = format_release(&release);
        assert!(lines.iter().any(|l| l == "  Platforms: Linux"));
    }

    #[test]
    fn test_default_output_path() {
        let sys_info = json!({
            "outputs": [
                {"path": "/nix/store/x-doc", "default": false},
                {"path": "/nix/store/y-bin", "default": true},
            ]
        });
        assert_eq!(
            default_output_path(&sys_info).as_deref(),
            Some("/nix/store/y-bin")
        );

        let no_default = json!({"outputs": [{"path": "/nix/store/z"}]});
        assert_eq!(
            default_output_path(&no_default).as_deref(),
            Some("/nix/store/z")
        );
        assert_eq!(default_output_path(&json!({})), None);
    }

    #[test]
    fn test_nixhub_error_mapping() {
        assert!(nixhub_error(&ApiError::Status { code: 404 }, "pkg").contains("not found"));
        assert!(nixhub_error(&ApiError::Status { code: 503 }, "pkg")
            .contains("temporarily unavailable"));
        assert!(nixhub_error(&ApiError::Timeout, "pkg").contains("timed out"));
        assert!(nixhub_error(&ApiError::Parse("bad".into()), "pkg").starts_with("Error (API_ERROR)"));
    }
}
