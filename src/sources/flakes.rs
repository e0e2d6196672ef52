//! Community flake search via the Elasticsearch group index.
//!
//! The flake index stores one document per package, so results are
//! over-fetched and deduplicated back into flakes keyed by their resolved
//! repository (or bare name when nothing is resolved).

use std::collections::BTreeSet;

use serde_json::{json, Value};

use crate::common::config::FLAKE_INDEX;
use crate::common::error::{api_error, error, ApiError};
use crate::common::format::{group_thousands, truncate};
use crate::common::http::{es_hits, es_total};
use crate::sources::SourceContext;

#[derive(Debug, Default)]
pub(crate) struct FlakeEntry {
    name: String,
    description: String,
    owner: String,
    repo: String,
    url: String,
    packages: BTreeSet<String>,
}

fn str_field<'a>(src: &'a Value, field: &str) -> &'a str {
    src.get(field).and_then(Value::as_str).unwrap_or("")
}

/// Collapse per-package hits into unique flakes, preserving hit order.
pub(crate) fn dedup_flakes(hits: &[Value]) -> Vec<FlakeEntry> {
    let mut keys: Vec<String> = Vec::new();
    let mut flakes: Vec<FlakeEntry> = Vec::new();

    for hit in hits {
        let src = hit.get("_source").cloned().unwrap_or_default();
        let flake_name = str_field(&src, "flake_name").trim().to_string();
        let package_pname = str_field(&src, "package_pname").to_string();
        if flake_name.is_empty() && package_pname.is_empty() {
            continue;
        }

        let resolved = src.get("flake_resolved").cloned().unwrap_or_default();
        let owner = str_field(&resolved, "owner").to_string();
        let repo = str_field(&resolved, "repo").to_string();
        let url = str_field(&resolved, "url").to_string();

        let (key, entry) = if !owner.is_empty() || !repo.is_empty() || !url.is_empty() {
            let (key, display_name) = if !owner.is_empty() && !repo.is_empty() {
                (
                    format!("{}/{}", owner, repo),
                    [flake_name.as_str(), repo.as_str(), package_pname.as_str()]
                        .iter()
                        .find(|s| !s.is_empty())
                        .unwrap_or(&"")
                        .to_string(),
                )
            } else if !url.is_empty() {
                let tail = url
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or("")
                    .trim_end_matches(".git");
                (
                    url.clone(),
                    [flake_name.as_str(), tail, package_pname.as_str()]
                        .iter()
                        .find(|s| !s.is_empty())
                        .unwrap_or(&"")
                        .to_string(),
                )
            } else {
                let key = if !flake_name.is_empty() {
                    flake_name.clone()
                } else {
                    package_pname.clone()
                };
                (key.clone(), key)
            };
            let description = if !str_field(&src, "flake_description").is_empty() {
                str_field(&src, "flake_description").to_string()
            } else {
                str_field(&src, "package_description").to_string()
            };
            (
                key,
                FlakeEntry {
                    name: display_name,
                    description,
                    owner,
                    repo,
                    url,
                    packages: BTreeSet::new(),
                },
            )
        } else if !flake_name.is_empty() {
            let description = if !str_field(&src, "flake_description").is_empty() {
                str_field(&src, "flake_description").to_string()
            } else {
                str_field(&src, "package_description").to_string()
            };
            (
                flake_name.clone(),
                FlakeEntry {
                    name: flake_name,
                    description,
                    ..FlakeEntry::default()
                },
            )
        } else {
            continue;
        };

        let index = match keys.iter().position(|k| *k == key) {
            Some(index) => index,
            None => {
                keys.push(key);
                flakes.push(entry);
                flakes.len() - 1
            }
        };
        let attr_name = str_field(&src, "package_attr_name");
        if !attr_name.is_empty() {
            flakes[index].packages.insert(attr_name.to_string());
        }
    }

    flakes
}

pub async fn search(ctx: &SourceContext, query: &str, limit: usize) -> String {
    let q = if query.trim().is_empty() || query == "*" {
        json!({"match_all": {}})
    } else {
        json!({
            "bool": {
                "should": [
                    {"match": {"flake_name": {"query": query, "boost": 3}}},
                    {"match": {"flake_description": {"query": query, "boost": 2}}},
                    {"match": {"package_pname": {"query": query, "boost": 1.5}}},
                    {"match": {"package_description": query}},
                    {"wildcard": {"flake_name": {"value": format!("*{}*", query), "boost": 2.5}}},
                    {"wildcard": {"package_pname": {"value": format!("*{}*", query), "boost": 1}}},
                    {"prefix": {"flake_name": {"value": query, "boost": 2}}},
                ],
                "minimum_should_match": 1,
            }
        })
    };
    let search_query = json!({
        "bool": {"filter": [{"term": {"type": "package"}}], "must": [q]}
    });
    let body = json!({
        "query": search_query,
        "size": limit * 5,
        "track_total_hits": true,
    });

    let data = match ctx.http.es_search_raw(FLAKE_INDEX, body).await {
        Ok(data) => data,
        Err(ApiError::Status { code: 404 }) => {
            return error("Flake indices not found. Flake search may be temporarily unavailable.")
        }
        Err(err) => return api_error(&err),
    };
    let hits = es_hits(&data);
    let total = es_total(&data);

    if hits.is_empty() {
        return format!("No flakes found matching '{}'", query);
    }

    let flakes = dedup_flakes(&hits);

    let mut results = Vec::new();
    if total > flakes.len() as u64 {
        results.push(format!(
            "Found {} matches ({} unique flakes) for '{}':\n",
            group_thousands(total),
            flakes.len(),
            query
        ));
    } else {
        results.push(format!("Found {} flakes matching '{}':\n", flakes.len(), query));
    }

    for flake in &flakes {
        results.push(format!("* {}", flake.name));
        if !flake.owner.is_empty() && !flake.repo.is_empty() {
            results.push(format!("  Repository: {}/{}", flake.owner, flake.repo));
        } else if !flake.url.is_empty() {
            results.push(format!("  URL: {}", flake.url));
        }
        if !flake.description.is_empty() {
            results.push(format!("  {}", truncate(&flake.description, 200)));
        }
        if !flake.packages.is_empty() {
            let packages: Vec<&str> = flake.packages.iter().map(String::as_str).take(5).collect();
            if flake.packages.len() > 5 {
                results.push(format!(
                    "  Packages: {}, ... ({} total)",
                    packages.join(", "),
                    flake.packages.len()
                ));
            } else {
                results.push(format!("  Packages: {}", packages.join(", ")));
            }
        }
        results.push(String::new());
    }
    results.join("\n").trim().to_string()
}

pub async fn stats(ctx: &SourceContext) -> String {
    match ctx
        .http
        .es_count(FLAKE_INDEX, json!({"term": {"type": "package"}}))
        .await
    {
        Ok(total) => format!(
            "NixOS Flakes Statistics:\n* Available packages: {}",
            group_thousands(total)
        ),
        Err(_) => error("Flake indices not found"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(source: Value) -> Value {
        json!({"_source": source})
    }

    #[test]
    fn test_dedup_by_owner_repo() {
        let hits = vec![
            hit(json!({
                "flake_name": "home-manager",
                "package_pname": "home-manager",
                "package_attr_name": "default",
                "flake_resolved": {"owner": "nix-community", "repo": "home-manager"},
            })),
            hit(json!({
                "flake_name": "home-manager",
                "package_pname": "docs",
                "package_attr_name": "docs-html",
                "flake_resolved": {"owner": "nix-community", "repo": "home-manager"},
            })),
        ];
        let flakes = dedup_flakes(&hits);
        assert_eq!(flakes.len(), 1);
        assert_eq!(flakes[0].name, "home-manager");
        assert_eq!(flakes[0].packages.len(), 2);
    }

    #[test]
    fn test_dedup_url_only_derives_name() {
        let hits = vec![hit(json!({
            "flake_name": "",
            "package_pname": "tool",
            "flake_resolved": {"url": "https://git.example.org/me/mytool.git"},
        }))];
        let flakes = dedup_flakes(&hits);
        assert_eq!(flakes.len(), 1);
        assert_eq!(flakes[0].name, "mytool");
        assert_eq!(flakes[0].url, "https://git.example.org/me/mytool.git");
    }

    #[test]
    fn test_unresolved_hits_keyed_by_name() {
        let hits = vec![
            hit(json!({
                "flake_name": "bare-flake",
                "package_pname": "pkg",
                "package_attr_name": "pkg",
            })),
            hit(json!({"flake_name": "", "package_pname": ""})),
        ];
        let flakes = dedup_flakes(&hits);
        assert_eq!(flakes.len(), 1);
        assert_eq!(flakes[0].name, "bare-flake");
    }
}
