//! NixOS packages, options, and programs via the Elasticsearch backend.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use crate::common::channels::ResolvedChannels;
use crate::common::error::{api_error, error, error_with};
use crate::common::format::group_thousands;
use crate::sources::SourceContext;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Option descriptions come back wrapped in `<rendered-html>` markers.
fn clean_option_description(desc: &str) -> String {
    if desc.contains("<rendered-html>") {
        let unwrapped = desc
            .replace("<rendered-html>", "")
            .replace("</rendered-html>", "");
        HTML_TAG.replace_all(&unwrapped, "").trim().to_string()
    } else {
        desc.to_string()
    }
}

/// Suggestion line for an invalid channel name.
pub fn channel_suggestions(channels: &ResolvedChannels, invalid: &str) -> String {
    let available: Vec<&str> = channels.keys().map(String::as_str).collect();
    let invalid_lower = invalid.to_lowercase();

    let mut suggestions: Vec<&str> = available
        .iter()
        .copied()
        .filter(|ch| {
            let ch_lower = ch.to_lowercase();
            ch_lower.contains(&invalid_lower) || invalid_lower.contains(&ch_lower)
        })
        .collect();

    if suggestions.is_empty() {
        let mut common = vec!["unstable", "stable", "beta"];
        let version_channels: Vec<&str> = available
            .iter()
            .copied()
            .filter(|ch| ch.contains('.') && ch.replace('.', "").chars().all(|c| c.is_ascii_digit()))
            .collect();
        common.extend(version_channels.into_iter().take(2));
        suggestions = common
            .into_iter()
            .filter(|ch| available.contains(ch))
            .collect();
        if suggestions.is_empty() {
            suggestions = available.into_iter().take(4).collect();
        }
    }

    format!("Available channels: {}", suggestions.join(", "))
}

fn invalid_channel(channels: &ResolvedChannels, channel: &str) -> String {
    error(format!(
        "Invalid channel '{}'. {}",
        channel,
        channel_suggestions(channels, channel)
    ))
}

fn str_field<'a>(src: &'a Value, field: &str) -> &'a str {
    src.get(field).and_then(Value::as_str).unwrap_or("")
}

/// Search packages, options, or programs on a channel.
pub async fn search(
    ctx: &SourceContext,
    query: &str,
    search_type: &str,
    limit: usize,
    channel: &str,
) -> String {
    if search_type == "flakes" {
        return crate::sources::flakes::search(ctx, query, limit).await;
    }

    let channels = ctx.channels.get_resolved().await;
    let Some(index) = channels.get(channel) else {
        return invalid_channel(&channels, channel);
    };

    let es_query = match search_type {
        "packages" => json!({
            "bool": {
                "must": [{"term": {"type": "package"}}],
                "should": [
                    {"match": {"package_pname": {"query": query, "boost": 3}}},
                    {"match": {"package_description": query}},
                ],
                "minimum_should_match": 1,
            }
        }),
        "options" => json!({
            "bool": {
                "must": [{"term": {"type": "option"}}],
                "should": [
                    {"wildcard": {"option_name": format!("*{}*", query)}},
                    {"match": {"option_description": query}},
                ],
                "minimum_should_match": 1,
            }
        }),
        _ => json!({
            "bool": {
                "must": [{"term": {"type": "package"}}],
                "should": [
                    {"match": {"package_programs": {"query": query, "boost": 2}}},
                    {"match": {"package_pname": query}},
                ],
                "minimum_should_match": 1,
            }
        }),
    };

    let hits = match ctx.http.es_query(index, es_query, limit).await {
        Ok(hits) => hits,
        Err(err) => return api_error(&err),
    };
    if hits.is_empty() {
        return format!("No {} found matching '{}'", search_type, query);
    }

    let mut results = vec![format!(
        "Found {} {} matching '{}':\n",
        hits.len(),
        search_type,
        query
    )];
    for hit in &hits {
        let src = hit.get("_source").cloned().unwrap_or_default();
        match search_type {
            "packages" => {
                let name = str_field(&src, "package_pname");
                let version = str_field(&src, "package_pversion");
                let desc = str_field(&src, "package_description");
                results.push(format!("* {} ({})", name, version));
                if !desc.is_empty() {
                    results.push(format!("  {}", desc));
                }
                results.push(String::new());
            }
            "options" => {
                let name = str_field(&src, "option_name");
                let opt_type = str_field(&src, "option_type");
                let desc = clean_option_description(str_field(&src, "option_description"));
                results.push(format!("* {}", name));
                if !opt_type.is_empty() {
                    results.push(format!("  Type: {}", opt_type));
                }
                if !desc.is_empty() {
                    results.push(format!("  {}", desc));
                }
                results.push(String::new());
            }
            _ => {
                let pkg_name = str_field(&src, "package_pname");
                let query_lower = query.to_lowercase();
                if let Some(programs) = src.get("package_programs").and_then(Value::as_array) {
                    for program in programs.iter().filter_map(Value::as_str) {
                        if program.to_lowercase() == query_lower {
                            results.push(format!("* {} (provided by {})", program, pkg_name));
                            results.push(String::new());
                        }
                    }
                }
            }
        }
    }
    results.join("\n").trim().to_string()
}

/// Detailed info for one package or option.
pub async fn info(ctx: &SourceContext, name: &str, info_type: &str, channel: &str) -> String {
    let channels = ctx.channels.get_resolved().await;
    let Some(index) = channels.get(channel) else {
        return invalid_channel(&channels, channel);
    };

    let field = if info_type == "package" {
        "package_pname"
    } else {
        "option_name"
    };
    let query = json!({
        "bool": {"must": [{"term": {"type": info_type}}, {"term": {field: name}}]}
    });

    let hits = match ctx.http.es_query(index, query, 1).await {
        Ok(hits) => hits,
        Err(err) => return api_error(&err),
    };
    let Some(src) = hits.first().and_then(|hit| hit.get("_source")) else {
        let label = if info_type == "package" {
            "Package"
        } else {
            "Option"
        };
        return error_with("NOT_FOUND", format!("{} '{}' not found", label, name));
    };

    if info_type == "package" {
        let mut info = vec![
            format!("Package: {}", str_field(src, "package_pname")),
            format!("Version: {}", str_field(src, "package_pversion")),
        ];
        let desc = str_field(src, "package_description");
        if !desc.is_empty() {
            info.push(format!("Description: {}", desc));
        }
        let homepage = match src.get("package_homepage") {
            Some(Value::Array(items)) => items.first().and_then(Value::as_str).unwrap_or(""),
            Some(Value::String(s)) => s.as_str(),
            _ => "",
        };
        if !homepage.is_empty() {
            info.push(format!("Homepage: {}", homepage));
        }
        if let Some(licenses) = src.get("package_license_set").and_then(Value::as_array) {
            let names: Vec<&str> = licenses.iter().filter_map(Value::as_str).collect();
            if !names.is_empty() {
                info.push(format!("License: {}", names.join(", ")));
            }
        }
        info.join("\n")
    } else {
        let mut info = vec![format!("Option: {}", str_field(src, "option_name"))];
        let opt_type = str_field(src, "option_type");
        if !opt_type.is_empty() {
            info.push(format!("Type: {}", opt_type));
        }
        let desc = clean_option_description(str_field(src, "option_description"));
        if !desc.is_empty() {
            info.push(format!("Description: {}", desc));
        }
        let default = str_field(src, "option_default");
        if !default.is_empty() {
            info.push(format!("Default: {}", default));
        }
        let example = str_field(src, "option_example");
        if !example.is_empty() {
            info.push(format!("Example: {}", example));
        }
        info.join("\n")
    }
}

/// Package and option counts for a channel.
pub async fn stats(ctx: &SourceContext, channel: &str) -> String {
    let channels = ctx.channels.get_resolved().await;
    let Some(index) = channels.get(channel) else {
        return invalid_channel(&channels, channel);
    };

    let pkg_count = ctx
        .http
        .es_count(index, json!({"term": {"type": "package"}}))
        .await
        .unwrap_or(0);
    let opt_count = ctx
        .http
        .es_count(index, json!({"term": {"type": "option"}}))
        .await
        .unwrap_or(0);

    if pkg_count == 0 && opt_count == 0 {
        return error("Failed to retrieve statistics");
    }
    format!(
        "NixOS Statistics ({}):\n* Packages: {}\n* Options: {}",
        channel,
        group_thousands(pkg_count),
        group_thousands(opt_count)
    )
}

/// List resolved channels with availability status and document counts.
pub async fn list_channels(ctx: &SourceContext) -> String {
    let configured = ctx.channels.get_resolved().await;
    let available = ctx.channels.get_available().await;
    let mut results = Vec::new();

    if ctx.channels.using_fallback().await {
        results.push("WARNING: Using fallback channels (API discovery failed)\n".to_string());
    }

    results.push("NixOS Channels:\n".to_string());
    for (name, index) in &configured {
        let status = if available.contains(index) {
            "Available"
        } else {
            "Unavailable"
        };
        let doc_count = available.get(index).unwrap_or("Unknown");
        let mut label = format!("* {}", name);
        if name == "stable" {
            let parts: Vec<&str> = index.split('-').collect();
            if parts.len() >= 4 {
                label = format!("* {} (current: {})", name, parts[3]);
            }
        }
        results.push(format!("{} -> {}", label, index));
        results.push(format!("  Status: {} ({})", status, doc_count));
        results.push(String::new());
    }

    results.push("Note: 'stable' always points to current stable release.".to_string());
    results.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(names: &[(&str, &str)]) -> ResolvedChannels {
        names
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_clean_option_description() {
        assert_eq!(
            clean_option_description("<rendered-html><p>Enable <code>foo</code>.</p></rendered-html>"),
            "Enable foo."
        );
        assert_eq!(clean_option_description("plain text"), "plain text");
    }

    #[test]
    fn test_channel_suggestions_substring() {
        let channels = channels(&[
            ("unstable", "a"),
            ("stable", "b"),
            ("beta", "b"),
            ("25.05", "c"),
        ]);
        let text = channel_suggestions(&channels, "stabl");
        assert!(text.contains("stable"));
        assert!(text.contains("unstable"));
    }

    #[test]
    fn test_channel_suggestions_fallback_to_common() {
        let channels = channels(&[
            ("unstable", "a"),
            ("stable", "b"),
            ("beta", "b"),
            ("25.05", "c"),
            ("25.11", "d"),
        ]);
        let text = channel_suggestions(&channels, "zzz");
        assert!(text.starts_with("Available channels: "));
        assert!(text.contains("unstable"));
        assert!(text.contains("stable"));
        assert!(text.contains("25.05"));
    }
}
