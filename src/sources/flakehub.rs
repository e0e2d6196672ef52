//! FlakeHub (Determinate Systems flake registry).

use serde_json::Value;

use crate::common::config::FLAKEHUB_API;
use crate::common::error::{error, error_with, ApiError};
use crate::common::format::{format_datetime_utc, group_thousands, truncate};
use crate::common::http::API_TIMEOUT;
use crate::sources::SourceContext;

fn flakehub_error(err: &ApiError) -> String {
    match err {
        ApiError::Timeout => error_with("TIMEOUT", "FlakeHub API timed out"),
        _ => error_with("API_ERROR", format!("FlakeHub API error: {}", err)),
    }
}

fn str_field<'a>(value: &'a Value, field: &str) -> &'a str {
    value.get(field).and_then(Value::as_str).unwrap_or("")
}

pub async fn search(ctx: &SourceContext, query: &str, limit: usize) -> String {
    let url = format!("{}/search", FLAKEHUB_API);
    let data = match ctx
        .http
        .get_json_query(&url, &[("q", query)], API_TIMEOUT)
        .await
    {
        Ok(data) => data,
        Err(err) => return flakehub_error(&err),
    };

    let flakes = data.as_array().cloned().unwrap_or_default();
    if flakes.is_empty() {
        return format!("No flakes found on FlakeHub matching '{}'", query);
    }
    let flakes = &flakes[..flakes.len().min(limit)];

    let mut results = vec![format!(
        "Found {} flakes on FlakeHub matching '{}':\n",
        flakes.len(),
        query
    )];
    for flake in flakes {
        let org = str_field(flake, "org");
        let project = str_field(flake, "project");
        results.push(format!("* {}/{}", org, project));

        let desc = str_field(flake, "description");
        if !desc.is_empty() {
            let normalized = desc.split_whitespace().collect::<Vec<_>>().join(" ");
            results.push(format!("  {}", truncate(&normalized, 200)));
        }
        if let Some(labels) = flake.get("labels").and_then(Value::as_array) {
            let labels: Vec<&str> = labels.iter().filter_map(Value::as_str).take(5).collect();
            if !labels.is_empty() {
                results.push(format!("  Labels: {}", labels.join(", ")));
            }
        }
        results.push(format!("  https://flakehub.com/flake/{}/{}", org, project));
        results.push(String::new());
    }
    results.join("\n").trim().to_string()
}

pub async fn info(ctx: &SourceContext, name: &str) -> String {
    let Some((org, project)) = name.split_once('/') else {
        return error("FlakeHub flake name must be in 'org/project' format (e.g., 'NixOS/nixpkgs')");
    };

    let url = format!("{}/version/{}/{}/*", FLAKEHUB_API, org, project);
    let version_info = match ctx.http.get_json(&url, API_TIMEOUT).await {
        Ok(data) => data,
        Err(ApiError::Status { code: 404 }) => {
            return error_with("NOT_FOUND", format!("Flake '{}' not found on FlakeHub", name))
        }
        Err(err) => return flakehub_error(&err),
    };

    let mut results = vec![format!("FlakeHub Flake: {}/{}", org, project)];

    let desc = str_field(&version_info, "description");
    if !desc.is_empty() {
        results.push(format!("Description: {}", desc));
    }

    let version = {
        let simplified = str_field(&version_info, "simplified_version");
        if simplified.is_empty() {
            str_field(&version_info, "version")
        } else {
            simplified
        }
    };
    if !version.is_empty() {
        results.push(format!("Latest Version: {}", version));
    }

    let revision = str_field(&version_info, "revision");
    if !revision.is_empty() {
        results.push(format!("Revision: {}", revision));
    }

    if let Some(commit_count) = version_info.get("commit_count").and_then(Value::as_u64) {
        if commit_count > 0 {
            results.push(format!("Commits: {}", group_thousands(commit_count)));
        }
    }

    let visibility = str_field(&version_info, "visibility");
    if !visibility.is_empty() {
        results.push(format!("Visibility: {}", visibility));
    }

    let published = str_field(&version_info, "published_at");
    if !published.is_empty() {
        if let Some(formatted) = format_datetime_utc(published) {
            results.push(format!("Published: {}", formatted));
        }
    }

    if version_info
        .get("mirrored")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        results.push("Source: Mirrored from GitHub".to_string());
    }

    let download_url = {
        let pretty = str_field(&version_info, "pretty_download_url");
        if pretty.is_empty() {
            str_field(&version_info, "download_url")
        } else {
            pretty
        }
    };
    if !download_url.is_empty() {
        results.push(format!("Download: {}", download_url));
    }

    results.push(format!("FlakeHub URL: https://flakehub.com/flake/{}/{}", org, project));
    results.join("\n")
}

pub async fn stats(ctx: &SourceContext) -> String {
    let url = format!("{}/flakes", FLAKEHUB_API);
    let data = match ctx.http.get_json(&url, API_TIMEOUT).await {
        Ok(data) => data,
        Err(err) => return flakehub_error(&err),
    };
    let flakes = data.as_array().cloned().unwrap_or_default();

    let mut orgs: Vec<(String, u64)> = Vec::new();
    let mut labels: Vec<(String, u64)> = Vec::new();
    for flake in &flakes {
        let org = flake
            .get("org")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        bump(&mut orgs, org);
        if let Some(flake_labels) = flake.get("labels").and_then(Value::as_array) {
            for label in flake_labels.iter().filter_map(Value::as_str) {
                bump(&mut labels, label.to_string());
            }
        }
    }

    let top_orgs = top(&mut orgs, 5);
    let top_labels = top(&mut labels, 5);

    let mut results = vec![
        "FlakeHub Statistics:".to_string(),
        format!("* Total flakes: {}", group_thousands(flakes.len() as u64)),
        format!("* Organizations: {}", group_thousands(orgs.len() as u64)),
        "* Top organizations:".to_string(),
    ];
    for (org, count) in top_orgs {
        results.push(format!("  - {}: {} flakes", org, group_thousands(count)));
    }
    if !top_labels.is_empty() {
        results.push("* Top labels:".to_string());
        for (label, count) in top_labels {
            results.push(format!("  - {}: {} flakes", label, group_thousands(count)));
        }
    }
    results.push("\nFlakeHub URL: https://flakehub.com/".to_string());
    results.join("\n")
}

fn bump(counts: &mut Vec<(String, u64)>, key: String) {
    match counts.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 += 1,
        None => counts.push((key, 1)),
    }
}

fn top(counts: &mut [(String, u64)], take: usize) -> Vec<(String, u64)> {
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.iter().take(take).cloned().collect()
}
