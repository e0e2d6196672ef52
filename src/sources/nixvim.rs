//! Nixvim options via the NuschtOS static search metadata.
//!
//! The option set is published as paginated JSON chunks; the whole set is
//! fetched once per process and kept in memory.

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::common::config::NIXVIM_META_BASE;
use crate::common::error::{api_error, error_with, ApiError};
use crate::common::format::{group_thousands, truncate};
use crate::common::html::strip_html;
use crate::common::http::{HttpClient, DOC_TIMEOUT};
use crate::sources::SourceContext;

/// Once-per-process cache of the full Nixvim option list. A failed fetch
/// is not cached; the next call retries.
pub struct NixvimCache {
    options: OnceCell<Vec<Value>>,
}

impl NixvimCache {
    pub fn new() -> Self {
        Self {
            options: OnceCell::new(),
        }
    }

    pub async fn get_options(&self, http: &HttpClient) -> Result<&[Value], ApiError> {
        let options = self
            .options
            .get_or_try_init(|| fetch_all_chunks(http))
            .await?;
        Ok(options.as_slice())
    }
}

impl Default for NixvimCache {
    fn default() -> Self {
        Self::new()
    }
}

async fn fetch_all_chunks(http: &HttpClient) -> Result<Vec<Value>, ApiError> {
    let mut all_options = Vec::new();
    let mut chunk_id = 0u32;

    loop {
        let url = format!("{}/{}.json", NIXVIM_META_BASE, chunk_id);
        let chunk = match http.get_json(&url, DOC_TIMEOUT).await {
            Ok(chunk) => chunk,
            // No more chunks
            Err(ApiError::Status { code: 404 }) => break,
            Err(err) => return Err(err),
        };
        match chunk {
            Value::Array(items) => all_options.extend(items),
            // Unexpected format
            _ => break,
        }
        chunk_id += 1;
    }

    tracing::debug!(options = all_options.len(), "fetched nixvim option chunks");
    Ok(all_options)
}

fn opt_name(opt: &Value) -> &str {
    opt.get("name").and_then(Value::as_str).unwrap_or("")
}

fn opt_field(opt: &Value, field: &str) -> String {
    strip_html(opt.get(field).and_then(Value::as_str).unwrap_or(""))
}

pub async fn search(ctx: &SourceContext, query: &str, limit: usize) -> String {
    let options = match ctx.nixvim.get_options(&ctx.http).await {
        Ok(options) => options,
        Err(err) => return api_error(&err),
    };
    let query_lower = query.to_lowercase();

    let mut matches = Vec::new();
    for opt in options {
        let name = opt_name(opt);
        let desc = opt_field(opt, "description");
        if name.to_lowercase().contains(&query_lower) || desc.to_lowercase().contains(&query_lower)
        {
            matches.push((
                name.to_string(),
                opt.get("type").and_then(Value::as_str).unwrap_or("").to_string(),
                desc,
            ));
            if matches.len() >= limit {
                break;
            }
        }
    }

    if matches.is_empty() {
        return format!("No Nixvim options found matching '{}'", query);
    }

    let mut results = vec![format!(
        "Found {} Nixvim options matching '{}':\n",
        matches.len(),
        query
    )];
    for (name, opt_type, desc) in &matches {
        results.push(format!("* {}", name));
        if !opt_type.is_empty() {
            results.push(format!("  Type: {}", opt_type));
        }
        if !desc.is_empty() {
            results.push(format!("  {}", truncate(desc, 200)));
        }
        results.push(String::new());
    }
    results.join("\n").trim().to_string()
}

pub async fn info(ctx: &SourceContext, name: &str) -> String {
    let options = match ctx.nixvim.get_options(&ctx.http).await {
        Ok(options) => options,
        Err(err) => return api_error(&err),
    };

    if let Some(opt) = options.iter().find(|opt| opt_name(opt) == name) {
        return format_option(opt);
    }

    let name_lower = name.to_lowercase();
    if let Some(opt) = options
        .iter()
        .find(|opt| opt_name(opt).to_lowercase() == name_lower)
    {
        return format_option(opt);
    }

    let similar: Vec<&str> = options
        .iter()
        .map(opt_name)
        .filter(|candidate| candidate.to_lowercase().contains(&name_lower))
        .take(5)
        .collect();
    if !similar.is_empty() {
        return error_with(
            "NOT_FOUND",
            format!("Option '{}' not found. Similar: {}", name, similar.join(", ")),
        );
    }
    error_with("NOT_FOUND", format!("Nixvim option '{}' not found", name))
}

fn format_option(opt: &Value) -> String {
    let mut lines = vec![format!("Nixvim Option: {}", opt_name(opt))];

    if let Some(opt_type) = opt.get("type").and_then(Value::as_str) {
        if !opt_type.is_empty() {
            lines.push(format!("Type: {}", opt_type));
        }
    }

    let desc = opt_field(opt, "description");
    if !desc.is_empty() {
        lines.push(format!("Description: {}", desc));
    }

    let default = opt_field(opt, "default");
    if !default.is_empty() {
        lines.push(format!("Default: {}", default));
    }

    let example = opt_field(opt, "example");
    if !example.is_empty() {
        lines.push(format!("Example: {}", truncate(&example, 500)));
    }

    if let Some(declarations) = opt.get("declarations").and_then(Value::as_array) {
        if let Some(first) = declarations.first().and_then(Value::as_str) {
            lines.push(format!("Declared in: {}", first));
        }
    }

    lines.join("\n")
}

pub async fn stats(ctx: &SourceContext) -> String {
    let options = match ctx.nixvim.get_options(&ctx.http).await {
        Ok(options) => options,
        Err(err) => return api_error(&err),
    };

    let mut categories: Vec<(String, u64)> = Vec::new();
    for opt in options {
        let name = opt_name(opt);
        let cat = name.split('.').next().unwrap_or(name);
        match categories.iter_mut().find(|(c, _)| c == cat) {
            Some(entry) => entry.1 += 1,
            None => categories.push((cat.to_string(), 1)),
        }
    }
    let total_categories = categories.len();
    categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut result = vec![
        "Nixvim Statistics:".to_string(),
        format!("* Total options: {}", group_thousands(options.len() as u64)),
        format!("* Categories: {}", total_categories),
        "* Top categories:".to_string(),
    ];
    for (cat, count) in categories.iter().take(5) {
        result.push(format!("  - {}: {}", cat, group_thousands(*count)));
    }
    result.join("\n")
}

pub async fn browse(ctx: &SourceContext, prefix: &str) -> String {
    let options = match ctx.nixvim.get_options(&ctx.http).await {
        Ok(options) => options,
        Err(err) => return api_error(&err),
    };

    if prefix.is_empty() {
        let mut categories: Vec<(String, u64)> = Vec::new();
        for opt in options {
            let name = opt_name(opt);
            let cat = name.split('.').next().unwrap_or(name);
            match categories.iter_mut().find(|(c, _)| c == cat) {
                Some(entry) => entry.1 += 1,
                None => categories.push((cat.to_string(), 1)),
            }
        }
        categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut results = vec![format!(
            "Nixvim option categories ({} total):\n",
            categories.len()
        )];
        for (cat, count) in &categories {
            results.push(format!("* {} ({} options)", cat, count));
        }
        return results.join("\n");
    }

    let prefix_dot = if prefix.ends_with('.') {
        prefix.to_string()
    } else {
        format!("{}.", prefix)
    };
    let mut matches: Vec<(&str, &str, String)> = options
        .iter()
        .filter(|opt| {
            let name = opt_name(opt);
            name.starts_with(&prefix_dot) || name == prefix
        })
        .map(|opt| {
            (
                opt_name(opt),
                opt.get("type").and_then(Value::as_str).unwrap_or(""),
                opt_field(opt, "description"),
            )
        })
        .collect();

    if matches.is_empty() {
        return format!("No Nixvim options found with prefix '{}'", prefix);
    }
    matches.sort_by(|a, b| a.0.cmp(b.0));

    let mut results = vec![format!(
        "Nixvim options with prefix '{}' ({} found):\n",
        prefix,
        matches.len()
    )];
    for (name, opt_type, desc) in matches.iter().take(100) {
        results.push(format!("* {}", name));
        if !opt_type.is_empty() {
            results.push(format!("  Type: {}", opt_type));
        }
        if !desc.is_empty() {
            results.push(format!("  {}", truncate(desc, 150)));
        }
        results.push(String::new());
    }
    if matches.len() > 100 {
        results.push(format!("... and {} more options", matches.len() - 100));
    }
    results.join("\n").trim().to_string()
}
