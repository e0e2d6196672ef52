//! Noogle function search (noogle.dev API).
//!
//! The whole function corpus is one large JSON document, fetched once per
//! process; all searching happens in memory.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::common::config::NOOGLE_API;
use crate::common::error::{error_with, ApiError};
use crate::common::format::{group_thousands, truncate};
use crate::common::html::strip_html;
use crate::common::http::HttpClient;
use crate::sources::SourceContext;

/// The corpus is ~20 MB; give it more room than the other feeds.
const NOOGLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Once-per-process cache of the Noogle corpus.
pub struct NoogleCache {
    data: OnceCell<(Vec<Value>, Value)>,
}

impl NoogleCache {
    pub fn new() -> Self {
        Self {
            data: OnceCell::new(),
        }
    }

    pub async fn get_data(&self, http: &HttpClient) -> Result<&(Vec<Value>, Value), ApiError> {
        self.data
            .get_or_try_init(|| async {
                let payload = http.get_json(NOOGLE_API, NOOGLE_TIMEOUT).await?;
                let data = payload
                    .get("data")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let builtin_types = payload
                    .get("builtinTypes")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                tracing::debug!(functions = data.len(), "fetched noogle corpus");
                Ok((data, builtin_types))
            })
            .await
    }
}

impl Default for NoogleCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Dotted function path from a Noogle document.
pub(crate) fn function_path(doc: &Value) -> String {
    let meta = doc.get("meta").cloned().unwrap_or_default();
    if let Some(path) = meta.get("path").and_then(Value::as_array) {
        if !path.is_empty() {
            return path
                .iter()
                .map(|p| match p {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(".");
        }
    }
    meta.get("title")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

/// Type signature, from `content.signature` or `content.type`.
pub(crate) fn type_signature(doc: &Value) -> String {
    let Some(content) = doc.get("content").filter(|c| c.is_object()) else {
        return String::new();
    };
    for field in ["signature", "type"] {
        if let Some(text) = content.get(field).and_then(Value::as_str) {
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }
    String::new()
}

/// Alias paths, joined dotted where they arrive as arrays.
pub(crate) fn aliases(doc: &Value) -> Vec<String> {
    let Some(list) = doc
        .get("meta")
        .and_then(|m| m.get("aliases"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };
    list.iter()
        .map(|alias| match alias {
            Value::Array(parts) => parts
                .iter()
                .map(|p| match p {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join("."),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect()
}

/// Documentation body, from `content.content` or the lambda payload.
pub(crate) fn description(doc: &Value) -> String {
    let Some(content) = doc.get("content").filter(|c| c.is_object()) else {
        return String::new();
    };
    if let Some(text) = content.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            return strip_html(text);
        }
    }
    if let Some(text) = content
        .get("lambda")
        .and_then(|l| l.get("content"))
        .and_then(Value::as_str)
    {
        if !text.is_empty() {
            return strip_html(text);
        }
    }
    String::new()
}

/// Relevance score for one document; zero means no match.
pub(crate) fn score(doc: &Value, query_lower: &str) -> i64 {
    let path = function_path(doc);
    let path_lower = path.to_lowercase();
    if path_lower == query_lower {
        return 100;
    }
    if path_lower.contains(query_lower) {
        // Matching the function name itself beats matching mid-path.
        return if path_lower.ends_with(query_lower)
            || path_lower.ends_with(&format!(".{}", query_lower))
        {
            50
        } else {
            30
        };
    }
    if aliases(doc)
        .iter()
        .any(|alias| alias.to_lowercase().contains(query_lower))
    {
        return 40;
    }
    if description(doc).to_lowercase().contains(query_lower) {
        return 10;
    }
    0
}

pub async fn search(ctx: &SourceContext, query: &str, limit: usize) -> String {
    let (data, _) = match ctx.noogle.get_data(&ctx.http).await {
        Ok(data) => data,
        Err(err) => return error_with("API_ERROR", err),
    };
    let query_lower = query.to_lowercase();

    let mut matches: Vec<(i64, String, &Value)> = data
        .iter()
        .filter_map(|doc| {
            let doc_score = score(doc, &query_lower);
            if doc_score > 0 {
                Some((doc_score, function_path(doc), doc))
            } else {
                None
            }
        })
        .collect();

    if matches.is_empty() {
        return format!("No Noogle functions found matching '{}'", query);
    }

    matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    matches.truncate(limit);

    let mut results = vec![format!(
        "Found {} Noogle functions matching '{}':\n",
        matches.len(),
        query
    )];
    for (_, path, doc) in &matches {
        results.push(format!("* {}", path));
        let sig = type_signature(doc);
        if !sig.is_empty() {
            results.push(format!("  Type: {}", truncate(&sig, 100)));
        }
        let desc = description(doc);
        if !desc.is_empty() {
            results.push(format!("  {}", truncate(&desc, 200)));
        }
        let doc_aliases = aliases(doc);
        if !doc_aliases.is_empty() {
            let shown: Vec<&str> = doc_aliases.iter().map(String::as_str).take(3).collect();
            results.push(format!("  Aliases: {}", shown.join(", ")));
        }
        results.push(String::new());
    }
    results.join("\n").trim().to_string()
}

pub async fn info(ctx: &SourceContext, name: &str) -> String {
    let (data, _) = match ctx.noogle.get_data(&ctx.http).await {
        Ok(data) => data,
        Err(err) => return error_with("API_ERROR", err),
    };
    let name_lower = name.to_lowercase();

    let mut exact_match = None;
    let mut partial_matches: Vec<String> = Vec::new();
    for doc in data {
        let path = function_path(doc);
        let path_lower = path.to_lowercase();
        let alias_hit = aliases(doc)
            .iter()
            .any(|alias| alias.to_lowercase() == name_lower);
        if path_lower == name_lower || alias_hit {
            exact_match = Some(doc);
            break;
        } else if path_lower.contains(&name_lower) {
            partial_matches.push(path);
        }
    }

    let Some(doc) = exact_match else {
        if partial_matches.is_empty() {
            return error_with("NOT_FOUND", format!("Noogle function '{}' not found", name));
        }
        let suggestions: Vec<&str> = partial_matches
            .iter()
            .map(String::as_str)
            .take(5)
            .collect();
        return error_with(
            "NOT_FOUND",
            format!("Function '{}' not found. Similar: {}", name, suggestions.join(", ")),
        );
    };

    let path = function_path(doc);
    let meta = doc.get("meta").cloned().unwrap_or_default();
    let content = doc.get("content").cloned().unwrap_or_default();

    let mut results = vec![format!("Noogle Function: {}", path)];

    let sig = type_signature(doc);
    if !sig.is_empty() {
        results.push(format!("Type: {}", sig));
    }

    results.push(format!("Path: {}", path));

    let doc_aliases = aliases(doc);
    if !doc_aliases.is_empty() {
        results.push(format!("Aliases: {}", doc_aliases.join(", ")));
    }

    if let Some(primop_meta) = meta.get("primop_meta").filter(|m| m.is_object()) {
        if let Some(arity) = primop_meta.get("arity").and_then(Value::as_i64) {
            let args: Vec<&str> = primop_meta
                .get("args")
                .and_then(Value::as_array)
                .map(|args| args.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if args.is_empty() {
                results.push(format!("Primop: Yes (arity: {})", arity));
            } else {
                results.push(format!(
                    "Primop: Yes (arity: {}, args: {})",
                    arity,
                    args.join(", ")
                ));
            }
        }
    }

    results.push(String::new());

    let desc = description(doc);
    if !desc.is_empty() {
        results.push("Description:".to_string());
        results.push(desc);
        results.push(String::new());
    }

    if let Some(example) = content.get("example").and_then(Value::as_str) {
        let example = strip_html(example);
        if !example.is_empty() {
            results.push("Example:".to_string());
            results.push(truncate(&example, 500));
            results.push(String::new());
        }
    }

    if let Some(position) = meta.get("position").filter(|p| p.is_object()) {
        let file = position.get("file").and_then(Value::as_str).unwrap_or("");
        if !file.is_empty() {
            match position.get("line").and_then(Value::as_i64) {
                Some(line) => results.push(format!("Source: {}:{}", file, line)),
                None => results.push(format!("Source: {}", file)),
            }
        }
    }

    results.join("\n").trim().to_string()
}

fn category(path: &str) -> String {
    if path.contains('.') {
        path.split('.').take(2).collect::<Vec<_>>().join(".")
    } else {
        path.to_string()
    }
}

pub async fn stats(ctx: &SourceContext) -> String {
    let (data, _) = match ctx.noogle.get_data(&ctx.http).await {
        Ok(data) => data,
        Err(err) => return error_with("API_ERROR", err),
    };

    let mut categories: Vec<(String, u64)> = Vec::new();
    let mut with_signatures = 0u64;
    let mut with_docs = 0u64;
    for doc in data {
        let cat = category(&function_path(doc));
        match categories.iter_mut().find(|(c, _)| *c == cat) {
            Some(entry) => entry.1 += 1,
            None => categories.push((cat, 1)),
        }
        if !type_signature(doc).is_empty() {
            with_signatures += 1;
        }
        if !description(doc).is_empty() {
            with_docs += 1;
        }
    }
    let total_categories = categories.len();
    categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut results = vec![
        "Noogle Statistics:".to_string(),
        format!("* Total functions: {}", group_thousands(data.len() as u64)),
        format!("* With type signatures: {}", group_thousands(with_signatures)),
        format!("* With documentation: {}", group_thousands(with_docs)),
        format!("* Categories: {}", total_categories),
        "* Top categories:".to_string(),
    ];
    for (cat, count) in categories.iter().take(10) {
        results.push(format!("  - {}: {}", cat, count));
    }
    results.push(String::new());
    results.push("Data source: noogle.dev (updated daily)".to_string());
    results.join("\n")
}

pub async fn browse(ctx: &SourceContext, prefix: &str) -> String {
    let (data, _) = match ctx.noogle.get_data(&ctx.http).await {
        Ok(data) => data,
        Err(err) => return error_with("API_ERROR", err),
    };

    if prefix.is_empty() {
        let mut categories: Vec<(String, u64)> = Vec::new();
        for doc in data {
            let cat = category(&function_path(doc));
            match categories.iter_mut().find(|(c, _)| *c == cat) {
                Some(entry) => entry.1 += 1,
                None => categories.push((cat, 1)),
            }
        }
        categories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut results = vec![format!(
            "Noogle function categories ({} total):\n",
            categories.len()
        )];
        for (cat, count) in &categories {
            results.push(format!("* {} ({} functions)", cat, count));
        }
        return results.join("\n");
    }

    let prefix_lower = prefix.to_lowercase();
    let prefix_dot = if prefix_lower.ends_with('.') {
        prefix_lower.clone()
    } else {
        format!("{}.", prefix_lower)
    };

    let mut matches: Vec<(String, String, String)> = data
        .iter()
        .filter_map(|doc| {
            let path = function_path(doc);
            let path_lower = path.to_lowercase();
            if path_lower.starts_with(&prefix_dot) || path_lower == prefix_lower {
                Some((path, type_signature(doc), description(doc)))
            } else {
                None
            }
        })
        .collect();

    if matches.is_empty() {
        return format!("No Noogle functions found with prefix '{}'", prefix);
    }
    matches.sort_by(|a, b| a.0.cmp(&b.0));

    let mut results = vec![format!(
        "Noogle functions with prefix '{}' ({} found):\n",
        prefix,
        matches.len()
    )];
    for (path, sig, desc) in matches.iter().take(100) {
        results.push(format!("* {}", path));
        if !sig.is_empty() {
            results.push(format!("  Type: {}", truncate(sig, 80)));
        }
        if !desc.is_empty() {
            results.push(format!("  {}", truncate(desc, 150)));
        }
        results.push(String::new());
    }
    if matches.len() > 100 {
        results.push(format!("... and {} more functions", matches.len() - 100));
    }
    results.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(path: &[&str], signature: &str, content_text: &str) -> Value {
        json!({
            "meta": {"path": path, "aliases": [["lib", "strings", "alias"]]},
            "content": {"signature": signature, "content": content_text},
        })
    }

    #[test]
    fn test_function_path_and_fallback() {
        let d = doc(&["lib", "strings", "concatMapStrings"], "", "");
        assert_eq!(function_path(&d), "lib.strings.concatMapStrings");

        let titled = json!({"meta": {"title": "builtins.map"}});
        assert_eq!(function_path(&titled), "builtins.map");
    }

    #[test]
    fn test_score_ordering() {
        let d = doc(&["lib", "strings", "concatMapStrings"], "sig", "maps and concatenates");
        assert_eq!(score(&d, "lib.strings.concatmapstrings"), 100);
        assert_eq!(score(&d, "concatmapstrings"), 50);
        assert_eq!(score(&d, "strings"), 30);
        assert_eq!(score(&d, "alias"), 40);
        assert_eq!(score(&d, "concatenates"), 10);
        assert_eq!(score(&d, "zig"), 0);
    }

    #[test]
    fn test_aliases_join_arrays() {
        let d = doc(&["lib", "id"], "", "");
        assert_eq!(aliases(&d), vec!["lib.strings.alias".to_string()]);
    }

    #[test]
    fn test_type_signature_fallback_to_type() {
        let d = json!({"content": {"type": "a -> a"}});
        assert_eq!(type_signature(&d), "a -> a");
        assert_eq!(type_signature(&json!({})), "");
    }

    #[test]
    fn test_category_grouping() {
        assert_eq!(category("lib.strings.toUpper"), "lib.strings");
        assert_eq!(category("map"), "map");
    }
}
