//! NixOS Wiki search via the MediaWiki API.

use serde_json::Value;

use crate::common::config::WIKI_API;
use crate::common::error::{error_with, ApiError};
use crate::common::format::{group_thousands, truncate};
use crate::common::html::strip_html;
use crate::common::http::API_TIMEOUT;
use crate::sources::SourceContext;

fn wiki_error(err: &ApiError) -> String {
    match err {
        ApiError::Timeout => error_with("TIMEOUT", "Wiki API timed out"),
        _ => error_with("API_ERROR", format!("Wiki API error: {}", err)),
    }
}

/// Article URL with the title percent-encoded as a path segment.
fn article_url(title: &str) -> String {
    let mut url = match url::Url::parse("https://wiki.nixos.org/wiki/") {
        Ok(url) => url,
        Err(_) => return format!("https://wiki.nixos.org/wiki/{}", title.replace(' ', "_")),
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(&title.replace(' ', "_"));
    }
    url.to_string()
}

pub async fn search(ctx: &SourceContext, query: &str, limit: usize) -> String {
    // MediaWiki matches "home manager" better than "home-manager".
    let normalized_query = query.replace('-', " ");
    let limit_str = limit.to_string();
    let params: &[(&str, &str)] = &[
        ("action", "query"),
        ("list", "search"),
        ("srsearch", &normalized_query),
        ("format", "json"),
        ("utf8", "1"),
        ("srlimit", &limit_str),
    ];

    let data = match ctx.http.get_json_query(WIKI_API, params, API_TIMEOUT).await {
        Ok(data) => data,
        Err(err) => return wiki_error(&err),
    };

    let empty = Vec::new();
    let items = data
        .get("query")
        .and_then(|q| q.get("search"))
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    if items.is_empty() {
        return format!("No wiki articles found matching '{}'", query);
    }

    let mut results = vec![format!(
        "Found {} wiki articles matching '{}':\n",
        items.len(),
        query
    )];
    for item in items {
        let title = item.get("title").and_then(Value::as_str).unwrap_or("");
        let snippet = strip_html(item.get("snippet").and_then(Value::as_str).unwrap_or(""));
        let wordcount = item.get("wordcount").and_then(Value::as_u64).unwrap_or(0);

        results.push(format!("* {}", title));
        results.push(format!("  {}", article_url(title)));
        if !snippet.is_empty() {
            results.push(format!("  {}", truncate(&snippet, 200)));
        }
        if wordcount > 0 {
            results.push(format!("  ({} words)", group_thousands(wordcount)));
        }
        results.push(String::new());
    }
    results.join("\n").trim().to_string()
}

pub async fn info(ctx: &SourceContext, title: &str) -> String {
    let params: &[(&str, &str)] = &[
        ("action", "query"),
        ("titles", title),
        ("prop", "extracts|info"),
        // Just the intro, as plain text
        ("exintro", "1"),
        ("explaintext", "1"),
        ("format", "json"),
    ];

    let data = match ctx.http.get_json_query(WIKI_API, params, API_TIMEOUT).await {
        Ok(data) => data,
        Err(err) => return wiki_error(&err),
    };

    let Some(pages) = data
        .get("query")
        .and_then(|q| q.get("pages"))
        .and_then(Value::as_object)
        .filter(|pages| !pages.is_empty())
    else {
        return error_with("NOT_FOUND", format!("Wiki page '{}' not found", title));
    };

    // MediaWiki keys missing pages with a "missing" marker.
    let Some(page) = pages.values().next() else {
        return error_with("NOT_FOUND", format!("Wiki page '{}' not found", title));
    };
    if page.get("missing").is_some() {
        return error_with("NOT_FOUND", format!("Wiki page '{}' not found", title));
    }

    let page_title = page.get("title").and_then(Value::as_str).unwrap_or(title);
    let extract = page.get("extract").and_then(Value::as_str).unwrap_or("");

    let mut results = vec![
        format!("Wiki: {}", page_title),
        format!("URL: {}", article_url(page_title)),
        String::new(),
    ];
    if !extract.is_empty() {
        results.push(truncate(extract, 1500));
    }
    results.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_url_encodes_title() {
        assert_eq!(
            article_url("Home Manager"),
            "https://wiki.nixos.org/wiki/Home_Manager"
        );
        assert_eq!(
            article_url("Install/Guide?"),
            "https://wiki.nixos.org/wiki/Install%2FGuide%3F"
        );
    }

    #[test]
    fn test_wiki_error_codes() {
        assert_eq!(wiki_error(&ApiError::Timeout), "Error (TIMEOUT): Wiki API timed out");
        assert!(wiki_error(&ApiError::Status { code: 503 }).contains("Wiki API error"));
    }
}
