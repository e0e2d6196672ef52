//! nix.dev documentation search via the site's Sphinx search index.

use serde_json::Value;
use tokio::sync::OnceCell;

use crate::common::config::{NIXDEV_BASE_URL, NIXDEV_SEARCH_INDEX};
use crate::common::error::{api_error, ApiError};
use crate::common::http::{HttpClient, DOC_TIMEOUT};
use crate::sources::SourceContext;

/// Once-per-process cache of the Sphinx search index.
pub struct NixDevCache {
    index: OnceCell<Value>,
}

impl NixDevCache {
    pub fn new() -> Self {
        Self {
            index: OnceCell::new(),
        }
    }

    pub async fn get_index(&self, http: &HttpClient) -> Result<&Value, ApiError> {
        self.index
            .get_or_try_init(|| async {
                let content = http.get_text(NIXDEV_SEARCH_INDEX, DOC_TIMEOUT).await?;
                parse_search_index(&content)
            })
            .await
    }
}

impl Default for NixDevCache {
    fn default() -> Self {
        Self::new()
    }
}

/// The index ships as JavaScript: `Search.setIndex({...})`.
pub(crate) fn parse_search_index(content: &str) -> Result<Value, ApiError> {
    let trimmed = content.trim();
    let inner = trimmed
        .strip_prefix("Search.setIndex(")
        .and_then(|rest| rest.rfind(')').map(|end| &rest[..end]))
        .ok_or_else(|| ApiError::Parse("Unexpected search index format".to_string()))?;
    Ok(serde_json::from_str(inner)?)
}

/// Score documents against a query: 2 per exact term hit, 1 per partial
/// term hit, 5 for a title substring match. Returns `(doc_id, score)`
/// sorted best-first (doc id breaking ties).
pub(crate) fn score_documents(index: &Value, query: &str) -> Vec<(usize, i64)> {
    let empty_titles = Vec::new();
    let titles = index
        .get("titles")
        .and_then(Value::as_array)
        .unwrap_or(&empty_titles);
    let query_lower = query.to_lowercase();

    let mut scores: Vec<(usize, i64)> = Vec::new();
    fn add(doc_id: usize, points: i64, scores: &mut Vec<(usize, i64)>) {
        match scores.iter_mut().find(|(id, _)| *id == doc_id) {
            Some(entry) => entry.1 += points,
            None => scores.push((doc_id, points)),
        }
    }

    if let Some(terms) = index.get("terms").and_then(Value::as_object) {
        for term in query_lower.split_whitespace() {
            if let Some(doc_ids) = terms.get(term).and_then(Value::as_array) {
                for doc_id in doc_ids.iter().filter_map(Value::as_u64) {
                    add(doc_id as usize, 2, &mut scores);
                }
            }
            for (index_term, doc_ids) in terms {
                if index_term.contains(term) && index_term != term {
                    if let Some(doc_ids) = doc_ids.as_array() {
                        for doc_id in doc_ids.iter().filter_map(Value::as_u64) {
                            add(doc_id as usize, 1, &mut scores);
                        }
                    }
                }
            }
        }
    }

    for (i, title) in titles.iter().enumerate() {
        if let Some(title) = title.as_str() {
            if title.to_lowercase().contains(&query_lower) {
                // Title match bonus
                add(i, 5, &mut scores);
            }
        }
    }

    scores.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scores
}

pub async fn search(ctx: &SourceContext, query: &str, limit: usize) -> String {
    let index = match ctx.nixdev.get_index(&ctx.http).await {
        Ok(index) => index,
        Err(err) => return api_error(&err),
    };

    let scores = score_documents(index, query);
    if scores.is_empty() {
        return format!("No nix.dev documentation found matching '{}'", query);
    }

    let empty = Vec::new();
    let docnames = index
        .get("docnames")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let titles = index
        .get("titles")
        .and_then(Value::as_array)
        .unwrap_or(&empty);

    let shown: Vec<&(usize, i64)> = scores.iter().take(limit).collect();
    let mut results = vec![format!(
        "Found {} nix.dev docs matching '{}':\n",
        shown.len(),
        query
    )];
    for (doc_id, _score) in shown {
        let (Some(title), Some(docname)) = (
            titles.get(*doc_id).and_then(Value::as_str),
            docnames.get(*doc_id).and_then(Value::as_str),
        ) else {
            continue;
        };
        results.push(format!("* {}", title));
        results.push(format!("  {}/{}", NIXDEV_BASE_URL, docname));
        results.push(String::new());
    }
    results.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_index() -> Value {
        json!({
            "docnames": ["tutorials/first-steps", "guides/flakes", "reference/nix-lang"],
            "titles": ["First steps", "Working with flakes", "Nix language reference"],
            "terms": {
                "flakes": [1],
                "flakeref": [1, 2],
                "language": [2],
            },
        })
    }

    #[test]
    fn test_parse_search_index() {
        let content = r#"Search.setIndex({"docnames": ["a"], "titles": ["A"], "terms": {}})"#;
        let index = parse_search_index(content).unwrap();
        assert_eq!(index["docnames"][0], "a");

        assert!(parse_search_index("var x = 1;").is_err());
        assert!(parse_search_index("Search.setIndex(not json)").is_err());
    }

    #[test]
    fn test_score_documents_ranks_title_and_terms() {
        let index = sample_index();
        let scores = score_documents(&index, "flakes");
        // Doc 1: exact term (2) + partial "flakeref" (1) + title match (5) = 8
        // Doc 2: partial "flakeref" (1) = 1
        assert_eq!(scores[0], (1, 8));
        assert_eq!(scores[1], (2, 1));
    }

    #[test]
    fn test_score_documents_no_match() {
        assert!(score_documents(&sample_index(), "zig").is_empty());
    }
}
