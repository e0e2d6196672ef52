//! Shared engine for the HTML-documented option sets (Home Manager and
//! nix-darwin). Both publish one big definition-list page; only the URL,
//! display label, and page size differ.

use std::collections::BTreeMap;

use crate::common::error::{error, error_with};
use crate::common::format::group_thousands;
use crate::common::html::{fetch_options, DocOption};
use crate::sources::SourceContext;

pub struct DocSet {
    pub url: &'static str,
    pub label: &'static str,
    /// Upper bound when scanning the whole page for stats/browsing.
    pub scan_limit: usize,
}

pub async fn search(ctx: &SourceContext, set: &DocSet, query: &str, limit: usize) -> String {
    let options = match fetch_options(&ctx.http, set.url, query, "", limit).await {
        Ok(options) => options,
        Err(err) => return error(format!("Failed to fetch docs: {}", err)),
    };
    if options.is_empty() {
        return format!("No {} options found matching '{}'", set.label, query);
    }

    let mut results = vec![format!(
        "Found {} {} options matching '{}':\n",
        options.len(),
        set.label,
        query
    )];
    for opt in &options {
        results.push(format!("* {}", opt.name));
        if !opt.type_info.is_empty() {
            results.push(format!("  Type: {}", opt.type_info));
        }
        if !opt.description.is_empty() {
            results.push(format!("  {}", opt.description));
        }
        results.push(String::new());
    }
    results.join("\n").trim().to_string()
}

pub async fn info(ctx: &SourceContext, set: &DocSet, name: &str) -> String {
    let options = match fetch_options(&ctx.http, set.url, name, "", 100).await {
        Ok(options) => options,
        Err(err) => return error(format!("Failed to fetch docs: {}", err)),
    };

    if let Some(opt) = options.iter().find(|opt| opt.name == name) {
        let mut info = vec![format!("Option: {}", name)];
        if !opt.type_info.is_empty() {
            info.push(format!("Type: {}", opt.type_info));
        }
        if !opt.description.is_empty() {
            info.push(format!("Description: {}", opt.description));
        }
        return info.join("\n");
    }

    let suggestions: Vec<&str> = options
        .iter()
        .take(5)
        .filter(|opt| opt.name.contains(name))
        .map(|opt| opt.name.as_str())
        .collect();
    if !suggestions.is_empty() {
        return error_with(
            "NOT_FOUND",
            format!("Option '{}' not found. Similar: {}", name, suggestions.join(", ")),
        );
    }
    error_with("NOT_FOUND", format!("Option '{}' not found", name))
}

pub async fn stats(ctx: &SourceContext, set: &DocSet) -> String {
    let options = match fetch_options(&ctx.http, set.url, "", "", set.scan_limit).await {
        Ok(options) => options,
        Err(err) => return error(format!("Failed to fetch docs: {}", err)),
    };
    if options.is_empty() {
        return error(format!("Failed to fetch {} statistics", set.label));
    }

    let categories = category_counts(&options);
    let top = top_categories(&categories, 5);

    let mut result = vec![
        format!("{} Statistics:", set.label),
        format!("* Total options: {}", group_thousands(options.len() as u64)),
        format!("* Categories: {}", categories.len()),
        "* Top categories:".to_string(),
    ];
    for (cat, count) in top {
        result.push(format!("  - {}: {}", cat, group_thousands(count as u64)));
    }
    result.join("\n")
}

pub async fn browse(ctx: &SourceContext, set: &DocSet, prefix: &str) -> String {
    if !prefix.is_empty() {
        let options = match fetch_options(&ctx.http, set.url, "", prefix, 100).await {
            Ok(options) => options,
            Err(err) => return error(format!("Failed to fetch docs: {}", err)),
        };
        if options.is_empty() {
            return format!("No {} options found with prefix '{}'", set.label, prefix);
        }
        let mut sorted: Vec<&DocOption> = options.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let mut results = vec![format!(
            "{} options with prefix '{}' ({} found):\n",
            set.label,
            prefix,
            sorted.len()
        )];
        for opt in sorted {
            results.push(format!("* {}", opt.name));
            if !opt.description.is_empty() {
                results.push(format!("  {}", opt.description));
            }
            results.push(String::new());
        }
        return results.join("\n").trim().to_string();
    }

    let options = match fetch_options(&ctx.http, set.url, "", "", set.scan_limit).await {
        Ok(options) => options,
        Err(err) => return error(format!("Failed to fetch docs: {}", err)),
    };

    // Category listing: top-level identifiers only, prose headings dropped.
    let mut categories: BTreeMap<String, usize> = BTreeMap::new();
    for opt in &options {
        if let Some(cat) = opt.name.split('.').next() {
            if opt.name.contains('.') && cat.len() > 1 && is_lower_identifier(cat) {
                *categories.entry(cat.to_string()).or_insert(0) += 1;
            }
        }
    }

    let mut results = vec![format!("{} categories ({} total):\n", set.label, categories.len())];
    for (cat, count) in top_categories(&categories, usize::MAX) {
        results.push(format!("* {} ({} options)", cat, count));
    }
    results.join("\n")
}

pub fn category_counts(options: &[DocOption]) -> BTreeMap<String, usize> {
    let mut categories = BTreeMap::new();
    for opt in options {
        let cat = opt.name.split('.').next().unwrap_or("").to_string();
        *categories.entry(cat).or_insert(0) += 1;
    }
    categories
}

/// Categories sorted by descending count, name breaking ties.
pub fn top_categories(categories: &BTreeMap<String, usize>, take: usize) -> Vec<(String, usize)> {
    let mut sorted: Vec<(String, usize)> = categories
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted.truncate(take);
    sorted
}

fn is_lower_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    let valid = match chars.next() {
        Some(first) => first.is_alphabetic() || first == '_',
        None => false,
    } && chars.all(|c| c.is_alphanumeric() || c == '_');
    valid && !text.chars().any(|c| c.is_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opt(name: &str) -> DocOption {
        DocOption {
            name: name.to_string(),
            description: String::new(),
            type_info: String::new(),
        }
    }

    #[test]
    fn test_category_counts_and_top() {
        let options = vec![
            opt("programs.git.enable"),
            opt("programs.vim.enable"),
            opt("services.sshd.enable"),
        ];
        let categories = category_counts(&options);
        assert_eq!(categories["programs"], 2);
        assert_eq!(categories["services"], 1);

        let top = top_categories(&categories, 1);
        assert_eq!(top, vec![("programs".to_string(), 2)]);
    }

    #[test]
    fn test_top_categories_ties_break_by_name() {
        let mut categories = BTreeMap::new();
        categories.insert("zeta".to_string(), 3);
        categories.insert("alpha".to_string(), 3);
        let top = top_categories(&categories, 2);
        assert_eq!(top[0].0, "alpha");
        assert_eq!(top[1].0, "zeta");
    }

    #[test]
    fn test_is_lower_identifier() {
        assert!(is_lower_identifier("programs"));
        assert!(is_lower_identifier("nix_daemon"));
        assert!(!is_lower_identifier("Programs"));
        assert!(!is_lower_identifier("1abc"));
        assert!(!is_lower_identifier(""));
    }
}
