//! HTML utilities: tag stripping and the documentation options parser.
//!
//! Home Manager and nix-darwin publish their option sets as single HTML
//! pages built from `dt`/`dd` definition lists. The parser here walks those
//! lists and extracts option name, first-paragraph description, and the
//! `Type:` annotation.

use scraper::{ElementRef, Html, Selector};

use crate::common::error::ApiError;
use crate::common::http::{HttpClient, DOC_TIMEOUT};

/// One option scraped from a documentation page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocOption {
    pub name: String,
    pub description: String,
    pub type_info: String,
}

/// Strip HTML tags and collapse whitespace for plain text output.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    text.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Fetch a documentation page and parse its option list.
///
/// `query` filters by case-insensitive substring, `prefix` by option path
/// prefix (`prefix.` or an exact match); both may be empty.
pub async fn fetch_options(
    http: &HttpClient,
    url: &str,
    query: &str,
    prefix: &str,
    limit: usize,
) -> Result<Vec<DocOption>, ApiError> {
    let body = http.get_text(url, DOC_TIMEOUT).await?;
    // Home Manager wraps option names in anchors; darwin uses plain text.
    let anchor_names = url.contains("home-manager");
    Ok(parse_options_document(&body, anchor_names, query, prefix, limit))
}

/// Parse an options page. Pure so it can be tested on static HTML.
pub fn parse_options_document(
    html: &str,
    anchor_names: bool,
    query: &str,
    prefix: &str,
    limit: usize,
) -> Vec<DocOption> {
    let document = Html::parse_document(html);
    let mut options = Vec::new();

    let Ok(dt_selector) = Selector::parse("dt") else {
        return options;
    };
    let anchor_selector = Selector::parse("a[id]").ok();
    let para_selector = Selector::parse("p").ok();
    let term_selector = Selector::parse("span.term").ok();

    let query_lower = query.to_lowercase();

    for dt in document.select(&dt_selector) {
        let mut name = String::new();
        if anchor_names {
            if let Some(anchor_selector) = &anchor_selector {
                if let Some(anchor) = dt.select(anchor_selector).next() {
                    if let Some(id) = anchor.value().attr("id") {
                        if let Some(stripped) = id.strip_prefix("opt-") {
                            name = stripped.replace("_name_", "<name>");
                        }
                    }
                }
            }
        }
        if name.is_empty() {
            name = element_text(&dt);
        }

        // Prose dts (section headings etc.) have spaces but no dots.
        if !name.contains('.') && name.split_whitespace().count() > 1 {
            continue;
        }
        if !query_lower.is_empty() && !name.to_lowercase().contains(&query_lower) {
            continue;
        }
        if !prefix.is_empty() && !(name.starts_with(&format!("{}.", prefix)) || name == prefix) {
            continue;
        }

        let Some(dd) = next_dd_sibling(&dt) else {
            continue;
        };

        let description = match para_selector
            .as_ref()
            .and_then(|sel| dd.select(sel).next())
        {
            Some(para) => element_text(&para),
            None => element_text(&dd).lines().next().unwrap_or("").to_string(),
        };
        let description: String = description.chars().take(200).collect();

        let mut type_info = String::new();
        if let Some(term) = term_selector
            .as_ref()
            .and_then(|sel| dd.select(sel).find(|el| element_text(el).contains("Type:")))
        {
            type_info = element_text(&term).replace("Type:", "").trim().to_string();
        } else {
            let text = element_text(&dd);
            if let Some(start) = text.find("Type:") {
                let rest = &text[start + 5..];
                let end = rest.find('\n').unwrap_or(rest.len());
                type_info = rest[..end].trim().to_string();
            }
        }

        options.push(DocOption {
            name,
            description,
            type_info,
        });
        if options.len() >= limit {
            break;
        }
    }

    options
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// The `dd` paired with a `dt`, skipping interleaved nodes but stopping at
/// the next `dt` so an entry never steals its neighbor's body.
fn next_dd_sibling<'a>(dt: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    let mut sibling = dt.next_sibling();
    while let Some(node) = sibling {
        if let Some(el) = ElementRef::wrap(node) {
            match el.value().name() {
                "dd" => return Some(el),
                "dt" => return None,
                _ => {}
            }
        }
        sibling = node.next_sibling();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const DARWIN_PAGE: &str = r#"
        <html><body><dl>
          <dt>services.nix-daemon.enable</dt>
          <dd>
            <p>Whether to activate the nix-daemon service.</p>
            <span class="term">Type: boolean</span>
          </dd>
          <dt>Some Section Heading</dt>
          <dd><p>Not an option.</p></dd>
          <dt>system.defaults.dock.autohide</dt>
          <dd><p>Auto-hide the dock.</p><span class="term">Type: null or boolean</span></dd>
        </dl></body></html>
    "#;

    const HM_PAGE: &str = r#"
        <html><body><dl>
          <dt><a id="opt-programs.git.enable"></a>programs.git.enable</dt>
          <dd>
            <p>Whether to enable Git.</p>
            <span class="term">Type: boolean</span>
          </dd>
          <dt><a id="opt-programs.git.includes._name_.path"></a></dt>
          <dd><p>Path of the configuration file to include.</p></dd>
        </dl></body></html>
    "#;

    #[test]
    fn test_strip_html() {
        assert_eq!(strip_html(""), "");
        assert_eq!(strip_html("<p>hello <b>world</b></p>"), "hello world");
        assert_eq!(strip_html("plain  text\n here"), "plain text here");
    }

    #[test]
    fn test_parse_darwin_options() {
        let options = parse_options_document(DARWIN_PAGE, false, "", "", 100);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].name, "services.nix-daemon.enable");
        assert_eq!(
            options[0].description,
            "Whether to activate the nix-daemon service."
        );
        assert_eq!(options[0].type_info, "boolean");
        assert_eq!(options[1].name, "system.defaults.dock.autohide");
    }

    #[test]
    fn test_parse_home_manager_anchor_names() {
        let options = parse_options_document(HM_PAGE, true, "", "", 100);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].name, "programs.git.enable");
        assert_eq!(options[1].name, "programs.git.includes.<name>.path");
    }

    #[test]
    fn test_query_filter() {
        let options = parse_options_document(DARWIN_PAGE, false, "dock", "", 100);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].name, "system.defaults.dock.autohide");
    }

    #[test]
    fn test_prefix_filter() {
        let options = parse_options_document(DARWIN_PAGE, false, "", "services", 100);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].name, "services.nix-daemon.enable");

        let none = parse_options_document(DARWIN_PAGE, false, "", "servicesx", 100);
        assert!(none.is_empty());
    }

    #[test]
    fn test_limit_stops_parsing() {
        let options = parse_options_document(DARWIN_PAGE, false, "", "", 1);
        assert_eq!(options.len(), 1);
    }
}
