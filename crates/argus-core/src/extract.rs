use std::collections::HashSet;

use scraper::{Html, Selector};
use url::Url;

use crate::exclusion::ExclusionRules;

/// Elements whose `href`/`src` reference other resources.
const LINK_BEARING: &str =
    "a[href], area[href], link[href], img[src], script[src], iframe[src], source[src], embed[src]";

/// A single reference found in a document.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveredLink {
    /// An http(s) reference, resolved to an absolute URL.
    Web {
        /// Resolved absolute URL, fragment intact.
        url: Url,
        /// Whether the node sits inside (or is) a CSS-excluded subtree.
        excluded_subtree: bool,
    },
    /// A non-web scheme (`mailto:`, `tel:`, `javascript:`, `data:`, ...)
    /// that is recorded as skipped without a network call.
    NonWeb { href: String, scheme: String },
}

/// Extract every reference from one fetched HTML document.
///
/// Parsing is tolerant of malformed HTML (html5ever recovery rules); a
/// document that yields nothing simply produces an empty list. Relative,
/// protocol-relative and fragment-only references are resolved against the
/// document base — `<base href>` wins over the page URL, as in a browser.
pub fn extract_links(html: &str, page_url: &Url, rules: &ExclusionRules) -> Vec<DiscoveredLink> {
    let document = Html::parse_document(html);

    let base_url = document_base(&document, page_url);

    // Collect the node ids of every element matched by an exclusion
    // selector; containment below is an ancestor-chain lookup.
    let mut excluded_nodes = HashSet::new();
    for selector in rules.selectors() {
        for element in document.select(selector) {
            excluded_nodes.insert(element.id());
        }
    }

    let link_selector = Selector::parse(LINK_BEARING).unwrap();
    let mut links = Vec::new();

    for element in document.select(&link_selector) {
        let raw = element
            .value()
            .attr("href")
            .or_else(|| element.value().attr("src"))
            .map(str::trim)
            .unwrap_or_default();
        if raw.is_empty() {
            continue;
        }

        let resolved = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => match base_url.join(raw) {
                Ok(url) => url,
                Err(_) => continue,
            },
            Err(_) => continue,
        };

        match resolved.scheme() {
            "http" | "https" => {
                let excluded_subtree = !excluded_nodes.is_empty()
                    && (excluded_nodes.contains(&element.id())
                        || element
                            .ancestors()
                            .any(|node| excluded_nodes.contains(&node.id())));
                links.push(DiscoveredLink::Web {
                    url: resolved,
                    excluded_subtree,
                });
            }
            scheme => links.push(DiscoveredLink::NonWeb {
                href: raw.to_string(),
                scheme: scheme.to_string(),
            }),
        }
    }

    links
}

/// Resolve the document base: an absolute-resolvable `<base href>` if
/// present, the page URL otherwise.
fn document_base(document: &Html, page_url: &Url) -> Url {
    let base_selector = Selector::parse("base[href]").unwrap();
    document
        .select(&base_selector)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;

    fn no_rules() -> ExclusionRules {
        ExclusionRules::compile(&ScanConfig::default()).0
    }

    fn web_urls(links: &[DiscoveredLink]) -> Vec<String> {
        links
            .iter()
            .filter_map(|l| match l {
                DiscoveredLink::Web { url, .. } => Some(url.to_string()),
                DiscoveredLink::NonWeb { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_resolves_relative_and_absolute() {
        let html = r#"
            <a href="/docs">Docs</a>
            <a href="../about">About</a>
            <a href="https://other.test/x">Other</a>
        "#;
        let page = Url::parse("https://example.test/section/page").unwrap();
        let links = extract_links(html, &page, &no_rules());
        assert_eq!(
            web_urls(&links),
            vec![
                "https://example.test/docs",
                "https://example.test/about",
                "https://other.test/x",
            ]
        );
    }

    #[test]
    fn test_protocol_relative_and_fragment_only() {
        let html = r##"
            <a href="//cdn.test/lib.js">CDN</a>
            <a href="#section">Jump</a>
        "##;
        let page = Url::parse("https://example.test/page").unwrap();
        let links = extract_links(html, &page, &no_rules());
        assert_eq!(
            web_urls(&links),
            vec!["https://cdn.test/lib.js", "https://example.test/page#section"]
        );
    }

    #[test]
    fn test_base_href_wins_over_page_url() {
        let html = r#"
            <head><base href="https://example.test/deep/"></head>
            <body><a href="child">Child</a></body>
        "#;
        let page = Url::parse("https://example.test/elsewhere").unwrap();
        let links = extract_links(html, &page, &no_rules());
        assert_eq!(web_urls(&links), vec!["https://example.test/deep/child"]);
    }

    #[test]
    fn test_non_web_schemes_classified_not_dropped() {
        let html = r#"
            <a href="mailto:team@example.test">Mail</a>
            <a href="tel:+15551234">Call</a>
            <a href="javascript:void(0)">JS</a>
        "#;
        let page = Url::parse("https://example.test/").unwrap();
        let links = extract_links(html, &page, &no_rules());
        let schemes: Vec<_> = links
            .iter()
            .filter_map(|l| match l {
                DiscoveredLink::NonWeb { scheme, .. } => Some(scheme.as_str()),
                DiscoveredLink::Web { .. } => None,
            })
            .collect();
        assert_eq!(schemes, vec!["mailto", "tel", "javascript"]);
    }

    #[test]
    fn test_src_bearing_elements() {
        let html = r#"
            <img src="/logo.png">
            <script src="https://cdn.test/app.js"></script>
            <iframe src="/embed"></iframe>
        "#;
        let page = Url::parse("https://example.test/").unwrap();
        let links = extract_links(html, &page, &no_rules());
        assert_eq!(
            web_urls(&links),
            vec![
                "https://example.test/logo.png",
                "https://cdn.test/app.js",
                "https://example.test/embed",
            ]
        );
    }

    #[test]
    fn test_excluded_subtree_flagged() {
        let config = ScanConfig {
            css_selectors: vec![".footer".into()],
            ..Default::default()
        };
        let (rules, _) = ExclusionRules::compile(&config);
        let html = r#"
            <div class="content"><a href="/visible">Visible</a></div>
            <div class="footer"><a href="/legal">Legal</a></div>
        "#;
        let page = Url::parse("https://example.test/").unwrap();
        let links = extract_links(html, &page, &rules);

        let flags: Vec<_> = links
            .iter()
            .filter_map(|l| match l {
                DiscoveredLink::Web {
                    url,
                    excluded_subtree,
                } => Some((url.path().to_string(), *excluded_subtree)),
                DiscoveredLink::NonWeb { .. } => None,
            })
            .collect();
        assert_eq!(
            flags,
            vec![("/visible".to_string(), false), ("/legal".to_string(), true)]
        );
    }

    #[test]
    fn test_anchor_itself_matching_selector_is_excluded() {
        let config = ScanConfig {
            css_selectors: vec!["a.skip-me".into()],
            ..Default::default()
        };
        let (rules, _) = ExclusionRules::compile(&config);
        let html = r#"<a class="skip-me" href="/hidden">Hidden</a>"#;
        let page = Url::parse("https://example.test/").unwrap();
        let links = extract_links(html, &page, &rules);
        assert_eq!(
            links,
            vec![DiscoveredLink::Web {
                url: Url::parse("https://example.test/hidden").unwrap(),
                excluded_subtree: true,
            }]
        );
    }

    #[test]
    fn test_malformed_html_degrades_gracefully() {
        let html = "<div><a href='/ok'>unclosed <p><a href=\"/also-ok\"";
        let page = Url::parse("https://example.test/").unwrap();
        let links = extract_links(html, &page, &no_rules());
        assert_eq!(
            web_urls(&links),
            vec!["https://example.test/ok", "https://example.test/also-ok"]
        );
    }

    #[test]
    fn test_empty_and_unparsable_hrefs_skipped() {
        let html = r#"<a href="">empty</a><a href="   ">blank</a>"#;
        let page = Url::parse("https://example.test/").unwrap();
        assert!(extract_links(html, &page, &no_rules()).is_empty());
    }
}
