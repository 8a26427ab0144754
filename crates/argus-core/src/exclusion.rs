use std::collections::HashSet;

use regex::Regex;
use scraper::Selector;
use url::Url;

use crate::config::ScanConfig;
use crate::link::normalize_url;

/// A pattern that failed to compile at job start.
///
/// Malformed patterns never abort a scan — they are reported once and then
/// treated as non-matching.
#[derive(Debug, Clone)]
pub struct PatternWarning {
    /// Rule family: "regex", "wildcard" or "css-selector".
    pub kind: &'static str,
    pub pattern: String,
    pub reason: String,
}

/// Exclusion rules compiled once per scan.
///
/// URL-based rules (literal, regex, wildcard) are evaluated against the
/// normalized absolute URL. CSS-selector containment is evaluated during
/// extraction, where the DOM is available.
#[derive(Debug, Clone)]
pub struct ExclusionRules {
    literals: HashSet<String>,
    regexes: Vec<Regex>,
    wildcards: Vec<Regex>,
    selectors: Vec<Selector>,
    force_exclude: bool,
}

impl ExclusionRules {
    /// Compile every pattern in `config`, collecting warnings for the ones
    /// that do not parse.
    pub fn compile(config: &ScanConfig) -> (Self, Vec<PatternWarning>) {
        let mut warnings = Vec::new();

        let literals = config
            .excluded_urls
            .iter()
            .map(|raw| match Url::parse(raw) {
                Ok(url) => normalize_url(&url),
                Err(_) => raw.clone(),
            })
            .collect();

        let mut regexes = Vec::new();
        for pattern in &config.regex_exclusions {
            match Regex::new(pattern) {
                Ok(re) => regexes.push(re),
                Err(e) => warnings.push(PatternWarning {
                    kind: "regex",
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        let mut wildcards = Vec::new();
        for pattern in &config.wildcard_exclusions {
            match Regex::new(&wildcard_to_regex(pattern)) {
                Ok(re) => wildcards.push(re),
                Err(e) => warnings.push(PatternWarning {
                    kind: "wildcard",
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        let mut selectors = Vec::new();
        for raw in &config.css_selectors {
            match Selector::parse(raw) {
                Ok(sel) => selectors.push(sel),
                Err(e) => warnings.push(PatternWarning {
                    kind: "css-selector",
                    pattern: raw.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        (
            Self {
                literals,
                regexes,
                wildcards,
                selectors,
                force_exclude: config.css_selectors_force_exclude,
            },
            warnings,
        )
    }

    /// URL-based exclusion: literal list, then regexes, then wildcards.
    ///
    /// The outcome is order-independent — any single match excludes.
    pub fn is_excluded(&self, url: &str) -> bool {
        if self.literals.contains(url) {
            return true;
        }
        if self.regexes.iter().any(|re| re.is_match(url)) {
            return true;
        }
        self.wildcards.iter().any(|re| re.is_match(url))
    }

    /// Compiled CSS selectors marking excluded subtrees.
    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn has_selectors(&self) -> bool {
        !self.selectors.is_empty()
    }

    /// Whether a CSS-subtree match blacklists the URL scan-wide.
    pub fn force_exclude(&self) -> bool {
        self.force_exclude
    }
}

/// Translate a glob-style pattern (`*` matches any run, `?` any single
/// character) into an anchored regex.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    regex.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            _ => regex.push_str(&regex::escape(&ch.to_string())),
        }
    }
    regex.push('$');
    regex
}
