// Copyright 2026 Stateflow Contributors
// SPDX-License-Identifier: Apache-2.0

//! DOM canonicalization before state comparison.
//!
//! Two renderings are the same state when their stripped DOMs are equal,
//! so everything volatile (comments, scripts, timestamps, counters) has to
//! go before comparison.

use anyhow::{Context, Result};
use regex::Regex;

/// Turns a raw DOM into the text used for state equality.
pub trait DomStripper: Send + Sync {
    fn strip(&self, dom: &str) -> String;
}

/// Regex-based stripper. Removes comments, scripts, and styles, drops every
/// configured pattern, then collapses whitespace.
pub struct RegexStripper {
    builtin: Vec<Regex>,
    custom: Vec<Regex>,
    whitespace: Regex,
    between_tags: Regex,
}

impl RegexStripper {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let builtin = [
            r"(?s)<!--.*?-->",
            r"(?is)<script\b[^>]*>.*?</script>",
            r"(?is)<style\b[^>]*>.*?</style>",
            r"(?is)<noscript\b[^>]*>.*?</noscript>",
        ]
        .iter()
        .map(|p| Regex::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("invalid built-in strip pattern")?;

        let custom = patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid strip pattern: {p}")))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            builtin,
            custom,
            whitespace: Regex::new(r"\s+").context("invalid whitespace pattern")?,
            between_tags: Regex::new(r">\s+<").context("invalid tag pattern")?,
        })
    }
}

impl DomStripper for RegexStripper {
    fn strip(&self, dom: &str) -> String {
        let mut out = dom.to_string();
        for re in self.builtin.iter().chain(self.custom.iter()) {
            out = re.replace_all(&out, "").into_owned();
        }
        let out = self.between_tags.replace_all(&out, "><");
        self.whitespace.replace_all(&out, " ").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_comments_and_scripts() {
        let s = RegexStripper::new(&[]).unwrap();
        let dom = "<html><!-- build 42 --><head><script>var t = Date.now();</script></head>\n  <body> <p>hi</p> </body></html>";
        assert_eq!(s.strip(dom), "<html><head></head><body><p>hi</p></body></html>");
    }

    #[test]
    fn test_custom_patterns_make_renderings_equal() {
        let s = RegexStripper::new(&[r#"<span class="clock">[^<]*</span>"#.to_string()]).unwrap();
        let a = r#"<body><span class="clock">10:01</span><p>x</p></body>"#;
        let b = r#"<body><span class="clock">10:02</span><p>x</p></body>"#;
        assert_eq!(s.strip(a), s.strip(b));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let err = RegexStripper::new(&["(unclosed".to_string()]).err().unwrap();
        assert!(format!("{err:#}").contains("invalid strip pattern"));
    }
}
