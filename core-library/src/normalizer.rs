//! # Title Normalizer
//!
//! Maps raw provider titles such as `"Inception [EN] 1080p (2010)"` to a clean,
//! filesystem-safe [`NormalizedName`] (`Inception`, `2010`).
//!
//! Normalization is total and idempotent:
//! - Unicode is brought to NFKC form
//! - path-illegal and control characters are replaced first
//! - configured junk tokens are removed, bracketed or bare
//! - bracketed four-digit years are removed, the last one becomes the year
//! - leftovers (empty brackets, dangling separators, trailing dots) are
//!   stripped until nothing changes
//!
//! A title that cleans down to nothing is passed through with only the unsafe
//! character substitution applied.

use crate::error::{LibraryError, Result};
use crate::models::NormalizedName;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Characters that cannot appear in a path component on common filesystems
pub const UNSAFE_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

const MAX_PASSES: usize = 8;

static BRACKETED_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\[(]\s*((?:18|19|20)\d{2})\s*[\])]").expect("valid regex"));

static EMPTY_BRACKETS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\s*\)|\[\s*\]|\{\s*\}").expect("valid regex"));

static LEADING_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\s\-_.,;~]+").expect("valid regex"));

static TRAILING_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\-_.,;~]+$").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Replace path-illegal and control characters, then collapse whitespace
pub fn sanitize_component(name: &str, substitute: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if UNSAFE_CHARS.contains(&c) || c.is_control() {
            out.push_str(substitute);
        } else {
            out.push(c);
        }
    }
    WHITESPACE.replace_all(out.trim(), " ").into_owned()
}

/// Shorten an over-long component, keeping its head and its last 7 characters
///
/// `limit` counts characters, not bytes.
pub fn shorten_component(name: &str, limit: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= limit || limit <= 10 {
        return name.to_string();
    }
    let head: String = chars[..limit - 10].iter().collect();
    let tail: String = chars[chars.len() - 7..].iter().collect();
    format!("{}...{}", head.trim_end(), tail)
}

/// Directory name used for an account inside the path templates
pub fn account_dir_name(account_name: &str) -> String {
    sanitize_component(account_name, "")
}

/// Compiled normalizer for one run
#[derive(Debug, Clone)]
pub struct TitleNormalizer {
    bracketed_junk: Regex,
    bare_junk: Regex,
    substitute: String,
}

impl TitleNormalizer {
    /// Build a normalizer from the configured junk token list
    ///
    /// Bracketed tokens match case-insensitively. Bare tokens match exactly as
    /// listed so ordinary words are not eaten, except resolution tags like
    /// `1080p` which match in any case.
    pub fn new<S: AsRef<str>>(junk_tokens: &[S], substitute: &str) -> Result<Self> {
        let mut tokens: Vec<String> = junk_tokens
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty())
            .map(regex::escape)
            .collect();
        // Longest first so MULTI-AUDIO wins over MULTI
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        tokens.dedup();

        let alternatives = if tokens.is_empty() {
            r"\d{3,4}p".to_string()
        } else {
            format!(r"{}|\d{{3,4}}p", tokens.join("|"))
        };

        let bracketed_junk = Regex::new(&format!(r"(?i)[\[(]\s*(?:{})\s*[\])]", alternatives))
            .map_err(|e| LibraryError::InvalidInput {
                field: "junk_tokens".to_string(),
                message: e.to_string(),
            })?;

        let bare = if tokens.is_empty() {
            r"(?i:\d{3,4}p)".to_string()
        } else {
            format!(r"{}|(?i:\d{{3,4}}p)", tokens.join("|"))
        };
        let bare_junk = Regex::new(&format!(r"(?:^|\s)(?:{})(?:\s|$)", bare)).map_err(|e| {
            LibraryError::InvalidInput {
                field: "junk_tokens".to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            bracketed_junk,
            bare_junk,
            substitute: substitute.to_string(),
        })
    }

    /// Normalize a raw provider title
    pub fn normalize(&self, raw: &str) -> NormalizedName {
        let nfkc: String = raw.nfkc().collect();
        let sanitized = sanitize_component(&nfkc, &self.substitute);

        let mut title = sanitized.clone();
        let mut year = None;

        for _ in 0..MAX_PASSES {
            let before = title.clone();

            title = self.bracketed_junk.replace_all(&title, " ").into_owned();
            title = self.bare_junk.replace_all(&title, " ").into_owned();

            if let Some(found) = BRACKETED_YEAR
                .captures_iter(&title)
                .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<i32>().ok()))
                .last()
            {
                year = Some(found);
                title = BRACKETED_YEAR.replace_all(&title, " ").into_owned();
            }

            title = EMPTY_BRACKETS.replace_all(&title, " ").into_owned();
            title = WHITESPACE.replace_all(&title, " ").into_owned();
            title = LEADING_SEPARATORS.replace(&title, "").into_owned();
            title = TRAILING_SEPARATORS.replace(&title, "").into_owned();

            if title == before {
                break;
            }
        }

        if title.is_empty() {
            let fallback = TRAILING_SEPARATORS.replace(&sanitized, "").into_owned();
            return NormalizedName {
                title: fallback,
                year: None,
            };
        }

        NormalizedName { title, year }
    }

    /// Sanitize a component with this normalizer's substitute
    pub fn sanitize(&self, name: &str) -> String {
        sanitize_component(name, &self.substitute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::config::DEFAULT_JUNK_TOKENS;

    fn normalizer() -> TitleNormalizer {
        TitleNormalizer::new(DEFAULT_JUNK_TOKENS, "").unwrap()
    }

    fn name(title: &str, year: Option<i32>) -> NormalizedName {
        NormalizedName {
            title: title.to_string(),
            year,
        }
    }

    #[test]
    fn test_strips_junk_and_extracts_year() {
        let n = normalizer();
        assert_eq!(
            n.normalize("Inception [EN] 1080p (2010)"),
            name("Inception", Some(2010))
        );
        assert_eq!(
            n.normalize("The Matrix (1999) [4K] [MULTI-AUDIO]"),
            name("The Matrix", Some(1999))
        );
        assert_eq!(n.normalize("Dune - 2160p"), name("Dune", None));
        assert_eq!(n.normalize("Alien (HD) (1979)"), name("Alien", Some(1979)));
    }

    #[test]
    fn test_bare_words_are_case_sensitive() {
        let n = normalizer();
        // "En" and "Sub" are ordinary words here
        assert_eq!(n.normalize("En Attendant Bojangles"), name("En Attendant Bojangles", None));
        assert_eq!(n.normalize("Sub Zero"), name("Sub Zero", None));
        assert_eq!(n.normalize("Sub Zero SUB"), name("Sub Zero", None));
    }

    #[test]
    fn test_bare_year_is_part_of_title() {
        let n = normalizer();
        assert_eq!(n.normalize("Blade Runner 2049"), name("Blade Runner 2049", None));
        assert_eq!(n.normalize("1917 (2019)"), name("1917", Some(2019)));
    }

    #[test]
    fn test_unsafe_characters_removed() {
        let n = normalizer();
        assert_eq!(
            n.normalize("Mission: Impossible / Fallout (2018)"),
            name("Mission Impossible Fallout", Some(2018))
        );
        assert_eq!(n.normalize("What If...?"), name("What If", None));
    }

    #[test]
    fn test_unsafe_characters_substituted() {
        let n = TitleNormalizer::new(DEFAULT_JUNK_TOKENS, "_").unwrap();
        assert_eq!(n.normalize("AC/DC: Live"), name("AC_DC_ Live", None));
    }

    #[test]
    fn test_unicode_nfkc() {
        let n = normalizer();
        // Full-width letters and the "fi" ligature fold to ASCII
        assert_eq!(n.normalize("Ｍｏｖｉｅ ﬁve"), name("Movie five", None));
    }

    #[test]
    fn test_unparseable_title_passes_through() {
        let n = normalizer();
        assert_eq!(n.normalize("[1080p]"), name("[1080p]", None));
        assert_eq!(n.normalize("(2010)"), name("(2010)", None));
        assert_eq!(n.normalize(""), name("", None));
        assert_eq!(n.normalize("???"), name("", None));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let n = normalizer();
        let samples = [
            "Inception [EN] 1080p (2010)",
            "  Amélie   (2001)  [FR] ",
            "Se7en (1995) (1995)",
            "Star Wars: Episode IV - A New Hope (1977) - 720p",
            "Dune - 2160p",
            "[1080p]",
            "Ｍｏｖｉｅ (HD)",
            "Spider-Man (2002) [] ()",
        ];

        for raw in samples {
            let first = n.normalize(raw);
            let second = n.normalize(&first.title);
            assert_eq!(second.title, first.title, "title unstable for {:?}", raw);
            assert_eq!(n.normalize(&first.display()), first, "display unstable for {:?}", raw);
        }
    }

    #[test]
    fn test_shorten_component() {
        let long = "A".repeat(50) + "tail123";
        let short = shorten_component(&long, 20);
        assert_eq!(short, format!("{}...tail123", "A".repeat(10)));
        assert_eq!(short.chars().count(), 20);

        assert_eq!(shorten_component("Short", 20), "Short");
    }

    #[test]
    fn test_shorten_counts_characters() {
        let long = "é".repeat(40);
        let short = shorten_component(&long, 20);
        assert_eq!(short.chars().count(), 20);
    }

    #[test]
    fn test_account_dir_name() {
        assert_eq!(account_dir_name(" Strong 8K: EU "), "Strong 8K EU");
    }
}
