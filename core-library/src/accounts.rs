//! Account selection by name pattern
//!
//! Patterns are comma-separated and accept SQL LIKE (`%`, `_`) as well as glob
//! (`*`, `?`) wildcards. Matching is case-sensitive. A bare `%` or `*` selects
//! every account.

use crate::error::{LibraryError, Result};
use crate::models::Account;
use regex::Regex;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct AccountFilter {
    match_all: bool,
    patterns: Vec<Regex>,
}

impl AccountFilter {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() || parts.iter().any(|p| *p == "%" || *p == "*") {
            return Ok(Self {
                match_all: true,
                patterns: Vec::new(),
            });
        }

        let patterns = parts
            .iter()
            .map(|p| {
                Regex::new(&wildcard_to_regex(p)).map_err(|e| LibraryError::InvalidInput {
                    field: "account_patterns".to_string(),
                    message: format!("{}: {}", p, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            match_all: false,
            patterns,
        })
    }

    pub fn matches_all(&self) -> bool {
        self.match_all
    }

    pub fn matches(&self, name: &str) -> bool {
        self.match_all || self.patterns.iter().any(|re| re.is_match(name))
    }

    /// Accounts whose names match, in their original order
    pub fn select(&self, accounts: Vec<Account>) -> Vec<Account> {
        let total = accounts.len();
        let selected: Vec<Account> = accounts
            .into_iter()
            .filter(|a| self.matches(&a.name))
            .collect();
        debug!(total, selected = selected.len(), "Filtered accounts by pattern");
        selected
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' | '*' => out.push_str(".*"),
            '_' | '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> Account {
        Account {
            id: 1,
            name: name.to_string(),
            server_url: None,
            username: None,
            password: None,
            account_type: None,
        }
    }

    #[test]
    fn test_percent_matches_everything() {
        let filter = AccountFilter::parse("Demo, %").unwrap();
        assert!(filter.matches_all());
        assert!(filter.matches("anything"));

        assert!(AccountFilter::parse("").unwrap().matches_all());
        assert!(AccountFilter::parse("*").unwrap().matches_all());
    }

    #[test]
    fn test_like_and_glob_wildcards() {
        let filter = AccountFilter::parse("Strong%, Demo_?, *Plus").unwrap();
        assert!(filter.matches("Strong 8K"));
        assert!(filter.matches("Demo12"));
        assert!(filter.matches("Ultra Plus"));
        assert!(!filter.matches("Demo1"));
        assert!(!filter.matches("strong 8k"));
    }

    #[test]
    fn test_exact_name_and_regex_metacharacters() {
        let filter = AccountFilter::parse("Provider (EU).tv").unwrap();
        assert!(filter.matches("Provider (EU).tv"));
        assert!(!filter.matches("Provider (EU)xtv"));
    }

    #[test]
    fn test_select_keeps_order() {
        let filter = AccountFilter::parse("B%,A%").unwrap();
        let selected = filter.select(vec![account("Alpha"), account("Core"), account("Beta")]);
        let names: Vec<_> = selected.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
    }
}
