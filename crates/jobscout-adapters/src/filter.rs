//! Relevance and geography filters shared by every adapter.

use jobscout_core::{JobDraft, UNKNOWN_LOCATION};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_TECH_KEYWORDS: &[&str] = &[
    "software",
    "engineer",
    "developer",
    "backend",
    "frontend",
    "full stack",
    "fullstack",
    "data",
    "scientist",
    "analyst",
    "machine learning",
    "ml",
    "ai",
    "artificial intelligence",
    "devops",
    "sre",
    "site reliability",
    "platform",
    "infrastructure",
    "cloud",
    "systems",
    "security",
    "architect",
    "technical",
];

const DEFAULT_US_TOKENS: &[&str] = &[
    "united states",
    "usa",
    "us",
    "u.s.",
    "remote",
    "anywhere",
    "california",
    "texas",
    "new york",
    "florida",
    "washington",
    "massachusetts",
    "illinois",
    "georgia",
    "virginia",
    "pennsylvania",
    "colorado",
    "oregon",
    "north carolina",
    "arizona",
    "san francisco",
    "seattle",
    "austin",
    "boston",
    "nyc",
    "los angeles",
    "chicago",
    "atlanta",
    "denver",
    "portland",
    "san jose",
    "palo alto",
    "mountain view",
    "sunnyvale",
    "santa clara",
    "redmond",
];

const DEFAULT_NON_US_TOKENS: &[&str] = &[
    "india",
    "china",
    "singapore",
    "london",
    "uk",
    "canada",
    "germany",
    "france",
    "japan",
    "australia",
    "israel",
    "europe",
    "asia",
    "bangalore",
    "hyderabad",
    "toronto",
    "dublin",
    "berlin",
];

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("parsing filter rules: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("filter rules list {0} is empty")]
    EmptyList(&'static str),
}

#[derive(Debug, Deserialize)]
struct FilterRulesFile {
    version: u32,
    tech_keywords: Vec<String>,
    us_tokens: Vec<String>,
    non_us_tokens: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterVerdict {
    Keep,
    NotTechnical,
    OutsideUs,
}

/// Versioned keyword lists driving the two candidate filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterPolicy {
    pub version: u32,
    tech_keywords: Vec<String>,
    us_tokens: Vec<String>,
    non_us_tokens: Vec<String>,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self::new(
            0,
            DEFAULT_TECH_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_US_TOKENS.iter().map(|s| s.to_string()).collect(),
            DEFAULT_NON_US_TOKENS.iter().map(|s| s.to_string()).collect(),
        )
    }
}

fn normalize(list: Vec<String>) -> Vec<String> {
    list.into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl FilterPolicy {
    pub fn new(
        version: u32,
        tech_keywords: Vec<String>,
        us_tokens: Vec<String>,
        non_us_tokens: Vec<String>,
    ) -> Self {
        Self {
            version,
            tech_keywords: normalize(tech_keywords),
            us_tokens: normalize(us_tokens),
            non_us_tokens: normalize(non_us_tokens),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, RulesError> {
        let file: FilterRulesFile = serde_yaml::from_str(text)?;
        let policy = Self::new(
            file.version,
            file.tech_keywords,
            file.us_tokens,
            file.non_us_tokens,
        );
        if policy.tech_keywords.is_empty() {
            return Err(RulesError::EmptyList("tech_keywords"));
        }
        if policy.us_tokens.is_empty() {
            return Err(RulesError::EmptyList("us_tokens"));
        }
        Ok(policy)
    }

    pub fn tech_keywords(&self) -> &[String] {
        &self.tech_keywords
    }

    /// Case-insensitive substring match against the keyword list.
    pub fn is_relevant(&self, text: &str) -> bool {
        let haystack = text.to_lowercase();
        self.tech_keywords
            .iter()
            .any(|kw| haystack.contains(kw.as_str()))
    }

    pub fn is_us_location(&self, location: &str) -> bool {
        let location = location.trim().to_lowercase();
        if location.is_empty() || location == UNKNOWN_LOCATION.to_lowercase() {
            return true;
        }
        if self.us_tokens.iter().any(|t| contains_token(&location, t)) {
            return true;
        }
        !self
            .non_us_tokens
            .iter()
            .any(|t| contains_token(&location, t))
    }

    pub fn evaluate(&self, draft: &JobDraft) -> FilterVerdict {
        if !self.is_relevant(&draft.relevance_text()) {
            FilterVerdict::NotTechnical
        } else if !self.is_us_location(&draft.location) {
            FilterVerdict::OutsideUs
        } else {
            FilterVerdict::Keep
        }
    }
}

/// Match `token` in `haystack` only where it is not glued to other alphanumerics.
pub fn contains_token(haystack: &str, token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(token) {
        let begin = start + pos;
        let end = begin + token.len();
        let before_ok = haystack[..begin]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        start = begin
            + haystack[begin..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    false
}
