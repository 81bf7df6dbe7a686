//! Value Objects - Immutable domain primitives
//!
//! Value objects are identified by their value rather than identity.
//! They are immutable and can be freely shared.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Algorithm used to pick one endpoint among the healthy candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingStrategy {
    /// Rotate through candidates in registration order
    #[serde(alias = "round-robin", alias = "roundrobin")]
    RoundRobin,
    /// Random draw proportional to endpoint weight
    Weighted,
    /// Fewest in-flight forwarded requests
    #[serde(alias = "least-connections")]
    LeastConnections,
    /// Lowest mean response time over the recent samples
    #[serde(alias = "performance-based", alias = "performance")]
    PerformanceBased,
}

impl BalancingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Weighted => "weighted",
            Self::LeastConnections => "least_connections",
            Self::PerformanceBased => "performance_based",
        }
    }
}

impl Default for BalancingStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

impl fmt::Display for BalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request path glob, compiled once when the rule is installed.
///
/// `*` matches any run of characters (including `/`), `?` matches exactly one
/// character. Everything else is matched literally and the whole path must match.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    regex: Regex,
}

impl PathPattern {
    /// Compile a glob into an anchored regular expression.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let mut expr = String::with_capacity(pattern.len() + 8);
        expr.push('^');
        let mut literal = String::new();
        for c in pattern.chars() {
            match c {
                '*' | '?' => {
                    expr.push_str(&regex::escape(&literal));
                    literal.clear();
                    expr.push_str(if c == '*' { ".*" } else { "." });
                }
                _ => literal.push(c),
            }
        }
        expr.push_str(&regex::escape(&literal));
        expr.push('$');

        Ok(Self {
            raw: pattern.to_string(),
            regex: Regex::new(&expr)?,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for PathPattern {}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for PathPattern {
    type Error = regex::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<PathPattern> for String {
    fn from(pattern: PathPattern) -> Self {
        pattern.raw
    }
}

impl Serialize for PathPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for PathPattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(&raw).map_err(serde::de::Error::custom)
    }
}

/// Key of a cached response: `(method, path, hash of the query parameters)`.
///
/// Query parameters are sorted before hashing so `?a=1&b=2` and `?b=2&a=1`
/// share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: String,
    pub path: String,
    pub query_hash: u64,
}

impl CacheKey {
    pub fn new(method: &str, path: &str, query: &[(String, String)]) -> Self {
        let mut pairs: Vec<&(String, String)> = query.iter().collect();
        pairs.sort();

        let mut hasher = DefaultHasher::new();
        pairs.hash(&mut hasher);

        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query_hash: hasher.finish(),
        }
    }
}
