//! Strategy assignment by URL pattern.
//!
//! The routing table is an ordered list of `(regex, strategy)` pairs. The
//! first pattern that matches a request URL decides the strategy; URLs that
//! match nothing fall back to [`Strategy::NetworkFirst`].

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// How a request is sourced and whether its response is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Serve from cache; fetch and persist on miss.
    CacheFirst,
    /// Fetch and persist; fall back to cache when the network fails.
    NetworkFirst,
    /// Serve from cache and refresh in the background.
    StaleWhileRevalidate,
    /// Serve from cache or fail.
    CacheOnly,
    /// Always fetch, never touch the cache.
    NetworkOnly,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::CacheFirst,
        Strategy::NetworkFirst,
        Strategy::StaleWhileRevalidate,
        Strategy::CacheOnly,
        Strategy::NetworkOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::CacheFirst => "cache-first",
            Strategy::NetworkFirst => "network-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
            Strategy::CacheOnly => "cache-only",
            Strategy::NetworkOnly => "network-only",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| Error::InvalidRoute(format!("unknown strategy: {s}")))
    }
}

/// One configured routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RouteRule {
    /// Regular expression tested against the full request URL.
    pub pattern: String,
    /// Strategy used when the pattern matches.
    pub strategy: Strategy,
}

impl RouteRule {
    fn new(pattern: &str, strategy: Strategy) -> Self {
        Self { pattern: pattern.to_string(), strategy }
    }
}

/// Built-in routing table for the PocketGNU site.
pub fn default_rules() -> Vec<RouteRule> {
    vec![
        RouteRule::new(r"(?i)\.(png|jpe?g|gif|svg|webp|ico|avif|bmp)(\?.*)?$", Strategy::CacheFirst),
        RouteRule::new(r"(?i)\.(woff2?|ttf|otf|eot)(\?.*)?$", Strategy::CacheFirst),
        RouteRule::new(r"(?i)\.(m?js|css)(\?.*)?$", Strategy::StaleWhileRevalidate),
        RouteRule::new(r"/api/", Strategy::NetworkFirst),
        RouteRule::new(r"/(analytics|collect|track)(/|\?|$)", Strategy::NetworkOnly),
        RouteRule::new(r"/offline\.html(\?.*)?$", Strategy::CacheOnly),
    ]
}

/// Compiled, ordered routing table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(Regex, Strategy)>,
}

impl RouteTable {
    /// Compile every rule, preserving order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoute` naming the first pattern that fails to compile.
    pub fn compile(rules: &[RouteRule]) -> Result<Self, Error> {
        let routes = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.strategy))
                    .map_err(|e| Error::InvalidRoute(format!("{}: {e}", rule.pattern)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { routes })
    }

    /// Strategy of the first matching pattern, else network-first.
    pub fn classify(&self, url: &str) -> Strategy {
        self.routes
            .iter()
            .find(|(re, _)| re.is_match(url))
            .map(|(_, strategy)| *strategy)
            .unwrap_or(Strategy::NetworkFirst)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
