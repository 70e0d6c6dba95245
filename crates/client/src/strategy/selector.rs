//! Rule table mapping requests to strategies.
//!
//! Rules are evaluated top-down and the first match wins:
//!
//! | # | Predicate                                   | Strategy               |
//! |---|---------------------------------------------|------------------------|
//! | 1 | URL matches an API pattern                  | network-first          |
//! | 2 | URL matches an external allow-list pattern  | cache-first            |
//! | 3 | same origin, document                       | stale-while-revalidate |
//! | 4 | same origin, style / script / image         | cache-first            |
//! | - | otherwise                                   | network-first          |

use cachewarden_core::{AppConfig, Error};
use regex::Regex;
use url::Url;

use super::Strategy;
use crate::request::{Destination, RequestDescriptor};

/// Condition under which a rule applies.
#[derive(Debug, Clone)]
pub enum RulePredicate {
    /// Any of the patterns matches the full URL string.
    UrlMatches(Vec<Regex>),
    /// Same origin as the application and one of the listed destinations.
    SameOrigin(Vec<Destination>),
}

impl RulePredicate {
    fn matches(&self, request: &RequestDescriptor, origin: &Url) -> bool {
        match self {
            RulePredicate::UrlMatches(patterns) => patterns.iter().any(|p| p.is_match(request.url.as_str())),
            RulePredicate::SameOrigin(destinations) => {
                request.is_same_origin(origin) && destinations.contains(&request.destination)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub predicate: RulePredicate,
    pub strategy: Strategy,
}

/// Picks a strategy for each request. Pure and total.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    origin: Url,
    rules: Vec<Rule>,
    fallback: Strategy,
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, Error> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| Error::InvalidInput(format!("invalid pattern {p}: {e}"))))
        .collect()
}

impl StrategySelector {
    /// Build the standard rule table.
    pub fn new(origin: Url, api_patterns: &[String], external_patterns: &[String]) -> Result<Self, Error> {
        let rules = vec![
            Rule { predicate: RulePredicate::UrlMatches(compile(api_patterns)?), strategy: Strategy::NetworkFirst },
            Rule { predicate: RulePredicate::UrlMatches(compile(external_patterns)?), strategy: Strategy::CacheFirst },
            Rule {
                predicate: RulePredicate::SameOrigin(vec![Destination::Document]),
                strategy: Strategy::StaleWhileRevalidate,
            },
            Rule {
                predicate: RulePredicate::SameOrigin(vec![Destination::Style, Destination::Script, Destination::Image]),
                strategy: Strategy::CacheFirst,
            },
        ];
        Ok(Self::with_rules(origin, rules, Strategy::NetworkFirst))
    }

    /// Build a selector from an arbitrary rule table.
    pub fn with_rules(origin: Url, rules: Vec<Rule>, fallback: Strategy) -> Self {
        Self { origin, rules, fallback }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        Self::new(origin, &config.api_patterns, &config.external_patterns)
    }

    pub fn select(&self, request: &RequestDescriptor) -> Strategy {
        self.rules
            .iter()
            .find(|rule| rule.predicate.matches(request, &self.origin))
            .map(|rule| rule.strategy)
            .unwrap_or(self.fallback)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> StrategySelector {
        StrategySelector::from_config(&AppConfig::default()).unwrap()
    }

    fn req(url: &str, destination: Destination) -> RequestDescriptor {
        let origin = Url::parse("http://localhost:8080").unwrap();
        RequestDescriptor::get(url, &origin, destination).unwrap()
    }

    const ALL_DESTINATIONS: [Destination; 5] =
        [Destination::Document, Destination::Style, Destination::Script, Destination::Image, Destination::Other];

    #[test]
    fn test_api_urls_always_network_first() {
        let selector = selector();
        let urls = [
            "https://api.WestVirginiaDoc.com/data",
            "https://api.westvirginiadoc.com/v2/items?page=3",
            "/api/records",
            "http://localhost:8080/api/",
            "https://fonts.googleapis.com/api/css",
            "https://unpkg.com/api/lib.js",
        ];
        for url in urls {
            for destination in ALL_DESTINATIONS {
                assert_eq!(selector.select(&req(url, destination)), Strategy::NetworkFirst, "{url} {destination}");
            }
        }
    }

    #[test]
    fn test_path_patterns_are_case_sensitive() {
        let selector = selector();
        assert_eq!(selector.select(&req("/API/app.js", Destination::Script)), Strategy::CacheFirst);
        assert_eq!(selector.select(&req("/api/app.js", Destination::Script)), Strategy::NetworkFirst);
    }

    #[test]
    fn test_external_assets_cache_first() {
        let selector = selector();
        for url in [
            "https://fonts.googleapis.com/css2?family=Inter",
            "https://fonts.gstatic.com/s/inter.woff2",
            "https://cdn.jsdelivr.net/npm/chart.js",
            "https://unpkg.com/react@18/umd/react.js",
        ] {
            assert_eq!(selector.select(&req(url, Destination::Other)), Strategy::CacheFirst, "{url}");
        }
    }

    #[test]
    fn test_same_origin_documents_stale_while_revalidate() {
        let selector = selector();
        assert_eq!(selector.select(&req("/index.html", Destination::Document)), Strategy::StaleWhileRevalidate);
        assert_eq!(selector.select(&req("/", Destination::Document)), Strategy::StaleWhileRevalidate);
    }

    #[test]
    fn test_same_origin_static_assets_cache_first() {
        let selector = selector();
        assert_eq!(selector.select(&req("/app.css", Destination::Style)), Strategy::CacheFirst);
        assert_eq!(selector.select(&req("/app.js", Destination::Script)), Strategy::CacheFirst);
        assert_eq!(selector.select(&req("/logo.png", Destination::Image)), Strategy::CacheFirst);
    }

    #[test]
    fn test_default_network_first() {
        let selector = selector();
        assert_eq!(selector.select(&req("/manifest.json", Destination::Other)), Strategy::NetworkFirst);
        assert_eq!(
            selector.select(&req("https://elsewhere.example/page", Destination::Document)),
            Strategy::NetworkFirst
        );
        assert_eq!(
            selector.select(&req("https://elsewhere.example/app.js", Destination::Script)),
            Strategy::NetworkFirst
        );
    }

    #[test]
    fn test_other_port_is_cross_origin() {
        let selector = selector();
        assert_eq!(
            selector.select(&req("http://localhost:9090/index.html", Destination::Document)),
            Strategy::NetworkFirst
        );
    }

    #[test]
    fn test_custom_rule_table() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let rules = vec![Rule {
            predicate: RulePredicate::UrlMatches(vec![Regex::new(r"\.json$").unwrap()]),
            strategy: Strategy::CacheOnly,
        }];
        let selector = StrategySelector::with_rules(origin, rules, Strategy::NetworkOnly);

        assert_eq!(selector.select(&req("/manifest.json", Destination::Other)), Strategy::CacheOnly);
        assert_eq!(selector.select(&req("/index.html", Destination::Document)), Strategy::NetworkOnly);
        assert_eq!(selector.rules().len(), 1);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let origin = Url::parse("http://localhost:8080").unwrap();
        let result = StrategySelector::new(origin, &["[".to_string()], &[]);
        assert!(result.is_err());
    }
}
