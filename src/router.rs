//! Router Module
//!
//! Matches an intercepted request against an ordered list of route patterns
//! to select the strategy and its configuration. First match wins; requests
//! that match nothing get the default route.

use std::collections::{BTreeSet, HashMap};

use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::cache::{normalize_url, PartitionLimits, MAX_PARTITION_NAME_LEN, PRECACHE_PARTITION};
use crate::config::EngineDefaults;
use crate::error::{EngineError, Result};
use crate::models::Request;
use crate::strategy::{StrategyConfig, StrategyKind, StrategyOptions};

// == Route Table Types ==
/// URL pattern as written in the route table, e.g. `{"glob": "/api/*"}`.
///
/// Glob, prefix and exact patterns starting with `http://` or `https://`
/// are compared with the full normalized URL; otherwise with its path.
/// Regex patterns are searched for anywhere in the full URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlPattern {
    Glob(String),
    Prefix(String),
    Exact(String),
    Regex(String),
}

/// One entry of the route table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "match")]
    pub pattern: UrlPattern,
    /// Methods accepted by the route; empty accepts any
    #[serde(default)]
    pub methods: Vec<String>,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub options: StrategyOptions,
}

// == Route Matcher ==
#[derive(Debug, Clone)]
enum MatchKind {
    Any,
    Exact(String),
    Prefix(String),
    Regex(Regex),
}

/// Compiled method and URL predicate.
#[derive(Debug, Clone)]
pub struct RouteMatcher {
    methods: Vec<String>,
    full_url: bool,
    kind: MatchKind,
}

impl RouteMatcher {
    /// Accepts every request.
    pub fn any() -> Self {
        Self {
            methods: Vec::new(),
            full_url: false,
            kind: MatchKind::Any,
        }
    }

    pub fn compile(pattern: &UrlPattern, methods: &[String]) -> Result<Self> {
        let methods = methods.iter().map(|m| m.to_ascii_uppercase()).collect();

        let (full_url, kind) = match pattern {
            UrlPattern::Exact(value) => (is_absolute(value), MatchKind::Exact(value.clone())),
            UrlPattern::Prefix(value) => (is_absolute(value), MatchKind::Prefix(value.clone())),
            UrlPattern::Glob(value) => (is_absolute(value), MatchKind::Regex(glob_to_regex(value)?)),
            UrlPattern::Regex(value) => {
                let regex = Regex::new(value).map_err(|e| {
                    EngineError::Config(format!("invalid route regex '{}': {}", value, e))
                })?;
                (true, MatchKind::Regex(regex))
            }
        };

        Ok(Self {
            methods,
            full_url,
            kind,
        })
    }

    /// Returns true if the method and normalized URL satisfy the predicate.
    pub fn matches(&self, method: &str, url: &Url) -> bool {
        if !self.methods.is_empty() && !self.methods.iter().any(|m| m == method) {
            return false;
        }

        let target = if self.full_url { url.as_str() } else { url.path() };
        match &self.kind {
            MatchKind::Any => true,
            MatchKind::Exact(value) => target == value,
            MatchKind::Prefix(value) => target.starts_with(value.as_str()),
            MatchKind::Regex(regex) => regex.is_match(target),
        }
    }
}

fn is_absolute(pattern: &str) -> bool {
    pattern.starts_with("http://") || pattern.starts_with("https://")
}

/// Translates a glob into an anchored regex. `*` (or `**`) matches any run
/// of characters, including `/`; everything else is literal.
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut pattern = String::from("^");
    let mut previous_star = false;
    for c in glob.chars() {
        if c == '*' {
            if !previous_star {
                pattern.push_str(".*");
            }
            previous_star = true;
        } else {
            pattern.push_str(&regex::escape(&c.to_string()));
            previous_star = false;
        }
    }
    pattern.push('$');

    Regex::new(&pattern)
        .map_err(|e| EngineError::Config(format!("invalid route glob '{}': {}", glob, e)))
}

// == Route Pattern ==
/// A compiled route: predicate, strategy and resolved configuration.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    pub name: String,
    pub matcher: RouteMatcher,
    pub strategy: StrategyKind,
    pub config: StrategyConfig,
}

// == Router ==
/// Ordered route table. Immutable once built.
#[derive(Debug, Clone)]
pub struct Router {
    routes: Vec<RoutePattern>,
    fallback: RoutePattern,
}

impl Router {
    /// Compiles the route table and the default route.
    pub fn new(configs: &[RouteConfig], defaults: &EngineDefaults) -> Result<Self> {
        let mut routes = Vec::with_capacity(configs.len());
        for (index, route) in configs.iter().enumerate() {
            let name = route
                .name
                .clone()
                .unwrap_or_else(|| format!("route-{}", index));
            let config = StrategyConfig::resolve(route.strategy, &route.options, defaults);
            if route.strategy.uses_cache() && config.max_entries == 0 {
                return Err(EngineError::Config(format!(
                    "route '{}': maxEntries must be positive",
                    name
                )));
            }
            check_partition_name(&name, &config.cache_name)?;

            routes.push(RoutePattern {
                matcher: RouteMatcher::compile(&route.pattern, &route.methods)?,
                name,
                strategy: route.strategy,
                config,
            });
        }

        let fallback = RoutePattern {
            name: "default".to_string(),
            matcher: RouteMatcher::any(),
            strategy: defaults.strategy,
            config: StrategyConfig::resolve(defaults.strategy, &StrategyOptions::default(), defaults),
        };
        check_partition_name(&fallback.name, &fallback.config.cache_name)?;
        check_partition_name("precache", &defaults.partition_name(PRECACHE_PARTITION))?;

        Ok(Self { routes, fallback })
    }

    // == Match ==
    /// Returns the first route accepting the request, if any.
    ///
    /// A request whose URL cannot be parsed matches nothing.
    pub fn matches(&self, request: &Request) -> Option<&RoutePattern> {
        let url = normalize_url(&request.url).ok()?;
        self.routes
            .iter()
            .find(|route| route.matcher.matches(&request.method, &url))
    }

    /// Returns the matching route or the default route.
    pub fn resolve(&self, request: &Request) -> &RoutePattern {
        self.matches(request).unwrap_or(&self.fallback)
    }

    pub fn routes(&self) -> &[RoutePattern] {
        &self.routes
    }

    pub fn fallback(&self) -> &RoutePattern {
        &self.fallback
    }

    fn caching_routes(&self) -> impl Iterator<Item = &RoutePattern> {
        self.routes
            .iter()
            .chain(std::iter::once(&self.fallback))
            .filter(|route| route.strategy.uses_cache())
    }

    /// Names of every partition the table writes to or reads from.
    pub fn partition_names(&self) -> BTreeSet<String> {
        self.caching_routes()
            .map(|route| route.config.cache_name.clone())
            .collect()
    }

    /// Entry caps per partition. Routes sharing a partition get the
    /// smallest cap among them.
    pub fn partition_limits(&self) -> HashMap<String, PartitionLimits> {
        let mut limits: HashMap<String, usize> = HashMap::new();
        for route in self.caching_routes() {
            limits
                .entry(route.config.cache_name.clone())
                .and_modify(|cap| *cap = (*cap).min(route.config.max_entries))
                .or_insert(route.config.max_entries);
        }
        limits
            .into_iter()
            .map(|(name, cap)| (name, PartitionLimits::capped(cap)))
            .collect()
    }
}

fn check_partition_name(route: &str, partition: &str) -> Result<()> {
    if partition.len() > MAX_PARTITION_NAME_LEN {
        return Err(EngineError::Config(format!(
            "route '{}': partition name '{}' is longer than {} bytes",
            route, partition, MAX_PARTITION_NAME_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routes(json: &str) -> Router {
        let configs: Vec<RouteConfig> = serde_json::from_str(json).unwrap();
        Router::new(&configs, &EngineDefaults::default()).unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let router = routes(
            r#"[
                {"name": "api", "match": {"glob": "/api/*"}, "strategy": "network-first"},
                {"name": "everything", "match": {"prefix": "/"}, "strategy": "cache-first"}
            ]"#,
        );

        let route = router.resolve(&Request::get("https://example.com/api/items?page=2"));
        assert_eq!(route.name, "api");
        assert_eq!(route.strategy, StrategyKind::NetworkFirst);

        let route = router.resolve(&Request::get("https://example.com/index.html"));
        assert_eq!(route.name, "everything");
    }

    #[test]
    fn test_no_match_falls_back_to_network_only() {
        let router = routes(r#"[{"match": {"exact": "/app.js"}, "strategy": "cache-first"}]"#);

        assert!(router.matches(&Request::get("https://example.com/other.js")).is_none());
        let route = router.resolve(&Request::get("https://example.com/other.js"));
        assert_eq!(route.name, "default");
        assert_eq!(route.strategy, StrategyKind::NetworkOnly);
    }

    #[test]
    fn test_method_filter() {
        let router = routes(
            r#"[{"match": {"prefix": "/api/"}, "methods": ["get"], "strategy": "network-first"}]"#,
        );

        assert!(router.matches(&Request::get("https://example.com/api/a")).is_some());
        assert!(router
            .matches(&Request::new("POST", "https://example.com/api/a"))
            .is_none());
    }

    #[test]
    fn test_absolute_and_regex_patterns() {
        let router = routes(
            r#"[
                {"name": "cdn", "match": {"glob": "https://cdn.example.com/*"}, "strategy": "cache-first"},
                {"name": "images", "match": {"regex": "\\.(png|jpg)$"}, "strategy": "stale-while-revalidate"}
            ]"#,
        );

        assert_eq!(
            router.resolve(&Request::get("https://CDN.example.com/lib.js")).name,
            "cdn"
        );
        assert_eq!(
            router.resolve(&Request::get("https://example.com/img/a.png")).name,
            "images"
        );
        assert_eq!(
            router.resolve(&Request::get("https://example.com/api/a.png5")).name,
            "default"
        );
    }

    #[test]
    fn test_glob_is_literal_outside_stars() {
        let regex = glob_to_regex("/static/*.css").unwrap();
        assert!(regex.is_match("/static/app.css"));
        assert!(regex.is_match("/static/deep/nested/app.css"));
        assert!(!regex.is_match("/static/appXcss"));
    }

    #[test]
    fn test_unparseable_url_matches_nothing() {
        let router = routes(r#"[{"match": {"prefix": "/"}, "strategy": "cache-first"}]"#);
        assert!(router.matches(&Request::get("not a url")).is_none());
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let configs: Vec<RouteConfig> =
            serde_json::from_str(r#"[{"match": {"regex": "("}, "strategy": "cache-first"}]"#)
                .unwrap();
        let err = Router::new(&configs, &EngineDefaults::default()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_zero_max_entries_rejected() {
        let configs: Vec<RouteConfig> = serde_json::from_str(
            r#"[{"match": {"prefix": "/"}, "strategy": "cache-first", "options": {"maxEntries": 0}}]"#,
        )
        .unwrap();
        assert!(Router::new(&configs, &EngineDefaults::default()).is_err());
    }

    #[test]
    fn test_overlong_partition_name_rejected() {
        let long = "c".repeat(MAX_PARTITION_NAME_LEN);
        let json = format!(
            r#"[{{"match": {{"prefix": "/"}}, "strategy": "cache-first", "options": {{"cacheName": "{}"}}}}]"#,
            long
        );
        let configs: Vec<RouteConfig> = serde_json::from_str(&json).unwrap();
        let err = Router::new(&configs, &EngineDefaults::default()).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let defaults = EngineDefaults {
            cache_version: "v".repeat(MAX_PARTITION_NAME_LEN),
            ..EngineDefaults::default()
        };
        assert!(Router::new(&[], &defaults).is_err());
    }

    #[test]
    fn test_partition_limits_take_smallest_cap() {
        let router = routes(
            r#"[
                {"match": {"prefix": "/a"}, "strategy": "cache-first", "options": {"cacheName": "shared", "maxEntries": 10}},
                {"match": {"prefix": "/b"}, "strategy": "cache-only", "options": {"cacheName": "shared", "maxEntries": 4}},
                {"match": {"prefix": "/c"}, "strategy": "network-only", "options": {"cacheName": "unused"}}
            ]"#,
        );

        let limits = router.partition_limits();
        assert_eq!(limits.get("shared-v1"), Some(&PartitionLimits::capped(4)));
        assert!(!limits.contains_key("unused-v1"));
        assert!(router.partition_names().contains("shared-v1"));
    }
}
