use axum::http::{HeaderValue, Method};
use regex::Regex;
use tower_http::cors::{AllowMethods, AllowOrigin, CorsLayer};

use crate::config::{default_cors_methods, default_cors_origin_pattern, ConfigError};

/// Which browser origins and HTTP methods may reach the hub.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    pattern: Regex,
    methods: Vec<Method>,
}

impl OriginPolicy {
    pub fn new(pattern: &str, methods: &str) -> Result<Self, ConfigError> {
        let pattern = Regex::new(pattern).map_err(|source| ConfigError::OriginPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        let methods = methods
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(|m| {
                Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                    .map_err(|_| ConfigError::Method(m.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pattern, methods })
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        self.pattern.is_match(origin)
    }

    pub fn allows_method(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let pattern = self.pattern.clone();
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
                origin.to_str().map(|o| pattern.is_match(o)).unwrap_or(false)
            }))
            .allow_methods(AllowMethods::list(self.methods.clone()))
    }
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self::new(&default_cors_origin_pattern(), &default_cors_methods())
            .expect("built-in origin policy is valid")
    }
}
