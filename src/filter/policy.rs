//! Instrumentation exemption rules.
//!
//! # Design Decisions
//! - Cheapest checks first: headers, then path patterns
//! - Patterns are compiled once when the policy is built
//! - Status filtering happens at completion; the SR half is still opened

use axum::http::{HeaderMap, Uri};
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::config::FilterConfig;

const WILDCARD: &str = "*";

/// Compiled form of [`FilterConfig`].
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    ignore_headers: HashMap<String, Vec<String>>,
    ignore_paths: Vec<Regex>,
    ignore_status_codes: HashSet<u16>,
    keep_query_params: bool,
}

impl FilterPolicy {
    /// Compile the configured patterns.
    pub fn from_config(config: &FilterConfig) -> Result<Self, regex::Error> {
        let ignore_paths = config
            .ignore_paths
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        let ignore_headers = config
            .ignore_headers
            .iter()
            .map(|(name, values)| (name.to_ascii_lowercase(), values.clone()))
            .collect();

        Ok(Self {
            ignore_headers,
            ignore_paths,
            ignore_status_codes: config.ignore_status_codes.iter().copied().collect(),
            keep_query_params: config.keep_query_params,
        })
    }

    /// True if a configured header is present with a wildcard or listed value.
    pub fn is_header_ignored(&self, headers: &HeaderMap) -> bool {
        self.ignore_headers.iter().any(|(name, values)| {
            headers.get_all(name.as_str()).iter().any(|value| {
                let value = match value.to_str() {
                    Ok(v) => v,
                    Err(_) => return false,
                };
                values.iter().any(|v| v == WILDCARD || v == value)
            })
        })
    }

    /// True if `target` (path plus query as received) matches any pattern.
    pub fn is_path_ignored(&self, target: &str) -> bool {
        self.ignore_paths.iter().any(|re| re.is_match(target))
    }

    pub fn is_status_ignored(&self, status_code: u16) -> bool {
        self.ignore_status_codes.contains(&status_code)
    }

    /// Header or path exemption; decides the passthrough branch.
    pub fn is_request_ignored(&self, uri: &Uri, headers: &HeaderMap) -> bool {
        self.is_header_ignored(headers) || self.is_path_ignored(request_target(uri))
    }

    /// Span resource for `uri`: the path, plus the query when configured.
    pub fn resource(&self, uri: &Uri) -> String {
        if self.keep_query_params {
            request_target(uri).to_string()
        } else {
            uri.path().to_string()
        }
    }
}

fn request_target(uri: &Uri) -> &str {
    uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
}
