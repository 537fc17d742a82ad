//! Propagation headers and inbound hint extraction.

use axum::http::{HeaderMap, HeaderName};

use crate::trace::Severity;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const REQUEST_ID: HeaderName = HeaderName::from_static("request-id");
pub const X_PARENT: HeaderName = HeaderName::from_static("x-parent");
pub const X_CLIENT_SEND: HeaderName = HeaderName::from_static("x-client-send");
pub const X_SPAN_ID: HeaderName = HeaderName::from_static("x-span-id");
pub const X_MUST_COLLECT: HeaderName = HeaderName::from_static("x-must-collect");
pub const X_SERVER_SEND: HeaderName = HeaderName::from_static("x-server-send");

/// Everything a caller told us about its own span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundHints {
    pub transaction_id: Option<String>,
    pub severity: Severity,
    pub parent_service_key: Option<u64>,
    /// Caller's send time in microseconds.
    pub client_send: Option<u64>,
    pub communication_id: Option<String>,
}

impl InboundHints {
    /// Read the propagation headers off an inbound request.
    ///
    /// Unparseable numeric headers are treated as absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let transaction_id = header_str(headers, &REQUEST_ID)
            .or_else(|| header_str(headers, &X_REQUEST_ID))
            .map(str::to_string);

        let severity = if header_str(headers, &X_MUST_COLLECT).is_some() {
            Severity::MustCollect
        } else {
            Severity::Default
        };

        Self {
            transaction_id,
            severity,
            parent_service_key: header_u64(headers, &X_PARENT),
            client_send: header_u64(headers, &X_CLIENT_SEND),
            communication_id: header_str(headers, &X_SPAN_ID).map(str::to_string),
        }
    }
}

pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn header_u64(headers: &HeaderMap, name: &HeaderName) -> Option<u64> {
    header_str(headers, name).and_then(|v| v.trim().parse().ok())
}
