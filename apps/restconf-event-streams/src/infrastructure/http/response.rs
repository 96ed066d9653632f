//! HTTP response bodies: error documents and stream listings.

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use serde::Serialize;

use crate::application::streams::{StreamInfo, StreamState};
use crate::domain::error::{ErrorTag, ErrorType, RestconfError};
use crate::domain::stream::EncodingName;

use super::STREAM_LOCATION;

const RESTCONF_NS: &str = "urn:ietf:params:xml:ns:yang:ietf-restconf";

// =============================================================================
// Content Negotiation
// =============================================================================

/// Encoding a client asked for through `Accept`. JSON unless an XML media
/// type is named.
#[must_use]
pub fn negotiate(headers: &HeaderMap) -> EncodingName {
    let wants_xml = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|media| media.split(';').next().unwrap_or("").trim())
        .any(|media| {
            media.eq_ignore_ascii_case(EncodingName::Xml.media_type())
                || media.eq_ignore_ascii_case("application/xml")
        });
    if wants_xml {
        EncodingName::Xml
    } else {
        EncodingName::Json
    }
}

/// Serialize `body` as a YANG JSON document.
pub fn yang_json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (
            status,
            [(header::CONTENT_TYPE, EncodingName::Json.media_type())],
            bytes,
        )
            .into_response(),
        Err(e) => ErrorResponse::new(
            RestconfError::new(
                ErrorType::Application,
                ErrorTag::OperationFailed,
                format!("failed to encode response: {e}"),
            ),
            EncodingName::Json,
        )
        .into_response(),
    }
}

// =============================================================================
// Error Responses
// =============================================================================

/// A `RestconfError` rendered in the negotiated encoding.
#[derive(Debug, Clone)]
pub struct ErrorResponse {
    error: RestconfError,
    encoding: EncodingName,
}

impl ErrorResponse {
    /// Render `error` as `encoding`.
    #[must_use]
    pub const fn new(error: RestconfError, encoding: EncodingName) -> Self {
        Self { error, encoding }
    }

    /// Error document text.
    #[must_use]
    pub fn body(&self) -> String {
        match self.encoding {
            EncodingName::Json => json_error_body(&self.error),
            EncodingName::Xml => xml_error_body(&self.error),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.error_tag().http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            [(header::CONTENT_TYPE, self.encoding.media_type())],
            self.body(),
        )
            .into_response()
    }
}

fn json_error_body(error: &RestconfError) -> String {
    serde_json::json!({
        "ietf-restconf:errors": {
            "error": [{
                "error-type": error.error_type().as_str(),
                "error-tag": error.error_tag().as_str(),
                "error-message": error.message(),
            }]
        }
    })
    .to_string()
}

fn xml_error_body(error: &RestconfError) -> String {
    format!(
        "<errors xmlns=\"{RESTCONF_NS}\"><error>\
         <error-type>{}</error-type>\
         <error-tag>{}</error-tag>\
         <error-message>{}</error-message>\
         </error></errors>",
        error.error_type().as_str(),
        error.error_tag().as_str(),
        escape(error.message()),
    )
}

// =============================================================================
// Stream Listing
// =============================================================================

/// `GET .../restconf-state/streams` body.
#[derive(Debug, Clone, Serialize)]
pub struct StreamsResponse {
    /// Registered streams.
    #[serde(rename = "ietf-restconf-monitoring:streams")]
    pub streams: StreamList,
}

/// Stream list container.
#[derive(Debug, Clone, Serialize)]
pub struct StreamList {
    /// One entry per stream, ordered by name.
    pub stream: Vec<StreamEntry>,
}

/// One listed stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEntry {
    /// Stream name.
    pub name: String,
    /// What the stream carries.
    pub description: String,
    /// Encodings offered.
    pub encodings: Vec<&'static str>,
    /// Whether a subscriber is attached.
    pub subscribed: bool,
    /// Lifecycle state.
    pub state: &'static str,
    /// Registration time.
    #[serde(rename = "created-at")]
    pub created_at: DateTime<Utc>,
    /// Where to subscribe, per encoding.
    pub access: Vec<StreamAccess>,
}

/// Subscribe location for one encoding.
#[derive(Debug, Clone, Serialize)]
pub struct StreamAccess {
    /// Encoding name.
    pub encoding: &'static str,
    /// Relative subscribe URI.
    pub location: String,
}

impl From<Vec<StreamInfo>> for StreamsResponse {
    fn from(infos: Vec<StreamInfo>) -> Self {
        let stream = infos
            .into_iter()
            .map(|info| StreamEntry {
                access: info
                    .encodings
                    .iter()
                    .map(|encoding| StreamAccess {
                        encoding: encoding.as_str(),
                        location: format!("{STREAM_LOCATION}/{encoding}/{}", info.name),
                    })
                    .collect(),
                name: info.name.to_string(),
                description: info.description,
                encodings: info.encodings.iter().map(EncodingName::as_str).collect(),
                subscribed: info.state == StreamState::Active,
                state: info.state.as_str(),
                created_at: info.created_at,
            })
            .collect();
        Self {
            streams: StreamList { stream },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
