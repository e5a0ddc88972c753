//! Content-type classification.
//!
//! # Data Flow
//! ```text
//! Content-Type header ("application/json; charset=UTF-8")
//!     → strip_params ("application/json")
//!     → Encoding::classify (closed enum, resolved once)
//!     → payload extraction, backend content type, framing op
//! ```
//!
//! # Design Decisions
//! - Classification never fails; unknown types are structured text
//! - Downstream code matches on `Encoding`, never on the raw string
//! - Legacy envelope formats live in `envelope.rs`

pub mod envelope;

/// The structured-text default content type.
pub const JSON: &str = "application/json";

const JSON_CODECS: &[&str] = &["application/grpc+json", "application/json", "application/json-rpc"];

const BINARY_CODECS: &[&str] = &[
    "application/grpc",
    "application/grpc+proto",
    "application/proto",
    "application/protobuf",
    "application/octet-stream",
];

const JSON_RPC: &str = "application/json-rpc";
const PROTO_RPC: &str = "application/proto-rpc";
const FORM: &str = "application/x-www-form-urlencoded";

/// Wire-format family of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    StructuredText,
    BinaryFramed,
    FormEncoded,
    /// JSON-RPC request object wrapping the payload.
    LegacyEnvelopeText,
    /// Length-prefixed header + body frames.
    LegacyEnvelopeBinary,
}

impl Encoding {
    /// Classify an already-stripped content type.
    pub fn classify(content_type: &str) -> Self {
        match content_type {
            JSON_RPC => Self::LegacyEnvelopeText,
            PROTO_RPC => Self::LegacyEnvelopeBinary,
            FORM => Self::FormEncoded,
            ct if BINARY_CODECS.contains(&ct) => Self::BinaryFramed,
            _ => Self::StructuredText,
        }
    }

    /// Classify a raw header value, parameters included.
    pub fn from_header(raw: &str) -> Self {
        Self::classify(strip_params(raw))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::BinaryFramed | Self::LegacyEnvelopeBinary)
    }

    pub fn is_envelope(&self) -> bool {
        matches!(self, Self::LegacyEnvelopeText | Self::LegacyEnvelopeBinary)
    }

    /// Content type to declare on the backend call.
    pub fn backend_content_type(&self, content_type: &str) -> String {
        if self.is_binary() || JSON_CODECS.contains(&content_type) {
            content_type.to_string()
        } else {
            JSON.to_string()
        }
    }
}

/// How frames are marked on an upgraded connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingOp {
    Text,
    Binary,
}

impl FramingOp {
    /// Negotiate the framing op from the stripped content type and the
    /// sub-protocols offered by the client.
    pub fn negotiate<'a>(content_type: &str, protocols: impl IntoIterator<Item = &'a str>) -> Self {
        if protocols.into_iter().any(|p| p == "binary") {
            return Self::Binary;
        }
        if content_type == JSON {
            Self::Text
        } else {
            Self::Binary
        }
    }
}

/// Drop everything from the first `;` onward.
pub fn strip_params(content_type: &str) -> &str {
    match content_type.find(';') {
        Some(idx) => &content_type[..idx],
        None => content_type,
    }
}
