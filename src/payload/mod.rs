//! Payload extraction.
//!
//! # Responsibilities
//! - Normalize an inbound request (body, query, form) into opaque payload bytes
//! - Enforce the request body ceiling on every body read
//! - Use frame bytes verbatim for streaming
//!
//! # Data Flow
//! ```text
//! Request (method, query, body) + Encoding
//!     ├── legacy envelope → read body → decode header → body payload
//!     ├── form            → read body → flat JSON object
//!     ├── GET + query     → JSON object from the query string
//!     ├── POST / PATCH    → raw body (pooled buffer)
//!     └── otherwise       → empty
//! ```
//!
//! # Design Decisions
//! - First match wins, in the order above
//! - Body reads go through the shared buffer pool and stop at the ceiling
//!   without forwarding a partial payload

pub mod pool;

use axum::body::Body;
use axum::http::{Method, Uri};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{Map, Value};

use crate::codec::{envelope, Encoding};
use crate::error::BridgeError;

use pool::{BufferPool, PooledBuf};

/// Extracted payload plus the encoding it was declared with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Bytes,
    pub encoding: Encoding,
}

impl Payload {
    pub fn empty(encoding: Encoding) -> Self {
        Self {
            bytes: Bytes::new(),
            encoding,
        }
    }

    /// A streaming frame; framing already delimits the payload.
    pub fn from_frame(bytes: Bytes, encoding: Encoding) -> Self {
        Self { bytes, encoding }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Turns inbound requests into payloads.
#[derive(Debug, Clone)]
pub struct PayloadExtractor {
    max_recv_size: usize,
    pool: BufferPool,
}

impl PayloadExtractor {
    /// Extractor over the process-wide buffer pool.
    pub fn new(max_recv_size: usize) -> Self {
        Self::with_pool(max_recv_size, pool::global().clone())
    }

    pub fn with_pool(max_recv_size: usize, pool: BufferPool) -> Self {
        Self { max_recv_size, pool }
    }

    pub fn max_recv_size(&self) -> usize {
        self.max_recv_size
    }

    pub async fn extract(
        &self,
        method: &Method,
        uri: &Uri,
        encoding: Encoding,
        body: Body,
    ) -> Result<Payload, BridgeError> {
        let bytes = match encoding {
            Encoding::LegacyEnvelopeText => {
                let buf = self.read_body(body).await?;
                envelope::decode_json_rpc(&buf)?
            }
            Encoding::LegacyEnvelopeBinary => {
                let buf = self.read_body(body).await?;
                envelope::decode_proto_rpc(Bytes::copy_from_slice(&buf))?
            }
            Encoding::FormEncoded => {
                let buf = self.read_body(body).await?;
                form_to_json(&buf, uri.query().unwrap_or_default())
            }
            _ if *method == Method::GET => match uri.query() {
                Some(query) if !query.is_empty() => query_to_json(query),
                _ => Bytes::new(),
            },
            _ if *method == Method::POST || *method == Method::PATCH => {
                let buf = self.read_body(body).await?;
                Bytes::copy_from_slice(&buf)
            }
            _ => Bytes::new(),
        };

        Ok(Payload { bytes, encoding })
    }

    /// Read the whole body into a pooled buffer, up to the ceiling.
    async fn read_body(&self, body: Body) -> Result<PooledBuf, BridgeError> {
        let mut buf = self.pool.get();
        let mut chunks = body.into_data_stream();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| BridgeError::BodyRead(e.to_string()))?;
            if buf.len() + chunk.len() > self.max_recv_size {
                return Err(BridgeError::PayloadTooLarge {
                    limit: self.max_recv_size,
                });
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(buf)
    }
}

/// Flat JSON object from a form body, then query fields the body lacks.
/// Repeated keys are joined with `,`.
fn form_to_json(body: &[u8], query: &str) -> Bytes {
    let mut fields = flat_fields(body);
    for (key, value) in flat_fields(query.as_bytes()) {
        fields.entry(key).or_insert(value);
    }
    to_json_bytes(&Value::Object(fields))
}

/// JSON object from a query string. Bracketed keys nest; leaves are strings.
fn query_to_json(query: &str) -> Bytes {
    match serde_qs::from_str::<Value>(query) {
        Ok(value @ Value::Object(_)) => to_json_bytes(&value),
        _ => to_json_bytes(&Value::Object(flat_fields(query.as_bytes()))),
    }
}

fn flat_fields(input: &[u8]) -> Map<String, Value> {
    let mut fields = Map::new();
    for (key, value) in url::form_urlencoded::parse(input) {
        match fields.get_mut(key.as_ref()) {
            Some(Value::String(existing)) => {
                existing.push(',');
                existing.push_str(&value);
            }
            _ => {
                fields.insert(key.into_owned(), Value::String(value.into_owned()));
            }
        }
    }
    fields
}

fn to_json_bytes(value: &Value) -> Bytes {
    // Serializing a `Value` cannot fail.
    Bytes::from(serde_json::to_vec(value).unwrap_or_default())
}
