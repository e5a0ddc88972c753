//! Legacy RPC envelopes.
//!
//! Two request envelopes predate plain JSON/binary bodies:
//!
//! ```text
//! JSON-RPC:   {"method": "Svc.Call", "params": [<payload>], "id": 1}
//! proto-RPC:  [len:u32 BE][header][len:u32 BE][body]
//! ```
//!
//! Both are unwrapped header-first; only the payload is forwarded.

use bytes::{Buf, Bytes};
use serde::Deserialize;
use serde_json::value::RawValue;
use thiserror::Error;

/// Envelope decoding failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("invalid json-rpc header: {0}")]
    JsonRpcHeader(String),

    #[error("json-rpc params must be an array")]
    JsonRpcParams,

    #[error("truncated {section} length prefix")]
    TruncatedPrefix { section: &'static str },

    #[error("{section} declares {declared} bytes but only {available} remain")]
    TruncatedFrame {
        section: &'static str,
        declared: usize,
        available: usize,
    },
}

#[derive(Deserialize)]
struct JsonRpcRequest<'a> {
    #[allow(dead_code)]
    method: String,
    #[serde(borrow, default)]
    params: Option<&'a RawValue>,
    #[serde(borrow, default)]
    #[allow(dead_code)]
    id: Option<&'a RawValue>,
}

/// Unwrap a JSON-RPC request and return the raw JSON of `params[0]`.
pub fn decode_json_rpc(body: &[u8]) -> Result<Bytes, EnvelopeError> {
    let request: JsonRpcRequest<'_> =
        serde_json::from_slice(body).map_err(|e| EnvelopeError::JsonRpcHeader(e.to_string()))?;

    let Some(params) = request.params else {
        return Ok(Bytes::new());
    };
    if params.get() == "null" {
        return Ok(Bytes::new());
    }

    let params: Vec<&RawValue> =
        serde_json::from_str(params.get()).map_err(|_| EnvelopeError::JsonRpcParams)?;
    Ok(params
        .first()
        .map(|p| Bytes::copy_from_slice(p.get().as_bytes()))
        .unwrap_or_default())
}

/// Unwrap a proto-RPC request and return the body frame.
pub fn decode_proto_rpc(body: Bytes) -> Result<Bytes, EnvelopeError> {
    let mut buf = body;
    // Header content is routing metadata the backend call already carries.
    let _header = read_frame(&mut buf, "header")?;
    read_frame(&mut buf, "body")
}

fn read_frame(buf: &mut Bytes, section: &'static str) -> Result<Bytes, EnvelopeError> {
    if buf.remaining() < 4 {
        return Err(EnvelopeError::TruncatedPrefix { section });
    }
    let declared = buf.get_u32() as usize;
    if declared > buf.remaining() {
        return Err(EnvelopeError::TruncatedFrame {
            section,
            declared,
            available: buf.remaining(),
        });
    }
    Ok(buf.split_to(declared))
}
