//! Opaque pagination cursors.
//!
//! A cursor encodes the sort-key values of the last row of a page:
//! a version byte, the canonical JSON of a string map (BTreeMap, so key
//! order is stable and encoding is deterministic), and a CRC32 trailer,
//! all wrapped in URL-safe base64. Decoding requires no server-side state,
//! so cursors survive restarts and horizontal scaling.
//!
//! The checksum makes cursors tamper-evident, not tamper-proof: cursors are
//! not a security boundary, and sort fields must never carry sensitive data.
//! Clients treat the string as opaque; the framing may change between
//! versions without being a breaking change.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::collections::BTreeMap;

use super::error::{PageResult, PaginationError};
use super::sort::{SortValue, SortValueKind};

const CURSOR_VERSION: u8 = 1;

/// Encoder/decoder for cursor strings.
pub struct KeyCodec;

impl KeyCodec {
    /// Encode a map of field names to canonical strings into a cursor.
    ///
    /// Deterministic: the same map always yields the same cursor string.
    pub fn encode(values: &BTreeMap<String, String>) -> String {
        let payload = serde_json::to_vec(values).unwrap_or_default();

        let mut frame = Vec::with_capacity(payload.len() + 5);
        frame.push(CURSOR_VERSION);
        frame.extend_from_slice(&payload);

        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        URL_SAFE_NO_PAD.encode(frame)
    }

    /// Decode a cursor back into its field-name to canonical-string map.
    pub fn decode(cursor: &str) -> PageResult<BTreeMap<String, String>> {
        let invalid = |reason: &str| PaginationError::InvalidCursor(reason.to_string());

        let frame = URL_SAFE_NO_PAD
            .decode(cursor)
            .map_err(|_| invalid("not valid base64"))?;
        if frame.len() < 5 {
            return Err(invalid("truncated"));
        }

        let (body, trailer) = frame.split_at(frame.len() - 4);
        let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        if crc32fast::hash(body) != expected {
            return Err(invalid("checksum mismatch"));
        }
        if body[0] != CURSOR_VERSION {
            return Err(invalid("unsupported cursor version"));
        }

        serde_json::from_slice(&body[1..]).map_err(|_| invalid("malformed payload"))
    }

    /// Encode typed sort-key values.
    pub fn encode_key(values: &BTreeMap<String, SortValue>) -> String {
        let canonical: BTreeMap<String, String> = values
            .iter()
            .map(|(name, value)| (name.clone(), value.to_canonical()))
            .collect();
        Self::encode(&canonical)
    }

    /// Decode a cursor and re-type each field per the supplied schema.
    ///
    /// The cursor's field set must exactly match the schema's: a missing or
    /// extra field means the cursor was minted against a different sort spec.
    pub fn decode_key(
        cursor: &str,
        schema: &[(String, SortValueKind)],
    ) -> PageResult<BTreeMap<String, SortValue>> {
        let raw = Self::decode(cursor)?;

        if raw.len() != schema.len() {
            return Err(PaginationError::InvalidCursor(
                "cursor does not match the requested sort".to_string(),
            ));
        }

        let mut values = BTreeMap::new();
        for (name, kind) in schema {
            let canonical = raw.get(name).ok_or_else(|| {
                PaginationError::InvalidCursor(format!("cursor is missing field '{name}'"))
            })?;
            values.insert(name.clone(), SortValue::parse(*kind, canonical)?);
        }
        Ok(values)
    }
}
