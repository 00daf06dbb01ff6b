use crate::{*, error::*, types::*, value::*, session::*, printer::*};
use serde::{Serialize, Deserialize};
use std::rc::Rc;

// Values that decoders produce without a memory location: labels, counts, flags, precomputed records, deferred walks.
// They travel through the renderer as Renderable::Synthetic. Where only a memory-like value can be passed around
// (e.g. a host that stores children as values), they are encoded into a char array whose bytes start with SENTINEL,
// and dispatch recognizes and decodes such arrays before anything else.

pub const SENTINEL: &[u8] = b"=*?=";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SyntheticValue {
    Text(String),
    Int(i64),
    UInt(u64),
    Float(#[serde(with = "float_bits")] f64),
    Bool(bool),
    Address(u64),
    // Inline marker for a contained failure, shown as "<message>".
    Diagnostic(String),
    Record(SyntheticRecord),
    // A memory value referenced by location and type name, re-resolved and re-dispatched when rendered.
    MemoryRef {address: u64, type_name: String},
    // Doubly linked list containing the node at `any_link_address`, walked both ways when rendered.
    LinkedList {any_link_address: u64, data_type: String},
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyntheticRecord {
    pub summary: Option<String>,
    pub hint: DisplayHint,
    pub children: Vec<(String, SyntheticValue)>,
}

impl SyntheticValue {
    pub fn text(s: impl Into<String>) -> Self { Self::Text(s.into()) }
    pub fn diagnostic(e: &Error) -> Self { Self::Diagnostic(format!("{}: {}", e.category(), e)) }
    pub fn is_diagnostic(&self) -> bool { match self { Self::Diagnostic(_) => true, _ => false } }
}

// f64 as its bit pattern, so that NaN payloads, infinities and -0.0 survive the text encoding.
mod float_bits {
    use serde::{Serialize, Serializer, Deserialize, Deserializer};
    pub fn serialize<S: Serializer>(x: &f64, s: S) -> Result<S::Ok, S::Error> { x.to_bits().serialize(s) }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> { Ok(f64::from_bits(u64::deserialize(d)?)) }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedValue(pub Vec<u8>);

impl EncodedValue {
    pub fn encode(v: &SyntheticValue) -> Result<Self> {
        let mut bytes = SENTINEL.to_vec();
        serde_json::to_writer(&mut bytes, v)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] { &self.0 }

    pub fn decode(&self) -> Result<SyntheticValue> { decode_payload(&self.0) }

    // As a NUL-terminated char array value, the way a string literal would come back from the target.
    pub fn into_value(self, char_type: &Rc<TypeInfo>) -> Value {
        let mut bytes = self.0;
        bytes.push(0);
        let t = TypeInfo::array_of(char_type, bytes.len());
        Value::from_blob(ValueBlob::from_vec(bytes), t)
    }
}

pub fn has_sentinel(bytes: &[u8]) -> bool { bytes.starts_with(SENTINEL) }

// Parses sentinel + JSON into the closed SyntheticValue enum. Nothing in the payload is evaluated.
// Trailing NULs (C string terminator, zero padding of a fixed-size buffer) are ignored.
pub fn decode_payload(bytes: &[u8]) -> Result<SyntheticValue> {
    if !has_sentinel(bytes) {
        return err!(RoundTrip, "no sentinel");
    }
    let mut payload = &bytes[SENTINEL.len()..];
    while let Some((&0, rest)) = payload.split_last() {
        payload = rest;
    }
    let text = std::str::from_utf8(payload).map_err(|e| error!(RoundTrip, "payload is not utf8: {}", e))?;
    Ok(serde_json::from_str(text)?)
}

// Dispatch step 1. Any byte-array-shaped value is checked for the sentinel, regardless of its declared type.
// Every failure (unreadable memory, garbage after the sentinel, oversized array) means "not an encoded value".
pub fn extract_encoded(value: &Value, session: &Session) -> Option<SyntheticValue> {
    let t = value.type_.strip_typedefs();
    if !t.is_byte_array() {
        return None;
    }
    let size = t.calculate_size();
    if size < SENTINEL.len() {
        return None;
    }
    let prefix = value.val.read(0..SENTINEL.len(), session).ok()?;
    if !has_sentinel(&prefix) {
        return None;
    }
    if size > session.settings.max_encoded_len {
        log!(session.log.borrow_mut(), "encoded value of {} bytes exceeds the limit", size);
        return None;
    }
    let bytes = match value.val.read(0..size, session) {
        Ok(b) => b,
        Err(e) => {
            log!(session.log.borrow_mut(), "encoded value unreadable: {}", e);
            return None;
        }
    };
    match decode_payload(&bytes) {
        Ok(v) => Some(v),
        Err(e) => {
            log!(session.log.borrow_mut(), "sentinel-prefixed value didn't decode: {}", e);
            None
        }
    }
}
