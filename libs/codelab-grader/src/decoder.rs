//! Output decoding for executor text fields.
//!
//! The executor is inconsistent about encodings: base64 on success, plain text on
//! some error paths, occasionally with broken padding. Decoding never fails; the
//! worst case is the original text handed back unchanged.

use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;

/// A stdout/stderr/compile_output field as it arrives over the wire
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawField {
    Text(String),
    Bytes(Vec<u8>),
}

/// How the executor was asked to encode its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEncoding {
    Base64,
    Plain,
}

/// Decode an optional raw field with the layered base64 fallback
pub fn decode(raw: Option<&RawField>) -> String {
    decode_with(raw, OutputEncoding::Base64)
}

pub fn decode_with(raw: Option<&RawField>, encoding: OutputEncoding) -> String {
    match raw {
        None => String::new(),
        Some(RawField::Bytes(bytes)) => decode_bytes(bytes),
        Some(RawField::Text(text)) => match encoding {
            OutputEncoding::Base64 => decode_text(text),
            OutputEncoding::Plain => text.clone(),
        },
    }
}

/// UTF-8 with replacement characters for invalid sequences
pub fn decode_bytes(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Pad, base64-decode and UTF-8-decode `text`; return it unchanged if it is not base64
pub fn decode_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    // base64 from the executor is wrapped every 60 columns
    let mut compact: String = text.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    if compact.is_empty() {
        return text.to_string();
    }

    while compact.len() % 4 != 0 {
        compact.push('=');
    }

    match general_purpose::STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => decode_bytes(&bytes),
        Err(_) => text.to_string(),
    }
}
