/// BTHome v2 envelope decoding
use std::collections::BTreeMap;

use thiserror::Error;

use crate::bthome::catalog::{FieldCatalog, FieldDefinition};

/// The only BTHome format version we understand
pub const SUPPORTED_VERSION: u8 = 2;

const ENCRYPTION_FLAG: u8 = 0x01;

/// Hard decode failures; the envelope is dropped and nothing is emitted
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("envelope has no header byte")]
    Empty,
    #[error("unsupported BTHome version {0} (expected 2)")]
    UnsupportedVersion(u8),
    #[error("encrypted BTHome envelopes are not supported")]
    Encrypted,
}

/// Fields recovered from one envelope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFields {
    pub values: BTreeMap<String, f64>,
    /// Decoding stopped at an unknown id or a short field
    pub truncated: bool,
}

impl DecodedFields {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Packet counter, if the envelope carried one
    pub fn packet_id(&self) -> Option<u8> {
        self.values.get("pid").map(|pid| *pid as u8)
    }
}

/// Decode a BTHome v2 service data payload
///
/// Layout: one header byte (bits 5-7 version, bit 0 encryption flag)
/// followed by `(id, value)` pairs. Unknown ids and short trailing values
/// end decoding early and yield whatever was read up to that point.
///
/// # Arguments
/// * `bytes` - Service data for the BTHome UUID, header byte first
/// * `catalog` - Field table used to resolve ids, widths and scales
///
/// # Returns
/// The named values read before decoding stopped, or a `DecodeError` when
/// the header rules the envelope out entirely
pub fn decode(bytes: &[u8], catalog: &FieldCatalog) -> Result<DecodedFields, DecodeError> {
    let (&header, mut rest) = bytes.split_first().ok_or(DecodeError::Empty)?;

    let version = header >> 5;
    if version != SUPPORTED_VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    if header & ENCRYPTION_FLAG != 0 {
        return Err(DecodeError::Encrypted);
    }

    let mut decoded = DecodedFields::default();
    let mut occurrences = [0u32; 256];

    while rest.len() >= 2 {
        let id = rest[0];
        let Some(def) = catalog.lookup(id) else {
            decoded.truncated = true;
            break;
        };

        let width = def.format.width();
        let body = &rest[1..];
        if body.len() < width {
            decoded.truncated = true;
            break;
        }

        let raw = read_le(&body[..width], def.format.is_signed());
        let value = match def.scale {
            Some(scale) => raw as f64 * scale,
            None => raw as f64,
        };

        occurrences[id as usize] += 1;
        decoded
            .values
            .insert(occurrence_name(def, occurrences[id as usize]), value);

        rest = &body[width..];
    }

    Ok(decoded)
}

/// Little-endian integer with optional two's-complement sign extension
fn read_le(bytes: &[u8], signed: bool) -> i64 {
    let raw = bytes
        .iter()
        .rev()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));

    let bits = 8 * bytes.len() as u32;
    if signed && raw & (1 << (bits - 1)) != 0 {
        i64::from(raw) - (1i64 << bits)
    } else {
        i64::from(raw)
    }
}

/// Name under which the nth occurrence of a field is recorded
fn occurrence_name(def: &FieldDefinition, occurrence: u32) -> String {
    match (occurrence, def.repeat_name) {
        (1, _) => def.name.to_string(),
        (2, Some(repeat)) => repeat.to_string(),
        (n, _) => format!("{}_{}", def.name, n),
    }
}
