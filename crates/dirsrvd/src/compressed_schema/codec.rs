//! Length-prefixed framing shared by the token encoders and the schema file.
//!
//! Lengths use the BER short/long form: values below `0x80` occupy a single
//! byte, larger values are written as `0x80 | n` followed by `n` big-endian
//! length bytes.

use super::CompressedSchemaError;

const LONG_FORM_FLAG: u8 = 0x80;
const MAX_TOKEN_WIDTH: usize = 4;

/// Cursor over an encoded byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    /// Creates a reader positioned at the start of `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Current read position.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Returns `true` once every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    /// Reads a single byte.
    ///
    /// # Errors
    ///
    /// Returns [`CompressedSchemaError::Truncated`] at end of input.
    pub fn read_byte(&mut self) -> Result<u8, CompressedSchemaError> {
        let offset = self.offset;
        let byte = self
            .bytes
            .get(offset)
            .copied()
            .ok_or(CompressedSchemaError::Truncated { offset, needed: 1 })?;
        self.offset = offset + 1;
        Ok(byte)
    }

    /// Reads exactly `len` bytes without copying.
    ///
    /// # Errors
    ///
    /// Returns [`CompressedSchemaError::Truncated`] when fewer than `len`
    /// bytes remain.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], CompressedSchemaError> {
        let offset = self.offset;
        let truncated = || CompressedSchemaError::Truncated {
            offset,
            needed: len,
        };
        let end = offset.checked_add(len).ok_or_else(truncated)?;
        let slice = self.bytes.get(offset..end).ok_or_else(truncated)?;
        self.offset = end;
        Ok(slice)
    }

    /// Reads a BER-style length.
    ///
    /// # Errors
    ///
    /// Fails on truncated input or a long form wider than `usize`.
    pub fn read_length(&mut self) -> Result<usize, CompressedSchemaError> {
        let start = self.offset;
        let first = self.read_byte()?;
        if first & LONG_FORM_FLAG == 0 {
            return Ok(usize::from(first));
        }
        let width = usize::from(first & !LONG_FORM_FLAG);
        if width == 0 || width > size_of::<usize>() {
            return Err(CompressedSchemaError::InvalidLength { offset: start });
        }
        let bytes = self.read_slice(width)?;
        Ok(bytes
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte)))
    }

    /// Reads a length followed by that many bytes.
    ///
    /// # Errors
    ///
    /// Fails when the length is malformed or the payload is truncated.
    pub fn read_length_prefixed(&mut self) -> Result<&'a [u8], CompressedSchemaError> {
        let len = self.read_length()?;
        self.read_slice(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Fails on malformed framing or invalid UTF-8.
    pub fn read_string(&mut self) -> Result<&'a str, CompressedSchemaError> {
        let offset = self.offset;
        let bytes = self.read_length_prefixed()?;
        std::str::from_utf8(bytes).map_err(|_| CompressedSchemaError::InvalidUtf8 { offset })
    }
}

/// Appends a BER-style length.
pub fn write_length(buffer: &mut Vec<u8>, length: usize) {
    match u8::try_from(length) {
        Ok(short) if short < LONG_FORM_FLAG => buffer.push(short),
        _ => {
            let bytes = minimal_big_endian(length as u64);
            // At most eight bytes, so the width always fits below the flag bit.
            buffer.push(LONG_FORM_FLAG | bytes.len() as u8);
            buffer.extend_from_slice(&bytes);
        }
    }
}

/// Appends `bytes` preceded by their length.
pub fn write_length_prefixed(buffer: &mut Vec<u8>, bytes: &[u8]) {
    write_length(buffer, bytes.len());
    buffer.extend_from_slice(bytes);
}

/// Renders `value` using the fewest big-endian bytes, never fewer than one.
#[must_use]
pub fn minimal_big_endian(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(size_of::<u64>());
    let mut remaining = value;
    loop {
        bytes.push((remaining & 0xff) as u8);
        remaining >>= 8;
        if remaining == 0 {
            break;
        }
    }
    bytes.reverse();
    bytes
}

/// Renders a token value as its 1–4 byte wire form.
#[must_use]
pub fn token_bytes(token: u32) -> Vec<u8> {
    minimal_big_endian(u64::from(token))
}

/// Interprets wire bytes as a token value.
///
/// Returns `None` for empty or over-wide tokens; such bytes can never have
/// been issued.
#[must_use]
pub fn token_value(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > MAX_TOKEN_WIDTH {
        return None;
    }
    Some(
        bytes
            .iter()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)),
    )
}
