//! Traits for entities that can be saved/loaded
//!
//! `Save` is the object-safe trait the manager works with: reset to defaults,
//! produce a byte payload, consume a byte payload. Most entities don't
//! implement it by hand; they implement one of the two authoring traits and
//! get wrapped:
//!
//! - `BinarySave` + `Binary<T>`: sequential little-endian fields through
//!   `ByteWriter` / `ByteReader`.
//! - `TextSave` + `Text<T>`: `name: value` lines through `LineWriter`.
//!
//! Implementations don't need to guard against bad input. Any error (or panic)
//! while reading makes the manager reset the entity, so the application never
//! sees a half-loaded object.

use std::fmt::Display;
use std::ops::{Deref, DerefMut};

use super::types::{SaveError, catch_panic};

/// An entity the save queue can persist
pub trait Save {
    /// Restore defaults. Must not fail.
    fn reset(&mut self);

    /// Serialize the whole entity
    fn to_bytes(&self) -> Result<Vec<u8>, SaveError>;

    /// Replace the entity's state with the decoded payload
    fn from_bytes(&mut self, data: &[u8]) -> Result<(), SaveError>;
}

/// Serializes `entity`, converting panics into errors.
pub(crate) fn serialize(entity: &dyn Save) -> Result<Vec<u8>, SaveError> {
    catch_panic(|| entity.to_bytes())
}

/// Loads `data` into `entity`; on any failure the entity is reset.
pub(crate) fn deserialize(entity: &mut dyn Save, data: &[u8]) -> Result<(), SaveError> {
    let result = catch_panic(|| entity.from_bytes(data));
    if result.is_err() {
        entity.reset();
    }
    result
}

// ============================================================
// Binary form
// ============================================================

/// Sequential little-endian writer over an in-memory buffer
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(256) }
    }

    pub fn write_u8(&mut self, val: u8) {
        self.buf.push(val);
    }

    pub fn write_bool(&mut self, val: bool) {
        self.write_u8(val as u8);
    }

    pub fn write_i32(&mut self, val: i32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u32(&mut self, val: u32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_i64(&mut self, val: i64) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_u64(&mut self, val: u64) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_f32(&mut self, val: f32) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    pub fn write_f64(&mut self, val: f64) {
        self.buf.extend_from_slice(&val.to_le_bytes());
    }

    /// Length-prefixed (u32) byte blob
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), SaveError> {
        let len = u32::try_from(data.len())
            .map_err(|_| SaveError::Corrupted(format!("blob too large: {} bytes", data.len())))?;
        self.write_u32(len);
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Length-prefixed UTF-8 string
    pub fn write_str(&mut self, s: &str) -> Result<(), SaveError> {
        self.write_bytes(s.as_bytes())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequential little-endian reader over a byte slice
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SaveError> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let bytes = &self.data[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(SaveError::Corrupted(format!(
                "unexpected end of data: wanted {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.data.len()
            ))),
        }
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], SaveError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, SaveError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, SaveError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(SaveError::Corrupted(format!("invalid bool byte {}", other))),
        }
    }

    pub fn read_i32(&mut self) -> Result<i32, SaveError> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, SaveError> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, SaveError> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, SaveError> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, SaveError> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, SaveError> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, SaveError> {
        let len = self.read_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> Result<String, SaveError> {
        String::from_utf8(self.read_bytes()?)
            .map_err(|e| SaveError::Corrupted(format!("invalid UTF-8 string: {}", e)))
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Entity serialized as a sequence of binary fields
pub trait BinarySave {
    fn reset(&mut self);
    fn read(&mut self, reader: &mut ByteReader<'_>) -> Result<(), SaveError>;
    fn write(&self, writer: &mut ByteWriter) -> Result<(), SaveError>;
}

pub(crate) fn encode_binary<T: BinarySave + ?Sized>(entity: &T) -> Result<Vec<u8>, SaveError> {
    let mut writer = ByteWriter::new();
    entity.write(&mut writer)?;
    Ok(writer.into_inner())
}

pub(crate) fn decode_binary<T: BinarySave + ?Sized>(
    entity: &mut T,
    data: &[u8],
) -> Result<(), SaveError> {
    entity.read(&mut ByteReader::new(data))
}

// ============================================================
// Text form
// ============================================================

/// Writes `name: value` lines
#[derive(Debug, Default)]
pub struct LineWriter {
    text: String,
}

impl LineWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_field(&mut self, name: &str, value: impl Display) {
        use std::fmt::Write;
        // Writing into a String cannot fail
        let _ = writeln!(self.text, "{}: {}", name, value);
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Entity serialized as `name: value` lines
pub trait TextSave {
    fn reset(&mut self);
    fn read(&mut self, text: &str) -> Result<(), SaveError>;
    fn write(&self, writer: &mut LineWriter) -> Result<(), SaveError>;
}

pub(crate) fn encode_text<T: TextSave + ?Sized>(entity: &T) -> Result<Vec<u8>, SaveError> {
    let mut writer = LineWriter::new();
    entity.write(&mut writer)?;
    Ok(writer.into_string().into_bytes())
}

pub(crate) fn decode_text<T: TextSave + ?Sized>(
    entity: &mut T,
    data: &[u8],
) -> Result<(), SaveError> {
    let text = std::str::from_utf8(data)
        .map_err(|e| SaveError::Corrupted(format!("text save is not UTF-8: {}", e)))?;
    entity.read(text)
}

/// Splits persisted text into trimmed `(name, value)` pairs.
///
/// Accepts `name: value` and `name:value`, with `\n` or `\r\n` line endings.
/// Blank lines are skipped.
pub fn parse_text_fields(text: &str) -> Result<Vec<(&str, &str)>, SaveError> {
    let mut fields = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) => fields.push((name.trim(), value.trim())),
            None => {
                return Err(SaveError::Corrupted(format!(
                    "line {} has no ':' separator: {:?}",
                    index + 1,
                    line
                )));
            }
        }
    }
    Ok(fields)
}

// ============================================================
// Adapters
// ============================================================

/// Makes a `BinarySave` usable with the manager
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Binary<T>(pub T);

impl<T: BinarySave> Save for Binary<T> {
    fn reset(&mut self) {
        self.0.reset();
    }

    fn to_bytes(&self) -> Result<Vec<u8>, SaveError> {
        encode_binary(&self.0)
    }

    fn from_bytes(&mut self, data: &[u8]) -> Result<(), SaveError> {
        decode_binary(&mut self.0, data)
    }
}

impl<T> Deref for Binary<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Binary<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// Makes a `TextSave` usable with the manager
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Text<T>(pub T);

impl<T: TextSave> Save for Text<T> {
    fn reset(&mut self) {
        self.0.reset();
    }

    fn to_bytes(&self) -> Result<Vec<u8>, SaveError> {
        encode_text(&self.0)
    }

    fn from_bytes(&mut self, data: &[u8]) -> Result<(), SaveError> {
        decode_text(&mut self.0, data)
    }
}

impl<T> Deref for Text<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Text<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}
