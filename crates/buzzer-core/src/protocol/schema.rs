//! Declarative binary record schemas and the codec that walks them.
//!
//! A [`Schema`] is a `const` list of typed [`Field`]s.  The codec never builds
//! layouts at runtime: [`decode`] and [`encode`] are pure functions that walk
//! the static field list and move bytes between a buffer and a [`Record`].
//!
//! # Layout rules
//!
//! - All multi-byte integers are little-endian.
//! - Fixed-size byte arrays are copied verbatim.
//! - A `Bool` occupies one byte; any non-zero byte decodes as `true` and
//!   `true` encodes as `0x01`.
//! - A [`FieldKind::RepeatedUntilEnd`] field repeats a nested schema until the
//!   buffer is exhausted.  It may only appear as the last field of an
//!   outermost schema, and it decodes `floor(remaining / element_size)`
//!   elements, never a partial trailing one.
//!
//! ```rust
//! use buzzer_core::protocol::schema::{decode, Field, FieldKind, Schema};
//!
//! const PAIR: Schema = Schema::new(
//!     "pair",
//!     &[Field::new("a", FieldKind::U8), Field::new("b", FieldKind::U16)],
//! );
//!
//! let record = decode(&PAIR, &[0x01, 0x34, 0x12]).unwrap();
//! assert_eq!(record.u16("b").unwrap(), 0x1234);
//! ```

use std::collections::HashSet;

use thiserror::Error;

/// Errors produced while decoding, encoding or validating schemas.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The buffer is shorter than the schema's fixed size.
    #[error("malformed {schema} buffer: need at least {needed} bytes, got {available}")]
    MalformedBuffer {
        schema: &'static str,
        needed: usize,
        available: usize,
    },

    /// A record field is missing or holds a value of the wrong type.
    #[error("{schema}.{field}: expected {expected}")]
    FieldMismatch {
        schema: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    /// A byte does not map to any known enumeration value.
    #[error("{field}: unknown value 0x{value:02X}")]
    UnknownValue { field: &'static str, value: u8 },

    /// A record's stored checksum does not cover its current contents.
    #[error("checksum mismatch: stored 0x{stored:04X}, computed 0x{computed:04X}")]
    ChecksumMismatch { stored: u16, computed: u16 },

    /// The schema itself violates a layout rule.
    #[error("invalid schema {schema}: {reason}")]
    InvalidSchema { schema: &'static str, reason: String },
}

// ── Schema description ────────────────────────────────────────────────────────

/// Primitive or composite type of a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    I8,
    U16,
    U32,
    Bool,
    /// Fixed-length byte array.
    Bytes(usize),
    Nested(&'static Schema),
    /// Homogeneous array of a nested schema, repeated until the buffer ends.
    RepeatedUntilEnd(&'static Schema),
}

impl FieldKind {
    /// Fixed width in bytes.  A repeated field contributes nothing to the
    /// fixed size of its schema.
    pub const fn width(&self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::I8 | FieldKind::Bool => 1,
            FieldKind::U16 => 2,
            FieldKind::U32 => 4,
            FieldKind::Bytes(len) => *len,
            FieldKind::Nested(schema) => schema.size(),
            FieldKind::RepeatedUntilEnd(_) => 0,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            FieldKind::U8 => "u8",
            FieldKind::I8 => "i8",
            FieldKind::U16 => "u16",
            FieldKind::U32 => "u32",
            FieldKind::Bool => "bool",
            FieldKind::Bytes(_) => "byte array of the declared length",
            FieldKind::Nested(_) => "nested record",
            FieldKind::RepeatedUntilEnd(_) => "list of records",
        }
    }
}

/// One named field of a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// An ordered, fixed layout of fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [Field],
}

impl Schema {
    pub const fn new(name: &'static str, fields: &'static [Field]) -> Self {
        Self { name, fields }
    }

    /// Fixed encoded size in bytes (the minimum size for repeated schemas).
    pub const fn size(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            total += self.fields[i].kind.width();
            i += 1;
        }
        total
    }

    /// Byte offset of the top-level field `name`.
    pub fn offset_of(&self, name: &str) -> Option<usize> {
        let mut offset = 0;
        for field in self.fields {
            if field.name == name {
                return Some(offset);
            }
            offset += field.kind.width();
        }
        None
    }

    /// Checks the layout rules listed in the module documentation.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidSchema`] naming the offending schema.
    pub fn validate(&self) -> Result<(), CodecError> {
        self.validate_at(true)
    }

    fn validate_at(&self, outermost: bool) -> Result<(), CodecError> {
        let invalid = |reason: String| CodecError::InvalidSchema {
            schema: self.name,
            reason,
        };

        if self.fields.is_empty() {
            return Err(invalid("schema has no fields".to_string()));
        }

        let mut seen = HashSet::new();
        for (index, field) in self.fields.iter().enumerate() {
            if !seen.insert(field.name) {
                return Err(invalid(format!("duplicate field `{}`", field.name)));
            }
            match field.kind {
                FieldKind::Bytes(0) => {
                    return Err(invalid(format!("`{}` is a zero-length array", field.name)));
                }
                FieldKind::Nested(nested) => nested.validate_at(false)?,
                FieldKind::RepeatedUntilEnd(element) => {
                    if !outermost {
                        return Err(invalid(format!(
                            "`{}` repeats inside a nested record",
                            field.name
                        )));
                    }
                    if index + 1 != self.fields.len() {
                        return Err(invalid(format!("`{}` is not the last field", field.name)));
                    }
                    element.validate_at(false)?;
                    if element.size() == 0 {
                        return Err(invalid(format!("`{}` repeats a zero-size record", field.name)));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ── Decoded values ────────────────────────────────────────────────────────────

/// A decoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    U32(u32),
    Bool(bool),
    Bytes(Vec<u8>),
    Record(Record),
    Records(Vec<Record>),
}

/// Ordered field values produced by [`decode`] or assembled for [`encode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    schema: &'static str,
    fields: Vec<(&'static str, Value)>,
}

impl Record {
    /// Creates an empty record for the schema named `schema`.
    pub fn new(schema: &'static str) -> Self {
        Self {
            schema,
            fields: Vec::new(),
        }
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, name: &'static str, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name`, replacing any previous value.
    pub fn insert(&mut self, name: &'static str, value: Value) {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn schema_name(&self) -> &'static str {
        self.schema
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn u8(&self, name: &'static str) -> Result<u8, CodecError> {
        match self.get(name) {
            Some(Value::U8(v)) => Ok(*v),
            _ => Err(self.mismatch(name, "u8")),
        }
    }

    pub fn i8(&self, name: &'static str) -> Result<i8, CodecError> {
        match self.get(name) {
            Some(Value::I8(v)) => Ok(*v),
            _ => Err(self.mismatch(name, "i8")),
        }
    }

    pub fn u16(&self, name: &'static str) -> Result<u16, CodecError> {
        match self.get(name) {
            Some(Value::U16(v)) => Ok(*v),
            _ => Err(self.mismatch(name, "u16")),
        }
    }

    pub fn u32(&self, name: &'static str) -> Result<u32, CodecError> {
        match self.get(name) {
            Some(Value::U32(v)) => Ok(*v),
            _ => Err(self.mismatch(name, "u32")),
        }
    }

    pub fn bool(&self, name: &'static str) -> Result<bool, CodecError> {
        match self.get(name) {
            Some(Value::Bool(v)) => Ok(*v),
            _ => Err(self.mismatch(name, "bool")),
        }
    }

    /// Reads a byte array field into a fixed-size array.
    pub fn array<const N: usize>(&self, name: &'static str) -> Result<[u8; N], CodecError> {
        match self.get(name) {
            Some(Value::Bytes(bytes)) => bytes
                .as_slice()
                .try_into()
                .map_err(|_| self.mismatch(name, "byte array of the declared length")),
            _ => Err(self.mismatch(name, "byte array")),
        }
    }

    pub fn record(&self, name: &'static str) -> Result<&Record, CodecError> {
        match self.get(name) {
            Some(Value::Record(r)) => Ok(r),
            _ => Err(self.mismatch(name, "nested record")),
        }
    }

    pub fn records(&self, name: &'static str) -> Result<&[Record], CodecError> {
        match self.get(name) {
            Some(Value::Records(rs)) => Ok(rs),
            _ => Err(self.mismatch(name, "list of records")),
        }
    }

    fn mismatch(&self, field: &'static str, expected: &'static str) -> CodecError {
        CodecError::FieldMismatch {
            schema: self.schema,
            field,
            expected,
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes `buffer` according to `schema`.
///
/// Bytes beyond the schema's fixed size are ignored unless the schema ends in
/// a repeated field, which consumes them.
///
/// # Errors
///
/// Returns [`CodecError::MalformedBuffer`] when `buffer` is shorter than
/// [`Schema::size`].
pub fn decode(schema: &Schema, buffer: &[u8]) -> Result<Record, CodecError> {
    let needed = schema.size();
    if buffer.len() < needed {
        return Err(CodecError::MalformedBuffer {
            schema: schema.name,
            needed,
            available: buffer.len(),
        });
    }
    Ok(decode_fields(schema, buffer))
}

/// Decodes as many whole `element` records as fit in `buffer`.
///
/// Never fails: a short or empty buffer yields fewer (or zero) records.
pub fn decode_repeated(element: &Schema, buffer: &[u8]) -> Vec<Record> {
    let size = element.size();
    if size == 0 {
        return Vec::new();
    }
    buffer
        .chunks_exact(size)
        .map(|chunk| decode_fields(element, chunk))
        .collect()
}

/// Encodes `record` according to `schema`.
///
/// For fixed schemas the output is exactly [`Schema::size`] bytes long.
///
/// # Errors
///
/// Returns [`CodecError::FieldMismatch`] if a field is missing or has a value
/// of the wrong type or length.
pub fn encode(schema: &Schema, record: &Record) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(schema.size());
    encode_into(schema, record, &mut buf)?;
    Ok(buf)
}

// ── Field walkers ─────────────────────────────────────────────────────────────

/// Caller guarantees `buffer.len() >= schema.size()`.
fn decode_fields(schema: &Schema, buffer: &[u8]) -> Record {
    let mut record = Record::new(schema.name);
    let mut offset = 0;

    for field in schema.fields {
        let width = field.kind.width();
        let bytes = &buffer[offset..offset + width];
        let value = match field.kind {
            FieldKind::U8 => Value::U8(bytes[0]),
            FieldKind::I8 => Value::I8(bytes[0] as i8),
            FieldKind::Bool => Value::Bool(bytes[0] != 0),
            FieldKind::U16 => Value::U16(u16::from_le_bytes([bytes[0], bytes[1]])),
            FieldKind::U32 => {
                Value::U32(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            FieldKind::Bytes(_) => Value::Bytes(bytes.to_vec()),
            FieldKind::Nested(nested) => Value::Record(decode_fields(nested, bytes)),
            FieldKind::RepeatedUntilEnd(element) => {
                Value::Records(decode_repeated(element, &buffer[offset..]))
            }
        };
        record.fields.push((field.name, value));
        offset += width;
    }

    record
}

fn encode_into(schema: &Schema, record: &Record, buf: &mut Vec<u8>) -> Result<(), CodecError> {
    for field in schema.fields {
        let mismatch = || CodecError::FieldMismatch {
            schema: schema.name,
            field: field.name,
            expected: field.kind.describe(),
        };
        let value = record.get(field.name).ok_or_else(mismatch)?;

        match (field.kind, value) {
            (FieldKind::U8, Value::U8(v)) => buf.push(*v),
            (FieldKind::I8, Value::I8(v)) => buf.push(*v as u8),
            (FieldKind::Bool, Value::Bool(v)) => buf.push(u8::from(*v)),
            (FieldKind::U16, Value::U16(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (FieldKind::U32, Value::U32(v)) => buf.extend_from_slice(&v.to_le_bytes()),
            (FieldKind::Bytes(len), Value::Bytes(bytes)) if bytes.len() == len => {
                buf.extend_from_slice(bytes);
            }
            (FieldKind::Nested(nested), Value::Record(inner)) => encode_into(nested, inner, buf)?,
            (FieldKind::RepeatedUntilEnd(element), Value::Records(items)) => {
                for item in items {
                    encode_into(element, item, buf)?;
                }
            }
            _ => return Err(mismatch()),
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
