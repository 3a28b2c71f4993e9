//! State values
//!
//! Values carry the actual configuration of a module and mirror the shape of
//! its state fields. Matching values to fields is up to the application.
//!
//! Wire layout:
//! ```text
//! type(1) | name(16, padded) | payload
//!   int:         width(1) value(width)
//!   table-entry: entry(2) count(2) value*count
//! ```

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use super::state_field::{IntWidth, FIELD_NAME_LEN};
use super::wire::{Wire, WireRead, WireWrite, MAX_NESTING_DEPTH};
use super::{CodecError, CodecResult};

/// An integer value of one of the two legal widths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntValue {
    U32(u32),
    U64(u64),
}

impl IntValue {
    pub fn width(&self) -> IntWidth {
        match self {
            IntValue::U32(_) => IntWidth::U32,
            IntValue::U64(_) => IntWidth::U64,
        }
    }

    pub fn as_u64(&self) -> u64 {
        match *self {
            IntValue::U32(v) => v as u64,
            IntValue::U64(v) => v,
        }
    }
}

/// Variant payload of a state value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueKind {
    Int { value: IntValue },
    TableEntry { entry: u16, values: Vec<StateValue> },
}

impl ValueKind {
    pub const TYPE_INT: u8 = 1;
    pub const TYPE_TABLE_ENTRY: u8 = 2;

    pub fn discriminant(&self) -> u8 {
        match self {
            ValueKind::Int { .. } => Self::TYPE_INT,
            ValueKind::TableEntry { .. } => Self::TYPE_TABLE_ENTRY,
        }
    }
}

/// A named configuration value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateValue {
    pub name: String,
    pub kind: ValueKind,
}

impl StateValue {
    pub fn int(name: &str, value: IntValue) -> Self {
        Self {
            name: name.to_string(),
            kind: ValueKind::Int { value },
        }
    }

    pub fn u32(name: &str, value: u32) -> Self {
        Self::int(name, IntValue::U32(value))
    }

    pub fn u64(name: &str, value: u64) -> Self {
        Self::int(name, IntValue::U64(value))
    }

    /// One row of a table field
    pub fn table_entry(name: &str, entry: u16, values: Vec<StateValue>) -> Self {
        Self {
            name: name.to_string(),
            kind: ValueKind::TableEntry { entry, values },
        }
    }
}

impl Wire for StateValue {
    fn encoded_len(&self) -> usize {
        let payload = match &self.kind {
            ValueKind::Int { value } => 1 + value.width().bytes() as usize,
            ValueKind::TableEntry { values, .. } => {
                2 + 2 + values.iter().map(Wire::encoded_len).sum::<usize>()
            }
        };
        1 + FIELD_NAME_LEN + payload
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.kind.discriminant());
        buf.write_fixed_str(&self.name, FIELD_NAME_LEN);

        match &self.kind {
            ValueKind::Int { value } => {
                buf.put_u8(value.width().bytes());
                match *value {
                    IntValue::U32(v) => buf.put_u32(v),
                    IntValue::U64(v) => buf.put_u64(v),
                }
            }
            ValueKind::TableEntry { entry, values } => {
                buf.put_u16(*entry);
                buf.write_count(values.len());
                for value in values {
                    value.encode(buf);
                }
            }
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> CodecResult<Self> {
        Self::decode_nested(buf, 0)
    }
}

impl StateValue {
    /// Decode a value sitting `depth` table entries below the top level
    fn decode_nested<B: Buf>(buf: &mut B, depth: usize) -> CodecResult<Self> {
        let discriminant = buf.read_u8("state value type")?;
        if discriminant != ValueKind::TYPE_INT && discriminant != ValueKind::TYPE_TABLE_ENTRY {
            return Err(CodecError::UnknownVariant {
                union: "state value",
                code: discriminant,
            });
        }
        let name = buf.read_fixed_str(FIELD_NAME_LEN, "state value name")?;

        let kind = if discriminant == ValueKind::TYPE_INT {
            let width = buf.read_u8("int value width")?;
            let value = match IntWidth::from_bytes(width) {
                Some(IntWidth::U32) => IntValue::U32(buf.read_u32("int value")?),
                Some(IntWidth::U64) => IntValue::U64(buf.read_u64("int value")?),
                None => {
                    return Err(CodecError::malformed(
                        "int value width",
                        format!("unsupported width {}", width),
                    ))
                }
            };
            ValueKind::Int { value }
        } else {
            if depth >= MAX_NESTING_DEPTH {
                return Err(CodecError::malformed(
                    "table entry",
                    format!("nested deeper than {} levels", MAX_NESTING_DEPTH),
                ));
            }
            let entry = buf.read_u16("table entry index")?;
            let count = buf.read_u16("table entry value count")?;
            let values = (0..count)
                .map(|_| StateValue::decode_nested(buf, depth + 1))
                .collect::<CodecResult<Vec<_>>>()?;
            ValueKind::TableEntry { entry, values }
        };

        Ok(Self { name, kind })
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ValueKind::Int { value } => {
                let v = value.as_u64();
                write!(f, "{}={} ({:#x})", self.name, v, v)
            }
            ValueKind::TableEntry { entry, values } => {
                write!(f, "{}[{}]={{", self.name, entry)?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_row(entry: u16) -> StateValue {
        StateValue::table_entry(
            "routes",
            entry,
            vec![
                StateValue::u32("prefix", 0x0A00_0000 + entry as u32),
                StateValue::u64("mac", 0x0000_0011_2233_4455),
                StateValue::u32("mode", 1),
            ],
        )
    }

    fn assert_roundtrip(value: &StateValue) {
        let bytes = value.to_bytes();
        assert_eq!(bytes.len(), value.encoded_len());

        let (decoded, consumed) = StateValue::decode_prefix(&bytes).unwrap();
        assert_eq!(&decoded, value);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_int_layout() {
        let bytes = StateValue::u32("ttl", 64).to_bytes();
        assert_eq!(bytes.len(), 1 + 16 + 1 + 4);
        assert_eq!(bytes[0], ValueKind::TYPE_INT);
        assert_eq!(&bytes[1..4], b"ttl");
        assert_eq!(&bytes[17..], &[4, 0, 0, 0, 64]);

        let bytes = StateValue::u64("mac", 0x0102_0304_0506_0708).to_bytes();
        assert_eq!(&bytes[17..], &[8, 1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_roundtrip_every_variant() {
        assert_roundtrip(&StateValue::u32("ttl", u32::MAX));
        assert_roundtrip(&StateValue::u64("counter", u64::MAX));
        assert_roundtrip(&route_row(3));
        assert_roundtrip(&StateValue::table_entry("empty", 0, vec![]));
    }

    #[test]
    fn test_nested_entries() {
        let vlan = StateValue::table_entry(
            "vlans",
            12,
            vec![StateValue::u32("vlan", 100), route_row(0), route_row(1)],
        );
        assert_roundtrip(&vlan);
        assert_roundtrip(&StateValue::table_entry("outer", 1, vec![vlan.clone(), vlan]));
    }

    #[test]
    fn test_unsupported_width() {
        for width in [0u8, 1, 2, 3, 5, 16] {
            let mut bytes = StateValue::u32("ttl", 64).to_bytes();
            bytes[17] = width;
            let err = StateValue::decode_prefix(&bytes).unwrap_err();
            assert!(err.is_format_error(), "width {}: {:?}", width, err);
        }
    }

    #[test]
    fn test_unknown_discriminant() {
        for code in [0u8, 3, 0xFF] {
            let mut bytes = StateValue::u32("ttl", 64).to_bytes();
            bytes[0] = code;
            assert_eq!(
                StateValue::decode_prefix(&bytes).unwrap_err(),
                CodecError::UnknownVariant {
                    union: "state value",
                    code,
                }
            );
        }

        let mut bytes = route_row(0).to_bytes();
        bytes[1 + 16 + 4] = 7;
        assert!(matches!(
            StateValue::decode_prefix(&bytes),
            Err(CodecError::UnknownVariant { code: 7, .. })
        ));
    }

    #[test]
    fn test_truncated() {
        for value in [StateValue::u32("a", 1), StateValue::u64("b", 2), route_row(9)] {
            let bytes = value.to_bytes();
            for len in 0..bytes.len() {
                let err = StateValue::decode_prefix(&bytes[..len]).unwrap_err();
                assert!(err.is_format_error(), "{} at {}: {:?}", value.name, len, err);
            }
        }
    }

    /// `levels` table entries, each holding the next, around one int leaf
    fn nested_entry_bytes(levels: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for i in 0..levels {
            bytes.push(ValueKind::TYPE_TABLE_ENTRY);
            bytes.extend_from_slice(&[0u8; FIELD_NAME_LEN]);
            bytes.extend_from_slice(&(i as u16).to_be_bytes());
            bytes.extend_from_slice(&1u16.to_be_bytes());
        }
        bytes.extend_from_slice(&StateValue::u32("leaf", 7).to_bytes());
        bytes
    }

    #[test]
    fn test_nesting_limit() {
        let bytes = nested_entry_bytes(MAX_NESTING_DEPTH);
        let (_, consumed) = StateValue::decode_prefix(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());

        let bytes = nested_entry_bytes(MAX_NESTING_DEPTH + 1);
        assert!(matches!(
            StateValue::decode_prefix(&bytes),
            Err(CodecError::Malformed { what: "table entry", .. })
        ));
    }

    #[test]
    fn test_deep_nesting_fails_without_recursing() {
        let bytes = nested_entry_bytes(3000);
        let err = StateValue::decode_prefix(&bytes).unwrap_err();
        assert!(err.is_format_error());
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "do not fit a 16-bit count")]
    fn test_oversized_entry_count() {
        let values = vec![StateValue::u32("v", 0); u16::MAX as usize + 1];
        StateValue::table_entry("big", 0, values).to_bytes();
    }
}
