//! State field descriptors
//!
//! A state field describes one configurable value a module exposes. Fields
//! form a tree: a table field carries the descriptors of one row, and those
//! may themselves be tables.
//!
//! Wire layout:
//! ```text
//! type(1) | name(16, padded) | desc_len(1) desc(desc_len) | read_only(1) | payload
//!   int:        width(1) display(1)
//!   int-choice: width(1) display(1) count(2) [value(4) label(40)]*count
//!   table:      depth(2) count(2) field*count
//! ```

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use super::wire::{prefixed_len, Wire, WireRead, WireWrite, MAX_NESTING_DEPTH};
use super::{CodecError, CodecResult};

/// Width of a fixed-size field name on the wire
pub const FIELD_NAME_LEN: usize = 16;

/// Integer width in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntWidth {
    U32 = 4,
    U64 = 8,
}

impl IntWidth {
    pub fn bytes(self) -> u8 {
        self as u8
    }

    pub fn from_bytes(width: u8) -> Option<Self> {
        match width {
            4 => Some(IntWidth::U32),
            8 => Some(IntWidth::U64),
            _ => None,
        }
    }
}

/// How the GUI should render an integer field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IntDisplay {
    Int = 1,
    Ip = 2,
    Mac = 3,
    Bool = 4,
    Choice = 5,
}

impl IntDisplay {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(IntDisplay::Int),
            2 => Some(IntDisplay::Ip),
            3 => Some(IntDisplay::Mac),
            4 => Some(IntDisplay::Bool),
            5 => Some(IntDisplay::Choice),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IntDisplay::Int => "int",
            IntDisplay::Ip => "IP",
            IntDisplay::Mac => "MAC",
            IntDisplay::Bool => "boolean",
            IntDisplay::Choice => "choice",
        }
    }
}

/// One selectable value of an integer-choice field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: u32,
    pub label: String,
}

impl Choice {
    pub const LABEL_LEN: usize = 40;
    pub const SIZE: usize = 4 + Self::LABEL_LEN;
}

/// Variant payload of a state field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Int { width: IntWidth, display: IntDisplay },
    IntChoice { choices: Vec<Choice> },
    Table { depth: u16, fields: Vec<StateField> },
}

impl FieldKind {
    pub const TYPE_INT: u8 = 1;
    pub const TYPE_INT_CHOICE: u8 = 2;
    pub const TYPE_TABLE: u8 = 3;

    pub fn discriminant(&self) -> u8 {
        match self {
            FieldKind::Int { .. } => Self::TYPE_INT,
            FieldKind::IntChoice { .. } => Self::TYPE_INT_CHOICE,
            FieldKind::Table { .. } => Self::TYPE_TABLE,
        }
    }
}

/// Descriptor of a configurable module value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateField {
    pub name: String,
    pub desc: String,
    pub read_only: bool,
    pub kind: FieldKind,
}

impl StateField {
    pub fn int(name: &str, desc: &str, read_only: bool, width: IntWidth, display: IntDisplay) -> Self {
        Self::with_kind(name, desc, read_only, FieldKind::Int { width, display })
    }

    pub fn choice(name: &str, desc: &str, read_only: bool, choices: Vec<(u32, String)>) -> Self {
        let choices = choices
            .into_iter()
            .map(|(value, label)| Choice { value, label })
            .collect();
        Self::with_kind(name, desc, read_only, FieldKind::IntChoice { choices })
    }

    pub fn table(name: &str, desc: &str, read_only: bool, depth: u16, fields: Vec<StateField>) -> Self {
        Self::with_kind(name, desc, read_only, FieldKind::Table { depth, fields })
    }

    fn with_kind(name: &str, desc: &str, read_only: bool, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            desc: desc.to_string(),
            read_only,
            kind,
        }
    }

    fn header_len(&self) -> usize {
        1 + FIELD_NAME_LEN + prefixed_len(&self.desc) + 1
    }
}

impl Wire for StateField {
    fn encoded_len(&self) -> usize {
        let payload = match &self.kind {
            FieldKind::Int { .. } => 2,
            FieldKind::IntChoice { choices } => 2 + 2 + choices.len() * Choice::SIZE,
            FieldKind::Table { fields, .. } => {
                2 + 2 + fields.iter().map(Wire::encoded_len).sum::<usize>()
            }
        };
        self.header_len() + payload
    }

    fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.kind.discriminant());
        buf.write_fixed_str(&self.name, FIELD_NAME_LEN);
        buf.write_prefixed_str(&self.desc);
        buf.put_u8(self.read_only as u8);

        match &self.kind {
            FieldKind::Int { width, display } => {
                buf.put_u8(width.bytes());
                buf.put_u8(*display as u8);
            }
            FieldKind::IntChoice { choices } => {
                // Laid out as a refinement of an int field
                buf.put_u8(IntWidth::U32.bytes());
                buf.put_u8(IntDisplay::Choice as u8);
                buf.write_count(choices.len());
                for choice in choices {
                    buf.put_u32(choice.value);
                    buf.write_fixed_str(&choice.label, Choice::LABEL_LEN);
                }
            }
            FieldKind::Table { depth, fields } => {
                buf.put_u16(*depth);
                buf.write_count(fields.len());
                for field in fields {
                    field.encode(buf);
                }
            }
        }
    }

    fn decode<B: Buf>(buf: &mut B) -> CodecResult<Self> {
        Self::decode_nested(buf, 0)
    }
}

impl StateField {
    /// Decode a field sitting `depth` tables below the top level
    fn decode_nested<B: Buf>(buf: &mut B, depth: usize) -> CodecResult<Self> {
        let discriminant = buf.read_u8("state field type")?;
        if !(FieldKind::TYPE_INT..=FieldKind::TYPE_TABLE).contains(&discriminant) {
            return Err(CodecError::UnknownVariant {
                union: "state field",
                code: discriminant,
            });
        }
        let name = buf.read_fixed_str(FIELD_NAME_LEN, "state field name")?;
        let desc = buf.read_prefixed_str("state field description")?;
        let read_only = buf.read_bool("state field read-only flag")?;

        let kind = match discriminant {
            FieldKind::TYPE_INT => {
                let width = buf.read_u8("int field width")?;
                let width = IntWidth::from_bytes(width).ok_or_else(|| {
                    CodecError::malformed("int field width", format!("unsupported width {}", width))
                })?;
                let display = buf.read_u8("int field display")?;
                let display = IntDisplay::from_code(display).ok_or_else(|| {
                    CodecError::malformed("int field display", format!("unknown display code {}", display))
                })?;
                FieldKind::Int { width, display }
            }
            FieldKind::TYPE_INT_CHOICE => {
                buf.ensure(2, "int-choice width/display")?;
                buf.advance(2);
                let count = buf.read_u16("choice count")?;
                let mut choices = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let value = buf.read_u32("choice value")?;
                    let label = buf.read_fixed_str(Choice::LABEL_LEN, "choice label")?;
                    choices.push(Choice { value, label });
                }
                FieldKind::IntChoice { choices }
            }
            _ => {
                if depth >= MAX_NESTING_DEPTH {
                    return Err(CodecError::malformed(
                        "table field",
                        format!("nested deeper than {} levels", MAX_NESTING_DEPTH),
                    ));
                }
                let table_depth = buf.read_u16("table depth")?;
                let count = buf.read_u16("table field count")?;
                let fields = (0..count)
                    .map(|_| StateField::decode_nested(buf, depth + 1))
                    .collect::<CodecResult<Vec<_>>>()?;
                FieldKind::Table {
                    depth: table_depth,
                    fields,
                }
            }
        };

        Ok(Self {
            name,
            desc,
            read_only,
            kind,
        })
    }
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.name, self.desc)?;
        if self.read_only {
            write!(f, " (read-only)")?;
        }
        match &self.kind {
            FieldKind::Int { width, display } => {
                write!(f, " int width={} display={}", width.bytes(), display.name())
            }
            FieldKind::IntChoice { choices } => {
                write!(f, " choices=[")?;
                for (i, choice) in choices.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}:'{}'", choice.value, choice.label)?;
                }
                write!(f, "]")
            }
            FieldKind::Table { depth, fields } => {
                write!(f, " table depth={} fields=[", depth)?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_field() -> StateField {
        StateField::int("ttl", "Initial TTL", false, IntWidth::U32, IntDisplay::Int)
    }

    fn choice_field() -> StateField {
        StateField::choice(
            "mode",
            "Forwarding mode",
            false,
            vec![(0, "drop".to_string()), (1, "forward".to_string()), (7, "mirror".to_string())],
        )
    }

    fn route_table() -> StateField {
        StateField::table(
            "routes",
            "IPv4 routes",
            false,
            32,
            vec![
                StateField::int("prefix", "", false, IntWidth::U32, IntDisplay::Ip),
                StateField::int("mac", "Next hop MAC", false, IntWidth::U64, IntDisplay::Mac),
                choice_field(),
            ],
        )
    }

    fn nested_table() -> StateField {
        StateField::table(
            "vlans",
            "Per-VLAN routing",
            true,
            4,
            vec![
                StateField::int("vlan", "", true, IntWidth::U32, IntDisplay::Int),
                route_table(),
            ],
        )
    }

    fn assert_roundtrip(field: &StateField) {
        let bytes = field.to_bytes();
        assert_eq!(bytes.len(), field.encoded_len());

        let (decoded, consumed) = StateField::decode_prefix(&bytes).unwrap();
        assert_eq!(&decoded, field);
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded.encoded_len(), consumed);
    }

    #[test]
    fn test_int_layout() {
        let bytes = int_field().to_bytes();
        assert_eq!(bytes[0], FieldKind::TYPE_INT);
        assert_eq!(&bytes[1..4], b"ttl");
        assert_eq!(bytes[17], 12);
        assert_eq!(&bytes[18..30], b"Initial TTL\0");
        assert_eq!(&bytes[30..], &[0, 4, IntDisplay::Int as u8]);
    }

    #[test]
    fn test_roundtrip_every_variant() {
        assert_roundtrip(&int_field());
        assert_roundtrip(&StateField::int("flag", "", true, IntWidth::U32, IntDisplay::Bool));
        assert_roundtrip(&choice_field());
        assert_roundtrip(&StateField::choice("empty", "", false, vec![]));
        assert_roundtrip(&route_table());
        assert_roundtrip(&StateField::table("none", "", false, 0, vec![]));
    }

    #[test]
    fn test_choice_layout() {
        let field = choice_field();
        let bytes = field.to_bytes();
        assert_eq!(bytes.len(), 1 + 16 + 17 + 1 + 2 + 2 + 3 * 44);
        let payload = &bytes[35..];
        assert_eq!(&payload[..4], &[4, IntDisplay::Choice as u8, 0, 3]);
        assert_eq!(&payload[4..8], &[0, 0, 0, 0]);
        assert_eq!(&payload[8..12], b"drop");
    }

    #[test]
    fn test_choice_ignores_width_and_display() {
        let mut bytes = choice_field().to_bytes();
        bytes[35] = 0xEE;
        bytes[36] = 0xEE;
        let (decoded, _) = StateField::decode_prefix(&bytes).unwrap();
        assert_eq!(decoded, choice_field());
    }

    #[test]
    fn test_nested_tables() {
        assert_roundtrip(&nested_table());

        let outer = StateField::table("outer", "", false, 2, vec![nested_table(), int_field()]);
        assert_roundtrip(&outer);

        let (decoded, _) = StateField::decode_prefix(&outer.to_bytes()).unwrap();
        let FieldKind::Table { fields, .. } = &decoded.kind else {
            panic!("expected table");
        };
        let FieldKind::Table { fields: inner, .. } = &fields[0].kind else {
            panic!("expected nested table");
        };
        assert!(matches!(inner[1].kind, FieldKind::Table { depth: 32, .. }));
    }

    #[test]
    fn test_sibling_boundaries() {
        let fields = vec![route_table(), int_field(), choice_field(), nested_table()];
        let mut bytes = bytes::BytesMut::new();
        for field in &fields {
            field.encode(&mut bytes);
        }

        let mut offset = 0;
        let mut decoded = Vec::new();
        while offset < bytes.len() {
            let (field, consumed) = StateField::decode_prefix(&bytes[offset..]).unwrap();
            assert_eq!(consumed, field.encoded_len());
            offset += consumed;
            decoded.push(field);
        }
        assert_eq!(decoded, fields);
    }

    #[test]
    fn test_unknown_discriminant() {
        for code in [0u8, 4, 0x7F, 0xFF] {
            let mut bytes = int_field().to_bytes();
            bytes[0] = code;
            assert_eq!(
                StateField::decode_prefix(&bytes).unwrap_err(),
                CodecError::UnknownVariant {
                    union: "state field",
                    code,
                }
            );
        }
    }

    #[test]
    fn test_unknown_discriminant_alone() {
        assert!(matches!(
            StateField::decode_prefix(&[0x04]),
            Err(CodecError::UnknownVariant { code: 4, .. })
        ));
    }

    #[test]
    fn test_unknown_discriminant_in_table() {
        let table = StateField::table("t", "", false, 1, vec![int_field()]);
        let mut bytes = table.to_bytes();
        let nested_start = table.encoded_len() - int_field().encoded_len();
        bytes[nested_start] = 9;
        assert!(matches!(
            StateField::decode_prefix(&bytes),
            Err(CodecError::UnknownVariant { code: 9, .. })
        ));
    }

    #[test]
    fn test_invalid_int_width_and_display() {
        let mut bytes = int_field().to_bytes();
        bytes[31] = 2;
        assert!(StateField::decode_prefix(&bytes).unwrap_err().is_format_error());

        let mut bytes = int_field().to_bytes();
        bytes[32] = 0;
        assert!(StateField::decode_prefix(&bytes).unwrap_err().is_format_error());
    }

    #[test]
    fn test_truncated() {
        for field in [int_field(), choice_field(), nested_table()] {
            let bytes = field.to_bytes();
            for len in 0..bytes.len() {
                let err = StateField::decode_prefix(&bytes[..len]).unwrap_err();
                assert!(err.is_format_error(), "{} at {}: {:?}", field.name, len, err);
            }
        }
    }

    /// `levels` tables, each holding the next, around one int field
    fn nested_table_bytes(levels: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for _ in 0..levels {
            bytes.push(FieldKind::TYPE_TABLE);
            bytes.extend_from_slice(&[0u8; FIELD_NAME_LEN]);
            bytes.extend_from_slice(&[1, 0]);
            bytes.push(0);
            bytes.extend_from_slice(&8u16.to_be_bytes());
            bytes.extend_from_slice(&1u16.to_be_bytes());
        }
        bytes.extend_from_slice(&int_field().to_bytes());
        bytes
    }

    #[test]
    fn test_nesting_limit() {
        let bytes = nested_table_bytes(MAX_NESTING_DEPTH);
        let (_, consumed) = StateField::decode_prefix(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());

        let bytes = nested_table_bytes(MAX_NESTING_DEPTH + 1);
        assert!(matches!(
            StateField::decode_prefix(&bytes),
            Err(CodecError::Malformed { what: "table field", .. })
        ));

        let bytes = nested_table_bytes(2500);
        assert!(StateField::decode_prefix(&bytes).unwrap_err().is_format_error());
    }
}
