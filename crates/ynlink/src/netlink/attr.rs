//! Netlink attribute (nlattr) handling: the TLV header, leaf value codecs,
//! and the attribute-set encode/decode loop.
//!
//! Every attribute on the wire is a 4-byte header (`nla_len`, `nla_type`)
//! followed by `nla_len - 4` payload bytes and padding up to a 4-byte
//! boundary. The padding is excluded from `nla_len`. Attribute sets are
//! data-driven: a set is a table of [`AttributeDef`] descriptors keyed both
//! by numeric tag and by symbolic name, built once per family and shared
//! read-only.

use std::collections::HashMap;
use std::sync::Arc;

use super::codec::{ByteOrder, Decoder, Encoder};
use super::error::{Error, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Netlink attribute alignment.
pub const NLA_ALIGNTO: usize = 4;

/// Align a length to NLA_ALIGNTO boundary.
#[inline]
pub const fn nla_align(len: usize) -> usize {
    (len + NLA_ALIGNTO - 1) & !(NLA_ALIGNTO - 1)
}

/// Size of the attribute header.
pub const NLA_HDRLEN: usize = 4;

/// Netlink attribute header (mirrors struct nlattr / struct rtattr).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct NlAttr {
    /// Length including header, excluding padding.
    pub nla_len: u16,
    /// Attribute type.
    pub nla_type: u16,
}

impl NlAttr {
    /// Create a new attribute header.
    pub fn new(attr_type: u16, data_len: usize) -> Self {
        Self {
            nla_len: (NLA_HDRLEN + data_len) as u16,
            nla_type: attr_type,
        }
    }

    /// Get the payload length (total length minus header).
    ///
    /// Fails if the declared length does not cover the header itself.
    pub fn payload_len(&self) -> Result<usize> {
        (self.nla_len as usize)
            .checked_sub(NLA_HDRLEN)
            .ok_or_else(|| {
                Error::InvalidMessage(format!("declared attribute length {} too short", self.nla_len))
            })
    }

    /// Convert to bytes.
    pub fn as_bytes(&self) -> &[u8] {
        <Self as IntoBytes>::as_bytes(self)
    }

    /// Decode a header from the cursor, self-aligning to 4 bytes.
    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let bytes = dec.bytes(std::mem::size_of::<Self>())?;
        let attr = Self::read_from_bytes(bytes)
            .map_err(|_| Error::InvalidMessage("malformed attribute header".into()))?;
        dec.align_to(NLA_ALIGNTO)?;
        Ok(attr)
    }

    /// Encode the header to the cursor, self-aligning to 4 bytes.
    pub fn encode(&self, enc: &mut Encoder) {
        enc.put_bytes(self.as_bytes());
        enc.align_to(NLA_ALIGNTO);
    }
}

/// Fixed-width scalar kinds an attribute or struct member can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    U8,
    S8,
    U16,
    S16,
    U32,
    S32,
    U64,
    S64,
}

impl ScalarType {
    /// Width of the scalar in bytes.
    pub fn width(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::U32 | Self::S32 => 4,
            Self::U64 | Self::S64 => 8,
        }
    }

    fn range(self) -> (i128, i128) {
        match self {
            Self::U8 => (0, u8::MAX as i128),
            Self::S8 => (i8::MIN as i128, i8::MAX as i128),
            Self::U16 => (0, u16::MAX as i128),
            Self::S16 => (i16::MIN as i128, i16::MAX as i128),
            Self::U32 => (0, u32::MAX as i128),
            Self::S32 => (i32::MIN as i128, i32::MAX as i128),
            Self::U64 => (0, u64::MAX as i128),
            Self::S64 => (i64::MIN as i128, i64::MAX as i128),
        }
    }
}

/// A decoded attribute or header-member value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    String(String),
    Bytes(Vec<u8>),
    Nested(Vec<Attribute>),
}

impl Value {
    /// Widen any integer variant to i128.
    fn to_i128(&self) -> Option<i128> {
        match self {
            Self::U8(v) => Some(*v as i128),
            Self::I8(v) => Some(*v as i128),
            Self::U16(v) => Some(*v as i128),
            Self::I16(v) => Some(*v as i128),
            Self::U32(v) => Some(*v as i128),
            Self::I32(v) => Some(*v as i128),
            Self::U64(v) => Some(*v as i128),
            Self::I64(v) => Some(*v as i128),
            _ => None,
        }
    }

    /// Get the value as u32 if it is an unsigned integer that fits.
    pub fn as_u32(&self) -> Option<u32> {
        self.to_i128().and_then(|v| u32::try_from(v).ok())
    }

    /// Get the value as u64 if it is an integer that fits.
    pub fn as_u64(&self) -> Option<u64> {
        self.to_i128().and_then(|v| u64::try_from(v).ok())
    }

    /// Get the value as i64 if it is an integer that fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.to_i128().and_then(|v| i64::try_from(v).ok())
    }

    /// Get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as raw bytes.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get the value as a nested attribute list.
    pub fn as_nested(&self) -> Option<&[Attribute]> {
        match self {
            Self::Nested(attrs) => Some(attrs),
            _ => None,
        }
    }
}

/// Declared value checks, evaluated on both encode and decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Check {
    /// Minimum numeric value.
    pub min: Option<i64>,
    /// Maximum numeric value.
    pub max: Option<i64>,
    /// Minimum byte length (strings and binary).
    pub min_len: Option<usize>,
    /// Maximum byte length (strings and binary).
    pub max_len: Option<usize>,
}

impl Check {
    /// True if no check is declared.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn check_scalar(&self, name: &str, value: i128) -> Result<()> {
        if let Some(min) = self.min
            && value < min as i128
        {
            return Err(Error::Validation {
                name: name.into(),
                reason: format!("{} is below minimum {}", value, min),
            });
        }
        if let Some(max) = self.max
            && value > max as i128
        {
            return Err(Error::Validation {
                name: name.into(),
                reason: format!("{} is above maximum {}", value, max),
            });
        }
        Ok(())
    }

    fn check_len(&self, name: &str, len: usize) -> Result<()> {
        if let Some(min) = self.min_len
            && len < min
        {
            return Err(Error::Validation {
                name: name.into(),
                reason: format!("length {} is below minimum {}", len, min),
            });
        }
        if let Some(max) = self.max_len
            && len > max
        {
            return Err(Error::Validation {
                name: name.into(),
                reason: format!("length {} is above maximum {}", len, max),
            });
        }
        Ok(())
    }
}

/// Codec for a fixed-width scalar with a declared byte order.
#[derive(Debug, Clone, Copy)]
pub struct ScalarCodec {
    /// Scalar width and signedness.
    pub ty: ScalarType,
    /// Declared byte order of the payload.
    pub order: ByteOrder,
    /// Declared value checks.
    pub check: Check,
}

impl ScalarCodec {
    /// Create a codec with no checks.
    pub fn new(ty: ScalarType, order: ByteOrder) -> Self {
        Self {
            ty,
            order,
            check: Check::default(),
        }
    }

    /// Encode an integer value, checking range and declared bounds.
    pub fn encode(&self, name: &str, enc: &mut Encoder, value: &Value) -> Result<()> {
        let v = value.to_i128().ok_or_else(|| Error::Validation {
            name: name.into(),
            reason: format!("expected an integer, got {:?}", value),
        })?;
        let (lo, hi) = self.ty.range();
        if v < lo || v > hi {
            return Err(Error::Validation {
                name: name.into(),
                reason: format!("{} does not fit {:?}", v, self.ty),
            });
        }
        self.check.check_scalar(name, v)?;
        match self.ty {
            ScalarType::U8 => enc.put_u8(v as u8),
            ScalarType::S8 => enc.put_i8(v as i8),
            ScalarType::U16 => enc.put_u16(v as u16, self.order),
            ScalarType::S16 => enc.put_i16(v as i16, self.order),
            ScalarType::U32 => enc.put_u32(v as u32, self.order),
            ScalarType::S32 => enc.put_i32(v as i32, self.order),
            ScalarType::U64 => enc.put_u64(v as u64, self.order),
            ScalarType::S64 => enc.put_i64(v as i64, self.order),
        }
        Ok(())
    }

    /// Decode exactly the declared width, checking declared bounds.
    pub fn decode(&self, name: &str, dec: &mut Decoder<'_>) -> Result<Value> {
        let value = match self.ty {
            ScalarType::U8 => Value::U8(dec.u8()?),
            ScalarType::S8 => Value::I8(dec.i8()?),
            ScalarType::U16 => Value::U16(dec.u16(self.order)?),
            ScalarType::S16 => Value::I16(dec.i16(self.order)?),
            ScalarType::U32 => Value::U32(dec.u32(self.order)?),
            ScalarType::S32 => Value::I32(dec.i32(self.order)?),
            ScalarType::U64 => Value::U64(dec.u64(self.order)?),
            ScalarType::S64 => Value::I64(dec.i64(self.order)?),
        };
        if let Some(v) = value.to_i128() {
            self.check.check_scalar(name, v)?;
        }
        Ok(value)
    }
}

/// Leaf codec kinds an attribute can declare.
#[derive(Debug, Clone)]
pub enum DataType {
    /// Fixed-width integer with declared byte order.
    Scalar(ScalarCodec),
    /// NUL-terminated text.
    String {
        /// Declared length checks.
        check: Check,
    },
    /// Opaque bytes sized by the enclosing TLV length.
    Binary {
        /// Declared length checks.
        check: Check,
    },
    /// Payload is itself a TLV sequence from a nested attribute set.
    Nested(Arc<AttributeSetDef>),
}

impl DataType {
    /// Encode a value of this datatype.
    pub fn encode(&self, name: &str, enc: &mut Encoder, value: &Value) -> Result<()> {
        match self {
            Self::Scalar(codec) => codec.encode(name, enc, value),
            Self::String { check } => {
                let s = value.as_str().ok_or_else(|| Error::Validation {
                    name: name.into(),
                    reason: format!("expected a string, got {:?}", value),
                })?;
                check.check_len(name, s.len())?;
                enc.put_zstring(s);
                Ok(())
            }
            Self::Binary { check } => {
                let b = value.as_bytes().ok_or_else(|| Error::Validation {
                    name: name.into(),
                    reason: format!("expected bytes, got {:?}", value),
                })?;
                check.check_len(name, b.len())?;
                enc.put_bytes(b);
                Ok(())
            }
            Self::Nested(set) => {
                let attrs = value.as_nested().ok_or_else(|| Error::Validation {
                    name: name.into(),
                    reason: format!("expected nested attributes, got {:?}", value),
                })?;
                set.encode(enc, attrs)
            }
        }
    }

    /// Decode a value of this datatype from the current sub-limit.
    pub fn decode(&self, name: &str, dec: &mut Decoder<'_>) -> Result<Value> {
        match self {
            Self::Scalar(codec) => codec.decode(name, dec),
            Self::String { check } => {
                let s = dec.zstring(false)?;
                check.check_len(name, s.len())?;
                Ok(Value::String(s.to_string()))
            }
            Self::Binary { check } => {
                let b = dec.rest();
                check.check_len(name, b.len())?;
                Ok(Value::Bytes(b.to_vec()))
            }
            Self::Nested(set) => Ok(Value::Nested(set.decode(dec)?)),
        }
    }
}

/// One declared attribute of a set: name, numeric tag, and leaf codec.
#[derive(Debug)]
pub struct AttributeDef {
    /// Symbolic name within the set.
    pub name: Arc<str>,
    /// Numeric type tag, unique within the set.
    pub tag: u16,
    /// Leaf codec for the payload.
    pub datatype: DataType,
}

/// A decoded attribute instance: its definition plus one value.
#[derive(Debug, Clone)]
pub struct Attribute {
    def: Arc<AttributeDef>,
    value: Value,
}

impl Attribute {
    /// Create an attribute instance.
    pub fn new(def: Arc<AttributeDef>, value: Value) -> Self {
        Self { def, value }
    }

    /// Symbolic name.
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Numeric type tag.
    pub fn tag(&self) -> u16 {
        self.def.tag
    }

    /// Decoded value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the attribute and return its value.
    pub fn into_value(self) -> Value {
        self.value
    }
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.def.tag == other.def.tag
            && self.def.name == other.def.name
            && self.value == other.value
    }
}

/// A declared attribute set: tag and name lookup tables over its attributes.
#[derive(Debug)]
pub struct AttributeSetDef {
    /// Set name.
    pub name: Arc<str>,
    attrs: Vec<Arc<AttributeDef>>,
    by_tag: HashMap<u16, Arc<AttributeDef>>,
    by_name: HashMap<Arc<str>, Arc<AttributeDef>>,
}

impl AttributeSetDef {
    /// Build a set from its attribute definitions.
    pub fn new(name: impl Into<Arc<str>>, defs: Vec<AttributeDef>) -> Self {
        let attrs: Vec<Arc<AttributeDef>> = defs.into_iter().map(Arc::new).collect();
        let by_tag = attrs.iter().map(|a| (a.tag, Arc::clone(a))).collect();
        let by_name = attrs
            .iter()
            .map(|a| (Arc::clone(&a.name), Arc::clone(a)))
            .collect();
        Self {
            name: name.into(),
            attrs,
            by_tag,
            by_name,
        }
    }

    /// Declared attributes, in declaration order.
    pub fn attributes(&self) -> &[Arc<AttributeDef>] {
        &self.attrs
    }

    /// Look up an attribute definition by numeric tag.
    pub fn by_tag(&self, tag: u16) -> Option<&Arc<AttributeDef>> {
        self.by_tag.get(&tag)
    }

    /// Look up an attribute definition by name.
    pub fn by_name(&self, name: &str) -> Option<&Arc<AttributeDef>> {
        self.by_name.get(name)
    }

    /// Check whether the set declares an attribute of this name.
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Decode attributes until the cursor's current limit is exhausted.
    ///
    /// Attributes with an unrecognized tag are skipped silently (forward
    /// compatibility with newer kernels); the relative order of recognized
    /// attributes is preserved. Each TLV must consume exactly its declared
    /// payload length or the decode fails with `SubLimitMismatch`.
    pub fn decode(&self, dec: &mut Decoder<'_>) -> Result<Vec<Attribute>> {
        let mut attrs = Vec::new();
        while dec.remaining() >= NLA_HDRLEN {
            if let Some(attr) = self.decode_one(dec)? {
                attrs.push(attr);
            }
            if dec.remaining() > 0 {
                dec.align_to(NLA_ALIGNTO)?;
            }
        }
        Ok(attrs)
    }

    fn decode_one(&self, dec: &mut Decoder<'_>) -> Result<Option<Attribute>> {
        let header = NlAttr::decode(dec)?;
        let payload_len = header.payload_len()?;
        match self.by_tag(header.nla_type) {
            Some(def) => {
                let value =
                    dec.with_limit(payload_len, |d| def.datatype.decode(&def.name, d))?;
                Ok(Some(Attribute::new(Arc::clone(def), value)))
            }
            None => {
                dec.skip(payload_len)?;
                Ok(None)
            }
        }
    }

    /// Encode attributes as a padded TLV sequence.
    pub fn encode(&self, enc: &mut Encoder, attrs: &[Attribute]) -> Result<()> {
        for attr in attrs {
            enc.measure_u16(|e| {
                NlAttr::new(attr.tag(), 0).encode(e);
                attr.def.datatype.encode(attr.name(), e, attr.value())
            })?;
            enc.align_to(NLA_ALIGNTO);
        }
        Ok(())
    }

    /// Turn named arguments into attribute instances via the name table.
    pub fn build_attributes(&self, args: &[(&str, Value)]) -> Result<Vec<Attribute>> {
        args.iter()
            .map(|(name, value)| {
                let def = self.by_name(name).ok_or_else(|| Error::UnknownAttribute {
                    name: (*name).to_string(),
                })?;
                Ok(Attribute::new(Arc::clone(def), value.clone()))
            })
            .collect()
    }
}
