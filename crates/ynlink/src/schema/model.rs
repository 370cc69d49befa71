//! Schema model: raw name-keyed definition tables and the resolved family.
//!
//! Parsing (see [`super::parser`]) produces a [`RawFamily`] whose type
//! references are plain names. [`RawFamily::resolve`] is an explicit second
//! phase that replaces every name with an `Arc`-shared resolved definition,
//! maintaining a "currently resolving" set per namespace: re-entering a name
//! that is still resolving is a [`Error::CircularDependency`], a name with
//! no definition is an [`Error::UnresolvedReference`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::netlink::attr::{Check, ScalarType};
use crate::netlink::codec::ByteOrder;
use crate::netlink::{Error, Result};

/// Which wire protocol a family speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolKind {
    /// Generic netlink: family id resolved at runtime, genl sub-header.
    #[default]
    Genetlink,
    /// Classic netlink with a fixed protocol number (route, netfilter, ...).
    NetlinkRaw,
}

/// One enum or flags entry with its assigned value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumEntry {
    /// Entry name.
    pub name: String,
    /// Assigned value (for flags, the bit mask).
    pub value: i64,
}

/// A named enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enum {
    /// Enum name.
    pub name: String,
    /// Entries in declaration order.
    pub entries: Vec<EnumEntry>,
}

/// A named flag set (one bit per entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    /// Flags name.
    pub name: String,
    /// Entries in declaration order.
    pub entries: Vec<EnumEntry>,
}

/// A multicast group declared by the family.
///
/// Groups are carried in the model for consumers that manage subscriptions;
/// the engine itself does not subscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McastGroup {
    /// Group name.
    pub name: String,
}

/// Member type of a fixed-header struct.
#[derive(Debug, Clone)]
pub enum MemberType {
    /// Fixed-width integer.
    Scalar {
        /// Width and signedness.
        ty: ScalarType,
        /// Declared byte order.
        order: ByteOrder,
    },
    /// Opaque bytes, optionally typed by another struct.
    Binary {
        /// Referenced struct, if declared.
        struct_ref: Option<Arc<Struct>>,
        /// Declared length in bytes.
        len: Option<usize>,
    },
    /// Padding with a declared length.
    Pad {
        /// Padding length in bytes.
        len: usize,
    },
}

/// One member of a fixed-header struct.
#[derive(Debug, Clone)]
pub struct StructMember {
    /// Member name.
    pub name: String,
    /// Member type.
    pub ty: MemberType,
}

/// A fixed-header struct definition.
#[derive(Debug, Clone)]
pub struct Struct {
    /// Struct name.
    pub name: String,
    /// Members in declaration order.
    pub members: Vec<StructMember>,
}

/// Type of a declared attribute.
#[derive(Debug, Clone)]
pub enum AttrType {
    /// Fixed-width integer.
    Scalar {
        /// Width and signedness.
        ty: ScalarType,
        /// Declared byte order.
        order: ByteOrder,
    },
    /// NUL-terminated text.
    String,
    /// Opaque bytes, optionally typed by a struct.
    Binary {
        /// Referenced struct, if declared.
        struct_ref: Option<Arc<Struct>>,
    },
    /// Nested attribute set.
    Nest(Arc<AttributeSet>),
    /// Padding attribute: occupies a tag, carries no codec.
    Pad,
}

/// One declared attribute.
#[derive(Debug, Clone)]
pub struct SchemaAttribute {
    /// Attribute name.
    pub name: String,
    /// Numeric tag within the set.
    pub value: u16,
    /// Declared type.
    pub ty: AttrType,
    /// Declared value checks.
    pub checks: Check,
}

/// A resolved attribute set.
#[derive(Debug, Clone)]
pub struct AttributeSet {
    /// Set name.
    pub name: String,
    /// Attributes in declaration order.
    pub attributes: Vec<SchemaAttribute>,
}

/// Request/reply message shape declared by an operation mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpMessage {
    /// Numeric message type, when declared at the message level.
    pub value: Option<u16>,
    /// Declared parameter names.
    pub attributes: Vec<String>,
}

/// Request/reply pair for one of `do`/`dump`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestReply {
    /// Request shape.
    pub request: Option<OpMessage>,
    /// Reply shape.
    pub reply: Option<OpMessage>,
}

/// A resolved family operation.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Operation name.
    pub name: String,
    /// Operation-level numeric value (fallback for message values).
    pub value: Option<u16>,
    /// Fixed header, per-operation override or the operations-table default.
    pub fixed_header: Option<Arc<Struct>>,
    /// Attribute set the operation's messages draw from.
    pub attribute_set: Option<Arc<AttributeSet>>,
    /// Single-shot spec.
    pub doit: Option<RequestReply>,
    /// Dump spec.
    pub dumpit: Option<RequestReply>,
}

/// A fully resolved protocol family.
#[derive(Debug, Clone)]
pub struct Family {
    /// Family name.
    pub name: String,
    /// Protocol kind.
    pub protocol: ProtocolKind,
    /// Protocol number, when the document declares one.
    pub protonum: Option<u32>,
    /// Named constants.
    pub consts: HashMap<String, i64>,
    /// Enums by name.
    pub enums: HashMap<String, Enum>,
    /// Flag sets by name.
    pub flags: HashMap<String, Flags>,
    /// Structs by name.
    pub structs: HashMap<String, Arc<Struct>>,
    /// Attribute sets by name.
    pub attribute_sets: HashMap<String, Arc<AttributeSet>>,
    /// Operations in declaration order.
    pub operations: Vec<Operation>,
    /// Multicast groups in declaration order.
    pub mcast_groups: Vec<McastGroup>,
}

impl Family {
    /// Parse and resolve a YAML schema document.
    pub fn parse(yaml: &str) -> Result<Self> {
        super::parser::parse_str(yaml)?.resolve()
    }

    /// Look up an operation by name.
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }
}

// ---------------------------------------------------------------------------
// Raw (unresolved) model, produced by the parser.
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) enum RawMemberType {
    Scalar { ty: ScalarType, order: ByteOrder },
    Binary { struct_ref: Option<String>, len: Option<usize> },
    Pad { len: usize },
}

#[derive(Debug)]
pub(crate) struct RawStructMember {
    pub name: String,
    pub ty: RawMemberType,
}

#[derive(Debug)]
pub(crate) struct RawStruct {
    pub name: String,
    pub members: Vec<RawStructMember>,
}

#[derive(Debug)]
pub(crate) enum RawAttrType {
    Scalar { ty: ScalarType, order: ByteOrder },
    String,
    Binary { struct_ref: Option<String> },
    Nest { set: String },
    Pad,
}

#[derive(Debug)]
pub(crate) struct RawAttribute {
    pub name: String,
    pub value: u16,
    pub ty: RawAttrType,
    pub checks: Check,
}

#[derive(Debug)]
pub(crate) struct RawAttributeSet {
    pub name: String,
    /// Superset name for `subset-of` sets; their attribute entries are
    /// name-only references into the superset.
    pub subset_of: Option<String>,
    pub attributes: Vec<RawAttribute>,
}

#[derive(Debug)]
pub(crate) struct RawOpMessage {
    pub value: Option<u16>,
    pub attributes: Vec<String>,
}

#[derive(Debug)]
pub(crate) struct RawRequestReply {
    pub request: Option<RawOpMessage>,
    pub reply: Option<RawOpMessage>,
}

#[derive(Debug)]
pub(crate) struct RawOperation {
    pub name: String,
    pub value: Option<u16>,
    pub fixed_header: Option<String>,
    pub attribute_set: Option<String>,
    pub doit: Option<RawRequestReply>,
    pub dumpit: Option<RawRequestReply>,
}

#[derive(Debug, Default)]
pub(crate) struct RawFamily {
    pub name: String,
    pub protocol: ProtocolKind,
    pub protonum: Option<u32>,
    pub consts: HashMap<String, i64>,
    pub enums: HashMap<String, Enum>,
    pub flags: HashMap<String, Flags>,
    pub structs: HashMap<String, RawStruct>,
    pub attribute_sets: Vec<RawAttributeSet>,
    /// Default fixed header from the operations table.
    pub default_fixed_header: Option<String>,
    pub operations: Vec<RawOperation>,
    pub mcast_groups: Vec<McastGroup>,
}

impl RawFamily {
    /// Resolve every name reference, detecting cycles and missing names.
    pub(crate) fn resolve(self) -> Result<Family> {
        let mut resolver = Resolver {
            raw: &self,
            structs: HashMap::new(),
            sets: HashMap::new(),
            resolving_structs: HashSet::new(),
            resolving_sets: HashSet::new(),
        };

        for name in self.structs.keys() {
            resolver.resolve_struct(name)?;
        }
        for set in &self.attribute_sets {
            resolver.resolve_set(&set.name)?;
        }

        let mut operations = Vec::with_capacity(self.operations.len());
        for op in &self.operations {
            let fixed_name = op
                .fixed_header
                .as_deref()
                .or(self.default_fixed_header.as_deref());
            let fixed_header = match fixed_name {
                Some(name) => Some(resolver.resolve_struct(name)?),
                None => None,
            };
            let attribute_set = match op.attribute_set.as_deref() {
                Some(name) => Some(resolver.resolve_set(name)?),
                None => None,
            };
            operations.push(Operation {
                name: op.name.clone(),
                value: op.value,
                fixed_header,
                attribute_set,
                doit: op.doit.as_ref().map(resolve_request_reply),
                dumpit: op.dumpit.as_ref().map(resolve_request_reply),
            });
        }

        let Resolver { structs, sets, .. } = resolver;
        Ok(Family {
            name: self.name,
            protocol: self.protocol,
            protonum: self.protonum,
            consts: self.consts,
            enums: self.enums,
            flags: self.flags,
            structs,
            attribute_sets: sets,
            operations,
            mcast_groups: self.mcast_groups,
        })
    }
}

fn resolve_request_reply(raw: &RawRequestReply) -> RequestReply {
    let lower = |m: &RawOpMessage| OpMessage {
        value: m.value,
        attributes: m.attributes.clone(),
    };
    RequestReply {
        request: raw.request.as_ref().map(lower),
        reply: raw.reply.as_ref().map(lower),
    }
}

struct Resolver<'a> {
    raw: &'a RawFamily,
    structs: HashMap<String, Arc<Struct>>,
    sets: HashMap<String, Arc<AttributeSet>>,
    resolving_structs: HashSet<String>,
    resolving_sets: HashSet<String>,
}

impl Resolver<'_> {
    fn resolve_struct(&mut self, name: &str) -> Result<Arc<Struct>> {
        if let Some(resolved) = self.structs.get(name) {
            return Ok(Arc::clone(resolved));
        }
        if !self.resolving_structs.insert(name.to_string()) {
            return Err(Error::CircularDependency { name: name.into() });
        }
        let raw = self
            .raw
            .structs
            .get(name)
            .ok_or_else(|| Error::UnresolvedReference { name: name.into() })?;

        let mut members = Vec::with_capacity(raw.members.len());
        for member in &raw.members {
            let ty = match &member.ty {
                RawMemberType::Scalar { ty, order } => MemberType::Scalar {
                    ty: *ty,
                    order: *order,
                },
                RawMemberType::Binary { struct_ref, len } => MemberType::Binary {
                    struct_ref: match struct_ref.as_deref() {
                        Some(target) => Some(self.resolve_struct(target)?),
                        None => None,
                    },
                    len: *len,
                },
                RawMemberType::Pad { len } => MemberType::Pad { len: *len },
            };
            members.push(StructMember {
                name: member.name.clone(),
                ty,
            });
        }

        let resolved = Arc::new(Struct {
            name: raw.name.clone(),
            members,
        });
        self.resolving_structs.remove(name);
        self.structs.insert(name.to_string(), Arc::clone(&resolved));
        Ok(resolved)
    }

    fn resolve_set(&mut self, name: &str) -> Result<Arc<AttributeSet>> {
        if let Some(resolved) = self.sets.get(name) {
            return Ok(Arc::clone(resolved));
        }
        if !self.resolving_sets.insert(name.to_string()) {
            return Err(Error::CircularDependency { name: name.into() });
        }
        let raw = self
            .raw
            .attribute_sets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::UnresolvedReference { name: name.into() })?;

        let resolved = match raw.subset_of.as_deref() {
            Some(superset_name) => {
                let superset = self.resolve_set(superset_name)?;
                let mut attributes = Vec::with_capacity(raw.attributes.len());
                for entry in &raw.attributes {
                    let attr = superset
                        .attributes
                        .iter()
                        .find(|a| a.name == entry.name)
                        .ok_or_else(|| Error::UnresolvedReference {
                            name: format!("{} (subset of {})", entry.name, superset_name),
                        })?;
                    attributes.push(attr.clone());
                }
                AttributeSet {
                    name: raw.name.clone(),
                    attributes,
                }
            }
            None => {
                let mut attributes = Vec::with_capacity(raw.attributes.len());
                for attr in &raw.attributes {
                    let ty = match &attr.ty {
                        RawAttrType::Scalar { ty, order } => AttrType::Scalar {
                            ty: *ty,
                            order: *order,
                        },
                        RawAttrType::String => AttrType::String,
                        RawAttrType::Binary { struct_ref } => AttrType::Binary {
                            struct_ref: match struct_ref.as_deref() {
                                Some(target) => Some(self.resolve_struct(target)?),
                                None => None,
                            },
                        },
                        RawAttrType::Nest { set } => AttrType::Nest(self.resolve_set(set)?),
                        RawAttrType::Pad => AttrType::Pad,
                    };
                    attributes.push(SchemaAttribute {
                        name: attr.name.clone(),
                        value: attr.value,
                        ty,
                        checks: attr.checks,
                    });
                }
                AttributeSet {
                    name: raw.name.clone(),
                    attributes,
                }
            }
        };

        let resolved = Arc::new(resolved);
        self.resolving_sets.remove(name);
        self.sets.insert(name.to_string(), Arc::clone(&resolved));
        Ok(resolved)
    }
}
