//! Schema document parsing (phase 1 of the two-phase build).
//!
//! The YAML document is deserialized into typed raw-document structs and
//! lowered into the raw model tables of [`super::model`]. No cross-name
//! resolution happens here; type references stay plain strings until
//! [`super::model::RawFamily::resolve`] runs.
//!
//! Document layout follows the kernel's YNL family specifications: top-level
//! `name`/`protocol`/`protonum`, `definitions` (const/enum/flags/struct),
//! `attribute-sets` (optionally `subset-of`), `operations` and
//! `mcast-groups`.

use std::collections::HashMap;

use serde::Deserialize;

use super::model::{
    Enum, EnumEntry, Flags, McastGroup, ProtocolKind, RawAttrType, RawAttribute,
    RawAttributeSet, RawFamily, RawMemberType, RawOpMessage, RawOperation, RawRequestReply,
    RawStruct, RawStructMember,
};
use crate::netlink::attr::{Check, ScalarType};
use crate::netlink::codec::ByteOrder;
use crate::netlink::{Error, Result};

#[derive(Debug, Deserialize)]
struct FamilyDoc {
    name: String,
    protocol: Option<String>,
    protonum: Option<u32>,
    #[allow(dead_code)]
    doc: Option<String>,
    definitions: Option<Vec<DefinitionDoc>>,
    #[serde(rename = "attribute-sets", default)]
    attribute_sets: Vec<AttributeSetDoc>,
    operations: Option<OperationsDoc>,
    #[serde(rename = "mcast-groups")]
    mcast_groups: Option<McastGroupsDoc>,
}

#[derive(Debug, Deserialize)]
struct DefinitionDoc {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    value: Option<i64>,
    #[serde(rename = "start-value")]
    start_value: Option<i64>,
    entries: Option<Vec<EnumEntryDoc>>,
    members: Option<Vec<StructMemberDoc>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnumEntryDoc {
    Name(String),
    Full {
        name: String,
        value: Option<i64>,
    },
}

#[derive(Debug, Deserialize)]
struct StructMemberDoc {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "byte-order")]
    byte_order: Option<String>,
    len: Option<usize>,
    #[serde(rename = "struct")]
    struct_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttributeSetDoc {
    name: String,
    #[serde(rename = "subset-of")]
    subset_of: Option<String>,
    attributes: Vec<AttributeDoc>,
}

#[derive(Debug, Deserialize)]
struct AttributeDoc {
    name: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    value: Option<u16>,
    #[serde(rename = "byte-order")]
    byte_order: Option<String>,
    #[serde(rename = "nested-attributes")]
    nested_attributes: Option<String>,
    #[serde(rename = "struct")]
    struct_ref: Option<String>,
    checks: Option<ChecksDoc>,
}

#[derive(Debug, Deserialize)]
struct ChecksDoc {
    min: Option<CheckValueDoc>,
    max: Option<CheckValueDoc>,
    #[serde(rename = "min-len")]
    min_len: Option<CheckValueDoc>,
    #[serde(rename = "max-len")]
    max_len: Option<CheckValueDoc>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CheckValueDoc {
    Int(i64),
    Symbol(String),
}

#[derive(Debug, Deserialize)]
struct OperationsDoc {
    #[serde(rename = "enum-model")]
    enum_model: Option<String>,
    #[serde(rename = "fixed-header")]
    fixed_header: Option<String>,
    list: Option<Vec<OperationDoc>>,
}

#[derive(Debug, Deserialize)]
struct OperationDoc {
    name: String,
    value: Option<u16>,
    #[serde(rename = "attribute-set")]
    attribute_set: Option<String>,
    #[serde(rename = "fixed-header")]
    fixed_header: Option<String>,
    #[serde(rename = "do")]
    doit: Option<RequestReplyDoc>,
    dump: Option<RequestReplyDoc>,
}

#[derive(Debug, Deserialize)]
struct RequestReplyDoc {
    request: Option<OpMessageDoc>,
    reply: Option<OpMessageDoc>,
}

#[derive(Debug, Deserialize)]
struct OpMessageDoc {
    value: Option<u16>,
    #[serde(default)]
    attributes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct McastGroupsDoc {
    list: Vec<McastGroupDoc>,
}

#[derive(Debug, Deserialize)]
struct McastGroupDoc {
    name: String,
}

/// Parse a YAML schema document into the raw (unresolved) model.
pub(crate) fn parse_str(yaml: &str) -> Result<RawFamily> {
    let doc: FamilyDoc = serde_yaml::from_str(yaml)?;

    let protocol = match doc.protocol.as_deref() {
        None | Some("genetlink") => ProtocolKind::Genetlink,
        Some("netlink-raw") => ProtocolKind::NetlinkRaw,
        Some(other) => {
            return Err(Error::SchemaParse(format!("unknown protocol kind: {}", other)));
        }
    };

    let mut consts = HashMap::new();
    let mut enums = HashMap::new();
    let mut flags = HashMap::new();
    let mut structs = HashMap::new();

    for def in doc.definitions.unwrap_or_default() {
        match def.kind.as_str() {
            "const" => {
                let value = def.value.ok_or_else(|| {
                    Error::SchemaParse(format!("const {} has no value", def.name))
                })?;
                consts.insert(def.name, value);
            }
            "enum" => {
                let parsed = parse_enum_entries(&def, false)?;
                enums.insert(
                    def.name.clone(),
                    Enum {
                        name: def.name,
                        entries: parsed,
                    },
                );
            }
            "flags" => {
                let parsed = parse_enum_entries(&def, true)?;
                flags.insert(
                    def.name.clone(),
                    Flags {
                        name: def.name,
                        entries: parsed,
                    },
                );
            }
            "struct" => {
                let parsed = parse_struct(&def)?;
                structs.insert(def.name, parsed);
            }
            other => {
                return Err(Error::SchemaParse(format!(
                    "unknown definition type: {}",
                    other
                )));
            }
        }
    }

    let attribute_sets = doc
        .attribute_sets
        .into_iter()
        .map(parse_attribute_set)
        .collect::<Result<Vec<_>>>()?;

    let mut default_fixed_header = None;
    let mut operations = Vec::new();
    if let Some(ops) = doc.operations {
        match ops.enum_model.as_deref() {
            None | Some("unidirectional") | Some("directional") => {}
            Some(other) => {
                return Err(Error::SchemaParse(format!("unknown enum model: {}", other)));
            }
        }
        default_fixed_header = ops.fixed_header;
        for op in ops.list.unwrap_or_default() {
            operations.push(RawOperation {
                name: op.name,
                value: op.value,
                fixed_header: op.fixed_header,
                attribute_set: op.attribute_set,
                doit: op.doit.map(parse_request_reply),
                dumpit: op.dump.map(parse_request_reply),
            });
        }
    }

    let mcast_groups = doc
        .mcast_groups
        .map(|groups| {
            groups
                .list
                .into_iter()
                .map(|g| McastGroup { name: g.name })
                .collect()
        })
        .unwrap_or_default();

    Ok(RawFamily {
        name: doc.name,
        protocol,
        protonum: doc.protonum,
        consts,
        enums,
        flags,
        structs,
        attribute_sets,
        default_fixed_header,
        operations,
        mcast_groups,
    })
}

fn parse_enum_entries(def: &DefinitionDoc, is_flags: bool) -> Result<Vec<EnumEntry>> {
    let start = def.start_value.unwrap_or(0);
    let mut value = if is_flags { 1i64 << start } else { start };
    let mut entries = Vec::new();
    for entry in def.entries.as_deref().unwrap_or_default() {
        let (name, explicit) = match entry {
            EnumEntryDoc::Name(name) => (name.clone(), None),
            EnumEntryDoc::Full {
                name,
                value: explicit,
            } => (name.clone(), *explicit),
        };
        if let Some(explicit) = explicit {
            value = explicit;
        }
        entries.push(EnumEntry {
            name,
            value,
        });
        value = if is_flags { value << 1 } else { value + 1 };
    }
    Ok(entries)
}

fn parse_struct(def: &DefinitionDoc) -> Result<RawStruct> {
    let members = def.members.as_deref().ok_or_else(|| {
        Error::SchemaParse(format!("struct {} has no members", def.name))
    })?;
    let members = members
        .iter()
        .map(|m| {
            let ty = parse_struct_member_type(m)?;
            Ok(RawStructMember {
                name: m.name.clone(),
                ty,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(RawStruct {
        name: def.name.clone(),
        members,
    })
}

fn parse_struct_member_type(m: &StructMemberDoc) -> Result<RawMemberType> {
    if let Some(ty) = parse_scalar_type(&m.kind) {
        return Ok(RawMemberType::Scalar {
            ty,
            order: parse_byte_order(m.byte_order.as_deref())?,
        });
    }
    match m.kind.as_str() {
        "binary" => Ok(RawMemberType::Binary {
            struct_ref: m.struct_ref.clone(),
            len: m.len,
        }),
        "pad" => {
            let len = m.len.ok_or_else(|| {
                Error::SchemaParse(format!("pad member {} has no len", m.name))
            })?;
            Ok(RawMemberType::Pad { len })
        }
        other => Err(Error::SchemaParse(format!(
            "unknown struct member type: {}",
            other
        ))),
    }
}

fn parse_attribute_set(doc: AttributeSetDoc) -> Result<RawAttributeSet> {
    let is_subset = doc.subset_of.is_some();
    let mut value: u16 = 0;
    let mut attributes = Vec::new();
    for attr in &doc.attributes {
        // `unused` entries reserve nothing; they are dropped without
        // consuming a tag.
        if attr.kind.as_deref() == Some("unused") {
            continue;
        }
        let ty = if is_subset {
            // Subset entries select superset attributes by name; any type
            // repeated here is informational only.
            RawAttrType::Pad
        } else {
            parse_attribute_type(attr)?
        };
        value = attr.value.unwrap_or(value + 1);
        attributes.push(RawAttribute {
            name: attr.name.clone(),
            value,
            ty,
            checks: parse_checks(attr.checks.as_ref())?,
        });
    }
    Ok(RawAttributeSet {
        name: doc.name,
        subset_of: doc.subset_of,
        attributes,
    })
}

fn parse_attribute_type(attr: &AttributeDoc) -> Result<RawAttrType> {
    let kind = attr.kind.as_deref().ok_or_else(|| {
        Error::SchemaParse(format!("attribute {} has no type", attr.name))
    })?;
    if let Some(ty) = parse_scalar_type(kind) {
        return Ok(RawAttrType::Scalar {
            ty,
            order: parse_byte_order(attr.byte_order.as_deref())?,
        });
    }
    match kind {
        "string" => Ok(RawAttrType::String),
        "binary" => Ok(RawAttrType::Binary {
            struct_ref: attr.struct_ref.clone(),
        }),
        "nest" => {
            let set = attr.nested_attributes.clone().ok_or_else(|| {
                Error::SchemaParse(format!(
                    "nest attribute {} has no nested-attributes",
                    attr.name
                ))
            })?;
            Ok(RawAttrType::Nest { set })
        }
        "pad" => Ok(RawAttrType::Pad),
        "sub-message" => Err(Error::SchemaParse(format!(
            "sub-message attribute {} is not supported",
            attr.name
        ))),
        other => Err(Error::SchemaParse(format!(
            "unknown attribute type: {}",
            other
        ))),
    }
}

fn parse_scalar_type(kind: &str) -> Option<ScalarType> {
    match kind {
        "u8" => Some(ScalarType::U8),
        "s8" => Some(ScalarType::S8),
        "u16" => Some(ScalarType::U16),
        "s16" => Some(ScalarType::S16),
        "u32" | "uint" => Some(ScalarType::U32),
        "s32" | "int" => Some(ScalarType::S32),
        "u64" => Some(ScalarType::U64),
        "s64" => Some(ScalarType::S64),
        _ => None,
    }
}

fn parse_byte_order(order: Option<&str>) -> Result<ByteOrder> {
    match order {
        None => Ok(ByteOrder::Host),
        Some("big-endian") => Ok(ByteOrder::Big),
        Some("little-endian") => Ok(ByteOrder::Little),
        Some(other) => Err(Error::SchemaParse(format!("unknown byte order: {}", other))),
    }
}

fn parse_checks(checks: Option<&ChecksDoc>) -> Result<Check> {
    let Some(checks) = checks else {
        return Ok(Check::default());
    };
    let int_value = |v: &CheckValueDoc| -> Result<i64> {
        match v {
            CheckValueDoc::Int(value) => Ok(*value),
            CheckValueDoc::Symbol(s) => match s.as_str() {
                "u32-max" => Ok(u32::MAX as i64),
                "s32-max" => Ok(i32::MAX as i64),
                other => Err(Error::SchemaParse(format!("unknown check value: {}", other))),
            },
        }
    };
    let len_value = |v: &CheckValueDoc| -> Result<usize> {
        let value = int_value(v)?;
        usize::try_from(value)
            .map_err(|_| Error::SchemaParse(format!("negative length check: {}", value)))
    };
    Ok(Check {
        min: checks.min.as_ref().map(&int_value).transpose()?,
        max: checks.max.as_ref().map(&int_value).transpose()?,
        min_len: checks.min_len.as_ref().map(&len_value).transpose()?,
        max_len: checks.max_len.as_ref().map(&len_value).transpose()?,
    })
}

fn parse_request_reply(doc: RequestReplyDoc) -> RawRequestReply {
    let lower = |m: OpMessageDoc| RawOpMessage {
        value: m.value,
        attributes: m.attributes,
    };
    RawRequestReply {
        request: doc.request.map(lower),
        reply: doc.reply.map(lower),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::model::Family;

    const DOC: &str = r#"
name: nstest
protocol: netlink-raw
protonum: 0

definitions:
  - type: const
    name: max-label
    value: 15
  - type: enum
    name: op-mode
    entries:
      - idle
      - name: steady
      - name: burst
        value: 7
  - type: flags
    name: link-flags
    start-value: 1
    entries:
      - up
      - broadcast
  - type: struct
    name: ifheader
    members:
      - name: family
        type: u8
      - name: pad
        type: pad
        len: 3
      - name: index
        type: u32

attribute-sets:
  - name: link-attrs
    attributes:
      - name: ifindex
        type: u32
      - name: ifname
        type: string
        checks:
          max-len: 15
      - name: stats
        type: binary
      - name: rate
        type: u32
        byte-order: big-endian
        checks:
          max: u32-max
      - name: old-flag
        type: unused
      - name: props
        type: nest
        nested-attributes: prop-attrs
  - name: prop-attrs
    attributes:
      - name: priority
        type: u16

operations:
  fixed-header: ifheader
  list:
    - name: getlink
      value: 18
      attribute-set: link-attrs
      do:
        request:
          attributes: [ifindex]
        reply:
          attributes: [ifindex, ifname]
      dump:
        reply:
          attributes: [ifindex, ifname]

mcast-groups:
  list:
    - name: link-notify
"#;

    #[test]
    fn test_parse_full_document() {
        let family = Family::parse(DOC).unwrap();
        assert_eq!(family.name, "nstest");
        assert_eq!(family.protocol, ProtocolKind::NetlinkRaw);
        assert_eq!(family.protonum, Some(0));
        assert_eq!(family.consts["max-label"], 15);
        assert_eq!(family.mcast_groups[0].name, "link-notify");

        let set = &family.attribute_sets["link-attrs"];
        // `unused` entries are dropped without consuming a tag.
        assert_eq!(set.attributes.len(), 5);
        assert_eq!(set.attributes[0].value, 1);
        assert_eq!(set.attributes[3].name, "rate");
        assert_eq!(set.attributes[3].value, 4);
        assert_eq!(set.attributes[4].name, "props");
        assert_eq!(set.attributes[4].value, 5);

        let op = family.operation("getlink").unwrap();
        assert_eq!(op.value, Some(18));
        assert_eq!(op.fixed_header.as_ref().unwrap().name, "ifheader");
        assert!(op.doit.is_some());
        assert!(op.dumpit.as_ref().unwrap().request.is_none());
    }

    #[test]
    fn test_enum_and_flags_values() {
        let family = Family::parse(DOC).unwrap();
        let modes = &family.enums["op-mode"];
        assert_eq!(
            modes
                .entries
                .iter()
                .map(|e| (e.name.as_str(), e.value))
                .collect::<Vec<_>>(),
            vec![("idle", 0), ("steady", 1), ("burst", 7)]
        );
        let flags = &family.flags["link-flags"];
        assert_eq!(
            flags
                .entries
                .iter()
                .map(|e| (e.name.as_str(), e.value))
                .collect::<Vec<_>>(),
            vec![("up", 2), ("broadcast", 4)]
        );
    }

    #[test]
    fn test_checks_parsed() {
        let family = Family::parse(DOC).unwrap();
        let set = &family.attribute_sets["link-attrs"];
        assert_eq!(set.attributes[1].checks.max_len, Some(15));
        assert_eq!(set.attributes[3].checks.max, Some(u32::MAX as i64));
    }

    #[test]
    fn test_unknown_attribute_type() {
        let doc = r#"
name: bad
attribute-sets:
  - name: attrs
    attributes:
      - name: thing
        type: quux
"#;
        assert!(matches!(
            Family::parse(doc),
            Err(Error::SchemaParse(msg)) if msg.contains("quux")
        ));
    }

    #[test]
    fn test_unknown_byte_order() {
        let doc = r#"
name: bad
attribute-sets:
  - name: attrs
    attributes:
      - name: rate
        type: u32
        byte-order: middle-endian
"#;
        assert!(matches!(
            Family::parse(doc),
            Err(Error::SchemaParse(msg)) if msg.contains("middle-endian")
        ));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            Family::parse(": not yaml : ["),
            Err(Error::Yaml(_))
        ));
    }
}
