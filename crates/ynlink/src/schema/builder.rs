//! Codec builder: projects a resolved schema into the runtime registry.
//!
//! Everything the exchange engine needs at runtime (attribute-set codecs,
//! fixed-header codecs, per-operation message definitions) is built here
//! once, at schema-load time, as plain shared data. No code generation or
//! dynamic evaluation is involved; adding a family is purely additive
//! input.

use std::collections::HashMap;
use std::sync::Arc;

use super::model::{
    AttrType, AttributeSet as SchemaSet, Family, MemberType, OpMessage, Operation, ProtocolKind,
    RequestReply, Struct as SchemaStruct,
};
use crate::netlink::attr::{AttributeDef, AttributeSetDef, DataType, ScalarCodec};
use crate::netlink::connection::{FamilyDef, OpSpec, OperationDef};
use crate::netlink::envelope::{MemberCodec, MessageDef, StructDef, StructMemberDef};
use crate::netlink::{Error, Result};
use crate::netlink::genl;

/// Build the runtime registry for a resolved family.
///
/// Families of kind `genetlink` default their protocol number to
/// `NETLINK_GENERIC`; `netlink-raw` families must declare one.
pub fn build_family(family: &Family) -> Result<FamilyDef> {
    let protonum = match family.protonum {
        Some(n) => n as isize,
        None => match family.protocol {
            ProtocolKind::Genetlink => genl::NETLINK_GENERIC,
            ProtocolKind::NetlinkRaw => {
                return Err(Error::SchemaParse(format!(
                    "netlink-raw family {} has no protonum",
                    family.name
                )));
            }
        },
    };

    let mut builder = Builder {
        sets: HashMap::new(),
        structs: HashMap::new(),
    };
    let mut operations = Vec::with_capacity(family.operations.len());
    for op in &family.operations {
        operations.push(builder.operation(op)?);
    }
    Ok(FamilyDef::new(family.name.as_str(), protonum, operations))
}

/// Memoizing projection state: schema sets and structs are shared, so their
/// codecs are built once and reused wherever referenced.
struct Builder {
    sets: HashMap<String, Arc<AttributeSetDef>>,
    structs: HashMap<String, Arc<StructDef>>,
}

impl Builder {
    fn operation(&mut self, op: &Operation) -> Result<OperationDef> {
        let doit = match &op.doit {
            Some(rr) => Some(self.op_spec("do", op, rr)?),
            None => None,
        };
        let dumpit = match &op.dumpit {
            Some(rr) => Some(self.op_spec("dump", op, rr)?),
            None => None,
        };
        Ok(OperationDef {
            name: op.name.as_str().into(),
            doit,
            dumpit,
        })
    }

    fn op_spec(&mut self, mode: &str, op: &Operation, rr: &RequestReply) -> Result<OpSpec> {
        let request = match &rr.request {
            Some(msg) => Some(self.message_def(mode, "request", op, msg)?),
            None => None,
        };
        let reply = match &rr.reply {
            Some(msg) => Some(self.message_def(mode, "reply", op, msg)?),
            None => None,
        };
        Ok(OpSpec { request, reply })
    }

    fn message_def(
        &mut self,
        mode: &str,
        direction: &str,
        op: &Operation,
        msg: &OpMessage,
    ) -> Result<Arc<MessageDef>> {
        // Directional specs put the numeric type on the message; raw specs
        // put it on the operation.
        let value = msg.value.or(op.value).ok_or_else(|| {
            Error::SchemaParse(format!(
                "operation {} has no numeric value for its {}-{}",
                op.name, mode, direction
            ))
        })?;
        let set = op.attribute_set.as_ref().ok_or_else(|| {
            Error::SchemaParse(format!("operation {} has no attribute-set", op.name))
        })?;
        let attribute_set = self.set_codec(set)?;
        let fixed_header = match &op.fixed_header {
            Some(s) => Some(self.struct_codec(s)?),
            None => None,
        };

        // Static partition of the declared parameter list. Names matching
        // neither side are dropped, as declarations may list attributes the
        // engine does not carry (pads).
        let header_params = msg
            .attributes
            .iter()
            .filter(|name| {
                fixed_header
                    .as_deref()
                    .is_some_and(|f| f.contains_member(name.as_str()))
            })
            .map(|name| Arc::from(name.as_str()))
            .collect();
        let attribute_params = msg
            .attributes
            .iter()
            .filter(|name| attribute_set.contains_name(name.as_str()))
            .map(|name| Arc::from(name.as_str()))
            .collect();

        Ok(Arc::new(MessageDef {
            name: format!("{}-{}-{}", mode, op.name, direction).into(),
            value,
            fixed_header,
            attribute_set,
            header_params,
            attribute_params,
        }))
    }

    fn set_codec(&mut self, set: &Arc<SchemaSet>) -> Result<Arc<AttributeSetDef>> {
        if let Some(codec) = self.sets.get(&set.name) {
            return Ok(Arc::clone(codec));
        }
        let mut defs = Vec::new();
        for attr in &set.attributes {
            let datatype = match &attr.ty {
                AttrType::Scalar { ty, order } => DataType::Scalar(ScalarCodec {
                    ty: *ty,
                    order: *order,
                    check: attr.checks,
                }),
                AttrType::String => DataType::String { check: attr.checks },
                AttrType::Binary { .. } => DataType::Binary { check: attr.checks },
                AttrType::Nest(inner) => DataType::Nested(self.set_codec(inner)?),
                // Pad attributes occupy a tag but carry no codec.
                AttrType::Pad => continue,
            };
            defs.push(AttributeDef {
                name: attr.name.as_str().into(),
                tag: attr.value,
                datatype,
            });
        }
        let codec = Arc::new(AttributeSetDef::new(set.name.as_str(), defs));
        self.sets.insert(set.name.clone(), Arc::clone(&codec));
        Ok(codec)
    }

    fn struct_codec(&mut self, s: &Arc<SchemaStruct>) -> Result<Arc<StructDef>> {
        if let Some(codec) = self.structs.get(&s.name) {
            return Ok(Arc::clone(codec));
        }
        let mut members = Vec::with_capacity(s.members.len());
        for member in &s.members {
            let codec = match &member.ty {
                MemberType::Scalar { ty, order } => {
                    MemberCodec::Scalar(ScalarCodec::new(*ty, *order))
                }
                MemberType::Binary { len, .. } => MemberCodec::Binary {
                    len: (*len).ok_or_else(|| {
                        Error::SchemaParse(format!(
                            "struct {} member {} has no len",
                            s.name, member.name
                        ))
                    })?,
                },
                MemberType::Pad { len } => MemberCodec::Pad { len: *len },
            };
            members.push(StructMemberDef {
                name: member.name.as_str().into(),
                codec,
            });
        }
        let codec = Arc::new(StructDef {
            name: s.name.as_str().into(),
            members,
        });
        self.structs.insert(s.name.clone(), Arc::clone(&codec));
        Ok(codec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::Value;
    use crate::netlink::codec::{Decoder, Encoder};
    use crate::netlink::envelope::Message;
    use crate::netlink::message::NlMsgHdr;

    const ECHO_DOC: &str = r#"
name: echotest
protocol: netlink-raw
protonum: 31

attribute-sets:
  - name: echo-attrs
    attributes:
      - name: value
        type: u32

operations:
  list:
    - name: echo
      value: 16
      attribute-set: echo-attrs
      do:
        request:
          attributes: [value]
        reply:
          attributes: [value]
"#;

    #[test]
    fn test_schema_to_wire_roundtrip() {
        let family = Family::parse(ECHO_DOC).unwrap();
        let def = build_family(&family).unwrap();
        assert_eq!(def.protonum, 31);

        let op = def.operation("echo").unwrap();
        let spec = op.doit.as_ref().unwrap();
        let request = spec.request.as_ref().unwrap();
        let reply = spec.reply.as_ref().unwrap();

        let msg = Message::from_args(request, &[("value", Value::U32(42))]).unwrap();
        let mut enc = Encoder::new();
        msg.encode(request, &mut enc).unwrap();
        let buf = enc.finish();

        let mut dec = Decoder::new(&buf);
        let header = NlMsgHdr::decode(&mut dec).unwrap();
        let decoded = dec
            .with_limit(header.payload_len().unwrap(), |d| {
                Message::decode(reply, d, header)
            })
            .unwrap();
        assert_eq!(decoded.get("value").unwrap().as_u32(), Some(42));
    }

    #[test]
    fn test_genl_family_defaults_protonum() {
        let doc = r#"
name: wgtest
attribute-sets:
  - name: dev-attrs
    attributes:
      - name: ifname
        type: string
operations:
  list:
    - name: get-device
      value: 32
      attribute-set: dev-attrs
      do:
        request:
          attributes: [ifname]
"#;
        let family = Family::parse(doc).unwrap();
        let def = build_family(&family).unwrap();
        assert_eq!(def.protonum, genl::NETLINK_GENERIC);
    }

    #[test]
    fn test_raw_family_requires_protonum() {
        let doc = r#"
name: rawtest
protocol: netlink-raw
attribute-sets:
  - name: attrs
    attributes:
      - name: value
        type: u32
"#;
        let family = Family::parse(doc).unwrap();
        assert!(matches!(
            build_family(&family),
            Err(Error::SchemaParse(msg)) if msg.contains("protonum")
        ));
    }

    #[test]
    fn test_parameter_partition() {
        let doc = r#"
name: parttest
protocol: netlink-raw
protonum: 0

definitions:
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
      - name: ifname
        type: string
      - name: mtu
        type: u32

operations:
  fixed-header: ifheader
  list:
    - name: setlink
      value: 19
      attribute-set: link-attrs
      do:
        request:
          attributes: [index, ifname, mtu]
"#;
        let family = Family::parse(doc).unwrap();
        let def = build_family(&family).unwrap();
        let request = def
            .operation("setlink")
            .unwrap()
            .doit
            .as_ref()
            .unwrap()
            .request
            .clone()
            .unwrap();
        assert_eq!(
            request.header_params.iter().map(|p| &**p).collect::<Vec<_>>(),
            vec!["index"]
        );
        assert_eq!(
            request
                .attribute_params
                .iter()
                .map(|p| &**p)
                .collect::<Vec<_>>(),
            vec!["ifname", "mtu"]
        );
    }

    #[test]
    fn test_missing_numeric_value_rejected() {
        let doc = r#"
name: valtest
protocol: netlink-raw
protonum: 0
attribute-sets:
  - name: attrs
    attributes:
      - name: value
        type: u32
operations:
  list:
    - name: noval
      attribute-set: attrs
      do:
        request:
          attributes: [value]
"#;
        let family = Family::parse(doc).unwrap();
        assert!(matches!(
            build_family(&family),
            Err(Error::SchemaParse(msg)) if msg.contains("noval")
        ));
    }
}
