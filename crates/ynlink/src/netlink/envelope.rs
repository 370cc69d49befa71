//! Message envelope: common header + optional fixed sub-header + attributes.
//!
//! A [`MessageDef`] is the static description of one concrete message shape
//! (its wire type, fixed-header layout, attribute set, and the partition of
//! caller-facing parameter names); a [`Message`] is one instance of that
//! shape, built either from named arguments on the way out or by decoding
//! wire bytes on the way in. Both directions validate the type tag.

use std::sync::Arc;

use super::attr::{Attribute, AttributeSetDef, ScalarCodec, Value};
use super::codec::{Decoder, Encoder};
use super::error::{Error, Result};
use super::message::NlMsgHdr;

/// Codec for one member of a fixed sub-header.
#[derive(Debug, Clone)]
pub enum MemberCodec {
    /// Fixed-width integer.
    Scalar(ScalarCodec),
    /// Opaque bytes of a declared length.
    Binary {
        /// Declared member length in bytes.
        len: usize,
    },
    /// Padding: contributes no value, zero-filled on encode.
    Pad {
        /// Declared padding length in bytes.
        len: usize,
    },
}

/// One named member of a fixed sub-header.
#[derive(Debug, Clone)]
pub struct StructMemberDef {
    /// Member name (`pad` members keep their name but carry no value).
    pub name: Arc<str>,
    /// Member codec.
    pub codec: MemberCodec,
}

/// Fixed sub-header layout: an ordered sequence of named members.
///
/// Missing named members encode as zero; `pad` members are skipped on
/// decode and zero-filled on encode.
#[derive(Debug, Clone)]
pub struct StructDef {
    /// Struct name from the schema.
    pub name: Arc<str>,
    /// Ordered members.
    pub members: Vec<StructMemberDef>,
}

impl StructDef {
    /// Check whether the struct declares a value-carrying member of this name.
    pub fn contains_member(&self, name: &str) -> bool {
        self.members
            .iter()
            .any(|m| !matches!(m.codec, MemberCodec::Pad { .. }) && &*m.name == name)
    }

    /// Encode the struct from named field values, defaulting absent members to zero.
    pub fn encode(&self, enc: &mut Encoder, fields: &[(Arc<str>, Value)]) -> Result<()> {
        for member in &self.members {
            let value = fields
                .iter()
                .find(|(name, _)| *name == member.name)
                .map(|(_, value)| value);
            match &member.codec {
                MemberCodec::Scalar(codec) => {
                    codec.encode(&member.name, enc, value.unwrap_or(&Value::I64(0)))?;
                }
                MemberCodec::Binary { len } => match value {
                    Some(v) => {
                        let bytes = v.as_bytes().ok_or_else(|| Error::Validation {
                            name: member.name.to_string(),
                            reason: format!("expected bytes, got {:?}", v),
                        })?;
                        if bytes.len() != *len {
                            return Err(Error::Validation {
                                name: member.name.to_string(),
                                reason: format!("expected {} bytes, got {}", len, bytes.len()),
                            });
                        }
                        enc.put_bytes(bytes);
                    }
                    None => enc.put_bytes(&vec![0u8; *len]),
                },
                MemberCodec::Pad { len } => enc.put_bytes(&vec![0u8; *len]),
            }
        }
        Ok(())
    }

    /// Decode the struct into named field values, skipping `pad` members.
    pub fn decode(&self, dec: &mut Decoder<'_>) -> Result<Vec<(Arc<str>, Value)>> {
        let mut fields = Vec::new();
        for member in &self.members {
            match &member.codec {
                MemberCodec::Scalar(codec) => {
                    let value = codec.decode(&member.name, dec)?;
                    fields.push((Arc::clone(&member.name), value));
                }
                MemberCodec::Binary { len } => {
                    let bytes = dec.bytes(*len)?;
                    fields.push((Arc::clone(&member.name), Value::Bytes(bytes.to_vec())));
                }
                MemberCodec::Pad { len } => dec.skip(*len)?,
            }
        }
        Ok(fields)
    }
}

/// Static description of one concrete message shape.
#[derive(Debug, Clone)]
pub struct MessageDef {
    /// Definition name, e.g. `do-getlink-request`.
    pub name: Arc<str>,
    /// Numeric wire type (`nlmsg_type`).
    pub value: u16,
    /// Fixed sub-header layout, if the message carries one.
    pub fixed_header: Option<Arc<StructDef>>,
    /// Attribute set legal within the payload.
    pub attribute_set: Arc<AttributeSetDef>,
    /// Declared parameter names that map to fixed-header members.
    pub header_params: Vec<Arc<str>>,
    /// Declared parameter names that map to attributes.
    pub attribute_params: Vec<Arc<str>>,
}

impl MessageDef {
    fn is_header_param(&self, name: &str) -> bool {
        self.header_params.iter().any(|p| &**p == name)
    }

    fn is_attribute_param(&self, name: &str) -> bool {
        self.attribute_params.iter().any(|p| &**p == name)
    }
}

/// One message instance: common header, optional fixed sub-header, attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Common netlink header.
    pub header: NlMsgHdr,
    /// Decoded fixed sub-header fields, in member order.
    pub fixed_header: Option<Vec<(Arc<str>, Value)>>,
    /// Decoded attributes, in wire order.
    pub attributes: Vec<Attribute>,
}

impl Message {
    /// Build an outbound message from named arguments.
    ///
    /// Arguments are partitioned into fixed-header fields and attributes by
    /// the definition's declared parameter sets. A name in neither partition
    /// is rejected with [`Error::UnknownAttribute`].
    pub fn from_args(def: &MessageDef, args: &[(&str, Value)]) -> Result<Self> {
        let mut header_fields: Vec<(Arc<str>, Value)> = Vec::new();
        let mut attr_args: Vec<(&str, Value)> = Vec::new();
        for (name, value) in args {
            if def.is_header_param(name) {
                header_fields.push((Arc::from(*name), value.clone()));
            } else if def.is_attribute_param(name) {
                attr_args.push((*name, value.clone()));
            } else {
                return Err(Error::UnknownAttribute {
                    name: (*name).to_string(),
                });
            }
        }

        let attributes = def.attribute_set.build_attributes(&attr_args)?;
        Ok(Self {
            header: NlMsgHdr::new(def.value, 0),
            fixed_header: def.fixed_header.as_ref().map(|_| header_fields),
            attributes,
        })
    }

    /// Encode the message, patching the total length at the frame start.
    pub fn encode(&self, def: &MessageDef, enc: &mut Encoder) -> Result<()> {
        if self.header.nlmsg_type != def.value {
            return Err(Error::TypeMismatch {
                expected: def.value,
                actual: self.header.nlmsg_type,
            });
        }
        enc.measure_u32(|e| {
            self.header.encode(e);
            if let Some(struct_def) = &def.fixed_header {
                let empty = Vec::new();
                let fields = self.fixed_header.as_ref().unwrap_or(&empty);
                struct_def.encode(e, fields)?;
            }
            def.attribute_set.encode(e, &self.attributes)
        })
    }

    /// Decode a message payload against an already-decoded header.
    ///
    /// The header's type tag must match the definition's declared type.
    pub fn decode(def: &MessageDef, dec: &mut Decoder<'_>, header: NlMsgHdr) -> Result<Self> {
        if header.nlmsg_type != def.value {
            return Err(Error::TypeMismatch {
                expected: def.value,
                actual: header.nlmsg_type,
            });
        }
        let fixed_header = match &def.fixed_header {
            Some(struct_def) => Some(struct_def.decode(dec)?),
            None => None,
        };
        let attributes = def.attribute_set.decode(dec)?;
        Ok(Self {
            header,
            fixed_header,
            attributes,
        })
    }

    /// Look up a decoded value by name, across fixed-header fields and attributes.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(fields) = &self.fixed_header
            && let Some((_, value)) = fields.iter().find(|(n, _)| &**n == name)
        {
            return Some(value);
        }
        self.attributes
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlink::attr::{AttributeDef, Check, DataType, ScalarType};
    use crate::netlink::codec::ByteOrder;
    use crate::netlink::message::NLMSG_HDRLEN;

    fn test_def() -> MessageDef {
        let set = Arc::new(AttributeSetDef::new(
            "addr-attrs",
            vec![
                AttributeDef {
                    name: "address".into(),
                    tag: 1,
                    datatype: DataType::Binary {
                        check: Check::default(),
                    },
                },
                AttributeDef {
                    name: "label".into(),
                    tag: 3,
                    datatype: DataType::String {
                        check: Check::default(),
                    },
                },
            ],
        ));
        let fixed = Arc::new(StructDef {
            name: "ifaddrmsg".into(),
            members: vec![
                StructMemberDef {
                    name: "family".into(),
                    codec: MemberCodec::Scalar(ScalarCodec::new(ScalarType::U8, ByteOrder::Host)),
                },
                StructMemberDef {
                    name: "prefixlen".into(),
                    codec: MemberCodec::Scalar(ScalarCodec::new(ScalarType::U8, ByteOrder::Host)),
                },
                StructMemberDef {
                    name: "pad".into(),
                    codec: MemberCodec::Pad { len: 2 },
                },
                StructMemberDef {
                    name: "index".into(),
                    codec: MemberCodec::Scalar(ScalarCodec::new(ScalarType::U32, ByteOrder::Host)),
                },
            ],
        });
        MessageDef {
            name: "do-newaddr-request".into(),
            value: 20,
            fixed_header: Some(fixed),
            attribute_set: set,
            header_params: vec!["family".into(), "prefixlen".into(), "index".into()],
            attribute_params: vec!["address".into(), "label".into()],
        }
    }

    #[test]
    fn test_message_roundtrip() {
        let def = test_def();
        let msg = Message::from_args(
            &def,
            &[
                ("family", Value::U8(2)),
                ("index", Value::U32(3)),
                ("address", Value::Bytes(vec![192, 168, 0, 1])),
                ("label", Value::String("eth0:1".into())),
            ],
        )
        .unwrap();

        let mut enc = Encoder::new();
        msg.encode(&def, &mut enc).unwrap();
        let buf = enc.finish();

        // The patched length covers the whole frame.
        let mut dec = Decoder::new(&buf);
        let header = NlMsgHdr::decode(&mut dec).unwrap();
        assert_eq!(header.nlmsg_len as usize, buf.len());
        assert_eq!(header.nlmsg_type, 20);

        let decoded = dec
            .with_limit(header.payload_len().unwrap(), |d| {
                Message::decode(&def, d, header)
            })
            .unwrap();
        assert_eq!(decoded.get("family").unwrap().as_u64(), Some(2));
        // Absent header member defaulted to zero.
        assert_eq!(decoded.get("prefixlen").unwrap().as_u64(), Some(0));
        assert_eq!(decoded.get("index").unwrap().as_u32(), Some(3));
        assert_eq!(
            decoded.get("address").unwrap().as_bytes(),
            Some(&[192, 168, 0, 1][..])
        );
        assert_eq!(decoded.get("label").unwrap().as_str(), Some("eth0:1"));
    }

    #[test]
    fn test_unknown_argument_rejected() {
        let def = test_def();
        let err = Message::from_args(&def, &[("mtu", Value::U32(1500))]).unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { name } if name == "mtu"));
    }

    #[test]
    fn test_decode_type_mismatch() {
        let def = test_def();
        let msg = Message::from_args(&def, &[]).unwrap();
        let mut enc = Encoder::new();
        msg.encode(&def, &mut enc).unwrap();
        let buf = enc.finish();

        let mut dec = Decoder::new(&buf);
        let mut header = NlMsgHdr::decode(&mut dec).unwrap();
        header.nlmsg_type = 99;
        assert!(matches!(
            Message::decode(&def, &mut dec, header),
            Err(Error::TypeMismatch {
                expected: 20,
                actual: 99
            })
        ));
    }

    #[test]
    fn test_empty_message_is_header_and_fixed_only() {
        let def = test_def();
        let msg = Message::from_args(&def, &[]).unwrap();
        let mut enc = Encoder::new();
        msg.encode(&def, &mut enc).unwrap();
        // 16-byte header + 8-byte ifaddrmsg, no attributes.
        assert_eq!(enc.as_bytes().len(), NLMSG_HDRLEN + 8);
    }
}
