//! Netlink protocol engine.
//!
//! This module implements the netlink wire protocol from scratch: message
//! framing, aligned TLV attributes, and the request/reply exchange state
//! machine (including multi-datagram dumps). Message and attribute shapes
//! are data, not code: they are built from a schema by
//! [`crate::schema::build_family`] and shared read-only.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use ynlink::netlink::{Connection, Value};
//! use ynlink::schema::{self, Family};
//!
//! let family = Family::parse(SCHEMA_YAML)?;
//! let registry = Arc::new(schema::build_family(&family)?);
//! let conn = Connection::open(registry)?;
//!
//! // Dump: many replies, terminated by DONE.
//! for link in conn.dumpit("getlink", &[]).await? {
//!     println!("{:?}", link.get("ifname"));
//! }
//!
//! // Do: one reply or a pure ACK.
//! conn.doit("setlink", &[("index", Value::U32(2)), ("mtu", Value::U32(1400))]).await?;
//! ```

pub mod attr;
pub mod codec;
pub mod connection;
pub mod envelope;
mod error;
pub mod genl;
pub mod message;
mod socket;

pub use attr::{Attribute, AttributeDef, AttributeSetDef, Check, DataType, ScalarType, Value};
pub use codec::{ByteOrder, Decoder, Encoder};
pub use connection::{Connection, ExchangeKind, FamilyDef, OpSpec, OperationDef, exchange};
pub use envelope::{Message, MessageDef, StructDef};
pub use error::{Error, Result};
pub use message::{NLMSG_HDRLEN, NlMsgHdr, NlMsgType};
pub use socket::{NetlinkSocket, SeqCounter, Transport};
