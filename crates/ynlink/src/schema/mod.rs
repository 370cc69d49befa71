//! Schema subsystem: declarative family descriptions.
//!
//! A netlink family is described by a YAML document (the kernel's YNL
//! specification layout): type definitions, attribute sets, operations,
//! and multicast groups. The document is the sole contract for teaching the
//! engine a new family; no engine code changes are involved.
//!
//! The build runs in three stages:
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌─────────────────────┐
//! │ parser       │   │ model            │   │ builder             │
//! │ YAML → raw   │──▶│ resolve names,   │──▶│ project into codecs │
//! │ tables       │   │ detect cycles    │   │ (FamilyDef)         │
//! └──────────────┘   └──────────────────┘   └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use ynlink::schema::{self, Family};
//! use ynlink::netlink::Connection;
//! use std::sync::Arc;
//!
//! let family = Family::parse(&std::fs::read_to_string("rt_link.yaml")?)?;
//! let registry = Arc::new(schema::build_family(&family)?);
//!
//! let conn = Connection::open(registry)?;
//! let links = conn.dumpit("getlink", &[]).await?;
//! ```

mod builder;
mod model;
mod parser;

pub use builder::build_family;
pub use model::{
    AttrType, AttributeSet, Enum, EnumEntry, Family, Flags, McastGroup, MemberType, OpMessage,
    Operation, ProtocolKind, RequestReply, SchemaAttribute, Struct, StructMember,
};
