//! Error types for netlink and schema operations.

use std::io;

/// Result type for netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during netlink or schema operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML error while reading a schema document.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Kernel returned an error code.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Kernel error with operation context.
    #[error("{operation}: {message} (errno {errno})")]
    KernelWithContext {
        /// The operation that failed.
        operation: String,
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// A cursor read or write ran past its limit.
    #[error("out of bounds: position {position} + {requested} exceeds limit {limit}")]
    OutOfBounds {
        /// Cursor position when the access was attempted.
        position: usize,
        /// Bytes requested.
        requested: usize,
        /// Exclusive upper bound of the cursor.
        limit: usize,
    },

    /// No NUL terminator found within the cursor limit.
    #[error("unterminated string")]
    UnterminatedString,

    /// A TLV body did not consume exactly its declared length.
    #[error("sub-limit mismatch: {unconsumed} bytes left of a {declared}-byte region")]
    SubLimitMismatch {
        /// Declared region length in bytes.
        declared: usize,
        /// Bytes left unconsumed (0 means the body over-ran and was clamped).
        unconsumed: usize,
    },

    /// Decoded message type tag disagrees with the expected type.
    #[error("type mismatch: expected message type {expected}, got {actual}")]
    TypeMismatch {
        /// Statically expected message type.
        expected: u16,
        /// Type found in the decoded header.
        actual: u16,
    },

    /// A named argument does not exist in the target attribute set or header.
    #[error("unknown attribute: {name}")]
    UnknownAttribute {
        /// The name that failed to resolve.
        name: String,
    },

    /// A declared check on an attribute value failed.
    #[error("validation failed for {name}: {reason}")]
    Validation {
        /// Attribute or member name.
        name: String,
        /// Which check failed and how.
        reason: String,
    },

    /// Schema resolution re-entered a definition that is still resolving.
    #[error("circular dependency while resolving {name}")]
    CircularDependency {
        /// The definition name that closed the cycle.
        name: String,
    },

    /// Schema reference to a name with no definition.
    #[error("unresolved reference: {name}")]
    UnresolvedReference {
        /// The missing definition name.
        name: String,
    },

    /// Schema document is structurally invalid.
    #[error("schema parse error: {0}")]
    SchemaParse(String),

    /// Invalid message format on the wire.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Operation not supported by the family.
    #[error("operation not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Create a kernel error from an errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Add context to this error.
    ///
    /// Wraps kernel errors with operation context. Other errors are returned unchanged.
    pub fn with_context(self, operation: impl Into<String>) -> Self {
        match self {
            Self::Kernel { errno, message } => Self::KernelWithContext {
                operation: operation.into(),
                errno,
                message,
            },
            other => other,
        }
    }

    /// Check if this is a "not found" error (ENOENT, ENODEV, etc.).
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, 2 | 19) // ENOENT=2, ENODEV=19
            }
            _ => false,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                matches!(*errno, 1 | 13) // EPERM=1, EACCES=13
            }
            _ => false,
        }
    }

    /// Check if this is a "already exists" error (EEXIST).
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                *errno == 17 // EEXIST=17
            }
            _ => false,
        }
    }

    /// Check if this is a "device busy" error (EBUSY).
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => {
                *errno == 16 // EBUSY=16
            }
            _ => false,
        }
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } | Self::KernelWithContext { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_errno() {
        let err = Error::from_errno(-1); // EPERM
        assert!(err.is_permission_denied());
        assert_eq!(err.errno(), Some(1));
    }

    #[test]
    fn test_from_errno_with_context() {
        let err = Error::from_errno(-2).with_context("deleting interface eth0"); // ENOENT
        assert!(err.is_not_found());
        let msg = err.to_string();
        assert!(msg.contains("deleting interface eth0"));
        assert!(msg.contains("No such file or directory"));
    }

    #[test]
    fn test_with_context_passthrough() {
        let err = Error::UnterminatedString.with_context("decoding IFLA_IFNAME");
        assert!(matches!(err, Error::UnterminatedString));
    }

    #[test]
    fn test_is_busy() {
        assert!(Error::from_errno(-16).is_busy()); // EBUSY
        assert!(!Error::from_errno(-1).is_busy()); // EPERM is not busy
    }

    #[test]
    fn test_error_messages() {
        let err = Error::TypeMismatch {
            expected: 20,
            actual: 16,
        };
        assert_eq!(err.to_string(), "type mismatch: expected message type 20, got 16");

        let err = Error::UnknownAttribute {
            name: "ifname".into(),
        };
        assert_eq!(err.to_string(), "unknown attribute: ifname");

        let err = Error::CircularDependency {
            name: "link-attrs".into(),
        };
        assert_eq!(err.to_string(), "circular dependency while resolving link-attrs");
    }
}
