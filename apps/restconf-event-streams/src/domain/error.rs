//! RESTCONF Protocol Errors
//!
//! The `{error-type, error-tag, error-message}` triple returned to clients.
//!
//! # HTTP Status Mapping
//!
//! | Tag | Status |
//! |-----|--------|
//! | `in-use`, `lock-denied`, `resource-denied`, `data-exists`, `data-missing` | 409 |
//! | `access-denied` | 403 |
//! | `too-big` | 413 |
//! | `unknown-element` | 404 (missing stream) |
//! | `operation-not-supported` | 501 |
//! | `rollback-failed`, `operation-failed` | 500 |
//! | everything else | 400 |

use std::fmt;

/// Protocol layer where an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Transport layer.
    Transport,
    /// RPC layer.
    Rpc,
    /// Protocol layer.
    Protocol,
    /// Application layer.
    Application,
}

impl ErrorType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Rpc => "rpc",
            Self::Protocol => "protocol",
            Self::Application => "application",
        }
    }
}

/// NETCONF error tags (RFC 6241 Appendix A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorTag {
    /// Resource in use.
    InUse,
    /// Unacceptable value.
    InvalidValue,
    /// Request or response too large.
    TooBig,
    /// Expected attribute missing.
    MissingAttribute,
    /// Attribute value not correct.
    BadAttribute,
    /// Unexpected attribute.
    UnknownAttribute,
    /// Expected element missing.
    MissingElement,
    /// Element value not correct.
    BadElement,
    /// Unexpected element, or a resource that does not exist.
    UnknownElement,
    /// Unexpected namespace.
    UnknownNamespace,
    /// Access denied.
    AccessDenied,
    /// Lock could not be acquired.
    LockDenied,
    /// Insufficient resources.
    ResourceDenied,
    /// Rollback failed.
    RollbackFailed,
    /// Data already exists.
    DataExists,
    /// Data does not exist.
    DataMissing,
    /// Operation not supported.
    OperationNotSupported,
    /// Operation failed for another reason.
    OperationFailed,
    /// Message could not be parsed.
    MalformedMessage,
}

impl ErrorTag {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InUse => "in-use",
            Self::InvalidValue => "invalid-value",
            Self::TooBig => "too-big",
            Self::MissingAttribute => "missing-attribute",
            Self::BadAttribute => "bad-attribute",
            Self::UnknownAttribute => "unknown-attribute",
            Self::MissingElement => "missing-element",
            Self::BadElement => "bad-element",
            Self::UnknownElement => "unknown-element",
            Self::UnknownNamespace => "unknown-namespace",
            Self::AccessDenied => "access-denied",
            Self::LockDenied => "lock-denied",
            Self::ResourceDenied => "resource-denied",
            Self::RollbackFailed => "rollback-failed",
            Self::DataExists => "data-exists",
            Self::DataMissing => "data-missing",
            Self::OperationNotSupported => "operation-not-supported",
            Self::OperationFailed => "operation-failed",
            Self::MalformedMessage => "malformed-message",
        }
    }

    /// HTTP status code for this tag.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InUse
            | Self::LockDenied
            | Self::ResourceDenied
            | Self::DataExists
            | Self::DataMissing => 409,
            Self::AccessDenied => 403,
            Self::TooBig => 413,
            Self::UnknownElement => 404,
            Self::OperationNotSupported => 501,
            Self::RollbackFailed | Self::OperationFailed => 500,
            Self::InvalidValue
            | Self::MissingAttribute
            | Self::BadAttribute
            | Self::UnknownAttribute
            | Self::MissingElement
            | Self::BadElement
            | Self::UnknownNamespace
            | Self::MalformedMessage => 400,
        }
    }
}

/// Error reported to a RESTCONF client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} {}: {message}", .error_type.as_str(), .error_tag.as_str())]
pub struct RestconfError {
    error_type: ErrorType,
    error_tag: ErrorTag,
    message: String,
}

impl RestconfError {
    /// Create an error.
    #[must_use]
    pub fn new(error_type: ErrorType, error_tag: ErrorTag, message: impl Into<String>) -> Self {
        Self {
            error_type,
            error_tag,
            message: message.into(),
        }
    }

    /// Application-level invalid value.
    #[must_use]
    pub fn invalid_value(message: impl fmt::Display) -> Self {
        Self::new(
            ErrorType::Application,
            ErrorTag::InvalidValue,
            message.to_string(),
        )
    }

    /// Protocol-level reference to a resource that does not exist.
    #[must_use]
    pub fn not_found(message: impl fmt::Display) -> Self {
        Self::new(
            ErrorType::Protocol,
            ErrorTag::UnknownElement,
            message.to_string(),
        )
    }

    /// Error type.
    #[must_use]
    pub const fn error_type(&self) -> ErrorType {
        self.error_type
    }

    /// Error tag.
    #[must_use]
    pub const fn error_tag(&self) -> ErrorTag {
        self.error_tag
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
