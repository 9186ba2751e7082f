use serde::{Serialize, Serializer};
use std::fmt;

/// Machine-readable error codes shared by the engine, the sync layer and `ldg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    SnapshotInvalid,
    HierarchyCycle,
    InvalidOrderKey,
    UnknownRow,
    UnknownGroup,
    ReadOnlyField,
    IncompatibleFieldInput,
    FieldTypeMismatch,
    RequestFailed,
    RequestTimedOut,
    RequestCancelled,
    StaleResponse,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::SnapshotInvalid => "E1002",
            Self::HierarchyCycle => "E1003",
            Self::InvalidOrderKey => "E2001",
            Self::UnknownRow => "E2002",
            Self::UnknownGroup => "E2003",
            Self::ReadOnlyField => "E3001",
            Self::IncompatibleFieldInput => "E3002",
            Self::FieldTypeMismatch => "E3003",
            Self::RequestFailed => "E5001",
            Self::RequestTimedOut => "E5002",
            Self::RequestCancelled => "E5003",
            Self::StaleResponse => "E5004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and notifications.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::SnapshotInvalid => "Snapshot is invalid",
            Self::HierarchyCycle => "Line item hierarchy contains a cycle",
            Self::InvalidOrderKey => "Invalid order key",
            Self::UnknownRow => "Row not found",
            Self::UnknownGroup => "Group not found",
            Self::ReadOnlyField => "Field is read-only",
            Self::IncompatibleFieldInput => "Field cannot be resolved from this input",
            Self::FieldTypeMismatch => "Field value has the wrong type",
            Self::RequestFailed => "Request to the budget API failed",
            Self::RequestTimedOut => "Request to the budget API timed out",
            Self::RequestCancelled => "Request was cancelled",
            Self::StaleResponse => "Response superseded by a newer request",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint surfaced alongside the message.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in ledgerline.toml and retry."),
            Self::SnapshotInvalid => Some("Run `ldg check` on the snapshot for details."),
            Self::HierarchyCycle => Some("Remove the child id that points back at an ancestor."),
            Self::InvalidOrderKey => {
                Some("Order keys use the characters 0-9, A-Z, a-z and must not end in 0.")
            }
            Self::UnknownRow | Self::UnknownGroup => None,
            Self::ReadOnlyField => Some("Derived totals are recomputed; edit their inputs instead."),
            Self::IncompatibleFieldInput | Self::InternalUnexpected => {
                Some("Retry once. If persistent, report a bug with logs.")
            }
            Self::FieldTypeMismatch => Some("Check the value type expected by the column."),
            Self::RequestFailed => Some("Your changes are kept locally; refresh to reconcile."),
            Self::RequestTimedOut => Some("Raise `sync.request_timeout_ms` or retry later."),
            Self::RequestCancelled | Self::StaleResponse => None,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// Serialized as the `E####` code.
impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}
