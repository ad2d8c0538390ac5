// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Typed error taxonomy surfaced to callers of the public façade.
//
// The original implementation this client is modeled on raises exceptions
// (PathError, QuotaError, ProtError, AuthError, PropertyException) from deep
// inside its operation handlers. This crate collapses that into one tagged
// result type per operation instead, mapped deterministically from wire
// status codes (see `codec::StatusCode` and the per-protocol mapping tables
// in `dispatcher`).

use std::fmt;
use std::io;

use crate::codec::StatusCode;

/// Sub-kind of an [`Error::Auth`] failure, carried as a discriminant rather
/// than keyed off the human-readable message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// The service does not recognize the username (`ERR_AUTH_USER`).
    UnknownUser,
    /// The password digest did not match (`ERR_AUTH_PASS`).
    WrongPassword,
    /// The session/client is not in a usable state for the requested
    /// operation (not connected, or closing).
    NotConnected,
}

/// Sub-kind of an [`Error::Internal`] failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalKind {
    /// Shared-memory attach/allocation failure.
    Memory,
    /// Control-socket connect/send/recv failure.
    Ipc,
    /// A read-window copy returned fewer bytes than requested.
    Read,
    /// A write-window append failed unexpectedly.
    Write,
    /// The service reported a corrupted read or write.
    DataCorruption,
    /// A protocol-level inconsistency (unexpected message type, address out of range).
    Protocol,
    /// A status code with no more specific mapping.
    Unknown,
}

impl fmt::Display for InternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InternalKind::Memory => "memory",
            InternalKind::Ipc => "ipc",
            InternalKind::Read => "read",
            InternalKind::Write => "write",
            InternalKind::DataCorruption => "data-corruption",
            InternalKind::Protocol => "protocol",
            InternalKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// The typed error surface of this crate.
///
/// Every fallible public operation (`connect`, `read`, `write`, `delete`,
/// `set_properties`) returns one of these on failure; `close` never does.
#[derive(Debug)]
pub enum Error {
    /// The object path does not exist on the service.
    PathNotFound(String),
    /// The caller is not permitted to access the object path.
    PathDenied(String),
    /// The write would exceed the caller's storage quota.
    Quota { attempted: u64, allowed: u64 },
    /// A named protocol inconsistency (unexpected message, bad framing).
    Protocol(String),
    /// Authentication failed, or the session is not usable for auth reasons.
    Auth { kind: AuthKind, message: String },
    /// `set_properties` was given an unknown key or an unsupported value.
    Property {
        key: String,
        value: Option<String>,
        options: Option<Vec<&'static str>>,
    },
    /// The service reported malformed data that is not a protocol violation.
    Data(String),
    /// An internal failure with no caller-actionable remedy.
    Internal {
        kind: InternalKind,
        source: Option<io::Error>,
    },
}

impl Error {
    pub fn auth(kind: AuthKind, message: impl Into<String>) -> Self {
        Error::Auth {
            kind,
            message: message.into(),
        }
    }

    pub fn internal(kind: InternalKind) -> Self {
        Error::Internal { kind, source: None }
    }

    pub fn internal_with(kind: InternalKind, source: io::Error) -> Self {
        Error::Internal {
            kind,
            source: Some(source),
        }
    }

    /// Map a `STATUS` code received during write-admission, delete, or the
    /// read-initiation phase. `path` is used for the path-shaped variants.
    ///
    /// Grounded in `internal/newcontext.py`'s `_start_write`/`PendDelete.execute`
    /// status-to-exception mapping (§4.5 Phase A / §4.7 of the design).
    pub fn from_admission_status(status: StatusCode, path: &str, attempted: u64) -> Self {
        match status {
            StatusCode::ErrPath => Error::PathNotFound(path.to_string()),
            StatusCode::ErrDeny => Error::PathDenied(path.to_string()),
            StatusCode::ErrQuota => Error::Quota {
                attempted,
                allowed: 0,
            },
            StatusCode::ErrProt => Error::Protocol(path.to_string()),
            StatusCode::ErrAuthUser => Error::auth(AuthKind::UnknownUser, "unknown user"),
            StatusCode::ErrAuthPass => Error::auth(AuthKind::WrongPassword, "wrong password"),
            _ => Error::internal(InternalKind::Unknown),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PathNotFound(p) => write!(f, "path not found: {p}"),
            Error::PathDenied(p) => write!(f, "path denied: {p}"),
            Error::Quota { attempted, allowed } => {
                write!(f, "quota exceeded: attempted {attempted}, allowed {allowed}")
            }
            Error::Protocol(name) => write!(f, "protocol error: {name}"),
            Error::Auth { message, .. } => write!(f, "authentication failed: {message}"),
            Error::Property { key, value, .. } => match value {
                Some(v) => write!(f, "invalid property {key}={v}"),
                None => write!(f, "unknown property {key}"),
            },
            Error::Data(msg) => write!(f, "data error: {msg}"),
            Error::Internal { kind, .. } => write!(f, "internal error: {kind}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Internal { source, .. } => {
                source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::internal_with(InternalKind::Ipc, e)
    }
}
