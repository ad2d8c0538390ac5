// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Client-side core of a user-space storage-access library. An application
// reads, writes, and deletes named objects in a remote object store by
// cooperating with a co-located local service over a UNIX control socket
// (framed binary messages) and two POSIX shared-memory ring buffers (bulk
// data, credit-flow controlled).
//
// Layout:
//   codec        — wire message encode/decode (pure, no I/O)
//   control       — control-socket transport (connect/send/recv/close)
//   window        — the two shared-memory bulk-data windows
//   properties    — the fixed storage-properties option table
//   error         — the typed error taxonomy
//   dispatcher    — per-session admission scheduler and protocol state machines
//   session       — handshake / teardown, owns transport + windows + dispatcher
//   client        — the public synchronous façade
//   config        — client-configurable constants (socket path, retry policy)
//
// The remaining modules (`shm`, `platform`, `shm_name`, `mem`) are carried
// over from the shared-memory primitives this crate is built on; `window`
// and `control` are layered directly on top of `shm`/`platform`.

pub mod shm_name;

mod platform;

mod shm;
pub use shm::{ShmHandle, ShmOpenMode};

pub mod mem;

pub mod codec;
pub use codec::{Message, MessageBody, MessageType, StatusCode};

pub mod error;
pub use error::{AuthKind, Error, InternalKind};

pub mod config;
pub use config::ClientConfig;

pub mod properties;
pub use properties::StorageProperties;

pub mod control;
pub use control::ControlTransport;

pub mod window;
pub use window::{ReadWindow, WriteWindow};

pub mod dispatcher;

pub mod session;
pub use session::Session;

pub mod client;
pub use client::{Client, ConnectStatus, ReadStream};
