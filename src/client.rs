// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The public synchronous façade: connect, read, write, delete, close,
// set_properties. An explicit, owned value rather than a module-level
// singleton (§9 "module-level session singleton"); a second `connect()` on an
// already-connected client is rejected rather than silently reconnecting.
//
// Grounded on `internal/newcontext.py`'s `UserContext` public method surface
// and the package-level `connect`/`write_obj`/`read_obj`/`delete_obj` wrappers
// in `singstorage/__init__.py`, reshaped into owned-value form.

use crate::config::ClientConfig;
use crate::dispatcher::ReadSession;
use crate::error::{AuthKind, Error};
use crate::session::{Credential, Session};

/// Result code of [`Client::connect`], mirroring the original package's
/// integer status constants (§6): `SUCCESS = 0`, `AUTH_USER = 1`,
/// `AUTH_PASSWD = 2`, `INTERNAL_ERROR = 255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    Success = 0,
    AuthUser = 1,
    AuthPasswd = 2,
    InternalError = 255,
}

/// The public synchronous façade over one session. Construction does not
/// connect; call [`Client::connect`] to perform the handshake.
pub struct Client {
    config: ClientConfig,
    session: Option<Session>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    /// Authenticate with the local service and attach the bulk-data windows.
    /// Rejects a second `connect()` on an already-connected client (forbid
    /// reentrant connect, §9).
    pub fn connect(&mut self, username: &str, password_digest: [u8; 32]) -> ConnectStatus {
        if self.session.as_ref().is_some_and(Session::is_connected) {
            log::warn!("client: connect called while already connected");
            return ConnectStatus::InternalError;
        }

        let credential = Credential {
            username: username.to_string(),
            digest: password_digest,
        };
        match Session::connect(&self.config, credential) {
            Ok(session) => {
                self.session = Some(session);
                ConnectStatus::Success
            }
            Err(Error::Auth { kind, message }) => {
                log::warn!("client: connect auth failure: {message}");
                match kind {
                    AuthKind::UnknownUser => ConnectStatus::AuthUser,
                    AuthKind::WrongPassword => ConnectStatus::AuthPasswd,
                    AuthKind::NotConnected => ConnectStatus::InternalError,
                }
            }
            Err(e) => {
                log::error!("client: connect failed: {e}");
                ConnectStatus::InternalError
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_connected)
    }

    /// Write `data` to `path`, driving the full credit-flow write protocol
    /// (§4.5) to completion before returning.
    pub fn write(&mut self, path: &str, data: &[u8]) -> Result<(), Error> {
        if path.is_empty() {
            return Err(Error::Protocol("empty path".to_string()));
        }
        self.session_mut()?.write(path, data)
    }

    /// Begin a read of `path`, returning a pull-driven chunk sequence. The
    /// initiation phase (§4.6) has already completed by the time this
    /// returns; bytes are fetched lazily as the caller pulls.
    pub fn read(&mut self, path: &str) -> Result<ReadStream<'_>, Error> {
        if path.is_empty() {
            return Err(Error::Protocol("empty path".to_string()));
        }
        let inner = self.session_mut()?.start_read(path)?;
        Ok(ReadStream { inner })
    }

    pub fn delete(&mut self, path: &str) -> Result<(), Error> {
        if path.is_empty() {
            return Err(Error::Protocol("empty path".to_string()));
        }
        self.session_mut()?.delete(path)
    }

    pub fn set_properties<'a, I>(&mut self, items: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.session_mut()?.set_properties(items)
    }

    /// Idempotent close: swallows all errors, never raises (§7).
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    fn session_mut(&mut self) -> Result<&mut Session, Error> {
        self.session
            .as_mut()
            .filter(|s| s.is_connected())
            .ok_or_else(|| Error::auth(AuthKind::NotConnected, "client is not connected"))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

/// A pull-driven sequence of byte chunks for one read operation (§4.6, §9
/// "lazy read producer"). Total size is not known in advance; iterate with
/// [`ReadStream::next_chunk`] until it returns `Ok(None)`.
pub struct ReadStream<'a> {
    inner: ReadSession<'a>,
}

impl<'a> ReadStream<'a> {
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, Error> {
        self.inner.next_chunk()
    }
}
