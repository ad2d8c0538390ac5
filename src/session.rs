// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Session handshake, state, and teardown. Owns the credential, storage
// properties, control transport, and — once the handshake completes — the
// dispatcher (which in turn owns the two shared-memory windows).
//
// Port of `internal/newcontext.py`'s `UserContext.connect_to_service` /
// `_init_shared_memory` / `close`. The original marks the user "connected"
// before the shared-memory attach has even been attempted (the `is_connected`
// check only looks at whether `_io_handler` is set, which happens regardless
// of whether `_init_shared_memory` subsequently raises); this implementation
// constructs the dispatcher, and therefore becomes connected, only after both
// windows have attached successfully (§9 note 3).

use crate::codec::{pack_shm_name, unpack_shm_name, Message, MessageBody, MessageType, StatusCode};
use crate::config::ClientConfig;
use crate::control::ControlTransport;
use crate::dispatcher::Dispatcher;
use crate::error::{AuthKind, Error, InternalKind};
use crate::properties::StorageProperties;
use crate::window::{ReadWindow, WriteWindow};

/// A connected session's credential: username plus a pre-hashed 32-byte
/// password digest. Hashing the raw password is an external collaborator's
/// job (see spec §1); this crate only ever carries the digest.
pub struct Credential {
    pub username: String,
    pub digest: [u8; 32],
}

/// Per-user session state. Exists only while connected: the dispatcher (and
/// therefore the shared-memory windows) is created exactly once, during a
/// successful handshake, and torn down on `close`.
pub struct Session {
    credential: Credential,
    properties: StorageProperties,
    transport: Option<ControlTransport>,
    dispatcher: Option<Dispatcher>,
}

impl Session {
    /// Run the full handshake (§4.4): connect, `AUTH`, await `CON_REPLY` or
    /// `STATUS`, attach both shared-memory windows, and only then construct
    /// the dispatcher. On any failure the transport (if opened) is closed and
    /// the returned session has no dispatcher.
    pub fn connect(config: &ClientConfig, credential: Credential) -> Result<Self, Error> {
        log::debug!("session: connecting user={}", credential.username);
        let mut transport = ControlTransport::connect(config)?;

        let auth = Message::new(
            0,
            MessageBody::Auth {
                name: credential.username.clone(),
                digest: credential.digest,
            },
        );
        transport.send(&auth)?;

        let reply = match transport.recv(MessageType::ConReply) {
            Ok(r) => r,
            Err(e) => {
                transport.close();
                return Err(e);
            }
        };

        let (write_addr, write_size, write_name, read_addr, read_size, read_name) =
            match reply.body {
                MessageBody::Status { status } => {
                    let code = StatusCode::from_u16(status);
                    log::warn!("session: auth rejected for user={}: {code:?}", credential.username);
                    transport.close();
                    return Err(match code {
                        StatusCode::ErrAuthUser => Error::auth(
                            AuthKind::UnknownUser,
                            format!("unknown user: {}", credential.username),
                        ),
                        StatusCode::ErrAuthPass => {
                            Error::auth(AuthKind::WrongPassword, "wrong password")
                        }
                        _ => Error::internal(InternalKind::Unknown),
                    });
                }
                MessageBody::ConReply {
                    write_addr,
                    write_size,
                    read_addr,
                    read_size,
                    write_name,
                    read_name,
                } => (
                    write_addr,
                    write_size,
                    unpack_shm_name(&write_name),
                    read_addr,
                    read_size,
                    unpack_shm_name(&read_name),
                ),
                _ => {
                    transport.close();
                    return Err(Error::internal(InternalKind::Protocol));
                }
            };

        // Names arrive over the wire as bare strings the service chose; run
        // them through the same POSIX shm-name normalization the rest of
        // this crate's shared-memory segments use, so an overlong or
        // slash-less name from the service still attaches (see §4.3).
        let write_name = crate::shm_name::make_shm_name(&write_name);
        let read_name = crate::shm_name::make_shm_name(&read_name);

        let attach_result = (|| -> Result<Dispatcher, Error> {
            let write_window = WriteWindow::attach(&write_name, write_addr, write_size)?;
            let read_window = ReadWindow::attach(&read_name, read_addr, read_size)?;
            Ok(Dispatcher::new(read_window, write_window))
        })();

        let dispatcher = match attach_result {
            Ok(d) => d,
            Err(e) => {
                log::error!("session: shared-memory attach failed: {e}");
                transport.close();
                return Err(e);
            }
        };

        log::info!("session: connected user={}", credential.username);
        Ok(Self {
            credential,
            properties: StorageProperties::new(),
            transport: Some(transport),
            dispatcher: Some(dispatcher),
        })
    }

    pub fn username(&self) -> &str {
        &self.credential.username
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_some() && self.transport.is_some()
    }

    pub fn properties(&self) -> &StorageProperties {
        &self.properties
    }

    pub fn set_properties<'a, I>(&mut self, items: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        self.properties.set_all(items)
    }

    pub fn write(&mut self, path: &str, data: &[u8]) -> Result<(), Error> {
        let (transport, dispatcher) = self.active_mut()?;
        dispatcher.write(transport, path, data)
    }

    pub fn delete(&mut self, path: &str) -> Result<(), Error> {
        let (transport, dispatcher) = self.active_mut()?;
        dispatcher.delete(transport, path)
    }

    pub fn start_read(
        &mut self,
        path: &str,
    ) -> Result<crate::dispatcher::ReadSession<'_>, Error> {
        let (transport, dispatcher) = self.active_mut()?;
        dispatcher.start_read(transport, path)
    }

    fn active_mut(&mut self) -> Result<(&mut ControlTransport, &mut Dispatcher), Error> {
        match (self.transport.as_mut(), self.dispatcher.as_mut()) {
            (Some(t), Some(d)) if !d.is_closed() => Ok((t, d)),
            _ => Err(Error::auth(AuthKind::NotConnected, "session is not connected")),
        }
    }

    /// Idempotent teardown: force all in-flight operations to terminal, close
    /// both windows, close the transport. Never raises (§7).
    pub fn close(&mut self) {
        if let Some(mut dispatcher) = self.dispatcher.take() {
            dispatcher.close_all();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        log::debug!("session: closed user={}", self.credential.username);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
