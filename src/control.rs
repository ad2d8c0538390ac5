// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Control-socket transport: a UNIX stream socket carrying framed binary
// messages (see `codec`). Connect retries on connection-refused; `recv`
// reassembles partial reads and tolerates a `Status` substitution for any
// expected type, since the service may report an error at any point.
//
// Port of `singstorage/ipc.py`'s `SocketIPC` (`connect_to_service`'s
// `ECONNREFUSED` retry loop, `send_request`/`recv_request`'s header-then-body
// framing).

use std::io::{self, Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;

use crate::codec::{CodecError, Message, MessageType, HEADER_LEN};
use crate::config::ClientConfig;
use crate::error::{Error, InternalKind};

/// A framed control-socket connection to the local service.
pub struct ControlTransport {
    stream: UnixStream,
    closed: bool,
}

impl ControlTransport {
    /// Connect to `config.socket_path`, retrying on connection-refused up to
    /// `config.connect_retries` additional times with `config.connect_retry_delay`
    /// between attempts. Any other failure, or exhaustion of retries, fails
    /// with `Error::Internal(Ipc)`.
    pub fn connect(config: &ClientConfig) -> Result<Self, Error> {
        let mut attempt = 0u32;
        loop {
            match UnixStream::connect(&config.socket_path) {
                Ok(stream) => {
                    log::debug!(
                        "control transport connected to {} after {attempt} retr{}",
                        config.socket_path,
                        if attempt == 1 { "y" } else { "ies" }
                    );
                    return Ok(ControlTransport {
                        stream,
                        closed: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    if attempt >= config.connect_retries {
                        log::warn!(
                            "control transport connect to {} refused after {attempt} retries",
                            config.socket_path
                        );
                        return Err(Error::internal_with(InternalKind::Ipc, e));
                    }
                    attempt += 1;
                    log::debug!(
                        "control transport connect to {} refused, retry {attempt}/{}",
                        config.socket_path,
                        config.connect_retries
                    );
                    thread::sleep(config.connect_retry_delay);
                }
                Err(e) => return Err(Error::internal_with(InternalKind::Ipc, e)),
            }
        }
    }

    /// Send a message in full. Short writes are not possible at this API
    /// surface (`write_all`).
    pub fn send(&mut self, msg: &Message) -> Result<(), Error> {
        let bytes = msg
            .encode()
            .map_err(|e| Error::internal_with(InternalKind::Protocol, to_io_error(e)))?;
        self.stream
            .write_all(&bytes)
            .map_err(|e| Error::internal_with(InternalKind::Ipc, e))
    }

    /// Receive a message, tolerating a `Status` substitution for any
    /// `expected_type`. Any other type mismatch is a protocol error.
    pub fn recv(&mut self, expected_type: MessageType) -> Result<Message, Error> {
        self.recv_one_of(&[expected_type])
    }

    /// Receive a message whose type must be one of `expected_types`, still
    /// tolerating a `Status` substitution regardless of what was expected.
    /// Used by the write protocol's Phase-C acknowledgement wait, which must
    /// accept either `Read` or `Release` (§4.5 Phase C, §9 open question 1).
    pub fn recv_one_of(&mut self, expected_types: &[MessageType]) -> Result<Message, Error> {
        let mut header = [0u8; HEADER_LEN];
        self.read_exact_mapped(&mut header)?;
        let length = u32::from_le_bytes(header[5..9].try_into().unwrap()) as usize;
        if length < HEADER_LEN {
            return Err(Error::internal(InternalKind::Protocol));
        }
        let mut buf = vec![0u8; length];
        buf[..HEADER_LEN].copy_from_slice(&header);
        self.read_exact_mapped(&mut buf[HEADER_LEN..])?;

        let msg = Message::decode(&buf)
            .map_err(|_| Error::internal(InternalKind::Protocol))?;

        let ty = msg.message_type();
        if ty == MessageType::Status || expected_types.contains(&ty) {
            return Ok(msg);
        }
        Err(Error::internal(InternalKind::Protocol))
    }

    fn read_exact_mapped(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        self.stream.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::internal_with(InternalKind::Read, e)
            } else {
                Error::internal_with(InternalKind::Ipc, e)
            }
        })
    }

    /// Close the transport: send `Close`, await `Status`, resending once more
    /// if the service replies `STAT_AMBG`. Errors during teardown are
    /// swallowed; the transport is marked closed unconditionally.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let close_msg = Message::new(0, crate::codec::MessageBody::Close);
        if self.send(&close_msg).is_err() {
            log::warn!("control transport: failed to send Close during teardown");
            return;
        }
        match self.recv(MessageType::Status) {
            Ok(reply) => {
                if let crate::codec::MessageBody::Status { status } = reply.body {
                    if crate::codec::StatusCode::from_u16(status)
                        == crate::codec::StatusCode::ErrAmbg
                    {
                        let _ = self.send(&close_msg);
                        let _ = self.recv(MessageType::Status);
                    }
                }
            }
            Err(e) => log::warn!("control transport: teardown status recv failed: {e}"),
        }
    }
}

impl Drop for ControlTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_io_error(e: CodecError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e.to_string())
}
