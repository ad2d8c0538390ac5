// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Wire message codec: a fixed 9-byte little-endian header
// (type:u8, id:u32, length:u32) followed by a per-type body, tightly
// packed with no padding. `encode` is total; `decode` fails on truncation
// or an unrecognized type byte. The codec does no I/O.
//
// Field layouts follow the message shapes negotiated between the client
// and the co-located service; the status-code table and per-type bodies
// are a generalization of the early `messages.py` draft (`InterMessage`
// subclasses), corrected and extended to the full nine-type wire format.

use std::convert::TryFrom;

pub const HEADER_LEN: usize = 9;
const SHM_NAME_LEN: usize = 32;
const DIGEST_LEN: usize = 32;

/// One of the nine wire message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Status = 0,
    Auth = 1,
    Read = 2,
    Write = 3,
    ConReply = 4,
    Close = 5,
    Delete = 6,
    Release = 7,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(v: u8) -> Result<Self, CodecError> {
        Ok(match v {
            0 => MessageType::Status,
            1 => MessageType::Auth,
            2 => MessageType::Read,
            3 => MessageType::Write,
            4 => MessageType::ConReply,
            5 => MessageType::Close,
            6 => MessageType::Delete,
            7 => MessageType::Release,
            other => return Err(CodecError::UnknownType(other)),
        })
    }
}

/// Wire status codes carried in the body of a `Status` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum StatusCode {
    Success = 0,
    ErrAuthUser = 1,
    ErrAuthPass = 2,
    ErrPath = 3,
    ErrDeny = 4,
    ErrQuota = 5,
    ErrDataLarge = 6,
    ErrDataSmall = 7,
    ErrContent = 8,
    ErrParams = 9,
    ErrProt = 10,
    ErrLock = 11,
    StatPartRead = 12,
    StatPartWrite = 13,
    StatClose = 14,
    ErrAmbg = 254,
    ErrInter = 255,
}

impl StatusCode {
    pub fn from_u16(v: u16) -> Self {
        match v {
            0 => StatusCode::Success,
            1 => StatusCode::ErrAuthUser,
            2 => StatusCode::ErrAuthPass,
            3 => StatusCode::ErrPath,
            4 => StatusCode::ErrDeny,
            5 => StatusCode::ErrQuota,
            6 => StatusCode::ErrDataLarge,
            7 => StatusCode::ErrDataSmall,
            8 => StatusCode::ErrContent,
            9 => StatusCode::ErrParams,
            10 => StatusCode::ErrProt,
            11 => StatusCode::ErrLock,
            12 => StatusCode::StatPartRead,
            13 => StatusCode::StatPartWrite,
            14 => StatusCode::StatClose,
            254 => StatusCode::ErrAmbg,
            _ => StatusCode::ErrInter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Truncated,
    UnknownType(u8),
    PathTooLong(usize),
    NameTooLong(usize),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Truncated => write!(f, "truncated message"),
            CodecError::UnknownType(t) => write!(f, "unknown message type {t}"),
            CodecError::PathTooLong(n) => write!(f, "path length {n} exceeds u16 range"),
            CodecError::NameTooLong(n) => write!(f, "name length {n} exceeds u16 range"),
        }
    }
}

impl std::error::Error for CodecError {}

/// The decoded body of a message, one variant per [`MessageType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Status { status: u16 },
    Auth { name: String, digest: [u8; DIGEST_LEN] },
    Read { path: String, prop_bitmap: u32 },
    Write {
        path: String,
        prop_bitmap: u32,
        mem_addr: u64,
        data_length: u64,
    },
    ConReply {
        write_addr: u64,
        write_size: u32,
        read_addr: u64,
        read_size: u32,
        write_name: [u8; SHM_NAME_LEN],
        read_name: [u8; SHM_NAME_LEN],
    },
    Close,
    Delete { path: String },
    Release { path: String, merge_id: u32 },
}

impl MessageBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Status { .. } => MessageType::Status,
            MessageBody::Auth { .. } => MessageType::Auth,
            MessageBody::Read { .. } => MessageType::Read,
            MessageBody::Write { .. } => MessageType::Write,
            MessageBody::ConReply { .. } => MessageType::ConReply,
            MessageBody::Close => MessageType::Close,
            MessageBody::Delete { .. } => MessageType::Delete,
            MessageBody::Release { .. } => MessageType::Release,
        }
    }
}

/// A full wire message: header fields plus a typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u32,
    pub body: MessageBody,
}

impl Message {
    pub fn new(id: u32, body: MessageBody) -> Self {
        Self { id, body }
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Encode this message to its wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut body_buf = Vec::new();
        encode_body(&self.body, &mut body_buf)?;

        let length = HEADER_LEN + body_buf.len();
        let mut out = Vec::with_capacity(length);
        out.push(self.body.message_type() as u8);
        out.extend_from_slice(&self.id.to_le_bytes());
        out.extend_from_slice(&(length as u32).to_le_bytes());
        out.extend_from_slice(&body_buf);
        Ok(out)
    }

    /// Decode a complete message (header + body) from `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_LEN {
            return Err(CodecError::Truncated);
        }
        let ty = MessageType::try_from(buf[0])?;
        let id = u32::from_le_bytes(buf[1..5].try_into().unwrap());
        let length = u32::from_le_bytes(buf[5..9].try_into().unwrap()) as usize;
        if buf.len() < length {
            return Err(CodecError::Truncated);
        }
        let body = decode_body(ty, &buf[HEADER_LEN..length])?;
        Ok(Message { id, body })
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(CodecError::PathTooLong(bytes.len()));
    }
    out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(bytes);
    Ok(())
}

fn take_string(buf: &[u8], off: &mut usize) -> Result<String, CodecError> {
    if buf.len() < *off + 2 {
        return Err(CodecError::Truncated);
    }
    let len = u16::from_le_bytes(buf[*off..*off + 2].try_into().unwrap()) as usize;
    *off += 2;
    if buf.len() < *off + len {
        return Err(CodecError::Truncated);
    }
    let s = String::from_utf8_lossy(&buf[*off..*off + len]).into_owned();
    *off += len;
    Ok(s)
}

fn encode_body(body: &MessageBody, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match body {
        MessageBody::Status { status } => {
            out.extend_from_slice(&status.to_le_bytes());
        }
        MessageBody::Auth { name, digest } => {
            put_string(out, name)?;
            out.extend_from_slice(digest);
        }
        MessageBody::Read { path, prop_bitmap } => {
            put_string(out, path)?;
            out.extend_from_slice(&prop_bitmap.to_le_bytes());
        }
        MessageBody::Write {
            path,
            prop_bitmap,
            mem_addr,
            data_length,
        } => {
            put_string(out, path)?;
            out.extend_from_slice(&prop_bitmap.to_le_bytes());
            out.extend_from_slice(&mem_addr.to_le_bytes());
            out.extend_from_slice(&data_length.to_le_bytes());
        }
        MessageBody::ConReply {
            write_addr,
            write_size,
            read_addr,
            read_size,
            write_name,
            read_name,
        } => {
            out.extend_from_slice(&write_addr.to_le_bytes());
            out.extend_from_slice(&write_size.to_le_bytes());
            out.extend_from_slice(&read_addr.to_le_bytes());
            out.extend_from_slice(&read_size.to_le_bytes());
            out.extend_from_slice(write_name);
            out.extend_from_slice(read_name);
        }
        MessageBody::Close => {}
        MessageBody::Delete { path } => {
            put_string(out, path)?;
        }
        MessageBody::Release { path, merge_id } => {
            put_string(out, path)?;
            out.extend_from_slice(&merge_id.to_le_bytes());
        }
    }
    Ok(())
}

fn decode_body(ty: MessageType, buf: &[u8]) -> Result<MessageBody, CodecError> {
    let mut off = 0usize;
    Ok(match ty {
        MessageType::Status => {
            if buf.len() < 2 {
                return Err(CodecError::Truncated);
            }
            let status = u16::from_le_bytes(buf[0..2].try_into().unwrap());
            MessageBody::Status { status }
        }
        MessageType::Auth => {
            let name = take_string(buf, &mut off)?;
            if buf.len() < off + DIGEST_LEN {
                return Err(CodecError::Truncated);
            }
            let mut digest = [0u8; DIGEST_LEN];
            digest.copy_from_slice(&buf[off..off + DIGEST_LEN]);
            MessageBody::Auth { name, digest }
        }
        MessageType::Read => {
            let path = take_string(buf, &mut off)?;
            if buf.len() < off + 4 {
                return Err(CodecError::Truncated);
            }
            let prop_bitmap = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            MessageBody::Read { path, prop_bitmap }
        }
        MessageType::Write => {
            let path = take_string(buf, &mut off)?;
            if buf.len() < off + 4 + 8 + 8 {
                return Err(CodecError::Truncated);
            }
            let prop_bitmap = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            off += 4;
            let mem_addr = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
            off += 8;
            let data_length = u64::from_le_bytes(buf[off..off + 8].try_into().unwrap());
            MessageBody::Write {
                path,
                prop_bitmap,
                mem_addr,
                data_length,
            }
        }
        MessageType::ConReply => {
            let need = 8 + 4 + 8 + 4 + SHM_NAME_LEN + SHM_NAME_LEN;
            if buf.len() < need {
                return Err(CodecError::Truncated);
            }
            let write_addr = u64::from_le_bytes(buf[0..8].try_into().unwrap());
            let write_size = u32::from_le_bytes(buf[8..12].try_into().unwrap());
            let read_addr = u64::from_le_bytes(buf[12..20].try_into().unwrap());
            let read_size = u32::from_le_bytes(buf[20..24].try_into().unwrap());
            let mut write_name = [0u8; SHM_NAME_LEN];
            write_name.copy_from_slice(&buf[24..24 + SHM_NAME_LEN]);
            let mut read_name = [0u8; SHM_NAME_LEN];
            read_name.copy_from_slice(&buf[24 + SHM_NAME_LEN..24 + 2 * SHM_NAME_LEN]);
            MessageBody::ConReply {
                write_addr,
                write_size,
                read_addr,
                read_size,
                write_name,
                read_name,
            }
        }
        MessageType::Close => MessageBody::Close,
        MessageType::Delete => {
            let path = take_string(buf, &mut off)?;
            MessageBody::Delete { path }
        }
        MessageType::Release => {
            let path = take_string(buf, &mut off)?;
            if buf.len() < off + 4 {
                return Err(CodecError::Truncated);
            }
            let merge_id = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
            MessageBody::Release { path, merge_id }
        }
    })
}

/// Pack a shared-memory name (as reported in `ConReply`) into a fixed
/// 32-byte, NUL-padded field.
pub fn pack_shm_name(name: &str) -> [u8; SHM_NAME_LEN] {
    let mut out = [0u8; SHM_NAME_LEN];
    let bytes = name.as_bytes();
    let n = bytes.len().min(SHM_NAME_LEN);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// Unpack a fixed 32-byte NUL-padded shared-memory name field back to a string.
pub fn unpack_shm_name(field: &[u8; SHM_NAME_LEN]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(SHM_NAME_LEN);
    String::from_utf8_lossy(&field[..end]).into_owned()
}
