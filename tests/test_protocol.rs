// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// End-to-end protocol scenarios (spec §8): a fake local service is stood up
// on a real UNIX socket plus real POSIX shared-memory segments, and the
// public `Client` façade is driven against it exactly as a real application
// would. These exercise the write credit-flow/chunking, the read chunk
// stream, and the admission-rejection paths together, rather than each in
// isolation.

use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use singstorage_client::codec::{pack_shm_name, Message, MessageBody, MessageType, StatusCode};
use singstorage_client::{Client, ClientConfig, ConnectStatus, Error, InternalKind, ShmHandle, ShmOpenMode};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unique_tag() -> usize {
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

fn socket_path() -> String {
    format!("/tmp/sing_test_proto_{}_{}.sock", std::process::id(), unique_tag())
}

fn shm_name(tag: &str) -> String {
    format!("sing_test_proto_{tag}_{}_{}", unique_tag(), std::process::id())
}

fn read_message(sock: &mut UnixStream) -> Message {
    let mut header = [0u8; singstorage_client::codec::HEADER_LEN];
    sock.read_exact(&mut header).expect("read header");
    let length = u32::from_le_bytes(header[5..9].try_into().unwrap()) as usize;
    let mut buf = vec![0u8; length];
    buf[..singstorage_client::codec::HEADER_LEN].copy_from_slice(&header);
    sock.read_exact(&mut buf[singstorage_client::codec::HEADER_LEN..])
        .expect("read body");
    Message::decode(&buf).expect("decode")
}

fn send_message(sock: &mut UnixStream, msg: &Message) {
    sock.write_all(&msg.encode().unwrap()).expect("write message");
}

fn connect_client(config: &ClientConfig) -> Client {
    let mut client = Client::new(config.clone());
    assert_eq!(client.connect("alice", [7u8; 32]), ConnectStatus::Success);
    client
}

/// Drive the handshake on the fake-service side: consume `Auth`, reply with
/// `ConReply` naming `write_name`/`read_name` (already-created shm segments).
fn handshake_as_service(
    sock: &mut UnixStream,
    write_name: &str,
    write_size: u32,
    read_name: &str,
    read_size: u32,
) {
    let auth = read_message(sock);
    assert_eq!(auth.message_type(), MessageType::Auth);
    let reply = Message::new(
        0,
        MessageBody::ConReply {
            write_addr: 0,
            write_size,
            read_addr: 1_000_000,
            read_size,
            write_name: pack_shm_name(write_name),
            read_name: pack_shm_name(read_name),
        },
    );
    send_message(sock, &reply);
}

// Scenario 1 (§8): happy write through a window far smaller than the
// payload, forcing several chunk/ack round-trips whose lengths sum to the
// original data length.
#[test]
fn happy_write_chunks_through_small_window_and_acks() {
    let path = socket_path();
    let listener = UnixListener::bind(&path).expect("bind");

    let w_name = shm_name("write");
    let r_name = shm_name("read");
    let _write_creator = ShmHandle::acquire(&w_name, 16, ShmOpenMode::Create).expect("create write shm");
    let _read_creator = ShmHandle::acquire(&r_name, 64, ShmOpenMode::Create).expect("create read shm");

    let w_name_bg = w_name.clone();
    let r_name_bg = r_name.clone();
    let data = vec![0xABu8; 40]; // 16 + 16 + 8 with a 16-byte window
    let expected_total = data.len() as u64;

    let server = thread::spawn(move || {
        let (mut sock, _) = listener.accept().expect("accept");
        handshake_as_service(&mut sock, &w_name_bg, 16, &r_name_bg, 64);

        let admission = read_message(&mut sock);
        assert_eq!(admission.message_type(), MessageType::Write);
        let primary = admission.id;
        match admission.body {
            MessageBody::Write { data_length, .. } => assert_eq!(data_length, expected_total),
            _ => panic!("expected Write admission"),
        }
        // Acceptance: READ{path, prop_bitmap=1, id=primary}.
        send_message(
            &mut sock,
            &Message::new(
                primary,
                MessageBody::Read {
                    path: "/big".to_string(),
                    prop_bitmap: 1,
                },
            ),
        );

        let mut received = 0u64;
        let mut chunk_count = 0u32;
        while received < expected_total {
            let chunk = read_message(&mut sock);
            assert_eq!(chunk.message_type(), MessageType::Write);
            let (tid, len) = match chunk.body {
                MessageBody::Write { data_length, mem_addr, .. } => {
                    assert!(mem_addr < 16, "chunk address must stay inside the 16-byte window");
                    (chunk.id, data_length)
                }
                _ => panic!("expected chunk Write"),
            };
            received += len;
            chunk_count += 1;
            // Alternate Read/Release acks — both must flow-control identically.
            let ack = if chunk_count % 2 == 0 {
                Message::new(
                    tid,
                    MessageBody::Release {
                        path: "/big".to_string(),
                        merge_id: tid,
                    },
                )
            } else {
                Message::new(
                    tid,
                    MessageBody::Read {
                        path: "/big".to_string(),
                        prop_bitmap: 0,
                    },
                )
            };
            send_message(&mut sock, &ack);
        }
        assert_eq!(received, expected_total);
        assert!(chunk_count >= 3, "a 40-byte write through a 16-byte window needs at least 3 chunks");
    });

    let cfg = ClientConfig {
        socket_path: path.clone(),
        ..Default::default()
    };
    let mut client = connect_client(&cfg);
    client.write("/big", &data).expect("write should succeed");
    client.close();

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

// Scenario 2 (§8): admission rejected with ERR_PATH, no chunks sent.
#[test]
fn write_to_unknown_path_surfaces_path_not_found() {
    let path = socket_path();
    let listener = UnixListener::bind(&path).expect("bind");

    let w_name = shm_name("write");
    let r_name = shm_name("read");
    let _write_creator = ShmHandle::acquire(&w_name, 1024, ShmOpenMode::Create).expect("create write shm");
    let _read_creator = ShmHandle::acquire(&r_name, 1024, ShmOpenMode::Create).expect("create read shm");
    let w_name_bg = w_name.clone();
    let r_name_bg = r_name.clone();

    let server = thread::spawn(move || {
        let (mut sock, _) = listener.accept().expect("accept");
        handshake_as_service(&mut sock, &w_name_bg, 1024, &r_name_bg, 1024);

        let admission = read_message(&mut sock);
        assert_eq!(admission.message_type(), MessageType::Write);
        send_message(
            &mut sock,
            &Message::new(
                admission.id,
                MessageBody::Status {
                    status: StatusCode::ErrPath as u16,
                },
            ),
        );
        // No write chunks should ever arrive — only the client's teardown
        // `Close`, which this thread answers to let `client.close()` finish.
        let close_req = read_message(&mut sock);
        assert_eq!(close_req.message_type(), MessageType::Close);
        send_message(
            &mut sock,
            &Message::new(
                close_req.id,
                MessageBody::Status {
                    status: StatusCode::Success as u16,
                },
            ),
        );
    });

    let cfg = ClientConfig {
        socket_path: path.clone(),
        ..Default::default()
    };
    let mut client = connect_client(&cfg);
    let err = client.write("/missing", b"hello").unwrap_err();
    assert!(matches!(err, Error::PathNotFound(p) if p == "/missing"));
    client.close();

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

// Scenario 3 (§8): a read delivered in three chunks, terminated by a
// zero-length chunk, each chunk acknowledged before the next is requested.
#[test]
fn read_delivers_three_chunks_then_terminates() {
    let path = socket_path();
    let listener = UnixListener::bind(&path).expect("bind");

    let w_name = shm_name("write");
    let r_name = shm_name("read");
    let _write_creator = ShmHandle::acquire(&w_name, 1024, ShmOpenMode::Create).expect("create write shm");
    let read_creator = ShmHandle::acquire(&r_name, 64, ShmOpenMode::Create).expect("create read shm");

    let chunks: [&[u8]; 3] = [b"hello", b"-world-", b"!!"];
    unsafe {
        let mut off = 0usize;
        for c in &chunks {
            std::ptr::copy_nonoverlapping(c.as_ptr(), read_creator.as_mut_ptr().add(off), c.len());
            off += c.len();
        }
    }
    let base_read_addr = 1_000_000u64;

    let w_name_bg = w_name.clone();
    let r_name_bg = r_name.clone();

    let server = thread::spawn(move || {
        let (mut sock, _) = listener.accept().expect("accept");
        handshake_as_service(&mut sock, &w_name_bg, 1024, &r_name_bg, 64);

        let init = read_message(&mut sock);
        assert_eq!(init.message_type(), MessageType::Read);
        let primary = init.id;

        let mut off = 0u64;
        for c in &chunks {
            send_message(
                &mut sock,
                &Message::new(
                    primary,
                    MessageBody::Write {
                        path: "/obj".to_string(),
                        prop_bitmap: 1,
                        mem_addr: base_read_addr + off,
                        data_length: c.len() as u64,
                    },
                ),
            );
            off += c.len() as u64;
            let ack = read_message(&mut sock);
            assert_eq!(ack.message_type(), MessageType::Read);
        }
        // Terminal chunk.
        send_message(
            &mut sock,
            &Message::new(
                primary,
                MessageBody::Write {
                    path: "/obj".to_string(),
                    prop_bitmap: 0,
                    mem_addr: 0,
                    data_length: 0,
                },
            ),
        );
        let final_ack = read_message(&mut sock);
        assert_eq!(final_ack.message_type(), MessageType::Read);
    });

    let cfg = ClientConfig {
        socket_path: path.clone(),
        ..Default::default()
    };
    let mut client = connect_client(&cfg);
    let mut stream = client.read("/obj").expect("read initiation should succeed");

    let mut collected = Vec::new();
    for _ in 0..chunks.len() {
        let chunk = stream.next_chunk().expect("chunk pull should succeed");
        collected.push(chunk.expect("expected a data chunk"));
    }
    let end = stream.next_chunk().expect("terminal pull should succeed");
    assert!(end.is_none(), "stream should end after the terminal chunk");

    let concatenated: Vec<u8> = collected.into_iter().flatten().collect();
    let expected: Vec<u8> = chunks.iter().flat_map(|c| c.to_vec()).collect();
    assert_eq!(concatenated, expected);

    drop(stream);
    client.close();

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

// Scenario 4 (§8): delete denied.
#[test]
fn delete_denied_surfaces_path_denied() {
    let path = socket_path();
    let listener = UnixListener::bind(&path).expect("bind");

    let w_name = shm_name("write");
    let r_name = shm_name("read");
    let _write_creator = ShmHandle::acquire(&w_name, 1024, ShmOpenMode::Create).expect("create write shm");
    let _read_creator = ShmHandle::acquire(&r_name, 1024, ShmOpenMode::Create).expect("create read shm");
    let w_name_bg = w_name.clone();
    let r_name_bg = r_name.clone();

    let server = thread::spawn(move || {
        let (mut sock, _) = listener.accept().expect("accept");
        handshake_as_service(&mut sock, &w_name_bg, 1024, &r_name_bg, 1024);

        let req = read_message(&mut sock);
        assert_eq!(req.message_type(), MessageType::Delete);
        send_message(
            &mut sock,
            &Message::new(
                req.id,
                MessageBody::Status {
                    status: StatusCode::ErrDeny as u16,
                },
            ),
        );
    });

    let cfg = ClientConfig {
        socket_path: path.clone(),
        ..Default::default()
    };
    let mut client = connect_client(&cfg);
    let err = client.delete("/secret").unwrap_err();
    assert!(matches!(err, Error::PathDenied(p) if p == "/secret"));
    client.close();

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

// Scenario 5 (§8): an out-of-range read chunk address surfaces
// Internal(Read) and the client reports the corruption back to the service.
#[test]
fn out_of_range_read_chunk_surfaces_internal_read() {
    let path = socket_path();
    let listener = UnixListener::bind(&path).expect("bind");

    let w_name = shm_name("write");
    let r_name = shm_name("read");
    let _write_creator = ShmHandle::acquire(&w_name, 1024, ShmOpenMode::Create).expect("create write shm");
    let _read_creator = ShmHandle::acquire(&r_name, 64, ShmOpenMode::Create).expect("create read shm");
    let w_name_bg = w_name.clone();
    let r_name_bg = r_name.clone();

    let server = thread::spawn(move || {
        let (mut sock, _) = listener.accept().expect("accept");
        handshake_as_service(&mut sock, &w_name_bg, 1024, &r_name_bg, 64);

        let init = read_message(&mut sock);
        assert_eq!(init.message_type(), MessageType::Read);
        let primary = init.id;

        // Address 10_000_000 falls well outside the 64-byte read window
        // based at 1_000_000.
        send_message(
            &mut sock,
            &Message::new(
                primary,
                MessageBody::Write {
                    path: "/obj".to_string(),
                    prop_bitmap: 1,
                    mem_addr: 10_000_000,
                    data_length: 8,
                },
            ),
        );

        let status = read_message(&mut sock);
        assert_eq!(status.message_type(), MessageType::Status);
        match status.body {
            MessageBody::Status { status } => {
                assert_eq!(StatusCode::from_u16(status), StatusCode::ErrInter)
            }
            _ => unreachable!(),
        }
    });

    let cfg = ClientConfig {
        socket_path: path.clone(),
        ..Default::default()
    };
    let mut client = connect_client(&cfg);
    let mut stream = client.read("/obj").expect("read initiation should succeed");
    let err = stream.next_chunk().unwrap_err();
    assert!(matches!(
        err,
        Error::Internal {
            kind: InternalKind::Read,
            ..
        }
    ));
    drop(stream);
    client.close();

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}

// Scenario 6 (§8): connection-refused retried, then accepted.
#[test]
fn connect_retries_past_connection_refused_then_succeeds() {
    let path = socket_path();
    // Bind then drop immediately: the socket file exists, but nothing is
    // listening, so the first connect attempts fail with ECONNREFUSED.
    drop(UnixListener::bind(&path).expect("bind"));

    let w_name = shm_name("write");
    let r_name = shm_name("read");
    let _write_creator = ShmHandle::acquire(&w_name, 1024, ShmOpenMode::Create).expect("create write shm");
    let _read_creator = ShmHandle::acquire(&r_name, 1024, ShmOpenMode::Create).expect("create read shm");
    let w_name_bg = w_name.clone();
    let r_name_bg = r_name.clone();

    let path_bg = path.clone();
    let server = thread::spawn(move || {
        // Give the client's first two connect-refused retries time to
        // happen (spec §8 scenario 6: "first two ... refused; the third
        // succeeds"), then actually bind and accept.
        std::thread::sleep(std::time::Duration::from_millis(40));
        let _ = std::fs::remove_file(&path_bg);
        let listener = UnixListener::bind(&path_bg).expect("bind for real this time");
        let (mut sock, _) = listener.accept().expect("accept");
        handshake_as_service(&mut sock, &w_name_bg, 1024, &r_name_bg, 1024);
    });

    let cfg = ClientConfig {
        socket_path: path.clone(),
        connect_retries: 5,
        connect_retry_delay: std::time::Duration::from_millis(25),
    };
    let mut client = connect_client(&cfg);
    assert!(client.is_connected());
    client.close();

    server.join().unwrap();
    let _ = std::fs::remove_file(&path);
}
