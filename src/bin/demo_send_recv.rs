// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Manual end-to-end exercise of the public façade against a live local
// service, in the style of the teacher's own `demo_send_recv` bin (plain
// `std::env::args` subcommand dispatch, no argument-parsing crate).
//
// Usage:
//   demo_send_recv write <user> <path> <bytes-as-utf8>
//   demo_send_recv read  <user> <path>
//   demo_send_recv delete <user> <path>
//
// Password hashing is out of scope for this crate (spec §1): this demo
// derives a placeholder digest from the username so it has something to send
// over the wire, not a real credential scheme.

use singstorage_client::{Client, ClientConfig, ConnectStatus};

fn placeholder_digest(username: &str) -> [u8; 32] {
    let mut digest = [0u8; 32];
    for (i, b) in username.bytes().cycle().take(32).enumerate() {
        digest[i] = b;
    }
    digest
}

fn connect(username: &str) -> Client {
    let mut client = Client::new(ClientConfig::default());
    match client.connect(username, placeholder_digest(username)) {
        ConnectStatus::Success => client,
        other => {
            eprintln!("connect failed: {other:?}");
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: demo_send_recv write|read|delete <user> <path> [bytes]");
        std::process::exit(1);
    }

    let mode = args[1].as_str();
    let user = &args[2];

    match mode {
        "write" => {
            if args.len() < 5 {
                eprintln!("usage: demo_send_recv write <user> <path> <bytes-as-utf8>");
                std::process::exit(1);
            }
            let path = &args[3];
            let data = args[4].as_bytes();
            let mut client = connect(user);
            match client.write(path, data) {
                Ok(()) => println!("write {path}: ok ({} bytes)", data.len()),
                Err(e) => eprintln!("write {path}: failed: {e}"),
            }
            client.close();
        }
        "read" => {
            if args.len() < 4 {
                eprintln!("usage: demo_send_recv read <user> <path>");
                std::process::exit(1);
            }
            let path = &args[3];
            let mut client = connect(user);
            match client.read(path) {
                Ok(mut stream) => {
                    let mut total = 0usize;
                    loop {
                        match stream.next_chunk() {
                            Ok(Some(chunk)) => total += chunk.len(),
                            Ok(None) => break,
                            Err(e) => {
                                eprintln!("read {path}: failed mid-stream: {e}");
                                break;
                            }
                        }
                    }
                    println!("read {path}: ok ({total} bytes)");
                }
                Err(e) => eprintln!("read {path}: failed: {e}"),
            }
            client.close();
        }
        "delete" => {
            if args.len() < 4 {
                eprintln!("usage: demo_send_recv delete <user> <path>");
                std::process::exit(1);
            }
            let path = &args[3];
            let mut client = connect(user);
            match client.delete(path) {
                Ok(()) => println!("delete {path}: ok"),
                Err(e) => eprintln!("delete {path}: failed: {e}"),
            }
            client.close();
        }
        other => {
            eprintln!("unknown mode: {other}");
            std::process::exit(1);
        }
    }
}
