//! Loopback update server.
//!
//! Serves `/firmware/{project}/versions` and `/user{1,2}.bin` for a fixed
//! number of connections, recording every request line.

use std::io::{Read, Write};
use std::net::{SocketAddr, SocketAddrV4, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

pub struct MockServer {
    pub addr: SocketAddrV4,
    pub requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
pub struct Catalogue {
    /// Body of the version answer, verbatim.
    pub versions_body: String,
    pub versions_status: u16,
    pub image: Vec<u8>,
}

impl Catalogue {
    pub fn offering(version: &str, image: &[u8]) -> Self {
        Self {
            versions_body: format!("{{\"version\":\"{}\"}}", version),
            versions_status: 200,
            image: image.to_vec(),
        }
    }
}

impl MockServer {
    /// Answer `connections` requests, then stop.
    pub fn spawn(catalogue: Catalogue, connections: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let SocketAddr::V4(addr) = listener.local_addr().unwrap() else {
            panic!("expected IPv4");
        };
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        let handle = std::thread::spawn(move || {
            for _ in 0..connections {
                let Ok((mut s, _)) = listener.accept() else {
                    return;
                };
                let head = read_head(&mut s);
                let line = head.lines().next().unwrap_or_default().to_string();
                log.lock().unwrap().push(head.clone());

                let (status, body) = route(&catalogue, &line);
                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = s.write_all(reply.as_bytes());
                let _ = s.write_all(&body);
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn request_lines(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.lines().next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn join(self) -> Vec<String> {
        let lines = self.request_lines();
        self.handle.join().unwrap();
        lines
    }
}

fn route(catalogue: &Catalogue, line: &str) -> (u16, Vec<u8>) {
    let path = line.split_whitespace().nth(1).unwrap_or("/");
    if path.starts_with("/firmware/") && path.ends_with("/versions") {
        (
            catalogue.versions_status,
            catalogue.versions_body.clone().into_bytes(),
        )
    } else if path == "/user1.bin" || path == "/user2.bin" {
        (200, catalogue.image.clone())
    } else {
        (404, Vec::new())
    }
}

fn read_head(s: &mut std::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 256];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match s.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}
