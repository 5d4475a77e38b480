//! A minimal loopback HTTP responder standing in for the push gateway.
//!
//! Serves one request per connection from a canned reply list (the last
//! reply repeats) and records every raw request for inspection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub struct MockGateway {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockGateway {
    pub async fn spawn(replies: Vec<(u16, &str)>) -> Self {
        let replies: Vec<(u16, String)> = replies
            .into_iter()
            .map(|(code, body)| (code, body.to_owned()))
            .collect();
        assert!(!replies.is_empty(), "need at least one canned reply");

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (task_hits, task_requests) = (Arc::clone(&hits), Arc::clone(&requests));
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let served = task_hits.fetch_add(1, Ordering::SeqCst);
                let (code, body) = replies
                    .get(served)
                    .unwrap_or_else(|| replies.last().unwrap())
                    .clone();

                let request = read_request(&mut stream).await;
                task_requests.lock().unwrap().push(request);

                let reply = format!(
                    "HTTP/1.1 {code} Canned\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            addr,
            hits,
            requests,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Number of requests served so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// The nth raw request (headers and body).
    pub fn request(&self, n: usize) -> String {
        self.requests.lock().unwrap()[n].clone()
    }

    /// The nth request body.
    pub fn body(&self, n: usize) -> String {
        let raw = self.request(n);
        match raw.find("\r\n\r\n") {
            Some(pos) => raw[pos + 4..].to_owned(),
            None => String::new(),
        }
    }
}

/// Read one HTTP/1.1 request: headers, then `Content-Length` body bytes.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..pos]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() - (pos + 4) >= length {
                return String::from_utf8_lossy(&buf).into_owned();
            }
        }

        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&buf).into_owned(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}
