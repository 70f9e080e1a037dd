//! Scripted HTTP server for transport and catalog tests.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    Respond(u16, String),
    DelayRespond(Duration, u16, String),
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub(crate) target: String,
    pub(crate) headers: String,
}

#[derive(Debug)]
pub(crate) struct TestServer {
    base_url: String,
    requests: Arc<AtomicUsize>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
    shutdown_tx: mpsc::Sender<()>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TestServer {
    pub(crate) fn spawn(behaviors: Vec<Behavior>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind test server");
        listener.set_nonblocking(true).expect("set nonblocking");
        let addr = listener.local_addr().expect("local addr");

        let requests = Arc::new(AtomicUsize::new(0));
        let requests_clone = Arc::clone(&requests);
        let recorded = Arc::new(Mutex::new(Vec::new()));
        let recorded_clone = Arc::clone(&recorded);
        let shared_behaviors = Arc::new(Mutex::new(VecDeque::from(behaviors)));
        let behaviors_clone = Arc::clone(&shared_behaviors);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join_handle = std::thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                match listener.accept() {
                    Ok((mut stream, _)) => {
                        requests_clone.fetch_add(1, Ordering::SeqCst);
                        let behavior = {
                            let mut queue = behaviors_clone.lock().expect("lock behaviors");
                            queue.pop_front().unwrap_or_else(|| {
                                Behavior::Respond(200, "default-ok".to_string())
                            })
                        };
                        let recorded = Arc::clone(&recorded_clone);
                        std::thread::spawn(move || {
                            if let Ok(request) = consume_request(&mut stream) {
                                recorded.lock().expect("lock recorded").push(request);
                            }
                            serve_behavior(&mut stream, behavior);
                        });
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            recorded,
            shutdown_tx,
            join_handle: Some(join_handle),
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<RecordedRequest> {
        self.recorded.lock().expect("lock recorded").clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

fn consume_request(stream: &mut TcpStream) -> std::io::Result<RecordedRequest> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(Duration::from_millis(200)))?;
    let mut buf = [0_u8; 1024];
    let mut data = Vec::new();
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => {
                data.extend_from_slice(&buf[..read]);
                if data.windows(4).any(|window| window == b"\r\n\r\n") {
                    break;
                }
            }
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                break;
            }
            Err(err) => return Err(err),
        }
    }

    let raw = String::from_utf8_lossy(&data).to_string();
    let (request_line, headers) = raw.split_once("\r\n").unwrap_or((raw.as_str(), ""));
    let target = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or_default()
        .to_string();
    Ok(RecordedRequest {
        target,
        headers: headers.to_string(),
    })
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Status",
    }
}

fn serve_behavior(stream: &mut TcpStream, behavior: Behavior) {
    match behavior {
        Behavior::Respond(status, body) => {
            let _ = write_response(stream, status, &body);
        }
        Behavior::DelayRespond(delay, status, body) => {
            std::thread::sleep(delay);
            let _ = write_response(stream, status, &body);
        }
    }
}

fn write_response(stream: &mut TcpStream, status: u16, body: &str) -> std::io::Result<()> {
    let reason = reason_phrase(status);
    let payload = body.as_bytes();
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        payload.len()
    )?;
    stream.write_all(payload)?;
    stream.flush()
}
