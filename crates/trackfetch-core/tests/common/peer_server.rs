//! Minimal HTTP/1.1 fake of the peer API for integration tests.
//!
//! Answers searches with a fixed JSON response list, accepts download
//! requests, and reports each download as in progress on the first poll and
//! succeeded afterwards. One request per connection. Searches can be made to
//! never report completion.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Recorded {
    /// "METHOD /path" per request, in arrival order.
    pub requests: Vec<String>,
    /// API key seen on each request, if any.
    pub api_keys: Vec<Option<String>>,
    /// (username, request body) per download request.
    pub downloads: Vec<(String, String)>,
}

#[derive(Clone)]
pub struct PeerServer {
    pub base_url: String,
    recorded: Arc<Mutex<Recorded>>,
}

impl PeerServer {
    pub fn requests(&self) -> Vec<String> {
        self.recorded.lock().unwrap().requests.clone()
    }

    pub fn api_keys(&self) -> Vec<Option<String>> {
        self.recorded.lock().unwrap().api_keys.clone()
    }

    pub fn downloads(&self) -> Vec<(String, String)> {
        self.recorded.lock().unwrap().downloads.clone()
    }
}

struct Shared {
    responses_json: String,
    searches_complete: bool,
    required_key: Option<String>,
    recorded: Arc<Mutex<Recorded>>,
    /// username -> (filename, size, polls so far)
    transfers: Mutex<HashMap<String, (String, u64, u32)>>,
}

/// Starts the server in a background thread. `responses_json` is returned
/// verbatim from `GET /api/v0/searches/{id}/responses`.
pub fn start(responses_json: &str, required_key: Option<&str>) -> PeerServer {
    start_with(responses_json, required_key, true)
}

/// Like [`start`], but searches stay `isComplete: false` forever.
pub fn start_never_completing(responses_json: &str) -> PeerServer {
    start_with(responses_json, None, false)
}

fn start_with(responses_json: &str, required_key: Option<&str>, searches_complete: bool) -> PeerServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let recorded = Arc::new(Mutex::new(Recorded::default()));
    let shared = Arc::new(Shared {
        responses_json: responses_json.to_string(),
        searches_complete,
        required_key: required_key.map(str::to_string),
        recorded: Arc::clone(&recorded),
        transfers: Mutex::new(HashMap::new()),
    });
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let shared = Arc::clone(&shared);
            thread::spawn(move || handle(stream, &shared));
        }
    });
    PeerServer {
        base_url: format!("http://127.0.0.1:{}", port),
        recorded,
    }
}

/// A base URL nothing listens on.
pub fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

struct Request {
    method: String,
    path: String,
    api_key: Option<String>,
    body: String,
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&data[..header_end]).to_string();
    let mut lines = head.lines();
    let mut first = lines.next()?.split_whitespace();
    let method = first.next()?.to_string();
    let path = first.next()?.to_string();
    let mut content_length = 0usize;
    let mut api_key = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            } else if name.eq_ignore_ascii_case("x-api-key") {
                api_key = Some(value.trim().to_string());
            }
        }
    }
    while data.len() < header_end + content_length {
        let n = stream.read(&mut buf).ok()?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
    let body = String::from_utf8_lossy(&data[header_end..]).to_string();
    Some(Request {
        method,
        path,
        api_key,
        body,
    })
}

fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
}

fn handle(mut stream: TcpStream, shared: &Shared) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let Some(req) = read_request(&mut stream) else {
        return;
    };
    {
        let mut rec = shared.recorded.lock().unwrap();
        rec.requests.push(format!("{} {}", req.method, req.path));
        rec.api_keys.push(req.api_key.clone());
    }
    if shared.required_key.is_some() && req.api_key != shared.required_key {
        respond(&mut stream, "401 Unauthorized", "{}");
        return;
    }

    let path = req.path.trim_start_matches("/api/v0/");
    let parts: Vec<&str> = path.split('/').collect();
    match (req.method.as_str(), parts.as_slice()) {
        ("POST", ["searches"]) => respond(&mut stream, "200 OK", &req.body),
        ("GET", ["searches", _id]) => {
            let body = if shared.searches_complete {
                r#"{"isComplete": true, "state": "Completed"}"#
            } else {
                r#"{"isComplete": false, "state": "InProgress"}"#
            };
            respond(&mut stream, "200 OK", body)
        }
        ("GET", ["searches", _id, "responses"]) => {
            respond(&mut stream, "200 OK", &shared.responses_json)
        }
        ("POST", ["transfers", "downloads", user]) => {
            let files: Vec<serde_json::Value> = serde_json::from_str(&req.body).unwrap_or_default();
            let filename = files
                .first()
                .and_then(|f| f["filename"].as_str())
                .unwrap_or_default()
                .to_string();
            let size = files.first().and_then(|f| f["size"].as_u64()).unwrap_or(1000);
            shared
                .recorded
                .lock()
                .unwrap()
                .downloads
                .push((user.to_string(), req.body.clone()));
            shared
                .transfers
                .lock()
                .unwrap()
                .insert(user.to_string(), (filename, size, 0));
            respond(&mut stream, "201 Created", "{}");
        }
        ("GET", ["transfers", "downloads", user]) => {
            let mut transfers = shared.transfers.lock().unwrap();
            let Some((filename, size, polls)) = transfers.get_mut(*user) else {
                respond(&mut stream, "404 Not Found", "{}");
                return;
            };
            *polls += 1;
            let (state, done) = if *polls == 1 {
                ("InProgress", *size / 2)
            } else {
                ("Completed, Succeeded", *size)
            };
            let body = serde_json::json!({
                "username": user,
                "directories": [{
                    "directory": "",
                    "files": [{
                        "id": "transfer-1",
                        "filename": filename,
                        "state": state,
                        "size": *size,
                        "bytesTransferred": done,
                        "averageSpeed": 4096.0
                    }]
                }]
            });
            respond(&mut stream, "200 OK", &body.to_string());
        }
        ("DELETE", ["transfers", "downloads", _user, _id]) => respond(&mut stream, "204 No Content", ""),
        _ => respond(&mut stream, "404 Not Found", "{}"),
    }
}
