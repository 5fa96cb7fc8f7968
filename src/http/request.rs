// Minimal HTTP request head parsing

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest request head accepted
const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Largest request body accepted
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// A parsed HTTP request head
pub struct HttpRequestHead {
    /// Request method
    pub method: String,

    /// Request path, without the query string
    pub path: String,

    /// Query string, without the leading '?'
    pub query: String,

    /// Header fields, names lowercased
    pub headers: HashMap<String, String>,

    /// Body bytes already read past the head
    pub body_start: Vec<u8>,
}

impl HttpRequestHead {
    /// Gets the declared content length
    pub fn content_length(&self) -> usize {
        self.headers
            .get("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// Reads and parses an HTTP request head from the stream
pub async fn read_http_request_head<TR: AsyncRead + AsyncReadExt + Send + Sync + Unpin>(
    read_stream: &mut TR,
) -> Result<HttpRequestHead, ()> {
    let mut head: Vec<u8> = Vec::with_capacity(1024);
    let mut buf = [0u8; 1024];
    let head_end;

    loop {
        let n = match read_stream.read(&mut buf).await {
            Ok(0) => return Err(()),
            Ok(n) => n,
            Err(_) => return Err(()),
        };

        head.extend_from_slice(&buf[..n]);

        if head.len() > MAX_HEAD_SIZE {
            return Err(());
        }

        if let Some(pos) = head.windows(4).position(|w| w == b"\r\n\r\n") {
            head_end = pos + 4;
            break;
        }
    }

    let body_start = head[head_end..].to_vec();
    let head_str = match std::str::from_utf8(&head[..head_end]) {
        Ok(s) => s,
        Err(_) => return Err(()),
    };

    let mut lines = head_str.split("\r\n");

    let request_line = lines.next().ok_or(())?;
    let mut parts = request_line.split_whitespace();

    let method = parts.next().ok_or(())?.to_string();
    let target = parts.next().ok_or(())?;

    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), q.to_string()),
        None => (target.to_string(), "".to_string()),
    };

    let mut headers = HashMap::new();

    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }

    Ok(HttpRequestHead {
        method,
        path,
        query,
        headers,
        body_start,
    })
}

// Tests
