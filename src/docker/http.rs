/*!
Minimal HTTP/1.1 client framing for the Docker Engine API over a unix socket.

- write_request: request line + headers (`Connection: close`) + optional JSON body
- read_response: status line and headers (64 KiB cap), then a body reader framed by
  `Transfer-Encoding: chunked`, `Content-Length`, or connection close
*/

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};

/// Simple case-insensitive header map (keys lowercased)
pub(crate) type HeaderMap = HashMap<String, String>;

const HDR_CAP: usize = 64 * 1024;

pub(crate) struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Box<dyn Read + Send>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Read the remaining body into a string (lossy UTF-8).
    pub fn text(mut self) -> io::Result<String> {
        let mut buf = Vec::new();
        self.body.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

pub(crate) fn write_request<W: Write>(
    w: &mut W,
    method: &str,
    path_and_query: &str,
    body: Option<&[u8]>,
) -> io::Result<()> {
    let mut head = format!(
        "{method} {path_and_query} HTTP/1.1\r\nHost: docker\r\nUser-Agent: dblab-engine/{}\r\nConnection: close\r\n",
        env!("CARGO_PKG_VERSION")
    );
    match body {
        Some(b) => {
            head.push_str("Content-Type: application/json\r\n");
            head.push_str(&format!("Content-Length: {}\r\n\r\n", b.len()));
            w.write_all(head.as_bytes())?;
            w.write_all(b)?;
        }
        None => {
            head.push_str("Content-Length: 0\r\n\r\n");
            w.write_all(head.as_bytes())?;
        }
    }
    w.flush()
}

pub(crate) fn read_response<R: Read + Send + 'static>(stream: R) -> io::Result<HttpResponse> {
    let mut reader = BufReader::new(stream);
    let mut header_bytes = 0usize;

    let status_line = read_line(&mut reader, &mut header_bytes)?.ok_or_else(|| {
        io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed before status line")
    })?;
    let status = parse_status_line(&status_line)?;

    let mut headers = HeaderMap::new();
    loop {
        let line = read_line(&mut reader, &mut header_bytes)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed inside headers")
        })?;
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }

    let chunked = headers
        .get("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
    let body: Box<dyn Read + Send> = if chunked {
        Box::new(ChunkedReader::new(reader))
    } else if let Some(len) = headers
        .get("content-length")
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        Box::new(reader.take(len))
    } else {
        Box::new(reader)
    };

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

/// Read one CRLF/LF-terminated line without the terminator; None on clean EOF.
fn read_line<R: BufRead>(reader: &mut R, consumed: &mut usize) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Ok(None);
    }
    *consumed += n;
    if *consumed > HDR_CAP {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "response headers exceed 64 KiB",
        ));
    }
    while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn parse_status_line(line: &str) -> io::Result<u16> {
    let mut parts = line.split_whitespace();
    let proto = parts.next().unwrap_or_default();
    if !proto.starts_with("HTTP/") {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed status line: {line:?}"),
        ));
    }
    parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed status code: {line:?}"),
            )
        })
}

/// De-chunks a `Transfer-Encoding: chunked` body on the fly.
pub(crate) struct ChunkedReader<R> {
    inner: R,
    remaining: usize,
    done: bool,
}

impl<R: BufRead> ChunkedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            remaining: 0,
            done: false,
        }
    }

    fn next_chunk(&mut self) -> io::Result<()> {
        let mut line = String::new();
        // Tolerate stray blank lines between chunks
        loop {
            line.clear();
            if self.inner.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "chunked body ended without terminating chunk",
                ));
            }
            if !line.trim().is_empty() {
                break;
            }
        }
        // Parse chunk size (hex), tolerate extensions after ';'
        let trimmed = line.trim();
        let size_hex = trimmed.split(';').next().unwrap_or(trimmed).trim();
        let size = usize::from_str_radix(size_hex, 16).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid chunk size line: {trimmed:?}"),
            )
        })?;
        if size == 0 {
            // Consume trailers until blank line or EOF
            loop {
                line.clear();
                if self.inner.read_line(&mut line)? == 0 || line.trim().is_empty() {
                    break;
                }
            }
            self.done = true;
        }
        self.remaining = size;
        Ok(())
    }

    fn consume_chunk_crlf(&mut self) -> io::Result<()> {
        let buf = self.inner.fill_buf()?;
        if buf.starts_with(b"\r\n") {
            self.inner.consume(2);
        } else if buf.starts_with(b"\n") {
            self.inner.consume(1);
        } else if buf.starts_with(b"\r") {
            self.inner.consume(1);
            let buf = self.inner.fill_buf()?;
            if buf.starts_with(b"\n") {
                self.inner.consume(1);
            }
        }
        Ok(())
    }
}

impl<R: BufRead> Read for ChunkedReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.remaining == 0 {
            if self.done {
                return Ok(0);
            }
            self.next_chunk()?;
        }
        let want = out.len().min(self.remaining);
        let n = self.inner.read(&mut out[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed inside chunk",
            ));
        }
        self.remaining -= n;
        if self.remaining == 0 {
            self.consume_chunk_crlf()?;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn response(raw: &str) -> HttpResponse {
        read_response(Cursor::new(raw.as_bytes().to_vec())).expect("parse response")
    }

    #[test]
    fn test_content_length_body() {
        let r = response("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 2\r\n\r\n[]trailing");
        assert_eq!(r.status, 200);
        assert_eq!(
            r.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert_eq!(r.text().unwrap(), "[]");
    }

    #[test]
    fn test_chunked_body_with_extensions_and_trailers() {
        let r = response(
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5;ext=1\r\nhello\r\n7\r\n, world\r\n0\r\nX-Trailer: y\r\n\r\n",
        );
        assert!(r.is_success());
        assert_eq!(r.text().unwrap(), "hello, world");
    }

    #[test]
    fn test_eof_framed_body_and_lf_only_headers() {
        let r = response("HTTP/1.0 404 Not Found\nServer: x\n\n{\"message\":\"no such image\"}");
        assert_eq!(r.status, 404);
        assert!(!r.is_success());
        assert_eq!(r.text().unwrap(), "{\"message\":\"no such image\"}");
    }

    #[test]
    fn test_truncated_chunk_is_error() {
        let r = response("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nA\r\nabc");
        assert!(r.text().is_err());
    }

    #[test]
    fn test_malformed_status_line() {
        assert!(read_response(Cursor::new(b"garbage\r\n\r\n".to_vec())).is_err());
        assert!(read_response(Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn test_write_request_shape() {
        let mut out = Vec::new();
        write_request(&mut out, "POST", "/images/create?fromImage=pg&tag=16", None).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.starts_with("POST /images/create?fromImage=pg&tag=16 HTTP/1.1\r\n"));
        assert!(s.contains("Connection: close\r\n"));
        assert!(s.ends_with("Content-Length: 0\r\n\r\n"));
    }
}
