use std::io::{self, BufRead, Read, Write};

/// Upper bound on the request line plus headers.
pub const MAX_REQUEST_HEAD: u64 = 16 * 1024;

/// The parts of an HTTP/1.x request the server looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    /// Request target without the query string.
    pub path: String,
    pub request_line: String,
    pub headers: Vec<(String, String)>,
}

impl Request {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Reads the request line and headers. Returns `None` when the peer closed
/// the connection without sending anything. A head longer than
/// [`MAX_REQUEST_HEAD`] fails with `InvalidData`.
pub fn read_request<R: BufRead>(reader: &mut R) -> io::Result<Option<Request>> {
    let mut reader = reader.take(MAX_REQUEST_HEAD);

    let mut first_line = String::new();
    if read_head_line(&mut reader, &mut first_line)? == 0 {
        return Ok(None);
    }

    let mut parts = first_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method.to_string(), target),
        _ => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed request line: {}", first_line.trim()),
            ))
        }
    };
    let path = target.split('?').next().unwrap_or(target).to_string();

    let mut headers = Vec::new();
    let mut line = String::new();
    while {
        line.clear();
        read_head_line(&mut reader, &mut line)? > 0 && !line.trim().is_empty()
    } {
        log::trace!("Header line: {}", line.trim());
        let parts: Vec<&str> = line.splitn(2, ':').collect();
        if parts.len() == 2 {
            headers.push((parts[0].trim().to_string(), parts[1].trim().to_string()));
        }
    }

    Ok(Some(Request {
        method,
        path,
        request_line: first_line.trim().to_string(),
        headers,
    }))
}

/// Reads one line of the request head, failing once the size cap cut it off.
fn read_head_line<R: BufRead>(reader: &mut io::Take<R>, line: &mut String) -> io::Result<usize> {
    let n = reader.read_line(line)?;
    if reader.limit() == 0 && !line.ends_with('\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("request head exceeds {} bytes", MAX_REQUEST_HEAD),
        ));
    }
    Ok(n)
}

/// Writes a status line and headers, ending the header block.
pub fn write_head<W: Write>(
    writer: &mut W,
    status: &str,
    headers: &[(&str, &str)],
) -> io::Result<()> {
    let mut head = format!("HTTP/1.1 {}\r\n", status);
    for (key, value) in headers {
        head.push_str(&format!("{}: {}\r\n", key, value));
    }
    head.push_str("\r\n");
    writer.write_all(head.as_bytes())?;
    writer.flush()
}

/// Sends a complete response with a fixed-length body.
pub fn write_response<W: Write>(
    writer: &mut W,
    status: &str,
    content_type: &str,
    body: &[u8],
) -> io::Result<()> {
    let length = body.len().to_string();
    write_head(
        writer,
        status,
        &[
            ("Content-Type", content_type),
            ("Content-Length", &length),
            ("Connection", "close"),
        ],
    )?;
    writer.write_all(body)?;
    writer.flush()
}

/// A response body sent with `Transfer-Encoding: chunked`.
///
/// Every non-empty `write` becomes exactly one chunk on the wire. The body is
/// closed by [`ChunkedWriter::finish`], which consumes the writer so the
/// terminating chunk cannot be sent twice.
pub struct ChunkedWriter<W: Write> {
    inner: W,
    bytes_sent: u64,
}

impl<W: Write> ChunkedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_sent: 0,
        }
    }

    /// Payload bytes written so far, excluding chunk framing.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Writes the terminating zero-length chunk.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(b"0\r\n\r\n")?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    /// Gives up the stream without terminating the body.
    pub fn abandon(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut frame = Vec::with_capacity(buf.len() + 12);
        frame.extend_from_slice(format!("{:x}\r\n", buf.len()).as_bytes());
        frame.extend_from_slice(buf);
        frame.extend_from_slice(b"\r\n");
        self.inner.write_all(&frame)?;
        self.bytes_sent += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decodes a complete chunked body held in memory.
#[cfg(test)]
pub(crate) fn decode_chunked(mut wire: &[u8]) -> io::Result<Vec<u8>> {
    let truncated = || io::Error::new(io::ErrorKind::UnexpectedEof, "chunked body truncated");
    let mut body = Vec::new();
    loop {
        let line_end = wire
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(truncated)?;
        let size = std::str::from_utf8(&wire[..line_end])
            .ok()
            .and_then(|line| usize::from_str_radix(line.trim(), 16).ok())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad chunk size"))?;
        wire = &wire[line_end + 2..];
        if size == 0 {
            return Ok(body);
        }
        if wire.len() < size + 2 {
            return Err(truncated());
        }
        body.extend_from_slice(&wire[..size]);
        wire = &wire[size + 2..];
    }
}
