use mime_guess::from_path;
use std::fs;
use std::io::{self, Write};

use crate::compression::{determine_compression, encode};
use crate::config::ServerConfig;
use crate::http::{write_head, write_response, Request};

/// Serves the landing page. Returns the status line that was sent.
pub fn handle_index_request<W: Write>(
    client: &mut W,
    config: &ServerConfig,
    request: &Request,
) -> io::Result<&'static str> {
    let content = match fs::read(&config.index_path) {
        Ok(content) => content,
        Err(e) => {
            log::error!(
                "Index page {} unavailable: {}",
                config.index_path.display(),
                e
            );
            write_response(client, "404 Not Found", "text/plain; charset=utf-8", b"Not Found")?;
            return Ok("404 Not Found");
        }
    };

    let mime_type = from_path(&config.index_path)
        .first_or_octet_stream()
        .to_string();
    let accepted = determine_compression(request.header("accept-encoding").unwrap_or(""));
    let (body, compression) = encode(content, accepted, config.zstd_level, config.gzip_level)?;
    let length = body.len().to_string();

    let mut headers = vec![
        ("Content-Type", mime_type.as_str()),
        ("Content-Length", length.as_str()),
        ("Cache-Control", "no-cache"),
        ("Connection", "close"),
    ];
    if let Some(encoding) = compression.content_encoding() {
        headers.push(("Content-Encoding", encoding));
        headers.push(("Vary", "Accept-Encoding"));
    }

    write_head(client, "200 OK", &headers)?;
    client.write_all(&body)?;
    client.flush()?;
    Ok("200 OK")
}
