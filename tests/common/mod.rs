#![allow(dead_code)]

use std::fs;
use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use zipdrop::config::ServerConfig;
use zipdrop::server::{Server, ShutdownHandle};

pub fn zip_available() -> bool {
    std::process::Command::new("zip")
        .arg("-v")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Writes an executable that ignores its arguments and prints `y` lines
/// forever, standing in for an archiver working on a huge folder.
#[cfg(unix)]
pub fn endless_archiver(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("endless-zip");
    fs::write(&script, "#!/bin/sh\nexec yes\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

/// Creates `root/<name>` holding the given files.
pub fn make_folder(root: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
    let folder = root.join(name);
    fs::create_dir_all(&folder).unwrap_or_else(|error| {
        panic!("creating dir {:?} failed, because {:?}", folder, error);
    });
    for (file, content) in files {
        fs::write(folder.join(file), content).unwrap();
    }
    folder
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub root: tempfile::TempDir,
    handle: ShutdownHandle,
    thread: Option<JoinHandle<io::Result<()>>>,
}

impl TestServer {
    /// Starts a server on an ephemeral port; `setup` fills the archive root
    /// and may adjust the config.
    pub fn start(setup: impl FnOnce(&Path, &mut ServerConfig)) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::new(root.path()).unwrap();
        config.index_path = root.path().join("index.html");
        setup(root.path(), &mut config);

        let server = Server::bind("127.0.0.1:0", config).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle().unwrap();
        let thread = thread::spawn(move || server.run());

        Self {
            addr,
            root,
            handle,
            thread: Some(thread),
        }
    }

    pub fn connect(&self, path: &str) -> TcpStream {
        let mut stream = TcpStream::connect(self.addr).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        write!(
            stream,
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, self.addr
        )
        .unwrap();
        stream
    }

    pub fn get(&self, path: &str) -> Response {
        read_response(self.connect(path)).unwrap()
    }

    pub fn shutdown(&self) {
        self.handle.shutdown();
    }

    /// Shuts down and waits for `Server::run` to return.
    pub fn stop(&mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .expect("server thread panicked")
                .expect("server run failed");
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[derive(Debug)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub fn read_head<R: BufRead>(reader: &mut R) -> io::Result<(u16, Vec<(String, String)>)> {
    let mut status_line = String::new();
    reader.read_line(&mut status_line)?;
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, status_line.clone()))?;

    let mut headers = Vec::new();
    let mut line = String::new();
    while {
        line.clear();
        reader.read_line(&mut line)? > 0 && !line.trim().is_empty()
    } {
        if let Some((k, v)) = line.split_once(':') {
            headers.push((k.trim().to_string(), v.trim().to_string()));
        }
    }
    Ok((status, headers))
}

pub fn read_response(stream: TcpStream) -> io::Result<Response> {
    let mut reader = BufReader::new(stream);
    let (status, headers) = read_head(&mut reader)?;
    let chunked = headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case("transfer-encoding") && v == "chunked");

    let mut body = Vec::new();
    if chunked {
        read_chunked_body(&mut reader, &mut body)?;
    } else {
        reader.read_to_end(&mut body)?;
    }
    Ok(Response {
        status,
        headers,
        body,
    })
}

/// Decodes a chunked body into `out`, stopping after the terminating chunk.
/// Fails with `UnexpectedEof` if the stream ends before it.
pub fn read_chunked_body<R: BufRead, W: Write>(reader: &mut R, out: &mut W) -> io::Result<u64> {
    let mut total = 0;
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "body ended before the last chunk",
            ));
        }
        let size_field = line.trim().split(';').next().unwrap_or("");
        let size = u64::from_str_radix(size_field, 16).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, format!("bad chunk size: {:?}", line))
        })?;

        if size == 0 {
            // Skip trailers up to the blank line.
            loop {
                line.clear();
                if reader.read_line(&mut line)? == 0 || line.trim().is_empty() {
                    return Ok(total);
                }
            }
        }

        let copied = io::copy(&mut (&mut *reader).take(size), out)?;
        if copied != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunk cut short",
            ));
        }
        total += size;

        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf)?;
        if &crlf != b"\r\n" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "chunk not followed by CRLF",
            ));
        }
    }
}

/// Sorted entry names of a ZIP archive.
pub fn entry_names(archive: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive)).expect("valid zip archive");
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    // Every entry must also decompress.
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        io::copy(&mut file, &mut io::sink()).unwrap();
    }
    names
}

pub fn read_entry(archive: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut content = String::new();
    archive
        .by_name(name)
        .unwrap()
        .read_to_string(&mut content)
        .unwrap();
    content
}

/// Pids of live processes whose working directory is `dir`.
#[cfg(target_os = "linux")]
pub fn processes_in(dir: &Path) -> Vec<u32> {
    let dir = fs::canonicalize(dir).unwrap();
    let mut pids = Vec::new();
    for entry in fs::read_dir("/proc").unwrap().flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        if fs::read_link(entry.path().join("cwd")).ok().as_deref() == Some(dir.as_path()) {
            pids.push(pid);
        }
    }
    pids
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}
