use regex::Regex;
use std::io::{self, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::archive::handle_archive_request;
use crate::config::ServerConfig;
use crate::http::{read_request, write_response, Request};
use crate::index::handle_index_request;
use crate::{log_error, log_request, log_response};

/// Routes a request path to a handler.
#[derive(Debug, Clone)]
pub struct Router {
    archive: Regex,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Route<'a> {
    Index,
    Archive(&'a str),
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        Self {
            archive: Regex::new(r"^/archive/([^/]+)/$").expect("archive route pattern"),
        }
    }

    pub fn route<'a>(&self, path: &'a str) -> Route<'a> {
        if path == "/" {
            return Route::Index;
        }
        match self.archive.captures(path).and_then(|c| c.get(1)) {
            Some(identifier) => Route::Archive(identifier.as_str()),
            None => Route::NotFound,
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    /// Stops accepting connections. Downloads in flight stop at their next
    /// chunk, after their archiver has been cleaned up.
    pub fn shutdown(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            log::info!("Shutting down");
            // Wake the accept loop.
            let _ = TcpStream::connect(self.addr);
        }
    }
}

pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    router: Arc<Router>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    pub fn bind(addr: &str, config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            config: Arc::new(config),
            router: Arc::new(Router::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> io::Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
            addr: self.local_addr()?,
        })
    }

    /// Accepts connections until shut down, one thread per connection.
    /// Returns once every connection thread has finished, so each archiver
    /// still running at shutdown has been killed and reaped.
    pub fn run(self) -> io::Result<()> {
        let addr = self.local_addr()?;
        println!("Listening on: http://{}", addr);
        log::info!("Listening on: {}", addr);

        let mut connections: Vec<JoinHandle<()>> = Vec::new();
        for stream in self.listener.incoming() {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    log_error!(e, "Failed to accept connection");
                    continue;
                }
            };

            let config = Arc::clone(&self.config);
            let router = Arc::clone(&self.router);
            let shutdown = Arc::clone(&self.shutdown);

            connections.retain(|handle| !handle.is_finished());
            connections.push(thread::spawn(move || {
                if let Err(e) = handle_connection(stream, &config, &router, &shutdown) {
                    log_error!(e, "Error handling connection");
                }
            }));
        }

        if !connections.is_empty() {
            log::info!("Waiting for {} connections to finish", connections.len());
        }
        for handle in connections {
            if handle.join().is_err() {
                log::error!("A connection thread panicked");
            }
        }
        log::info!("Server stopped");
        Ok(())
    }
}

fn handle_connection(
    mut client: TcpStream,
    config: &ServerConfig,
    router: &Router,
    shutdown: &AtomicBool,
) -> io::Result<()> {
    let start_time = Instant::now();
    if let Ok(peer) = client.peer_addr() {
        log::debug!("New connection from {}", peer);
    }
    client.set_read_timeout(config.read_timeout)?;
    client.set_write_timeout(config.write_timeout)?;

    let request = match read_request(&mut BufReader::new(&client)) {
        Ok(Some(request)) => request,
        Ok(None) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            log::warn!("Rejected request: {}", e);
            write_response(
                &mut client,
                "400 Bad Request",
                "text/plain; charset=utf-8",
                b"Bad Request",
            )?;
            log_response!("400 Bad Request", start_time.elapsed(), 0);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    log_request!(request.method, request.path);

    let (status, bytes) = dispatch(&mut client, config, router, &request, shutdown)?;
    log_response!(status, start_time.elapsed(), bytes);
    Ok(())
}

fn dispatch(
    client: &mut TcpStream,
    config: &ServerConfig,
    router: &Router,
    request: &Request,
    shutdown: &AtomicBool,
) -> io::Result<(&'static str, u64)> {
    if request.method != "GET" {
        write_response(
            client,
            "405 Method Not Allowed",
            "text/plain; charset=utf-8",
            b"Method Not Allowed",
        )?;
        return Ok(("405 Method Not Allowed", 0));
    }

    match router.route(&request.path) {
        Route::Index => {
            let status = handle_index_request(client, config, request)?;
            Ok((status, 0))
        }
        Route::Archive(identifier) => {
            let response = handle_archive_request(client, config, identifier, shutdown)?;
            Ok((response.status, response.bytes))
        }
        Route::NotFound => {
            log::debug!("No route for {}", request.path);
            write_response(client, "404 Not Found", "text/plain; charset=utf-8", b"Not Found")?;
            Ok(("404 Not Found", 0))
        }
    }
}
