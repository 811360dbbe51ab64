//! Streams ZIP archives of server-side folders over HTTP.
//!
//! A request for `/archive/{identifier}/` is resolved to a folder under the
//! configured root, an external `zip` process is started inside it and its
//! standard output is relayed to the client in small chunks as it is produced.

pub mod archive;
pub mod args;
pub mod compression;
pub mod config;
pub mod error;
pub mod http;
pub mod index;
pub mod locator;
pub mod logging;
pub mod process;
pub mod relay;
pub mod server;
