pub use crate::config::{AppConfig, RouteConfig, ServerConfig};
pub use crate::error::Result;
pub use crate::http::*;

pub use crate::*;
pub use mio::{
    Events, Interest, Poll, Token,
    event::Event,
    net::{TcpListener, TcpStream},
};
pub use proxy_log::{info, trace};
pub use std::collections::HashMap;
pub use std::fs::{self, File, OpenOptions};
pub use std::io::{ErrorKind, Read, Write};
pub use std::net::{Shutdown, SocketAddr};
pub use std::os::unix::fs::MetadataExt;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::Instant;
pub use std::time::Duration;

pub use std::{
    fmt::{self, Display},
    io,
    os::{
        fd::{FromRawFd, IntoRawFd},
        unix::net::UnixStream,
    },
    process::{Command, Stdio},
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

pub use mio::*;

pub use crate::{
    cgi::CgiParsingState,
    http::HttpResponse,
    router::RoutingError,
    server::Server,
    upload::{Upload, UploadState},
};

pub use crate::http::{HttpRequest, PartInfo, find_subsequence, parse_part_headers};

pub const READ_BUF_SIZE: usize = 4096;

// 2xx Success
pub const HTTP_OK: u16 = 200;
pub const HTTP_CREATED: u16 = 201;
pub const HTTP_NO_CONTENT: u16 = 204;

// 3xx Redirection
pub const HTTP_MOVED_PERMANENTLY: u16 = 301;
pub const HTTP_FOUND: u16 = 302;
pub const HTTP_TEMPORARY_REDIRECT: u16 = 307;
pub const HTTP_PERMANENT_REDIRECT: u16 = 308;

// 4xx Client Errors
pub const HTTP_BAD_REQUEST: u16 = 400;
pub const HTTP_FORBIDDEN: u16 = 403;
pub const HTTP_NOT_FOUND: u16 = 404;
pub const HTTP_METHOD_NOT_ALLOWED: u16 = 405;
pub const HTTP_REQUEST_TIMEOUT: u16 = 408;
pub const HTTP_CONFLICT: u16 = 409;
pub const HTTP_LENGTH_REQUIRED: u16 = 411;
pub const HTTP_PAYLOAD_TOO_LARGE: u16 = 413;
pub const HTTP_URI_TOO_LONG: u16 = 414;
pub const HTTP_UNSUPPORTED_MEDIA_TYPE: u16 = 415;
pub const HTTP_EXPECTATION_FAILED: u16 = 417;
pub const HTTP_HEADER_FIELDS_TOO_LARGE: u16 = 431;

// 5xx Server Errors
pub const HTTP_INTERNAL_SERVER_ERROR: u16 = 500;
pub const HTTP_NOT_IMPLEMENTED: u16 = 501;
pub const HTTP_BAD_GATEWAY: u16 = 502;
pub const HTTP_SERVICE_UNAVAILABLE: u16 = 503;
pub const GATEWAY_TIMEOUT: u16 = 504;
pub const HTTP_VERSION_NOT_SUPPORTED: u16 = 505;

pub const _1MB: usize = 1_024 * 1024;
pub const MAX_READ_DATA: usize = u16::MAX as usize; // 64KB

/// Extensions permitted for multipart uploads; anything else → 403.
pub const UPLOAD_EXT_WHITELIST: &[&str] = &[
    "txt", "pdf", "jpg", "jpeg", "png", "gif", "zip", "mp4", "json", "csv", "md", "html", "css",
];

/// Seconds of inactivity before the reactor closes a connection.
pub const CLIENT_TIMEOUT: u64 = 60;
/// Wall-clock seconds a CGI process is allowed before it is killed (§4.7 step 5).
pub const TIMEOUT_CGI: u64 = 30;
/// Seconds between session-store eviction passes.
pub const CLEAN_UP: u64 = 60;
/// Field-size and header-count limits enforced by the request parser (§4.3).
pub const MAX_HEADER_LINE: usize = 8 * 1024;
pub const MAX_HEADER_COUNT: usize = 100;
pub const MAX_HEADER_BYTES: usize = 16 * 1024;
pub const MAX_URI_LEN: usize = 8192;
