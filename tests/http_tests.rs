use mio::{Interest, Poll, Token};
use server_proxy::config::{RouteConfig, ServerConfig};
use server_proxy::http::*;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;

/// Accepts a real connection over a loopback socket and wraps it as the
/// reactor would, so the parser is driven exactly the way the server drives
/// it (including the `Poll`/`Token` plumbing `parse_request` requires).
struct Harness {
    conn: HttpConnection,
    poll: Poll,
    token: Token,
    client: TcpStream,
}

fn harness() -> Harness {
    harness_with_config(ServerConfig::default())
}

/// A config with a catch-all `/upload` route backed by a real, writable
/// temp directory, for tests that need a POST to actually reach the
/// upload action rather than dying at routing with a 404/405.
fn upload_test_config(test_root: &str) -> ServerConfig {
    let _ = std::fs::remove_dir_all(test_root);
    std::fs::create_dir_all(format!("{}/uploads", test_root)).unwrap();

    let route = RouteConfig {
        path: "/upload".to_string(),
        root: test_root.to_string(),
        upload_dir: "uploads".to_string(),
        methods: vec!["GET".to_string(), "POST".to_string()],
        ..Default::default()
    };

    ServerConfig {
        root: test_root.to_string(),
        routes: vec![route],
        ..Default::default()
    }
}

fn harness_with_config(cfg: ServerConfig) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (std_stream, _) = listener.accept().unwrap();
    std_stream.set_nonblocking(true).unwrap();

    let mut stream = mio::net::TcpStream::from_std(std_stream);
    let poll = Poll::new().unwrap();
    let token = Token(0);
    poll.registry()
        .register(&mut stream, token, Interest::READABLE)
        .unwrap();

    let conn = HttpConnection::new(stream, vec![Arc::new(cfg)]);
    Harness {
        conn,
        poll,
        token,
        client,
    }
}

impl Harness {
    /// Writes `data` on the client half, then drains it into the connection's
    /// request buffer the way `handle_read_phase` would.
    fn feed(&mut self, data: &[u8]) {
        self.client.write_all(data).unwrap();
        self.client.flush().unwrap();
        // Give the loopback stack a moment to deliver before the non-blocking read.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let _ = self.conn.read_data();
    }

    fn parse(&mut self) -> Result<(), ParseError> {
        let mut next_token = 1usize;
        let mut cgi_to_client = std::collections::HashMap::new();
        HttpRequest::parse_request(
            &mut self.conn,
            &self.poll,
            &mut next_token,
            &mut cgi_to_client,
            self.token,
        )
    }
}

#[test]
fn test_simple_get_request() {
    let mut h = harness();
    h.feed(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n");

    assert!(h.parse().is_ok());
    assert_eq!(h.conn.request.method, Method::GET);
    assert_eq!(h.conn.request.url, "/index.html");
    assert_eq!(h.conn.request.state, ParsingState::Complete);
    assert_eq!(h.conn.request.header("host").unwrap(), "localhost");
}

#[test]
fn test_fragmented_request_line_and_headers() {
    let mut h = harness();

    // Chunk 1: incomplete request line.
    h.feed(b"GET /path ");
    assert_eq!(h.parse().unwrap_err(), ParseError::IncompleteRequestLine);
    assert_eq!(h.conn.request.state, ParsingState::RequestLine);

    // Chunk 2: completes the request line, no headers yet.
    h.feed(b"HTTP/1.1\r\n");
    assert_eq!(h.parse().unwrap_err(), ParseError::IncompleteRequestLine);
    assert_eq!(h.conn.request.state, ParsingState::Headers);
    assert_eq!(h.conn.request.url, "/path");

    // Chunk 3: completes headers.
    h.feed(b"Host: localhost\r\nUser-Agent: test\r\n\r\n");
    assert!(h.parse().is_ok());
    assert_eq!(h.conn.request.state, ParsingState::Complete);
}

#[test]
fn test_post_request_with_body() {
    let mut h = harness_with_config(upload_test_config("./tmp_http_tests_body"));
    h.feed(b"POST /upload/a.txt HTTP/1.1\r\nHost: localhost\r\nContent-Length: 13\r\n\r\nHello, World!");

    assert!(h.parse().is_ok());
    assert_eq!(h.conn.request.method, Method::POST);
    assert_eq!(h.conn.request.body, b"Hello, World!");
    assert_eq!(h.conn.request.state, ParsingState::Complete);

    let _ = std::fs::remove_dir_all("./tmp_http_tests_body");
}

#[test]
fn test_post_fragmented_body() {
    let mut h = harness_with_config(upload_test_config("./tmp_http_tests_fragmented"));
    h.feed(b"POST /upload/b.txt HTTP/1.1\r\nHost: localhost\r\nContent-Length: 10\r\n\r\n");

    // Headers complete, body not yet: state moves to Body, still incomplete.
    assert_eq!(h.parse().unwrap_err(), ParseError::IncompleteRequestLine);
    assert_eq!(h.conn.request.state, ParsingState::Body);

    h.feed(b"12345");
    assert_eq!(h.parse().unwrap_err(), ParseError::IncompleteRequestLine);

    h.feed(b"67890");
    assert!(h.parse().is_ok());
    assert_eq!(h.conn.request.body, b"1234567890");
    assert_eq!(h.conn.request.state, ParsingState::Complete);

    let _ = std::fs::remove_dir_all("./tmp_http_tests_fragmented");
}

#[test]
fn test_chunked_body_across_reads() {
    let mut h = harness_with_config(upload_test_config("./tmp_http_tests_chunked"));
    h.feed(b"POST /upload/c.txt HTTP/1.1\r\nHost: localhost\r\nTransfer-Encoding: chunked\r\n\r\n");
    assert_eq!(h.parse().unwrap_err(), ParseError::IncompleteRequestLine);
    assert_eq!(h.conn.request.state, ParsingState::ChunkedBody);

    h.feed(b"5\r\nHello\r\n");
    assert_eq!(h.parse().unwrap_err(), ParseError::IncompleteRequestLine);

    h.feed(b"0\r\n\r\n");
    assert!(h.parse().is_ok());
    assert_eq!(h.conn.request.state, ParsingState::Complete);

    let _ = std::fs::remove_dir_all("./tmp_http_tests_chunked");
}

#[test]
fn test_unknown_method_parses_without_error() {
    // Method::from_str is infallible; an unrecognized verb becomes
    // Method::Unknown and is rejected later, at dispatch (501), not here.
    let mut h = harness();
    h.feed(b"PATCH /invalid HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert!(h.parse().is_ok());
    assert_eq!(h.conn.request.method, Method::Unknown("PATCH".to_string()));
}

#[test]
fn test_path_traversal_rejected() {
    let mut h = harness();
    h.feed(b"GET /../etc/passwd HTTP/1.1\r\nHost: localhost\r\n\r\n");
    assert_eq!(h.parse().unwrap_err(), ParseError::PathTraversal);
}

#[test]
fn test_unsupported_version_rejected() {
    let mut h = harness();
    h.feed(b"GET / HTTP/0.9\r\nHost: localhost\r\n\r\n");
    assert_eq!(h.parse().unwrap_err(), ParseError::UnsupportedVersion);
}

#[test]
fn test_response_generation() {
    let mut res = HttpResponse::new(200, "OK");
    res.set_header("Content-Type", "text/plain")
        .set_body(b"Hello Rust".to_vec(), "text/plain");

    let bytes = res.to_bytes();
    let s = String::from_utf8_lossy(&bytes);

    assert!(s.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(s.contains("Content-Type: text/plain\r\n"));
    assert!(s.contains("Content-Length: 10\r\n"));
    assert!(s.contains("Server: "));
    assert!(s.contains("Date: "));
    assert!(s.ends_with("\r\n\r\nHello Rust"));
}

#[test]
fn test_for_head_strips_body_but_keeps_length() {
    let res = HttpResponse::new(200, "OK")
        .set_body(b"some content".to_vec(), "text/plain")
        .for_head(0);

    assert!(res.body.is_empty());
    assert_eq!(res.headers.get("content-length").unwrap(), "12");
}

#[test]
fn test_options_response_is_200_with_allow() {
    let methods = vec!["POST".to_string(), "DELETE".to_string()];
    let res = HttpResponse::options(&methods);
    assert_eq!(res.status_code, 200);
    assert_eq!(res.headers.get("allow").unwrap(), "POST, DELETE");
    assert!(res.body.is_empty());
}

#[test]
fn test_multipart_part_headers() {
    let headers = "Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\nContent-Type: text/plain";
    let info = parse_part_headers(headers);
    assert_eq!(info.name, "file");
    assert_eq!(info.filename.as_deref(), Some("a.txt"));
    assert_eq!(info.content_type, "text/plain");
}

#[test]
fn test_find_subsequence() {
    let haystack = b"abc--boundary--def";
    let pos = find_subsequence(haystack, b"--boundary--", 0);
    assert_eq!(pos, Some(3));
    assert_eq!(find_subsequence(haystack, b"nope", 0), None);
}
