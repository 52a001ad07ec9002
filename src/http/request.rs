use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    Options,
    Unknown(String),
}

impl Method {
    pub fn is_allowed(&self, allowed_methods: &[String]) -> bool {
        allowed_methods.iter().any(|m| m == self.as_str())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::Options => "OPTIONS",
            Method::Unknown(s) => s.as_str(),
        }
    }
}

impl FromStr for Method {
    // Unrecognized tokens never fail to parse: they become `Unknown` and are
    // surfaced as 501 at dispatch time (spec: "unrecognized method -> Unknown").
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Method::GET,
            "HEAD" => Method::HEAD,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "OPTIONS" => Method::Options,
            other => Method::Unknown(other.to_string()),
        })
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq)]
pub enum ParsingState {
    RequestLine,
    Headers,
    HeadersDone,
    Body,
    ChunkedBody,
    Complete,
    Error,
}

const CRLN_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    IncompleteRequestLine,
    MalformedRequestLine,
    InvalidMethod,
    InvalidUtf8(std::string::FromUtf8Error),
    UnexpectedEof,
    HeaderTooLong,
    TooManyHeaders,
    HeaderFieldsTooLarge,
    InvalidHeaderName,
    InvalidHeaderValue,
    InvalidChunkSize,
    PayloadTooLarge,
    ParseHexError,
    UriTooLong,
    UnsupportedVersion,
    PathTraversal,
    DuplicateHeader,
    ConflictingBodyHeaders,
    BadTransferEncoding,
    ExpectationFailed,
    MissingHost,
    Error(u16),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::IncompleteRequestLine => write!(f, "Incomplete request line"),
            ParseError::MalformedRequestLine => write!(f, "Malformed request line"),
            ParseError::InvalidMethod => write!(f, "Invalid HTTP method"),
            ParseError::InvalidUtf8(_) => write!(f, "Invalid UTF-8 in request"),
            ParseError::UnexpectedEof => write!(f, "Unexpected end of input"),
            ParseError::HeaderTooLong => write!(f, "Header line too long"),
            ParseError::TooManyHeaders => write!(f, "Too many headers"),
            ParseError::HeaderFieldsTooLarge => write!(f, "Total header size too large"),
            ParseError::InvalidHeaderName => write!(f, "Invalid header name"),
            ParseError::InvalidHeaderValue => write!(f, "Invalid header value"),
            ParseError::PayloadTooLarge => write!(f, "Payload too large"),
            ParseError::ParseHexError => write!(f, "Parse Hex Error"),
            ParseError::Error(_) => write!(f, "other error"),
            ParseError::InvalidChunkSize => write!(f, "invalid chunk size"),
            ParseError::UriTooLong => write!(f, "URI too long"),
            ParseError::UnsupportedVersion => write!(f, "unsupported HTTP version"),
            ParseError::PathTraversal => write!(f, "path traversal attempt"),
            ParseError::DuplicateHeader => write!(f, "duplicate header"),
            ParseError::ConflictingBodyHeaders => {
                write!(f, "Content-Length and Transfer-Encoding both present")
            }
            ParseError::BadTransferEncoding => write!(f, "unsupported Transfer-Encoding"),
            ParseError::ExpectationFailed => write!(f, "unsupported Expect value"),
            ParseError::MissingHost => write!(f, "missing Host header"),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<std::string::FromUtf8Error> for ParseError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        ParseError::InvalidUtf8(err)
    }
}

#[derive(Debug)]
pub enum ChunkState {
    ReadSize,
    ReadData(usize),
    ReadTrailingCRLF,
    ReadTrailers,
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub trailers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub body_file: Option<File>,
    pub is_large_body: bool,
    pub buffer: Vec<u8>,
    pub cursor: usize,
    pub state: ParsingState,
    pub chunk_state: ChunkState,
    header_count: usize,
    header_bytes: usize,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        HttpRequest {
            method: Method::GET,
            url: String::new(),
            query: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            trailers: HashMap::new(),
            body: Vec::new(),
            buffer: Vec::with_capacity(4096),
            cursor: 0,
            state: ParsingState::RequestLine,
            is_large_body: false,
            body_file: None,
            chunk_state: ChunkState::ReadSize,
            header_count: 0,
            header_bytes: 0,
        }
    }

    /// Case-insensitive header lookup (storage keys are already lowercased).
    pub fn header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    pub fn clear(&mut self) {
        self.state = ParsingState::RequestLine;
        self.headers.clear();
        self.trailers.clear();
        self.body.clear();
        self.header_count = 0;
        self.header_bytes = 0;
        self.chunk_state = ChunkState::ReadSize;
    }

    pub fn finish_request(&mut self) {
        self.buffer.drain(..self.cursor);
        self.cursor = 0;
        self.clear();
    }

    pub fn proces_request(
        poll: &Poll,
        token: Token,
        next_token: &mut usize,
        cgi_to_client: &mut HashMap<Token, Token>,
        conn: &mut HttpConnection,
        session_store: &mut SessionStore,
    ) -> Result<bool> {
        let mut closed = false;
        loop {
            match HttpRequest::parse_request(conn, poll, next_token, cgi_to_client, token, session_store) {
                Ok(()) => {
                    trace!("request parsed, state complete");
                    let s_cfg = conn.s_cfg.clone();

                    if let Some(upload_manager) = &mut conn.upload_manager {
                        if let Some(s_cfg) = &s_cfg {
                            let response = Upload::handel_upload_manager(upload_manager, s_cfg);
                            conn.write_buffer.extend_from_slice(&response.to_bytes());
                        }
                    }

                    if let ActiveAction::Put(path, existed) = &conn.action {
                        let mut res = if *existed {
                            HttpResponse::new(HTTP_OK, "OK")
                        } else {
                            let mut r = HttpResponse::new(HTTP_CREATED, "Created");
                            r.set_header("Location", &conn.request.url);
                            r
                        };
                        res.set_header("Content-Length", "0");
                        conn.write_buffer.extend_from_slice(&res.to_bytes());
                        conn.action = ActiveAction::None;
                        let _ = path;
                    }

                    conn.request.finish_request();
                    closed = true; // Connection: close is the only model in the core.
                    break;
                }
                Err(ParseError::IncompleteRequestLine) => break,
                Err(e) => {
                    let code = status_code_for(&e);
                    let response = handle_error(code, conn.s_cfg.as_ref());
                    closed = true;
                    conn.write_buffer.extend_from_slice(&response.to_bytes());
                    conn.request.finish_request();
                    break;
                }
            }
        }

        if let Some(cookie) = session_store.session_cookie_header(&conn.request) {
            trace!("minted session cookie: {}", cookie);
        }

        if !conn.write_buffer.is_empty() || matches!(conn.action, ActiveAction::FileDownload(_, _))
        {
            poll.registry().reregister(
                &mut conn.stream,
                token,
                Interest::READABLE | Interest::WRITABLE,
            )?;
        }
        Ok(closed)
    }

    pub fn parse_request(
        conn: &mut HttpConnection,
        poll: &Poll,
        next_token: &mut usize,
        cgi_to_client: &mut HashMap<Token, Token>,
        client_token: Token,
        session_store: &mut SessionStore,
    ) -> core::result::Result<(), ParseError> {
        loop {
            let res = match conn.request.state {
                ParsingState::RequestLine => conn.request.parse_request_line(),
                ParsingState::Headers => HttpRequest::parse_headers(conn),
                ParsingState::HeadersDone => {
                    if let Some(mut res) = HttpRequest::setup_action(
                        conn,
                        poll,
                        next_token,
                        cgi_to_client,
                        client_token,
                        session_store,
                    )? {
                        if let Some(cookie) = conn.pending_set_cookie.take() {
                            res.set_header("Set-Cookie", &cookie);
                        }
                        conn.write_buffer.extend_from_slice(&res.to_bytes());
                        conn.request.state = ParsingState::Complete;
                    }
                    Ok(())
                }
                ParsingState::Body => HttpRequest::parse_unchunked_body(poll, conn),
                ParsingState::ChunkedBody => match HttpRequest::parse_chunked_body(conn) {
                    Ok(true) => {
                        conn.request.state = ParsingState::Complete;
                        Ok(())
                    }
                    Ok(false) => {
                        return Err(ParseError::IncompleteRequestLine);
                    }
                    Err(e) => Err(e),
                },
                _ => break,
            };

            match res {
                Ok(_) => {
                    if conn.request.state == ParsingState::Complete {
                        break;
                    }
                }
                Err(ParseError::IncompleteRequestLine) => {
                    return Err(ParseError::IncompleteRequestLine);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn setup_action(
        conn: &mut HttpConnection,
        poll: &Poll,
        next_token: &mut usize,
        cgi_to_client: &mut HashMap<Token, Token>,
        client_token: Token,
        session_store: &mut SessionStore,
    ) -> core::result::Result<Option<HttpResponse>, ParseError> {
        let s_cfg = conn.resolve_config();
        conn.s_cfg = Some(Arc::clone(&s_cfg));
        conn.pending_set_cookie = session_store.session_cookie_header(&conn.request);

        let content_length = conn
            .request
            .header("content-length")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);

        let is_chunked = conn
            .request
            .header("transfer-encoding")
            .map(|v| v.contains("chunked"))
            .unwrap_or(false);

        let content_type = conn
            .request
            .header("content-type")
            .map(|s| s.as_str())
            .unwrap_or("");

        conn.boundary = content_type
            .split("boundary=")
            .nth(1)
            .map(|b| b.trim())
            .unwrap_or("")
            .to_string();

        // 1. Content-Length exceeds server limit -> 413.
        let max_body = s_cfg.client_max_body_size;
        if !is_chunked && content_length > max_body {
            return Err(ParseError::PayloadTooLarge);
        }

        conn.body_remaining = content_length;

        // 2. Unrecognized method -> 501, ahead of routing.
        if matches!(conn.request.method, Method::Unknown(_)) {
            return Ok(Some(handle_error(HTTP_NOT_IMPLEMENTED, Some(&s_cfg))));
        }

        let req_url = conn.request.url.clone();
        let req_method = conn.request.method.clone();
        let res = match s_cfg.find_route(&req_url, &req_method) {
            // 3. Matched location has a redirect -> redirect response.
            Ok(r_cfg) if r_cfg.redirection.is_some() => {
                let target = r_cfg.redirection.as_ref().unwrap();
                Some(HttpResponse::redirect(
                    r_cfg.redirect_code.unwrap_or(HTTP_FOUND),
                    target,
                ))
            }
            // 5. OPTIONS -> synthesize Allow header.
            Ok(r_cfg) if matches!(req_method, Method::Options) => {
                Some(HttpResponse::options(&r_cfg.methods))
            }
            // 6. Extension-mapped CGI dispatch.
            Ok(r_cfg) if ext_of(&req_url).is_some_and(|ext| r_cfg.is_cgi_ext(ext)) => {
                let ext = ext_of(&req_url).unwrap();
                let Some(program) = r_cfg.resolve_interpreter(ext) else {
                    return Ok(Some(handle_error(HTTP_NOT_IMPLEMENTED, Some(&s_cfg))));
                };

                let full_script_path =
                    PathBuf::from(&s_cfg.root).join(req_url.trim_start_matches('/'));
                if !full_script_path.is_file() {
                    return Ok(Some(handle_error(HTTP_NOT_FOUND, Some(&s_cfg))));
                }

                // 1. OUT pair: script stdout -> server.
                let Ok((server_out_std, script_out_std)) = UnixStream::pair() else {
                    return Ok(Some(handle_error(500, Some(&s_cfg))));
                };
                server_out_std.set_nonblocking(true).ok();
                let mut server_out_mio = mio::net::UnixStream::from_std(server_out_std);

                // 2. IN pair: server -> script stdin.
                let Ok((server_in_std, script_in_std)) = UnixStream::pair() else {
                    return Ok(Some(handle_error(500, Some(&s_cfg))));
                };
                server_in_std.set_nonblocking(true).ok();
                let mut server_in_mio = mio::net::UnixStream::from_std(server_in_std);

                let script_output_file = unsafe { File::from_raw_fd(script_out_std.into_raw_fd()) };
                let script_input_file = unsafe { File::from_raw_fd(script_in_std.into_raw_fd()) };

                let env_vars = build_cgi_env(conn, &full_script_path);
                let mut cmd = Command::new(&program);
                cmd.arg(&full_script_path)
                    .env_clear()
                    .envs(env_vars)
                    .stdin(Stdio::from(script_input_file))
                    .stdout(Stdio::from(script_output_file))
                    .stderr(Stdio::inherit());

                match cmd.spawn() {
                    Ok(child) => {
                        let out_token = Token(*next_token);
                        *next_token += 1;
                        poll.registry()
                            .register(&mut server_out_mio, out_token, Interest::READABLE)
                            .ok();

                        let in_token = Token(*next_token);
                        *next_token += 1;
                        poll.registry()
                            .register(&mut server_in_mio, in_token, Interest::WRITABLE)
                            .ok();

                        conn.cgi_out_token = Some(out_token);
                        conn.cgi_in_token = Some(in_token);

                        conn.action = ActiveAction::Cgi {
                            out_stream: server_out_mio,
                            in_stream: Some(server_in_mio),
                            child,
                            parse_state: CgiParsingState::ReadHeaders,
                            header_buf: Vec::new(),
                            start_time: Instant::now(),
                        };

                        cgi_to_client.insert(out_token, client_token);
                        cgi_to_client.insert(in_token, client_token);

                        None
                    }
                    Err(_) => Some(handle_error(500, Some(&s_cfg))),
                }
            }
            Ok(r_cfg) => match req_method {
                // 7. POST to an upload-enabled location.
                Method::POST if !r_cfg.upload_dir.is_empty() => {
                    let path = PathBuf::from(&r_cfg.root).join(&r_cfg.upload_dir);
                    conn.action = ActiveAction::Upload(path);
                    None
                }
                Method::POST => Some(handle_error(HTTP_METHOD_NOT_ALLOWED, Some(&s_cfg))),
                // 8. PUT -> write body to root+uri (201 new / 200 replace).
                Method::PUT => {
                    let target = resolve_target_path(&r_cfg.root, &req_url);
                    let existed = target.is_file();
                    let _ = fs::remove_file(&target);
                    conn.action = ActiveAction::Put(target, existed);
                    None
                }
                // 9. DELETE -> unlink root+uri.
                Method::DELETE => Some(handle_delete(&conn.request, r_cfg, &s_cfg)),
                // 10. HEAD -> run the GET workflow, then strip the body.
                Method::HEAD => match handle_get(&conn.request, r_cfg, &s_cfg) {
                    (res, ActiveAction::FileDownload(file, file_size)) => {
                        drop(file);
                        Some(res.for_head(file_size))
                    }
                    (res, _) => Some(res.for_head(0)),
                },
                // 11. GET -> static file or listing.
                Method::GET => {
                    let (res, action) = handle_get(&conn.request, r_cfg, &s_cfg);
                    if let ActiveAction::FileDownload(file, file_size) = action {
                        conn.action = ActiveAction::FileDownload(file, file_size);
                    }
                    Some(res)
                }
                Method::Options | Method::Unknown(_) => unreachable!("handled above"),
            },
            // 4. Method not in the location's allowed_methods -> 405.
            Err(RoutingError::MethodNotAllowed) => {
                Some(handle_error(HTTP_METHOD_NOT_ALLOWED, Some(&s_cfg)))
            }
            Err(RoutingError::NotFound) => Some(handle_error(HTTP_NOT_FOUND, Some(&s_cfg))),
        };

        // 3. Update parser state based on whether a body is expected.
        if res.is_none() {
            if is_chunked {
                conn.request.state = ParsingState::ChunkedBody;
            } else if content_length > 0 {
                conn.request.state = ParsingState::Body;
            } else if matches!(
                conn.action,
                ActiveAction::Cgi { .. } | ActiveAction::Put(_, _) | ActiveAction::Upload(_)
            ) {
                conn.request.state = ParsingState::Complete;
            } else {
                return Ok(Some(handle_error(HTTP_LENGTH_REQUIRED, Some(&s_cfg))));
            }
        }

        Ok(res)
    }

    fn parse_request_line(&mut self) -> core::result::Result<(), ParseError> {
        if let Some(abs_index) = find_crlf(&self.buffer, self.cursor) {
            let line_bytes = &self.buffer[self.cursor..abs_index];
            if line_bytes.len() > MAX_HEADER_LINE {
                return Err(ParseError::HeaderTooLong);
            }
            let request_line =
                std::str::from_utf8(line_bytes).map_err(|_| ParseError::MalformedRequestLine)?;

            let parts: Vec<&str> = request_line.split_whitespace().collect();
            if parts.len() != 3 {
                return Err(ParseError::MalformedRequestLine);
            }

            if parts[1].len() > MAX_URI_LEN {
                return Err(ParseError::UriTooLong);
            }
            if parts[1].contains("../") || parts[1].contains("..\\") {
                return Err(ParseError::PathTraversal);
            }
            if !matches!(parts[2], "HTTP/1.0" | "HTTP/1.1") {
                return Err(ParseError::UnsupportedVersion);
            }

            self.method = Method::from_str(&parts[0].to_uppercase()).unwrap();
            self.version = parts[2].to_string();

            // Strip fragment, then split off (and keep) the query string.
            let without_fragment = parts[1].split('#').next().unwrap_or(parts[1]);
            match without_fragment.split_once('?') {
                Some((path, query)) => {
                    self.url = path.to_string();
                    self.query = query.to_string();
                }
                None => {
                    self.url = without_fragment.to_string();
                    self.query.clear();
                }
            }

            self.cursor = abs_index + CRLN_LEN;
            self.state = ParsingState::Headers;
        } else {
            return Err(ParseError::IncompleteRequestLine);
        }
        Ok(())
    }

    fn extract_and_parse_header(
        &mut self,
    ) -> core::result::Result<Option<(String, String)>, ParseError> {
        if let Some(abs_index) = find_crlf(&self.buffer, self.cursor) {
            let line_bytes = &self.buffer[self.cursor..abs_index];
            if line_bytes.is_empty() {
                self.cursor = abs_index + CRLN_LEN;
                return Ok(None);
            }
            if line_bytes.len() > MAX_HEADER_LINE {
                return Err(ParseError::HeaderTooLong);
            }
            let line =
                std::str::from_utf8(line_bytes).map_err(|_| ParseError::MalformedRequestLine)?;
            self.cursor = abs_index + CRLN_LEN;
            if let Some(sep) = line.find(':') {
                let key = line[..sep].trim().to_string();
                let val = line[sep + 1..].trim().to_string();
                return Ok(Some((key.to_ascii_lowercase(), val)));
            }
            Err(ParseError::MalformedRequestLine)
        } else {
            Err(ParseError::IncompleteRequestLine)
        }
    }

    fn parse_headers(conn: &mut HttpConnection) -> core::result::Result<(), ParseError> {
        loop {
            let headers_option = conn.request.extract_and_parse_header()?;
            match headers_option {
                Some((k, v)) => {
                    conn.request.header_count += 1;
                    conn.request.header_bytes += k.len() + v.len();
                    if conn.request.header_count > MAX_HEADER_COUNT {
                        return Err(ParseError::TooManyHeaders);
                    }
                    if conn.request.header_bytes > MAX_HEADER_BYTES {
                        return Err(ParseError::HeaderFieldsTooLarge);
                    }
                    if matches!(k.as_str(), "content-length" | "transfer-encoding" | "host")
                        && conn.request.headers.contains_key(&k)
                    {
                        return Err(ParseError::DuplicateHeader);
                    }
                    if k == "expect" && !v.eq_ignore_ascii_case("100-continue") {
                        return Err(ParseError::ExpectationFailed);
                    }
                    conn.request.headers.insert(k, v);
                }
                None => {
                    if conn.request.headers.contains_key("content-length")
                        && conn.request.headers.contains_key("transfer-encoding")
                    {
                        return Err(ParseError::ConflictingBodyHeaders);
                    }
                    if let Some(te) = conn.request.headers.get("transfer-encoding") {
                        if te.trim() != "chunked" {
                            return Err(ParseError::BadTransferEncoding);
                        }
                    }
                    if conn.request.version == "HTTP/1.1"
                        && conn.request.headers.get("host").is_none_or(|h| h.is_empty())
                    {
                        return Err(ParseError::MissingHost);
                    }

                    conn.request.buffer.drain(..conn.request.cursor);
                    conn.request.cursor = 0;
                    conn.request.state = ParsingState::HeadersDone;

                    return Ok(());
                }
            };
        }
    }

    pub fn parse_unchunked_body(
        poll: &Poll,
        conn: &mut HttpConnection,
    ) -> core::result::Result<(), ParseError> {
        if conn.s_cfg.is_some() {
            let available = conn.request.buffer.len() - conn.request.cursor;
            let to_process = std::cmp::min(available, conn.body_remaining);

            if to_process > 0 {
                match &mut conn.action {
                    ActiveAction::Cgi { in_stream, .. } => {
                        let data = conn.request.buffer.drain(..to_process).collect::<Vec<u8>>();
                        conn.cgi_buffer.extend_from_slice(&data);
                        conn.body_remaining -= to_process;

                        if let Some(in_token) = conn.cgi_in_token {
                            if let Some(pipe) = in_stream {
                                poll.registry()
                                    .reregister(pipe, in_token, Interest::WRITABLE)
                                    .ok();
                            }
                        }
                    }
                    ActiveAction::Put(path, _) => {
                        let path = path.clone();
                        let data = conn.request.buffer.drain(..to_process).collect::<Vec<u8>>();
                        append_to_file(&path, &data);
                        conn.body_remaining -= to_process;
                    }
                    _ => {
                        let start = conn.request.cursor;
                        execute_active_action(
                            &conn.request,
                            &mut conn.upload_manager,
                            &mut conn.action,
                            start,
                            to_process,
                            &conn.boundary,
                        )?;

                        conn.body_remaining -= to_process;
                        conn.request.buffer.drain(start..start + to_process);
                    }
                }
            }
        }

        if conn.body_remaining == 0 {
            conn.request.state = ParsingState::Complete;
        } else {
            return Err(ParseError::IncompleteRequestLine);
        }

        Ok(())
    }

    pub fn parse_chunked_body(conn: &mut HttpConnection) -> core::result::Result<bool, ParseError> {
        if let Some(s_cfg) = &conn.s_cfg {
            loop {
                match conn.request.chunk_state {
                    ChunkState::ReadSize => {
                        let current_len = conn.request.buffer.len();
                        if current_len == 0 {
                            return Ok(false);
                        }

                        let search_limit = std::cmp::min(current_len, 18);
                        match find_subsequence(&conn.request.buffer[..search_limit], b"\r\n", 0) {
                            Some(line_end) => {
                                let hex_str =
                                    String::from_utf8_lossy(&conn.request.buffer[..line_end]);
                                let chunk_size = usize::from_str_radix(hex_str.trim(), 16)
                                    .map_err(|_| ParseError::ParseHexError)?;
                                if conn.total_body_read + chunk_size > s_cfg.client_max_body_size {
                                    return Err(ParseError::PayloadTooLarge);
                                }

                                if chunk_size == 0 {
                                    if conn.request.buffer.len() < line_end + 2 {
                                        return Ok(false);
                                    }
                                    conn.request.buffer.drain(..line_end + 2);
                                    conn.request.chunk_state = ChunkState::ReadTrailers;
                                    continue;
                                }

                                conn.request.chunk_state = ChunkState::ReadData(chunk_size);
                                conn.request.buffer.drain(..line_end + 2);
                            }
                            None => {
                                if current_len >= 18 {
                                    return Err(ParseError::ParseHexError);
                                }
                                return Ok(false);
                            }
                        }
                    }

                    ChunkState::ReadData(remaining_size) => {
                        if conn.request.buffer.is_empty() {
                            return Ok(false);
                        }

                        let available = conn.request.buffer.len();
                        let to_read = std::cmp::min(available, remaining_size);

                        let data = conn.request.buffer.drain(..to_read).collect::<Vec<u8>>();

                        match &mut conn.action {
                            ActiveAction::Cgi { .. } => {
                                conn.cgi_buffer.extend_from_slice(&data);
                            }
                            ActiveAction::Put(path, _) => {
                                append_to_file(&path.clone(), &data);
                            }
                            _ => {
                                if let Some(mgr) = &mut conn.upload_manager {
                                    if !conn.boundary.is_empty() {
                                        mgr.upload_body_with_boundry(&conn.request, &data);
                                    } else {
                                        mgr.upload_simple_body(&conn.request, &data);
                                    }
                                }
                            }
                        }

                        conn.total_body_read += to_read;
                        let new_remaining = remaining_size - to_read;

                        if new_remaining == 0 {
                            conn.request.chunk_state = ChunkState::ReadTrailingCRLF;
                        } else {
                            conn.request.chunk_state = ChunkState::ReadData(new_remaining);
                            return Ok(false);
                        }
                    }

                    ChunkState::ReadTrailingCRLF => {
                        if conn.request.buffer.len() < 2 {
                            return Ok(false);
                        }

                        if &conn.request.buffer[..2] != b"\r\n" {
                            return Err(ParseError::ParseHexError);
                        }
                        conn.request.buffer.drain(..2);
                        conn.request.chunk_state = ChunkState::ReadSize;
                    }

                    ChunkState::ReadTrailers => {
                        if conn.request.buffer.len() > MAX_HEADER_LINE {
                            return Err(ParseError::HeaderTooLong);
                        }
                        match conn.request.extract_and_parse_header() {
                            Ok(Some((k, v))) => {
                                // Open Question 2: keep only trailers named in the
                                // `Trailer:` allow-list, discard the rest.
                                if let Some(allowed_trailers) = conn.request.headers.get("trailer")
                                {
                                    if allowed_trailers.to_lowercase().contains(&k) {
                                        conn.request.trailers.insert(k, v);
                                    }
                                }
                                continue;
                            }
                            Ok(None) => {
                                conn.request.buffer.drain(..conn.request.cursor);
                                conn.request.cursor = 0;
                                return Ok(true);
                            }
                            Err(ParseError::IncompleteRequestLine) => return Ok(false),
                            Err(e) => return Err(e),
                        }
                    }
                }
            }
        }
        Ok(true)
    }

    pub fn extract_filename(&self) -> String {
        format!(
            "uploaded_{}",
            SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0)
        )
    }
}

/// Centralises the `ParseError` -> HTTP status code mapping (spec.md §9 design
/// note: the parser surfaces a status field; dispatch consults it in one place).
fn status_code_for(e: &ParseError) -> u16 {
    match e {
        ParseError::PayloadTooLarge => HTTP_PAYLOAD_TOO_LARGE,
        ParseError::InvalidMethod => HTTP_METHOD_NOT_ALLOWED,
        ParseError::HeaderTooLong => HTTP_URI_TOO_LONG,
        ParseError::TooManyHeaders | ParseError::HeaderFieldsTooLarge => {
            HTTP_HEADER_FIELDS_TOO_LARGE
        }
        ParseError::UriTooLong => HTTP_URI_TOO_LONG,
        ParseError::UnsupportedVersion => HTTP_VERSION_NOT_SUPPORTED,
        ParseError::ExpectationFailed => HTTP_EXPECTATION_FAILED,
        ParseError::Error(code) => *code,
        _ => HTTP_BAD_REQUEST,
    }
}

fn ext_of(url: &str) -> Option<&str> {
    url.rsplit('/').next()?.rsplit_once('.').map(|(_, ext)| ext)
}

fn resolve_target_path(root: &str, url: &str) -> PathBuf {
    PathBuf::from(root).join(url.trim_start_matches('/'))
}

fn append_to_file(path: &Path, data: &[u8]) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
        let _ = f.write_all(data);
    }
}

fn find_crlf(buffer: &[u8], start_offset: usize) -> Option<usize> {
    let search_area = buffer.get(start_offset..)?;

    let mut current_pos = 0;
    while let Some(r_pos) = search_area[current_pos..].iter().position(|&b| b == b'\r') {
        let abs_r_pos_in_search = current_pos + r_pos;

        if search_area.get(abs_r_pos_in_search + 1) == Some(&b'\n') {
            return Some(start_offset + abs_r_pos_in_search);
        }
        current_pos = abs_r_pos_in_search + 1;
    }
    None
}

pub fn find_subsequence(buffer: &[u8], needle: &[u8], start_offset: usize) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let search_area = buffer.get(start_offset..)?;
    let first_byte = needle[0];
    let mut current_pos = 0;

    while let Some(rel_pos) = search_area[current_pos..]
        .iter()
        .position(|&b| b == first_byte)
    {
        let abs_pos_in_search = current_pos + rel_pos;

        if let Some(candidate) =
            search_area.get(abs_pos_in_search..abs_pos_in_search + needle.len())
        {
            if candidate == needle {
                return Some(start_offset + abs_pos_in_search);
            }
        } else {
            return None;
        }

        current_pos = abs_pos_in_search + 1;
    }
    None
}

impl Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- HTTP Request ---\n")?;
        writeln!(f, "{:?} {} {}", self.method, self.url, self.version)?;

        writeln!(f, "Headers:")?;
        for (key, value) in &self.headers {
            writeln!(f, "  {}: {}", key, value)?;
        }

        if !self.body.is_empty() {
            writeln!(f, "Body ({} bytes):", self.body.len())?;
            match String::from_utf8(self.body.clone()) {
                Ok(s) => writeln!(f, "  {}", s)?,
                Err(_) => writeln!(f, "  <binary data>")?,
            }
        } else {
            writeln!(f, "Body: <empty>")?;
        }
        writeln!(f, "\n--------------------")?;
        writeln!(f, "--------------------")
    }
}

#[derive(Debug, Default)]
pub struct PartInfo {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: String,
}

pub fn parse_part_headers(headers: &str) -> PartInfo {
    let mut info = PartInfo {
        name: String::new(),
        filename: None,
        content_type: String::new(),
    };

    for line in headers.lines() {
        if line.starts_with("Content-Disposition:") {
            if let Some(n) = line.split(';').find(|s| s.trim().starts_with("name=")) {
                info.name = n
                    .split('=')
                    .nth(1)
                    .unwrap_or("")
                    .trim_matches('"')
                    .to_string();
            }
            if let Some(f) = line.split(';').find(|s| s.trim().starts_with("filename=")) {
                info.filename = Some(
                    f.split('=')
                        .nth(1)
                        .unwrap_or("")
                        .trim_matches('"')
                        .to_string(),
                );
            }
        } else if line.starts_with("Content-Type:") {
            info.content_type = line
                .split(':')
                .nth(1)
                .unwrap_or("text/plain")
                .trim()
                .to_string();
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trips() {
        assert_eq!(Method::from_str("PUT").unwrap(), Method::PUT);
        assert_eq!(Method::from_str("PATCH").unwrap(), Method::Unknown("PATCH".into()));
    }

    #[test]
    fn request_line_splits_query_and_strips_fragment() {
        let mut req = HttpRequest::new();
        req.buffer.extend_from_slice(b"GET /a/b?x=1#frag HTTP/1.1\r\n");
        req.parse_request_line().unwrap();
        assert_eq!(req.url, "/a/b");
        assert_eq!(req.query, "x=1");
    }

    #[test]
    fn request_line_rejects_path_traversal() {
        let mut req = HttpRequest::new();
        req.buffer.extend_from_slice(b"GET /a/../../etc/passwd HTTP/1.1\r\n");
        assert_eq!(req.parse_request_line(), Err(ParseError::PathTraversal));
    }

    #[test]
    fn request_line_rejects_bad_version() {
        let mut req = HttpRequest::new();
        req.buffer.extend_from_slice(b"GET / HTTP/2.0\r\n");
        assert_eq!(req.parse_request_line(), Err(ParseError::UnsupportedVersion));
    }
}
