use crate::prelude::*;

#[derive(Debug)]
pub struct HttpResponse {
    pub version: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        let mut res = Self {
            version: "HTTP/1.1".to_string(),
            status_code,
            status_text: status_text.to_string(),
            headers: HashMap::from([("Content-Length".to_string(), "0".to_string())]),
            body: Vec::new(),
        };
        res.set_header("Connection", "close");
        res.set_header("Server", "server_proxy/1.0");
        res.set_header("Date", &http_date_now());
        res
    }

    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        self.headers.insert(key.to_lowercase(), value.to_string());
        self
    }

    pub fn set_body(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.headers
            .insert("content-length".to_string(), body.len().to_string());
        self.headers
            .insert("content-type".to_string(), content_type.to_string());
        self.body = body;
        self
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut res = format!(
            "{} {} {}\r\n",
            self.version, self.status_code, self.status_text
        )
        .into_bytes();

        for (key, val) in &self.headers {
            let formatted_key = Self::to_pascal_case(key);
            res.extend_from_slice(format!("{}: {}\r\n", formatted_key, val).as_bytes());
        }
        res.extend_from_slice(b"\r\n");
        res.extend_from_slice(&self.body);
        res
    }

    /// Strips the body (HEAD never returns one) but keeps Content-Length so the
    /// client can size a matching GET. `file_size` wins when the GET workflow
    /// resolved to a streamed file rather than an in-memory body.
    pub fn for_head(mut self, file_size: usize) -> Self {
        if file_size > 0 {
            self.set_header("Content-Length", &file_size.to_string());
        }
        self.body.clear();
        self
    }

    pub fn status_text(code: u16) -> String {
        match code {
            HTTP_OK => "OK",
            HTTP_CREATED => "Created",
            HTTP_NO_CONTENT => "No Content",
            HTTP_MOVED_PERMANENTLY => "Moved Permanently",
            HTTP_FOUND => "Found",
            HTTP_TEMPORARY_REDIRECT => "Temporary Redirect",
            HTTP_PERMANENT_REDIRECT => "Permanent Redirect",
            HTTP_BAD_REQUEST => "Bad Request",
            HTTP_FORBIDDEN => "Forbidden",
            HTTP_NOT_FOUND => "Not Found",
            HTTP_METHOD_NOT_ALLOWED => "Method Not Allowed",
            HTTP_REQUEST_TIMEOUT => "Request Timeout",
            HTTP_CONFLICT => "Conflict",
            HTTP_LENGTH_REQUIRED => "Length Required",
            HTTP_PAYLOAD_TOO_LARGE => "Payload Too Large",
            HTTP_URI_TOO_LONG => "URI Too Long",
            HTTP_UNSUPPORTED_MEDIA_TYPE => "Unsupported Media Type",
            HTTP_EXPECTATION_FAILED => "Expectation Failed",
            HTTP_HEADER_FIELDS_TOO_LARGE => "Request Header Fields Too Large",
            HTTP_INTERNAL_SERVER_ERROR => "Internal Server Error",
            HTTP_NOT_IMPLEMENTED => "Not Implemented",
            HTTP_BAD_GATEWAY => "Bad Gateway",
            HTTP_SERVICE_UNAVAILABLE => "Service Unavailable",
            GATEWAY_TIMEOUT => "Gateway Timeout",
            HTTP_VERSION_NOT_SUPPORTED => "HTTP Version Not Supported",
            _ => "Unknown",
        }
        .to_string()
    }

    pub fn set_status_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.status_text = HttpResponse::status_text(code);
        self
    }

    pub fn to_bytes_headers_only(&self) -> Vec<u8> {
        let mut res = format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_text);

        for (k, v) in &self.headers {
            let formatted_key = Self::to_pascal_case(k);
            res.push_str(&format!("{}: {}\r\n", formatted_key, v));
        }

        res.push_str("\r\n");
        res.into_bytes()
    }

    fn to_pascal_case(s: &str) -> String {
        s.split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    None => String::new(),
                    Some(f) => f.to_uppercase().collect::<String>() + chars.as_str(),
                }
            })
            .collect::<Vec<String>>()
            .join("-")
    }

    pub fn redirect(code: u16, target_url: &str) -> Self {
        let mut res = HttpResponse::new(code, &HttpResponse::status_text(code));
        res.set_header("Location", target_url);
        res
    }

    /// Synthesizes the `Allow` header for an OPTIONS request against a matched location.
    /// Per spec, OPTIONS and HEAD are always permitted in addition to the
    /// location's own configured methods.
    pub fn options(allowed_methods: &[String]) -> Self {
        let mut methods: Vec<String> = allowed_methods.to_vec();
        for extra in ["OPTIONS", "HEAD"] {
            if !methods.iter().any(|m| m == extra) {
                methods.push(extra.to_string());
            }
        }
        let mut res = HttpResponse::new(HTTP_OK, "OK");
        res.set_header("Allow", &methods.join(", "));
        res
    }
}

/// Formats the current time as an RFC 1123 (`Date:` header) timestamp in GMT,
/// e.g. `Sun, 06 Nov 1994 08:49:37 GMT`. No timezone database is consulted:
/// the server always runs in UTC terms for this header, matching GMT exactly.
pub fn http_date_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format_http_date(secs)
}

fn format_http_date(secs: u64) -> String {
    const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let days_since_epoch = secs / 86_400;
    let day_secs = secs % 86_400;
    let hour = day_secs / 3600;
    let minute = (day_secs % 3600) / 60;
    let second = day_secs % 60;

    // 1970-01-01 was a Thursday.
    let weekday = DAYS[((days_since_epoch + 4) % 7) as usize];

    let (year, month, day) = civil_from_days(days_since_epoch as i64);

    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        weekday, day, MONTHS[(month - 1) as usize], year, hour, minute, second
    )
}

/// Howard Hinnant's `civil_from_days` algorithm: days-since-epoch -> (year, month, day).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

pub fn get_mime_type(extension: Option<&str>) -> &'static str {
    match extension {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

pub fn get_ext_from_content_type(content_type: &str) -> &str {
    match content_type {
        "application/json" => ".json",
        "application/pdf" => ".pdf",
        "application/xml" => ".xml",
        "application/zip" => ".zip",
        "audio/mpeg" => ".mp3",
        "image/gif" => ".gif",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/svg+xml" => ".svg",
        "image/webp" => ".webp",
        "text/css" => ".css",
        "text/html" => ".html",
        "text/javascript" => ".js",
        "text/plain" => ".txt",
        "video/mp4" => ".mp4",
        _ => ".bin",
    }
}

pub fn generate_autoindex(path: &Path, original_url: &str) -> HttpResponse {
    let mut html = format!("<html><body><h1>Index of {}</h1><ul>", original_url);
    let base = original_url.trim_end_matches('/');

    if original_url != "/" {
        html.push_str(&format!(
            "<li><a href=\"{}/../\">../</a></li>",
            base
        ));
    }

    let mut entries: Vec<_> = path
        .read_dir()
        .map(|rd| rd.flatten().collect())
        .unwrap_or_else(|_| Vec::new());
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        let display = if is_dir { format!("{}/", name) } else { name.clone() };
        html.push_str(&format!(
            "<li><a href=\"{}/{}\">{}</a></li>",
            base, display, display
        ));
    }

    html.push_str("</ul></body></html>");
    let mut res = HttpResponse::new(HTTP_OK, "OK");
    res.set_body(html.into_bytes(), "text/html");
    res
}

/// Builds an error response, preferring a configured error page for `code` and
/// falling back to a minimal synthesized body.
pub fn handle_error(code: u16, s_cfg: Option<&Arc<ServerConfig>>) -> HttpResponse {
    let status_text = HttpResponse::status_text(code);
    let mut res = HttpResponse::new(code, &status_text);

    if let Some(cfg) = s_cfg {
        if let Some(path_str) = cfg.error_pages.get(&code) {
            let s_root = std::path::Path::new(&cfg.root);
            let err_path = s_root.join(path_str.trim_start_matches('/'));
            if let Ok(content) = fs::read(err_path) {
                res.set_body(content, "text/html");
                return res;
            }
        }
    }

    let body = format!("{} {}", code, status_text).into_bytes();
    res.set_body(body, "text/plain");
    res
}
