use derive_yaml::FromYaml;
use std::collections::HashMap;
use crate::config::parser::{ConfigError, ConfigParser, FromYaml, ParseResult};
use crate::http::Method;
use crate::router::RoutingError;

/// True if location key `key` governs request path `path`: exact match, a
/// path-segment-bounded prefix, or the catch-all root `"/"`.
pub fn path_matches(key: &str, path: &str) -> bool {
    if key == "/" {
        return true;
    }
    path == key || path.starts_with(&format!("{}/", key.trim_end_matches('/')))
}

// --- Constants ---
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVER_NAME: &str = "_";
pub const DEFAULT_MAX_BODY_SIZE: usize = 1_048_576; // 1MB
pub const DEFAULT_ROUTE_PATH: &str = "/";
pub const DEFAULT_ROOT: &str = "./www";
pub const DEFAULT_FILE: &str = "index.html";

// Conventional absolute interpreter paths tried in order, keyed by extension,
// when a route's `cgi_path` is unset. The first candidate that exists on disk wins.
pub const CGI_INTERPRETERS: &[(&str, &[&str])] = &[
    ("py", &["/usr/bin/python3", "/usr/local/bin/python3", "/bin/python3"]),
    ("php", &["/usr/bin/php-cgi", "/usr/local/bin/php-cgi"]),
    ("pl", &["/usr/bin/perl", "/usr/local/bin/perl"]),
    ("rb", &["/usr/bin/ruby", "/usr/local/bin/ruby"]),
    ("sh", &["/bin/bash", "/usr/bin/bash", "/bin/sh"]),
];

#[derive(Debug, Clone)]
pub struct RouteConfig {
    pub path: String,
    pub methods: Vec<String>,
    pub redirection: Option<String>,
    pub redirect_code: Option<u16>,
    pub root: String,
    pub default_file: String,
    pub cgi_ext: Option<String>,
    pub cgi_extensions: Vec<String>,
    pub cgi_path: Option<String>,
    pub autoindex: bool,
    pub upload_dir: String,
    pub max_body_size: Option<usize>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_ROUTE_PATH.to_string(),
            methods: vec!["GET".to_string(), "HEAD".to_string()],
            redirection: None,
            redirect_code: None,
            root: DEFAULT_ROOT.to_string(),
            default_file: DEFAULT_FILE.to_string(),
            cgi_ext: None,
            cgi_extensions: Vec::new(),
            cgi_path: None,
            autoindex: false,
            upload_dir: String::new(),
            max_body_size: None,
        }
    }
}

impl RouteConfig {
    /// Resolves the interpreter binary for this route's CGI extension, preferring an
    /// explicit `cgi_path` override and falling back to the conventional search list,
    /// picking the first candidate path that exists on disk.
    pub fn resolve_interpreter(&self, ext: &str) -> Option<String> {
        if let Some(p) = &self.cgi_path {
            return Some(p.clone());
        }
        CGI_INTERPRETERS
            .iter()
            .find(|(e, _)| *e == ext)
            .and_then(|(_, candidates)| {
                candidates
                    .iter()
                    .find(|path| std::path::Path::new(path).exists())
                    .map(|p| p.to_string())
            })
    }

    /// True if `ext` (without the leading dot) is configured as CGI for this route.
    pub fn is_cgi_ext(&self, ext: &str) -> bool {
        self.cgi_ext.as_deref() == Some(ext) || self.cgi_extensions.iter().any(|e| e == ext)
    }
}

impl ServerConfig {
    /// Longest-prefix location match for `path`, then a method-allowed check
    /// (OPTIONS is always permitted; the caller synthesizes the `Allow` response).
    pub fn find_route(&self, path: &str, method: &Method) -> Result<&RouteConfig, RoutingError> {
        let route = self
            .routes
            .iter()
            .filter(|r| path_matches(&r.path, path))
            .max_by_key(|r| r.path.len())
            .ok_or(RoutingError::NotFound)?;

        if !matches!(method, Method::Options) && !method.is_allowed(&route.methods) {
            return Err(RoutingError::MethodNotAllowed);
        }

        Ok(route)
    }
}

// Hand-written instead of `#[derive(FromYaml)]` so a missing `path` is a parse
// error rather than silently falling back to the default route path.
impl FromYaml for RouteConfig {
    fn from_yaml(parser: &mut ConfigParser, min_indent: usize) -> ParseResult<Self> {
        let mut obj = Self::default();
        let mut struct_indent: Option<usize> = None;
        let mut seen_path = false;

        loop {
            if !parser.check_indentation(min_indent, &mut struct_indent)? {
                break;
            }
            if parser.is_end_of_block() {
                break;
            }
            let key = match parser.parse_map_key()? {
                Some(k) => k,
                None => break,
            };

            match key.as_str() {
                "path" => {
                    seen_path = true;
                    parser.consume_key(&key)?;
                    obj.path = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'path'".to_string()); e })?;
                }
                "methods" => {
                    parser.consume_key(&key)?;
                    obj.methods = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'methods'".to_string()); e })?;
                }
                "redirection" | "redirect" => {
                    parser.consume_key(&key)?;
                    obj.redirection = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'redirection'".to_string()); e })?;
                }
                "redirect_code" => {
                    parser.consume_key(&key)?;
                    obj.redirect_code = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'redirect_code'".to_string()); e })?;
                }
                "root" => {
                    parser.consume_key(&key)?;
                    obj.root = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'root'".to_string()); e })?;
                }
                "default_file" | "index" => {
                    parser.consume_key(&key)?;
                    obj.default_file = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'default_file'".to_string()); e })?;
                }
                "cgi_ext" => {
                    parser.consume_key(&key)?;
                    obj.cgi_ext = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'cgi_ext'".to_string()); e })?;
                }
                "cgi_extensions" => {
                    parser.consume_key(&key)?;
                    obj.cgi_extensions = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'cgi_extensions'".to_string()); e })?;
                }
                "cgi_path" => {
                    parser.consume_key(&key)?;
                    obj.cgi_path = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'cgi_path'".to_string()); e })?;
                }
                "autoindex" => {
                    parser.consume_key(&key)?;
                    obj.autoindex = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'autoindex'".to_string()); e })?;
                }
                "upload_dir" | "upload_pass" => {
                    parser.consume_key(&key)?;
                    obj.upload_dir = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'upload_dir'".to_string()); e })?;
                }
                "max_body_size" | "client_max_body_size" => {
                    parser.consume_key(&key)?;
                    obj.max_body_size = FromYaml::from_yaml(parser, min_indent)
                        .map_err(|mut e| { e.context.push("parsing field 'max_body_size'".to_string()); e })?;
                }
                _ => {
                    eprintln!("Warning: Unknown field {}", key);
                    parser.consume_key(&key)?;
                    parser.skip_value(struct_indent.unwrap_or(min_indent))?;
                }
            }
        }

        if !seen_path {
            return Err(ConfigError {
                message: "Missing required field: path".to_string(),
                loc: parser.peek_loc(),
                context: vec![],
            });
        }

        Ok(obj)
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct AppConfig {
    pub servers: Vec<ServerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn display_config(&self) {
        crate::config::display_config(&self.servers);
    }
}

#[derive(Debug, Clone, FromYaml)]
pub struct ServerConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub server_name: String,
    pub default_server: bool,
    pub error_pages: HashMap<u16, String>,
    pub client_max_body_size: usize,
    pub root: String,
    pub routes: Vec<RouteConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ports: vec![DEFAULT_PORT],
            server_name: DEFAULT_SERVER_NAME.to_string(),
            default_server: false,
            error_pages: HashMap::new(),
            client_max_body_size: DEFAULT_MAX_BODY_SIZE,
            root: DEFAULT_ROOT.to_string(),
            routes: Vec::new(),
        }
    }
}
