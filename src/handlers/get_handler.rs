pub use crate::prelude::*;

/// Resolves a GET/HEAD request against a matched location: serves the target
/// file, an autoindex listing, or the configured default file for a directory.
pub fn handle_get(
    request: &HttpRequest,
    r_cfg: &RouteConfig,
    s_cfg: &Arc<ServerConfig>,
) -> (HttpResponse, ActiveAction) {
    let relative_path = request.url.strip_prefix(&r_cfg.path).unwrap_or(&request.url);
    let mut path = PathBuf::from(&r_cfg.root);
    path.push(relative_path.trim_start_matches('/'));

    // Root is already canonicalized at config-load time; reject any resolved
    // path that escapes it (defends against symlinks inside the served tree).
    if let Ok(canon) = path.canonicalize() {
        if !canon.starts_with(&r_cfg.root) {
            return (handle_error(HTTP_FORBIDDEN, Some(s_cfg)), ActiveAction::None);
        }
    }

    if path.is_dir() {
        if !r_cfg.default_file.is_empty() && path.join(&r_cfg.default_file).is_file() {
            path.push(&r_cfg.default_file);
        } else if r_cfg.autoindex {
            return (generate_autoindex(&path, &request.url), ActiveAction::None);
        } else {
            let mut res = HttpResponse::new(HTTP_FORBIDDEN, "Forbidden");
            res.set_body(
                b"403 Forbidden: Directory listing denied".to_vec(),
                "text/plain",
            );
            return (res, ActiveAction::None);
        }
    }

    match File::open(&path) {
        Ok(file) => {
            let Ok(metadata) = file.metadata() else {
                return (
                    handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)),
                    ActiveAction::None,
                );
            };
            let file_size = metadata.size() as usize;
            let mime_type = get_mime_type(path.extension().and_then(|s| s.to_str()));

            let mut res = HttpResponse::new(HTTP_OK, "OK");
            res.set_header("Content-Length", &file_size.to_string());
            res.set_header("Content-Type", mime_type);

            (res, ActiveAction::FileDownload(file, file_size))
        }
        Err(e) => {
            let res = match e.kind() {
                std::io::ErrorKind::NotFound => handle_error(HTTP_NOT_FOUND, Some(s_cfg)),
                std::io::ErrorKind::PermissionDenied => handle_error(HTTP_FORBIDDEN, Some(s_cfg)),
                _ => handle_error(HTTP_INTERNAL_SERVER_ERROR, Some(s_cfg)),
            };
            (res, ActiveAction::None)
        }
    }
}
