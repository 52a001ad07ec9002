use crate::prelude::*;
use crate::config::types::path_matches;

#[derive(Debug)]
pub enum RoutingError {
    NotFound,
    MethodNotAllowed,
}

/// Standalone host+path -> location façade, independent of a loaded `AppConfig`.
/// `server::Server` builds one of these at startup from the validated config so
/// routing is independently testable (`config::ServerConfig::find_route` implements
/// the same longest-prefix algorithm directly against one already-resolved virtual
/// server, and is what the live connection-dispatch path actually calls).
#[derive(Default)]
pub struct Router {
    routes: HashMap<String, HashMap<String, Arc<RouteConfig>>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    pub fn add_route_config(&mut self, host: &str, path: &str, route: Arc<RouteConfig>) {
        self.routes
            .entry(host.to_string())
            .or_default()
            .insert(path.to_string(), route);
    }

    pub fn resolve(
        &self,
        method: &Method,
        host: &str,
        path: &str,
    ) -> std::result::Result<Arc<RouteConfig>, RoutingError> {
        let host_routes = self.routes.get(host).ok_or(RoutingError::NotFound)?;

        let route = host_routes
            .iter()
            .filter(|(key, _)| path_matches(key, path))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, route)| route)
            .ok_or(RoutingError::NotFound)?;

        if !matches!(method, Method::Options) && !method.is_allowed(&route.methods) {
            return Err(RoutingError::MethodNotAllowed);
        }

        Ok(Arc::clone(route))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(path: &str, methods: &[&str]) -> Arc<RouteConfig> {
        Arc::new(RouteConfig {
            path: path.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn longest_prefix_wins_over_root() {
        let mut router = Router::new();
        router.add_route_config("x", "/", route("/", &["GET"]));
        router.add_route_config("x", "/a", route("/a", &["GET"]));
        let r = router.resolve(&Method::GET, "x", "/a/extra").unwrap();
        assert_eq!(r.path, "/a");
    }

    #[test]
    fn unknown_host_is_not_found() {
        let mut router = Router::new();
        router.add_route_config("x", "/", route("/", &["GET"]));
        assert!(matches!(
            router.resolve(&Method::GET, "y", "/").unwrap_err(),
            RoutingError::NotFound
        ));
    }
}
