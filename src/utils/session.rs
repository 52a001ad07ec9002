use crate::prelude::*;
use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct Session {
    pub data: HashMap<String, String>,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Session {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    pub fn new(ttl: u64) -> Self {
        Session {
            data: HashMap::new(),
            created_at: current_timestamp(),
            expires_at: current_timestamp() + ttl,
        }
    }
}

pub struct SessionStore {
    sessions: HashMap<String, Session>,
    ttl: u64,
    counter: u64,
    pub last_cleanup: Instant,
}

impl SessionStore {
    pub fn new(ttl: u64) -> Self {
        SessionStore {
            sessions: HashMap::new(),
            ttl,
            counter: 0,
            last_cleanup: Instant::now(),
        }
    }

    pub fn cleanup(&mut self) {
        let now = current_timestamp();
        self.sessions.retain(|_, s| !s.is_expired(now));
        self.last_cleanup = Instant::now();
    }

    fn create(&mut self) -> String {
        self.counter += 1;
        let id = format!("{}-{}", current_timestamp(), self.counter);
        self.sessions.insert(id.clone(), Session::new(self.ttl));
        id
    }

    /// Ensures the request carries a live session, creating one if its cookie is
    /// missing, unknown, or expired. Returns the `Set-Cookie` header value only
    /// when a *new* session was minted, so callers attach it to the response.
    pub fn session_cookie_header(&mut self, request: &HttpRequest) -> Option<String> {
        let cookies = match request.header("cookie") {
            Some(data) => Cookies::parse(data),
            None => Cookies::new(),
        };

        let needs_new = match cookies.get("session_id") {
            Some(session_id) => match self.sessions.get(session_id) {
                Some(session) if !session.is_expired(current_timestamp()) => false,
                _ => true,
            },
            None => true,
        };

        if !needs_new {
            return None;
        }

        let id = self.create();
        Some(SetCookie::new("session_id", &id).max_age(3600).to_header())
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}
