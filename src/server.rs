use crate::prelude::*;
use crate::timeouts;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flipped by the process shell's SIGINT/SIGTERM handler; `run` checks it
/// once per poll tick and exits the loop instead of serving the next event.
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// One bound TCP listener, with every `ServerConfig` sharing its `(host, port)` pair.
/// `HttpConnection::resolve_config` picks among these by `Host` header at
/// request-dispatch time (name-based virtual hosting on one socket).
pub struct Listener {
    pub listener: TcpListener,
    pub port: u16,
    pub configs: Vec<Arc<ServerConfig>>,
}

/// The reactor: one `mio::Poll`, one listener per bound `(host, port)`, and the
/// connection table the rest of the crate dispatches through (§4.1/§4.2).
pub struct Server {
    pub listeners: HashMap<Token, Listener>,
    pub connections: HashMap<Token, HttpConnection>,
    /// CGI pipe token -> owning client token (§4.2's "separate indexed view").
    pub cgi_to_client: HashMap<Token, Token>,
    /// Children killed or reaped-but-unobserved; retried every tick so none leak.
    pub zombie_purgatory: Vec<std::process::Child>,
    pub session_store: SessionStore,
    next_token: usize,
}

const SESSION_TTL_SECS: u64 = 3600;

impl Server {
    /// Binds one `TcpListener` per distinct `(host, port)` pair across every
    /// `ServerConfig` in `config`, registers each with `poll`, and builds the
    /// empty connection table that `run` will drive.
    pub fn new(config: AppConfig, poll: &Poll) -> Result<Self> {
        let mut by_addr: HashMap<(String, u16), Vec<Arc<ServerConfig>>> = HashMap::new();

        for server_cfg in config.servers {
            let cfg = Arc::new(server_cfg);
            for port in &cfg.ports {
                by_addr
                    .entry((cfg.host.clone(), *port))
                    .or_default()
                    .push(Arc::clone(&cfg));
            }
        }

        let mut listeners = HashMap::new();
        let mut next_token = 0usize;

        for ((host, port), configs) in by_addr {
            let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
            let mut listener = TcpListener::bind(addr)?;
            let token = Token(next_token);
            next_token += 1;

            poll.registry()
                .register(&mut listener, token, Interest::READABLE)?;

            info!("listening on {}:{}", host, port);
            listeners.insert(
                token,
                Listener {
                    listener,
                    port,
                    configs,
                },
            );
        }

        Ok(Server {
            listeners,
            connections: HashMap::new(),
            cgi_to_client: HashMap::new(),
            zombie_purgatory: Vec::new(),
            session_store: SessionStore::new(SESSION_TTL_SECS),
            next_token,
        })
    }

    /// Drains every pending connection on the listener bound to `token`,
    /// registering each with read-interest (§4.1: "every accepted client fd is
    /// set non-blocking before being added to the notifier").
    fn accept_all(&mut self, poll: &Poll, token: Token) -> Result<()> {
        let Some(listener) = self.listeners.get(&token) else {
            return Ok(());
        };
        let configs = listener.configs.clone();

        loop {
            match self.listeners.get_mut(&token).unwrap().listener.accept() {
                Ok((mut stream, _addr)) => {
                    let client_token = Token(self.next_token);
                    self.next_token += 1;

                    poll.registry()
                        .register(&mut stream, client_token, Interest::READABLE)?;

                    let conn = HttpConnection::new(stream, configs.clone());
                    self.connections.insert(client_token, conn);
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
        Ok(())
    }

    /// Opportunistically reaps children moved to purgatory by
    /// `HttpConnection::terminate_connection` or `force_cgi_timeout` whose exit
    /// wasn't yet observable — so none of them end up a lingering zombie.
    fn reap_zombies(&mut self) {
        self.zombie_purgatory
            .retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_))));
    }

    /// The event loop (§4.1): wait up to one second for readiness, dispatch
    /// each ready fd to accept/read/write/CGI handling, and reap idle
    /// connections and CGI timeouts once per second.
    pub fn run(&mut self, mut poll: Poll) -> Result<()> {
        let mut events = Events::with_capacity(1024);
        let mut last_reap = Instant::now();

        loop {
            if SHUTDOWN_REQUESTED.load(Ordering::Relaxed) {
                info!("shutdown requested, draining event loop");
                return Ok(());
            }

            if let Err(e) = poll.poll(&mut events, Some(Duration::from_secs(1))) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                let token = event.token();

                if self.listeners.contains_key(&token) {
                    let _ = self.accept_all(&poll, token);
                    continue;
                }

                if let Some(&client_token) = self.cgi_to_client.get(&token) {
                    if let Some(mut conn) = self.connections.remove(&client_token) {
                        let _ = handle_cgi_event(
                            &poll,
                            event,
                            token,
                            client_token,
                            &mut conn,
                            &mut self.cgi_to_client,
                        );
                        conn.touch();
                        self.connections.insert(client_token, conn);
                    }
                    continue;
                }

                if !self.connections.contains_key(&token) {
                    continue;
                }

                let should_close = self.dispatch_client_event(&poll, event, token);
                if should_close {
                    HttpConnection::terminate_connection(self, token);
                }
            }

            if last_reap.elapsed() >= Duration::from_secs(1) {
                timeouts::process(self, &poll);
                self.reap_zombies();
                last_reap = Instant::now();
            }
        }
    }

    /// Reads or writes on an already-accepted client connection, returning
    /// true once the connection is fully drained and should be torn down.
    fn dispatch_client_event(&mut self, poll: &Poll, event: &Event, token: Token) -> bool {
        let Some(conn) = self.connections.get_mut(&token) else {
            return false;
        };
        conn.touch();

        if event.is_readable() {
            let _ = HttpConnection::handle_read_phase(
                conn,
                poll,
                token,
                &mut self.next_token,
                &mut self.cgi_to_client,
                &mut self.session_store,
            );
        }

        if event.is_writable() {
            let _ = HttpConnection::handle_write_phase(
                conn,
                poll,
                token,
                &mut self.next_token,
                &mut self.cgi_to_client,
                &mut self.session_store,
            );
        }

        conn.should_close()
    }
}
