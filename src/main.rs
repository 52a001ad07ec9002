use mio::Poll;
use server_proxy::{
    config::{AppConfig, FromYaml, validate_configs},
    error::Result,
    server::{Server, SHUTDOWN_REQUESTED},
};
use std::sync::atomic::Ordering;

extern "C" fn request_shutdown(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGINT, request_shutdown as libc::sighandler_t);
        libc::signal(libc::SIGTERM, request_shutdown as libc::sighandler_t);
    }
}

fn run() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());

    let content = std::fs::read_to_string(&config_path)
        .map_err(|e| format!("reading {}: {}", config_path, e))?;
    let mut config = AppConfig::from_str(&content)
        .map_err(|e| format!("parsing {}: {}", config_path, e))?;
    config.servers = validate_configs(config.servers);

    if config.servers.is_empty() {
        return Err("no valid server configurations after validation".into());
    }

    config.display_config();

    install_signal_handlers();

    let poll = Poll::new()?;
    let mut server = Server::new(config, &poll)?;

    server.run(poll)
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
