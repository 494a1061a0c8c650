//! `sith` – interactive console for the Shadow protocol core.
//!
//! This binary:
//!
//! 1. Loads `~/.sith/config.toml`, writing the defaults on first run.
//! 2. Builds a control [`Session`](session::Session) on the simulated
//!    backend (servos, motors, LEDs, sound).
//! 3. Starts a ticker thread that polls the sequence engine every
//!    `poll_interval_ms`.
//! 4. Drops the user into the `sith>` REPL.
//! 5. Intercepts **Ctrl-C** to stop playback, shut the HAL down and exit.

mod config;
mod repl;
mod session;

use colored::Colorize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::warn;

use session::Session;

fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG filters (default "info"); SITH_LOG_FORMAT=json switches to
    // newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("SITH_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    print_banner();

    // ── Configuration ─────────────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    println!(
        "  Sim backend: {} servos, {} pixels, sequences in {}",
        cfg.servo_channels.to_string().yellow(),
        cfg.pixel_count.to_string().yellow(),
        cfg.sequences_dir.display().to_string().dimmed()
    );

    let poll_interval = Duration::from_millis(cfg.poll_interval_ms.max(1));
    let session = Arc::new(Mutex::new(Session::new(cfg)));
    let shutdown = Arc::new(AtomicBool::new(false));

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let session_ctrlc = session.clone();
    let shutdown_ctrlc = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        shutdown_ctrlc.store(true, Ordering::SeqCst);
        repl::lock(&session_ctrlc).shutdown();
        println!("{}", "  ✓ Playback stopped, hardware shut down.".green());
        std::process::exit(0);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; Ctrl-C will not shut the hardware down");
    }

    // ── Sequence ticker ───────────────────────────────────────────────────
    let session_tick = session.clone();
    let shutdown_tick = shutdown.clone();
    let ticker = thread::spawn(move || {
        while !shutdown_tick.load(Ordering::SeqCst) {
            repl::lock(&session_tick).tick();
            thread::sleep(poll_interval);
        }
    });

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    // ── Interactive REPL ──────────────────────────────────────────────────
    repl::run(session, shutdown);
    if ticker.join().is_err() {
        warn!("sequence ticker thread panicked");
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   _____ _ __  __  "#.bold().red());
    println!("{}", r#"  / ___/(_) /_/ /_ "#.bold().red());
    println!("{}", r#"  \__ \/ / __/ __ \"#.bold().red());
    println!("{}", r#" ___/ / / /_/ / / /"#.bold().red());
    println!("{}", r#"/____/_/\__/_/ /_/ "#.bold().red());
    println!();
    println!(
        "  {} {}",
        "Sith".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Shadow protocol console");
    println!();
}
