//! REPL – the interactive `sith>` console.
//!
//! Anything that does not start with `/` is sent to the Shadow parser as a
//! command line.  Supported slash-commands:
//!   /play <file>  – load a JSON/TOML sequence and start it
//!   /pause        – pause playback
//!   /resume       – resume playback
//!   /stop         – stop playback and rewind
//!   /status       – playback and capability status
//!   /log [file]   – show recent hardware calls, or save them as JSON
//!   /help         – show this list
//!   /quit | /exit – shut down and exit

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sith_types::CapabilityName;

use crate::session::Session;

const LOG_TAIL: usize = 20;

pub(crate) fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is checked each iteration; when set the REPL exits.
pub fn run(session: Arc<Mutex<Session>>, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline(&format!("{} ", "sith>".bold().cyan())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        let (cmd, arg) = match input.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (input, ""),
        };

        match cmd {
            "/help" => cmd_help(),
            "/play" => cmd_play(&session, arg),
            "/pause" => {
                lock(&session).engine.pause();
                print_state(&session);
            }
            "/resume" => {
                lock(&session).engine.resume();
                print_state(&session);
            }
            "/stop" => {
                lock(&session).engine.stop();
                print_state(&session);
            }
            "/status" => cmd_status(&session),
            "/log" => cmd_log(&session, arg),
            "/quit" | "/exit" => break,
            other if other.starts_with('/') => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
            _ => match lock(&session).handle_line(input) {
                Ok(reply) => println!("  {}", reply.green()),
                Err(e) => println!("  {}", e.to_string().red()),
            },
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    lock(&session).shutdown();
    println!("{}", "Goodbye.".green());
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Sith Console".bold().underline());
    println!("  {}        – Shadow command, e.g. :OP01  *ON0  $S00", "<line>".bold().cyan());
    println!("  {}   – load and start a sequence file", "/play <file>".bold().cyan());
    println!("  {}  – pause / resume playback", "/pause /resume".bold().cyan());
    println!("  {}         – stop playback and rewind", "/stop".bold().cyan());
    println!("  {}       – playback and capability status", "/status".bold().cyan());
    println!("  {}   – recent hardware calls, or save them", "/log [file]".bold().cyan());
    println!("  {}  – exit the console", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_play(session: &Mutex<Session>, arg: &str) {
    if arg.is_empty() {
        println!("  {} /play <file.json|file.toml>", "Usage:".yellow());
        return;
    }
    match lock(session).play_file(Path::new(arg)) {
        Ok(()) => println!("  {} {}", "▶ playing".green(), arg.bold()),
        Err(e) => println!("  {}", e.to_string().red()),
    }
}

fn cmd_status(session: &Mutex<Session>) {
    let s = lock(session);
    let status = s.engine.status();
    println!("{}", "Playback".bold().underline());
    match s.engine.plan() {
        Some(plan) => println!("  plan     : {}", plan.name().bold()),
        None => println!("  plan     : {}", "none".dimmed()),
    }
    println!("  state    : {}", status.state.to_string().yellow());
    println!(
        "  step     : {}/{} ({:.0}%)",
        status.current_step,
        status.total_steps,
        status.progress * 100.0
    );

    println!("{}", "Capabilities".bold().underline());
    for name in CapabilityName::ALL {
        let state = match s.hal.state(name) {
            Some(state) => format!("{state:?}").green(),
            None => "not registered".dimmed(),
        };
        println!("  {:<8} : {}", name.to_string(), state);
    }
}

fn cmd_log(session: &Mutex<Session>, arg: &str) {
    let s = lock(session);
    if !arg.is_empty() {
        match s.log.save_json(Path::new(arg)) {
            Ok(()) => println!("  {} {}", "✓ command log saved to".green(), arg.bold()),
            Err(e) => println!("  {}", e.to_string().red()),
        }
        return;
    }

    let records = s.log.records();
    let skip = records.len().saturating_sub(LOG_TAIL);
    println!(
        "{} ({} total)",
        "Recent hardware calls".bold().underline(),
        records.len()
    );
    for r in records.iter().skip(skip) {
        println!(
            "  {} {:<7} {:<14} {}",
            r.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
            r.capability.to_string(),
            r.command.bold(),
            r.detail
        );
    }
}

fn print_state(session: &Mutex<Session>) {
    let state = lock(session).engine.state();
    println!("  playback {}", state.to_string().yellow());
}
