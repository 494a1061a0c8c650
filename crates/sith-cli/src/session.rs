//! One control session: the simulated HAL, the Shadow parser and the
//! sequence engine, wired together the way a front end drives them.

use colored::Colorize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use sith_hal::{CommandLog, HalRegistry, SimBackend};
use sith_protocol::{Ack, Setting, ShadowParser};
use sith_sequencer::SequenceEngine;
use sith_types::SithError;

use crate::config::Config;

pub struct Session {
    pub hal: HalRegistry,
    pub parser: ShadowParser,
    pub engine: SequenceEngine,
    pub log: CommandLog,
    pub config: Config,
    /// When the running `*H0`/`*F0` holo effect should be cleared.
    holo_deadline: Option<Instant>,
}

impl Session {
    /// Build a session on a full sim backend sized from `config` and
    /// initialise every capability.  The registry, parser and engine all log
    /// inside one `session` span.
    pub fn new(config: Config) -> Self {
        let span = tracing::info_span!("session");
        let (hal, log) =
            SimBackend::full(config.servo_channels, config.pixel_count).into_registry();
        let mut hal = hal.with_span(span.clone());
        if !hal.initialize_all() {
            warn!("some capabilities failed to initialise");
        }
        if let Ok(sound) = hal.sound_mut()
            && let Err(e) = sound.set_volume(config.volume)
        {
            warn!(error = %e, "failed to set startup volume");
        }

        let mut engine = SequenceEngine::new().with_span(span.clone());
        engine.add_completion_callback(|| {
            println!("{}", "  ✓ sequence complete".green());
            Ok(())
        });

        Self {
            hal,
            parser: ShadowParser::new().with_span(span),
            engine,
            log,
            config,
            holo_deadline: None,
        }
    }

    /// Run one Shadow line and describe what happened.
    pub fn handle_line(&mut self, line: &str) -> Result<String, SithError> {
        let ack = self.parser.parse(line, &mut self.hal)?;
        if line.starts_with('*') {
            self.holo_deadline = None;
        }
        Ok(match ack {
            Ack::Applied => "ok".to_string(),
            Ack::HoloEffect { seconds } => {
                self.holo_deadline =
                    Some(Instant::now() + Duration::from_secs(u64::from(seconds)));
                format!("holo effect for {seconds} s")
            }
            Ack::SequenceSelected(number) => match self.config.sequence_file(number) {
                Some(path) => {
                    self.play_file(&path)?;
                    format!("playing sequence {number:02} ({})", path.display())
                }
                None => format!(
                    "sequence {number:02} selected (no file in {})",
                    self.config.sequences_dir.display()
                ),
            },
            Ack::Setting(setting) => describe_setting(setting),
            Ack::I2c(write) => format!(
                "i2c write to 0x{:02x}: {:?} (no bus attached)",
                write.address, write.bytes
            ),
            Ack::Passthrough { family, payload } => {
                format!("{family} passthrough: {payload}")
            }
        })
    }

    /// Load `path` and start it from the first step.
    pub fn play_file(&mut self, path: &Path) -> Result<(), SithError> {
        self.engine.load_file(path)?;
        if !self.engine.start() {
            return Err(SithError::SequenceLoad(format!(
                "{} has no steps",
                path.display()
            )));
        }
        Ok(())
    }

    /// One poll of the sequence engine.
    pub fn tick(&mut self) {
        self.engine.update(&mut self.hal);
        if self.holo_deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            self.holo_deadline = None;
            if let Err(e) = self.parser.parse("*ST\r", &mut self.hal) {
                warn!(error = %e, "failed to end holo effect");
            }
        }
    }

    /// Stop playback and shut every capability down.
    pub fn shutdown(&mut self) {
        self.engine.stop();
        self.hal.shutdown_all();
        info!("session shut down");
    }
}

fn describe_setting(setting: Setting) -> String {
    match setting {
        Setting::StartupSound(id) => format!("startup sound set to {id}"),
        Setting::QuietMode(on) => format!("quiet mode {}", if on { "on" } else { "off" }),
        Setting::SlaveDelayMs(ms) => format!("slave delay set to {ms} ms"),
        Setting::Mp3Player(kind) => format!("mp3 player type set to {kind}"),
    }
}
