//! [`ShadowParser`] – decodes one Shadow line into one handler invocation.
//!
//! Classification is two-level: the start marker selects a
//! [`CommandFamily`], then the two code characters select a handler inside
//! that family.  The fixed families dispatch through `match`; the Setup
//! family goes through a runtime table so embedders can add their own setup
//! codes with [`ShadowParser::register_setup`].
//!
//! The parser keeps no state between calls.  Everything persistent lives in
//! the capabilities of the [`HalRegistry`] passed to [`ShadowParser::parse`].
//!
//! # Example
//!
//! ```rust
//! use sith_hal::sim::SimBackend;
//! use sith_protocol::{Ack, ShadowParser};
//!
//! let (mut hal, _log) = SimBackend::new().with_servos(4).into_registry();
//! hal.initialize_all();
//!
//! let parser = ShadowParser::new();
//! assert_eq!(parser.parse(":OP01\r", &mut hal).unwrap(), Ack::Applied);
//! assert_eq!(hal.servos().unwrap().position(1), Some(1000));
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sith_hal::HalRegistry;
use sith_types::{Command, CommandFamily, MalformedReason, SithError};
use tracing::{Span, debug, warn};

use crate::{lights, panel, passthrough, setup, sound};

// ─────────────────────────────────────────────────────────────────────────────
// Acknowledgements
// ─────────────────────────────────────────────────────────────────────────────

/// What a successfully handled command asks of its caller, beyond the
/// capability calls it already made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ack {
    /// Handled completely (including "target capability absent").
    Applied,
    /// `:SExx` – the caller should start choreography number `xx`.
    SequenceSelected(u32),
    /// `*H0xx`/`*F0xx` – the strip is lit; the caller ends the effect
    /// (`*ST`) once `seconds` have passed.
    HoloEffect { seconds: u32 },
    /// A setup value the caller is expected to persist.
    Setting(Setting),
    /// A decoded `&` I2C write for the caller's bus.
    I2c(I2cWrite),
    /// Raw payload of the `!`/`%` passthrough families.
    Passthrough {
        family: CommandFamily,
        payload: String,
    },
}

/// Persistent setup values decoded from `#` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Setting {
    StartupSound(u32),
    QuietMode(bool),
    SlaveDelayMs(u32),
    Mp3Player(u32),
}

/// `&addr,byte,byte…`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct I2cWrite {
    pub address: u8,
    pub bytes: Vec<u8>,
}

/// Handler for one setup code.
pub type SetupHandler =
    Box<dyn Fn(&Command, &mut HalRegistry) -> Result<Ack, SithError> + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// ShadowParser
// ─────────────────────────────────────────────────────────────────────────────

/// Shadow protocol dispatcher.
pub struct ShadowParser {
    setup: HashMap<String, SetupHandler>,
    span: Span,
}

impl Default for ShadowParser {
    fn default() -> Self {
        let mut parser = Self {
            setup: HashMap::new(),
            span: tracing::info_span!("shadow"),
        };
        setup::install_defaults(&mut parser);
        parser
    }
}

impl ShadowParser {
    /// Parser with the built-in setup table (`SD`, `SR`, `SS`, `SQ`, `ST`, `SM`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Log inside `span` instead of the default `shadow` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Add or replace the handler for setup code `code` (two characters).
    /// Returns the handler it replaced.
    pub fn register_setup(
        &mut self,
        code: &str,
        handler: impl Fn(&Command, &mut HalRegistry) -> Result<Ack, SithError> + Send + Sync + 'static,
    ) -> Option<SetupHandler> {
        self.setup.insert(code.to_string(), Box::new(handler))
    }

    /// Setup codes currently understood, sorted.
    pub fn setup_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.setup.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Decode `line` and run its handler against `hal`.
    ///
    /// # Errors
    ///
    /// - [`SithError::MalformedCommand`] when the line is too short, the
    ///   marker is unknown, or the family has no handler for the code.  No
    ///   handler runs.
    /// - [`SithError::InvalidArgument`] when the handler rejects its
    ///   arguments.  Capabilities are left untouched by that command.
    /// - [`SithError::HardwareFault`] when a capability call itself fails.
    ///
    /// A missing or unavailable capability is *not* an error: the handler
    /// logs it and the command is acknowledged.
    pub fn parse(&self, line: &str, hal: &mut HalRegistry) -> Result<Ack, SithError> {
        let _enter = self.span.enter();
        let result = Command::parse(line).and_then(|cmd| self.dispatch(&cmd, hal));
        match &result {
            Ok(ack) => debug!(line = line.trim_end(), ?ack, "command handled"),
            Err(e) => warn!(line = line.trim_end(), error = %e, "command rejected"),
        }
        result
    }

    fn dispatch(&self, cmd: &Command, hal: &mut HalRegistry) -> Result<Ack, SithError> {
        match cmd.family() {
            CommandFamily::Panel => panel::handle(cmd, hal),
            CommandFamily::HoloProjector => lights::handle_holo(cmd, hal),
            CommandFamily::Display => lights::handle_display(cmd),
            CommandFamily::Sound => sound::handle(cmd, hal),
            CommandFamily::AltSound | CommandFamily::AltHoloProjector => {
                Ok(passthrough::handle_raw(cmd))
            }
            CommandFamily::I2c => passthrough::handle_i2c(cmd),
            CommandFamily::Setup => match self.setup.get(cmd.code()) {
                Some(handler) => handler(cmd, hal),
                None => Err(unknown_code(cmd)),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared handler helpers
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn unknown_code(cmd: &Command) -> SithError {
    SithError::MalformedCommand(MalformedReason::UnknownCode {
        family: cmd.family(),
        code: cmd.code().to_string(),
    })
}

/// Parse `text` as a base-10 number for `cmd`.
pub(crate) fn parse_number<T: FromStr>(cmd: &Command, text: &str) -> Result<T, SithError> {
    text.parse::<T>().map_err(|_| {
        SithError::invalid_argument(cmd.code(), text, "expected a base-10 number")
    })
}

/// Parse a `0`/`1` flag.
pub(crate) fn parse_flag(cmd: &Command, text: &str) -> Result<bool, SithError> {
    match parse_number::<u8>(cmd, text)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(SithError::invalid_argument(cmd.code(), text, "expected 0 or 1")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sith_hal::sim::SimBackend;

    fn hal() -> HalRegistry {
        let (mut hal, _log) = SimBackend::full(4, 8).into_registry();
        hal.initialize_all();
        hal
    }

    #[test]
    fn too_short_lines_fail_without_dispatch() {
        let parser = ShadowParser::new();
        let mut hal = hal();
        for line in ["", "\r", ":O", ":O\r\n"] {
            assert!(matches!(
                parser.parse(line, &mut hal),
                Err(SithError::MalformedCommand(MalformedReason::TooShort { .. }))
            ));
        }
    }

    #[test]
    fn unknown_marker_is_rejected() {
        let parser = ShadowParser::new();
        assert_eq!(
            parser.parse("^OP01\r", &mut hal()),
            Err(SithError::MalformedCommand(MalformedReason::UnknownFamily('^')))
        );
    }

    #[test]
    fn unknown_code_is_reported_per_family() {
        let parser = ShadowParser::new();
        let mut hal = hal();
        assert_eq!(
            parser.parse(":ZZ01\r", &mut hal),
            Err(SithError::MalformedCommand(MalformedReason::UnknownCode {
                family: CommandFamily::Panel,
                code: "ZZ".to_string(),
            }))
        );
        assert!(matches!(
            parser.parse("#XX1\r", &mut hal),
            Err(SithError::MalformedCommand(MalformedReason::UnknownCode {
                family: CommandFamily::Setup,
                ..
            }))
        ));
    }

    #[test]
    fn register_setup_extends_the_runtime_table() {
        let mut parser = ShadowParser::new();
        assert!(!parser.setup_codes().contains(&"SV".to_string()));
        let previous = parser.register_setup("SV", |cmd, hal| {
            let volume = parse_number::<u8>(cmd, cmd.arguments())?;
            if let Ok(sound) = hal.sound_mut() {
                sound.set_volume(volume)?;
            }
            Ok(Ack::Applied)
        });
        assert!(previous.is_none());
        assert_eq!(parser.parse("#SV40\r", &mut hal()), Ok(Ack::Applied));
        assert!(parser.parse("#SVloud\r", &mut hal()).is_err());
    }

    #[test]
    fn register_setup_replaces_builtin() {
        let mut parser = ShadowParser::new();
        let previous = parser.register_setup("SM", |_, _| Ok(Ack::Applied));
        assert!(previous.is_some());
        assert_eq!(parser.parse("#SMabc", &mut hal()), Ok(Ack::Applied));
    }

    #[test]
    fn default_setup_codes() {
        assert_eq!(
            ShadowParser::new().setup_codes(),
            vec!["SD", "SM", "SQ", "SR", "SS", "ST"]
        );
    }

    #[test]
    fn parse_number_and_flag_helpers() {
        let cmd = Command::parse("#SQ1").unwrap();
        assert_eq!(parse_number::<u32>(&cmd, "0042").unwrap(), 42);
        assert!(parse_number::<u32>(&cmd, "4x").is_err());
        assert!(parse_number::<u32>(&cmd, "").is_err());
        assert!(parse_flag(&cmd, "1").unwrap());
        assert!(!parse_flag(&cmd, "0").unwrap());
        assert!(matches!(
            parse_flag(&cmd, "2"),
            Err(SithError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn ack_serializes_for_front_ends() {
        let json = serde_json::to_string(&Ack::SequenceSelected(2)).unwrap();
        let back: Ack = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Ack::SequenceSelected(2));
    }
}
