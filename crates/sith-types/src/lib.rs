use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Servo pulse-width constants shared by the Shadow wire protocol and
/// sequence plan data.  Producers of either must use these exact values.
pub mod pulse {
    /// Panel fully open (1.0 ms pulse).
    pub const OPEN: i32 = 1000;
    /// Panel half open (1.75 ms pulse).
    pub const MID: i32 = 1750;
    /// Panel fully closed (2.0 ms pulse).
    pub const CLOSE: i32 = 2000;
    /// Sentinel: the channel produces no pulse at all.
    pub const NO_PULSE: i32 = -1;
}

/// Command family selected by the first character of a Shadow line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandFamily {
    /// `:` dome panel servos
    Panel,
    /// `*` holo projectors
    HoloProjector,
    /// `@` logic displays
    Display,
    /// `$` sound board
    Sound,
    /// `!` raw sound board passthrough
    AltSound,
    /// `%` raw holo projector passthrough
    AltHoloProjector,
    /// `&` I2C bus passthrough
    I2c,
    /// `#` persistent setup
    Setup,
}

impl CommandFamily {
    pub const ALL: [CommandFamily; 8] = [
        CommandFamily::Panel,
        CommandFamily::HoloProjector,
        CommandFamily::Display,
        CommandFamily::Sound,
        CommandFamily::AltSound,
        CommandFamily::AltHoloProjector,
        CommandFamily::I2c,
        CommandFamily::Setup,
    ];

    /// Exact marker lookup.  Unknown markers yield `None`.
    pub fn from_marker(marker: char) -> Option<Self> {
        match marker {
            ':' => Some(CommandFamily::Panel),
            '*' => Some(CommandFamily::HoloProjector),
            '@' => Some(CommandFamily::Display),
            '$' => Some(CommandFamily::Sound),
            '!' => Some(CommandFamily::AltSound),
            '%' => Some(CommandFamily::AltHoloProjector),
            '&' => Some(CommandFamily::I2c),
            '#' => Some(CommandFamily::Setup),
            _ => None,
        }
    }

    pub fn marker(self) -> char {
        match self {
            CommandFamily::Panel => ':',
            CommandFamily::HoloProjector => '*',
            CommandFamily::Display => '@',
            CommandFamily::Sound => '$',
            CommandFamily::AltSound => '!',
            CommandFamily::AltHoloProjector => '%',
            CommandFamily::I2c => '&',
            CommandFamily::Setup => '#',
        }
    }
}

impl fmt::Display for CommandFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandFamily::Panel => "panel",
            CommandFamily::HoloProjector => "holo_projector",
            CommandFamily::Display => "display",
            CommandFamily::Sound => "sound",
            CommandFamily::AltSound => "alt_sound",
            CommandFamily::AltHoloProjector => "alt_holo_projector",
            CommandFamily::I2c => "i2c",
            CommandFamily::Setup => "setup",
        };
        f.write_str(name)
    }
}

/// One decoded Shadow line: `<marker><code:2><arguments>`.
///
/// Only constructible through [`Command::parse`], which enforces the
/// three-significant-character minimum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    family: CommandFamily,
    code: String,
    arguments: String,
}

impl Command {
    /// Decode one line.  Trailing `\r`/`\n` are stripped before the length
    /// check.
    ///
    /// # Errors
    ///
    /// Returns [`SithError::MalformedCommand`] when fewer than three
    /// characters remain or the marker selects no family.
    pub fn parse(line: &str) -> Result<Self, SithError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut chars = line.chars();
        let (Some(marker), Some(c1), Some(c2)) = (chars.next(), chars.next(), chars.next()) else {
            return Err(SithError::MalformedCommand(MalformedReason::TooShort {
                length: line.chars().count(),
            }));
        };
        let family = CommandFamily::from_marker(marker)
            .ok_or(SithError::MalformedCommand(MalformedReason::UnknownFamily(marker)))?;
        Ok(Self {
            family,
            code: [c1, c2].iter().collect(),
            arguments: chars.as_str().to_string(),
        })
    }

    pub fn family(&self) -> CommandFamily {
        self.family
    }

    pub fn start_marker(&self) -> char {
        self.family.marker()
    }

    /// The two code characters following the marker.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }

    /// Everything after the marker (`code` followed by `arguments`).
    pub fn payload(&self) -> String {
        format!("{}{}", self.code, self.arguments)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.family.marker(), self.code, self.arguments)
    }
}

/// Name under which a capability is registered in a HAL registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CapabilityName {
    Motors,
    Servos,
    Leds,
    Sound,
}

impl CapabilityName {
    pub const ALL: [CapabilityName; 4] = [
        CapabilityName::Motors,
        CapabilityName::Servos,
        CapabilityName::Leds,
        CapabilityName::Sound,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CapabilityName::Motors => "motors",
            CapabilityName::Servos => "servos",
            CapabilityName::Leds => "leds",
            CapabilityName::Sound => "sound",
        }
    }
}

impl fmt::Display for CapabilityName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityName {
    type Err = SithError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| SithError::HardwareFault {
                component: s.to_string(),
                details: format!("unknown capability name '{s}'"),
            })
    }
}

/// Why a line could not be classified.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MalformedReason {
    #[error("command too short ({length} significant characters, need 3)")]
    TooShort { length: usize },

    #[error("unknown start marker {0:?}")]
    UnknownFamily(char),

    #[error("unknown {family} code {code:?}")]
    UnknownCode { family: CommandFamily, code: String },
}

/// Error taxonomy for the protocol parser, HAL registry and sequence engine.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SithError {
    #[error("Malformed Command: {0}")]
    MalformedCommand(MalformedReason),

    #[error("Invalid Argument for {code}: {argument:?} ({reason})")]
    InvalidArgument {
        code: String,
        argument: String,
        reason: String,
    },

    #[error("Capability Unavailable: {0}")]
    CapabilityUnavailable(CapabilityName),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Sequence Load Error: {0}")]
    SequenceLoad(String),

    #[error("Callback Failure: {0}")]
    CallbackFailure(String),
}

impl SithError {
    pub fn invalid_argument(
        code: impl Into<String>,
        argument: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        SithError::InvalidArgument {
            code: code.into(),
            argument: argument.into(),
            reason: reason.into(),
        }
    }
}
