//! Capability contracts for the four hardware domains.
//!
//! Every domain trait extends [`Lifecycle`], so the registry can initialise
//! and shut down any capability without knowing its concrete type.  The
//! closed [`Capability`] enum is what backends hand to the
//! [`HalRegistry`][crate::registry::HalRegistry].
//!
//! Channel and pixel arguments follow the wire protocol: servo channels are
//! 1-based, pixel indices are 0-based.

use sith_types::{CapabilityName, SithError};

/// Lifecycle shared by every capability.
pub trait Lifecycle: Send + Sync {
    /// Bring the hardware up.  Called by the registry before first use.
    ///
    /// # Errors
    ///
    /// Returns [`SithError::HardwareFault`] when the device cannot be reached.
    fn initialize(&mut self) -> Result<(), SithError>;

    /// Release the hardware.  Called exactly once before disposal.
    ///
    /// # Errors
    ///
    /// Returns [`SithError::HardwareFault`] when teardown fails; the registry
    /// logs it and carries on with the remaining capabilities.
    fn shutdown(&mut self) -> Result<(), SithError>;

    /// Whether the device is initialised and responsive.
    fn is_available(&self) -> bool;
}

/// Differential motor pair (left/right), speeds in `-100..=100`.
pub trait Motors: Lifecycle {
    fn set_speeds(&mut self, left: i32, right: i32) -> Result<(), SithError>;

    fn stop(&mut self) -> Result<(), SithError>;

    /// Last commanded `(left, right)` speeds.
    fn speeds(&self) -> (i32, i32);
}

/// Bank of PWM servo channels, addressed `1..=channel_count()`.
pub trait Servos: Lifecycle {
    fn channel_count(&self) -> usize;

    /// Set the target pulse width in microseconds.
    fn set_position(&mut self, channel: usize, position: i32) -> Result<(), SithError>;

    /// Current target of `channel`, [`pulse::NO_PULSE`][sith_types::pulse::NO_PULSE]
    /// when stopped, `None` outside the bank.
    fn position(&self, channel: usize) -> Option<i32>;

    /// Movement speed limit (0 = fastest, higher = slower).
    fn set_speed(&mut self, channel: usize, speed: i32) -> Result<(), SithError>;

    /// `true` reverses the channel's travel.
    fn set_direction(&mut self, channel: usize, reversed: bool) -> Result<(), SithError>;

    /// Stop emitting pulses on `channel`.
    fn stop_channel(&mut self, channel: usize) -> Result<(), SithError>;
}

/// 8-bit RGB colour for pixel strips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Addressable LED strip.  Colour writes are buffered until [`Leds::flush`].
pub trait Leds: Lifecycle {
    fn pixel_count(&self) -> usize;

    fn set_pixel(&mut self, index: usize, color: Rgb) -> Result<(), SithError>;

    fn set_all(&mut self, color: Rgb) -> Result<(), SithError>;

    fn clear(&mut self) -> Result<(), SithError>;

    fn set_brightness(&mut self, brightness: u8) -> Result<(), SithError>;

    /// Push the buffered colours out to the strip.
    fn flush(&mut self) -> Result<(), SithError>;
}

/// Sound channel.
pub trait Sound: Lifecycle {
    fn play(&mut self, sound_id: u32) -> Result<(), SithError>;

    fn play_file(&mut self, file: &str) -> Result<(), SithError>;

    fn stop(&mut self) -> Result<(), SithError>;

    /// Volume in `0..=100`.
    fn set_volume(&mut self, volume: u8) -> Result<(), SithError>;

    fn play_random(&mut self, category: &str) -> Result<(), SithError>;
}

/// A registered hardware capability.  The variant decides the name it is
/// stored under.
pub enum Capability {
    Motors(Box<dyn Motors>),
    Servos(Box<dyn Servos>),
    Leds(Box<dyn Leds>),
    Sound(Box<dyn Sound>),
}

impl Capability {
    pub fn name(&self) -> CapabilityName {
        match self {
            Capability::Motors(_) => CapabilityName::Motors,
            Capability::Servos(_) => CapabilityName::Servos,
            Capability::Leds(_) => CapabilityName::Leds,
            Capability::Sound(_) => CapabilityName::Sound,
        }
    }

    pub fn initialize(&mut self) -> Result<(), SithError> {
        match self {
            Capability::Motors(c) => c.initialize(),
            Capability::Servos(c) => c.initialize(),
            Capability::Leds(c) => c.initialize(),
            Capability::Sound(c) => c.initialize(),
        }
    }

    pub fn shutdown(&mut self) -> Result<(), SithError> {
        match self {
            Capability::Motors(c) => c.shutdown(),
            Capability::Servos(c) => c.shutdown(),
            Capability::Leds(c) => c.shutdown(),
            Capability::Sound(c) => c.shutdown(),
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            Capability::Motors(c) => c.is_available(),
            Capability::Servos(c) => c.is_available(),
            Capability::Leds(c) => c.is_available(),
            Capability::Sound(c) => c.is_available(),
        }
    }

    pub fn as_motors_mut(&mut self) -> Option<&mut dyn Motors> {
        match self {
            Capability::Motors(c) => {
                let motors: &mut dyn Motors = c.as_mut();
                Some(motors)
            }
            _ => None,
        }
    }

    pub fn as_servos(&self) -> Option<&dyn Servos> {
        match self {
            Capability::Servos(c) => {
                let servos: &dyn Servos = c.as_ref();
                Some(servos)
            }
            _ => None,
        }
    }

    pub fn as_servos_mut(&mut self) -> Option<&mut dyn Servos> {
        match self {
            Capability::Servos(c) => {
                let servos: &mut dyn Servos = c.as_mut();
                Some(servos)
            }
            _ => None,
        }
    }

    pub fn as_leds_mut(&mut self) -> Option<&mut dyn Leds> {
        match self {
            Capability::Leds(c) => {
                let leds: &mut dyn Leds = c.as_mut();
                Some(leds)
            }
            _ => None,
        }
    }

    pub fn as_sound_mut(&mut self) -> Option<&mut dyn Sound> {
        match self {
            Capability::Sound(c) => {
                let sound: &mut dyn Sound = c.as_mut();
                Some(sound)
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name())
            .field("available", &self.is_available())
            .finish()
    }
}
