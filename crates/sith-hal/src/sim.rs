//! In-process simulation backend for tests, demos and CI without hardware.
//!
//! [`SimBackend`] builds logging stand-ins for every capability domain.  Each
//! stand-in keeps its typed state (servo targets, motor speeds, …) and
//! appends a [`CommandRecord`] to a shared [`CommandLog`], so a test or the
//! CLI can inspect exactly which hardware calls a command produced.
//!
//! # Example
//!
//! ```rust
//! use sith_hal::sim::SimBackend;
//!
//! let (mut hal, log) = SimBackend::new()
//!     .with_servos(16)
//!     .with_sound()
//!     .into_registry();
//! assert!(hal.initialize_all());
//!
//! hal.servos_mut().unwrap().set_position(1, 1000).unwrap();
//! assert_eq!(log.len(), 1);
//! ```

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sith_types::{CapabilityName, SithError, pulse};
use tracing::{debug, info};

use crate::capability::{Capability, Leds, Lifecycle, Motors, Rgb, Servos, Sound};
use crate::registry::{Backend, HalRegistry};

// ────────────────────────────────────────────────────────────────────────────
// Command log
// ────────────────────────────────────────────────────────────────────────────

/// One recorded hardware call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub timestamp: DateTime<Utc>,
    pub capability: CapabilityName,
    /// Operation name, e.g. `"set_position"`.
    pub command: String,
    /// Human-readable arguments, e.g. `"channel=1 position=1000"`.
    pub detail: String,
}

/// Shared, append-only record of every call made on sim capabilities.
/// Cloning yields another handle to the same log.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    records: Arc<Mutex<Vec<CommandRecord>>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CommandRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, capability: CapabilityName, command: &str, detail: String) {
        debug!(%capability, command, %detail, "sim hardware call");
        self.lock().push(CommandRecord {
            timestamp: Utc::now(),
            capability,
            command: command.to_string(),
            detail,
        });
    }

    /// Snapshot of all records in call order.
    pub fn records(&self) -> Vec<CommandRecord> {
        self.lock().clone()
    }

    /// Records of a single command name, in call order.
    pub fn filter(&self, command: &str) -> Vec<CommandRecord> {
        self.lock()
            .iter()
            .filter(|r| r.command == command)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Write the log as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SithError::HardwareFault`] when the file cannot be written.
    pub fn save_json(&self, path: &Path) -> Result<(), SithError> {
        let fault = |details: String| SithError::HardwareFault {
            component: "sim".to_string(),
            details,
        };
        let raw = serde_json::to_string_pretty(&self.records())
            .map_err(|e| fault(format!("failed to serialise command log: {e}")))?;
        std::fs::write(path, raw)
            .map_err(|e| fault(format!("failed to write {}: {e}", path.display())))?;
        info!(path = %path.display(), "command log saved");
        Ok(())
    }
}

fn out_of_range(capability: CapabilityName, what: &str, index: usize) -> SithError {
    SithError::HardwareFault {
        component: capability.to_string(),
        details: format!("{what} {index} out of range"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sim motors
// ────────────────────────────────────────────────────────────────────────────

/// Simulated motor pair.  Records speeds, always succeeds.
pub struct SimMotors {
    ready: bool,
    left: i32,
    right: i32,
    log: CommandLog,
}

impl SimMotors {
    pub fn new(log: CommandLog) -> Self {
        Self {
            ready: false,
            left: 0,
            right: 0,
            log,
        }
    }
}

impl Lifecycle for SimMotors {
    fn initialize(&mut self) -> Result<(), SithError> {
        self.ready = true;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), SithError> {
        self.ready = false;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.ready
    }
}

impl Motors for SimMotors {
    fn set_speeds(&mut self, left: i32, right: i32) -> Result<(), SithError> {
        self.left = left.clamp(-100, 100);
        self.right = right.clamp(-100, 100);
        self.log.push(
            CapabilityName::Motors,
            "set_speeds",
            format!("left={} right={}", self.left, self.right),
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SithError> {
        self.left = 0;
        self.right = 0;
        self.log.push(CapabilityName::Motors, "stop", String::new());
        Ok(())
    }

    fn speeds(&self) -> (i32, i32) {
        (self.left, self.right)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sim servos
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct ServoChannel {
    position: i32,
    speed: i32,
    reversed: bool,
}

/// Simulated servo bank.  Channels outside `1..=channel_count` are rejected
/// with [`SithError::HardwareFault`].
pub struct SimServos {
    ready: bool,
    channels: Vec<ServoChannel>,
    log: CommandLog,
}

impl SimServos {
    pub fn new(channel_count: usize, log: CommandLog) -> Self {
        Self {
            ready: false,
            channels: vec![ServoChannel::default(); channel_count],
            log,
        }
    }

    fn channel_mut(&mut self, channel: usize) -> Result<&mut ServoChannel, SithError> {
        channel
            .checked_sub(1)
            .and_then(|i| self.channels.get_mut(i))
            .ok_or_else(|| out_of_range(CapabilityName::Servos, "channel", channel))
    }

    /// Speed limit last set on `channel`.
    pub fn speed(&self, channel: usize) -> Option<i32> {
        channel
            .checked_sub(1)
            .and_then(|i| self.channels.get(i))
            .map(|c| c.speed)
    }

    /// Whether `channel` is reversed.
    pub fn reversed(&self, channel: usize) -> Option<bool> {
        channel
            .checked_sub(1)
            .and_then(|i| self.channels.get(i))
            .map(|c| c.reversed)
    }
}

impl Lifecycle for SimServos {
    fn initialize(&mut self) -> Result<(), SithError> {
        self.ready = true;
        info!(channels = self.channels.len(), "sim servo bank initialised");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), SithError> {
        self.ready = false;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.ready
    }
}

impl Servos for SimServos {
    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn set_position(&mut self, channel: usize, position: i32) -> Result<(), SithError> {
        self.channel_mut(channel)?.position = position;
        self.log.push(
            CapabilityName::Servos,
            "set_position",
            format!("channel={channel} position={position}"),
        );
        Ok(())
    }

    fn position(&self, channel: usize) -> Option<i32> {
        channel
            .checked_sub(1)
            .and_then(|i| self.channels.get(i))
            .map(|c| c.position)
    }

    fn set_speed(&mut self, channel: usize, speed: i32) -> Result<(), SithError> {
        self.channel_mut(channel)?.speed = speed;
        self.log.push(
            CapabilityName::Servos,
            "set_speed",
            format!("channel={channel} speed={speed}"),
        );
        Ok(())
    }

    fn set_direction(&mut self, channel: usize, reversed: bool) -> Result<(), SithError> {
        self.channel_mut(channel)?.reversed = reversed;
        self.log.push(
            CapabilityName::Servos,
            "set_direction",
            format!("channel={channel} reversed={reversed}"),
        );
        Ok(())
    }

    fn stop_channel(&mut self, channel: usize) -> Result<(), SithError> {
        self.channel_mut(channel)?.position = pulse::NO_PULSE;
        self.log.push(
            CapabilityName::Servos,
            "stop_channel",
            format!("channel={channel}"),
        );
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sim LEDs
// ────────────────────────────────────────────────────────────────────────────

/// Simulated pixel strip with a write buffer and a "shown" frame.
pub struct SimLeds {
    ready: bool,
    buffer: Vec<Rgb>,
    shown: Vec<Rgb>,
    brightness: u8,
    log: CommandLog,
}

impl SimLeds {
    pub fn new(pixel_count: usize, log: CommandLog) -> Self {
        Self {
            ready: false,
            buffer: vec![Rgb::OFF; pixel_count],
            shown: vec![Rgb::OFF; pixel_count],
            brightness: u8::MAX,
            log,
        }
    }

    /// The frame pushed by the last [`Leds::flush`].
    pub fn shown(&self) -> &[Rgb] {
        &self.shown
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }
}

impl Lifecycle for SimLeds {
    fn initialize(&mut self) -> Result<(), SithError> {
        self.ready = true;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), SithError> {
        self.buffer.fill(Rgb::OFF);
        self.shown.fill(Rgb::OFF);
        self.ready = false;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.ready
    }
}

impl Leds for SimLeds {
    fn pixel_count(&self) -> usize {
        self.buffer.len()
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) -> Result<(), SithError> {
        let pixel = self
            .buffer
            .get_mut(index)
            .ok_or_else(|| out_of_range(CapabilityName::Leds, "pixel", index))?;
        *pixel = color;
        self.log.push(
            CapabilityName::Leds,
            "set_pixel",
            format!("pixel={index} rgb=({},{},{})", color.r, color.g, color.b),
        );
        Ok(())
    }

    fn set_all(&mut self, color: Rgb) -> Result<(), SithError> {
        self.buffer.fill(color);
        self.log.push(
            CapabilityName::Leds,
            "set_all",
            format!("rgb=({},{},{})", color.r, color.g, color.b),
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<(), SithError> {
        self.buffer.fill(Rgb::OFF);
        self.log.push(CapabilityName::Leds, "clear", String::new());
        Ok(())
    }

    fn set_brightness(&mut self, brightness: u8) -> Result<(), SithError> {
        self.brightness = brightness;
        self.log.push(
            CapabilityName::Leds,
            "set_brightness",
            format!("brightness={brightness}"),
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SithError> {
        self.shown.clone_from(&self.buffer);
        self.log.push(CapabilityName::Leds, "flush", String::new());
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Sim sound
// ────────────────────────────────────────────────────────────────────────────

/// Simulated sound channel.  Remembers what is "playing".
pub struct SimSound {
    ready: bool,
    volume: u8,
    current: Option<String>,
    log: CommandLog,
}

impl SimSound {
    pub fn new(log: CommandLog) -> Self {
        Self {
            ready: false,
            volume: 100,
            current: None,
            log,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }
}

impl Lifecycle for SimSound {
    fn initialize(&mut self) -> Result<(), SithError> {
        self.ready = true;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), SithError> {
        self.current = None;
        self.ready = false;
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.ready
    }
}

impl Sound for SimSound {
    fn play(&mut self, sound_id: u32) -> Result<(), SithError> {
        self.current = Some(format!("#{sound_id}"));
        self.log
            .push(CapabilityName::Sound, "play", format!("sound_id={sound_id}"));
        Ok(())
    }

    fn play_file(&mut self, file: &str) -> Result<(), SithError> {
        self.current = Some(file.to_string());
        self.log
            .push(CapabilityName::Sound, "play_file", format!("file={file}"));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SithError> {
        self.current = None;
        self.log.push(CapabilityName::Sound, "stop", String::new());
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), SithError> {
        self.volume = volume.min(100);
        self.log.push(
            CapabilityName::Sound,
            "set_volume",
            format!("volume={}", self.volume),
        );
        Ok(())
    }

    fn play_random(&mut self, category: &str) -> Result<(), SithError> {
        self.current = Some(format!("random:{category}"));
        self.log.push(
            CapabilityName::Sound,
            "play_random",
            format!("category={category}"),
        );
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimBackend builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a backend whose capabilities are all simulated.
///
/// Call the `with_*` methods for the domains you need, then either attach it
/// to a registry with [`HalRegistry::attach_backend`] or use
/// [`into_registry`][Self::into_registry].
#[derive(Default)]
pub struct SimBackend {
    log: CommandLog,
    capabilities: Vec<Capability>,
}

impl SimBackend {
    /// Create a backend with no capabilities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every domain: motors, `servo_channels` servos, `pixel_count` pixels
    /// and sound.
    pub fn full(servo_channels: usize, pixel_count: usize) -> Self {
        Self::new()
            .with_motors()
            .with_servos(servo_channels)
            .with_leds(pixel_count)
            .with_sound()
    }

    pub fn with_motors(mut self) -> Self {
        self.capabilities
            .push(Capability::Motors(Box::new(SimMotors::new(self.log.clone()))));
        self
    }

    pub fn with_servos(mut self, channel_count: usize) -> Self {
        self.capabilities.push(Capability::Servos(Box::new(SimServos::new(
            channel_count,
            self.log.clone(),
        ))));
        self
    }

    pub fn with_leds(mut self, pixel_count: usize) -> Self {
        self.capabilities.push(Capability::Leds(Box::new(SimLeds::new(
            pixel_count,
            self.log.clone(),
        ))));
        self
    }

    pub fn with_sound(mut self) -> Self {
        self.capabilities
            .push(Capability::Sound(Box::new(SimSound::new(self.log.clone()))));
        self
    }

    /// Handle to the log shared by every capability of this backend.
    pub fn command_log(&self) -> CommandLog {
        self.log.clone()
    }

    /// Attach to a fresh [`HalRegistry`] and return it with the log handle.
    /// Capabilities are registered but not initialised.
    pub fn into_registry(mut self) -> (HalRegistry, CommandLog) {
        let mut registry = HalRegistry::new();
        registry.attach_backend(&mut self);
        (registry, self.log)
    }
}

impl Backend for SimBackend {
    fn name(&self) -> &str {
        "sim"
    }

    fn take_capabilities(&mut self) -> Vec<Capability> {
        std::mem::take(&mut self.capabilities)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
