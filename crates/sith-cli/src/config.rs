//! Console configuration – reads/writes `~/.sith/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted console configuration stored in `~/.sith/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Channels on the simulated servo bank.
    #[serde(default = "default_servo_channels")]
    pub servo_channels: usize,

    /// Pixels on the simulated LED strip.
    #[serde(default = "default_pixel_count")]
    pub pixel_count: usize,

    /// How often the background ticker polls the sequence engine.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Where `:SExx` looks for `xx.json` / `xx.toml`.
    #[serde(default = "default_sequences_dir")]
    pub sequences_dir: PathBuf,

    /// Startup volume, 0–100.
    #[serde(default = "default_volume")]
    pub volume: u8,
}

fn default_servo_channels() -> usize {
    16
}
fn default_pixel_count() -> usize {
    144
}
fn default_poll_interval_ms() -> u64 {
    10
}
fn default_sequences_dir() -> PathBuf {
    sith_dir_for_home(&home_dir()).join("sequences")
}
fn default_volume() -> u8 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            servo_channels: default_servo_channels(),
            pixel_count: default_pixel_count(),
            poll_interval_ms: default_poll_interval_ms(),
            sequences_dir: default_sequences_dir(),
            volume: default_volume(),
        }
    }
}

impl Config {
    /// Sequence file for choreography number `number`, if one exists.
    /// `.json` wins over `.toml`.
    pub fn sequence_file(&self, number: u32) -> Option<PathBuf> {
        ["json", "toml"]
            .iter()
            .map(|ext| self.sequences_dir.join(format!("{number:02}.{ext}")))
            .find(|path| path.is_file())
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn sith_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".sith")
}

/// Return the path to `~/.sith/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    sith_dir_for_home(home).join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `SITH_*` environment variable overrides to `cfg`.  Values that do
/// not parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `SITH_SERVO_CHANNELS` | `servo_channels` |
/// | `SITH_PIXEL_COUNT` | `pixel_count` |
/// | `SITH_POLL_INTERVAL_MS` | `poll_interval_ms` |
/// | `SITH_SEQUENCES_DIR` | `sequences_dir` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SITH_SERVO_CHANNELS")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.servo_channels = n;
    }
    if let Ok(v) = std::env::var("SITH_PIXEL_COUNT")
        && let Ok(n) = v.parse::<usize>()
    {
        cfg.pixel_count = n;
    }
    if let Ok(v) = std::env::var("SITH_POLL_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.poll_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("SITH_SEQUENCES_DIR") {
        cfg.sequences_dir = PathBuf::from(v);
    }
}

/// Save the config to disk, creating `~/.sith/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
