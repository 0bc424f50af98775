//! Mixer configuration
//!
//! Global parameters handed to [`Mixer::new`](crate::Mixer::new): output
//! rate, buffer geometry, channel counts and the free-form `args` string
//! the sequencer forwards from its own configuration surface.

use tracing::warn;

use crate::{
    DEFAULT_AMPLIFY, DEFAULT_BUF_SIZE, DEFAULT_MIX_RATE, MAX_BUF_SIZE, MAX_MIX_RATE, MIN_BUF_SIZE,
    MIN_MIX_RATE,
};

/// Process-wide mixer configuration
///
/// `args` is scanned for `;`-terminated overrides:
/// - `buffer=<frames>;` overrides `buf_size`
/// - `real16bit=<bool>;` enables the native 16/32-bit mixing path
///   (otherwise all ≥16-bit sources go through the 8-bit lookup path)
/// - `interpolation=<bool>;` toggles the interpolating inner loops
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Output mixing rate in Hz
    pub frequency: u32,
    /// Minimum accepted mixing rate in Hz
    pub frequency_min: u32,
    /// Maximum accepted mixing rate in Hz
    pub frequency_max: u32,
    /// Mixing buffer size in frames
    pub buf_size: u32,
    /// Minimum accepted buffer size in frames
    pub buf_size_min: u32,
    /// Maximum accepted buffer size in frames
    pub buf_size_max: u32,
    /// Volume boost (16.16 fixed-point, 0x10000 = 100%)
    pub volume_boost: u32,
    /// Number of input channels (logical voices)
    pub channels_in: u16,
    /// Number of output channels (1 = mono, 2 = stereo)
    pub channels_out: u16,
    /// Use the native 16/32-bit mixing path instead of downconverting to
    /// the 8-bit lookup path
    pub real_16_bit: bool,
    /// Use interpolating inner loops (cubic / weighted averaging)
    pub interpolation: bool,
    /// Free-form option string, scanned on construction
    pub args: String,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_MIX_RATE,
            frequency_min: MIN_MIX_RATE,
            frequency_max: MAX_MIX_RATE,
            buf_size: DEFAULT_BUF_SIZE,
            buf_size_min: MIN_BUF_SIZE,
            buf_size_max: MAX_BUF_SIZE,
            volume_boost: DEFAULT_AMPLIFY,
            channels_in: 1,
            channels_out: 2,
            real_16_bit: false,
            interpolation: true,
            args: String::new(),
        }
    }
}

impl MixerConfig {
    /// Apply `args` overrides, returning the effective configuration
    pub(crate) fn resolved(mut self) -> Self {
        if let Some(value) = scan_arg(&self.args, "buffer=") {
            match value.parse::<u32>() {
                Ok(frames) => self.buf_size = frames,
                Err(_) => warn!("ignoring unparsable buffer= override: {:?}", value),
            }
        }
        if let Some(value) = scan_arg(&self.args, "real16bit=") {
            match parse_bool(value) {
                Some(enable) => self.real_16_bit = enable,
                None => warn!("ignoring unparsable real16bit= override: {:?}", value),
            }
        }
        if let Some(value) = scan_arg(&self.args, "interpolation=") {
            match parse_bool(value) {
                Some(enable) => self.interpolation = enable,
                None => warn!("ignoring unparsable interpolation= override: {:?}", value),
            }
        }
        self.buf_size = self.buf_size.clamp(self.buf_size_min, self.buf_size_max);
        self
    }
}

/// Extract the value of a `key=value;` option from the args string.
/// The value runs to the next `;` or the end of the string.
fn scan_arg<'a>(args: &'a str, key: &str) -> Option<&'a str> {
    let start = args.find(key)? + key.len();
    let rest = &args[start..];
    let end = rest.find(';').unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
