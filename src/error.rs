//! Mixer error types

use thiserror::Error;

/// Mixer error types
///
/// The per-sample mixing core is infallible; errors only surface from
/// lifecycle operations that allocate or validate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MixerError {
    /// An allocation (volume LUT, channel array or mix buffers) failed
    #[error("out of memory allocating mixer {0}")]
    OutOfMemory(&'static str),
    /// Output channel count is not 1 (mono) or 2 (stereo)
    #[error("unsupported output channel count: {0}")]
    InvalidOutputChannels(u16),
    /// Mixing rate outside the supported range
    #[error("mixing rate {0} Hz outside supported range")]
    InvalidRate(u32),
    /// Zero input channels requested
    #[error("at least one input channel is required")]
    NoInputChannels,
}
