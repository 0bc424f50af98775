//! Nether-Mix: sample-accurate multi-channel mixing engine for tracker playback
//!
//! This crate implements the high-quality PCM mixing core used by a
//! tracker playback engine. Each logical voice (channel) carries a cursor
//! into a shared sample buffer; on every output frame the mixer advances
//! that cursor by a 32.32 fixed-point step derived from the channel's
//! pitch, fetches and interpolates source samples, applies per-channel
//! volume and panning, optionally runs a resonant low-pass filter, and
//! sums the result into an interleaved `i32` accumulator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │ Mixer (mixer.rs)                                     │
//! │  - config, volume LUT, tempo counters, tick handler  │
//! │  mix() / mix_parallel()                              │
//! └───────────────┬──────────────────────────────────────┘
//!                 │ per channel, per tempo slice
//! ┌───────────────▼──────────────────────────────────────┐
//! │ Channel driver (driver.rs)                           │
//! │  - splits the burst at loop/end boundaries,          │
//! │    handles ping-pong reversal, repeat counts and     │
//! │    pending-block hand-off                            │
//! └───────┬─────────────────────────────┬────────────────┘
//!         │ contiguous span             │ boundary reads
//! ┌───────▼───────────────┐   ┌─────────▼────────────────┐
//! │ Inner loops (interp)  │   │ Sample fetch (fetch.rs)  │
//! │  cubic / averaging /  │──▶│  8/16/32/X-bit decode,   │
//! │  nearest / skip, all  │   │  volume LUT or mult/div  │
//! │  output topologies    │   │  scaling, loop fallback  │
//! └───────┬───────────────┘   └──────────────────────────┘
//!         │ optional scratch pass
//! ┌───────▼───────────────┐
//! │ Resonant filter       │
//! │ (filter.rs)           │
//! └───────────────────────┘
//! ```
//!
//! The inner-loop family is selected per channel by the dispatch plane
//! (`dispatch.rs`) from sample width, playback direction, output topology
//! and panning. All arithmetic is integer/fixed-point; given identical
//! inputs the output is bit-exact reproducible.
//!
//! # Usage
//!
//! ```ignore
//! use nether_mix::{ChannelFlags, ChannelView, Mixer, MixerConfig, SampleData};
//!
//! let mut mixer = Mixer::new(MixerConfig::default()).unwrap();
//! mixer.set_volume(0x10000, 65536, 65536, 4);
//! mixer.set_tempo(nether_mix::DEFAULT_TEMPO);
//!
//! let mut view = ChannelView::default();
//! view.data = Some(SampleData::from_i8(&[0, 64, 127, 64, 0, -64, -128, -64]));
//! view.len = 8;
//! view.rate = 44100;
//! view.volume = 255;
//! view.panning = 0x80;
//! view.flags = ChannelFlags::PLAY | ChannelFlags::LOOP;
//! view.repeat_length = 8;
//! mixer.set_channel(&view, 0);
//!
//! let mut out = vec![0i32; 512 * 2];
//! mixer.mix(&mut out);
//! ```

mod channel;
mod config;
mod dispatch;
mod driver;
mod error;
mod fetch;
mod filter;
mod interp;
mod mixer;
mod volume;

#[cfg(test)]
mod tests;

pub use channel::{ChannelFlags, ChannelView, MixerFlags, SampleData};
pub use config::MixerConfig;
pub use error::MixerError;
pub use mixer::{Mixer, TickHandler};

// =============================================================================
// Capability constants
// =============================================================================

/// Default mixing rate in Hz
pub const DEFAULT_MIX_RATE: u32 = 44100;

/// Minimum supported mixing rate in Hz
pub const MIN_MIX_RATE: u32 = 1000;

/// Maximum supported mixing rate in Hz
pub const MAX_MIX_RATE: u32 = 768000;

/// Default mixing buffer size in frames
pub const DEFAULT_BUF_SIZE: u32 = 512;

/// Minimum mixing buffer size in frames
pub const MIN_BUF_SIZE: u32 = 64;

/// Maximum mixing buffer size in frames
pub const MAX_BUF_SIZE: u32 = 32768;

/// Default volume boost level (16.16 fixed-point, 0x10000 = 100%)
pub const DEFAULT_AMPLIFY: u32 = 0x10000;

/// Maximum number of input channels (logical voices)
pub const MAX_CHANNELS: u16 = u16::MAX;

/// Tempo value equal to one playback-handler tick per second.
///
/// `set_tempo` takes fractional seconds per tick in this domain; divide by
/// the desired tick rate, e.g. `TEMPO_BASE * 50` for a 50 Hz tick.
pub const TEMPO_BASE: u32 = 655360;

/// Default tempo: 50 ticks per second (classic 125 BPM, 6 ticks per row),
/// i.e. 882 output frames per tick at 44100 Hz.
pub const DEFAULT_TEMPO: u32 = TEMPO_BASE * 50;
