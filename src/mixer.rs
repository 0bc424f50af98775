//! Mixer state and lifecycle
//!
//! [`Mixer`] owns the global mixing state: configuration, the volume
//! LUT, the per-channel table, the filter scratch buffer and the tempo
//! counters that interleave the playback tick handler with mixing.
//!
//! All setters are meant to be called from the mixing thread, either
//! between bursts or from inside the tick handler; the core performs no
//! internal locking. A burst (`mix` / `mix_parallel`) always runs to
//! completion.

use tracing::{debug, error, warn};

use crate::channel::{ChannelBlock, ChannelFlags, ChannelInfo, ChannelView, MixerFlags};
use crate::config::MixerConfig;
use crate::dispatch::{DispatchParams, select_mix_functions};
use crate::driver::{DriverParams, mix_channel, prime_history};
use crate::error::MixerError;
use crate::filter;
use crate::DEFAULT_TEMPO;
use crate::volume::{VOLUME_LUT_SIZE, build_volume_lut};

/// Playback tick handler, invoked synchronously inside `mix` at
/// tempo-derived intervals. The handler may mutate channel state through
/// the mixer's setters.
pub trait TickHandler {
    fn tick(&mut self, mixer: &mut Mixer);
}

/// The mixing engine
pub struct Mixer {
    flags: MixerFlags,
    mix_rate: u32,
    mix_rate_frac: u32,
    frequency_min: u32,
    frequency_max: u32,
    buf_size: u32,
    amplify: u32,
    volume_left: u32,
    volume_right: u32,
    tempo: u32,
    channels_in: u16,
    channels_out: u16,
    real_16_bit: bool,
    interpolation: bool,

    // Tempo counters: frames left until the next tick, with the
    // fractional remainders carried across bursts
    current_left: u32,
    current_left_frac: u32,
    pass_len: u32,
    pass_len_frac: u32,

    volume_lut: Vec<i32>,
    channels: Vec<ChannelInfo>,
    filter_buf: Vec<i32>,
    handler: Option<Box<dyn TickHandler>>,
}

/// Split a playback rate into the 32.32 per-frame cursor step.
fn advance_of(rate: u32, mix_rate: u32) -> (u32, u32) {
    let mix_rate = mix_rate.max(1);
    let advance = rate / mix_rate;
    let advance_frac = ((u64::from(rate % mix_rate)) << 32) / u64::from(mix_rate);
    (advance, advance_frac as u32)
}

/// Resolve the direction-aware end boundary from loop geometry.
fn resolve_end_offset(flags: ChannelFlags, len: u32, repeat_start: u32, repeat_len: u32) -> (u32, u32) {
    let (mut repeat, mut repeat_len) = (repeat_start, repeat_len);
    if !flags.contains(ChannelFlags::LOOP) {
        repeat = len;
        repeat_len = 0;
    }
    repeat = repeat.wrapping_add(repeat_len);
    if flags.contains(ChannelFlags::BACKWARDS) {
        repeat = repeat.wrapping_sub(repeat_len);
        if !flags.contains(ChannelFlags::LOOP) {
            repeat = u32::MAX;
        }
    }
    (repeat, repeat_len)
}

/// Copy a view into a block and derive boundaries, advance and filter
/// coefficients.
fn fill_block(block: &mut ChannelBlock, view: &ChannelView, mix_rate: u32) {
    block.data = view.data.clone();
    block.len = view.len;
    block.offset = view.pos;
    block.fraction = 0;
    block.pos_one_shoot = view.pos_one_shoot;
    block.bits_per_sample = match view.data.as_ref().and_then(|d| d.natural_bits()) {
        Some(bits) => bits,
        None => view.bits_per_sample.clamp(1, 32),
    };
    block.flags = view.flags;
    block.volume = view.volume;
    block.panning = view.panning;
    block.repeat = view.repeat_start;
    block.repeat_len = view.repeat_length;

    let (end_offset, restart_offset) =
        resolve_end_offset(view.flags, view.len, view.repeat_start, view.repeat_length);
    block.end_offset = end_offset;
    block.restart_offset = restart_offset;
    block.count_restart = view.repeat_count;
    block.counted = view.repeat_counted;

    block.rate = view.rate;
    let (advance, advance_frac) = advance_of(view.rate, mix_rate);
    block.advance = advance;
    block.advance_frac = advance_frac;

    block.filter_cutoff = view.filter_cutoff.min(filter::CUTOFF_BYPASS);
    block.filter_damping = view.filter_damping.min(127);
    let (c1, c2, c3) = filter::coefficients(mix_rate, block.filter_cutoff, block.filter_damping);
    block.filter_c1 = c1;
    block.filter_c2 = c2;
    block.filter_c3 = c3;
}

/// Read a block back into the external view shape.
fn view_of(block: &ChannelBlock) -> ChannelView {
    ChannelView {
        pos: block.offset,
        pos_one_shoot: block.pos_one_shoot,
        len: block.len,
        data: block.data.clone(),
        bits_per_sample: block.bits_per_sample,
        flags: block.flags,
        volume: block.volume,
        panning: block.panning,
        rate: block.rate,
        repeat_start: block.repeat,
        repeat_length: block.repeat_len,
        repeat_count: block.count_restart,
        repeat_counted: block.counted,
        filter_cutoff: block.filter_cutoff,
        filter_damping: block.filter_damping,
    }
}

impl Mixer {
    /// Create a mixer from a configuration (after applying its `args`
    /// overrides). Fails when an allocation is refused or the
    /// configuration is unusable.
    pub fn new(config: MixerConfig) -> Result<Self, MixerError> {
        let config = config.resolved();

        if config.channels_out != 1 && config.channels_out != 2 {
            return Err(MixerError::InvalidOutputChannels(config.channels_out));
        }
        if config.channels_in == 0 {
            return Err(MixerError::NoInputChannels);
        }
        if config.frequency == 0 {
            return Err(MixerError::InvalidRate(0));
        }
        let mix_rate = config.frequency.clamp(config.frequency_min, config.frequency_max);
        if mix_rate != config.frequency {
            warn!(
                requested = config.frequency,
                effective = mix_rate,
                "mixing rate clamped to supported range"
            );
        }

        let mut volume_lut = Vec::new();
        volume_lut
            .try_reserve_exact(VOLUME_LUT_SIZE)
            .map_err(|_| MixerError::OutOfMemory("volume LUT"))?;
        volume_lut.resize(VOLUME_LUT_SIZE, 0);

        let mut channels = Vec::new();
        channels
            .try_reserve_exact(usize::from(config.channels_in))
            .map_err(|_| MixerError::OutOfMemory("channel table"))?;
        channels.resize(usize::from(config.channels_in), ChannelInfo::default());

        let buf_samples = config.buf_size as usize * usize::from(config.channels_out);
        let mut filter_buf = Vec::new();
        filter_buf
            .try_reserve_exact(buf_samples)
            .map_err(|_| MixerError::OutOfMemory("mix buffers"))?;
        filter_buf.resize(buf_samples, 0);

        let mut flags = MixerFlags::ALLOCATED;
        if config.channels_out == 2 {
            flags |= MixerFlags::STEREO;
        }

        let mut mixer = Self {
            flags,
            mix_rate,
            mix_rate_frac: 0,
            frequency_min: config.frequency_min,
            frequency_max: config.frequency_max,
            buf_size: config.buf_size,
            amplify: config.volume_boost,
            volume_left: 65536,
            volume_right: 65536,
            tempo: 0,
            channels_in: config.channels_in,
            channels_out: config.channels_out,
            real_16_bit: config.real_16_bit,
            interpolation: config.interpolation,
            current_left: 0,
            current_left_frac: 0,
            pass_len: 0,
            pass_len_frac: 0,
            volume_lut,
            channels,
            filter_buf,
            handler: None,
        };
        build_volume_lut(&mut mixer.volume_lut, mixer.amplify, mixer.channels_in);
        mixer.set_tempo(DEFAULT_TEMPO);
        debug!(
            rate = mixer.mix_rate,
            buf_size = mixer.buf_size,
            channels_in = mixer.channels_in,
            channels_out = mixer.channels_out,
            "mixer initialised"
        );
        Ok(mixer)
    }

    fn dispatch_params(&self) -> DispatchParams {
        DispatchParams {
            amplify: self.amplify,
            volume_left: self.volume_left,
            volume_right: self.volume_right,
            channels_in: self.channels_in,
            channels_out: self.channels_out,
            real_16_bit: self.real_16_bit,
        }
    }

    fn driver_params(&self) -> DriverParams {
        DriverParams {
            real_16_bit: self.real_16_bit,
            interpolation: self.interpolation,
            channels_out: self.channels_out,
        }
    }

    /// Current mixing rate in Hz
    pub fn mix_rate(&self) -> u32 {
        self.mix_rate
    }

    /// Buffer size in frames
    pub fn buf_size(&self) -> u32 {
        self.buf_size
    }

    /// Number of input channels
    pub fn channels_in(&self) -> u16 {
        self.channels_in
    }

    /// Number of output channels
    pub fn channels_out(&self) -> u16 {
        self.channels_out
    }

    /// Current tempo (fractional seconds per tick, tempo domain)
    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    /// Mixer status flags
    pub fn flags(&self) -> MixerFlags {
        self.flags
    }

    /// Freeze or thaw the mixer; while frozen `mix` leaves the output
    /// buffer untouched.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.flags.set(MixerFlags::FROZEN, frozen);
    }

    /// Mark the mixer as actively mixing; rate changes then recompute
    /// per-channel derived state.
    pub fn set_mixing(&mut self, mixing: bool) {
        self.flags.set(MixerFlags::MIXING, mixing);
    }

    /// Install the playback tick handler.
    pub fn set_handler(&mut self, handler: Box<dyn TickHandler>) {
        self.handler = Some(handler);
    }

    /// Remove the playback tick handler.
    pub fn clear_handler(&mut self) {
        self.handler = None;
    }

    /// Change the mixing rate and output layout. Returns the effective
    /// rate (the previous one when a reallocation fails).
    pub fn set_rate(&mut self, mix_rate: u32, channels_out: u16) -> u32 {
        if channels_out != 1 && channels_out != 2 {
            warn!(channels_out, "ignoring unsupported output channel count");
            return self.mix_rate;
        }
        let rate = mix_rate.clamp(self.frequency_min, self.frequency_max);

        let new_samples = self.buf_size as usize * usize::from(channels_out);
        if new_samples != self.filter_buf.len() {
            if new_samples > self.filter_buf.len() {
                let additional = new_samples - self.filter_buf.len();
                if self.filter_buf.try_reserve_exact(additional).is_err() {
                    error!("cannot reallocate mixer output buffers");
                    return self.mix_rate;
                }
            }
            self.filter_buf.resize(new_samples, 0);
            self.filter_buf.fill(0);
        }

        let layout_changed = self.channels_out != channels_out;
        self.channels_out = channels_out;
        self.flags.set(MixerFlags::STEREO, channels_out == 2);

        let rate_changed = self.mix_rate != rate;
        self.mix_rate = rate;

        if self.flags.contains(MixerFlags::MIXING) && rate_changed {
            self.mix_rate_frac = 0;
            if self.tempo != 0 {
                let tempo = self.tempo;
                self.set_tempo(tempo);
            }
            for chan in &mut self.channels {
                for block in [&mut chan.current, &mut chan.next] {
                    let (advance, advance_frac) = advance_of(block.rate, rate);
                    block.advance = advance;
                    block.advance_frac = advance_frac;
                    let (c1, c2, c3) =
                        filter::coefficients(rate, block.filter_cutoff, block.filter_damping);
                    block.filter_c1 = c1;
                    block.filter_c2 = c2;
                    block.filter_c3 = c3;
                }
            }
        }

        if layout_changed {
            let params = self.dispatch_params();
            for chan in &mut self.channels {
                select_mix_functions(&params, &mut chan.current);
                select_mix_functions(&params, &mut chan.next);
            }
        }
        rate
    }

    /// Change the tick tempo (fractional seconds per tick). Recomputes
    /// the frames-per-tick counters.
    pub fn set_tempo(&mut self, tempo: u32) -> u32 {
        self.tempo = tempo.max(1);
        let pass_value =
            ((u64::from(self.mix_rate) * 10) << 16) + u64::from(self.mix_rate_frac >> 16);
        let tempo64 = u64::from(self.tempo);
        self.pass_len = (pass_value / tempo64).clamp(1, u64::from(u32::MAX)) as u32;
        self.pass_len_frac = (((pass_value % tempo64) << 32) / tempo64) as u32;
        self.tempo
    }

    /// Change amplify, master volumes and the input channel count.
    /// Returns the effective channel count (the previous one when the
    /// channel table cannot grow). The volume LUT is rebuilt only when
    /// amplify or the channel count actually changed.
    pub fn set_volume(&mut self, amplify: u32, left_volume: u32, right_volume: u32, channels: u16) -> u16 {
        let old_channels = self.channels_in;
        if channels == 0 {
            warn!("ignoring request for zero mixer channels");
            return old_channels;
        }
        if channels != old_channels {
            let new_len = usize::from(channels);
            if new_len > self.channels.len() {
                let additional = new_len - self.channels.len();
                if self.channels.try_reserve_exact(additional).is_err() {
                    error!("cannot reallocate mixer channel table");
                    return old_channels;
                }
            }
            self.channels.resize(new_len, ChannelInfo::default());
        }

        let rebuild_lut = amplify != self.amplify || channels != old_channels;
        self.amplify = amplify;
        self.volume_left = left_volume;
        self.volume_right = right_volume;
        self.channels_in = channels;
        if rebuild_lut {
            build_volume_lut(&mut self.volume_lut, amplify, channels);
        }

        let params = self.dispatch_params();
        let mix_rate = self.mix_rate;
        for chan in &mut self.channels {
            for block in [&mut chan.current, &mut chan.next] {
                let (advance, advance_frac) = advance_of(block.rate, mix_rate);
                block.advance = advance;
                block.advance_frac = advance_frac;
                select_mix_functions(&params, block);
            }
        }
        channels
    }

    /// Read one channel's current block.
    pub fn get_channel(&self, channel: usize) -> ChannelView {
        match self.channels.get(channel) {
            Some(chan) => view_of(&chan.current),
            None => {
                warn!(channel, "get_channel index out of range");
                ChannelView::default()
            }
        }
    }

    /// Read both of one channel's blocks (current, pending).
    pub fn get_both_channels(&self, channel: usize) -> (ChannelView, ChannelView) {
        match self.channels.get(channel) {
            Some(chan) => (view_of(&chan.current), view_of(&chan.next)),
            None => {
                warn!(channel, "get_both_channels index out of range");
                (ChannelView::default(), ChannelView::default())
            }
        }
    }

    /// Write one channel. A view carrying the `SYNTH` flag arms the
    /// pending block for gapless hand-off instead of replacing the
    /// current one.
    pub fn set_channel(&mut self, view: &ChannelView, channel: usize) {
        let params = self.dispatch_params();
        let mix_rate = self.mix_rate;
        let real_16_bit = self.real_16_bit;
        let Some(chan) = self.channels.get_mut(channel) else {
            warn!(channel, "set_channel index out of range");
            return;
        };
        chan.next.data = None;
        let synth = view.flags.contains(ChannelFlags::SYNTH);
        {
            let block = if synth { &mut chan.next } else { &mut chan.current };
            fill_block(block, view, mix_rate);
            select_mix_functions(&params, block);
        }
        if !synth {
            chan.filter_tmp1 = 0;
            chan.filter_tmp2 = 0;
            prime_history(&self.volume_lut, chan, real_16_bit);
        }
    }

    /// Write both of one channel's blocks at once.
    pub fn set_both_channels(&mut self, current: &ChannelView, next: &ChannelView, channel: usize) {
        let params = self.dispatch_params();
        let mix_rate = self.mix_rate;
        let real_16_bit = self.real_16_bit;
        let Some(chan) = self.channels.get_mut(channel) else {
            warn!(channel, "set_both_channels index out of range");
            return;
        };
        fill_block(&mut chan.current, current, mix_rate);
        select_mix_functions(&params, &mut chan.current);
        fill_block(&mut chan.next, next, mix_rate);
        select_mix_functions(&params, &mut chan.next);
        chan.filter_tmp1 = 0;
        chan.filter_tmp2 = 0;
        prime_history(&self.volume_lut, chan, real_16_bit);
    }

    /// Return one channel to the idle state (no data, no flags, filter
    /// bypassed).
    pub fn reset_channel(&mut self, channel: usize) {
        match self.channels.get_mut(channel) {
            Some(chan) => *chan = ChannelInfo::default(),
            None => warn!(channel, "reset_channel index out of range"),
        }
    }

    /// Apply a volume / panning / pitch change. When only the rate
    /// differs the advance fields are patched without re-running
    /// dispatch.
    pub fn set_channel_volume_panning_pitch(&mut self, view: &ChannelView, channel: usize) {
        let params = self.dispatch_params();
        let mix_rate = self.mix_rate;
        let Some(chan) = self.channels.get_mut(channel) else {
            warn!(channel, "set_channel_volume_panning_pitch index out of range");
            return;
        };

        let (advance, advance_frac) = advance_of(view.rate, mix_rate);
        if chan.current.volume == view.volume && chan.current.panning == view.panning {
            for block in [&mut chan.current, &mut chan.next] {
                block.rate = view.rate;
                block.advance = advance;
                block.advance_frac = advance_frac;
            }
        } else {
            for block in [&mut chan.current, &mut chan.next] {
                block.volume = view.volume;
                block.panning = view.panning;
                block.rate = view.rate;
                block.advance = advance;
                block.advance_frac = advance_frac;
                select_mix_functions(&params, block);
            }
        }
    }

    /// Apply a position / repeat-geometry / flags change. Dispatch is
    /// re-run only when the flags actually changed.
    pub fn set_channel_position_repeat_flags(&mut self, view: &ChannelView, channel: usize) {
        let params = self.dispatch_params();
        let real_16_bit = self.real_16_bit;
        let Some(chan) = self.channels.get_mut(channel) else {
            warn!(channel, "set_channel_position_repeat_flags index out of range");
            return;
        };

        let flags_changed = chan.current.flags != view.flags;
        chan.current.flags = view.flags;

        let mut moved = false;
        if view.pos != chan.current.offset {
            chan.current.offset = view.pos;
            chan.current.fraction = 0;
            moved = true;
        }
        chan.current.pos_one_shoot = view.pos_one_shoot;
        chan.current.repeat = view.repeat_start;
        chan.current.repeat_len = view.repeat_length;
        let (end_offset, restart_offset) = resolve_end_offset(
            view.flags,
            chan.current.len,
            view.repeat_start,
            view.repeat_length,
        );
        chan.current.end_offset = end_offset;
        chan.current.restart_offset = restart_offset;
        chan.current.count_restart = view.repeat_count;
        chan.current.counted = view.repeat_counted;

        if flags_changed {
            select_mix_functions(&params, &mut chan.current);
        }
        if moved || flags_changed {
            prime_history(&self.volume_lut, chan, real_16_bit);
        }
    }

    /// Apply a filter cutoff/damping change and recompute the
    /// coefficients.
    pub fn set_channel_filter(&mut self, view: &ChannelView, channel: usize) {
        let mix_rate = self.mix_rate;
        let Some(chan) = self.channels.get_mut(channel) else {
            warn!(channel, "set_channel_filter index out of range");
            return;
        };
        let cutoff = view.filter_cutoff.min(filter::CUTOFF_BYPASS);
        let damping = view.filter_damping.min(127);
        if chan.current.filter_cutoff == cutoff && chan.current.filter_damping == damping {
            return;
        }
        chan.current.filter_cutoff = cutoff;
        chan.current.filter_damping = damping;
        let (c1, c2, c3) = filter::coefficients(mix_rate, cutoff, damping);
        chan.current.filter_c1 = c1;
        chan.current.filter_c2 = c2;
        chan.current.filter_c3 = c3;
    }

    /// Mix one buffer of `buf_size` frames over all channels into `out`
    /// (interleaved `i32`, summed, not rescaled to the output format).
    pub fn mix(&mut self, out: &mut [i32]) {
        let last = usize::from(self.channels_in).saturating_sub(1);
        self.run_mix(out, 0, last);
    }

    /// Like [`mix`](Self::mix) but restricted to the inclusive channel
    /// range `[first_channel, last_channel]`.
    pub fn mix_parallel(&mut self, out: &mut [i32], first_channel: usize, last_channel: usize) {
        self.run_mix(out, first_channel, last_channel);
    }

    fn run_mix(&mut self, out: &mut [i32], first: usize, last: usize) {
        if self.flags.contains(MixerFlags::FROZEN) {
            return;
        }
        let ch_out = usize::from(self.channels_out.max(1));
        let needed = self.buf_size as usize * ch_out;
        if out.len() < needed {
            warn!(
                have = out.len(),
                needed, "output slice too small for one burst"
            );
            return;
        }
        out[..needed].fill(0);

        if self.channels.is_empty() || first >= self.channels.len() || first > last {
            return;
        }
        let last = last.min(self.channels.len() - 1);

        let mut remaining = self.buf_size;
        let mut frame_pos = 0usize;
        let mut current_left = self.current_left;
        let mut current_left_frac = self.current_left_frac;

        while remaining > 0 {
            if current_left > 0 {
                let take = remaining.min(current_left);
                current_left -= take;
                remaining -= take;
                let span = &mut out[frame_pos * ch_out..(frame_pos + take as usize) * ch_out];
                let params = self.driver_params();
                // The tick handler may have shrunk the channel table
                let last = last.min(self.channels.len().saturating_sub(1));
                if first <= last {
                    for idx in first..=last {
                        mix_channel(
                            &self.volume_lut,
                            &params,
                            &mut self.channels[idx],
                            span,
                            &mut self.filter_buf,
                            take,
                        );
                    }
                }
                frame_pos += take as usize;
            }

            if current_left == 0 {
                // Expose consistent counters to the handler, which may
                // call setters (including set_tempo) re-entrantly
                self.current_left = 0;
                self.current_left_frac = current_left_frac;
                let mut handler = self.handler.take();
                if let Some(h) = handler.as_mut() {
                    h.tick(self);
                }
                if self.handler.is_none() {
                    self.handler = handler;
                }
                current_left = self.pass_len.max(1);
                current_left_frac = current_left_frac.wrapping_add(self.pass_len_frac);
                if current_left_frac < self.pass_len_frac {
                    current_left = current_left.wrapping_add(1);
                }
            }
        }

        self.current_left = current_left;
        self.current_left_frac = current_left_frac;
    }
}

impl std::fmt::Debug for Mixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mixer")
            .field("flags", &self.flags)
            .field("mix_rate", &self.mix_rate)
            .field("buf_size", &self.buf_size)
            .field("channels_in", &self.channels_in)
            .field("channels_out", &self.channels_out)
            .field("tempo", &self.tempo)
            .finish_non_exhaustive()
    }
}
