//! Per-channel burst driver
//!
//! For every mixing burst the driver walks one channel through as many
//! contiguous spans as the remaining frame count requires: it solves how
//! many output frames fit before the cursor reaches the playback
//! boundary, hands that span to the bound inner loop (through the filter
//! scratch when the channel's filter is active) and then resolves the
//! boundary: plain loop wrap, ping-pong reversal, finite-loop expiry,
//! pending-block adoption or end of playback.
//!
//! The original engine expressed the boundary transitions with gotos
//! re-entering the mix loop; here each pass through the driver loop
//! handles exactly one span or one boundary, with a deferred-adoption
//! state covering the backward hand-off case.

use crate::channel::{ChannelFlags, ChannelInfo, InterpHistory};
use crate::dispatch::Topology;
use crate::fetch::{Side, peek_pos, read_bounded, read_pos};
use crate::filter::{apply_filter, filter_active};
use crate::interp::{Cursor, SpanParams, mix_span};

/// Global mixing parameters the driver threads through the inner loops
#[derive(Debug, Clone, Copy)]
pub(crate) struct DriverParams {
    pub real_16_bit: bool,
    pub interpolation: bool,
    pub channels_out: u16,
}

/// Fill both per-side interpolation histories from the block's cursor.
///
/// Called whenever the cursor jumps: channel (re)arm, position change,
/// pending-block adoption.
pub(crate) fn prime_history(lut: &[i32], chan: &mut ChannelInfo, real_16_bit: bool) {
    let backwards = chan.current.flags.contains(ChannelFlags::BACKWARDS);
    let ChannelInfo {
        current,
        next,
        hist_left,
        hist_right,
        ..
    } = chan;
    for (hist, side) in [(hist_left, Side::Left), (hist_right, Side::Right)] {
        let curr = read_bounded(
            lut,
            current,
            next,
            read_pos(current.offset, backwards),
            backwards,
            side,
            real_16_bit,
        );
        let ahead = read_bounded(
            lut,
            current,
            next,
            peek_pos(current.offset, backwards),
            backwards,
            side,
            real_16_bit,
        );
        *hist = InterpHistory {
            prev: curr,
            curr,
            next: ahead,
        };
    }
}

/// Mix one span of `frames` output frames, optionally through the filter
/// scratch buffer.
#[allow(clippy::too_many_arguments)]
fn run_span(
    lut: &[i32],
    chan: &mut ChannelInfo,
    cursor: &mut Cursor,
    out: &mut [i32],
    scratch: &mut [i32],
    out_frame: usize,
    frames: u32,
    ch_out: usize,
    span: &SpanParams,
) {
    if frames == 0 {
        return;
    }
    let start = out_frame * ch_out;
    let end = start + frames as usize * ch_out;
    let dst = &mut out[start..end];

    let filtered = span.topology != Topology::Skip
        && filter_active(chan.current.filter_cutoff, chan.current.filter_damping);
    if filtered {
        let scr = &mut scratch[..dst.len()];
        scr.fill(0);
        mix_span(lut, chan, cursor, scr, frames, span);
        let (c1, c2, c3) = (
            chan.current.filter_c1,
            chan.current.filter_c2,
            chan.current.filter_c3,
        );
        apply_filter(
            scr,
            dst,
            c1,
            c2,
            c3,
            &mut chan.filter_tmp1,
            &mut chan.filter_tmp2,
        );
    } else {
        mix_span(lut, chan, cursor, dst, frames, span);
    }
}

/// Mix `len` output frames of one channel into `out`.
///
/// `out` and `scratch` cover the whole span (`len` frames interleaved by
/// the output channel count). The channel's cursor, loop bookkeeping and
/// flags are updated in place.
pub(crate) fn mix_channel(
    lut: &[i32],
    params: &DriverParams,
    chan: &mut ChannelInfo,
    out: &mut [i32],
    scratch: &mut [i32],
    len: u32,
) {
    if !chan.current.is_playing() || len == 0 {
        return;
    }

    let ch_out = usize::from(params.channels_out.max(1));
    let mut cursor = Cursor {
        offset: chan.current.offset,
        fraction: chan.current.fraction,
    };
    let mut remain = len;
    let mut out_frame: usize = 0;
    let mut adopt_pending = false;

    loop {
        if adopt_pending {
            adopt_pending = false;
            chan.adopt_next();
            cursor = Cursor {
                offset: chan.current.offset,
                fraction: chan.current.fraction,
            };
            prime_history(lut, chan, params.real_16_bit);
            if !chan.current.is_playing() {
                break;
            }
        }

        let backwards = chan.current.flags.contains(ChannelFlags::BACKWARDS);
        let advance = chan.current.advance;
        let adv_frac = chan.current.advance_frac;
        let step = (u64::from(advance) << 32) | u64::from(adv_frac);
        let span = SpanParams {
            advance,
            adv_frac,
            backwards,
            interpolation: params.interpolation,
            real_16_bit: params.real_16_bit,
            topology: chan.current.mix_fn.topology,
        };

        // Source samples the rest of the burst would consume
        let needed = step
            .wrapping_mul(u64::from(remain))
            .wrapping_add(u64::from(cursor.fraction))
            >> 32;
        // Direction-aware distance to the playback boundary (signed)
        let avail = if backwards {
            cursor.offset.wrapping_sub(chan.current.end_offset) as i32
        } else {
            chan.current.end_offset.wrapping_sub(cursor.offset) as i32
        };

        let mut at_boundary = true;
        if avail > 0 {
            let avail = avail as u32;
            if needed < u64::from(avail) {
                run_span(
                    lut, chan, &mut cursor, out, scratch, out_frame, remain, ch_out, &span,
                );
                out_frame += remain as usize;
                remain = 0;
                let inside = if backwards {
                    (cursor.offset.wrapping_sub(chan.current.end_offset) as i32) > 0
                } else {
                    cursor.offset < chan.current.end_offset
                };
                if inside {
                    at_boundary = false;
                }
            } else {
                // Largest frame count that still fits before the boundary
                let fit = ((u64::from(avail) << 32) - u64::from(cursor.fraction) - 1) / step + 1;
                let fit = fit as u32;
                remain -= fit;
                run_span(
                    lut, chan, &mut cursor, out, scratch, out_frame, fit, ch_out, &span,
                );
                out_frame += fit as usize;
                let inside = if backwards {
                    (cursor.offset.wrapping_sub(chan.current.end_offset) as i32) > 0
                } else {
                    cursor.offset < chan.current.end_offset
                };
                if inside && remain == 0 {
                    at_boundary = false;
                }
            }
        }

        if !at_boundary {
            break;
        }

        if chan.current.flags.contains(ChannelFlags::LOOP) {
            let counted = chan.current.counted;
            chan.current.counted = counted.wrapping_add(1);

            if chan.current.count_restart != 0 && chan.current.count_restart == counted {
                // Finite loop expired: continue un-looped to the natural end
                chan.current.flags.remove(ChannelFlags::LOOP);
                chan.current.end_offset = if backwards { u32::MAX } else { chan.current.len };
                if remain == 0 {
                    break;
                }
                continue;
            }

            if chan.current.restart_offset == 0 {
                // Degenerate zero-length loop cannot wrap
                chan.current.flags.remove(ChannelFlags::LOOP);
                if remain == 0 {
                    break;
                }
                continue;
            }

            if chan.current.flags.contains(ChannelFlags::PINGPONG) {
                chan.current.flags.toggle(ChannelFlags::BACKWARDS);
                std::mem::swap(&mut chan.current.mix_fn, &mut chan.current.mix_backwards_fn);
                let end = chan.current.end_offset;
                cursor.offset = end.wrapping_mul(2).wrapping_sub(cursor.offset);
                chan.current.end_offset = if backwards {
                    end.wrapping_add(chan.current.restart_offset)
                } else {
                    end.wrapping_sub(chan.current.restart_offset)
                };
                if remain == 0 {
                    break;
                }
                continue;
            }

            // Plain loop wrap
            cursor.offset = if backwards {
                cursor.offset.wrapping_add(chan.current.restart_offset)
            } else {
                cursor.offset.wrapping_sub(chan.current.restart_offset)
            };
            if chan.next.data.is_some() {
                if backwards {
                    // Adoption is deferred to the next driver iteration
                    if remain == 0 {
                        break;
                    }
                    adopt_pending = true;
                    continue;
                }
                // Forward hand-off happens even at burst end
                chan.adopt_next();
                cursor = Cursor {
                    offset: chan.current.offset,
                    fraction: chan.current.fraction,
                };
                prime_history(lut, chan, params.real_16_bit);
                if remain == 0 {
                    break;
                }
                continue;
            }
            if remain == 0 {
                break;
            }
            continue;
        }

        // Un-looped boundary: adopt the pending block or stop
        if chan.next.data.is_some() {
            chan.adopt_next();
            cursor = Cursor {
                offset: chan.current.offset,
                fraction: chan.current.fraction,
            };
            prime_history(lut, chan, params.real_16_bit);
            if remain == 0 {
                break;
            }
            if !chan.current.is_playing() {
                break;
            }
            continue;
        }
        chan.current.flags.remove(ChannelFlags::PLAY);
        break;
    }

    chan.current.offset = cursor.offset;
    chan.current.fraction = cursor.fraction;
}
