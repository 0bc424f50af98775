//! Interpolating inner loops
//!
//! A span is a contiguous run of output frames that the channel driver
//! has already proven not to cross a loop or end boundary. Three loop
//! families cover the rate regimes:
//!
//! - **Cubic** (`advance == 0`, playback at or below the output rate):
//!   quadratic blend over the three-tap history, refilled through the
//!   boundary-aware fetch as the cursor crosses integer positions.
//! - **Averaging** (`advance != 0`, playback above the output rate):
//!   weighted mean of every source sample spanned by one output step,
//!   with the partial lead/trail samples weighted by the fractional
//!   residues.
//! - **Nearest** (interpolation disabled): raw fetch at the cursor.
//!
//! A fourth, **skip**, advances the cursor without touching samples and
//! serves the muted topology.
//!
//! Output topologies write into an interleaved `i32` span: mono, single
//! side, both sides (two passes with per-side volume and history),
//! centre (duplicated) and surround (right = bitwise complement).

use crate::channel::{ChannelBlock, ChannelInfo, InterpHistory};
use crate::dispatch::Topology;
use crate::fetch::{Side, peek_pos, read_bounded, read_pos};

/// Integer + fractional sample position, advanced in 32.32 steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub offset: u32,
    pub fraction: u32,
}

/// Per-span mixing parameters resolved by the driver
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpanParams {
    pub advance: u32,
    pub adv_frac: u32,
    pub backwards: bool,
    pub interpolation: bool,
    pub real_16_bit: bool,
    pub topology: Topology,
}

/// Interleaved output write pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutWrite {
    Mono,
    Left,
    Right,
    Centre,
    Surround,
}

#[inline]
fn write_frame(out: &mut [i32], frame: usize, pattern: OutWrite, smp: i32) {
    match pattern {
        OutWrite::Mono => out[frame] = out[frame].wrapping_add(smp),
        OutWrite::Left => {
            let i = frame * 2;
            out[i] = out[i].wrapping_add(smp);
        }
        OutWrite::Right => {
            let i = frame * 2 + 1;
            out[i] = out[i].wrapping_add(smp);
        }
        OutWrite::Centre => {
            let i = frame * 2;
            out[i] = out[i].wrapping_add(smp);
            out[i + 1] = out[i + 1].wrapping_add(smp);
        }
        OutWrite::Surround => {
            let i = frame * 2;
            out[i] = out[i].wrapping_add(smp);
            out[i + 1] = out[i + 1].wrapping_add(!smp);
        }
    }
}

#[inline]
fn step_offset(offset: &mut u32, backwards: bool) {
    *offset = if backwards {
        offset.wrapping_sub(1)
    } else {
        offset.wrapping_add(1)
    };
}

/// Quadratic blend over the three-tap history at the given sub-sample
/// fraction. Saturation of the correction term is detected by the
/// two's-complement sign test and falls back to the centre tap.
pub(crate) fn cubic_blend(h: InterpHistory, fraction: u32) -> i32 {
    let prev = i64::from(h.prev);
    let curr = i64::from(h.curr);
    let next = i64::from(h.next);

    let d = curr - prev;
    let e = (next - curr - d) >> 2;
    let f = i64::from(fraction >> 1);

    let mut t = (f * e) >> 32;
    t = ((t << 2) + d) >> 2;
    t = (f * t) >> 32;
    t <<= 3;

    let base = ((prev + curr) >> 1) as i32;
    let t32 = t as i32;
    let smp = base.wrapping_add(t32);
    if ((base ^ smp) & (t32 ^ smp)) < 0 {
        h.curr
    } else {
        smp
    }
}

/// Advance the cursor by `count` whole steps without reading samples.
pub(crate) fn skip_span(cursor: &mut Cursor, params: &SpanParams, count: u32) {
    let step = (u64::from(params.advance) << 32) | u64::from(params.adv_frac);
    let skip = step.wrapping_mul(u64::from(count));
    let whole = (skip >> 32) as u32;
    let (fraction, carry) = cursor.fraction.overflowing_add(skip as u32);
    cursor.fraction = fraction;
    let total = whole.wrapping_add(u32::from(carry));
    cursor.offset = if params.backwards {
        cursor.offset.wrapping_sub(total)
    } else {
        cursor.offset.wrapping_add(total)
    };
}

/// Mix one span for a single output side.
#[allow(clippy::too_many_arguments)]
fn run_side(
    lut: &[i32],
    current: &ChannelBlock,
    next: &ChannelBlock,
    hist: &mut InterpHistory,
    cursor: &mut Cursor,
    out: &mut [i32],
    count: u32,
    side: Side,
    pattern: OutWrite,
    params: &SpanParams,
) {
    let backwards = params.backwards;
    let real16 = params.real_16_bit;

    if !params.interpolation {
        for frame in 0..count as usize {
            let smp = read_bounded(
                lut,
                current,
                next,
                read_pos(cursor.offset, backwards),
                backwards,
                side,
                real16,
            );
            write_frame(out, frame, pattern, smp);
            let (fraction, carry) = cursor.fraction.overflowing_add(params.adv_frac);
            cursor.fraction = fraction;
            let whole = params.advance.wrapping_add(u32::from(carry));
            cursor.offset = if backwards {
                cursor.offset.wrapping_sub(whole)
            } else {
                cursor.offset.wrapping_add(whole)
            };
        }
    } else if params.advance == 0 {
        // Playback at or below the output rate: cubic history blend
        for frame in 0..count as usize {
            let smp = cubic_blend(*hist, cursor.fraction);
            write_frame(out, frame, pattern, smp);
            let (fraction, carry) = cursor.fraction.overflowing_add(params.adv_frac);
            cursor.fraction = fraction;
            if carry {
                step_offset(&mut cursor.offset, backwards);
                let fetched = read_bounded(
                    lut,
                    current,
                    next,
                    peek_pos(cursor.offset, backwards),
                    backwards,
                    side,
                    real16,
                );
                hist.rotate(fetched);
            }
        }
    } else {
        // Playback above the output rate: weighted averaging decimation
        for frame in 0..count as usize {
            let mut offset = cursor.offset;
            let lead = i64::from(read_bounded(
                lut,
                current,
                next,
                read_pos(offset, backwards),
                backwards,
                side,
                real16,
            ));
            let inv = !cursor.fraction;
            let mut acc = (i64::from(inv >> 1) * lead) >> 31;
            let mut weight = u64::from(inv);
            step_offset(&mut offset, backwards);

            for _ in 1..params.advance {
                weight += 1 << 32;
                acc += i64::from(read_bounded(
                    lut,
                    current,
                    next,
                    read_pos(offset, backwards),
                    backwards,
                    side,
                    real16,
                ));
                step_offset(&mut offset, backwards);
            }

            let (fraction, carry) = cursor.fraction.overflowing_add(params.adv_frac);
            cursor.fraction = fraction;
            if carry {
                weight += 1 << 32;
                acc += i64::from(read_bounded(
                    lut,
                    current,
                    next,
                    read_pos(offset, backwards),
                    backwards,
                    side,
                    real16,
                ));
                step_offset(&mut offset, backwards);
            }

            let trail = i64::from(read_bounded(
                lut,
                current,
                next,
                read_pos(offset, backwards),
                backwards,
                side,
                real16,
            ));
            weight = weight.wrapping_add(u64::from(fraction));
            acc += (i64::from(fraction >> 1) * trail) >> 31;
            cursor.offset = offset;

            let smp = if (weight >> 8) != 0 {
                ((acc << 24) / (weight >> 8) as i64) as i32
            } else {
                0
            };
            write_frame(out, frame, pattern, smp);
        }
    }
}

/// Mix one span for a channel, dispatching on the bound topology.
///
/// `out` is the interleaved output (or filter scratch) slice covering
/// exactly this span: `count` entries for mono, `2 * count` for stereo.
pub(crate) fn mix_span(
    lut: &[i32],
    chan: &mut ChannelInfo,
    cursor: &mut Cursor,
    out: &mut [i32],
    count: u32,
    params: &SpanParams,
) {
    let ChannelInfo {
        current,
        next,
        hist_left,
        hist_right,
        ..
    } = chan;

    match params.topology {
        Topology::Skip => skip_span(cursor, params, count),
        Topology::Mono => run_side(
            lut, current, next, hist_left, cursor, out, count, Side::Left, OutWrite::Mono, params,
        ),
        Topology::StereoLeft => run_side(
            lut, current, next, hist_left, cursor, out, count, Side::Left, OutWrite::Left, params,
        ),
        Topology::StereoRight => run_side(
            lut,
            current,
            next,
            hist_right,
            cursor,
            out,
            count,
            Side::Right,
            OutWrite::Right,
            params,
        ),
        Topology::StereoCentre => run_side(
            lut, current, next, hist_left, cursor, out, count, Side::Left, OutWrite::Centre, params,
        ),
        Topology::StereoSurround => run_side(
            lut,
            current,
            next,
            hist_left,
            cursor,
            out,
            count,
            Side::Left,
            OutWrite::Surround,
            params,
        ),
        Topology::StereoBoth => {
            // Left pass walks a cursor copy; the right pass commits the
            // final position. Both trajectories are identical.
            let mut left_cursor = *cursor;
            run_side(
                lut,
                current,
                next,
                hist_left,
                &mut left_cursor,
                out,
                count,
                Side::Left,
                OutWrite::Left,
                params,
            );
            run_side(
                lut,
                current,
                next,
                hist_right,
                cursor,
                out,
                count,
                Side::Right,
                OutWrite::Right,
                params,
            );
        }
    }
}
