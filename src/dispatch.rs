//! Inner-loop dispatch plane
//!
//! Each channel block is bound to one inner loop chosen from the product
//! of sample width, scaling conversion, output topology and playback
//! direction. The original engine kept raw function pointers into flat
//! tables of generated mixers; here the choice is a plain tagged value
//! ([`MixFn`]) and a single dispatcher in `interp.rs` maps it onto the
//! concrete loop. Rebinding happens on every setter that can change the
//! outcome (volume, panning, flags, data, output layout).

use crate::channel::{ChannelBlock, ChannelFlags};
use crate::volume::prepare_block_volumes;

/// Sample width family of a block's data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum SampleWidth {
    /// 8-bit bytes
    #[default]
    B8,
    /// 16-bit words
    B16,
    /// 32-bit words
    B32,
    /// Arbitrary bit width, packed big-endian within 32-bit words
    BX,
}

/// How fetched samples are scaled to the 32-bit mixing domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Conversion {
    /// Reduce to a signed byte and index the global volume LUT
    #[default]
    Lut8,
    /// Multiply by the per-side volume factor and divide by the
    /// width-dependent divisor
    Native,
}

/// Output write pattern of the inner loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Topology {
    /// Advance the cursor without reading or writing samples
    #[default]
    Skip,
    /// Single interleaved output channel
    Mono,
    /// Left and right written independently with their own volumes
    StereoBoth,
    /// Left slot only
    StereoLeft,
    /// Right slot only
    StereoRight,
    /// Same sample duplicated into both slots
    StereoCentre,
    /// Left sample, right = bitwise complement
    StereoSurround,
}

/// Playback direction of the inner loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Fully resolved inner-loop selector for one channel block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct MixFn {
    pub width: SampleWidth,
    pub conversion: Conversion,
    pub topology: Topology,
    pub direction: Direction,
}

/// Global state the dispatch decision depends on
#[derive(Debug, Clone, Copy)]
pub(crate) struct DispatchParams {
    pub amplify: u32,
    pub volume_left: u32,
    pub volume_right: u32,
    pub channels_in: u16,
    pub channels_out: u16,
    pub real_16_bit: bool,
}

/// Width family of a block, honoring packed storage
fn block_width(blk: &ChannelBlock) -> SampleWidth {
    match blk.data.as_ref().and_then(|d| d.natural_bits()) {
        Some(8) => SampleWidth::B8,
        Some(16) => SampleWidth::B16,
        Some(32) => SampleWidth::B32,
        Some(_) => SampleWidth::BX,
        None if blk.data.is_some() => SampleWidth::BX,
        None => SampleWidth::B8,
    }
}

/// Bind a block's inner loops and recompute its volume scaling.
pub(crate) fn select_mix_functions(params: &DispatchParams, blk: &mut ChannelBlock) {
    let width = block_width(blk);
    let conversion = if blk.bits_per_sample <= 8 || !params.real_16_bit {
        Conversion::Lut8
    } else {
        Conversion::Native
    };

    let silent = blk.flags.contains(ChannelFlags::MUTED)
        || blk.volume == 0
        || params.amplify == 0
        || blk.data.is_none();

    let topology = if silent {
        Topology::Skip
    } else if params.channels_out == 1 {
        Topology::Mono
    } else if blk.flags.contains(ChannelFlags::SURROUND) {
        if params.volume_left == params.volume_right {
            Topology::StereoSurround
        } else {
            Topology::StereoBoth
        }
    } else {
        match blk.panning {
            0x00 => {
                if params.volume_left != 0 {
                    Topology::StereoLeft
                } else {
                    Topology::Skip
                }
            }
            0xFF => {
                if params.volume_right != 0 {
                    Topology::StereoRight
                } else {
                    Topology::Skip
                }
            }
            0x80 => {
                if params.volume_left == params.volume_right {
                    Topology::StereoCentre
                } else {
                    Topology::StereoBoth
                }
            }
            _ => Topology::StereoBoth,
        }
    };

    let (dir, back_dir) = if blk.flags.contains(ChannelFlags::BACKWARDS) {
        (Direction::Backward, Direction::Forward)
    } else {
        (Direction::Forward, Direction::Backward)
    };

    blk.mix_fn = MixFn {
        width,
        conversion,
        topology,
        direction: dir,
    };
    blk.mix_backwards_fn = MixFn {
        direction: back_dir,
        ..blk.mix_fn
    };

    let wide = matches!(width, SampleWidth::B32 | SampleWidth::BX);
    prepare_block_volumes(
        blk,
        topology,
        conversion,
        wide,
        params.amplify,
        params.volume_left,
        params.volume_right,
        params.channels_in,
    );
}
