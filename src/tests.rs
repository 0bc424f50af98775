//! End-to-end mixing scenarios
//!
//! Each test builds a mixer through the public surface, arms channels
//! the way the sequencer would and checks the produced `i32` buffers.
//! All arithmetic in the engine is integer fixed-point, so the
//! assertions can rely on bit-exact reproducibility.

use crate::{ChannelFlags, ChannelView, Mixer, MixerConfig, SampleData};

fn mono_mixer(buf_size: u32) -> Mixer {
    Mixer::new(MixerConfig {
        channels_out: 1,
        buf_size,
        ..Default::default()
    })
    .unwrap()
}

fn stereo_mixer(buf_size: u32) -> Mixer {
    Mixer::new(MixerConfig {
        buf_size,
        ..Default::default()
    })
    .unwrap()
}

fn view_8(data: &[i8], rate: u32) -> ChannelView {
    ChannelView {
        data: Some(SampleData::from_i8(data)),
        len: data.len() as u32,
        bits_per_sample: 8,
        volume: 255,
        panning: 0x80,
        rate,
        flags: ChannelFlags::PLAY,
        ..Default::default()
    }
}

/// Scaled value an 8-bit sample reaches through the full-volume LUT row
fn full_row(byte: i8) -> i32 {
    (i32::from(byte) << 8) * 255 / 256
}

#[test]
fn test_silent_channel_produces_silence() {
    let mut mixer = stereo_mixer(64);
    mixer.set_channel(&view_8(&[0; 1024], 44100), 0);
    let mut out = vec![0x7Fi32; 64 * 2];
    mixer.mix(&mut out);
    assert_eq!(out, vec![0i32; 128]);
}

#[test]
fn test_dc_sample_mono_level() {
    let mut mixer = mono_mixer(512);
    mixer.set_channel(&view_8(&[64; 1024], 44100), 0);
    let mut out = vec![0i32; 512];
    mixer.mix(&mut out);
    // Every frame sits at the LUT level for (volume 255, sample +64),
    // about +64 << 8
    let expected = full_row(64);
    assert!((out[0] - expected).abs() <= 2, "{} vs {}", out[0], expected);
    assert!((out[0] - (64 << 8)).abs() <= 80);
    assert!(out.iter().all(|&v| v == out[0]));
}

#[test]
fn test_cubic_interpolation_onset() {
    // Half-rate playback engages the cubic blend; the first frame sits
    // on the zero sample, the second rises toward +100
    let data = [0i8, 100, 0, -100, 0, 100, 0, -100];
    let mut mixer = mono_mixer(64);
    mixer.set_channel(&view_8(&data, 22050), 0);
    let mut out = vec![0i32; 64];
    mixer.mix(&mut out);
    assert_eq!(out[0], 0);
    assert!(out[1] > 0);
    // The blend keeps every frame inside the source amplitude
    let limit = full_row(100) + 256;
    assert!(out.iter().all(|&v| v.abs() <= limit));
}

#[test]
fn test_pingpong_offset_sequence() {
    let data = [0i8, 1, 2, 3, 4, 5, 6, 7];
    let mut view = view_8(&data, 44100);
    view.flags |= ChannelFlags::LOOP | ChannelFlags::PINGPONG;
    view.repeat_start = 2;
    view.repeat_length = 4;
    let mut mixer = mono_mixer(64);
    mixer.set_channel(&view, 0);
    let mut out = vec![0i32; 64];
    mixer.mix(&mut out);
    let offsets = [
        0usize, 1, 2, 3, 4, 5, 5, 4, 3, 2, 2, 3, 4, 5, 5, 4, 3, 2, 2, 3, 4, 5, 5, 4, 3, 2, 2, 3,
        4, 5, 5, 4,
    ];
    for (i, &off) in offsets.iter().enumerate() {
        let expected = full_row(data[off]);
        assert!(
            (out[i] - expected).abs() <= 1,
            "frame {}: {} vs data[{}] = {}",
            i,
            out[i],
            off,
            expected
        );
    }
}

#[test]
fn test_surround_right_is_complement() {
    let data: Vec<i8> = (0..64).map(|i| ((i * 11) % 100) as i8 - 50).collect();
    let mut view = view_8(&data, 44100);
    view.flags |= ChannelFlags::SURROUND;
    let mut mixer = stereo_mixer(64);
    mixer.set_channel(&view, 0);
    let mut out = vec![0i32; 64 * 2];
    mixer.mix(&mut out);
    let mut non_zero = false;
    for frame in 0..64 {
        let left = out[frame * 2];
        let right = out[frame * 2 + 1];
        assert_eq!(right, !left, "frame {}", frame);
        non_zero |= left != 0;
    }
    assert!(non_zero);
}

#[test]
fn test_unplayed_channel_contributes_nothing() {
    let data: Vec<i8> = (0..128).map(|i| (i % 100) as i8 - 50).collect();
    let mut solo = stereo_mixer(128);
    solo.set_volume(0x10000, 65536, 65536, 2);
    solo.set_channel(&view_8(&data, 44100), 0);

    let mut pair = stereo_mixer(128);
    pair.set_volume(0x10000, 65536, 65536, 2);
    pair.set_channel(&view_8(&data, 44100), 0);
    let mut idle = view_8(&data, 44100);
    idle.flags.remove(ChannelFlags::PLAY);
    pair.set_channel(&idle, 1);

    let mut out_solo = vec![0i32; 128 * 2];
    let mut out_pair = vec![0i32; 128 * 2];
    solo.mix(&mut out_solo);
    pair.mix(&mut out_pair);
    assert_eq!(out_solo, out_pair);
}

#[test]
fn test_burst_split_is_bit_exact() {
    // Four 64-frame bursts must equal one 256-frame burst bit for bit
    let data: Vec<i8> = (0..48).map(|i| (((i * 29) % 160) - 80) as i8).collect();
    let mut view = view_8(&data, 33075); // 0.75x rate, cursor fractions everywhere
    view.flags |= ChannelFlags::LOOP;
    view.repeat_length = 48;

    let mut small = stereo_mixer(64);
    small.set_channel(&view, 0);
    let mut big = stereo_mixer(256);
    big.set_channel(&view, 0);

    let mut split = Vec::new();
    for _ in 0..4 {
        let mut out = vec![0i32; 64 * 2];
        small.mix(&mut out);
        split.extend(out);
    }
    let mut whole = vec![0i32; 256 * 2];
    big.mix(&mut whole);
    assert_eq!(split, whole);
}

#[test]
fn test_mix_is_deterministic() {
    let data: Vec<i8> = (0..96).map(|i| ((i * 7) % 250) as i8).collect();
    let mut view = view_8(&data, 48000);
    view.flags |= ChannelFlags::LOOP;
    view.repeat_length = 96;

    let run = || {
        let mut mixer = stereo_mixer(128);
        mixer.set_channel(&view, 0);
        let mut out = vec![0i32; 128 * 2];
        mixer.mix(&mut out);
        mixer.mix(&mut out);
        out
    };
    assert_eq!(run(), run());
}

#[test]
fn test_bypassed_filter_is_transparent() {
    let data: Vec<i8> = (0..64).map(|i| ((i * 13) % 120) as i8 - 60).collect();
    let mut plain = view_8(&data, 44100);
    plain.flags |= ChannelFlags::LOOP;
    plain.repeat_length = 64;

    let mut bypass = plain.clone();
    bypass.filter_cutoff = 127;
    bypass.filter_damping = 0;

    let mut a = stereo_mixer(128);
    a.set_channel(&plain, 0);
    let mut b = stereo_mixer(128);
    b.set_channel(&bypass, 0);

    let mut out_a = vec![0i32; 128 * 2];
    let mut out_b = vec![0i32; 128 * 2];
    a.mix(&mut out_a);
    b.mix(&mut out_b);
    assert_eq!(out_a, out_b);
}

#[test]
fn test_active_filter_shapes_output() {
    let data: Vec<i8> = (0..64)
        .map(|i| if i % 2 == 0 { 100 } else { -100 })
        .collect();
    let mut plain = view_8(&data, 44100);
    plain.flags |= ChannelFlags::LOOP;
    plain.repeat_length = 64;

    let mut filtered = plain.clone();
    filtered.filter_cutoff = 32;
    filtered.filter_damping = 16;

    let mut a = mono_mixer(256);
    a.set_channel(&plain, 0);
    let mut b = mono_mixer(256);
    b.set_channel(&filtered, 0);

    let mut out_a = vec![0i32; 256];
    let mut out_b = vec![0i32; 256];
    a.mix(&mut out_a);
    b.mix(&mut out_b);
    assert_ne!(out_a, out_b);

    // A low cutoff attenuates the Nyquist-rate alternation
    let energy = |buf: &[i32]| -> i64 { buf[64..].iter().map(|&v| i64::from(v).pow(2)).sum() };
    assert!(energy(&out_b) < energy(&out_a) / 4);
}

#[test]
fn test_synth_handoff_through_mixer() {
    let first = [40i8; 6];
    let second = [-80i8; 64];
    let mut mixer = mono_mixer(64);
    mixer.set_channel(&view_8(&first, 44100), 0);
    let mut pending = view_8(&second, 44100);
    pending.flags |= ChannelFlags::SYNTH;
    mixer.set_channel(&pending, 0);

    let mut out = vec![0i32; 64];
    mixer.mix(&mut out);
    for i in 0..6 {
        assert!((out[i] - full_row(40)).abs() <= 1, "frame {}", i);
    }
    for i in 6..16 {
        assert!((out[i] - full_row(-80)).abs() <= 1, "frame {}", i);
    }
    // The pending block was promoted
    let (current, next) = mixer.get_both_channels(0);
    assert_eq!(current.data, Some(SampleData::from_i8(&second)));
    assert!(next.data.is_none());
}

#[test]
fn test_forward_loop_restart_sample() {
    let data = [10i8, 20, 30, 40, 50, 60, 70, 80];
    let mut view = view_8(&data, 44100);
    view.flags |= ChannelFlags::LOOP;
    view.repeat_start = 3;
    view.repeat_length = 3; // loop over samples 3,4,5
    let mut mixer = mono_mixer(64);
    mixer.set_channel(&view, 0);
    let mut out = vec![0i32; 64];
    mixer.mix(&mut out);
    // 0..5 then 3,4,5 repeating: first sample of each loop pass is
    // data[repeat_start]
    let offsets = [0usize, 1, 2, 3, 4, 5, 3, 4, 5, 3, 4, 5, 3, 4, 5, 3];
    for (i, &off) in offsets.iter().enumerate() {
        assert!(
            (out[i] - full_row(data[off])).abs() <= 1,
            "frame {}: {} vs data[{}]",
            i,
            out[i],
            off
        );
    }
}

#[test]
fn test_count_restart_clears_loop_flag() {
    let data = [5i8, 15, 25, 35];
    let mut view = view_8(&data, 44100);
    view.flags |= ChannelFlags::LOOP;
    view.repeat_length = 4;
    view.repeat_count = 3;
    let mut mixer = mono_mixer(64);
    mixer.set_channel(&view, 0);
    let mut out = vec![0i32; 64];
    mixer.mix(&mut out);
    // Initial pass plus exactly three repeats, then the channel stops
    for pass in 0..4 {
        for i in 0..4 {
            assert!(
                (out[pass * 4 + i] - full_row(data[i])).abs() <= 1,
                "pass {} frame {}",
                pass,
                i
            );
        }
    }
    assert!(out[16..].iter().all(|&v| v == 0));
    let back = mixer.get_channel(0);
    assert!(!back.flags.contains(ChannelFlags::LOOP));
    assert!(!back.flags.contains(ChannelFlags::PLAY));
}

#[test]
fn test_real16bit_native_path() {
    let data: Vec<i16> = vec![16384; 256];
    let mut mixer = Mixer::new(MixerConfig {
        args: "real16bit=true;".to_string(),
        buf_size: 64,
        ..Default::default()
    })
    .unwrap();
    let view = ChannelView {
        data: Some(SampleData::from_i16(&data)),
        len: 256,
        bits_per_sample: 16,
        volume: 255,
        panning: 0x80,
        rate: 44100,
        flags: ChannelFlags::PLAY,
        ..Default::default()
    };
    mixer.set_channel(&view, 0);
    let mut out = vec![0i32; 64 * 2];
    mixer.mix(&mut out);
    // Centred stereo: both sides carry the same positive DC level
    assert!(out[0] > 0);
    for frame in 0..64 {
        assert_eq!(out[frame * 2], out[frame * 2 + 1], "frame {}", frame);
        assert_eq!(out[frame * 2], out[0]);
    }
}

#[test]
fn test_packed_12bit_source() {
    // Four 12-bit samples: 0x100, 0x700, 0x800 (negative), 0x7FF packed
    // big-endian into two words: 0x100 700 8 | 0x00 7FF 000...
    let words = [0x1007_0080u32, 0x07FF_0000u32];
    let mut mixer = mono_mixer(64);
    let view = ChannelView {
        data: Some(SampleData::from_packed(&words)),
        len: 4,
        bits_per_sample: 12,
        volume: 255,
        panning: 0x80,
        rate: 44100,
        flags: ChannelFlags::PLAY,
        ..Default::default()
    };
    mixer.set_channel(&view, 0);
    let mut out = vec![0i32; 64];
    mixer.mix(&mut out);
    // High nibbles become the LUT bytes 0x10, 0x70, 0x80 (negative),
    // 0x7F
    let expected = [
        full_row(0x10),
        full_row(0x70),
        full_row(-128),
        full_row(0x7F),
    ];
    for (i, &e) in expected.iter().enumerate() {
        assert!(
            (out[i] - e).abs() <= 1,
            "frame {}: {} vs {}",
            i,
            out[i],
            e
        );
    }
    assert!(out[4..].iter().all(|&v| v == 0));
}

#[test]
fn test_mix_parallel_channel_range() {
    let loud: Vec<i8> = vec![80; 256];
    let quiet: Vec<i8> = vec![-40; 256];
    let mut mixer = Mixer::new(MixerConfig {
        channels_in: 2,
        channels_out: 1,
        buf_size: 64,
        ..Default::default()
    })
    .unwrap();
    mixer.set_volume(0x10000, 65536, 65536, 2);
    let mut a = view_8(&loud, 44100);
    a.flags |= ChannelFlags::LOOP;
    a.repeat_length = 256;
    let mut b = view_8(&quiet, 44100);
    b.flags |= ChannelFlags::LOOP;
    b.repeat_length = 256;
    mixer.set_channel(&a, 0);
    mixer.set_channel(&b, 1);

    // Restricting to channel 1 leaves channel 0 out of the sum
    let mut out = vec![0i32; 64];
    mixer.mix_parallel(&mut out, 1, 1);
    let expected = full_row(-40) / 2; // two input channels normalise the LUT
    assert!((out[0] - expected).abs() <= 2, "{} vs {}", out[0], expected);
    assert!(out.iter().all(|&v| v < 0));
}

#[test]
fn test_backward_loop_reversal_sample() {
    // Ping-pong: after the first reversal the engine must play
    // data[repeat_start + repeat_length - 1]
    let data = [0i8, 10, 20, 30, 40, 50, 60, 70];
    let mut view = view_8(&data, 44100);
    view.flags |= ChannelFlags::LOOP | ChannelFlags::PINGPONG;
    view.repeat_start = 1;
    view.repeat_length = 5; // loop over 1..6
    let mut mixer = mono_mixer(64);
    mixer.set_channel(&view, 0);
    let mut out = vec![0i32; 64];
    mixer.mix(&mut out);
    // Forward 0..=5, then backward from data[5]
    let offsets = [0usize, 1, 2, 3, 4, 5, 5, 4, 3, 2, 1, 1, 2, 3, 4, 5];
    for (i, &off) in offsets.iter().enumerate() {
        assert!(
            (out[i] - full_row(data[off])).abs() <= 1,
            "frame {}: {} vs data[{}]",
            i,
            out[i],
            off
        );
    }
}
