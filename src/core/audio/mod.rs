//! Audio plumbing shared by the relay client and its output devices.
//!
//! Everything on the wire is 16-bit signed little-endian mono PCM at 24 kHz,
//! which is the only format the realtime API accepts for `pcm16`.

pub mod codec;
pub mod playback;

pub use codec::{
    CodecError, build_playable_container, decode_container, decode_from_wire, encode_for_wire,
    float_to_pcm16, pcm_to_samples, pcm16_to_float,
};
pub use playback::{AudioSink, ChannelSink, PlaybackCompletion, PlaybackError, PlaybackItem, PlaybackQueue};

/// Sample rate used for every audio buffer exchanged with the upstream API.
pub const SAMPLE_RATE: u32 = 24_000;

/// Channel count of wire audio.
pub const CHANNELS: u16 = 1;

/// Bit depth of wire audio.
pub const BITS_PER_SAMPLE: u16 = 16;
