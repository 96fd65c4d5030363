//! Audio decoding and output.

pub mod decode;
pub mod playback;

pub use decode::{DecodedAudio, decode_file};
#[cfg(feature = "speaker")]
pub use playback::CpalPlayback;
pub use playback::{AudioOutput, PlaybackHandle, SilentPlayback};
