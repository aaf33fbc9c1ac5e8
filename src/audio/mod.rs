pub mod backend;
pub mod pcm;
pub mod process;
pub mod silence;
pub mod window;

pub use backend::{
    AudioFormat, CaptureAdapter, CaptureFactory, CaptureSource, PlaybackAdapter, BYTES_PER_SAMPLE,
    SAMPLE_FORMAT,
};
pub use process::{CommandCapture, CommandPlayback};
pub use silence::SilentCapture;
pub use window::PcmWindow;
