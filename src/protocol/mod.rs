//! Wire protocol: binary frames carrying JSON control events and raw PCM
//!
//! - `frame` - 6-byte header + payload encoding over any async byte stream
//! - `events` - tagged JSON control events
//! - `writer` - the per-connection outbound write gate

pub mod events;
pub mod frame;
pub mod writer;

pub use events::{decode, encode, ControlEvent, DecodeError, EventType, PROTOCOL_NAME};
pub use frame::{read_frame, write_frame, Frame, FrameError, FrameKind, DEFAULT_MAX_FRAME_BYTES, VERSION};
pub use writer::FrameWriter;
