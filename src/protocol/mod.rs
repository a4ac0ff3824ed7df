//! Wire protocol: framing and message schemas
pub mod frame;
pub mod messages;

pub use frame::{
    read_bytes, read_frame, read_frame_bytes, write_file, write_frame, MAX_FRAME_LEN,
};
pub use messages::{
    error_message, is_success, result_size, Command, OutboundMessage, Request, Response,
};
