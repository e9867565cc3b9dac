pub mod error;
pub mod fields;
pub mod frame_codec;
pub mod logger;
pub mod packet;
