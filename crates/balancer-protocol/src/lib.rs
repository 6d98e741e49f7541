pub mod child;
pub mod envelope;
pub mod methods;

/// Maximum accepted size, in bytes, of a single inbound WebSocket frame.
pub const MAX_FRAME_BYTES: usize = 1024;
