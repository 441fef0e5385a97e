mod handoff;

pub use handoff::{ByteBufferHandoff, TileReader, DEFAULT_HANDOFF_CAPACITY};
