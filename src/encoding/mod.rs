pub mod chunked;

pub use chunked::{encode_chunked, CHUNK_SIZE};
