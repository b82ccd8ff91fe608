use std::io::{self, Write};

use base64::{engine::general_purpose::STANDARD as BASE64, write::EncoderStringWriter};

/// Window fed to the encoder per write.
pub const CHUNK_SIZE: usize = 32_768;

/// Encode a file buffer as standard padded base64, feeding the encoder one
/// `CHUNK_SIZE` window at a time.
///
/// The streaming writer carries partial 3-byte groups across windows, so the
/// output is identical to encoding the whole buffer in a single call.
pub fn encode_chunked(bytes: &[u8]) -> io::Result<String> {
    let mut writer = EncoderStringWriter::new(&BASE64);
    for window in bytes.chunks(CHUNK_SIZE) {
        writer.write_all(window)?;
    }
    Ok(writer.into_inner())
}
