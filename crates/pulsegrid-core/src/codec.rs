//! Gzip payload codec for the HTTP transport.

use std::io::{self, Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

/// Gzip-compress a serialized payload for the wire.
pub fn encode_payload(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload)?;
    encoder.finish()
}

/// Decompress an inbound gzip payload. Any failure here is terminal and
/// rejected as a bad request at the boundary.
pub fn decode_payload(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(payload);
    let mut plain = Vec::new();
    decoder.read_to_end(&mut plain)?;
    Ok(plain)
}
