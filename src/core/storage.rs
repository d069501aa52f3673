use std::io::{self, Read, Write};

pub const MAGIC: &[u8; 8] = b"CORTEX2D";
pub const VERSION_V1: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_V1;

const LZ4_MAX_RATIO: u64 = 255;

/// Uncompressed size of one neuron record in the `NRNS` chunk.
pub const NEURON_RECORD_BYTES: usize = 8 * 7 + 1 + 1 + 2 + 1 + 1 + 1 + 4;

pub fn compress_lz4(input: &[u8]) -> Vec<u8> {
    lz4_flex::compress(input)
}

pub fn decompress_lz4(input: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
    // Raw LZ4 block with external expected size.
    lz4_flex::decompress(input, expected_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "lz4 decompression failed"))
}

/// Sink that only counts bytes, used to size an image before writing it.
pub struct CountingWriter {
    written: usize,
}

impl CountingWriter {
    pub fn new() -> Self {
        Self { written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }
}

impl Default for CountingWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written = self.written.saturating_add(buf.len());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_i16_le<W: Write>(w: &mut W, v: i16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u32_le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u64_le<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    Ok(read_exact::<1, _>(r)?[0])
}

pub fn read_i16_le<R: Read>(r: &mut R) -> io::Result<i16> {
    Ok(i16::from_le_bytes(read_exact::<2, _>(r)?))
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_exact::<8, _>(r)?))
}

/// Write a chunk whose payload is LZ4-compressed and preceded by the
/// uncompressed length.
///
/// Layout:
/// - tag: [u8;4]
/// - len: u32 (bytes following, including the 4-byte uncompressed length)
/// - uncompressed_len: u32
/// - compressed payload bytes
pub fn write_chunk_lz4<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    let compressed = compress_lz4(payload);
    let uncompressed_len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?;
    let total_len = 4u32.saturating_add(
        u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    );

    w.write_all(&tag)?;
    write_u32_le(w, total_len)?;
    write_u32_le(w, uncompressed_len)?;
    w.write_all(&compressed)
}

pub fn read_chunk_header<R: Read>(r: &mut R) -> io::Result<([u8; 4], u32)> {
    let tag = read_exact::<4, _>(r)?;
    let len = read_u32_le(r)?;
    Ok((tag, len))
}

/// Read and decompress the payload of a chunk whose header declared `len`
/// bytes.
///
/// The declared uncompressed length is checked against the largest expansion
/// LZ4 can produce before anything is allocated.
pub fn read_chunk_payload<R: Read>(r: &mut R, len: u32) -> io::Result<Vec<u8>> {
    let mut take = r.take(u64::from(len));
    let uncompressed_len = read_u32_le(&mut take)?;
    if u64::from(uncompressed_len) > u64::from(len).saturating_mul(LZ4_MAX_RATIO) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "chunk uncompressed length out of range",
        ));
    }

    let mut compressed = Vec::new();
    take.read_to_end(&mut compressed)?;
    if compressed.len() + 4 != len as usize {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated chunk"));
    }
    decompress_lz4(&compressed, uncompressed_len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_header_and_payload_read_back() {
        let payload: Vec<u8> = (0..200u32).map(|i| (i % 7) as u8).collect();
        let mut out = Vec::new();
        write_chunk_lz4(&mut out, *b"TEST", &payload).unwrap();

        let mut r = io::Cursor::new(out);
        let (tag, len) = read_chunk_header(&mut r).unwrap();
        assert_eq!(&tag, b"TEST");
        assert_eq!(read_chunk_payload(&mut r, len).unwrap(), payload);
    }

    #[test]
    fn implausible_uncompressed_length_is_rejected() {
        let mut out = Vec::new();
        write_chunk_lz4(&mut out, *b"TEST", &[7u8; 64]).unwrap();
        // tag(4) + len(4), then the uncompressed length.
        out[8..12].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut r = io::Cursor::new(out);
        let (_, len) = read_chunk_header(&mut r).unwrap();
        let err = read_chunk_payload(&mut r, len).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn truncated_chunk_is_rejected() {
        let mut out = Vec::new();
        write_chunk_lz4(&mut out, *b"TEST", &[1, 2, 3, 4, 5]).unwrap();
        out.pop();

        let mut r = io::Cursor::new(out);
        let (_, len) = read_chunk_header(&mut r).unwrap();
        let err = read_chunk_payload(&mut r, len).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn counting_writer_counts() {
        let mut w = CountingWriter::new();
        write_u64_le(&mut w, 1).unwrap();
        write_i16_le(&mut w, -1).unwrap();
        write_u8(&mut w, 3).unwrap();
        assert_eq!(w.written(), 11);
    }
}
