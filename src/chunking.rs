//! Adapter around the content-defined chunking (CDC) external collaborator.
//!
//! §1 explicitly keeps the CDC library itself out of scope: the core only
//! consumes "a lazy sequence of chunk sizes from it". This module is that
//! seam — a `ChunkSizes` iterator the Store Pipeline's reader drives one
//! size at a time, mirroring how the original Python client called
//! `rabin.chunksizes_from_filename` and then read exactly that many bytes
//! per chunk from a second, independent file handle.
//!
//! The default implementation wraps `fastcdc`, scanning the source file
//! once to find boundaries. A fixed-size variant is kept for deterministic
//! tests, the same way the teacher's `chunk_stream.rs` kept both a dynamic
//! `ChunkStream` and a `FixedChunkStream`.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use fastcdc::v2020::StreamCDC;

/// A lazy sequence of chunk sizes describing how to split a file.
pub trait ChunkSizes: Iterator<Item = io::Result<usize>> {}
impl<T: Iterator<Item = io::Result<usize>>> ChunkSizes for T {}

/// Default geometry, in the same neighborhood as the original `rabin`
/// chunker's parameters: small enough to dedup well, large enough to keep
/// per-chunk round-trip overhead reasonable.
pub const MIN_CHUNK_SIZE: u32 = 1024;
pub const AVG_CHUNK_SIZE: u32 = 4 * 1024;
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024;

/// Scans `path` with FastCDC and yields the size of each chunk it finds.
///
/// This performs its own read pass over the file; the Store Pipeline's
/// reader (§4.4) re-reads the same file a second time, sized by these
/// values, so content is only ever buffered in one place at a time.
pub fn fastcdc_chunk_sizes(path: &Path) -> io::Result<impl ChunkSizes> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let cdc = StreamCDC::new(reader, MIN_CHUNK_SIZE, AVG_CHUNK_SIZE, MAX_CHUNK_SIZE);
    Ok(cdc.map(|result| {
        result
            .map(|chunk| chunk.data.len())
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))
    }))
}

/// Splits a file of known length into equal-sized chunks (the final chunk
/// may be shorter). Used where deterministic chunk boundaries matter, e.g.
/// reproducible tests of the dedup and restore-ordering properties.
pub fn fixed_chunk_sizes(total_len: u64, chunk_size: usize) -> impl ChunkSizes {
    FixedSizes {
        remaining: total_len,
        chunk_size: chunk_size as u64,
    }
}

struct FixedSizes {
    remaining: u64,
    chunk_size: u64,
}

impl Iterator for FixedSizes {
    type Item = io::Result<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let this = self.remaining.min(self.chunk_size);
        self.remaining -= this;
        Some(Ok(this as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sizes_cover_exact_length_with_short_final_chunk() {
        let sizes: Vec<usize> = fixed_chunk_sizes(25, 10)
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(sizes.iter().sum::<usize>(), 25);
    }

    #[test]
    fn fixed_sizes_empty_file_yields_nothing() {
        let sizes: Vec<usize> = fixed_chunk_sizes(0, 10)
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        assert!(sizes.is_empty());
    }

    #[test]
    fn fixed_sizes_exact_multiple_has_no_short_tail() {
        let sizes: Vec<usize> = fixed_chunk_sizes(20, 10)
            .collect::<io::Result<Vec<_>>>()
            .unwrap();
        assert_eq!(sizes, vec![10, 10]);
    }
}
