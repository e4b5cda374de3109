// `.fvecs` files: each record is a little-endian i32 dimension followed by that
// many little-endian f32 values. Every record has the same dimension, so record
// `i` starts at `i * (4 + 4 * dim)` and ranges are read straight from a mapping.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::engine::chunk::Vector;
use crate::error::CacheError;

pub fn read_range(path: &Path, from: usize, to: usize) -> Result<Vec<Vector>, CacheError> {
    let name = path.display().to_string();
    let fail = |reason: String| CacheError::fetch(&name, reason);

    let file = File::open(path).map_err(|e| fail(e.to_string()))?;
    // SAFETY: vector files are treated as read-only while the service runs.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| fail(e.to_string()))?;

    let dim = match mmap.get(0..4) {
        Some(bytes) => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        None => return Err(fail("file too short for a header".to_string())),
    };
    if dim <= 0 {
        return Err(fail(format!("bad dimension {}", dim)));
    }
    let dim = dim as usize;
    let record_len = 4 + 4 * dim;
    let count = mmap.len() / record_len;
    if to >= count {
        return Err(fail(format!("index {} out of bounds ({} vectors)", to, count)));
    }

    let mut vectors = Vec::with_capacity(to - from + 1);
    for index in from..=to {
        let record = &mmap[index * record_len..(index + 1) * record_len];
        let (head, body) = record.split_at(4);
        if i32::from_le_bytes([head[0], head[1], head[2], head[3]]) as usize != dim {
            return Err(fail(format!("record {} has a different dimension", index)));
        }
        let coords: Vec<f64> = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect();
        vectors.push(Vector::from(coords));
    }
    Ok(vectors)
}
