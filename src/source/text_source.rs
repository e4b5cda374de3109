// Sparse text vector files.
//
// Layout:
//   numdocs totaldims
//   dim,val [dim,val ...]      one line per vector, dims are 1-based
//
// Vectors are densified to `totaldims` coordinates.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::engine::chunk::Vector;
use crate::error::CacheError;

/// Upper bound on buffers sized from header counts before the data backs them up.
const MAX_PREALLOC: usize = 4096;
/// Widest vector a header may declare.
const MAX_DIMS: usize = 1 << 24;

pub fn read_range(path: &Path, from: usize, to: usize) -> Result<Vec<Vector>, CacheError> {
    let name = path.display().to_string();
    let fail = |reason: String| CacheError::fetch(&name, reason);

    let file = File::open(path).map_err(|e| fail(e.to_string()))?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line.map_err(|e| fail(e.to_string()))?,
        None => return Err(fail("empty file".to_string())),
    };
    let (numdocs, dims) = parse_header(&header).ok_or_else(|| fail(format!("bad header {:?}", header)))?;
    if to >= numdocs {
        return Err(fail(format!("index {} out of bounds ({} vectors)", to, numdocs)));
    }
    if dims > MAX_DIMS {
        return Err(fail(format!("header declares {} dimensions (limit {})", dims, MAX_DIMS)));
    }

    let mut vectors = Vec::with_capacity((to - from + 1).min(MAX_PREALLOC));
    for (index, line) in lines.enumerate() {
        if index < from {
            continue;
        }
        if index > to {
            break;
        }
        let line = line.map_err(|e| fail(e.to_string()))?;
        let vector = parse_line(&line, dims).map_err(|reason| fail(format!("line {}: {}", index + 2, reason)))?;
        vectors.push(vector);
    }

    if vectors.len() != to - from + 1 {
        return Err(fail(format!(
            "header claims {} vectors but the file ends before index {}",
            numdocs, to
        )));
    }
    Ok(vectors)
}

fn parse_header(line: &str) -> Option<(usize, usize)> {
    let mut fields = line.split_whitespace();
    let numdocs = fields.next()?.parse().ok()?;
    let dims = fields.next()?.parse().ok()?;
    Some((numdocs, dims))
}

fn parse_line(line: &str, dims: usize) -> Result<Vector, String> {
    let mut coords = vec![0.0; dims];
    for pair in line.split_whitespace() {
        let (dim, val) = pair
            .split_once(',')
            .ok_or_else(|| format!("expected dim,val but found {:?}", pair))?;
        let dim: usize = dim.parse().map_err(|_| format!("bad dimension {:?}", dim))?;
        let val: f64 = val.parse().map_err(|_| format!("bad value {:?}", val))?;
        if dim == 0 || dim > dims {
            return Err(format!("dimension {} outside 1..={}", dim, dims));
        }
        coords[dim - 1] = val;
    }
    Ok(coords.into())
}
