//! Contiguous voxel chunking.
//!
//! `n` voxels split into `k` chunks: every chunk gets `n / k` voxels and the
//! first `n % k` chunks get one more. The same rule is used for the voxel
//! matrix at fit time and for the baseline signal at predict time, so chunk
//! `i` always covers the same voxels.

use std::ops::Range;

use nalgebra::DMatrix;

/// Row ranges of the `k` chunks of `n` items (`k` is clamped to at least 1).
pub fn chunk_bounds(n: usize, k: usize) -> Vec<Range<usize>> {
    let k = k.max(1);
    let base = n / k;
    let extra = n % k;

    let mut bounds = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let len = base + usize::from(i < extra);
        bounds.push(start..start + len);
        start += len;
    }
    bounds
}

pub fn split_rows(data: &DMatrix<f64>, k: usize) -> Vec<DMatrix<f64>> {
    chunk_bounds(data.nrows(), k)
        .into_iter()
        .map(|r| data.rows(r.start, r.len()).into_owned())
        .collect()
}

pub fn split_slice<T>(values: &[T], k: usize) -> Vec<&[T]> {
    chunk_bounds(values.len(), k)
        .into_iter()
        .map(|r| &values[r])
        .collect()
}

/// Stack row blocks in order. All blocks must have the same column count.
pub fn concat_rows(blocks: &[DMatrix<f64>]) -> DMatrix<f64> {
    let ncols = blocks.first().map_or(0, |b| b.ncols());
    let nrows = blocks.iter().map(|b| b.nrows()).sum();

    let mut out = DMatrix::zeros(nrows, ncols);
    let mut offset = 0;
    for block in blocks {
        out.rows_mut(offset, block.nrows()).copy_from(block);
        offset += block.nrows();
    }
    out
}
