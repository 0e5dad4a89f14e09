/// Deterministic buffer partitioning.
///
/// Ceiling-chunk split: chunk = ceil(len / n), slice i covers
/// [i*chunk, min((i+1)*chunk, len)]. The last chunk may be shorter;
/// the erasure layer right-pads it when Reed-Solomon is enabled.
/// Merge is byte concatenation in index order.

/// Split a buffer into `n` chunks.
///
/// Produces exactly `n` entries; trailing entries are empty when the
/// buffer is shorter than `n` bytes.
pub fn split(data: &[u8], n: usize) -> Vec<Vec<u8>> {
    assert!(n > 0, "partition count must be positive");
    let chunk = data.len().div_ceil(n).max(1);

    (0..n)
        .map(|i| {
            let start = (i * chunk).min(data.len());
            let end = ((i + 1) * chunk).min(data.len());
            data[start..end].to_vec()
        })
        .collect()
}

/// Concatenate chunks in index order.
pub fn merge(chunks: &[Vec<u8>]) -> Vec<u8> {
    let total = chunks.iter().map(Vec::len).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(chunk);
    }
    out
}
