use crate::error::{Error, Result};

/// Splits `data` into `n` contiguous chunks whose lengths differ by at most one.
///
/// The first `data.len() % n` chunks carry the extra element. When `n` exceeds
/// the number of values the trailing chunks are empty.
pub fn split(data: &[i32], n: usize) -> Result<Vec<&[i32]>> {
    if n == 0 {
        return Err(Error::InvalidPartition);
    }
    let chunk_size = data.len() / n;
    let remainder = data.len() % n;

    let mut chunks = Vec::with_capacity(n);
    let mut start = 0;
    for i in 0..n {
        let end = start + chunk_size + usize::from(i < remainder);
        chunks.push(&data[start..end]);
        start = end;
    }
    Ok(chunks)
}
