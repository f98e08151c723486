use std::thread;

/// Number of workers to fan out over, never less than one.
pub fn available_workers() -> usize {
    thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

/// Split `items` into at most `chunks` contiguous batches.
///
/// Every batch except the last holds `ceil(len / chunks)` items, so the
/// number of batches can be smaller than requested. An empty input yields no
/// batches and a chunk count of zero is treated as one.
pub fn split_batches<T: Clone>(items: &[T], chunks: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let chunks = chunks.max(1);
    let size = items.len().div_ceil(chunks);
    items.chunks(size).map(|chunk| chunk.to_vec()).collect()
}
