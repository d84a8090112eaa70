//! Chunked, bounded-concurrency fan-out for per-item embedding calls.

use std::future::Future;

use futures::{StreamExt, TryStreamExt, stream};

use crate::error::{Error, Result};

/// Embed `items` in chunks of `batch_size`, running up to `max_concurrency`
/// calls at once within a chunk.
///
/// Results come back in input order: `buffered` yields in submission
/// order regardless of completion order, and chunks run one after another.
/// The first failed call fails the whole batch.
///
/// `progress` is called with the number of items embedded so far each time
/// a result is yielded, so it sees `1..=items.len()` in order.
pub async fn embed_in_chunks<T, F, Fut, P>(
    items: Vec<T>,
    batch_size: usize,
    max_concurrency: usize,
    embed: F,
    progress: P,
) -> Result<Vec<Vec<f32>>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<Vec<f32>>>,
    P: Fn(usize),
{
    if batch_size == 0 {
        return Err(Error::Validation("batch_size must be at least 1".to_string()));
    }

    let total = items.len();
    let mut embeddings = Vec::with_capacity(total);
    let mut remaining = items.into_iter();
    let mut chunk_index = 0usize;
    let mut completed = 0usize;

    loop {
        let chunk: Vec<T> = remaining.by_ref().take(batch_size).collect();
        if chunk.is_empty() {
            break;
        }

        tracing::debug!(chunk = chunk_index, size = chunk.len(), total, "embedding chunk");

        let results: Vec<Vec<f32>> = stream::iter(chunk.into_iter().map(&embed))
            .buffered(max_concurrency.max(1))
            .inspect_ok(|_| {
                completed += 1;
                progress(completed);
            })
            .try_collect()
            .await?;
        embeddings.extend(results);
        chunk_index += 1;
    }

    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_preserves_order_despite_completion_order() {
        // Earlier items sleep longer, so they finish last.
        let items: Vec<u64> = (0..10).collect();
        let result = embed_in_chunks(items, 4, 8, |i| async move {
            tokio::time::sleep(Duration::from_millis(20 - 2 * i)).await;
            Ok(vec![i as f32])
        }, |_| {})
        .await
        .unwrap();

        let order: Vec<f32> = result.iter().map(|v| v[0]).collect();
        assert_eq!(order, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = &AtomicUsize::new(0);
        let peak = &AtomicUsize::new(0);

        embed_in_chunks((0..12).collect::<Vec<_>>(), 12, 3, move |_| async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![0.0])
        }, |_| {})
        .await
        .unwrap();

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak > 1, "calls ran one at a time");
        assert!(peak <= 3);
    }

    async fn elapsed_for(count: usize, batch_size: usize) -> Duration {
        let start = tokio::time::Instant::now();
        embed_in_chunks((0..count).collect(), batch_size, 64, |_| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(vec![0.0])
        }, |_| {})
        .await
        .unwrap();
        start.elapsed()
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_boundary() {
        // Each chunk runs as one concurrent wave of one-second calls.
        assert_eq!(elapsed_for(3, 3).await.as_secs(), 1);
        assert_eq!(elapsed_for(4, 3).await.as_secs(), 2);
        assert_eq!(elapsed_for(7, 3).await.as_secs(), 3);
    }

    #[tokio::test]
    async fn test_progress_counts_every_item_in_order() {
        let seen = std::sync::Mutex::new(Vec::new());
        // Later items finish first; progress still counts up one at a time.
        let result = embed_in_chunks((0..7u64).collect(), 3, 3, |i| async move {
            tokio::time::sleep(Duration::from_millis(14 - 2 * i)).await;
            Ok(vec![i as f32])
        }, |done| seen.lock().unwrap().push(done))
        .await
        .unwrap();

        assert_eq!(result.len(), 7);
        assert_eq!(seen.into_inner().unwrap(), (1..=7).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_progress_stops_at_first_error() {
        let seen = std::sync::Mutex::new(Vec::new());
        let result = embed_in_chunks(vec![1, 2, 3, 4], 2, 1, |i| async move {
            if i == 3 {
                Err(Error::Invoke("throttled".to_string()))
            } else {
                Ok(vec![i as f32])
            }
        }, |done| seen.lock().unwrap().push(done))
        .await;

        assert!(result.is_err());
        assert_eq!(seen.into_inner().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let result = embed_in_chunks(Vec::<u8>::new(), 64, 4, |_| async { Ok(vec![1.0]) }, |_| {})
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_first_error_fails_batch() {
        let result = embed_in_chunks(vec![1, 2, 3], 2, 2, |i| async move {
            if i == 3 {
                Err(Error::Invoke("throttled".to_string()))
            } else {
                Ok(vec![i as f32])
            }
        }, |_| {})
        .await;
        assert!(matches!(result, Err(Error::Invoke(_))));
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let result = embed_in_chunks(vec![1], 0, 1, |_| async { Ok(vec![]) }, |_| {}).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
