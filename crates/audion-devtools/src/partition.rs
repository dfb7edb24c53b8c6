//! Splits one stream into keyed sub-streams.
//!
//! The first value for a key opens a new [`Partition`] and yields it on the
//! outer stream; later values with that key go to the same partition. A value
//! that completes its partition is delivered and the partition is closed and
//! forgotten, so a later value with the same key opens a fresh one. When the
//! source ends every open partition ends with it. When the source fails the
//! error is delivered to every open partition and to the outer stream, which
//! then ends.

use std::collections::HashMap;
use std::hash::Hash;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{FusedStream, Stream, StreamExt};
use tokio::sync::mpsc;

/// One key's share of a partitioned stream.
#[derive(Debug)]
pub struct Partition<K, T, E> {
    key: K,
    rx: mpsc::UnboundedReceiver<Result<T, E>>,
}

impl<K, T, E> Partition<K, T, E> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Unpin, T, E> Stream for Partition<K, T, E> {
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Stream of partitions; see the module docs.
pub struct PartitionMap<S, K, T, E, F, C> {
    source: S,
    key_of: F,
    is_complete: C,
    open: HashMap<K, mpsc::UnboundedSender<Result<T, E>>>,
    done: bool,
}

/// Partitions `source` by `key_of`, closing a partition after a value for
/// which `is_complete` holds.
pub fn partition_map<S, K, T, E, F, C>(
    source: S,
    key_of: F,
    is_complete: C,
) -> PartitionMap<S, K, T, E, F, C>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    K: Eq + Hash + Clone,
    E: Clone,
    F: FnMut(&T) -> K,
    C: FnMut(&T) -> bool,
{
    PartitionMap {
        source,
        key_of,
        is_complete,
        open: HashMap::new(),
        done: false,
    }
}

impl<S, K, T, E, F, C> PartitionMap<S, K, T, E, F, C> {
    /// Number of partitions currently open.
    pub fn open_partitions(&self) -> usize {
        self.open.len()
    }
}

impl<S, K, T, E, F, C> Stream for PartitionMap<S, K, T, E, F, C>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    K: Eq + Hash + Clone + Unpin,
    T: Unpin,
    E: Clone + Unpin,
    F: FnMut(&T) -> K + Unpin,
    C: FnMut(&T) -> bool + Unpin,
{
    type Item = Result<Partition<K, T, E>, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            match this.source.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.done = true;
                    this.open.clear();
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(error))) => {
                    this.done = true;
                    for (_, tx) in this.open.drain() {
                        let _ = tx.send(Err(error.clone()));
                    }
                    return Poll::Ready(Some(Err(error)));
                }
                Poll::Ready(Some(Ok(value))) => {
                    let key = (this.key_of)(&value);
                    let complete = (this.is_complete)(&value);

                    let mut opened = None;
                    let delivered = match this.open.get(&key) {
                        Some(tx) => tx.send(Ok(value)).is_ok(),
                        None => {
                            let (tx, rx) = mpsc::unbounded_channel();
                            let _ = tx.send(Ok(value));
                            this.open.insert(key.clone(), tx);
                            opened = Some(Partition {
                                key: key.clone(),
                                rx,
                            });
                            true
                        }
                    };

                    // A dropped partition is forgotten like a completed one.
                    if complete || !delivered {
                        this.open.remove(&key);
                    }
                    if let Some(partition) = opened {
                        return Poll::Ready(Some(Ok(partition)));
                    }
                }
            }
        }
    }
}

impl<S, K, T, E, F, C> FusedStream for PartitionMap<S, K, T, E, F, C>
where
    Self: Stream,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    type Item = (&'static str, u32, bool);

    fn source(items: Vec<Result<Item, String>>) -> stream::Iter<std::vec::IntoIter<Result<Item, String>>> {
        stream::iter(items)
    }

    async fn drain<K: Unpin, T, E>(partition: Partition<K, T, E>) -> Vec<Result<T, E>> {
        partition.collect().await
    }

    #[tokio::test]
    async fn values_route_by_key() {
        let partitions: Vec<_> = partition_map(
            source(vec![Ok(("a", 1, false)), Ok(("b", 1, false)), Ok(("a", 2, false))]),
            |v: &Item| v.0,
            |v: &Item| v.2,
        )
        .collect()
        .await;

        assert_eq!(partitions.len(), 2);
        let mut partitions = partitions.into_iter().map(Result::unwrap);
        let a = partitions.next().unwrap();
        let b = partitions.next().unwrap();
        assert_eq!(*a.key(), "a");
        assert_eq!(drain(a).await, vec![Ok(("a", 1, false)), Ok(("a", 2, false))]);
        assert_eq!(drain(b).await, vec![Ok(("b", 1, false))]);
    }

    #[tokio::test]
    async fn completion_closes_only_its_partition() {
        let mut outer = partition_map(
            source(vec![
                Ok(("a", 1, false)),
                Ok(("b", 1, false)),
                Ok(("a", 2, true)),
                Ok(("b", 2, false)),
                Ok(("a", 3, false)),
            ]),
            |v: &Item| v.0,
            |v: &Item| v.2,
        );

        let first_a = outer.next().await.unwrap().unwrap();
        let b = outer.next().await.unwrap().unwrap();
        let second_a = outer.next().await.unwrap().unwrap();
        assert_eq!(*second_a.key(), "a");
        assert_eq!(outer.open_partitions(), 2);
        assert!(outer.next().await.is_none());
        assert!(outer.is_terminated());

        assert_eq!(drain(first_a).await, vec![Ok(("a", 1, false)), Ok(("a", 2, true))]);
        assert_eq!(drain(b).await, vec![Ok(("b", 1, false)), Ok(("b", 2, false))]);
        assert_eq!(drain(second_a).await, vec![Ok(("a", 3, false))]);
    }

    #[tokio::test]
    async fn errors_reach_every_open_partition() {
        let mut outer = partition_map(
            source(vec![
                Ok(("a", 1, false)),
                Ok(("b", 1, true)),
                Ok(("c", 1, false)),
                Err("lost".to_string()),
                Ok(("a", 2, false)),
            ]),
            |v: &Item| v.0,
            |v: &Item| v.2,
        );

        let a = outer.next().await.unwrap().unwrap();
        let b = outer.next().await.unwrap().unwrap();
        let c = outer.next().await.unwrap().unwrap();
        assert_eq!(outer.next().await.unwrap().unwrap_err(), "lost");
        assert!(outer.next().await.is_none());

        assert_eq!(drain(a).await, vec![Ok(("a", 1, false)), Err("lost".to_string())]);
        assert_eq!(drain(b).await, vec![Ok(("b", 1, true))]);
        assert_eq!(drain(c).await, vec![Ok(("c", 1, false)), Err("lost".to_string())]);
    }
}
