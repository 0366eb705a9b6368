//! Thread-pool helpers shared by the pack and unpack pipelines.

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver},
        Mutex,
    },
    thread::{self, JoinHandle},
};

/// Runs `func` over every item on the thread pool. The first error wins:
/// once a worker fails, the remaining items are skipped and the error is
/// returned after all workers have stopped.
pub fn for_each_par<C, F, E>(items: C, func: F) -> Result<(), E>
where
    C: IntoParallelIterator,
    F: Fn(C::Item) -> Result<(), E> + Send + Sync,
    E: Send,
{
    let first_error = Mutex::new(None);
    let failed = AtomicBool::new(false);

    items.into_par_iter().for_each(|item| {
        if failed.load(Ordering::Acquire) {
            return;
        }
        if let Err(err) = func(item) {
            failed.store(true, Ordering::Release);
            let mut slot = first_error.lock().unwrap();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
    });

    match first_error.into_inner().unwrap() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Spawns a thread that maps `func` over `items` in parallel batches and
/// delivers the results over a bounded channel, in the order of `items`.
///
/// The channel capacity equals the pool size, so the producer can never run
/// further ahead than one batch plus the channel. Dropping the receiver
/// closes the channel; the producer notices on its next send and stops
/// issuing work. The returned handle must be joined once the receiver is
/// exhausted or dropped.
pub fn make_producer<In, Out, F>(items: Vec<In>, func: F) -> (JoinHandle<()>, Receiver<Out>)
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Out + Send + Sync + 'static,
{
    let capacity = rayon::current_num_threads().max(1);
    let (sender, receiver) = mpsc::sync_channel(capacity);

    let handle = thread::spawn(move || {
        let mut items = items.into_iter();
        loop {
            let batch: Vec<In> = items.by_ref().take(capacity).collect();
            if batch.is_empty() {
                break;
            }
            let results: Vec<Out> = batch.into_par_iter().map(&func).collect();
            for result in results {
                if sender.send(result).is_err() {
                    return;
                }
            }
        }
    });

    (handle, receiver)
}
