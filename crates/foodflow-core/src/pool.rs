//! Bounded-concurrency worker pool.
//!
//! [`run_bounded`] maps an asynchronous operation over a sequence of items
//! while keeping at most `limit` operations in flight. Lanes pull the next
//! unclaimed `(index, item)` pair from a single shared work queue and write
//! the outcome into the slot matching that index, so the returned vector is
//! in input order no matter which operation finishes first.
//!
//! ```text
//! items ──► [ work queue ] ──► lane 0 ──┐
//!                         ├──► lane 1 ──┼──► slots[index] = outcome
//!                         └──► lane N ──┘
//! ```
//!
//! Failures never abort the pool: an `Err` (or a panic, which is caught and
//! converted to [`AppError::TaskPanicked`]) is recorded at its index and the
//! lane moves on to the next item.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// Result of processing one unit (a product or a batch).
pub type Outcome<R> = Result<R, AppError>;

/// Number of lanes the pool runs for `total` items under `limit`.
pub fn lane_count(limit: usize, total: usize) -> usize {
    limit.min(total).max(1)
}

/// Runs `op` over every item with at most `limit` operations in flight.
///
/// Returns one outcome per item, in input order, once every item has been
/// processed. Empty input returns immediately without calling `op`.
///
/// # Examples
///
/// ```
/// use foodflow_core::pool::run_bounded;
///
/// let outcomes = futures::executor::block_on(run_bounded(vec![1, 2, 3], 2, |n| async move {
///     Ok(n * 10)
/// }));
/// let values: Vec<i32> = outcomes.into_iter().map(Result::unwrap).collect();
/// assert_eq!(values, vec![10, 20, 30]);
/// ```
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, limit: usize, op: F) -> Vec<Outcome<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Outcome<R>>,
{
    run_bounded_with(items, limit, &CancellationToken::new(), op, |_, _| {}).await
}

/// Same as [`run_bounded`], with live outcome notification and cancellation.
///
/// `on_outcome(index, &outcome)` is invoked as soon as each outcome is known,
/// before the pool returns; callers use it for progress tracking.
///
/// Lanes check `cancel` before claiming the next item. Items still unclaimed
/// when the token fires are recorded as [`AppError::Cancelled`] (and reported
/// through `on_outcome`), so the result still has exactly one outcome per
/// item. Operations already in flight run to completion.
pub async fn run_bounded_with<T, R, F, Fut, C>(
    items: Vec<T>,
    limit: usize,
    cancel: &CancellationToken,
    op: F,
    on_outcome: C,
) -> Vec<Outcome<R>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Outcome<R>>,
    C: Fn(usize, &Outcome<R>),
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let lanes = lane_count(limit, total);
    tracing::debug!(total, lanes, "Starting worker pool");

    let queue = Mutex::new(items.into_iter().enumerate());
    let slots: Mutex<Vec<Option<Outcome<R>>>> = Mutex::new((0..total).map(|_| None).collect());

    {
        let queue = &queue;
        let slots = &slots;
        let op = &op;
        let on_outcome = &on_outcome;

        join_all((0..lanes).map(|_| async move {
            loop {
                if cancel.is_cancelled() {
                    break;
                }

                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .next();
                let Some((index, item)) = next else {
                    break;
                };

                let outcome = match AssertUnwindSafe(async { op(item).await })
                    .catch_unwind()
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        tracing::warn!(index, panic = %message, "Worker pool task panicked");
                        Err(AppError::TaskPanicked(message))
                    }
                };

                on_outcome(index, &outcome);
                slots.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(outcome);
            }
        }))
        .await;
    }

    let slots = slots.into_inner().unwrap_or_else(PoisonError::into_inner);
    let mut unclaimed = 0usize;
    let outcomes: Vec<Outcome<R>> = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| match slot {
            Some(outcome) => outcome,
            None => {
                unclaimed += 1;
                let outcome = Err(AppError::Cancelled);
                on_outcome(index, &outcome);
                outcome
            }
        })
        .collect();

    if unclaimed > 0 {
        tracing::info!(unclaimed, total, "Worker pool cancelled before all items were claimed");
    }

    outcomes
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
