use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::AppError;

/// Runs `tasks` with at most `max_concurrent` in flight, starting them in
/// input order and topping up as soon as one finishes.
///
/// `on_progress` receives `completed / total` once per finished task.
/// `is_cancelled` is polled after every completion; once it reports true no
/// further task is started, but tasks already running are awaited.
///
/// The result holds one entry per *started* task, in input order, so a
/// cancelled run returns fewer entries than there were tasks. A failing or
/// panicking task only fails its own entry.
pub async fn run_limited<T, F, Fut, P, C>(
    tasks: Vec<F>,
    max_concurrent: usize,
    mut on_progress: P,
    is_cancelled: C,
) -> Vec<Result<T, AppError>>
where
    T: Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, AppError>> + Send + 'static,
    P: FnMut(f64),
    C: Fn() -> bool,
{
    let total = tasks.len();
    if total == 0 {
        return Vec::new();
    }

    // Never more permits than tasks; also keeps the count under `Semaphore::MAX_PERMITS`.
    let semaphore = Arc::new(Semaphore::new(max_concurrent.min(total).max(1)));
    let mut join_set: JoinSet<(usize, Result<T, AppError>)> = JoinSet::new();
    let mut slots: Vec<Option<Result<T, AppError>>> = Vec::with_capacity(total);
    let mut pending = tasks.into_iter().enumerate();
    let mut started = 0usize;
    let mut completed = 0usize;
    let mut stop_starting = is_cancelled();

    loop {
        while !stop_starting && started < total {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };
            let Some((idx, task)) = pending.next() else {
                break;
            };
            let fut = task();
            join_set.spawn(async move {
                let _permit = permit;
                (idx, fut.await)
            });
            slots.push(None);
            started += 1;
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        completed += 1;
        // A panicked task loses its index; its slot is filled in below.
        if let Ok((idx, result)) = joined {
            slots[idx] = Some(result);
        }
        on_progress(completed as f64 / total as f64);

        if !stop_starting && is_cancelled() {
            stop_starting = true;
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| Err(AppError::General("task panicked".to_string())))
        })
        .collect()
}
