//! Bounded pool of OS threads over a shared job queue.
//!
//! Each worker builds its own resources once (a store connection, an HTTP
//! session) with `init`, then claims jobs until the queue is empty. Results
//! are handed to `on_result` on the calling thread in completion order.

use std::thread;

use crossbeam_channel::unbounded;
use indicatif::{ProgressBar, ProgressStyle};

use crate::{Error, Result};

enum Message<R> {
    Done(R),
    InitFailed(usize, Error),
}

/// Run `work` over `jobs` on `workers` threads.
///
/// A worker whose `init` fails exits without taking jobs; the run only fails
/// when no worker could start.
pub fn run_pool<J, R, W, I, F>(
    label: &'static str,
    jobs: Vec<J>,
    workers: usize,
    init: I,
    work: F,
    mut on_result: impl FnMut(R),
) -> Result<()>
where
    J: Send,
    R: Send,
    I: Fn(usize) -> Result<W> + Sync,
    F: Fn(&mut W, J) -> R + Sync,
{
    if jobs.is_empty() {
        return Ok(());
    }
    let workers = workers.clamp(1, jobs.len());
    let progress = progress_bar(label, jobs.len() as u64);

    let (job_tx, job_rx) = unbounded();
    for job in jobs {
        // The receiver is alive until the scope below ends.
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let (result_tx, result_rx) = unbounded::<Message<R>>();
    let parent = tracing::Span::current();

    let init_failures = thread::scope(|scope| {
        for id in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            let init = &init;
            let work = &work;
            let parent = &parent;
            scope.spawn(move || {
                let _span =
                    tracing::debug_span!(parent: parent, "worker", pool = label, worker = id)
                        .entered();
                let mut state = match init(id) {
                    Ok(state) => state,
                    Err(err) => {
                        let _ = result_tx.send(Message::InitFailed(id, err));
                        return;
                    }
                };
                for job in job_rx.iter() {
                    if result_tx.send(Message::Done(work(&mut state, job))).is_err() {
                        break;
                    }
                }
            });
        }
        drop(result_tx);

        let mut init_failures = Vec::new();
        for message in result_rx.iter() {
            match message {
                Message::Done(result) => {
                    on_result(result);
                    progress.inc(1);
                }
                Message::InitFailed(id, err) => {
                    tracing::error!(pool = label, worker = id, error = %err, "worker failed to start");
                    init_failures.push(err);
                }
            }
        }
        init_failures
    });

    progress.finish_and_clear();

    if init_failures.len() == workers {
        let first = init_failures
            .into_iter()
            .next()
            .map(|e| e.to_string())
            .unwrap_or_default();
        return Err(Error::msg(format!("no {label} worker could start: {first}")));
    }
    Ok(())
}

fn progress_bar(label: &'static str, len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:>10} {bar:40.cyan/blue} {pos}/{len} {eta}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_prefix(label);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_job_runs_once() -> anyhow::Result<()> {
        let mut seen = Vec::new();
        run_pool(
            "test",
            (0..50).collect(),
            4,
            |_| Ok(()),
            |_, n: u32| n * 2,
            |r| seen.push(r),
        )?;
        seen.sort_unstable();
        assert_eq!(seen, (0..50).map(|n| n * 2).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn init_runs_once_per_worker() -> anyhow::Result<()> {
        let inits = AtomicUsize::new(0);
        run_pool(
            "test",
            (0..20).collect::<Vec<u32>>(),
            3,
            |_| {
                inits.fetch_add(1, Ordering::SeqCst);
                Ok(0u32)
            },
            |jobs_done, _| {
                *jobs_done += 1;
            },
            |_| {},
        )?;
        assert_eq!(inits.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[test]
    fn surviving_workers_drain_the_queue() -> anyhow::Result<()> {
        let mut count = 0;
        run_pool(
            "test",
            (0..10).collect::<Vec<u32>>(),
            2,
            |id| {
                if id == 0 {
                    Err(Error::msg("no connection"))
                } else {
                    Ok(())
                }
            },
            |_, n| n,
            |_| count += 1,
        )?;
        assert_eq!(count, 10);
        Ok(())
    }

    #[test]
    fn fails_when_no_worker_starts() {
        let err = run_pool(
            "test",
            vec![1u32, 2, 3],
            2,
            |_| -> Result<()> { Err(Error::msg("no connection")) },
            |_, n| n,
            |_| {},
        )
        .unwrap_err();
        assert!(err.to_string().contains("no connection"));
    }
}
