//! A fixed-size pool of units that run one operation in a tight loop.
//!
//! How a unit decides to stop is up to the operation (it returns
//! [`Step::Stop`] or an error). How many units run, and when they are forced
//! to stop, is up to the [`PoolHandle`].

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, warn};

use crate::error::{BenchError, Result};

/// What a unit should do after one call of its operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The operation succeeded; run it again
    Continue,
    /// This unit is done
    Stop,
}

/// Why a unit exited without an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitExit {
    /// The operation returned [`Step::Stop`]
    Stopped,
    /// The pool was terminated
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSummary {
    pub units: usize,
    /// Number of operation calls that returned [`Step::Continue`]
    pub completed_ops: u64,
}

/// How a unit reacts to [`PoolHandle::terminate_all`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Drop the in-flight call and exit at once
    Abandon,
    /// Let the in-flight call finish, then exit before starting another.
    ///
    /// Every call a server has seen is then also seen by the unit, at the
    /// cost of waiting for the slowest in-flight call.
    AfterCall,
}

/// Start `units` concurrent loops, each calling `op(unit_index)` until it
/// stops, fails, or the pool is terminated.
pub fn spawn<F, Fut>(units: usize, op: F) -> PoolHandle
where
    F: Fn(usize) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Step>> + Send + 'static,
{
    spawn_with(units, Termination::Abandon, op)
}

/// Like [`spawn`], with an explicit termination policy
pub fn spawn_with<F, Fut>(units: usize, termination: Termination, op: F) -> PoolHandle
where
    F: Fn(usize) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = Result<Step>> + Send + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    let completed = Arc::new(AtomicU64::new(0));
    let mut tasks = JoinSet::new();

    for index in 0..units {
        tasks.spawn(run_unit(
            index,
            termination,
            op.clone(),
            stop_rx.clone(),
            completed.clone(),
        ));
    }
    debug!(units, ?termination, "spawned worker pool");

    PoolHandle {
        units,
        tasks,
        stop: stop_tx,
        completed,
    }
}

async fn run_unit<F, Fut>(
    index: usize,
    termination: Termination,
    op: F,
    mut stop: watch::Receiver<bool>,
    completed: Arc<AtomicU64>,
) -> Result<UnitExit>
where
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<Step>>,
{
    loop {
        if *stop.borrow_and_update() {
            return Ok(UnitExit::Terminated);
        }

        let step = match termination {
            Termination::Abandon => tokio::select! {
                biased;
                // Also fires if the handle was dropped
                _ = stop.changed() => return Ok(UnitExit::Terminated),
                step = op(index) => step?,
            },
            Termination::AfterCall => op(index).await?,
        };

        match step {
            Step::Continue => {
                completed.fetch_add(1, Ordering::Relaxed);
            }
            Step::Stop => return Ok(UnitExit::Stopped),
        }
    }
}

/// Exclusive handle over a running pool.
///
/// Dropping the handle aborts every unit that is still running.
#[derive(Debug)]
pub struct PoolHandle {
    units: usize,
    tasks: JoinSet<Result<UnitExit>>,
    stop: watch::Sender<bool>,
    completed: Arc<AtomicU64>,
}

impl PoolHandle {
    pub fn units(&self) -> usize {
        self.units
    }

    /// Wait for every unit to exit on its own.
    pub async fn join_all(self) -> Result<PoolSummary> {
        self.drain().await
    }

    /// Stop every unit and wait until none is running.
    ///
    /// Whether in-flight operations are dropped or awaited depends on the
    /// pool's [`Termination`].
    pub async fn terminate_all(self) -> Result<PoolSummary> {
        self.stop.send_replace(true);
        self.drain().await
    }

    /// Resolves with the first unit error. Never resolves if no unit fails.
    ///
    /// Cancel safe. Units that exit cleanly while this is awaited are not
    /// reported again by [`join_all`](Self::join_all) or
    /// [`terminate_all`](Self::terminate_all).
    pub async fn first_failure(&mut self) -> BenchError {
        loop {
            match self.tasks.join_next().await {
                Some(joined) => match flatten(joined) {
                    Ok(exit) => debug!(?exit, "unit exited"),
                    Err(err) => return err,
                },
                None => std::future::pending::<()>().await,
            }
        }
    }

    async fn drain(mut self) -> Result<PoolSummary> {
        let mut first_error = None;

        while let Some(joined) = self.tasks.join_next().await {
            match flatten(joined) {
                Ok(exit) => debug!(?exit, "unit exited"),
                Err(err) if first_error.is_none() => first_error = Some(err),
                Err(err) => warn!("additional unit failure: {:#}", anyhow::Error::from(err)),
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(PoolSummary {
                units: self.units,
                completed_ops: self.completed.load(Ordering::Relaxed),
            }),
        }
    }
}

fn flatten(joined: std::result::Result<Result<UnitExit>, JoinError>) -> Result<UnitExit> {
    match joined {
        Ok(exit) => exit,
        Err(err) => Err(BenchError::WorkerPanicked(err.to_string())),
    }
}
