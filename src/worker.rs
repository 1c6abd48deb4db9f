//! Bounded worker pool for per-object tasks

use crate::error::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

/// Requested thread count capped at the available cores; all cores when unset
pub fn thread_count(requested: Option<usize>) -> usize {
    let cores = num_cpus::get().max(1);
    match requested {
        Some(threads) if threads > 0 => threads.min(cores),
        _ => cores,
    }
}

/// Run `worker` over every task on a dedicated pool. Tasks are fully
/// materialized before submission; their order of completion is unspecified.
pub fn run<T, F>(tasks: Vec<T>, threads: Option<usize>, worker: F) -> Result<()>
where
    T: Send,
    F: Fn(T) + Send + Sync,
{
    if tasks.is_empty() {
        return Ok(());
    }
    let threads = thread_count(threads);
    if threads == 1 {
        tasks.into_iter().for_each(worker);
        return Ok(());
    }

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    pool.install(|| tasks.into_par_iter().for_each(&worker));
    Ok(())
}

/// Progress bar in the style used for long scans
pub fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        .map(|style| style.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}
