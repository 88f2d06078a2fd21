use std::future::Future;

use tokio::task::LocalSet;

/// Single-threaded executor used by every actor thread.
///
/// Each actor owns one of these on its own named thread; actors never share
/// an executor, so a blocking OS round-trip in one actor cannot stall
/// another.
pub struct Executor;

impl Executor {
    pub fn run<F: Future>(future: F) -> F::Output {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("failed to build actor runtime");
        LocalSet::new().block_on(&runtime, future)
    }
}
