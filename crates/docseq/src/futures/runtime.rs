use core::time::Duration;

use crate::futures::SleepProvider;

/// An implementation of [`SleepProvider`] using Tokio's timer.
///
/// This is the provider to use in production: it honors the jittered backoff
/// the [`ConflictPolicy`](crate::ConflictPolicy) draws.
pub struct TokioSleep;
impl SleepProvider for TokioSleep {
    async fn sleep_for(dur: Duration) {
        tokio::time::sleep(dur).await
    }
}

/// An implementation of [`SleepProvider`] using Tokio's yield.
///
/// Ignores the requested delay and yields to the scheduler instead. Retrying
/// callers then contend in lockstep, which makes it suitable for tests but not
/// for shared stores under load.
pub struct TokioYield;
impl SleepProvider for TokioYield {
    async fn sleep_for(_dur: Duration) {
        tokio::task::yield_now().await
    }
}
