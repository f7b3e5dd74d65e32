use core::{future::Future, time::Duration};

/// A trait that abstracts over how to sleep for a given [`Duration`] in async
/// contexts.
///
/// The async retry loop is generic over it, so backoff between attempts never
/// blocks an executor thread.
pub trait SleepProvider {
    /// The future must be `Send` so retrying tasks can move across threads.
    fn sleep_for(dur: Duration) -> impl Future<Output = ()> + Send;
}
