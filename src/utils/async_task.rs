use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::CoordinationError;
use crate::Error;
use crate::Result;

/// Runs `task` until it succeeds, with a per-attempt timeout and jittered
/// exponential backoff between attempts.
///
/// `max_retries == 0` means unlimited attempts; the caller is expected to
/// bound the loop some other way (e.g. a cancellation token around it).
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    max_retries: usize,
    delay_duration: Duration,
    max_delay: Duration,
    timeout_duration: Duration,
) -> Result<P>
where
    F: Fn() -> T,
    T: std::future::Future<Output = Result<P>>,
{
    let mut retries = 0;
    let mut delay = delay_duration;
    let mut rng = StdRng::from_entropy();

    loop {
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => {
                return Ok(r);
            }
            Ok(Err(error)) => {
                warn!("task attempt failed with error: {:?}", &error);
            }
            Err(elapsed) => {
                warn!("task attempt timed out: {:?}", &elapsed);
            }
        };

        retries += 1;
        if max_retries != 0 && retries >= max_retries {
            warn!("task failed after {} retries", retries);
            return Err(Error::Coordination(CoordinationError::RetryTimeout(
                timeout_duration,
            )));
        }

        // jitter spreads out instances reconnecting at the same moment
        let jitter = Duration::from_millis(rng.gen_range(0..=delay.as_millis().max(1) as u64 / 2));
        sleep(delay + jitter).await;
        delay = (delay * 2).min(max_delay);
    }
}
