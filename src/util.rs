use std::{
    thread::sleep,
    time::{Duration, Instant},
};

/// Polls `ready` every `period` until it holds or `timeout` has elapsed.
///
/// The predicate is always evaluated at least once, so a zero timeout is a
/// single check. Returns whether the condition was met; errors from the
/// predicate end the wait immediately.
pub fn wait_until<F>(timeout: Duration, period: Duration, mut ready: F) -> anyhow::Result<bool>
where
    F: FnMut() -> anyhow::Result<bool>,
{
    let start = Instant::now();

    loop {
        if ready()? {
            break Ok(true);
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            break Ok(false);
        }

        sleep(period.min(timeout - elapsed));
    }
}
