//! The thin platform shim the driver depends on instead of talking to
//! `tokio::time` directly, so the session/link actors stay agnostic of which
//! async runtime drives them (the teacher crate keeps the same seam between
//! its core logic and an embassy/std backend split; this spec only needs
//! the std side of that seam).

use futures::future::Future;
use futures_timer::Delay;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A future that resolves after `duration` has elapsed, or never resolves
/// if constructed with `None`. Used by actors that sometimes have a
/// deadline to wait on (an ACK timer, a response timeout) and sometimes
/// don't, so a single `select!` arm can cover both without an `Option`
/// match at every call site.
pub struct MaybeSleep {
    delay: Option<Delay>,
}

impl MaybeSleep {
    pub fn new(duration: Option<Duration>) -> Self {
        Self {
            delay: duration.map(Delay::new),
        }
    }
}

impl Future for MaybeSleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `delay` is never moved out of `self`, only polled through
        // the pin projection below.
        let this = unsafe { self.get_unchecked_mut() };
        match &mut this.delay {
            Some(delay) => Pin::new(delay).poll(cx),
            None => Poll::Pending,
        }
    }
}

/// A coarse wall-clock timestamp suitable for log lines. Not meant for
/// anything that needs calendar semantics (time zones, leap seconds) — just
/// monotonically increasing and cheap to compute.
pub fn now() -> Timestamp {
    Timestamp(SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp(Duration);

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03}", self.0.as_secs(), self.0.subsec_millis())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn maybe_sleep_none_never_resolves() {
        let mut sleep = MaybeSleep::new(None).fuse();
        futures::select! {
            _ = sleep => panic!("a None MaybeSleep must never resolve"),
            _ = futures_timer::Delay::new(Duration::from_millis(20)).fuse() => {}
        }
    }

    #[tokio::test]
    async fn maybe_sleep_some_resolves() {
        MaybeSleep::new(Some(Duration::from_millis(1))).await;
    }
}
