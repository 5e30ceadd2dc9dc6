use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use smithay_client_toolkit::reexports::calloop::{self, channel, LoopHandle};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("cannot register the tick channel: {0}")]
    Register(#[from] calloop::Error),
    #[error("cannot spawn the ticker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Spawns a ticker that calls `on_tick` on every wall-clock multiple of
/// `interval` until `on_tick` returns false.
///
/// `on_tick` runs on its own thread and must only post a notification; it
/// never touches drawing state.
pub fn start<F>(interval: Duration, mut on_tick: F) -> io::Result<JoinHandle<()>>
where
    F: FnMut() -> bool + Send + 'static,
{
    thread::Builder::new()
        .name("horologe-tick".into())
        .spawn(move || loop {
            thread::sleep(until_next_boundary(SystemTime::now(), interval));
            if !on_tick() {
                tracing::debug!("tick receiver gone, timer stopped");
                break;
            }
        })
}

/// Starts a ticker whose ticks run `on_tick` on the event loop's thread.
///
/// Ticks cross threads through a calloop channel, so `on_tick` only ever runs
/// between other event sources' callbacks. The ticker thread ends once the
/// loop drops the channel.
pub fn insert_ticker<'l, D: 'l>(
    handle: &LoopHandle<'l, D>,
    interval: Duration,
    mut on_tick: impl FnMut(&mut D) + 'l,
) -> Result<JoinHandle<()>, TimerError> {
    let (ticks, receiver) = channel::channel::<()>();
    handle
        .insert_source(receiver, move |event, _, data| {
            if let channel::Event::Msg(()) = event {
                on_tick(data);
            }
        })
        .map_err(|e| e.error)?;
    Ok(start(interval, move || ticks.send(()).is_ok())?)
}

/// Repaint deadline for the poll driver. Unrelated events wake the loop
/// early but never push the deadline back.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    next: Instant,
    interval: Duration,
}

impl Deadline {
    pub fn new(now: Instant, interval: Duration) -> Self {
        Self { next: now + interval, interval }
    }

    /// How long the loop may block before the deadline passes.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next.saturating_duration_since(now)
    }

    /// True once `now` reaches the deadline; the next one is an interval later.
    pub fn expire(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.interval;
        true
    }
}

/// Time left until the next integral multiple of `interval` since the epoch.
pub fn until_next_boundary(now: SystemTime, interval: Duration) -> Duration {
    let period = interval.as_nanos();
    if period == 0 {
        return interval;
    }
    let since = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    Duration::from_nanos((period - since % period) as u64)
}
