//! One-second clock poller driving the schedulers.

use chrono::{Local, NaiveDateTime, Timelike};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Wake slightly after the second boundary so the formatted time has
/// already rolled over.
const SETTLE: Duration = Duration::from_millis(5);

/// A running poller thread.
#[derive(Debug)]
pub struct Poller {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Signals the thread to exit and waits for the current tick to finish.
    /// Returns false if a tick had panicked and killed the thread.
    pub fn stop(mut self) -> bool {
        self.shutdown()
    }

    fn shutdown(&mut self) -> bool {
        self.stop.store(true, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return true;
        };
        if handle.join().is_err() {
            warn!(poller = %self.name, "poller thread panicked");
            return false;
        }
        debug!(poller = %self.name, "poller stopped");
        true
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Time until just past the next whole second.
pub fn until_next_second(now: NaiveDateTime) -> Duration {
    let into_second = Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    Duration::from_secs(1).saturating_sub(into_second) + SETTLE
}

/// Spawns a named thread calling `on_tick` with the local wall time once
/// per second. A tick runs to completion before the next one starts.
pub fn spawn_poller<F>(name: &str, mut on_tick: F) -> io::Result<Poller>
where
    F: FnMut(NaiveDateTime) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || loop {
            thread::sleep(until_next_second(Local::now().naive_local()));
            if flag.load(Ordering::SeqCst) {
                break;
            }
            on_tick(Local::now().naive_local());
        })?;

    Ok(Poller {
        name: name.to_string(),
        stop,
        handle: Some(handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::mpsc;

    #[test]
    fn test_until_next_second() {
        let base = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_milli_opt(7, 0, 0, 250)
            .unwrap();
        assert_eq!(until_next_second(base), Duration::from_millis(750) + SETTLE);

        let whole = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(7, 0, 0)
            .unwrap();
        assert_eq!(until_next_second(whole), Duration::from_secs(1) + SETTLE);
    }

    #[test]
    fn test_poller_ticks_and_stops() {
        let (tx, rx) = mpsc::channel();
        let poller = spawn_poller("test-poller", move |now| {
            let _ = tx.send(now);
        })
        .unwrap();

        let first = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(3)).unwrap();
        assert!(second > first);

        assert!(poller.stop());
        // Drain whatever was in flight; the channel then closes.
        while rx.recv_timeout(Duration::from_secs(3)).is_ok() {}
    }

    #[test]
    fn test_panicking_tick_is_reported_on_stop() {
        let (tx, rx) = mpsc::channel();
        let poller = spawn_poller("panicking-poller", move |_| {
            let _ = tx.send(());
            panic!("tick failed");
        })
        .unwrap();

        rx.recv_timeout(Duration::from_secs(3)).unwrap();
        // The sender is dropped as the thread unwinds.
        while rx.recv_timeout(Duration::from_secs(3)).is_ok() {}
        assert!(!poller.stop());
    }
}
