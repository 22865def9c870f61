//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Board management over a blocking driver, one worker thread per request.
//!
//! Each host owns a slot whose control word moves Idle -> Start -> Running ->
//! Done. The worker publishes its result before storing Done with release
//! ordering; the dispatcher only reads the result after observing Done with
//! acquire ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::collab::{BmcAction, BmcPoll, BmcService, CollabResult};
use crate::error::CollabError;
use crate::host::BmcInfo;

/// Blocking board management transport.
pub trait BmcDriver: Send + Sync + 'static {
    fn execute(&self, hostname: &str, action: BmcAction, info: &BmcInfo) -> Result<(), String>;
}

const IDLE: u8 = 0;
const START: u8 = 1;
const RUNNING: u8 = 2;
const DONE: u8 = 3;

#[derive(Debug, Default)]
struct Slot {
    control: AtomicU8,
    cancelled: AtomicBool,
    result: Mutex<Option<Result<(), String>>>,
}

/// [`BmcService`] that runs each request on a dedicated worker thread.
pub struct ThreadedBmc<D: BmcDriver> {
    driver: Arc<D>,
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl<D: BmcDriver> ThreadedBmc<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver: Arc::new(driver),
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, hostname: &str) -> Arc<Slot> {
        self.slots
            .lock()
            .entry(hostname.to_owned())
            .or_default()
            .clone()
    }
}

impl<D: BmcDriver> BmcService for ThreadedBmc<D> {
    fn start(&self, hostname: &str, action: BmcAction, info: &BmcInfo) -> CollabResult<()> {
        let slot = self.slot(hostname);
        if slot
            .control
            .compare_exchange(IDLE, START, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CollabError::Busy(hostname.to_owned()));
        }
        slot.cancelled.store(false, Ordering::Release);
        *slot.result.lock() = None;

        let driver = Arc::clone(&self.driver);
        let worker_slot = Arc::clone(&slot);
        let hostname_owned = hostname.to_owned();
        let info = info.clone();
        let spawned = thread::Builder::new()
            .name(format!("bmc-{hostname}"))
            .spawn(move || {
                worker_slot.control.store(RUNNING, Ordering::Release);
                let result = driver.execute(&hostname_owned, action, &info);
                *worker_slot.result.lock() = Some(result);
                worker_slot.control.store(DONE, Ordering::Release);
            });
        if let Err(err) = spawned {
            slot.control.store(IDLE, Ordering::Release);
            warn!(host = hostname, error = %err, "failed to spawn board management worker");
            return Err(CollabError::Unavailable("bmc"));
        }
        debug!(host = hostname, action = action.as_str(), "board management request started");
        Ok(())
    }

    fn poll(&self, hostname: &str) -> BmcPoll {
        let Some(slot) = self.slots.lock().get(hostname).cloned() else {
            return BmcPoll::Idle;
        };
        match slot.control.load(Ordering::Acquire) {
            IDLE => BmcPoll::Idle,
            START | RUNNING => BmcPoll::Pending,
            _ => {
                let result = slot.result.lock().take();
                slot.control.store(IDLE, Ordering::Release);
                if slot.cancelled.swap(false, Ordering::AcqRel) {
                    return BmcPoll::Idle;
                }
                BmcPoll::Done(result.unwrap_or_else(|| Err("worker produced no result".to_owned())))
            }
        }
    }

    fn cancel(&self, hostname: &str) {
        if let Some(slot) = self.slots.lock().get(hostname) {
            if slot.control.load(Ordering::Acquire) == DONE {
                slot.result.lock().take();
                slot.control.store(IDLE, Ordering::Release);
            } else if slot.control.load(Ordering::Acquire) != IDLE {
                slot.cancelled.store(true, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    struct Gate {
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl BmcDriver for Gate {
        fn execute(&self, _hostname: &str, action: BmcAction, _info: &BmcInfo) -> Result<(), String> {
            let _ = self.release.lock().recv_timeout(Duration::from_secs(5));
            match action {
                BmcAction::PowerOff => Err("power-off refused".to_owned()),
                _ => Ok(()),
            }
        }
    }

    fn wait_done(bmc: &ThreadedBmc<Gate>, host: &str) -> BmcPoll {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let poll = bmc.poll(host);
            if poll != BmcPoll::Pending || Instant::now() > deadline {
                return poll;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn request_runs_off_thread_and_completes_once() {
        let (tx, rx) = mpsc::channel();
        let bmc = ThreadedBmc::new(Gate { release: Mutex::new(rx) });
        bmc.start("compute-0", BmcAction::Reset, &BmcInfo::default()).unwrap();
        assert_eq!(bmc.poll("compute-0"), BmcPoll::Pending);
        assert_eq!(
            bmc.start("compute-0", BmcAction::Reset, &BmcInfo::default()),
            Err(CollabError::Busy("compute-0".into()))
        );
        tx.send(()).unwrap();
        assert_eq!(wait_done(&bmc, "compute-0"), BmcPoll::Done(Ok(())));
        assert_eq!(bmc.poll("compute-0"), BmcPoll::Idle);
    }

    #[test]
    fn driver_errors_are_reported() {
        let (tx, rx) = mpsc::channel();
        let bmc = ThreadedBmc::new(Gate { release: Mutex::new(rx) });
        tx.send(()).unwrap();
        bmc.start("compute-1", BmcAction::PowerOff, &BmcInfo::default()).unwrap();
        assert_eq!(
            wait_done(&bmc, "compute-1"),
            BmcPoll::Done(Err("power-off refused".into()))
        );
    }

    #[test]
    fn cancelled_results_are_discarded() {
        let (tx, rx) = mpsc::channel();
        let bmc = ThreadedBmc::new(Gate { release: Mutex::new(rx) });
        bmc.start("compute-2", BmcAction::Query, &BmcInfo::default()).unwrap();
        bmc.cancel("compute-2");
        tx.send(()).unwrap();
        assert_eq!(wait_done(&bmc, "compute-2"), BmcPoll::Idle);
        assert_eq!(bmc.poll("compute-2"), BmcPoll::Idle);
    }
}
