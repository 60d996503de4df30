//! Single-flight guard for outbound requests.
//!
//! A trigger (coupon fetch, order confirmation) is disabled while its request
//! is outstanding. Dropping the guard, including when the awaiting future is
//! abandoned, re-enables it and wakes anyone waiting in [`InFlight::idle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use crate::{Result, StorefrontError};

#[derive(Debug, Clone)]
pub struct InFlight {
    name: &'static str,
    busy: Arc<AtomicBool>,
    settled: Arc<Notify>,
}

impl InFlight {
    pub fn new(name: &'static str) -> Self { Self { name, busy: Arc::new(AtomicBool::new(false)), settled: Arc::new(Notify::new()) } }

    pub fn is_busy(&self) -> bool { self.busy.load(Ordering::Acquire) }

    pub fn begin(&self) -> Result<InFlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StorefrontError::RequestInFlight(self.name))?;
        Ok(InFlightGuard { busy: Arc::clone(&self.busy), settled: Arc::clone(&self.settled) })
    }

    /// Resolves once no request is outstanding.
    pub async fn idle(&self) {
        loop {
            let settled = self.settled.notified();
            if !self.is_busy() { return; }
            settled.await;
        }
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    busy: Arc<AtomicBool>,
    settled: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        self.settled.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_begin_rejected_until_drop() {
        let flight = InFlight::new("coupon fetch");
        let guard = flight.begin().unwrap();
        assert!(flight.is_busy());
        assert!(matches!(flight.begin(), Err(StorefrontError::RequestInFlight("coupon fetch"))));
        drop(guard);
        assert!(!flight.is_busy());
        assert!(flight.begin().is_ok());
    }

    #[tokio::test]
    async fn test_idle_waits_for_release() {
        let flight = InFlight::new("coupon fetch");
        flight.idle().await;
        let guard = flight.begin().unwrap();
        let waiter = flight.idle();
        tokio::pin!(waiter);
        tokio::select! {
            biased;
            _ = &mut waiter => panic!("idle resolved while busy"),
            _ = tokio::task::yield_now() => {}
        }
        drop(guard);
        waiter.await;
        assert!(!flight.is_busy());
    }
}
