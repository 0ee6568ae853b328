//! FIFO admission control.
//!
//! A counting semaphore whose limit can change at runtime. Waiters are
//! admitted strictly in arrival order, and a waiter that is cancelled or
//! dropped while queued leaves the queue without consuming a slot.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use toolrelay_core::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("Cancelled while waiting for an execution slot")]
    Cancelled,
    #[error("Admission queue closed")]
    Closed,
}

struct Waiter {
    id: u64,
    grant: oneshot::Sender<AdmissionPermit>,
}

struct State {
    in_flight: usize,
    limit: usize,
    next_waiter: u64,
    waiters: VecDeque<Waiter>,
}

struct Inner {
    state: Mutex<State>,
}

impl Inner {
    fn release(self: &Arc<Self>) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        self.drain(&mut state);
    }

    /// Hand out free slots to queued waiters, oldest first.
    fn drain(self: &Arc<Self>, state: &mut State) {
        while state.in_flight < state.limit {
            let Some(waiter) = state.waiters.pop_front() else {
                break;
            };
            state.in_flight += 1;
            if let Err(permit) = waiter.grant.send(AdmissionPermit::new(self)) {
                // Receiver is gone; take the slot back without re-entering the lock.
                permit.disarm();
                state.in_flight -= 1;
            }
        }
    }

    fn forget(&self, id: u64) {
        self.state.lock().waiters.retain(|w| w.id != id);
    }
}

/// One admitted slot. Dropping it (or calling [`release`](Self::release))
/// frees the slot exactly once.
pub struct AdmissionPermit {
    inner: Option<Arc<Inner>>,
}

impl AdmissionPermit {
    fn new(inner: &Arc<Inner>) -> Self {
        Self {
            inner: Some(Arc::clone(inner)),
        }
    }

    pub fn release(mut self) {
        self.release_slot();
    }

    fn release_slot(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }

    fn disarm(mut self) {
        self.inner = None;
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.release_slot();
    }
}

impl std::fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("held", &self.inner.is_some())
            .finish()
    }
}

/// Removes a queued waiter if the acquire future goes away before admission.
struct QueuedWaiter<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for QueuedWaiter<'_> {
    fn drop(&mut self) {
        self.inner.forget(self.id);
    }
}

/// Bounded, FIFO-fair admission with a mutable limit.
#[derive(Clone)]
pub struct AdmissionController {
    inner: Arc<Inner>,
}

impl AdmissionController {
    /// `limit` is clamped to at least one.
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    in_flight: 0,
                    limit: limit.max(1),
                    next_waiter: 0,
                    waiters: VecDeque::new(),
                }),
            }),
        }
    }

    /// Wait for a slot. Fails immediately if `cancel` has already fired and
    /// withdraws from the queue if it fires while waiting.
    pub async fn acquire(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> Result<AdmissionPermit, AdmissionError> {
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(AdmissionError::Cancelled);
        }

        let (id, mut granted) = {
            let mut state = self.inner.state.lock();
            if state.in_flight < state.limit && state.waiters.is_empty() {
                state.in_flight += 1;
                return Ok(AdmissionPermit::new(&self.inner));
            }
            let id = state.next_waiter;
            state.next_waiter += 1;
            let (grant, granted) = oneshot::channel();
            state.waiters.push_back(Waiter { id, grant });
            (id, granted)
        };

        // Declared after `granted` so it runs first on drop; a permit that
        // raced into the channel is then released when `granted` drops,
        // outside the lock.
        let _queued = QueuedWaiter {
            inner: &self.inner,
            id,
        };

        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(AdmissionError::Cancelled),
                permit = &mut granted => permit.map_err(|_| AdmissionError::Closed),
            },
            None => (&mut granted).await.map_err(|_| AdmissionError::Closed),
        }
    }

    /// Take a slot only if one is free and nobody is queued.
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        let mut state = self.inner.state.lock();
        if state.in_flight < state.limit && state.waiters.is_empty() {
            state.in_flight += 1;
            Some(AdmissionPermit::new(&self.inner))
        } else {
            None
        }
    }

    /// Change the limit (clamped to at least one). Raising it admits queued
    /// waiters right away; lowering it never revokes held permits.
    pub fn set_limit(&self, limit: usize) {
        let mut state = self.inner.state.lock();
        state.limit = limit.max(1);
        self.inner.drain(&mut state);
    }

    pub fn limit(&self) -> usize {
        self.inner.state.lock().limit
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    pub fn waiting(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// True when no other handle, permit or queued waiter refers to this
    /// controller.
    pub(crate) fn is_unshared(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("AdmissionController")
            .field("in_flight", &state.in_flight)
            .field("limit", &state.limit)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_limit_is_enforced() {
        let controller = AdmissionController::new(1);
        let first = controller.acquire(None).await.unwrap();
        assert!(controller.try_acquire().is_none());
        assert!(timeout(Duration::from_millis(50), controller.acquire(None))
            .await
            .is_err());
        drop(first);
        assert!(controller.try_acquire().is_some());
    }

    #[test]
    fn test_waiter_wakes_when_slot_frees() {
        let controller = AdmissionController::new(1);
        let held = controller.try_acquire().unwrap();
        let mut waiter = tokio_test::task::spawn(controller.acquire(None));
        tokio_test::assert_pending!(waiter.poll());
        assert_eq!(controller.waiting(), 1);

        drop(held);
        assert!(waiter.is_woken());
        let permit = tokio_test::assert_ready_ok!(waiter.poll());
        assert_eq!(controller.in_flight(), 1);
        drop(permit);
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_zero_limit_is_clamped() {
        let controller = AdmissionController::new(0);
        assert_eq!(controller.limit(), 1);
        controller.set_limit(0);
        assert_eq!(controller.limit(), 1);
    }

    #[tokio::test]
    async fn test_waiters_are_admitted_in_order() {
        let controller = AdmissionController::new(1);
        let held = controller.acquire(None).await.unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..3 {
            let task_controller = controller.clone();
            let order = Arc::clone(&order);
            handles.push(tokio::spawn(async move {
                let permit = task_controller.acquire(None).await.unwrap();
                order.lock().push(i);
                tokio::time::sleep(Duration::from_millis(5)).await;
                drop(permit);
            }));
            // Let each task enqueue before the next one starts.
            while controller.waiting() <= i {
                tokio::task::yield_now().await;
            }
        }

        drop(held);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_queue() {
        let controller = AdmissionController::new(1);
        let held = controller.acquire(None).await.unwrap();
        let token = CancellationToken::new();

        let waiter = {
            let controller = controller.clone();
            let token = token.clone();
            tokio::spawn(async move { controller.acquire(Some(&token)).await })
        };
        while controller.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        token.cancel();
        assert_eq!(waiter.await.unwrap().unwrap_err(), AdmissionError::Cancelled);
        assert_eq!(controller.waiting(), 0);

        drop(held);
        assert_eq!(controller.in_flight(), 0);
        assert!(controller.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_already_cancelled_token_fails_fast() {
        let controller = AdmissionController::new(4);
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            controller.acquire(Some(&token)).await.unwrap_err(),
            AdmissionError::Cancelled
        );
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dropped_acquire_future_frees_its_place() {
        let controller = AdmissionController::new(1);
        let held = controller.acquire(None).await.unwrap();
        assert!(timeout(Duration::from_millis(20), controller.acquire(None))
            .await
            .is_err());
        assert_eq!(controller.waiting(), 0);
        drop(held);
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_raising_limit_admits_waiters() {
        let controller = AdmissionController::new(1);
        let _held = controller.acquire(None).await.unwrap();
        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.acquire(None).await.map(|_| ()) })
        };
        while controller.waiting() == 0 {
            tokio::task::yield_now().await;
        }
        controller.set_limit(2);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let controller = AdmissionController::new(2);
        let permit = controller.acquire(None).await.unwrap();
        let _other = controller.acquire(None).await.unwrap();
        permit.release();
        assert_eq!(controller.in_flight(), 1);
    }
}
