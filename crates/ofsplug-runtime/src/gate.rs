//! Lifecycle gate.
//!
//! A single slot holding the `open` that is waiting for the authenticated
//! client. While the slot is held the `open` handler does not run. The slot
//! is released by the matching token response or, at the latest, when its
//! deadline passes; there is no unbounded wait.

use ofsplug_core::{OpenMessage, PendingCall};
use std::time::Duration;
use tokio::time::Instant;

/// An `open` held back for a token, with the base URL the token is for.
#[derive(Debug)]
pub struct Waiting {
    pub call: PendingCall,
    pub base_url: String,
    pub open: OpenMessage,
}

struct Held {
    waiting: Waiting,
    deadline: Instant,
}

/// Gate between proxy acquisition and the `open` handler.
pub struct LifecycleGate {
    slot: Option<Held>,
    timeout: Duration,
}

impl LifecycleGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slot: None,
            timeout,
        }
    }

    /// Hold `open` until `call` is answered or the timeout elapses.
    ///
    /// `base_url` stays with this instance so the token is always paired
    /// with the backend it was requested for. A second acquire replaces the
    /// first; the superseded `open` is returned.
    pub fn acquire(
        &mut self,
        call: PendingCall,
        base_url: impl Into<String>,
        open: OpenMessage,
    ) -> Option<OpenMessage> {
        let deadline = Instant::now() + self.timeout;
        let waiting = Waiting {
            call,
            base_url: base_url.into(),
            open,
        };
        self.slot
            .replace(Held { waiting, deadline })
            .map(|held| held.waiting.open)
    }

    /// Release the slot if `call_id` answers the pending call.
    pub fn release(&mut self, call_id: Option<&str>) -> Option<Waiting> {
        if !self.slot.as_ref()?.waiting.call.matches(call_id) {
            return None;
        }
        self.slot.take().map(|held| held.waiting)
    }

    /// Release the slot if its deadline has passed.
    pub fn expire(&mut self, now: Instant) -> Option<Waiting> {
        if self.slot.as_ref()?.deadline > now {
            return None;
        }
        self.slot.take().map(|held| held.waiting)
    }

    /// Whether an `open` is waiting.
    pub fn is_held(&self) -> bool {
        self.slot.is_some()
    }

    /// The call the gate is waiting on.
    pub fn pending_call(&self) -> Option<&PendingCall> {
        self.slot.as_ref().map(|held| &held.waiting.call)
    }

    /// When the held `open` will be let through regardless.
    pub fn deadline(&self) -> Option<Instant> {
        self.slot.as_ref().map(|held| held.deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(entity: &str) -> OpenMessage {
        OpenMessage {
            entity: Some(entity.into()),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn release_requires_matching_id() {
        let mut gate = LifecycleGate::new(Duration::from_secs(5));
        let call = PendingCall::new("getAccessToken");
        let id = call.id().to_string();
        assert!(gate.acquire(call, "https://core.example", open("activity")).is_none());
        assert!(gate.is_held());

        assert!(gate.release(Some("wrong")).is_none());
        assert!(gate.release(None).is_none());
        assert!(gate.is_held());

        let released = gate.release(Some(&id)).unwrap();
        assert_eq!(released.call.id(), id);
        assert_eq!(released.base_url, "https://core.example");
        assert_eq!(released.open.entity.as_deref(), Some("activity"));
        assert!(!gate.is_held());
        assert!(gate.release(Some(&id)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_timeout() {
        let mut gate = LifecycleGate::new(Duration::from_secs(5));
        gate.acquire(PendingCall::new("getAccessToken"), "https://core.example", open("activity"));

        assert!(gate.expire(Instant::now()).is_none());
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(gate.expire(Instant::now()).is_some());
        assert!(gate.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_acquire_supersedes_first() {
        let mut gate = LifecycleGate::new(Duration::from_secs(5));
        let first = PendingCall::new("getAccessToken");
        let first_id = first.id().to_string();
        gate.acquire(first, "https://a.example", open("first"));

        let superseded = gate.acquire(
            PendingCall::new("getAccessToken"),
            "https://b.example",
            open("second"),
        );
        assert_eq!(superseded.unwrap().entity.as_deref(), Some("first"));
        assert!(gate.release(Some(&first_id)).is_none());
        assert_ne!(gate.pending_call().unwrap().id(), first_id);
        let current = gate.pending_call().unwrap().id().to_string();
        assert_eq!(gate.release(Some(&current)).unwrap().base_url, "https://b.example");
    }
}
