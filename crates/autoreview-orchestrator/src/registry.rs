//! At most one review per `(project, item)`.
//!
//! A key is absent, waiting for CI, or running a process. Reservations are
//! made synchronously before any I/O, and every later transition must present
//! the reservation's ticket, so a run whose slot was cancelled (and possibly
//! re-reserved by a newer run) can never touch the newer slot.

use autoreview_core::types::ReviewKey;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use subprocess_runner::SubprocessHandle;
use tokio_util::sync::CancellationToken;

pub enum RegistrySlot {
    WaitingForCi { ticket: u64, token: CancellationToken },
    Running { ticket: u64, handle: SubprocessHandle },
}

impl RegistrySlot {
    fn ticket(&self) -> u64 {
        match self {
            RegistrySlot::WaitingForCi { ticket, .. } | RegistrySlot::Running { ticket, .. } => {
                *ticket
            }
        }
    }

    fn state(&self) -> SlotState {
        match self {
            RegistrySlot::WaitingForCi { .. } => SlotState::WaitingForCi,
            RegistrySlot::Running { .. } => SlotState::Running,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    WaitingForCi,
    Running,
}

/// Proof of ownership of a reserved slot.
#[derive(Debug, Clone)]
pub struct Reservation {
    key: ReviewKey,
    ticket: u64,
    token: CancellationToken,
}

impl Reservation {
    pub fn key(&self) -> &ReviewKey {
        &self.key
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Cancelled when the slot is cancelled while waiting for CI.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// What [`ReviewRegistry::cancel`] removed.
pub enum Cancelled {
    Waiting,
    Running(SubprocessHandle),
}

#[derive(Default)]
pub struct ReviewRegistry {
    slots: Mutex<HashMap<ReviewKey, RegistrySlot>>,
    next_ticket: AtomicU64,
}

impl ReviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<ReviewKey, RegistrySlot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve `key` in the waiting state. `None` if the key is occupied.
    pub fn try_reserve(&self, key: &ReviewKey) -> Option<Reservation> {
        let mut slots = self.slots();
        if slots.contains_key(key) {
            return None;
        }
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        slots.insert(
            key.clone(),
            RegistrySlot::WaitingForCi {
                ticket,
                token: token.clone(),
            },
        );
        Some(Reservation {
            key: key.clone(),
            ticket,
            token,
        })
    }

    /// Move a waiting slot to running. Fails when the reservation no longer
    /// owns the key or the slot is not waiting.
    pub fn promote(&self, reservation: &Reservation, handle: SubprocessHandle) -> bool {
        let mut slots = self.slots();
        match slots.get(&reservation.key) {
            Some(RegistrySlot::WaitingForCi { ticket, .. }) if *ticket == reservation.ticket => {
                slots.insert(
                    reservation.key.clone(),
                    RegistrySlot::Running {
                        ticket: reservation.ticket,
                        handle,
                    },
                );
                true
            }
            _ => false,
        }
    }

    /// Whether `reservation` still owns its key.
    pub fn owns(&self, reservation: &Reservation) -> bool {
        self.owns_ticket(&reservation.key, reservation.ticket)
    }

    pub fn owns_ticket(&self, key: &ReviewKey, ticket: u64) -> bool {
        self.slots()
            .get(key)
            .is_some_and(|slot| slot.ticket() == ticket)
    }

    /// Remove the slot if `reservation` still owns it.
    pub fn release(&self, reservation: &Reservation) -> bool {
        let mut slots = self.slots();
        if slots
            .get(&reservation.key)
            .is_some_and(|slot| slot.ticket() == reservation.ticket)
        {
            slots.remove(&reservation.key);
            true
        } else {
            false
        }
    }

    /// Remove `key` immediately. A waiting slot's token is cancelled; a running
    /// slot's process handle is returned for termination by the caller.
    pub fn cancel(&self, key: &ReviewKey) -> Option<Cancelled> {
        let slot = self.slots().remove(key)?;
        Some(match slot {
            RegistrySlot::WaitingForCi { token, .. } => {
                token.cancel();
                Cancelled::Waiting
            }
            RegistrySlot::Running { handle, .. } => Cancelled::Running(handle),
        })
    }

    pub fn state(&self, key: &ReviewKey) -> Option<SlotState> {
        self.slots().get(key).map(RegistrySlot::state)
    }

    /// Every occupied key, sorted.
    pub fn entries(&self) -> Vec<(ReviewKey, SlotState)> {
        let mut out: Vec<_> = self
            .slots()
            .iter()
            .map(|(k, slot)| (k.clone(), slot.state()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Remove every slot, cancelling waiting ones. Returns running handles.
    pub fn drain(&self) -> Vec<SubprocessHandle> {
        let drained: Vec<RegistrySlot> = self.slots().drain().map(|(_, slot)| slot).collect();
        drained
            .into_iter()
            .filter_map(|slot| match slot {
                RegistrySlot::WaitingForCi { token, .. } => {
                    token.cancel();
                    None
                }
                RegistrySlot::Running { handle, .. } => Some(handle),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(n: u64) -> ReviewKey {
        ReviewKey::new("app", n).unwrap()
    }

    #[test]
    fn second_reservation_is_rejected() {
        let reg = ReviewRegistry::new();
        let first = reg.try_reserve(&key(1)).unwrap();
        assert!(reg.try_reserve(&key(1)).is_none());
        assert!(reg.try_reserve(&key(2)).is_some());
        assert_eq!(reg.state(&key(1)), Some(SlotState::WaitingForCi));
        assert!(reg.release(&first));
        assert!(reg.try_reserve(&key(1)).is_some());
    }

    #[test]
    fn concurrent_reservations_admit_exactly_one() {
        let reg = Arc::new(ReviewRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.try_reserve(&key(7)).is_some())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn cancel_waiting_cancels_token_and_frees_key() {
        let reg = ReviewRegistry::new();
        let res = reg.try_reserve(&key(3)).unwrap();
        assert!(matches!(reg.cancel(&key(3)), Some(Cancelled::Waiting)));
        assert!(res.token().is_cancelled());
        assert_eq!(reg.state(&key(3)), None);
        assert!(reg.cancel(&key(3)).is_none());
    }

    #[test]
    fn stale_reservation_cannot_touch_new_occupant() {
        let reg = ReviewRegistry::new();
        let old = reg.try_reserve(&key(4)).unwrap();
        reg.cancel(&key(4));
        let new = reg.try_reserve(&key(4)).unwrap();
        assert_ne!(old.ticket(), new.ticket());

        assert!(!reg.owns(&old));
        assert!(!reg.release(&old));
        assert!(reg.owns(&new));
        assert_eq!(reg.state(&key(4)), Some(SlotState::WaitingForCi));
    }

    #[test]
    fn drain_cancels_waiting_slots() {
        let reg = ReviewRegistry::new();
        let a = reg.try_reserve(&key(1)).unwrap();
        let b = reg.try_reserve(&key(2)).unwrap();
        assert!(reg.drain().is_empty());
        assert!(a.token().is_cancelled() && b.token().is_cancelled());
        assert!(reg.entries().is_empty());
    }

    #[test]
    fn entries_are_sorted() {
        let reg = ReviewRegistry::new();
        reg.try_reserve(&key(9));
        reg.try_reserve(&key(2));
        let keys: Vec<u64> = reg.entries().iter().map(|(k, _)| k.item_number()).collect();
        assert_eq!(keys, vec![2, 9]);
    }
}
