use std::time::{Duration, Instant};

use mapplan_core::ids::{ActionId, EntityId};

/// One locally sent edit of one entity, waiting for its echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LastAction {
    pub action_id: ActionId,
    pub entity_id: EntityId,
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    last: LastAction,
    sent_at: Instant,
}

/// How an incoming remote action relates to what this client sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    /// Every entity of the action was sent by us under the same action id.
    Echo,
    /// Not (entirely) ours.
    Foreign,
}

/// Multiset of `{action_id, entity_id}` pairs for edits this client sent.
///
/// Every entry leaves exactly once: through an echo, an acknowledgement, a
/// failed execute, or expiry.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, action_id: ActionId, entity_ids: &[EntityId]) {
        self.record_at(action_id, entity_ids, Instant::now());
    }

    pub fn record_at(&mut self, action_id: ActionId, entity_ids: &[EntityId], sent_at: Instant) {
        self.entries.extend(entity_ids.iter().map(|&entity_id| LedgerEntry {
            last: LastAction {
                action_id,
                entity_id,
            },
            sent_at,
        }));
    }

    /// Classify a remote action and consume the entries it accounts for.
    ///
    /// An action is an echo when each of its entity ids has an entry with its
    /// action id; one entry per entity id is removed. Otherwise it is foreign,
    /// and entries carrying its action id are dropped as stale. Entries for
    /// the same entities under other action ids stay.
    pub fn reconcile(&mut self, action_id: ActionId, entity_ids: &[EntityId]) -> Match {
        let is_echo = !entity_ids.is_empty()
            && entity_ids.iter().all(|&entity_id| {
                self.position(LastAction {
                    action_id,
                    entity_id,
                })
                .is_some()
            });

        if is_echo {
            for &entity_id in entity_ids {
                self.remove(LastAction {
                    action_id,
                    entity_id,
                });
            }
            Match::Echo
        } else {
            self.entries.retain(|e| e.last.action_id != action_id);
            Match::Foreign
        }
    }

    /// Remove one matching entry. Returns whether one was present.
    pub fn remove(&mut self, last: LastAction) -> bool {
        match self.position(last) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove every entry of `action_id`. Returns how many were removed.
    pub fn remove_action(&mut self, action_id: ActionId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.last.action_id != action_id);
        before - self.entries.len()
    }

    /// Remove entries sent more than `ttl` before `now`.
    pub fn expire(&mut self, now: Instant, ttl: Duration) -> Vec<LastAction> {
        let mut expired = Vec::new();
        self.entries.retain(|e| {
            let keep = now.saturating_duration_since(e.sent_at) <= ttl;
            if !keep {
                expired.push(e.last);
            }
            keep
        });
        expired
    }

    pub fn contains(&self, last: LastAction) -> bool {
        self.position(last).is_some()
    }

    pub fn entries(&self) -> impl Iterator<Item = LastAction> + '_ {
        self.entries.iter().map(|e| e.last)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn position(&self, last: LastAction) -> Option<usize> {
        self.entries.iter().position(|e| e.last == last)
    }
}
