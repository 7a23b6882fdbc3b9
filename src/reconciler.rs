//! Optimistic like/repost with confirmation or rollback.
//!
//! Each (article, action kind) pair moves through
//! `Idle -> Pending -> Confirmed | RolledBack`. While pending, a second
//! submission for the same pair is rejected rather than queued.
//!
//! The flag flip happens in [`ActionReconciler::begin`], before any I/O, so
//! every timeline showing the article sees it immediately. The adapter call
//! runs on an [`ActionTicket`] that borrows nothing from the store, and
//! [`ActionReconciler::settle`] writes the result back.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::article::{ActionKind, ArticleId};
use crate::error::ActionError;
use crate::service::{ActionRequest, ServiceRegistry};
use crate::store::ArticleStore;

/// How many settled (article, kind) phases are remembered by default.
pub const DEFAULT_SETTLED_HISTORY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionPhase {
    #[default]
    Idle,
    Pending,
    Confirmed,
    RolledBack,
}

/// An action whose optimistic flip has been applied and whose adapter call
/// is still outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTicket {
    article: ArticleId,
    kind: ActionKind,
    value: bool,
    seq: u64,
}

impl ActionTicket {
    /// The article acted on. For a repost this is the reposted article.
    pub fn article(&self) -> &ArticleId {
        &self.article
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// The flag value the action sets (`false` for unlike / un-repost).
    pub fn value(&self) -> bool {
        self.value
    }

    pub fn request(&self) -> ActionRequest {
        ActionRequest {
            kind: self.kind,
            article: self.article.clone(),
            undo: !self.value,
            params: BTreeMap::new(),
        }
    }

    /// Run the adapter call for this action.
    pub async fn perform(&self, services: &ServiceRegistry) -> Result<(), ActionError> {
        let adapter = services
            .get(&self.article.service)
            .ok_or_else(|| ActionError::UnknownService(self.article.service.clone()))?;
        adapter.perform_action(&self.request()).await
    }
}

/// How an action settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Confirmed {
        article: ArticleId,
        kind: ActionKind,
        value: bool,
    },
    RolledBack {
        article: ArticleId,
        kind: ActionKind,
        error: ActionError,
    },
    /// The ticket was not the one in flight for its pair.
    Discarded,
}

type ActionKey = (ArticleId, ActionKind);

/// Tracks in-flight actions and the outcome of recent ones.
///
/// Only the most recently settled pairs keep their `Confirmed` or
/// `RolledBack` phase; older ones report `Idle` again. The article's flags
/// are the lasting record.
#[derive(Debug)]
pub struct ActionReconciler {
    next_seq: u64,
    in_flight: HashMap<ActionKey, u64>,
    settled: HashMap<ActionKey, ActionPhase>,
    settled_order: VecDeque<ActionKey>,
    history: usize,
}

impl Default for ActionReconciler {
    fn default() -> Self {
        ActionReconciler::with_history(DEFAULT_SETTLED_HISTORY)
    }
}

impl ActionReconciler {
    pub fn new() -> Self {
        ActionReconciler::default()
    }

    /// A reconciler remembering at most `history` settled phases.
    pub fn with_history(history: usize) -> Self {
        ActionReconciler {
            next_seq: 0,
            in_flight: HashMap::new(),
            settled: HashMap::new(),
            settled_order: VecDeque::new(),
            history,
        }
    }

    fn remember(&mut self, key: ActionKey, phase: ActionPhase) {
        if self.settled.insert(key.clone(), phase).is_some() {
            self.settled_order.retain(|known| known != &key);
        }
        self.settled_order.push_back(key);
        while self.settled_order.len() > self.history {
            if let Some(oldest) = self.settled_order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
    }

    pub fn phase(&self, article: &ArticleId, kind: ActionKind) -> ActionPhase {
        let key = (article.clone(), kind);
        if self.in_flight.contains_key(&key) {
            return ActionPhase::Pending;
        }
        self.settled.get(&key).copied().unwrap_or_default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Flip the flag optimistically and mark the action pending.
    ///
    /// The action toggles: liking a liked article unlikes it. Actions on a
    /// repost apply to the reposted article when it is known.
    pub fn begin(
        &mut self,
        store: &mut ArticleStore,
        article: &ArticleId,
        kind: ActionKind,
    ) -> Result<ActionTicket, ActionError> {
        let actual = store.actual_article(article).ok_or(ActionError::ArticleNotFound)?;
        let target = actual.id().clone();
        let value = !actual.flag(kind);

        let key = (target.clone(), kind);
        if self.in_flight.contains_key(&key) {
            log::debug!("{kind} on {target} already pending, rejecting");
            return Err(ActionError::AlreadyPending { kind });
        }
        store.set_action_pending(&target, kind, value)?;

        self.next_seq += 1;
        self.in_flight.insert(key, self.next_seq);
        log::debug!("{kind} on {target} pending (value {value})");

        Ok(ActionTicket {
            article: target,
            kind,
            value,
            seq: self.next_seq,
        })
    }

    /// Write the adapter's answer back to the store.
    pub fn settle(
        &mut self,
        store: &mut ArticleStore,
        ticket: ActionTicket,
        result: Result<(), ActionError>,
    ) -> ActionOutcome {
        let key = (ticket.article.clone(), ticket.kind);
        if self.in_flight.get(&key) != Some(&ticket.seq) {
            log::debug!(
                "discarding settlement #{} of {} on {}",
                ticket.seq,
                ticket.kind,
                ticket.article
            );
            return ActionOutcome::Discarded;
        }
        self.in_flight.remove(&key);

        match result {
            Ok(()) => {
                if let Err(e) = store.confirm_action(&ticket.article, ticket.kind, ticket.value) {
                    log::error!("confirming {} on {}: {e}", ticket.kind, ticket.article);
                }
                self.remember(key, ActionPhase::Confirmed);
                ActionOutcome::Confirmed {
                    article: ticket.article,
                    kind: ticket.kind,
                    value: ticket.value,
                }
            }
            Err(error) => {
                log::warn!("{} on {} failed, rolling back: {error}", ticket.kind, ticket.article);
                if let Err(e) = store.rollback_action(&ticket.article, ticket.kind) {
                    log::error!("rolling back {} on {}: {e}", ticket.kind, ticket.article);
                }
                self.remember(key, ActionPhase::RolledBack);
                ActionOutcome::RolledBack {
                    article: ticket.article,
                    kind: ticket.kind,
                    error,
                }
            }
        }
    }
}
