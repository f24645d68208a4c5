//! Mutation coordination: at most one live request per coalescing key.
//!
//! The coordinator owns the confirmed cart and the set of in-flight line
//! mutations. It performs no I/O. Callers follow a two-step protocol:
//!
//! ```text
//! submit(mutation) ──► MutationRequest { ticket, mutation } ──► dispatch to backend
//!                                                                   │
//! resolve(ticket, outcome) ◄────────────────────────────────────────┘
//! ```
//!
//! Submitting a mutation whose key already has a request in flight replaces
//! that request. When the replaced request's response eventually arrives its
//! ticket no longer matches and the result is discarded, however it turned
//! out. Requests under different keys never interact.
//!
//! Snapshots are ordered by the backend's `updatedAt`, which only has
//! one-second resolution. When two different snapshots share a timestamp the
//! coordinator keeps whichever does not bring back a line whose removal it
//! has already confirmed, and asks for a fresh read once it is idle.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::line::Cart;
use super::mutation::{CartMutation, CoalescingKey, MutationKind};
use super::projector::{DisplayCart, project};
use crate::types::LineId;

/// Handle tying a backend response to the request that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    key: CoalescingKey,
    seq: u64,
}

impl Ticket {
    /// The coalescing key the request was issued under.
    #[must_use]
    pub const fn key(&self) -> &CoalescingKey {
        &self.key
    }

    /// Submission sequence number, unique per coordinator.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }
}

/// A submitted mutation awaiting its backend outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRequest {
    pub ticket: Ticket,
    pub mutation: CartMutation,
}

/// Category of a failed mutation. Recovery is identical for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Transport,
}

/// Why a mutation did not land.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MutationFailure {
    /// The backend rejected the request (e.g. not enough inventory).
    #[error("{}", .0.join("; "))]
    Validation(Vec<String>),
    /// The backend could not be reached or answered garbage.
    #[error("{0}")]
    Transport(String),
}

impl MutationFailure {
    /// The failure category.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::Transport(_) => FailureKind::Transport,
        }
    }

    /// Message suitable for showing next to the affected line.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(messages) if !messages.is_empty() => messages.join(" "),
            Self::Validation(_) => "This change could not be applied.".to_string(),
            Self::Transport(_) => {
                "We couldn't reach the store. Please try again.".to_string()
            }
        }
    }
}

/// What happened when a response was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The response became the confirmed cart.
    Applied,
    /// The response was current but older than confirmed state, so only the
    /// overlay was dropped.
    Outdated,
    /// A newer request owns the key; the response was discarded.
    Superseded,
    /// A removal for lines that are already gone; nothing to do.
    NoOp,
    /// The mutation failed and its overlay was rolled back.
    RolledBack(MutationFailure),
}

#[derive(Debug, Clone)]
struct RecordedFailure {
    line_ids: Vec<LineId>,
    failure: MutationFailure,
}

/// Owner of confirmed cart state and in-flight line mutations.
#[derive(Debug, Clone)]
pub struct MutationCoordinator {
    confirmed: Cart,
    in_flight: BTreeMap<CoalescingKey, MutationRequest>,
    failures: BTreeMap<CoalescingKey, RecordedFailure>,
    /// Lines the backend confirmed as removed since the last full read.
    removed: BTreeSet<LineId>,
    next_seq: u64,
    needs_reconcile: bool,
}

impl MutationCoordinator {
    /// Start coordinating mutations against a confirmed cart.
    #[must_use]
    pub const fn new(confirmed: Cart) -> Self {
        Self {
            confirmed,
            in_flight: BTreeMap::new(),
            failures: BTreeMap::new(),
            removed: BTreeSet::new(),
            next_seq: 0,
            needs_reconcile: false,
        }
    }

    /// The last cart acknowledged by the backend.
    #[must_use]
    pub const fn confirmed(&self) -> &Cart {
        &self.confirmed
    }

    /// Register a mutation, superseding any in-flight request with its key.
    ///
    /// Any failure previously recorded under the same key is cleared, since
    /// the user has re-issued the action.
    pub fn submit(&mut self, mutation: CartMutation) -> MutationRequest {
        self.next_seq += 1;
        let key = mutation.coalescing_key();
        let request = MutationRequest {
            ticket: Ticket {
                key: key.clone(),
                seq: self.next_seq,
            },
            mutation,
        };
        self.failures.remove(&key);
        self.in_flight.insert(key, request.clone());
        request
    }

    /// Whether `ticket` still identifies the live request for its key.
    #[must_use]
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.in_flight
            .get(&ticket.key)
            .is_some_and(|live| live.ticket.seq == ticket.seq)
    }

    /// Apply the backend outcome of a previously submitted request.
    pub fn resolve(&mut self, ticket: &Ticket, outcome: Result<Cart, MutationFailure>) -> Resolution {
        if !self.is_current(ticket) {
            // The discarded request may still have landed server-side after
            // the one we kept.
            if let Ok(cart) = &outcome
                && self.may_postdate_confirmed(cart)
            {
                self.needs_reconcile = true;
            }
            return Resolution::Superseded;
        }

        let Some(request) = self.in_flight.remove(&ticket.key) else {
            return Resolution::Superseded;
        };

        if request.mutation.kind() == MutationKind::Remove
            && request
                .mutation
                .line_ids()
                .into_iter()
                .all(|id| !self.confirmed.contains(id))
        {
            if let Ok(cart) = &outcome
                && self.may_postdate_confirmed(cart)
            {
                self.needs_reconcile = true;
            }
            return Resolution::NoOp;
        }

        match outcome {
            Ok(cart) => {
                if request.mutation.kind() == MutationKind::Remove {
                    self.removed.extend(
                        request
                            .mutation
                            .line_ids()
                            .into_iter()
                            .filter(|id| !cart.contains(id))
                            .cloned(),
                    );
                }
                self.accept_snapshot(cart)
            }
            Err(failure) => {
                self.failures.insert(
                    ticket.key.clone(),
                    RecordedFailure {
                        line_ids: request.mutation.line_ids().into_iter().cloned().collect(),
                        failure: failure.clone(),
                    },
                );
                Resolution::RolledBack(failure)
            }
        }
    }

    /// Apply an authoritative cart returned outside the keyed protocol, such
    /// as the result of adding a new line or changing discount codes.
    pub fn apply_snapshot(&mut self, cart: Cart) -> Resolution {
        self.accept_snapshot(cart)
    }

    /// Replace confirmed state with a freshly fetched cart and clear the
    /// reconcile flag.
    pub fn reconcile(&mut self, cart: Cart) {
        self.confirmed = cart;
        self.removed.clear();
        self.needs_reconcile = false;
    }

    /// Whether a discarded response may have left client and server apart.
    #[must_use]
    pub const fn needs_reconcile(&self) -> bool {
        self.needs_reconcile
    }

    /// Whether no request is in flight.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Live requests in submission order.
    #[must_use]
    pub fn in_flight(&self) -> Vec<&MutationRequest> {
        let mut requests: Vec<_> = self.in_flight.values().collect();
        requests.sort_by_key(|request| request.ticket.seq);
        requests
    }

    /// Failure recorded for a line, if its last request was rolled back.
    #[must_use]
    pub fn failure_for(&self, line_id: &LineId) -> Option<&MutationFailure> {
        self.failures
            .values()
            .find(|recorded| recorded.line_ids.contains(line_id))
            .map(|recorded| &recorded.failure)
    }

    /// Forget a recorded failure, e.g. once the user has seen it.
    pub fn dismiss_failure(&mut self, key: &CoalescingKey) {
        self.failures.remove(key);
    }

    /// The cart as it should be rendered right now.
    #[must_use]
    pub fn display(&self) -> DisplayCart {
        let mut display = project(
            &self.confirmed,
            self.in_flight().into_iter().map(|request| &request.mutation),
        );
        for line in &mut display.lines {
            line.error = self.failure_for(&line.line.id).cloned();
        }
        display
    }

    fn accept_snapshot(&mut self, cart: Cart) -> Resolution {
        if cart.is_older_than(&self.confirmed) {
            return Resolution::Outdated;
        }
        if cart.is_concurrent_with(&self.confirmed) {
            self.needs_reconcile = true;
            if cart.lines.iter().any(|line| self.removed.contains(&line.id)) {
                return Resolution::Outdated;
            }
        }
        self.confirmed = cart;
        Resolution::Applied
    }

    /// Whether `cart` may have been written after confirmed state.
    fn may_postdate_confirmed(&self, cart: &Cart) -> bool {
        self.confirmed.is_older_than(cart) || cart.is_concurrent_with(&self.confirmed)
    }
}
