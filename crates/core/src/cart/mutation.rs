//! Cart line mutations and their coalescing keys.
//!
//! Two kinds of request act on existing lines: setting quantities and
//! removing lines. An update can never carry a quantity below 1; reaching
//! zero always goes through [`CartMutation::Remove`].

use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::LineId;

/// Errors constructing a mutation from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The request names no lines.
    #[error("mutation must target at least one line")]
    NoLines,
    /// An update asked for a quantity below the minimum of 1.
    #[error("quantity for line {0} must be at least 1")]
    QuantityBelowMinimum(LineId),
    /// The same line appears twice in one update.
    #[error("line {0} appears more than once")]
    DuplicateLine(LineId),
}

/// Which kind of line mutation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Update,
    Remove,
}

impl MutationKind {
    /// Stable name used in coalescing keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic key grouping requests that supersede one another.
///
/// Built from the mutation kind and the sorted, de-duplicated set of affected
/// line IDs, e.g. `update:[L1]` or `remove:[L1,L2]`. Input order does not
/// matter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoalescingKey(String);

impl CoalescingKey {
    /// Derive the key for a mutation kind over a set of lines.
    #[must_use]
    pub fn new<'a>(kind: MutationKind, line_ids: impl IntoIterator<Item = &'a LineId>) -> Self {
        let ids: BTreeSet<&str> = line_ids.into_iter().map(LineId::as_str).collect();
        let joined = ids.into_iter().collect::<Vec<_>>().join(",");
        Self(format!("{kind}:[{joined}]"))
    }

    /// The key as a string, for passing to the transport layer verbatim.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoalescingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Target quantity for one line. Always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineQuantity {
    pub line_id: LineId,
    pub quantity: NonZeroU32,
}

/// A requested change to existing cart lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "lines")]
pub enum CartMutation {
    /// Set the quantity of each listed line.
    Update(Vec<LineQuantity>),
    /// Remove the listed lines.
    Remove(Vec<LineId>),
}

impl CartMutation {
    /// Build an update request.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::NoLines` for an empty request,
    /// `RequestError::QuantityBelowMinimum` if any target is 0, and
    /// `RequestError::DuplicateLine` if a line is listed twice.
    pub fn update(
        targets: impl IntoIterator<Item = (LineId, u32)>,
    ) -> Result<Self, RequestError> {
        let mut seen = BTreeSet::new();
        let mut lines = Vec::new();
        for (line_id, quantity) in targets {
            let Some(quantity) = NonZeroU32::new(quantity) else {
                return Err(RequestError::QuantityBelowMinimum(line_id));
            };
            if !seen.insert(line_id.clone()) {
                return Err(RequestError::DuplicateLine(line_id));
            }
            lines.push(LineQuantity { line_id, quantity });
        }
        if lines.is_empty() {
            return Err(RequestError::NoLines);
        }
        Ok(Self::Update(lines))
    }

    /// Build a removal request. Duplicate IDs are collapsed.
    ///
    /// # Errors
    ///
    /// Returns `RequestError::NoLines` if no line IDs are given.
    pub fn remove(line_ids: impl IntoIterator<Item = LineId>) -> Result<Self, RequestError> {
        let mut seen = BTreeSet::new();
        let ids: Vec<LineId> = line_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if ids.is_empty() {
            return Err(RequestError::NoLines);
        }
        Ok(Self::Remove(ids))
    }

    /// Set one line to an explicit quantity; 0 becomes a removal.
    #[must_use]
    pub fn set_quantity(line_id: LineId, quantity: u32) -> Self {
        match NonZeroU32::new(quantity) {
            Some(quantity) => Self::Update(vec![LineQuantity { line_id, quantity }]),
            None => Self::Remove(vec![line_id]),
        }
    }

    /// Move one line's quantity by `delta` from `current`.
    ///
    /// `current` should be the quantity the user is looking at (the projected
    /// one), so repeated clicks build on each other. Anything below 1 becomes
    /// a removal; large targets saturate at `u32::MAX`.
    #[must_use]
    pub fn adjust(line_id: LineId, current: u32, delta: i64) -> Self {
        let target = i64::from(current).saturating_add(delta);
        if target < 1 {
            return Self::Remove(vec![line_id]);
        }
        Self::set_quantity(line_id, u32::try_from(target).unwrap_or(u32::MAX))
    }

    /// The kind of this mutation.
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Update(_) => MutationKind::Update,
            Self::Remove(_) => MutationKind::Remove,
        }
    }

    /// Lines touched by this mutation, in request order.
    #[must_use]
    pub fn line_ids(&self) -> Vec<&LineId> {
        match self {
            Self::Update(lines) => lines.iter().map(|l| &l.line_id).collect(),
            Self::Remove(ids) => ids.iter().collect(),
        }
    }

    /// Whether this mutation touches the given line.
    #[must_use]
    pub fn touches(&self, line_id: &LineId) -> bool {
        self.line_ids().into_iter().any(|id| id == line_id)
    }

    /// Key shared by every mutation of the same kind over the same line set.
    #[must_use]
    pub fn coalescing_key(&self) -> CoalescingKey {
        CoalescingKey::new(self.kind(), self.line_ids())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn id(s: &str) -> LineId {
        LineId::new(s)
    }

    #[test]
    fn test_key_format() {
        let update = CartMutation::set_quantity(id("L1"), 5);
        assert_eq!(update.coalescing_key().as_str(), "update:[L1]");

        let remove = CartMutation::remove([id("L2"), id("L1")]).unwrap();
        assert_eq!(remove.coalescing_key().to_string(), "remove:[L1,L2]");
    }

    #[test]
    fn test_key_ignores_order_and_duplicates() {
        let a = CoalescingKey::new(MutationKind::Update, &[id("L3"), id("L1"), id("L2")]);
        let b = CoalescingKey::new(MutationKind::Update, &[id("L2"), id("L3"), id("L1"), id("L1")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_differs_by_kind_and_lines() {
        let update = CoalescingKey::new(MutationKind::Update, &[id("L1")]);
        let remove = CoalescingKey::new(MutationKind::Remove, &[id("L1")]);
        let other_line = CoalescingKey::new(MutationKind::Update, &[id("L2")]);
        assert_ne!(update, remove);
        assert_ne!(update, other_line);
    }

    #[test]
    fn test_update_rejects_zero_quantity() {
        let err = CartMutation::update([(id("L1"), 2), (id("L2"), 0)]).unwrap_err();
        assert_eq!(err, RequestError::QuantityBelowMinimum(id("L2")));
    }

    #[test]
    fn test_update_rejects_duplicates_and_empty() {
        assert_eq!(
            CartMutation::update([(id("L1"), 2), (id("L1"), 3)]),
            Err(RequestError::DuplicateLine(id("L1")))
        );
        assert_eq!(
            CartMutation::update(Vec::<(LineId, u32)>::new()),
            Err(RequestError::NoLines)
        );
        assert_eq!(
            CartMutation::remove(Vec::<LineId>::new()),
            Err(RequestError::NoLines)
        );
    }

    #[test]
    fn test_remove_collapses_duplicates() {
        let remove = CartMutation::remove([id("L1"), id("L1")]).unwrap();
        assert_eq!(remove, CartMutation::Remove(vec![id("L1")]));
    }

    #[test]
    fn test_decrement_from_one_removes() {
        let mutation = CartMutation::adjust(id("L1"), 1, -1);
        assert_eq!(mutation, CartMutation::Remove(vec![id("L1")]));
        assert_eq!(mutation.coalescing_key().as_str(), "remove:[L1]");
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        assert_eq!(
            CartMutation::set_quantity(id("L1"), 0).kind(),
            MutationKind::Remove
        );
    }

    #[test]
    fn test_adjust_builds_update() {
        let mutation = CartMutation::adjust(id("L1"), 2, 1);
        let CartMutation::Update(lines) = &mutation else {
            panic!("expected update, got {mutation:?}");
        };
        assert_eq!(lines.first().map(|l| l.quantity.get()), Some(3));
    }

    #[test]
    fn test_adjust_saturates() {
        let mutation = CartMutation::adjust(id("L1"), u32::MAX, 10);
        assert_eq!(
            mutation,
            CartMutation::Update(vec![LineQuantity {
                line_id: id("L1"),
                quantity: NonZeroU32::MAX,
            }])
        );
    }

    #[test]
    fn test_touches() {
        let mutation = CartMutation::update([(id("L1"), 2), (id("L2"), 3)]).unwrap();
        assert!(mutation.touches(&id("L2")));
        assert!(!mutation.touches(&id("L3")));
    }
}
