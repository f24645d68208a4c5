//! Optimistic projection of the cart for rendering.

use serde::Serialize;

use super::coordinator::MutationFailure;
use super::line::{AppliedGiftCard, Cart, CartLine, DiscountCode};
use super::mutation::CartMutation;
use crate::types::{CartId, Price};

/// A line as it should be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayLine {
    /// The confirmed line, with `quantity` replaced by any pending target.
    pub line: CartLine,
    /// True while an update for this line awaits confirmation.
    pub is_optimistic: bool,
    /// Failure of the last request touching this line, if it was rolled back.
    pub error: Option<MutationFailure>,
}

/// The cart as it should be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayCart {
    pub id: CartId,
    pub checkout_url: String,
    pub lines: Vec<DisplayLine>,
    /// Sum of displayed line quantities.
    pub total_quantity: u32,
    /// Confirmed subtotal. Costs are only ever computed by the backend.
    pub subtotal: Price,
    /// Whether any line shows a value the backend has not confirmed.
    pub has_pending: bool,
    pub discount_codes: Vec<DiscountCode>,
    pub applied_gift_cards: Vec<AppliedGiftCard>,
}

impl DisplayCart {
    /// Displayed lines as plain cart lines.
    #[must_use]
    pub fn cart_lines(&self) -> Vec<CartLine> {
        self.lines.iter().map(|l| l.line.clone()).collect()
    }
}

/// Overlay in-flight mutations on the confirmed cart.
///
/// `in_flight` must be in submission order; where two pending updates touch
/// the same line the later one is shown. Lines with a pending removal are
/// omitted. Pure: call it on every render.
pub fn project<'a>(
    confirmed: &Cart,
    in_flight: impl IntoIterator<Item = &'a CartMutation>,
) -> DisplayCart {
    let pending: Vec<&CartMutation> = in_flight.into_iter().collect();

    let lines: Vec<DisplayLine> = confirmed
        .lines
        .iter()
        .filter(|line| {
            !pending
                .iter()
                .any(|m| matches!(m, CartMutation::Remove(_)) && m.touches(&line.id))
        })
        .map(|line| {
            let target = pending.iter().rev().find_map(|m| match m {
                CartMutation::Update(targets) => targets
                    .iter()
                    .find(|t| t.line_id == line.id)
                    .map(|t| t.quantity.get()),
                CartMutation::Remove(_) => None,
            });
            let mut shown = line.clone();
            if let Some(quantity) = target {
                shown.quantity = quantity;
            }
            DisplayLine {
                line: shown,
                is_optimistic: target.is_some(),
                error: None,
            }
        })
        .collect();

    let total_quantity = lines
        .iter()
        .fold(0_u32, |sum, l| sum.saturating_add(l.line.quantity));
    let has_pending = lines.iter().any(|l| l.is_optimistic) || lines.len() != confirmed.lines.len();

    DisplayCart {
        id: confirmed.id.clone(),
        checkout_url: confirmed.checkout_url.clone(),
        lines,
        total_quantity,
        subtotal: confirmed.subtotal,
        has_pending,
        discount_codes: confirmed.discount_codes.clone(),
        applied_gift_cards: confirmed.applied_gift_cards.clone(),
    }
}
