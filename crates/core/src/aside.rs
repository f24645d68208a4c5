//! Side panel state.
//!
//! At most one aside (mobile menu, cart drawer, search) is open at a time.
//! The value is passed explicitly to whatever renders the layout; the only
//! way to change it is through [`AsideState::open`], [`AsideState::close`]
//! and [`AsideState::toggle`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error parsing a panel name from a route or form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown aside panel: {0}")]
pub struct UnknownPanel(pub String);

/// A panel that can slide in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsidePanel {
    Mobile,
    Cart,
    Search,
}

impl AsidePanel {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Cart => "cart",
            Self::Search => "search",
        }
    }
}

impl fmt::Display for AsidePanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AsidePanel {
    type Err = UnknownPanel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mobile" => Ok(Self::Mobile),
            "cart" => Ok(Self::Cart),
            "search" => Ok(Self::Search),
            other => Err(UnknownPanel(other.to_string())),
        }
    }
}

/// Which aside, if any, is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsideState {
    #[default]
    Closed,
    Open(AsidePanel),
}

impl AsideState {
    /// Open `panel`, replacing whatever was open.
    #[must_use]
    pub const fn open(self, panel: AsidePanel) -> Self {
        Self::Open(panel)
    }

    /// Close any open panel.
    #[must_use]
    pub const fn close(self) -> Self {
        Self::Closed
    }

    /// Close `panel` if it is open, otherwise open it.
    #[must_use]
    pub fn toggle(self, panel: AsidePanel) -> Self {
        if self.is_open(panel) {
            Self::Closed
        } else {
            Self::Open(panel)
        }
    }

    /// Whether `panel` is the open one.
    #[must_use]
    pub fn is_open(&self, panel: AsidePanel) -> bool {
        *self == Self::Open(panel)
    }

    /// The open panel, if any.
    #[must_use]
    pub const fn panel(&self) -> Option<AsidePanel> {
        match self {
            Self::Closed => None,
            Self::Open(panel) => Some(*panel),
        }
    }

    /// Whether the header should react to page scrolling. Scrolling is
    /// ignored while a panel covers the page.
    #[must_use]
    pub const fn tracks_scroll(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Name used in markup: `closed` or the panel name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open(panel) => panel.as_str(),
        }
    }
}
