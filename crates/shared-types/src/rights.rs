//! # Rights
//!
//! Rights gate which subscribers may observe an event. An event's visibility
//! is a [`Rights`] set; a subscriber holding every right in that set may see it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single right on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Right {
    RightApplicationInfo,
    RightApplicationSettingsBasic,
    RightApplicationDevicesRead,
    RightApplicationDevicesWrite,
    RightApplicationTrafficRead,
    RightApplicationAll,
    RightClientAll,
    RightGatewayInfo,
    RightGatewaySettingsBasic,
    RightGatewayStatusRead,
    RightGatewayLocationRead,
    RightGatewayTrafficRead,
    RightGatewayAll,
    RightOrganizationInfo,
    RightOrganizationSettingsMembers,
    RightOrganizationAll,
    RightUserInfo,
    RightUserSettingsBasic,
    RightUserAll,
}

impl fmt::Display for Right {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The serde name is the canonical wire and display form.
        match serde_json::to_value(self) {
            Ok(serde_json::Value::String(s)) => write!(f, "{}", s),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// An ordered, deduplicated set of rights.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rights(BTreeSet<Right>);

impl Rights {
    /// An empty set. As a visibility, it means the event is public.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn contains(&self, right: Right) -> bool {
        self.0.contains(&right)
    }

    /// Whether every right in `required` is also in `self`.
    #[must_use]
    pub fn includes_all(&self, required: &Rights) -> bool {
        required.0.is_subset(&self.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Right> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Right> for Rights {
    fn from_iter<I: IntoIterator<Item = Right>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Right> for Rights {
    fn from(right: Right) -> Self {
        std::iter::once(right).collect()
    }
}

impl<const N: usize> From<[Right; N]> for Rights {
    fn from(rights: [Right; N]) -> Self {
        rights.into_iter().collect()
    }
}
