use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::feedback::RoutingError;
use crate::framework::NodeId;

/// A per-node freshness counter. Only the owner ever advances its even numbers,
/// neighbours reporting a broken link bump it by one.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Sequence {
    pub owner: NodeId,
    pub number: u32,
}

impl Sequence {
    pub fn new(owner: impl Into<NodeId>, number: u32) -> Self {
        Self {
            owner: owner.into(),
            number,
        }
    }

    /// Compares two sequences of the same owner
    ///
    /// # Examples
    ///
    /// ```
    /// use std::cmp::Ordering;
    /// use manet::seqno::Sequence;
    ///
    /// let old = Sequence::new("a", 2);
    /// let new = Sequence::new("a", 4);
    /// assert_eq!(old.compare(&new), Ok(Ordering::Less));
    /// assert!(old.compare(&Sequence::new("b", 2)).is_err());
    /// ```
    pub fn compare(&self, other: &Sequence) -> Result<Ordering, RoutingError> {
        if self.owner != other.owner {
            return Err(RoutingError::SequenceOwnerMismatch {
                left: self.owner.clone(),
                right: other.owner.clone(),
            });
        }
        Ok(self.number.cmp(&other.number))
    }

    pub fn increment_by(&mut self, amount: u32) {
        self.number = self.number.saturating_add(amount);
    }
}

impl PartialOrd for Sequence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other).ok()
    }
}

impl Display for Sequence {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.owner, self.number)
    }
}
