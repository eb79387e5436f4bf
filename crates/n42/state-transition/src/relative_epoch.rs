use crate::arith::{ArithError, SafeArith};
use crate::slot_epoch::{Epoch, Slot};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    EpochTooLow { base: Epoch, other: Epoch },
    EpochTooHigh { base: Epoch, other: Epoch },
    ArithError(ArithError),
}

impl From<ArithError> for Error {
    fn from(e: ArithError) -> Self {
        Self::ArithError(e)
    }
}

/// Defines the epochs relative to some epoch. Most useful when referring to the committees prior
/// to and following some epoch.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RelativeEpoch {
    /// The prior epoch.
    Previous,
    /// The current epoch.
    Current,
    /// The next epoch.
    Next,
}

impl RelativeEpoch {
    /// Returns the `epoch` that `self` refers to, with respect to the `base` epoch.
    ///
    /// The previous epoch of genesis is genesis itself.
    pub fn into_epoch(self, base: Epoch) -> Epoch {
        match self {
            Self::Current => base,
            Self::Previous => base.saturating_sub(1u64),
            Self::Next => base.saturating_add(1u64),
        }
    }

    /// Converts the `other` epoch into a `RelativeEpoch`, with respect to `base`.
    ///
    /// ## Errors
    /// Returns an error when:
    /// - `EpochTooLow` when `other` is more than 1 prior to `base`.
    /// - `EpochTooHigh` when `other` is more than 1 after `base`.
    pub fn from_epoch(base: Epoch, other: Epoch) -> Result<Self, Error> {
        if other == base {
            Ok(Self::Current)
        } else if other.safe_add(1u64)? == base {
            Ok(Self::Previous)
        } else if other == base.safe_add(1u64)? {
            Ok(Self::Next)
        } else if other < base {
            Err(Error::EpochTooLow { base, other })
        } else {
            Err(Error::EpochTooHigh { base, other })
        }
    }

    /// Convenience function for `Self::from_epoch` where both slots are converted into epochs.
    pub fn from_slot(base: Slot, other: Slot, slots_per_epoch: u64) -> Result<Self, Error> {
        Self::from_epoch(base.epoch(slots_per_epoch), other.epoch(slots_per_epoch))
    }

    /// Index into the three cached committee slots.
    pub const fn index(self) -> usize {
        match self {
            Self::Previous => 0,
            Self::Current => 1,
            Self::Next => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_epoch() {
        let base = Epoch::new(10);
        assert_eq!(RelativeEpoch::from_epoch(base, Epoch::new(9)), Ok(RelativeEpoch::Previous));
        assert_eq!(RelativeEpoch::from_epoch(base, base), Ok(RelativeEpoch::Current));
        assert_eq!(RelativeEpoch::from_epoch(base, Epoch::new(11)), Ok(RelativeEpoch::Next));
        assert_eq!(
            RelativeEpoch::from_epoch(base, Epoch::new(8)),
            Err(Error::EpochTooLow { base, other: Epoch::new(8) })
        );
        assert_eq!(
            RelativeEpoch::from_epoch(base, Epoch::new(12)),
            Err(Error::EpochTooHigh { base, other: Epoch::new(12) })
        );
    }

    #[test]
    fn previous_of_genesis_is_genesis() {
        assert_eq!(RelativeEpoch::Previous.into_epoch(Epoch::new(0)), Epoch::new(0));
        assert_eq!(RelativeEpoch::from_epoch(Epoch::new(0), Epoch::new(0)), Ok(RelativeEpoch::Current));
    }

    #[test]
    fn from_slot() {
        let base = Slot::new(16);
        assert_eq!(RelativeEpoch::from_slot(base, Slot::new(15), 8), Ok(RelativeEpoch::Previous));
        assert_eq!(RelativeEpoch::from_slot(base, Slot::new(24), 8), Ok(RelativeEpoch::Next));
    }
}
