use crate::arith::ArithError;
use crate::beacon_state::Error as BeaconStateError;
use crate::cancel::Cancelled;

#[derive(Debug, PartialEq, Clone)]
pub enum EpochProcessingError {
    /// The participation records do not line up with the registry.
    ValidatorStatusesInconsistent,
    DeltaOutOfBounds(usize),
    /// A previous-epoch attester has no inclusion record.
    ///
    /// (validator_index)
    MissingInclusionInfo(usize),
    BeaconStateError(BeaconStateError),
    SszTypesError(ssz_types::Error),
    ArithError(ArithError),
    InvalidJustificationBit(ssz::BitfieldError),
    Cancelled,
}

impl From<BeaconStateError> for EpochProcessingError {
    fn from(e: BeaconStateError) -> Self {
        match e {
            BeaconStateError::Cancelled => Self::Cancelled,
            e => Self::BeaconStateError(e),
        }
    }
}

impl From<ssz_types::Error> for EpochProcessingError {
    fn from(e: ssz_types::Error) -> Self {
        Self::SszTypesError(e)
    }
}

impl From<ArithError> for EpochProcessingError {
    fn from(e: ArithError) -> Self {
        Self::ArithError(e)
    }
}

impl From<Cancelled> for EpochProcessingError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}
