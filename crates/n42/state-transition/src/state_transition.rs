//! The produced interface: advance a state through empty slots, or apply a signed block.
//!
//! Both entry points are atomic. Work happens on a copy of the state which replaces the caller's
//! state only once every stage has succeeded.

use crate::beacon_block::SignedBeaconBlock;
use crate::beacon_state::{BeaconState, Error as BeaconStateError};
use crate::cancel::CancelToken;
use crate::crypto::{SignatureVerifier, VerifySignatures};
use crate::errors::EpochProcessingError;
use crate::per_block_processing::errors::BlockProcessingError;
use crate::per_block_processing::per_block_processing;
use crate::per_block_processing::signature_sets::Error as SignatureSetError;
use crate::per_epoch_processing::EpochProcessingSummary;
use crate::per_slot_processing::{per_slot_processing, Error as SlotProcessingError};
use crate::slot_epoch::Slot;
use crate::spec::{EthSpec, Spec};
use crate::Hash256;
use tracing::debug;

/// Failure classes a caller can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Out-of-range arguments, mismatched lengths or overflowing values.
    MalformedInput,
    /// The block or one of its operations breaks a protocol rule.
    RuleViolation,
    /// The state cannot support the transition, e.g. it has no active validators.
    Precondition,
    /// The caller cancelled the computation.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StateTransitionError {
    #[error("slot processing failed: {0:?}")]
    SlotProcessing(SlotProcessingError),
    #[error("block processing failed: {0:?}")]
    BlockProcessing(BlockProcessingError),
    #[error("target slot {target} precedes state slot {state}")]
    SlotInPast { state: Slot, target: Slot },
    #[error("block state root {block} does not match computed root {computed}")]
    StateRootMismatch { block: Hash256, computed: Hash256 },
    #[error("state transition cancelled")]
    Cancelled,
}

impl From<SlotProcessingError> for StateTransitionError {
    fn from(e: SlotProcessingError) -> Self {
        match e {
            SlotProcessingError::Cancelled => Self::Cancelled,
            e => Self::SlotProcessing(e),
        }
    }
}

impl From<BlockProcessingError> for StateTransitionError {
    fn from(e: BlockProcessingError) -> Self {
        match e {
            BlockProcessingError::Cancelled => Self::Cancelled,
            e => Self::BlockProcessing(e),
        }
    }
}

impl StateTransitionError {
    /// Classify the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Cancelled,
            Self::SlotInPast { .. } => ErrorKind::MalformedInput,
            Self::StateRootMismatch { .. } => ErrorKind::RuleViolation,
            Self::SlotProcessing(e) => slot_error_kind(e),
            Self::BlockProcessing(e) => block_error_kind(e),
        }
    }
}

fn beacon_state_error_kind(e: &BeaconStateError) -> ErrorKind {
    match e {
        BeaconStateError::Cancelled => ErrorKind::Cancelled,
        BeaconStateError::InsufficientValidators |
        BeaconStateError::UnableToDetermineProducer |
        BeaconStateError::EpochContextUninitialized |
        BeaconStateError::EpochContextIncorrectEpoch { .. } |
        BeaconStateError::CommitteeCacheUninitialized(_) |
        BeaconStateError::ExitCacheUninitialized |
        BeaconStateError::PubkeyCacheInconsistent { .. } |
        BeaconStateError::SyncCommitteeNotKnown { .. } => ErrorKind::Precondition,
        _ => ErrorKind::MalformedInput,
    }
}

fn epoch_error_kind(e: &EpochProcessingError) -> ErrorKind {
    match e {
        EpochProcessingError::Cancelled => ErrorKind::Cancelled,
        EpochProcessingError::BeaconStateError(e) => beacon_state_error_kind(e),
        EpochProcessingError::ValidatorStatusesInconsistent |
        EpochProcessingError::MissingInclusionInfo(_) => ErrorKind::Precondition,
        _ => ErrorKind::MalformedInput,
    }
}

fn slot_error_kind(e: &SlotProcessingError) -> ErrorKind {
    match e {
        SlotProcessingError::Cancelled => ErrorKind::Cancelled,
        SlotProcessingError::BeaconStateError(e) => beacon_state_error_kind(e),
        SlotProcessingError::EpochProcessingError(e) => epoch_error_kind(e),
        SlotProcessingError::ArithError(_) => ErrorKind::MalformedInput,
    }
}

fn block_error_kind(e: &BlockProcessingError) -> ErrorKind {
    match e {
        BlockProcessingError::Cancelled => ErrorKind::Cancelled,
        BlockProcessingError::BeaconStateError(e) => beacon_state_error_kind(e),
        BlockProcessingError::SignatureSetError(SignatureSetError::ValidatorUnknown(_)) |
        BlockProcessingError::SszTypesError(_) |
        BlockProcessingError::ArithError(_) => ErrorKind::MalformedInput,
        _ => ErrorKind::RuleViolation,
    }
}

/// Run per-slot processing until `state.slot == target_slot`, in place.
///
/// Returns the summaries of every epoch closed on the way.
fn process_slots<E: EthSpec>(
    state: &mut BeaconState<E>,
    target_slot: Slot,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<Vec<EpochProcessingSummary>, StateTransitionError> {
    if target_slot < state.slot {
        return Err(StateTransitionError::SlotInPast { state: state.slot, target: target_slot });
    }

    let mut summaries = vec![];
    while state.slot < target_slot {
        if let Some(summary) = per_slot_processing(state, None, spec, cancel)? {
            summaries.push(summary);
        }
    }
    Ok(summaries)
}

/// Advance `state` through empty slots up to `target_slot`.
///
/// On error `state` is left untouched.
pub fn advance_slots<E: EthSpec>(
    state: &mut BeaconState<E>,
    target_slot: Slot,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<Vec<EpochProcessingSummary>, StateTransitionError> {
    let mut working = state.clone();
    let summaries = process_slots(&mut working, target_slot, spec, cancel)?;
    *state = working;
    Ok(summaries)
}

/// Apply `signed_block` to `state`: process slots up to the block's slot, then the block.
///
/// When `verify_state_root` is set the resulting state must hash to the block's `state_root`.
/// On error `state` is left untouched.
pub fn apply_block<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &mut BeaconState<E>,
    signed_block: &SignedBeaconBlock<E>,
    verify_signatures: VerifySignatures,
    verify_state_root: bool,
    verifier: &V,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<Vec<EpochProcessingSummary>, StateTransitionError> {
    let mut working = state.clone();

    let summaries = process_slots(&mut working, signed_block.slot(), spec, cancel)?;
    per_block_processing(&mut working, signed_block, verify_signatures, verifier, spec, cancel)?;

    if verify_state_root {
        let computed = working.canonical_root();
        let block = signed_block.message.state_root;
        if computed != block {
            return Err(StateTransitionError::StateRootMismatch { block, computed });
        }
    }

    cancel.check().map_err(|_| StateTransitionError::Cancelled)?;
    *state = working;

    debug!(
        target: "state_transition::block",
        slot = %signed_block.slot(),
        block_root = %signed_block.canonical_root(),
        "Applied block"
    );

    Ok(summaries)
}
