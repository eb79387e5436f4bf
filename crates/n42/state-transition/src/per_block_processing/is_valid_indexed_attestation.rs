use super::errors::{BlockOperationError, IndexedAttestationInvalid as Invalid};
use super::signature_sets::indexed_attestation_signature_set;
use crate::attestation::IndexedAttestation;
use crate::beacon_state::BeaconState;
use crate::crypto::{SignatureVerifier, VerifySignatures};
use crate::spec::{EthSpec, Spec};
use itertools::Itertools;

type Result<T> = std::result::Result<T, BlockOperationError<Invalid>>;

fn error(reason: Invalid) -> BlockOperationError<Invalid> {
    BlockOperationError::invalid(reason)
}

/// Verify an `IndexedAttestation`.
pub fn is_valid_indexed_attestation<E: EthSpec, V: SignatureVerifier + ?Sized>(
    state: &BeaconState<E>,
    indexed_attestation: &IndexedAttestation<E>,
    verify_signatures: VerifySignatures,
    verifier: &V,
    spec: &Spec,
) -> Result<()> {
    let indices = &indexed_attestation.attesting_indices;

    // Verify that indices aren't empty
    verify!(!indices.is_empty(), Invalid::IndicesEmpty);

    // Check that indices are sorted and unique
    indices.iter().tuple_windows().enumerate().try_for_each(|(i, (x, y))| {
        if x < y {
            Ok(())
        } else {
            Err(error(Invalid::BadValidatorIndicesOrdering(i)))
        }
    })?;

    if let Some(&unknown) = indices.iter().find(|&&i| i as usize >= state.validators.len()) {
        return Err(error(Invalid::UnknownValidator(unknown)));
    }

    if verify_signatures.is_true() {
        let signature_set =
            indexed_attestation_signature_set(state, indexed_attestation, verifier, spec)
                .map_err(|_| error(Invalid::SignatureAggregationFailed))?;
        verify!(signature_set.verify(verifier), Invalid::BadSignature);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation_data::AttestationData;
    use crate::crypto::SignatureBytes;
    use crate::test_utils::{genesis_state, AcceptAll, RejectAll};
    use crate::{MinimalEthSpec, VariableList};
    use assert_matches::assert_matches;

    type E = MinimalEthSpec;

    fn indexed(indices: Vec<u64>) -> IndexedAttestation<E> {
        IndexedAttestation {
            attesting_indices: VariableList::new(indices).unwrap(),
            data: AttestationData::default(),
            signature: SignatureBytes::empty(),
        }
    }

    #[test]
    fn indices_must_be_strictly_increasing() {
        let spec = Spec::minimal();
        let state = genesis_state::<E>(8, &spec);

        assert_matches!(
            is_valid_indexed_attestation(&state, &indexed(vec![]), VerifySignatures::False, &AcceptAll, &spec),
            Err(BlockOperationError::Invalid(Invalid::IndicesEmpty))
        );
        assert_matches!(
            is_valid_indexed_attestation(&state, &indexed(vec![1, 3, 3]), VerifySignatures::False, &AcceptAll, &spec),
            Err(BlockOperationError::Invalid(Invalid::BadValidatorIndicesOrdering(1)))
        );
        assert_matches!(
            is_valid_indexed_attestation(&state, &indexed(vec![2, 1]), VerifySignatures::False, &AcceptAll, &spec),
            Err(BlockOperationError::Invalid(Invalid::BadValidatorIndicesOrdering(0)))
        );
        assert!(is_valid_indexed_attestation(&state, &indexed(vec![0, 4, 7]), VerifySignatures::False, &AcceptAll, &spec)
            .is_ok());
    }

    #[test]
    fn unknown_validator_rejected() {
        let spec = Spec::minimal();
        let state = genesis_state::<E>(8, &spec);
        assert_matches!(
            is_valid_indexed_attestation(&state, &indexed(vec![2, 8]), VerifySignatures::False, &AcceptAll, &spec),
            Err(BlockOperationError::Invalid(Invalid::UnknownValidator(8)))
        );
    }

    #[test]
    fn signature_checked_only_when_requested() {
        let spec = Spec::minimal();
        let state = genesis_state::<E>(8, &spec);
        let attestation = indexed(vec![0, 1]);

        assert!(is_valid_indexed_attestation(&state, &attestation, VerifySignatures::False, &RejectAll, &spec).is_ok());
        assert_matches!(
            is_valid_indexed_attestation(&state, &attestation, VerifySignatures::True, &RejectAll, &spec),
            Err(BlockOperationError::Invalid(Invalid::BadSignature))
        );
        assert!(is_valid_indexed_attestation(&state, &attestation, VerifySignatures::True, &AcceptAll, &spec).is_ok());
    }
}
