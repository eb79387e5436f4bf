use crate::attestation::{Attestation, IndexedAttestation};
use crate::beacon_state::Error;
use crate::spec::EthSpec;
use crate::{BitList, VariableList};

/// Returns validator indices which participated in the attestation, sorted by increasing index.
pub fn get_attesting_indices<E: EthSpec>(
    committee: &[usize],
    bitlist: &BitList<E::MaxValidatorsPerCommittee>,
) -> Result<Vec<usize>, Error> {
    if bitlist.len() != committee.len() {
        return Err(Error::InvalidBitfield);
    }

    let mut indices = Vec::with_capacity(bitlist.num_set_bits());

    for (i, validator_index) in committee.iter().enumerate() {
        if let Ok(true) = bitlist.get(i) {
            indices.push(*validator_index)
        }
    }

    indices.sort_unstable();

    Ok(indices)
}

/// Convert `attestation` to (almost) indexed-verifiable form.
pub fn get_indexed_attestation<E: EthSpec>(
    committee: &[usize],
    attestation: &Attestation<E>,
) -> Result<IndexedAttestation<E>, Error> {
    let attesting_indices = get_attesting_indices::<E>(committee, &attestation.aggregation_bits)?;

    Ok(IndexedAttestation {
        attesting_indices: VariableList::new(
            attesting_indices.into_iter().map(|x| x as u64).collect(),
        )?,
        data: attestation.data.clone(),
        signature: attestation.signature,
    })
}
