use n42_state_transition::{
    advance_slots,
    attestation::Attestation,
    attestation_data::AttestationData,
    initialize_genesis_state, BeaconBlock, BeaconState, BitList, CancelToken, Checkpoint, EthSpec,
    Hash256, MinimalEthSpec, PublicKeyBytes, SignatureBytes, SignatureVerifier, SignedBeaconBlock, Slot,
    Spec, VariableList,
};

pub type E = MinimalEthSpec;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Trusts every signature. Aggregation keeps the first key.
#[derive(Debug, Clone, Copy)]
pub struct TrustingVerifier;

impl SignatureVerifier for TrustingVerifier {
    fn verify(&self, _: &PublicKeyBytes, _: Hash256, _: &SignatureBytes, _: Hash256) -> bool {
        true
    }

    fn aggregate(&self, pubkeys: &[PublicKeyBytes]) -> Option<PublicKeyBytes> {
        pubkeys.first().copied()
    }
}

fn pubkey(index: usize) -> PublicKeyBytes {
    let mut bytes = [0u8; 48];
    bytes[..8].copy_from_slice(&(index as u64 + 1).to_be_bytes());
    bytes[47] = 0xaa;
    PublicKeyBytes::from_bytes(bytes)
}

pub fn genesis(validator_count: usize, spec: &Spec) -> BeaconState<E> {
    let validators =
        (0..validator_count).map(|i| (pubkey(i), Hash256::repeat_byte(1), spec.max_effective_balance));
    initialize_genesis_state(1_600_000_000, Hash256::repeat_byte(0x42), validators, spec)
        .expect("genesis state")
}

/// Builds a block for `slot` on top of `state`, carrying a full-participation attestation for
/// every committee of the previous slot.
pub fn build_block(state: &BeaconState<E>, slot: Slot, spec: &Spec) -> SignedBeaconBlock<E> {
    let mut advanced = state.clone();
    advance_slots(&mut advanced, slot, spec, &CancelToken::new()).expect("advance to block slot");

    let proposer_index = advanced.get_beacon_proposer_index(slot).expect("proposer") as u64;
    let parent_root = advanced.latest_block_header.canonical_root();

    let mut block = BeaconBlock::<E>::empty();
    block.slot = slot;
    block.proposer_index = proposer_index;
    block.parent_root = parent_root;
    block.body.eth1_data = advanced.eth1_data.clone();

    if slot.as_u64() > 0 {
        let attestations = full_attestations(&advanced, Slot::new(slot.as_u64() - 1));
        block.body.attestations = VariableList::new(attestations).expect("attestation limit");
    }

    SignedBeaconBlock { message: block, signature: SignatureBytes::empty() }
}

fn full_attestations(state: &BeaconState<E>, slot: Slot) -> Vec<Attestation<E>> {
    let target_epoch = slot.epoch(E::slots_per_epoch());
    let source = if target_epoch == state.current_epoch() {
        state.current_justified_checkpoint
    } else {
        state.previous_justified_checkpoint
    };
    let target = Checkpoint {
        epoch: target_epoch,
        root: *state.get_block_root_at_epoch(target_epoch).expect("target root"),
    };
    let beacon_block_root = *state.get_block_root(slot).expect("head root");

    state
        .get_beacon_committees_at_slot(slot)
        .expect("committees")
        .into_iter()
        .map(|committee| {
            let mut aggregation_bits =
                BitList::with_capacity(committee.committee.len()).expect("bitlist");
            for i in 0..committee.committee.len() {
                aggregation_bits.set(i, true).expect("bit in range");
            }
            Attestation {
                aggregation_bits,
                data: AttestationData {
                    slot,
                    index: committee.index,
                    beacon_block_root,
                    source,
                    target,
                },
                signature: SignatureBytes::empty(),
            }
        })
        .collect()
}
