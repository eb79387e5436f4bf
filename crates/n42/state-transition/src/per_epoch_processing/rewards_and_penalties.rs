use crate::arith::SafeArith;
use crate::beacon_state::BeaconState;
use crate::cancel::CancelToken;
use crate::common::{decrease_balance, get_base_reward, increase_balance, SqrtTotalActiveBalance};
use crate::errors::EpochProcessingError as Error;
use crate::per_epoch_processing::validator_statuses::{
    AttesterFlags, TotalBalances, ValidatorStatus, ValidatorStatuses,
};
use crate::per_epoch_processing::Delta;
use crate::spec::{EthSpec, Spec};

/// Per-component balance changes for one validator.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct AttestationDelta {
    pub source_delta: Delta,
    pub target_delta: Delta,
    pub head_delta: Delta,
    pub inclusion_delay_delta: Delta,
    pub inactivity_penalty_delta: Delta,
}

impl AttestationDelta {
    /// Flatten into a single delta.
    pub fn flatten(self) -> Result<Delta, Error> {
        let Self {
            source_delta,
            target_delta,
            head_delta,
            inclusion_delay_delta,
            inactivity_penalty_delta,
        } = self;
        let mut result = Delta::default();
        for delta in [
            source_delta,
            target_delta,
            head_delta,
            inclusion_delay_delta,
            inactivity_penalty_delta,
        ] {
            result.combine(delta)?;
        }
        Ok(result)
    }
}

/// Apply attester and proposer rewards for the previous epoch.
pub fn process_rewards_and_penalties<E: EthSpec>(
    state: &mut BeaconState<E>,
    validator_statuses: &ValidatorStatuses,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<(), Error> {
    if state.current_epoch() == E::genesis_epoch() {
        return Ok(());
    }

    // Guard against an out-of-bounds during the validator balance update.
    if validator_statuses.statuses.len() != state.balances.len() ||
        validator_statuses.statuses.len() != state.validators.len()
    {
        return Err(Error::ValidatorStatusesInconsistent);
    }

    let finality_delay = state.get_finality_delay()?;
    let in_inactivity_leak = state.is_in_inactivity_leak(spec)?;
    let sqrt_total_active_balance = state.epoch_context()?.sqrt_total_active_balance();
    let inactivity_penalty_quotient =
        spec.inactivity_penalty_quotient_for_fork(state.fork_name(spec));

    let deltas = get_attestation_deltas(
        validator_statuses,
        finality_delay,
        in_inactivity_leak,
        sqrt_total_active_balance,
        inactivity_penalty_quotient,
        spec,
        cancel,
    )?;

    // Rewards may overflow and error, penalties saturate at zero.
    for (i, delta) in deltas.into_iter().enumerate() {
        let combined_delta = delta.flatten()?;
        increase_balance(state, i, combined_delta.rewards)?;
        decrease_balance(state, i, combined_delta.penalties)?;
    }

    Ok(())
}

/// Compute the reward and penalty deltas of every validator for the previous epoch.
pub fn get_attestation_deltas(
    validator_statuses: &ValidatorStatuses,
    finality_delay: u64,
    in_inactivity_leak: bool,
    sqrt_total_active_balance: SqrtTotalActiveBalance,
    inactivity_penalty_quotient: u64,
    spec: &Spec,
    cancel: &CancelToken,
) -> Result<Vec<AttestationDelta>, Error> {
    let mut deltas = vec![AttestationDelta::default(); validator_statuses.statuses.len()];
    let total_balances = &validator_statuses.total_balances;

    for (index, validator) in validator_statuses.statuses.iter().enumerate() {
        cancel.checkpoint(index)?;

        // Ineligible validators neither earn nor lose anything. Every unslashed source attester
        // was active and is therefore eligible, so proposer rewards are not skipped here.
        if !validator.is_eligible() {
            continue;
        }

        let base_reward = get_base_reward(
            validator.current_epoch_effective_balance,
            sqrt_total_active_balance,
            spec,
        )?;

        let (inclusion_delay_delta, proposer_delta) =
            get_inclusion_delay_delta(index, validator, base_reward, spec)?;
        let source_delta = get_attestation_component_delta(
            validator.is_unslashed_and(AttesterFlags::PREVIOUS_EPOCH_ATTESTER),
            total_balances.previous_epoch_attesters(),
            total_balances,
            base_reward,
            in_inactivity_leak,
            spec,
        )?;
        let target_delta = get_attestation_component_delta(
            validator.is_unslashed_and(AttesterFlags::PREVIOUS_EPOCH_TARGET_ATTESTER),
            total_balances.previous_epoch_target_attesters(),
            total_balances,
            base_reward,
            in_inactivity_leak,
            spec,
        )?;
        let head_delta = get_attestation_component_delta(
            validator.is_unslashed_and(AttesterFlags::PREVIOUS_EPOCH_HEAD_ATTESTER),
            total_balances.previous_epoch_head_attesters(),
            total_balances,
            base_reward,
            in_inactivity_leak,
            spec,
        )?;
        let inactivity_penalty_delta = get_inactivity_penalty_delta(
            validator,
            base_reward,
            finality_delay,
            in_inactivity_leak,
            inactivity_penalty_quotient,
            spec,
        )?;

        let delta = deltas.get_mut(index).ok_or(Error::DeltaOutOfBounds(index))?;
        delta.source_delta.combine(source_delta)?;
        delta.target_delta.combine(target_delta)?;
        delta.head_delta.combine(head_delta)?;
        delta.inclusion_delay_delta.combine(inclusion_delay_delta)?;
        delta.inactivity_penalty_delta.combine(inactivity_penalty_delta)?;

        if let Some((proposer_index, proposer_delta)) = proposer_delta {
            deltas
                .get_mut(proposer_index)
                .ok_or(Error::DeltaOutOfBounds(proposer_index))?
                .inclusion_delay_delta
                .combine(proposer_delta)?;
        }
    }

    Ok(deltas)
}

/// Reward or penalty for one of the source, target and head components.
pub fn get_attestation_component_delta(
    index_in_unslashed_attesting_indices: bool,
    attesting_balance: u64,
    total_balances: &TotalBalances,
    base_reward: u64,
    in_inactivity_leak: bool,
    spec: &Spec,
) -> Result<Delta, Error> {
    let mut delta = Delta::default();

    let total_balance = total_balances.current_epoch();

    if index_in_unslashed_attesting_indices {
        if in_inactivity_leak {
            // The full base reward is handed out and then cancelled by the inactivity penalty,
            // leaving optimal participants neutral during a leak.
            delta.reward(base_reward)?;
        } else {
            let reward_numerator = base_reward
                .safe_mul(attesting_balance.safe_div(spec.effective_balance_increment)?)?;
            delta.reward(
                reward_numerator.safe_div(total_balance.safe_div(spec.effective_balance_increment)?)?,
            )?;
        }
    } else {
        delta.penalize(base_reward)?;
    }

    Ok(delta)
}

fn get_inclusion_delay_delta(
    index: usize,
    validator: &ValidatorStatus,
    base_reward: u64,
    spec: &Spec,
) -> Result<(Delta, Option<(usize, Delta)>), Error> {
    if !validator.is_unslashed_and(AttesterFlags::PREVIOUS_EPOCH_ATTESTER) {
        return Ok((Delta::default(), None));
    }

    let mut delta = Delta::default();
    let mut proposer_delta = Delta::default();

    let inclusion_info = validator.inclusion_info.ok_or(Error::MissingInclusionInfo(index))?;

    let proposer_reward = get_proposer_reward(base_reward, spec)?;
    proposer_delta.reward(proposer_reward)?;

    let max_attester_reward = base_reward.safe_sub(proposer_reward)?;
    delta.reward(max_attester_reward.safe_div(inclusion_info.delay)?)?;

    Ok((delta, Some((inclusion_info.proposer_index, proposer_delta))))
}

fn get_inactivity_penalty_delta(
    validator: &ValidatorStatus,
    base_reward: u64,
    finality_delay: u64,
    in_inactivity_leak: bool,
    inactivity_penalty_quotient: u64,
    spec: &Spec,
) -> Result<Delta, Error> {
    let mut delta = Delta::default();

    if in_inactivity_leak {
        // Cancels every component reward of an optimal attester.
        delta.penalize(
            spec.base_rewards_per_epoch
                .safe_mul(base_reward)?
                .safe_sub(get_proposer_reward(base_reward, spec)?)?,
        )?;

        if !validator.is_unslashed_and(AttesterFlags::PREVIOUS_EPOCH_TARGET_ATTESTER) {
            delta.penalize(
                validator
                    .current_epoch_effective_balance
                    .safe_mul(finality_delay)?
                    .safe_div(inactivity_penalty_quotient)?,
            )?;
        }
    }

    Ok(delta)
}

/// Compute the reward awarded to a proposer for including an attestation from a validator.
///
/// The `base_reward` param should be the `base_reward` of the attesting validator.
fn get_proposer_reward(base_reward: u64, spec: &Spec) -> Result<u64, Error> {
    Ok(base_reward.safe_div(spec.proposer_reward_quotient)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::per_epoch_processing::validator_statuses::InclusionInfo;
    use crate::eth1_data::Eth1Data;
    use crate::{Epoch, MinimalEthSpec};

    const EB: u64 = 32_000_000_000;

    /// `n` validators at the maximum balance; all attest perfectly with the given delay and
    /// have their attestations included by validator `n - 1`.
    fn perfect_statuses(n: usize, delay: u64, spec: &Spec) -> ValidatorStatuses {
        let flags = AttesterFlags::ELIGIBLE |
            AttesterFlags::ACTIVE_IN_CURRENT_EPOCH |
            AttesterFlags::ACTIVE_IN_PREVIOUS_EPOCH |
            AttesterFlags::PREVIOUS_EPOCH_ATTESTER |
            AttesterFlags::PREVIOUS_EPOCH_TARGET_ATTESTER |
            AttesterFlags::PREVIOUS_EPOCH_HEAD_ATTESTER;
        let statuses = (0..n)
            .map(|_| ValidatorStatus {
                flags,
                current_epoch_effective_balance: EB,
                inclusion_info: Some(InclusionInfo { delay, proposer_index: n - 1 }),
            })
            .collect();

        let total = EB * n as u64;
        let mut total_balances = TotalBalances::new(spec);
        total_balances.current_epoch = total;
        total_balances.previous_epoch = total;
        total_balances.previous_epoch_attesters = total;
        total_balances.previous_epoch_target_attesters = total;
        total_balances.previous_epoch_head_attesters = total;

        ValidatorStatuses { statuses, total_balances }
    }

    /// A state whose previous epoch sits `finality_delay` epochs past the finalized checkpoint.
    fn state_with_finality_delay(finality_delay: u64, spec: &Spec) -> BeaconState<MinimalEthSpec> {
        let mut state = BeaconState::new(0, Eth1Data::default(), spec);
        let current_epoch = Epoch::new(finality_delay + 1);
        state.slot = current_epoch.start_slot(MinimalEthSpec::slots_per_epoch());
        state
    }

    fn deltas_for(statuses: &ValidatorStatuses, finality_delay: u64, spec: &Spec) -> Vec<AttestationDelta> {
        let state = state_with_finality_delay(finality_delay, spec);
        let sqrt = SqrtTotalActiveBalance::new(statuses.total_balances.current_epoch());
        get_attestation_deltas(
            statuses,
            state.get_finality_delay().unwrap(),
            state.is_in_inactivity_leak(spec).unwrap(),
            sqrt,
            spec.inactivity_penalty_quotient,
            spec,
            &CancelToken::default(),
        )
        .unwrap()
    }

    #[test]
    fn perfect_attester_earns_every_component() {
        let spec = Spec::minimal();
        let statuses = perfect_statuses(16, 1, &spec);
        let deltas = deltas_for(&statuses, 0, &spec);

        let sqrt = SqrtTotalActiveBalance::new(statuses.total_balances.current_epoch());
        let base = get_base_reward(EB, sqrt, &spec).unwrap();
        let proposer_share = base / spec.proposer_reward_quotient;

        let delta = deltas[0].clone().flatten().unwrap();
        assert_eq!(delta.penalties, 0);
        assert_eq!(delta.rewards, 3 * base + (base - proposer_share));

        // The includer collects one proposer share per attester, itself included.
        let proposer = deltas[15].clone().flatten().unwrap();
        assert_eq!(proposer.rewards, 3 * base + (base - proposer_share) + 16 * proposer_share);
    }

    #[test]
    fn inclusion_reward_shrinks_with_delay() {
        let spec = Spec::minimal();
        let statuses = perfect_statuses(16, 4, &spec);
        let deltas = deltas_for(&statuses, 0, &spec);

        let sqrt = SqrtTotalActiveBalance::new(statuses.total_balances.current_epoch());
        let base = get_base_reward(EB, sqrt, &spec).unwrap();
        let proposer_share = base / spec.proposer_reward_quotient;
        assert_eq!(deltas[0].inclusion_delay_delta.rewards, (base - proposer_share) / 4);
    }

    #[test]
    fn absent_validator_is_penalized_three_times() {
        let spec = Spec::minimal();
        let mut statuses = perfect_statuses(16, 1, &spec);
        statuses.statuses[3] = ValidatorStatus {
            flags: AttesterFlags::ELIGIBLE,
            current_epoch_effective_balance: EB,
            inclusion_info: None,
        };
        let deltas = deltas_for(&statuses, 0, &spec);

        let sqrt = SqrtTotalActiveBalance::new(statuses.total_balances.current_epoch());
        let base = get_base_reward(EB, sqrt, &spec).unwrap();
        let delta = deltas[3].clone().flatten().unwrap();
        assert_eq!(delta.rewards, 0);
        assert_eq!(delta.penalties, 3 * base);
    }

    #[test]
    fn leak_neutralizes_perfect_attesters_and_drains_absentees() {
        let spec = Spec::minimal();
        let mut statuses = perfect_statuses(16, 1, &spec);
        statuses.statuses[3] = ValidatorStatus {
            flags: AttesterFlags::ELIGIBLE,
            current_epoch_effective_balance: EB,
            inclusion_info: None,
        };
        let finality_delay = spec.min_epochs_to_inactivity_penalty + 2;
        let deltas = deltas_for(&statuses, finality_delay, &spec);

        let sqrt = SqrtTotalActiveBalance::new(statuses.total_balances.current_epoch());
        let base = get_base_reward(EB, sqrt, &spec).unwrap();
        let proposer_share = base / spec.proposer_reward_quotient;

        let perfect = deltas[0].clone().flatten().unwrap();
        assert_eq!(perfect.rewards, 3 * base + (base - proposer_share));
        assert_eq!(perfect.penalties, 4 * base - proposer_share);

        let absent = deltas[3].clone().flatten().unwrap();
        let leak = EB * finality_delay / spec.inactivity_penalty_quotient;
        assert_eq!(absent.penalties, 3 * base + 4 * base - proposer_share + leak);
    }

    #[test]
    fn leak_starts_once_delay_exceeds_threshold() {
        let spec = Spec::minimal();
        let statuses = perfect_statuses(16, 1, &spec);
        let threshold = spec.min_epochs_to_inactivity_penalty;

        let at_threshold = state_with_finality_delay(threshold, &spec);
        assert_eq!(at_threshold.get_finality_delay().unwrap(), threshold);
        assert!(!at_threshold.is_in_inactivity_leak(&spec).unwrap());
        let deltas = deltas_for(&statuses, threshold, &spec);
        assert_eq!(deltas[0].inactivity_penalty_delta, Delta::default());

        let past_threshold = state_with_finality_delay(threshold + 1, &spec);
        assert!(past_threshold.is_in_inactivity_leak(&spec).unwrap());
        let deltas = deltas_for(&statuses, threshold + 1, &spec);
        assert!(deltas[0].inactivity_penalty_delta.penalties > 0);
    }

    #[test]
    fn ineligible_validators_are_skipped() {
        let spec = Spec::minimal();
        let mut statuses = perfect_statuses(4, 1, &spec);
        statuses.statuses[0].flags.remove(AttesterFlags::ELIGIBLE);
        let deltas = deltas_for(&statuses, 0, &spec);
        assert_eq!(deltas[0], AttestationDelta::default());
    }
}
