use crate::arith::SafeArith;
use crate::beacon_state::Error as BeaconStateError;
use crate::slot_epoch::Epoch;
use crate::spec::Spec;
use crate::validator::Validator;
use std::cmp::Ordering;

/// Tracks the tail of the exit queue: the furthest exit epoch and how many validators leave then.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExitCache {
    /// True if the cache has been initialized.
    initialized: bool,
    /// Maximum `exit_epoch` of any validator.
    max_exit_epoch: Epoch,
    /// Number of validators known to be exiting at `max_exit_epoch`.
    max_exit_epoch_churn: u64,
}

impl ExitCache {
    /// Initialize a new cache for the given list of validators.
    pub fn new<'a, V>(validators: V, spec: &Spec) -> Result<Self, BeaconStateError>
    where
        V: IntoIterator<Item = &'a Validator>,
    {
        let mut exit_cache =
            Self { initialized: true, max_exit_epoch: Epoch::new(0), max_exit_epoch_churn: 0 };
        // Add all validators with a non-default exit epoch to the cache.
        validators
            .into_iter()
            .filter(|validator| validator.exit_epoch != spec.far_future_epoch)
            .try_for_each(|validator| exit_cache.record_validator_exit(validator.exit_epoch))?;
        Ok(exit_cache)
    }

    /// Check that the cache is initialized and return an error if it is not.
    pub fn check_initialized(&self) -> Result<(), BeaconStateError> {
        if self.initialized {
            Ok(())
        } else {
            Err(BeaconStateError::ExitCacheUninitialized)
        }
    }

    /// Record the exit epoch of a validator. Must be called only once per exiting validator.
    pub fn record_validator_exit(&mut self, exit_epoch: Epoch) -> Result<(), BeaconStateError> {
        self.check_initialized()?;
        match exit_epoch.cmp(&self.max_exit_epoch) {
            // Update churn for the current maximum epoch.
            Ordering::Equal => {
                self.max_exit_epoch_churn.safe_add_assign(1)?;
            }
            // Increase the max exit epoch, reset the churn to 1.
            Ordering::Greater => {
                self.max_exit_epoch = exit_epoch;
                self.max_exit_epoch_churn = 1;
            }
            // Older exit epochs are not relevant.
            Ordering::Less => (),
        }
        Ok(())
    }

    /// Get the largest exit epoch with a non-zero exit epoch count.
    pub fn max_epoch(&self) -> Result<Option<Epoch>, BeaconStateError> {
        self.check_initialized()?;
        Ok((self.max_exit_epoch_churn > 0).then_some(self.max_exit_epoch))
    }

    /// Get number of validators with the given exit epoch. (Return 0 for the default exit epoch.)
    pub fn get_churn_at(&self, exit_epoch: Epoch) -> Result<u64, BeaconStateError> {
        self.check_initialized()?;
        match exit_epoch.cmp(&self.max_exit_epoch) {
            // Epochs are equal, we know the churn exactly.
            Ordering::Equal => Ok(self.max_exit_epoch_churn),
            // If exiting at an epoch later than the cached epoch then the churn is 0. This is a
            // common case which happens when there are no exits for an epoch.
            Ordering::Greater => Ok(0),
            // Consensus code should never require the churn at an epoch prior to the cached epoch.
            Ordering::Less => Err(BeaconStateError::ExitCacheInvalidEpoch {
                max_exit_epoch: self.max_exit_epoch,
                request_epoch: exit_epoch,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn exiting_at(epoch: u64) -> Validator {
        Validator { exit_epoch: Epoch::new(epoch), ..Validator::default() }
    }

    #[test]
    fn uninitialized_cache_errors() {
        let cache = ExitCache::default();
        assert_matches!(cache.max_epoch(), Err(BeaconStateError::ExitCacheUninitialized));
    }

    #[test]
    fn tracks_tail_of_queue() {
        let spec = Spec::minimal();
        let validators =
            vec![exiting_at(5), exiting_at(7), exiting_at(7), Validator::default(), exiting_at(6)];
        let mut cache = ExitCache::new(&validators, &spec).unwrap();

        assert_eq!(cache.max_epoch().unwrap(), Some(Epoch::new(7)));
        assert_eq!(cache.get_churn_at(Epoch::new(7)).unwrap(), 2);
        assert_eq!(cache.get_churn_at(Epoch::new(8)).unwrap(), 0);
        assert_matches!(
            cache.get_churn_at(Epoch::new(6)),
            Err(BeaconStateError::ExitCacheInvalidEpoch { .. })
        );

        cache.record_validator_exit(Epoch::new(9)).unwrap();
        assert_eq!(cache.max_epoch().unwrap(), Some(Epoch::new(9)));
        assert_eq!(cache.get_churn_at(Epoch::new(9)).unwrap(), 1);
    }

    #[test]
    fn empty_registry_has_no_max() {
        let cache = ExitCache::new(&Vec::<Validator>::new(), &Spec::minimal()).unwrap();
        assert_eq!(cache.max_epoch().unwrap(), None);
    }
}
