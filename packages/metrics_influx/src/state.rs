//! State carried between reporting ticks for delta computation.

use foldhash::HashMap;

/// Tracks the last reported value of every counter for delta computation.
///
/// Counters are cumulative, but the database also receives the change since the previous
/// tick. Entries are never removed, a counter that disappears and comes back continues
/// from its last known value.
#[derive(Debug, Default)]
pub(crate) struct CounterState {
    /// Previous cumulative count per instrument name.
    last: HashMap<String, i64>,
}

impl CounterState {
    /// Creates an empty state, as if every counter was previously at zero.
    pub(crate) fn new() -> Self {
        Self {
            last: HashMap::default(),
        }
    }

    /// Computes the change of the counter `name` since the previous call and remembers
    /// `current` for the next one.
    ///
    /// A counter that went backwards was reset (or wrapped), in which case its whole
    /// current value is considered new and returned as the delta.
    pub(crate) fn diff(&mut self, name: &str, current: i64) -> i64 {
        let previous = match self.last.get_mut(name) {
            Some(last) => std::mem::replace(last, current),
            None => {
                self.last.insert(name.to_owned(), current);
                0
            }
        };

        match current.checked_sub(previous) {
            Some(diff) if diff >= 0 => diff,
            _ => current,
        }
    }

    /// The value remembered for `name`, if any.
    #[cfg(test)]
    pub(crate) fn last(&self, name: &str) -> Option<i64> {
        self.last.get(name).copied()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_all_new() {
        let mut state = CounterState::new();

        assert_eq!(state.diff("requests", 100), 100);
        assert_eq!(state.last("requests"), Some(100));
    }

    #[test]
    fn subsequent_observations_report_change() {
        let mut state = CounterState::new();

        assert_eq!(state.diff("requests", 10), 10);
        assert_eq!(state.diff("requests", 25), 15);
        assert_eq!(state.diff("requests", 25), 0);
        assert_eq!(state.diff("requests", 40), 15);
    }

    #[test]
    fn reset_counter_reports_full_count() {
        let mut state = CounterState::new();

        state.diff("requests", 10);
        state.diff("requests", 25);

        // The counter went back to 5, so everything it holds is considered new rather
        // than reporting a negative delta of -20.
        assert_eq!(state.diff("requests", 5), 5);
        assert_eq!(state.last("requests"), Some(5));

        assert_eq!(state.diff("requests", 8), 3);
    }

    #[test]
    fn reset_to_zero_reports_zero() {
        let mut state = CounterState::new();

        state.diff("requests", 10);
        assert_eq!(state.diff("requests", 0), 0);
        assert_eq!(state.last("requests"), Some(0));
    }

    #[test]
    fn overflowing_difference_is_treated_as_reset() {
        let mut state = CounterState::new();

        state.diff("wrapped", i64::MIN);
        assert_eq!(state.diff("wrapped", i64::MAX), i64::MAX);

        state.diff("negative", i64::MAX);
        assert_eq!(state.diff("negative", i64::MIN), i64::MIN);
    }

    #[test]
    fn counters_are_tracked_independently() {
        let mut state = CounterState::new();

        state.diff("a", 10);
        state.diff("b", 20);

        assert_eq!(state.diff("a", 15), 5);
        assert_eq!(state.diff("b", 21), 1);
        assert_eq!(state.last("a"), Some(15));
        assert_eq!(state.last("b"), Some(21));
        assert_eq!(state.last("c"), None);
    }
}
