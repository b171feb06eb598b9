// Hit-count filtering
//
// Two mutually exclusive strategies:
//
// - Native: the transport's count filter does the counting. JDWP reports a
//   counted request once, on the Nth occurrence, and then expires it, so the
//   engine re-arms or reshapes the request after every reported hit.
// - Custom: every delivered event bumps a local counter. Used when two request
//   kinds (entry+exit, access+modification) must share one logical count.

use crate::spec::{HitCountFilter, HitCountStyle};

/// Verdict for one delivered hit, with the request maintenance it implies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitVerdict {
    Pass,
    Fail,
    /// One-shot satisfied: tear down every request of the breakpoint
    PassThenTearDown,
    /// Recreate the fired request with the same count filter
    PassThenRearm,
    /// Recreate the fired request without a count filter
    PassThenDropFilter,
}

impl HitVerdict {
    pub fn passes(self) -> bool {
        self != HitVerdict::Fail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NativeState {
    Armed,
    /// `Equal` already fired
    Exhausted,
    /// `Greater` crossed its threshold; every later hit passes
    Passed,
}

#[derive(Debug, Clone)]
pub struct HitCounter {
    filter: Option<HitCountFilter>,
    custom: bool,
    counter: u32,
    native: NativeState,
}

impl HitCounter {
    pub fn new(filter: Option<HitCountFilter>, custom: bool) -> Self {
        // A zero count means "no filter"
        let filter = filter.filter(|f| f.count > 0);
        Self {
            filter,
            custom,
            counter: 0,
            native: NativeState::Armed,
        }
    }

    pub fn filter(&self) -> Option<HitCountFilter> {
        self.filter
    }

    pub fn is_custom(&self) -> bool {
        self.custom
    }

    /// Hits counted locally: every hit under the custom strategy, hits of
    /// uncounted requests under the native one
    pub fn custom_count(&self) -> u32 {
        self.counter
    }

    /// True when the breakpoint must not be re-armed: its one-shot already fired
    pub fn is_exhausted(&self) -> bool {
        match self.filter {
            Some(HitCountFilter {
                style: HitCountStyle::Equal,
                count,
            }) => self.counter >= count || self.native == NativeState::Exhausted,
            _ => false,
        }
    }

    /// Count filter for a freshly created request under the native strategy
    pub fn native_count_filter(&self) -> Option<i32> {
        if self.custom {
            return None;
        }
        let filter = self.filter?;
        let count = i32::try_from(filter.count).unwrap_or(i32::MAX);
        match (filter.style, self.native) {
            (_, NativeState::Exhausted) | (_, NativeState::Passed) => None,
            // A count of one reports every occurrence anyway
            (HitCountStyle::Multiple, _) if count <= 1 => None,
            (HitCountStyle::Multiple, _) | (HitCountStyle::Equal, _) => Some(count),
            (HitCountStyle::Greater, _) => Some(count.saturating_add(1)),
        }
    }

    /// Account for one delivered hit
    pub fn on_hit(&mut self) -> HitVerdict {
        let Some(filter) = self.filter else {
            return HitVerdict::Pass;
        };
        if self.custom {
            self.on_custom_hit(filter)
        } else {
            self.on_native_hit(filter)
        }
    }

    /// Account for one hit of a request the VM does not count
    pub fn on_local_hit(&mut self) -> HitVerdict {
        match self.filter {
            Some(filter) => self.on_custom_hit(filter),
            None => HitVerdict::Pass,
        }
    }

    fn on_custom_hit(&mut self, filter: HitCountFilter) -> HitVerdict {
        self.counter = self.counter.saturating_add(1);
        let n = filter.count;
        match filter.style {
            HitCountStyle::Multiple => {
                if self.counter % n == 0 {
                    HitVerdict::Pass
                } else {
                    HitVerdict::Fail
                }
            }
            HitCountStyle::Equal => {
                if self.counter == n {
                    HitVerdict::PassThenTearDown
                } else {
                    HitVerdict::Fail
                }
            }
            HitCountStyle::Greater => {
                if self.counter > n {
                    HitVerdict::Pass
                } else {
                    HitVerdict::Fail
                }
            }
        }
    }

    // The transport only reports occurrences that already satisfied the count
    fn on_native_hit(&mut self, filter: HitCountFilter) -> HitVerdict {
        match (filter.style, self.native) {
            (HitCountStyle::Multiple, _) => {
                if filter.count <= 1 {
                    HitVerdict::Pass
                } else {
                    HitVerdict::PassThenRearm
                }
            }
            (HitCountStyle::Equal, NativeState::Armed) => {
                self.native = NativeState::Exhausted;
                HitVerdict::PassThenTearDown
            }
            (HitCountStyle::Equal, _) => HitVerdict::Fail,
            (HitCountStyle::Greater, NativeState::Armed) => {
                self.native = NativeState::Passed;
                HitVerdict::PassThenDropFilter
            }
            (HitCountStyle::Greater, _) => HitVerdict::Pass,
        }
    }
}
