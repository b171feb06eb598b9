// Per-engine mutable state, only touched under the engine's request lock

use crate::condition::ConditionCache;
use crate::facade::{RequestFilter, RequestKey, RequestTarget};
use crate::hit_count::HitCounter;
use crate::resolve::ClassFilters;
use crate::spec::HitCountFilter;
use crate::types::{MethodId, ReferenceTypeId};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestRole {
    /// Reports hits of the breakpoint; subject to the hit-count filter
    Hit,
    /// Class prepare watch driving deferred resolution
    ClassWatch,
    /// Class unload watch that retires requests of unloaded types
    UnloadWatch,
}

/// Everything needed to (re)create a request
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RequestRecipe {
    pub target: RequestTarget,
    pub filters: Vec<RequestFilter>,
    pub role: RequestRole,
    /// Type the request was created for, if any
    pub anchor: Option<ReferenceTypeId>,
    /// The request is broader than the breakpoint; its hits are counted
    /// locally after the resolver accepted them, never by the VM
    pub ignore_hit_count: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct LiveRequest {
    pub key: RequestKey,
    pub recipe: RequestRecipe,
    /// Count filter the request was enabled with
    pub count: Option<i32>,
}

/// What class resolution has produced so far
#[derive(Debug, Default)]
pub struct ResolutionState {
    /// Types already turned into requests, by id
    pub resolved: HashMap<ReferenceTypeId, String>,
    /// Methods matched by a method breakpoint; entry/exit events outside
    /// this set come from class-wide requests and are ignored
    pub accepted_methods: HashSet<(ReferenceTypeId, MethodId)>,
    /// Filters the class watches were armed with
    pub filters: Option<ClassFilters>,
    pub armed: bool,
    pub source_root: Option<String>,
    /// Primary class the breakpoint resolved to
    pub class_name: Option<String>,
}

impl ResolutionState {
    pub fn type_name(&self, type_id: ReferenceTypeId) -> Option<&str> {
        self.resolved.get(&type_id).map(String::as_str)
    }

    pub(crate) fn reset(&mut self) {
        *self = ResolutionState::default();
    }
}

#[derive(Debug)]
pub(crate) struct EngineState {
    pub requests: Vec<LiveRequest>,
    pub condition: ConditionCache,
    pub counter: HitCounter,
    /// Filter the counter was built from; a change resets counting
    pub counted_filter: Option<HitCountFilter>,
    pub resolution: ResolutionState,
}

impl EngineState {
    pub fn new(filter: Option<HitCountFilter>, custom: bool) -> Self {
        Self {
            requests: Vec::new(),
            condition: ConditionCache::default(),
            counter: HitCounter::new(filter, custom),
            counted_filter: filter,
            resolution: ResolutionState::default(),
        }
    }

    pub fn find(&self, key: RequestKey) -> Option<&LiveRequest> {
        self.requests.iter().find(|r| r.key == key)
    }

    pub fn take(&mut self, key: RequestKey) -> Option<LiveRequest> {
        let idx = self.requests.iter().position(|r| r.key == key)?;
        Some(self.requests.remove(idx))
    }

    /// Hit requests still carrying a count filter, other than `except`
    pub fn counted_requests(&self, except: RequestKey) -> Vec<RequestKey> {
        self.requests
            .iter()
            .filter(|r| r.key != except && r.count.is_some())
            .map(|r| r.key)
            .collect()
    }

    pub fn hit_requests(&self) -> usize {
        self.requests
            .iter()
            .filter(|r| r.recipe.role == RequestRole::Hit)
            .count()
    }
}
