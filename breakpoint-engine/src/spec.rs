// Breakpoint definitions
//
// `BreakpointSpec` is the user's declarative intent. `Breakpoint` wraps a spec
// with a stable identity so engines can read it, and write line relocations
// back, while the caller keeps ownership. `BreakpointSet` is the global set of
// known breakpoints a session snapshots when it starts.

use crate::types::{ObjectId, ThreadId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SPEC_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier of a breakpoint, independent of its contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecId(pub u64);

impl SpecId {
    pub fn next() -> Self {
        SpecId(NEXT_SPEC_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for SpecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bp#{}", self.0)
    }
}

/// Which threads a hit suspends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuspendPolicy {
    #[default]
    All,
    EventThread,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitCountStyle {
    /// Stop on exactly the Nth hit
    Equal,
    /// Stop on every hit after the Nth
    Greater,
    /// Stop on every Nth hit
    Multiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitCountFilter {
    pub count: u32,
    pub style: HitCountStyle,
}

impl HitCountFilter {
    pub fn new(count: u32, style: HitCountStyle) -> Self {
        Self { count, style }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BreakpointKind {
    Line {
        url: String,
        line: i32,
    },
    Method {
        class_filters: Vec<String>,
        #[serde(default)]
        class_exclusions: Vec<String>,
        method_name: String,
        #[serde(default)]
        signature: Option<String>,
        entry: bool,
        exit: bool,
    },
    Field {
        class_name: String,
        field_name: String,
        access: bool,
        modification: bool,
    },
    Exception {
        class_name: String,
        caught: bool,
        uncaught: bool,
        /// Throw-location filters
        #[serde(default)]
        class_filters: Vec<String>,
        #[serde(default)]
        class_exclusions: Vec<String>,
    },
    Class {
        class_filters: Vec<String>,
        #[serde(default)]
        class_exclusions: Vec<String>,
        load: bool,
        unload: bool,
    },
    Thread {
        start: bool,
        death: bool,
    },
}

impl BreakpointKind {
    pub fn name(&self) -> &'static str {
        match self {
            BreakpointKind::Line { .. } => "line",
            BreakpointKind::Method { .. } => "method",
            BreakpointKind::Field { .. } => "field",
            BreakpointKind::Exception { .. } => "exception",
            BreakpointKind::Class { .. } => "class",
            BreakpointKind::Thread { .. } => "thread",
        }
    }
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointSpec {
    #[serde(flatten)]
    pub kind: BreakpointKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default)]
    pub suspend: SuspendPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hit_count: Option<HitCountFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thread_filters: Vec<ThreadId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_filters: Vec<ObjectId>,
    /// Group this breakpoint belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Groups enabled when this breakpoint is hit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_groups: Vec<String>,
    /// Groups disabled when this breakpoint is hit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disable_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_text: Option<String>,
    /// Created by the engine, never persisted
    #[serde(skip)]
    pub hidden: bool,
    /// Session this breakpoint is bound to; unbound breakpoints apply everywhere
    #[serde(skip)]
    pub session: Option<String>,
}

impl BreakpointSpec {
    pub fn new(kind: BreakpointKind) -> Self {
        Self {
            kind,
            enabled: true,
            condition: None,
            suspend: SuspendPolicy::All,
            hit_count: None,
            thread_filters: Vec::new(),
            instance_filters: Vec::new(),
            group: None,
            enable_groups: Vec::new(),
            disable_groups: Vec::new(),
            print_text: None,
            hidden: false,
            session: None,
        }
    }

    pub fn line(url: impl Into<String>, line: i32) -> Self {
        Self::new(BreakpointKind::Line {
            url: url.into(),
            line,
        })
    }

    pub fn method(class: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self::new(BreakpointKind::Method {
            class_filters: vec![class.into()],
            class_exclusions: Vec::new(),
            method_name: method_name.into(),
            signature: None,
            entry: true,
            exit: false,
        })
    }

    pub fn field(class: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self::new(BreakpointKind::Field {
            class_name: class.into(),
            field_name: field_name.into(),
            access: false,
            modification: true,
        })
    }

    pub fn exception(class: impl Into<String>, caught: bool, uncaught: bool) -> Self {
        Self::new(BreakpointKind::Exception {
            class_name: class.into(),
            caught,
            uncaught,
            class_filters: Vec::new(),
            class_exclusions: Vec::new(),
        })
    }

    pub fn class_load(filter: impl Into<String>) -> Self {
        Self::new(BreakpointKind::Class {
            class_filters: vec![filter.into()],
            class_exclusions: Vec::new(),
            load: true,
            unload: false,
        })
    }

    pub fn thread(start: bool, death: bool) -> Self {
        Self::new(BreakpointKind::Thread { start, death })
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_hit_count(mut self, count: u32, style: HitCountStyle) -> Self {
        self.hit_count = Some(HitCountFilter::new(count, style));
        self
    }

    pub fn with_suspend(mut self, suspend: SuspendPolicy) -> Self {
        self.suspend = suspend;
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Condition text if it is non-blank
    pub fn effective_condition(&self) -> Option<&str> {
        self.condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    pub fn line_number(&self) -> Option<i32> {
        match &self.kind {
            BreakpointKind::Line { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Shared handle to a breakpoint definition
#[derive(Debug)]
pub struct Breakpoint {
    id: SpecId,
    spec: RwLock<BreakpointSpec>,
}

impl Breakpoint {
    pub fn new(spec: BreakpointSpec) -> Arc<Self> {
        Arc::new(Self {
            id: SpecId::next(),
            spec: RwLock::new(spec),
        })
    }

    pub fn id(&self) -> SpecId {
        self.id
    }

    /// Copy of the current definition
    pub fn spec(&self) -> BreakpointSpec {
        self.spec.read().clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut BreakpointSpec) -> R) -> R {
        f(&mut self.spec.write())
    }

    pub fn is_enabled(&self) -> bool {
        self.spec.read().enabled
    }

    pub fn is_hidden(&self) -> bool {
        self.spec.read().hidden
    }

    pub fn session(&self) -> Option<String> {
        self.spec.read().session.clone()
    }
}

/// All breakpoints known to the debugger, across sessions
#[derive(Debug, Default)]
pub struct BreakpointSet {
    items: RwLock<Vec<Arc<Breakpoint>>>,
}

impl BreakpointSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, breakpoint: Arc<Breakpoint>) {
        let mut items = self.items.write();
        if !items.iter().any(|b| b.id() == breakpoint.id()) {
            items.push(breakpoint);
        }
    }

    pub fn remove(&self, id: SpecId) -> Option<Arc<Breakpoint>> {
        let mut items = self.items.write();
        let idx = items.iter().position(|b| b.id() == id)?;
        Some(items.remove(idx))
    }

    pub fn get(&self, id: SpecId) -> Option<Arc<Breakpoint>> {
        self.items.read().iter().find(|b| b.id() == id).cloned()
    }

    pub fn contains(&self, id: SpecId) -> bool {
        self.items.read().iter().any(|b| b.id() == id)
    }

    pub fn all(&self) -> Vec<Arc<Breakpoint>> {
        self.items.read().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Enable or disable every member of a group, returning the ones that changed
    pub fn set_group_enabled(&self, group: &str, enabled: bool) -> Vec<SpecId> {
        self.items
            .read()
            .iter()
            .filter(|b| {
                b.update(|spec| {
                    if spec.group.as_deref() == Some(group) && spec.enabled != enabled {
                        spec.enabled = enabled;
                        true
                    } else {
                        false
                    }
                })
            })
            .map(|b| b.id())
            .collect()
    }

    /// Another line breakpoint already placed at `url:line`
    pub fn line_breakpoint_at(&self, url: &str, line: i32, except: SpecId) -> Option<SpecId> {
        self.items
            .read()
            .iter()
            .filter(|b| b.id() != except)
            .find(|b| {
                matches!(
                    &b.spec.read().kind,
                    BreakpointKind::Line { url: u, line: l } if u == url && *l == line
                )
            })
            .map(|b| b.id())
    }
}
