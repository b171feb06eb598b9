// Breakpoint engine for JDWP debuggers
//
// Turns declarative breakpoint definitions into low-level event requests and
// routes the resulting events back:
// - Deferred resolution against classes as they load
// - Line relocation to the nearest executable line
// - Native and custom hit-count filtering
// - Conditions, listener notification and step arbitration
// - Session-scoped registry with a serialized background worker

pub mod condition;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod facade;
pub mod hit_count;
pub mod mock;
pub mod persistence;
pub mod registry;
pub mod resolve;
pub mod session;
pub mod source_roots;
pub mod spec;
pub mod step;
pub mod types;

pub use condition::{CompiledCondition, ConditionEvaluator, ConstantEvaluator};
pub use config::EngineConfig;
pub use engine::{BreakpointEngine, HandleOutcome};
pub use error::{EngineError, ErrorPolicy, EvaluationError, TransportError, TransportResult};
pub use event::{
    BreakpointHit, BreakpointListener, Decision, Event, EventDetails, EventKind, HitResponse,
    Validity,
};
pub use facade::{RemoteRequestFacade, RequestFilter, RequestKey, RequestTarget};
pub use persistence::{JsonFileStore, PersistenceStore};
pub use registry::BreakpointRegistry;
pub use session::DebugSession;
pub use source_roots::{DirectorySourceResolver, SourceResolver, SourceRoot};
pub use spec::{
    Breakpoint, BreakpointKind, BreakpointSet, BreakpointSpec, HitCountFilter, HitCountStyle,
    SpecId, SuspendPolicy,
};
