// Request -> engine routing
//
// Every live low-level request is registered here by the engine that created
// it. The table holds weak references so a dropped engine can never receive
// another event.

use crate::engine::BreakpointEngine;
use crate::facade::RequestKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

#[derive(Debug, Default)]
pub struct HandlerTable {
    handlers: Mutex<HashMap<RequestKey, Weak<BreakpointEngine>>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request: RequestKey, engine: Weak<BreakpointEngine>) {
        self.handlers.lock().insert(request, engine);
    }

    pub fn unregister(&self, request: RequestKey) {
        self.handlers.lock().remove(&request);
    }

    pub fn lookup(&self, request: RequestKey) -> Option<Arc<BreakpointEngine>> {
        let mut handlers = self.handlers.lock();
        match handlers.get(&request).map(Weak::upgrade) {
            Some(Some(engine)) => Some(engine),
            Some(None) => {
                handlers.remove(&request);
                None
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.lock().is_empty()
    }

    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}
