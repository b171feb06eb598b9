// JDWP client library
//
// Async client for the parts of JDWP a breakpoint daemon needs:
// - Connection, handshake and a socket-owning event loop
// - Generic event requests with every modifier kind
// - Composite event parsing
// - Type, method, thread and frame introspection

pub mod commands;
pub mod connection;
pub mod eventloop;
pub mod eventrequest;
pub mod events;
pub mod method;
pub mod object;
pub mod protocol;
pub mod reader;
pub mod reftype;
pub mod stackframe;
pub mod thread;
pub mod types;
pub mod vm;

pub use connection::JdwpConnection;
pub use eventrequest::{EventModifier, SuspendPolicy};
pub use events::{Event, EventKind, EventSet};
pub use protocol::{JdwpError, JdwpResult};
