//! Telemetry for control-plane sessions and commands.
//!
//! The executor emits a [`ControlEvent`] for every session it opens and every
//! command it runs. Events flow through `TelemetrySink` implementations, which
//! are `tower::Service<ControlEvent>` so they compose with standard tower
//! combinators. Emission is best-effort: a failing sink never fails a command.
//!
//! ```rust
//! use dynsec_tenancy::telemetry::{CommandEvent, ControlEvent};
//!
//! let sent = ControlEvent::Command(CommandEvent::Sent { command: "createRole" });
//! assert_eq!(sent.to_string(), "Command::Sent(createRole)");
//! ```

pub mod events;
pub mod sinks;

pub use events::{CommandEvent, ControlEvent, SessionEvent};
pub use sinks::{emit_best_effort, ComposedSinkError, LogSink, MemorySink, MulticastSink, NullSink, TelemetrySink};
