//! Release execution: approval, brokering, the stage engine and dispatch

pub mod approval;
pub mod broker;
pub mod cancel;
pub mod dispatcher;
pub mod engine;
pub mod events;

pub use approval::{ApprovalDecision, ApprovalGate, PendingApproval, PresetApproval, PromptApproval};
pub use broker::CredentialBroker;
pub use cancel::CancellationFlag;
pub use dispatcher::Dispatcher;
pub use engine::{Collaborators, EngineSettings, ReleaseEngine};
pub use events::{EventHandler, EventKind, ReleaseEvent};
