// Batch job state machine
//
// Explicit lifecycle states for provider batch jobs plus the table of allowed
// transitions the stores enforce.

pub mod states;
pub mod transitions;

pub use states::BatchState;
pub use transitions::{allowed_predecessors, can_transition, validate_transition};
