pub mod entity_ctx;
pub mod entity_flow;
pub mod login_flow;

pub use entity_ctx::EntityCtx;
pub use entity_flow::{EntityFlow, EntityOutcome};
pub use login_flow::{classify_submission, LoginAttempt, LoginError, LoginFlow, LoginState};
