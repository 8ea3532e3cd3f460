pub mod captcha;
pub mod entity;
pub mod loaders;
pub mod obligation;
pub mod progress;

pub use captcha::{CaptchaChallenge, Operator};
pub use entity::Entity;
pub use loaders::load_entities_from_toml;
pub use obligation::{
    ErrorResult, FailureKind, ObligationCategory, ObligationEntry, ObligationRecord, RunResult,
};
pub use progress::{RunProgress, RunStatus};
