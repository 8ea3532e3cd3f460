//! 登录状态机 - 流程层
//!
//! ```text
//! Init → ChallengePresented → Solved → Submitted → Authenticated
//!              ↑   │ (识别失败: 刷新验证码)          │
//!              └───┘                                 ↓
//!   Init ←──────────────────────────────────────── Rejected
//! ```
//!
//! 每次识别验证码消耗一次尝试；预算用尽即 `AttemptsExhausted`。

use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::infrastructure::OcrEngine;
use crate::models::CaptchaChallenge;
use crate::services::{CaptchaError, CaptchaSolver, Portal, SubmitObservation};
use crate::workflow::entity_ctx::EntityCtx;

/// 登录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Init,
    ChallengePresented,
    Solved,
    Submitted,
    Authenticated,
    Rejected,
}

/// 单个实体的登录尝试计数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub state: LoginState,
    pub attempts_used: u32,
    pub max_attempts: u32,
}

impl LoginAttempt {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: LoginState::Init,
            attempts_used: 0,
            max_attempts,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.attempts_used >= self.max_attempts
    }

    fn transition(&mut self, next: LoginState) {
        debug!("登录状态: {:?} → {:?}", self.state, next);
        self.state = next;
    }
}

/// 登录失败
#[derive(Debug, Error)]
pub enum LoginError {
    /// 尝试次数用尽
    #[error("login failed after {attempts} attempts (last failure: {last_failure})")]
    AttemptsExhausted { attempts: u32, last_failure: String },
    /// 收到停止信号
    #[error("login cancelled")]
    Cancelled,
    /// 门户或 OCR 基础设施出错
    #[error(transparent)]
    Infrastructure(#[from] AppError),
}

/// 根据提交后观察到的标记判定结果
///
/// 配置了成功标记时必须看到它才算成功；否则沿用"等待期内未出现拒绝标记即成功"的规则。
pub fn classify_submission(observation: SubmitObservation, requires_success_marker: bool) -> LoginState {
    match observation {
        SubmitObservation::RejectionMarker => LoginState::Rejected,
        SubmitObservation::SuccessMarker => LoginState::Authenticated,
        SubmitObservation::NoMarker if requires_success_marker => LoginState::Rejected,
        SubmitObservation::NoMarker => LoginState::Authenticated,
    }
}

/// 登录流程
pub struct LoginFlow<O> {
    solver: CaptchaSolver<O>,
    max_attempts: u32,
    submit_wait: Duration,
}

impl<O: OcrEngine> LoginFlow<O> {
    pub fn new(solver: CaptchaSolver<O>, max_attempts: u32, submit_wait: Duration) -> Self {
        Self {
            solver,
            max_attempts,
            submit_wait,
        }
    }

    /// 为一个实体登录，成功时返回消耗的尝试次数
    ///
    /// 停止信号在每次识别验证码之前检查。
    pub async fn run<P: Portal>(
        &self,
        portal: &P,
        identifier: &str,
        ctx: &EntityCtx,
        cancel: &CancellationToken,
    ) -> Result<u32, LoginError> {
        let mut attempt = LoginAttempt::new(self.max_attempts);
        let mut challenge: Option<CaptchaChallenge> = None;
        let mut last_failure = String::from("none");

        loop {
            match attempt.state {
                LoginState::Init => {
                    portal.open_entry().await?;
                    attempt.transition(LoginState::ChallengePresented);
                }
                LoginState::ChallengePresented => {
                    if attempt.exhausted() {
                        return Err(self.exhausted(ctx, &attempt, last_failure));
                    }
                    if cancel.is_cancelled() {
                        return Err(LoginError::Cancelled);
                    }
                    attempt.attempts_used += 1;

                    let image = portal.capture_challenge().await?;
                    match self.solver.solve(image, attempt.attempts_used).await {
                        Ok(solved) => {
                            debug!(
                                "{} 验证码 {} {} {} = {}",
                                ctx,
                                solved.operands[0],
                                solved.operator.symbol(),
                                solved.operands[1],
                                solved.computed_answer
                            );
                            challenge = Some(solved);
                            attempt.transition(LoginState::Solved);
                        }
                        Err(
                            e @ (CaptchaError::Misread { .. }
                            | CaptchaError::UnsupportedOperator { .. }),
                        ) => {
                            warn!(
                                "{} ⚠️ 验证码识别失败 (尝试 {}/{}): {}",
                                ctx, attempt.attempts_used, attempt.max_attempts, e
                            );
                            last_failure = e.to_string();
                            if !attempt.exhausted() {
                                portal.reload_challenge().await?;
                            }
                        }
                        Err(CaptchaError::Engine(e)) => return Err(LoginError::Infrastructure(e)),
                    }
                }
                LoginState::Solved => {
                    let answer = challenge
                        .as_ref()
                        .map(|c| c.computed_answer)
                        .ok_or_else(|| AppError::Other("缺少已求解的验证码".to_string()))?;
                    portal.submit_login(identifier, answer).await?;
                    attempt.transition(LoginState::Submitted);
                }
                LoginState::Submitted => {
                    let observation = portal.observe_submission(self.submit_wait).await?;
                    let next = classify_submission(observation, portal.has_success_marker());
                    attempt.transition(next);
                }
                LoginState::Authenticated => {
                    info!(
                        "{} ✓ 登录成功 (尝试 {}/{})",
                        ctx, attempt.attempts_used, attempt.max_attempts
                    );
                    return Ok(attempt.attempts_used);
                }
                LoginState::Rejected => {
                    warn!(
                        "{} ⚠️ 登录被拒绝 (尝试 {}/{})",
                        ctx, attempt.attempts_used, attempt.max_attempts
                    );
                    last_failure = "rejected by portal".to_string();
                    challenge = None;
                    if attempt.exhausted() {
                        return Err(self.exhausted(ctx, &attempt, last_failure));
                    }
                    attempt.transition(LoginState::Init);
                }
            }
        }
    }

    fn exhausted(&self, ctx: &EntityCtx, attempt: &LoginAttempt, last_failure: String) -> LoginError {
        warn!("{} ❌ 登录尝试已用尽 ({} 次)", ctx, attempt.attempts_used);
        LoginError::AttemptsExhausted {
            attempts: attempt.attempts_used,
            last_failure,
        }
    }
}
