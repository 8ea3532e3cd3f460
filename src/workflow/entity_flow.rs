//! 实体处理流程 - 流程层
//!
//! 核心职责：定义"一个实体"的完整处理流程
//!
//! 流程顺序：
//! 1. 检查外部标识（为空直接记为失败，不登录）
//! 2. 登录状态机
//! 3. 进入义务页面，抓取表格并解析

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::OcrEngine;
use crate::models::{Entity, ErrorResult, FailureKind, ObligationRecord};
use crate::services::{parse_obligation_table, Portal};
use crate::workflow::entity_ctx::EntityCtx;
use crate::workflow::login_flow::{LoginError, LoginFlow};

/// 实体处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    /// 抓取成功
    Record(ObligationRecord),
    /// 处理失败，已转换为可存储的错误结果
    Failed(ErrorResult),
    /// 处理中途收到停止信号，不记录结果
    Cancelled,
}

/// 实体处理流程
///
/// - 编排"标识检查 → 登录 → 抓取"的顺序
/// - 不持有浏览器资源，门户由调用方传入
/// - 只有会话级故障以 `Err` 返回，其余失败都转换为 `ErrorResult`
pub struct EntityFlow<O> {
    login: LoginFlow<O>,
}

impl<O: OcrEngine> EntityFlow<O> {
    pub fn new(login: LoginFlow<O>) -> Self {
        Self { login }
    }

    pub async fn run<P: Portal>(
        &self,
        portal: &P,
        entity: &Entity,
        ctx: &EntityCtx,
        cancel: &CancellationToken,
    ) -> AppResult<EntityOutcome> {
        let name = entity.display_name.as_str();

        let Some(identifier) = entity.identifier() else {
            warn!("{} ⚠️ 缺少外部标识，跳过登录", ctx);
            return Ok(EntityOutcome::Failed(ErrorResult::new(
                name,
                FailureKind::MissingIdentifier,
                "missing external identifier",
            )));
        };

        match self.login.run(portal, identifier, ctx, cancel).await {
            Ok(_) => {}
            Err(LoginError::Cancelled) => {
                info!("{} 收到停止信号，放弃登录", ctx);
                return Ok(EntityOutcome::Cancelled);
            }
            Err(e @ LoginError::AttemptsExhausted { .. }) => {
                return Ok(EntityOutcome::Failed(ErrorResult::new(
                    name,
                    FailureKind::LoginAttemptsExhausted,
                    e.to_string(),
                )));
            }
            Err(LoginError::Infrastructure(e)) => return self.extraction_failure(ctx, name, e),
        }

        match portal.fetch_obligation_table().await {
            Ok(raw) => {
                let record = parse_obligation_table(name, &raw);
                info!("{} ✓ 义务表格解析完成", ctx);
                Ok(EntityOutcome::Record(record))
            }
            Err(e) => self.extraction_failure(ctx, name, e),
        }
    }

    /// 会话丢失向上抛出，其余基础设施错误记为该实体的失败
    fn extraction_failure(
        &self,
        ctx: &EntityCtx,
        name: &str,
        err: AppError,
    ) -> AppResult<EntityOutcome> {
        if err.is_session_fatal() {
            error!("{} ❌ 浏览会话丢失: {}", ctx, err);
            return Err(err);
        }
        error!("{} ❌ 抓取失败: {}", ctx, err);
        Ok(EntityOutcome::Failed(ErrorResult::new(
            name,
            FailureKind::ExtractionFailure,
            format!("extraction failed: {}", err),
        )))
    }
}
