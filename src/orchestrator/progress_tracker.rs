//! 运行进度跟踪 - 编排层
//!
//! 在内存中保存当前运行的进度快照，每次变化都整体写回 `ProgressStore`。
//! 进入运行中只能通过 `start_run`，它依赖存储端的条件写入保证同一时间只有一个运行。

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::datastore::ProgressStore;
use crate::error::AppResult;
use crate::models::progress::percent_of;
use crate::models::{RunProgress, RunResult, RunStatus};

/// 运行进度跟踪器
pub struct ProgressTracker {
    store: Arc<dyn ProgressStore>,
    current: Mutex<RunProgress>,
}

impl ProgressTracker {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            current: Mutex::new(RunProgress::default()),
        }
    }

    /// 读取存储中的进度；从未运行过时返回默认值
    pub async fn get_status(&self) -> AppResult<RunProgress> {
        Ok(self.store.load().await?.unwrap_or_default())
    }

    /// 开始新一轮运行
    ///
    /// 已有运行进行中时返回 `false`，不改动任何状态。
    pub async fn start_run(&self) -> AppResult<bool> {
        let fresh = RunProgress::fresh_run();
        if !self.store.claim_run(&fresh).await? {
            warn!("⚠️ 已有运行正在进行，本次启动被忽略");
            return Ok(false);
        }
        *self.current.lock().await = fresh;
        Ok(true)
    }

    /// 更新进度并写回存储
    ///
    /// - 不能借此进入运行中（需经由 `start_run`）
    /// - 百分比只增不减
    pub async fn update(
        &self,
        percent: u8,
        status: RunStatus,
        results: Vec<RunResult>,
    ) -> AppResult<RunProgress> {
        let mut current = self.current.lock().await;
        if status == RunStatus::Running && current.status != RunStatus::Running {
            warn!("⚠️ 忽略进入运行中的进度更新（需要先 start_run）");
            return Ok(current.clone());
        }

        current.status = status;
        current.percent = percent.min(100).max(current.percent);
        current.results = results;
        current.last_updated = Utc::now();
        self.store.save(&current).await?;

        debug!("进度: {} {}%", current.status, current.percent);
        Ok(current.clone())
    }

    /// 追加一个实体的结果，按 `done/total` 推进百分比
    pub async fn record_result(
        &self,
        result: RunResult,
        done: usize,
        total: usize,
    ) -> AppResult<RunProgress> {
        let mut results = self.current.lock().await.results.clone();
        results.push(result);
        self.update(percent_of(done, total), RunStatus::Running, results)
            .await
    }

    /// 全部实体处理完毕
    pub async fn complete(&self) -> AppResult<RunProgress> {
        let results = self.current.lock().await.results.clone();
        self.update(100, RunStatus::Completed, results).await
    }

    /// 运行中止；已记录的结果保留
    pub async fn fail(&self, message: impl Into<String>) -> AppResult<RunProgress> {
        let mut current = self.current.lock().await;
        current.status = RunStatus::Error;
        current.message = Some(message.into());
        current.last_updated = Utc::now();
        self.store.save(&current).await?;
        Ok(current.clone())
    }
}
