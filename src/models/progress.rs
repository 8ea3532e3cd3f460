use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::obligation::RunResult;

/// 进度记录的固定主键
pub const PROGRESS_KEY: &str = "obligation_sweep";

/// 批次运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    NotStarted,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::NotStarted => "not_started",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// 全局唯一的运行进度
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    pub status: RunStatus,
    /// 0..=100
    pub percent: u8,
    pub results: Vec<RunResult>,
    /// 运行中止时的错误信息
    #[serde(default)]
    pub message: Option<String>,
    pub last_updated: DateTime<Utc>,
}

impl Default for RunProgress {
    fn default() -> Self {
        Self {
            status: RunStatus::NotStarted,
            percent: 0,
            results: Vec::new(),
            message: None,
            last_updated: Utc::now(),
        }
    }
}

impl RunProgress {
    /// 新一轮运行的初始状态
    pub fn fresh_run() -> Self {
        Self {
            status: RunStatus::Running,
            ..Self::default()
        }
    }

    pub fn error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_error()).count()
    }
}

/// 已处理 `done` 个、共 `total` 个时的整数百分比
pub fn percent_of(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = done.min(total);
    ((done * 100) / total) as u8
}
