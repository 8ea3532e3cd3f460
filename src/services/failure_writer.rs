//! 失败记录服务 - 业务能力层
//!
//! 只负责"把失败的实体追加写入失败清单"能力，不关心流程

use std::fs::OpenOptions;
use std::io::Write;

use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::ErrorResult;

/// 失败清单写入服务
pub struct FailureWriter {
    failure_file_path: String,
}

impl FailureWriter {
    /// 使用指定文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            failure_file_path: path.into(),
        }
    }

    /// 追加一条失败记录
    pub fn write(&self, failure: &ErrorResult) -> AppResult<()> {
        debug!(
            "写入失败清单: {} | {}",
            failure.entity_name, failure.kind
        );

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.failure_file_path)
            .map_err(|e| AppError::write_failed(&self.failure_file_path, e))?;

        let line = format!(
            "{} | {} | {} | {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            failure.entity_name,
            failure.kind,
            failure.error_message
        );

        file.write_all(line.as_bytes())
            .map_err(|e| AppError::write_failed(&self.failure_file_path, e))?;

        Ok(())
    }
}
