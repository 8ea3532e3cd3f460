/// 日志工具模块
///
/// 提供日志初始化、运行日志文件与统计输出的辅助函数
use std::fs::{self, OpenOptions};
use std::io::Write;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{RunProgress, RunResult};

/// 初始化 tracing 输出
///
/// `RUST_LOG` 优先，未设置时默认 info。重复调用（测试中）不会报错。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 初始化运行日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n义务核查日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header).map_err(|e| AppError::write_failed(log_file_path, e))
}

/// 向运行日志追加一个实体的处理结果
pub fn append_run_log(log_file_path: &str, result: &RunResult) -> AppResult<()> {
    let outcome = match result {
        RunResult::Record(_) => "ok".to_string(),
        RunResult::Error(error) => format!("error: {}", error.error_message),
    };
    let line = format!(
        "{} | {} | {}\n",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        result.entity_name(),
        outcome
    );

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(|e| AppError::write_failed(log_file_path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| AppError::write_failed(log_file_path, e))
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 义务核查批处理");
    info!("🌐 门户: {}", config.portal_url);
    info!(
        "🔐 最大登录尝试: {} | 实体间隔: {:?}",
        config.max_login_attempts, config.inter_entity_delay
    );
    info!("{}", "=".repeat(60));
}

/// 记录实体加载信息
pub fn log_entities_loaded(total: usize) {
    info!("✓ 找到 {} 个待处理的实体", total);
    info!("💡 实体将逐个顺序处理\n");
}

/// 记录实体开始处理
pub fn log_entity_start(label: &str) {
    info!("\n{}", "─".repeat(60));
    info!("{} 开始处理", label);
}

/// 记录实体处理完成
pub fn log_entity_complete(label: &str, result: &RunResult, percent: u8) {
    match result {
        RunResult::Record(_) => info!("{} ✅ 完成 (进度 {}%)", label, percent),
        RunResult::Error(error) => info!(
            "{} ❌ 失败: {} (进度 {}%)",
            label, error.error_message, percent
        ),
    }
}

/// 打印最终统计信息
///
/// # 参数
/// - `progress`: 运行结束时的进度
/// - `config`: 用于输出日志与报表位置
pub fn print_final_stats(progress: &RunProgress, config: &Config) {
    let total = progress.results.len();
    let failed = progress.error_count();

    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("状态: {}", progress.status);
    info!("✅ 成功: {}/{}", total - failed, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", config.output_log_file);
    info!("报表目录: {}", config.report_dir);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorResult, FailureKind, ObligationRecord};

    #[test]
    fn test_run_log_appends_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let path = path.to_str().unwrap();

        init_log_file(path).unwrap();
        append_run_log(path, &RunResult::Record(ObligationRecord::new("Acme"))).unwrap();
        append_run_log(
            path,
            &RunResult::Error(ErrorResult::new(
                "Beta",
                FailureKind::MissingIdentifier,
                "missing external identifier",
            )),
        )
        .unwrap();

        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.contains("义务核查日志"));
        assert!(content.contains("| Acme | ok"));
        assert!(content.contains("| Beta | error: missing external identifier"));
    }
}
