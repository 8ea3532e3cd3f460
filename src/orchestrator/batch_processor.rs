//! 批量实体处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量实体的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验配置、初始化日志文件、打开浏览会话与 OCR 引擎
//! 2. **抢占运行**：经由 `ProgressTracker::start_run` 保证同一时间只有一个运行
//! 3. **顺序处理**：一个实体完整处理完才开始下一个，实体之间固定间隔
//! 4. **增量持久化**：每个实体完成后写结果、推进进度、重新生成报表
//! 5. **资源管理**：无论以何种方式结束都关闭浏览会话
//!
//! ## 设计特点
//!
//! - **单工作者**：不并发处理实体，避免触发门户的限流
//! - **停止信号**：在实体边界与实体间隔处检查 `CancellationToken`
//! - **故障边界**：只有会话级故障会中止整个批次

use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::datastore::Datastore;
use crate::error::AppResult;
use crate::infrastructure::{build_ocr_engine, OcrEngine};
use crate::models::{RunProgress, RunResult};
use crate::orchestrator::progress_tracker::ProgressTracker;
use crate::services::{CaptchaSolver, ChromiumPortal, FailureWriter, Portal, ReportGenerator};
use crate::utils::logging;
use crate::workflow::{EntityCtx, EntityFlow, EntityOutcome, LoginFlow};

/// 一次运行结束时的汇总
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub progress: RunProgress,
    /// 最后一次生成的报表；没有处理任何实体时为 `None`
    pub report_path: Option<PathBuf>,
}

/// 运行结果
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// 所有实体处理完毕（可能包含单个实体的失败）
    Completed(RunSummary),
    /// 已有运行在进行，本次没有做任何事
    AlreadyRunning,
    /// 收到停止信号，提前结束
    Cancelled(RunSummary),
}

/// 实体循环如何结束
enum LoopEnd {
    Finished(Option<PathBuf>),
    Cancelled(Option<PathBuf>),
}

/// 批量运行器
///
/// 持有门户（唯一的浏览会话）与全部业务能力，对门户与 OCR 后端泛型，
/// 测试中可以替换为脚本化实现。
pub struct BatchRunner<P, O> {
    portal: P,
    flow: EntityFlow<O>,
    datastore: Datastore,
    tracker: ProgressTracker,
    report: ReportGenerator,
    failure_writer: FailureWriter,
    entity_ids: Vec<i64>,
    inter_entity_delay: Duration,
    output_log_file: String,
}

impl<P: Portal, O: OcrEngine> BatchRunner<P, O> {
    pub fn new(portal: P, ocr: O, datastore: Datastore, config: &Config) -> Self {
        let login = LoginFlow::new(
            CaptchaSolver::new(ocr),
            config.max_login_attempts,
            config.submit_wait,
        );
        Self {
            portal,
            flow: EntityFlow::new(login),
            tracker: ProgressTracker::new(datastore.progress.clone()),
            datastore,
            report: ReportGenerator::new(&config.report_dir),
            failure_writer: FailureWriter::with_path(&config.failure_log_file),
            entity_ids: config.entity_ids.clone(),
            inter_entity_delay: config.inter_entity_delay,
            output_log_file: config.output_log_file.clone(),
        }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// 执行一次完整运行，返回前总会关闭门户
    pub async fn run(&self, cancel: &CancellationToken) -> AppResult<RunOutcome> {
        let outcome = self.execute(cancel).await;
        if let Err(e) = self.portal.close().await {
            warn!("⚠️ 关闭浏览会话失败: {}", e);
        }
        outcome
    }

    async fn execute(&self, cancel: &CancellationToken) -> AppResult<RunOutcome> {
        if !self.tracker.start_run().await? {
            return Ok(RunOutcome::AlreadyRunning);
        }

        match self.process_entities(cancel).await {
            Ok(LoopEnd::Finished(report_path)) => {
                let progress = self.tracker.complete().await?;
                Ok(RunOutcome::Completed(RunSummary {
                    progress,
                    report_path,
                }))
            }
            Ok(LoopEnd::Cancelled(report_path)) => {
                warn!("⏹️ 收到停止信号，运行提前结束");
                let progress = self.tracker.fail("run cancelled").await?;
                Ok(RunOutcome::Cancelled(RunSummary {
                    progress,
                    report_path,
                }))
            }
            Err(e) => {
                error!("❌ 运行中止: {}", e);
                if let Err(save_err) = self.tracker.fail(e.to_string()).await {
                    error!("❌ 写入错误状态失败: {}", save_err);
                }
                Err(e)
            }
        }
    }

    async fn process_entities(&self, cancel: &CancellationToken) -> AppResult<LoopEnd> {
        info!("\n📁 正在读取待处理的实体...");
        let entities = self
            .datastore
            .entities
            .fetch_entities(&self.entity_ids)
            .await?;
        let total = entities.len();
        if total == 0 {
            warn!("⚠️ 没有找到待处理的实体");
            return Ok(LoopEnd::Finished(None));
        }
        logging::log_entities_loaded(total);

        let run_date = chrono::Local::now().date_naive();
        let mut report_path = None;

        for (index, entity) in entities.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(LoopEnd::Cancelled(report_path));
            }

            let ctx = EntityCtx::new(index + 1, total, entity);
            logging::log_entity_start(&ctx.to_string());

            let result = match self.flow.run(&self.portal, entity, &ctx, cancel).await? {
                EntityOutcome::Record(record) => {
                    self.datastore.results.upsert_record(&record).await?;
                    RunResult::Record(record)
                }
                EntityOutcome::Failed(failure) => {
                    if let Err(e) = self.failure_writer.write(&failure) {
                        warn!("{} ⚠️ 写入失败清单失败: {}", ctx, e);
                    }
                    RunResult::Error(failure)
                }
                EntityOutcome::Cancelled => return Ok(LoopEnd::Cancelled(report_path)),
            };

            let progress = self
                .tracker
                .record_result(result.clone(), index + 1, total)
                .await?;
            report_path = Some(self.report.render(&progress.results, run_date)?);
            if let Err(e) = logging::append_run_log(&self.output_log_file, &result) {
                warn!("{} ⚠️ 写入运行日志失败: {}", ctx, e);
            }
            logging::log_entity_complete(&ctx.to_string(), &result, progress.percent);

            if index + 1 < total {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(LoopEnd::Cancelled(report_path)),
                    _ = tokio::time::sleep(self.inter_entity_delay) => {}
                }
            }
        }

        Ok(LoopEnd::Finished(report_path))
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    runner: BatchRunner<ChromiumPortal, Box<dyn OcrEngine>>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> AppResult<Self> {
        config.validate()?;

        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)?;
        logging::log_startup(&config);

        let datastore = Datastore::from_config(&config)?;

        // 打开浏览会话（整个批次只用这一个）
        let portal = ChromiumPortal::open(&config).await?;
        let ocr = build_ocr_engine(&config);

        let runner = BatchRunner::new(portal, ocr, datastore, &config);
        Ok(Self { config, runner })
    }

    /// 运行应用主逻辑
    pub async fn run(&self, cancel: &CancellationToken) -> AppResult<RunOutcome> {
        let outcome = self.runner.run(cancel).await?;

        match &outcome {
            RunOutcome::Completed(summary) | RunOutcome::Cancelled(summary) => {
                logging::print_final_stats(&summary.progress, &self.config);
                if let Some(path) = &summary.report_path {
                    info!("📄 报表: {}", path.display());
                }
            }
            RunOutcome::AlreadyRunning => {
                warn!("⚠️ 已有运行正在进行，本次不做任何处理");
            }
        }
        Ok(outcome)
    }
}
