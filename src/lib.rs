//! # Obligation Sweep
//!
//! 批量登录税务门户、抓取每个实体的义务登记状态并生成报表的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `JsExecutor` - 唯一的 page owner，提供 eval() / 截图能力
//! - `OcrEngine` - tesseract 或视觉模型，只负责图片转文字
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `Portal` - 门户导航、登录提交、抓取义务表格
//! - `CaptchaSolver` - 算术验证码求解
//! - `parse_obligation_table` - 义务表格解析
//! - `ReportGenerator` / `FailureWriter` - 报表与失败清单
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个实体"的完整处理流程
//! - `LoginFlow` - 登录状态机（最多 5 次尝试）
//! - `EntityFlow` - 标识检查 → 登录 → 抓取 → 解析
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 顺序处理全部实体，管理浏览会话
//! - `orchestrator/progress_tracker` - 全局唯一的运行进度
//!
//! 数据存储通过 `datastore/` 中的三个窄接口接入（REST / TOML / 内存）。
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod datastore;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use datastore::Datastore;
pub use error::{AppError, AppResult};
pub use models::{Entity, ObligationRecord, RunProgress, RunResult, RunStatus};
pub use orchestrator::{App, BatchRunner, RunOutcome};
pub use workflow::{EntityFlow, LoginFlow};
