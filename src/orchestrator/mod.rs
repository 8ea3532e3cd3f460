//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和进度调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量实体处理器
//! - 管理应用生命周期（初始化、运行、清理）
//! - 读取实体列表，严格顺序处理
//! - 持有浏览会话（经由 `Portal`），所有退出路径上关闭
//! - 每个实体完成后写结果、更新进度、重新生成报表
//!
//! ### `progress_tracker` - 运行进度
//! - `get_status` / `start_run` / `update`
//! - 只有 `start_run` 能进入运行中
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<Entity>)
//!     ↓
//! workflow::EntityFlow (处理单个 Entity)
//!     ↓
//! workflow::LoginFlow (登录状态机)
//!     ↓
//! services (能力层：portal / captcha / parser / report)
//!     ↓
//! infrastructure (基础设施：JsExecutor / OCR)
//! ```

pub mod batch_processor;
pub mod progress_tracker;

// 重新导出主要类型
pub use batch_processor::{App, BatchRunner, RunOutcome, RunSummary};
pub use progress_tracker::ProgressTracker;
