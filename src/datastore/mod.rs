//! 数据存储边界
//!
//! 核心流程只通过三个窄接口与外部数据存储交互：
//! - `EntitySource`：读取待处理实体
//! - `ResultSink`：按实体名称 upsert 义务记录
//! - `ProgressStore`：读写全局唯一的运行进度

pub mod memory;
pub mod rest;
pub mod toml_file;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, DatastoreBackend};
use crate::error::AppResult;
use crate::models::{Entity, ObligationRecord, RunProgress};

pub use memory::MemoryDatastore;
pub use rest::RestDatastore;
pub use toml_file::TomlEntitySource;

/// 实体来源
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// 按 id 升序返回实体；`ids` 非空时只返回这些实体
    async fn fetch_entities(&self, ids: &[i64]) -> AppResult<Vec<Entity>>;
}

/// 义务记录写入
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// 以实体名称为冲突键 upsert，重复运行只会覆盖
    async fn upsert_record(&self, record: &ObligationRecord) -> AppResult<()>;
}

/// 运行进度存储（单行，固定主键）
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// 读取当前进度；从未运行过时为 `None`
    async fn load(&self) -> AppResult<Option<RunProgress>>;

    /// 覆盖写入进度（last-writer-wins）
    async fn save(&self, progress: &RunProgress) -> AppResult<()>;

    /// 仅当当前状态不是运行中时写入 `fresh`，返回是否写入成功
    async fn claim_run(&self, fresh: &RunProgress) -> AppResult<bool>;
}

/// 运行期使用的三个数据存储接口
#[derive(Clone)]
pub struct Datastore {
    pub entities: Arc<dyn EntitySource>,
    pub results: Arc<dyn ResultSink>,
    pub progress: Arc<dyn ProgressStore>,
}

impl Datastore {
    /// 三个接口由同一个后端实现
    pub fn single<D>(backend: Arc<D>) -> Self
    where
        D: EntitySource + ResultSink + ProgressStore + 'static,
    {
        Self {
            entities: backend.clone(),
            results: backend.clone(),
            progress: backend,
        }
    }

    /// 按配置创建数据存储
    pub fn from_config(config: &Config) -> AppResult<Self> {
        match config.datastore_backend {
            DatastoreBackend::Rest => Ok(Self::single(Arc::new(RestDatastore::new(config)?))),
            DatastoreBackend::Toml => {
                let memory = Arc::new(MemoryDatastore::default());
                Ok(Self {
                    entities: Arc::new(TomlEntitySource::new(&config.entity_file)),
                    results: memory.clone(),
                    progress: memory,
                })
            }
            DatastoreBackend::Memory => Ok(Self::single(Arc::new(MemoryDatastore::default()))),
        }
    }
}
