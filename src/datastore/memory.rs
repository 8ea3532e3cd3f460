use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::datastore::toml_file::filter_by_ids;
use crate::datastore::{EntitySource, ProgressStore, ResultSink};
use crate::error::AppResult;
use crate::models::{Entity, ObligationRecord, RunProgress, RunStatus};

/// 内存数据存储（演练模式与测试）
///
/// 每次写入进度都会追加到历史中，便于检查进度序列。
#[derive(Default)]
pub struct MemoryDatastore {
    entities: Vec<Entity>,
    records: Mutex<BTreeMap<String, ObligationRecord>>,
    progress: Mutex<Option<RunProgress>>,
    history: Mutex<Vec<RunProgress>>,
}

impl MemoryDatastore {
    pub fn with_entities(mut entities: Vec<Entity>) -> Self {
        entities.sort_by_key(|e| e.id);
        Self {
            entities,
            ..Self::default()
        }
    }

    /// 预置一条进度（模拟另一个进程留下的状态）
    pub fn with_progress(self, progress: RunProgress) -> Self {
        *self.progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(progress);
        self
    }

    /// 已写入的义务记录（按实体名称）
    pub fn records(&self) -> BTreeMap<String, ObligationRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 所有写入过的进度，按时间顺序
    pub fn progress_history(&self) -> Vec<RunProgress> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn store_progress(&self, progress: &RunProgress) {
        *self.progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(progress.clone());
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(progress.clone());
    }
}

#[async_trait]
impl EntitySource for MemoryDatastore {
    async fn fetch_entities(&self, ids: &[i64]) -> AppResult<Vec<Entity>> {
        Ok(filter_by_ids(self.entities.clone(), ids))
    }
}

#[async_trait]
impl ResultSink for MemoryDatastore {
    async fn upsert_record(&self, record: &ObligationRecord) -> AppResult<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(record.entity_name.clone(), record.clone());
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for MemoryDatastore {
    async fn load(&self) -> AppResult<Option<RunProgress>> {
        Ok(self.progress.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn save(&self, progress: &RunProgress) -> AppResult<()> {
        self.store_progress(progress);
        Ok(())
    }

    async fn claim_run(&self, fresh: &RunProgress) -> AppResult<bool> {
        let mut current = self.progress.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(current.as_ref(), Some(p) if p.status == RunStatus::Running) {
            return Ok(false);
        }
        *current = Some(fresh.clone());
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(fresh.clone());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_overwrites_by_name() {
        let store = MemoryDatastore::default();
        let mut record = ObligationRecord::new("Acme");
        store.upsert_record(&record).await.unwrap();

        record.set(
            crate::models::ObligationCategory::Vat,
            crate::models::ObligationEntry::from_scraped("Active", "01/01/2020", None),
        );
        store.upsert_record(&record).await.unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records["Acme"], record);
    }

    #[tokio::test]
    async fn test_claim_refused_while_running() {
        let store = MemoryDatastore::default();
        assert!(store.claim_run(&RunProgress::fresh_run()).await.unwrap());
        assert!(!store.claim_run(&RunProgress::fresh_run()).await.unwrap());
        assert_eq!(store.progress_history().len(), 1);
    }

    #[tokio::test]
    async fn test_entities_sorted_by_id() {
        let store = MemoryDatastore::with_entities(vec![
            Entity::new(5, "E", None),
            Entity::new(2, "B", None),
        ]);
        let ids: Vec<i64> = store
            .fetch_entities(&[])
            .await
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![2, 5]);
    }
}
