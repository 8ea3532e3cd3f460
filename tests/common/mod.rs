//! 批处理测试共用的脚本化门户与 OCR

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use obligation_sweep::config::Config;
use obligation_sweep::datastore::{Datastore, MemoryDatastore};
use obligation_sweep::error::{AppError, AppResult, BrowserError};
use obligation_sweep::infrastructure::OcrEngine;
use obligation_sweep::models::Entity;
use obligation_sweep::services::{Portal, SubmitObservation};
use obligation_sweep::BatchRunner;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const TABLE_ACME: &str = "Obligation Name\tCurrent Status\tEffective From Date\tEffective To Date\n\
Income Tax - Company\tActive\t01/07/2015\t\n\
Value Added Tax (VAT)\tCancelled\t01/01/2016\t31/12/2019\n\
Income Tax - PAYE\tActive\t01/03/2017\t\n";

pub const TABLE_CARGO: &str = "Obligation Name\tCurrent Status\tEffective From Date\tEffective To Date\n\
Income Tax - Rent Income (MRI)\tActive\t01/01/2021\t\n\
Income Tax - Turnover Tax\tDormant\t01/01/2020\t\n";

/// 总是识别为 `12 + 7 =` 的 OCR
pub struct FixedOcr;

#[async_trait]
impl OcrEngine for FixedOcr {
    async fn recognize(&self, _image_path: &Path) -> AppResult<String> {
        Ok("12 + 7 =\n\x0c".to_string())
    }
}

#[derive(Default)]
struct PortalState {
    current_identifier: Option<String>,
    submissions: Vec<(String, i64)>,
    rejections_served: HashMap<String, usize>,
    tables_served: usize,
    closed: bool,
}

/// 按外部标识脚本化的门户
///
/// 克隆共享同一份状态，测试在运行结束后仍能检查门户。
#[derive(Clone, Default)]
pub struct ScriptedPortal {
    tables: HashMap<String, String>,
    /// 每个标识被拒绝的次数，之后接受登录
    rejections: HashMap<String, usize>,
    /// 抓取这些标识的表格时模拟浏览会话断开
    session_loss: Vec<String>,
    /// 抓取第 n 张表格后触发停止信号
    cancel_after_tables: Option<(usize, CancellationToken)>,
    state: Arc<Mutex<PortalState>>,
}

impl ScriptedPortal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, identifier: &str, table: &str) -> Self {
        self.tables.insert(identifier.to_string(), table.to_string());
        self
    }

    pub fn rejecting(mut self, identifier: &str, times: usize) -> Self {
        self.rejections.insert(identifier.to_string(), times);
        self
    }

    pub fn losing_session_on(mut self, identifier: &str) -> Self {
        self.session_loss.push(identifier.to_string());
        self
    }

    pub fn cancelling_after(mut self, tables: usize, token: CancellationToken) -> Self {
        self.cancel_after_tables = Some((tables, token));
        self
    }

    /// 某个标识的提交次数
    pub fn submissions_for(&self, identifier: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .submissions
            .iter()
            .filter(|(id, _)| id == identifier)
            .count()
    }

    pub fn total_submissions(&self) -> usize {
        self.state.lock().unwrap().submissions.len()
    }

    pub fn answers(&self) -> Vec<i64> {
        self.state
            .lock()
            .unwrap()
            .submissions
            .iter()
            .map(|(_, answer)| *answer)
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn current(&self) -> String {
        self.state
            .lock()
            .unwrap()
            .current_identifier
            .clone()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Portal for ScriptedPortal {
    async fn open_entry(&self) -> AppResult<()> {
        self.state.lock().unwrap().current_identifier = None;
        Ok(())
    }

    async fn capture_challenge(&self) -> AppResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn reload_challenge(&self) -> AppResult<()> {
        Ok(())
    }

    async fn submit_login(&self, identifier: &str, answer: i64) -> AppResult<()> {
        let mut state = self.state.lock().unwrap();
        state.current_identifier = Some(identifier.to_string());
        state.submissions.push((identifier.to_string(), answer));
        Ok(())
    }

    async fn observe_submission(&self, _wait: Duration) -> AppResult<SubmitObservation> {
        let identifier = self.current();
        let allowed = self.rejections.get(&identifier).copied().unwrap_or(0);
        let mut state = self.state.lock().unwrap();
        let served = state.rejections_served.entry(identifier).or_insert(0);
        if *served < allowed {
            *served += 1;
            return Ok(SubmitObservation::RejectionMarker);
        }
        Ok(SubmitObservation::NoMarker)
    }

    fn has_success_marker(&self) -> bool {
        false
    }

    async fn fetch_obligation_table(&self) -> AppResult<String> {
        let identifier = self.current();
        if self.session_loss.contains(&identifier) {
            return Err(AppError::Browser(BrowserError::SessionLost {
                source: chromiumoxide::error::CdpError::NoResponse,
            }));
        }

        let served = {
            let mut state = self.state.lock().unwrap();
            state.tables_served += 1;
            state.tables_served
        };
        if let Some((after, token)) = &self.cancel_after_tables {
            if served >= *after {
                token.cancel();
            }
        }

        Ok(self.tables.get(&identifier).cloned().unwrap_or_default())
    }

    async fn close(&self) -> AppResult<()> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// 三个实体，第 2 个没有外部标识
pub fn three_entities() -> Vec<Entity> {
    vec![
        Entity::new(1, "Acme Ltd", Some("P051111111A")),
        Entity::new(2, "Beta Traders", Some("  ")),
        Entity::new(3, "Cargo Co", Some("P053333333C")),
    ]
}

pub fn standard_portal() -> ScriptedPortal {
    ScriptedPortal::new()
        .with_table("P051111111A", TABLE_ACME)
        .with_table("P053333333C", TABLE_CARGO)
}

/// 把所有输出文件放进临时目录，并去掉等待
pub fn test_config(dir: &TempDir) -> Config {
    let path = |name: &str| -> String { dir.path().join(name).to_string_lossy().into_owned() };
    Config {
        report_dir: path("reports"),
        output_log_file: path("run_log.txt"),
        failure_log_file: path("failed_entities.txt"),
        submit_wait: Duration::ZERO,
        inter_entity_delay: Duration::ZERO,
        ..Config::default()
    }
}

pub fn runner(
    portal: &ScriptedPortal,
    store: &Arc<MemoryDatastore>,
    config: &Config,
) -> BatchRunner<ScriptedPortal, FixedOcr> {
    BatchRunner::new(
        portal.clone(),
        FixedOcr,
        Datastore::single(store.clone()),
        config,
    )
}

pub fn report_files(dir: &TempDir) -> Vec<PathBuf> {
    std::fs::read_dir(dir.path().join("reports"))
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default()
}
