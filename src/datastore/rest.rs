//! PostgREST 兼容的数据存储
//!
//! `DATASTORE_URL` 指向 REST 根路径（例如 `https://xyz.supabase.co/rest/v1`）。

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::Config;
use crate::datastore::{EntitySource, ProgressStore, ResultSink};
use crate::error::{AppError, AppResult, DatastoreError};
use crate::models::progress::PROGRESS_KEY;
use crate::models::{Entity, ObligationRecord, RunProgress};

/// 进度表中的一行
#[derive(Debug, Serialize, Deserialize)]
struct ProgressRow {
    id: String,
    #[serde(flatten)]
    progress: RunProgress,
}

/// REST 数据存储
pub struct RestDatastore {
    client: Client,
    base_url: String,
    api_key: String,
    entity_table: String,
    result_table: String,
    progress_table: String,
}

impl RestDatastore {
    pub fn new(config: &Config) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::request_failed(&config.datastore_url, e))?;

        Ok(Self {
            client,
            base_url: config.datastore_url.trim_end_matches('/').to_string(),
            api_key: config.datastore_key.clone(),
            entity_table: config.entity_table.clone(),
            result_table: config.result_table.clone(),
            progress_table: config.progress_table.clone(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, endpoint: &str, request: RequestBuilder) -> AppResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| AppError::request_failed(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatastoreError::BadResponse {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(response)
    }

    async fn json_rows(&self, endpoint: &str, response: Response) -> AppResult<Vec<JsonValue>> {
        response
            .json::<Vec<JsonValue>>()
            .await
            .map_err(|e| AppError::request_failed(endpoint, e))
    }

    fn progress_row(progress: &RunProgress) -> ProgressRow {
        ProgressRow {
            id: PROGRESS_KEY.to_string(),
            progress: progress.clone(),
        }
    }
}

/// 实体查询参数：按 id 升序，可选 id 过滤
pub(crate) fn entity_query(ids: &[i64]) -> Vec<(String, String)> {
    let mut query = vec![
        ("select".to_string(), "*".to_string()),
        ("order".to_string(), "id.asc".to_string()),
    ];
    if !ids.is_empty() {
        let list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        query.push(("id".to_string(), format!("in.({})", list)));
    }
    query
}

#[async_trait]
impl EntitySource for RestDatastore {
    async fn fetch_entities(&self, ids: &[i64]) -> AppResult<Vec<Entity>> {
        let endpoint = self.table_url(&self.entity_table);
        let request = self.client.get(&endpoint).query(&entity_query(ids));
        let response = self.send(&endpoint, request).await?;
        let rows = self.json_rows(&endpoint, response).await?;

        let entities = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Entity>, _>>()?;
        debug!("从 {} 读取到 {} 个实体", self.entity_table, entities.len());
        Ok(entities)
    }
}

#[async_trait]
impl ResultSink for RestDatastore {
    async fn upsert_record(&self, record: &ObligationRecord) -> AppResult<()> {
        let endpoint = self.table_url(&self.result_table);
        let request = self
            .client
            .post(&endpoint)
            .query(&[("on_conflict", "name")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&vec![record.to_row(Utc::now())]);
        self.send(&endpoint, request).await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for RestDatastore {
    async fn load(&self) -> AppResult<Option<RunProgress>> {
        let endpoint = self.table_url(&self.progress_table);
        let key_filter = format!("eq.{}", PROGRESS_KEY);
        let request = self
            .client
            .get(&endpoint)
            .query(&[("select", "*"), ("id", key_filter.as_str())]);
        let response = self.send(&endpoint, request).await?;
        let rows = self.json_rows(&endpoint, response).await?;

        match rows.into_iter().next() {
            Some(row) => {
                let row: ProgressRow = serde_json::from_value(row)?;
                Ok(Some(row.progress))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, progress: &RunProgress) -> AppResult<()> {
        let endpoint = self.table_url(&self.progress_table);
        let request = self
            .client
            .post(&endpoint)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&vec![Self::progress_row(progress)]);
        self.send(&endpoint, request).await?;
        Ok(())
    }

    async fn claim_run(&self, fresh: &RunProgress) -> AppResult<bool> {
        let endpoint = self.table_url(&self.progress_table);
        let key_filter = format!("eq.{}", PROGRESS_KEY);

        // 条件更新：只有状态不是 running 的行会被改写
        let request = self
            .client
            .patch(&endpoint)
            .query(&[("id", key_filter.as_str()), ("status", "neq.running")])
            .header("Prefer", "return=representation")
            .json(&Self::progress_row(fresh));
        let response = self.send(&endpoint, request).await?;
        if !self.json_rows(&endpoint, response).await?.is_empty() {
            return Ok(true);
        }

        // 没有更新到行：要么正在运行，要么从未创建过；尝试插入，冲突则忽略
        let request = self
            .client
            .post(&endpoint)
            .query(&[("on_conflict", "id")])
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&vec![Self::progress_row(fresh)]);
        let response = self.send(&endpoint, request).await?;
        Ok(!self.json_rows(&endpoint, response).await?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_query_all() {
        let query = entity_query(&[]);
        assert_eq!(
            query,
            vec![
                ("select".to_string(), "*".to_string()),
                ("order".to_string(), "id.asc".to_string()),
            ]
        );
    }

    #[test]
    fn test_entity_query_subset() {
        let query = entity_query(&[4, 9]);
        assert_eq!(query[2], ("id".to_string(), "in.(4,9)".to_string()));
    }

    #[test]
    fn test_progress_row_flattens_fields() {
        let row = RestDatastore::progress_row(&RunProgress::fresh_run());
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["id"], PROGRESS_KEY);
        assert_eq!(json["status"], "running");
        assert_eq!(json["percent"], 0);
        assert!(json["results"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_new_trims_trailing_slash() {
        let config = Config {
            datastore_url: "https://db.example.com/rest/v1/".to_string(),
            datastore_key: "key".to_string(),
            ..Config::default()
        };
        let store = RestDatastore::new(&config).unwrap();
        assert_eq!(
            store.table_url("companies"),
            "https://db.example.com/rest/v1/companies"
        );
    }
}
