use std::path::PathBuf;

use async_trait::async_trait;

use crate::datastore::EntitySource;
use crate::error::AppResult;
use crate::models::{load_entities_from_toml, Entity};

/// 从本地 TOML 清单读取实体
pub struct TomlEntitySource {
    path: PathBuf,
}

impl TomlEntitySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EntitySource for TomlEntitySource {
    async fn fetch_entities(&self, ids: &[i64]) -> AppResult<Vec<Entity>> {
        let entities = load_entities_from_toml(&self.path).await?;
        Ok(filter_by_ids(entities, ids))
    }
}

/// 按 id 过滤；`ids` 为空时原样返回
pub(crate) fn filter_by_ids(entities: Vec<Entity>, ids: &[i64]) -> Vec<Entity> {
    if ids.is_empty() {
        return entities;
    }
    entities.into_iter().filter(|e| ids.contains(&e.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_with_id_subset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.toml");
        std::fs::write(
            &path,
            "[[entity]]\nid = 1\nname = \"A\"\n\n[[entity]]\nid = 2\nname = \"B\"\n\n[[entity]]\nid = 3\nname = \"C\"\n",
        )
        .unwrap();

        let source = TomlEntitySource::new(&path);
        assert_eq!(source.fetch_entities(&[]).await.unwrap().len(), 3);

        let subset = source.fetch_entities(&[3, 1]).await.unwrap();
        let names: Vec<&str> = subset.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["A", "C"]);
    }
}
