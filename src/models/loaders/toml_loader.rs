use crate::error::{AppError, AppResult, FileError};
use crate::models::entity::Entity;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

/// TOML 实体清单
#[derive(Debug, Deserialize)]
struct EntityFile {
    #[serde(default, rename = "entity")]
    entities: Vec<Entity>,
}

/// 从 TOML 文件加载实体列表，按 id 升序
pub async fn load_entities_from_toml(path: &Path) -> AppResult<Vec<Entity>> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| AppError::file_read_failed(path.display().to_string(), e))?;

    let mut entities = parse_entities(&content).map_err(|source| {
        AppError::File(FileError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    })?;
    entities.sort_by_key(|e| e.id);

    tracing::info!("从 {} 加载了 {} 个实体", path.display(), entities.len());
    Ok(entities)
}

fn parse_entities(content: &str) -> Result<Vec<Entity>, toml::de::Error> {
    let file: EntityFile = toml::from_str(content)?;
    Ok(file.entities)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[entity]]
id = 2
name = "Beta Traders"

[[entity]]
id = 1
display_name = "Acme Ltd"
external_identifier = "P051234567X"
"#;

    #[test]
    fn test_parse_entities() {
        let entities = parse_entities(SAMPLE).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].display_name, "Beta Traders");
        assert_eq!(entities[0].identifier(), None);
        assert_eq!(entities[1].identifier(), Some("P051234567X"));
    }

    #[tokio::test]
    async fn test_load_sorts_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let entities = load_entities_from_toml(&path).await.unwrap();
        let ids: Vec<i64> = entities.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let result = load_entities_from_toml(Path::new("/nonexistent/entities.toml")).await;
        assert!(matches!(result, Err(AppError::File(FileError::ReadFailed { .. }))));
    }
}
