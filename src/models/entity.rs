use serde::{Deserialize, Serialize};

/// 待核查的业务实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    /// 实体名称（结果表的冲突键）
    #[serde(alias = "name")]
    pub display_name: String,
    /// 门户登录用的外部标识，允许为空
    #[serde(default, alias = "kra_pin")]
    pub external_identifier: Option<String>,
}

impl Entity {
    pub fn new(
        id: i64,
        display_name: impl Into<String>,
        external_identifier: Option<&str>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            external_identifier: external_identifier.map(str::to_string),
        }
    }

    /// 去掉首尾空白后的外部标识；为空时返回 `None`
    pub fn identifier(&self) -> Option<&str> {
        self.external_identifier
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_identifier_is_missing() {
        assert_eq!(Entity::new(1, "A", None).identifier(), None);
        assert_eq!(Entity::new(2, "B", Some("   ")).identifier(), None);
        assert_eq!(
            Entity::new(3, "C", Some(" P051234567X ")).identifier(),
            Some("P051234567X")
        );
    }

    #[test]
    fn test_deserialize_datastore_row() {
        let row = r#"{"id": 4, "name": "Acme Ltd", "kra_pin": null}"#;
        let entity: Entity = serde_json::from_str(row).unwrap();
        assert_eq!(entity, Entity::new(4, "Acme Ltd", None));
    }
}
