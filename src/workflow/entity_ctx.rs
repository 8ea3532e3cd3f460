//! 实体处理上下文
//!
//! 封装"我正在处理第几个实体、它是谁"这一信息

use std::fmt::Display;

use crate::models::Entity;

/// 实体处理上下文
#[derive(Debug, Clone)]
pub struct EntityCtx {
    /// 在本次运行中的序号（从1开始）
    pub entity_index: usize,

    /// 本次运行的实体总数
    pub total: usize,

    /// 实体ID
    pub entity_id: i64,

    /// 实体名称
    pub display_name: String,
}

impl EntityCtx {
    /// 创建新的实体上下文
    pub fn new(entity_index: usize, total: usize, entity: &Entity) -> Self {
        Self {
            entity_index,
            total,
            entity_id: entity.id,
            display_name: entity.display_name.clone(),
        }
    }
}

impl Display for EntityCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[实体 {}/{} #{} {}]",
            self.entity_index, self.total, self.entity_id, self.display_name
        )
    }
}
