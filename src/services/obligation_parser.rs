//! 义务表格解析 - 业务能力层
//!
//! 输入为门户义务表格的 innerText，逐行拆分成
//! `(标签, 状态, 生效日期, 截止日期?)`，只保留 6 个已知类别。

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::models::{ObligationCategory, ObligationEntry, ObligationRecord};

/// 一行表格拆分后的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObligationLine {
    pub category: ObligationCategory,
    pub status: String,
    pub effective_from: String,
    pub effective_to: Option<String>,
}

fn column_separator() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\t|\s{2,}|\s*\|\s*").expect("valid separator regex"))
}

/// 把一行拆成单元格
fn split_cells(line: &str) -> Vec<String> {
    column_separator()
        .split(line.trim())
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// 解析一行；标签不属于已知类别时返回 `None`
///
/// 标签取第一个能匹配类别的单元格，之前的单元格（如序号列）被忽略。
pub fn parse_line(line: &str) -> Option<ObligationLine> {
    let cells = split_cells(line);
    let label_index = cells
        .iter()
        .position(|cell| ObligationCategory::from_label(cell).is_some())?;
    let category = ObligationCategory::from_label(&cells[label_index])?;

    let field = |offset: usize| cells.get(label_index + offset).cloned().unwrap_or_default();
    let effective_to = cells
        .get(label_index + 3)
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty());

    Some(ObligationLine {
        category,
        status: field(1),
        effective_from: field(2),
        effective_to,
    })
}

/// 解析整张表格，未出现的类别保持占位值
pub fn parse_obligation_table(entity_name: &str, raw: &str) -> ObligationRecord {
    let mut record = ObligationRecord::new(entity_name);
    let mut seen = HashSet::new();

    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let Some(parsed) = parse_line(line) else {
            debug!("忽略无法识别的行: {}", line.trim());
            continue;
        };
        // 同一类别只取第一次出现的行
        if !seen.insert(parsed.category) {
            continue;
        }
        record.set(
            parsed.category,
            ObligationEntry::from_scraped(
                &parsed.status,
                &parsed.effective_from,
                parsed.effective_to.as_deref(),
            ),
        );
    }

    record
}
