use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

/// 未观察到时的占位值
pub const NO_OBLIGATION: &str = "No obligation";
/// 持续中的义务没有截止日期时的占位值
pub const ACTIVE: &str = "Active";

/// 税务义务类别（固定 6 种）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ObligationCategory {
    /// 公司所得税
    IncomeTaxCompany,
    /// 增值税
    Vat,
    /// 代扣个人所得税
    Paye,
    /// 租金收入税
    RentIncome,
    /// 居民个人所得税
    ResidentIndividual,
    /// 营业额税
    TurnoverTax,
}

/// 归一化后的标签片段 → 类别
static LABEL_ALIASES: phf::Map<&'static str, ObligationCategory> = phf::phf_map! {
    "income tax company" => ObligationCategory::IncomeTaxCompany,
    "corporation tax" => ObligationCategory::IncomeTaxCompany,
    "value added tax" => ObligationCategory::Vat,
    "vat" => ObligationCategory::Vat,
    "paye" => ObligationCategory::Paye,
    "pay as you earn" => ObligationCategory::Paye,
    "rent income" => ObligationCategory::RentIncome,
    "rental income" => ObligationCategory::RentIncome,
    "mri" => ObligationCategory::RentIncome,
    "resident individual" => ObligationCategory::ResidentIndividual,
    "turnover tax" => ObligationCategory::TurnoverTax,
    "tot" => ObligationCategory::TurnoverTax,
};

impl ObligationCategory {
    pub const ALL: [ObligationCategory; 6] = [
        ObligationCategory::IncomeTaxCompany,
        ObligationCategory::Vat,
        ObligationCategory::Paye,
        ObligationCategory::RentIncome,
        ObligationCategory::ResidentIndividual,
        ObligationCategory::TurnoverTax,
    ];

    /// 列名前缀
    pub fn key(self) -> &'static str {
        match self {
            ObligationCategory::IncomeTaxCompany => "income_tax_company",
            ObligationCategory::Vat => "vat",
            ObligationCategory::Paye => "paye",
            ObligationCategory::RentIncome => "rent_income",
            ObligationCategory::ResidentIndividual => "resident_individual",
            ObligationCategory::TurnoverTax => "turnover_tax",
        }
    }

    /// 报表中显示的名称
    pub fn title(self) -> &'static str {
        match self {
            ObligationCategory::IncomeTaxCompany => "Income Tax - Company",
            ObligationCategory::Vat => "VAT",
            ObligationCategory::Paye => "PAYE",
            ObligationCategory::RentIncome => "Rent Income",
            ObligationCategory::ResidentIndividual => "Resident Individual",
            ObligationCategory::TurnoverTax => "Turnover Tax",
        }
    }

    /// 根据门户表格中的标签匹配类别，未知标签返回 `None`
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = normalize_label(label);
        if normalized.is_empty() {
            return None;
        }
        if let Some(category) = LABEL_ALIASES.get(normalized.as_str()) {
            return Some(*category);
        }

        // 按整词匹配，避免 "vat" 命中 "private" 之类的单词
        let padded = format!(" {} ", normalized);
        let mut best: Option<(usize, ObligationCategory)> = None;
        for (alias, category) in LABEL_ALIASES.entries() {
            if padded.contains(&format!(" {} ", alias)) {
                let longer = best.map_or(true, |(len, _)| alias.len() > len);
                if longer {
                    best = Some((alias.len(), *category));
                }
            }
        }
        best.map(|(_, category)| category)
    }
}

impl std::fmt::Display for ObligationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.title())
    }
}

/// 小写化，非字母数字字符替换为空格，并压缩空白
fn normalize_label(label: &str) -> String {
    let replaced: String = label
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 单个类别的义务状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationEntry {
    pub status: String,
    pub effective_from: String,
    pub effective_to: String,
}

impl Default for ObligationEntry {
    fn default() -> Self {
        Self {
            status: NO_OBLIGATION.to_string(),
            effective_from: NO_OBLIGATION.to_string(),
            effective_to: NO_OBLIGATION.to_string(),
        }
    }
}

impl ObligationEntry {
    /// 由抓取到的字段构造；缺失字段按占位规则补齐
    pub fn from_scraped(status: &str, effective_from: &str, effective_to: Option<&str>) -> Self {
        let status = non_empty_or(status, NO_OBLIGATION);
        let effective_from = non_empty_or(effective_from, NO_OBLIGATION);
        let effective_to = match effective_to.map(str::trim).filter(|s| !s.is_empty()) {
            Some(to) => to.to_string(),
            None if status_is_ongoing(&status) => ACTIVE.to_string(),
            None => NO_OBLIGATION.to_string(),
        };
        Self {
            status,
            effective_from,
            effective_to,
        }
    }
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// 该状态是否表示义务仍在持续
pub fn status_is_ongoing(status: &str) -> bool {
    matches!(
        status.trim().to_ascii_lowercase().as_str(),
        "active" | "registered" | "current"
    )
}

/// 单个实体的义务记录，6 个类别始终齐全
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObligationRecord {
    pub entity_name: String,
    pub obligations: BTreeMap<ObligationCategory, ObligationEntry>,
}

impl ObligationRecord {
    /// 所有类别均为占位值的记录
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            obligations: ObligationCategory::ALL
                .iter()
                .map(|c| (*c, ObligationEntry::default()))
                .collect(),
        }
    }

    pub fn set(&mut self, category: ObligationCategory, entry: ObligationEntry) {
        self.obligations.insert(category, entry);
    }

    pub fn get(&self, category: ObligationCategory) -> Option<&ObligationEntry> {
        self.obligations.get(&category)
    }

    /// 展开为结果表的一行（`name` 为冲突键）
    pub fn to_row(&self, checked_at: DateTime<Utc>) -> JsonValue {
        let mut row = Map::new();
        row.insert("name".to_string(), json!(self.entity_name));
        for category in ObligationCategory::ALL {
            let entry = self.get(category).cloned().unwrap_or_default();
            row.insert(format!("{}_status", category.key()), json!(entry.status));
            row.insert(format!("{}_from", category.key()), json!(entry.effective_from));
            row.insert(format!("{}_to", category.key()), json!(entry.effective_to));
        }
        row.insert("checked_at".to_string(), json!(checked_at.to_rfc3339()));
        JsonValue::Object(row)
    }
}

/// 实体级失败类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 没有外部标识，未尝试登录
    MissingIdentifier,
    /// 登录次数用尽
    LoginAttemptsExhausted,
    /// 登录后抓取失败
    ExtractionFailure,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::MissingIdentifier => "MissingIdentifier",
            FailureKind::LoginAttemptsExhausted => "LoginAttemptsExhausted",
            FailureKind::ExtractionFailure => "ExtractionFailure",
        };
        write!(f, "{}", name)
    }
}

/// 实体处理失败时代替义务记录写入的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub entity_name: String,
    pub error_message: String,
    pub kind: FailureKind,
}

impl ErrorResult {
    pub fn new(entity_name: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            error_message: message.into(),
            kind,
        }
    }
}

/// 进度结果列表中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RunResult {
    Record(ObligationRecord),
    Error(ErrorResult),
}

impl RunResult {
    pub fn entity_name(&self) -> &str {
        match self {
            RunResult::Record(record) => &record.entity_name,
            RunResult::Error(error) => &error.entity_name,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RunResult::Error(_))
    }
}
