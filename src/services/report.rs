//! 报表生成服务 - 业务能力层
//!
//! 每处理完一个实体就根据当前结果列表重新生成整张表，
//! 因此运行被中断时磁盘上始终有一份完整可用的报表。
//!
//! `ReportTable::build` 只计算每个单元格的文字与底色；
//! `ReportGenerator` 负责把它写成 xlsx 文件。

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook, XlsxError};
use tracing::debug;

use crate::error::{AppError, AppResult, FileError};
use crate::models::{ObligationCategory, ObligationEntry, RunResult};

/// 单元格底色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    /// 无底色
    Plain,
    /// 类别默认底色
    Category(ObligationCategory),
    /// 无义务 / 休眠 / 缺失
    Red,
    /// 已注销
    Amber,
    /// 错误列（实体处理失败）
    ErrorFill,
}

impl Tint {
    /// 由义务状态决定底色
    pub fn for_status(category: ObligationCategory, status: Option<&str>) -> Self {
        let status = status.map(str::trim).unwrap_or_default().to_ascii_lowercase();
        match status.as_str() {
            "" | "no obligation" | "dormant" => Tint::Red,
            "cancelled" | "canceled" => Tint::Amber,
            _ => Tint::Category(category),
        }
    }

    fn color(self) -> Option<Color> {
        let rgb = match self {
            Tint::Plain => return None,
            Tint::Red => 0xFFC7CE,
            Tint::Amber => 0xFFE699,
            Tint::ErrorFill => 0xFF0000,
            Tint::Category(category) => match category {
                ObligationCategory::IncomeTaxCompany => 0xDDEBF7,
                ObligationCategory::Vat => 0xE2EFDA,
                ObligationCategory::Paye => 0xFCE4D6,
                ObligationCategory::RentIncome => 0xEDE7F6,
                ObligationCategory::ResidentIndividual => 0xE0F7FA,
                ObligationCategory::TurnoverTax => 0xF2F2F2,
            },
        };
        Some(Color::RGB(rgb))
    }
}

/// 报表单元格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportCell {
    pub text: String,
    pub tint: Tint,
}

impl ReportCell {
    fn new(text: impl Into<String>, tint: Tint) -> Self {
        Self {
            text: text.into(),
            tint,
        }
    }
}

/// 报表内容（不含文件格式细节）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<ReportCell>>,
}

impl ReportTable {
    /// 每个实体一行：名称、每个类别的 状态/起/止 三列、错误列
    pub fn build(results: &[RunResult]) -> Self {
        let mut headers = vec!["Entity".to_string()];
        for category in ObligationCategory::ALL {
            headers.push(format!("{} Status", category.title()));
            headers.push(format!("{} From", category.title()));
            headers.push(format!("{} To", category.title()));
        }
        headers.push("Error".to_string());

        let rows = results.iter().map(build_row).collect();
        Self { headers, rows }
    }
}

fn build_row(result: &RunResult) -> Vec<ReportCell> {
    // 失败行连名称一起标红
    let name_tint = if result.is_error() { Tint::Red } else { Tint::Plain };
    let mut row = vec![ReportCell::new(result.entity_name(), name_tint)];

    for category in ObligationCategory::ALL {
        let entry: Option<&ObligationEntry> = match result {
            RunResult::Record(record) => record.get(category),
            RunResult::Error(_) => None,
        };
        let tint = Tint::for_status(category, entry.map(|e| e.status.as_str()));
        match entry {
            Some(entry) => {
                row.push(ReportCell::new(&entry.status, tint));
                row.push(ReportCell::new(&entry.effective_from, tint));
                row.push(ReportCell::new(&entry.effective_to, tint));
            }
            None => {
                for _ in 0..3 {
                    row.push(ReportCell::new("", tint));
                }
            }
        }
    }

    match result {
        RunResult::Error(error) => {
            row.push(ReportCell::new(&error.error_message, Tint::ErrorFill))
        }
        RunResult::Record(_) => row.push(ReportCell::new("", Tint::Plain)),
    }
    row
}

/// 报表生成器
pub struct ReportGenerator {
    output_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// 某个运行日期对应的报表路径
    pub fn report_path(&self, run_date: NaiveDate) -> PathBuf {
        self.output_dir
            .join(format!("obligations_{}.xlsx", run_date.format("%Y-%m-%d")))
    }

    /// 从头重写报表并返回文件路径
    ///
    /// 先写临时文件再改名，读者不会看到写了一半的文件。
    pub fn render(&self, results: &[RunResult], run_date: NaiveDate) -> AppResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| AppError::write_failed(self.output_dir.display().to_string(), e))?;

        let path = self.report_path(run_date);
        let staging = path.with_extension("xlsx.tmp");
        let table = ReportTable::build(results);

        write_workbook(&table, &staging).map_err(|e| report_error(&staging, e))?;
        std::fs::rename(&staging, &path)
            .map_err(|e| AppError::write_failed(path.display().to_string(), e))?;

        debug!("报表已更新: {} ({} 行)", path.display(), table.rows.len());
        Ok(path)
    }
}

fn write_workbook(table: &ReportTable, path: &Path) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Obligations")?;

    let header_format = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_background_color(Color::RGB(0xBFBFBF));
    for (col, header) in table.headers.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &header_format)?;
    }

    for (row_index, row) in table.rows.iter().enumerate() {
        let xlsx_row = row_index as u32 + 1;
        for (col, cell) in row.iter().enumerate() {
            let mut format = Format::new().set_border(FormatBorder::Thin);
            if let Some(color) = cell.tint.color() {
                format = format.set_background_color(color);
            }
            worksheet.write_string_with_format(xlsx_row, col as u16, &cell.text, &format)?;
        }
    }

    worksheet.set_column_width(0, 32)?;
    for col in 1..table.headers.len() {
        worksheet.set_column_width(col as u16, 16)?;
    }
    worksheet.set_freeze_panes(1, 1)?;

    workbook.save(path)?;
    Ok(())
}

fn report_error(path: &Path, err: XlsxError) -> AppError {
    AppError::File(FileError::ReportFailed {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}
