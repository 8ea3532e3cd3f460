//! 验证码求解服务 - 业务能力层
//!
//! 图片 → OCR 原始文本 → 清理 → 提取整数与运算符 → 计算答案

use std::io::Write;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::error::{AppError, OcrError};
use crate::infrastructure::OcrEngine;
use crate::models::{CaptchaChallenge, Operator};

/// OCR 在表达式末尾常见的噪声字符
const TRAILING_ARTIFACTS: &[char] = &['=', '?', '_', '|', '.', ':', ',', ';', '\'', '"', '~', '`'];

/// 验证码求解失败
#[derive(Debug, Error)]
pub enum CaptchaError {
    /// 识别出的整数少于两个、整数超出范围或结果溢出
    #[error("验证码识别失败: {text:?}")]
    Misread { text: String },
    /// 没有找到 `+` 或 `-`
    #[error("不支持的运算符: {text:?}")]
    UnsupportedOperator { text: String },
    /// OCR 引擎本身出错
    #[error(transparent)]
    Engine(#[from] AppError),
}

/// 去掉 OCR 输出末尾的换行、换页符和噪声标点
pub fn clean_ocr_text(raw: &str) -> String {
    raw.trim_end_matches(|c: char| c.is_whitespace() || c.is_control() || TRAILING_ARTIFACTS.contains(&c))
        .trim_start()
        .to_string()
}

fn integer_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("valid integer regex"))
}

/// 解析清理后的表达式，返回 (操作数, 运算符, 答案)
pub fn parse_expression(text: &str) -> Result<([i64; 2], Operator, i64), CaptchaError> {
    let misread = || CaptchaError::Misread {
        text: text.to_string(),
    };

    let numbers = integer_pattern()
        .find_iter(text)
        .map(|m| m.as_str().parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| misread())?;
    if numbers.len() < 2 {
        return Err(misread());
    }

    let operator = match text.find(&['+', '-'][..]).and_then(|i| text[i..].chars().next()) {
        Some('+') => Operator::Add,
        Some('-') => Operator::Subtract,
        _ => {
            return Err(CaptchaError::UnsupportedOperator {
                text: text.to_string(),
            })
        }
    };

    let operands = [numbers[0], numbers[1]];
    let answer = operator.apply(operands[0], operands[1]).ok_or_else(misread)?;
    Ok((operands, operator, answer))
}

/// 验证码求解器
pub struct CaptchaSolver<O> {
    ocr: O,
}

impl<O: OcrEngine> CaptchaSolver<O> {
    pub fn new(ocr: O) -> Self {
        Self { ocr }
    }

    /// 求解一张验证码图片
    ///
    /// 图片先写入临时文件供 OCR 读取，临时文件在返回时（无论成败）被删除。
    pub async fn solve(
        &self,
        image: Vec<u8>,
        attempt_index: u32,
    ) -> Result<CaptchaChallenge, CaptchaError> {
        let mut artifact = tempfile::Builder::new()
            .prefix("captcha-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| AppError::from(OcrError::TempImage(e)))?;
        artifact
            .write_all(&image)
            .and_then(|_| artifact.flush())
            .map_err(|e| AppError::from(OcrError::TempImage(e)))?;

        let raw = self.ocr.recognize(artifact.path()).await?;
        let recognized_text = clean_ocr_text(&raw);
        debug!("验证码 OCR: {:?} → {:?}", raw, recognized_text);

        let (operands, operator, computed_answer) = parse_expression(&recognized_text)?;
        Ok(CaptchaChallenge {
            image,
            recognized_text,
            operands,
            operator,
            computed_answer,
            attempt_index,
        })
    }
}
