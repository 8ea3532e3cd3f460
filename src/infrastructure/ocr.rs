//! OCR 引擎 - 基础设施层
//!
//! 只负责"把一张图片变成文字"，不理解验证码的含义。
//!
//! ## 可选后端
//! - `TesseractOcr`：调用本地 `tesseract` 命令行
//! - `VisionOcr`：通过 `async-openai` 调用兼容 OpenAI API 的视觉模型

use std::path::Path;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::{Config, OcrBackend};
use crate::error::{AppError, AppResult, OcrError};

/// OCR 引擎
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// 识别图片文件中的文字，返回未经清理的原始输出
    async fn recognize(&self, image_path: &Path) -> AppResult<String>;
}

/// 根据配置创建 OCR 引擎
pub fn build_ocr_engine(config: &Config) -> Box<dyn OcrEngine> {
    match config.ocr_backend {
        OcrBackend::Tesseract => Box::new(TesseractOcr::new(&config.tesseract_bin)),
        OcrBackend::Vision => Box::new(VisionOcr::new(config)),
    }
}

#[async_trait]
impl<T: OcrEngine + ?Sized> OcrEngine for Box<T> {
    async fn recognize(&self, image_path: &Path) -> AppResult<String> {
        (**self).recognize(image_path).await
    }
}

/// 本地 tesseract 命令行
pub struct TesseractOcr {
    program: String,
}

impl TesseractOcr {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(&self, image_path: &Path) -> AppResult<String> {
        debug!("tesseract 识别: {}", image_path.display());

        // --psm 7：把图片当作单行文字
        let output = Command::new(&self.program)
            .arg(image_path)
            .arg("stdout")
            .args(["--psm", "7"])
            .output()
            .await
            .map_err(|source| OcrError::SpawnFailed {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(OcrError::ProcessFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// 视觉模型 OCR
pub struct VisionOcr {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl VisionOcr {
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.vision_api_key)
            .with_api_base(&config.vision_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.vision_model.clone(),
        }
    }

    fn vision_error(&self, message: impl std::fmt::Display) -> AppError {
        OcrError::VisionFailed {
            model: self.model_name.clone(),
            message: message.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn recognize(&self, image_path: &Path) -> AppResult<String> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| AppError::file_read_failed(image_path.display().to_string(), e))?;
        let data_url = format!(
            "data:image/png;base64,{}",
            general_purpose::STANDARD.encode(&bytes)
        );
        debug!("调用视觉模型识别验证码，模型: {}", self.model_name);

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content("Transcribe the arithmetic expression in the image exactly, e.g. `12 + 7`. Reply with the expression only.")
            .build()
            .map_err(|e| self.vision_error(e))?;

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(ChatCompletionRequestUserMessageContent::Array(vec![
                ChatCompletionRequestUserMessageContentPart::Text(
                    ChatCompletionRequestMessageContentPartText {
                        text: "What does the image say?".to_string(),
                    },
                ),
                ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: data_url,
                            detail: Some(ImageDetail::High),
                        },
                    },
                ),
            ]))
            .build()
            .map_err(|e| self.vision_error(e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(0.0)
            .max_tokens(32u32)
            .build()
            .map_err(|e| self.vision_error(e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("视觉模型调用失败: {}", e);
            self.vision_error(e)
        })?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| self.vision_error("返回内容为空"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_tesseract_binary_is_spawn_error() {
        let ocr = TesseractOcr::new("definitely-not-a-real-ocr-binary");
        let result = ocr.recognize(Path::new("/tmp/none.png")).await;
        assert!(matches!(
            result,
            Err(AppError::Ocr(OcrError::SpawnFailed { .. }))
        ));
    }
}
