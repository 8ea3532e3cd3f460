//! JS 执行器 - 基础设施层
//!
//! 持有唯一的 page 资源，只暴露"导航 / 执行 JS / 截图"的能力

use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Page;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::error::{AppError, AppResult, BrowserError};

/// 轮询页面文本的间隔
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// JS 执行器
///
/// 职责：
/// - 持有唯一的 Page 资源
/// - 暴露 eval() / goto() / 截图能力
/// - 不认识 Entity / 义务
/// - 不处理业务流程
pub struct JsExecutor {
    page: Page,
}

impl JsExecutor {
    /// 创建新的 JS 执行器
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    /// 获取 page 的引用（用于其他操作）
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 导航到指定地址并等待加载完成
    pub async fn goto(&self, url: &str) -> AppResult<()> {
        debug!("导航到: {}", url);
        self.page.goto(url).await.map_err(|e| navigation_error(url, e))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| navigation_error(url, e))?;
        Ok(())
    }

    /// 执行 JS 代码并返回 JSON 结果
    pub async fn eval(&self, js_code: impl Into<String>) -> AppResult<JsonValue> {
        let result = self.page.evaluate(js_code.into()).await?;
        let json_value = result.into_value()?;
        Ok(json_value)
    }

    /// 执行 JS 代码并反序列化为指定类型
    pub async fn eval_as<T: DeserializeOwned>(&self, js_code: impl Into<String>) -> AppResult<T> {
        let json_value = self.eval(js_code).await?;
        let typed_value = serde_json::from_value(json_value)?;
        Ok(typed_value)
    }

    /// 给输入框赋值并触发 input/change 事件
    pub async fn fill(&self, selector: &str, value: &str) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.value = {value};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            selector = serde_json::to_string(selector)?,
            value = serde_json::to_string(value)?,
        );
        self.expect_element(selector, js_code).await
    }

    /// 点击元素
    pub async fn click(&self, selector: &str) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.click();
                return true;
            }})()
            "#,
            selector = serde_json::to_string(selector)?,
        );
        self.expect_element(selector, js_code).await
    }

    /// 读取元素的 innerText
    pub async fn inner_text(&self, selector: &str) -> AppResult<String> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                return el ? el.innerText : null;
            }})()
            "#,
            selector = serde_json::to_string(selector)?,
        );
        let text: Option<String> = self.eval_as(js_code).await?;
        text.ok_or_else(|| {
            AppError::Browser(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
        })
    }

    /// 在 `timeout` 内等待元素出现（图片需加载完成）
    pub async fn wait_for_element(&self, selector: &str, timeout: Duration) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                return el.tagName !== 'IMG' || (el.complete && el.naturalWidth > 0);
            }})()
            "#,
            selector = serde_json::to_string(selector)?,
        );
        let deadline = Instant::now() + timeout;
        loop {
            let ready: bool = self.eval_as(js_code.as_str()).await?;
            if ready {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(AppError::Browser(BrowserError::ElementNotFound {
                    selector: selector.to_string(),
                }));
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// 清除浏览器 cookie，使下一次导航从未登录状态开始
    pub async fn clear_cookies(&self) -> AppResult<()> {
        self.page.execute(ClearBrowserCookiesParams::default()).await?;
        Ok(())
    }

    /// 截取单个元素的 PNG 图像
    pub async fn element_png(&self, selector: &str) -> AppResult<Vec<u8>> {
        let element = self.page.find_element(selector).await.map_err(|_| {
            AppError::Browser(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            })
        })?;
        let png = element.screenshot(CaptureScreenshotFormat::Png).await?;
        Ok(png)
    }

    async fn expect_element(&self, selector: &str, js_code: String) -> AppResult<()> {
        let found: bool = self.eval_as(js_code).await?;
        if found {
            Ok(())
        } else {
            Err(AppError::Browser(BrowserError::ElementNotFound {
                selector: selector.to_string(),
            }))
        }
    }
}

fn navigation_error(url: &str, err: chromiumoxide::error::CdpError) -> AppError {
    match AppError::from(err) {
        AppError::Browser(BrowserError::ScriptExecutionFailed { source }) => {
            AppError::Browser(BrowserError::NavigationFailed {
                url: url.to_string(),
                source,
            })
        }
        other => other,
    }
}
