//! 目标门户 - 业务能力层
//!
//! `Portal` 是登录状态机与实体处理器看到的门户边界；
//! `ChromiumPortal` 用共享浏览会话实现它。

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::browser::BrowserSession;
use crate::config::{Config, PortalSelectors};
use crate::error::AppResult;
use crate::infrastructure::JsExecutor;

/// 验证码图片加载的最长等待
const CHALLENGE_LOAD_TIMEOUT: Duration = Duration::from_secs(15);
/// 义务表格加载的最长等待
const TABLE_LOAD_TIMEOUT: Duration = Duration::from_secs(20);

/// 提交登录后在页面上观察到的标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitObservation {
    /// 出现了拒绝标记
    RejectionMarker,
    /// 出现了成功标记
    SuccessMarker,
    /// 等待期内两者都没有出现
    NoMarker,
}

/// 目标门户
#[async_trait]
pub trait Portal: Send + Sync {
    /// 从入口重新导航并渲染验证码
    async fn open_entry(&self) -> AppResult<()>;

    /// 截取当前验证码图片
    async fn capture_challenge(&self) -> AppResult<Vec<u8>>;

    /// 刷新验证码
    async fn reload_challenge(&self) -> AppResult<()>;

    /// 填写实体标识与验证码答案并提交
    async fn submit_login(&self, identifier: &str, answer: i64) -> AppResult<()>;

    /// 在 `wait` 内观察提交结果
    async fn observe_submission(&self, wait: Duration) -> AppResult<SubmitObservation>;

    /// 是否配置了正向成功标记
    fn has_success_marker(&self) -> bool;

    /// 进入义务页面并返回表格原始文本
    async fn fetch_obligation_table(&self) -> AppResult<String>;

    /// 释放浏览会话
    async fn close(&self) -> AppResult<()>;
}

/// 基于 chromiumoxide 的门户实现
pub struct ChromiumPortal {
    executor: JsExecutor,
    session: Mutex<Option<BrowserSession>>,
    entry_url: String,
    obligations_url: String,
    rejection_marker: String,
    success_marker: Option<String>,
    selectors: PortalSelectors,
}

impl ChromiumPortal {
    /// 打开浏览会话并创建门户
    pub async fn open(config: &Config) -> AppResult<Self> {
        let (session, page) = BrowserSession::open(config).await?;
        Ok(Self {
            executor: JsExecutor::new(page),
            session: Mutex::new(Some(session)),
            entry_url: config.portal_url.clone(),
            obligations_url: config.obligations_page_url(),
            rejection_marker: config.rejection_marker.clone(),
            success_marker: config.success_marker.clone(),
            selectors: config.selectors.clone(),
        })
    }
}

#[async_trait]
impl Portal for ChromiumPortal {
    async fn open_entry(&self) -> AppResult<()> {
        self.executor.clear_cookies().await?;
        self.executor.goto(&self.entry_url).await?;
        self.executor
            .wait_for_element(&self.selectors.captcha_image, CHALLENGE_LOAD_TIMEOUT)
            .await
    }

    async fn capture_challenge(&self) -> AppResult<Vec<u8>> {
        self.executor.element_png(&self.selectors.captcha_image).await
    }

    async fn reload_challenge(&self) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                const img = document.querySelector({selector});
                if (!img) return false;
                const base = img.src.split('?')[0];
                img.src = base + '?r=' + Date.now();
                return true;
            }})()
            "#,
            selector = serde_json::to_string(&self.selectors.captcha_image)?,
        );
        let reloaded: bool = self.executor.eval_as(js_code).await?;
        if !reloaded {
            // 页面状态已乱，从入口重新开始
            debug!("验证码图片缺失，重新导航到入口");
            return self.open_entry().await;
        }
        self.executor
            .wait_for_element(&self.selectors.captcha_image, CHALLENGE_LOAD_TIMEOUT)
            .await
    }

    async fn submit_login(&self, identifier: &str, answer: i64) -> AppResult<()> {
        self.executor
            .fill(&self.selectors.identifier_input, identifier)
            .await?;
        self.executor
            .fill(&self.selectors.answer_input, &answer.to_string())
            .await?;
        self.executor.click(&self.selectors.submit_button).await
    }

    async fn observe_submission(&self, wait: Duration) -> AppResult<SubmitObservation> {
        let js_code = format!(
            r#"
            (() => {{
                const text = (document.body && document.body.innerText) || '';
                if (text.includes({rejection})) return 'rejected';
                const success = {success};
                if (success !== null && text.includes(success)) return 'success';
                return null;
            }})()
            "#,
            rejection = serde_json::to_string(&self.rejection_marker)?,
            success = serde_json::to_string(&self.success_marker)?,
        );

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let seen: Option<String> = self.executor.eval_as(js_code.as_str()).await?;
            match seen.as_deref() {
                Some("rejected") => return Ok(SubmitObservation::RejectionMarker),
                Some("success") => return Ok(SubmitObservation::SuccessMarker),
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(SubmitObservation::NoMarker);
            }
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    fn has_success_marker(&self) -> bool {
        self.success_marker.is_some()
    }

    async fn fetch_obligation_table(&self) -> AppResult<String> {
        self.executor.goto(&self.obligations_url).await?;
        self.executor
            .wait_for_element(&self.selectors.obligations_table, TABLE_LOAD_TIMEOUT)
            .await?;
        self.executor
            .inner_text(&self.selectors.obligations_table)
            .await
    }

    async fn close(&self) -> AppResult<()> {
        if let Some(mut session) = self.session.lock().await.take() {
            if let Err(e) = self.executor.page().clone().close().await {
                debug!("关闭页面失败: {}", e);
            }
            session.close().await;
        }
        Ok(())
    }
}
