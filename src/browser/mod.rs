//! 浏览会话
//!
//! 整个批次只持有一个浏览会话；无论运行以何种方式结束都必须关闭它。

pub mod connection;
pub mod headless;

use chromiumoxide::{Browser, Page};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{BrowserMode, Config};
use crate::error::AppResult;

pub use connection::connect_to_browser_and_page;
pub use headless::launch_headless_browser;

/// 批次期间共享的浏览会话
pub struct BrowserSession {
    browser: Option<Browser>,
    handler_task: JoinHandle<()>,
    mode: BrowserMode,
}

impl BrowserSession {
    /// 按配置连接或启动浏览器，返回会话与工作页面
    pub async fn open(config: &Config) -> AppResult<(Self, Page)> {
        let (browser, page, handler_task) = match config.browser_mode {
            BrowserMode::Connect => connect_to_browser_and_page(config.browser_debug_port).await?,
            BrowserMode::Headless => {
                launch_headless_browser(config.chrome_executable.as_deref()).await?
            }
        };

        Ok((
            Self {
                browser: Some(browser),
                handler_task,
                mode: config.browser_mode.clone(),
            },
            page,
        ))
    }

    /// 关闭会话
    ///
    /// 连接模式下浏览器不归本进程所有，只断开连接；无头模式下关闭浏览器进程。
    pub async fn close(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if self.mode == BrowserMode::Headless {
                if let Err(e) = browser.close().await {
                    warn!("关闭浏览器失败: {}", e);
                }
                if let Err(e) = browser.wait().await {
                    warn!("等待浏览器退出失败: {}", e);
                }
            }
            info!("🔒 浏览会话已关闭");
        }
        self.handler_task.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Browser 自身的 Drop 会结束由本进程启动的浏览器
        self.handler_task.abort();
    }
}
