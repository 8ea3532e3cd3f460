use anyhow::Result;
use obligation_sweep::utils::logging;
use obligation_sweep::{App, Config, RunOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    // 加载配置
    let config = Config::from_env()?;

    // Ctrl-C 不会打断正在进行的提交，在下一个检查点停止
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("⏹️ 收到 Ctrl-C，当前实体处理完后停止");
            signal_token.cancel();
        }
    });

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    match app.run(&cancel).await? {
        RunOutcome::Completed(_) => Ok(()),
        RunOutcome::AlreadyRunning => {
            warn!("⚠️ 已有运行在进行，退出");
            Ok(())
        }
        RunOutcome::Cancelled(_) => anyhow::bail!("run cancelled"),
    }
}
