use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wey_client::{
    services::notice::NoticeLevel,
    ClientState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置
    dotenv::dotenv().ok();

    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "wey_client=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting wey client...");

    let config = Config::from_env()?;
    info!("API base: {} ({})", config.api_base_url, config.environment);

    let state = ClientState::new(config.clone()).await?;

    // 提示输出到日志
    let mut notices = state.notices.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice.level {
                NoticeLevel::Success => info!("[提示] {}", notice.message),
                NoticeLevel::Error => warn!("[错误] {}", notice.message),
            }
        }
    });

    match (&config.login_email, &config.login_password) {
        (Some(email), Some(password)) => {
            if let Err(e) = state.auth_service.login(email, password).await {
                error!("Login failed: {}", e);
                return Err(anyhow::anyhow!("Login failed"));
            }
        }
        _ => warn!("WEY_EMAIL / WEY_PASSWORD not set, running anonymously"),
    }

    if state.is_authenticated() {
        let profile = state.auth_service.me().await?;
        info!("Signed in as {} <{}>", profile.name, profile.email);
    }

    match state.post_service.feed().await {
        Ok(posts) => info!("Feed loaded: {} posts", posts.len()),
        Err(e) => warn!("Failed to load feed: {}", e),
    }

    // 启动后台任务
    start_background_tasks(&state);

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    state.logout();
    Ok(())
}

fn start_background_tasks(state: &ClientState) {
    info!("Starting background tasks...");

    if state.is_authenticated() {
        state
            .notification_service
            .spawn_poller(state.config.notification_poll_interval());
    }

    // 清理长时间未使用的缓存
    let cache = state.cache.clone();
    let max_idle = state.config.cache_stale_after() * 10;
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let evicted = cache.evict_older_than(max_idle);
            if evicted > 0 {
                info!("Evicted {} idle cache entries", evicted);
            }
        }
    });

    info!("Background tasks started successfully");
}
