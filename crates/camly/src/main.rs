use anyhow::Context;
use clap::Parser;
use database::Database;
use server::{app::ApplicationServer, services::Services};
use std::sync::Arc;
use timer::Timer;
use tokio::{signal, sync::Notify, task::JoinSet};
use tracing::info;
use utils::{AppConfig, Logger};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let camly = Camly::new().await;
    camly.run().await.expect("Camly reward engine error");

    Ok(())
}

pub struct Camly {
    timer: Timer,
    config: Arc<AppConfig>,
}

impl Camly {
    pub async fn new() -> Self {
        let config = Camly::with_config();
        // 日志在这里统一初始化，guard直接泄漏以保证进程存活期间日志可写
        let guard = Logger::new(config.cargo_env);
        std::mem::forget(guard);

        let services = Camly::with_service(config.clone()).await;
        let timer = Camly::with_timer(config.clone(), services);

        Self { timer, config }
    }

    pub async fn run(self) -> Result<JoinSet<()>, Box<dyn std::error::Error>> {
        let shutdown_notify = Arc::new(Notify::new());
        let mut set = JoinSet::new();

        // 1. 启动api & services
        // 2. 启动对账Timer

        let timer = Arc::new(self.timer);
        set.spawn(async move {
            timer.run().await;
        });

        set.spawn(async move {
            ApplicationServer::serve(self.config.clone())
                .await
                .context("🔴 Failed to start server")
                .expect("🔴 Failed to start server");
        });

        tokio::select! {
            _ = async {
                while set.join_next().await.is_some() {
                    info!("🔔 Task completed");
                }
            } => {},
            _ = shutdown_signal() => {
                info!("🔔 Shutdown signal received, stopping all tasks...");
                shutdown_notify.notify_waiters();
            },
        }
        Ok(set)
    }
}

impl Camly {
    fn with_config() -> Arc<AppConfig> {
        // 根据 CARGO_ENV 加载对应的环境配置文件
        utils::EnvLoader::load_env_file().ok();
        Arc::new(AppConfig::parse())
    }

    async fn with_service(config: Arc<AppConfig>) -> Services {
        let mongodb = Database::new(config.clone())
            .await
            .expect("mongodb wrong in camly/src/main.rs");
        mongodb.init_indexes().await.expect("index init failed in camly/src/main.rs");

        Services::new(mongodb, config)
    }

    fn with_timer(config: Arc<AppConfig>, services: Services) -> Timer {
        Timer::new(Some(config.reconcile_cron.clone()), services)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("🔴 Failed to install Ctrl+C handler");
        info!("🔔 Ctrl+C received");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("🔴 Failed to install signal handler")
            .recv()
            .await;
        info!("🔔 Terminate signal received");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::warn!("❌ Signal received, starting graceful shutdown...");
}
