//! 候诊队列服务主程序

use anyhow::{Context, Result};
use carequeue_admin::{init_logging, CareQueueConfig, ConfigManager, ConfigValidator};
use carequeue_engine::{
    EngineConfig, ProgressSimulator, QueueEngine, SimulationConfig, SubscriptionTopic,
};
use carequeue_web::WebServer;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::net::SocketAddr;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// 候诊队列服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "carequeue-server")]
#[command(about = "科室候诊队列调度与等待时间估算服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    /// 启用 HTTP 接口
    #[arg(long)]
    http: bool,

    /// HTTP 监听端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 启用模拟进度（仅用于演示）
    #[arg(long)]
    simulate: bool,

    /// 模拟进度的随机种子
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn apply(&self, config: &mut CareQueueConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if self.http {
            config.server.enable_http = true;
        }
        if self.simulate {
            config.simulation.enabled = true;
        }
        if self.seed.is_some() {
            config.simulation.seed = self.seed;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let manager = ConfigManager::load(args.config.as_deref())?;
    let mut config = manager.get_config().await;
    args.apply(&mut config);
    ConfigValidator::new().validate(&config)?;

    init_logging(&config.logging)?;
    info!("启动候诊队列服务...");

    let engine = QueueEngine::new(EngineConfig {
        read_timeout: config.read_timeout(),
        notification_capacity: config.engine.notification_capacity,
    });
    for department in config.departments() {
        engine
            .register_department(department)
            .await
            .context("Failed to register configured department")?;
    }
    info!("已注册 {} 个科室", config.departments.len());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = vec![spawn_event_logger(&engine, shutdown_rx.clone())];

    if config.simulation.enabled {
        let rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let simulator = ProgressSimulator::new(
            SimulationConfig {
                tick_interval: config.tick_interval(),
                start_probability: config.simulation.start_probability,
                complete_probability: config.simulation.complete_probability,
            },
            rng,
        )?;
        let engine = engine.clone();
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            simulator.run(engine, shutdown).await;
        }));
    }

    if config.server.enable_http {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .context("Invalid server address")?;
        let server = WebServer::new(addr, engine.clone());
        let mut shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            let signal = async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            };
            if let Err(e) = server.run(signal).await {
                error!("HTTP 服务异常退出: {}", e);
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("收到停止信号，正在关闭...");

    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            error!("后台任务异常结束: {}", e);
        }
    }

    info!("候诊队列服务已停止");
    Ok(())
}

/// 把所有队列事件写入日志
fn spawn_event_logger(engine: &QueueEngine, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let mut events = engine.subscribe(SubscriptionTopic::All);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => info!(
                        "{} patient={} department={} status={} position={:?} eta={:?}",
                        event.event_type.as_str(),
                        event.patient_id,
                        event.department_id,
                        event.status,
                        event.position,
                        event.estimated_wait_minutes
                    ),
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}
