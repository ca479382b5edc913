use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uploader_config::{AppConfig, LogFormat};
use uploader_domain::{ProgressSink, TaskRecord, UploadInput, UploadOutcome};
use uploader_infrastructure::{ChannelProgressSink, TracingProgressSink};

mod app;

use app::Application;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path).context("加载配置失败")?;

    // 命令行参数优先于配置文件
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
    }

    init_logging(
        &config.observability.log_level,
        config.observability.log_format,
    )?;
    if config.observability.metrics_enabled {
        init_metrics(&config.observability.metrics_listen)?;
    }

    match matches.subcommand() {
        Some(("upload", sub)) => run_upload(&config, sub).await,
        Some(("list", sub)) => run_list(&config, sub).await,
        Some(("watch", sub)) => run_watch(&config, sub).await,
        Some(("clear", _)) => run_clear(&config).await,
        Some(("config", _)) => {
            println!("{}", config.to_toml()?);
            Ok(())
        }
        _ => Err(anyhow::anyhow!("未知的子命令")),
    }
}

fn build_cli() -> Command {
    Command::new("uploader")
        .version("1.0.0")
        .about("持久化照片上传任务队列")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .global(true)
                .help("日志格式")
                .value_parser(["json", "pretty"]),
        )
        .subcommand(
            Command::new("upload")
                .about("上传一组照片，失败时按退避策略重试")
                .arg(
                    Arg::new("user-id")
                        .short('u')
                        .long("user-id")
                        .value_name("ID")
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(clap::value_parser!(i64))
                        .help("用户ID"),
                )
                .arg(
                    Arg::new("title")
                        .short('t')
                        .long("title")
                        .default_value("")
                        .help("帖子标题"),
                )
                .arg(
                    Arg::new("content")
                        .long("content")
                        .default_value("")
                        .help("帖子内容"),
                )
                .arg(
                    Arg::new("fail-until")
                        .long("fail-until")
                        .value_name("ATTEMPT")
                        .default_value("0")
                        .value_parser(clap::value_parser!(u32))
                        .help("尝试序号小于该值时模拟失败"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("进度只写入日志"),
                )
                .arg(
                    Arg::new("photos")
                        .value_name("PHOTO")
                        .num_args(0..)
                        .help("照片路径或 file:// URI"),
                ),
        )
        .subcommand(
            Command::new("list").about("列出所有上传任务").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("以JSON输出"),
            ),
        )
        .subcommand(
            Command::new("watch").about("持续显示上传任务状态").arg(
                Arg::new("interval-ms")
                    .long("interval-ms")
                    .default_value("1000")
                    .value_parser(clap::value_parser!(u64))
                    .help("刷新间隔（毫秒）"),
            ),
        )
        .subcommand(Command::new("clear").about("清空所有上传任务记录"))
        .subcommand(Command::new("config").about("打印生效的配置"))
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: LogFormat) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        LogFormat::Pretty => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
    }

    Ok(())
}

fn init_metrics(listen: &str) -> Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("无效的指标监听地址: {listen}"))?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    info!("Prometheus exporter listening on {}", addr);
    Ok(())
}

async fn run_upload(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let user_id = *matches
        .get_one::<i64>("user-id")
        .context("缺少 --user-id")?;
    let title = matches.get_one::<String>("title").cloned().unwrap_or_default();
    let content = matches
        .get_one::<String>("content")
        .cloned()
        .unwrap_or_default();
    let fail_until = matches.get_one::<u32>("fail-until").copied().unwrap_or(0);
    let photos: Vec<String> = matches
        .get_many::<String>("photos")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let input = UploadInput::new(user_id, title, content)
        .with_locators(photos)
        .with_fail_until_attempt(fail_until);

    let (progress, printer): (Arc<dyn ProgressSink>, _) = if matches.get_flag("quiet") {
        (Arc::new(TracingProgressSink), None)
    } else {
        let (sink, mut rx) = ChannelProgressSink::new(64);
        let printer = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                println!("[{}] {:>3}% {}", update.title, update.progress, update.message);
            }
        });
        (Arc::new(sink), Some(printer))
    };

    let app = Application::new(config, progress).await?;
    let submitted = app.dispatcher().submit(input);
    info!("已提交上传任务: {}", submitted.task_id);

    let task_id = submitted.task_id.clone();
    let mut handle = submitted.handle;
    let outcome = tokio::select! {
        joined = &mut handle => joined.context("上传任务异常退出")?,
        _ = wait_for_shutdown_signal() => {
            warn!("收到关闭信号，取消上传任务 {}", task_id);
            app.dispatcher().cancel(&task_id);
            let _ = handle.await;
            app.shutdown().await;
            return Err(anyhow::anyhow!("上传任务 {task_id} 已取消"));
        }
    };

    let record = app.repository().get(&task_id).await?;
    app.shutdown().await;
    if let Some(printer) = printer {
        // 执行器随应用一起释放后通道关闭，打印任务自然结束
        let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    }

    if let Some(record) = record {
        print_record(&record);
    }
    match outcome {
        UploadOutcome::Success { .. } => Ok(()),
        UploadOutcome::Retry { reason } | UploadOutcome::Failure { reason } => {
            Err(anyhow::anyhow!("上传失败: {reason}"))
        }
    }
}

async fn run_list(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let app = Application::new(config, Arc::new(TracingProgressSink)).await?;
    let records = app.repository().list_all().await?;
    app.shutdown().await;

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("没有上传任务");
    } else {
        records.iter().for_each(print_record);
    }
    Ok(())
}

/// 其他进程的写入不会推送到本进程，所以这里按间隔重新查询
async fn run_watch(config: &AppConfig, matches: &ArgMatches) -> Result<()> {
    let interval_ms = matches.get_one::<u64>("interval-ms").copied().unwrap_or(1000);
    let app = Application::new(config, Arc::new(TracingProgressSink)).await?;
    let repository = app.repository();

    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(100)));
    let mut last: Option<Vec<TaskRecord>> = None;
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let records = repository.list_all().await?;
                if last.as_ref() != Some(&records) {
                    println!("---- {} 个任务 ----", records.len());
                    records.iter().for_each(print_record);
                    last = Some(records);
                }
            }
            _ = &mut shutdown => break,
        }
    }

    app.shutdown().await;
    Ok(())
}

async fn run_clear(config: &AppConfig) -> Result<()> {
    let app = Application::new(config, Arc::new(TracingProgressSink)).await?;
    app.repository().clear_all().await?;
    app.shutdown().await;
    println!("已清空所有上传任务");
    Ok(())
}

fn print_record(record: &TaskRecord) {
    println!(
        "{}  {:<9} {:>3}%  {} ({} photos)  {}  {}",
        record.id,
        record.status.as_str(),
        record.progress,
        if record.title.is_empty() { "-" } else { record.title.as_str() },
        record.photo_count,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        record.error_message.as_deref().unwrap_or(""),
    );
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("安装Ctrl+C信号处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("安装SIGTERM信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("收到Ctrl+C信号");
        },
        _ = terminate => {
            info!("收到SIGTERM信号");
        },
    }
}
