use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use clouddrive_client::{
    api::{CloudDriveClient, FileApi, StorageQuota},
    config::{AppConfig, LogConfig, DEFAULT_CONFIG_PATH},
    events::{RefreshSignal, UploadEvent},
    logging,
    uploader::{
        DuplicateDecision, DuplicatePrompt, FileOutcome, FixedDecision, ProgressBoard,
        SourceFile, TransferLayout, UploadCoordinator, UploadRequest,
    },
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Debug, Parser)]
#[command(name = "clouddrive", version, about = "CloudDrive 文件上传客户端")]
struct Args {
    /// 配置文件路径
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 上传本地文件
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// 目标文件夹ID（默认根目录）
        #[arg(long)]
        folder: Option<String>,

        /// 同名文件处理方式
        #[arg(long, value_enum, default_value_t = OnDuplicate::Ask)]
        on_duplicate: OnDuplicate,
    },
    /// 查询分片上传会话状态
    Status { upload_id: String },
    /// 取消服务端的分片上传会话
    Cancel { upload_id: String },
    /// 查看存储配额
    Quota,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OnDuplicate {
    Ask,
    Cancel,
    Replace,
    KeepBoth,
}

/// 从终端读取用户选择
struct StdinPrompt;

#[async_trait]
impl DuplicatePrompt for StdinPrompt {
    async fn ask(&self, filename: &str) -> DuplicateDecision {
        let question = format!(
            "目标文件夹已存在 \"{}\"：[c]取消 / [r]替换 / [k]保留两者 (默认取消): ",
            filename
        );
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr();
            let _ = write!(stderr, "{}", question);
            let _ = stderr.flush();

            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) => parse_decision(&line),
            _ => DuplicateDecision::Cancel,
        }
    }
}

fn parse_decision(answer: &str) -> DuplicateDecision {
    match answer.trim().to_lowercase().as_str() {
        "r" | "replace" => DuplicateDecision::Replace,
        "k" | "keep" | "keep-both" => DuplicateDecision::KeepBoth,
        _ => DuplicateDecision::Cancel,
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

fn print_quota(quota: &StorageQuota) {
    println!(
        "存储空间: 已用 {} / 共 {}（{:.1}%），剩余 {}，文件数 {}",
        format_bytes(quota.used),
        format_bytes(quota.total),
        quota.percentage_used,
        format_bytes(quota.available.max(0) as u64),
        quota.total_files
    );
}

/// 把进度事件写到日志
fn spawn_event_logger(mut events: broadcast::Receiver<UploadEvent>) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(UploadEvent::Created {
                    filename,
                    total_bytes,
                    mode,
                    ..
                }) => info!("开始上传: {} ({}, {:?})", filename, format_bytes(total_bytes), mode),
                Ok(UploadEvent::Progress {
                    key, percentage, ..
                }) => info!("进度: {} {:.1}%", key, percentage),
                Ok(UploadEvent::StateChanged { key, new_state, .. }) => {
                    info!("状态: {} → {}", key, new_state.label())
                }
                Ok(UploadEvent::Failed { key, error }) => warn!("失败: {} {}", key, error),
                Ok(event) => debug!("{}: {}", event.event_type_name(), event.key()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("进度事件积压，跳过 {} 条", skipped)
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn run_upload(
    config: &AppConfig,
    client: Arc<CloudDriveClient>,
    files: Vec<PathBuf>,
    folder: Option<String>,
    on_duplicate: OnDuplicate,
) -> Result<()> {
    let mut requests = Vec::with_capacity(files.len());
    for path in &files {
        let source = SourceFile::from_path(path)
            .await
            .with_context(|| format!("无法读取本地文件: {:?}", path))?;
        requests.push(UploadRequest::new(source, folder.clone()));
    }

    let prompt: Arc<dyn DuplicatePrompt> = match on_duplicate {
        OnDuplicate::Ask => Arc::new(StdinPrompt),
        OnDuplicate::Cancel => Arc::new(FixedDecision(DuplicateDecision::Cancel)),
        OnDuplicate::Replace => Arc::new(FixedDecision(DuplicateDecision::Replace)),
        OnDuplicate::KeepBoth => Arc::new(FixedDecision(DuplicateDecision::KeepBoth)),
    };

    let board = Arc::new(ProgressBoard::new(
        Duration::from_millis(config.upload.dismiss_after_ms),
        Duration::from_millis(config.upload.progress_interval_ms),
    ));
    spawn_event_logger(board.subscribe());

    let coordinator = UploadCoordinator::new(
        client.clone(),
        TransferLayout::from(&config.upload),
        prompt,
        board.clone(),
    );
    let mut signals = coordinator.subscribe();

    let submit = coordinator.submit(requests);
    tokio::pin!(submit);
    let summary = tokio::select! {
        summary = &mut submit => summary,
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，取消所有分片上传...");
            let cancelled = coordinator.cancel_all().await;
            info!("已取消 {} 个会话，等待其余文件结束", cancelled);
            submit.await
        }
    };

    for result in &summary.results {
        match &result.outcome {
            FileOutcome::Completed(item) => {
                println!("✓ {} (ID: {})", result.filename, item.id)
            }
            FileOutcome::Failed(reason) => println!("✗ {}: {}", result.filename, reason),
            FileOutcome::Cancelled => println!("- {}: 已取消", result.filename),
            FileOutcome::Skipped => println!("- {}: 同名文件，已跳过", result.filename),
        }
    }

    while let Ok(signal) = signals.try_recv() {
        match signal {
            RefreshSignal::DirectoryListing => {
                match client.list_folder(folder.as_deref()).await {
                    Ok(items) => info!("目标文件夹现有 {} 项", items.len()),
                    Err(e) => warn!("刷新目录失败: {}", e),
                }
            }
            RefreshSignal::StorageQuota => match client.storage_quota().await {
                Ok(quota) => print_quota(&quota),
                Err(e) => warn!("刷新存储配额失败: {}", e),
            },
        }
    }

    if summary.failed() > 0 {
        anyhow::bail!("{} 个文件上传失败", summary.failed());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 先读日志配置，完整配置加载过程中的日志才能输出
    let log_config = LogConfig::load_from_config_file(&args.config).await;

    // 必须保持 _log_guard 存活
    let _log_guard = logging::init_logging(&log_config);
    let config = AppConfig::load_or_default(&args.config).await;
    info!("CloudDrive 客户端 v{} 启动", env!("CARGO_PKG_VERSION"));

    let client = Arc::new(CloudDriveClient::new(&config.server)?);

    match args.command {
        Commands::Upload {
            files,
            folder,
            on_duplicate,
        } => run_upload(&config, client, files, folder, on_duplicate).await?,
        Commands::Status { upload_id } => {
            let status = client
                .upload_status(&upload_id)
                .await
                .context("查询上传状态失败")?;
            let missing = status.missing_chunks();
            println!("{}", serde_json::to_string_pretty(&status)?);
            if !missing.is_empty() {
                println!("缺少分片: {:?}", missing);
            }
        }
        Commands::Cancel { upload_id } => {
            client
                .cancel_upload(&upload_id)
                .await
                .context("取消上传失败")?;
            println!("已取消: {}", upload_id);
        }
        Commands::Quota => {
            let quota = client.storage_quota().await.context("获取存储配额失败")?;
            print_quota(&quota);
        }
    }

    Ok(())
}
