// 同名文件检测与处理
//
// 上传前检查目标文件夹是否已有同名文件（区分大小写，忽略文件夹），
// 有冲突时交给外部提示询问用户：取消 / 替换 / 保留两者。

use crate::api::{FileApi, FileItem};
use crate::uploader::UploadRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// 用户对同名冲突的选择
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateDecision {
    /// 放弃上传这个文件
    Cancel,
    /// 删除已有文件后按原名上传
    Replace,
    /// 改名后上传
    KeepBoth,
}

/// 同名检查结果
#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateOutcome {
    /// 没有冲突，直接上传
    NoConflict,
    /// 有冲突，用户已做出选择
    Decided {
        existing: FileItem,
        decision: DuplicateDecision,
    },
}

/// 询问用户如何处理同名冲突
#[async_trait]
pub trait DuplicatePrompt: Send + Sync {
    async fn ask(&self, filename: &str) -> DuplicateDecision;
}

/// 固定答复（非交互场景）
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub DuplicateDecision);

#[async_trait]
impl DuplicatePrompt for FixedDecision {
    async fn ask(&self, _filename: &str) -> DuplicateDecision {
        self.0
    }
}

/// 保留两者时的新文件名：在扩展名前插入 " (1)"
///
/// 只改一次名，不检查新名字是否也被占用。
/// 以点开头且没有其他点的名字（如 ".bashrc"）视为没有扩展名。
pub fn keep_both_name(filename: &str) -> String {
    match filename.rfind('.') {
        Some(dot) if dot > 0 => format!("{} (1){}", &filename[..dot], &filename[dot..]),
        _ => format!("{} (1)", filename),
    }
}

/// 同名冲突处理器
pub struct DuplicateResolver {
    api: Arc<dyn FileApi>,
    prompt: Arc<dyn DuplicatePrompt>,
    /// 同一时间只弹出一个询问
    prompt_lock: Mutex<()>,
}

impl DuplicateResolver {
    pub fn new(api: Arc<dyn FileApi>, prompt: Arc<dyn DuplicatePrompt>) -> Self {
        Self {
            api,
            prompt,
            prompt_lock: Mutex::new(()),
        }
    }

    /// 检查目标文件夹中的同名文件，有冲突时询问用户
    ///
    /// 列表查询失败按“无冲突”处理，不阻塞上传
    pub async fn resolve(&self, folder_id: Option<&str>, filename: &str) -> DuplicateOutcome {
        let items = match self.api.list_folder(folder_id).await {
            Ok(items) => items,
            Err(e) => {
                warn!("检查同名文件失败，按无冲突处理: 文件={}, 错误={}", filename, e);
                return DuplicateOutcome::NoConflict;
            }
        };

        let Some(existing) = items.into_iter().find(|item| item.is_file_named(filename)) else {
            return DuplicateOutcome::NoConflict;
        };

        let decision = {
            let _guard = self.prompt_lock.lock().await;
            self.prompt.ask(filename).await
        };

        info!(
            "同名文件处理: 文件={}, 已有文件ID={}, 选择={:?}",
            filename, existing.id, decision
        );
        DuplicateOutcome::Decided { existing, decision }
    }

    /// 检查并执行用户的选择；返回 None 表示该文件不再上传
    ///
    /// 替换时先删除已有文件，删除失败仍然继续上传
    pub async fn apply(&self, request: UploadRequest) -> Option<UploadRequest> {
        let outcome = self
            .resolve(request.destination_folder_id(), request.filename())
            .await;

        match outcome {
            DuplicateOutcome::NoConflict => Some(request),
            DuplicateOutcome::Decided { existing, decision } => match decision {
                DuplicateDecision::Cancel => {
                    info!("用户取消上传: {}", request.filename());
                    None
                }
                DuplicateDecision::Replace => {
                    if let Err(e) = self.api.delete_file(&existing.id).await {
                        warn!(
                            "删除已有文件失败，继续上传: 文件ID={}, 错误={}",
                            existing.id, e
                        );
                    }
                    Some(request)
                }
                DuplicateDecision::KeepBoth => {
                    let new_name = keep_both_name(request.filename());
                    info!("保留两者，重命名为: {}", new_name);
                    Some(request.renamed(new_name))
                }
            },
        }
    }
}
