// 上传协调器
//
// 一批文件各自独立上传：同名检查 → 选择上传方式 → 单次上传或分片会话。
// 所有文件都进入终态后，发出一次目录刷新和一次配额刷新信号。

use crate::api::{ApiError, FileApi, FileItem, UploadStatus};
use crate::events::RefreshSignal;
use crate::uploader::simple::upload_simple;
use crate::uploader::{
    ActiveSessions, DuplicatePrompt, DuplicateResolver, ProgressReporter, RecordState,
    SessionOutcome, SessionState, TransferLayout, TransferMode, TransferSession, UploadError,
    UploadRequest,
};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// 单个文件的最终结果
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Completed(FileItem),
    Failed(String),
    /// 上传过程中被用户取消
    Cancelled,
    /// 同名冲突时用户选择了取消，未开始上传
    Skipped,
}

#[derive(Debug, Clone)]
pub struct FileResult {
    /// 进度记录ID（跳过的文件没有）
    pub key: Option<String>,
    /// 实际上传使用的文件名
    pub filename: String,
    pub outcome: FileOutcome,
}

/// 批次汇总
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub results: Vec<FileResult>,
}

impl BatchSummary {
    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Completed(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Cancelled))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped))
    }
}

/// 上传协调器
pub struct UploadCoordinator {
    api: Arc<dyn FileApi>,
    layout: TransferLayout,
    resolver: DuplicateResolver,
    reporter: Arc<dyn ProgressReporter>,
    active: ActiveSessions,
    signals: broadcast::Sender<RefreshSignal>,
}

impl UploadCoordinator {
    pub fn new(
        api: Arc<dyn FileApi>,
        layout: TransferLayout,
        prompt: Arc<dyn DuplicatePrompt>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Self {
        let (signals, _) = broadcast::channel(16);
        Self {
            resolver: DuplicateResolver::new(api.clone(), prompt),
            api,
            layout,
            reporter,
            active: ActiveSessions::new(),
            signals,
        }
    }

    /// 订阅批次结束后的刷新信号
    pub fn subscribe(&self) -> broadcast::Receiver<RefreshSignal> {
        self.signals.subscribe()
    }

    pub fn active_sessions(&self) -> &ActiveSessions {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// 提交一批文件，全部结束后返回汇总
    ///
    /// 单个文件的失败或取消不影响同批次其他文件
    pub async fn submit(&self, requests: Vec<UploadRequest>) -> BatchSummary {
        if requests.is_empty() {
            return BatchSummary::default();
        }

        info!("开始上传批次: {} 个文件", requests.len());
        let results = join_all(requests.into_iter().map(|r| self.upload_one(r))).await;
        let summary = BatchSummary { results };

        info!(
            "上传批次结束: 完成 {}, 失败 {}, 取消 {}, 跳过 {}",
            summary.completed(),
            summary.failed(),
            summary.cancelled(),
            summary.skipped()
        );

        for signal in [RefreshSignal::DirectoryListing, RefreshSignal::StorageQuota] {
            let _ = self.signals.send(signal);
        }
        summary
    }

    async fn upload_one(&self, request: UploadRequest) -> FileResult {
        let original_name = request.filename().to_string();
        let Some(request) = self.resolver.apply(request).await else {
            return FileResult {
                key: None,
                filename: original_name,
                outcome: FileOutcome::Skipped,
            };
        };

        let key = Uuid::new_v4().to_string();
        let mode = self.layout.mode_for(request.size());
        info!(
            "上传文件: {}, 大小={}, 方式={:?}",
            request.filename(),
            request.size(),
            mode
        );
        self.reporter
            .start(&key, request.filename(), request.size(), mode);

        let filename = request.filename().to_string();
        let outcome = match mode {
            TransferMode::Simple => {
                match upload_simple(self.api.as_ref(), &request, &key, self.reporter.clone()).await
                {
                    Ok(item) => FileOutcome::Completed(item),
                    Err(e) => FileOutcome::Failed(e.to_string()),
                }
            }
            TransferMode::Chunked => self.upload_chunked(request, &key).await,
        };

        FileResult {
            key: Some(key),
            filename,
            outcome,
        }
    }

    async fn upload_chunked(&self, request: UploadRequest, key: &str) -> FileOutcome {
        let session = match TransferSession::begin(
            self.api.clone(),
            request,
            self.layout.chunk_size,
            key,
            self.active.clone(),
            self.reporter.clone(),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => return FileOutcome::Failed(e.to_string()),
        };

        match session.run().await {
            Ok(SessionOutcome::Completed(item)) => FileOutcome::Completed(item),
            Ok(SessionOutcome::Cancelled) => FileOutcome::Cancelled,
            Err(e) => FileOutcome::Failed(e.to_string()),
        }
    }

    /// 暂停分片会话（不发起网络请求）；已暂停或不存在时返回 false
    pub fn pause(&self, session_id: &str) -> bool {
        let Some(control) = self.active.get(session_id) else {
            return false;
        };
        let paused = control.pause(|state| {
            self.reporter
                .state_changed(control.key(), RecordState::Chunked(state))
        });
        if !paused {
            return false;
        }

        info!(
            "暂停上传: upload_id={}, 文件={}, 下一分片=#{}",
            session_id,
            control.filename(),
            control.next_chunk()
        );
        true
    }

    /// 恢复分片会话；未暂停或不存在时返回 false
    pub fn resume(&self, session_id: &str) -> bool {
        let Some(control) = self.active.get(session_id) else {
            return false;
        };
        let resumed = control.resume(|state| {
            self.reporter
                .state_changed(control.key(), RecordState::Chunked(state))
        });
        if !resumed {
            return false;
        }

        info!(
            "恢复上传: upload_id={}, 从分片 #{} 继续",
            session_id,
            control.next_chunk()
        );
        true
    }

    /// 取消分片会话
    ///
    /// 本地立即生效（移出活动表，不再发送分片），再通知服务端释放会话；
    /// 服务端取消失败只记录日志。
    pub async fn cancel(&self, session_id: &str) -> bool {
        let Some(control) = self.active.get(session_id) else {
            return false;
        };
        if !control.try_cancel() {
            return false;
        }
        self.active.remove(session_id);

        info!(
            "取消上传: upload_id={}, 文件={}, 已发送 {}/{} 片",
            session_id,
            control.filename(),
            control.next_chunk(),
            control.total_chunks()
        );
        self.reporter.cancelled(control.key());

        if let Err(e) = self.api.cancel_upload(session_id).await {
            warn!("{}", UploadError::CancelFailure(e));
        }
        true
    }

    /// 取消所有活动会话，返回取消的数量
    pub async fn cancel_all(&self) -> usize {
        let mut cancelled = 0;
        for session_id in self.active.ids() {
            if self.cancel(&session_id).await {
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn session_state(&self, session_id: &str) -> Option<SessionState> {
        self.active.get(session_id).map(|c| c.state())
    }

    /// 由进度记录ID查分片会话ID
    pub fn session_for_key(&self, key: &str) -> Option<String> {
        self.active
            .find_by_key(key)
            .map(|c| c.session_id().to_string())
    }

    /// 查询服务端记录的会话状态
    pub async fn remote_status(&self, session_id: &str) -> Result<UploadStatus, ApiError> {
        self.api.upload_status(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{remote_file, ApiCall, MockFileApi};
    use crate::events::UploadEvent;
    use crate::uploader::{DuplicateDecision, FixedDecision, ProgressBoard, SourceFile};
    use std::time::Duration;

    fn layout() -> TransferLayout {
        TransferLayout {
            chunk_size: 4,
            chunked_threshold: 8,
        }
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn request(name: &str, len: usize) -> UploadRequest {
        UploadRequest::new(SourceFile::from_bytes(name, payload(len)), None)
    }

    fn setup(
        api: Arc<MockFileApi>,
        decision: DuplicateDecision,
    ) -> (Arc<UploadCoordinator>, Arc<ProgressBoard>) {
        let board = Arc::new(ProgressBoard::new(Duration::from_secs(60), Duration::ZERO));
        let coordinator = Arc::new(UploadCoordinator::new(
            api,
            layout(),
            Arc::new(FixedDecision(decision)),
            board.clone(),
        ));
        (coordinator, board)
    }

    #[tokio::test]
    async fn test_mode_routing() {
        let api = Arc::new(MockFileApi::new());
        let (coordinator, _) = setup(api.clone(), DuplicateDecision::Cancel);

        let summary = coordinator
            .submit(vec![request("small.txt", 8), request("large.bin", 9)])
            .await;
        assert_eq!(summary.completed(), 2);
        assert_eq!(api.count(|c| matches!(c, ApiCall::Upload { .. })), 1);
        assert_eq!(api.count(|c| matches!(c, ApiCall::Init(_))), 1);

        let upload_id = api.session_for("large.bin").unwrap();
        assert_eq!(api.chunk_indices(&upload_id), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_batch_with_one_failure() {
        let api = Arc::new(MockFileApi::new());
        api.fail_chunk("b.bin", 2);
        let (coordinator, board) = setup(api.clone(), DuplicateDecision::Cancel);

        let mut signals = coordinator.subscribe();
        let watcher = {
            let board = board.clone();
            tokio::spawn(async move {
                let first = signals.recv().await.unwrap();
                // 收到信号时所有记录都已进入终态
                let all_terminal = board.records().iter().all(|r| r.state.is_terminal());
                let second = signals.recv().await.unwrap();
                (first, second, all_terminal, signals.try_recv().is_err())
            })
        };

        let summary = coordinator
            .submit(vec![
                request("a.bin", 13),
                request("b.bin", 20),
                request("c.txt", 5),
            ])
            .await;

        assert_eq!(summary.results.len(), 3);
        assert!(matches!(summary.results[0].outcome, FileOutcome::Completed(_)));
        assert!(matches!(summary.results[1].outcome, FileOutcome::Failed(_)));
        assert!(matches!(summary.results[2].outcome, FileOutcome::Completed(_)));

        let (first, second, all_terminal, drained) = watcher.await.unwrap();
        assert_eq!(first, RefreshSignal::DirectoryListing);
        assert_eq!(second, RefreshSignal::StorageQuota);
        assert!(all_terminal);
        assert!(drained);

        let mut stored = api.stored_names();
        stored.sort();
        assert_eq!(stored, vec!["a.bin".to_string(), "c.txt".to_string()]);

        // 失败记录保留，直到手动移除
        let failed_key = summary.results[1].key.clone().unwrap();
        let record = board.get(&failed_key).unwrap();
        assert_eq!(record.state, RecordState::Chunked(SessionState::Failed));
        assert!(board.dismiss(&failed_key));
        assert!(coordinator.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_sends_no_signal() {
        let api = Arc::new(MockFileApi::new());
        let (coordinator, _) = setup(api, DuplicateDecision::Cancel);
        let mut signals = coordinator.subscribe();

        let summary = coordinator.submit(Vec::new()).await;
        assert!(summary.results.is_empty());
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pause_at_chunk_and_resume() {
        let api = Arc::new(MockFileApi::new());
        let (coordinator, board) = setup(api.clone(), DuplicateDecision::Cancel);
        {
            let coordinator = coordinator.clone();
            api.on_chunk(Arc::new(move |upload_id: &str, index: usize| {
                if index == 1 {
                    assert!(coordinator.pause(upload_id));
                    assert!(!coordinator.pause(upload_id));
                }
            }));
        }

        let data = payload(22);
        let task = {
            let coordinator = coordinator.clone();
            let request = UploadRequest::new(SourceFile::from_bytes("big.iso", data.clone()), None);
            tokio::spawn(async move { coordinator.submit(vec![request]).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        let upload_id = api.session_for("big.iso").unwrap();
        assert_eq!(api.chunk_indices(&upload_id), vec![0, 1]);
        assert_eq!(coordinator.session_state(&upload_id), Some(SessionState::Paused));

        let key = board.records()[0].key.clone();
        assert_eq!(coordinator.session_for_key(&key), Some(upload_id.clone()));
        assert_eq!(
            board.get(&key).unwrap().state,
            RecordState::Chunked(SessionState::Paused)
        );
        assert_eq!(board.get(&key).unwrap().bytes_transferred, 8);

        assert!(coordinator.resume(&upload_id));
        assert!(!coordinator.resume(&upload_id));

        let summary = task.await.unwrap();
        assert_eq!(summary.completed(), 1);
        assert_eq!(api.chunk_indices(&upload_id), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(api.assembled(&upload_id), data);
    }

    #[tokio::test]
    async fn test_board_follows_pause_resume_toggles() {
        let api = Arc::new(MockFileApi::new());
        let (coordinator, board) = setup(api.clone(), DuplicateDecision::Cancel);
        {
            let coordinator = coordinator.clone();
            api.on_chunk(Arc::new(move |upload_id: &str, index: usize| {
                if index == 0 {
                    assert!(coordinator.pause(upload_id));
                    assert!(coordinator.resume(upload_id));
                    assert!(coordinator.pause(upload_id));
                }
            }));
        }

        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.submit(vec![request("big.iso", 12)]).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        let upload_id = api.session_for("big.iso").unwrap();
        let key = board.records()[0].key.clone();
        let state = coordinator.session_state(&upload_id).unwrap();
        assert_eq!(state, SessionState::Paused);
        assert_eq!(board.get(&key).unwrap().state, RecordState::Chunked(state));

        assert!(coordinator.resume(&upload_id));
        let summary = task.await.unwrap();
        assert_eq!(summary.completed(), 1);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_even_if_server_cancel_fails() {
        let api = Arc::new(MockFileApi::new());
        api.fail_cancel();
        let (coordinator, board) = setup(api.clone(), DuplicateDecision::Cancel);
        let mut events = board.subscribe();
        {
            let coordinator = coordinator.clone();
            api.on_chunk(Arc::new(move |upload_id: &str, index: usize| {
                if index == 1 {
                    assert!(futures::executor::block_on(coordinator.cancel(upload_id)));
                }
            }));
        }

        let summary = coordinator.submit(vec![request("big.iso", 40)]).await;
        assert_eq!(summary.cancelled(), 1);

        let upload_id = api.session_for("big.iso").unwrap();
        assert_eq!(api.chunk_indices(&upload_id), vec![0, 1]);
        assert_eq!(api.count(|c| matches!(c, ApiCall::Cancel(_))), 1);
        assert_eq!(api.count(|c| matches!(c, ApiCall::Complete(_))), 0);
        assert!(!coordinator.cancel(&upload_id).await);
        assert!(coordinator.active_sessions().is_empty());
        assert!(board.is_empty());

        let mut cancelled = 0;
        let mut other_terminal = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                UploadEvent::Cancelled { .. } => cancelled += 1,
                UploadEvent::Completed { .. } | UploadEvent::Failed { .. } => other_terminal += 1,
                _ => {}
            }
        }
        assert_eq!(cancelled, 1);
        assert_eq!(other_terminal, 0);
    }

    #[tokio::test]
    async fn test_cancel_all_while_paused() {
        let api = Arc::new(MockFileApi::new());
        let (coordinator, _) = setup(api.clone(), DuplicateDecision::Cancel);
        {
            let coordinator = coordinator.clone();
            api.on_chunk(Arc::new(move |upload_id: &str, index: usize| {
                if index == 0 {
                    coordinator.pause(upload_id);
                }
            }));
        }

        let task = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .submit(vec![request("one.iso", 20), request("two.iso", 20)])
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(coordinator.active_count(), 2);
        assert_eq!(coordinator.cancel_all().await, 2);

        let summary = task.await.unwrap();
        assert_eq!(summary.cancelled(), 2);
        assert_eq!(api.count(|c| matches!(c, ApiCall::Chunk { .. })), 2);
    }

    #[tokio::test]
    async fn test_duplicate_cancel_uploads_nothing() {
        let api = Arc::new(MockFileApi::new().with_existing(remote_file("f1", "report.pdf")));
        let (coordinator, board) = setup(api.clone(), DuplicateDecision::Cancel);

        let summary = coordinator.submit(vec![request("report.pdf", 4)]).await;
        assert_eq!(summary.skipped(), 1);
        assert_eq!(
            api.count(|c| matches!(c, ApiCall::Upload { .. } | ApiCall::Init(_))),
            0
        );
        assert!(board.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_replace_deletes_then_uploads() {
        let api = Arc::new(MockFileApi::new().with_existing(remote_file("f1", "report.pdf")));
        let (coordinator, _) = setup(api.clone(), DuplicateDecision::Replace);

        coordinator.submit(vec![request("report.pdf", 4)]).await;
        let calls: Vec<ApiCall> = api
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ApiCall::Delete(_) | ApiCall::Upload { .. }))
            .collect();
        assert_eq!(
            calls,
            vec![
                ApiCall::Delete("f1".to_string()),
                ApiCall::Upload {
                    filename: "report.pdf".to_string(),
                    folder_id: None,
                    size: 4,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_duplicate_keep_both_renames() {
        let api = Arc::new(MockFileApi::new().with_existing(remote_file("f1", "report.pdf")));
        let (coordinator, _) = setup(api.clone(), DuplicateDecision::KeepBoth);

        let summary = coordinator.submit(vec![request("report.pdf", 4)]).await;
        assert_eq!(summary.results[0].filename, "report (1).pdf");
        assert_eq!(api.count(|c| matches!(c, ApiCall::Delete(_))), 0);
        assert_eq!(
            api.count(|c| {
                matches!(c, ApiCall::Upload { filename, .. } if filename == "report (1).pdf")
            }),
            1
        );
    }

    #[tokio::test]
    async fn test_duplicate_check_failure_still_uploads() {
        let api = Arc::new(MockFileApi::new().with_existing(remote_file("f1", "report.pdf")));
        api.fail_list();
        let (coordinator, _) = setup(api.clone(), DuplicateDecision::Cancel);

        let summary = coordinator.submit(vec![request("report.pdf", 4)]).await;
        assert_eq!(summary.completed(), 1);
    }

    #[tokio::test]
    async fn test_init_failure_is_per_file() {
        let api = Arc::new(MockFileApi::new());
        api.fail_init_for("bad.iso");
        let (coordinator, _) = setup(api.clone(), DuplicateDecision::Cancel);

        let summary = coordinator
            .submit(vec![request("bad.iso", 12), request("good.iso", 12)])
            .await;
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.completed(), 1);
        assert!(api.session_for("bad.iso").is_none());
    }

    #[tokio::test]
    async fn test_remote_status() {
        let api = Arc::new(MockFileApi::new());
        let (coordinator, _) = setup(api.clone(), DuplicateDecision::Cancel);
        coordinator.submit(vec![request("big.iso", 12)]).await;

        let upload_id = api.session_for("big.iso").unwrap();
        let status = coordinator.remote_status(&upload_id).await.unwrap();
        assert_eq!(status.filename, "big.iso");
        assert_eq!(status.uploaded_chunks, vec![0, 1, 2]);
        assert!(coordinator.remote_status("missing").await.is_err());
    }

    #[test]
    fn test_unknown_session_controls() {
        let api = Arc::new(MockFileApi::new());
        let (coordinator, _) = setup(api, DuplicateDecision::Cancel);
        assert!(!coordinator.pause("nope"));
        assert!(!coordinator.resume("nope"));
        assert!(coordinator.session_state("nope").is_none());
    }
}
