// 分片上传会话
//
// 一个会话对应服务端的一次 init → chunk × N → complete 交互。
// 分片严格按序号逐个发送，同一会话任何时候最多只有一个分片在途。
// 暂停/恢复/取消都在分片之间生效，不会打断正在发送的分片。

use crate::api::{FileApi, FileItem, InitUploadRequest};
use crate::uploader::{
    ProgressReporter, RecordState, SessionState, TransferMode, UploadChunkManager, UploadError,
    UploadRequest,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 会话控制句柄
///
/// 由活动会话表和会话自身共享；用户操作（暂停/恢复/取消）只改这里的状态，
/// 发送循环在每个分片之前读取。
#[derive(Debug)]
pub struct SessionControl {
    session_id: String,
    /// 对应的进度记录ID
    key: String,
    filename: String,
    total_chunks: usize,
    state: Mutex<SessionState>,
    /// 下一个要发送的分片序号，只增不减
    next_chunk: AtomicUsize,
    /// 暂停标志，恢复时唤醒等待中的发送循环
    paused: watch::Sender<bool>,
    cancel_token: CancellationToken,
}

impl SessionControl {
    pub fn new(session_id: String, key: String, filename: String, total_chunks: usize) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            session_id,
            key,
            filename,
            total_chunks,
            state: Mutex::new(SessionState::Transferring),
            next_chunk: AtomicUsize::new(0),
            paused,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn next_chunk(&self) -> usize {
        self.next_chunk.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 暂停；只有上传中的会话可以暂停，返回状态是否变化
    ///
    /// `notify` 在持有状态锁时以新状态调用
    pub fn pause(&self, notify: impl FnOnce(SessionState)) -> bool {
        self.set_paused(true, notify)
    }

    /// 恢复；只有已暂停的会话可以恢复，返回状态是否变化
    pub fn resume(&self, notify: impl FnOnce(SessionState)) -> bool {
        self.set_paused(false, notify)
    }

    fn set_paused(&self, paused: bool, notify: impl FnOnce(SessionState)) -> bool {
        let (from, to) = if paused {
            (SessionState::Transferring, SessionState::Paused)
        } else {
            (SessionState::Paused, SessionState::Transferring)
        };

        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        *state = to;
        self.paused.send_replace(paused);
        // 持锁上报，上报顺序与状态切换顺序一致
        notify(to);
        true
    }

    /// 标记为已取消并唤醒等待者；只有上传中或已暂停的会话可以取消
    pub fn try_cancel(&self) -> bool {
        if !self.transition(
            &[SessionState::Transferring, SessionState::Paused],
            SessionState::Cancelled,
        ) {
            return false;
        }
        self.cancel_token.cancel();
        true
    }

    /// 当前状态在 `from` 中时切换到 `to`
    pub fn transition(&self, from: &[SessionState], to: SessionState) -> bool {
        let mut state = self.state.lock();
        if !from.contains(&*state) {
            return false;
        }
        *state = to;
        true
    }

    /// 记录分片已确认，游标移到下一片
    fn advance_past(&self, index: usize) {
        self.next_chunk
            .fetch_max((index + 1).min(self.total_chunks), Ordering::SeqCst);
    }

    /// 等待恢复；返回 false 表示等待期间被取消
    async fn wait_resumed(&self) -> bool {
        let mut rx = self.paused.subscribe();
        loop {
            if self.cancel_token.is_cancelled() {
                return false;
            }
            let paused = *rx.borrow_and_update();
            if !paused {
                return true;
            }

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = self.cancel_token.cancelled() => return false,
            }
        }
    }
}

/// 活动会话表（session_id → 控制句柄）
///
/// 会话进入终态或被取消时从表中移除，发送循环每个分片前都会检查自己是否还在表中。
#[derive(Debug, Clone, Default)]
pub struct ActiveSessions {
    inner: Arc<DashMap<String, Arc<SessionControl>>>,
}

impl ActiveSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, control: Arc<SessionControl>) {
        self.inner.insert(control.session_id().to_string(), control);
    }

    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionControl>> {
        self.inner.remove(session_id).map(|(_, control)| control)
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionControl>> {
        self.inner.get(session_id).map(|c| c.value().clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.contains_key(session_id)
    }

    /// 按进度记录ID查找
    pub fn find_by_key(&self, key: &str) -> Option<Arc<SessionControl>> {
        self.inner
            .iter()
            .find(|c| c.value().key() == key)
            .map(|c| c.value().clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.inner.iter().map(|c| c.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// 单步结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// 发送并确认了一个分片
    Sent { index: usize },
    /// 所有分片都已确认
    AllSent,
    /// 会话已被取消
    Cancelled,
}

/// 会话最终结果（失败通过 Err 返回）
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(FileItem),
    Cancelled,
}

/// 分片上传会话
pub struct TransferSession {
    api: Arc<dyn FileApi>,
    request: UploadRequest,
    chunks: UploadChunkManager,
    control: Arc<SessionControl>,
    active: ActiveSessions,
    reporter: Arc<dyn ProgressReporter>,
}

impl TransferSession {
    /// 切分文件并在服务端创建会话
    ///
    /// 初始化失败时直接上报失败，不会发送任何分片
    pub async fn begin(
        api: Arc<dyn FileApi>,
        request: UploadRequest,
        chunk_size: u64,
        key: &str,
        active: ActiveSessions,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, UploadError> {
        let chunks = UploadChunkManager::new(request.size(), chunk_size);
        let init = InitUploadRequest {
            filename: request.filename().to_string(),
            file_size: request.size(),
            total_chunks: chunks.chunk_count(),
            folder_id: request.destination_folder_id().map(str::to_string),
        };

        let response = match api.init_upload(&init).await {
            Ok(response) => response,
            Err(e) => {
                let err = UploadError::InitFailure(e);
                error!("初始化分片上传失败: 文件={}, 错误={}", init.filename, err);
                reporter.fail(key, &err.to_string());
                return Err(err);
            }
        };

        if let Some(server_chunk_size) = response.chunk_size {
            if server_chunk_size != chunks.chunk_size() {
                warn!(
                    "服务端分片大小 {} 与本地 {} 不一致，按本地切分继续",
                    server_chunk_size,
                    chunks.chunk_size()
                );
            }
        }

        let control = Arc::new(SessionControl::new(
            response.upload_id,
            key.to_string(),
            init.filename.clone(),
            chunks.chunk_count(),
        ));
        active.insert(control.clone());

        info!(
            "分片上传会话已创建: upload_id={}, 文件={}, 分片数={}",
            control.session_id(),
            init.filename,
            chunks.chunk_count()
        );
        reporter.session_started(key, control.session_id());
        reporter.state_changed(key, RecordState::Chunked(SessionState::Transferring));

        Ok(Self {
            api,
            request,
            chunks,
            control,
            active,
            reporter,
        })
    }

    pub fn control(&self) -> &Arc<SessionControl> {
        &self.control
    }

    pub fn session_id(&self) -> &str {
        self.control.session_id()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.chunk_count()
    }

    /// 发送下一个分片
    ///
    /// 暂停时挂起直到恢复或取消；已不在活动表中时不再发送
    pub async fn step(&mut self) -> Result<StepOutcome, UploadError> {
        if !self.gate().await {
            return Ok(StepOutcome::Cancelled);
        }

        let index = self.control.next_chunk();
        let Some(chunk) = self.chunks.get(index).cloned() else {
            return Ok(StepOutcome::AllSent);
        };

        let data = match self.request.source().read_range(chunk.range.clone()).await {
            Ok(data) => data,
            Err(e) => return Err(self.fail(UploadError::SourceRead(e))),
        };

        debug!(
            "发送分片: upload_id={}, #{}/{}, bytes={}-{}",
            self.session_id(),
            index,
            self.chunks.chunk_count(),
            chunk.range.start,
            chunk.range.end
        );

        match self
            .api
            .upload_chunk(self.control.session_id(), index, data)
            .await
        {
            Ok(ack) => {
                self.chunks.mark_completed(index);
                self.control.advance_past(index);
                debug!(
                    "分片已确认: upload_id={}, #{}, 服务端已收 {} 片",
                    self.session_id(),
                    ack.chunk_index,
                    ack.uploaded_chunks
                );

                // 在途期间被取消的会话不再上报进度
                if self.active.contains(self.control.session_id()) {
                    self.reporter.report(
                        self.control.key(),
                        chunk.range.end,
                        self.chunks.total_size(),
                        TransferMode::Chunked,
                    );
                }
                Ok(StepOutcome::Sent { index })
            }
            Err(e) => {
                if self.control.is_cancelled() {
                    return Ok(StepOutcome::Cancelled);
                }
                Err(self.fail(UploadError::ChunkSendFailure { index, source: e }))
            }
        }
    }

    /// 逐个发送全部分片并完成会话
    pub async fn run(mut self) -> Result<SessionOutcome, UploadError> {
        loop {
            match self.step().await? {
                StepOutcome::Sent { .. } => continue,
                StepOutcome::AllSent => break,
                StepOutcome::Cancelled => return Ok(SessionOutcome::Cancelled),
            }
        }
        self.complete().await
    }

    /// 通知服务端合并分片
    async fn complete(&mut self) -> Result<SessionOutcome, UploadError> {
        loop {
            if !self.gate().await {
                return Ok(SessionOutcome::Cancelled);
            }
            if self
                .control
                .transition(&[SessionState::Transferring], SessionState::Completing)
            {
                break;
            }
        }
        self.reporter.state_changed(
            self.control.key(),
            RecordState::Chunked(SessionState::Completing),
        );

        match self.api.complete_upload(self.control.session_id()).await {
            Ok(item) => {
                self.control
                    .transition(&[SessionState::Completing], SessionState::Completed);
                self.active.remove(self.control.session_id());
                info!(
                    "分片上传完成: upload_id={}, 文件ID={}, 文件={}, 大小={}",
                    self.session_id(),
                    item.id,
                    item.original_filename,
                    item.file_size
                );
                self.reporter.complete(self.control.key());
                Ok(SessionOutcome::Completed(item))
            }
            Err(e) => Err(self.fail(UploadError::CompleteFailure(e))),
        }
    }

    /// 检查是否可以发送；暂停时等待，被取消或移出活动表时返回 false
    async fn gate(&self) -> bool {
        loop {
            if self.control.is_cancelled() || !self.active.contains(self.control.session_id()) {
                return false;
            }
            match self.control.state() {
                SessionState::Transferring => return true,
                SessionState::Paused => {
                    debug!("会话已暂停，等待恢复: upload_id={}", self.session_id());
                    if !self.control.wait_resumed().await {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }

    /// 进入失败终态（已是终态时不重复上报）
    fn fail(&self, err: UploadError) -> UploadError {
        let moved = self.control.transition(
            &[
                SessionState::Initializing,
                SessionState::Transferring,
                SessionState::Paused,
                SessionState::Completing,
            ],
            SessionState::Failed,
        );
        if moved {
            self.active.remove(self.control.session_id());
            error!(
                "分片上传失败: upload_id={}, 文件={}, 已确认 {}/{} 片, 错误={}",
                self.session_id(),
                self.control.filename(),
                self.chunks.completed_count(),
                self.chunks.chunk_count(),
                err
            );
            self.reporter.fail(self.control.key(), &err.to_string());
        }
        err
    }
}
