// CloudDrive HTTP 客户端实现

use crate::api::{
    ApiError, ApiResponse, ChunkAck, ErrorBody, FileApi, FileItem, FolderListing,
    InitUploadRequest, InitUploadResponse, ProgressFn, StorageQuota, UploadStatus,
};
use crate::config::ServerConfig;
use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart;
use reqwest::{Body, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

/// 单次上传时 multipart 流的分块大小，决定字节进度回调的粒度
const STREAM_PIECE_SIZE: usize = 64 * 1024;

const OCTET_STREAM: &str = "application/octet-stream";

/// CloudDrive 客户端
#[derive(Debug, Clone)]
pub struct CloudDriveClient {
    /// HTTP客户端
    client: Client,
    /// API 根地址（不含结尾的 /）
    base_url: String,
    /// Bearer 令牌
    token: Option<String>,
}

impl CloudDriveClient {
    /// 创建新的客户端
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let token = config.resolved_token();
        info!(
            "初始化 CloudDrive 客户端: base_url={}, token={}",
            config.base_url,
            if token.is_some() { "已设置" } else { "未设置" }
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// 发送请求并读取响应正文，非 2xx 转为 ApiError::Status
    async fn fetch_text(&self, builder: RequestBuilder, what: &str) -> Result<String, ApiError> {
        let response = self.authorized(builder).send().await?;
        let status = response.status();
        let text = response.text().await?;

        debug!("{} 响应: status={}, body={}", what, status, text);

        if !status.is_success() {
            let detail = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|body| body.describe())
                .unwrap_or(text);
            return Err(ApiError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        Ok(text)
    }

    async fn fetch_data<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        what: &str,
    ) -> Result<T, ApiError> {
        let text = self.fetch_text(builder, what).await?;
        parse_data(&text, what)
    }

    /// 只关心 success 标志的请求
    async fn fetch_ack(&self, builder: RequestBuilder, what: &str) -> Result<(), ApiError> {
        let text = self.fetch_text(builder, what).await?;
        let envelope: ApiResponse<serde_json::Value> = serde_json::from_str(&text)?;

        if envelope.success {
            Ok(())
        } else {
            Err(ApiError::Rejected(
                envelope.message.unwrap_or_else(|| format!("{} 失败", what)),
            ))
        }
    }
}

/// 解析 { success, data } 信封并取出 data
fn parse_data<T: DeserializeOwned>(text: &str, what: &str) -> Result<T, ApiError> {
    let envelope: ApiResponse<T> = serde_json::from_str(text)?;

    if !envelope.success {
        return Err(ApiError::Rejected(
            envelope.message.unwrap_or_else(|| format!("{} 失败", what)),
        ));
    }
    envelope.data.ok_or(ApiError::MissingData)
}

/// 把整块数据切成流，每发出一块就回调一次累计字节数
fn progress_body(data: Vec<u8>, progress: ProgressFn) -> Body {
    let pieces: Vec<Result<Vec<u8>, std::io::Error>> = data
        .chunks(STREAM_PIECE_SIZE)
        .map(|piece| Ok(piece.to_vec()))
        .collect();

    let mut sent = 0u64;
    let stream = futures::stream::iter(pieces).inspect(move |piece| {
        if let Ok(piece) = piece {
            sent += piece.len() as u64;
            progress(sent);
        }
    });

    Body::wrap_stream(stream)
}

#[async_trait]
impl FileApi for CloudDriveClient {
    async fn list_folder(&self, folder_id: Option<&str>) -> Result<Vec<FileItem>, ApiError> {
        let mut builder = self.client.get(self.url("/api/files"));
        if let Some(id) = folder_id {
            builder = builder.query(&[("folder_id", id)]);
        }
        let listing: FolderListing = self.fetch_data(builder, "列出文件夹").await?;
        Ok(listing.items)
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/files/{}", urlencoding::encode(file_id)));
        self.fetch_ack(self.client.delete(url), "删除文件").await
    }

    async fn upload_file(
        &self,
        filename: &str,
        folder_id: Option<&str>,
        data: Vec<u8>,
        progress: ProgressFn,
    ) -> Result<FileItem, ApiError> {
        let total = data.len() as u64;
        info!("单次上传: filename={}, size={}", filename, total);

        let part = multipart::Part::stream_with_length(progress_body(data, progress), total)
            .file_name(filename.to_string())
            .mime_str(OCTET_STREAM)?;

        let mut form = multipart::Form::new().part("file", part);
        if let Some(id) = folder_id {
            form = form.text("folder_id", id.to_string());
        }

        let builder = self
            .client
            .post(self.url("/api/files/upload"))
            .multipart(form);
        self.fetch_data(builder, "单次上传").await
    }

    async fn init_upload(
        &self,
        request: &InitUploadRequest,
    ) -> Result<InitUploadResponse, ApiError> {
        info!(
            "初始化分片上传: filename={}, size={}, chunks={}",
            request.filename, request.file_size, request.total_chunks
        );
        let builder = self
            .client
            .post(self.url("/api/files/upload/init"))
            .json(request);
        self.fetch_data(builder, "初始化分片上传").await
    }

    async fn upload_chunk(
        &self,
        upload_id: &str,
        chunk_index: usize,
        data: Vec<u8>,
    ) -> Result<ChunkAck, ApiError> {
        debug!(
            "上传分片: upload_id={}, index={}, size={}",
            upload_id,
            chunk_index,
            data.len()
        );

        let part = multipart::Part::bytes(data)
            .file_name("chunk")
            .mime_str(OCTET_STREAM)?;
        let form = multipart::Form::new()
            .text("chunk_index", chunk_index.to_string())
            .part("chunk", part);

        let url = self.url(&format!(
            "/api/files/upload/chunk/{}",
            urlencoding::encode(upload_id)
        ));
        self.fetch_data(self.client.post(url).multipart(form), "上传分片")
            .await
    }

    async fn complete_upload(&self, upload_id: &str) -> Result<FileItem, ApiError> {
        let url = self.url(&format!(
            "/api/files/upload/complete/{}",
            urlencoding::encode(upload_id)
        ));
        self.fetch_data(self.client.post(url), "完成分片上传").await
    }

    async fn cancel_upload(&self, upload_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/api/files/upload/cancel/{}",
            urlencoding::encode(upload_id)
        ));
        self.fetch_ack(self.client.delete(url), "取消分片上传").await
    }

    async fn upload_status(&self, upload_id: &str) -> Result<UploadStatus, ApiError> {
        let url = self.url(&format!(
            "/api/files/upload/status/{}",
            urlencoding::encode(upload_id)
        ));
        self.fetch_data(self.client.get(url), "查询上传状态").await
    }

    async fn storage_quota(&self) -> Result<StorageQuota, ApiError> {
        self.fetch_data(self.client.get(self.url("/api/storage/quota")), "查询存储配额")
            .await
    }
}
