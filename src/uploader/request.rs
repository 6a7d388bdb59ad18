// 上传请求与本地文件句柄

use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// 文件内容来源
#[derive(Debug, Clone)]
enum SourceData {
    /// 本地磁盘文件
    Path(PathBuf),
    /// 内存数据（拖拽/剪贴板等场景）
    Memory(Arc<Vec<u8>>),
}

/// 待上传的文件：名称、大小、可按字节区间读取
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    size: u64,
    data: SourceData,
}

impl SourceFile {
    /// 从本地路径创建，文件名取路径最后一段
    pub async fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("不是普通文件: {:?}", path),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("无法解析文件名: {:?}", path))
            })?;

        Ok(Self {
            name,
            size: metadata.len(),
            data: SourceData::Path(path.to_path_buf()),
        })
    }

    /// 从内存数据创建
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            data: SourceData::Memory(Arc::new(bytes)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// 同一份内容换一个文件名
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: self.size,
            data: self.data.clone(),
        }
    }

    /// 读取字节区间 [start, end)
    pub async fn read_range(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        if range.start > range.end || range.end > self.size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("读取范围越界: {:?}, 文件大小={}", range, self.size),
            ));
        }

        match &self.data {
            SourceData::Memory(bytes) => {
                Ok(bytes[range.start as usize..range.end as usize].to_vec())
            }
            SourceData::Path(path) => {
                let mut file = File::open(path).await?;
                file.seek(io::SeekFrom::Start(range.start)).await?;

                let mut buffer = vec![0u8; (range.end - range.start) as usize];
                file.read_exact(&mut buffer).await?;

                debug!(
                    "读取文件区间: {:?}, bytes={}-{}",
                    path, range.start, range.end
                );
                Ok(buffer)
            }
        }
    }

    /// 读取全部内容（单次上传使用）
    pub async fn read_all(&self) -> io::Result<Vec<u8>> {
        self.read_range(0..self.size).await
    }
}

/// 上传请求，创建后不可变
#[derive(Debug, Clone)]
pub struct UploadRequest {
    source: SourceFile,
    destination_folder_id: Option<String>,
}

impl UploadRequest {
    pub fn new(source: SourceFile, destination_folder_id: Option<String>) -> Self {
        Self {
            source,
            destination_folder_id,
        }
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn filename(&self) -> &str {
        self.source.name()
    }

    pub fn size(&self) -> u64 {
        self.source.size()
    }

    pub fn destination_folder_id(&self) -> Option<&str> {
        self.destination_folder_id.as_deref()
    }

    /// 以新文件名生成一个新请求（保留同名时使用）
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            source: self.source.with_name(name),
            destination_folder_id: self.destination_folder_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_memory_source_ranges() {
        let source = SourceFile::from_bytes("a.bin", (0u8..100).collect());
        assert_eq!(source.size(), 100);
        assert_eq!(source.read_range(10..13).await.unwrap(), vec![10, 11, 12]);
        assert_eq!(source.read_all().await.unwrap().len(), 100);
        assert!(source.read_range(90..101).await.is_err());
    }

    #[tokio::test]
    async fn test_path_source() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"hello chunked world").unwrap();
        temp_file.flush().unwrap();

        let source = SourceFile::from_path(temp_file.path()).await.unwrap();
        assert_eq!(source.size(), 19);
        assert_eq!(
            source.name(),
            temp_file.path().file_name().unwrap().to_str().unwrap()
        );
        assert_eq!(source.read_range(6..13).await.unwrap(), b"chunked".to_vec());
    }

    #[tokio::test]
    async fn test_directory_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(SourceFile::from_path(dir.path()).await.is_err());
    }

    #[test]
    fn test_renamed_request_keeps_folder_and_content() {
        let request = UploadRequest::new(
            SourceFile::from_bytes("report.pdf", vec![1, 2, 3]),
            Some("folder-1".to_string()),
        );
        let renamed = request.renamed("report (1).pdf");

        assert_eq!(renamed.filename(), "report (1).pdf");
        assert_eq!(renamed.size(), 3);
        assert_eq!(renamed.destination_folder_id(), Some("folder-1"));
        assert_eq!(request.filename(), "report.pdf");
    }
}
