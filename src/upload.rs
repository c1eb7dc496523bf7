use async_trait::async_trait;
use tokio_util::io::ReaderStream;

/// Seam between the trigger dispatcher and the actual HTTP transfer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Transfer the file to the pre-signed URL. Returns true only when the
    /// server answered HTTP 200.
    async fn upload(&self, file_path: &str, presigned_url: &str) -> bool;
}

/// Uploads a local file with a single HTTP PUT.
///
/// Every failure path (file open, transport, non-200 status) logs and
/// returns false, leaving the process running until an external interrupt.
/// There is deliberately no retry and no request timeout.
pub struct FileUploader {
    client: reqwest::Client,
}

impl FileUploader {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for FileUploader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Uploader for FileUploader {
    async fn upload(&self, file_path: &str, presigned_url: &str) -> bool {
        let file = match tokio::fs::File::open(file_path).await {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(file = %file_path, error = %e, "failed to open file for upload");
                return false;
            }
        };

        let size = match file.metadata().await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::warn!(file = %file_path, error = %e, "failed to stat file for upload");
                return false;
            }
        };

        tracing::info!(file = %file_path, size = size, "uploading file");

        let response = self
            .client
            .put(presigned_url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
            .header(reqwest::header::CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await;

        match response {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                tracing::info!(file = %file_path, "file upload successful");
                true
            }
            Ok(response) => {
                tracing::warn!(
                    file = %file_path,
                    status = %response.status(),
                    "upload rejected by storage"
                );
                false
            }
            Err(e) => {
                tracing::warn!(file = %file_path, error = %e, "upload request failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_fails_before_any_transfer() {
        let uploader = FileUploader::new();
        // The URL is never contacted when the file cannot be opened.
        let uploaded = uploader
            .upload("/no/such/file", "http://127.0.0.1:1/never")
            .await;
        assert!(!uploaded);
    }

    #[tokio::test]
    async fn test_unreachable_server_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"payload").unwrap();

        let uploader = FileUploader::new();
        let uploaded = uploader
            .upload(
                file.path().to_str().unwrap(),
                "http://127.0.0.1:1/presigned",
            )
            .await;
        assert!(!uploaded);
    }
}
