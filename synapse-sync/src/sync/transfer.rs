use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use futures_util::{Stream, StreamExt};
use md5::Context;
use reqwest::Client;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use url::Url;

const HASH_BUFFER_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("download integrity check failed: expected {expected_md5}, got {actual_md5}")]
    IntegrityMismatch {
        expected_md5: String,
        actual_md5: String,
    },
}

/// Moves bytes to and from pre-signed URLs. Knows nothing about entities.
#[derive(Clone, Default)]
pub struct TransferClient {
    http: Client,
}

impl TransferClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams `url` into `target` via a `.partial` sibling, checking the MD5 when one is known.
    pub async fn download_to_path_checked(
        &self,
        url: &Url,
        target: &Path,
        expected_md5: Option<&str>,
    ) -> Result<(), TransferError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        let digest = stream_to_partial(&partial, response.bytes_stream()).await?;

        if let Some(expected_md5) = expected_md5 {
            let actual_md5 = format!("{digest:x}");
            if actual_md5 != expected_md5.to_ascii_lowercase() {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(TransferError::IntegrityMismatch {
                    expected_md5: expected_md5.to_ascii_lowercase(),
                    actual_md5,
                });
            }
        }

        tokio::fs::rename(partial, target).await?;
        Ok(())
    }

    /// PUTs one multipart chunk to its pre-signed URL with the headers the URL was signed for.
    pub async fn upload_part(
        &self,
        url: &Url,
        signed_headers: &BTreeMap<String, String>,
        body: Vec<u8>,
    ) -> Result<(), TransferError> {
        let mut request = self.http.put(url.clone());
        for (name, value) in signed_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request.body(body).send().await?.error_for_status()?;
        Ok(())
    }
}

/// Writes `stream` to `partial` and returns its MD5. The partial file is
/// removed when the stream or the write fails.
async fn stream_to_partial<S, B, E>(partial: &Path, stream: S) -> Result<md5::Digest, TransferError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    TransferError: From<E>,
{
    let written = async {
        let mut stream = std::pin::pin!(stream);
        let mut file = tokio::fs::File::create(partial).await?;
        let mut md5 = Context::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(chunk.as_ref()).await?;
            md5.consume(chunk.as_ref());
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok::<_, TransferError>(md5.compute())
    }
    .await;
    if written.is_err() {
        let _ = tokio::fs::remove_file(partial).await;
    }
    written
}

/// First name in `dir` not already taken: `name`, then `stem(1).ext`, `stem(2).ext` and so on.
pub async fn keep_both_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !occupied(&candidate).await {
        return candidate;
    }
    let file = Path::new(name);
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = file
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}({n}){ext}"));
        if !occupied(&candidate).await {
            return candidate;
        }
        n += 1;
    }
}

async fn occupied(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

/// Moves `from` to `to`, copying when a rename cannot cross filesystems.
pub async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(_) => {
            tokio::fs::copy(from, to).await?;
            tokio::fs::remove_file(from).await
        }
    }
}

/// Hex MD5 of a whole file, read in fixed-size chunks.
pub async fn file_md5(path: &Path) -> io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut ctx = Context::new();
    let mut buf = vec![0u8; HASH_BUFFER_BYTES];
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        ctx.consume(&buf[..read]);
    }
    Ok(format!("{:x}", ctx.compute()))
}

pub fn bytes_md5(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
