//! Artifact naming and chunked transfer.
//!
//! The file-transfer endpoints serve large files in ranges: each request
//! carries `Content-Range: start-end/total` (total `0` until known) and the
//! response's own `Content-Range` reports the real file size. Chunks are
//! appended to `<name>.part`, which is renamed into place only after the
//! whole file arrived.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, TimeZone};
use regex::Regex;
use reqwest::Method;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::core::http::status_error;
use crate::core::session::Session;
use crate::error::{Result, ScanError};
use crate::util::time::artifact_stamp;

/// Default transfer chunk, 512 KiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 512 * 1024;

/// Artifacts smaller than this are checked for an error page.
const SNIFF_LIMIT: u64 = 4096;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]").unwrap());

/// `{hostname}_{YYYYMMDD_HHMMSS}.{ext}`, with the hostname reduced to
/// characters that are safe on both ends of the transfer.
#[must_use]
pub fn artifact_file_name<Tz: TimeZone>(hostname: &str, at: &DateTime<Tz>, extension: &str) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let sanitized = UNSAFE_CHARS.replace_all(hostname.trim(), "_");
    let stem: &str = if sanitized.is_empty() { "bigip" } else { &sanitized };
    format!("{stem}_{}.{extension}", artifact_stamp(at))
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Total size from a response `Content-Range` such as `0-524287/7340032`.
fn total_from_content_range(value: &str) -> Option<u64> {
    value
        .rsplit('/')
        .next()
        .and_then(|total| total.trim().parse::<u64>().ok())
        .filter(|total| *total > 0)
}

fn download_error(host: &str, message: impl Into<String>) -> ScanError {
    ScanError::Download {
        host: host.to_string(),
        message: message.into(),
    }
}

/// Fetch `remote_path` into `dest` in `chunk_size` ranges.
///
/// Returns the number of bytes written.
///
/// # Errors
///
/// [`ScanError::SessionExpired`] if the token is rejected mid-transfer,
/// [`ScanError::Download`] for everything else (transport errors, error
/// statuses, short reads, an empty or error-page artifact). The partial file
/// is removed on failure.
pub async fn fetch_chunked(
    session: &Session,
    remote_path: &str,
    dest: &Path,
    chunk_size: u64,
) -> Result<u64> {
    let partial = part_path(dest);
    let result = fetch_into(session, remote_path, &partial, chunk_size.max(1)).await;
    match result {
        Ok(written) => {
            fs::rename(&partial, dest).await?;
            Ok(written)
        }
        Err(e) => {
            if let Err(rm) = fs::remove_file(&partial).await {
                tracing::debug!(path = %partial.display(), error = %rm, "No partial file to remove");
            }
            Err(e)
        }
    }
}

async fn fetch_into(
    session: &Session,
    remote_path: &str,
    partial: &Path,
    chunk_size: u64,
) -> Result<u64> {
    let host = session.host();
    let mut file = fs::File::create(partial).await?;
    let mut start: u64 = 0;
    let mut total: Option<u64> = None;
    let mut head: Vec<u8> = Vec::new();

    loop {
        let end = match total {
            Some(total) => (start + chunk_size).min(total) - 1,
            None => start + chunk_size - 1,
        };
        let range = format!("{start}-{end}/{}", total.unwrap_or(0));
        let request = session
            .request(Method::GET, remote_path)?
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_RANGE, &range);

        let response = match session.send(request).await {
            Ok(r) => r,
            Err(e @ ScanError::SessionExpired { .. }) => return Err(e),
            Err(e) => return Err(download_error(host, format!("chunk {range}: {e}"))),
        };
        if !response.status().is_success() {
            let err = status_error(host, response).await;
            return Err(download_error(host, format!("chunk {range}: {err}")));
        }

        if total.is_none() {
            total = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .and_then(total_from_content_range);
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| download_error(host, format!("chunk {range}: {e}")))?;
        if body.is_empty() {
            return Err(download_error(
                host,
                format!("empty chunk at offset {start}"),
            ));
        }
        if head.len() < SNIFF_LIMIT as usize {
            head.extend(body.iter().take(SNIFF_LIMIT as usize - head.len()));
        }
        file.write_all(&body).await?;
        start += body.len() as u64;

        tracing::trace!(host, range = %range, received = start, total = ?total, "Chunk written");

        match total {
            Some(total) if start >= total => break,
            Some(_) => {}
            // No Content-Range: the device sent the whole file at once.
            None => break,
        }
    }

    file.flush().await?;
    file.sync_all().await?;
    check_artifact(host, start, &head)?;
    Ok(start)
}

/// Reject transfers that are obviously not an archive.
fn check_artifact(host: &str, size: u64, head: &[u8]) -> Result<()> {
    if size == 0 {
        return Err(download_error(host, "artifact is empty"));
    }
    if size < SNIFF_LIMIT {
        let text = String::from_utf8_lossy(head).to_lowercase();
        if text.contains("<html") || text.contains("\"errorstack\"") {
            return Err(download_error(
                host,
                "device returned an error page instead of the artifact",
            ));
        }
    }
    Ok(())
}
