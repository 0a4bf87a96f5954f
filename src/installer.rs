//! Archive download and installation.
//!
//! Downloads a release archive (following redirects by hand with a bounded
//! hop count), persists the full body to a scratch directory beside the
//! destination, extracts it, locates the server binary at any nesting depth,
//! and renames it into place. The scratch directory is removed on every
//! outcome, success or failure.

use crate::error::ProvisionError;
use crate::platform::ArchiveKind;
use flate2::read::GzDecoder;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use walkdir::WalkDir;

const MAX_REDIRECT_HOPS: usize = 5;

/// Download the archive at `url` and install the binary named `binary_name`
/// to `dest`. On POSIX targets the installed file is made executable.
pub async fn install(
    url: &str,
    dest: &Path,
    kind: ArchiveKind,
    binary_name: &str,
) -> Result<(), ProvisionError> {
    let parent = dest.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "destination path has no parent")
    })?;
    fs::create_dir_all(parent)?;

    // Dropped on every exit path, which removes the directory and anything
    // half-extracted into it.
    let scratch = TempDir::new_in(parent)?;

    let archive_path = scratch.path().join(kind.archive_file_name());
    download_archive(url, &archive_path).await?;
    extract_archive(&archive_path, scratch.path(), kind)?;

    let located = find_binary_entry(scratch.path(), binary_name)
        .ok_or_else(|| ProvisionError::BinaryNotFoundInArchive(binary_name.to_string()))?;

    fs::rename(&located, dest)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(dest)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(dest, perms)?;
    }

    tracing::info!("Installed binary at {}", dest.display());
    Ok(())
}

/// Stream `url` into `local_path`, following 301/302 redirects manually.
/// Extraction must not begin before the body is complete, so the full
/// response is on disk when this returns.
async fn download_archive(url: &str, local_path: &Path) -> Result<(), ProvisionError> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ProvisionError::DownloadFailed(e.to_string()))?;

    let mut url = url.to_string();
    for _hop in 0..=MAX_REDIRECT_HOPS {
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProvisionError::DownloadFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::MOVED_PERMANENTLY
            || status == reqwest::StatusCode::FOUND
        {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or(ProvisionError::RedirectMissingLocation)?;
            tracing::debug!("Following redirect to {}", location);
            url = location.to_string();
            continue;
        }

        if status != reqwest::StatusCode::OK {
            return Err(ProvisionError::UnexpectedStatus(status.as_u16()));
        }

        return write_body(response, local_path).await;
    }

    Err(ProvisionError::DownloadFailed(format!(
        "too many redirects (limit {})",
        MAX_REDIRECT_HOPS
    )))
}

async fn write_body(response: reqwest::Response, local_path: &Path) -> Result<(), ProvisionError> {
    let total_size = response.content_length().unwrap_or(0);

    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_message("Downloading server archive");

    let mut file = fs::File::create(local_path)?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ProvisionError::DownloadFailed(e.to_string()))?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    pb.finish_and_clear();
    tracing::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
    Ok(())
}

fn extract_archive(
    archive_path: &Path,
    extract_dir: &Path,
    kind: ArchiveKind,
) -> Result<(), ProvisionError> {
    tracing::debug!("Extracting {}", archive_path.display());

    match kind {
        ArchiveKind::TarGz => extract_tar_gz(archive_path, extract_dir),
        ArchiveKind::Zip => extract_zip(archive_path, extract_dir),
    }
    .map_err(|e| ProvisionError::ArchiveExtractionFailed(e.to_string()))
}

fn extract_tar_gz(archive_path: &Path, extract_dir: &Path) -> anyhow::Result<()> {
    let file = fs::File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    archive.unpack(extract_dir)?;

    Ok(())
}

fn extract_zip(archive_path: &Path, extract_dir: &Path) -> anyhow::Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let outpath = extract_dir.join(file.name());

        // Security check for path traversal
        if !outpath.starts_with(extract_dir) {
            tracing::warn!("Skipping malicious path in zip: {}", file.name());
            continue;
        }

        if file.name().ends_with('/') {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = fs::File::create(&outpath)?;
            io::copy(&mut file, &mut outfile)?;
        }
    }

    Ok(())
}

/// Scan the extracted tree for the binary, at the root or nested under any
/// directory the archive introduces.
fn find_binary_entry(extract_dir: &Path, binary_name: &str) -> Option<PathBuf> {
    for entry in WalkDir::new(extract_dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_file()
            && path
                .file_name()
                .map(|name| name == binary_name)
                .unwrap_or(false)
        {
            return Some(path.to_path_buf());
        }
    }
    None
}
