//! Enumeration of source files
//!
//! A batch is a flat list of files. It is either collected by walking a directory tree or read
//! from a list file holding one path per line.

use anyhow::Context;
use async_recursion::async_recursion;

const BOM: &str = "\u{feff}";

#[async_recursion]
async fn walk(path: &std::path::Path, files: &mut Vec<std::path::PathBuf>) -> anyhow::Result<()> {
    let metadata = tokio::fs::symlink_metadata(path)
        .await
        .with_context(|| format!("failed reading metadata from {:?}", path))?;
    if metadata.is_symlink() {
        // symlinks are listed only when they resolve to a regular file, never descended into
        match tokio::fs::metadata(path).await {
            Ok(target) if target.is_file() => files.push(path.to_path_buf()),
            Ok(_) => tracing::debug!("skipping {:?}: not a link to a regular file", path),
            Err(error) => tracing::debug!("skipping dangling link {:?}: {}", path, error),
        }
        return Ok(());
    }
    if !metadata.is_dir() {
        if metadata.is_file() {
            files.push(path.to_path_buf());
        } else {
            tracing::debug!("skipping {:?}: not a regular file", path);
        }
        return Ok(());
    }
    let mut entries = tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("cannot open directory {:?} for reading", path))?;
    let mut children = vec![];
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed traversing directory {:?}", path))?
    {
        children.push(entry.path());
    }
    children.sort();
    for child in children {
        walk(&child, files).await?;
    }
    Ok(())
}

/// Every regular file under `root`, in lexical order; `root` itself if it is a file.
pub async fn list_files(root: &std::path::Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let mut files = vec![];
    walk(root, &mut files).await?;
    tracing::debug!("found {} files under {:?}", files.len(), root);
    Ok(files)
}

/// Parses a list file: one path per line, a leading byte order mark is ignored, empty lines and
/// lines starting with `#` are skipped.
pub fn parse_list(contents: &str) -> Vec<std::path::PathBuf> {
    let contents = contents.strip_prefix(BOM).unwrap_or(contents);
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(std::path::PathBuf::from)
        .collect()
}

pub async fn load_list(path: &std::path::Path) -> anyhow::Result<Vec<std::path::PathBuf>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read list file {:?}", path))?;
    Ok(parse_list(&contents))
}
