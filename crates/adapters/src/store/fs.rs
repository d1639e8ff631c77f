// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local-filesystem object store (`file://` URLs).
//!
//! Backs the CLI's local mode and on-disk test setups. Modification times
//! come from the filesystem, so window matching behaves like a real bucket
//! listing.

use super::{ObjectMeta, ObjectStore, PutMode, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use wr_core::ErrorKind;

#[derive(Clone, Default)]
pub struct LocalFsStore;

impl LocalFsStore {
    pub fn new() -> Self {
        Self
    }

    fn path_of(url: &str) -> PathBuf {
        let raw = url.strip_prefix("file://").unwrap_or(url);
        PathBuf::from(raw)
    }

    fn url_of(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    fn map_io(err: std::io::Error, url: &str) -> StoreError {
        match err.kind() {
            IoErrorKind::NotFound => StoreError::not_found(url),
            IoErrorKind::AlreadyExists => StoreError::precondition_failed(url),
            _ => StoreError::new(ErrorKind::Internal, format!("{url}: {err}")),
        }
    }

    fn meta_of(path: &Path, meta: &std::fs::Metadata) -> ObjectMeta {
        let mod_time: DateTime<Utc> = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        ObjectMeta {
            url: Self::url_of(path),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: meta.len(),
            mod_time,
            is_dir: meta.is_dir(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalFsStore {
    async fn get(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        let path = Self::path_of(url);
        tokio::fs::read(&path).await.map_err(|e| Self::map_io(e, url))
    }

    async fn put(&self, url: &str, data: Vec<u8>, mode: PutMode) -> Result<(), StoreError> {
        let path = Self::path_of(url);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io(e, url))?;
        }
        match mode {
            PutMode::Overwrite => tokio::fs::write(&path, data)
                .await
                .map_err(|e| Self::map_io(e, url)),
            PutMode::IfAbsent => {
                // create_new is the atomic create-only primitive.
                let mut options = tokio::fs::OpenOptions::new();
                options.write(true).create_new(true);
                let mut file = options.open(&path).await.map_err(|e| Self::map_io(e, url))?;
                tokio::io::AsyncWriteExt::write_all(&mut file, &data)
                    .await
                    .map_err(|e| Self::map_io(e, url))
            }
        }
    }

    async fn list(&self, url: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let path = Self::path_of(url);
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::map_io(e, url)),
        };
        let mut result = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::map_io(e, url))?
        {
            let meta = entry.metadata().await.map_err(|e| Self::map_io(e, url))?;
            result.push(Self::meta_of(&entry.path(), &meta));
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn stat(&self, url: &str) -> Result<ObjectMeta, StoreError> {
        let path = Self::path_of(url);
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Self::map_io(e, url))?;
        Ok(Self::meta_of(&path, &meta))
    }

    async fn delete(&self, url: &str) -> Result<(), StoreError> {
        let path = Self::path_of(url);
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Self::map_io(e, url))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let to_path = Self::path_of(to);
        if let Some(parent) = to_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io(e, to))?;
        }
        tokio::fs::copy(Self::path_of(from), to_path)
            .await
            .map(|_| ())
            .map_err(|e| Self::map_io(e, from))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let to_path = Self::path_of(to);
        if let Some(parent) = to_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io(e, to))?;
        }
        match tokio::fs::rename(Self::path_of(from), &to_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Err(StoreError::not_found(from)),
            // Cross-device moves fall back to copy + delete.
            Err(_) => {
                self.copy(from, to).await?;
                self.delete(from).await
            }
        }
    }
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
