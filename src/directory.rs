// quarksave Directory Resolver
// Maps slash-separated paths in the caller's own drive to directory ids

use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::providers::quark::{collect_pages, first_string};
use crate::providers::{
    endpoints, ApiRequest, DirectoryEntry, FileRecord, ProviderError, QuarkClient, ROOT_DIR_ID,
};

/// Non-empty segments of a slash-separated path
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub fn join_path(parent: &str, name: &str) -> String {
    format!("{}/{}", parent.trim_end_matches('/'), name)
}

/// Every directory of the caller's drive, for repeated offline lookups
#[derive(Debug, Clone, Default)]
pub struct DirectoryIndex {
    entries: Vec<DirectoryEntry>,
    by_path: HashMap<String, usize>,
}

impl DirectoryIndex {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        let mut by_path = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            // first one wins when two siblings share a name
            by_path.entry(entry.path.clone()).or_insert(i);
        }
        Self { entries, by_path }
    }

    /// Directory id for `path`; `""` and `"/"` are the root
    pub fn lookup(&self, path: &str) -> Option<&str> {
        let segments = split_path(path);
        if segments.is_empty() {
            return Some(ROOT_DIR_ID);
        }
        let key = format!("/{}", segments.join("/"));
        self.by_path.get(&key).map(|&i| self.entries[i].id.as_str())
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct DirectoryResolver<'a> {
    client: &'a QuarkClient,
    page_size: u32,
}

impl<'a> DirectoryResolver<'a> {
    pub fn new(client: &'a QuarkClient) -> Self {
        Self {
            client,
            page_size: client.config().dir_page_size,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Direct child directories of `parent_id`, all pages
    pub async fn list_subdirectories(&self, parent_id: &str) -> Result<Vec<FileRecord>, ProviderError> {
        let records = collect_pages(self.page_size, |page| {
            self.client.list_own_directory(parent_id, page, self.page_size)
        })
        .await?;
        Ok(records.into_iter().filter(|r| r.is_directory).collect())
    }

    /// Resolve a path segment by segment. Names must match exactly; each
    /// segment costs one listing.
    pub async fn resolve_directory(&self, path: &str) -> Result<String, ProviderError> {
        let mut current = ROOT_DIR_ID.to_string();
        for segment in split_path(path) {
            let children = self.list_subdirectories(&current).await?;
            current = children
                .into_iter()
                .find(|d| d.name == segment)
                .map(|d| d.id)
                .ok_or_else(|| ProviderError::NotFound(format!("{} (no directory named '{}')", path, segment)))?;
        }
        debug!("Resolved {} to {}", path, current);
        Ok(current)
    }

    /// Pre-order listing of every directory in the drive
    pub async fn build_index(&self) -> Result<Vec<DirectoryEntry>, ProviderError> {
        let mut entries = Vec::new();
        self.index_below(ROOT_DIR_ID, "", &mut entries).await?;
        info!("Indexed {} directories", entries.len());
        Ok(entries)
    }

    async fn index_below(
        &self,
        parent_id: &str,
        parent_path: &str,
        entries: &mut Vec<DirectoryEntry>,
    ) -> Result<(), ProviderError> {
        for dir in self.list_subdirectories(parent_id).await? {
            let path = join_path(parent_path, &dir.name);
            entries.push(DirectoryEntry {
                id: dir.id.clone(),
                name: dir.name,
                path: path.clone(),
                parent_id: parent_id.to_string(),
            });
            Box::pin(self.index_below(&dir.id, &path, entries)).await?;
        }
        Ok(())
    }

    /// Create `name` under `parent_id` and return the new directory's id
    pub async fn create_directory(&self, name: &str, parent_id: &str) -> Result<String, ProviderError> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') {
            return Err(ProviderError::InvalidConfig(format!("Invalid directory name: '{}'", name)));
        }
        let body = json!({ "pdir_fid": parent_id, "file_name": name, "_version": 2 });
        let resp = self.client.call(ApiRequest::post(endpoints::FILE, body)).await?;

        let id = match resp.data.as_str() {
            Some(id) if !id.is_empty() => Some(id.to_string()),
            _ => first_string(&resp.data, &["fid", "file_id", "object_id", "id"]),
        }
        .ok_or_else(|| ProviderError::ParseError(format!("Created '{}' but no id was returned", name)))?;

        info!("Created directory {} under {} as {}", name, parent_id, id);
        Ok(id)
    }

    /// Resolve `path`, creating whatever segments are missing
    pub async fn ensure_path(&self, path: &str) -> Result<String, ProviderError> {
        let mut current = ROOT_DIR_ID.to_string();
        let mut creating = false;
        for segment in split_path(path) {
            if !creating {
                let found = self
                    .list_subdirectories(&current)
                    .await?
                    .into_iter()
                    .find(|d| d.name == segment);
                if let Some(dir) = found {
                    current = dir.id;
                    continue;
                }
                creating = true;
            }
            current = self.create_directory(segment, &current).await?;
        }
        Ok(current)
    }
}
