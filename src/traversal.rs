// quarksave Share Traversal
// Depth-bounded walk of a share: flat file list plus the matching tree

use serde::Serialize;
use tracing::{debug, info};

use crate::providers::quark::collect_pages;
use crate::providers::{FileRecord, ProviderError, QuarkClient, ShareSession, ROOT_DIR_ID};
use crate::render::format_size;

/// How far below the root's immediate children the walk descends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxDepth {
    Unbounded,
    /// 0 lists the root only; each extra level expands one more folder depth
    Levels(u32),
}

impl MaxDepth {
    /// `-1` is unbounded, `0..` a level count, anything lower is rejected
    pub fn from_signed(depth: i64) -> Result<Self, ProviderError> {
        match depth {
            -1 => Ok(MaxDepth::Unbounded),
            d if d < -1 => Err(ProviderError::InvalidConfig(format!(
                "Max depth must be -1 (unbounded) or >= 0, got {}",
                d
            ))),
            d => u32::try_from(d)
                .map(MaxDepth::Levels)
                .map_err(|_| ProviderError::InvalidConfig(format!("Max depth too large: {}", d))),
        }
    }

    /// Whether a folder sitting at `depth` gets its children listed
    pub fn expands(self, depth: u32) -> bool {
        match self {
            MaxDepth::Unbounded => true,
            MaxDepth::Levels(max) => depth < max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TreeNode {
    File {
        id: String,
        name: String,
        size: u64,
        size_label: String,
    },
    Folder {
        id: String,
        name: String,
        /// Sum of every file reachable below within the depth bound
        size: u64,
        /// False when the folder sat at the depth bound and was not listed
        expanded: bool,
        children: Vec<TreeNode>,
    },
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::File { name, .. } | TreeNode::Folder { name, .. } => name,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            TreeNode::File { size, .. } | TreeNode::Folder { size, .. } => *size,
        }
    }

    pub fn children(&self) -> &[TreeNode] {
        match self {
            TreeNode::Folder { children, .. } => children,
            TreeNode::File { .. } => &[],
        }
    }

    fn file(record: &FileRecord) -> Self {
        TreeNode::File {
            id: record.id.clone(),
            name: record.name.clone(),
            size: record.size_bytes,
            size_label: format_size(record.size_bytes),
        }
    }
}

/// Result of a traversal
#[derive(Debug, Clone, Serialize)]
pub struct Traversal {
    /// Every file reached, in pre-order
    pub files: Vec<FileRecord>,
    /// Root folder (empty name) holding the walked hierarchy
    pub tree: TreeNode,
}

pub struct ShareWalker<'a> {
    client: &'a QuarkClient,
    share: &'a ShareSession,
    page_size: u32,
}

impl<'a> ShareWalker<'a> {
    pub fn new(client: &'a QuarkClient, share: &'a ShareSession) -> Self {
        Self {
            client,
            share,
            page_size: client.config().page_size,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Walk the share from `root_id`. Any listing failure aborts the whole
    /// walk; nothing partial is returned.
    pub async fn traverse(&self, root_id: &str, max_depth: MaxDepth) -> Result<Traversal, ProviderError> {
        let mut files = Vec::new();
        let (children, size) = self.walk(root_id, 0, max_depth, &mut files).await?;
        let tree = TreeNode::Folder {
            id: root_id.to_string(),
            name: String::new(),
            size,
            expanded: true,
            children,
        };
        info!(
            "Traversed share {} from {}: {} files, {} bytes",
            self.share.share_id,
            root_id,
            files.len(),
            size
        );
        Ok(Traversal { files, tree })
    }

    /// Traverse from the share root
    pub async fn traverse_root(&self, max_depth: MaxDepth) -> Result<Traversal, ProviderError> {
        self.traverse(ROOT_DIR_ID, max_depth).await
    }

    async fn list_all(&self, dir_id: &str) -> Result<Vec<FileRecord>, ProviderError> {
        collect_pages(self.page_size, |page| {
            self.client
                .list_share_directory(self.share, dir_id, page, self.page_size)
        })
        .await
        .map_err(|source| ProviderError::Listing {
            dir_id: dir_id.to_string(),
            source: Box::new(source),
        })
    }

    /// Returns the children of `dir_id` (whose entries sit at `depth`) and
    /// their aggregate size
    async fn walk(
        &self,
        dir_id: &str,
        depth: u32,
        max_depth: MaxDepth,
        files: &mut Vec<FileRecord>,
    ) -> Result<(Vec<TreeNode>, u64), ProviderError> {
        let records = self.list_all(dir_id).await?;
        debug!("Dir {} at depth {}: {} entries", dir_id, depth, records.len());

        let mut nodes = Vec::with_capacity(records.len());
        let mut total = 0u64;
        for record in records {
            if !record.is_directory {
                total += record.size_bytes;
                nodes.push(TreeNode::file(&record));
                files.push(record);
                continue;
            }

            let expanded = max_depth.expands(depth);
            let (children, size) = if expanded {
                Box::pin(self.walk(&record.id, depth + 1, max_depth, files)).await?
            } else {
                (Vec::new(), 0)
            };
            total += size;
            nodes.push(TreeNode::Folder {
                id: record.id,
                name: record.name,
                size,
                expanded,
                children,
            });
        }
        Ok((nodes, total))
    }
}
