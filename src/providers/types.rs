//! Shared types for the Quark drive client
//!
//! This module contains the canonical records produced by the gateway, the
//! transfer job state, share link parsing and the error type shared by every
//! component of the crate.

use regex::Regex;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Id of the root directory, both inside a share and in the caller's own drive.
/// It never names a real directory.
pub const ROOT_DIR_ID: &str = "0";

static SHARE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://pan\.quark\.cn/s/([a-zA-Z0-9_-]+)").expect("SHARE_URL_RE")
});
static SHARE_PWD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]pwd=([^&#]+)").expect("SHARE_PWD_RE"));

/// One entry in a share or in the caller's own drive.
///
/// `id` is only unique within its parent directory: two directories of the
/// same share may hold entries with the same id, so `(parent_id, id)` is the
/// only key that is unique across a traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    /// Size in bytes, 0 for directories and for empty files
    pub size_bytes: u64,
    pub is_directory: bool,
    /// Containing directory, [`ROOT_DIR_ID`] at the top level
    pub parent_id: String,
    /// Per-file share token needed to save this entry; empty when unavailable
    #[serde(default)]
    pub access_token: String,
    /// Last modification time as reported by the server (epoch millis)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl FileRecord {
    /// Create a plain file record
    pub fn file(id: &str, name: &str, size_bytes: u64, parent_id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            size_bytes,
            is_directory: false,
            parent_id: parent_id.to_string(),
            access_token: String::new(),
            updated_at: None,
        }
    }
}

/// One page of a directory listing
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub records: Vec<FileRecord>,
    /// Total number of entries in the directory, when the server declares it
    pub total: Option<u64>,
}

/// A directory in the caller's own drive with its materialized path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: String,
    pub name: String,
    /// Slash-joined ancestry, e.g. `/Movies/2024`
    pub path: String,
    pub parent_id: String,
}

/// Parsed `https://pan.quark.cn/s/<id>?pwd=<code>` share link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    /// Share identifier (`pwd_id` in the API)
    pub share_id: String,
    /// Passcode, empty when the share is public
    pub passcode: String,
}

impl ShareLink {
    pub fn parse(url: &str) -> Result<Self, ProviderError> {
        let url = url.trim();
        let caps = SHARE_URL_RE
            .captures(url)
            .ok_or_else(|| ProviderError::InvalidConfig(format!("Not a Quark share link: {}", url)))?;
        let passcode = SHARE_PWD_RE
            .captures(url)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        Ok(Self {
            share_id: caps[1].to_string(),
            passcode,
        })
    }

    /// Override the passcode embedded in the link, if one is given
    pub fn with_passcode(mut self, passcode: Option<String>) -> Self {
        if let Some(code) = passcode.filter(|c| !c.trim().is_empty()) {
            self.passcode = code.trim().to_string();
        }
        self
    }
}

/// An opened share: the share id plus the access token (stoken) scoped to it
#[derive(Debug, Clone)]
pub struct ShareSession {
    pub share_id: String,
    pub stoken: SecretString,
}

/// Status of a server-side transfer job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    /// Code outside the known set; polled like `Pending`
    Unknown,
}

impl TransferStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => TransferStatus::Pending,
            1 => TransferStatus::Processing,
            2 => TransferStatus::Completed,
            3 => TransferStatus::Failed,
            4 => TransferStatus::Cancelled,
            _ => TransferStatus::Unknown,
        }
    }

    /// Decode the loosely typed status field (number or numeric string)
    pub fn from_raw(value: &serde_json::Value) -> Self {
        let code = match value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        code.map(Self::from_code).unwrap_or(TransferStatus::Unknown)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Processing => write!(f, "processing"),
            TransferStatus::Completed => write!(f, "completed"),
            TransferStatus::Failed => write!(f, "failed"),
            TransferStatus::Cancelled => write!(f, "cancelled"),
            TransferStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Point-in-time snapshot of a transfer job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferJob {
    pub job_id: String,
    pub status: TransferStatus,
    /// 0-100, not guaranteed to be monotonic across polls
    pub progress_percent: u8,
    pub message: Option<String>,
    /// Status value exactly as the server sent it
    pub raw_status: serde_json::Value,
}

/// Vendor failure categories recognised in server messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainErrorKind {
    BadPasscode,
    QuotaExceeded,
    AlreadyExists,
    NotFound,
    Other,
}

impl DomainErrorKind {
    /// Best-effort classification of a raw server message. The first matching
    /// phrase wins; "not exist" has to be checked before "exist".
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if message.contains("不存在") || lower.contains("not found") || lower.contains("not exist") {
            DomainErrorKind::NotFound
        } else if message.contains("密码") || message.contains("提取码") || lower.contains("passcode") {
            DomainErrorKind::BadPasscode
        } else if message.contains("容量") || message.contains("空间") || lower.contains("space") {
            DomainErrorKind::QuotaExceeded
        } else if message.contains("存在") || lower.contains("exist") {
            DomainErrorKind::AlreadyExists
        } else {
            DomainErrorKind::Other
        }
    }
}

impl fmt::Display for DomainErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DomainErrorKind::BadPasscode => write!(f, "Wrong share passcode"),
            DomainErrorKind::QuotaExceeded => write!(f, "Not enough drive space"),
            DomainErrorKind::AlreadyExists => write!(f, "Already exists"),
            DomainErrorKind::NotFound => write!(f, "Not found on server"),
            DomainErrorKind::Other => write!(f, "Server error"),
        }
    }
}

/// Provider error type
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// Cookie invalid or expired: re-authenticate, do not retry
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("{kind}: {message}")]
    Domain {
        kind: DomainErrorKind,
        message: String,
    },

    /// Local resolution failure, e.g. an unmatched directory path
    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Listing directory {dir_id} failed: {source}")]
    Listing {
        dir_id: String,
        #[source]
        source: Box<ProviderError>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    /// Build a domain error, classifying the raw server message
    pub fn domain(message: impl Into<String>) -> Self {
        let message = message.into();
        ProviderError::Domain {
            kind: DomainErrorKind::classify(&message),
            message,
        }
    }

    /// Domain category of this error, looking through traversal wrappers
    pub fn domain_kind(&self) -> Option<DomainErrorKind> {
        match self {
            ProviderError::Domain { kind, .. } => Some(*kind),
            ProviderError::Listing { source, .. } => source.domain_kind(),
            _ => None,
        }
    }

    /// True when the caller should ask for a fresh cookie instead of retrying
    pub fn needs_reauth(&self) -> bool {
        match self {
            ProviderError::AuthenticationFailed(_) => true,
            ProviderError::Listing { source, .. } => source.needs_reauth(),
            _ => false,
        }
    }

    /// Check if a caller-level retry could help
    pub fn is_recoverable(&self) -> bool {
        match self {
            ProviderError::NetworkError(_) => true,
            ProviderError::Listing { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }
}
