// quarksave Cookie Store
// Persists the Quark web session cookies between CLI runs

use secrecy::SecretString;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_DIR_NAME: &str = "quark";
const COOKIES_FILENAME: &str = "cookies.txt";

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Cookie file not found: {0} (run `quarksave-cli login` first)")]
    NotFound(String),
    #[error("Cookie store is empty")]
    Empty,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

// ============ Paths ============

/// `<config dir>/quark/cookies.txt`, falling back to the home directory
pub fn default_cookies_path() -> Result<PathBuf, CredentialError> {
    let base = dirs::config_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| CredentialError::Io(
            std::io::Error::new(std::io::ErrorKind::NotFound, "No config directory")
        ))?;
    Ok(base.join(CONFIG_DIR_NAME).join(COOKIES_FILENAME))
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}

/// Parse a `k=v; k2=v2` cookie line. Segments without `=` are skipped.
fn parse_cookie_line(line: &str) -> BTreeMap<String, String> {
    line.split(';')
        .filter_map(|part| {
            let (name, value) = part.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

// ============ Cookie Store ============

pub struct CookieStore {
    path: PathBuf,
    cookies: BTreeMap<String, String>,
}

impl CookieStore {
    /// Empty store that will be saved at `path`
    pub fn new(path: PathBuf) -> Self {
        Self { path, cookies: BTreeMap::new() }
    }

    /// Read the store at `path`. The file holds either a JSON object of
    /// cookie name to value or a single browser cookie line.
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        if !path.exists() {
            return Err(CredentialError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let trimmed = raw.trim();
        let cookies = if trimmed.starts_with('{') {
            serde_json::from_str::<BTreeMap<String, String>>(trimmed)
                .map_err(|e| CredentialError::Serialization(e.to_string()))?
        } else {
            parse_cookie_line(trimmed)
        };
        if cookies.is_empty() {
            return Err(CredentialError::Empty);
        }
        debug!("Loaded {} cookies from {}", cookies.len(), path.display());
        Ok(Self { path: path.to_path_buf(), cookies })
    }

    /// Replace the stored cookies with the ones in a browser cookie line
    pub fn set_from_cookie_line(&mut self, line: &str) -> Result<(), CredentialError> {
        let cookies = parse_cookie_line(line);
        if cookies.is_empty() {
            return Err(CredentialError::Empty);
        }
        self.cookies = cookies;
        Ok(())
    }

    pub fn save(&self) -> Result<(), CredentialError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let data = serde_json::to_vec_pretty(&self.cookies)
            .map_err(|e| CredentialError::Serialization(e.to_string()))?;
        std::fs::write(&self.path, &data)?;
        ensure_secure_permissions(&self.path)?;
        info!("Saved {} cookies to {}", self.cookies.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// The `Cookie` request header value
    pub fn cookie_header(&self) -> Result<SecretString, CredentialError> {
        if self.cookies.is_empty() {
            return Err(CredentialError::Empty);
        }
        let line = self
            .cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        Ok(SecretString::from(line))
    }
}

/// Restrict the cookie file to its owner (0o600 on Unix)
pub fn ensure_secure_permissions(path: &Path) -> Result<(), CredentialError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
