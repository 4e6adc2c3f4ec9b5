//! Quark drive gateway
//!
//! [`QuarkClient`] is the explicit session object every component receives.
//! It checks the API envelope on every response and turns the loosely typed
//! listing entries into canonical [`FileRecord`]s.
//!
//! Envelope: `{"status": 200, "code": 0, "message": "...", "data": {...},
//! "metadata": {"_total": n}}`. Some endpoints put the payload under
//! `result.data`, and `code`/`msg` stand in for `status`/`message`.

use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{
    endpoints, ApiRequest, FileRecord, ListingPage, ProviderError, ShareLink, ShareSession,
    Transport, ROOT_DIR_ID,
};
use crate::config::ClientConfig;

const STATUS_OK: i64 = 200;

/// Hard stop for auto-pagination of a single directory
const MAX_PAGES: u32 = 500;

// ─── API Response Types ──────────────────────────────────────────────────

/// Listing entry as the server sends it. Shares and the own-drive endpoint
/// disagree on key names, so both aliases are accepted.
#[derive(Debug, Deserialize)]
struct QuarkEntry {
    #[serde(default)]
    fid: Option<Value>, // string or number
    #[serde(default)]
    file_id: Option<Value>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size: Option<Value>,
    #[serde(default, rename = "type")]
    entry_type: Option<Value>,
    #[serde(default)]
    dir: Option<Value>,
    #[serde(default)]
    share_fid_token: Option<String>,
    #[serde(default)]
    updated_at: Option<Value>,
}

impl QuarkEntry {
    fn id_str(&self) -> Option<String> {
        self.fid
            .as_ref()
            .and_then(scalar_string)
            .or_else(|| self.file_id.as_ref().and_then(scalar_string))
    }

    fn display_name(&self) -> String {
        self.file_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.name.as_deref())
            .unwrap_or_default()
            .to_string()
    }

    fn type_is(&self, expected: &str) -> bool {
        matches!(&self.entry_type, Some(Value::String(t)) if t == expected)
    }

    fn dir_flag(&self) -> bool {
        match &self.dir {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            _ => false,
        }
    }

    /// Share rule: a file unless it positively declares itself a directory.
    /// Entries with missing metadata are never expanded.
    fn is_share_directory(&self) -> bool {
        self.dir_flag() && !self.type_is("file")
    }

    /// Own-drive rule: the listing marks folders by type string or dir flag
    fn is_own_directory(&self) -> bool {
        self.dir_flag() || self.type_is("folder")
    }

    fn into_record(self, parent_id: &str, is_directory: bool) -> Result<FileRecord, ProviderError> {
        let id = self.id_str().ok_or_else(|| {
            ProviderError::ParseError(format!("Entry in directory {} has no fid/file_id", parent_id))
        })?;
        Ok(FileRecord {
            name: self.display_name(),
            size_bytes: self.size.as_ref().and_then(loose_u64).unwrap_or(0),
            is_directory,
            parent_id: parent_id.to_string(),
            access_token: self.share_fid_token.clone().unwrap_or_default(),
            updated_at: self.updated_at.as_ref().and_then(loose_i64),
            id,
        })
    }
}

/// Checked API response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// `data`, else `result.data`, else `null`
    pub data: Value,
    /// The whole decoded document
    pub document: Value,
}

impl ApiResponse {
    fn new(document: Value) -> Self {
        let data = match document.get("data") {
            Some(d) if !d.is_null() => d.clone(),
            _ => document
                .get("result")
                .and_then(|r| r.get("data"))
                .cloned()
                .unwrap_or(Value::Null),
        };
        Self { data, document }
    }

    /// Payload, falling back to the whole document when there is none
    pub fn payload(&self) -> &Value {
        if self.data.is_null() {
            &self.document
        } else {
            &self.data
        }
    }

    /// Server-declared entry count of a listing
    pub fn total(&self) -> Option<u64> {
        self.document
            .get("metadata")
            .or_else(|| self.data.get("metadata"))
            .and_then(|m| m.get("_total"))
            .and_then(loose_u64)
    }
}

// ─── Loose JSON helpers ──────────────────────────────────────────────────

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn loose_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f as i64),
        _ => None,
    }
}

pub(crate) fn loose_u64(value: &Value) -> Option<u64> {
    loose_i64(value).map(|v| v.max(0) as u64)
}

/// First non-empty string among `keys`
pub(crate) fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(scalar_string)
}

fn envelope_status(document: &Value) -> Option<i64> {
    document
        .get("status")
        .and_then(loose_i64)
        .filter(|s| *s != 0)
        .or_else(|| document.get("code").and_then(loose_i64))
}

fn envelope_message(document: &Value) -> String {
    first_string(document, &["message", "msg"]).unwrap_or_else(|| "unknown error".to_string())
}

fn check_envelope(document: &Value, require_status: bool) -> Result<(), ProviderError> {
    match envelope_status(document) {
        Some(STATUS_OK) => Ok(()),
        Some(401) | Some(403) => Err(ProviderError::AuthenticationFailed(format!(
            "{} (cookie expired or lacks permission, log in again)",
            envelope_message(document)
        ))),
        Some(_) => Err(ProviderError::domain(envelope_message(document))),
        None if require_status => Err(ProviderError::ParseError(
            "Response envelope has no status or code".to_string(),
        )),
        None => Ok(()),
    }
}

fn parse_entries(data: &Value) -> Result<Vec<QuarkEntry>, ProviderError> {
    match data.get("list") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                QuarkEntry::deserialize(item)
                    .map_err(|e| ProviderError::ParseError(format!("Malformed listing entry: {}", e)))
            })
            .collect(),
        Some(other) => Err(ProviderError::ParseError(format!(
            "Listing 'list' is not an array: {}",
            other
        ))),
    }
}

/// Fetch pages `1..` until one comes back short, empty, or the declared
/// total is reached.
pub(crate) async fn collect_pages<F, Fut>(
    page_size: u32,
    mut fetch: F,
) -> Result<Vec<FileRecord>, ProviderError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<ListingPage, ProviderError>>,
{
    let mut records = Vec::new();
    let mut page = 1u32;
    loop {
        let listing = fetch(page).await?;
        let count = listing.records.len();
        records.extend(listing.records);

        let reached_total = listing.total.is_some_and(|t| records.len() as u64 >= t);
        if count == 0 || count < page_size as usize || reached_total {
            break;
        }
        if page >= MAX_PAGES {
            warn!("Stopped paginating after {} pages ({} entries)", page, records.len());
            break;
        }
        page += 1;
    }
    Ok(records)
}

// ─── Client ──────────────────────────────────────────────────────────────

/// Authenticated session with the Quark drive API
pub struct QuarkClient {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
}

impl QuarkClient {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request and require a successful envelope
    pub async fn call(&self, request: ApiRequest) -> Result<ApiResponse, ProviderError> {
        self.dispatch(request, true).await
    }

    /// Like [`call`](Self::call), but a document without any status field is
    /// accepted as-is. The task endpoint sometimes answers that way.
    pub async fn call_lenient(&self, request: ApiRequest) -> Result<ApiResponse, ProviderError> {
        self.dispatch(request, false).await
    }

    async fn dispatch(&self, request: ApiRequest, require_status: bool) -> Result<ApiResponse, ProviderError> {
        let request = request.query("pr", "ucpro").query("fr", "pc");
        let document = self.transport.send(&request).await?;
        if !document.is_object() {
            return Err(ProviderError::ParseError(format!(
                "{} returned a non-object document",
                request.endpoint
            )));
        }
        check_envelope(&document, require_status)?;
        Ok(ApiResponse::new(document))
    }

    /// Check that the stored cookie still opens the caller's drive
    pub async fn validate_session(&self) -> Result<(), ProviderError> {
        self.list_own_directory(ROOT_DIR_ID, 1, 10).await.map(|_| ())?;
        info!("Quark session validated");
        Ok(())
    }

    /// Exchange share id + passcode for the share's access token
    pub async fn open_share(&self, link: &ShareLink) -> Result<ShareSession, ProviderError> {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let request = ApiRequest::post(
            endpoints::SHARE_TOKEN,
            json!({ "pwd_id": link.share_id, "passcode": link.passcode }),
        )
        .query("__dt", now_ms % 10_000)
        .query("__t", now_ms);

        let resp = self.call(request).await?;
        let stoken = first_string(&resp.data, &["stoken"]).ok_or_else(|| {
            ProviderError::ParseError("Share token response did not include an stoken".to_string())
        })?;

        info!("Opened share {}", link.share_id);
        Ok(ShareSession {
            share_id: link.share_id.clone(),
            stoken: stoken.into(),
        })
    }

    /// List one page of a share directory. Does not paginate.
    pub async fn list_share_directory(
        &self,
        share: &ShareSession,
        directory_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ListingPage, ProviderError> {
        let request = ApiRequest::get(endpoints::SHARE_DETAIL)
            .query("pwd_id", &share.share_id)
            .query("stoken", share.stoken.expose_secret())
            .query("pdir_fid", directory_id)
            .query("_page", page)
            .query("_size", page_size)
            .query("_fetch_total", 1);

        let resp = self.call(request).await?;
        let records = parse_entries(&resp.data)?
            .into_iter()
            .map(|entry| {
                let is_directory = entry.is_share_directory();
                entry.into_record(directory_id, is_directory)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Share dir {} page {}: {} entries", directory_id, page, records.len());
        Ok(ListingPage {
            records,
            total: resp.total(),
        })
    }

    /// List one page of a directory in the caller's own drive. Does not paginate.
    pub async fn list_own_directory(
        &self,
        directory_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<ListingPage, ProviderError> {
        let request = ApiRequest::get(endpoints::FILE_SORT)
            .query("pdir_fid", directory_id)
            .query("_page", page)
            .query("_size", page_size)
            .query("_fetch_total", 1);

        let resp = self.call(request).await?;
        let records = parse_entries(&resp.data)?
            .into_iter()
            .map(|entry| {
                let is_directory = entry.is_own_directory();
                entry.into_record(directory_id, is_directory)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Own dir {} page {}: {} entries", directory_id, page, records.len());
        Ok(ListingPage {
            records,
            total: resp.total(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{listing, share_session, ScriptedTransport};
    use crate::providers::DomainErrorKind;

    fn client(transport: Arc<ScriptedTransport>) -> QuarkClient {
        QuarkClient::new(transport, ClientConfig::default())
    }

    #[tokio::test]
    async fn test_share_listing_normalizes_aliases() {
        let t = Arc::new(ScriptedTransport::new().on(
            endpoints::SHARE_DETAIL,
            &[("pdir_fid", "0")],
            listing(vec![
                json!({"fid": "a1", "file_name": "one.mkv", "size": 10, "type": "file", "share_fid_token": "tok-a"}),
                json!({"file_id": 42, "name": "Season 1", "dir": true, "type": "folder"}),
                json!({"fid": "c3", "file_name": "", "name": "fallback.txt", "size": "7"}),
            ]),
        ));
        let client = client(t.clone());
        let page = client
            .list_share_directory(&share_session(), "0", 1, 50)
            .await
            .unwrap();

        assert_eq!(page.total, Some(3));
        let r = &page.records;
        assert_eq!(r[0].id, "a1");
        assert_eq!(r[0].name, "one.mkv");
        assert_eq!(r[0].access_token, "tok-a");
        assert!(!r[0].is_directory);
        assert_eq!(r[1].id, "42");
        assert_eq!(r[1].name, "Season 1");
        assert!(r[1].is_directory);
        assert_eq!(r[2].name, "fallback.txt");
        assert_eq!(r[2].size_bytes, 7);
        assert_eq!(r[2].parent_id, "0");
        assert_eq!(r[2].access_token, "");

        let sent = t.requests();
        assert_eq!(sent[0].query_value("stoken"), Some("stoken-1"));
        assert_eq!(sent[0].query_value("pr"), Some("ucpro"));
        assert_eq!(sent[0].query_value("_size"), Some("50"));
    }

    #[tokio::test]
    async fn test_share_classification_is_tolerant() {
        let t = Arc::new(ScriptedTransport::new().on(
            endpoints::SHARE_DETAIL,
            &[],
            listing(vec![
                // no dir flag at all: file
                json!({"fid": "1", "file_name": "x", "type": "folder"}),
                // dir flag but declared type file: file
                json!({"fid": "2", "file_name": "y", "type": "file", "dir": true}),
                json!({"fid": "3", "file_name": "z", "dir": true}),
                json!({"fid": "4", "file_name": "w", "dir": false}),
            ]),
        ));
        let page = client(t)
            .list_share_directory(&share_session(), "0", 1, 50)
            .await
            .unwrap();
        let dirs: Vec<bool> = page.records.iter().map(|r| r.is_directory).collect();
        assert_eq!(dirs, vec![false, false, true, false]);
    }

    #[tokio::test]
    async fn test_own_listing_uses_folder_type() {
        let t = Arc::new(ScriptedTransport::new().on(
            endpoints::FILE_SORT,
            &[("pdir_fid", "0")],
            listing(vec![
                json!({"fid": "d1", "file_name": "Movies", "type": "folder"}),
                json!({"fid": "f1", "file_name": "notes.txt", "type": "file"}),
            ]),
        ));
        let page = client(t).list_own_directory("0", 1, 100).await.unwrap();
        assert!(page.records[0].is_directory);
        assert!(!page.records[1].is_directory);
    }

    #[tokio::test]
    async fn test_entry_without_id_is_a_parse_error() {
        let t = Arc::new(ScriptedTransport::new().on(
            endpoints::SHARE_DETAIL,
            &[],
            listing(vec![json!({"file_name": "ghost"})]),
        ));
        let err = client(t)
            .list_share_directory(&share_session(), "0", 1, 50)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_envelope_errors() {
        let t = Arc::new(
            ScriptedTransport::new()
                .on(endpoints::FILE_SORT, &[("pdir_fid", "auth")], json!({"status": 401, "message": "login required"}))
                .on(endpoints::FILE_SORT, &[("pdir_fid", "perm")], json!({"code": 403, "msg": "forbidden"}))
                .on(endpoints::FILE_SORT, &[("pdir_fid", "gone")], json!({"status": 404, "code": 41004, "message": "文件不存在"}))
                .on(endpoints::FILE_SORT, &[("pdir_fid", "bare")], json!({"data": {"list": []}})),
        );
        let client = client(t);

        let err = client.list_own_directory("auth", 1, 10).await.unwrap_err();
        assert!(err.needs_reauth());
        let err = client.list_own_directory("perm", 1, 10).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        let err = client.list_own_directory("gone", 1, 10).await.unwrap_err();
        assert_eq!(err.domain_kind(), Some(DomainErrorKind::NotFound));
        let err = client.list_own_directory("bare", 1, 10).await.unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_status_falls_back_to_code_and_result_data() {
        let t = Arc::new(ScriptedTransport::new().on(
            endpoints::FILE_SORT,
            &[],
            json!({"status": 0, "code": 200, "result": {"data": {"list": [{"fid": "r1", "file_name": "nested"}]}}}),
        ));
        let page = client(t).list_own_directory("0", 1, 10).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0].name, "nested");
        assert_eq!(page.total, None);
    }

    #[tokio::test]
    async fn test_open_share_returns_stoken() {
        let t = Arc::new(ScriptedTransport::new().on(
            endpoints::SHARE_TOKEN,
            &[],
            json!({"status": 200, "code": 0, "data": {"stoken": "st-xyz"}}),
        ));
        let link = ShareLink::parse("https://pan.quark.cn/s/abc?pwd=1234").unwrap();
        let session = client(t.clone()).open_share(&link).await.unwrap();
        assert_eq!(session.share_id, "abc");
        assert_eq!(session.stoken.expose_secret(), "st-xyz");

        let body = t.requests()[0].body.clone().unwrap();
        assert_eq!(body["pwd_id"], "abc");
        assert_eq!(body["passcode"], "1234");
    }

    #[tokio::test]
    async fn test_open_share_bad_passcode() {
        let t = Arc::new(ScriptedTransport::new().on(
            endpoints::SHARE_TOKEN,
            &[],
            json!({"status": 400, "code": 41008, "message": "提取码错误"}),
        ));
        let link = ShareLink::parse("https://pan.quark.cn/s/abc").unwrap();
        let err = client(t).open_share(&link).await.unwrap_err();
        assert_eq!(err.domain_kind(), Some(DomainErrorKind::BadPasscode));
    }

    #[tokio::test]
    async fn test_validate_session() {
        let ok = Arc::new(ScriptedTransport::new().on(endpoints::FILE_SORT, &[], listing(vec![])));
        assert!(client(ok).validate_session().await.is_ok());

        let expired = Arc::new(ScriptedTransport::new().on(endpoints::FILE_SORT, &[], json!({"status": 401})));
        assert!(client(expired).validate_session().await.unwrap_err().needs_reauth());
    }

    #[tokio::test]
    async fn test_collect_pages_stops_on_short_page() {
        let mut calls = Vec::new();
        let records = collect_pages(2, |page| {
            calls.push(page);
            async move {
                let records = match page {
                    1 => vec![FileRecord::file("a", "a", 1, "0"), FileRecord::file("b", "b", 1, "0")],
                    _ => vec![FileRecord::file("c", "c", 1, "0")],
                };
                Ok(ListingPage { records, total: None })
            }
        })
        .await
        .unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(calls, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_at_declared_total() {
        let mut calls = 0;
        let records = collect_pages(1, |_| {
            calls += 1;
            async { Ok(ListingPage { records: vec![FileRecord::file("a", "a", 1, "0")], total: Some(2) }) }
        })
        .await
        .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(calls, 2);
    }
}
