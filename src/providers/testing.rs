//! Scripted in-memory transport for unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{ApiRequest, ProviderError, ShareSession, Transport};

enum Reply {
    Json(Value),
    Error(fn() -> ProviderError),
}

struct Route {
    endpoint: &'static str,
    params: Vec<(String, String)>,
    replies: VecDeque<Reply>,
}

impl Route {
    fn matches(&self, request: &ApiRequest) -> bool {
        self.endpoint == request.endpoint
            && self
                .params
                .iter()
                .all(|(k, v)| request.query_value(k) == Some(v.as_str()))
    }

    /// Pop the next reply; the last one repeats forever
    fn next(&mut self) -> Result<Value, ProviderError> {
        let reply = if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            None
        };
        match reply.as_ref().or(self.replies.front()) {
            Some(Reply::Json(v)) => Ok(v.clone()),
            Some(Reply::Error(make)) => Err(make()),
            None => Err(ProviderError::NetworkError("route has no replies".into())),
        }
    }
}

/// Answers requests from canned routes matched by endpoint plus a subset of
/// query parameters. Routes are tried in registration order.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(self, endpoint: &'static str, params: &[(&str, &str)], replies: Vec<Reply>) -> Self {
        self.routes.lock().unwrap().push(Route {
            endpoint,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            replies: replies.into(),
        });
        self
    }

    pub fn on(self, endpoint: &'static str, params: &[(&str, &str)], reply: Value) -> Self {
        self.route(endpoint, params, vec![Reply::Json(reply)])
    }

    pub fn on_sequence(self, endpoint: &'static str, params: &[(&str, &str)], replies: Vec<Value>) -> Self {
        self.route(endpoint, params, replies.into_iter().map(Reply::Json).collect())
    }

    pub fn fail(self, endpoint: &'static str, params: &[(&str, &str)], make: fn() -> ProviderError) -> Self {
        self.route(endpoint, params, vec![Reply::Error(make)])
    }

    /// Every request seen so far, in order
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<Value, ProviderError> {
        self.log.lock().unwrap().push(request.clone());
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| r.matches(request)) {
            Some(route) => route.next(),
            None => Err(ProviderError::NetworkError(format!(
                "no scripted reply for {} {:?}",
                request.endpoint, request.query
            ))),
        }
    }
}

/// Successful listing envelope declaring `items.len()` as the total
pub fn listing(items: Vec<Value>) -> Value {
    let total = items.len();
    listing_with_total(items, total)
}

pub fn listing_with_total(items: Vec<Value>, total: usize) -> Value {
    json!({
        "status": 200,
        "code": 0,
        "message": "ok",
        "data": { "list": items },
        "metadata": { "_total": total },
    })
}

pub fn share_file(fid: &str, name: &str, size: u64) -> Value {
    json!({
        "fid": fid,
        "file_name": name,
        "size": size,
        "dir": false,
        "type": "file",
        "share_fid_token": format!("tok-{}", fid),
    })
}

pub fn share_folder(fid: &str, name: &str) -> Value {
    json!({
        "fid": fid,
        "file_name": name,
        "size": 0,
        "dir": true,
        "type": "folder",
        "share_fid_token": format!("tok-{}", fid),
    })
}

pub fn share_session() -> ShareSession {
    ShareSession {
        share_id: "share-1".to_string(),
        stoken: "stoken-1".to_string().into(),
    }
}
