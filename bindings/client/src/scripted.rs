use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

use crate::transport::{
    Method, Transport, TransportError, TransportErrorKind, TransportRequest, TransportResponse,
};

/// What a [ScriptedTransport] answers with.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedReply {
    Response { status: u16, body: String },
    Error(TransportErrorKind),
}

impl ScriptedReply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        ScriptedReply::Response {
            status,
            body: body.to_string(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        ScriptedReply::Response {
            status,
            body: body.into(),
        }
    }
}

/// A request that reached a [ScriptedTransport].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

struct Route {
    method: Method,
    pattern: String,
    replies: VecDeque<ScriptedReply>,
}

impl Route {
    /// `pattern` matches the end of the path. A trailing `*` matches exactly one more segment.
    fn matches(&self, method: Method, path: &str) -> bool {
        if self.method != method {
            return false;
        }

        match self.pattern.strip_suffix('*') {
            Some(prefix) => path
                .rfind(prefix)
                .map(|at| &path[at + prefix.len()..])
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/')),
            None => path.ends_with(&self.pattern),
        }
    }

    /// The last scripted reply repeats forever.
    fn next_reply(&mut self) -> Option<ScriptedReply> {
        if self.replies.len() > 1 {
            self.replies.pop_front()
        } else {
            self.replies.front().cloned()
        }
    }
}

/// An in-memory [Transport] that answers from a script and records what it was asked.
///
/// Requests that match no route get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests to `pattern` with `reply`. Calling this again for the same route queues
    /// further replies, answered in order.
    pub fn on(self, method: Method, pattern: &str, reply: ScriptedReply) -> Self {
        {
            let mut routes = self.routes.lock();
            match routes
                .iter_mut()
                .find(|route| route.method == method && route.pattern == pattern)
            {
                Some(route) => route.replies.push_back(reply),
                None => routes.push(Route {
                    method,
                    pattern: pattern.to_string(),
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    /// Latency reported with every response. No time actually passes.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, method: Method, pattern: &str) -> usize {
        let probe = Route {
            method,
            pattern: pattern.to_string(),
            replies: VecDeque::new(),
        };
        self.requests
            .lock()
            .iter()
            .filter(|request| probe.matches(request.method, &request.path))
            .count()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let path = request.url.path().to_string();
        self.requests.lock().push(RecordedRequest {
            method: request.method,
            path: path.clone(),
            body: request.body,
        });

        let reply = self
            .routes
            .lock()
            .iter_mut()
            .find(|route| route.matches(request.method, &path))
            .and_then(Route::next_reply);

        match reply {
            Some(ScriptedReply::Response { status, body }) => Ok(TransportResponse {
                status,
                body,
                latency: self.latency,
            }),
            Some(ScriptedReply::Error(kind)) => {
                Err(TransportError::new(kind, "scripted transport failure"))
            }
            None => Ok(TransportResponse {
                status: 404,
                body: String::new(),
                latency: self.latency,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use url::Url;

    fn get(path: &str) -> TransportRequest {
        TransportRequest {
            method: Method::Get,
            url: Url::parse("http://localhost:8080/api")
                .unwrap()
                .join(path)
                .unwrap(),
            body: None,
            headers: vec![],
        }
    }

    #[tokio::test]
    async fn wildcard_matches_one_segment() {
        let transport = ScriptedTransport::new().on(
            Method::Get,
            "/v1/schedule/*",
            ScriptedReply::text(200, "detail"),
        );

        assert_eq!(200, transport.request(get("/api/v1/schedule/3")).await.unwrap().status);
        assert_eq!(404, transport.request(get("/api/v1/schedules")).await.unwrap().status);
        assert_eq!(1, transport.request_count(Method::Get, "/v1/schedule/*"));
    }

    #[tokio::test]
    async fn queued_replies_are_used_in_order_then_repeat() {
        let transport = ScriptedTransport::new()
            .on(Method::Get, "/v1/schedules", ScriptedReply::text(500, ""))
            .on(Method::Get, "/v1/schedules", ScriptedReply::text(200, ""));

        let mut statuses = Vec::new();
        for _ in 0..3 {
            statuses.push(transport.request(get("/api/v1/schedules")).await.unwrap().status);
        }

        assert_eq!(vec![500, 200, 200], statuses);
    }
}
