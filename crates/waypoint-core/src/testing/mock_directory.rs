//! Directory service mocking for agent tests.
//!
//! Replies are queued per path pattern and handed out in order. Once a
//! route runs dry (or nothing matches) the mock behaves like an idle
//! long-poll: it waits a little and fails with a timeout.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::agent::{BoxFuture, DirectoryRequest, DirectoryTransport};
use crate::membership::RawSnapshot;
use crate::{Result, WaypointError};

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Answer with a directory document.
    Snapshot(RawSnapshot),
    /// Answer without a body.
    Empty,
    /// Fail with a timeout.
    Timeout,
    /// Fail with a transport error.
    Error(String),
    /// Wait, then answer with the inner reply.
    Delayed(Duration, Box<MockReply>),
}

impl MockReply {
    /// Delay this reply.
    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

/// Which requests a route answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteKind {
    Fetch,
    Watch,
}

impl RouteKind {
    fn of(request: &DirectoryRequest) -> Self {
        if request.param("wait") == Some("true") {
            Self::Watch
        } else {
            Self::Fetch
        }
    }
}

struct MockRoute {
    pattern: String,
    kind: RouteKind,
    replies: VecDeque<MockReply>,
}

/// Mock directory transport.
///
/// # Example
///
/// ```ignore
/// let directory = MockDirectory::new();
/// directory.on_fetch("*/orders", MockReply::Snapshot(snapshot));
/// directory.on_watch("*/orders", MockReply::Timeout);
///
/// // ... run the agent ...
/// directory.assert_called_times("*/orders", 2);
/// ```
#[derive(Clone)]
pub struct MockDirectory {
    routes: Arc<RwLock<Vec<MockRoute>>>,
    requests: Arc<RwLock<Vec<DirectoryRequest>>>,
    idle: Duration,
}

impl MockDirectory {
    /// Create a mock with no routes.
    pub fn new() -> Self {
        Self {
            routes: Arc::new(RwLock::new(Vec::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
            idle: Duration::from_millis(10),
        }
    }

    /// How long an unanswered request waits before timing out.
    pub fn with_idle(mut self, idle: Duration) -> Self {
        self.idle = idle;
        self
    }

    /// Queue a reply for plain reads matching `pattern`.
    pub fn on_fetch(&self, pattern: &str, reply: MockReply) {
        self.push(pattern, RouteKind::Fetch, reply);
    }

    /// Queue a reply for long-polls matching `pattern`.
    pub fn on_watch(&self, pattern: &str, reply: MockReply) {
        self.push(pattern, RouteKind::Watch, reply);
    }

    fn push(&self, pattern: &str, kind: RouteKind, reply: MockReply) {
        let mut routes = self.routes.write().unwrap();
        if let Some(route) = routes
            .iter_mut()
            .find(|r| r.pattern == pattern && r.kind == kind)
        {
            route.replies.push_back(reply);
            return;
        }
        routes.push(MockRoute {
            pattern: pattern.to_string(),
            kind,
            replies: VecDeque::from([reply]),
        });
    }

    fn next_reply(&self, request: &DirectoryRequest) -> Option<MockReply> {
        let kind = RouteKind::of(request);
        let mut routes = self.routes.write().unwrap();
        routes
            .iter_mut()
            .filter(|r| r.kind == kind && matches_pattern(&request.path, &r.pattern))
            .find_map(|r| r.replies.pop_front())
    }

    /// Recorded requests.
    pub fn requests(&self) -> Vec<DirectoryRequest> {
        self.requests.read().unwrap().clone()
    }

    /// Recorded requests whose path matches a pattern.
    pub fn requests_to(&self, pattern: &str) -> Vec<DirectoryRequest> {
        self.requests
            .read()
            .unwrap()
            .iter()
            .filter(|r| matches_pattern(&r.path, pattern))
            .cloned()
            .collect()
    }

    /// Number of long-polls issued so far.
    pub fn watch_count(&self) -> usize {
        self.requests
            .read()
            .unwrap()
            .iter()
            .filter(|r| RouteKind::of(r) == RouteKind::Watch)
            .count()
    }

    /// Number of plain reads issued so far.
    pub fn fetch_count(&self) -> usize {
        self.requests
            .read()
            .unwrap()
            .iter()
            .filter(|r| RouteKind::of(r) == RouteKind::Fetch)
            .count()
    }

    /// Assert that a path pattern was requested.
    pub fn assert_called(&self, pattern: &str) {
        let requests = self.requests();
        assert!(
            requests.iter().any(|r| matches_pattern(&r.path, pattern)),
            "Expected directory call matching '{}', but none found. Recorded paths: {:?}",
            pattern,
            requests.iter().map(|r| &r.path).collect::<Vec<_>>()
        );
    }

    /// Assert that a path pattern was requested a specific number of times.
    pub fn assert_called_times(&self, pattern: &str, expected: usize) {
        let matching = self.requests_to(pattern).len();
        assert_eq!(
            matching, expected,
            "Expected {} directory calls matching '{}', but found {}",
            expected, pattern, matching
        );
    }

    /// Assert that a path pattern was never requested.
    pub fn assert_not_called(&self, pattern: &str) {
        self.assert_called_times(pattern, 0);
    }
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryTransport for MockDirectory {
    fn fetch(&self, request: DirectoryRequest) -> BoxFuture<'_, Result<Option<RawSnapshot>>> {
        Box::pin(async move {
            self.requests.write().unwrap().push(request.clone());

            let mut reply = match self.next_reply(&request) {
                Some(reply) => reply,
                None => MockReply::Timeout.after(self.idle),
            };

            loop {
                match reply {
                    MockReply::Delayed(delay, inner) => {
                        tokio::time::sleep(delay).await;
                        reply = *inner;
                    }
                    MockReply::Snapshot(raw) => return Ok(Some(raw)),
                    MockReply::Empty => return Ok(None),
                    MockReply::Timeout => {
                        return Err(WaypointError::TransportTimeout(request.path.clone()))
                    }
                    MockReply::Error(message) => return Err(WaypointError::Transport(message)),
                }
            }
        })
    }
}

/// Glob match where `*` spans any run of characters.
fn matches_pattern(path: &str, pattern: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.split('*').collect();
    if pattern_parts.len() == 1 {
        return path == pattern;
    }

    let mut remaining = path;
    for (i, part) in pattern_parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }

        if i == 0 {
            if !remaining.starts_with(part) {
                return false;
            }
            remaining = &remaining[part.len()..];
        } else if i == pattern_parts.len() - 1 {
            if !remaining.ends_with(part) {
                return false;
            }
        } else if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}
