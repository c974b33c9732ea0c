//! Scripted remote double
//!
//! Replaces the HTTP client in tests: responses are queued up front and
//! every request is recorded so tests can assert on call order, paths
//! and injected tokens.

use async_trait::async_trait;
use raid_common::{RaidError, Result};
use raid_remote::{Method, Remote};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One request as seen by the scripted remote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub token: Option<String>,
    pub body: Option<Value>,
}

/// In-memory [`Remote`] that replays a scripted sequence of responses.
///
/// When the script runs dry (or in [`ScriptedRemote::offline`] mode)
/// every request fails with a connectivity error, which is exactly what
/// a dead network looks like to the coordinator.
#[derive(Default)]
pub struct ScriptedRemote {
    responses: Mutex<VecDeque<Result<Value>>>,
    calls: Mutex<Vec<RecordedCall>>,
    offline: bool,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote that never answers
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    /// Queue the next response (builder style)
    pub fn respond(self, response: Result<Value>) -> Self {
        self.push(response);
        self
    }

    /// Queue the next response on an existing instance
    pub fn push(&self, response: Result<Value>) {
        self.responses
            .lock()
            .expect("response script poisoned")
            .push_back(response);
    }

    /// Everything requested so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("call log poisoned").len()
    }
}

#[async_trait]
impl Remote for ScriptedRemote {
    async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Value> {
        self.calls.lock().expect("call log poisoned").push(RecordedCall {
            method,
            path: path.to_string(),
            token: token.map(str::to_string),
            body,
        });

        if self.offline {
            return Err(RaidError::Connectivity("network is down".to_string()));
        }

        self.responses
            .lock()
            .expect("response script poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(RaidError::Connectivity("script exhausted".to_string())))
    }
}
