//! Deterministic oracle driven by closures or queued answers.

use super::{DecisionOracle, OracleRequest, RawDecision};
use crate::error::OracleError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

type DecideFn = dyn Fn(&OracleRequest) -> Result<RawDecision, OracleError> + Send + Sync;
type GenerateFn = dyn Fn(&str, &str) -> Result<String, OracleError> + Send + Sync;

pub struct ScriptedOracle {
    decider: Box<DecideFn>,
    generator: Box<GenerateFn>,
    requests: Mutex<Vec<OracleRequest>>,
    generations: Mutex<usize>,
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedOracle {
    /// Picks the first allowed action and echoes the prompt's first line
    pub fn new() -> Self {
        Self {
            decider: Box::new(|request| {
                request
                    .allowed_actions
                    .first()
                    .map(|action| RawDecision::new(action.clone(), "first allowed action"))
                    .ok_or_else(|| OracleError::Malformed("no allowed actions".to_string()))
            }),
            generator: Box::new(|_, prompt| {
                Ok(prompt.lines().next().unwrap_or_default().to_string())
            }),
            requests: Mutex::new(Vec::new()),
            generations: Mutex::new(0),
        }
    }

    /// Answer decisions from a fixed queue; an exhausted queue is a transport failure
    pub fn from_actions<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queue: Mutex<VecDeque<String>> =
            Mutex::new(actions.into_iter().map(Into::into).collect());
        Self::new().with_decider(move |_| {
            let mut queue = queue
                .lock()
                .map_err(|e| OracleError::Transport(format!("Lock error: {}", e)))?;
            queue
                .pop_front()
                .map(|action| RawDecision::new(action, "scripted"))
                .ok_or_else(|| OracleError::Transport("script exhausted".to_string()))
        })
    }

    /// Always fail decisions
    pub fn failing() -> Self {
        Self::new().with_decider(|_| Err(OracleError::Transport("oracle unavailable".to_string())))
    }

    pub fn with_decider<F>(mut self, decider: F) -> Self
    where
        F: Fn(&OracleRequest) -> Result<RawDecision, OracleError> + Send + Sync + 'static,
    {
        self.decider = Box::new(decider);
        self
    }

    pub fn with_generator<F>(mut self, generator: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, OracleError> + Send + Sync + 'static,
    {
        self.generator = Box::new(generator);
        self
    }

    /// Every decision request received so far
    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn decision_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn generation_count(&self) -> usize {
        self.generations.lock().map(|g| *g).unwrap_or(0)
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide(&self, request: &OracleRequest) -> Result<RawDecision, OracleError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        (self.decider)(request)
    }

    async fn generate(&self, system_context: &str, prompt: &str) -> Result<String, OracleError> {
        if let Ok(mut count) = self.generations.lock() {
            *count += 1;
        }
        (self.generator)(system_context, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(actions: &[&str]) -> OracleRequest {
        OracleRequest {
            role: "analyst".to_string(),
            system_context: String::new(),
            request: String::new(),
            allowed_actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_queue_then_exhausted() {
        let oracle = ScriptedOracle::from_actions(["a", "b"]);
        let req = request(&["a", "b"]);

        assert_eq!(oracle.decide(&req).await.unwrap().action, "a");
        assert_eq!(oracle.decide(&req).await.unwrap().action, "b");
        assert!(matches!(
            oracle.decide(&req).await,
            Err(OracleError::Transport(_))
        ));
        assert_eq!(oracle.decision_count(), 3);
    }

    #[tokio::test]
    async fn test_default_picks_first_allowed() {
        let oracle = ScriptedOracle::new();
        let decision = oracle.decide(&request(&["respond", "clarify"])).await.unwrap();
        assert_eq!(decision.action, "respond");

        let text = oracle.generate("sys", "line one\nline two").await.unwrap();
        assert_eq!(text, "line one");
        assert_eq!(oracle.generation_count(), 1);
    }
}
