//! Per-user query session: search, then ask about one of the results.
//!
//! ```text
//! Idle --classify_and_retrieve--> Retrieved --answer_follow_up--> Retrieved
//!                                     ^                              |
//!                                     +----classify_and_retrieve-----+
//! ```
//!
//! Answering is transient: a follow-up resolves the synopsis, runs the QA
//! model and returns to Retrieved with the result list untouched, whether
//! it produced an answer or found no synopsis.

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::errors::{InferenceError, SessionError};
use crate::genre::Genre;
use crate::resources::ResourceBundle;
use crate::semantic::MatchResult;

/// The most recent successful search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Retrieval {
    pub query: String,
    pub genre: Genre,
    pub matches: Vec<MatchResult>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Retrieved,
}

/// Result of a follow-up question. A missing synopsis is an ordinary
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FollowUp {
    Answer { title: String, answer: String },
    NoContext { title: String },
}

#[derive(Debug)]
struct SessionState {
    retrieval: Retrieval,
    /// Title of the last result asked about. The synopsis itself stays in
    /// the shared bundle.
    selected: Option<String>,
}

pub struct QuerySession {
    bundle: Arc<ResourceBundle>,
    top_k: usize,
    timeout: Option<Duration>,
    state: Option<SessionState>,
}

impl QuerySession {
    pub fn new(bundle: Arc<ResourceBundle>, top_k: usize) -> Self {
        Self {
            bundle,
            top_k: top_k.max(1),
            timeout: None,
            state: None,
        }
    }

    /// Give up on any single request that runs longer than `timeout`. The
    /// abandoned call finishes in the background and its result is dropped.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            None => Phase::Idle,
            Some(_) => Phase::Retrieved,
        }
    }

    pub fn retrieval(&self) -> Option<&Retrieval> {
        self.state.as_ref().map(|s| &s.retrieval)
    }

    pub fn selected(&self) -> Option<&str> {
        self.state.as_ref().and_then(|s| s.selected.as_deref())
    }

    /// Classify `query`, search the catalog and make the results the
    /// session's current list. On failure the previous list is kept.
    pub fn classify_and_retrieve(&mut self, query: &str) -> Result<&Retrieval, SessionError> {
        let owned = query.to_string();
        let k = self.top_k;

        let (genre, matches) = self.call("search", move |bundle| {
            let genre = bundle.classifier.classify(&owned)?;
            let matches = bundle.retriever.search(&owned, genre, k)?;
            Ok((genre, matches))
        })?;

        log::info!(
            "query classified as {genre}, {} matches",
            matches.len()
        );

        let state = self.state.insert(SessionState {
            retrieval: Retrieval {
                query: query.to_string(),
                genre,
                matches,
            },
            selected: None,
        });
        Ok(&state.retrieval)
    }

    /// Answer `question` about `title`, which must be one of the current
    /// results.
    pub fn answer_follow_up(
        &mut self,
        title: &str,
        question: &str,
    ) -> Result<FollowUp, SessionError> {
        let state = self.state.as_ref().ok_or(SessionError::NothingRetrieved)?;
        if !state.retrieval.matches.iter().any(|m| m.title == title) {
            return Err(SessionError::InvalidSelection(title.to_string()));
        }

        let outcome = self.answer_title(title, question)?;

        if let Some(state) = self.state.as_mut() {
            state.selected = Some(title.to_string());
        }
        Ok(outcome)
    }

    /// Answer `question` about any catalog title, without touching the
    /// session's results. The request timeout still applies.
    pub fn answer_title(&self, title: &str, question: &str) -> Result<FollowUp, SessionError> {
        let owned_title = title.to_string();
        let owned_question = question.to_string();
        let outcome = self.call("answer", move |bundle| {
            let Some(context) = bundle.contexts.resolve(&owned_title) else {
                return Ok(FollowUp::NoContext { title: owned_title });
            };
            let answer = bundle.answerer.answer(&owned_question, context)?;
            Ok(FollowUp::Answer {
                title: owned_title,
                answer,
            })
        })?;

        if let FollowUp::NoContext { title } = &outcome {
            log::info!("no synopsis found for '{title}'");
        }
        Ok(outcome)
    }

    /// Run one blocking pipeline call, on a worker thread when a timeout is
    /// configured.
    fn call<T, F>(&self, request: &'static str, f: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(&ResourceBundle) -> Result<T, InferenceError> + Send + 'static,
    {
        let span = tracing::info_span!("request", kind = request);

        let Some(timeout) = self.timeout else {
            return span.in_scope(|| f(&self.bundle)).map_err(SessionError::from);
        };

        let bundle = Arc::clone(&self.bundle);
        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("reelqa-request".to_string())
            .spawn(move || {
                // receiver is gone when the request already timed out
                let _ = tx.send(span.in_scope(|| f(&bundle)));
            })
            .map_err(|e| {
                log::error!("failed to spawn request worker: {e}");
                SessionError::WorkerLost
            })?;

        match rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(SessionError::from),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("request exceeded {}s, abandoning it", timeout.as_secs_f32());
                Err(SessionError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::WorkerLost),
        }
    }
}
