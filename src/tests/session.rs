use std::sync::Arc;
use std::time::Duration;

use super::fakes;
use crate::errors::{InferenceError, SessionError};
use crate::genre::Genre;
use crate::session::{FollowUp, Phase, QuerySession};

const MATRIX_QUERY: &str = "A hacker discovers a simulated reality controlled by machines.";

fn session(top_k: usize) -> QuerySession {
    QuerySession::new(Arc::new(fakes::bundle()), top_k)
}

#[test]
fn starts_idle() {
    let session = session(3);
    assert_eq!(session.phase(), Phase::Idle);
    assert!(session.retrieval().is_none());
    assert!(session.selected().is_none());
}

#[test]
fn follow_up_before_search_is_rejected() {
    let mut session = session(3);
    let result = session.answer_follow_up("The Matrix", "Who is the main character?");
    assert!(matches!(result, Err(SessionError::NothingRetrieved)));
    assert_eq!(session.phase(), Phase::Idle);
}

#[test]
fn end_to_end_search_then_ask() {
    let mut session = session(3);

    let retrieval = session.classify_and_retrieve(MATRIX_QUERY).unwrap();
    assert_eq!(retrieval.genre, Genre::ScienceFiction);
    assert_eq!(retrieval.query, MATRIX_QUERY);
    assert_eq!(retrieval.matches.len(), 3);
    assert_eq!(retrieval.matches[0].title, "The Matrix");
    assert!(retrieval
        .matches
        .windows(2)
        .all(|w| w[0].score >= w[1].score));
    assert_eq!(session.phase(), Phase::Retrieved);

    let answer = session
        .answer_follow_up("The Matrix", "Who is the main character?")
        .unwrap();
    assert_eq!(
        answer,
        FollowUp::Answer {
            title: "The Matrix".to_string(),
            answer: "Thomas Anderson".to_string(),
        }
    );
    assert_eq!(session.selected(), Some("The Matrix"));
    assert_eq!(session.phase(), Phase::Retrieved);
}

#[test]
fn retrieval_is_repeatable() {
    let mut session = session(3);
    let first = session.classify_and_retrieve(MATRIX_QUERY).unwrap().clone();
    let second = session.classify_and_retrieve(MATRIX_QUERY).unwrap().clone();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn k_beyond_catalog_returns_whole_catalog() {
    let mut session = session(10);
    let retrieval = session.classify_and_retrieve("a love story").unwrap();
    assert_eq!(retrieval.matches.len(), fakes::movies().len());
}

#[test]
fn missing_context_is_soft_and_keeps_results() {
    let mut session = session(5);
    let before = session
        .classify_and_retrieve("a haunted house with a ghost")
        .unwrap()
        .clone();
    assert_eq!(before.genre, Genre::Horror);

    let outcome = session
        .answer_follow_up("The Others", "Who lives in the house?")
        .unwrap();
    assert_eq!(
        outcome,
        FollowUp::NoContext {
            title: "The Others".to_string()
        }
    );
    assert_eq!(session.phase(), Phase::Retrieved);
    assert_eq!(session.retrieval(), Some(&before));
}

#[test]
fn duplicate_context_rows_use_the_first() {
    let mut session = session(5);
    session.classify_and_retrieve("an alien in space").unwrap();
    let outcome = session
        .answer_follow_up("Alien", "Who survives?")
        .unwrap();
    assert_eq!(
        outcome,
        FollowUp::Answer {
            title: "Alien".to_string(),
            answer: "Ellen Ripley".to_string(),
        }
    );
}

#[test]
fn selection_must_come_from_current_results() {
    let mut session = session(1);
    session.classify_and_retrieve(MATRIX_QUERY).unwrap();

    let result = session.answer_follow_up("Heat", "Who is the detective?");
    assert!(matches!(result, Err(SessionError::InvalidSelection(t)) if t == "Heat"));
    assert!(session.selected().is_none());
}

#[test]
fn new_search_replaces_state() {
    let mut session = session(3);
    session.classify_and_retrieve(MATRIX_QUERY).unwrap();
    session
        .answer_follow_up("The Matrix", "Who is the main character?")
        .unwrap();
    assert!(session.selected().is_some());

    let retrieval = session
        .classify_and_retrieve("a detective chases bank robbers")
        .unwrap();
    assert_eq!(retrieval.genre, Genre::Thriller);
    assert!(session.selected().is_none());
}

#[test]
fn inference_failure_keeps_previous_results() {
    let mut session = session(3);
    let before = session.classify_and_retrieve(MATRIX_QUERY).unwrap().clone();

    let result = session.classify_and_retrieve("ships explode in orbit");
    assert!(matches!(
        result,
        Err(SessionError::Inference(InferenceError::Model(_)))
    ));
    assert_eq!(session.retrieval(), Some(&before));

    // still usable afterwards
    assert!(session.classify_and_retrieve("a love story").is_ok());
}

#[test]
fn slow_request_times_out_without_killing_session() {
    let mut session = session(3).with_timeout(Some(Duration::from_millis(50)));

    let result = session.classify_and_retrieve("machines slowly take over");
    assert!(matches!(result, Err(SessionError::Timeout(_))));
    assert_eq!(session.phase(), Phase::Idle);

    let retrieval = session.classify_and_retrieve(MATRIX_QUERY).unwrap();
    assert_eq!(retrieval.matches[0].title, "The Matrix");
}

#[test]
fn follow_up_runs_on_worker_with_timeout() {
    let mut session = session(3).with_timeout(Some(Duration::from_secs(5)));
    session.classify_and_retrieve(MATRIX_QUERY).unwrap();
    let outcome = session
        .answer_follow_up("The Matrix", "Who is the main character?")
        .unwrap();
    assert!(matches!(outcome, FollowUp::Answer { answer, .. } if answer == "Thomas Anderson"));
}

#[test]
fn direct_answer_needs_no_search() {
    let session = session(3);
    let outcome = session
        .answer_title("Heat", "Who hunts the thief?")
        .unwrap();
    assert_eq!(
        outcome,
        FollowUp::Answer {
            title: "Heat".to_string(),
            answer: "Vincent Hanna".to_string(),
        }
    );
    assert_eq!(session.phase(), Phase::Idle);
}

#[test]
fn direct_answer_respects_timeout() {
    let session = session(3).with_timeout(Some(Duration::from_millis(50)));

    let result = session.answer_title("Heat", "Who slowly closes in?");
    assert!(matches!(result, Err(SessionError::Timeout(_))));

    let outcome = session.answer_title("Heat", "Who hunts the thief?").unwrap();
    assert!(matches!(outcome, FollowUp::Answer { answer, .. } if answer == "Vincent Hanna"));
}
