mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{vocabulary_vector, Harness};
use legal_rag::agent::{AgentHandle, AgentState};
use legal_rag::config::{default_persona, Config};
use legal_rag::corpus::Corpus;
use legal_rag::error::LegalRagError;
use legal_rag::persona::PersonaStore;
use legal_rag::prompt::legal_prompt;
use tempfile::TempDir;

fn corpus_with(files: &[(&str, &str)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (name, text) in files {
        fs::write(tmp.path().join(name), text).unwrap();
    }
    tmp
}

fn retrieved_documents(chunks: &[legal_rag::index::RetrievedChunk]) -> Vec<String> {
    chunks.iter().map(|c| c.document.clone()).collect()
}

#[test]
fn legal_prompt_template_adds_no_vocabulary_terms() {
    let prompt = legal_prompt("", &default_persona()["disclaimer"]);
    assert!(prompt.contains("please"));
    assert_eq!(vocabulary_vector(&prompt), vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

    let prompt = legal_prompt("Is the lease assignable?", &default_persona()["disclaimer"]);
    assert_eq!(vocabulary_vector(&prompt), vec![1.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
}

#[tokio::test]
async fn blank_queries_fail_without_backend_calls() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    let handle = harness.handle().await;
    let embed_calls = harness.embedder.calls.load(Ordering::SeqCst);

    for query in ["", " ", "\t\n", "   \r\n  "] {
        let err = handle.query(query).await.unwrap_err();
        assert!(matches!(err, LegalRagError::InvalidInput(_)), "{:?}", query);
    }

    assert_eq!(harness.embedder.calls.load(Ordering::SeqCst), embed_calls);
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn response_ends_with_disclaimer_after_blank_line() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    let handle = harness.handle().await;

    let response = handle.query("How long is the lease?").await.unwrap();
    let disclaimer = harness.persona.disclaimer();

    assert!(!disclaimer.is_empty());
    assert_eq!(
        response,
        format!("The documents address the question.\n\n{}", disclaimer)
    );
}

#[tokio::test]
async fn prompt_carries_query_context_and_disclaimer() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    let handle = harness.handle().await;

    handle.query("How long is the lease?").await.unwrap();

    let prompt = harness.llm.last_prompt();
    assert!(prompt.contains("file_name: lease.txt"));
    assert!(prompt.contains("The lease runs for five years."));
    assert!(prompt.contains("Query: How long is the lease?"));
    assert!(prompt.contains("Addresses the specific legal aspects of the query"));
    assert!(prompt.contains(&harness.persona.disclaimer()));
}

#[tokio::test]
async fn persona_update_changes_next_response() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    let handle = harness.handle().await;

    let mut update = std::collections::BTreeMap::new();
    update.insert("disclaimer".to_string(), "Consult a solicitor.".to_string());
    handle.persona().update(update).unwrap();

    let response = handle.query("How long is the lease?").await.unwrap();
    assert!(response.ends_with("\n\nConsult a solicitor."));
    assert!(harness.llm.last_prompt().contains("Consult a solicitor."));
}

#[tokio::test]
async fn retrieval_respects_similarity_top_k() {
    let tmp = corpus_with(&[
        ("lease.txt", "The lease runs for five years."),
        ("patent.txt", "The patent covers the widget."),
        ("merger.txt", "The merger closes in May."),
    ]);
    let harness = Harness::new(tmp.path(), 1);
    let handle = harness.handle().await;

    let chunks = handle.retrieve("Who owns the patent?").await.unwrap();
    assert_eq!(retrieved_documents(&chunks), vec!["patent.txt"]);
}

#[tokio::test]
async fn corpus_changes_are_reflected_after_reinitialization() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 1);
    let handle = harness.handle().await;
    let corpus = Corpus::new(tmp.path());

    let before = handle.retrieve("What is zephyrium?").await.unwrap();
    assert_eq!(retrieved_documents(&before), vec!["lease.txt"]);

    corpus
        .upload("memo.txt", b"Zephyrium rights are assigned to the buyer.")
        .unwrap();
    handle.reinitialize().await.unwrap();

    let with_memo = handle.retrieve("What is zephyrium?").await.unwrap();
    assert_eq!(retrieved_documents(&with_memo), vec!["memo.txt"]);

    corpus.delete("memo.txt").unwrap();
    handle.reinitialize().await.unwrap();

    let after = handle.retrieve("What is zephyrium?").await.unwrap();
    assert!(!retrieved_documents(&after).contains(&"memo.txt".to_string()));
    let response = handle.query("What is zephyrium?").await.unwrap();
    assert!(!harness.llm.last_prompt().contains("Zephyrium rights"));
    assert!(response.ends_with(&harness.persona.disclaimer()));
}

#[tokio::test]
async fn in_flight_snapshot_keeps_old_index() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    let handle = harness.handle().await;

    let old = handle.snapshot().unwrap();
    fs::write(tmp.path().join("memo.txt"), "Zephyrium rights.").unwrap();
    handle.reinitialize().await.unwrap();

    assert_eq!(old.index().documents(), vec!["lease.txt"]);
    assert_eq!(
        handle.snapshot().unwrap().index().documents(),
        vec!["lease.txt", "memo.txt"]
    );
    // The old snapshot still answers.
    assert!(old.query("What is the lease term?").await.is_ok());
}

#[tokio::test]
async fn generation_failure_is_recoverable() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    let handle = harness.handle().await;

    harness.llm.fail.store(true, Ordering::SeqCst);
    let err = handle.query("How long is the lease?").await.unwrap_err();
    assert!(matches!(err, LegalRagError::QueryProcessing(_)));
    assert!(err.is_recoverable());
    assert_eq!(handle.state(), AgentState::Ready);

    harness.llm.fail.store(false, Ordering::SeqCst);
    assert!(handle.query("How long is the lease?").await.is_ok());
}

#[tokio::test]
async fn embedding_failure_during_query_is_query_processing_error() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    let handle = harness.handle().await;

    harness.embedder.fail.store(true, Ordering::SeqCst);
    let err = handle.query("How long is the lease?").await.unwrap_err();
    assert!(matches!(err, LegalRagError::QueryProcessing(_)));
    assert_eq!(harness.llm.call_count(), 0);
}

#[tokio::test]
async fn failed_rebuild_keeps_previous_agent() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    let handle = harness.handle().await;

    harness.embedder.fail.store(true, Ordering::SeqCst);
    let err = handle.reinitialize().await.unwrap_err();
    assert!(matches!(err, LegalRagError::Initialization(_)));
    assert_eq!(handle.state(), AgentState::Failed);
    assert_eq!(
        handle.snapshot().unwrap().index().documents(),
        vec!["lease.txt"]
    );

    harness.embedder.fail.store(false, Ordering::SeqCst);
    handle.reinitialize().await.unwrap();
    assert_eq!(handle.state(), AgentState::Ready);
}

#[tokio::test]
async fn first_build_failure_leaves_no_agent() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    harness.embedder.fail.store(true, Ordering::SeqCst);

    let handle = AgentHandle::new(
        harness.config.clone(),
        harness.backends(),
        harness.persona.clone(),
    );
    assert_eq!(handle.state(), AgentState::Uninitialized);
    assert!(matches!(
        handle.reinitialize().await,
        Err(LegalRagError::Initialization(_))
    ));
    assert!(handle.snapshot().is_none());
    assert!(matches!(
        handle.query("How long is the lease?").await,
        Err(LegalRagError::QueryProcessing(_))
    ));
}

#[tokio::test]
async fn concurrent_queries_and_rebuilds() {
    let tmp = corpus_with(&[("lease.txt", "The lease runs for five years.")]);
    let harness = Harness::new(tmp.path(), 5);
    let handle = Arc::new(harness.handle().await);

    let mut tasks = Vec::new();
    for i in 0..8 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            if i % 4 == 0 {
                handle.reinitialize().await.map(|_| String::new())
            } else {
                handle.query("How long is the lease?").await
            }
        }));
    }
    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(handle.state(), AgentState::Ready);
}

#[tokio::test]
async fn missing_credential_is_configuration_error() {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.documents.dir = tmp.path().to_path_buf();
    config.generation.api_key_env = "LEGAL_RAG_TEST_CREDENTIAL_NEVER_SET".to_string();
    let persona = Arc::new(PersonaStore::new(config.persona.clone()));

    let err = match AgentHandle::start(Arc::new(config), persona).await {
        Ok(_) => panic!("start must fail without a credential"),
        Err(e) => e,
    };
    assert!(matches!(err, LegalRagError::Configuration(_)));
    assert!(!err.is_recoverable());
}
