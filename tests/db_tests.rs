//! Database integration tests
//!
//! These tests exercise the libsql-backed research store through the
//! `ResearchStore` trait, using in-memory SQLite unless noted.

use chrono::Utc;
use deepbench::db::{DatabaseProvider, ResearchStore, TursoClient};
use deepbench::types::{
    AppError, HistoryFilter, ModelKind, ResearchResult, SessionType, StageTimings,
};
use rstest::rstest;
use serde_json::json;

async fn create_test_store() -> TursoClient {
    TursoClient::new_memory()
        .await
        .expect("Failed to create in-memory database")
}

fn result(research_id: &str, session_id: &str, model: ModelKind, success: bool) -> ResearchResult {
    ResearchResult {
        research_id: research_id.to_string(),
        session_id: session_id.to_string(),
        model,
        duration: 30.0,
        stage_timings: StageTimings::from([
            ("research_brief".to_string(), 2.0),
            ("final_report".to_string(), 8.0),
        ]),
        sources_found: if success { 5 } else { 0 },
        word_count: if success { 800 } else { 0 },
        success,
        error: (!success).then(|| "Provider error: upstream 503".to_string()),
        report_content: if success {
            "A report https://example.com".to_string()
        } else {
            String::new()
        },
        supervisor_tools_used: vec!["conduct_research".to_string()],
        research_brief: Some("brief".to_string()),
        created_at: Utc::now(),
    }
}

fn with_duration(mut r: ResearchResult, duration: f64) -> ResearchResult {
    r.duration = duration;
    r
}

// ============= Sessions =============

#[tokio::test]
async fn test_create_session_is_idempotent() {
    let store = create_test_store().await;

    let first = store
        .create_session("s-1", "What is Rust?", SessionType::Individual)
        .await
        .unwrap();
    let second = store
        .create_session("s-1", "What is Rust?", SessionType::Individual)
        .await
        .unwrap();

    assert_eq!(first.session_id, second.session_id);
    assert_eq!(first.created_at, second.created_at);
    assert_eq!(store.list_sessions(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_session_reuse_with_different_query_conflicts() {
    let store = create_test_store().await;
    store
        .create_session("s-1", "What is Rust?", SessionType::Individual)
        .await
        .unwrap();

    let err = store
        .create_session("s-1", "What is Go?", SessionType::Individual)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = store
        .create_session("s-1", "What is Rust?", SessionType::Comparison)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_update_feedback() {
    let store = create_test_store().await;
    let created = store
        .create_session("s-1", "q", SessionType::Comparison)
        .await
        .unwrap();

    let feedback = json!({"preferred": "anthropic", "rating": 4});
    let updated = store.update_feedback("s-1", &feedback).await.unwrap();
    assert_eq!(updated.user_feedback, Some(feedback));
    assert!(updated.updated_at >= created.updated_at);

    let err = store.update_feedback("missing", &json!({})).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ============= Results =============

#[tokio::test]
async fn test_result_without_session_is_referential_error() {
    let store = create_test_store().await;
    let err = store
        .insert_result(&result("r-1", "nope", ModelKind::OpenAI, true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Referential(_)));
}

#[tokio::test]
async fn test_duplicate_research_id_conflicts() {
    let store = create_test_store().await;
    store
        .create_session("s-1", "q", SessionType::Comparison)
        .await
        .unwrap();
    store
        .insert_result(&result("r-1", "s-1", ModelKind::OpenAI, true))
        .await
        .unwrap();

    let err = store
        .insert_result(&result("r-1", "s-1", ModelKind::Kimi, true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_individual_session_holds_one_result() {
    let store = create_test_store().await;
    store
        .create_session("s-1", "q", SessionType::Individual)
        .await
        .unwrap();
    store
        .insert_result(&result("r-1", "s-1", ModelKind::OpenAI, true))
        .await
        .unwrap();

    let err = store
        .insert_result(&result("r-2", "s-1", ModelKind::Anthropic, true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_comparison_session_one_result_per_model() {
    let store = create_test_store().await;
    store
        .create_session("s-1", "q", SessionType::Comparison)
        .await
        .unwrap();
    store
        .insert_result(&result("r-1", "s-1", ModelKind::OpenAI, true))
        .await
        .unwrap();
    store
        .insert_result(&result("r-2", "s-1", ModelKind::Anthropic, false))
        .await
        .unwrap();

    let err = store
        .insert_result(&result("r-3", "s-1", ModelKind::OpenAI, true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(store.results_for_session("s-1").await.unwrap().len(), 2);
}

#[rstest]
#[case(-1.0)]
#[case(f64::NAN)]
#[tokio::test]
async fn test_invalid_duration_rejected(#[case] duration: f64) {
    let store = create_test_store().await;
    store
        .create_session("s-1", "q", SessionType::Individual)
        .await
        .unwrap();
    let err = store
        .insert_result(&with_duration(
            result("r-1", "s-1", ModelKind::OpenAI, true),
            duration,
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_result_round_trip_through_history() {
    let store = create_test_store().await;
    store
        .create_session("s-1", "Explain Raft", SessionType::Individual)
        .await
        .unwrap();
    let stored = with_duration(result("r-1", "s-1", ModelKind::Kimi, true), 42.75);
    store.insert_result(&stored).await.unwrap();

    let history = store
        .research_history(&HistoryFilter::default(), false)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    let row = &history[0];
    assert_eq!(row.research_id, "r-1");
    assert_eq!(row.query, "Explain Raft");
    assert_eq!(row.model, ModelKind::Kimi);
    assert_eq!(row.duration, 42.75);
    assert!(row.success);
    assert_eq!(row.sources_found, 5);
    assert_eq!(row.word_count, 800);

    let fetched = store.get_result("r-1").await.unwrap().unwrap();
    assert_eq!(fetched.stage_timings, stored.stage_timings);
    assert_eq!(fetched.supervisor_tools_used, stored.supervisor_tools_used);
    assert_eq!(fetched.report_content, stored.report_content);
}

// ============= Delete =============

#[tokio::test]
async fn test_delete_cascades_and_blocks_later_inserts() {
    let store = create_test_store().await;
    store
        .create_session("s-1", "q", SessionType::Comparison)
        .await
        .unwrap();
    store
        .insert_result(&result("r-1", "s-1", ModelKind::OpenAI, true))
        .await
        .unwrap();
    store
        .insert_result(&result("r-2", "s-1", ModelKind::Kimi, true))
        .await
        .unwrap();

    assert!(store.delete_session("s-1").await.unwrap());
    assert!(store.get_session("s-1").await.unwrap().is_none());
    assert!(store.results_for_session("s-1").await.unwrap().is_empty());
    assert!(store.get_result("r-1").await.unwrap().is_none());

    let err = store
        .insert_result(&result("r-3", "s-1", ModelKind::Anthropic, true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Referential(_)));
}

#[tokio::test]
async fn test_delete_absent_session_is_noop() {
    let store = create_test_store().await;
    assert!(!store.delete_session("never-existed").await.unwrap());
    assert!(!store.delete_session("never-existed").await.unwrap());
}

// ============= Views =============

#[tokio::test]
async fn test_success_rate_rounding() {
    let store = create_test_store().await;
    for (i, ok) in [true, true, false].into_iter().enumerate() {
        let sid = format!("s-{}", i);
        store
            .create_session(&sid, "q", SessionType::Individual)
            .await
            .unwrap();
        store
            .insert_result(&result(&format!("r-{}", i), &sid, ModelKind::OpenAI, ok))
            .await
            .unwrap();
    }

    let performance = store.model_performance().await.unwrap();
    assert_eq!(performance.len(), 1);
    let openai = &performance[0];
    assert_eq!(openai.model, ModelKind::OpenAI);
    assert_eq!(openai.total_runs, 3);
    assert_eq!(openai.success_rate, 66.67);
    assert_eq!(openai.avg_duration, 30.0);
}

#[tokio::test]
async fn test_models_without_results_absent_from_performance() {
    let store = create_test_store().await;
    store
        .create_session("s-1", "q", SessionType::Individual)
        .await
        .unwrap();
    assert!(store.model_performance().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_models_compared_tracks_result_count() {
    let store = create_test_store().await;
    store
        .create_session("cmp", "Compare vector DBs", SessionType::Comparison)
        .await
        .unwrap();

    let history = store.comparison_history(10, 0).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].models_compared, 0);
    assert_eq!(history[0].successful_runs, 0);
    assert!(history[0].avg_duration.is_none());

    store
        .insert_result(&with_duration(
            result("r-1", "cmp", ModelKind::OpenAI, true),
            10.0,
        ))
        .await
        .unwrap();
    store
        .insert_result(&with_duration(
            result("r-2", "cmp", ModelKind::Anthropic, false),
            20.0,
        ))
        .await
        .unwrap();

    let history = store.comparison_history(10, 0).await.unwrap();
    assert_eq!(history[0].models_compared, 2);
    assert_eq!(history[0].successful_runs, 1);
    assert_eq!(history[0].avg_duration, Some(15.0));
    assert_eq!(history[0].min_duration, Some(10.0));
    assert_eq!(history[0].max_duration, Some(20.0));
}

#[tokio::test]
async fn test_individual_sessions_excluded_from_comparisons() {
    let store = create_test_store().await;
    store
        .create_session("ind", "q", SessionType::Individual)
        .await
        .unwrap();
    assert!(store.comparison_history(10, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_filters_and_order() {
    let store = create_test_store().await;
    let runs = [
        ("s-1", "Rust ownership", SessionType::Individual, ModelKind::OpenAI, true),
        ("s-2", "Go generics", SessionType::Individual, ModelKind::Anthropic, false),
        ("s-3", "rust async runtimes", SessionType::Comparison, ModelKind::Kimi, true),
    ];
    for (i, (sid, query, kind, model, ok)) in runs.into_iter().enumerate() {
        store.create_session(sid, query, kind).await.unwrap();
        store
            .insert_result(&result(&format!("r-{}", i), sid, model, ok))
            .await
            .unwrap();
    }

    let all = store
        .research_history(&HistoryFilter::default(), false)
        .await
        .unwrap();
    let ids: Vec<&str> = all.iter().map(|h| h.research_id.as_str()).collect();
    assert_eq!(ids, vec!["r-2", "r-1", "r-0"]);

    let rust = store
        .research_history(
            &HistoryFilter {
                search: Some("RUST".into()),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(rust.len(), 2);

    let failed = store
        .research_history(
            &HistoryFilter {
                success: Some(false),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].model, ModelKind::Anthropic);
    assert!(failed[0].error.is_some());

    let individual = store
        .research_history(&HistoryFilter::default(), true)
        .await
        .unwrap();
    assert!(individual
        .iter()
        .all(|h| h.session_type == SessionType::Individual));
    assert_eq!(individual.len(), 2);

    let paged = store
        .research_history(
            &HistoryFilter {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].research_id, "r-1");

    let err = store
        .research_history(
            &HistoryFilter {
                model: Some("gemini".into()),
                ..Default::default()
            },
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_repeated_queries_are_identical() {
    let store = create_test_store().await;
    store
        .create_session("s-1", "q", SessionType::Comparison)
        .await
        .unwrap();
    store
        .insert_result(&result("r-1", "s-1", ModelKind::OpenAI, true))
        .await
        .unwrap();

    assert_eq!(
        store.model_performance().await.unwrap(),
        store.model_performance().await.unwrap()
    );
    assert_eq!(
        store.comparison_history(10, 0).await.unwrap(),
        store.comparison_history(10, 0).await.unwrap()
    );
    assert_eq!(
        store
            .research_history(&HistoryFilter::default(), false)
            .await
            .unwrap(),
        store
            .research_history(&HistoryFilter::default(), false)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_stage_averages() {
    let store = create_test_store().await;
    store
        .create_session("s-1", "q", SessionType::Comparison)
        .await
        .unwrap();
    store
        .create_session("s-2", "q2", SessionType::Comparison)
        .await
        .unwrap();
    let mut slow = result("r-2", "s-2", ModelKind::OpenAI, true);
    slow.stage_timings = StageTimings::from([("research_brief".to_string(), 3.0)]);
    store
        .insert_result(&result("r-1", "s-1", ModelKind::OpenAI, true))
        .await
        .unwrap();
    store.insert_result(&slow).await.unwrap();

    let averages = store.stage_averages(ModelKind::OpenAI).await.unwrap();
    let brief = averages
        .iter()
        .find(|a| a.stage == "research_brief")
        .unwrap();
    assert_eq!(brief.avg_seconds, 2.5);
    let report = averages.iter().find(|a| a.stage == "final_report").unwrap();
    assert_eq!(report.avg_seconds, 8.0);

    assert!(store.stage_averages(ModelKind::Kimi).await.unwrap().is_empty());
}

// ============= File-backed =============

#[tokio::test]
async fn test_file_database_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("deepbench.db");
    let path = path.to_str().unwrap().to_string();

    {
        let store = DatabaseProvider::SQLite { path: path.clone() }
            .create_store()
            .await
            .unwrap();
        store
            .create_session("s-1", "persisted", SessionType::Individual)
            .await
            .unwrap();
        store
            .insert_result(&result("r-1", "s-1", ModelKind::Anthropic, true))
            .await
            .unwrap();
    }

    let reopened = DatabaseProvider::SQLite { path }
        .create_store()
        .await
        .unwrap();
    let session = reopened.get_session("s-1").await.unwrap().unwrap();
    assert_eq!(session.query, "persisted");
    assert_eq!(reopened.results_for_session("s-1").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_file_database_concurrent_inserts_keep_one_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deepbench.db").to_str().unwrap().to_string();
    let store = DatabaseProvider::SQLite { path }.create_store().await.unwrap();
    store
        .create_session("s-1", "contended", SessionType::Individual)
        .await
        .unwrap();

    let first = result("r-1", "s-1", ModelKind::OpenAI, true);
    let second = result("r-2", "s-1", ModelKind::Anthropic, true);
    let filter = HistoryFilter::default();
    let (a, b, history) = tokio::join!(
        store.insert_result(&first),
        store.insert_result(&second),
        store.research_history(&filter, false),
    );

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(
        outcomes
            .iter()
            .any(|o| matches!(o, Err(AppError::Conflict(_))))
    );
    assert!(history.unwrap().len() <= 1);
    assert_eq!(store.results_for_session("s-1").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_file_database_reads_alongside_writes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("deepbench.db").to_str().unwrap().to_string();
    let store = DatabaseProvider::SQLite { path }.create_store().await.unwrap();

    let writes = (0..8).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            let session_id = format!("s-{}", i);
            store
                .create_session(&session_id, "parallel", SessionType::Individual)
                .await?;
            store
                .insert_result(&result(&format!("r-{}", i), &session_id, ModelKind::Kimi, true))
                .await
        })
    });
    let reads = (0..8).map(|_| {
        let store = store.clone();
        tokio::spawn(async move { store.model_performance().await.map(|_| ()) })
    });
    let handles: Vec<_> = writes.chain(reads).collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let performance = store.model_performance().await.unwrap();
    assert_eq!(performance.len(), 1);
    assert_eq!(performance[0].total_runs, 8);
}
