//! Verification loop with scripted reasoning and search

mod common;

use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use common::{FINAL_REAL, ScriptedReasoning, StubSearch, hit, search_request, test_config};
use kodegen_tools_veracity::reasoning::{MessageContent, Role, Verdict};
use kodegen_tools_veracity::{
    FnSink, NoopSink, StatusEvent, VerificationError, VerificationLoop,
};

fn verification_loop(
    dir: &std::path::Path,
    reasoning: &Arc<ScriptedReasoning>,
    search: &Arc<StubSearch>,
) -> VerificationLoop {
    VerificationLoop::new(
        test_config(dir),
        Arc::clone(reasoning) as Arc<dyn kodegen_tools_veracity::ReasoningService>,
        Arc::clone(search) as Arc<dyn kodegen_tools_veracity::WebSearchService>,
    )
}

fn text_of(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Parts(_) => String::new(),
    }
}

#[tokio::test]
async fn one_search_then_final_verdict() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let reasoning = Arc::new(ScriptedReasoning::new([search_request("X"), FINAL_REAL.to_string()]));
    let search = Arc::new(StubSearch::returning(vec![hit("官方通报", "https://gov.example/1")]));
    let looped = verification_loop(dir.path(), &reasoning, &search);

    let result = looped
        .run("某地发生暴雨", &[], None, &CancellationToken::new(), &NoopSink)
        .await?;

    assert_eq!(search.calls(), 1);
    assert_eq!(reasoning.calls(), 2);
    assert_eq!(result.verdict, Verdict::Real);
    assert_eq!(result.probability, 90.0);
    assert_eq!(result.rounds, 2);
    assert_eq!(result.search_results.len(), 1);
    assert_eq!(result.search_results[0].query, "X");
    assert_eq!(result.search_results[0].round, 1);
    assert_eq!(result.search_results[0].hits[0].url, "https://gov.example/1");

    // Round two sees the prior reply and the compact results
    let seen = reasoning.seen.lock();
    let second = &seen[1];
    assert_eq!(second.len(), 4);
    assert_eq!(second[2].role, Role::Assistant);
    assert!(text_of(&second[3].content).contains("官方通报"));
    Ok(())
}

#[tokio::test]
async fn round_cap_returns_a_result() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let reasoning = Arc::new(ScriptedReasoning::new([
        r#"{"needs_search": true, "search_query": "again", "probability": 30, "verdict": "Fake", "explanation": "疑点较多"}"#,
    ]));
    let search = Arc::new(StubSearch::returning(Vec::new()));
    let looped = verification_loop(dir.path(), &reasoning, &search);

    let result = looped
        .run("传言", &[], None, &CancellationToken::new(), &NoopSink)
        .await?;

    assert_eq!(reasoning.calls(), 4);
    assert_eq!(search.calls(), 3);
    assert_eq!(result.rounds, 4);
    assert_eq!(result.verdict, Verdict::Fake);
    assert_eq!(result.probability, 30.0);
    Ok(())
}

#[tokio::test]
async fn round_cap_without_verdict_fields_is_inconclusive() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let reasoning = Arc::new(ScriptedReasoning::new([search_request("again")]));
    let search = Arc::new(StubSearch::returning(Vec::new()));
    let looped = verification_loop(dir.path(), &reasoning, &search);

    let result = looped
        .run("传言", &[], None, &CancellationToken::new(), &NoopSink)
        .await?;

    assert_eq!(reasoning.calls(), 4);
    assert_eq!(result.verdict, Verdict::Mixed);
    assert_eq!(result.probability, 50.0);
    Ok(())
}

#[tokio::test]
async fn cancelled_before_start_does_nothing() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let reasoning = Arc::new(ScriptedReasoning::new([search_request("X")]));
    let search = Arc::new(StubSearch::returning(Vec::new()));
    let looped = verification_loop(dir.path(), &reasoning, &search);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = looped
        .run("内容", &[], None, &cancel, &NoopSink)
        .await
        .expect_err("cancelled");

    assert!(matches!(err, VerificationError::Aborted));
    assert_eq!(reasoning.calls(), 0);
    assert_eq!(search.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn cancel_during_run_stops_before_next_search() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let reasoning = Arc::new(ScriptedReasoning::new([search_request("X")]));
    let search = Arc::new(StubSearch::returning(Vec::new()));
    let looped = verification_loop(dir.path(), &reasoning, &search);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    // Cancel as soon as the first search is announced
    let sink = FnSink(move |event: StatusEvent| {
        if matches!(event, StatusEvent::Searching { .. }) {
            trigger.cancel();
        }
    });

    let err = looped
        .run("内容", &[], None, &cancel, &sink)
        .await;
    // The search already announced runs; nothing after it does
    assert!(matches!(err, Err(VerificationError::Aborted)));
    assert_eq!(reasoning.calls(), 1);
    assert!(search.calls() <= 1);
    Ok(())
}

#[tokio::test]
async fn failed_search_is_fed_back_not_fatal() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let reasoning = Arc::new(ScriptedReasoning::new([search_request("X"), FINAL_REAL.to_string()]));
    let search = Arc::new(StubSearch::failing());
    let looped = verification_loop(dir.path(), &reasoning, &search);

    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    let sink = FnSink(move |event: StatusEvent| recorded.lock().push(event));

    let result = looped
        .run("内容", &[], None, &CancellationToken::new(), &sink)
        .await?;

    assert_eq!(result.verdict, Verdict::Real);
    assert!(result.search_results.is_empty());

    let events = events.lock();
    assert_eq!(events[0], StatusEvent::Analyzing);
    assert_eq!(
        events[1],
        StatusEvent::Searching {
            query: "X".to_string(),
            round: 1
        }
    );
    assert!(matches!(
        &events[2],
        StatusEvent::SearchFailed { query, round: 1, .. } if query == "X"
    ));
    assert_eq!(events[3], StatusEvent::DeepAnalysis { round: 2 });

    let seen = reasoning.seen.lock();
    assert!(text_of(&seen[1][3].content).contains("检索失败"));
    Ok(())
}

#[tokio::test]
async fn malformed_reply_is_a_parse_error() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let reasoning = Arc::new(ScriptedReasoning::new(["我认为这是真的"]));
    let search = Arc::new(StubSearch::returning(Vec::new()));
    let looped = verification_loop(dir.path(), &reasoning, &search);

    let err = looped
        .run("内容", &[], None, &CancellationToken::new(), &NoopSink)
        .await
        .expect_err("no JSON");
    assert!(matches!(err, VerificationError::Parse(_)));
    Ok(())
}

#[tokio::test]
async fn unready_service_is_a_config_error() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let mut stub = ScriptedReasoning::new([FINAL_REAL]);
    stub.ready = Err("missing key".to_string());
    let reasoning = Arc::new(stub);
    let search = Arc::new(StubSearch::returning(Vec::new()));
    let looped = verification_loop(dir.path(), &reasoning, &search);

    let err = looped
        .run("内容", &[], None, &CancellationToken::new(), &NoopSink)
        .await
        .expect_err("not ready");
    assert!(matches!(err, VerificationError::Config(_)));
    assert_eq!(reasoning.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn images_are_sent_unproxied_with_every_call() -> anyhow::Result<()> {
    let dir = common::create_test_dir()?;
    let reasoning = Arc::new(ScriptedReasoning::new([search_request("X"), FINAL_REAL.to_string()]));
    let search = Arc::new(StubSearch::returning(Vec::new()));
    let looped = verification_loop(dir.path(), &reasoning, &search);

    let images = vec![
        "/api/image-proxy?url=https%3A%2F%2Fimg.example.com%2Fa.jpg".to_string(),
        "https://img.example.com/loading.gif".to_string(),
    ];
    looped
        .run("", &images, Some("https://img.example.com/a.jpg"), &CancellationToken::new(), &NoopSink)
        .await?;

    let seen = reasoning.seen.lock();
    for history in seen.iter() {
        assert_eq!(history[1].image_urls(), vec!["https://img.example.com/a.jpg"]);
    }
    Ok(())
}
