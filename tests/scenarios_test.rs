//! End-to-end request scenarios through the coordinator with mock workers

mod support;

use std::sync::Arc;

use support::{Harness, Workers, COORDINATES};
use windplan::error::ErrorKind;
use windplan::llm::{MockLLMClient, MockResponse};
use windplan::pipeline::{ExecutionState, InboundRequest, PipelineFailure, StageOrigin};
use windplan::router::{AbortReason, RouteStrategy};
use windplan::session::{Location, SessionPatch};
use windplan::tools::{MockOutcome, ToolName};

#[tokio::test]
async fn test_terrain_request_on_empty_session() {
    let harness = Harness::new();

    let response = harness
        .coordinator
        .handle(InboundRequest::new(
            "s1",
            format!("Analyze terrain at {}", COORDINATES),
        ))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.state, ExecutionState::Completed);
    assert_eq!(response.strategy, Some(RouteStrategy::Deterministic));
    assert_eq!(response.artifacts.len(), 1);
    assert_eq!(harness.workers.terrain.call_count(), 1);
    assert_eq!(harness.workers.total_calls(), 1);

    let request = &harness.workers.terrain.requests()[0];
    assert_eq!(request.params.coordinates(), (35.067482, -101.395466));

    let session = harness.store.get("s1").await.unwrap();
    assert_eq!(
        session.stage_results.get(&ToolName::Terrain),
        Some(&response.artifacts)
    );
    let location = session.last_location.unwrap();
    assert_eq!((location.lat, location.lon), (35.067482, -101.395466));
}

#[tokio::test]
async fn test_layout_without_coordinates_asks_for_them() {
    let harness = Harness::new();

    let response = harness
        .coordinator
        .handle(InboundRequest::new("fresh", "Optimize layout"))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.state, ExecutionState::Rejected);
    assert!(response.artifacts.is_empty());
    assert!(response.trace.is_empty());
    match &response.failure {
        Some(PipelineFailure::Rejected { code, .. }) => assert_eq!(code, "missing_parameter"),
        other => panic!("unexpected failure: {:?}", other),
    }
    assert!(response.message.contains("latitude, longitude"));
    assert_eq!(harness.workers.total_calls(), 0);
}

#[tokio::test]
async fn test_layout_retries_exhausted_after_terrain() {
    let workers = Workers::new();
    workers.layout.add_outcomes(vec![
        MockOutcome::transient("layout worker returned 503"),
        MockOutcome::transient("layout worker returned 503"),
        MockOutcome::transient("layout worker returned 503"),
    ]);
    let harness = Harness::with_workers(workers);

    let response = harness
        .coordinator
        .handle(InboundRequest::new(
            "s1",
            format!("Analyze terrain and optimize layout at {}", COORDINATES),
        ))
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.state, ExecutionState::Failed(1));
    match &response.failure {
        Some(PipelineFailure::PipelineStageFailed {
            stage,
            cause,
            attempts,
            ..
        }) => {
            assert_eq!(*stage, ToolName::Layout);
            assert_eq!(*attempts, 3);
            assert_eq!(cause.kind, ErrorKind::TransientInfrastructure);
            assert_eq!(cause.message, "layout worker returned 503");
        }
        other => panic!("unexpected failure: {:?}", other),
    }

    assert_eq!(response.artifacts.len(), 1);
    assert_eq!(response.artifacts[0].artifact_type, "terrain");
    assert_eq!(harness.workers.layout.call_count(), 3);

    let correlation_id = response.correlation_id().unwrap().to_string();
    assert!(response.message.contains("temporarily unavailable"));
    assert!(response.message.contains(&correlation_id));
    assert!(!response.message.contains("503"));

    let layout_trace = &response.trace[1];
    assert_eq!(layout_trace.attempts.len(), 3);
    assert!(layout_trace
        .attempts
        .iter()
        .all(|a| a.error().map(|e| e.message.as_str()) == Some("layout worker returned 503")));

    let session = harness.store.get("s1").await.unwrap();
    assert!(session.latest_artifact(ToolName::Terrain).is_some());
    assert!(session.latest_artifact(ToolName::Layout).is_none());
}

#[tokio::test]
async fn test_looping_agent_falls_back_once_and_continues() {
    let k = 3;
    let llm = Arc::new(MockLLMClient::new());
    for i in 0..k {
        llm.add_response(MockResponse::tool_call(MockLLMClient::optimize_layout_call(
            format!("call_{}", i),
            35.0,
            -101.0,
            Some(40.0 + i as f64),
        )));
    }
    let workers = Workers::new();
    for _ in 0..k {
        workers
            .layout
            .add_outcome(MockOutcome::terminal("capacity exceeds parcel limits"));
    }
    let harness = Harness::with_agent(workers, llm.clone(), k);
    harness
        .store
        .upsert(
            "s1",
            SessionPatch::new().with_location(Location::new(35.0, -101.0)),
        )
        .await
        .unwrap();

    let response = harness
        .coordinator
        .handle(InboundRequest::new("s1", "Optimize layout"))
        .await
        .unwrap();

    assert_eq!(llm.call_count(), k as usize);
    assert_eq!(llm.remaining_responses(), 0);
    assert_eq!(response.strategy, Some(RouteStrategy::DeterministicFallback));
    assert!(response.success);
    assert_eq!(response.state, ExecutionState::Completed);
    assert_eq!(harness.workers.layout.call_count(), k as usize + 1);

    let plan_stages: Vec<_> = response
        .trace
        .iter()
        .filter(|t| t.origin == StageOrigin::Plan)
        .collect();
    assert_eq!(plan_stages.len(), 1);
    assert!(plan_stages[0].succeeded());
    assert!(!response.message.contains("Tool invocation failed"));
    assert!(!response.message.contains("capacity exceeds"));

    let record = harness.traces.last().unwrap();
    assert_eq!(record.agent_abort, Some(AbortReason::BudgetExhausted { attempts: k }));
    assert_eq!(record.agent_attempts.len(), k as usize);
}

#[tokio::test]
async fn test_looping_agent_with_failing_fallback_gives_one_error() {
    let k = 2;
    let llm = Arc::new(MockLLMClient::new());
    for i in 0..k {
        llm.add_response(MockResponse::tool_call(MockLLMClient::optimize_layout_call(
            format!("call_{}", i),
            35.0,
            -101.0,
            Some(60.0 + i as f64),
        )));
    }
    let workers = Workers::new();
    for _ in 0..k {
        workers
            .layout
            .add_outcome(MockOutcome::terminal("capacity exceeds parcel limits"));
    }
    let harness = Harness::with_agent(workers, llm.clone(), k);

    let response = harness
        .coordinator
        .handle(InboundRequest::new("s1", "Optimize layout"))
        .await
        .unwrap();

    assert_eq!(llm.call_count(), k as usize);
    assert!(!response.success);
    assert_eq!(response.state, ExecutionState::Rejected);
    match &response.failure {
        Some(PipelineFailure::Rejected { code, message }) => {
            assert_eq!(code, "missing_parameter");
            assert_eq!(message, &response.message);
        }
        other => panic!("unexpected failure: {:?}", other),
    }
    assert_eq!(response.message.matches("Please provide").count(), 1);
    assert!(!response.message.contains("Tool invocation failed"));
    assert!(!response.message.contains("capacity exceeds"));
}

#[tokio::test]
async fn test_follow_up_reuses_session_context() {
    let harness = Harness::new();

    let first = harness
        .coordinator
        .handle(InboundRequest::new(
            "s1",
            format!("Analyze terrain at {}", COORDINATES),
        ))
        .await
        .unwrap();
    assert!(first.success);

    let second = harness
        .coordinator
        .handle(InboundRequest::new("s1", "now optimize the layout for 50 MW"))
        .await
        .unwrap();

    assert!(second.success);
    let layout_request = &harness.workers.layout.requests()[0];
    assert_eq!(layout_request.params.coordinates(), (35.067482, -101.395466));
    let body = serde_json::to_value(&layout_request.params).unwrap();
    assert_eq!(body["params"]["terrain"]["locationRef"], first.artifacts[0].location_ref);
}

#[tokio::test]
async fn test_full_analysis_runs_every_stage_in_order() {
    let harness = Harness::new();

    let response = harness
        .coordinator
        .handle(InboundRequest::new(
            "s1",
            format!("Run a full analysis at {}", COORDINATES),
        ))
        .await
        .unwrap();

    assert!(response.success, "{}", response.message);
    assert_eq!(response.completed_stages(), ToolName::ALL.to_vec());
    assert_eq!(response.artifacts.len(), 4);
    for tool in ToolName::ALL {
        assert_eq!(harness.workers.get(tool).call_count(), 1);
    }

    let session = harness.store.get("s1").await.unwrap();
    assert_eq!(session.stage_results.len(), 4);
}

#[tokio::test]
async fn test_results_for_another_site_are_not_reused() {
    let harness = Harness::new();

    let layout = harness
        .coordinator
        .handle(InboundRequest::new("s1", "Optimize layout at 35.0, -101.0"))
        .await
        .unwrap();
    assert!(layout.success);

    let elsewhere = harness
        .coordinator
        .handle(InboundRequest::new(
            "s1",
            "Run the wake simulation at 48.0, 11.0",
        ))
        .await
        .unwrap();
    assert!(!elsewhere.success);
    assert_eq!(elsewhere.state, ExecutionState::Rejected);
    match &elsewhere.failure {
        Some(PipelineFailure::Rejected { code, .. }) => assert_eq!(code, "missing_parameter"),
        other => panic!("unexpected failure: {:?}", other),
    }
    assert_eq!(harness.workers.simulation.call_count(), 0);

    let same_site = harness
        .coordinator
        .handle(InboundRequest::new(
            "s1",
            "Run the wake simulation at 35.0, -101.0",
        ))
        .await
        .unwrap();
    assert!(same_site.success, "{}", same_site.message);
    let body = serde_json::to_value(&harness.workers.simulation.requests()[0].params).unwrap();
    assert_eq!(body["params"]["layout"]["locationRef"], layout.artifacts[0].location_ref);
}
