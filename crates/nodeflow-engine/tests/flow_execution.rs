use std::sync::Arc;

use serde_json::json;

use nodeflow_core::config::ModelConfig;
use nodeflow_core::error::ErrorKind;
use nodeflow_core::graph::{FlowEdge, FlowNode, Graph};
use nodeflow_core::types::SessionId;
use nodeflow_engine::{FlowExecutor, RunOutcome};
use nodeflow_nodes::NodeRegistry;
use nodeflow_test_utils::{chat_graph, self_loop_graph, MockLlmClient, DEFAULT_MOCK_RESPONSE};

fn executor_with(llm: Arc<MockLlmClient>) -> FlowExecutor {
    FlowExecutor::new(Arc::new(NodeRegistry::with_builtins(llm)))
}

#[tokio::test]
async fn prompt_model_chain_answers_merhaba() {
    let llm = Arc::new(MockLlmClient::new());
    let executor = executor_with(llm.clone());

    let outcome = executor.run(&chat_graph(None), "merhaba", None).await;

    match &outcome {
        RunOutcome::Completed {
            result,
            execution_order,
            plan_cached,
            ..
        } => {
            assert_eq!(
                execution_order,
                &["promptTemplate_0", "chatOpenAI_0", "llmChain_0"]
            );
            assert!(!result.is_null());
            assert_eq!(result["response"], DEFAULT_MOCK_RESPONSE);
            assert_eq!(result["prompt_used"], "You are a helpful assistant. merhaba");
            assert!(!plan_cached);
        }
        RunOutcome::Failed { error, .. } => panic!("run failed: {}", error.message),
    }

    let request = &llm.requests()[0];
    assert_eq!(request.model_id, "gpt-3.5-turbo");
    assert_eq!(request.api_key.as_deref(), Some("sk-test"));
}

#[tokio::test]
async fn hello_template_reaches_model() {
    let llm = Arc::new(MockLlmClient::new());
    let executor = executor_with(llm.clone());
    let mut graph = chat_graph(None);
    graph.nodes[0] = FlowNode::new("promptTemplate_0", "promptTemplate")
        .with_input("template", json!("Hello {input}"));

    let outcome = executor.run(&graph, "merhaba", None).await;

    assert_eq!(
        outcome.execution_order(),
        ["promptTemplate_0", "chatOpenAI_0", "llmChain_0"]
    );
    let result = outcome.result().expect("run should complete");
    assert!(!result.is_null());
    assert_eq!(result["prompt_used"], "Hello merhaba");
    assert_eq!(llm.requests()[0].messages[0].content, "Hello merhaba");
}

#[tokio::test]
async fn configured_model_becomes_node_default() {
    let llm = Arc::new(MockLlmClient::new());
    let model = ModelConfig {
        model_id: "gpt-4o".into(),
        temperature: 0.2,
        max_tokens: Some(256),
        ..ModelConfig::default()
    };
    let executor = FlowExecutor::new(Arc::new(NodeRegistry::with_config(llm.clone(), &model)));
    let mut graph = chat_graph(None);
    graph.nodes[1] = FlowNode::new("chatOpenAI_0", "chatOpenAI");

    let outcome = executor.run(&graph, "merhaba", None).await;
    assert!(outcome.is_completed(), "{:?}", outcome.error());

    let request = &llm.requests()[0];
    assert_eq!(request.provider, "openai");
    assert_eq!(request.model_id, "gpt-4o");
    assert_eq!(request.max_tokens, Some(256));
    assert!((request.temperature - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn gemini_chat_node_tags_request() {
    let llm = Arc::new(MockLlmClient::new());
    let model = ModelConfig {
        provider: "gemini".into(),
        model_id: "gemini-1.5-pro".into(),
        ..ModelConfig::default()
    };
    let executor = FlowExecutor::new(Arc::new(NodeRegistry::with_config(llm.clone(), &model)));
    let graph = Graph::new("Gemini chat")
        .with_node(
            FlowNode::new("promptTemplate_0", "promptTemplate").with_input("template", json!("{input}")),
        )
        .with_node(
            FlowNode::new("chatGoogleGemini_0", "chatGoogleGemini")
                .with_input("googleApiKey", json!("g-test")),
        )
        .with_node(FlowNode::new("llmChain_0", "llmChain"))
        .with_edge(FlowEdge::new("e1", "promptTemplate_0", "promptTemplate", "llmChain_0", "prompt"))
        .with_edge(FlowEdge::new("e2", "chatGoogleGemini_0", "chatGoogleGemini", "llmChain_0", "model"));

    assert!(executor.validate(&graph).valid);
    let outcome = executor.run(&graph, "merhaba", None).await;
    assert!(outcome.is_completed(), "{:?}", outcome.error());

    let request = &llm.requests()[0];
    assert_eq!(request.provider, "gemini");
    assert_eq!(request.model_id, "gemini-1.5-pro");
    assert_eq!(request.api_key.as_deref(), Some("g-test"));
}

#[tokio::test]
async fn self_loop_fails_with_cycle() {
    let executor = executor_with(Arc::new(MockLlmClient::new()));
    let outcome = executor
        .run(&self_loop_graph(), "hi", Some(SessionId::from_str("corr-1")))
        .await;

    let error = outcome.error().expect("cycle must fail the run");
    assert_eq!(error.kind, ErrorKind::CycleDetected);
    assert!(error.message.contains("llmChain_0"));
    assert!(outcome.execution_order().is_empty());
    assert_eq!(outcome.correlation_id().as_str(), "corr-1");
}

#[tokio::test]
async fn rerun_with_same_id_reuses_plan() {
    let llm = Arc::new(MockLlmClient::new().with_response("same").with_response("same"));
    let executor = executor_with(llm);
    let graph = chat_graph(Some("wf_chat"));

    let first = executor.run(&graph, "merhaba", None).await;
    let second = executor.run(&graph, "merhaba", None).await;

    assert!(matches!(first, RunOutcome::Completed { plan_cached: false, .. }));
    assert!(matches!(second, RunOutcome::Completed { plan_cached: true, .. }));
    assert_eq!(first.result(), second.result());
    assert_eq!(first.execution_order(), second.execution_order());
    assert_eq!(executor.cached_plans().await, 1);
}

#[tokio::test]
async fn correlation_id_is_cache_key_fallback() {
    let executor = executor_with(Arc::new(MockLlmClient::new()));
    let graph = chat_graph(None);
    let id = SessionId::from_str("session_7");

    executor.run(&graph, "a", Some(id.clone())).await;
    let again = executor.run(&graph, "b", Some(id)).await;
    assert!(matches!(again, RunOutcome::Completed { plan_cached: true, .. }));

    // No graph id and no caller-supplied correlation id: nothing cached
    executor.clear_plans().await;
    executor.run(&graph, "c", None).await;
    assert_eq!(executor.cached_plans().await, 0);
}

#[tokio::test]
async fn invalidate_forces_recompile() {
    let executor = executor_with(Arc::new(MockLlmClient::new()));
    let graph = chat_graph(Some("wf"));

    executor.run(&graph, "a", None).await;
    assert!(executor.invalidate("wf").await);
    let outcome = executor.run(&graph, "b", None).await;
    assert!(matches!(outcome, RunOutcome::Completed { plan_cached: false, .. }));
}

#[tokio::test]
async fn disabled_cache_never_stores() {
    let executor = executor_with(Arc::new(MockLlmClient::new())).with_plan_cache(false);
    let graph = chat_graph(Some("wf"));

    executor.run(&graph, "a", None).await;
    let outcome = executor.run(&graph, "b", None).await;
    assert!(matches!(outcome, RunOutcome::Completed { plan_cached: false, .. }));
    assert_eq!(executor.cached_plans().await, 0);
}

#[tokio::test]
async fn static_values_flow_into_prompt() {
    let llm = Arc::new(MockLlmClient::new());
    let executor = executor_with(llm.clone());
    let mut graph = chat_graph(None);
    graph.nodes[0] = FlowNode::new("promptTemplate_0", "promptTemplate")
        .with_input("template", json!("Reply in {lang}: {input}"))
        .with_input("promptValues", json!({"lang": "Turkish"}));

    let outcome = executor.run(&graph, "good morning", None).await;
    assert!(outcome.is_completed());
    assert_eq!(llm.requests()[0].messages[0].content, "Reply in Turkish: good morning");
}

#[tokio::test]
async fn llm_failure_is_node_execution_failure() {
    let llm = Arc::new(MockLlmClient::new().with_error("HTTP 401: invalid api key"));
    let executor = executor_with(llm);

    let outcome = executor.run(&chat_graph(None), "merhaba", None).await;
    let error = outcome.error().unwrap();
    assert_eq!(error.kind, ErrorKind::NodeExecutionFailure);
    assert_eq!(error.node_id.as_deref(), Some("llmChain_0"));
    assert_eq!(
        outcome.execution_order(),
        ["promptTemplate_0", "chatOpenAI_0"]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_share_one_executor() {
    let executor = Arc::new(executor_with(Arc::new(MockLlmClient::new())));
    let graph = Arc::new(chat_graph(Some("wf_shared")));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let executor = executor.clone();
            let graph = graph.clone();
            tokio::spawn(async move {
                executor
                    .run(&graph, &format!("question {i}"), Some(SessionId::from_str(&format!("s{i}"))))
                    .await
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.execution_order().len(), 3);
    }
    assert_eq!(executor.cached_plans().await, 1);
}

#[tokio::test]
async fn dangling_edge_fails_as_invalid_graph() {
    let executor = executor_with(Arc::new(MockLlmClient::new()));
    let graph = Graph::new("dangling")
        .with_node(FlowNode::new("testHello_0", "testHello"))
        .with_edge(FlowEdge::new("e1", "testHello_0", "testHello", "ghost", "in"));

    let outcome = executor.run(&graph, "x", None).await;
    assert_eq!(outcome.error().unwrap().kind, ErrorKind::InvalidGraph);
}
