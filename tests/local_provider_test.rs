use httpmock::prelude::*;
use rust_doc_qa::config::DeviceType;
use rust_doc_qa::providers::local::{InstructEmbeddings, LocalModelProvider, DOCUMENT_INSTRUCTION, QUERY_INSTRUCTION};
use rust_doc_qa::providers::{load_model, CompletionProvider, EmbeddingProvider};
use serde_json::{json, Map};

#[tokio::test]
async fn test_completion_posts_prompt_without_streaming() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/generate")
                .json_body_partial(r#"{"model": "orca-mini", "prompt": "Why prime a pump?", "stream": false}"#);
            then.status(200)
                .json_body(json!({ "model": "orca-mini", "response": "  To remove air.  ", "done": true }));
        })
        .await;

    let llm = LocalModelProvider::new(&server.base_url(), "orca-mini", Map::new()).unwrap();
    let answer = llm.complete("Why prime a pump?").await.unwrap();

    mock.assert_async().await;
    assert_eq!(answer, "To remove air.");
    assert_eq!(llm.get_model_info().await.unwrap(), "orca-mini");
}

#[tokio::test]
async fn test_completion_surfaces_server_errors() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200).json_body(json!({ "error": "model 'missing' not found" }));
        })
        .await;

    let llm = LocalModelProvider::new(&server.base_url(), "missing", Map::new()).unwrap();
    let err = llm.complete("hello").await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_completion_rejects_failed_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(503).body("loading model");
        })
        .await;

    let llm = LocalModelProvider::new(&server.base_url(), "orca-mini", Map::new()).unwrap();
    let err = llm.complete("hello").await.unwrap_err();
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("loading model"));
}

#[tokio::test]
async fn test_document_embeddings_carry_instruction() {
    let server = MockServer::start_async().await;
    let expected_input = format!("{}pumps move water", DOCUMENT_INSTRUCTION);
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/embed")
                .json_body_partial(json!({ "model": "hkunlp/instructor-large", "input": [expected_input] }).to_string());
            then.status(200).json_body(json!({ "embeddings": [[0.25, 0.5, 0.75]] }));
        })
        .await;

    let embedder = InstructEmbeddings::new(&server.base_url(), "hkunlp/instructor-large", DeviceType::Cpu).unwrap();
    let vectors = embedder
        .embed_documents(&["pumps move water".to_string()])
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(vectors, vec![vec![0.25, 0.5, 0.75]]);
    assert_eq!(embedder.model_name(), "hkunlp/instructor-large");
}

#[tokio::test]
async fn test_query_embedding_uses_query_instruction() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/embed")
                .body_contains(QUERY_INSTRUCTION);
            then.status(200).json_body(json!({ "embeddings": [[1.0, 0.0]] }));
        })
        .await;

    let embedder = InstructEmbeddings::new(&server.base_url(), "hkunlp/instructor-large", DeviceType::Cpu).unwrap();
    let vector = embedder.embed_query("what moves water?").await.unwrap();

    mock.assert_async().await;
    assert_eq!(vector, vec![1.0, 0.0]);
}

#[tokio::test]
async fn test_embedding_count_must_match_inputs() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/embed");
            then.status(200).json_body(json!({ "embeddings": [[1.0], [2.0]] }));
        })
        .await;

    let embedder = InstructEmbeddings::new(&server.base_url(), "hkunlp/instructor-large", DeviceType::Cpu).unwrap();
    let result = embedder.embed_documents(&["only one".to_string()]).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_loaded_ggml_model_sends_context_options() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/generate").json_body_partial(
                r#"{"model": "TheBloke/Llama-2-7B-Chat-GGML", "options": {"num_ctx": 2048, "num_predict": 2048, "num_batch": 2048}}"#,
            );
            then.status(200).json_body(json!({ "response": "ok" }));
        })
        .await;

    let llm = load_model(
        &server.base_url(),
        DeviceType::Cuda,
        "TheBloke/Llama-2-7B-Chat-GGML",
        2048,
        Some("llama-2-7b-chat.ggmlv3.q4_0.bin"),
    )
    .unwrap();
    assert_eq!(llm.complete("ping").await.unwrap(), "ok");
    mock.assert_async().await;
}
