//! HTTP surface tests driven through the router without a socket.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use parley::{
    command::serve::router,
    internal::ai::{ChatService, RetrievalRegistry, SessionStore, retrieval::KeywordRetriever},
    utils::test::ScriptedCompletion,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "parley-test-boundary";

struct TestApp {
    tmp: TempDir,
    app: Router,
}

fn test_app(completion: ScriptedCompletion) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let chat = ChatService::new(
        Arc::new(SessionStore::new(tmp.path().join("chats"))),
        Arc::new(RetrievalRegistry::new(Arc::new(KeywordRetriever))),
        Arc::new(completion),
        tmp.path().join("archives"),
    );
    TestApp {
        app: router(Arc::new(chat)),
        tmp,
    }
}

async fn post_json(app: &Router, uri: &str, body: Value) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn post_multipart(app: &Router, uri: &str, body: Vec<u8>) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn text_part(name: &str, value: &str) -> Vec<u8> {
    format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
        .into_bytes()
}

fn file_part(name: &str, filename: &str, data: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    part.extend_from_slice(data);
    part.extend_from_slice(b"\r\n");
    part
}

fn multipart(parts: Vec<Vec<u8>>) -> Vec<u8> {
    let mut body: Vec<u8> = parts.concat();
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

async fn start(app: &Router) -> u64 {
    let response = post_json(
        app,
        "/chat/start",
        json!({
            "model": "m1",
            "prompt": [{"role": "system", "content": "p"}],
            "dialogue": []
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "SUCCESSFUL");
    body["id"].as_u64().unwrap()
}

#[tokio::test]
async fn test_start_and_generate() {
    let t = test_app(ScriptedCompletion::new().reply("yo"));
    let id = start(&t.app).await;

    let response = post_json(&t.app, "/chat/generate", json!({"id": id, "msg": "hi"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "SUCCESSFUL", "response": "yo"})
    );

    let saved: Value = serde_json::from_slice(
        &std::fs::read(t.tmp.path().join(format!("chats/{id}/context.json"))).unwrap(),
    )
    .unwrap();
    assert_eq!(
        saved["dialogue"],
        json!([
            {"role": "user", "content": "hi"},
            {"role": "assistant", "content": "yo"}
        ])
    );
}

#[tokio::test]
async fn test_start_without_prompt_uses_default() {
    let t = test_app(ScriptedCompletion::new());
    let response = post_json(&t.app, "/chat/start", json!({"model": "m1"})).await;
    let id = body_json(response).await["id"].as_u64().unwrap();

    let saved: Value = serde_json::from_slice(
        &std::fs::read(t.tmp.path().join(format!("chats/{id}/context.json"))).unwrap(),
    )
    .unwrap();
    assert_eq!(
        saved["prompt"],
        json!([{"role": "system", "content": "You are a helpful assistant."}])
    );
}

#[tokio::test]
async fn test_generate_failure_is_bad_request() {
    let t = test_app(ScriptedCompletion::new().fail("quota exceeded"));
    let id = start(&t.app).await;

    let response = post_json(&t.app, "/chat/generate", json!({"id": id, "msg": "hi"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.contains("quota exceeded"), "detail was {detail}");
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let t = test_app(ScriptedCompletion::new());
    for (uri, body) in [
        ("/chat/change-model", json!({"id": 77, "model": "m2"})),
        ("/chat/clear-context", json!({"id": 77})),
    ] {
        let response = post_json(&t.app, uri, body).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        assert!(body_json(response).await["detail"].is_string());
    }
    assert_eq!(get(&t.app, "/chat/end/77").await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_routes_answer_bad_request_for_any_failure() {
    let t = test_app(ScriptedCompletion::new());
    for uri in ["/chat/generate", "/chat/rag_generate"] {
        let response = post_json(&t.app, uri, json!({"id": 77, "msg": "hi"})).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let detail = body_json(response).await["detail"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(detail.contains("session 77 not found"), "{uri}: {detail}");
    }
}

#[tokio::test]
async fn test_delete_message_out_of_range() {
    let t = test_app(ScriptedCompletion::new().reply("yo"));
    let id = start(&t.app).await;
    post_json(&t.app, "/chat/generate", json!({"id": id, "msg": "hi"})).await;

    let response = post_json(
        &t.app,
        "/chat/delete-message",
        json!({"id": id, "message_index": 1}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(
        &t.app,
        "/chat/delete-message",
        json!({"id": id, "message_index": 0}),
    )
    .await;
    assert_eq!(body_json(response).await, json!({"status": "SUCCESSFUL"}));
}

#[tokio::test]
async fn test_end_downloads_archive_and_load_restores_it() {
    let t = test_app(ScriptedCompletion::always("ok"));
    let id = start(&t.app).await;
    post_json(&t.app, "/chat/generate", json!({"id": id, "msg": "hi"})).await;

    let response = get(&t.app, &format!("/chat/end/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"{id}.zip\"").as_str()
    );
    let archive = body_bytes(response).await;
    assert!(archive.starts_with(b"PK"));
    assert!(!t.tmp.path().join(format!("chats/{id}")).exists());

    // The id is gone once ended.
    let response = post_json(&t.app, "/chat/clear-context", json!({"id": id})).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = multipart(vec![file_part("chat_file", &format!("{id}.zip"), &archive)]);
    let response = post_multipart(&t.app, "/chat/load", body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let new_id = body_json(response).await["id"].as_u64().unwrap();
    assert_ne!(new_id, id);

    let saved: Value = serde_json::from_slice(
        &std::fs::read(t.tmp.path().join(format!("chats/{new_id}/context.json"))).unwrap(),
    )
    .unwrap();
    assert_eq!(saved["model"], "m1");
    assert_eq!(saved["dialogue"].as_array().unwrap().len(), 2);
    // The upload itself is not kept inside the session directory.
    assert!(
        !t.tmp
            .path()
            .join(format!("chats/{new_id}/{id}.zip"))
            .exists()
    );
}

#[tokio::test]
async fn test_load_rejects_garbage() {
    let t = test_app(ScriptedCompletion::new());
    let body = multipart(vec![file_part("chat_file", "x.zip", b"definitely not a zip")]);
    let response = post_multipart(&t.app, "/chat/load", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_add_rag_then_rag_generate() {
    let t = test_app(ScriptedCompletion::new().reply("A drill."));
    let id = start(&t.app).await;

    let body = multipart(vec![
        text_part("id", &id.to_string()),
        file_part(
            "doc_file",
            "memo.txt",
            b"The yellow wave is an evacuation drill.\n\nParking is on level two.",
        ),
    ]);
    let response = post_multipart(&t.app, "/chat/add_rag", body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        t.tmp
            .path()
            .join(format!("chats/{id}/chroma_db/index.json"))
            .exists()
    );

    let response = post_json(
        &t.app,
        "/chat/rag_generate",
        json!({"id": id, "msg": "What is the yellow wave?"}),
    )
    .await;
    assert_eq!(
        body_json(response).await,
        json!({"status": "SUCCESSFUL", "response": "A drill."})
    );

    let saved: Value = serde_json::from_slice(
        &std::fs::read(t.tmp.path().join(format!("chats/{id}/context.json"))).unwrap(),
    )
    .unwrap();
    let sent = saved["dialogue"][0]["content"].as_str().unwrap();
    assert!(sent.starts_with("Please, respond to this question:\nWhat is the yellow wave?"));
    assert!(sent.contains("evacuation drill"));
}

#[tokio::test]
async fn test_add_rag_without_document_reloads_index() {
    let t = test_app(ScriptedCompletion::new());
    let id = start(&t.app).await;

    let body = multipart(vec![text_part("id", &id.to_string())]);
    let response = post_multipart(&t.app, "/chat/add_rag", body).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = multipart(vec![file_part("doc_file", "memo.txt", b"text")]);
    let response = post_multipart(&t.app, "/chat/add_rag", body).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_rag_generate_without_index() {
    let t = test_app(ScriptedCompletion::new());
    let id = start(&t.app).await;
    let response = post_json(&t.app, "/chat/rag_generate", json!({"id": id, "msg": "q"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
