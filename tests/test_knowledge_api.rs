//! Knowledge ingestion over HTTP, the assistant endpoint and health.

mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use campus_desk::store::Role;
use common::{Part, app, pdf};

const HANDBOOK: &str = "Dormitory quiet hours run from ten at night until seven in the morning.";

#[tokio::test]
async fn test_upload_list_delete() {
    let app = app().build();
    let admin = app.user("Admin", "admin@campus.edu", Role::Admin);
    let token = app.token(&admin);
    let bytes = pdf(&[HANDBOOK, "Laboratory safety goggles must be worn at all times."]);

    let r = app
        .multipart(
            "/api/knowledge",
            Some(&token),
            &[Part::File { name: "file", file_name: "handbook.pdf", content_type: "application/pdf", bytes: &bytes }],
        )
        .await;
    assert_eq!(r.status, StatusCode::CREATED, "{:?}", r.body);
    assert_eq!(r.message(), "Document uploaded and indexed successfully.");
    let doc = &r.data()["doc"];
    assert_eq!(doc["originalName"], "handbook.pdf");
    let ids: Vec<String> = doc["pineconeIds"].as_array().unwrap().iter().map(|v| v.as_str().unwrap().into()).collect();
    assert_eq!(doc["chunkCount"], ids.len());
    assert!(!ids.is_empty());
    assert_eq!(app.index.len(), ids.len());
    let doc_id = doc["id"].as_str().unwrap().to_string();

    let r = app.get("/api/knowledge", Some(&token)).await;
    assert_eq!(r.data()["documents"].as_array().unwrap().len(), 1);

    let r = app.delete(&format!("/api/knowledge/{doc_id}"), Some(&token)).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.message(), "Document deleted successfully.");
    assert!(app.index.is_empty());
    assert!(app.db.list_knowledge_docs().unwrap().is_empty());
    assert_eq!(app.delete(&format!("/api/knowledge/{doc_id}"), Some(&token)).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_rejections() {
    let app = app().build();
    let admin = app.user("Admin", "admin@campus.edu", Role::Admin);
    let token = app.token(&admin);

    let r = app.multipart("/api/knowledge", Some(&token), &[]).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.message(), "No PDF file uploaded.");

    let r = app
        .multipart(
            "/api/knowledge",
            Some(&token),
            &[Part::File { name: "file", file_name: "notes.txt", content_type: "text/plain", bytes: b"hello" }],
        )
        .await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.message(), "Only PDF files are allowed for knowledge base.");

    let blank = pdf(&[""]);
    let r = app
        .multipart(
            "/api/knowledge",
            Some(&token),
            &[Part::File { name: "file", file_name: "scan.pdf", content_type: "application/pdf", bytes: &blank }],
        )
        .await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert!(r.message().starts_with("Could not extract any text"));
    assert!(app.db.list_knowledge_docs().unwrap().is_empty());
    assert!(app.index.is_empty());

    let student = app.user("Ada", "ada@campus.edu", Role::Student);
    assert_eq!(app.get("/api/knowledge", Some(&app.token(&student))).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_index_outage_is_503_and_keeps_row_on_delete() {
    let app = app().build();
    let admin = app.user("Admin", "admin@campus.edu", Role::Admin);
    let token = app.token(&admin);
    let bytes = pdf(&[HANDBOOK]);
    let file = [Part::File { name: "file", file_name: "handbook.pdf", content_type: "application/pdf", bytes: &bytes }];

    let r = app.multipart("/api/knowledge", Some(&token), &file).await;
    assert_eq!(r.status, StatusCode::CREATED);
    let doc_id = r.data()["doc"]["id"].as_str().unwrap().to_string();

    app.index.set_offline(true);
    let r = app.delete(&format!("/api/knowledge/{doc_id}"), Some(&token)).await;
    assert_eq!(r.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(r.body["success"], false);
    assert_eq!(app.db.list_knowledge_docs().unwrap().len(), 1);

    let r = app.multipart("/api/knowledge", Some(&token), &file).await;
    assert_eq!(r.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.db.list_knowledge_docs().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unconfigured_knowledge_base() {
    let app = app().unconfigured().build();
    let admin = app.user("Admin", "admin@campus.edu", Role::Admin);
    let bytes = pdf(&[HANDBOOK]);
    let r = app
        .multipart(
            "/api/knowledge",
            Some(&app.token(&admin)),
            &[Part::File { name: "file", file_name: "handbook.pdf", content_type: "application/pdf", bytes: &bytes }],
        )
        .await;
    assert_eq!(r.status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_chatbot_grounded_reply_and_category() {
    let app = app()
        .llm_script(&["**Quiet hours** are 22:00 to 07:00.", "Dormitory Issues"])
        .build();
    let ada = app.user("Ada", "ada@campus.edu", Role::Student);

    let r = app
        .json(Method::POST, "/api/chatbot", Some(&app.token(&ada)), json!({"message": "When are quiet hours?"}))
        .await;
    assert_eq!(r.status, StatusCode::OK, "{:?}", r.body);
    assert_eq!(r.data()["reply"], "**Quiet hours** are 22:00 to 07:00.");
    assert_eq!(r.data()["suggestedCategory"], "Dormitory Issues");

    let r = app.json(Method::POST, "/api/chatbot", Some(&app.token(&ada)), json!({"message": ""})).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
    assert_eq!(r.message(), "Message is required");

    let long = "x".repeat(1001);
    let r = app.json(Method::POST, "/api/chatbot", Some(&app.token(&ada)), json!({"message": long})).await;
    assert_eq!(r.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chatbot_falls_back_when_unconfigured_or_failing() {
    let app = app().unconfigured().build();
    let ada = app.user("Ada", "ada@campus.edu", Role::Student);
    let r = app.json(Method::POST, "/api/chatbot", Some(&app.token(&ada)), json!({"message": "Hello?"})).await;
    assert_eq!(r.status, StatusCode::OK);
    assert!(r.data()["reply"].as_str().unwrap().contains("Campus Desk"));
    assert!(r.data()["suggestedCategory"].is_null());

    let app = common::app().build();
    let ada = app.user("Ada", "ada@campus.edu", Role::Student);
    app.index.set_offline(true);
    let r = app.json(Method::POST, "/api/chatbot", Some(&app.token(&ada)), json!({"message": "Hello?"})).await;
    assert_eq!(r.status, StatusCode::OK);
    assert!(r.data()["reply"].as_str().unwrap().contains("encountered an error"));
}

#[tokio::test]
async fn test_health_reports_capabilities() {
    let app = app().build();
    let r = app.get("/api/health", None).await;
    assert_eq!(r.status, StatusCode::OK);
    assert_eq!(r.message(), "Campus Desk API is running");
    assert_eq!(r.data()["rag"], json!({"embedding": "dummy", "vectorIndex": "memory", "generation": "dummy"}));
    assert!(r.data()["timestamp"].is_string());
}
