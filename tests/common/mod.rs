//! Shared fixture for the router-level tests: an in-memory database, the
//! dummy capabilities, a memory mailer, and the two notification workers.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use campus_desk::auth::password::hash_password;
use campus_desk::config::{Config, RateLimitConfig};
use campus_desk::embed::{DummyEmbedder, Embedder};
use campus_desk::http::{AppState, Capabilities, build_router};
use campus_desk::llm::LlmProvider;
use campus_desk::llm::providers::dummy::DummyProvider;
use campus_desk::notify::EventBus;
use campus_desk::notify::mailer::{EmailWorker, Mailer, MemoryMailer, OutgoingEmail};
use campus_desk::notify::realtime::{Frame, Hub, RealtimeFanout};
use campus_desk::runtime::{Component, ServiceHandle, spawn_components};
use campus_desk::store::{Category, Database, NewUser, Role, User, UserUpdate};
use campus_desk::vector::VectorIndex;
use campus_desk::vector::memory::MemoryIndex;

pub const BOUNDARY: &str = "campus-desk-test-boundary";

pub struct TestApp {
    pub tmp: TempDir,
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub state: AppState,
    pub router: Router,
    pub hub: Arc<Hub>,
    pub mail: MemoryMailer,
    pub index: MemoryIndex,
    pub shutdown: CancellationToken,
    workers: Option<ServiceHandle>,
}

pub struct Builder {
    llm: LlmProvider,
    configured: bool,
    tune: Option<Box<dyn FnOnce(&mut Config)>>,
}

pub fn app() -> Builder {
    Builder { llm: LlmProvider::Dummy(DummyProvider::default()), configured: true, tune: None }
}

impl Builder {
    pub fn llm_script(mut self, replies: &[&str]) -> Self {
        self.llm = LlmProvider::Dummy(DummyProvider::scripted(replies.iter().copied()));
        self
    }

    /// No embedder, index or generation backend.
    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn tune(mut self, f: impl FnOnce(&mut Config) + 'static) -> Self {
        self.tune = Some(Box::new(f));
        self
    }

    pub fn build(self) -> TestApp {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::test_default(tmp.path());
        let roomy = RateLimitConfig { max_requests: 1000, window_seconds: 60 };
        config.auth.auth_limit = roomy;
        config.auth.submit_limit = roomy;
        if let Some(tune) = self.tune {
            tune(&mut config);
        }
        let config = Arc::new(config);

        let db = Arc::new(Database::open_in_memory().unwrap());
        let index = MemoryIndex::default();
        let caps = if self.configured {
            Capabilities {
                embedder: Embedder::Dummy(DummyEmbedder { dimensions: config.embedding.dimensions }),
                index: VectorIndex::Memory(index.clone()),
                llm: self.llm,
            }
        } else {
            Capabilities {
                embedder: Embedder::Unconfigured,
                index: VectorIndex::Unconfigured,
                llm: LlmProvider::Unconfigured,
            }
        };

        let shutdown = CancellationToken::new();
        let bus = EventBus::new();
        let hub = Arc::new(Hub::new());
        let mail = MemoryMailer::default();
        let state =
            AppState::new(config.clone(), db.clone(), bus.clone(), hub.clone(), caps, shutdown.clone()).unwrap();
        let router = build_router(state.clone()).unwrap();

        let workers: Vec<Box<dyn Component>> = vec![
            Box::new(RealtimeFanout::new(hub.clone(), &bus)),
            Box::new(EmailWorker::new(Mailer::Memory(mail.clone()), config.app_name.clone(), &bus)),
        ];
        let handle = spawn_components(workers, shutdown.clone());

        TestApp { tmp, config, db, state, router, hub, mail, index, shutdown, workers: Some(handle) }
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.workers.take();
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> Reply {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
        Reply { status, headers, body }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Reply {
        self.send(request(Method::GET, uri, token).body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> Reply {
        self.send(request(Method::DELETE, uri, token).body(Body::empty()).unwrap()).await
    }

    pub async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Value) -> Reply {
        let req = request(method, uri, token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    pub async fn multipart(&self, uri: &str, token: Option<&str>, parts: &[Part<'_>]) -> Reply {
        let req = request(Method::POST, uri, token)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(req).await
    }

    pub fn user(&self, name: &str, email: &str, role: Role) -> User {
        self.db
            .create_user(NewUser {
                name: name.into(),
                email: email.into(),
                password_hash: Some(password_hash()),
                role,
                google_id: None,
            })
            .unwrap()
    }

    /// Category plus a staff member bound to it.
    pub fn category_with_staff(&self, name: &str, staff_email: &str) -> (Category, User) {
        let category = self.db.create_category(name, "").unwrap();
        let staff = self.user(&format!("{name} Staff"), staff_email, Role::CategoryStaff);
        let staff = self
            .db
            .update_user(
                &staff.id,
                UserUpdate { assigned_category: Some(Some(category.id.clone())), ..Default::default() },
            )
            .unwrap();
        (self.db.category(&category.id).unwrap(), staff)
    }

    pub fn token(&self, user: &User) -> String {
        self.state.auth.keys().issue_access(user).unwrap()
    }

    /// Wait for the email worker to deliver `n` messages.
    pub async fn wait_for_mail(&self, n: usize) -> Vec<OutgoingEmail> {
        for _ in 0..200 {
            let sent = self.mail.sent();
            if sent.len() >= n {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.mail.sent()
    }
}

/// Hash of `secret123`, computed once per test binary.
fn password_hash() -> String {
    static HASH: OnceLock<String> = OnceLock::new();
    HASH.get_or_init(|| hash_password("secret123").unwrap()).clone()
}

fn request(method: Method, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(t) => builder.header(header::AUTHORIZATION, format!("Bearer {t}")),
        None => builder,
    }
}

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File { name: &'a str, file_name: &'a str, content_type: &'a str, bytes: &'a [u8] },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
                body.extend_from_slice(value.as_bytes());
            }
            Part::File { name, file_name, content_type, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Next `complaintUpdated` frame on a hub subscription, parsed.
pub async fn next_frame(rx: &mut broadcast::Receiver<Frame>) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no frame within 2s")
        .unwrap();
    serde_json::from_str(&frame).unwrap()
}

/// A PDF with one text line per page.
pub fn pdf(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![50.into(), 700.into()]),
        ];
        if !text.is_empty() {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*text)]));
        }
        operations.push(Operation::new("ET", vec![]));
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}
