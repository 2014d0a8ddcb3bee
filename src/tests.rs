//! Integration tests for the Royal Academy backend.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::{Config, SyncSettings};
use crate::{create_router, AppState};

const PSK: &str = "test-api-key";

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some(PSK.to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let config = Config {
            api_psk: psk.clone(),
            db_path: temp_dir.path().join("test.sqlite"),
            cache_path: None,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            sync: SyncSettings {
                viewer_poll_interval: Duration::from_millis(50),
                dashboard_poll_interval: Duration::from_millis(100),
                ..SyncSettings::default()
            },
        };

        let state = AppState::build(config).await.expect("Failed to build state");
        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn put(&self, key: &str, value: Value) -> Value {
        let resp = self
            .client
            .put(self.url(&format!("/api/documents/{}", key)))
            .json(&value)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> (u16, Value) {
        let resp = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, path: &str, query: &[(&str, &str)], body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.url(path))
            .query(query)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

const STUDENT_10A: [(&str, &str); 4] = [
    ("role", "student"),
    ("id", "s1"),
    ("class", "10"),
    ("section", "A"),
];

const STUDENT_10B: [(&str, &str); 4] = [
    ("role", "student"),
    ("id", "s2"),
    ("class", "10"),
    ("section", "B"),
];

fn notification(id: &str, audience: Value) -> Value {
    let mut record = json!({
        "id": id,
        "senderId": "p1",
        "senderName": "Principal",
        "title": "Notice",
        "message": "Please read",
        "status": "unread",
        "createdAt": "2026-03-01T09:00:00Z"
    });
    if let (Some(record), Value::Object(audience)) = (record.as_object_mut(), audience) {
        record.extend(audience);
    }
    record
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_rejects_missing_and_wrong_keys() {
    let fixture = TestFixture::new().await;
    let anonymous = Client::new();

    let resp = anonymous
        .get(fixture.url("/api/revision"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = anonymous
        .get(fixture.url("/api/revision"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = anonymous
        .get(fixture.url("/api/revision"))
        .bearer_auth(PSK)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Health stays public.
    let resp = anonymous.get(fixture.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_auth_disabled_without_psk() {
    let fixture = TestFixture::with_psk(None).await;

    let (status, body) = fixture.get("/api/revision", &[]).await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn test_document_crud_and_revision() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture.get("/api/revision", &[]).await;
    let initial = body["data"]["revisionId"].as_i64().unwrap();

    let written = fixture.put("greeting", json!({"text": "hello"})).await;
    assert_eq!(written["success"], true);
    assert_eq!(written["data"]["changed"], true);
    let after_write = written["revisionId"].as_i64().unwrap();
    assert!(after_write > initial);

    // An identical write is a no-op.
    let again = fixture.put("greeting", json!({"text": "hello"})).await;
    assert_eq!(again["data"]["changed"], false);
    assert_eq!(again["revisionId"].as_i64().unwrap(), after_write);

    let (status, body) = fixture.get("/api/documents/greeting", &[]).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["key"], "greeting");
    assert_eq!(body["data"]["value"]["text"], "hello");

    let (_, body) = fixture.get("/api/documents", &[]).await;
    let keys: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["key"].as_str())
        .collect();
    assert_eq!(keys, vec!["greeting"]);

    let resp = fixture
        .client
        .delete(fixture.url("/api/documents/greeting"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["revisionId"].as_i64().unwrap() > after_write);

    let (status, body) = fixture.get("/api/documents/greeting", &[]).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let resp = fixture
        .client
        .delete(fixture.url("/api/documents/greeting"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_document_events_stream_changes() {
    let fixture = TestFixture::new().await;

    let mut events = fixture
        .client
        .get(fixture.url("/api/documents/roster/events"))
        .send()
        .await
        .unwrap();
    assert_eq!(events.status(), 200);

    fixture.put("other", json!(1)).await;
    fixture.put("roster", json!(["amy"])).await;

    let received = tokio::time::timeout(Duration::from_secs(5), async {
        let mut buffer = String::new();
        while let Some(chunk) = events.chunk().await.unwrap() {
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            if buffer.contains("amy") {
                break;
            }
        }
        buffer
    })
    .await
    .unwrap();

    assert!(received.contains("event: change"));
    assert!(received.contains("\"key\":\"roster\""));
    assert!(!received.contains("\"key\":\"other\""));
}

#[tokio::test]
async fn test_dashboard_is_scoped_per_viewer() {
    let fixture = TestFixture::new().await;

    fixture
        .put(
            "royal-academy-notifications",
            json!([
                notification("n-all", json!({"recipientType": "whole_school"})),
                notification(
                    "n-10b",
                    json!({"recipientType": "section", "recipientClass": "10", "recipientSection": "B"})
                ),
                notification("n-teachers", json!({"recipientType": "all_teachers"})),
                notification("n-bogus", json!({"recipientType": "everyone"})),
            ]),
        )
        .await;
    fixture
        .put(
            "royal-academy-fee-records",
            json!([
                {"id": "f1", "studentId": "s1", "class": "10", "section": "A", "month": "January", "amount": 500, "status": "pending"},
                {"id": "f2", "studentId": "s2", "class": "10", "section": "B", "month": "January", "amount": 500, "status": "pending"}
            ]),
        )
        .await;

    let (status, body) = fixture.get("/api/dashboard", &STUDENT_10A).await;
    assert_eq!(status, 200);
    let data = &body["data"];
    let ids: Vec<&str> = data["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["n-all"]);
    assert_eq!(data["unreadNotifications"], 1);
    assert_eq!(data["feeRecords"].as_array().unwrap().len(), 1);
    assert_eq!(data["feeRecords"][0]["id"], "f1");

    let (_, body) = fixture.get("/api/dashboard", &[("role", "teacher"), ("id", "t1")]).await;
    let ids: Vec<&str> = body["data"]["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|n| n["id"].as_str())
        .collect();
    assert_eq!(ids, vec!["n-all", "n-teachers"]);
    assert!(body["data"]["feeRecords"].as_array().unwrap().is_empty());

    let (_, body) = fixture.get("/api/dashboard", &[("role", "principal")]).await;
    assert_eq!(body["data"]["notifications"].as_array().unwrap().len(), 4);
    assert_eq!(body["data"]["feeRecords"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_live_session_lifecycle() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post(
            "/api/live/t1/setup",
            &[],
            json!({
                "teacherName": "Ms. Rao",
                "draft": {"title": "Algebra", "class": "10", "section": "A"}
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["phase"], "setup");

    // Camera refused: stays in setup, nothing published.
    let (status, body) = fixture
        .post(
            "/api/live/t1/start",
            &[],
            json!({"streamType": "camera", "grants": {"camera": false, "microphone": true}}),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "MEDIA_PERMISSION_DENIED");
    assert_eq!(body["error"]["details"]["device"], "camera");

    let (_, body) = fixture.get("/api/live/t1", &[]).await;
    assert_eq!(body["data"]["phase"], "setup");
    let (_, body) = fixture.get("/api/live/sessions", &[("role", "principal")]).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = fixture
        .post(
            "/api/live/t1/start",
            &[],
            json!({"streamType": "camera", "grants": {"camera": true, "microphone": true}}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["phase"], "live");
    let session_id = body["data"]["session"]["id"].as_str().unwrap().to_string();
    assert!(session_id.starts_with("t1-"));

    let (_, body) = fixture.get("/api/live/sessions", &STUDENT_10A).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["title"], "Algebra");
    let (_, body) = fixture.get("/api/live/sessions", &STUDENT_10B).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = fixture
        .post("/api/live/t1/media", &[], json!({"action": "toggle_camera"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["stream"]["video"]["enabled"], false);

    let (status, body) = fixture
        .post(
            "/api/live/t1/media",
            &[],
            json!({"action": "switch_stream", "streamType": "screen", "grants": {"screen": false}}),
        )
        .await;
    assert_eq!(status, 403);
    assert_eq!(body["error"]["code"], "MEDIA_PERMISSION_DENIED");

    let (status, body) = fixture
        .post(
            "/api/live/t1/media",
            &[],
            json!({"action": "switch_stream", "streamType": "screen", "grants": {"screen": true}}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["session"]["streamType"], "screen");

    let (status, body) = fixture.post("/api/live/t1/stop", &[], json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["phase"], "idle");

    let (_, body) = fixture.get("/api/live/sessions", &STUDENT_10A).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = fixture.post("/api/live/t1/stop", &[], json!({})).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "INVALID_STATE");
}

#[tokio::test]
async fn test_live_start_requires_title_and_setup() {
    let fixture = TestFixture::new().await;

    let (status, body) = fixture
        .post(
            "/api/live/t2/start",
            &[],
            json!({"streamType": "camera", "grants": {"camera": true}}),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "INVALID_STATE");

    fixture
        .post("/api/live/t2/setup", &[], json!({"teacherName": "Mr. Das"}))
        .await;
    let (status, body) = fixture
        .post(
            "/api/live/t2/start",
            &[],
            json!({"streamType": "camera", "grants": {"camera": true}}),
        )
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = fixture
        .post("/api/live/t2/setup", &[], json!({"teacherName": "Mr. Das", "cancel": true}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["phase"], "idle");

    let (status, _) = fixture.get("/api/live/nobody", &[]).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_presence_heartbeat_counts_viewers() {
    let fixture = TestFixture::new().await;

    let (_, body) = fixture.get("/api/presence/t1-100", &[]).await;
    assert_eq!(body["data"]["activeViewers"], 0);

    let (status, body) = fixture
        .post(
            "/api/presence/t1-100/heartbeat",
            &[],
            json!({"studentId": "s1", "studentName": "Asha"}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["sessionId"], "t1-100");
    assert_eq!(body["data"]["activeViewers"], 1);

    // A repeated beat updates the same entry.
    fixture
        .post(
            "/api/presence/t1-100/heartbeat",
            &[],
            json!({"studentId": "s1", "studentName": "Asha"}),
        )
        .await;
    let (_, body) = fixture
        .post(
            "/api/presence/t1-100/heartbeat",
            &[],
            json!({"studentId": "s2", "studentName": "Ravi"}),
        )
        .await;
    assert_eq!(body["data"]["activeViewers"], 2);

    let (_, body) = fixture.get("/api/documents/viewers:t1-100", &[]).await;
    assert_eq!(body["data"]["value"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_live_viewer_count_reaches_console() {
    let fixture = TestFixture::new().await;

    fixture
        .post(
            "/api/live/t3/setup",
            &[],
            json!({"teacherName": "Ms. Iyer", "draft": {"title": "Physics", "class": "9", "section": "C"}}),
        )
        .await;
    let (_, body) = fixture
        .post(
            "/api/live/t3/start",
            &[],
            json!({"streamType": "camera", "grants": {"camera": true}}),
        )
        .await;
    let session_id = body["data"]["session"]["id"].as_str().unwrap().to_string();

    fixture
        .post(
            &format!("/api/presence/{}/heartbeat", session_id),
            &[],
            json!({"studentId": "s9", "studentName": "Meera"}),
        )
        .await;

    let count = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, body) = fixture.get("/api/live/t3", &[]).await;
            if body["data"]["activeViewers"] == 1 {
                return 1;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(count, 1);

    fixture.post("/api/live/t3/stop", &[], json!({})).await;
    let (status, _) = fixture
        .get(&format!("/api/documents/viewers:{}", session_id), &[])
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_mark_notification_read() {
    let fixture = TestFixture::new().await;
    fixture
        .put(
            "royal-academy-notifications",
            json!([
                notification("n1", json!({"recipientType": "all_students"})),
                notification("n2", json!({"recipientType": "all_teachers"})),
            ]),
        )
        .await;

    let (status, body) = fixture
        .post("/api/notifications/n1/read", &STUDENT_10A, json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "read");

    let (status, _) = fixture
        .post("/api/notifications/n2/read", &STUDENT_10A, json!({}))
        .await;
    assert_eq!(status, 404);

    let (_, body) = fixture.get("/api/dashboard", &STUDENT_10A).await;
    assert_eq!(body["data"]["unreadNotifications"], 0);
}

#[tokio::test]
async fn test_fee_payment_flow() {
    let fixture = TestFixture::new().await;
    fixture
        .put(
            "royal-academy-fee-records",
            json!([
                {"id": "f1", "studentId": "s1", "studentName": "Asha", "class": "10", "section": "A", "month": "January", "amount": 500, "status": "pending"},
                {"id": "f2", "studentId": "s1", "studentName": "Asha", "class": "10", "section": "A", "month": "February", "amount": 500, "status": "pending"},
                {"id": "f3", "studentId": "s2", "studentName": "Ravi", "class": "10", "section": "B", "month": "January", "amount": 500, "status": "pending"}
            ]),
        )
        .await;

    let (status, body) = fixture
        .post("/api/fees/f1/pay", &STUDENT_10A, json!({"method": "card"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["status"], "paid");
    assert_eq!(body["data"]["amount"], 500);
    assert!(body["data"]["paymentDate"].is_string());

    let (_, body) = fixture.get("/api/documents/royal-academy-fee-records", &[]).await;
    assert_eq!(body["data"]["value"][0]["status"], "paid");
    assert!(body["data"]["value"][0]["paymentDate"].is_string());

    let (status, body) = fixture
        .post("/api/fees/f1/pay", &STUDENT_10A, json!({"method": "card"}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["details"]["recordId"], "f1");

    let (status, _) = fixture
        .post("/api/fees/f3/pay", &STUDENT_10A, json!({}))
        .await;
    assert_eq!(status, 404);

    fixture
        .put(
            "royal-academy-payment-requests",
            json!([{
                "id": "r1", "studentId": "s1", "studentName": "Asha", "class": "10", "section": "A",
                "months": ["February"], "amount": 500, "status": "pending",
                "createdAt": "2026-02-01T00:00:00Z"
            }]),
        )
        .await;
    let (status, body) = fixture
        .post("/api/payment-requests/r1/pay", &STUDENT_10A, json!({"method": "upi"}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["data"]["request"]["status"], "paid");
    assert_eq!(body["data"]["fees"][0]["id"], "f2");
}
