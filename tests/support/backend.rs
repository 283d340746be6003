//! Mock backend building blocks: scripted status responses and search bodies.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

/// Serves `steps` in order, then repeats the last one.
pub struct ScriptedResponder {
    steps: Vec<ResponseTemplate>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedResponder {
    pub fn new(steps: Vec<ResponseTemplate>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                steps,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl Respond for ScriptedResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = n.min(self.steps.len().saturating_sub(1));
        self.steps[index].clone()
    }
}

/// A `GET /api/status/{task_id}` snapshot.
pub fn status(state: &str, progress: f64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": state,
        "progress": progress,
        "message": format!("{state} {progress}%"),
        "failed_urls": []
    }))
}

/// Mounts `POST /api/download/{category}` answering with `task_id`.
pub async fn mount_submit(server: &MockServer, category: &str, task_id: &str) {
    Mock::given(method("POST"))
        .and(path(format!("/api/download/{category}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": task_id,
            "message": "Download task started"
        })))
        .mount(server)
        .await;
}

/// Mounts scripted status snapshots for `task_id`; returns the call counter.
pub async fn mount_status_script(
    server: &MockServer,
    task_id: &str,
    steps: Vec<ResponseTemplate>,
) -> Arc<AtomicUsize> {
    let (responder, calls) = ScriptedResponder::new(steps);
    Mock::given(method("GET"))
        .and(path(format!("/api/status/{task_id}")))
        .respond_with(responder)
        .mount(server)
        .await;
    calls
}

/// One search result record payload.
pub fn result_record(title: &str) -> Value {
    json!({
        "title": title,
        "url": format!("https://www.youtube.com/watch?v={title}"),
        "thumbnail": format!("https://i.ytimg.com/vi/{title}/hqdefault.jpg"),
        "duration": "3:30",
        "video_id": title
    })
}

/// Streamed search body: one `data: ` record per payload, blank line after each.
pub fn search_body(records: &[Value]) -> String {
    records
        .iter()
        .map(|record| format!("data: {record}\n\n"))
        .collect()
}
