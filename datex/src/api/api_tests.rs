//! Comprehensive tests for the control API.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::{ApiState, Route, RouteTable};
    use crate::observability::LogRegistry;
    use crate::registry::StageRegistry;
    use crate::runner::{JobRunner, ServiceRunner};
    use crate::testing::{CollectingWriter, RecordSink, VecReader};

    fn service_with(sink: RecordSink) -> Arc<ServiceRunner> {
        let mut registry = StageRegistry::with_builtins();
        registry.register_reader("Vec", |o| Box::new(VecReader::from_config(o)));
        registry.register_writer("Collecting", move |o| {
            Box::new(CollectingWriter::from_config(o).with_sink(sink.clone()))
        });
        Arc::new(ServiceRunner::new(JobRunner::new(registry)))
    }

    fn state_with(service: Arc<ServiceRunner>) -> ApiState {
        ApiState::new(service, LogRegistry::new())
    }

    fn router_with(state: ApiState) -> Router {
        RouteTable::defaults().into_router(state)
    }

    fn copy_document(name: &str) -> Value {
        json!({
            "name": name,
            "reader": { "class": "Vec", "records": [ { "id": 1 }, { "id": 2 } ] },
            "writer": { "class": "Collecting" }
        })
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_req(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn wait_until_finished(service: &ServiceRunner, name: &str) {
        for _ in 0..200 {
            if !service.is_running(name) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job '{name}' did not finish in time");
    }

    #[tokio::test]
    async fn test_health_reports_up() {
        let router = router_with(state_with(service_with(RecordSink::new())));

        let (status, body) = call(&router, get_req("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "up");
        assert!(body["data"]["jobs"].is_array());
    }

    #[tokio::test]
    async fn test_start_command_runs_a_job() {
        let sink = RecordSink::new();
        let service = service_with(sink.clone());
        let router = router_with(state_with(Arc::clone(&service)));

        let (status, body) =
            call(&router, post_json("/api/cmd/start", &copy_document("copy"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["job"], "copy");

        wait_until_finished(&service, "copy").await;
        assert_eq!(sink.len(), 2);
        service.wait_idle().await;
    }

    #[tokio::test]
    async fn test_status_command_reports_jobs() {
        let service = service_with(RecordSink::new());
        let router = router_with(state_with(Arc::clone(&service)));

        call(&router, post_json("/api/cmd/start", &copy_document("copy"))).await;
        wait_until_finished(&service, "copy").await;

        let (status, body) = call(&router, post_req("/api/cmd/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["job"], "copy");

        let (status, body) = call(&router, post_req("/api/cmd/status/copy")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["state"], "closed");
        assert_eq!(body["data"]["frames_processed"], 2);

        service.wait_idle().await;
    }

    #[tokio::test]
    async fn test_start_without_body_is_rejected() {
        let router = router_with(state_with(service_with(RecordSink::new())));

        let (status, body) = call(&router, post_req("/api/cmd/start")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_start_rejects_a_malformed_document() {
        let router = router_with(state_with(service_with(RecordSink::new())));

        let document = json!({ "name": "bad", "writer": { "class": "Collecting" } });
        let (status, body) = call(&router, post_json("/api/cmd/start", &document)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("without a reader"));
    }

    #[tokio::test]
    async fn test_start_conflicts_with_a_running_job() {
        let service = service_with(RecordSink::new());
        let router = router_with(state_with(Arc::clone(&service)));

        // Fires once a year; the loop stays asleep for this test.
        let entry = json!({ "schedule": "0 0 0 1 1 *", "job": { "name": "sleeper" } });
        let (status, _) = call(&router, post_json("/api/cmd/start", &entry)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&router, post_json("/api/cmd/start", &entry)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");

        service.shutdown();
        service.wait_idle().await;
    }

    #[tokio::test]
    async fn test_stop_command_halts_a_scheduled_job() {
        let service = service_with(RecordSink::new());
        let router = router_with(state_with(Arc::clone(&service)));

        let entry = json!({ "schedule": "0 0 0 1 1 *", "job": { "name": "sleeper" } });
        call(&router, post_json("/api/cmd/start", &entry)).await;

        let (status, body) = call(&router, post_req("/api/cmd/stop/sleeper")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["error"], true);
        assert_eq!(body["data"]["message"], "stopped by operator");

        service.wait_idle().await;
    }

    #[tokio::test]
    async fn test_stop_unknown_job_is_not_found() {
        let router = router_with(state_with(service_with(RecordSink::new())));

        let (status, body) = call(&router, post_req("/api/cmd/stop/ghost")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_unknown_command_is_rejected() {
        let router = router_with(state_with(service_with(RecordSink::new())));

        let (status, body) = call(&router, post_req("/api/cmd/reboot")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("reboot"));
    }

    #[tokio::test]
    async fn test_shutdown_command_signals_and_refuses_new_jobs() {
        let service = service_with(RecordSink::new());
        let state = state_with(Arc::clone(&service));
        let router = RouteTable::defaults().into_router(state.clone());

        let (status, _) = call(&router, post_req("/api/cmd/shutdown")).await;
        assert_eq!(status, StatusCode::OK);
        tokio::time::timeout(Duration::from_millis(100), state.shutdown_requested())
            .await
            .expect("shutdown never signalled");

        let (status, body) =
            call(&router, post_json("/api/cmd/start", &copy_document("late"))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "conflict");
    }

    #[tokio::test]
    async fn test_log_tail_and_clear() {
        let service = service_with(RecordSink::new());
        let logs = LogRegistry::new();
        let buffer = logs.buffer("engine");
        buffer.push("pass 1 clean");
        buffer.push("pass 2 clean");
        buffer.push("pass 3 failed");
        let router = RouteTable::defaults().into_router(ApiState::new(service, logs.clone()));

        let (status, body) = call(&router, get_req("/api/log/engine/tail?lines=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], json!(["pass 2 clean", "pass 3 failed"]));

        let (_, body) = call(&router, get_req("/api/log/engine/tail?contains=failed")).await;
        assert_eq!(body["data"], json!(["pass 3 failed"]));

        let (status, _) = call(&router, post_req("/api/log/engine/clear")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(logs.get("engine").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_log_routes_reject_unknowns() {
        let service = service_with(RecordSink::new());
        let logs = LogRegistry::new();
        logs.buffer("engine");
        let router = RouteTable::defaults().into_router(ApiState::new(service, logs));

        let (status, _) = call(&router, get_req("/api/log/ghost/tail")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&router, get_req("/api/log/engine/rotate")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("rotate"));
    }

    #[test]
    fn test_defaults_cover_the_command_surface() {
        let table = RouteTable::defaults();
        let paths: Vec<&str> = table.routes().map(Route::path).collect();

        assert!(paths.contains(&"/api/cmd/:command"));
        assert!(paths.contains(&"/api/cmd/:command/:job"));
        assert!(paths.contains(&"/api/log/:logname/:action"));
        assert!(paths.contains(&"/api/health"));
        assert!(paths.contains(&"/"));
    }

    #[tokio::test]
    async fn test_lower_priority_number_wins_the_path() {
        let mut table = RouteTable::defaults();
        table.add_route("/api/health", 10, axum::routing::get(|| async { "custom" }));
        let router = table.into_router(state_with(service_with(RecordSink::new())));

        let response = router.oneshot(get_req("/api/health")).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"custom");
    }

    #[tokio::test]
    async fn test_removed_default_stops_serving() {
        let mut table = RouteTable::defaults();
        assert!(table.remove_route("/api/health"));
        assert!(!table.remove_route("/api/health"));
        let router = table.into_router(state_with(service_with(RecordSink::new())));

        let (status, body) = call(&router, get_req("/api/health")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_replaced_route_serves_the_new_handler() {
        let mut table = RouteTable::defaults();
        table.replace_route(
            "/api/health",
            50,
            axum::routing::get(|| async { "replaced" }),
        );
        let router = table.into_router(state_with(service_with(RecordSink::new())));

        let response = router.oneshot(get_req("/api/health")).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"replaced");
    }

    #[tokio::test]
    async fn test_content_dir_serves_static_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi from disk").unwrap();

        let mut table = RouteTable::defaults();
        table.set_content_dir(dir.path());
        let router = table.into_router(state_with(service_with(RecordSink::new())));

        let response = router.clone().oneshot(get_req("/hello.txt")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"hi from disk");

        // API routes still win over content.
        let (status, _) = call(&router, get_req("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
