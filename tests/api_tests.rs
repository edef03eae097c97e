use std::sync::Arc;

use actix_web::{App, test, web};
use repico::backend::{GatewayOp, MockGateway};
use repico::gpio::PinController;
use repico::profiles::JsonProfileStore;
use repico::routes::AppState;
use serde_json::Value;
use tempfile::TempDir;

const SCOPE: &str = "/v2";

fn state() -> (Arc<MockGateway>, AppState<MockGateway>) {
    let gateway = Arc::new(MockGateway::default());
    let controller = Arc::new(PinController::new(gateway.clone()));
    (gateway, AppState::new(controller))
}

macro_rules! init_app {
    ($state:expr) => {{
        let state = $state;
        test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .service(state.api_scope(SCOPE)),
        )
        .await
    }};
}

#[actix_rt::test]
async fn list_is_empty_on_start() {
    let (_, state) = state();
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/v2/gpio").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);
}

#[actix_rt::test]
async fn export_then_list_sorted() {
    let (_, state) = state();
    let app = init_app!(state);

    for body in [
        r#"{"pin":17,"direction":"out"}"#,
        r#"{"pin":4,"direction":"in"}"#,
    ] {
        let req = test::TestRequest::post()
            .uri("/v2/gpio")
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    let req = test::TestRequest::get().uri("/v2/gpio").to_request();
    let pins: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(pins.len(), 2);
    assert_eq!(pins[0]["pin"], 4);
    assert_eq!(pins[0]["direction"], "in");
    assert_eq!(pins[1]["pin"], 17);
    assert_eq!(pins[1]["direction"], "out");
}

#[actix_rt::test]
async fn export_rejects_incomplete_or_bad_body() {
    let (gateway, state) = state();
    let app = init_app!(state);

    for body in [
        "",
        "not json",
        r#"{"pin":1}"#,
        r#"{"direction":"out"}"#,
        r#"{"pin":1,"direction":"sideways"}"#,
        r#"{"pin":-3,"direction":"out"}"#,
    ] {
        let req = test::TestRequest::post()
            .uri("/v2/gpio")
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400, "body {body:?}");
    }
    assert!(gateway.calls().is_empty());
}

#[actix_rt::test]
async fn double_export_is_client_error() {
    let (_, state) = state();
    let app = init_app!(state);

    let export = || {
        test::TestRequest::post()
            .uri("/v2/gpio")
            .set_payload(r#"{"pin":5,"direction":"out"}"#)
            .to_request()
    };
    let resp = test::call_service(&app, export()).await;
    assert!(resp.status().is_success());

    let resp = test::call_service(&app, export()).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "pin 5 already exported");
}

#[actix_rt::test]
async fn set_and_get_value_happy_path() {
    let (_, state) = state();
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/v2/gpio")
        .set_payload(r#"{"pin":3,"direction":"out"}"#)
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::patch()
        .uri("/v2/gpio/3")
        .set_payload(r#"{"value":1}"#)
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::get().uri("/v2/gpio/3").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["pin"], 3);
    assert_eq!(body["value"], 1);
}

#[actix_rt::test]
async fn reject_value_when_not_output() {
    let (_, state) = state();
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/v2/gpio")
        .set_payload(r#"{"pin":2,"direction":"in"}"#)
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::patch()
        .uri("/v2/gpio/2")
        .set_payload(r#"{"value":1}"#)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn invalid_value_and_missing_value() {
    let (_, state) = state();
    let app = init_app!(state);

    let req = test::TestRequest::patch()
        .uri("/v2/gpio/2")
        .set_payload(r#"{"value":2}"#)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::patch()
        .uri("/v2/gpio/2")
        .set_payload(r#"{"pin":2}"#)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_rt::test]
async fn unexported_pin_is_client_error() {
    let (_, state) = state();
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/v2/gpio/9").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::delete().uri("/v2/gpio/9").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);

    let req = test::TestRequest::get().uri("/v2/gpio/xyz").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_rt::test]
async fn delete_removes_pin() {
    let (gateway, state) = state();
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/v2/gpio")
        .set_payload(r#"{"pin":3,"direction":"out"}"#)
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::delete().uri("/v2/gpio/3").to_request();
    assert!(test::call_service(&app, req).await.status().is_success());
    assert!(!gateway.calls().is_empty());

    let req = test::TestRequest::get().uri("/v2/gpio").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
}

#[actix_rt::test]
async fn hardware_failure_is_server_error() {
    let (gateway, state) = state();
    let app = init_app!(state);
    gateway.fail(GatewayOp::Export, 8);

    let req = test::TestRequest::post()
        .uri("/v2/gpio")
        .set_payload(r#"{"pin":8,"direction":"out"}"#)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 500);

    let req = test::TestRequest::get().uri("/v2/gpio").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);
}

#[actix_rt::test]
async fn wrong_method_returns_405() {
    let (_, state) = state();
    let app = init_app!(state);

    let req = test::TestRequest::put().uri("/v2/gpio/1").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 405);

    let req = test::TestRequest::delete().uri("/v2/gpio").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 405);
}

#[actix_rt::test]
async fn status_shows_registry_and_hardware() {
    let (_, state) = state();
    let app = init_app!(state);

    let req = test::TestRequest::post()
        .uri("/v2/gpio")
        .set_payload(r#"{"pin":6,"direction":"in"}"#)
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::get().uri("/v2/gpio/6/status").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["registered"], "in");
    assert_eq!(body["hardware_exported"], true);
    assert_eq!(body["hardware_direction"], "in");
}

fn profile_state(dir: &TempDir) -> (Arc<PinController<MockGateway>>, AppState<MockGateway>) {
    let controller = Arc::new(PinController::new(Arc::new(MockGateway::default())));
    let store = Arc::new(JsonProfileStore::new(dir.path().join("profiles.json")));
    let state = AppState::new(controller.clone()).with_profiles(store);
    (controller, state)
}

#[actix_rt::test]
async fn profile_save_load_and_apply() {
    let dir = tempfile::tempdir().unwrap();
    let (controller, state) = profile_state(&dir);
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/v2/profiles/default").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);

    let profile = r#"{"name":"default","pins":[{"number":17,"alias":"led","direction":"out"},{"number":27,"direction":"in"}]}"#;
    let req = test::TestRequest::put()
        .uri("/v2/profiles/default")
        .set_payload(profile)
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::get().uri("/v2/profiles/default").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["pins"][0]["alias"], "led");

    let req = test::TestRequest::post()
        .uri("/v2/profiles/default/apply")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["exported"], 2);
    assert_eq!(controller.list_exported_pins().unwrap().len(), 2);
}

#[actix_rt::test]
async fn profile_name_must_match_path() {
    let dir = tempfile::tempdir().unwrap();
    let (_, state) = profile_state(&dir);
    let app = init_app!(state);

    let req = test::TestRequest::put()
        .uri("/v2/profiles/bench")
        .set_payload(r#"{"name":"default","pins":[{"number":1,"direction":"out"}]}"#)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_rt::test]
async fn profiles_without_store_fail() {
    let (_, state) = state();
    let app = init_app!(state);

    let req = test::TestRequest::get().uri("/v2/profiles/default").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 500);
}
