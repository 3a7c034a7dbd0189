// End-to-end command scenarios against the in-memory sleep family

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::{json, Value};
use strawberry_server::commands;

fn error_message(body: &Value) -> &str {
    assert_eq!(body["status"], "error", "expected an error envelope, got {}", body);
    body["message"].as_str().unwrap()
}

#[tokio::test]
async fn test_create_exists_remove() {
    let app = build(&sleep_config(true));

    let (status, body) = command(&app, "create", json!({"alias": "foo"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "result": null}));

    let (_, body) = command(&app, "exists", json!({"alias": "foo"})).await;
    assert_eq!(body["result"], true);

    let (status, _) = command(&app, "remove", json!({"alias": "foo"})).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = command(&app, "exists", json!({"alias": "foo"})).await;
    assert_eq!(body["result"], false);
}

#[tokio::test]
async fn test_create_twice_is_conflict() {
    let app = build(&sleep_config(true));
    command(&app, "create", json!({"alias": "foo"})).await;
    let (status, body) = command(&app, "create", json!({"a": "foo"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(error_message(&body).contains("already exists"));
}

#[tokio::test]
async fn test_bad_option_key_is_rejected() {
    let app = build(&sleep_config(true));
    command(&app, "create", json!({"alias": "foo"})).await;

    let (status, body) = command(
        &app,
        "set_option",
        json!({"alias": "foo", "key": "bad name", "value": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("\"key\""));

    let (_, body) = command(&app, "get_speclet", json!({"alias": "foo"})).await;
    assert_eq!(body["result"], json!({}));
}

#[tokio::test]
async fn test_list_projects_requested_attributes() {
    let app = build(&sleep_config(true));
    for alias in ["foo", "bar"] {
        command(&app, "create", json!({"alias": alias})).await;
    }

    let (status, body) = command(&app, "list", json!({"attributes": ["owner"]})).await;
    assert_eq!(status, StatusCode::OK);
    let items = body["result"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    for item in items {
        let attributes = item["$attributes"].as_object().unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes["owner"], "anonymous");
    }
    assert_eq!(items[0]["$value"], "bar");
    assert_eq!(items[1]["$value"], "foo");

    let (_, body) = command(&app, "list", json!({})).await;
    assert_eq!(body["result"], json!(["bar", "foo"]));
}

#[tokio::test]
async fn test_get_option_on_missing_alias() {
    let app = build(&sleep_config(true));
    let (status, body) = command(&app, "get_option", json!({"alias": "missing", "key": "x"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(error_message(&body).contains("missing"));

    // The server keeps serving after a backend failure.
    let (status, _) = command(&app, "create", json!({"alias": "missing"})).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_option_lifecycle() {
    let app = build(&sleep_config(true));
    command(&app, "create", json!({"alias": "foo"})).await;

    command(&app, "set_option", json!({"alias": "foo", "key": "pool", "value": "prod"})).await;
    let (_, body) = command(&app, "get_option", json!({"alias": "foo", "key": "pool"})).await;
    assert_eq!(body["result"], "prod");

    let (status, _) = command(
        &app,
        "set_options",
        json!({"alias": "foo", "options": {"sleep_duration": 30, "active": false}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    command(&app, "remove_option", json!({"alias": "foo", "key": "pool"})).await;
    let (_, body) = command(&app, "get_speclet", json!({"alias": "foo"})).await;
    assert_eq!(body["result"], json!({"sleep_duration": 30, "active": false}));

    let (status, _) = command(
        &app,
        "set_speclet",
        json!({"alias": "foo", "speclet": {"pool": "adhoc"}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = command(&app, "get_speclet", json!({"alias": "foo"})).await;
    assert_eq!(body["result"], json!({"pool": "adhoc"}));
}

#[tokio::test]
async fn test_reserved_option_key_in_speclet() {
    let app = build(&sleep_config(true));
    command(&app, "create", json!({"alias": "foo"})).await;
    let (status, body) = command(
        &app,
        "set_speclet",
        json!({"alias": "foo", "speclet": {"family": "chyt"}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("speclet"));
}

#[tokio::test]
async fn test_start_returns_status_and_stop() {
    let app = build(&sleep_config(true));
    command(&app, "create", json!({"alias": "foo"})).await;

    let (status, body) = command(&app, "start", json!({"alias": "foo"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["state"], "active");
    assert_eq!(body["result"]["started_by"], "robot-strawberry");

    let (status, _) = command(&app, "stop", json!({"alias": "foo"})).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = command(&app, "status", json!({"alias": "foo"})).await;
    assert_eq!(body["result"]["state"], "inactive");
}

#[tokio::test]
async fn test_describe_options() {
    let app = build(&sleep_config(true));
    command(&app, "create", json!({"alias": "foo"})).await;
    let (status, body) = command(&app, "describe_options", json!({"alias": "foo"})).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["result"][0]["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["active", "pool", "restart_on_speclet_change", "sleep_duration"]);
}

fn valid_value(param: &str) -> Value {
    match param {
        "alias" => json!("foo"),
        "key" => json!("pool"),
        "value" => json!(1),
        "speclet" | "options" => json!({}),
        other => panic!("no sample value for {}", other),
    }
}

#[tokio::test]
async fn test_every_required_parameter_is_named_when_missing() {
    let app = build(&sleep_config(true));
    for descriptor in commands::registry() {
        let required: Vec<&str> = descriptor
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        for omitted in &required {
            let params: serde_json::Map<String, Value> = required
                .iter()
                .filter(|name| *name != omitted)
                .map(|name| (name.to_string(), valid_value(name)))
                .collect();
            let (status, body) = command(&app, descriptor.name, Value::Object(params)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{} without {}", descriptor.name, omitted);
            let message = error_message(&body);
            assert!(
                message.contains(&format!("missing required parameter {:?}", omitted)),
                "{}: {}",
                descriptor.name,
                message
            );
        }
    }
}

#[tokio::test]
async fn test_unknown_and_duplicate_parameters() {
    let app = build(&sleep_config(true));
    let (status, body) = command(&app, "create", json!({"alias": "foo", "bogus": 1})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("bogus"));

    let (status, body) = command(&app, "create", json!({"alias": "foo", "a": "bar"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("more than once"));
}

#[tokio::test]
async fn test_invalid_attribute_element_reports_position() {
    let app = build(&sleep_config(true));
    let (status, body) = command(&app, "list", json!({"attributes": ["owner", {"x": 1}]})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(error_message(&body).contains("element #1"));
}
