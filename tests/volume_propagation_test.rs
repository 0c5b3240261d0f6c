use axum::http::StatusCode;
use placenet::api::{self, AppState};
use placenet::config::{CommissionPlan, Config};
use placenet::db::init_db;
use placenet::orchestration::NetworkService;
use placenet::Repository;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    _temp: TempDir,
}

fn test_config() -> Config {
    Config {
        port: 0,
        database_path: ":memory:".to_string(),
        commission_plan: CommissionPlan::default(),
        snapshot_max_depth: 6,
        team_batch_size: 500,
    }
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pools = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pools));
    let service = Arc::new(NetworkService::new(repo, test_config()));
    let app = api::create_router(AppState::new(service));
    TestApp {
        app,
        _temp: temp_dir,
    }
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post(app: axum::Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let req = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(body.to_string()))
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

/// root with a on its left, b on its right, c under a's left.
async fn seed_network(app: &axum::Router) {
    for body in [
        serde_json::json!({"memberId": "root"}),
        serde_json::json!({"memberId": "a", "sponsorId": "root", "position": "left"}),
        serde_json::json!({"memberId": "b", "sponsorId": "root", "position": "right"}),
        serde_json::json!({"memberId": "c", "sponsorId": "a", "position": "left"}),
    ] {
        let (status, _) = post(app.clone(), "/v1/members", body).await;
        assert_eq!(status, StatusCode::OK);
    }
}

fn volumes(node: &serde_json::Value) -> (String, String, String, String) {
    (
        node["ownVolume"].as_str().unwrap().to_string(),
        node["leftVolume"].as_str().unwrap().to_string(),
        node["rightVolume"].as_str().unwrap().to_string(),
        node["totalVolume"].as_str().unwrap().to_string(),
    )
}

#[tokio::test]
async fn test_one_order_credits_the_whole_ancestor_path() {
    let test_app = setup_test_app().await;
    seed_network(&test_app.app).await;

    let (status, receipt) = post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "c", "orderAmount": "100", "commissionableValue": "100"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["order"]["status"], "completed");
    assert_eq!(receipt["order"]["memberId"], "c");

    // Deltas come back root first: root.left, a.left, then c's own counter.
    let applied = receipt["applied"].as_array().unwrap();
    assert_eq!(applied.len(), 3);
    assert_eq!(applied[0]["bucket"], "left");
    assert_eq!(applied[1]["bucket"], "left");
    assert_eq!(applied[2]["bucket"], "own");
    assert!(applied.iter().all(|u| u["delta"] == "100"));

    let (_, snapshot) = get(test_app.app.clone(), "/v1/network/snapshot").await;
    let root = &snapshot;
    let a = &snapshot["left"];
    let b = &snapshot["right"];
    let c = &a["left"];

    assert_eq!(volumes(c), ("100".into(), "0".into(), "0".into(), "100".into()));
    assert_eq!(volumes(a), ("0".into(), "100".into(), "0".into(), "100".into()));
    assert_eq!(volumes(root), ("0".into(), "100".into(), "0".into(), "100".into()));
    assert_eq!(volumes(b), ("0".into(), "0".into(), "0".into(), "0".into()));

    let (_, size) = get(test_app.app.clone(), "/v1/team/size?member=root").await;
    assert_eq!(size["teamSize"], 3);
}

#[tokio::test]
async fn test_orders_on_both_sides_split_the_root_counters() {
    let test_app = setup_test_app().await;
    seed_network(&test_app.app).await;

    post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "c", "orderAmount": "100", "commissionableValue": "100"}),
    )
    .await;
    post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "b", "orderAmount": "40", "commissionableValue": "40"}),
    )
    .await;
    post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "a", "orderAmount": "2.5", "commissionableValue": "0"}),
    )
    .await;

    let (_, snapshot) = get(test_app.app.clone(), "/v1/network/snapshot").await;
    assert_eq!(
        volumes(&snapshot),
        ("0".into(), "102.5".into(), "40".into(), "142.5".into())
    );
    assert_eq!(
        volumes(&snapshot["left"]),
        ("2.5".into(), "100".into(), "0".into(), "102.5".into())
    );
    assert_eq!(
        volumes(&snapshot["right"]),
        ("40".into(), "0".into(), "0".into(), "40".into())
    );
}

#[tokio::test]
async fn test_reversal_subtracts_exactly_and_only_once() {
    let test_app = setup_test_app().await;
    seed_network(&test_app.app).await;

    let (_, receipt) = post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "c", "orderAmount": "100", "commissionableValue": "100"}),
    )
    .await;
    let order_id = receipt["order"]["orderId"].as_str().unwrap().to_string();

    let (status, reversed) = post(
        test_app.app.clone(),
        &format!("/v1/orders/{}/reverse", order_id),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reversed["order"]["status"], "reversed");
    let applied = reversed["applied"].as_array().unwrap();
    assert!(applied.iter().all(|u| u["delta"] == "-100"));

    let (_, snapshot) = get(test_app.app.clone(), "/v1/network/snapshot").await;
    assert_eq!(
        volumes(&snapshot),
        ("0".into(), "0".into(), "0".into(), "0".into())
    );

    // A second reversal conflicts and changes nothing.
    let (status, body) = post(
        test_app.app.clone(),
        &format!("/v1/orders/{}/reverse", order_id),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = post(
        test_app.app.clone(),
        "/v1/orders/not-a-real-order/reverse",
        serde_json::json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_zero_amount_order_is_recorded_without_deltas() {
    let test_app = setup_test_app().await;
    seed_network(&test_app.app).await;

    let (status, receipt) = post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "c", "orderAmount": "0", "commissionableValue": "0"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(receipt["applied"].as_array().unwrap().is_empty());

    let (_, orders) = get(test_app.app.clone(), "/v1/orders?member=c").await;
    assert_eq!(orders["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_order_validation() {
    let test_app = setup_test_app().await;
    seed_network(&test_app.app).await;

    let (status, _) = post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "c", "orderAmount": "-5", "commissionableValue": "0"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "ghost", "orderAmount": "5", "commissionableValue": "5"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_feed_is_newest_first() {
    let test_app = setup_test_app().await;
    seed_network(&test_app.app).await;

    for amount in ["1", "2", "3"] {
        post(
            test_app.app.clone(),
            "/v1/orders",
            serde_json::json!({
                "memberId": "c", "orderAmount": amount, "commissionableValue": amount
            }),
        )
        .await;
    }

    let (status, body) = get(test_app.app.clone(), "/v1/orders?member=c&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let orders = body["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    // Same-millisecond orders fall back to id order; amounts stay a set.
    let amounts: Vec<&str> = orders
        .iter()
        .map(|o| o["orderAmount"].as_str().unwrap())
        .collect();
    assert!(amounts.iter().all(|a| ["1", "2", "3"].contains(a)));

    let (_, all) = get(test_app.app.clone(), "/v1/orders").await;
    assert_eq!(all["orders"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_volume_leaderboard_ranks_by_total() {
    let test_app = setup_test_app().await;
    seed_network(&test_app.app).await;

    post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "c", "orderAmount": "100", "commissionableValue": "100"}),
    )
    .await;
    post(
        test_app.app.clone(),
        "/v1/orders",
        serde_json::json!({"memberId": "b", "orderAmount": "40", "commissionableValue": "40"}),
    )
    .await;

    let (status, body) = get(test_app.app.clone(), "/v1/leaderboard?metric=volume&limit=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metric"], "volume");
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    // root aggregates 140; a and c carry 100 each, a is the older node.
    assert_eq!(entries[0]["memberId"], "root");
    assert_eq!(entries[0]["value"], "140");
    assert_eq!(entries[0]["rank"], 1);
    assert_eq!(entries[1]["memberId"], "a");
    assert_eq!(entries[2]["memberId"], "c");

    let (status, _) = get(test_app.app.clone(), "/v1/leaderboard?metric=nonsense").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
