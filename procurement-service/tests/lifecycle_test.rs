//! Version lifecycle: status transitions, cloning for re-edit, rollback.

mod common;

use common::{TestApp, OWNER_IIN};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

fn dec(v: &serde_json::Value) -> Decimal {
    Decimal::from_str(v.as_str().expect("expected decimal string")).unwrap()
}

#[tokio::test]
async fn full_approval_flow() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let response = app.set_status(&token, plan_id, "pre_approved").await;
    assert_eq!(response.status(), 200);
    let version: serde_json::Value = response.json().await.unwrap();
    assert_eq!(version["status"], "pre_approved");
    assert_eq!(version["is_active"], true);

    let response = app.set_status(&token, plan_id, "approved").await;
    assert_eq!(response.status(), 200);
    let version: serde_json::Value = response.json().await.unwrap();
    assert_eq!(version["status"], "approved");
    assert_eq!(version["version_number"], 1);

    app.cleanup().await;
}

#[tokio::test]
async fn skipping_a_stage_rejected() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let response = app.set_status(&token, plan_id, "approved").await;
    assert_eq!(response.status(), 409);

    // Nothing changed
    let detail = app.get_plan(&token, plan_id).await;
    assert_eq!(detail["active_version"]["status"], "draft");

    app.cleanup().await;
}

#[tokio::test]
async fn backward_transition_rejected() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    app.set_status(&token, plan_id, "pre_approved").await;
    app.set_status(&token, plan_id, "approved").await;

    for target in ["pre_approved", "draft"] {
        let response = app.set_status(&token, plan_id, target).await;
        assert_eq!(response.status(), 409, "approved -> {} must fail", target);
    }

    app.cleanup().await;
}

#[tokio::test]
async fn requesting_current_status_is_a_noop() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();
    let version_id = plan["versions"][0]["version_id"].as_str().unwrap();

    let response = app.set_status(&token, plan_id, "draft").await;
    assert_eq!(response.status(), 200);
    let version: serde_json::Value = response.json().await.unwrap();
    assert_eq!(version["version_id"], version_id);
    assert_eq!(version["status"], "draft");

    app.cleanup().await;
}

#[tokio::test]
async fn clone_requires_a_reviewed_active_version() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let response = app.clone_version(&token, plan_id).await;
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn clone_copies_live_items_into_new_draft() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();
    let v1_id = plan["versions"][0]["version_id"].as_str().unwrap();

    let first: serde_json::Value = app
        .add_item(&token, plan_id, json!({ "quantity": "2", "unit_price": "500.00" }))
        .await
        .json()
        .await
        .unwrap();
    let second: serde_json::Value = app
        .add_item(&token, plan_id, json!({ "quantity": "1", "unit_price": "1000.00" }))
        .await
        .json()
        .await
        .unwrap();

    // One item soft-deleted before submission; it must not travel
    app.client
        .delete(app.api(&format!("/items/{}", second["item_id"].as_str().unwrap())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    app.set_status(&token, plan_id, "pre_approved").await;

    let response = app.clone_version(&token, plan_id).await;
    assert_eq!(response.status(), 201);
    let clone: serde_json::Value = response.json().await.unwrap();
    assert_eq!(clone["version_number"], 2);
    assert_eq!(clone["status"], "draft");
    assert_eq!(clone["is_active"], true);
    assert_eq!(dec(&clone["total_amount"]), Decimal::from_str("1000").unwrap());

    // The new draft is what the plan now shows
    let detail = app.get_plan(&token, plan_id).await;
    let active = &detail["active_version"];
    assert_eq!(active["version_number"], 2);
    let items = active["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["item_number"], first["item_number"]);
    assert_ne!(items[0]["item_id"], first["item_id"]);

    // The old version is immutable history with its items intact
    let response = app
        .client
        .get(app.api(&format!("/plans/{}/versions/{}", plan_id, v1_id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let old: serde_json::Value = response.json().await.unwrap();
    assert_eq!(old["status"], "pre_approved");
    assert_eq!(old["is_active"], false);
    assert_eq!(old["items"].as_array().unwrap().len(), 1);

    app.cleanup().await;
}

#[tokio::test]
async fn cloned_draft_is_editable_independently() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    app.add_item(&token, plan_id, json!({ "quantity": "1", "unit_price": "100.00" }))
        .await;
    app.set_status(&token, plan_id, "pre_approved").await;
    app.clone_version(&token, plan_id).await;

    // Editing works again and numbering continues within the new version
    let response = app
        .add_item(&token, plan_id, json!({ "quantity": "1", "unit_price": "900.00" }))
        .await;
    assert_eq!(response.status(), 201);
    let item: serde_json::Value = response.json().await.unwrap();
    assert_eq!(item["item_number"], 2);

    let detail = app.get_plan(&token, plan_id).await;
    assert_eq!(
        dec(&detail["active_version"]["total_amount"]),
        Decimal::from_str("1000").unwrap()
    );

    app.cleanup().await;
}

#[tokio::test]
async fn rollback_promotes_predecessor() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    app.add_item(&token, plan_id, json!({ "quantity": "1", "unit_price": "100.00" }))
        .await;
    app.set_status(&token, plan_id, "pre_approved").await;
    app.clone_version(&token, plan_id).await;

    let response = app.rollback_version(&token, plan_id).await;
    assert_eq!(response.status(), 200);
    let promoted: serde_json::Value = response.json().await.unwrap();
    assert_eq!(promoted["version_number"], 1);
    assert_eq!(promoted["status"], "pre_approved");
    assert_eq!(promoted["is_active"], true);

    // The promoted version is not a draft, so a second rollback must fail
    let response = app.rollback_version(&token, plan_id).await;
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn version_one_cannot_be_rolled_back() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let response = app.rollback_version(&token, plan_id).await;
    assert_eq!(response.status(), 409);

    app.cleanup().await;
}

#[tokio::test]
async fn repeated_reads_report_identical_metrics() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    app.add_item(&token, plan_id, json!({ "quantity": "3", "unit_price": "333.33" }))
        .await;

    let first = app.get_plan(&token, plan_id).await;
    let second = app.get_plan(&token, plan_id).await;
    assert_eq!(
        first["active_version"]["total_amount"],
        second["active_version"]["total_amount"]
    );
    assert_eq!(
        first["active_version"]["ktp_percentage"],
        second["active_version"]["ktp_percentage"]
    );

    app.cleanup().await;
}
