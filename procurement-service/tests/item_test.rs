mod common;

use common::{TestApp, KTP_PRODUCT_CODE, OTHER_IIN, OWNER_IIN, PLAIN_PRODUCT_CODE};
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;

fn dec(v: &serde_json::Value) -> Decimal {
    Decimal::from_str(v.as_str().expect("expected decimal string")).unwrap()
}

#[tokio::test]
async fn items_get_sequential_numbers_and_computed_totals() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let response = app
        .add_item(&token, plan_id, json!({ "quantity": "10", "unit_price": "100.00" }))
        .await;
    assert_eq!(response.status(), 201);
    let first: serde_json::Value = response.json().await.unwrap();
    assert_eq!(first["item_number"], 1);
    assert_eq!(first["need_category"], "goods");
    assert_eq!(dec(&first["total_amount"]), Decimal::from_str("1000").unwrap());

    let response = app
        .add_item(
            &token,
            plan_id,
            json!({
                "product_code": PLAIN_PRODUCT_CODE,
                "quantity": "4",
                "unit_price": "250.00",
                "is_ktp": false
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let second: serde_json::Value = response.json().await.unwrap();
    assert_eq!(second["item_number"], 2);
    assert_eq!(second["need_category"], "services");

    // Metrics: 1000 of 2000 is domestic
    let detail = app.get_plan(&token, plan_id).await;
    let version = &detail["active_version"];
    assert_eq!(dec(&version["total_amount"]), Decimal::from_str("2000").unwrap());
    assert_eq!(dec(&version["ktp_percentage"]), Decimal::from_str("50").unwrap());
    assert_eq!(dec(&version["import_percentage"]), Decimal::from_str("50").unwrap());

    // Items come back enriched with registry display names
    let items = version["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["product_name_ru"], "Компьютер персональный");
    assert_eq!(items[0]["unit_name_ru"], "штука");

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_product_code_rejected() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let response = app
        .add_item(&token, plan_id, json!({ "product_code": "000000000000" }))
        .await;
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn non_positive_amounts_rejected() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let response = app.add_item(&token, plan_id, json!({ "quantity": "0" })).await;
    assert_eq!(response.status(), 400);

    let response = app
        .add_item(&token, plan_id, json!({ "unit_price": "-5.00" }))
        .await;
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn update_recomputes_line_total_and_metrics() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let response = app
        .add_item(&token, plan_id, json!({ "quantity": "10", "unit_price": "100.00" }))
        .await;
    let item: serde_json::Value = response.json().await.unwrap();
    let item_id = item["item_id"].as_str().unwrap();

    let response = app
        .client
        .put(app.api(&format!("/items/{}", item_id)))
        .bearer_auth(&token)
        .json(&json!({ "quantity": "3" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(dec(&updated["total_amount"]), Decimal::from_str("300").unwrap());

    let detail = app.get_plan(&token, plan_id).await;
    assert_eq!(
        dec(&detail["active_version"]["total_amount"]),
        Decimal::from_str("300").unwrap()
    );

    app.cleanup().await;
}

#[tokio::test]
async fn changing_product_code_rederives_need_category() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let response = app.add_item(&token, plan_id, json!({})).await;
    let item: serde_json::Value = response.json().await.unwrap();
    let item_id = item["item_id"].as_str().unwrap();
    assert_eq!(item["need_category"], "goods");

    let response = app
        .client
        .put(app.api(&format!("/items/{}", item_id)))
        .bearer_auth(&token)
        .json(&json!({ "product_code": PLAIN_PRODUCT_CODE }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let updated: serde_json::Value = response.json().await.unwrap();
    assert_eq!(updated["need_category"], "services");

    app.cleanup().await;
}

#[tokio::test]
async fn soft_delete_keeps_numbers_and_excludes_from_metrics() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let first: serde_json::Value = app
        .add_item(&token, plan_id, json!({ "quantity": "1", "unit_price": "100.00" }))
        .await
        .json()
        .await
        .unwrap();
    app.add_item(&token, plan_id, json!({ "quantity": "1", "unit_price": "200.00" }))
        .await;

    let response = app
        .client
        .delete(app.api(&format!("/items/{}", first["item_id"].as_str().unwrap())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // Deleted item is gone from reads
    let response = app
        .client
        .get(app.api(&format!("/items/{}", first["item_id"].as_str().unwrap())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    // Its number is never reissued
    let third: serde_json::Value = app
        .add_item(&token, plan_id, json!({ "quantity": "1", "unit_price": "300.00" }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(third["item_number"], 3);

    let detail = app.get_plan(&token, plan_id).await;
    let version = &detail["active_version"];
    let numbers: Vec<i64> = version["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["item_number"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![2, 3]);
    assert_eq!(dec(&version["total_amount"]), Decimal::from_str("500").unwrap());

    app.cleanup().await;
}

#[tokio::test]
async fn items_frozen_once_version_leaves_draft() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let item: serde_json::Value = app
        .add_item(&token, plan_id, json!({}))
        .await
        .json()
        .await
        .unwrap();
    let item_id = item["item_id"].as_str().unwrap();

    app.set_status(&token, plan_id, "pre_approved").await;

    let response = app.add_item(&token, plan_id, json!({})).await;
    assert_eq!(response.status(), 403);

    let response = app
        .client
        .put(app.api(&format!("/items/{}", item_id)))
        .bearer_auth(&token)
        .json(&json!({ "quantity": "2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = app
        .client
        .delete(app.api(&format!("/items/{}", item_id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    app.cleanup().await;
}

#[tokio::test]
async fn edit_data_returns_referenced_registry_rows() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let item: serde_json::Value = app
        .add_item(&token, plan_id, json!({}))
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .client
        .get(app.api(&format!("/items/{}/edit-data", item["item_id"].as_str().unwrap())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let data: serde_json::Value = response.json().await.unwrap();
    let options = &data["initial_options"];
    assert_eq!(options["product_code"]["code"], KTP_PRODUCT_CODE);
    assert_eq!(options["unit"]["unit_id"], 1);
    assert_eq!(options["cost_item"]["cost_item_id"], 1);
    assert_eq!(options["funding_source"]["funding_source_id"], 1);
    assert_eq!(options["origin_category"]["code"], "01");
    assert_eq!(options["kato_purchase"]["kato_id"], 1);
    assert_eq!(options["kato_delivery"]["kato_id"], 2);

    app.cleanup().await;
}

#[tokio::test]
async fn items_of_foreign_plans_are_inaccessible() {
    let app = TestApp::spawn().await;
    let token = app.login(OWNER_IIN).await;
    let other_token = app.login(OTHER_IIN).await;

    let plan = app.create_plan(&token, "План", 2026).await;
    let plan_id = plan["plan_id"].as_str().unwrap();

    let item: serde_json::Value = app
        .add_item(&token, plan_id, json!({}))
        .await
        .json()
        .await
        .unwrap();
    let item_id = item["item_id"].as_str().unwrap();

    let response = app
        .client
        .get(app.api(&format!("/items/{}", item_id)))
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = app
        .client
        .put(app.api(&format!("/items/{}", item_id)))
        .bearer_auth(&other_token)
        .json(&json!({ "quantity": "2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    app.cleanup().await;
}
