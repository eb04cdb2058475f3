mod common;

use common::{TestApp, KTP_PRODUCT_CODE, PLAIN_PRODUCT_CODE};

#[tokio::test]
async fn unit_search_matches_code_and_names() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.api("/lookups/units"))
        .query(&[("q", "шту")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let units: serde_json::Value = response.json().await.unwrap();
    assert_eq!(units.as_array().unwrap().len(), 1);
    assert_eq!(units[0]["code"], "796");

    let response = app
        .client
        .get(app.api("/lookups/units"))
        .query(&[("q", "nonexistent")])
        .send()
        .await
        .unwrap();
    let units: serde_json::Value = response.json().await.unwrap();
    assert!(units.as_array().unwrap().is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn search_without_query_lists_entries() {
    let app = TestApp::spawn().await;

    for path in [
        "/lookups/units",
        "/lookups/kato",
        "/lookups/origin-categories",
        "/lookups/cost-items",
        "/lookups/funding-sources",
        "/lookups/product-codes",
    ] {
        let response = app.client.get(app.api(path)).send().await.unwrap();
        assert_eq!(response.status(), 200, "{} failed", path);
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(!body.as_array().unwrap().is_empty(), "{} empty", path);
    }

    app.cleanup().await;
}

#[tokio::test]
async fn check_ktp_reflects_registry_membership() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.api("/lookups/check-ktp"))
        .query(&[("product_code", KTP_PRODUCT_CODE)])
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["is_ktp"], true);

    let response = app
        .client
        .get(app.api("/lookups/check-ktp"))
        .query(&[("product_code", PLAIN_PRODUCT_CODE)])
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["is_ktp"], false);

    app.cleanup().await;
}

#[tokio::test]
async fn kato_tree_navigation() {
    let app = TestApp::spawn().await;

    // Top level
    let response = app.client.get(app.api("/kato")).send().await.unwrap();
    let roots: serde_json::Value = response.json().await.unwrap();
    assert_eq!(roots.as_array().unwrap().len(), 1);
    assert_eq!(roots[0]["kato_id"], 1);
    assert_eq!(roots[0]["has_children"], true);

    // Children of a node
    let response = app
        .client
        .get(app.api("/kato"))
        .query(&[("parent_id", "1")])
        .send()
        .await
        .unwrap();
    let children: serde_json::Value = response.json().await.unwrap();
    assert_eq!(children.as_array().unwrap().len(), 1);
    assert_eq!(children[0]["kato_id"], 2);

    // Leaf node has no children
    let response = app.client.get(app.api("/kato/3")).send().await.unwrap();
    let leaf: serde_json::Value = response.json().await.unwrap();
    assert_eq!(leaf["has_children"], false);

    // Ancestor chain comes back root first
    let response = app
        .client
        .get(app.api("/kato/3/parents"))
        .send()
        .await
        .unwrap();
    let parents: serde_json::Value = response.json().await.unwrap();
    let ids: Vec<i64> = parents
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["kato_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2]);

    // Unknown id
    let response = app.client.get(app.api("/kato/999")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}
