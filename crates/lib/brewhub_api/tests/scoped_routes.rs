//! Integration tests: drive the router over the in-memory store.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use brewhub_api::{AppState, config::ApiConfig};
use brewhub_core::auth::password::hash_password;
use brewhub_core::models::auth::{Role, User, UserWithPassword};
use brewhub_core::models::document::{Collection, Document, TenantRef};
use brewhub_core::store::DocumentStore;
use brewhub_core::store::memory::MemoryStore;
use brewhub_core::uuid::uuidv7;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

const PASSWORD: &str = "cold-brew";

struct Fixture {
    app: Router,
    store: MemoryStore,
    shop: Uuid,
    branch: Uuid,
}

impl Fixture {
    async fn new() -> Self {
        let store = MemoryStore::new();
        let shop = uuidv7();
        let branch = store
            .insert_document(Document::new(
                Collection::Branches,
                TenantRef {
                    shop_id: Some(shop),
                    ..Default::default()
                },
                json!({"name": "Main St"}).as_object().cloned().unwrap(),
            ))
            .await
            .unwrap()
            .id;

        let app = brewhub_api::router(AppState::in_memory(
            store.clone(),
            ApiConfig::with_secret("integration-secret"),
        ));
        Self {
            app,
            store,
            shop,
            branch,
        }
    }

    async fn user(
        &self,
        email: &str,
        role: Role,
        shop: Option<Uuid>,
        branch: Option<Uuid>,
    ) -> User {
        let user = User {
            id: uuidv7(),
            email: email.into(),
            name: None,
            role,
            shop_id: shop,
            branch_id: branch,
        };
        self.store
            .add_user(UserWithPassword {
                user: user.clone(),
                password_hash: Some(hash_password(PASSWORD).unwrap()),
            })
            .await;
        user
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
        let resp = self.app.clone().oneshot(request).await.expect("request");
        let status = resp.status();
        let set_cookie = resp
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("parse JSON")
        };
        (status, json, set_cookie)
    }

    async fn login(&self, email: &str) -> (StatusCode, Value) {
        let req = Request::post("/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"email": email, "password": PASSWORD}).to_string(),
            ))
            .unwrap();
        let (status, body, _) = self.send(req).await;
        (status, body)
    }

    async fn token(&self, email: &str) -> String {
        let (status, body) = self.login(email).await;
        assert_eq!(status, StatusCode::OK, "login {email}: {body}");
        body["token"].as_str().expect("token").to_string()
    }
}

fn authed(method: &str, uri: &str, token: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
}

fn json_body(value: Value) -> Body {
    Body::from(value.to_string())
}

#[tokio::test]
async fn health_is_public() {
    let fx = Fixture::new().await;
    let (status, body, _) = fx
        .send(Request::get("/health").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn login_sets_cookie_and_second_login_conflicts() {
    let fx = Fixture::new().await;
    fx.user("owner@brewhub.test", Role::ShopAdmin, Some(fx.shop), None)
        .await;

    let req = Request::post("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(
            json!({"email": "owner@brewhub.test", "password": PASSWORD}),
        ))
        .unwrap();
    let (status, body, cookie) = fx.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "SHOP_ADMIN");
    let cookie = cookie.expect("session cookie");
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let (status, body) = fx.login("owner@brewhub.test").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let fx = Fixture::new().await;
    fx.user("client@brewhub.test", Role::Client, None, None).await;
    let req = Request::post("/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(
            json!({"email": "client@brewhub.test", "password": "nope"}),
        ))
        .unwrap();
    let (status, _, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let fx = Fixture::new().await;
    let (status, body, _) = fx
        .send(Request::get("/items").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _, _) = fx
        .send(authed("GET", "/items", "forged.token.value").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn session_cookie_authenticates() {
    let fx = Fixture::new().await;
    fx.user("client@brewhub.test", Role::Client, None, None).await;
    let token = fx.token("client@brewhub.test").await;

    let req = Request::get("/orders")
        .header(header::COOKIE, format!("session={token}"))
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn clients_only_see_their_own_orders() {
    let fx = Fixture::new().await;
    fx.user("ana@brewhub.test", Role::Client, None, None).await;
    fx.user("ben@brewhub.test", Role::Client, None, None).await;
    let ana = fx.token("ana@brewhub.test").await;
    let ben = fx.token("ben@brewhub.test").await;

    let req = authed("POST", "/orders", &ana)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-shop-id", fx.shop.to_string())
        .body(json_body(json!({"status": "active", "total": 7})))
        .unwrap();
    let (status, order, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::CREATED, "{order}");
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, mine, _) = fx
        .send(authed("GET", "/orders?status=active", &ana).body(Body::empty()).unwrap())
        .await;
    assert_eq!(mine["count"], 1);

    let (_, theirs, _) = fx
        .send(authed("GET", "/orders", &ben).body(Body::empty()).unwrap())
        .await;
    assert_eq!(theirs["count"], 0);

    let (status, _, _) = fx
        .send(
            authed("GET", &format!("/orders/{order_id}"), &ben)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn client_create_needs_a_shop_header() {
    let fx = Fixture::new().await;
    fx.user("ana@brewhub.test", Role::Client, None, None).await;
    let ana = fx.token("ana@brewhub.test").await;

    let req = authed("POST", "/orders", &ana)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(json!({"status": "active"})))
        .unwrap();
    let (status, body, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn shop_admin_cannot_select_another_shops_branch() {
    let fx = Fixture::new().await;
    fx.user("owner@brewhub.test", Role::ShopAdmin, Some(uuidv7()), None)
        .await;
    let token = fx.token("owner@brewhub.test").await;

    let req = authed("GET", "/items", &token)
        .header("x-branch-id", fx.branch.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden_scope");
}

#[tokio::test]
async fn shop_admin_branch_selection_narrows_listing() {
    let fx = Fixture::new().await;
    fx.user("owner@brewhub.test", Role::ShopAdmin, Some(fx.shop), None)
        .await;
    let token = fx.token("owner@brewhub.test").await;

    // One item at the selected branch, one shop-wide.
    let req = authed("POST", "/items", &token)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-branch-id", fx.branch.to_string())
        .body(json_body(json!({"name": "Flat white"})))
        .unwrap();
    assert_eq!(fx.send(req).await.0, StatusCode::CREATED);
    let req = authed("POST", "/items", &token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(json!({"name": "Beans 1kg"})))
        .unwrap();
    assert_eq!(fx.send(req).await.0, StatusCode::CREATED);

    let (_, all, _) = fx
        .send(authed("GET", "/items", &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(all["count"], 2);

    let req = authed("GET", "/items", &token)
        .header("x-branch", fx.branch.to_string())
        .body(Body::empty())
        .unwrap();
    let (_, at_branch, _) = fx.send(req).await;
    assert_eq!(at_branch["count"], 1);
    assert_eq!(at_branch["data"][0]["name"], "Flat white");
}

#[tokio::test]
async fn conflicting_shop_filter_returns_nothing() {
    let fx = Fixture::new().await;
    fx.user("owner@brewhub.test", Role::ShopAdmin, Some(fx.shop), None)
        .await;
    let token = fx.token("owner@brewhub.test").await;

    let uri = format!("/branches?shop_id={}", uuidv7());
    let (status, body, _) = fx
        .send(authed("GET", &uri, &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    let (_, own, _) = fx
        .send(authed("GET", "/branches", &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(own["count"], 1);
}

#[tokio::test]
async fn branch_admin_is_denied_with_required_permissions() {
    let fx = Fixture::new().await;
    fx.user(
        "manager@brewhub.test",
        Role::BranchAdmin,
        Some(fx.shop),
        Some(fx.branch),
    )
    .await;
    let token = fx.token("manager@brewhub.test").await;

    let req = authed("POST", "/branches", &token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(json!({"name": "Pop-up"})))
        .unwrap();
    let (status, body, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
    assert_eq!(body["requiredPermissions"], json!(["branches:create"]));
}

async fn seed(store: &MemoryStore, collection: Collection, tenant: TenantRef, body: Value) -> Uuid {
    store
        .insert_document(Document::new(
            collection,
            tenant,
            body.as_object().cloned().unwrap(),
        ))
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn branch_admin_sees_only_their_branch() {
    let fx = Fixture::new().await;
    let other_branch = seed(
        &fx.store,
        Collection::Branches,
        TenantRef {
            shop_id: Some(fx.shop),
            ..Default::default()
        },
        json!({}),
    )
    .await;
    for (branch, name) in [(fx.branch, "Espresso"), (other_branch, "Filter")] {
        seed(
            &fx.store,
            Collection::Categories,
            TenantRef {
                shop_id: Some(fx.shop),
                branch_id: Some(branch),
                owner_user_id: None,
            },
            json!({ "name": name }),
        )
        .await;
    }
    fx.user(
        "manager@brewhub.test",
        Role::BranchAdmin,
        Some(fx.shop),
        Some(fx.branch),
    )
    .await;
    let token = fx.token("manager@brewhub.test").await;

    // Requested branch is ignored for branch admins.
    let req = authed("GET", "/categories", &token)
        .header("x-branch-id", other_branch.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["name"], "Espresso");
    assert_eq!(body["data"][0]["branchId"], fx.branch.to_string());

    let (status, body, _) = fx
        .send(authed("GET", "/branches", &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["requiredPermissions"], json!(["branches:view"]));
}

#[tokio::test]
async fn non_identifier_query_key_is_a_bad_request() {
    let fx = Fixture::new().await;
    fx.user("owner@brewhub.test", Role::ShopAdmin, Some(fx.shop), None)
        .await;
    let token = fx.token("owner@brewhub.test").await;

    let (status, body, _) = fx
        .send(authed("GET", "/items?price-max=3", &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn patch_updates_in_scope_and_hides_foreign_records() {
    let fx = Fixture::new().await;
    let item = seed(
        &fx.store,
        Collection::Items,
        TenantRef {
            shop_id: Some(fx.shop),
            ..Default::default()
        },
        json!({"name": "Mocha", "price": 4}),
    )
    .await;
    fx.user("owner@brewhub.test", Role::ShopAdmin, Some(fx.shop), None)
        .await;
    fx.user("rival@brewhub.test", Role::ShopAdmin, Some(uuidv7()), None)
        .await;
    let owner = fx.token("owner@brewhub.test").await;
    let rival = fx.token("rival@brewhub.test").await;
    let uri = format!("/items/{item}");

    let req = authed("PATCH", &uri, &rival)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(json!({"price": 1})))
        .unwrap();
    assert_eq!(fx.send(req).await.0, StatusCode::NOT_FOUND);

    let req = authed("PATCH", &uri, &owner)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(json!({"price": 5, "shopId": uuidv7().to_string()})))
        .unwrap();
    let (status, body, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["price"], 5);
    assert_eq!(body["name"], "Mocha");
    assert_eq!(body["shopId"], fx.shop.to_string());
}

#[tokio::test]
async fn branch_admin_patch_is_pinned_to_their_branch() {
    let fx = Fixture::new().await;
    let shop_wide = seed(
        &fx.store,
        Collection::Items,
        TenantRef {
            shop_id: Some(fx.shop),
            ..Default::default()
        },
        json!({"name": "Beans"}),
    )
    .await;
    let at_branch = seed(
        &fx.store,
        Collection::Items,
        TenantRef {
            shop_id: Some(fx.shop),
            branch_id: Some(fx.branch),
            owner_user_id: None,
        },
        json!({"name": "Cortado"}),
    )
    .await;
    fx.user(
        "manager@brewhub.test",
        Role::BranchAdmin,
        Some(fx.shop),
        Some(fx.branch),
    )
    .await;
    let token = fx.token("manager@brewhub.test").await;

    let patch = |id: Uuid| {
        authed("PATCH", &format!("/items/{id}"), &token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(json!({"stock": 12})))
            .unwrap()
    };
    assert_eq!(fx.send(patch(shop_wide)).await.0, StatusCode::NOT_FOUND);
    assert_eq!(fx.send(patch(at_branch)).await.0, StatusCode::OK);
}

#[tokio::test]
async fn orders_cannot_be_patched() {
    let fx = Fixture::new().await;
    fx.user("root@brewhub.test", Role::Admin, None, None).await;
    let token = fx.token("root@brewhub.test").await;

    let req = authed("PATCH", &format!("/orders/{}", uuidv7()), &token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(json!({"status": "done"})))
        .unwrap();
    let (status, body, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"], "method_not_allowed");
}

#[tokio::test]
async fn admin_creates_shops_that_own_themselves() {
    let fx = Fixture::new().await;
    fx.user("root@brewhub.test", Role::Admin, None, None).await;
    let token = fx.token("root@brewhub.test").await;

    let req = authed("POST", "/shops", &token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(json_body(json!({"name": "Roastery", "slug": "roastery"})))
        .unwrap();
    let (status, body, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["shopId"], body["id"]);
    assert_eq!(body["collection"], "shops");
}

#[tokio::test]
async fn shop_admin_sees_and_edits_only_their_shop() {
    let fx = Fixture::new().await;
    let own = seed(
        &fx.store,
        Collection::Shops,
        TenantRef::default(),
        json!({"name": "Own"}),
    )
    .await;
    let other = seed(
        &fx.store,
        Collection::Shops,
        TenantRef::default(),
        json!({"name": "Other"}),
    )
    .await;
    fx.user("owner@brewhub.test", Role::ShopAdmin, Some(own), None)
        .await;
    fx.user("ana@brewhub.test", Role::Client, None, None).await;
    let token = fx.token("owner@brewhub.test").await;
    let client = fx.token("ana@brewhub.test").await;

    let (status, body, _) = fx
        .send(authed("GET", "/shops", &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["id"], own.to_string());

    let rename = |id: Uuid| {
        authed("PATCH", &format!("/shops/{id}"), &token)
            .header(header::CONTENT_TYPE, "application/json")
            .body(json_body(json!({"name": "Renamed"})))
            .unwrap()
    };
    assert_eq!(fx.send(rename(other)).await.0, StatusCode::NOT_FOUND);
    let (status, body, _) = fx.send(rename(own)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Renamed");

    let req = authed("DELETE", &format!("/shops/{own}"), &token)
        .body(Body::empty())
        .unwrap();
    let (status, body, _) = fx.send(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["requiredPermissions"], json!(["shops:delete"]));

    let (status, _, _) = fx
        .send(authed("GET", "/shops", &client).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_outside_scope_is_not_found() {
    let fx = Fixture::new().await;
    fx.user("owner@brewhub.test", Role::ShopAdmin, Some(uuidv7()), None)
        .await;
    let token = fx.token("owner@brewhub.test").await;

    let uri = format!("/branches/{}", fx.branch);
    let (status, _, _) = fx
        .send(authed("DELETE", &uri, &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        fx.store
            .find_documents(Collection::Branches, &Default::default())
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn logout_closes_the_session() {
    let fx = Fixture::new().await;
    fx.user("ana@brewhub.test", Role::Client, None, None).await;
    let token = fx.token("ana@brewhub.test").await;

    let (status, body, cookie) = fx
        .send(authed("DELETE", "/sessions", &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(cookie.expect("cleared cookie").starts_with("session=;"));

    let (status, _, _) = fx
        .send(authed("GET", "/sessions", &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A fresh login is allowed again.
    assert_eq!(fx.login("ana@brewhub.test").await.0, StatusCode::OK);
}

#[tokio::test]
async fn only_admin_can_revoke_another_users_sessions() {
    let fx = Fixture::new().await;
    let ana = fx.user("ana@brewhub.test", Role::Client, None, None).await;
    fx.user("root@brewhub.test", Role::Admin, None, None).await;
    let ana_token = fx.token("ana@brewhub.test").await;
    let admin_token = fx.token("root@brewhub.test").await;

    let uri = format!("/sessions/user/{}", ana.id);
    let (status, _, _) = fx
        .send(authed("DELETE", &uri, &ana_token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body, _) = fx
        .send(authed("DELETE", &uri, &admin_token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], 1);

    let (status, _, _) = fx
        .send(authed("GET", "/sessions", &ana_token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sessions_listing_hides_token_hashes() {
    let fx = Fixture::new().await;
    fx.user("ana@brewhub.test", Role::Client, None, None).await;
    let token = fx.token("ana@brewhub.test").await;

    let (status, body, _) = fx
        .send(authed("GET", "/sessions", &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["active"], true);
    assert!(sessions[0].get("tokenHash").is_none());
}

#[tokio::test]
async fn unknown_collection_is_not_found() {
    let fx = Fixture::new().await;
    fx.user("root@brewhub.test", Role::Admin, None, None).await;
    let token = fx.token("root@brewhub.test").await;
    let (status, _, _) = fx
        .send(authed("GET", "/users", &token).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
