mod common;

use actix_web::cookie::Cookie;
use actix_web::dev::ServiceResponse;
use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use common::*;
use serde_json::{json, Value};
use uuid::Uuid;

use doce_sonho::services::payment_sandbox::SANDBOX_CHECKOUT_URL;
use doce_sonho::store::{seed_catalog, CartRepository};
use doce_sonho::web::configure_app_routes;
use doce_sonho::web::extractors::SESSION_COOKIE;

macro_rules! app {
  ($h:expr) => {
    test::init_service(
      App::new()
        .app_data(web::Data::new($h.state.clone()))
        .configure(configure_app_routes),
    )
    .await
  };
}

fn session_cookie(resp: &ServiceResponse) -> Cookie<'static> {
  resp
    .response()
    .cookies()
    .find(|c| c.name() == SESSION_COOKIE)
    .map(|c| c.into_owned())
    .expect("session cookie")
}

fn location(resp: &ServiceResponse) -> String {
  resp.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string()
}

#[actix_rt::test]
async fn health_reports_ok() {
  let h = harness();
  let app = app!(h);
  let resp = test::call_service(&app, test::TestRequest::get().uri("/api/v1/health").to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body, json!({ "status": "ok" }));
}

#[actix_rt::test]
async fn seeded_catalog_is_browsable() {
  let h = harness();
  assert_eq!(seed_catalog(h.store.as_ref()).await.unwrap(), 6);
  assert_eq!(seed_catalog(h.store.as_ref()).await.unwrap(), 0);
  let app = app!(h);

  let req = test::TestRequest::get().uri("/api/v1/products/categories").to_request();
  let categories: Vec<String> = test::call_and_read_body_json(&app, req).await;
  assert_eq!(categories.len(), 3);
  assert!(categories.contains(&"Tortas".to_string()));

  let req = test::TestRequest::get().uri("/api/v1/products?category=Doces").to_request();
  let products: Vec<Value> = test::call_and_read_body_json(&app, req).await;
  assert_eq!(products.len(), 2);

  let req = test::TestRequest::get()
    .uri(&format!("/api/v1/products/{}", Uuid::new_v4()))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn guest_cart_lives_in_the_session_cookie() {
  let h = harness();
  let product = h.product("Beijinho", 400).await;
  let app = app!(h);

  let req = test::TestRequest::post()
    .uri("/api/v1/cart/items")
    .set_json(json!({ "id": product.id, "quantity": 2 }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let cookie = session_cookie(&resp);

  let req = test::TestRequest::post()
    .uri("/api/v1/cart/update")
    .cookie(cookie.clone())
    .set_json(json!({ "items": [
      { "kind": "product", "id": product.id, "quantity": "12" },
      { "kind": "product", "id": Uuid::new_v4(), "quantity": 3 },
      { "kind": "product", "id": product.id, "quantity": "abc" }
    ]}))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["updated"], 1);
  assert_eq!(body["ignored"], 2);

  let req = test::TestRequest::get().uri("/api/v1/cart").cookie(cookie.clone()).to_request();
  let cart: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(cart["lines"].as_array().unwrap().len(), 1);
  assert_eq!(cart["lines"][0]["quantity"], 10);
  assert_eq!(cart["subtotalCents"], 4000);
  assert_eq!(cart["subtotalDisplay"], "R$ 40,00");

  let req = test::TestRequest::delete()
    .uri(&format!("/api/v1/cart/items/product/{}", product.id))
    .cookie(cookie.clone())
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["removed"], true);

  let req = test::TestRequest::get().uri("/api/v1/cart").cookie(cookie).to_request();
  let cart: Value = test::call_and_read_body_json(&app, req).await;
  assert!(cart["lines"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn browser_checkout_round_trip_ends_with_one_order() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let app = app!(h);

  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .insert_header(("X-User-ID", user.to_string()))
    .set_form([
      ("tipo_entrega", "frete"),
      ("rua", "Rua das Flores, 10"),
      ("cep", "01000-000"),
      ("bairro", "Centro"),
      ("email", "cliente@exemplo.com"),
    ])
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  assert!(location(&resp).starts_with(SANDBOX_CHECKOUT_URL));
  let cookie = session_cookie(&resp);
  let checkout_ref = h.gateway.requests().last().unwrap().1.external_reference.clone();
  h.gateway.register_payment("77", "approved", Some(checkout_ref));

  let req = test::TestRequest::get()
    .uri("/api/v1/payments/success?collection_id=77&status=approved")
    .cookie(cookie.clone())
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  assert_eq!(location(&resp), "/api/v1/orders");

  let req = test::TestRequest::get()
    .uri("/api/v1/orders")
    .insert_header(("X-User-ID", user.to_string()))
    .to_request();
  let orders: Vec<Value> = test::call_and_read_body_json(&app, req).await;
  assert_eq!(orders.len(), 1);
  assert_eq!(orders[0]["total_cents"], 6700);
  assert_eq!(orders[0]["payment_id"], "77");

  let req = test::TestRequest::get().uri("/api/v1/flash").cookie(cookie).to_request();
  let flashes: Vec<Value> = test::call_and_read_body_json(&app, req).await;
  assert!(flashes.iter().any(|f| f["level"] == "success"));
  assert!(h.store.cart_lines(user).await.unwrap().is_empty());

  let order_id = orders[0]["id"].as_str().unwrap().to_string();
  let req = test::TestRequest::get()
    .uri(&format!("/api/v1/orders/{}", order_id))
    .insert_header(("X-User-ID", Uuid::new_v4().to_string()))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn success_return_settles_only_on_the_gateways_word() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let app = app!(h);
  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .insert_header(("X-User-ID", user.to_string()))
    .set_form([("tipo_entrega", "retirada")])
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert!(location(&resp).starts_with(SANDBOX_CHECKOUT_URL));
  let cookie = session_cookie(&resp);
  let checkout_ref = h.gateway.requests().last().unwrap().1.external_reference.clone();

  // No payment id: held until the notification arrives.
  let req = test::TestRequest::get()
    .uri(&format!("/api/v1/payments/success?external_reference={}", checkout_ref))
    .cookie(cookie.clone())
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(location(&resp), "/api/v1/cart");
  assert_eq!(h.store.order_count(), 0);

  // The gateway says rejected, whatever the URL claims.
  h.gateway.register_payment("88", "rejected", Some(checkout_ref.clone()));
  let req = test::TestRequest::get()
    .uri(&format!("/api/v1/payments/success?external_reference={}&payment_id=88", checkout_ref))
    .cookie(cookie.clone())
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(location(&resp), "/api/v1/cart");
  assert_eq!(h.store.order_count(), 0);

  // Unknown payment ids are not trusted either.
  let req = test::TestRequest::get()
    .uri(&format!("/api/v1/payments/success?external_reference={}&payment_id=404", checkout_ref))
    .cookie(cookie.clone())
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(location(&resp), "/api/v1/cart");
  assert_eq!(h.store.order_count(), 0);

  let req = test::TestRequest::get().uri("/api/v1/flash").cookie(cookie).to_request();
  let flashes: Vec<Value> = test::call_and_read_body_json(&app, req).await;
  let levels: Vec<&str> = flashes.iter().map(|f| f["level"].as_str().unwrap()).collect();
  assert_eq!(levels, vec!["info", "warning", "error"]);
}

#[actix_rt::test]
async fn empty_cart_checkout_redirects_back_with_a_flash() {
  let h = harness();
  let app = app!(h);

  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .insert_header(("X-User-ID", Uuid::new_v4().to_string()))
    .set_form([("tipo_entrega", "retirada")])
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::SEE_OTHER);
  assert_eq!(location(&resp), "/api/v1/cart");

  let req = test::TestRequest::get()
    .uri("/api/v1/flash")
    .cookie(session_cookie(&resp))
    .to_request();
  let flashes: Vec<Value> = test::call_and_read_body_json(&app, req).await;
  assert_eq!(flashes.len(), 1);
  assert_eq!(flashes[0]["message"], "Seu carrinho está vazio!");
}

#[actix_rt::test]
async fn checkout_requires_a_signed_in_customer() {
  let h = harness();
  let app = app!(h);
  let req = test::TestRequest::post()
    .uri("/api/v1/checkout")
    .set_form([("tipo_entrega", "retirada")])
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn webhook_settles_a_checkout_and_rejects_malformed_bodies() {
  let h = harness();
  let user = Uuid::new_v4();
  h.reference_cart(user).await;
  let session = doce_sonho::services::session::SessionHandle::new_session();
  let (_, ctx) = h.checkout(&session, user, pickup()).await;
  let checkout_ref = ctx.read().pending.as_ref().unwrap().checkout_ref;
  h.gateway.register_payment("555", "approved", Some(checkout_ref.to_string()));
  let app = app!(h);

  let req = test::TestRequest::post()
    .uri("/api/v1/webhooks/payments")
    .set_json(json!(["not", "an", "object"]))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

  let req = test::TestRequest::post()
    .uri("/api/v1/webhooks/payments")
    .set_json(json!({ "type": "payment", "data": { "id": "999" } }))
    .to_request();
  let body: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(body["processed"], false);

  for _ in 0..2 {
    let req = test::TestRequest::post()
      .uri("/api/v1/webhooks/payments")
      .set_json(json!({ "type": "payment", "data": { "id": "555" } }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
  }
  assert_eq!(h.store.order_count(), 1);
}

#[actix_rt::test]
async fn custom_cake_is_priced_stored_and_added_to_the_cart() {
  let h = harness();
  let user = Uuid::new_v4();
  let app = app!(h);

  let req = test::TestRequest::post()
    .uri("/api/v1/custom-cakes")
    .insert_header(("X-User-ID", user.to_string()))
    .set_json(json!({ "base": "chocolate", "fillings": ["brigadeiro"], "topping": "ganache" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let body: Value = test::read_body_json(resp).await;
  assert_eq!(body["cake"]["price_cents"], 11000);
  assert_eq!(body["cartLine"]["quantity"], 1);

  let req = test::TestRequest::get()
    .uri("/api/v1/custom-cakes")
    .insert_header(("X-User-ID", user.to_string()))
    .to_request();
  let cakes: Vec<Value> = test::call_and_read_body_json(&app, req).await;
  assert_eq!(cakes.len(), 1);
  assert_eq!(h.store.cart_lines(user).await.unwrap().len(), 1);

  let req = test::TestRequest::post()
    .uri("/api/v1/custom-cakes")
    .insert_header(("X-User-ID", user.to_string()))
    .set_json(json!({ "base": "chocolate", "fillings": [], "topping": "ganache" }))
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn back_office_routes_check_roles() {
  let h = harness();
  let app = app!(h);
  let staff = Uuid::new_v4().to_string();

  let req = test::TestRequest::get().uri("/api/v1/admin/orders").to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

  let req = test::TestRequest::get()
    .uri("/api/v1/admin/orders")
    .insert_header(("X-User-ID", staff.clone()))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

  let req = test::TestRequest::get()
    .uri("/api/v1/admin/orders?status=approved")
    .insert_header(("X-User-ID", staff.clone()))
    .insert_header(("X-User-Role", "employee"))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

  let req = test::TestRequest::get()
    .uri("/api/v1/admin/orders?status=lost")
    .insert_header(("X-User-ID", staff.clone()))
    .insert_header(("X-User-Role", "employee"))
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

  let new_product = json!({ "name": "Pudim", "category": "Doces", "price_cents": 1500 });
  let req = test::TestRequest::post()
    .uri("/api/v1/admin/products")
    .insert_header(("X-User-ID", staff.clone()))
    .insert_header(("X-User-Role", "employee"))
    .set_json(&new_product)
    .to_request();
  assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

  let req = test::TestRequest::post()
    .uri("/api/v1/admin/products")
    .insert_header(("X-User-ID", staff.clone()))
    .insert_header(("X-User-Role", "admin"))
    .set_json(&new_product)
    .to_request();
  let resp = test::call_service(&app, req).await;
  assert_eq!(resp.status(), StatusCode::CREATED);
  let created: Value = test::read_body_json(resp).await;

  let req = test::TestRequest::patch()
    .uri(&format!("/api/v1/admin/products/{}", created["id"].as_str().unwrap()))
    .insert_header(("X-User-ID", staff))
    .insert_header(("X-User-Role", "admin"))
    .set_json(json!({ "active": false }))
    .to_request();
  let updated: Value = test::call_and_read_body_json(&app, req).await;
  assert_eq!(updated["active"], false);

  let req = test::TestRequest::get().uri("/api/v1/products").to_request();
  let products: Vec<Value> = test::call_and_read_body_json(&app, req).await;
  assert!(products.is_empty());
}
