use actix_web::{web, HttpResponse};

use crate::web::handlers::{
  admin_handlers, cake_handlers, cart_handlers, checkout_handlers, order_handlers, payment_handlers,
  product_handlers, webhook_handlers,
};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Mounts every route under `/api/v1`. Called from `main.rs` and the HTTP
/// tests.
pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("/categories", web::get().to(product_handlers::list_categories_handler))
          .route("/{product_id}", web::get().to(product_handlers::get_product_handler)),
      )
      .service(
        web::scope("/custom-cakes")
          .route("", web::post().to(cake_handlers::create_custom_cake_handler))
          .route("", web::get().to(cake_handlers::list_custom_cakes_handler)),
      )
      .service(
        web::scope("/cart")
          .route("", web::get().to(cart_handlers::view_cart_handler))
          .route("/items", web::post().to(cart_handlers::add_to_cart_handler))
          .route("/update", web::post().to(cart_handlers::update_cart_handler))
          .route("/items/{kind}/{item_id}", web::delete().to(cart_handlers::remove_from_cart_handler)),
      )
      .route("/flash", web::get().to(cart_handlers::drain_flashes_handler))
      .route("/checkout", web::post().to(checkout_handlers::start_checkout_handler))
      .service(
        web::scope("/payments")
          .route("/success", web::get().to(payment_handlers::payment_success_handler))
          .route("/failure", web::get().to(payment_handlers::payment_failure_handler))
          .route("/pending", web::get().to(payment_handlers::payment_pending_handler)),
      )
      .route("/webhooks/payments", web::post().to(webhook_handlers::payment_webhook_handler))
      .service(
        web::scope("/orders")
          .route("", web::get().to(order_handlers::my_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::my_order_handler)),
      )
      .service(
        web::scope("/admin")
          .route("/orders", web::get().to(admin_handlers::list_orders_handler))
          .route("/orders/{order_id}", web::get().to(admin_handlers::order_detail_handler))
          .route("/orders/{order_id}/status", web::post().to(admin_handlers::update_order_status_handler))
          .route("/products", web::post().to(admin_handlers::create_product_handler))
          .route("/products/{product_id}", web::patch().to(admin_handlers::update_product_handler)),
      ),
  );
}
