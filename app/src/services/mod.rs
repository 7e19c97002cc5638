pub mod cake_builder;
pub mod cart_reconciler;
pub mod cart_store;
pub mod mailer;
pub mod payment_gateway;
pub mod payment_sandbox;
pub mod session;
