use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};
use crate::models::{format_brl, OrderWithLines};

#[derive(Debug, Clone)]
pub struct OutgoingMail {
  pub to: String,
  pub from: String,
  pub subject: String,
  pub body: String,
}

#[derive(Debug, Clone)]
pub struct SentMail {
  pub message_id: String,
  pub to: String,
  pub subject: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
  async fn send(&self, mail: &OutgoingMail) -> AppResult<SentMail>;
}

/// Writes mails to the log instead of delivering them.
#[derive(Default)]
pub struct LogMailer {
  sent: Mutex<Vec<SentMail>>,
}

impl LogMailer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn sent(&self) -> Vec<SentMail> {
    self.sent.lock().clone()
  }
}

#[async_trait]
impl Mailer for LogMailer {
  async fn send(&self, mail: &OutgoingMail) -> AppResult<SentMail> {
    if !mail.to.contains('@') {
      warn!(to = %mail.to, "Refusing mail to malformed address.");
      return Err(AppError::Validation(format!("Endereço de e-mail inválido: {}", mail.to)));
    }
    let body_preview: String = mail.body.chars().take(50).collect();
    let sent = SentMail {
      message_id: format!("log-mail-{}", Uuid::new_v4()),
      to: mail.to.clone(),
      subject: mail.subject.clone(),
    };
    info!(
      message_id = %sent.message_id,
      to = %mail.to,
      from = %mail.from,
      subject = %mail.subject,
      %body_preview,
      "Mail written to log."
    );
    self.sent.lock().push(sent.clone());
    Ok(sent)
  }
}

pub fn order_confirmation(order: &OrderWithLines, to: &str, from: &str) -> OutgoingMail {
  let mut body = format!(
    "Olá! Recebemos o pagamento do seu pedido {}.\n\n",
    order.order.id
  );
  for line in &order.lines {
    body.push_str(&format!(
      "{} x {} ({})\n",
      line.quantity,
      line.name,
      format_brl(line.unit_price_cents * i64::from(line.quantity))
    ));
  }
  body.push_str(&format!("\nForma de recebimento: {}\n", order.order.delivery.label()));
  if order.order.delivery_fee_cents > 0 {
    body.push_str(&format!("Taxa de entrega: {}\n", format_brl(order.order.delivery_fee_cents)));
  }
  body.push_str(&format!("\nTotal: {}\n\nObrigado por comprar na Doce Sonho!", format_brl(order.order.total_cents)));

  OutgoingMail {
    to: to.to_string(),
    from: from.to_string(),
    subject: "Doce Sonho: pagamento confirmado".to_string(),
    body,
  }
}
