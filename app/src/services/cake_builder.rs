//! Custom-cake builder: option validation and pricing.

use serde::Deserialize;

use crate::errors::{AppError, Result};

pub const BASE_PRICE_CENTS: i64 = 5000;

const BASES: &[(&str, &str, i64)] = &[
  ("chocolate", "Chocolate", 2500),
  ("baunilha", "Baunilha", 2000),
  ("red_velvet", "Red Velvet", 3000),
  ("limao", "Limão", 2200),
];

const FILLINGS: &[(&str, &str, i64)] = &[
  ("brigadeiro", "Brigadeiro", 1500),
  ("morango", "Morango", 1800),
  ("doce_de_leite", "Doce de Leite", 1200),
  ("chocolate_branco", "Chocolate Branco", 1600),
];

const TOPPINGS: &[(&str, &str, i64)] = &[
  ("chantilly", "Chantilly", 1800),
  ("ganache", "Ganache", 2000),
  ("pasta_americana", "Pasta Americana", 2500),
  ("cream_cheese", "Cream Cheese", 2200),
];

const FINISHES: &[(&str, &str, i64)] = &[
  ("morangos", "Morangos", 1200),
  ("chocolate_raspas", "Raspas de Chocolate", 800),
  ("mm", "M&M's", 1000),
  ("confete", "Confete", 500),
];

#[derive(Debug, Clone, Deserialize)]
pub struct CakeRequest {
  pub base: String,
  #[serde(default)]
  pub fillings: Vec<String>,
  pub topping: String,
  #[serde(default)]
  pub finishes: Vec<String>,
  #[serde(default)]
  pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedCake {
  pub name: String,
  pub price_cents: i64,
}

fn lookup(table: &[(&'static str, &'static str, i64)], what: &str, key: &str) -> Result<(&'static str, i64)> {
  table
    .iter()
    .find(|(k, _, _)| *k == key)
    .map(|(_, label, price)| (*label, *price))
    .ok_or_else(|| AppError::Validation(format!("Opção de {} desconhecida: {}", what, key)))
}

/// Validates the choices and prices them:
/// 50.00 + base + every filling + topping + every finish.
pub fn price_cake(request: &CakeRequest) -> Result<PricedCake> {
  if request.base.trim().is_empty() || request.fillings.is_empty() || request.topping.trim().is_empty() {
    return Err(AppError::Validation(
      "Por favor, preencha todos os campos obrigatórios.".to_string(),
    ));
  }

  let (base_label, base_price) = lookup(BASES, "massa", request.base.trim())?;
  let mut total = BASE_PRICE_CENTS + base_price;
  for filling in &request.fillings {
    total += lookup(FILLINGS, "recheio", filling.trim())?.1;
  }
  total += lookup(TOPPINGS, "cobertura", request.topping.trim())?.1;
  for finish in &request.finishes {
    total += lookup(FINISHES, "finalização", finish.trim())?.1;
  }

  Ok(PricedCake {
    name: format!("Bolo Personalizado de {}", base_label),
    price_cents: total,
  })
}
