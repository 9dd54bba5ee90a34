//! Per-domain tool catalogs.

use tauplus_config::Domain;

/// Duration assumed for a tool missing from the catalog's timing table.
pub const DEFAULT_TOOL_DURATION_SECS: f64 = 0.5;

/// Name of the tool that hands the conversation to a human agent.
pub const TRANSFER_TOOL: &str = "transfer_to_human_agents";

/// Static description of the tools available in a domain.
#[derive(Debug)]
pub struct ToolCatalog {
  pub domain: Domain,
  /// Lookup tools that never change environment state.
  pub read_only: &'static [&'static str],
  /// Tools whose effects change the environment and need user consent.
  pub consequential: &'static [&'static str],
  durations: &'static [(&'static str, f64)],
}

static RETAIL: ToolCatalog = ToolCatalog {
  domain: Domain::Retail,
  read_only: &[
    "calculate",
    "find_user_id_by_email",
    "find_user_id_by_name_zip",
    "get_order_details",
    "get_product_details",
    "get_user_details",
    "list_all_product_types",
    "think",
  ],
  consequential: &[
    "cancel_pending_order",
    "exchange_delivered_order_items",
    "modify_pending_order_address",
    "modify_pending_order_items",
    "modify_pending_order_payment",
    "modify_user_address",
    "return_delivered_order_items",
  ],
  durations: &[
    ("calculate", 0.1),
    ("find_user_id_by_email", 0.1),
    ("find_user_id_by_name_zip", 0.1),
    ("get_order_details", 0.1),
    ("get_product_details", 0.1),
    ("get_user_details", 0.1),
    ("list_all_product_types", 0.3),
    ("think", 0.1),
    ("cancel_pending_order", 0.5),
    ("exchange_delivered_order_items", 1.0),
    ("modify_pending_order_address", 0.8),
    ("modify_pending_order_items", 1.0),
    ("modify_pending_order_payment", 0.8),
    ("return_delivered_order_items", 1.0),
    (TRANSFER_TOOL, 0.2),
  ],
};

static AIRLINE: ToolCatalog = ToolCatalog {
  domain: Domain::Airline,
  read_only: &[
    "calculate",
    "get_reservation_details",
    "get_user_details",
    "list_all_airports",
    "search_direct_flight",
    "search_onestop_flight",
    "think",
  ],
  consequential: &[
    "book_reservation",
    "cancel_reservation",
    "send_certificate",
    "update_reservation_baggages",
    "update_reservation_flights",
    "update_reservation_passengers",
  ],
  durations: &[
    ("calculate", 0.1),
    ("get_reservation_details", 0.1),
    ("get_user_details", 0.1),
    ("list_all_airports", 0.3),
    ("search_direct_flight", 0.5),
    ("search_onestop_flight", 0.5),
    ("think", 0.1),
    ("book_reservation", 1.2),
    ("cancel_reservation", 0.5),
    ("send_certificate", 0.5),
    ("update_reservation_baggages", 0.8),
    ("update_reservation_flights", 1.0),
    ("update_reservation_passengers", 0.8),
    (TRANSFER_TOOL, 0.2),
  ],
};

impl ToolCatalog {
  pub fn for_domain(domain: Domain) -> &'static ToolCatalog {
    match domain {
      Domain::Retail => &RETAIL,
      Domain::Airline => &AIRLINE,
    }
  }

  pub fn is_read_only(&self, tool: &str) -> bool {
    self.read_only.contains(&tool)
  }

  pub fn is_consequential(&self, tool: &str) -> bool {
    self.consequential.contains(&tool)
  }

  pub fn is_transfer(&self, tool: &str) -> bool {
    tool == TRANSFER_TOOL
  }

  /// Whether a tool may change environment state.
  ///
  /// Tools missing from the catalog are assumed to mutate.
  pub fn is_mutating(&self, tool: &str) -> bool {
    !self.is_read_only(tool) && !self.is_transfer(tool)
  }

  /// Whether repeating the call is safe.
  pub fn is_idempotent(&self, tool: &str) -> bool {
    !self.is_mutating(tool)
  }

  /// Typical duration used when a call's timing was not captured.
  pub fn estimated_duration(&self, tool: &str) -> f64 {
    self
      .durations
      .iter()
      .find(|(name, _)| *name == tool)
      .map(|(_, secs)| *secs)
      .unwrap_or(DEFAULT_TOOL_DURATION_SECS)
  }
}
