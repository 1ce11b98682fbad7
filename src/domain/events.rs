//! Domain Events
//!
//! Event definitions for Event Sourcing.
//! Events are immutable facts that have happened in the system.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EventMetadata;

/// Account currencies, serialized by ISO code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    NOK,
    DKK,
    MAD,
    SEK,
    USD,
    EUR,
    GBP,
    JPY,
    AUD,
    CAD,
    CHF,
}

/// Kinds of tracked accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountKind {
    Business,
    Checking,
    Savings,
}

/// Account-related events
///
/// Monetary fields are `Decimal` and serialize as decimal strings, so the
/// exact scale a producer asserted survives storage and delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccountEvent {
    /// Account was opened
    AccountCreated {
        account_id: Uuid,
        account_name: String,
        currency: Currency,
        account_type: AccountKind,
        initial_balance: Decimal,
    },

    /// Money was deposited into the account
    MoneyDeposited {
        account_id: Uuid,
        amount: Decimal,
        #[serde(default)]
        category: Option<String>,
        description: String,
    },

    /// Money was withdrawn from the account
    MoneyWithdrawn {
        account_id: Uuid,
        amount: Decimal,
        #[serde(default)]
        category: Option<String>,
        description: String,
    },

    /// Account was renamed
    AccountRenamed {
        account_id: Uuid,
        account_name: String,
    },

    /// Account was closed
    AccountClosed {
        account_id: Uuid,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl AccountEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountCreated { .. } => "AccountCreated",
            AccountEvent::MoneyDeposited { .. } => "MoneyDeposited",
            AccountEvent::MoneyWithdrawn { .. } => "MoneyWithdrawn",
            AccountEvent::AccountRenamed { .. } => "AccountRenamed",
            AccountEvent::AccountClosed { .. } => "AccountClosed",
        }
    }

    /// Get the account ID this event relates to
    pub fn account_id(&self) -> Uuid {
        match self {
            AccountEvent::AccountCreated { account_id, .. } => *account_id,
            AccountEvent::MoneyDeposited { account_id, .. } => *account_id,
            AccountEvent::MoneyWithdrawn { account_id, .. } => *account_id,
            AccountEvent::AccountRenamed { account_id, .. } => *account_id,
            AccountEvent::AccountClosed { account_id, .. } => *account_id,
        }
    }
}

/// Envelope uniting the closed set of event variants with their metadata.
///
/// The variant fields are flattened next to `metadata` in the encoded
/// payload, with the variant name under a `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub metadata: EventMetadata,
    #[serde(flatten)]
    pub body: AccountEvent,
}

impl DomainEvent {
    /// Wrap an event body with fresh metadata.
    pub fn new(body: AccountEvent) -> Self {
        Self {
            metadata: EventMetadata::new(),
            body,
        }
    }

    /// Wrap an event body with caller-supplied metadata.
    pub fn with_metadata(body: AccountEvent, metadata: EventMetadata) -> Self {
        Self { metadata, body }
    }

    pub fn event_type(&self) -> &'static str {
        self.body.event_type()
    }

    pub fn account_id(&self) -> Uuid {
        self.body.account_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_event_serialization() {
        let event = AccountEvent::MoneyDeposited {
            account_id: Uuid::new_v4(),
            amount: dec!(250.50),
            category: Some("salary".to_string()),
            description: "July payroll".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"MoneyDeposited""#));
        assert!(json.contains(r#""amount":"250.50""#));

        let deserialized: AccountEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, deserialized);
    }

    #[test]
    fn test_currency_wire_value() {
        let json = serde_json::to_string(&Currency::NOK).unwrap();
        assert_eq!(json, r#""NOK""#);

        let kind = serde_json::to_string(&AccountKind::Savings).unwrap();
        assert_eq!(kind, r#""SAVINGS""#);
    }

    #[test]
    fn test_event_type_tags() {
        let event = AccountEvent::AccountCreated {
            account_id: Uuid::new_v4(),
            account_name: "Ops".to_string(),
            currency: Currency::NOK,
            account_type: AccountKind::Checking,
            initial_balance: dec!(10000.00),
        };
        assert_eq!(event.event_type(), "AccountCreated");

        let event = AccountEvent::AccountClosed {
            account_id: Uuid::new_v4(),
            reason: None,
        };
        assert_eq!(event.event_type(), "AccountClosed");
    }

    #[test]
    fn test_envelope_flattens_body() {
        let account_id = Uuid::new_v4();
        let event = DomainEvent::new(AccountEvent::AccountRenamed {
            account_id,
            account_name: "Household".to_string(),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "AccountRenamed");
        assert_eq!(value["account_id"], account_id.to_string());
        assert!(value["metadata"]["event_id"].is_string());

        let back: DomainEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
