use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, Entity, MovementId, SaleId, StockRecordId};

/// Closed set of movement kinds recorded in the ledger.
///
/// Serialized with the ledger's historical tags (`ENTRADA`, `SALIDA`, `AJUSTE`,
/// `TRASLADO`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    /// Stock enters a record.
    #[serde(rename = "ENTRADA")]
    Inbound,
    /// Stock leaves a record.
    #[serde(rename = "SALIDA")]
    Outbound,
    /// Quantity is set to an absolute value.
    #[serde(rename = "AJUSTE")]
    Adjustment,
    /// Stock moves from one record to another (source side of the pair).
    #[serde(rename = "TRASLADO")]
    Transfer,
}

impl MovementKind {
    pub const ALL: [MovementKind; 4] = [
        MovementKind::Inbound,
        MovementKind::Outbound,
        MovementKind::Adjustment,
        MovementKind::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Inbound => "ENTRADA",
            MovementKind::Outbound => "SALIDA",
            MovementKind::Adjustment => "AJUSTE",
            MovementKind::Transfer => "TRASLADO",
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim();
        MovementKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| DomainError::UnknownMovementKind(tag.to_string()))
    }
}

/// Non-owning reference to a sale held by the sale/document integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleRef {
    pub id: SaleId,
    /// Human-facing correlative (e.g. `V-20240501-0003`).
    pub number: String,
}

impl SaleRef {
    pub fn new(id: SaleId, number: impl Into<String>) -> Self {
        Self {
            id,
            number: number.into(),
        }
    }

    pub fn sale_reference(&self) -> String {
        format!("Sale #{}", self.number)
    }

    pub fn annulment_reference(&self) -> String {
        format!("Annulment of sale #{}", self.number)
    }
}

/// Identity recorded on ledger entries; passed explicitly into every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActingUser(String);

impl ActingUser {
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Use `name` when present and non-blank, otherwise `fallback`.
    pub fn resolve(name: Option<&str>, fallback: &str) -> Self {
        match name.map(str::trim) {
            Some(n) if !n.is_empty() => Self(n.to_string()),
            _ => Self(fallback.to_string()),
        }
    }

    pub fn anonymous() -> Self {
        Self(Self::ANONYMOUS.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ActingUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable ledger entry describing one quantity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementEntry {
    pub id: MovementId,
    pub source_record_id: StockRecordId,
    /// Set only for `Transfer` entries.
    pub destination_record_id: Option<StockRecordId>,
    /// Magnitude; for `Adjustment` the new absolute quantity.
    pub quantity: i64,
    pub kind: MovementKind,
    pub sale_id: Option<SaleId>,
    pub reference: String,
    pub description: String,
    pub acting_user: String,
    pub recorded_at: DateTime<Utc>,
}

impl Entity for MovementEntry {
    type Id = MovementId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

/// A ledger entry not yet appended (the store assigns its id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub source_record_id: StockRecordId,
    pub destination_record_id: Option<StockRecordId>,
    pub quantity: i64,
    pub kind: MovementKind,
    pub sale_id: Option<SaleId>,
    pub reference: String,
    pub description: String,
    pub acting_user: String,
    pub recorded_at: DateTime<Utc>,
}

impl NewMovement {
    pub fn new(
        source_record_id: StockRecordId,
        kind: MovementKind,
        quantity: i64,
        actor: &ActingUser,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source_record_id,
            destination_record_id: None,
            quantity,
            kind,
            sale_id: None,
            reference: String::new(),
            description: String::new(),
            acting_user: actor.as_str().to_string(),
            recorded_at,
        }
    }

    pub fn destination(mut self, record_id: StockRecordId) -> Self {
        self.destination_record_id = Some(record_id);
        self
    }

    pub fn sale(mut self, sale_id: Option<SaleId>) -> Self {
        self.sale_id = sale_id;
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn into_entry(self, id: MovementId) -> MovementEntry {
        MovementEntry {
            id,
            source_record_id: self.source_record_id,
            destination_record_id: self.destination_record_id,
            quantity: self.quantity,
            kind: self.kind,
            sale_id: self.sale_id,
            reference: self.reference,
            description: self.description,
            acting_user: self.acting_user,
            recorded_at: self.recorded_at,
        }
    }
}
