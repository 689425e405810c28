//! Document numbering derived from what was issued before ("max + 1").
//!
//! Not protected against concurrent readers: two callers that read the same maximum
//! compute the same next number. Uniqueness is the document store's concern.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::SequenceError;

/// Largest correlative of a series; a series holding it is full.
pub const MAX_CORRELATIVE: &str = "99999999";

const NUMBER_WIDTH: usize = 8;
const SALE_WIDTH: usize = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentKind {
    Factura,
    Boleta,
    NotaVenta,
    Ticket,
}

impl DocumentKind {
    pub fn default_series(&self) -> &'static str {
        match self {
            DocumentKind::Factura => "F001",
            DocumentKind::Boleta => "B001",
            DocumentKind::NotaVenta => "NV01",
            DocumentKind::Ticket => "T001",
        }
    }
}

/// Read side of the issued documents and sales.
#[async_trait]
pub trait DocumentNumberSource: Send + Sync {
    /// Highest number issued for a (kind, series) pair, compared as text.
    async fn max_number(
        &self,
        kind: DocumentKind,
        series: &str,
    ) -> Result<Option<String>, SequenceError>;

    /// Highest sale number starting with `prefix`, compared as text.
    async fn latest_sale_number(&self, prefix: &str) -> Result<Option<String>, SequenceError>;
}

/// Series that follows `series`: the alphabetic prefix is kept and the numeric part is
/// incremented at its width (`F001` -> `F002`, `NV01` -> `NV02`).
pub fn next_series(series: &str) -> Result<String, SequenceError> {
    let split = series
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| SequenceError::Storage(format!("series without a number: {series}")))?;
    let (prefix, digits) = series.split_at(split);
    let value: u32 = digits
        .parse()
        .map_err(|_| SequenceError::Storage(format!("malformed series: {series}")))?;
    let next = value
        .checked_add(1)
        .ok_or_else(|| SequenceError::Exhausted(series.to_string()))?;
    Ok(format!("{prefix}{next:0width$}", width = digits.len().max(1)))
}

fn increment_or_restart(last: Option<&str>) -> u64 {
    match last {
        None => 1,
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(value) => value.saturating_add(1),
            Err(e) => {
                tracing::error!(last = raw, error = %e, "unparsable correlative; restarting at 1");
                1
            }
        },
    }
}

pub struct DocumentNumbering<S> {
    source: S,
}

impl<S> DocumentNumbering<S>
where
    S: DocumentNumberSource,
{
    pub fn new(source: S) -> Self {
        Self { source }
    }

    /// The requested series (or the kind's default), rolled over when it is full.
    pub async fn resolve_series(
        &self,
        kind: DocumentKind,
        requested: Option<&str>,
    ) -> Result<String, SequenceError> {
        let series = match requested.map(str::trim) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => kind.default_series().to_string(),
        };
        match self.source.max_number(kind, &series).await? {
            Some(max) if max == MAX_CORRELATIVE => {
                let next = next_series(&series)?;
                tracing::info!(from = %series, to = %next, "series full; rolling over");
                Ok(next)
            }
            _ => Ok(series),
        }
    }

    /// Eight-digit zero-padded number after the highest one issued in the series.
    pub async fn next_number(
        &self,
        kind: DocumentKind,
        series: &str,
    ) -> Result<String, SequenceError> {
        let max = self.source.max_number(kind, series).await?;
        let next = increment_or_restart(max.as_deref());
        Ok(format!("{next:0width$}", width = NUMBER_WIDTH))
    }

    /// `V-<yyyyMMdd>-<n:04>` after the latest sale number of that day.
    pub async fn next_sale_number(&self, date: NaiveDate) -> Result<String, SequenceError> {
        let prefix = format!("V-{}-", date.format("%Y%m%d"));
        let latest = self.source.latest_sale_number(&prefix).await?;
        let suffix = latest
            .as_deref()
            .map(|n| n.rsplit('-').next().unwrap_or(n));
        let next = increment_or_restart(suffix);
        Ok(format!("{prefix}{next:0width$}", width = SALE_WIDTH))
    }
}

/// In-memory log of issued document and sale numbers.
#[derive(Debug, Default)]
pub struct InMemoryDocumentNumbers {
    documents: RwLock<Vec<(DocumentKind, String, String)>>,
    sales: RwLock<Vec<String>>,
}

impl InMemoryDocumentNumbers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_document(
        &self,
        kind: DocumentKind,
        series: &str,
        number: &str,
    ) -> Result<(), SequenceError> {
        self.documents
            .write()
            .map_err(|_| SequenceError::LockPoisoned)?
            .push((kind, series.to_string(), number.to_string()));
        Ok(())
    }

    pub fn record_sale(&self, number: &str) -> Result<(), SequenceError> {
        self.sales
            .write()
            .map_err(|_| SequenceError::LockPoisoned)?
            .push(number.to_string());
        Ok(())
    }
}

#[async_trait]
impl DocumentNumberSource for InMemoryDocumentNumbers {
    async fn max_number(
        &self,
        kind: DocumentKind,
        series: &str,
    ) -> Result<Option<String>, SequenceError> {
        let documents = self
            .documents
            .read()
            .map_err(|_| SequenceError::LockPoisoned)?;
        Ok(documents
            .iter()
            .filter(|(k, s, _)| *k == kind && s == series)
            .map(|(_, _, n)| n)
            .max()
            .cloned())
    }

    async fn latest_sale_number(&self, prefix: &str) -> Result<Option<String>, SequenceError> {
        let sales = self.sales.read().map_err(|_| SequenceError::LockPoisoned)?;
        Ok(sales
            .iter()
            .filter(|n| n.starts_with(prefix))
            .max()
            .cloned())
    }
}

#[async_trait]
impl<S> DocumentNumberSource for std::sync::Arc<S>
where
    S: DocumentNumberSource + ?Sized,
{
    async fn max_number(
        &self,
        kind: DocumentKind,
        series: &str,
    ) -> Result<Option<String>, SequenceError> {
        (**self).max_number(kind, series).await
    }

    async fn latest_sale_number(&self, prefix: &str) -> Result<Option<String>, SequenceError> {
        (**self).latest_sale_number(prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn numbering() -> (DocumentNumbering<Arc<InMemoryDocumentNumbers>>, Arc<InMemoryDocumentNumbers>) {
        let issued = Arc::new(InMemoryDocumentNumbers::new());
        (DocumentNumbering::new(issued.clone()), issued)
    }

    #[test]
    fn default_series_per_kind() {
        assert_eq!(DocumentKind::Factura.default_series(), "F001");
        assert_eq!(DocumentKind::Boleta.default_series(), "B001");
        assert_eq!(DocumentKind::NotaVenta.default_series(), "NV01");
        assert_eq!(DocumentKind::Ticket.default_series(), "T001");
    }

    #[test]
    fn next_series_keeps_prefix_and_width() {
        assert_eq!(next_series("F001").unwrap(), "F002");
        assert_eq!(next_series("B999").unwrap(), "B1000");
        assert_eq!(next_series("NV01").unwrap(), "NV02");
    }

    #[tokio::test]
    async fn first_number_of_a_series_is_one() {
        let (numbering, _) = numbering();
        assert_eq!(
            numbering.next_number(DocumentKind::Factura, "F001").await.unwrap(),
            "00000001"
        );
    }

    #[tokio::test]
    async fn increments_the_highest_issued_number() {
        let (numbering, issued) = numbering();
        issued.record_document(DocumentKind::Boleta, "B001", "00000007").unwrap();
        issued.record_document(DocumentKind::Boleta, "B001", "00000012").unwrap();
        issued.record_document(DocumentKind::Factura, "B001", "00000099").unwrap();
        assert_eq!(
            numbering.next_number(DocumentKind::Boleta, "B001").await.unwrap(),
            "00000013"
        );
    }

    #[tokio::test]
    async fn unparsable_maximum_restarts_at_one() {
        let (numbering, issued) = numbering();
        issued.record_document(DocumentKind::Ticket, "T001", "ABC").unwrap();
        assert_eq!(
            numbering.next_number(DocumentKind::Ticket, "T001").await.unwrap(),
            "00000001"
        );
    }

    #[tokio::test]
    async fn full_series_rolls_over() {
        let (numbering, issued) = numbering();
        issued
            .record_document(DocumentKind::Factura, "F001", MAX_CORRELATIVE)
            .unwrap();
        assert_eq!(
            numbering.resolve_series(DocumentKind::Factura, None).await.unwrap(),
            "F002"
        );
        assert_eq!(
            numbering
                .resolve_series(DocumentKind::Factura, Some("F007"))
                .await
                .unwrap(),
            "F007"
        );
    }

    #[tokio::test]
    async fn sale_numbers_follow_the_latest_of_the_day() {
        let (numbering, issued) = numbering();
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(numbering.next_sale_number(day).await.unwrap(), "V-20240501-0001");

        issued.record_sale("V-20240501-0001").unwrap();
        issued.record_sale("V-20240501-0002").unwrap();
        issued.record_sale("V-20240430-0009").unwrap();
        assert_eq!(numbering.next_sale_number(day).await.unwrap(), "V-20240501-0003");
    }

    #[tokio::test]
    async fn concurrent_readers_can_obtain_the_same_number() {
        let (numbering, issued) = numbering();
        issued.record_document(DocumentKind::Boleta, "B001", "00000004").unwrap();
        let first = numbering.next_number(DocumentKind::Boleta, "B001").await.unwrap();
        let second = numbering.next_number(DocumentKind::Boleta, "B001").await.unwrap();
        assert_eq!(first, second);
    }
}
