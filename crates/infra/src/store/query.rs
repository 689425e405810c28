//! Movement query interface: filters, sort order and pagination.
//!
//! Page parameters are clamped rather than rejected: a negative page becomes `0`, a
//! non-positive size becomes the default, and an oversized request is capped.

use core::cmp::Ordering;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ColorId, DomainError, ProductId, SizeId, StockRecordId};
use stockledger_inventory::{Availability, MovementEntry, MovementKind, StockRecord};

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Column a movement page is ordered by. Ties always break by id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementSortField {
    Timestamp,
    Quantity,
    Kind,
    Id,
}

impl FromStr for MovementSortField {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamp" | "recorded_at" | "recordedat" | "date" => Ok(Self::Timestamp),
            "quantity" => Ok(Self::Quantity),
            "kind" | "type" => Ok(Self::Kind),
            "id" => Ok(Self::Id),
            other => Err(DomainError::validation(format!(
                "unsupported sort field: {other}"
            ))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Ascending only for a case-insensitive `"asc"`; anything else sorts descending.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// Page parameters for movement listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Zero-based page index.
    pub page: i64,
    pub size: i64,
    pub sort_by: MovementSortField,
    pub direction: SortDirection,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
            sort_by: MovementSortField::Timestamp,
            direction: SortDirection::Desc,
        }
    }
}

impl PageRequest {
    /// Newest first, clamped with the default limits.
    pub fn new(page: i64, size: i64) -> Self {
        Self {
            page,
            size,
            ..Self::default()
        }
        .clamped(DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    pub fn sorted(mut self, sort_by: MovementSortField, direction: SortDirection) -> Self {
        self.sort_by = sort_by;
        self.direction = direction;
        self
    }

    /// Build from raw query parameters. Only an unknown sort field is an error.
    pub fn from_params(
        page: Option<i64>,
        size: Option<i64>,
        sort_by: Option<&str>,
        direction: Option<&str>,
    ) -> Result<Self, DomainError> {
        let sort_by = match sort_by {
            Some(field) if !field.trim().is_empty() => field.parse()?,
            _ => MovementSortField::Timestamp,
        };
        Ok(Self::new(page.unwrap_or(0), size.unwrap_or(DEFAULT_PAGE_SIZE))
            .sorted(sort_by, SortDirection::parse_lenient(direction)))
    }

    pub fn clamped(mut self, default_size: i64, max_size: i64) -> Self {
        if self.page < 0 {
            self.page = 0;
        }
        if self.size <= 0 {
            self.size = default_size;
        }
        if self.size > max_size {
            self.size = max_size;
        }
        self
    }

    pub fn offset(&self) -> i64 {
        self.page.saturating_mul(self.size)
    }

    /// Total order used for listings; identical rows never compare equal because of the
    /// id tiebreak.
    pub fn compare(&self, a: &MovementEntry, b: &MovementEntry) -> Ordering {
        let primary = match self.sort_by {
            MovementSortField::Timestamp => a.recorded_at.cmp(&b.recorded_at),
            MovementSortField::Quantity => a.quantity.cmp(&b.quantity),
            MovementSortField::Kind => a.kind.as_str().cmp(b.kind.as_str()),
            MovementSortField::Id => Ordering::Equal,
        };
        self.direction.apply(primary.then_with(|| a.id.cmp(&b.id)))
    }
}

/// One page of results plus totals across all pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total_elements: u64,
    pub total_pages: u64,
    pub last: bool,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        let size = request.size.max(1) as u64;
        let total_pages = total_elements.div_ceil(size);
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages,
            last: (request.page as u64).saturating_add(1) >= total_pages,
        }
    }

    /// Cut one page out of an already sorted, fully materialized result set.
    pub fn slice(all: Vec<T>, request: &PageRequest) -> Self {
        let total = all.len() as u64;
        let content = all
            .into_iter()
            .skip(request.offset().max(0) as usize)
            .take(request.size.max(0) as usize)
            .collect();
        Self::new(content, request, total)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            last: self.last,
        }
    }
}

/// Dashboard counts over every stock record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockSummary {
    pub records: u64,
    pub depleted: u64,
    /// Non-empty records at or below the threshold.
    pub low_stock: u64,
    pub total_units: i64,
}

impl StockSummary {
    pub fn tally<'a>(
        records: impl IntoIterator<Item = &'a StockRecord>,
        low_stock_threshold: i64,
    ) -> Self {
        let mut summary = Self::default();
        for record in records {
            summary.records += 1;
            summary.total_units += record.quantity;
            match record.availability(low_stock_threshold) {
                Availability::Depleted => summary.depleted += 1,
                Availability::LowStock => summary.low_stock += 1,
                Availability::Available => {}
            }
        }
        summary
    }
}

/// Filter criteria for movement listings. Every field is optional and they combine
/// with AND.
///
/// Product/color/size match against the entry's source record; entries whose source
/// record has been deleted never match those three criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub stock_record_id: Option<StockRecordId>,
    pub product_id: Option<ProductId>,
    pub color_id: Option<ColorId>,
    pub size_id: Option<SizeId>,
    pub kind: Option<MovementKind>,
    /// Inclusive lower bound on `recorded_at`.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `recorded_at`.
    pub to: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn for_record(id: StockRecordId) -> Self {
        Self {
            stock_record_id: Some(id),
            ..Self::default()
        }
    }

    pub fn needs_source_record(&self) -> bool {
        self.product_id.is_some() || self.color_id.is_some() || self.size_id.is_some()
    }

    pub fn matches(&self, entry: &MovementEntry, source: Option<&StockRecord>) -> bool {
        if self.stock_record_id.is_some_and(|id| entry.source_record_id != id) {
            return false;
        }
        if self.kind.is_some_and(|k| entry.kind != k) {
            return false;
        }
        if self.from.is_some_and(|from| entry.recorded_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.recorded_at > to) {
            return false;
        }
        if self.needs_source_record() {
            let Some(record) = source else {
                return false;
            };
            if self.product_id.is_some_and(|p| record.variant.product_id != p)
                || self.color_id.is_some_and(|c| record.variant.color_id != c)
                || self.size_id.is_some_and(|s| record.variant.size_id != s)
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::MovementId;

    fn entry(id: i64, quantity: i64, minutes: i64) -> MovementEntry {
        let at = DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
            + chrono::Duration::minutes(minutes);
        MovementEntry {
            id: MovementId::new(id),
            source_record_id: StockRecordId::new(1),
            destination_record_id: None,
            quantity,
            kind: MovementKind::Inbound,
            sale_id: None,
            reference: String::new(),
            description: String::new(),
            acting_user: "ops".into(),
            recorded_at: at,
        }
    }

    #[test]
    fn clamps_out_of_range_parameters() {
        let req = PageRequest::new(-3, 0);
        assert_eq!((req.page, req.size), (0, DEFAULT_PAGE_SIZE));
        let req = PageRequest::new(2, 500);
        assert_eq!((req.page, req.size), (2, MAX_PAGE_SIZE));
    }

    #[test]
    fn direction_is_descending_unless_asc() {
        assert_eq!(SortDirection::parse_lenient(Some("ASC")), SortDirection::Asc);
        assert_eq!(SortDirection::parse_lenient(Some("up")), SortDirection::Desc);
        assert_eq!(SortDirection::parse_lenient(None), SortDirection::Desc);
    }

    #[test]
    fn unknown_sort_field_is_validation() {
        let err = PageRequest::from_params(None, None, Some("colour"), None).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn ties_break_by_id() {
        let req = PageRequest::new(0, 10).sorted(MovementSortField::Quantity, SortDirection::Asc);
        let mut entries = vec![entry(3, 5, 0), entry(1, 5, 0), entry(2, 1, 0)];
        entries.sort_by(|a, b| req.compare(a, b));
        let ids: Vec<i64> = entries.iter().map(|e| e.id.get()).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn slices_pages_and_reports_totals() {
        let req = PageRequest::new(1, 2);
        let page = Page::slice(vec![1, 2, 3, 4, 5], &req);
        assert_eq!(page.content, vec![3, 4]);
        assert_eq!(page.total_elements, 5);
        assert_eq!(page.total_pages, 3);
        assert!(!page.last);

        let last = Page::slice(vec![1, 2, 3, 4, 5], &PageRequest::new(2, 2));
        assert_eq!(last.content, vec![5]);
        assert!(last.last);
    }

    #[test]
    fn empty_result_is_a_last_page() {
        let page: Page<i32> = Page::slice(vec![], &PageRequest::default());
        assert_eq!(page.total_pages, 0);
        assert!(page.last);
    }

    #[test]
    fn time_window_is_inclusive() {
        let e = entry(1, 1, 30);
        let filter = MovementFilter {
            from: Some(e.recorded_at),
            to: Some(e.recorded_at),
            ..MovementFilter::default()
        };
        assert!(filter.matches(&e, None));
    }

    #[test]
    fn variant_criteria_need_a_source_record() {
        let filter = MovementFilter {
            product_id: Some(ProductId::new(1)),
            ..MovementFilter::default()
        };
        assert!(!filter.matches(&entry(1, 1, 0), None));
    }

    #[test]
    fn tally_counts_each_availability() {
        use stockledger_core::{ColorId, SizeId, WarehouseId};
        use stockledger_inventory::Variant;

        let at = Utc::now();
        let records: Vec<StockRecord> = [0, 3, 4, 9]
            .into_iter()
            .enumerate()
            .map(|(i, quantity)| StockRecord {
                id: StockRecordId::new(i as i64 + 1),
                variant: Variant::new(ProductId::new(1), ColorId::new(1), SizeId::new(1)),
                warehouse_id: WarehouseId::new(i as i64 + 1),
                quantity,
                lot_serial: format!("LOT-{i}"),
                created_at: at,
                updated_at: at,
            })
            .collect();

        assert_eq!(
            StockSummary::tally(&records, 4),
            StockSummary {
                records: 4,
                depleted: 1,
                low_stock: 2,
                total_units: 16,
            }
        );
    }
}
