//! Lot serial composition.
//!
//! Format: `<code3>-<brand3>-<color2><size><yyyyMMdd><rand3>`, e.g.
//! `POL-NIK-ROM20240501K7Q`. Missing parts fall back to `PRD-`, `MAR-`, `X` and `00`.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::collaborators::VariantLabels;

pub const SERIAL_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const DEFAULT_SERIAL_ATTEMPTS: u32 = 5;

const SUFFIX_LEN: usize = 3;

fn leading_upper(value: Option<&str>, len: usize) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    Some(value.chars().take(len).collect::<String>().to_uppercase())
}

/// Three characters drawn from [`SERIAL_ALPHABET`] using the random tail of a v7 UUID.
pub fn random_suffix() -> String {
    let id = Uuid::now_v7();
    id.as_bytes()[16 - SUFFIX_LEN..]
        .iter()
        .map(|b| SERIAL_ALPHABET[*b as usize % SERIAL_ALPHABET.len()] as char)
        .collect()
}

pub fn compose_lot_serial(labels: Option<&VariantLabels>, date: NaiveDate, suffix: &str) -> String {
    let empty = VariantLabels::default();
    let labels = labels.unwrap_or(&empty);

    let mut serial = String::with_capacity(24);
    match leading_upper(labels.product_code.as_deref(), 3) {
        Some(code) => serial.push_str(&code),
        None => serial.push_str("PRD"),
    }
    serial.push('-');
    match leading_upper(labels.brand.as_deref(), 3) {
        Some(brand) => serial.push_str(&brand),
        None => serial.push_str("MAR"),
    }
    serial.push('-');
    match leading_upper(labels.color_name.as_deref(), 2) {
        Some(color) => serial.push_str(&color),
        None => serial.push('X'),
    }
    match labels.size_label.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(size) => serial.push_str(size),
        None => serial.push_str("00"),
    }
    serial.push_str(&date.format("%Y%m%d").to_string());
    serial.push_str(suffix);
    serial
}

/// Produces candidate serials; the caller checks each against the store and gives up
/// after [`LotSerialGenerator::attempts`] collisions.
#[derive(Debug, Clone, Copy)]
pub struct LotSerialGenerator {
    attempts: u32,
}

impl Default for LotSerialGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SERIAL_ATTEMPTS)
    }
}

impl LotSerialGenerator {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn candidate(&self, labels: Option<&VariantLabels>, date: NaiveDate) -> String {
        compose_lot_serial(labels, date, &random_suffix())
    }
}
