use std::ops::RangeInclusive;

use chrono::NaiveDate;
use hashbrown::HashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

pub const BOOKS: &[&str] = &["EMEA_RATES", "US_RATES", "ASIA_RATES", "EMEA_FX", "US_FX"];
pub const INSTRUMENTS: &[&str] = &["EUR_IRS_10Y", "USD_IRS_5Y", "GBP_IRS_7Y", "JPY_IRS_3Y"];
pub const TRADERS: &[&str] = &["john.smith", "jane.doe", "bob.wilson", "alice.johnson"];
pub const COUNTERPARTIES: &[&str] = &["BANK_ABC", "BANK_XYZ", "BANK_123", "BROKER_A"];
pub const STATUSES: &[&str] = &["ACTIVE", "PENDING", "SETTLED", "CANCELLED"];

pub const CURRENCY: &str = "USD";
pub const TRADE_TYPE: &str = "IRS";

/// Number of filler entries in [`TradeRecord::additional_fields`].
pub const FILLER_FIELDS: usize = 380;

const MAX_AGE_DAYS: i64 = 365;
const MTM_FACTOR: f64 = 1.05;

/// The document id, and therefore the upsert key, for the trade at `index`.
/// Indices past 999999 simply grow wider.
pub fn trade_id(index: u64) -> String {
    format!("TRD{:06}", index)
}

/// One synthetic trade, serialized with the blotter's camelCase field names.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub trade_id: String,
    pub book: &'static str,
    pub trade_date: NaiveDate,
    pub instrument: &'static str,
    pub trader: &'static str,
    pub counterparty: &'static str,
    pub notional: u64,
    pub pnl: f64,
    pub mtm: f64,
    pub currency: &'static str,
    pub trade_type: &'static str,
    pub status: &'static str,
    pub settlement_date: NaiveDate,
    pub maturity_date: NaiveDate,
    pub fixed_rate: f64,
    pub floating_rate: f64,
    pub delta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub theta: f64,
    pub additional_fields: HashMap<String, String>,
}

/// Fabricates [`TradeRecord`]s. The random source and the reference date are injected so a
/// seeded generator always produces the same trades.
pub struct TradeGenerator<R> {
    rng: R,
    today: NaiveDate,
}

impl TradeGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy(), chrono::Local::now().date_naive())
    }

    pub fn seeded(seed: u64, today: NaiveDate) -> Self {
        Self::new(StdRng::seed_from_u64(seed), today)
    }
}

impl<R: Rng> TradeGenerator<R> {
    pub fn new(rng: R, today: NaiveDate) -> Self {
        Self { rng, today }
    }

    pub fn generate(&mut self, index: u64) -> TradeRecord {
        let days_ago = self.rng.gen_range(0..=MAX_AGE_DAYS);
        let trade_date = self.today - chrono::Duration::days(days_ago);

        // mtm is derived from the unrounded pnl and only rounded afterwards.
        let pnl = self.rng.gen_range(-100_000.0..100_000.0);

        TradeRecord {
            trade_id: trade_id(index),
            book: self.pick(BOOKS),
            trade_date,
            instrument: self.pick(INSTRUMENTS),
            trader: self.pick(TRADERS),
            counterparty: self.pick(COUNTERPARTIES),
            notional: self.rng.gen_range(1_000_000..=10_000_000),
            pnl: round2(pnl),
            mtm: round2(pnl * MTM_FACTOR),
            currency: CURRENCY,
            trade_type: TRADE_TYPE,
            status: self.pick(STATUSES),
            settlement_date: trade_date,
            maturity_date: trade_date,
            fixed_rate: self.uniform(1.5, 4.5),
            floating_rate: self.uniform(1.5, 4.5),
            delta: self.uniform(-1000.0, 1000.0),
            gamma: self.uniform(-50.0, 50.0),
            vega: self.uniform(-500.0, 500.0),
            theta: self.uniform(-25.0, 25.0),
            additional_fields: self.filler(),
        }
    }

    pub fn generate_batch(&mut self, indices: RangeInclusive<u64>) -> Vec<TradeRecord> {
        indices.map(|index| self.generate(index)).collect()
    }

    fn pick(&mut self, options: &[&'static str]) -> &'static str {
        options[self.rng.gen_range(0..options.len())]
    }

    fn uniform(&mut self, low: f64, high: f64) -> f64 {
        round2(self.rng.gen_range(low..=high))
    }

    fn filler(&mut self) -> HashMap<String, String> {
        (1..=FILLER_FIELDS)
            .map(|i| {
                let value = self.rng.gen_range(0..=1000);
                (format!("field{}", i), format!("value_{}", value))
            })
            .collect()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
