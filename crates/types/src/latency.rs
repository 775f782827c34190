//! Link impairment parameters carried by `delay` disaster steps.
//!
//! Scenario files are hand written, so every field is optional and a value of
//! the wrong type (a bool, a string, a nested map) silently falls back to the
//! documented default instead of rejecting the whole playbook.

use core::fmt;

use serde::{
    Deserialize, Deserializer, Serialize,
    de::IgnoredAny,
};

/// Added one-way latency when `delayMs` is missing.
pub const DEFAULT_DELAY_MS: f64 = 1.0;
/// Packet loss rate (percent) when `lossPct` is missing.
pub const DEFAULT_LOSS_PCT: f64 = 0.1;
/// Packet duplication rate (percent) when `duplicatePct` is missing.
pub const DEFAULT_DUPLICATE_PCT: f64 = 0.1;
/// Packet reorder rate (percent) when `reorderPct` is missing.
pub const DEFAULT_REORDER_PCT: f64 = 0.1;
/// Packet corruption rate (percent) when `corruptPct` is missing.
pub const DEFAULT_CORRUPT_PCT: f64 = 0.1;

/// Netem-style impairment applied to a node's outgoing traffic.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawLatencyMeta")]
pub struct LatencyMeta {
    pub delay_ms: f64,
    pub loss_pct: f64,
    pub duplicate_pct: f64,
    pub reorder_pct: f64,
    pub corrupt_pct: f64,
}

impl Default for LatencyMeta {
    fn default() -> Self {
        Self {
            delay_ms: DEFAULT_DELAY_MS,
            loss_pct: DEFAULT_LOSS_PCT,
            duplicate_pct: DEFAULT_DUPLICATE_PCT,
            reorder_pct: DEFAULT_REORDER_PCT,
            corrupt_pct: DEFAULT_CORRUPT_PCT,
        }
    }
}

impl LatencyMeta {
    pub fn with_delay_ms(mut self, delay_ms: f64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

impl fmt::Display for LatencyMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delay={}ms loss={}% duplicate={}% reorder={}% corrupt={}%",
            self.delay_ms, self.loss_pct, self.duplicate_pct, self.reorder_pct, self.corrupt_pct
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLatencyMeta {
    #[serde(default, deserialize_with = "lenient_number")]
    delay_ms: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    loss_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    duplicate_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    reorder_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    corrupt_pct: Option<f64>,
}

impl From<RawLatencyMeta> for LatencyMeta {
    fn from(raw: RawLatencyMeta) -> Self {
        Self {
            delay_ms: raw.delay_ms.unwrap_or(DEFAULT_DELAY_MS),
            loss_pct: raw.loss_pct.unwrap_or(DEFAULT_LOSS_PCT),
            duplicate_pct: raw.duplicate_pct.unwrap_or(DEFAULT_DUPLICATE_PCT),
            reorder_pct: raw.reorder_pct.unwrap_or(DEFAULT_REORDER_PCT),
            corrupt_pct: raw.corrupt_pct.unwrap_or(DEFAULT_CORRUPT_PCT),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(f64),
    Other(IgnoredAny),
}

/// Accepts any non-negative finite number; everything else maps to `None`.
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Number(v)) if v.is_finite() && v >= 0.0 => Some(v),
        Some(Lenient::Number(_)) | Some(Lenient::Other(_)) | None => None,
    })
}
