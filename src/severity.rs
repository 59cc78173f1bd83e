//! Severity Classifier
//!
//! Maps a non-negative count to one of six ordered severity levels through an
//! immutable legend of inclusive count bands, and resolves the display color
//! for a level.
//!
//! The legend is validated once, at construction: six bands in level order,
//! starting at 0, contiguous (no gaps, no overlaps), with distinct colors. The
//! last band is open-ended whatever its configured maximum. Classification is a
//! pure function of `(count, legend)`.

use anyhow::{Context, Result};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ScoutingError, ScoutingResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeverityLevel {
    Zero,
    Low,
    Moderate,
    High,
    VeryHigh,
    Emergency,
}

impl SeverityLevel {
    /// All levels in ascending order
    pub const ALL: [SeverityLevel; 6] = [
        SeverityLevel::Zero,
        SeverityLevel::Low,
        SeverityLevel::Moderate,
        SeverityLevel::High,
        SeverityLevel::VeryHigh,
        SeverityLevel::Emergency,
    ];

    /// 0 (ZERO) through 5 (EMERGENCY)
    pub fn ordinal(&self) -> u8 {
        *self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Levels counted as hotspots in heatmap statistics
    pub fn is_hotspot(&self) -> bool {
        matches!(self, SeverityLevel::VeryHigh | SeverityLevel::Emergency)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SeverityLevel::Zero => "None",
            SeverityLevel::Low => "Low",
            SeverityLevel::Moderate => "Moderate",
            SeverityLevel::High => "High",
            SeverityLevel::VeryHigh => "Very High",
            SeverityLevel::Emergency => "Emergency",
        }
    }
}

/// One band of the legend: `[minInclusive, maxInclusive] → color`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegendBand {
    pub level: SeverityLevel,
    pub min_inclusive: u64,
    /// `None` means unbounded (only meaningful on the last band)
    #[serde(default)]
    pub max_inclusive: Option<u64>,
    pub color_hex: String,
    #[serde(default)]
    pub label: String,
}

/// Validated, ordered severity legend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<LegendBand>", into = "Vec<LegendBand>")]
pub struct SeverityLegend {
    bands: Vec<LegendBand>,
}

/// Reference thresholds: ZERO=[0,0] LOW=[1,5] MODERATE=[6,10] HIGH=[11,20]
/// VERY_HIGH=[21,30] EMERGENCY=[31,∞)
const REFERENCE_BANDS: [(SeverityLevel, u64, Option<u64>, &str); 6] = [
    (SeverityLevel::Zero, 0, Some(0), "#4CAF50"),
    (SeverityLevel::Low, 1, Some(5), "#CDDC39"),
    (SeverityLevel::Moderate, 6, Some(10), "#FFEB3B"),
    (SeverityLevel::High, 11, Some(20), "#FF9800"),
    (SeverityLevel::VeryHigh, 21, Some(30), "#F44336"),
    (SeverityLevel::Emergency, 31, None, "#B71C1C"),
];

impl Default for SeverityLegend {
    fn default() -> Self {
        let bands = REFERENCE_BANDS
            .iter()
            .map(|&(level, min, max, color)| LegendBand {
                level,
                min_inclusive: min,
                max_inclusive: max,
                color_hex: color.to_string(),
                label: level.label().to_string(),
            })
            .collect();
        Self { bands }
    }
}

impl SeverityLegend {
    /// Validate and build a legend
    pub fn new(mut bands: Vec<LegendBand>) -> ScoutingResult<Self> {
        if bands.len() != SeverityLevel::ALL.len() {
            return Err(ScoutingError::InvalidLegend(format!(
                "expected {} bands, got {}",
                SeverityLevel::ALL.len(),
                bands.len()
            )));
        }

        let mut colors: FxHashSet<String> = FxHashSet::default();
        let mut next_min: u64 = 0;
        let last = bands.len() - 1;

        for (idx, band) in bands.iter_mut().enumerate() {
            let expected_level = SeverityLevel::ALL[idx];
            if band.level != expected_level {
                return Err(ScoutingError::InvalidLegend(format!(
                    "band {} must be {:?}, found {:?}",
                    idx, expected_level, band.level
                )));
            }

            if band.min_inclusive != next_min {
                let kind = if band.min_inclusive > next_min { "gap" } else { "overlap" };
                return Err(ScoutingError::InvalidLegend(format!(
                    "{} before {:?}: expected min {}, found {}",
                    kind, band.level, next_min, band.min_inclusive
                )));
            }

            if !is_hex_color(&band.color_hex) {
                return Err(ScoutingError::InvalidLegend(format!(
                    "{:?} has malformed color '{}'",
                    band.level, band.color_hex
                )));
            }
            if !colors.insert(canonical_color(&band.color_hex)) {
                return Err(ScoutingError::InvalidLegend(format!(
                    "color {} is used by more than one level",
                    band.color_hex
                )));
            }

            if band.label.trim().is_empty() {
                band.label = band.level.label().to_string();
            }

            if idx == last {
                band.max_inclusive = None;
                break;
            }

            let max = band.max_inclusive.ok_or_else(|| {
                ScoutingError::InvalidLegend(format!("{:?} is unbounded but is not the last band", band.level))
            })?;
            if max < band.min_inclusive {
                return Err(ScoutingError::InvalidLegend(format!(
                    "{:?} has max {} below min {}",
                    band.level, max, band.min_inclusive
                )));
            }
            next_min = max.checked_add(1).ok_or_else(|| {
                ScoutingError::InvalidLegend(format!("{:?} leaves no room for higher bands", band.level))
            })?;
        }

        Ok(Self { bands })
    }

    /// Load a legend from a JSON array of bands
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read severity legend: {:?}", path))?;

        let bands: Vec<LegendBand> = serde_json::from_str(&contents)
            .with_context(|| "Failed to parse severity legend JSON")?;

        let legend = Self::new(bands).map_err(|err| {
            tracing::error!("Rejected severity legend {:?}: {}", path, err);
            err
        })?;

        tracing::info!("Loaded severity legend from {:?}", path);
        Ok(legend)
    }

    pub fn bands(&self) -> &[LegendBand] {
        &self.bands
    }

    /// First band (ascending) containing `count`
    pub fn classify(&self, count: u64) -> SeverityLevel {
        self.bands
            .iter()
            .find(|band| {
                count >= band.min_inclusive && band.max_inclusive.map_or(true, |max| count <= max)
            })
            .map(|band| band.level)
            // Validated bands cover [0, ∞)
            .unwrap_or(SeverityLevel::Emergency)
    }

    pub fn color_of(&self, level: SeverityLevel) -> &str {
        &self.bands[level.ordinal() as usize].color_hex
    }
}

impl TryFrom<Vec<LegendBand>> for SeverityLegend {
    type Error = ScoutingError;

    fn try_from(bands: Vec<LegendBand>) -> ScoutingResult<Self> {
        Self::new(bands)
    }
}

impl From<SeverityLegend> for Vec<LegendBand> {
    fn from(legend: SeverityLegend) -> Self {
        legend.bands
    }
}

fn is_hex_color(value: &str) -> bool {
    match value.strip_prefix('#') {
        Some(hex) => (hex.len() == 6 || hex.len() == 3) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// `#rgb` / `#rrggbb` as upper-case `#RRGGBB`
fn canonical_color(value: &str) -> String {
    let hex = value.trim_start_matches('#').to_ascii_uppercase();
    if hex.len() == 3 {
        let expanded: String = hex.chars().flat_map(|c| [c, c]).collect();
        format!("#{}", expanded)
    } else {
        format!("#{}", hex)
    }
}
