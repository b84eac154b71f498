//! The closed set of shapes a widget can be fed.

use crate::ProcessEntry;

/// One coloured slice of a stacked bar or pie.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    /// Fraction of the whole, `0.0..=1.0`.
    pub value: f64,
    /// Colour key understood by the renderer (e.g. `"secondBlue"`).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub color: Option<String>,
}

impl Segment {
    /// A segment that uses the renderer's default colour.
    pub fn new(value: f64) -> Self {
        Self { value, color: None }
    }

    /// A segment with an explicit colour key.
    pub fn colored(value: f64, color: impl Into<String>) -> Self {
        Self {
            value,
            color: Some(color.into()),
        }
    }
}

/// A value pushed from a reader's handler into widgets.
///
/// Widgets match on the variant instead of inspecting runtime types; a widget
/// that does not understand a variant ignores it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MetricPayload {
    /// A single ratio, `0.0..=1.0`.
    Percentage(f64),
    /// Several independent ratios, e.g. one per core.
    Series(Vec<f64>),
    /// Parts of one whole, e.g. app / wired / compressed memory.
    Segments(Vec<Segment>),
    /// Upload and download rates in bytes per second.
    UpDown { upload: u64, download: u64 },
    /// Used and free amounts in bytes.
    UsedFree { used: u64, free: u64 },
    /// Preformatted text.
    Text(String),
    /// Top processes, shown in popups only.
    Processes(Vec<ProcessEntry>),
}

impl MetricPayload {
    /// Short name of the variant, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            MetricPayload::Percentage(_) => "percentage",
            MetricPayload::Series(_) => "series",
            MetricPayload::Segments(_) => "segments",
            MetricPayload::UpDown { .. } => "up_down",
            MetricPayload::UsedFree { .. } => "used_free",
            MetricPayload::Text(_) => "text",
            MetricPayload::Processes(_) => "processes",
        }
    }

    /// The headline ratio, when the payload has one.
    ///
    /// For series the maximum is used; for segments the sum.
    pub fn headline(&self) -> Option<f64> {
        match self {
            MetricPayload::Percentage(v) => Some(*v),
            MetricPayload::Series(values) => values.iter().copied().reduce(f64::max),
            MetricPayload::Segments(segments) => Some(segments.iter().map(|s| s.value).sum()),
            MetricPayload::UsedFree { used, free } => {
                let total = used + free;
                (total > 0).then(|| *used as f64 / total as f64)
            }
            MetricPayload::UpDown { .. }
            | MetricPayload::Text(_)
            | MetricPayload::Processes(_) => None,
        }
    }
}
