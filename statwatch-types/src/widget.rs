//! Widget kinds and which payloads they render.

use core::fmt;
use core::str::FromStr;

use crate::MetricPayload;

/// The kinds of status-bar widget a module can own.
///
/// The string form is what gets persisted in the comma-separated active widget
/// list of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum WidgetKind {
    Mini,
    LineChart,
    BarChart,
    PieChart,
    NetworkChart,
    Speed,
    Memory,
    Tachometer,
    Label,
}

impl WidgetKind {
    /// Every kind, in declaration order.
    pub const ALL: [WidgetKind; 9] = [
        WidgetKind::Mini,
        WidgetKind::LineChart,
        WidgetKind::BarChart,
        WidgetKind::PieChart,
        WidgetKind::NetworkChart,
        WidgetKind::Speed,
        WidgetKind::Memory,
        WidgetKind::Tachometer,
        WidgetKind::Label,
    ];

    /// Persisted name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Mini => "mini",
            WidgetKind::LineChart => "line_chart",
            WidgetKind::BarChart => "bar_chart",
            WidgetKind::PieChart => "pie_chart",
            WidgetKind::NetworkChart => "network_chart",
            WidgetKind::Speed => "speed",
            WidgetKind::Memory => "memory",
            WidgetKind::Tachometer => "tachometer",
            WidgetKind::Label => "label",
        }
    }

    /// Whether a widget of this kind knows how to draw the payload.
    pub fn accepts(&self, payload: &MetricPayload) -> bool {
        match self {
            WidgetKind::Mini | WidgetKind::LineChart => {
                matches!(payload, MetricPayload::Percentage(_))
            }
            WidgetKind::BarChart => matches!(
                payload,
                MetricPayload::Percentage(_)
                    | MetricPayload::Series(_)
                    | MetricPayload::Segments(_)
            ),
            WidgetKind::PieChart | WidgetKind::Tachometer => {
                matches!(payload, MetricPayload::Segments(_))
            }
            WidgetKind::NetworkChart | WidgetKind::Speed => {
                matches!(payload, MetricPayload::UpDown { .. })
            }
            WidgetKind::Memory => matches!(payload, MetricPayload::UsedFree { .. }),
            WidgetKind::Label => matches!(payload, MetricPayload::Text(_)),
        }
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a persisted widget name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownWidget(pub String);

impl fmt::Display for UnknownWidget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown widget kind: {}", self.0)
    }
}

impl std::error::Error for UnknownWidget {}

impl FromStr for WidgetKind {
    type Err = UnknownWidget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        WidgetKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == trimmed)
            .ok_or_else(|| UnknownWidget(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_kind() {
        for kind in WidgetKind::ALL {
            assert_eq!(kind.as_str().parse::<WidgetKind>(), Ok(kind));
        }
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let err = "sparkline".parse::<WidgetKind>().unwrap_err();
        assert_eq!(err, UnknownWidget("sparkline".to_string()));
    }

    #[test]
    fn parse_trims_whitespace() {
        assert_eq!(" mini ".parse::<WidgetKind>(), Ok(WidgetKind::Mini));
    }

    #[test]
    fn accepts_matches_payload_shape() {
        let ratio = MetricPayload::Percentage(0.5);
        let rates = MetricPayload::UpDown {
            upload: 1,
            download: 1,
        };

        assert!(WidgetKind::Mini.accepts(&ratio));
        assert!(WidgetKind::BarChart.accepts(&ratio));
        assert!(!WidgetKind::Mini.accepts(&rates));
        assert!(WidgetKind::Speed.accepts(&rates));
        assert!(!WidgetKind::Memory.accepts(&ratio));
    }
}
