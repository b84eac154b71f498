//! Which widgets can draw what a module produces.

use statwatch_types::{
    CpuLoad, MemoryUsage, MetricPayload, ProcessEntry, Segment, WidgetKind,
};

fn renderers(payload: &MetricPayload) -> Vec<WidgetKind> {
    WidgetKind::ALL
        .into_iter()
        .filter(|kind| kind.accepts(payload))
        .collect()
}

#[test]
fn process_lists_never_reach_a_widget() {
    let rows = MetricPayload::Processes(vec![ProcessEntry {
        pid: 1,
        name: "launchd".to_string(),
        cpu: 0.3,
        memory: 4096,
    }]);
    assert!(renderers(&rows).is_empty());
    assert_eq!(rows.headline(), None);
}

#[test]
fn every_other_shape_has_a_renderer() {
    let shapes = [
        MetricPayload::Percentage(0.1),
        MetricPayload::Series(vec![0.1, 0.2]),
        MetricPayload::Segments(vec![Segment::new(0.3)]),
        MetricPayload::UpDown {
            upload: 1,
            download: 2,
        },
        MetricPayload::UsedFree { used: 1, free: 1 },
        MetricPayload::Text("42 °C".to_string()),
    ];
    for shape in &shapes {
        assert!(!renderers(shape).is_empty(), "{} has no widget", shape.kind());
    }
}

#[test]
fn cpu_sample_feeds_mini_and_bar_chart() {
    let load = CpuLoad {
        idle: 0.7,
        total_usage: 0.3,
        per_core: vec![0.6, 0.0],
        ..Default::default()
    };

    let headline = MetricPayload::Percentage(load.total_usage);
    let cores = MetricPayload::Series(load.per_core.clone());

    assert_eq!(
        renderers(&headline),
        vec![WidgetKind::Mini, WidgetKind::LineChart, WidgetKind::BarChart]
    );
    assert_eq!(renderers(&cores), vec![WidgetKind::BarChart]);
    assert_eq!(cores.headline(), load.hottest_core().map(|(_, usage)| usage));
}

#[test]
fn memory_split_matches_usage_ratio() {
    let usage = MemoryUsage {
        total: 8,
        used: 6,
        free: 2,
        ..Default::default()
    };
    let split = MetricPayload::UsedFree {
        used: usage.used,
        free: usage.free,
    };
    assert_eq!(split.headline(), Some(usage.usage()));
    assert_eq!(renderers(&split), vec![WidgetKind::Memory]);
}

#[test]
fn persisted_list_parses_in_order() {
    let kinds: Result<Vec<WidgetKind>, _> = "mini,line_chart, speed"
        .split(',')
        .map(str::parse::<WidgetKind>)
        .collect();
    assert_eq!(
        kinds,
        Ok(vec![WidgetKind::Mini, WidgetKind::LineChart, WidgetKind::Speed])
    );
}
