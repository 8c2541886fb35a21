use crate::aggregate::distinct_kinds;
use crate::models::{display_label, ChartPoint, ChartSeries, MeasurementEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const FALLBACK_COLOR: &str = "#64748b";

fn color_for(kind: &str) -> &'static str {
    match kind {
        "chest" => "#10b981",
        "biceps" => "#3b82f6",
        "waist" => "#f59e0b",
        "thighs" => "#ef4444",
        "hips" => "#8b5cf6",
        "neck" => "#06b6d4",
        "forearms" => "#f97316",
        _ => FALLBACK_COLOR,
    }
}

/// Kinds currently shown on the chart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSelection {
    selected: BTreeSet<String>,
}

impl KindSelection {
    pub fn all(entries: &[MeasurementEntry]) -> Self {
        Self {
            selected: distinct_kinds(entries),
        }
    }

    pub fn is_selected(&self, kind: &str) -> bool {
        self.selected.contains(kind)
    }

    /// Returns whether the kind is selected after the toggle.
    pub fn toggle(&mut self, kind: &str) -> bool {
        if self.selected.remove(kind) {
            false
        } else {
            self.selected.insert(kind.to_string());
            true
        }
    }

    pub fn include<'a, I>(&mut self, kinds: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        self.selected.extend(kinds.into_iter().cloned());
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }
}

pub fn point_label(entry: &MeasurementEntry) -> String {
    entry.recorded_at.format("%b %-d").to_string()
}

/// One series per selected kind. Entries lacking the kind leave a gap.
pub fn chart_series(entries: &[MeasurementEntry], selection: &KindSelection) -> Vec<ChartSeries> {
    selection
        .kinds()
        .map(|kind| ChartSeries {
            kind: kind.to_string(),
            label: display_label(kind),
            color: color_for(kind).to_string(),
            points: entries
                .iter()
                .filter_map(|entry| {
                    entry.values.get(kind).map(|value| ChartPoint {
                        recorded_at: entry.recorded_at,
                        label: point_label(entry),
                        value: *value,
                    })
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{chart_series, KindSelection, FALLBACK_COLOR};
    use crate::models::MeasurementEntry;
    use chrono::{DateTime, Utc};
    use std::collections::BTreeMap;

    fn entry(recorded_at: &str, values: &[(&str, f64)]) -> MeasurementEntry {
        let recorded_at: DateTime<Utc> = recorded_at.parse().expect("timestamp");
        MeasurementEntry::new(
            recorded_at,
            values
                .iter()
                .map(|(kind, value)| (kind.to_string(), *value))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn sample() -> Vec<MeasurementEntry> {
        vec![
            entry("2026-10-05T08:00:00.000Z", &[("chest", 100.0), ("weight", 80.0)]),
            entry("2026-10-18T08:00:00.000Z", &[("chest", 101.0)]),
        ]
    }

    #[test]
    fn default_selection_covers_every_kind() {
        let selection = KindSelection::all(&sample());
        assert!(selection.is_selected("chest"));
        assert!(selection.is_selected("weight"));
        assert_eq!(chart_series(&sample(), &selection).len(), 2);
    }

    #[test]
    fn toggling_removes_and_restores_series() {
        let entries = sample();
        let mut selection = KindSelection::all(&entries);
        assert!(!selection.toggle("weight"));
        let series = chart_series(&entries, &selection);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].kind, "chest");
        assert!(selection.toggle("weight"));
        assert_eq!(chart_series(&entries, &selection).len(), 2);
    }

    #[test]
    fn missing_values_leave_gaps() {
        let entries = sample();
        let series = chart_series(&entries, &KindSelection::all(&entries));
        let weight = series.iter().find(|series| series.kind == "weight").expect("weight");
        assert_eq!(weight.points.len(), 1);
        assert_eq!(weight.label, "Weight");
        assert_eq!(weight.color, FALLBACK_COLOR);

        let chest = series.iter().find(|series| series.kind == "chest").expect("chest");
        assert_eq!(chest.points.len(), 2);
        assert_eq!(chest.points[1].label, "Oct 18");
        assert_eq!(chest.color, "#10b981");
    }

    #[test]
    fn include_adds_new_kinds() {
        let mut selection = KindSelection::default();
        selection.include(&["neck".to_string()]);
        assert!(selection.is_selected("neck"));
    }
}
