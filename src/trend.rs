use crate::models::{display_label, MeasurementCard, MeasurementEntry, TrendDirection, Unit};

pub fn delta(current: f64, previous: Option<f64>) -> Option<f64> {
    previous.map(|previous| current - previous)
}

pub fn direction(change: Option<f64>) -> TrendDirection {
    match change {
        Some(change) if change > 0.0 => TrendDirection::Up,
        Some(change) if change < 0.0 => TrendDirection::Down,
        _ => TrendDirection::Flat,
    }
}

pub fn change_label(change: f64) -> String {
    if change > 0.0 {
        format!("+{:.1}", change)
    } else {
        format!("{:.1}", change)
    }
}

/// One card per kind in the newest entry, compared against the entry right
/// before it. Nothing older than the last two entries is consulted.
pub fn latest_cards(entries: &[MeasurementEntry]) -> Vec<MeasurementCard> {
    let Some(latest) = entries.last() else {
        return Vec::new();
    };
    let previous = entries.len().checked_sub(2).map(|index| &entries[index]);

    latest
        .values
        .iter()
        .map(|(kind, value)| {
            let change = delta(*value, previous.and_then(|entry| entry.values.get(kind).copied()));
            MeasurementCard {
                kind: kind.clone(),
                label: display_label(kind),
                value: *value,
                unit: Unit::for_kind(kind),
                change,
                change_label: change.map(change_label),
                trend: direction(change),
                recorded_at: latest.recorded_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{change_label, delta, direction, latest_cards};
    use crate::models::{MeasurementEntry, TrendDirection, Unit};
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

    #[test]
    fn delta_cases() {
        assert_eq!(delta(4.0, None), None);
        assert_eq!(delta(5.0, Some(5.0)), Some(0.0));
        assert_eq!(delta(3.0, Some(5.0)), Some(-2.0));
    }

    #[test]
    fn single_entry_has_no_changes() {
        let cards = latest_cards(&[entry("2026-10-05T08:00:00.000Z", &[("chest", 100.0), ("weight", 80.0)])]);
        assert_eq!(cards.len(), 2);
        assert!(cards.iter().all(|card| card.change.is_none()));
        assert!(cards.iter().all(|card| card.trend == TrendDirection::Flat));
    }

    #[test]
    fn compares_only_the_last_two_entries() {
        let entries = vec![
            entry("2026-10-01T08:00:00.000Z", &[("chest", 90.0), ("waist", 70.0)]),
            entry("2026-10-05T08:00:00.000Z", &[("chest", 100.0)]),
            entry("2026-10-12T08:00:00.000Z", &[("chest", 101.5), ("waist", 84.0)]),
        ];
        let cards = latest_cards(&entries);

        let chest = cards.iter().find(|card| card.kind == "chest").expect("chest card");
        assert_eq!(chest.change, Some(1.5));
        assert_eq!(chest.change_label.as_deref(), Some("+1.5"));
        assert_eq!(chest.trend, TrendDirection::Up);
        assert_eq!(chest.unit, Unit::Centimeters);

        let waist = cards.iter().find(|card| card.kind == "waist").expect("waist card");
        assert_eq!(waist.change, None);
    }

    #[test]
    fn zero_change_is_reported_but_flat() {
        let entries = vec![
            entry("2026-10-05T08:00:00.000Z", &[("weight", 80.0)]),
            entry("2026-10-12T08:00:00.000Z", &[("weight", 80.0)]),
        ];
        let cards = latest_cards(&entries);
        assert_eq!(cards[0].change, Some(0.0));
        assert_eq!(cards[0].change_label.as_deref(), Some("0.0"));
        assert_eq!(cards[0].trend, TrendDirection::Flat);
        assert_eq!(cards[0].unit, Unit::Kilograms);
    }

    #[test]
    fn negative_change_points_down() {
        assert_eq!(direction(Some(-2.0)), TrendDirection::Down);
        assert_eq!(change_label(-2.0), "-2.0");
    }

    #[test]
    fn no_entries_no_cards() {
        assert!(latest_cards(&[]).is_empty());
    }
}
