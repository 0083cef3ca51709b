//! Weighing history: time-range presets, filters, sorting and the resolved
//! rows shared by the history view, manual exports and scheduled backups.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{KG_PER_TONNE, SHIFT_END_HOUR, SHIFT_START_HOUR};
use crate::store::operations::records::WeighingRecord;
use crate::store::operations::reference::{CargoType, Destination, Source, Vehicle};
use crate::store::{Store, StoreError};

/// A weighing with its reference ids resolved to display names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub vehicle_name: String,
    pub cargo_display: String,
    pub net_weight: f64,
    pub from_name: String,
    pub to_name: String,
    pub source_name: String,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimeRange {
    AllTime,
    LastWeek,
    Last3Days,
    #[default]
    Last24Hours,
    Last12Hours,
    /// 06:00 to 03:00 the next day, local time. Before 06:00 the running
    /// shift is still the one that started the previous morning.
    TodayShift,
    YesterdayShift,
    Custom,
}

impl TimeRange {
    pub const ALL: [TimeRange; 8] = [
        TimeRange::AllTime,
        TimeRange::LastWeek,
        TimeRange::Last3Days,
        TimeRange::Last24Hours,
        TimeRange::Last12Hours,
        TimeRange::TodayShift,
        TimeRange::YesterdayShift,
        TimeRange::Custom,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            TimeRange::AllTime => "All time",
            TimeRange::LastWeek => "Last week",
            TimeRange::Last3Days => "Last 3 days",
            TimeRange::Last24Hours => "Last 24 hours",
            TimeRange::Last12Hours => "Last 12 hours",
            TimeRange::TodayShift => "Today's shift (06:00 - 03:00)",
            TimeRange::YesterdayShift => "Yesterday's shift (06:00 - 03:00)",
            TimeRange::Custom => "Custom range",
        }
    }

    /// Inclusive `[from, to]` bounds, or `None` for an unbounded range.
    pub fn window(
        self,
        now: DateTime<Utc>,
        offset: FixedOffset,
        custom_start: Option<DateTime<Utc>>,
        custom_end: Option<DateTime<Utc>>,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, &'static str> {
        let window = match self {
            TimeRange::AllTime => return Ok(None),
            TimeRange::LastWeek => (lookback(now, Duration::days(7))?, now),
            TimeRange::Last3Days => (lookback(now, Duration::days(3))?, now),
            TimeRange::Last24Hours => (lookback(now, Duration::hours(24))?, now),
            TimeRange::Last12Hours => (lookback(now, Duration::hours(12))?, now),
            TimeRange::TodayShift => shift_window(current_shift_day(now, offset), offset),
            TimeRange::YesterdayShift => {
                shift_window(current_shift_day(now, offset) - Duration::days(1), offset)
            }
            TimeRange::Custom => match (custom_start, custom_end) {
                (Some(start), Some(end)) if start <= end => (start, end),
                (Some(_), Some(_)) => return Err("Range start must not be after its end"),
                _ => return Err("A custom range needs both start and end"),
            },
        };
        Ok(Some(window))
    }
}

fn lookback(now: DateTime<Utc>, span: Duration) -> Result<DateTime<Utc>, &'static str> {
    now.checked_sub_signed(span)
        .ok_or("Range start is out of bounds")
}

/// Calendar day (local) on which the running shift started.
fn current_shift_day(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    let local = now.with_timezone(&offset);
    let today = local.date_naive();
    if local.hour() < SHIFT_START_HOUR {
        today - Duration::days(1)
    } else {
        today
    }
}

fn shift_window(day: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = day.and_time(NaiveTime::MIN);
    let start = midnight + Duration::hours(i64::from(SHIFT_START_HOUR));
    let end = midnight + Duration::days(1) + Duration::hours(i64::from(SHIFT_END_HOUR));
    (local_to_utc(start, offset), local_to_utc(end, offset))
}

fn local_to_utc(local: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::<Utc>::from_naive_utc_and_offset(utc, Utc)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Timestamp,
    Vehicle,
    Cargo,
    NetWeight,
    From,
    To,
    Source,
    Comment,
}

impl SortField {
    pub fn compare(self, a: &HistoryEntry, b: &HistoryEntry) -> Ordering {
        match self {
            SortField::Timestamp => a.timestamp.cmp(&b.timestamp),
            SortField::Vehicle => compare_text(&a.vehicle_name, &b.vehicle_name),
            SortField::Cargo => compare_text(&a.cargo_display, &b.cargo_display),
            SortField::NetWeight => a.net_weight.total_cmp(&b.net_weight),
            SortField::From => compare_text(&a.from_name, &b.from_name),
            SortField::To => compare_text(&a.to_name, &b.to_name),
            SortField::Source => compare_text(&a.source_name, &b.source_name),
            SortField::Comment => compare_text(&a.comment, &b.comment),
        }
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryFilter {
    pub range: TimeRange,
    /// Only read for [`TimeRange::Custom`].
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub season_id: Option<String>,
    pub vehicle_id: Option<String>,
    pub cargo_type_id: Option<String>,
    pub from_id: Option<String>,
    pub to_id: Option<String>,
    pub sort: SortField,
    pub descending: bool,
}

impl HistoryFilter {
    fn matches(&self, record: &WeighingRecord) -> bool {
        fn pass(wanted: &Option<String>, actual: &str) -> bool {
            wanted.as_deref().map_or(true, |id| id == actual)
        }
        pass(&self.season_id, &record.season_id)
            && pass(&self.vehicle_id, &record.vehicle_id)
            && pass(&self.cargo_type_id, &record.cargo_type_id)
            && pass(&self.from_id, &record.from_id)
            && pass(&self.to_id, &record.to_id)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub total_net_tonnes: f64,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

pub fn total_net_tonnes(entries: &[HistoryEntry]) -> f64 {
    entries.iter().map(|e| e.net_weight).sum::<f64>() / KG_PER_TONNE
}

/// Reference names loaded once per query.
struct NameLookup {
    vehicles: HashMap<String, String>,
    cargo_types: HashMap<String, String>,
    destinations: HashMap<String, String>,
    sources: HashMap<String, String>,
}

impl NameLookup {
    fn load(store: &Store) -> Result<Self, StoreError> {
        Ok(Self {
            vehicles: store.reference_names::<Vehicle>()?,
            cargo_types: store.reference_names::<CargoType>()?,
            destinations: store.reference_names::<Destination>()?,
            sources: store.reference_names::<Source>()?,
        })
    }

    fn resolve(&self, record: WeighingRecord) -> HistoryEntry {
        let name = |map: &HashMap<String, String>, id: &str| map.get(id).cloned().unwrap_or_default();
        HistoryEntry {
            vehicle_name: name(&self.vehicles, &record.vehicle_id),
            cargo_display: name(&self.cargo_types, &record.cargo_type_id),
            from_name: name(&self.destinations, &record.from_id),
            to_name: name(&self.destinations, &record.to_id),
            source_name: record
                .source_id
                .as_deref()
                .map(|id| name(&self.sources, id))
                .unwrap_or_default(),
            comment: record.comment.unwrap_or_default(),
            net_weight: record.net_weight,
            timestamp: record.timestamp,
            id: record.id,
        }
    }
}

impl Store {
    pub fn resolve_history(&self, records: Vec<WeighingRecord>) -> Result<Vec<HistoryEntry>, StoreError> {
        let lookup = NameLookup::load(self)?;
        Ok(records.into_iter().map(|r| lookup.resolve(r)).collect())
    }

    pub fn query_history(
        &self,
        filter: &HistoryFilter,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<HistoryPage, StoreError> {
        let window = filter
            .range
            .window(now, offset, filter.start, filter.end)
            .map_err(|message| StoreError::Validation(message.to_string()))?;

        let records = match window {
            // Range reads are `(from, to]`; step back a nanosecond to include `from`.
            Some((from, to)) => {
                let before = from
                    .checked_sub_signed(Duration::nanoseconds(1))
                    .ok_or_else(|| StoreError::Validation("Range start is out of bounds".into()))?;
                self.weighing_records_in_range(before, to)?
            }
            None => self.list_weighing_records()?,
        };

        let matching: Vec<WeighingRecord> = records.into_iter().filter(|r| filter.matches(r)).collect();
        let mut entries = self.resolve_history(matching)?;

        let sort = filter.sort;
        entries.sort_by(|a, b| {
            let ordering = sort.compare(a, b).then_with(|| a.timestamp.cmp(&b.timestamp));
            if filter.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        Ok(HistoryPage {
            total_net_tonnes: total_net_tonnes(&entries),
            entries,
            window_start: window.map(|(from, _)| from),
            window_end: window.map(|(_, to)| to),
        })
    }
}
