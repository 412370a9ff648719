use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Table number, `1..=TABLE_COUNT`.
pub type TableId = u32;

/// Number of tables in the venue; also the number of grid rows per date.
pub const TABLE_COUNT: usize = 4;

pub const TABLE_NAMES: [&str; TABLE_COUNT] = ["leopard", "blue", "green", "red"];

/// Minutes on the venue clock. Hours before the rollover hour count as
/// belonging to the previous evening, so `01:00` is `25 * 60`.
pub type Minutes = u32;

pub const MINUTES_PER_DAY: Minutes = 24 * 60;

/// Length of one grid column.
pub const SLOT_MINUTES: Minutes = 60;

/// Hours strictly below this sort after midnight (as 24..27).
pub const DAY_ROLLOVER_HOUR: u8 = 4;

/// First bookable slot of the venue day.
pub const OPENING: SlotTime = SlotTime { hour: 12, minute: 0 };

/// No booking may end after this.
pub const CLOSING: SlotTime = SlotTime { hour: 3, minute: 0 };

pub fn table_ids() -> impl Iterator<Item = TableId> {
    1..=TABLE_COUNT as TableId
}

pub fn is_valid_table(table_id: TableId) -> bool {
    (1..=TABLE_COUNT as TableId).contains(&table_id)
}

// ── Time labels ──────────────────────────────────────────────────

/// A time-of-day label as it appears in the schedule header.
///
/// Ordering is midnight aware: `22:00 < 23:00 < 00:00 < 01:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotTime {
    hour: u8,
    minute: u8,
}

impl SlotTime {
    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    /// Position on the venue clock.
    pub fn ordinal(&self) -> Minutes {
        let mut m = self.hour as Minutes * 60 + self.minute as Minutes;
        if self.hour < DAY_ROLLOVER_HOUR {
            m += MINUTES_PER_DAY;
        }
        m
    }

    pub fn from_ordinal(ordinal: Minutes) -> Self {
        let m = ordinal % MINUTES_PER_DAY;
        Self {
            hour: (m / 60) as u8,
            minute: (m % 60) as u8,
        }
    }

    /// End of the one-hour slot starting at this label.
    pub fn slot_end(&self) -> Self {
        Self::from_ordinal(self.ordinal() + SLOT_MINUTES)
    }

    /// `04:00..12:00`: the venue is closed.
    pub fn in_dead_band(&self) -> bool {
        (DAY_ROLLOVER_HOUR..OPENING.hour).contains(&self.hour)
    }

    /// True if a slot starting here lies inside opening hours.
    pub fn is_bookable_start(&self) -> bool {
        !self.in_dead_band() && self.ordinal() + SLOT_MINUTES <= CLOSING.ordinal()
    }
}

impl Ord for SlotTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl PartialOrd for SlotTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSlotTimeError(pub String);

impl fmt::Display for ParseSlotTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time label: {:?}", self.0)
    }
}

impl std::error::Error for ParseSlotTimeError {}

impl FromStr for SlotTime {
    type Err = ParseSlotTimeError;

    /// Accepts `H:MM` and `HH:MM`; the leading zero of the hour is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSlotTimeError(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(err)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(err());
        }
        if !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let hour: u8 = h.parse().map_err(|_| err())?;
        let minute: u8 = m.parse().map_err(|_| err())?;
        SlotTime::new(hour, minute).ok_or_else(err)
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Sort labels in venue order (after-midnight hours last).
pub fn sort_slot_times(times: &mut [SlotTime]) {
    times.sort();
}

/// Which table(s) an availability query or booking may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TablePreference {
    /// Any table ("random" in the dialogue).
    #[default]
    Any,
    Table(TableId),
}

impl FromStr for TablePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "any" | "random" => Ok(TablePreference::Any),
            other => other
                .parse()
                .map(TablePreference::Table)
                .map_err(|_| format!("invalid table preference: {other:?}")),
        }
    }
}

impl Serialize for TablePreference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TablePreference::Any => serializer.serialize_str("any"),
            TablePreference::Table(id) => serializer.serialize_u32(*id),
        }
    }
}

impl<'de> Deserialize<'de> for TablePreference {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Id(TableId),
            Text(String),
        }
        match Repr::deserialize(deserializer)? {
            Repr::Id(id) => Ok(TablePreference::Table(id)),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Half-open interval `[start, end)` on the venue clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minutes,
    pub end: Minutes,
}

impl Span {
    pub fn new(start: Minutes, end: Minutes) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// `None` unless `start` comes strictly before `end` on the venue clock.
    pub fn from_times(start: SlotTime, end: SlotTime) -> Option<Self> {
        let (s, e) = (start.ordinal(), end.ordinal());
        (s < e).then(|| Self::new(s, e))
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

// ── Reservations and clients ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Active)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Everything needed to create a reservation; the ledger fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationDraft {
    pub table_id: TableId,
    pub client_name: String,
    pub client_phone: String,
    pub booking_date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub table_id: TableId,
    pub client_name: String,
    pub client_phone: String,
    pub booking_date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub created_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl Reservation {
    pub fn span(&self) -> Span {
        Span::new(self.start_time.ordinal(), self.end_time.ordinal())
    }

    pub fn day_key(&self) -> DayKey {
        DayKey {
            table_id: self.table_id,
            date: self.booking_date,
        }
    }

    /// Text stamped into the schedule cells for this reservation.
    pub fn grid_label(&self) -> String {
        format!("{}\n{}", self.client_name, self.client_phone)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: Ulid,
    pub name: String,
    pub phone: String,
    pub visit_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub id: TableId,
    pub name: String,
}

/// Conjunctive reservation filter; `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<ReservationStatus>,
    pub table_id: Option<TableId>,
    pub client_phone: Option<String>,
}

impl BookingFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.date_from.is_none_or(|d| r.booking_date >= d)
            && self.date_to.is_none_or(|d| r.booking_date <= d)
            && self.status.is_none_or(|s| r.status == s)
            && self.table_id.is_none_or(|t| r.table_id == t)
            && self
                .client_phone
                .as_deref()
                .is_none_or(|p| r.client_phone == p)
    }
}

// ── Per-table-day state ──────────────────────────────────────────

/// One table on one date: the unit of conflict checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayKey {
    pub table_id: TableId,
    pub date: NaiveDate,
}

/// An active reservation's footprint on its table-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Booked {
    pub id: Ulid,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TableDay {
    pub key: DayKey,
    /// Active reservations only, sorted by `span.start`.
    pub booked: Vec<Booked>,
}

impl TableDay {
    pub fn new(key: DayKey) -> Self {
        Self {
            key,
            booked: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert_booked(&mut self, booked: Booked) {
        let pos = self
            .booked
            .binary_search_by_key(&booked.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.booked.insert(pos, booked);
    }

    pub fn remove_booked(&mut self, id: Ulid) -> Option<Booked> {
        let pos = self.booked.iter().position(|b| b.id == id)?;
        Some(self.booked.remove(pos))
    }

    /// Entries whose span overlaps `query`. Skips everything starting at or
    /// after `query.end` via binary search.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booked> {
        let right_bound = self.booked.partition_point(|b| b.span.start < query.end);
        self.booked[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationStatusChanged {
        id: Ulid,
        status: ReservationStatus,
    },
    ClientCreated {
        client: Client,
    },
    ClientVisited {
        id: Ulid,
        visit_date: NaiveDate,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> SlotTime {
        s.parse().unwrap()
    }

    #[test]
    fn parse_is_padding_insensitive() {
        assert_eq!(t("9:00"), t("09:00"));
        assert_eq!(t(" 19:30 "), SlotTime::new(19, 30).unwrap());
        assert_eq!(t("0:00").to_string(), "00:00");
    }

    #[test]
    fn parse_rejects_garbage() {
        for bad in ["", "19", "19:0", "25:00", "12:60", "ab:cd", "123:00", "-1:00"] {
            assert!(bad.parse::<SlotTime>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn midnight_aware_ordering() {
        let mut times = vec![t("23:00"), t("00:00"), t("01:00"), t("22:00")];
        sort_slot_times(&mut times);
        let labels: Vec<String> = times.iter().map(|t| t.to_string()).collect();
        assert_eq!(labels, vec!["22:00", "23:00", "00:00", "01:00"]);
    }

    #[test]
    fn slot_end_wraps_midnight() {
        assert_eq!(t("23:00").slot_end(), t("00:00"));
        assert_eq!(t("02:00").slot_end(), t("03:00"));
        assert!(t("00:00").ordinal() > t("23:00").ordinal());
    }

    #[test]
    fn bookable_window() {
        assert!(t("12:00").is_bookable_start());
        assert!(t("02:00").is_bookable_start());
        assert!(!t("03:00").is_bookable_start());
        assert!(!t("11:00").is_bookable_start());
        assert!(t("05:00").in_dead_band());
        assert!(!t("03:00").in_dead_band());
    }

    #[test]
    fn table_preference_forms() {
        assert_eq!("random".parse::<TablePreference>().unwrap(), TablePreference::Any);
        assert_eq!("3".parse::<TablePreference>().unwrap(), TablePreference::Table(3));
        assert!("window".parse::<TablePreference>().is_err());
        let any: TablePreference = serde_json::from_str("\"any\"").unwrap();
        let two: TablePreference = serde_json::from_str("2").unwrap();
        assert_eq!((any, two), (TablePreference::Any, TablePreference::Table(2)));
        assert_eq!(serde_json::to_string(&TablePreference::Table(4)).unwrap(), "4");
    }

    #[test]
    fn span_across_midnight() {
        let s = Span::from_times(t("23:00"), t("02:00")).unwrap();
        assert_eq!(s.end - s.start, 180);
        assert!(Span::from_times(t("02:00"), t("23:00")).is_none());
        assert!(Span::from_times(t("20:00"), t("20:00")).is_none());
    }

    #[test]
    fn span_overlap_is_half_open() {
        let a = Span::from_times(t("19:00"), t("21:00")).unwrap();
        let b = Span::from_times(t("21:00"), t("22:00")).unwrap();
        let c = Span::from_times(t("20:00"), t("00:00")).unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert!(c.overlaps(&b));
    }

    #[test]
    fn slot_time_serde_as_string() {
        let json = serde_json::to_string(&t("7:05")).unwrap();
        assert_eq!(json, "\"07:05\"");
        let back: SlotTime = serde_json::from_str("\"7:05\"").unwrap();
        assert_eq!(back, t("07:05"));
    }

    #[test]
    fn table_day_ordering_and_overlap() {
        let key = DayKey {
            table_id: 1,
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
        };
        let mut day = TableDay::new(key);
        let late = Ulid::new();
        day.insert_booked(Booked {
            id: late,
            span: Span::from_times(t("23:00"), t("01:00")).unwrap(),
        });
        day.insert_booked(Booked {
            id: Ulid::new(),
            span: Span::from_times(t("18:00"), t("19:00")).unwrap(),
        });
        assert!(day.booked[0].span.start < day.booked[1].span.start);

        let query = Span::from_times(t("00:00"), t("02:00")).unwrap();
        let hits: Vec<_> = day.overlapping(&query).map(|b| b.id).collect();
        assert_eq!(hits, vec![late]);

        assert!(day.remove_booked(late).is_some());
        assert_eq!(day.overlapping(&query).count(), 0);
    }

    #[test]
    fn filter_is_conjunctive() {
        let r = Reservation {
            id: Ulid::new(),
            table_id: 2,
            client_name: "Ann".into(),
            client_phone: "+700".into(),
            booking_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            start_time: t("19:00"),
            end_time: t("21:00"),
            created_at: Utc::now(),
            status: ReservationStatus::Active,
        };
        assert!(BookingFilter::default().matches(&r));
        let f = BookingFilter {
            table_id: Some(2),
            client_phone: Some("+700".into()),
            ..Default::default()
        };
        assert!(f.matches(&r));
        let f = BookingFilter {
            table_id: Some(2),
            status: Some(ReservationStatus::Cancelled),
            ..Default::default()
        };
        assert!(!f.matches(&r));
        let f = BookingFilter {
            date_from: NaiveDate::from_ymd_opt(2026, 10, 21),
            ..Default::default()
        };
        assert!(!f.matches(&r));
    }
}
