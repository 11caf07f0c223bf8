use chrono::{DateTime, Duration, Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::emoncms;
use crate::sample::SampleBuffer;

/// Sample count for hour-scale windows before the chart has been laid out.
const DEFAULT_FIXED_COUNT: usize = 180;
const MIN_FIXED_COUNT: usize = 60;
const MAX_FIXED_COUNT: usize = 600;
/// Logical pixels per daily usage bar.
const BAR_SLOT_WIDTH: f32 = 52.0;
pub const DEFAULT_BAR_DAYS: u32 = 7;
/// Slack on top of two fetch intervals before a trace counts as behind.
const LIVE_GAP_GRACE_SECS: i64 = 60;

/// The user-chosen visible span of the power chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WindowSelection {
    ThreeHours,
    #[default]
    SixHours,
    Day,
    Week,
    Month,
}

impl WindowSelection {
    pub const ALL: &[WindowSelection] = &[
        WindowSelection::ThreeHours,
        WindowSelection::SixHours,
        WindowSelection::Day,
        WindowSelection::Week,
        WindowSelection::Month,
    ];

    pub fn hours(&self) -> i64 {
        match self {
            WindowSelection::ThreeHours => 3,
            WindowSelection::SixHours => 6,
            WindowSelection::Day => 24,
            WindowSelection::Week => 24 * 7,
            WindowSelection::Month => 24 * 30,
        }
    }

    pub fn span_secs(&self) -> i64 {
        self.hours() * 3600
    }

    /// Stable token written into snapshots.
    pub fn token(&self) -> &'static str {
        match self {
            WindowSelection::ThreeHours => "3h",
            WindowSelection::SixHours => "6h",
            WindowSelection::Day => "24h",
            WindowSelection::Week => "7d",
            WindowSelection::Month => "30d",
        }
    }

    pub fn button_label(&self) -> &'static str {
        match self {
            WindowSelection::ThreeHours => "3H",
            WindowSelection::SixHours => "6H",
            WindowSelection::Day => "D",
            WindowSelection::Week => "W",
            WindowSelection::Month => "M",
        }
    }

    /// Accepts both the short tokens and the legacy negative hour counts ("-168").
    pub fn from_token(token: &str) -> Option<Self> {
        let token = token.trim();
        if let Some(sel) = Self::ALL.iter().find(|s| s.token() == token) {
            return Some(*sel);
        }
        let hours = token.parse::<i64>().ok()?.abs();
        Self::ALL.iter().find(|s| s.hours() == hours).copied()
    }

    /// Unknown tokens fall back to the default window.
    pub fn from_token_or_default(token: &str) -> Self {
        Self::from_token(token).unwrap_or_else(|| {
            tracing::warn!(token, "unknown window selection, using default");
            Self::default()
        })
    }

    pub fn is_hour_scale(&self) -> bool {
        matches!(
            self,
            WindowSelection::ThreeHours | WindowSelection::SixHours | WindowSelection::Day
        )
    }
}

/// How a chart turns a sample label into axis text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFormat {
    HourMinute,
    DayOfWeek,
}

impl LabelFormat {
    pub fn format(&self, label: &str) -> String {
        let parsed = label
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(|ms| Local.timestamp_millis_opt(ms).single());
        match (self, parsed) {
            (LabelFormat::HourMinute, Some(t)) => t.format("%H:%M").to_string(),
            (LabelFormat::HourMinute, None) => label.to_string(),
            (LabelFormat::DayOfWeek, Some(t)) => t.format("%a").to_string(),
            (LabelFormat::DayOfWeek, None) => String::new(),
        }
    }
}

/// Measured size of the page hosting the charts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartLayout {
    pub width: f32,
    pub height: f32,
    /// Physical pixels per logical pixel.
    pub density: f32,
}

impl ChartLayout {
    pub fn logical_width(&self) -> f32 {
        if self.density > 0.0 {
            self.width / self.density
        } else {
            self.width
        }
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }

    /// Number of daily bars that fit, adjusted by the user's duration choice.
    pub fn days_to_display(&self, added_days: i32) -> u32 {
        let fit = (self.logical_width() / BAR_SLOT_WIDTH).round() as i32;
        (fit + added_days).max(1) as u32
    }
}

/// Eviction rule a policy imposes on its buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// Keep at most this many samples.
    FixedCount(usize),
    /// Keep samples from local midnight `n` days ago onwards.
    CalendarDays(u32),
}

/// Formatter and eviction decision for one window selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub format: LabelFormat,
    pub retention: Retention,
    /// Spacing of the points requested from the server.
    pub interval_secs: i64,
    pub span_secs: i64,
}

impl WindowPolicy {
    /// Pure function of its inputs; evaluating twice gives the same policy.
    pub fn evaluate(selection: WindowSelection, layout: Option<ChartLayout>) -> Self {
        let span_secs = selection.span_secs();
        if selection.is_hour_scale() {
            let count = layout
                .map(|l| ((l.logical_width() / 2.0).round() as usize).clamp(MIN_FIXED_COUNT, MAX_FIXED_COUNT))
                .unwrap_or(DEFAULT_FIXED_COUNT);
            Self {
                format: LabelFormat::HourMinute,
                retention: Retention::FixedCount(count),
                interval_secs: (span_secs / count as i64).max(10),
                span_secs,
            }
        } else {
            Self {
                format: LabelFormat::DayOfWeek,
                retention: Retention::CalendarDays((selection.hours() / 24) as u32),
                interval_secs: emoncms::default_interval(selection.hours()),
                span_secs,
            }
        }
    }

    /// Policy of the daily usage bar chart.
    pub fn daily_bars(days: u32) -> Self {
        let days = days.max(1);
        Self {
            format: LabelFormat::DayOfWeek,
            retention: Retention::CalendarDays(days),
            interval_secs: 86_400,
            span_secs: days as i64 * 86_400,
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        match self.retention {
            Retention::FixedCount(n) => Some(n),
            Retention::CalendarDays(_) => None,
        }
    }

    /// Axis text for sample `idx`; empty when the index is out of range.
    pub fn label_at(&self, buffer: &SampleBuffer, idx: usize) -> String {
        buffer
            .get(idx)
            .map(|s| self.format.format(&s.label))
            .unwrap_or_default()
    }

    pub fn axis_labels(&self, buffer: &SampleBuffer) -> Vec<String> {
        buffer.iter().map(|s| self.format.format(&s.label)).collect()
    }

    /// Bring `buffer` in line with this policy. Returns the number of evicted samples.
    pub fn apply(&self, buffer: &mut SampleBuffer, now: DateTime<Local>) -> usize {
        let before = buffer.len();
        match self.retention {
            Retention::FixedCount(n) => {
                buffer.set_capacity(Some(n));
                let cutoff = now.timestamp_millis() - self.span_secs * 1000;
                buffer.evict_while(|s| s.timestamp_ms().is_some_and(|t| t < cutoff));
                before - buffer.len()
            }
            Retention::CalendarDays(days) => {
                buffer.set_capacity(None);
                let cutoff = start_of_day(now - Duration::days(days as i64)).timestamp_millis();
                buffer.evict_while(|s| s.timestamp_ms().is_some_and(|t| t < cutoff))
            }
        }
    }

    /// Whether the newest sample is close enough to `now_ms` for live readings
    /// to continue the trace. Otherwise the history has to be fetched again.
    pub fn is_current(&self, buffer: &SampleBuffer, now_ms: i64) -> bool {
        buffer
            .last()
            .and_then(|s| s.timestamp_ms())
            .is_some_and(|last| now_ms - last <= (2 * self.interval_secs + LIVE_GAP_GRACE_SECS) * 1000)
    }

    /// Whether a live reading at `now_ms` is due, given the newest sample so far.
    pub fn accepts_live(&self, buffer: &SampleBuffer, now_ms: i64) -> bool {
        match buffer.last().and_then(|s| s.timestamp_ms()) {
            Some(last) => now_ms - last >= self.interval_secs * 1000,
            None => true,
        }
    }
}

/// Duration buttons of the daily usage chart (1 to 5 weeks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DurationSelection {
    #[default]
    OneWeek,
    TwoWeeks,
    ThreeWeeks,
    FourWeeks,
    FiveWeeks,
}

impl DurationSelection {
    pub const ALL: &[DurationSelection] = &[
        DurationSelection::OneWeek,
        DurationSelection::TwoWeeks,
        DurationSelection::ThreeWeeks,
        DurationSelection::FourWeeks,
        DurationSelection::FiveWeeks,
    ];

    pub fn button_label(&self) -> &'static str {
        match self {
            DurationSelection::OneWeek => "1W",
            DurationSelection::TwoWeeks => "2W",
            DurationSelection::ThreeWeeks => "3W",
            DurationSelection::FourWeeks => "4W",
            DurationSelection::FiveWeeks => "5W",
        }
    }

    /// Days added to the width-derived bar count.
    pub fn added_days(&self, landscape: bool) -> i32 {
        match (self, landscape) {
            (DurationSelection::OneWeek, false) => -1,
            (DurationSelection::OneWeek, true) => -10,
            (_, false) => 6,
            (DurationSelection::TwoWeeks, true) => -3,
            (DurationSelection::ThreeWeeks, true) => 4,
            (DurationSelection::FourWeeks, true) => 11,
            (DurationSelection::FiveWeeks, true) => 18,
        }
    }
}

/// Local midnight of the day containing `t`.
pub fn start_of_day(t: DateTime<Local>) -> DateTime<Local> {
    t.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;

    #[test]
    fn test_token_parsing() {
        assert_eq!(WindowSelection::from_token("3h"), Some(WindowSelection::ThreeHours));
        assert_eq!(WindowSelection::from_token("-168"), Some(WindowSelection::Week));
        assert_eq!(WindowSelection::from_token("720"), Some(WindowSelection::Month));
        assert_eq!(WindowSelection::from_token("12h"), None);
        assert_eq!(WindowSelection::from_token_or_default("bogus"), WindowSelection::SixHours);
    }

    #[test]
    fn test_unknown_token_uses_hour_minute() {
        let sel = WindowSelection::from_token_or_default("??");
        assert_eq!(WindowPolicy::evaluate(sel, None).format, LabelFormat::HourMinute);
    }

    #[test]
    fn test_hour_scale_is_fixed_count() {
        let policy = WindowPolicy::evaluate(WindowSelection::ThreeHours, None);
        assert_eq!(policy.format, LabelFormat::HourMinute);
        assert_eq!(policy.retention, Retention::FixedCount(180));
        assert_eq!(policy.interval_secs, 60);
    }

    #[test]
    fn test_fixed_count_follows_layout() {
        let layout = ChartLayout { width: 1600.0, height: 900.0, density: 2.0 };
        let policy = WindowPolicy::evaluate(WindowSelection::Day, Some(layout));
        assert_eq!(policy.retention, Retention::FixedCount(400));
        let tiny = ChartLayout { width: 50.0, height: 50.0, density: 1.0 };
        let policy = WindowPolicy::evaluate(WindowSelection::Day, Some(tiny));
        assert_eq!(policy.retention, Retention::FixedCount(60));
    }

    #[test]
    fn test_day_scale_is_calendar_span() {
        let week = WindowPolicy::evaluate(WindowSelection::Week, None);
        assert_eq!(week.format, LabelFormat::DayOfWeek);
        assert_eq!(week.retention, Retention::CalendarDays(7));
        assert_eq!(week.interval_secs, 1_800);
        let month = WindowPolicy::evaluate(WindowSelection::Month, None);
        assert_eq!(month.retention, Retention::CalendarDays(30));
        assert_eq!(month.interval_secs, 3_600);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let layout = Some(ChartLayout { width: 900.0, height: 600.0, density: 1.5 });
        for sel in WindowSelection::ALL {
            assert_eq!(WindowPolicy::evaluate(*sel, layout), WindowPolicy::evaluate(*sel, layout));
        }
    }

    #[test]
    fn test_label_at_out_of_range_is_empty() {
        let policy = WindowPolicy::evaluate(WindowSelection::Week, None);
        let empty = SampleBuffer::unbounded();
        assert_eq!(policy.label_at(&empty, 0), "");
        let buf = SampleBuffer::from_samples([Sample::new("09:00", 1.0)]);
        assert_eq!(policy.label_at(&buf, 5), "");
    }

    #[test]
    fn test_hour_minute_keeps_plain_labels() {
        assert_eq!(LabelFormat::HourMinute.format("09:05"), "09:05");
    }

    #[test]
    fn test_day_of_week_from_numeric_label() {
        // local noon of Wednesday 2024-01-03
        let noon = Local.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let label = noon.timestamp_millis().to_string();
        assert_eq!(LabelFormat::DayOfWeek.format(&label), "Wed");
        assert_eq!(LabelFormat::DayOfWeek.format("09:00"), "");
    }

    #[test]
    fn test_calendar_eviction() {
        let now = Local::now();
        let old = (now - Duration::days(40)).timestamp_millis();
        let recent = (now - Duration::days(2)).timestamp_millis();
        let mut buf = SampleBuffer::from_samples([
            Sample::new(old.to_string(), 1.0),
            Sample::new(recent.to_string(), 2.0),
            Sample::new(now.timestamp_millis().to_string(), 3.0),
        ]);
        let policy = WindowPolicy::evaluate(WindowSelection::Week, None);
        assert_eq!(policy.apply(&mut buf, now), 1);
        assert_eq!(buf.values(), vec![2.0, 3.0]);
        assert_eq!(policy.apply(&mut buf, now), 0);
    }

    #[test]
    fn test_fixed_count_eviction_sets_capacity() {
        let now = Local::now();
        let base = now.timestamp_millis() - 3_600_000;
        let mut buf = SampleBuffer::from_samples((0..200).map(|i| Sample::new((base + i * 1000).to_string(), i as f64)));
        let policy = WindowPolicy::evaluate(WindowSelection::SixHours, None);
        assert_eq!(policy.apply(&mut buf, now), 20);
        assert_eq!(buf.capacity(), Some(180));
    }

    #[test]
    fn test_fixed_count_drops_samples_older_than_span() {
        let now = Local::now();
        let old = (now - Duration::hours(48)).timestamp_millis();
        let recent = (now - Duration::hours(1)).timestamp_millis();
        let mut buf = SampleBuffer::from_samples([
            Sample::new(old.to_string(), 1.0),
            Sample::new((old + 60_000).to_string(), 2.0),
            Sample::new(recent.to_string(), 3.0),
        ]);
        let policy = WindowPolicy::evaluate(WindowSelection::SixHours, None);
        assert_eq!(policy.apply(&mut buf, now), 2);
        assert_eq!(buf.values(), vec![3.0]);
    }

    #[test]
    fn test_trace_is_current() {
        let policy = WindowPolicy::evaluate(WindowSelection::SixHours, None);
        let now = 10_000_000_000;
        let fresh = SampleBuffer::from_samples([Sample::new((now - 60_000).to_string(), 1.0)]);
        assert!(policy.is_current(&fresh, now));
        let behind = SampleBuffer::from_samples([Sample::new((now - 2 * 86_400_000).to_string(), 1.0)]);
        assert!(!policy.is_current(&behind, now));
        assert!(!policy.is_current(&SampleBuffer::unbounded(), now));
    }

    #[test]
    fn test_live_sample_spacing() {
        let policy = WindowPolicy::evaluate(WindowSelection::ThreeHours, None);
        let buf = SampleBuffer::from_samples([Sample::new("1000000", 1.0)]);
        assert!(!policy.accepts_live(&buf, 1_000_000 + 30_000));
        assert!(policy.accepts_live(&buf, 1_000_000 + 60_000));
        assert!(policy.accepts_live(&SampleBuffer::unbounded(), 0));
    }

    #[test]
    fn test_days_to_display() {
        let portrait = ChartLayout { width: 1080.0, height: 1920.0, density: 2.75 };
        // 1080 / 2.75 / 52 = 7.55 → 8
        assert_eq!(portrait.days_to_display(DurationSelection::OneWeek.added_days(false)), 7);
        assert_eq!(portrait.days_to_display(DurationSelection::TwoWeeks.added_days(false)), 14);
        let narrow = ChartLayout { width: 100.0, height: 400.0, density: 1.0 };
        assert_eq!(narrow.days_to_display(-10), 1);
    }
}
