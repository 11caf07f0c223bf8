use chrono::{DateTime, Duration as ChronoDuration, Local};
use iced::task;
use iced::Task;
use std::future::Future;
use std::time::Duration;

use crate::emoncms::{self, ClientError, EmonClient, Feed};
use crate::sample::Sample;
use crate::settings::{PageSettings, AUTO_FEED};
use crate::window::{start_of_day, WindowPolicy};

/// Period of the power-now poll.
pub const POWER_NOW_INTERVAL: Duration = Duration::from_secs(10);
/// The daily usage chart is re-fetched at most this often.
pub const USE_HISTORY_MIN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadKind {
    Feeds,
    PowerNow,
    PowerHistory,
    UseHistory,
}

impl LoadKind {
    const COUNT: usize = 4;

    fn slot(self) -> usize {
        match self {
            LoadKind::Feeds => 0,
            LoadKind::PowerNow => 1,
            LoadKind::PowerHistory => 2,
            LoadKind::UseHistory => 3,
        }
    }
}

/// Identity of one scheduled load. Only tickets of the scheduler's current
/// generation may deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    pub page: i64,
    pub generation: u64,
    pub kind: LoadKind,
}

/// Why a load produced no data. The page shows a message and tries again on
/// the next tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadFailure {
    ServerNotConfigured,
    FeedNotConfigured,
    Connection(String),
}

impl From<ClientError> for LoadFailure {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::NotConfigured => LoadFailure::ServerNotConfigured,
            other => LoadFailure::Connection(other.to_string()),
        }
    }
}

impl std::fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadFailure::ServerNotConfigured => f.write_str("Server not configured"),
            LoadFailure::FeedNotConfigured => f.write_str("Feed not configured"),
            LoadFailure::Connection(e) => write!(f, "Connection error: {e}"),
        }
    }
}

/// Per-day usage bars plus today's running total.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailyUsage {
    pub bars: Vec<Sample>,
    pub today_kwh: f64,
    /// Cumulative reading at local midnight, used to update today's bar live.
    pub day_start_kwh: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
    /// Feed list and the (power, use) ids the page should use.
    Feeds { feeds: Vec<Feed>, power: i64, usage: i64 },
    PowerNow { watts: f64, total_kwh: f64, at_ms: i64 },
    PowerHistory(Vec<Sample>),
    UseHistory(DailyUsage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub ticket: Ticket,
    pub result: Result<Loaded, LoadFailure>,
}

/// Issues tickets for one page and keeps its in-flight tasks abortable.
///
/// `cancel_all` moves to a new generation and aborts everything running.
/// After `dispose` no ticket is issued or accepted again.
#[derive(Default)]
pub struct RefreshScheduler {
    page: i64,
    generation: u64,
    disposed: bool,
    in_flight: [bool; LoadKind::COUNT],
    handles: [Option<task::Handle>; LoadKind::COUNT],
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("page", &self.page)
            .field("generation", &self.generation)
            .field("disposed", &self.disposed)
            .field("in_flight", &self.in_flight)
            .field("tasks", &self.handles.iter().flatten().count())
            .finish()
    }
}

impl RefreshScheduler {
    pub fn new(page: i64) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// A ticket for `kind`, unless one is already out or the scheduler is disposed.
    pub fn begin(&mut self, kind: LoadKind) -> Option<Ticket> {
        if self.disposed || self.in_flight[kind.slot()] {
            return None;
        }
        self.in_flight[kind.slot()] = true;
        Some(Ticket {
            page: self.page,
            generation: self.generation,
            kind,
        })
    }

    pub fn is_in_flight(&self, kind: LoadKind) -> bool {
        self.in_flight[kind.slot()]
    }

    /// Whether a delivery carrying `ticket` may touch the page. Accepting
    /// also frees the slot for the next load of that kind.
    pub fn accept(&mut self, ticket: &Ticket) -> bool {
        if self.disposed || ticket.page != self.page || ticket.generation != self.generation {
            tracing::debug!(?ticket, current = self.generation, "dropping stale delivery");
            return false;
        }
        self.in_flight[ticket.kind.slot()] = false;
        self.handles[ticket.kind.slot()] = None;
        true
    }

    /// Hold the abort handle of the running `kind` load until it delivers
    /// or is cancelled.
    pub fn track(&mut self, kind: LoadKind, handle: task::Handle) {
        self.handles[kind.slot()] = Some(handle.abort_on_drop());
    }

    pub fn cancel_all(&mut self) {
        self.generation += 1;
        self.in_flight = [false; LoadKind::COUNT];
        let aborted = self.handles.iter().flatten().filter(|h| !h.is_aborted()).count();
        self.handles = Default::default();
        if aborted > 0 {
            tracing::debug!(page = self.page, aborted, "cancelled page loads");
        }
    }

    pub fn dispose(&mut self) {
        self.cancel_all();
        self.disposed = true;
    }

    /// Wrap `load` in an abortable task that reports back with `ticket`.
    pub fn spawn<F>(&mut self, ticket: Ticket, load: F) -> Task<Delivery>
    where
        F: Future<Output = Result<Loaded, LoadFailure>> + Send + 'static,
    {
        let (task, handle) = Task::perform(load, move |result| Delivery { ticket, result }).abortable();
        self.track(ticket.kind, handle);
        task
    }
}

/// Resolve AUTO feed ids against the server's feed list.
pub fn resolve_feeds(page: &PageSettings, feeds: &[Feed]) -> Result<(i64, i64), LoadFailure> {
    let (auto_power, auto_use) = emoncms::auto_pick(feeds);
    let pick = |configured: i64, auto: Option<i64>| {
        if configured == AUTO_FEED {
            auto.ok_or(LoadFailure::FeedNotConfigured)
        } else if configured >= 0 {
            Ok(configured)
        } else {
            Err(LoadFailure::FeedNotConfigured)
        }
    };
    Ok((pick(page.power_feed_id, auto_power)?, pick(page.use_feed_id, auto_use)?))
}

/// Turn day-start cumulative kWh readings into per-day usage bars.
///
/// Each bar is the difference to the next day's reading. Today's bar is the
/// live total minus the reading at the start of today. Counter resets give 0.
pub fn daily_usage_from_cumulative(points: &[(i64, f64)], total_kwh: Option<f64>) -> DailyUsage {
    let mut bars: Vec<Sample> = points
        .windows(2)
        .map(|w| Sample::new(w[0].0.to_string(), (w[1].1 - w[0].1).max(0.0)))
        .collect();
    let today_kwh = match (points.last(), total_kwh) {
        (Some(&(t, start)), Some(total)) => {
            let today = (total - start).max(0.0);
            bars.push(Sample::new(t.to_string(), today));
            today
        }
        _ => 0.0,
    };
    DailyUsage {
        bars,
        today_kwh,
        day_start_kwh: points.last().map(|&(_, v)| v),
    }
}

pub async fn load_feeds(client: EmonClient, page: PageSettings) -> Result<Loaded, LoadFailure> {
    let feeds = client.feeds().await?;
    let (power, usage) = resolve_feeds(&page, &feeds)?;
    Ok(Loaded::Feeds { feeds, power, usage })
}

pub async fn load_power_now(client: EmonClient, power: i64, usage: i64, scale: f64) -> Result<Loaded, LoadFailure> {
    let values = client.fetch_values(&[power, usage]).await?;
    let watts = values.first().copied().flatten().unwrap_or(0.0) * scale;
    let total_kwh = values.get(1).copied().flatten().unwrap_or(0.0);
    Ok(Loaded::PowerNow {
        watts,
        total_kwh,
        at_ms: Local::now().timestamp_millis(),
    })
}

pub async fn load_power_history(
    client: EmonClient,
    power: i64,
    policy: WindowPolicy,
    scale: f64,
) -> Result<Loaded, LoadFailure> {
    let end = Local::now().timestamp_millis();
    let start = end - policy.span_secs * 1000;
    let points = client.data(power, start, end, policy.interval_secs).await?;
    let samples = points
        .into_iter()
        .map(|(t, v)| Sample::new(t.to_string(), v * scale))
        .collect();
    Ok(Loaded::PowerHistory(samples))
}

/// Fetch `days + 1` day-start readings so that `days` complete differences exist.
pub async fn load_use_history(client: EmonClient, usage: i64, days: u32) -> Result<Loaded, LoadFailure> {
    let now = Local::now();
    let (start, end) = daily_range(now, days);
    let points = client.daily(usage, start, end).await?;
    let total = client.feed_value(usage).await.ok();
    Ok(Loaded::UseHistory(daily_usage_from_cumulative(&points, total)))
}

fn daily_range(now: DateTime<Local>, days: u32) -> (i64, i64) {
    let start = start_of_day(now - ChronoDuration::days(days as i64));
    (start.timestamp_millis(), now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::PageSettings;

    fn feed(id: i64, name: &str, engine: i64) -> Feed {
        Feed {
            id,
            name: name.into(),
            tag: String::new(),
            engine,
            value: None,
            time: None,
        }
    }

    #[test]
    fn test_stale_generation_is_rejected() {
        let mut sched = RefreshScheduler::new(1);
        let old = sched.begin(LoadKind::PowerHistory).unwrap();
        sched.cancel_all();
        assert!(!sched.accept(&old));
        let fresh = sched.begin(LoadKind::PowerHistory).unwrap();
        assert!(sched.accept(&fresh));
    }

    #[test]
    fn test_one_load_per_kind_in_flight() {
        let mut sched = RefreshScheduler::new(1);
        let t = sched.begin(LoadKind::PowerNow).unwrap();
        assert!(sched.begin(LoadKind::PowerNow).is_none());
        assert!(sched.begin(LoadKind::UseHistory).is_some());
        assert!(sched.accept(&t));
        assert!(!sched.is_in_flight(LoadKind::PowerNow));
        assert!(sched.begin(LoadKind::PowerNow).is_some());
    }

    #[test]
    fn test_disposed_rejects_everything() {
        let mut sched = RefreshScheduler::new(4);
        let t = sched.begin(LoadKind::Feeds).unwrap();
        sched.dispose();
        assert!(sched.is_disposed());
        assert!(!sched.accept(&t));
        assert!(sched.begin(LoadKind::Feeds).is_none());
    }

    #[test]
    fn test_other_page_ticket_is_rejected() {
        let mut a = RefreshScheduler::new(1);
        let mut b = RefreshScheduler::new(2);
        let t = b.begin(LoadKind::PowerNow).unwrap();
        assert!(!a.accept(&t));
        assert!(b.accept(&t));
    }

    #[test]
    fn test_resolve_auto_feeds() {
        let feeds = vec![feed(5, "use", 5), feed(6, "use_kwh", 5)];
        let page = PageSettings::with_auto_feeds("p");
        assert_eq!(resolve_feeds(&page, &feeds), Ok((5, 6)));

        let mut fixed = page.clone();
        fixed.power_feed_id = 9;
        assert_eq!(resolve_feeds(&fixed, &feeds), Ok((9, 6)));

        assert_eq!(resolve_feeds(&page, &feeds[..1]), Err(LoadFailure::FeedNotConfigured));
    }

    #[test]
    fn test_daily_usage_differences() {
        let points = [(1000, 100.0), (2000, 112.5), (3000, 120.0)];
        let usage = daily_usage_from_cumulative(&points, Some(123.5));
        assert_eq!(usage.bars.len(), 3);
        assert_eq!(usage.bars[0], Sample::new("1000", 12.5));
        assert_eq!(usage.bars[1], Sample::new("2000", 7.5));
        assert_eq!(usage.bars[2], Sample::new("3000", 3.5));
        assert_eq!(usage.today_kwh, 3.5);
        assert_eq!(usage.day_start_kwh, Some(120.0));
    }

    #[test]
    fn test_daily_usage_edge_cases() {
        assert_eq!(daily_usage_from_cumulative(&[], Some(10.0)), DailyUsage::default());
        let reset = daily_usage_from_cumulative(&[(1, 50.0), (2, 3.0)], None);
        assert_eq!(reset.bars, vec![Sample::new("1", 0.0)]);
        assert_eq!(reset.today_kwh, 0.0);
        assert_eq!(reset.day_start_kwh, Some(3.0));
    }

    #[test]
    fn test_daily_range_starts_at_midnight() {
        let now = Local::now();
        let (start, end) = daily_range(now, 7);
        assert_eq!(end, now.timestamp_millis());
        assert_eq!(start, start_of_day(now - ChronoDuration::days(7)).timestamp_millis());
        assert!(end - start >= 7 * 86_400_000 - 3_600_000);
    }

    #[test]
    fn test_failure_messages() {
        assert_eq!(LoadFailure::from(ClientError::NotConfigured), LoadFailure::ServerNotConfigured);
        assert_eq!(LoadFailure::FeedNotConfigured.to_string(), "Feed not configured");
    }
}
