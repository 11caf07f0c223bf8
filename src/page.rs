use chrono::Local;
use iced::Task;
use std::time::{Duration, Instant};

use crate::chart::{ChartAdapter, ChartKind, ChartModel};
use crate::emoncms::{EmonClient, Feed};
use crate::loader::{self, Delivery, LoadFailure, LoadKind, Loaded, RefreshScheduler, USE_HISTORY_MIN_INTERVAL};
use crate::persistence::{ChartSnapshot, PageState};
use crate::sample::{Sample, SampleBuffer, Stats};
use crate::settings::{format_readings, Account, PageReadings, PageSettings};
use crate::window::{
    start_of_day, ChartLayout, DurationSelection, Retention, WindowPolicy, WindowSelection, DEFAULT_BAR_DAYS,
};

/// Fires once the watched text has stayed the same for `window`, then re-arms.
#[derive(Debug, Clone)]
pub struct StaleWatch {
    window: Duration,
    last: Option<String>,
    since: Option<Instant>,
}

impl StaleWatch {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: None,
            since: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn observe(&mut self, text: &str, now: Instant) -> bool {
        if self.last.as_deref() != Some(text) {
            self.last = Some(text.to_string());
            self.since = Some(now);
            return false;
        }
        match self.since {
            Some(since) if now.duration_since(since) >= self.window => {
                self.since = Some(now);
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.since = None;
    }
}

/// Live view of one page: two buffers, their policies and charts, and the
/// loads feeding them.
#[derive(Debug)]
pub struct PageView {
    settings: PageSettings,
    account_name: String,
    client: Option<EmonClient>,
    /// Resolved feed ids; AUTO until the feed list has been read.
    power_feed: i64,
    use_feed: i64,
    feeds: Vec<Feed>,
    window: WindowSelection,
    duration: DurationSelection,
    layout: Option<ChartLayout>,
    power_policy: WindowPolicy,
    usage_policy: WindowPolicy,
    power: SampleBuffer,
    usage: SampleBuffer,
    power_chart: ChartModel,
    usage_chart: ChartModel,
    scheduler: RefreshScheduler,
    power_now: f64,
    today_kwh: f64,
    day_start_kwh: Option<f64>,
    show_cost: bool,
    status: Option<LoadFailure>,
    last_use_fetch: Option<Instant>,
    stale: StaleWatch,
    resolved: Option<PageSettings>,
}

impl PageView {
    pub fn new(settings: PageSettings, account: &Account, show_cost: bool, stale_window: Duration) -> Self {
        let client = match EmonClient::for_account(account) {
            Ok(c) => Some(c),
            Err(e) => {
                tracing::info!(account = account.id, error = %e, "page has no usable server");
                None
            }
        };
        let window = WindowSelection::default();
        let id = settings.id;
        let mut view = Self {
            power_feed: settings.power_feed_id,
            use_feed: settings.use_feed_id,
            settings,
            account_name: account.display_name().to_string(),
            client,
            feeds: Vec::new(),
            window,
            duration: DurationSelection::default(),
            layout: None,
            power_policy: WindowPolicy::evaluate(window, None),
            usage_policy: WindowPolicy::daily_bars(DEFAULT_BAR_DAYS),
            power: SampleBuffer::unbounded(),
            usage: SampleBuffer::unbounded(),
            power_chart: ChartModel::new(ChartKind::Line),
            usage_chart: ChartModel::new(ChartKind::Bars),
            scheduler: RefreshScheduler::new(id),
            power_now: 0.0,
            today_kwh: 0.0,
            day_start_kwh: None,
            show_cost,
            status: None,
            last_use_fetch: None,
            stale: StaleWatch::new(stale_window),
            resolved: None,
        };
        view.apply_cost_scale();
        view.render_all();
        view
    }

    /// Bring back the state saved at the last teardown. Each chart is
    /// restored only if it was showing the feed configured now.
    pub fn restore(&mut self, state: &PageState) {
        self.window = state.window();
        self.duration = state.duration;
        self.show_cost = state.show_cost;
        self.power_policy = WindowPolicy::evaluate(self.window, self.layout);
        // A trace saved under another window would carry the wrong spacing.
        let same_window = state.power.window() == self.window;
        if let Some(buf) = state.power.restore(self.power_feed).filter(|_| same_window) {
            self.power = buf;
            self.power_now = state.power_now;
        }
        if let Some(buf) = state.usage.restore(self.use_feed) {
            self.usage = buf;
            self.today_kwh = state.today_kwh;
        }
        self.power_policy.apply(&mut self.power, Local::now());
        tracing::debug!(
            page = self.settings.id,
            power = self.power.len(),
            usage = self.usage.len(),
            "page state restored"
        );
        self.apply_cost_scale();
        self.render_all();
    }

    pub fn snapshot(&self) -> PageState {
        PageState {
            power: ChartSnapshot::save(&self.power, self.power_feed, self.window),
            usage: ChartSnapshot::save(&self.usage, self.use_feed, self.window),
            power_now: self.power_now,
            today_kwh: self.today_kwh,
            window: self.window.token().to_string(),
            duration: self.duration,
            show_cost: self.show_cost,
        }
    }

    /// Stop all loads for good and hand back what should be persisted.
    pub fn teardown(&mut self) -> PageState {
        self.scheduler.dispose();
        self.snapshot()
    }

    pub fn id(&self) -> i64 {
        self.settings.id
    }

    pub fn settings(&self) -> &PageSettings {
        &self.settings
    }

    pub fn feeds(&self) -> &[Feed] {
        &self.feeds
    }

    pub fn window(&self) -> WindowSelection {
        self.window
    }

    pub fn duration(&self) -> DurationSelection {
        self.duration
    }

    pub fn show_cost(&self) -> bool {
        self.show_cost
    }

    pub fn power_chart(&self) -> &ChartModel {
        &self.power_chart
    }

    pub fn usage_chart(&self) -> &ChartModel {
        &self.usage_chart
    }

    pub fn power_stats(&self) -> Option<Stats> {
        self.power.stats()
    }

    pub fn readings(&self) -> PageReadings {
        format_readings(self.power_now, self.today_kwh, &self.settings, self.show_cost)
    }

    pub fn status_message(&self) -> Option<String> {
        self.status.as_ref().map(ToString::to_string)
    }

    /// Settings whose AUTO feeds were resolved since the last call.
    pub fn take_resolved_settings(&mut self) -> Option<PageSettings> {
        self.resolved.take()
    }

    /// First loads after construction or restore.
    pub fn start(&mut self) -> Task<Delivery> {
        if self.client.is_none() {
            self.status = Some(LoadFailure::ServerNotConfigured);
            return Task::none();
        }
        if self.settings.needs_feed_lookup() {
            return self.load(LoadKind::Feeds);
        }
        if !self.settings.feeds_configured() {
            self.status = Some(LoadFailure::FeedNotConfigured);
            return Task::none();
        }
        let mut tasks = vec![self.load(LoadKind::PowerNow), self.load(LoadKind::UseHistory)];
        if !self.power_policy.is_current(&self.power, Local::now().timestamp_millis()) {
            tasks.push(self.load(LoadKind::PowerHistory));
        }
        Task::batch(tasks)
    }

    /// Periodic refresh: power-now every tick, daily usage when due.
    pub fn tick(&mut self, now: Instant) -> Task<Delivery> {
        if !self.feeds_ready() {
            if self.client.is_some() && self.settings.needs_feed_lookup() {
                return self.load(LoadKind::Feeds);
            }
            return Task::none();
        }
        let mut tasks = vec![self.load(LoadKind::PowerNow)];
        let due = self
            .last_use_fetch
            .map_or(true, |t| now.duration_since(t) >= USE_HISTORY_MIN_INTERVAL);
        if due {
            tasks.push(self.load(LoadKind::UseHistory));
        }
        Task::batch(tasks)
    }

    /// Notification text when the power reading has been frozen too long.
    pub fn check_stale(&mut self, now: Instant) -> Option<String> {
        if !self.feeds_ready() || self.status.is_some() {
            self.stale.reset();
            return None;
        }
        let shown = self.readings().now.value;
        self.stale.observe(&shown, now).then(|| {
            format!(
                "Account : {} | The power value has not changed over the last {} minutes!",
                self.account_name,
                self.stale.window().as_secs() / 60
            )
        })
    }

    pub fn select_window(&mut self, selection: WindowSelection) -> Task<Delivery> {
        if selection == self.window && !self.power.is_empty() {
            return Task::none();
        }
        self.window = selection;
        self.power_policy = WindowPolicy::evaluate(selection, self.layout);
        self.power.clear();
        self.power_chart.render(&self.power, &self.power_policy);
        self.restart_loads()
    }

    pub fn select_duration(&mut self, duration: DurationSelection) -> Task<Delivery> {
        self.duration = duration;
        if self.reevaluate_usage_policy() {
            self.last_use_fetch = None;
            return self.load(LoadKind::UseHistory);
        }
        Task::none()
    }

    pub fn set_stale_window(&mut self, window: Duration) {
        if window != self.stale.window() {
            self.stale = StaleWatch::new(window);
        }
    }

    pub fn set_show_cost(&mut self, show: bool) {
        self.show_cost = show;
        self.apply_cost_scale();
        self.usage_chart.render(&self.usage, &self.usage_policy);
    }

    /// The hosting area got its size. Layout-dependent policies are
    /// evaluated from here on.
    pub fn on_layout(&mut self, layout: ChartLayout) -> Task<Delivery> {
        if self.layout == Some(layout) {
            return Task::none();
        }
        self.layout = Some(layout);
        let policy = WindowPolicy::evaluate(self.window, self.layout);
        let mut tasks = Vec::new();
        if policy != self.power_policy {
            let grew = policy.capacity() > self.power_policy.capacity();
            self.power_policy = policy;
            self.power_policy.apply(&mut self.power, Local::now());
            self.power_chart.render(&self.power, &self.power_policy);
            if grew {
                tasks.push(self.load(LoadKind::PowerHistory));
            }
        }
        if self.reevaluate_usage_policy() {
            tasks.push(self.load(LoadKind::UseHistory));
        }
        Task::batch(tasks)
    }

    /// Settings edited elsewhere. A changed feed discards that chart's data.
    pub fn apply_settings(&mut self, settings: PageSettings) -> Task<Delivery> {
        if settings == self.settings {
            return Task::none();
        }
        if settings.power_feed_id != self.settings.power_feed_id {
            self.power_feed = settings.power_feed_id;
            self.power.clear();
            self.power_now = 0.0;
        }
        if settings.use_feed_id != self.settings.use_feed_id {
            self.use_feed = settings.use_feed_id;
            self.usage.clear();
            self.today_kwh = 0.0;
            self.day_start_kwh = None;
        }
        self.settings = settings;
        self.apply_cost_scale();
        self.render_all();
        self.restart_loads()
    }

    /// Route a finished load into the page; stale deliveries are dropped.
    pub fn deliver(&mut self, delivery: Delivery) -> Task<Delivery> {
        if !self.scheduler.accept(&delivery.ticket) {
            return Task::none();
        }
        let loaded = match delivery.result {
            Ok(loaded) => loaded,
            Err(failure) => {
                tracing::warn!(page = self.settings.id, kind = ?delivery.ticket.kind, %failure, "load failed");
                self.status = Some(failure);
                return Task::none();
            }
        };
        self.status = None;
        match loaded {
            Loaded::Feeds { feeds, power, usage } => {
                self.feeds = feeds;
                if power != self.power_feed || usage != self.use_feed {
                    self.power_feed = power;
                    self.use_feed = usage;
                    self.settings.power_feed_id = power;
                    self.settings.use_feed_id = usage;
                    self.resolved = Some(self.settings.clone());
                    tracing::info!(page = self.settings.id, power, usage, "feeds resolved");
                }
                return self.start();
            }
            Loaded::PowerNow { watts, total_kwh, at_ms } => {
                self.power_now = watts;
                if let Some(start) = self.day_start_kwh {
                    self.today_kwh = (total_kwh - start).max(0.0);
                    self.update_today_bar();
                }
                if self.power.is_empty() {
                    return Task::none();
                }
                if !self.power_policy.is_current(&self.power, at_ms) {
                    tracing::debug!(page = self.settings.id, "power trace fell behind, reloading");
                    return self.load(LoadKind::PowerHistory);
                }
                if self.power_policy.accepts_live(&self.power, at_ms) {
                    self.power.push(Sample::new(at_ms.to_string(), watts));
                    self.power_policy.apply(&mut self.power, Local::now());
                    self.power_chart.render(&self.power, &self.power_policy);
                }
            }
            Loaded::PowerHistory(samples) => {
                self.power.replace(samples);
                self.power_policy.apply(&mut self.power, Local::now());
                self.power_chart.render(&self.power, &self.power_policy);
            }
            Loaded::UseHistory(daily) => {
                self.today_kwh = daily.today_kwh;
                self.day_start_kwh = daily.day_start_kwh;
                self.usage.replace(daily.bars);
                self.usage_policy.apply(&mut self.usage, Local::now());
                self.usage_chart.render(&self.usage, &self.usage_policy);
            }
        }
        Task::none()
    }

    fn feeds_ready(&self) -> bool {
        self.client.is_some() && self.settings.feeds_configured()
    }

    fn restart_loads(&mut self) -> Task<Delivery> {
        self.scheduler.cancel_all();
        tracing::debug!(page = self.settings.id, generation = self.scheduler.generation(), "restarting loads");
        self.last_use_fetch = None;
        self.start()
    }

    fn reevaluate_usage_policy(&mut self) -> bool {
        let days = self
            .layout
            .map(|l| l.days_to_display(self.duration.added_days(l.is_landscape())))
            .unwrap_or(DEFAULT_BAR_DAYS);
        let policy = WindowPolicy::daily_bars(days);
        if policy == self.usage_policy {
            return false;
        }
        self.usage_policy = policy;
        true
    }

    fn update_today_bar(&mut self) {
        let today = start_of_day(Local::now()).timestamp_millis();
        let is_today = self.usage.last().and_then(Sample::timestamp_ms) == Some(today);
        if is_today {
            self.usage.set_last_value(self.today_kwh);
            self.usage_chart.render(&self.usage, &self.usage_policy);
        }
    }

    fn apply_cost_scale(&mut self) {
        let scale = if self.show_cost {
            self.settings.unit_cost_value()
        } else {
            1.0
        };
        self.usage_chart.set_value_scale(scale);
    }

    fn render_all(&mut self) {
        self.power_chart.render(&self.power, &self.power_policy);
        self.usage_chart.render(&self.usage, &self.usage_policy);
    }

    fn load(&mut self, kind: LoadKind) -> Task<Delivery> {
        let Some(client) = self.client.clone() else {
            return Task::none();
        };
        if kind != LoadKind::Feeds && !self.feeds_ready() {
            return Task::none();
        }
        let Some(ticket) = self.scheduler.begin(kind) else {
            return Task::none();
        };
        let scale = self.settings.power_scale_factor();
        match kind {
            LoadKind::Feeds => self
                .scheduler
                .spawn(ticket, loader::load_feeds(client, self.settings.clone())),
            LoadKind::PowerNow => self
                .scheduler
                .spawn(ticket, loader::load_power_now(client, self.power_feed, self.use_feed, scale)),
            LoadKind::PowerHistory => self
                .scheduler
                .spawn(ticket, loader::load_power_history(client, self.power_feed, self.power_policy, scale)),
            LoadKind::UseHistory => {
                self.last_use_fetch = Some(Instant::now());
                let days = match self.usage_policy.retention {
                    Retention::CalendarDays(d) => d,
                    Retention::FixedCount(_) => DEFAULT_BAR_DAYS,
                };
                self.scheduler
                    .spawn(ticket, loader::load_use_history(client, self.use_feed, days))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{DailyUsage, Ticket};
    use crate::settings::AUTO_FEED;
    use crate::window::LabelFormat;

    fn account() -> Account {
        Account {
            id: 1,
            name: "Home".into(),
            url: "emoncms.org".into(),
            use_ssl: true,
            api_key: "key".into(),
        }
    }

    fn page() -> PageSettings {
        let mut p = PageSettings::with_auto_feeds("My Electric");
        p.id = 10;
        p.power_feed_id = 1;
        p.use_feed_id = 2;
        p
    }

    fn view() -> PageView {
        PageView::new(page(), &account(), false, Duration::from_secs(1200))
    }

    fn ticket(view: &mut PageView, kind: LoadKind) -> Ticket {
        view.scheduler.begin(kind).unwrap()
    }

    fn now_ms() -> i64 {
        Local::now().timestamp_millis()
    }

    #[test]
    fn test_stale_watch_fires_once_per_window() {
        let start = Instant::now();
        let mut watch = StaleWatch::new(Duration::from_secs(60));
        assert!(!watch.observe("640", start));
        assert!(!watch.observe("640", start + Duration::from_secs(30)));
        assert!(watch.observe("640", start + Duration::from_secs(61)));
        assert!(!watch.observe("640", start + Duration::from_secs(90)));
        assert!(!watch.observe("650", start + Duration::from_secs(200)));
    }

    #[test]
    fn test_power_history_renders_all_points() {
        let mut v = view();
        let t = ticket(&mut v, LoadKind::PowerHistory);
        let base = now_ms() - 3_600_000;
        let samples: Vec<Sample> = (0..3).map(|i| Sample::new((base + i * 60_000).to_string(), 100.0 + i as f64)).collect();
        let _ = v.deliver(Delivery { ticket: t, result: Ok(Loaded::PowerHistory(samples)) });
        assert_eq!(v.power_chart().point_count(), 3);
        assert_eq!(v.power_chart().format(), Some(LabelFormat::HourMinute));
    }

    #[test]
    fn test_cancelled_delivery_is_dropped() {
        let mut v = view();
        let t = ticket(&mut v, LoadKind::PowerHistory);
        let _ = v.select_window(WindowSelection::Week);
        let samples = vec![Sample::new(now_ms().to_string(), 1.0)];
        let _ = v.deliver(Delivery { ticket: t, result: Ok(Loaded::PowerHistory(samples)) });
        assert_eq!(v.power_chart().point_count(), 0);
        assert_eq!(v.power_chart().format(), Some(LabelFormat::DayOfWeek));
    }

    #[test]
    fn test_teardown_rejects_late_delivery() {
        let mut v = view();
        let t = ticket(&mut v, LoadKind::PowerNow);
        let state = v.teardown();
        let _ = v.deliver(Delivery {
            ticket: t,
            result: Ok(Loaded::PowerNow { watts: 999.0, total_kwh: 0.0, at_ms: now_ms() }),
        });
        assert_eq!(v.readings().now.value, "0");
        assert_eq!(state.power.feed_id, 1);
    }

    #[test]
    fn test_failure_sets_status() {
        let mut v = view();
        let t = ticket(&mut v, LoadKind::PowerNow);
        let _ = v.deliver(Delivery { ticket: t, result: Err(LoadFailure::Connection("timeout".into())) });
        assert_eq!(v.status_message().as_deref(), Some("Connection error: timeout"));
    }

    #[test]
    fn test_auto_feeds_resolved_once() {
        let mut settings = page();
        settings.power_feed_id = AUTO_FEED;
        settings.use_feed_id = AUTO_FEED;
        let mut v = PageView::new(settings, &account(), false, Duration::from_secs(1200));
        let t = ticket(&mut v, LoadKind::Feeds);
        let _ = v.deliver(Delivery {
            ticket: t,
            result: Ok(Loaded::Feeds { feeds: Vec::new(), power: 5, usage: 6 }),
        });
        let resolved = v.take_resolved_settings().unwrap();
        assert_eq!((resolved.power_feed_id, resolved.use_feed_id), (5, 6));
        assert!(v.take_resolved_settings().is_none());
    }

    #[test]
    fn test_restore_guards_feed_identity() {
        let mut v = view();
        let buf = SampleBuffer::from_samples([Sample::new(now_ms().to_string(), 120.0)]);
        let state = PageState {
            power: ChartSnapshot::save(&buf, 1, WindowSelection::ThreeHours),
            usage: ChartSnapshot::save(&buf, 99, WindowSelection::ThreeHours),
            power_now: 120.0,
            today_kwh: 3.0,
            window: "3h".into(),
            duration: DurationSelection::OneWeek,
            show_cost: false,
        };
        v.restore(&state);
        assert_eq!(v.window(), WindowSelection::ThreeHours);
        assert_eq!(v.power_chart().point_count(), 1);
        assert_eq!(v.usage_chart().point_count(), 0);
        assert_eq!(v.readings().today.value, "0.0");
    }

    fn restored_state(samples: SampleBuffer, window: WindowSelection) -> PageState {
        PageState {
            power: ChartSnapshot::save(&samples, 1, window),
            usage: ChartSnapshot::save(&SampleBuffer::unbounded(), 2, window),
            power_now: 500.0,
            today_kwh: 0.0,
            window: window.token().into(),
            duration: DurationSelection::OneWeek,
            show_cost: false,
        }
    }

    #[test]
    fn test_old_restored_trace_is_dropped_and_refetched() {
        let mut v = view();
        let two_days_ago = now_ms() - 2 * 86_400_000;
        let old = SampleBuffer::from_samples((0..3).map(|i| Sample::new((two_days_ago + i * 60_000).to_string(), 100.0)));
        v.restore(&restored_state(old, WindowSelection::SixHours));
        assert_eq!(v.power_chart().point_count(), 0);
        let _ = v.start();
        assert!(v.scheduler.is_in_flight(LoadKind::PowerHistory));
    }

    #[test]
    fn test_recent_restored_trace_is_kept() {
        let mut v = view();
        let recent = SampleBuffer::from_samples((0..3).map(|i| Sample::new((now_ms() - 180_000 + i * 60_000).to_string(), 100.0)));
        v.restore(&restored_state(recent, WindowSelection::SixHours));
        assert_eq!(v.power_chart().point_count(), 3);
        let _ = v.start();
        assert!(!v.scheduler.is_in_flight(LoadKind::PowerHistory));
        v.scheduler.cancel_all();

        // the next reading arrives after a long pause
        let t = ticket(&mut v, LoadKind::PowerNow);
        let later = now_ms() + 86_400_000;
        let _ = v.deliver(Delivery {
            ticket: t,
            result: Ok(Loaded::PowerNow { watts: 700.0, total_kwh: 0.0, at_ms: later }),
        });
        assert_eq!(v.power_chart().point_count(), 3);
        assert!(v.scheduler.is_in_flight(LoadKind::PowerHistory));
    }

    #[test]
    fn test_trace_from_other_window_is_not_restored() {
        let mut v = view();
        let recent = SampleBuffer::from_samples([Sample::new(now_ms().to_string(), 100.0)]);
        let mut state = restored_state(recent.clone(), WindowSelection::SixHours);
        state.power = ChartSnapshot::save(&recent, 1, WindowSelection::Week);
        v.restore(&state);
        assert_eq!(v.power_chart().point_count(), 0);
    }

    #[test]
    fn test_failed_lookup_of_use_feed_is_retried() {
        let mut settings = page();
        settings.use_feed_id = AUTO_FEED;
        let mut v = PageView::new(settings, &account(), false, Duration::from_secs(1200));
        let t = ticket(&mut v, LoadKind::Feeds);
        let _ = v.deliver(Delivery { ticket: t, result: Err(LoadFailure::Connection("refused".into())) });
        assert!(!v.scheduler.is_in_flight(LoadKind::Feeds));
        let _ = v.tick(Instant::now());
        assert!(v.scheduler.is_in_flight(LoadKind::Feeds));
    }

    #[test]
    fn test_usage_and_live_today_bar() {
        let mut v = view();
        let today = start_of_day(Local::now()).timestamp_millis();
        let yesterday = today - 86_400_000;
        let t = ticket(&mut v, LoadKind::UseHistory);
        let _ = v.deliver(Delivery {
            ticket: t,
            result: Ok(Loaded::UseHistory(DailyUsage {
                bars: vec![Sample::new(yesterday.to_string(), 8.0), Sample::new(today.to_string(), 1.0)],
                today_kwh: 1.0,
                day_start_kwh: Some(100.0),
            })),
        });
        assert_eq!(v.usage_chart().point_count(), 2);
        let t = ticket(&mut v, LoadKind::PowerNow);
        let _ = v.deliver(Delivery {
            ticket: t,
            result: Ok(Loaded::PowerNow { watts: 500.0, total_kwh: 102.5, at_ms: now_ms() }),
        });
        assert_eq!(v.readings().today.value, "2.5");
        assert_eq!(v.usage_chart().values(), &[8.0f32, 2.5]);
    }

    #[test]
    fn test_cost_mode_scales_bars() {
        let mut v = view();
        let t = ticket(&mut v, LoadKind::UseHistory);
        let today = start_of_day(Local::now()).timestamp_millis();
        let _ = v.deliver(Delivery {
            ticket: t,
            result: Ok(Loaded::UseHistory(DailyUsage {
                bars: vec![Sample::new(today.to_string(), 10.0)],
                today_kwh: 10.0,
                day_start_kwh: None,
            })),
        });
        v.set_show_cost(true);
        // default unit cost 0.15
        assert_eq!(v.usage_chart().values(), &[1.5f32]);
        assert_eq!(v.readings().today.value, "1.50");
    }

    #[test]
    fn test_layout_defers_bar_count() {
        let mut v = view();
        assert_eq!(v.usage_policy, WindowPolicy::daily_bars(DEFAULT_BAR_DAYS));
        let _ = v.on_layout(ChartLayout { width: 1040.0, height: 700.0, density: 1.0 });
        // 1040 / 52 = 20, landscape one-week adds -10
        assert_eq!(v.usage_policy, WindowPolicy::daily_bars(10));
    }
}
