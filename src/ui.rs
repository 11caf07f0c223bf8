use chrono::{Local, TimeZone};
use crossbeam_channel::Receiver;
use iced::widget::canvas::Canvas;
use iced::widget::{button, checkbox, column, container, pick_list, row, scrollable, text, text_input, Column, Row, Space};
use iced::{window, Alignment, Background, Border, Color, Element, Font, Length, Shadow, Size, Subscription, Task, Theme, Vector};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::chart::{ChartColors, ChartModel, ChartView};
use crate::context::{AppContext, AppEvent};
use crate::emoncms::{self, EmonClient, Feed, FeedGroup};
use crate::loader::{Delivery, POWER_NOW_INTERVAL};
use crate::page::PageView;
use crate::persistence::StateFile;
use crate::preferences::Preferences;
use crate::settings::{Account, PageSettings, Quantity, AUTO_FEED, COST_SYMBOL_OPTIONS, SCALE_OPTIONS};
use crate::store::Store;
use crate::theme::{build_palette, Palette, ThemeVariant};
use crate::window::{ChartLayout, DurationSelection, WindowSelection};

const MONO: Font = Font::MONOSPACE;
const SIDEBAR_WIDTH: f32 = 210.0;
const CONTENT_PADDING: f32 = 16.0;
const POWER_CHART_HEIGHT: f32 = 260.0;
const USAGE_CHART_HEIGHT: f32 = 200.0;
const STALE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Send a desktop notification (non-blocking, best-effort).
fn send_notification(title: &str, body: &str) {
    if let Err(e) = notify_rust::Notification::new()
        .summary(title)
        .body(body)
        .appname("emonview")
        .timeout(notify_rust::Timeout::Milliseconds(8000))
        .show()
    {
        tracing::warn!(error = %e, "desktop notification failed");
    }
}

// ─── MESSAGES ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Message {
    Tick,
    StaleCheck,
    Loaded(Delivery),
    Resized(Size),
    CloseRequested(window::Id),
    Show(Screen),
    OpenPage(i64),
    SelectAccount(i64),
    NewAccount,
    EditAccount,
    Account(AccountField),
    SaveAccount,
    DeleteAccount,
    NewPage,
    EditPage,
    Page(PageField),
    FormFeedsLoaded(Result<Vec<Feed>, String>),
    SavePage,
    DeletePage,
    ConfirmDelete(bool),
    WindowSelected(WindowSelection),
    DurationSelected(DurationSelection),
    ShowCost(bool),
    ThemeSelected(ThemeVariant),
    StaleAlertToggled(bool),
    StaleAlertMinutes(u64),
    ShowFeeds,
    FeedsListed(Result<Vec<Feed>, String>),
    ToggleFeedGroup(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Page,
    AccountSettings,
    PageSettings,
    Appearance,
    Feeds,
}

#[derive(Debug, Clone)]
pub enum AccountField {
    Name(String),
    Url(String),
    UseSsl(bool),
    ApiKey(String),
}

#[derive(Debug, Clone)]
pub enum PageField {
    Name(String),
    Quantity(Quantity),
    QuantityName(String),
    QuantityUnit(String),
    PowerFeed(FeedChoice),
    UseFeed(FeedChoice),
    Scale(&'static str),
    UnitCost(String),
    CostSymbol(CostSymbol),
    CustomSymbol(String),
}

/// Entry of the feed pick lists.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedChoice {
    Auto,
    Feed { id: i64, label: String },
}

impl FeedChoice {
    fn id(&self) -> i64 {
        match self {
            FeedChoice::Auto => AUTO_FEED,
            FeedChoice::Feed { id, .. } => *id,
        }
    }

    fn options(feeds: &[Feed]) -> Vec<FeedChoice> {
        std::iter::once(FeedChoice::Auto)
            .chain(feeds.iter().filter(|f| f.is_chartable()).map(|f| FeedChoice::Feed {
                id: f.id,
                label: f.to_string(),
            }))
            .collect()
    }

    fn for_id(id: i64, feeds: &[Feed]) -> FeedChoice {
        if id == AUTO_FEED {
            return FeedChoice::Auto;
        }
        let label = feeds
            .iter()
            .find(|f| f.id == id)
            .map(ToString::to_string)
            .unwrap_or_else(|| format!("{id}"));
        FeedChoice::Feed { id, label }
    }
}

impl std::fmt::Display for FeedChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedChoice::Auto => f.write_str("Auto"),
            FeedChoice::Feed { label, .. } => f.write_str(label),
        }
    }
}

/// Cost symbol option with a readable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostSymbol(&'static str);

impl std::fmt::Display for CostSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            "0" => f.write_str("Locale (£)"),
            "custom" => f.write_str("Custom"),
            s => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeleteTarget {
    Account,
    Page,
}

// ─── FORMS ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
struct AccountForm {
    editing: Option<i64>,
    name: String,
    url: String,
    use_ssl: bool,
    api_key: String,
}

impl AccountForm {
    fn edit(account: &Account) -> Self {
        Self {
            editing: Some(account.id),
            name: account.name.clone(),
            url: account.url.clone(),
            use_ssl: account.use_ssl,
            api_key: account.api_key.clone(),
        }
    }

    fn to_account(&self) -> Account {
        Account {
            id: self.editing.unwrap_or_default(),
            name: self.name.trim().to_string(),
            url: self.url.trim().to_string(),
            use_ssl: self.use_ssl,
            api_key: self.api_key.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct PageForm {
    base: PageSettings,
    feeds: Vec<Feed>,
    loading_feeds: bool,
    feed_error: Option<String>,
}

impl PageForm {
    fn edit(settings: &PageSettings, feeds: &[Feed]) -> Self {
        Self {
            base: settings.clone(),
            feeds: feeds.to_vec(),
            loading_feeds: false,
            feed_error: None,
        }
    }

    fn apply(&mut self, field: PageField) {
        let s = &mut self.base;
        match field {
            PageField::Name(v) => s.name = v,
            PageField::Quantity(q) => s.quantity = q,
            PageField::QuantityName(v) => s.quantity_name = v,
            PageField::QuantityUnit(v) => s.quantity_unit = v,
            PageField::PowerFeed(c) => s.power_feed_id = c.id(),
            PageField::UseFeed(c) => s.use_feed_id = c.id(),
            PageField::Scale(v) => s.power_scale = v.to_string(),
            PageField::UnitCost(v) => s.unit_cost = v,
            PageField::CostSymbol(c) => s.cost_symbol = c.0.to_string(),
            PageField::CustomSymbol(v) => s.custom_currency_symbol = v,
        }
    }
}

// ─── FEED BROWSER ───────────────────────────────────────────────

/// The current account's feeds grouped by tag, refreshed while on screen.
#[derive(Debug, Clone, Default)]
struct FeedBrowser {
    groups: Vec<FeedGroup>,
    expanded: BTreeSet<String>,
    loading: bool,
    error: Option<String>,
}

impl FeedBrowser {
    /// A failed refresh keeps the last good list.
    fn receive(&mut self, result: Result<Vec<Feed>, String>) {
        self.loading = false;
        match result {
            Ok(feeds) => {
                self.groups = emoncms::group_by_tag(&feeds);
                let tags: BTreeSet<String> = self.groups.iter().map(|g| g.tag.clone()).collect();
                self.expanded.retain(|t| tags.contains(t));
                self.error = None;
            }
            Err(e) => self.error = Some(e),
        }
    }

    fn toggle(&mut self, tag: String) {
        if !self.expanded.remove(&tag) {
            self.expanded.insert(tag);
        }
    }
}

fn format_feed_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn format_feed_time(time: Option<i64>) -> String {
    time.and_then(|t| Local.timestamp_opt(t, 0).single())
        .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
}

// ─── APPLICATION ────────────────────────────────────────────────

pub struct EmonView {
    ctx: Option<AppContext>,
    events: Option<Receiver<AppEvent>>,
    prefs: Preferences,
    pal: Palette,
    states: StateFile,
    screen: Screen,
    page: Option<PageView>,
    window_size: Option<Size>,
    account_form: AccountForm,
    page_form: Option<PageForm>,
    confirm_delete: Option<DeleteTarget>,
    status_message: Option<String>,
    feed_browser: FeedBrowser,
}

impl EmonView {
    pub fn new() -> (Self, Task<Message>) {
        let prefs = Preferences::load();
        let (ctx, events, status_message) = match Store::open().and_then(|s| AppContext::load(s, prefs.current_account)) {
            Ok(mut ctx) => {
                let rx = ctx.subscribe();
                (Some(ctx), Some(rx), None)
            }
            Err(e) => {
                tracing::error!(error = %e, "account store unavailable");
                (None, None, Some(format!("Account store unavailable: {e}")))
            }
        };
        let mut app = Self {
            ctx,
            events,
            pal: build_palette(prefs.theme),
            prefs,
            states: StateFile::default_location(),
            screen: Screen::Page,
            page: None,
            window_size: None,
            account_form: AccountForm::default(),
            page_form: None,
            confirm_delete: None,
            status_message,
            feed_browser: FeedBrowser::default(),
        };
        let open = match app.prefs.current_page.filter(|id| app.ctx.as_ref().is_some_and(|c| c.page(*id).is_some())) {
            Some(id) => app.open_page(id),
            None => app.open_first_page(),
        };
        let measure = window::get_latest()
            .and_then(window::get_size)
            .map(Message::Resized);
        (app, Task::batch([open, measure]))
    }

    pub fn title(&self) -> String {
        match &self.page {
            Some(page) => format!("emonview - {}", page.settings().name),
            None => "emonview".to_string(),
        }
    }

    pub fn theme(&self) -> Theme {
        self.prefs.theme.iced_theme()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let poll = iced::time::every(POWER_NOW_INTERVAL).map(|_| Message::Tick);
        let stale = iced::time::every(STALE_CHECK_INTERVAL).map(|_| Message::StaleCheck);
        let resize = window::resize_events().map(|(_id, size)| Message::Resized(size));
        let close = window::close_requests().map(Message::CloseRequested);
        Subscription::batch([poll, stale, resize, close])
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        let task = match message {
            Message::Tick => {
                let browse = if self.screen == Screen::Feeds && !self.feed_browser.loading {
                    self.list_feeds()
                } else {
                    Task::none()
                };
                let poll = match self.page.as_mut() {
                    Some(page) => page.tick(Instant::now()).map(Message::Loaded),
                    None => Task::none(),
                };
                Task::batch([browse, poll])
            }
            Message::StaleCheck => {
                if self.prefs.stale_alert_enabled {
                    if let Some(body) = self.page.as_mut().and_then(|p| p.check_stale(Instant::now())) {
                        tracing::info!(%body, "power reading is stale");
                        send_notification("emonview", &body);
                    }
                }
                Task::none()
            }
            Message::Loaded(delivery) => {
                let task = match self.page.as_mut() {
                    Some(page) => page.deliver(delivery).map(Message::Loaded),
                    None => Task::none(),
                };
                self.persist_resolved_feeds();
                task
            }
            Message::Resized(size) => {
                self.window_size = Some(size);
                let layout = self.chart_layout();
                match (self.page.as_mut(), layout) {
                    (Some(page), Some(layout)) => page.on_layout(layout).map(Message::Loaded),
                    _ => Task::none(),
                }
            }
            Message::CloseRequested(id) => {
                tracing::info!(?id, "close requested, saving page state");
                self.close_page(true);
                self.save_prefs();
                iced::exit()
            }
            Message::Show(screen) => {
                self.confirm_delete = None;
                self.screen = screen;
                Task::none()
            }
            Message::OpenPage(id) => {
                self.screen = Screen::Page;
                self.open_page(id)
            }
            Message::SelectAccount(id) => {
                if let Some(ctx) = self.ctx.as_mut() {
                    if ctx.current_account_id() != Some(id) {
                        self.status_message = ctx.select_account(Some(id)).err().map(|e| e.to_string());
                    }
                }
                self.screen = Screen::Page;
                Task::none()
            }
            Message::NewAccount => {
                self.account_form = AccountForm {
                    use_ssl: true,
                    ..AccountForm::default()
                };
                self.screen = Screen::AccountSettings;
                Task::none()
            }
            Message::EditAccount => {
                if let Some(account) = self.ctx.as_ref().and_then(AppContext::current_account) {
                    self.account_form = AccountForm::edit(account);
                    self.screen = Screen::AccountSettings;
                }
                Task::none()
            }
            Message::Account(field) => {
                let f = &mut self.account_form;
                match field {
                    AccountField::Name(v) => f.name = v,
                    AccountField::Url(v) => f.url = v,
                    AccountField::UseSsl(v) => f.use_ssl = v,
                    AccountField::ApiKey(v) => f.api_key = v,
                }
                Task::none()
            }
            Message::SaveAccount => {
                self.save_account();
                Task::none()
            }
            Message::DeleteAccount => {
                self.confirm_delete = Some(DeleteTarget::Account);
                Task::none()
            }
            Message::NewPage => {
                if let Some(ctx) = self.ctx.as_mut() {
                    if let Some(account) = ctx.current_account_id() {
                        let name = format!("Page {}", ctx.pages().len() + 1);
                        if let Err(e) = ctx.add_page(account, PageSettings::with_auto_feeds(name)) {
                            self.status_message = Some(e.to_string());
                        }
                    }
                }
                Task::none()
            }
            Message::EditPage => self.edit_page(),
            Message::Page(field) => {
                if let Some(form) = self.page_form.as_mut() {
                    form.apply(field);
                }
                Task::none()
            }
            Message::FormFeedsLoaded(result) => {
                if let Some(form) = self.page_form.as_mut() {
                    form.loading_feeds = false;
                    match result {
                        Ok(feeds) => form.feeds = feeds,
                        Err(e) => form.feed_error = Some(e),
                    }
                }
                Task::none()
            }
            Message::SavePage => {
                if let (Some(form), Some(ctx)) = (self.page_form.take(), self.ctx.as_mut()) {
                    match ctx.update_page(form.base) {
                        Ok(()) => self.screen = Screen::Page,
                        Err(e) => self.status_message = Some(e.to_string()),
                    }
                }
                Task::none()
            }
            Message::DeletePage => {
                self.confirm_delete = Some(DeleteTarget::Page);
                Task::none()
            }
            Message::ConfirmDelete(confirmed) => {
                if let Some(target) = self.confirm_delete.take().filter(|_| confirmed) {
                    self.delete(target);
                }
                Task::none()
            }
            Message::WindowSelected(sel) => match self.page.as_mut() {
                Some(page) => page.select_window(sel).map(Message::Loaded),
                None => Task::none(),
            },
            Message::DurationSelected(d) => match self.page.as_mut() {
                Some(page) => page.select_duration(d).map(Message::Loaded),
                None => Task::none(),
            },
            Message::ShowCost(show) => {
                if let Some(page) = self.page.as_mut() {
                    page.set_show_cost(show);
                }
                self.prefs.show_cost = show;
                self.save_prefs();
                Task::none()
            }
            Message::ThemeSelected(theme) => {
                self.prefs.theme = theme;
                self.pal = build_palette(theme);
                if let Some(page) = &self.page {
                    page.power_chart().invalidate();
                    page.usage_chart().invalidate();
                }
                self.save_prefs();
                Task::none()
            }
            Message::StaleAlertToggled(on) => {
                self.prefs.stale_alert_enabled = on;
                self.save_prefs();
                Task::none()
            }
            Message::StaleAlertMinutes(minutes) => {
                self.prefs.stale_alert_minutes = minutes;
                let window = self.stale_window();
                if let Some(page) = self.page.as_mut() {
                    page.set_stale_window(window);
                }
                self.save_prefs();
                Task::none()
            }
            Message::ShowFeeds => {
                self.confirm_delete = None;
                self.screen = Screen::Feeds;
                self.list_feeds()
            }
            Message::FeedsListed(result) => {
                if let Err(e) = &result {
                    tracing::warn!(error = %e, "feed list refresh failed");
                }
                self.feed_browser.receive(result);
                Task::none()
            }
            Message::ToggleFeedGroup(tag) => {
                self.feed_browser.toggle(tag);
                Task::none()
            }
        };
        let events = self.handle_events();
        Task::batch([task, events])
    }

    // ─── PAGE LIFECYCLE ────────────────────────────────────────

    fn stale_window(&self) -> Duration {
        Duration::from_secs(self.prefs.stale_alert_minutes * 60)
    }

    fn chart_layout(&self) -> Option<ChartLayout> {
        let size = self.window_size?;
        Some(ChartLayout {
            width: (size.width - SIDEBAR_WIDTH - 2.0 * CONTENT_PADDING).max(1.0),
            height: size.height,
            density: 1.0,
        })
    }

    fn open_first_page(&mut self) -> Task<Message> {
        let first = self.ctx.as_ref().and_then(|c| c.pages().first().map(|p| p.id));
        match first {
            Some(id) => self.open_page(id),
            None => {
                self.close_page(true);
                Task::none()
            }
        }
    }

    fn open_page(&mut self, id: i64) -> Task<Message> {
        if self.page.as_ref().is_some_and(|p| p.id() == id) {
            return Task::none();
        }
        self.reopen_page(id)
    }

    /// Tear down the current view and build a fresh one for page `id`,
    /// restoring its last saved state.
    fn reopen_page(&mut self, id: i64) -> Task<Message> {
        self.close_page(true);
        let Some(ctx) = self.ctx.as_ref() else {
            return Task::none();
        };
        let (Some(settings), Some(account)) = (ctx.page(id).cloned(), ctx.current_account().cloned()) else {
            return Task::none();
        };
        let mut view = PageView::new(settings, &account, self.prefs.show_cost, self.stale_window());
        if let Some(state) = self.states.load(id) {
            view.restore(&state);
        }
        let layout = match self.chart_layout() {
            Some(layout) => view.on_layout(layout),
            None => Task::none(),
        };
        let start = view.start();
        tracing::info!(page = id, "page opened");
        self.page = Some(view);
        self.prefs.current_page = Some(id);
        self.save_prefs();
        Task::batch([layout, start]).map(Message::Loaded)
    }

    fn close_page(&mut self, persist: bool) {
        let Some(mut page) = self.page.take() else { return };
        let state = page.teardown();
        if persist {
            if let Err(e) = self.states.store(page.id(), state) {
                tracing::warn!(page = page.id(), path = %self.states.path().display(), error = %e, "could not save page state");
            }
        }
    }

    fn persist_resolved_feeds(&mut self) {
        let Some(settings) = self.page.as_mut().and_then(PageView::take_resolved_settings) else {
            return;
        };
        if let Some(ctx) = self.ctx.as_mut() {
            if let Err(e) = ctx.update_page(settings) {
                tracing::warn!(error = %e, "could not store resolved feeds");
            }
        }
    }

    /// React to account and page changes published by the context.
    fn handle_events(&mut self) -> Task<Message> {
        let events: Vec<AppEvent> = match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => return Task::none(),
        };
        let mut tasks = Vec::new();
        for event in events {
            tracing::debug!(?event, "app event");
            match event {
                AppEvent::AccountSelected(id) => {
                    self.feed_browser = FeedBrowser::default();
                    if self.screen == Screen::Feeds {
                        tasks.push(self.list_feeds());
                    }
                    self.prefs.current_account = id;
                    self.save_prefs();
                    tasks.push(self.open_first_page());
                }
                AppEvent::AccountUpdated(id) => {
                    let current = self.ctx.as_ref().and_then(AppContext::current_account_id);
                    if let (Some(page), true) = (self.page.as_ref().map(PageView::id), current == Some(id)) {
                        tasks.push(self.reopen_page(page));
                    }
                }
                AppEvent::PageAdded { page, .. } => tasks.push(self.open_page(page)),
                AppEvent::PageUpdated(id) => {
                    let settings = self.ctx.as_ref().and_then(|c| c.page(id).cloned());
                    if let (Some(view), Some(settings)) = (self.page.as_mut().filter(|p| p.id() == id), settings) {
                        tasks.push(view.apply_settings(settings).map(Message::Loaded));
                    }
                }
                AppEvent::PageDeleted(id) => {
                    if let Err(e) = self.states.remove(id) {
                        tracing::warn!(page = id, error = %e, "could not drop page state");
                    }
                    if self.page.as_ref().is_some_and(|p| p.id() == id) {
                        self.close_page(false);
                        tasks.push(self.open_first_page());
                    }
                }
                AppEvent::AccountAdded(_) | AppEvent::AccountDeleted(_) => {}
            }
        }
        Task::batch(tasks)
    }

    fn list_feeds(&mut self) -> Task<Message> {
        let client = self
            .ctx
            .as_ref()
            .and_then(AppContext::current_account)
            .map(EmonClient::for_account);
        match client {
            Some(Ok(client)) => {
                self.feed_browser.loading = true;
                Task::perform(
                    async move { client.feeds().await.map_err(|e| e.to_string()) },
                    Message::FeedsListed,
                )
            }
            Some(Err(e)) => {
                self.feed_browser.receive(Err(e.to_string()));
                Task::none()
            }
            None => Task::none(),
        }
    }

    fn save_account(&mut self) {
        let account = self.account_form.to_account();
        if !account.is_configured() {
            self.status_message = Some("Server URL and API key are required".into());
            return;
        }
        let Some(ctx) = self.ctx.as_mut() else { return };
        let result = match self.account_form.editing {
            Some(_) => ctx.update_account(account),
            None => ctx.add_account(account).map(|_| ()),
        };
        match result {
            Ok(()) => {
                self.status_message = None;
                self.screen = Screen::Page;
            }
            Err(e) => self.status_message = Some(e.to_string()),
        }
    }

    fn edit_page(&mut self) -> Task<Message> {
        let Some(page) = self.page.as_ref() else {
            return Task::none();
        };
        let mut form = PageForm::edit(page.settings(), page.feeds());
        self.screen = Screen::PageSettings;
        let client = self
            .ctx
            .as_ref()
            .and_then(AppContext::current_account)
            .and_then(|a| EmonClient::for_account(a).ok());
        let task = match client {
            Some(client) if form.feeds.is_empty() => {
                form.loading_feeds = true;
                Task::perform(
                    async move { client.feeds().await.map_err(|e| e.to_string()) },
                    Message::FormFeedsLoaded,
                )
            }
            _ => Task::none(),
        };
        self.page_form = Some(form);
        task
    }

    fn delete(&mut self, target: DeleteTarget) {
        let Some(ctx) = self.ctx.as_mut() else { return };
        let result = match target {
            DeleteTarget::Account => match ctx.current_account_id() {
                Some(id) => {
                    if let Some(page) = self.page.as_mut() {
                        page.teardown();
                    }
                    self.page = None;
                    for page in ctx.pages() {
                        if let Err(e) = self.states.remove(page.id) {
                            tracing::warn!(page = page.id, error = %e, "could not drop page state");
                        }
                    }
                    ctx.delete_account(id)
                }
                None => Ok(()),
            },
            DeleteTarget::Page => match self.page.as_ref().map(PageView::id) {
                Some(id) => ctx.delete_page(id),
                None => Ok(()),
            },
        };
        if let Err(e) = result {
            self.status_message = Some(e.to_string());
        }
        self.page_form = None;
        self.screen = Screen::Page;
    }

    fn save_prefs(&self) {
        self.prefs.save();
    }

    fn chart_colors(&self, series: Color) -> ChartColors {
        let p = &self.pal;
        ChartColors {
            bg: p.panel_bg,
            border: p.border,
            grid: p.grid,
            label: p.label,
            text: p.text,
            series,
            highlight: p.today,
        }
    }

    // ─── VIEW ──────────────────────────────────────────────────

    pub fn view(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let content: Element<Message> = match self.screen {
            Screen::Page => self.view_page(),
            Screen::AccountSettings => self.view_account_settings(),
            Screen::PageSettings => self.view_page_settings(),
            Screen::Appearance => self.view_appearance(),
            Screen::Feeds => self.view_feeds(),
        };

        let bg = p.bg;
        let main = row![
            self.view_sidebar(),
            scrollable(container(content).width(Length::Fill).padding(CONTENT_PADDING as u16)),
        ]
        .height(Length::Fill);

        container(main)
            .width(Length::Fill)
            .height(Length::Fill)
            .style(move |_: &Theme| container::Style {
                background: Some(Background::Color(bg)),
                ..Default::default()
            })
            .into()
    }

    fn view_sidebar(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let sidebar_bg = p.sidebar_bg;
        let border_c = p.border;

        let mut items: Vec<Element<Message>> = vec![
            text("emonview").size(18).color(p.accent).into(),
            Space::with_height(8).into(),
            section_title("ACCOUNTS", p),
        ];
        let current_account = self.ctx.as_ref().and_then(AppContext::current_account_id);
        let current_page = self.page.as_ref().map(PageView::id);
        if let Some(ctx) = &self.ctx {
            for account in ctx.accounts() {
                items.push(sidebar_item(
                    account.display_name().to_string(),
                    current_account == Some(account.id),
                    Message::SelectAccount(account.id),
                    p,
                ));
            }
            items.push(sidebar_action("+ Add account", Message::NewAccount, p));
            if current_account.is_some() {
                items.push(Space::with_height(10).into());
                items.push(section_title("PAGES", p));
                for page in ctx.pages() {
                    items.push(sidebar_item(
                        page.name.clone(),
                        current_page == Some(page.id) && self.screen == Screen::Page,
                        Message::OpenPage(page.id),
                        p,
                    ));
                }
                items.push(sidebar_action("+ Add page", Message::NewPage, p));
                items.push(Space::with_height(10).into());
                items.push(sidebar_item(
                    "All feeds".to_string(),
                    self.screen == Screen::Feeds,
                    Message::ShowFeeds,
                    p,
                ));
            }
        }
        items.push(Space::with_height(Length::Fill).into());
        items.push(sidebar_item(
            "Appearance".to_string(),
            self.screen == Screen::Appearance,
            Message::Show(Screen::Appearance),
            p,
        ));

        container(Column::with_children(items).spacing(2).padding(10))
            .width(SIDEBAR_WIDTH)
            .height(Length::Fill)
            .style(move |_: &Theme| container::Style {
                background: Some(Background::Color(sidebar_bg)),
                border: Border { color: border_c, width: 1.0, radius: 0.0.into() },
                shadow: Shadow {
                    color: Color::from_rgba(0.0, 0.0, 0.0, 0.12),
                    offset: Vector::new(2.0, 0.0),
                    blur_radius: 8.0,
                },
                ..Default::default()
            })
            .into()
    }

    fn view_page(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let Some(page) = &self.page else {
            return self.view_empty();
        };
        let settings = page.settings();
        let readings = page.readings();

        let header = row![
            text(&settings.name).size(20).color(p.text),
            Space::with_width(Length::Fill),
            button(text("Page settings").size(12)).on_press(Message::EditPage).style(button::secondary),
            button(text("Account").size(12)).on_press(Message::EditAccount).style(button::secondary),
        ]
        .spacing(8)
        .align_y(Alignment::Center);

        let now_label = match settings.quantity {
            Quantity::Power => "POWER NOW".to_string(),
            Quantity::Other if !settings.quantity_name.is_empty() => settings.quantity_name.to_uppercase(),
            q => q.name().to_uppercase(),
        };
        let readings_row = row![
            reading_block(now_label, readings.now.value, readings.now.unit, p),
            reading_block("USE TODAY".to_string(), readings.today.value, readings.today.unit, p),
            checkbox("Show cost", page.show_cost()).on_toggle(Message::ShowCost),
        ]
        .spacing(12)
        .align_y(Alignment::Center);

        let status: Element<Message> = match page.status_message().or_else(|| self.status_message.clone()) {
            Some(msg) => text(msg).size(12).color(p.warn).into(),
            None => Space::with_height(0).into(),
        };

        let window_btns = Row::with_children(WindowSelection::ALL.iter().map(|sel| {
            option_button(sel.button_label(), *sel == page.window(), Message::WindowSelected(*sel), p)
        }))
        .spacing(4);

        let power_unit = match settings.quantity {
            Quantity::Power => " W".to_string(),
            Quantity::Other => format!(" {}", settings.quantity_unit),
            q => format!(" {}", q.unit().unwrap_or_default()),
        };
        let power_chart = make_chart(
            page.power_chart(),
            "Power".to_string(),
            power_unit.clone(),
            self.chart_colors(p.accent),
            POWER_CHART_HEIGHT,
        );
        let stats: Element<Message> = match page.power_stats() {
            Some(s) => text(format!(
                "mean {:.0}{u}   min {:.0}{u}   max {:.0}{u}",
                s.mean,
                s.min,
                s.max,
                u = power_unit
            ))
            .size(11)
            .font(MONO)
            .color(p.label)
            .into(),
            None => Space::with_height(0).into(),
        };

        let duration_btns = Row::with_children(DurationSelection::ALL.iter().map(|d| {
            option_button(d.button_label(), *d == page.duration(), Message::DurationSelected(*d), p)
        }))
        .spacing(4);

        let usage_unit = if page.show_cost() {
            format!(" {}", settings.currency_symbol())
        } else {
            " kWh".to_string()
        };
        let usage_chart = make_chart(
            page.usage_chart(),
            "Daily use".to_string(),
            usage_unit,
            self.chart_colors(p.bar),
            USAGE_CHART_HEIGHT,
        );

        column![
            header,
            panel(readings_row.into(), p),
            status,
            panel(column![window_btns, power_chart, stats].spacing(8).into(), p),
            panel(column![duration_btns, usage_chart].spacing(8).into(), p),
        ]
        .spacing(12)
        .into()
    }

    fn view_empty(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let msg = match (&self.ctx, &self.status_message) {
            (None, Some(err)) => err.clone(),
            (Some(ctx), _) if ctx.accounts().is_empty() => {
                "Add an account with your server address and API key to get started.".to_string()
            }
            _ => "This account has no pages yet.".to_string(),
        };
        let mut col = column![text(msg).size(14).color(p.text)].spacing(12);
        if self.ctx.is_some() {
            col = col.push(button(text("Add account")).on_press(Message::NewAccount).style(button::primary));
        }
        panel(col.into(), p)
    }

    fn view_account_settings(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let f = &self.account_form;
        let title = if f.editing.is_some() { "Edit account" } else { "New account" };

        let mut buttons = row![
            button(text("Save")).on_press(Message::SaveAccount).style(button::primary),
            button(text("Cancel")).on_press(Message::Show(Screen::Page)).style(button::secondary),
        ]
        .spacing(8);
        if f.editing.is_some() {
            buttons = buttons.push(Space::with_width(Length::Fill));
            buttons = buttons.push(button(text("Delete account")).on_press(Message::DeleteAccount).style(button::danger));
        }

        let form = column![
            text(title).size(16).color(p.text),
            form_row("Name", text_input("Home", &f.name).on_input(|v| Message::Account(AccountField::Name(v))).into(), p),
            form_row(
                "Server",
                text_input("emoncms.org", &f.url).on_input(|v| Message::Account(AccountField::Url(v))).into(),
                p,
            ),
            form_row(
                "Use HTTPS",
                checkbox("", f.use_ssl).on_toggle(|v| Message::Account(AccountField::UseSsl(v))).into(),
                p,
            ),
            form_row(
                "API key",
                text_input("read or write key", &f.api_key)
                    .secure(true)
                    .on_input(|v| Message::Account(AccountField::ApiKey(v)))
                    .into(),
                p,
            ),
            self.view_status(),
            self.view_confirm(DeleteTarget::Account),
            buttons,
        ]
        .spacing(10);
        panel(form.into(), p)
    }

    fn view_page_settings(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let Some(form) = &self.page_form else {
            return self.view_page();
        };
        let s = &form.base;
        let feed_options = FeedChoice::options(&form.feeds);

        let mut col = column![
            text("Page settings").size(16).color(p.text),
            form_row("Name", text_input("My Electric", &s.name).on_input(|v| Message::Page(PageField::Name(v))).into(), p),
            form_row(
                "Quantity",
                pick_list(Quantity::ALL, Some(s.quantity), |q| Message::Page(PageField::Quantity(q))).into(),
                p,
            ),
        ]
        .spacing(10);

        if s.quantity == Quantity::Other {
            col = col.push(form_row(
                "Quantity name",
                text_input("Light", &s.quantity_name)
                    .on_input(|v| Message::Page(PageField::QuantityName(v)))
                    .into(),
                p,
            ));
            col = col.push(form_row(
                "Unit",
                text_input("lx", &s.quantity_unit)
                    .on_input(|v| Message::Page(PageField::QuantityUnit(v)))
                    .into(),
                p,
            ));
        }

        let feeds_note: Element<Message> = if form.loading_feeds {
            text("Loading feeds...").size(11).color(p.label).into()
        } else if let Some(err) = &form.feed_error {
            text(format!("Feed list unavailable: {err}")).size(11).color(p.warn).into()
        } else {
            Space::with_height(0).into()
        };

        let cost_options: Vec<CostSymbol> = COST_SYMBOL_OPTIONS.iter().copied().map(CostSymbol).collect();
        let cost_selected = COST_SYMBOL_OPTIONS
            .iter()
            .copied()
            .find(|o| *o == s.cost_symbol)
            .map(CostSymbol);
        let scale_selected = SCALE_OPTIONS.iter().copied().find(|o| *o == s.power_scale);

        col = col
            .push(form_row(
                "Power feed",
                pick_list(feed_options.clone(), Some(FeedChoice::for_id(s.power_feed_id, &form.feeds)), |c| {
                    Message::Page(PageField::PowerFeed(c))
                })
                .into(),
                p,
            ))
            .push(form_row(
                "Use feed (kWh)",
                pick_list(feed_options, Some(FeedChoice::for_id(s.use_feed_id, &form.feeds)), |c| {
                    Message::Page(PageField::UseFeed(c))
                })
                .into(),
                p,
            ))
            .push(feeds_note)
            .push(form_row(
                "Power scale",
                pick_list(SCALE_OPTIONS, scale_selected, |v| Message::Page(PageField::Scale(v))).into(),
                p,
            ))
            .push(form_row(
                "Unit cost (per kWh)",
                text_input("0.15", &s.unit_cost).on_input(|v| Message::Page(PageField::UnitCost(v))).into(),
                p,
            ))
            .push(form_row(
                "Currency",
                pick_list(cost_options, cost_selected, |c| Message::Page(PageField::CostSymbol(c))).into(),
                p,
            ));

        if s.cost_symbol == "custom" {
            col = col.push(form_row(
                "Custom symbol",
                text_input("CHF", &s.custom_currency_symbol)
                    .on_input(|v| Message::Page(PageField::CustomSymbol(v)))
                    .into(),
                p,
            ));
        }

        let buttons = row![
            button(text("Save")).on_press(Message::SavePage).style(button::primary),
            button(text("Cancel")).on_press(Message::Show(Screen::Page)).style(button::secondary),
            Space::with_width(Length::Fill),
            button(text("Delete page")).on_press(Message::DeletePage).style(button::danger),
        ]
        .spacing(8);

        col = col
            .push(self.view_status())
            .push(self.view_confirm(DeleteTarget::Page))
            .push(buttons);
        panel(col.into(), p)
    }

    fn view_feeds(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let b = &self.feed_browser;
        let header = row![
            text("Feeds").size(20).color(p.text),
            Space::with_width(Length::Fill),
            button(text("Refresh").size(12)).on_press(Message::ShowFeeds).style(button::secondary),
        ]
        .align_y(Alignment::Center);

        let mut col = column![header].spacing(10);
        if let Some(err) = &b.error {
            col = col.push(text(format!("Feed list unavailable: {err}")).size(12).color(p.warn));
        } else if b.loading && b.groups.is_empty() {
            col = col.push(text("Loading feeds...").size(12).color(p.label));
        }

        for group in &b.groups {
            let open = b.expanded.contains(&group.tag);
            let marker = if open { "v" } else { ">" };
            let title = button(
                text(format!("{marker} {}  ({})", group.tag, group.feeds.len()))
                    .size(14)
                    .font(MONO)
                    .color(p.text),
            )
            .on_press(Message::ToggleFeedGroup(group.tag.clone()))
            .style(button::text)
            .width(Length::Fill);

            let mut body = column![title].spacing(4);
            if open {
                for feed in &group.feeds {
                    body = body.push(
                        row![
                            text(format!("{}: {}", feed.id, feed.name)).size(12).color(p.text).width(Length::FillPortion(3)),
                            text(format_feed_value(feed.value)).size(12).font(MONO).color(p.accent).width(Length::FillPortion(2)),
                            text(format_feed_time(feed.time)).size(11).font(MONO).color(p.label).width(Length::FillPortion(3)),
                        ]
                        .spacing(8),
                    );
                }
            }
            col = col.push(panel(body.into(), p));
        }
        col.into()
    }

    fn view_appearance(&self) -> Element<'_, Message> {
        let p = &self.pal;
        let themes = Column::with_children(ThemeVariant::ALL.iter().map(|t| {
            option_button(t.name(), *t == self.prefs.theme, Message::ThemeSelected(*t), p)
        }))
        .spacing(4);

        let minutes = Row::with_children(Preferences::stale_alert_options().iter().map(|m| {
            let label: &'static str = match m {
                5 => "5 min",
                10 => "10 min",
                20 => "20 min",
                30 => "30 min",
                _ => "60 min",
            };
            option_button(label, *m == self.prefs.stale_alert_minutes, Message::StaleAlertMinutes(*m), p)
        }))
        .spacing(4);

        let col = column![
            text("Theme").size(16).color(p.text),
            themes,
            Space::with_height(12),
            text("Stale reading alert").size(16).color(p.text),
            text("Notify when the power reading has not changed for a while.").size(11).color(p.label),
            checkbox("Enabled", self.prefs.stale_alert_enabled).on_toggle(Message::StaleAlertToggled),
            minutes,
        ]
        .spacing(8);
        panel(col.into(), p)
    }

    fn view_status(&self) -> Element<'_, Message> {
        match &self.status_message {
            Some(msg) => text(msg).size(12).color(self.pal.warn).into(),
            None => Space::with_height(0).into(),
        }
    }

    fn view_confirm(&self, target: DeleteTarget) -> Element<'_, Message> {
        if self.confirm_delete != Some(target) {
            return Space::with_height(0).into();
        }
        let what = match target {
            DeleteTarget::Account => "this account and all its pages",
            DeleteTarget::Page => "this page",
        };
        row![
            text(format!("Delete {what}?")).size(12).color(self.pal.warn),
            button(text("Yes, delete")).on_press(Message::ConfirmDelete(true)).style(button::danger),
            button(text("No")).on_press(Message::ConfirmDelete(false)).style(button::secondary),
        ]
        .spacing(8)
        .align_y(Alignment::Center)
        .into()
    }
}

// ─── WIDGET HELPERS ─────────────────────────────────────────────

fn make_chart<'a>(model: &'a ChartModel, title: String, unit: String, colors: ChartColors, height: f32) -> Element<'a, Message> {
    Canvas::new(ChartView { model, title, unit, colors })
        .width(Length::Fill)
        .height(Length::Fixed(height))
        .into()
}

fn reading_block<'a>(label: String, value: String, unit: String, p: &Palette) -> Element<'a, Message> {
    column![
        text(label).size(11).font(MONO).color(p.label),
        row![
            text(value).size(34).font(MONO).color(p.text),
            text(unit).size(14).color(p.label),
        ]
        .spacing(6)
        .align_y(Alignment::End),
    ]
    .spacing(2)
    .width(Length::Fill)
    .into()
}

fn sidebar_item<'a>(label: String, is_active: bool, on_press: Message, p: &Palette) -> Element<'a, Message> {
    let accent = p.accent;
    let sidebar_bg = p.sidebar_bg;
    let active_bg = Color::from_rgb(
        (sidebar_bg.r + 0.06).min(1.0),
        (sidebar_bg.g + 0.06).min(1.0),
        (sidebar_bg.b + 0.06).min(1.0),
    );
    let hover_bg = Color::from_rgba(accent.r, accent.g, accent.b, 0.15);
    let text_c = p.text;
    let color = if is_active { accent } else { p.label };

    button(text(label).size(13).color(color))
        .on_press(on_press)
        .width(Length::Fill)
        .padding([6, 10])
        .style(move |_: &Theme, status| {
            let bg = match status {
                button::Status::Hovered => hover_bg,
                button::Status::Pressed => active_bg,
                _ => if is_active { active_bg } else { Color::TRANSPARENT },
            };
            button::Style {
                background: Some(Background::Color(bg)),
                text_color: text_c,
                border: Border {
                    color: if is_active { accent } else { Color::TRANSPARENT },
                    width: if is_active { 1.5 } else { 0.0 },
                    radius: 6.0.into(),
                },
                ..Default::default()
            }
        })
        .into()
}

fn sidebar_action<'a>(label: &'static str, on_press: Message, p: &Palette) -> Element<'a, Message> {
    button(text(label).size(12).color(p.label))
        .on_press(on_press)
        .style(button::text)
        .padding([4, 10])
        .into()
}

fn option_button<'a>(label: &'static str, is_active: bool, on_press: Message, p: &Palette) -> Element<'a, Message> {
    let accent = p.accent;
    let color = if is_active { accent } else { p.label };
    let text_c = p.text;
    button(text(label).size(12).font(MONO).color(color))
        .on_press(on_press)
        .padding([4, 14])
        .style(move |_: &Theme, status| {
            let bg = match status {
                button::Status::Hovered => Color::from_rgba(accent.r, accent.g, accent.b, 0.15),
                button::Status::Pressed => Color::from_rgba(accent.r, accent.g, accent.b, 0.25),
                _ => if is_active { Color::from_rgba(accent.r, accent.g, accent.b, 0.1) } else { Color::TRANSPARENT },
            };
            button::Style {
                background: Some(Background::Color(bg)),
                text_color: text_c,
                border: Border {
                    color: if is_active { accent } else { Color::TRANSPARENT },
                    width: 1.0,
                    radius: 6.0.into(),
                },
                ..Default::default()
            }
        })
        .into()
}

fn form_row<'a>(label: &'static str, input: Element<'a, Message>, p: &Palette) -> Element<'a, Message> {
    row![
        text(label).size(12).color(p.label).width(Length::Fixed(160.0)),
        container(input).width(Length::Fill),
    ]
    .spacing(12)
    .align_y(Alignment::Center)
    .into()
}

fn section_title<'a>(label: &'static str, p: &Palette) -> Element<'a, Message> {
    text(label).size(11).font(MONO).color(p.label).into()
}

fn panel<'a>(content: Element<'a, Message>, p: &Palette) -> Element<'a, Message> {
    let panel_bg = p.panel_bg;
    let border_c = p.border;
    container(content)
        .width(Length::Fill)
        .padding(12)
        .style(move |_: &Theme| container::Style {
            background: Some(Background::Color(panel_bg)),
            border: Border {
                color: border_c,
                width: 1.0,
                radius: 8.0.into(),
            },
            shadow: Shadow {
                color: Color::from_rgba(0.0, 0.0, 0.0, 0.15),
                offset: Vector::new(0.0, 2.0),
                blur_radius: 8.0,
            },
            ..Default::default()
        })
        .into()
}
