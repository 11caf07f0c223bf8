use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::settings::{Account, PageSettings};
use crate::store::{Store, StoreError};

pub const FIRST_PAGE_NAME: &str = "My Electric";

/// Change notification for accounts and pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    AccountAdded(i64),
    AccountUpdated(i64),
    AccountDeleted(i64),
    AccountSelected(Option<i64>),
    PageAdded { account: i64, page: i64 },
    PageUpdated(i64),
    PageDeleted(i64),
}

/// Fan-out of `AppEvent`s to any number of receivers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<AppEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<AppEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver to every live subscriber; dropped receivers are pruned.
    /// Returns the number of receivers reached.
    pub fn publish(&mut self, event: AppEvent) -> usize {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        tracing::debug!(?event, subscribers = self.subscribers.len(), "event published");
        self.subscribers.len()
    }
}

/// Accounts, the pages of the selected account, and the store behind them.
/// Passed explicitly to whoever needs it.
pub struct AppContext {
    store: Store,
    accounts: Vec<Account>,
    pages: Vec<PageSettings>,
    current: Option<i64>,
    bus: EventBus,
}

impl AppContext {
    /// Load accounts and select `preferred` if it still exists, else the first one.
    pub fn load(store: Store, preferred: Option<i64>) -> Result<Self, StoreError> {
        let accounts = store.accounts()?;
        let current = preferred
            .filter(|id| accounts.iter().any(|a| a.id == *id))
            .or_else(|| accounts.first().map(|a| a.id));
        let pages = match current {
            Some(id) => store.pages(id)?,
            None => Vec::new(),
        };
        Ok(Self {
            store,
            accounts,
            pages,
            current,
            bus: EventBus::default(),
        })
    }

    pub fn subscribe(&mut self) -> Receiver<AppEvent> {
        self.bus.subscribe()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn pages(&self) -> &[PageSettings] {
        &self.pages
    }

    pub fn page(&self, id: i64) -> Option<&PageSettings> {
        self.pages.iter().find(|p| p.id == id)
    }

    pub fn current_account_id(&self) -> Option<i64> {
        self.current
    }

    pub fn current_account(&self) -> Option<&Account> {
        let id = self.current?;
        self.accounts.iter().find(|a| a.id == id)
    }

    /// Insert an account, give it its first page and select it.
    pub fn add_account(&mut self, mut account: Account) -> Result<i64, StoreError> {
        account.id = self.store.add_account(&account)?;
        let id = account.id;
        tracing::info!(account = id, name = %account.name, "account added");
        self.accounts.push(account);
        self.bus.publish(AppEvent::AccountAdded(id));
        self.select_account(Some(id))?;
        self.add_first_page(id)?;
        Ok(id)
    }

    pub fn update_account(&mut self, account: Account) -> Result<(), StoreError> {
        self.store.update_account(&account)?;
        let id = account.id;
        let stored = self.store.account(id)?;
        if let Some(slot) = self.accounts.iter_mut().find(|a| a.id == id) {
            *slot = stored;
        }
        self.bus.publish(AppEvent::AccountUpdated(id));
        Ok(())
    }

    pub fn delete_account(&mut self, id: i64) -> Result<(), StoreError> {
        self.store.delete_account(id)?;
        self.accounts.retain(|a| a.id != id);
        tracing::info!(account = id, "account deleted");
        self.bus.publish(AppEvent::AccountDeleted(id));
        if self.current == Some(id) {
            let next = self.accounts.first().map(|a| a.id);
            self.select_account(next)?;
        }
        Ok(())
    }

    pub fn select_account(&mut self, id: Option<i64>) -> Result<(), StoreError> {
        let id = id.filter(|id| self.accounts.iter().any(|a| a.id == *id));
        self.pages = match id {
            Some(id) => self.store.pages(id)?,
            None => Vec::new(),
        };
        self.current = id;
        self.bus.publish(AppEvent::AccountSelected(id));
        Ok(())
    }

    /// Default page with automatic feed selection.
    pub fn add_first_page(&mut self, account: i64) -> Result<i64, StoreError> {
        self.add_page(account, PageSettings::with_auto_feeds(FIRST_PAGE_NAME))
    }

    pub fn add_page(&mut self, account: i64, mut page: PageSettings) -> Result<i64, StoreError> {
        page.id = self.store.add_page(account, &page)?;
        let id = page.id;
        if self.current == Some(account) {
            self.pages.push(page);
        }
        self.bus.publish(AppEvent::PageAdded { account, page: id });
        Ok(id)
    }

    pub fn update_page(&mut self, page: PageSettings) -> Result<(), StoreError> {
        self.store.update_page(&page)?;
        let id = page.id;
        if let Some(slot) = self.pages.iter_mut().find(|p| p.id == id) {
            *slot = page;
        }
        self.bus.publish(AppEvent::PageUpdated(id));
        Ok(())
    }

    pub fn delete_page(&mut self, id: i64) -> Result<(), StoreError> {
        self.store.delete_page(id)?;
        self.pages.retain(|p| p.id != id);
        self.bus.publish(AppEvent::PageDeleted(id));
        Ok(())
    }
}
