use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;

use crate::settings::{Account, PageSettings};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("page settings could not be encoded: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("cannot create data directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("no {kind} with id {id}")]
    NotFound { kind: &'static str, id: i64 },
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        url TEXT NOT NULL,
        use_ssl INTEGER NOT NULL,
        api_key TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS pages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        settings TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_pages_account ON pages(account_id);";

/// Accounts and their pages in SQLite. Page settings are kept as a JSON column.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open() -> Result<Self, StoreError> {
        let path = Self::db_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
            }
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::with_connection(conn)?;
        // API keys live in here
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
        }
        tracing::info!(path = %path.display(), "opened account store");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    fn db_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emonview")
            .join("emonview.db")
    }

    pub fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, url, use_ssl, api_key FROM accounts ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(Account {
                id: row.get(0)?,
                name: row.get(1)?,
                url: row.get(2)?,
                use_ssl: row.get(3)?,
                api_key: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn account(&self, id: i64) -> Result<Account, StoreError> {
        self.conn
            .query_row(
                "SELECT id, name, url, use_ssl, api_key FROM accounts WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Account {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        url: row.get(2)?,
                        use_ssl: row.get(3)?,
                        api_key: row.get(4)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound { kind: "account", id })
    }

    /// Insert and return the new row id.
    pub fn add_account(&self, account: &Account) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO accounts (name, url, use_ssl, api_key) VALUES (?1, ?2, ?3, ?4)",
            params![account.name, account.url, account.use_ssl, account.api_key],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_account(&self, account: &Account) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE accounts SET name = ?1, url = ?2, use_ssl = ?3, api_key = ?4 WHERE id = ?5",
            params![account.name, account.url, account.use_ssl, account.api_key, account.id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "account", id: account.id });
        }
        Ok(())
    }

    /// Removes the account and, through the foreign key, its pages.
    pub fn delete_account(&self, id: i64) -> Result<(), StoreError> {
        let changed = self.conn.execute("DELETE FROM accounts WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "account", id });
        }
        Ok(())
    }

    pub fn pages(&self, account_id: i64) -> Result<Vec<PageSettings>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, settings FROM pages WHERE account_id = ?1 ORDER BY id ASC")?;
        let rows = stmt.query_map(params![account_id], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut pages = Vec::new();
        for row in rows {
            let (id, json) = row?;
            match PageSettings::from_json(id, &json) {
                Ok(page) => pages.push(page),
                Err(e) => tracing::warn!(page = id, error = %e, "skipping unreadable page settings"),
            }
        }
        Ok(pages)
    }

    pub fn add_page(&self, account_id: i64, page: &PageSettings) -> Result<i64, StoreError> {
        let json = page.to_json()?;
        self.conn.execute(
            "INSERT INTO pages (account_id, settings) VALUES (?1, ?2)",
            params![account_id, json],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_page(&self, page: &PageSettings) -> Result<(), StoreError> {
        let json = page.to_json()?;
        let changed = self
            .conn
            .execute("UPDATE pages SET settings = ?1 WHERE id = ?2", params![json, page.id])?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "page", id: page.id });
        }
        Ok(())
    }

    pub fn delete_page(&self, id: i64) -> Result<(), StoreError> {
        let changed = self.conn.execute("DELETE FROM pages WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound { kind: "page", id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(name: &str) -> Account {
        Account {
            id: 0,
            name: name.into(),
            url: "emoncms.org".into(),
            use_ssl: true,
            api_key: "0123456789abcdef".into(),
        }
    }

    #[test]
    fn test_account_crud() {
        let store = Store::open_in_memory().unwrap();
        let id = store.add_account(&account("Home")).unwrap();
        let mut loaded = store.account(id).unwrap();
        assert_eq!(loaded.name, "Home");
        assert!(loaded.use_ssl);

        loaded.name = "Cottage".into();
        loaded.use_ssl = false;
        store.update_account(&loaded).unwrap();
        assert_eq!(store.accounts().unwrap(), vec![loaded]);

        store.delete_account(id).unwrap();
        assert!(store.accounts().unwrap().is_empty());
        assert!(matches!(store.account(id), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn test_page_crud() {
        let store = Store::open_in_memory().unwrap();
        let acct = store.add_account(&account("Home")).unwrap();
        let mut page = PageSettings::with_auto_feeds("My Electric");
        page.id = store.add_page(acct, &page).unwrap();

        page.power_feed_id = 3;
        page.use_feed_id = 4;
        store.update_page(&page).unwrap();
        let pages = store.pages(acct).unwrap();
        assert_eq!(pages, vec![page.clone()]);

        store.delete_page(page.id).unwrap();
        assert!(store.pages(acct).unwrap().is_empty());
    }

    #[test]
    fn test_deleting_account_drops_pages() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_account(&account("A")).unwrap();
        let b = store.add_account(&account("B")).unwrap();
        store.add_page(a, &PageSettings::with_auto_feeds("a1")).unwrap();
        store.add_page(b, &PageSettings::with_auto_feeds("b1")).unwrap();
        store.delete_account(a).unwrap();
        assert!(store.pages(a).unwrap().is_empty());
        assert_eq!(store.pages(b).unwrap().len(), 1);
    }

    #[test]
    fn test_update_missing_rows() {
        let store = Store::open_in_memory().unwrap();
        let mut ghost = PageSettings::with_auto_feeds("ghost");
        ghost.id = 99;
        assert!(matches!(store.update_page(&ghost), Err(StoreError::NotFound { kind: "page", id: 99 })));
        assert!(store.delete_account(5).is_err());
    }
}
