use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::settings::Account;

/// Storage engines whose feeds can be charted (PHPFina, PHPTimeSeries, MySQL).
pub const CHARTABLE_ENGINES: &[i64] = &[2, 5, 6];
pub const POWER_FEED_NAME: &str = "use";
pub const USE_FEED_NAME: &str = "use_kwh";
/// Group title for feeds without a tag.
pub const UNTAGGED: &str = "Untagged";

const ATTEMPTS: u32 = 3;
const TIMEOUT: Duration = Duration::from_secs(30);
const LONG_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("server not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {0}")]
    Status(reqwest::StatusCode),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Http(_) => true,
            ClientError::Status(s) => s.is_server_error(),
            ClientError::NotConfigured | ClientError::Decode(_) => false,
        }
    }
}

/// One entry of the server's feed list.
#[derive(Debug, Clone, PartialEq)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub tag: String,
    pub engine: i64,
    pub value: Option<f64>,
    /// Unix seconds of the last update.
    pub time: Option<i64>,
}

impl Feed {
    pub fn is_chartable(&self) -> bool {
        CHARTABLE_ENGINES.contains(&self.engine)
    }
}

impl std::fmt::Display for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.tag.is_empty() {
            write!(f, "{}: {}", self.id, self.name)
        } else {
            write!(f, "{}: {} ({})", self.id, self.name, self.tag)
        }
    }
}

/// Numbers arrive either as JSON numbers or as numeric strings.
fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn parse_feed_list(json: &Value) -> Result<Vec<Feed>, ClientError> {
    let entries = json
        .as_array()
        .ok_or_else(|| ClientError::Decode("feed list is not an array".into()))?;
    let feeds = entries
        .iter()
        .filter_map(|e| {
            Some(Feed {
                id: number(e.get("id")?)? as i64,
                name: e.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                tag: e.get("tag").and_then(Value::as_str).unwrap_or_default().to_string(),
                engine: e.get("engine").and_then(number).unwrap_or(-1.0) as i64,
                value: e.get("value").and_then(number),
                time: e.get("time").and_then(number).map(|t| t as i64),
            })
        })
        .collect();
    Ok(feeds)
}

/// Feeds sharing one tag, for the feed browser.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedGroup {
    pub tag: String,
    pub feeds: Vec<Feed>,
}

/// Group feeds by tag, tags sorted by name and untagged feeds last. Feeds
/// keep their server order inside a group.
pub fn group_by_tag(feeds: &[Feed]) -> Vec<FeedGroup> {
    let mut tagged: BTreeMap<&str, Vec<Feed>> = BTreeMap::new();
    let mut untagged = Vec::new();
    for feed in feeds {
        match feed.tag.trim() {
            "" => untagged.push(feed.clone()),
            tag => tagged.entry(tag).or_default().push(feed.clone()),
        }
    }
    let mut groups: Vec<FeedGroup> = tagged
        .into_iter()
        .map(|(tag, feeds)| FeedGroup { tag: tag.to_string(), feeds })
        .collect();
    if !untagged.is_empty() {
        groups.push(FeedGroup { tag: UNTAGGED.to_string(), feeds: untagged });
    }
    groups
}

/// Chartable feeds named `use` and `use_kwh`, as (power, usage).
pub fn auto_pick(feeds: &[Feed]) -> (Option<i64>, Option<i64>) {
    let find = |name: &str| {
        feeds
            .iter()
            .find(|f| f.is_chartable() && f.name == name)
            .map(|f| f.id)
    };
    (find(POWER_FEED_NAME), find(USE_FEED_NAME))
}

/// `[[time_ms, value], ...]`, possibly wrapped in `{"data": [...]}`.
/// Null values are skipped; the result is sorted by time.
pub fn parse_points(json: &Value) -> Result<Vec<(i64, f64)>, ClientError> {
    let rows = json
        .as_array()
        .or_else(|| json.get("data").and_then(Value::as_array))
        .ok_or_else(|| ClientError::Decode("data is not an array".into()))?;
    let mut points: Vec<(i64, f64)> = rows
        .iter()
        .filter_map(|row| {
            let row = row.as_array()?;
            let t = number(row.first()?)? as i64;
            let v = number(row.get(1)?)?;
            Some((t, v))
        })
        .collect();
    points.sort_by_key(|(t, _)| *t);
    Ok(points)
}

/// `feed/fetch.json` answer: one value per requested id, `None` where missing.
pub fn parse_values(json: &Value, expected: usize) -> Result<Vec<Option<f64>>, ClientError> {
    let values = json
        .as_array()
        .ok_or_else(|| ClientError::Decode("fetch answer is not an array".into()))?;
    if values.len() != expected {
        return Err(ClientError::Decode(format!(
            "expected {expected} values, got {}",
            values.len()
        )));
    }
    Ok(values.iter().map(number).collect())
}

/// Server-side sampling interval for a span when none is requested.
pub fn default_interval(hours: i64) -> i64 {
    match hours {
        h if h > 24 * 30 => 86_400,
        h if h > 24 * 7 => 3_600,
        h if h > 24 => 1_800,
        _ => 900,
    }
}

fn timeout_for_span(span_ms: i64) -> Duration {
    if span_ms > 30 * 86_400_000 {
        LONG_TIMEOUT
    } else {
        TIMEOUT
    }
}

/// JSON/HTTP client for one account's server.
#[derive(Debug, Clone)]
pub struct EmonClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl EmonClient {
    pub fn for_account(account: &Account) -> Result<Self, ClientError> {
        let base_url = account.base_url().ok_or(ClientError::NotConfigured)?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: account.api_key.trim().to_string(),
        })
    }

    fn url(&self, path: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/{path}?apikey={}", self.base_url, self.api_key)
        } else {
            format!("{}/{path}?{query}&apikey={}", self.base_url, self.api_key)
        }
    }

    pub fn feed_list_url(&self) -> String {
        self.url("feed/list.json", "")
    }

    pub fn value_url(&self, id: i64) -> String {
        self.url("feed/value.json", &format!("id={id}"))
    }

    pub fn fetch_url(&self, ids: &[i64]) -> String {
        let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
        self.url("feed/fetch.json", &format!("ids={}", ids.join(",")))
    }

    pub fn data_url(&self, id: i64, start_ms: i64, end_ms: i64, interval_secs: i64) -> String {
        self.url(
            "feed/data.json",
            &format!("id={id}&start={start_ms}&end={end_ms}&interval={interval_secs}&skipmissing=1&limitinterval=1"),
        )
    }

    pub fn daily_url(&self, id: i64, start_ms: i64, end_ms: i64) -> String {
        self.url(
            "feed/data.json",
            &format!("id={id}&start={start_ms}&end={end_ms}&mode=daily"),
        )
    }

    /// GET with up to three attempts, waiting 1 s then 2 s between them.
    async fn get_json(&self, path: &'static str, url: String, timeout: Duration) -> Result<Value, ClientError> {
        let mut attempt = 1;
        loop {
            match self.try_get(&url, timeout).await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < ATTEMPTS && e.is_retryable() => {
                    tracing::debug!(path, attempt, error = %e, "request failed, retrying");
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::warn!(path, attempt, error = %e, "request failed");
                    return Err(e);
                }
            }
        }
    }

    async fn try_get(&self, url: &str, timeout: Duration) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Status(response.status()));
        }
        Ok(response.json::<Value>().await?)
    }

    pub async fn feeds(&self) -> Result<Vec<Feed>, ClientError> {
        let json = self.get_json("feed/list", self.feed_list_url(), TIMEOUT).await?;
        parse_feed_list(&json)
    }

    pub async fn feed_value(&self, id: i64) -> Result<f64, ClientError> {
        let json = self.get_json("feed/value", self.value_url(id), TIMEOUT).await?;
        number(&json).ok_or_else(|| ClientError::Decode(format!("feed {id} value is not a number")))
    }

    pub async fn fetch_values(&self, ids: &[i64]) -> Result<Vec<Option<f64>>, ClientError> {
        let json = self.get_json("feed/fetch", self.fetch_url(ids), TIMEOUT).await?;
        parse_values(&json, ids.len())
    }

    pub async fn data(&self, id: i64, start_ms: i64, end_ms: i64, interval_secs: i64) -> Result<Vec<(i64, f64)>, ClientError> {
        let url = self.data_url(id, start_ms, end_ms, interval_secs);
        let json = self.get_json("feed/data", url, timeout_for_span(end_ms - start_ms)).await?;
        parse_points(&json)
    }

    pub async fn daily(&self, id: i64, start_ms: i64, end_ms: i64) -> Result<Vec<(i64, f64)>, ClientError> {
        let url = self.daily_url(id, start_ms, end_ms);
        let json = self.get_json("feed/data daily", url, timeout_for_span(end_ms - start_ms)).await?;
        parse_points(&json)
    }
}
