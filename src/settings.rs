use serde::{Deserialize, Serialize};

/// Feed id meaning "pick the feed automatically from the feed list".
pub const AUTO_FEED: i64 = -1;

pub const SCALE_OPTIONS: &[&str] = &["1.0", "0.1", "0.01", "0.001", "10", "100", "1000"];
pub const COST_SYMBOL_OPTIONS: &[&str] = &[LOCALE_CURRENCY, "£", "$", "€", CUSTOM_CURRENCY];
const LOCALE_CURRENCY: &str = "0";
const CUSTOM_CURRENCY: &str = "custom";
/// Used when the locale currency cannot be resolved.
const FALLBACK_CURRENCY: &str = "£";

/// Physical quantity carried by a page's power feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quantity {
    #[default]
    Power,
    Temperature,
    Voltage,
    Humidity,
    Current,
    Other,
}

impl Quantity {
    pub const ALL: &[Quantity] = &[
        Quantity::Power,
        Quantity::Temperature,
        Quantity::Voltage,
        Quantity::Humidity,
        Quantity::Current,
        Quantity::Other,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Quantity::Power => "Power",
            Quantity::Temperature => "Temperature",
            Quantity::Voltage => "Voltage",
            Quantity::Humidity => "Humidity",
            Quantity::Current => "Current",
            Quantity::Other => "Other",
        }
    }

    /// Fixed unit symbol; `None` for power (scaled W/kW) and custom quantities.
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Quantity::Power | Quantity::Other => None,
            Quantity::Temperature => Some("°C"),
            Quantity::Voltage => Some("V"),
            Quantity::Humidity => Some("%"),
            Quantity::Current => Some("A"),
        }
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration of one dashboard page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSettings {
    /// Row id in the store; 0 until the page has been inserted.
    #[serde(skip)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub quantity: Quantity,
    /// Display name when `quantity` is `Other`.
    #[serde(default)]
    pub quantity_name: String,
    /// Unit symbol when `quantity` is `Other`.
    #[serde(default)]
    pub quantity_unit: String,
    pub power_feed_id: i64,
    pub use_feed_id: i64,
    pub power_scale: String,
    pub unit_cost: String,
    pub cost_symbol: String,
    #[serde(default)]
    pub custom_currency_symbol: String,
}

impl PageSettings {
    /// A fresh page whose feeds are resolved from the feed list on first load.
    pub fn with_auto_feeds(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            quantity: Quantity::Power,
            quantity_name: String::new(),
            quantity_unit: String::new(),
            power_feed_id: AUTO_FEED,
            use_feed_id: AUTO_FEED,
            power_scale: "1.0".into(),
            unit_cost: "0.15".into(),
            cost_symbol: LOCALE_CURRENCY.into(),
            custom_currency_symbol: String::new(),
        }
    }

    pub fn from_json(id: i64, json: &str) -> Result<Self, serde_json::Error> {
        let mut settings: Self = serde_json::from_str(json)?;
        settings.id = id;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Multiplier for power feed readings. Unparseable or zero means 1.
    pub fn power_scale_factor(&self) -> f64 {
        match self.power_scale.trim().parse::<f64>() {
            Ok(v) if v != 0.0 && v.is_finite() => v,
            _ => 1.0,
        }
    }

    /// Cost per kWh; unparseable strings count as 0.
    pub fn unit_cost_value(&self) -> f64 {
        self.unit_cost.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
    }

    pub fn currency_symbol(&self) -> String {
        match self.cost_symbol.as_str() {
            LOCALE_CURRENCY => FALLBACK_CURRENCY.to_string(),
            CUSTOM_CURRENCY => self.custom_currency_symbol.clone(),
            other => other.to_string(),
        }
    }

    pub fn needs_feed_lookup(&self) -> bool {
        self.power_feed_id == AUTO_FEED || self.use_feed_id == AUTO_FEED
    }

    pub fn feeds_configured(&self) -> bool {
        self.power_feed_id >= 0 && self.use_feed_id >= 0
    }
}

/// Credentials and server location of one monitoring account.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Account {
    pub id: i64,
    pub name: String,
    /// Host and optional path, e.g. `emoncms.org` or `10.0.0.4/emoncms`.
    pub url: String,
    pub use_ssl: bool,
    pub api_key: String,
}

impl Account {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty() && !self.api_key.trim().is_empty()
    }

    /// Base URL with scheme and without a trailing slash. `None` when not configured.
    pub fn base_url(&self) -> Option<String> {
        if !self.is_configured() {
            return None;
        }
        let url = self.url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            return Some(url.to_string());
        }
        let scheme = if self.use_ssl { "https://" } else { "http://" };
        Some(format!("{scheme}{url}"))
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.url.as_str()
        } else {
            self.name.as_str()
        }
    }
}

/// A number ready for display with its unit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reading {
    pub value: String,
    pub unit: String,
}

/// The two headline numbers of a page: current power and today's usage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageReadings {
    pub now: Reading,
    pub today: Reading,
}

/// Format the headline readings for a page.
///
/// Non-power quantities show the feed's own reading with the quantity's unit;
/// no conversion from watts is attempted for them.
pub fn format_readings(power_now: f64, today_kwh: f64, settings: &PageSettings, show_cost: bool) -> PageReadings {
    if show_cost {
        let cost = settings.unit_cost_value();
        let symbol = settings.currency_symbol();
        return PageReadings {
            now: Reading {
                value: format!("{:.2}/h", power_now * 0.001 * cost),
                unit: symbol.clone(),
            },
            today: Reading {
                value: format!("{:.2}", today_kwh * cost),
                unit: symbol,
            },
        };
    }

    let today = Reading {
        value: format!("{today_kwh:.1}"),
        unit: "kWh".into(),
    };
    let now = match settings.quantity {
        Quantity::Power if power_now >= 1000.0 => Reading {
            value: format!("{:.2}", power_now / 1000.0),
            unit: "kW".into(),
        },
        Quantity::Power => Reading {
            value: format!("{power_now:.0}"),
            unit: "W".into(),
        },
        Quantity::Other => Reading {
            value: format!("{power_now:.1}"),
            unit: settings.quantity_unit.clone(),
        },
        q => Reading {
            value: format!("{power_now:.1}"),
            unit: q.unit().unwrap_or_default().into(),
        },
    };
    PageReadings { now, today }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_roundtrip_keeps_fields() {
        let mut page = PageSettings::with_auto_feeds("House");
        page.power_feed_id = 12;
        page.use_feed_id = 14;
        page.quantity = Quantity::Other;
        page.quantity_unit = "lx".into();
        let json = page.to_json().unwrap();
        assert!(json.contains("\"powerFeedId\":12"));
        let loaded = PageSettings::from_json(7, &json).unwrap();
        assert_eq!(loaded.id, 7);
        assert_eq!(loaded.use_feed_id, 14);
        assert_eq!(loaded.quantity_unit, "lx");
    }

    #[test]
    fn test_old_json_without_quantity() {
        let json = r#"{"name":"Flat","powerFeedId":1,"useFeedId":2,"powerScale":"1.0","unitCost":"0.2","costSymbol":"$"}"#;
        let page = PageSettings::from_json(3, json).unwrap();
        assert_eq!(page.quantity, Quantity::Power);
        assert!(page.custom_currency_symbol.is_empty());
        assert!(page.feeds_configured());
    }

    #[test]
    fn test_numeric_strings_degrade() {
        let mut page = PageSettings::with_auto_feeds("p");
        page.power_scale = "abc".into();
        page.unit_cost = "".into();
        assert_eq!(page.power_scale_factor(), 1.0);
        assert_eq!(page.unit_cost_value(), 0.0);
        page.power_scale = "0.001".into();
        assert!((page.power_scale_factor() - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_currency_symbol() {
        let mut page = PageSettings::with_auto_feeds("p");
        assert_eq!(page.currency_symbol(), "£");
        page.cost_symbol = "custom".into();
        page.custom_currency_symbol = "CHF".into();
        assert_eq!(page.currency_symbol(), "CHF");
        page.cost_symbol = "€".into();
        assert_eq!(page.currency_symbol(), "€");
    }

    #[test]
    fn test_auto_feeds() {
        let page = PageSettings::with_auto_feeds("p");
        assert!(page.needs_feed_lookup());
        assert!(!page.feeds_configured());
    }

    #[test]
    fn test_account_base_url() {
        let mut acct = Account {
            id: 1,
            name: "Home".into(),
            url: "emoncms.org/".into(),
            use_ssl: true,
            api_key: "abc".into(),
        };
        assert_eq!(acct.base_url().as_deref(), Some("https://emoncms.org"));
        acct.use_ssl = false;
        assert_eq!(acct.base_url().as_deref(), Some("http://emoncms.org"));
        acct.api_key.clear();
        assert!(acct.base_url().is_none());
    }

    #[test]
    fn test_readings_watts_and_kilowatts() {
        let page = PageSettings::with_auto_feeds("p");
        let r = format_readings(640.4, 3.26, &page, false);
        assert_eq!(r.now, Reading { value: "640".into(), unit: "W".into() });
        assert_eq!(r.today, Reading { value: "3.3".into(), unit: "kWh".into() });
        let r = format_readings(2450.0, 0.0, &page, false);
        assert_eq!(r.now.value, "2.45");
        assert_eq!(r.now.unit, "kW");
    }

    #[test]
    fn test_readings_cost_mode() {
        let mut page = PageSettings::with_auto_feeds("p");
        page.unit_cost = "0.20".into();
        page.cost_symbol = "$".into();
        let r = format_readings(1500.0, 10.0, &page, true);
        assert_eq!(r.now.value, "0.30/h");
        assert_eq!(r.today.value, "2.00");
        assert_eq!(r.today.unit, "$");
    }

    #[test]
    fn test_readings_other_quantities_are_raw() {
        let mut page = PageSettings::with_auto_feeds("p");
        page.quantity = Quantity::Voltage;
        assert_eq!(format_readings(231.4, 0.0, &page, false).now, Reading { value: "231.4".into(), unit: "V".into() });
        page.quantity = Quantity::Current;
        assert_eq!(format_readings(4.2, 0.0, &page, false).now.unit, "A");
        page.quantity = Quantity::Other;
        page.quantity_unit = "ppm".into();
        assert_eq!(format_readings(412.0, 0.0, &page, false).now.unit, "ppm");
    }
}
