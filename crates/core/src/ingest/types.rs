/// Ordered candidate keys for each canonical field; the first present key wins.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    pub event_name: &'static [&'static str],
    pub country: &'static [&'static str],
    pub impact: &'static [&'static str],
    pub time: &'static [&'static str],
    pub forecast: &'static [&'static str],
    pub previous: &'static [&'static str],
    pub actual: &'static [&'static str],
}

/// Everything that differs between calendar providers. The normalization core
/// only ever reads this table.
#[derive(Debug, Clone, Copy)]
pub struct ProviderProfile {
    pub name: &'static str,
    pub base_url: &'static str,
    pub path: &'static str,
    pub api_key_param: &'static str,
    pub from_param: &'static str,
    pub to_param: &'static str,
    /// Key of the entry array inside a top-level object; `None` when the
    /// payload itself is the array.
    pub list_key: Option<&'static str>,
    /// `chrono` formats tried in order for naive UTC timestamps. RFC 3339 is
    /// always accepted as well.
    pub time_formats: &'static [&'static str],
    pub fields: FieldMap,
}

pub const FINNHUB: ProviderProfile = ProviderProfile {
    name: "finnhub",
    base_url: "https://finnhub.io",
    path: "/api/v1/calendar/economic",
    api_key_param: "token",
    from_param: "from",
    to_param: "to",
    list_key: Some("economicCalendar"),
    time_formats: &["%Y-%m-%d %H:%M:%S"],
    fields: FieldMap {
        event_name: &["event", "eventName"],
        country: &["country"],
        impact: &["impact"],
        time: &["time"],
        forecast: &["estimate", "forecast"],
        previous: &["prev", "previous"],
        actual: &["actual"],
    },
};

pub const FMP: ProviderProfile = ProviderProfile {
    name: "fmp",
    base_url: "https://financialmodelingprep.com",
    path: "/api/v3/economic_calendar",
    api_key_param: "apikey",
    from_param: "from",
    to_param: "to",
    list_key: None,
    time_formats: &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"],
    fields: FieldMap {
        event_name: &["event"],
        country: &["country"],
        impact: &["impact"],
        time: &["date"],
        forecast: &["estimate", "consensus"],
        previous: &["previous"],
        actual: &["actual"],
    },
};

pub fn profile_by_name(name: &str) -> Option<ProviderProfile> {
    match name.trim().to_ascii_lowercase().as_str() {
        "finnhub" => Some(FINNHUB),
        "fmp" | "financialmodelingprep" => Some(FMP),
        _ => None,
    }
}
