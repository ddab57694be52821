use std::fmt;

use serde::{Deserialize, Serialize};

/// Chart timeframe the user picked next to the uploaded screenshot.
///
/// The set is closed. Free-form input that matches none of the known spellings
/// becomes [`Timeframe::Unspecified`] rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Timeframe {
    #[serde(rename = "1-minute")]
    OneMinute,
    #[serde(rename = "5-minute")]
    FiveMinutes,
    #[serde(rename = "15-minute")]
    FifteenMinutes,
    #[serde(rename = "30-minute")]
    ThirtyMinutes,
    #[default]
    #[serde(rename = "1-hour")]
    OneHour,
    #[serde(rename = "4-hour")]
    FourHours,
    #[serde(rename = "1-day")]
    OneDay,
    #[serde(rename = "1-week")]
    OneWeek,
    Unspecified,
}

impl Timeframe {
    /// Selector order.
    pub const ALL: [Timeframe; 9] = [
        Timeframe::OneMinute,
        Timeframe::FiveMinutes,
        Timeframe::FifteenMinutes,
        Timeframe::ThirtyMinutes,
        Timeframe::OneHour,
        Timeframe::FourHours,
        Timeframe::OneDay,
        Timeframe::OneWeek,
        Timeframe::Unspecified,
    ];

    /// Human label substituted into the task directive.
    pub fn label(self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1 Minute",
            Timeframe::FiveMinutes => "5 Minutes",
            Timeframe::FifteenMinutes => "15 Minutes",
            Timeframe::ThirtyMinutes => "30 Minutes",
            Timeframe::OneHour => "1 Hour",
            Timeframe::FourHours => "4 Hours",
            Timeframe::OneDay => "1 Day",
            Timeframe::OneWeek => "1 Week",
            Timeframe::Unspecified => "Other / Unknown",
        }
    }

    /// Stable kebab code used in events and receipts.
    pub fn code(self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1-minute",
            Timeframe::FiveMinutes => "5-minute",
            Timeframe::FifteenMinutes => "15-minute",
            Timeframe::ThirtyMinutes => "30-minute",
            Timeframe::OneHour => "1-hour",
            Timeframe::FourHours => "4-hour",
            Timeframe::OneDay => "1-day",
            Timeframe::OneWeek => "1-week",
            Timeframe::Unspecified => "unspecified",
        }
    }

    fn short_code(self) -> Option<&'static str> {
        match self {
            Timeframe::OneMinute => Some("1m"),
            Timeframe::FiveMinutes => Some("5m"),
            Timeframe::FifteenMinutes => Some("15m"),
            Timeframe::ThirtyMinutes => Some("30m"),
            Timeframe::OneHour => Some("1h"),
            Timeframe::FourHours => Some("4h"),
            Timeframe::OneDay => Some("1d"),
            Timeframe::OneWeek => Some("1w"),
            Timeframe::Unspecified => None,
        }
    }

    pub fn parse_lenient(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Timeframe::Unspecified;
        }
        Self::ALL
            .into_iter()
            .find(|timeframe| {
                normalized == timeframe.code()
                    || normalized == timeframe.label().to_ascii_lowercase()
                    || timeframe.short_code() == Some(normalized.as_str())
            })
            .unwrap_or(Timeframe::Unspecified)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::Timeframe;

    #[test]
    fn default_is_one_hour() {
        assert_eq!(Timeframe::default(), Timeframe::OneHour);
    }

    #[test]
    fn parse_accepts_codes_labels_and_short_forms() {
        assert_eq!(Timeframe::parse_lenient("1-hour"), Timeframe::OneHour);
        assert_eq!(Timeframe::parse_lenient("  4 Hours "), Timeframe::FourHours);
        assert_eq!(Timeframe::parse_lenient("15M"), Timeframe::FifteenMinutes);
        assert_eq!(Timeframe::parse_lenient("1w"), Timeframe::OneWeek);
        assert_eq!(
            Timeframe::parse_lenient("unspecified"),
            Timeframe::Unspecified
        );
    }

    #[test]
    fn unknown_labels_fall_back_to_unspecified() {
        assert_eq!(Timeframe::parse_lenient("2 Hours"), Timeframe::Unspecified);
        assert_eq!(Timeframe::parse_lenient(""), Timeframe::Unspecified);
        assert_eq!(Timeframe::parse_lenient("1 Jam"), Timeframe::Unspecified);
    }

    #[test]
    fn every_timeframe_round_trips_through_its_code() {
        for timeframe in Timeframe::ALL {
            assert_eq!(Timeframe::parse_lenient(timeframe.code()), timeframe);
            assert_eq!(Timeframe::parse_lenient(timeframe.label()), timeframe);
        }
    }

    #[test]
    fn serializes_as_kebab_code() -> anyhow::Result<()> {
        for timeframe in Timeframe::ALL {
            let encoded = serde_json::to_value(timeframe)?;
            assert_eq!(encoded, serde_json::json!(timeframe.code()));
        }
        Ok(())
    }
}
