//! Name and time normalization for stored fixtures.

use chrono::{DateTime, Datelike, NaiveDate};

/// Turkish letters the mobile client cannot rely on rendering or sorting.
const TURKISH_MAP: &[(char, char)] = &[
    ('ç', 'c'),
    ('Ç', 'C'),
    ('ğ', 'g'),
    ('Ğ', 'G'),
    ('ı', 'i'),
    ('İ', 'I'),
    ('ö', 'o'),
    ('Ö', 'O'),
    ('ş', 's'),
    ('Ş', 'S'),
    ('ü', 'u'),
    ('Ü', 'U'),
];

/// Replace Turkish diacritics with ASCII and trim. Idempotent.
pub fn clean_team_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            TURKISH_MAP
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// `YYYY-MM-DD`, zero padded.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Season a date belongs to. Months before `rollover_month` count toward
/// the previous year's season.
pub fn season_for(date: NaiveDate, rollover_month: u32) -> i32 {
    if date.month() < rollover_month {
        date.year() - 1
    } else {
        date.year()
    }
}

/// Kickoff split into its stored forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kickoff {
    /// `YYYY-MM-DD` as printed upstream.
    pub date: String,
    /// `HH:MM` as printed upstream.
    pub time: String,
    /// Epoch millis.
    pub timestamp: i64,
}

/// Split an upstream kickoff string such as `2024-03-05T19:00:00+03:00`.
///
/// Date and time keep the upstream's own offset; only the timestamp is an
/// absolute instant.
pub fn split_kickoff(raw: &str) -> Option<Kickoff> {
    let instant = DateTime::parse_from_rfc3339(raw).ok()?;
    let (date, rest) = raw.split_once('T')?;
    let time = rest.get(..5)?;
    Some(Kickoff {
        date: date.to_string(),
        time: time.to_string(),
        timestamp: instant.timestamp_millis(),
    })
}
