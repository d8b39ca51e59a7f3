//! Bulletin identities and their on-disk names.

use regex::Regex;
use std::{fmt, str::FromStr};

use crate::calendar::iso_weeks_in_year;

/// The four bulletin series published each week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    /// All-case notifiable diseases (全数把握).
    Zensu,
    /// Acute respiratory infection sentinel surveillance.
    Ari,
    /// Sentinel-site diseases (定点把握).
    Teiten,
    /// Multi-year trend tables.
    Trend,
}

impl DataType {
    /// Order in which `all` processes the series.
    pub const ALL: [DataType; 4] = [
        DataType::Zensu,
        DataType::Teiten,
        DataType::Trend,
        DataType::Ari,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Zensu => "zensu",
            DataType::Ari => "ari",
            DataType::Teiten => "teiten",
            DataType::Trend => "trend",
        }
    }

    /// First bulletin published for this series.
    pub fn first_week(self) -> YearWeek {
        match self {
            DataType::Ari => YearWeek::new(2025, 15),
            DataType::Zensu | DataType::Teiten | DataType::Trend => YearWeek::new(2012, 37),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zensu" => Ok(DataType::Zensu),
            "ari" => Ok(DataType::Ari),
            "teiten" => Ok(DataType::Teiten),
            "trend" => Ok(DataType::Trend),
            other => Err(format!("unknown data type {other:?}")),
        }
    }
}

/// An ISO year/week pair. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearWeek {
    pub year: i32,
    pub week: u32,
}

impl YearWeek {
    pub const fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// The following ISO week, rolling over after the year's last week (52 or 53).
    pub fn next(self) -> Self {
        if self.week >= iso_weeks_in_year(self.year) {
            Self::new(self.year + 1, 1)
        } else {
            Self::new(self.year, self.week + 1)
        }
    }

    /// Every week from `self` to `last`, both inclusive.
    pub fn through(self, last: YearWeek) -> impl Iterator<Item = YearWeek> {
        std::iter::successors(Some(self), |w| Some(w.next())).take_while(move |w| *w <= last)
    }
}

impl fmt::Display for YearWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}W{:02}", self.year, self.week)
    }
}

/// Uniquely identifies one source document and one normalized output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BulletinId {
    pub year: i32,
    pub week: u32,
    pub data_type: DataType,
}

impl BulletinId {
    pub fn new(year: i32, week: u32, data_type: DataType) -> Self {
        Self {
            year,
            week,
            data_type,
        }
    }

    pub fn year_week(&self) -> YearWeek {
        YearWeek::new(self.year, self.week)
    }

    /// `2023-01-zensu.csv`
    pub fn raw_file_name(&self) -> String {
        format!("{}-{:02}-{}.csv", self.year, self.week, self.data_type)
    }

    /// `2023-01-zensu-clean.csv`
    pub fn clean_file_name(&self) -> String {
        format!("{}-{:02}-{}-clean.csv", self.year, self.week, self.data_type)
    }
}

impl fmt::Display for BulletinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}W{:02}", self.data_type, self.year, self.week)
    }
}

/// Matches `<year>-<WW>-<type>-clean.csv` names produced by [`BulletinId::clean_file_name`].
pub struct CleanFileName {
    re: Regex,
}

impl CleanFileName {
    pub fn new() -> Self {
        Self {
            re: Regex::new(r"^(\d{4})-(\d{1,2})-([a-z]+)-clean\.csv$")
                .expect("clean file name pattern should compile"),
        }
    }

    pub fn parse(&self, file_name: &str) -> Option<BulletinId> {
        let caps = self.re.captures(file_name)?;
        let year = caps[1].parse().ok()?;
        let week = caps[2].parse().ok()?;
        let data_type = caps[3].parse().ok()?;
        Some(BulletinId::new(year, week, data_type))
    }
}

impl Default for CleanFileName {
    fn default() -> Self {
        Self::new()
    }
}
