use crate::bulletin::{BulletinId, DataType, YearWeek};
use crate::error::{Result, ScrapeError};

/// First bulletin on the legacy `/niid/images/idwr/sokuho/` tree.
pub const LEGACY_FIRST: YearWeek = YearWeek::new(2012, 37);
/// Last legacy bulletin. 2022 has 52 ISO weeks, so this covers 2022W52 plus 2023W01.
pub const LEGACY_LAST: YearWeek = YearWeek::new(2023, 1);
/// Trend tables gained the `/jp/` segment for weeks >= 11 of years >= 2025.
pub const TREND_LOCALE_MIN_YEAR: i32 = 2025;
pub const TREND_LOCALE_MIN_WEEK: u32 = 11;
/// Zensu moved to the `/jp/` tree one week after trend.
pub const ZENSU_LOCALE_FROM: YearWeek = YearWeek::new(2025, 12);
/// Teiten moved to the `/jp/` tree at the start of 2025.
pub const TEITEN_LOCALE_MIN_YEAR: i32 = 2025;

/// Historical publishing layouts of the upstream site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLayout {
    /// `/niid/images/idwr/sokuho/idwr-<year>/<year><WW>/`
    Legacy,
    /// `/surveillance/idwr/rapid/<year>/<week>/`
    Modern,
    /// `/surveillance/idwr/jp/rapid/<year>/<week>/`
    ModernLocale,
}

struct Rule {
    name: &'static str,
    applies: fn(&BulletinId) -> bool,
    layout: SourceLayout,
}

fn in_legacy_range(id: &BulletinId) -> bool {
    (LEGACY_FIRST..=LEGACY_LAST).contains(&id.year_week())
}

fn trend_with_locale(id: &BulletinId) -> bool {
    id.data_type == DataType::Trend
        && id.year >= TREND_LOCALE_MIN_YEAR
        && id.week >= TREND_LOCALE_MIN_WEEK
}

fn trend_without_locale(id: &BulletinId) -> bool {
    id.data_type == DataType::Trend
}

fn zensu_with_locale(id: &BulletinId) -> bool {
    id.data_type == DataType::Zensu && id.year_week() >= ZENSU_LOCALE_FROM
}

fn ari_or_recent_teiten(id: &BulletinId) -> bool {
    id.data_type == DataType::Ari
        || (id.data_type == DataType::Teiten && id.year >= TEITEN_LOCALE_MIN_YEAR)
}

fn anything(_: &BulletinId) -> bool {
    true
}

/// Evaluated top to bottom; the first match wins.
static RULES: &[Rule] = &[
    Rule {
        name: "legacy",
        applies: in_legacy_range,
        layout: SourceLayout::Legacy,
    },
    Rule {
        name: "trend-locale",
        applies: trend_with_locale,
        layout: SourceLayout::ModernLocale,
    },
    Rule {
        name: "trend",
        applies: trend_without_locale,
        layout: SourceLayout::Modern,
    },
    Rule {
        name: "zensu-locale",
        applies: zensu_with_locale,
        layout: SourceLayout::ModernLocale,
    },
    Rule {
        name: "ari-teiten-locale",
        applies: ari_or_recent_teiten,
        layout: SourceLayout::ModernLocale,
    },
    Rule {
        name: "modern",
        applies: anything,
        layout: SourceLayout::Modern,
    },
];

/// Picks the layout a bulletin was published under.
pub fn source_layout(id: &BulletinId) -> Result<SourceLayout> {
    let gap = || ScrapeError::RoutingGap {
        year: id.year,
        week: id.week,
        data_type: id.data_type,
    };
    if id.week == 0 || id.week > 53 || id.year_week() < LEGACY_FIRST {
        return Err(gap());
    }
    RULES
        .iter()
        .find(|rule| (rule.applies)(id))
        .map(|rule| {
            tracing::trace!(bulletin = %id, rule = rule.name, "routed");
            rule.layout
        })
        .ok_or_else(gap)
}

/// Full source URL of a bulletin under `base` (scheme and host, no trailing slash).
pub fn source_url(base: &str, id: &BulletinId) -> Result<String> {
    let layout = source_layout(id)?;
    let (year, week) = (id.year, id.week);
    let file = match id.data_type {
        DataType::Trend => format!("week{week:02}-trend.csv"),
        other => format!("{year}-{week:02}-{other}.csv"),
    };
    Ok(match layout {
        SourceLayout::Legacy => {
            format!("{base}/niid/images/idwr/sokuho/idwr-{year}/{year}{week:02}/{file}")
        }
        SourceLayout::Modern => format!("{base}/surveillance/idwr/rapid/{year}/{week}/{file}"),
        SourceLayout::ModernLocale => {
            format!("{base}/surveillance/idwr/jp/rapid/{year}/{week}/{file}")
        }
    })
}
