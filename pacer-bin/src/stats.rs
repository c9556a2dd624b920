//! Formatting of per-throttle statistics printed with `--stats`

use anyhow::{Error, Result, anyhow};
use pacer_lib::ThrottleStats;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use strum::{Display as StrumDisplay, VariantNames};

/// The format to use for the statistics report
#[derive(Debug, Deserialize, Default, Clone, Copy, StrumDisplay, VariantNames, PartialEq, Eq)]
#[non_exhaustive]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub(crate) enum StatsFormat {
    #[default]
    Compact,
    Json,
}

impl FromStr for StatsFormat {
    type Err = Error;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.to_lowercase().as_str() {
            "compact" | "string" => Ok(StatsFormat::Compact),
            "json" => Ok(StatsFormat::Json),
            _ => Err(anyhow!("Unknown format {format}")),
        }
    }
}

struct CompactStats<'a> {
    stats: &'a [(String, ThrottleStats)],
}

impl Display for CompactStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Per-throttle statistics")?;
        writeln!(f, "{}", "─".repeat(60))?;

        let width = self
            .stats
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max(10);

        for (name, stats) in self.stats {
            writeln!(f, "{name:<width$} │ {}", stats.summary())?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    name: &'a str,
    #[serde(flatten)]
    stats: &'a ThrottleStats,
}

/// Render statistics in the given format.
///
/// Returns `None` if there are no throttles to report on.
pub(crate) fn format_stats(
    stats: &[(String, ThrottleStats)],
    format: StatsFormat,
) -> Result<Option<String>> {
    if stats.is_empty() {
        return Ok(None);
    }

    let rendered = match format {
        StatsFormat::Compact => CompactStats { stats }.to_string(),
        StatsFormat::Json => {
            let entries: Vec<_> = stats
                .iter()
                .map(|(name, stats)| JsonEntry { name, stats })
                .collect();
            serde_json::to_string_pretty(&entries)?
        }
    };
    Ok(Some(rendered))
}
