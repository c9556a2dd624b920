//! Reading URL lists for the `--input` option
//!
//! URLs are read one per line from any reader. Blank lines and comments are
//! skipped.

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Comment marker for ignoring lines in URL lists
const COMMENT_MARKER: &str = "#";

/// URLs read from a file or stdin, in file order
#[derive(Debug, Clone)]
pub(crate) struct UrlList {
    pub(crate) urls: Vec<String>,
}

impl UrlList {
    /// Create a `UrlList` from any reader
    pub(crate) fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let lines: Vec<String> = BufReader::new(reader)
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .context("Cannot read lines from reader")?;

        Ok(UrlList {
            urls: Self::filter_lines(lines),
        })
    }

    fn filter_lines(lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
            .collect()
    }
}

impl TryFrom<&Path> for UrlList {
    type Error = anyhow::Error;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        if path == Path::new("-") {
            Self::from_reader(std::io::stdin())
        } else {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Cannot open --input file: {}", path.display()))?;
            Self::from_reader(file)
        }
    }
}
