// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Replaces date placeholders in object names and URLs.
//!
//! Daily data files often carry the date in their name. Templates use
//! `$DATEISO` for today and `$DATEDIFF` for a date some days in the past,
//! both formatted as `YYYY-MM-DD`.

use crate::{Error, Result};
use chrono::{NaiveDate, TimeDelta};

pub const DATE_ISO: &str = "$DATEISO";
pub const DATE_DIFF: &str = "$DATEDIFF";

const FORMAT: &str = "%Y-%m-%d";

/// Today's date in UTC.
pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Replaces every `$DATEISO` in `template` with `today`.
///
/// # Example
/// ```
/// # use pipeline_functions::date_tokens::replace_iso_date;
/// let today = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
/// assert_eq!(replace_iso_date("data-$DATEISO.csv", today), "data-2024-03-01.csv");
/// ```
pub fn replace_iso_date(template: &str, today: NaiveDate) -> String {
    template.replace(DATE_ISO, &today.format(FORMAT).to_string())
}

/// Replaces every `$DATEDIFF` in `template` with `today` minus `days`.
pub fn replace_date_diff(template: &str, today: NaiveDate, days: i64) -> Result<String> {
    let date = TimeDelta::try_days(days)
        .and_then(|delta| today.checked_sub_signed(delta))
        .ok_or_else(|| Error::DateToken {
            template: template.to_string(),
            reason: "the date offset is out of range",
        })?;
    Ok(template.replace(DATE_DIFF, &date.format(FORMAT).to_string()))
}

/// Resolves the source and destination of a fetch request.
///
/// `$DATEISO` is replaced in both names, `$DATEDIFF` only in the source.
pub fn resolve_fetch_paths(
    source: &str,
    destination: &str,
    datediff: i64,
    today: NaiveDate,
) -> Result<(String, String)> {
    let mut source = replace_iso_date(source, today);
    let destination = replace_iso_date(destination, today);
    if source.contains(DATE_DIFF) {
        source = replace_date_diff(&source, today, datediff)?;
    }
    Ok((source, destination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test_case("data-$DATEISO.csv", "data-2024-03-01.csv")]
    #[test_case("$DATEISO/$DATEISO.csv", "2024-03-01/2024-03-01.csv")]
    #[test_case("no-tokens.csv", "no-tokens.csv")]
    #[test_case("data-$DATEDIFF.csv", "data-$DATEDIFF.csv")]
    fn iso_date(template: &str, want: &str) {
        assert_eq!(replace_iso_date(template, date(2024, 3, 1)), want);
    }

    #[test_case("data-$DATEDIFF.csv", 6, "data-2024-03-04.csv")]
    #[test_case("data-$DATEDIFF.csv", 0, "data-2024-03-10.csv")]
    #[test_case("data-$DATEDIFF.csv", 10, "data-2024-02-29.csv")]
    #[test_case("data-$DATEDIFF.csv", -1, "data-2024-03-11.csv")]
    #[test_case("data-$DATEISO.csv", 6, "data-$DATEISO.csv")]
    fn date_diff(template: &str, days: i64, want: &str) -> anyhow::Result<()> {
        assert_eq!(replace_date_diff(template, date(2024, 3, 10), days)?, want);
        Ok(())
    }

    #[test]
    fn date_diff_out_of_range() {
        let err = replace_date_diff("data-$DATEDIFF.csv", date(2024, 3, 10), i64::MAX).unwrap_err();
        assert!(matches!(err, Error::DateToken { .. }), "{err:?}");
    }

    #[test]
    fn fetch_paths() -> anyhow::Result<()> {
        let (source, destination) = resolve_fetch_paths(
            "https://example.com/$DATEDIFF/data-$DATEISO.csv",
            "raw/$DATEISO/$DATEDIFF.csv",
            6,
            date(2024, 3, 10),
        )?;
        assert_eq!(source, "https://example.com/2024-03-04/data-2024-03-10.csv");
        // `$DATEDIFF` is only replaced in the source.
        assert_eq!(destination, "raw/2024-03-10/$DATEDIFF.csv");
        Ok(())
    }
}
