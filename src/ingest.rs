//! CSV ingestion for wearable exports.
//!
//! Header detection is a pure function over the header row, so the
//! sniffing heuristics are testable without any file or store involved.
//! Detected values become per-date partial patches; applying a patch
//! never disturbs fields the CSV knows nothing about.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::model::{BodyMetrics, DailyLog, Wearables};
use crate::timeutil::{format_date, parse_loose_date};

/// Column indices detected from a CSV header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: Option<usize>,
    pub rhr: Option<usize>,
    pub hrv: Option<usize>,
    pub score: Option<usize>,
}

/// Lowercase and strip whitespace, underscores and quotes so header
/// variants like `"Resting_Heart Rate"` all compare equal.
fn normalize_header(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '"')
        .collect()
}

/// Detect the date, resting-heart-rate, HRV and sleep-score columns by
/// substring match. A column that never matches simply stays None; the
/// corresponding field is never populated.
pub fn sniff_columns(header: &[&str]) -> ColumnMap {
    let normalized: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();
    let find = |pred: &dyn Fn(&str) -> bool| normalized.iter().position(|h| pred(h));

    ColumnMap {
        date: find(&|h| h.contains("date") || h.contains("day")),
        rhr: find(&|h| h.contains("rest") && h.contains("heart")),
        hrv: find(&|h| h.contains("hrv") || h.contains("rmssd")),
        score: find(&|h| h.contains("score") && h.contains("sleep")),
    }
}

/// A partial per-date update produced by CSV ingestion. Only the
/// wearable/metric fields actually found in the file are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogPatch {
    pub wearables: Wearables,
    pub metrics: BodyMetrics,
}

impl LogPatch {
    pub fn is_empty(&self) -> bool {
        self.wearables.is_empty() && self.metrics.is_empty()
    }

    /// Merge this patch into an existing log, or synthesize a fresh
    /// no-dose log when none exists for the date.
    ///
    /// Wearables and metrics merge key-by-key with the patch winning
    /// per key; sliders, dose info and notes are preserved untouched.
    pub fn apply_to(&self, existing: Option<&DailyLog>, date: &str) -> DailyLog {
        let mut log = existing.cloned().unwrap_or_else(|| DailyLog::new(date));

        if self.wearables.score.is_some() {
            log.wearables.score = self.wearables.score;
        }
        if self.wearables.total.is_some() {
            log.wearables.total = self.wearables.total.clone();
        }
        if self.wearables.deep.is_some() {
            log.wearables.deep = self.wearables.deep;
        }
        if self.wearables.rem.is_some() {
            log.wearables.rem = self.wearables.rem;
        }

        if self.metrics.weight.is_some() {
            log.metrics.weight = self.metrics.weight;
        }
        if self.metrics.rhr.is_some() {
            log.metrics.rhr = self.metrics.rhr;
        }
        if self.metrics.hrv.is_some() {
            log.metrics.hrv = self.metrics.hrv;
        }
        if self.metrics.bp_sys.is_some() {
            log.metrics.bp_sys = self.metrics.bp_sys;
        }
        if self.metrics.bp_dia.is_some() {
            log.metrics.bp_dia = self.metrics.bp_dia;
        }
        if self.metrics.rt.is_some() {
            log.metrics.rt = self.metrics.rt;
        }

        log
    }
}

/// A cell counts only if it parses to a non-zero finite number.
/// Wearable exports pad missing days with 0, which is never a real
/// resting HR, HRV or sleep score.
fn numeric_cell(row: &[&str], idx: Option<usize>) -> Option<f64> {
    let raw = row.get(idx?)?.trim().trim_matches('"');
    let n: f64 = raw.parse().ok()?;
    (n.is_finite() && n != 0.0).then_some(n)
}

/// Parse CSV text into per-date patches.
///
/// Rows whose date cell is empty or unparseable are skipped silently;
/// a half-garbled export still imports every row it can. Returns the
/// patches keyed by ISO date.
pub fn parse_csv(text: &str) -> BTreeMap<String, LogPatch> {
    let mut lines = text.lines();
    let header: Vec<&str> = match lines.next() {
        Some(h) => h.split(',').collect(),
        None => return BTreeMap::new(),
    };
    let cols = sniff_columns(&header);
    debug!("Sniffed CSV columns: {:?}", cols);

    let mut patches: BTreeMap<String, LogPatch> = BTreeMap::new();
    let mut skipped = 0usize;

    for line in lines {
        let row: Vec<&str> = line.split(',').collect();
        let raw_date = match cols.date.and_then(|i| row.get(i)) {
            Some(cell) if !cell.trim().is_empty() => cell.trim().trim_matches('"'),
            _ => continue,
        };

        let date = match parse_loose_date(raw_date) {
            Some(d) => format_date(d),
            None => {
                skipped += 1;
                continue;
            }
        };

        let mut patch = LogPatch::default();
        patch.metrics.rhr = numeric_cell(&row, cols.rhr);
        patch.metrics.hrv = numeric_cell(&row, cols.hrv);
        patch.wearables.score = numeric_cell(&row, cols.score);

        if !patch.is_empty() {
            patches.insert(date, patch);
        }
    }

    info!(
        "Parsed CSV: {} dated rows imported, {} rows skipped",
        patches.len(),
        skipped
    );
    patches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DoseTaken;

    #[test]
    fn test_sniff_columns_case_and_separator_insensitive() {
        let header = ["Date", "Resting Heart Rate", "HRV (rMSSD)", "Sleep Score"];
        let cols = sniff_columns(&header);
        assert_eq!(cols.date, Some(0));
        assert_eq!(cols.rhr, Some(1));
        assert_eq!(cols.hrv, Some(2));
        assert_eq!(cols.score, Some(3));

        let header = ["\"day\"", "resting_heart_rate", "rMSSD", "sleep_score"];
        let cols = sniff_columns(&header);
        assert_eq!(cols.date, Some(0));
        assert_eq!(cols.rhr, Some(1));
        assert_eq!(cols.hrv, Some(2));
        assert_eq!(cols.score, Some(3));
    }

    #[test]
    fn test_sniff_columns_missing_is_none() {
        let cols = sniff_columns(&["Date", "Steps", "Calories"]);
        assert_eq!(cols.date, Some(0));
        assert_eq!(cols.rhr, None);
        assert_eq!(cols.hrv, None);
        assert_eq!(cols.score, None);
    }

    #[test]
    fn test_parse_csv_basic_row() {
        let csv = "Date,Resting Heart Rate,HRV (rMSSD),Sleep Score\n2024-01-05,55,62,88\n";
        let patches = parse_csv(csv);
        let patch = patches.get("2024-01-05").expect("patch for row date");
        assert_eq!(patch.metrics.rhr, Some(55.0));
        assert_eq!(patch.metrics.hrv, Some(62.0));
        assert_eq!(patch.wearables.score, Some(88.0));
    }

    #[test]
    fn test_parse_csv_skips_bad_dates() {
        let csv = "Date,Resting Heart Rate,HRV,Sleep Score\n\
                   not a date,55,62,88\n\
                   ,60,70,90\n\
                   2024-01-06,58,,91\n";
        let patches = parse_csv(csv);
        assert_eq!(patches.len(), 1);
        let patch = &patches["2024-01-06"];
        assert_eq!(patch.metrics.rhr, Some(58.0));
        assert_eq!(patch.metrics.hrv, None);
        assert_eq!(patch.wearables.score, Some(91.0));
    }

    #[test]
    fn test_parse_csv_normalizes_loose_dates() {
        let csv = "Day,Resting Heart Rate\n1/5/2024,57\n";
        let patches = parse_csv(csv);
        assert!(patches.contains_key("2024-01-05"));
    }

    #[test]
    fn test_zero_and_garbage_cells_excluded() {
        let csv = "Date,Resting Heart Rate,HRV,Sleep Score\n2024-01-07,0,n/a,82\n";
        let patches = parse_csv(csv);
        let patch = &patches["2024-01-07"];
        assert_eq!(patch.metrics.rhr, None);
        assert_eq!(patch.metrics.hrv, None);
        assert_eq!(patch.wearables.score, Some(82.0));
    }

    #[test]
    fn test_patch_merge_preserves_existing_fields() {
        let mut existing = DailyLog::new("2024-01-05");
        existing.took_dose = DoseTaken::Yes;
        existing.dose_amount = Some(3.0);
        existing.sliders.sleep = 8.0;
        existing.notes = "late workout".to_string();
        existing.wearables.total = Some("7:15".to_string());
        existing.metrics.rhr = Some(61.0);

        let patch = LogPatch {
            metrics: BodyMetrics {
                rhr: Some(55.0),
                ..Default::default()
            },
            wearables: Wearables {
                score: Some(88.0),
                ..Default::default()
            },
        };

        let merged = patch.apply_to(Some(&existing), "2024-01-05");
        // Patch wins per key.
        assert_eq!(merged.metrics.rhr, Some(55.0));
        assert_eq!(merged.wearables.score, Some(88.0));
        // Everything else untouched.
        assert_eq!(merged.took_dose, DoseTaken::Yes);
        assert_eq!(merged.dose_amount, Some(3.0));
        assert_eq!(merged.sliders.sleep, 8.0);
        assert_eq!(merged.notes, "late workout");
        assert_eq!(merged.wearables.total.as_deref(), Some("7:15"));
    }

    #[test]
    fn test_patch_synthesizes_log_when_none_exists() {
        let patch = LogPatch {
            wearables: Wearables {
                score: Some(90.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let log = patch.apply_to(None, "2024-01-09");
        assert_eq!(log.date, "2024-01-09");
        assert_eq!(log.took_dose, DoseTaken::No);
        assert_eq!(log.sliders.sleep, 5.0);
        assert_eq!(log.wearables.score, Some(90.0));
    }
}
