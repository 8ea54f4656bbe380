//! Export/import codec: full-state JSON, the fixed 22-column tabular
//! CSV, and the passphrase-obfuscated blob.
//!
//! The obfuscated format is a byte-wise XOR of the state JSON against
//! a repeating passphrase keystream, then base64. It is reversible
//! text-safe obfuscation and **not encryption**. It offers no
//! confidentiality against anyone who cares to look. It exists so a
//! casual export isn't trivially human-readable, nothing more.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::TrialMateError;
use crate::model::AppState;

/// Column order of the tabular export. Fixed since the first release;
/// downstream spreadsheets key on these names.
const CSV_HEADER: [&str; 22] = [
    "date",
    "tookDose",
    "doseAmount",
    "sleep_score",
    "sleep_quality",
    "speed_to_sleep",
    "groggy",
    "wake_ups",
    "total_sleep",
    "deep",
    "rem",
    "energy",
    "focus",
    "mood",
    "stress",
    "weight",
    "rhr",
    "hrv",
    "bp_sys",
    "bp_dia",
    "reaction_time",
    "notes",
];

/// Pretty-printed structural dump of the full state.
pub fn to_json(state: &AppState) -> Result<String, TrialMateError> {
    serde_json::to_string_pretty(state)
        .map_err(|e| TrialMateError::Import(format!("Failed to serialize state: {}", e)))
}

/// Strict parse of a structural dump.
pub fn from_json(json: &str) -> Result<AppState, TrialMateError> {
    serde_json::from_str(json)
        .map_err(|e| TrialMateError::Import(format!("Not a valid state file: {}", e)))
}

/// Render a numeric cell: whole numbers without the trailing ".0",
/// missing values as an empty cell.
fn num_cell(value: Option<f64>) -> String {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

/// Free text must stay single-line and column-safe: commas become
/// semicolons, newlines become spaces.
fn sanitize_notes(notes: &str) -> String {
    notes.replace(',', ";").replace(['\r', '\n'], " ")
}

/// Tabular dump: one row per date in ascending order.
pub fn to_csv(state: &AppState) -> String {
    let mut csv = CSV_HEADER.join(",");
    csv.push('\n');

    for (date, log) in &state.daily {
        let s = &log.sliders;
        let w = &log.wearables;
        let m = &log.metrics;
        let row = [
            date.clone(),
            log.took_dose.as_str().to_string(),
            num_cell(log.dose_amount),
            num_cell(w.score),
            num_cell(Some(s.sleep)),
            num_cell(Some(s.latency)),
            num_cell(Some(s.groggy)),
            num_cell(log.wake_ups),
            w.total.clone().unwrap_or_default(),
            num_cell(w.deep),
            num_cell(w.rem),
            num_cell(Some(s.energy)),
            num_cell(Some(s.focus)),
            num_cell(Some(s.mood)),
            num_cell(Some(s.stress)),
            num_cell(m.weight),
            num_cell(m.rhr),
            num_cell(m.hrv),
            num_cell(m.bp_sys),
            num_cell(m.bp_dia),
            num_cell(m.rt),
            sanitize_notes(&log.notes),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }

    csv
}

fn xor_keystream(data: &[u8], passphrase: &[u8]) -> Vec<u8> {
    data.iter()
        .enumerate()
        .map(|(i, b)| b ^ passphrase[i % passphrase.len()])
        .collect()
}

/// Obfuscated dump: XOR the compact state JSON against the passphrase
/// keystream, then base64-encode. Decoding needs the same passphrase.
pub fn obfuscate(state: &AppState, passphrase: &str) -> Result<String, TrialMateError> {
    if passphrase.is_empty() {
        return Err(TrialMateError::Import("A passphrase is required".to_string()));
    }
    let json = serde_json::to_string(state)
        .map_err(|e| TrialMateError::Import(format!("Failed to serialize state: {}", e)))?;
    Ok(BASE64.encode(xor_keystream(json.as_bytes(), passphrase.as_bytes())))
}

/// Reverse [`obfuscate`]. Fails with a decryption error when the text
/// isn't valid base64 or the XOR result doesn't parse as a state
/// structure, which is what a wrong passphrase produces. The state is
/// fully parsed before anything is applied; there is no partial import.
pub fn deobfuscate(text: &str, passphrase: &str) -> Result<AppState, TrialMateError> {
    if passphrase.is_empty() {
        return Err(TrialMateError::Import("A passphrase is required".to_string()));
    }

    let raw = BASE64
        .decode(text.trim())
        .map_err(|e| TrialMateError::Decrypt(format!("Not a valid export file: {}", e)))?;
    let json_bytes = xor_keystream(&raw, passphrase.as_bytes());
    let json = String::from_utf8(json_bytes)
        .map_err(|_| TrialMateError::Decrypt("Wrong passphrase?".to_string()))?;
    serde_json::from_str(&json)
        .map_err(|_| TrialMateError::Decrypt("Wrong passphrase?".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DailyLog, DoseTaken};

    fn sample_state() -> AppState {
        let mut state = AppState::default();
        state.plan.participant_name = "Ada".to_string();
        state.plan.start_date = "2024-01-01".to_string();

        let mut jan2 = DailyLog::new("2024-01-02");
        jan2.took_dose = DoseTaken::Yes;
        jan2.dose_amount = Some(3.0);
        jan2.sliders.sleep = 7.0;
        jan2.wake_ups = Some(2.0);
        jan2.wearables.score = Some(88.0);
        jan2.wearables.total = Some("7:15".to_string());
        jan2.metrics.rhr = Some(55.5);
        jan2.notes = "slept well, woke up\nonce".to_string();
        state.daily.insert(jan2.date.clone(), jan2);

        state
            .daily
            .insert("2024-01-01".to_string(), DailyLog::new("2024-01-01"));
        state
    }

    #[test]
    fn test_csv_header_is_fixed_22_columns() {
        let csv = to_csv(&sample_state());
        let header = csv.lines().next().unwrap();
        assert_eq!(
            header,
            "date,tookDose,doseAmount,sleep_score,sleep_quality,speed_to_sleep,groggy,\
             wake_ups,total_sleep,deep,rem,energy,focus,mood,stress,weight,rhr,hrv,\
             bp_sys,bp_dia,reaction_time,notes"
        );
        assert_eq!(header.split(',').count(), 22);
    }

    #[test]
    fn test_csv_rows_ascending_and_column_safe() {
        let csv = to_csv(&sample_state());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2024-01-01,no,"));
        assert!(lines[2].starts_with("2024-01-02,yes,3,88,7,"));

        // Every row has exactly 22 cells despite the comma and newline
        // in the notes.
        for line in &lines[1..] {
            assert_eq!(line.split(',').count(), 22, "row: {}", line);
        }
        assert!(lines[2].ends_with("slept well; woke up once"));
    }

    #[test]
    fn test_csv_fractional_values_keep_precision() {
        let csv = to_csv(&sample_state());
        assert!(csv.contains(",55.5,"));
        assert!(csv.contains(",7:15,"));
    }

    #[test]
    fn test_json_round_trip() {
        let state = sample_state();
        let json = to_json(&state).unwrap();
        assert_eq!(from_json(&json).unwrap(), state);
    }

    #[test]
    fn test_obfuscate_round_trip() {
        let state = sample_state();
        let blob = obfuscate(&state, "hunter2").unwrap();
        // Text-safe: plain base64, no raw JSON leaking through.
        assert!(!blob.contains("participantName"));
        let back = deobfuscate(&blob, "hunter2").unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_wrong_passphrase_is_a_decrypt_error() {
        let blob = obfuscate(&sample_state(), "hunter2").unwrap();
        match deobfuscate(&blob, "wrong-passphrase") {
            Err(TrialMateError::Decrypt(_)) => {}
            other => panic!("expected decrypt error, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_input_is_a_decrypt_error() {
        assert!(matches!(
            deobfuscate("%%% not base64 %%%", "hunter2"),
            Err(TrialMateError::Decrypt(_))
        ));
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(obfuscate(&sample_state(), "").is_err());
        assert!(deobfuscate("aGk=", "").is_err());
    }
}
