// KRX reports numbers as strings most of the time (sometimes with thousands separators)
// and occasionally as JSON numbers. None of the readers here fail; a field that cannot be
// read becomes zero or an empty string so one bad cell never drops a row.

use crate::domain::etf::UNKNOWN_BASE_DATE;
use crate::domain::{CompositionRow, EtfQuote};
use serde_json::{Map, Value};

/// Keys the record array has been published under, in lookup order.
pub const RECORD_ARRAY_KEYS: &[&str] = &["OutBlock_1", "outBlock1", "output"];

pub const ERROR_MESSAGE_KEY: &str = "error_message";

pub const ISU_NM: &str = "ISU_NM";
pub const TDD_CLSPRC: &str = "TDD_CLSPRC";
pub const FLUC_RT: &str = "FLUC_RT";
pub const ACC_TRDVOL: &str = "ACC_TRDVOL";
pub const BAS_DD: &str = "BAS_DD";
pub const ISU_CD: &str = "ISU_CD";
pub const CMP_SHR_RT: &str = "CMP_SHR_RT";
pub const MKT_TP_NM: &str = "MKT_TP_NM";

pub type RawRecord = Map<String, Value>;

/// Value of the first key in `keys` present on `obj`.
pub fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k))
}

/// Records of a response body, or a diagnostic explaining why there are none.
pub fn extract_records(body: &Value) -> Result<Vec<&RawRecord>, String> {
    let Some(obj) = body.as_object() else {
        return Err("response body is not a JSON object".to_string());
    };

    let records: Vec<&RawRecord> = match first_present(obj, RECORD_ARRAY_KEYS) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_object).collect(),
        _ => Vec::new(),
    };

    if records.is_empty() {
        let message = obj
            .get(ERROR_MESSAGE_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "no data in response (none of {} held any records)",
                    RECORD_ARRAY_KEYS.join(", ")
                )
            });
        return Err(message);
    }

    Ok(records)
}

pub fn quote_from_record(rec: &RawRecord) -> EtfQuote {
    EtfQuote {
        name: text_field(rec, ISU_NM),
        price: int_field(rec, TDD_CLSPRC),
        change_pct: pct_field(rec, FLUC_RT),
        volume: int_field(rec, ACC_TRDVOL),
    }
}

pub fn composition_row_from_record(rec: &RawRecord) -> CompositionRow {
    CompositionRow {
        code: text_field(rec, ISU_CD),
        name: text_field(rec, ISU_NM),
        weight_pct: pct_field(rec, CMP_SHR_RT),
        market: text_field(rec, MKT_TP_NM),
    }
}

/// As-of date from the first record's `BAS_DD`.
pub fn base_date_of(records: &[&RawRecord]) -> String {
    let raw = records.first().map(|r| text_field(r, BAS_DD));
    format_base_date(raw.as_deref())
}

/// `"20251020"` -> `"2025-10-20"`; anything that is not exactly 8 ASCII digits -> `"unknown"`.
pub fn format_base_date(raw: Option<&str>) -> String {
    match raw {
        Some(s) if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) => {
            format!("{}-{}-{}", &s[..4], &s[4..6], &s[6..])
        }
        _ => UNKNOWN_BASE_DATE.to_string(),
    }
}

pub fn text_field(rec: &RawRecord, code: &str) -> String {
    match rec.get(code) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

pub fn int_field(rec: &RawRecord, code: &str) -> i64 {
    rec.get(code).and_then(parse_int).unwrap_or(0)
}

/// Percentage rounded to 2 decimals; unreadable values become 0.0.
pub fn pct_field(rec: &RawRecord, code: &str) -> f64 {
    rec.get(code).and_then(parse_float).map(round2).unwrap_or(0.0)
}

/// Integer reading of a loosely typed value. Fractions are truncated toward zero.
pub fn parse_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let t = strip_separators(s);
            t.parse::<i64>().ok().or_else(|| {
                t.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Finite float reading of a loosely typed value.
pub fn parse_float(v: &Value) -> Option<f64> {
    let f = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => strip_separators(s).parse::<f64>().ok()?,
        _ => return None,
    };
    f.is_finite().then_some(f)
}

pub fn round2(v: f64) -> f64 {
    let r = (v * 100.0).round() / 100.0;
    // Collapse -0.0 so it classifies and prints like 0.
    if r == 0.0 {
        0.0
    } else {
        r
    }
}

fn strip_separators(s: &str) -> String {
    s.trim().chars().filter(|c| *c != ',').collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> RawRecord {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn reads_primary_then_alternate_keys() {
        let primary = json!({"OutBlock_1": [{"ISU_NM": "A"}], "output": [{"ISU_NM": "B"}]});
        assert_eq!(extract_records(&primary).unwrap()[0]["ISU_NM"], "A");

        let alternate = json!({"outBlock1": [{"ISU_NM": "C"}]});
        assert_eq!(extract_records(&alternate).unwrap()[0]["ISU_NM"], "C");

        let third = json!({"output": [{"ISU_NM": "D"}]});
        assert_eq!(extract_records(&third).unwrap()[0]["ISU_NM"], "D");
    }

    #[test]
    fn empty_or_missing_array_reports_diagnostic() {
        for body in [json!({}), json!({"OutBlock_1": []}), json!({"OutBlock_1": "x"})] {
            let diag = extract_records(&body).unwrap_err();
            assert!(!diag.is_empty());
        }
        assert!(extract_records(&json!([1, 2])).is_err());
    }

    #[test]
    fn prefers_provider_error_message() {
        let body = json!({"error_message": "인증키가 유효하지 않습니다", "OutBlock_1": []});
        assert_eq!(extract_records(&body).unwrap_err(), "인증키가 유효하지 않습니다");

        let blank = json!({"error_message": "   "});
        assert!(extract_records(&blank).unwrap_err().starts_with("no data"));
    }

    #[test]
    fn skips_non_object_elements() {
        let body = json!({"OutBlock_1": [null, 3, {"ISU_NM": "A"}]});
        assert_eq!(extract_records(&body).unwrap().len(), 1);
    }

    #[test]
    fn coerces_numeric_strings() {
        let rec = record(json!({
            "ISU_NM": " KODEX 200 ",
            "TDD_CLSPRC": "45,120",
            "FLUC_RT": "-1.234",
            "ACC_TRDVOL": 5012345,
        }));
        let q = quote_from_record(&rec);
        assert_eq!(q.name, "KODEX 200");
        assert_eq!(q.price, 45_120);
        assert_eq!(q.change_pct, -1.23);
        assert_eq!(q.volume, 5_012_345);
    }

    #[test]
    fn bad_fields_default_to_zero_without_dropping_row() {
        let rec = record(json!({
            "ISU_NM": "TIGER 미국S&P500",
            "TDD_CLSPRC": "-",
            "FLUC_RT": "NaN",
            "ACC_TRDVOL": null,
        }));
        let q = quote_from_record(&rec);
        assert_eq!(q.name, "TIGER 미국S&P500");
        assert_eq!(q.price, 0);
        assert_eq!(q.change_pct, 0.0);
        assert_eq!(q.volume, 0);

        let missing = quote_from_record(&record(json!({})));
        assert_eq!(missing.name, "");
        assert_eq!(missing.price, 0);
    }

    #[test]
    fn fractional_prices_truncate() {
        assert_eq!(parse_int(&json!("123.7")), Some(123));
        assert_eq!(parse_int(&json!(99.9)), Some(99));
        assert_eq!(parse_int(&json!("inf")), None);
        assert_eq!(parse_int(&json!(true)), None);
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(-0.001), 0.0);
        assert!(round2(-0.001).is_sign_positive());
    }

    #[test]
    fn formats_base_date() {
        assert_eq!(format_base_date(Some("20251020")), "2025-10-20");
        assert_eq!(format_base_date(Some("2025102")), "unknown");
        assert_eq!(format_base_date(Some("202510201")), "unknown");
        assert_eq!(format_base_date(Some("2025-10-")), "unknown");
        assert_eq!(format_base_date(Some("")), "unknown");
        assert_eq!(format_base_date(None), "unknown");
    }

    #[test]
    fn base_date_accepts_numeric_bas_dd() {
        let rec = record(json!({"BAS_DD": 20251020}));
        assert_eq!(base_date_of(&[&rec]), "2025-10-20");
        assert_eq!(base_date_of(&[]), "unknown");
    }

    #[test]
    fn reads_composition_rows() {
        let rec = record(json!({
            "ISU_CD": "005930",
            "ISU_NM": "삼성전자",
            "CMP_SHR_RT": "30.456",
            "MKT_TP_NM": "KOSPI",
        }));
        let row = composition_row_from_record(&rec);
        assert_eq!(row.code, "005930");
        assert_eq!(row.weight_pct, 30.46);
        assert_eq!(row.market, "KOSPI");
    }
}
