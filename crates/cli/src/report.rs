use crate::{AppError, JsonEnvelope};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub(super) struct ReportCommand {
    pub input: PathBuf,
    pub top: usize,
    pub filters: Vec<String>,
    pub find: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RowStatus {
    Valid,
    Invalid,
    Error,
    Unknown,
}

impl RowStatus {
    fn from_row(value: Option<&str>) -> Self {
        match value {
            Some("VALID") => Self::Valid,
            Some("INVALID") => Self::Invalid,
            Some("ERROR") => Self::Error,
            _ => Self::Unknown,
        }
    }

    fn from_filter(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "VALID" => Some(Self::Valid),
            "INVALID" => Some(Self::Invalid),
            "ERROR" => Some(Self::Error),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, Default)]
struct ReportFilters {
    status: Option<RowStatus>,
    rule: Option<String>,
    has_warning: bool,
    has_error: bool,
    find: Option<String>,
}

#[derive(Clone, Debug)]
struct ReportRow {
    row_index: usize,
    compass: String,
    status: RowStatus,
    err_code: Option<String>,
    failed_rule: Option<String>,
    warnings: usize,
    sum_deviation: Option<f64>,
}

#[derive(Serialize)]
struct ReportSummary {
    input_path: String,
    rows_total: usize,
    rows_ok: usize,
    rows_err: usize,
    counts_by_status: StatusCounts,
    counts_by_rule: BTreeMap<String, usize>,
    rows_with_warnings: usize,
    worst_k: Vec<ReportWorstRow>,
}

#[derive(Default, Serialize)]
struct StatusCounts {
    #[serde(rename = "VALID")]
    valid: usize,
    #[serde(rename = "INVALID")]
    invalid: usize,
    #[serde(rename = "ERROR")]
    error: usize,
    #[serde(rename = "UNKNOWN")]
    unknown: usize,
}

#[derive(Clone, Serialize)]
struct ReportWorstRow {
    row_index: usize,
    compass: String,
    status: String,
    sum_deviation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_rule: Option<String>,
}

pub(super) fn run(command: ReportCommand, json_output: bool) -> Result<JsonEnvelope, AppError> {
    if command.top == 0 {
        return Err(AppError::usage("--top must be >= 1".to_string()));
    }

    let filters = parse_filters(&command.filters, command.find)?;
    let rows = read_rows_from_path(&command.input)?;
    let filtered_rows = filtered_rows(&rows, &filters);
    let input_path = command.input.display().to_string();
    let summary = summarize_rows(&input_path, &filtered_rows, command.top);

    if !json_output {
        print_summary(&summary);
    }

    let data = serde_json::to_value(&summary).map_err(|err| {
        AppError::internal(format!("failed to serialize report summary: {}", err))
    })?;

    Ok(JsonEnvelope {
        status: "OK".to_string(),
        error: None,
        data: Some(data),
    })
}

fn parse_filters(raw_filters: &[String], find: Option<String>) -> Result<ReportFilters, AppError> {
    let mut filters = ReportFilters {
        find,
        ..ReportFilters::default()
    };

    for raw in raw_filters {
        if raw.eq_ignore_ascii_case("has_warning") {
            filters.has_warning = true;
            continue;
        }
        if raw.eq_ignore_ascii_case("has_error") {
            filters.has_error = true;
            continue;
        }

        if let Some((key, value)) = raw.split_once('=') {
            if key.eq_ignore_ascii_case("status") {
                let parsed = RowStatus::from_filter(value).ok_or_else(|| {
                    AppError::usage(format!(
                        "invalid --filter status value: {} (expected VALID|INVALID|ERROR|UNKNOWN)",
                        value
                    ))
                })?;
                if filters.status.is_some_and(|existing| existing != parsed) {
                    return Err(AppError::usage(
                        "multiple status filters are not supported".to_string(),
                    ));
                }
                filters.status = Some(parsed);
                continue;
            }
            if key.eq_ignore_ascii_case("rule") && !value.is_empty() {
                filters.rule = Some(value.to_ascii_uppercase());
                continue;
            }
        }

        return Err(AppError::usage(format!(
            "invalid --filter value: {} (allowed: status=<VALID|INVALID|ERROR|UNKNOWN>, rule=<RULE>, has_warning, has_error)",
            raw
        )));
    }

    Ok(filters)
}

fn read_rows_from_path(path: &Path) -> Result<Vec<ReportRow>, AppError> {
    let file = File::open(path).map_err(|err| {
        AppError::dependency(format!(
            "failed to open report input {}: {}",
            path.display(),
            err
        ))
    })?;

    let mut reader = BufReader::new(file);
    read_rows_from_reader(&mut reader)
}

fn read_rows_from_reader<R: BufRead>(reader: &mut R) -> Result<Vec<ReportRow>, AppError> {
    let mut rows = Vec::new();
    let mut line = String::new();
    let mut line_no = 0usize;
    let mut saw_first_non_empty_line = false;

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|err| AppError::dependency(format!("failed to read report input: {}", err)))?;
        if read == 0 {
            break;
        }

        line_no = line_no.saturating_add(1);
        trim_line_ending(&mut line);

        if line.trim().is_empty() {
            continue;
        }

        if !saw_first_non_empty_line {
            strip_utf8_bom(&mut line);
            saw_first_non_empty_line = true;
            if line.trim().is_empty() {
                continue;
            }
        }

        let parsed: Value = serde_json::from_str(&line).map_err(|err| {
            AppError::dependency(format!(
                "failed to parse NDJSON row at line {}: {}",
                line_no, err
            ))
        })?;

        if !parsed.is_object() {
            return Err(AppError::dependency(format!(
                "NDJSON row at line {} must be a JSON object",
                line_no
            )));
        }

        let fallback_row_index = rows.len();
        rows.push(ReportRow::from_value(&parsed, fallback_row_index));
    }

    Ok(rows)
}

impl ReportRow {
    fn from_value(value: &Value, fallback_row_index: usize) -> Self {
        let row_index = value
            .get("row_index")
            .and_then(value_to_usize)
            .unwrap_or(fallback_row_index);
        let compass = value
            .get("compass")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let status = RowStatus::from_row(value.get("status").and_then(Value::as_str));
        let err_code = value
            .get("error")
            .filter(|error| !error.is_null())
            .map(|error| {
                error
                    .get("code")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN")
                    .to_string()
            });

        let data = value.get("data").filter(|data| !data.is_null());
        let failed_rule = data
            .and_then(|data| data.get("failedRule"))
            .and_then(Value::as_str)
            .map(|rule| rule.to_string());
        let warnings = data
            .and_then(|data| data.get("warnings"))
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let sum_deviation = data
            .and_then(|data| data.get("sumDeviation"))
            .and_then(Value::as_f64);

        Self {
            row_index,
            compass,
            status,
            err_code,
            failed_rule,
            warnings,
            sum_deviation,
        }
    }
}

fn value_to_usize(value: &Value) -> Option<usize> {
    let as_u64 = value.as_u64()?;
    usize::try_from(as_u64).ok()
}

fn filtered_rows<'a>(rows: &'a [ReportRow], filters: &ReportFilters) -> Vec<&'a ReportRow> {
    rows.iter()
        .filter(|row| row_matches_filters(row, filters))
        .collect()
}

fn row_matches_filters(row: &ReportRow, filters: &ReportFilters) -> bool {
    if let Some(status) = filters.status {
        if row.status != status {
            return false;
        }
    }

    if let Some(rule) = &filters.rule {
        if row.failed_rule.as_deref() != Some(rule.as_str()) {
            return false;
        }
    }

    if filters.has_warning && row.warnings == 0 {
        return false;
    }

    if filters.has_error && row.err_code.is_none() {
        return false;
    }

    if let Some(find) = &filters.find {
        if !row.compass.contains(find.as_str()) {
            return false;
        }
    }

    true
}

fn summarize_rows(input_path: &str, rows: &[&ReportRow], top: usize) -> ReportSummary {
    let mut rows_ok = 0usize;
    let mut rows_err = 0usize;
    let mut rows_with_warnings = 0usize;
    let mut counts_by_status = StatusCounts::default();
    let mut counts_by_rule: BTreeMap<String, usize> = BTreeMap::new();

    for row in rows {
        if row.err_code.is_some() {
            rows_err = rows_err.saturating_add(1);
        } else {
            rows_ok = rows_ok.saturating_add(1);
        }

        if row.warnings > 0 {
            rows_with_warnings = rows_with_warnings.saturating_add(1);
        }

        if let Some(rule) = &row.failed_rule {
            let count = counts_by_rule.entry(rule.clone()).or_default();
            *count = count.saturating_add(1);
        }

        let count = match row.status {
            RowStatus::Valid => &mut counts_by_status.valid,
            RowStatus::Invalid => &mut counts_by_status.invalid,
            RowStatus::Error => &mut counts_by_status.error,
            RowStatus::Unknown => &mut counts_by_status.unknown,
        };
        *count = count.saturating_add(1);
    }

    ReportSummary {
        input_path: input_path.to_string(),
        rows_total: rows.len(),
        rows_ok,
        rows_err,
        counts_by_status,
        counts_by_rule,
        rows_with_warnings,
        worst_k: worst_k(rows, top),
    }
}

fn worst_k(rows: &[&ReportRow], top: usize) -> Vec<ReportWorstRow> {
    let mut items: Vec<ReportWorstRow> = rows
        .iter()
        .filter_map(|row| {
            let deviation = row.sum_deviation?;
            Some(ReportWorstRow {
                row_index: row.row_index,
                compass: row.compass.clone(),
                status: row.status.as_str().to_string(),
                sum_deviation: deviation,
                failed_rule: row.failed_rule.clone(),
            })
        })
        .collect();

    items.sort_by(|left, right| {
        right
            .sum_deviation
            .total_cmp(&left.sum_deviation)
            .then_with(|| left.row_index.cmp(&right.row_index))
    });

    items.truncate(top);
    items
}

fn print_summary(summary: &ReportSummary) {
    println!(
        "report summary: input={} total={} ok={} err={} warnings={}",
        summary.input_path,
        summary.rows_total,
        summary.rows_ok,
        summary.rows_err,
        summary.rows_with_warnings
    );
    println!(
        "status counts: VALID={} INVALID={} ERROR={} UNKNOWN={}",
        summary.counts_by_status.valid,
        summary.counts_by_status.invalid,
        summary.counts_by_status.error,
        summary.counts_by_status.unknown
    );
    if !summary.counts_by_rule.is_empty() {
        let rules: Vec<String> = summary
            .counts_by_rule
            .iter()
            .map(|(rule, count)| format!("{}={}", rule, count))
            .collect();
        println!("failed rules: {}", rules.join(" "));
    }

    if summary.worst_k.is_empty() {
        println!("worst_k: none");
        return;
    }

    println!(
        "worst_k (top {} by sum deviation among filtered rows):",
        summary.worst_k.len()
    );
    for row in &summary.worst_k {
        match &row.failed_rule {
            Some(rule) => println!(
                "row={} compass={} deviation={:.2} status={} rule={}",
                row.row_index, row.compass, row.sum_deviation, row.status, rule
            ),
            None => println!(
                "row={} compass={} deviation={:.2} status={}",
                row.row_index, row.compass, row.sum_deviation, row.status
            ),
        }
    }
}

fn trim_line_ending(line: &mut String) {
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
}

fn strip_utf8_bom(line: &mut String) {
    if let Some(stripped) = line.strip_prefix('\u{feff}') {
        *line = stripped.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::{
        filtered_rows, parse_filters, read_rows_from_reader, summarize_rows, ReportRow, RowStatus,
    };
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn ndjson_reader_strips_bom_on_first_non_empty_and_skips_blank_lines() {
        let text = concat!(
            "\n",
            "   \n",
            "\u{feff}{\"row_index\":0,\"compass\":\"1\",\"status\":\"VALID\",\"error\":null,\"data\":{\"sumDeviation\":1.5,\"warnings\":[]}}\n",
            "\r\n",
            "{\"row_index\":1,\"compass\":\"2(1)\",\"status\":\"ERROR\",\"error\":{\"code\":\"READINGS_EMPTY\"},\"data\":null}\n"
        );

        let mut cursor = Cursor::new(text.as_bytes());
        let rows = read_rows_from_reader(&mut cursor).expect("rows should parse");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_index, 0);
        assert_eq!(rows[0].sum_deviation, Some(1.5));
        assert_eq!(rows[1].compass, "2(1)");
        assert_eq!(rows[1].status, RowStatus::Error);
        assert_eq!(rows[1].err_code.as_deref(), Some("READINGS_EMPTY"));
    }

    #[test]
    fn non_object_rows_are_rejected() {
        let mut cursor = Cursor::new("[1,2]\n".as_bytes());
        let err = read_rows_from_reader(&mut cursor).unwrap_err();
        assert!(err.message.contains("must be a JSON object"));
    }

    #[test]
    fn worst_k_uses_deviation_desc_then_row_index_asc() {
        let rows = [
            row(3, "INVALID", Some("CLOSURE"), Some(24.0), 0),
            row(1, "INVALID", Some("CLOSURE"), Some(24.0), 0),
            row(2, "VALID", None, Some(3.5), 1),
            row(0, "INVALID", Some("TURN_COUNT"), None, 0),
            row(4, "VALID", None, Some(30.0), 0),
        ];

        let refs: Vec<&ReportRow> = rows.iter().collect();
        let summary = summarize_rows("fixture.ndjson", &refs, 3);
        let worst = summary.worst_k;

        assert_eq!(worst.len(), 3);
        assert_eq!(worst[0].row_index, 4);
        assert_eq!(worst[1].row_index, 1);
        assert_eq!(worst[2].row_index, 3);
        assert_eq!(worst[2].failed_rule.as_deref(), Some("CLOSURE"));

        assert_eq!(summary.counts_by_status.valid, 2);
        assert_eq!(summary.counts_by_status.invalid, 3);
        assert_eq!(summary.counts_by_rule.get("CLOSURE"), Some(&2));
        assert_eq!(summary.counts_by_rule.get("TURN_COUNT"), Some(&1));
        assert_eq!(summary.rows_with_warnings, 1);
    }

    #[test]
    fn filters_select_rows() {
        let rows = [
            row(0, "VALID", None, Some(1.0), 2),
            row(1, "INVALID", Some("CLOSURE"), Some(30.0), 0),
            row(2, "INVALID", Some("ROTATIONAL_SENSE"), None, 0),
        ];

        let filters = parse_filters(&["status=invalid".to_string()], None).unwrap();
        assert_eq!(filtered_rows(&rows, &filters).len(), 2);

        let filters = parse_filters(&["rule=rotational_sense".to_string()], None).unwrap();
        let selected = filtered_rows(&rows, &filters);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].row_index, 2);

        let filters = parse_filters(&["has_warning".to_string()], Some("0".to_string())).unwrap();
        assert_eq!(filtered_rows(&rows, &filters).len(), 1);

        assert!(parse_filters(&["status=lucid".to_string()], None).is_err());
        assert!(parse_filters(&["colour=red".to_string()], None).is_err());
        assert!(parse_filters(
            &["status=valid".to_string(), "status=error".to_string()],
            None
        )
        .is_err());
    }

    fn row(
        row_index: usize,
        status: &str,
        failed_rule: Option<&str>,
        sum_deviation: Option<f64>,
        warnings: usize,
    ) -> ReportRow {
        let warning_list: Vec<String> = (0..warnings)
            .map(|index| format!("chain continuity: gap {index}"))
            .collect();
        let value = json!({
            "row_index": row_index,
            "compass": row_index.to_string(),
            "status": status,
            "error": null,
            "data": {
                "failedRule": failed_rule,
                "sumDeviation": sum_deviation,
                "warnings": warning_list,
            }
        });
        ReportRow::from_value(&value, row_index)
    }
}
