use crate::diff::DiffResult;
use crate::validate::ValidationReport;

pub fn serialize_diff_result(result: &DiffResult) -> serde_json::Result<String> {
    serde_json::to_string(result)
}

pub fn serialize_diff_result_pretty(result: &DiffResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(result)
}

pub fn serialize_validation_report(report: &ValidationReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}
