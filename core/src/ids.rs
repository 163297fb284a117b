//! Stable identifiers for workbooks and tables.
//!
//! A table is addressed by its composite key `{workbook_id}/{table_id}`:
//! - `workbook_id` is a short digest of the normalized source path, so it only changes when
//!   the workbook file is renamed or moved.
//! - `table_id` is derived from the tag keyword and logical name alone, so it survives sheet
//!   renames, cell moves, and moves between workbooks.
//!
//! Everything here is pure. Collision detection belongs to the index builder.

use crate::error_codes;
use crate::hashing::digest_prefix_hex;
use thiserror::Error;

pub type WorkbookId = String;
pub type TableId = String;

/// Number of hex characters kept from the path digest.
pub const WORKBOOK_ID_LEN: usize = 8;

const LOGICAL_NAME_SEPARATOR: &str = "__";

/// Malformed identifier input. Fatal to the table it came from, never to a whole build.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error(
        "[SHADOW_ID_001] invalid tag type '{tag_type}': expected one or more of [a-z0-9_]. Suggestion: pass the keyword through `parse_tag` first."
    )]
    InvalidTagType { tag_type: String },

    #[error("[SHADOW_ID_002] invalid source path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("[SHADOW_ID_003] invalid tag '{tag}': {reason}")]
    InvalidTag { tag: String, reason: &'static str },

    #[error("[SHADOW_ID_004] invalid tag position '{position}': expected an A1 cell reference")]
    InvalidPosition { position: String },
}

impl IdentityError {
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::InvalidTagType { .. } => error_codes::ID_INVALID_TAG_TYPE,
            IdentityError::InvalidPath { .. } => error_codes::ID_INVALID_PATH,
            IdentityError::InvalidTag { .. } => error_codes::ID_INVALID_TAG,
            IdentityError::InvalidPosition { .. } => error_codes::ID_INVALID_POSITION,
        }
    }
}

/// A tag split into its normalized keyword and optional logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTag {
    pub tag_type: String,
    pub logical_name: Option<String>,
}

/// Normalize a workbook path: unify separators to `/`, collapse repeats, strip leading `./`,
/// lower-case. Idempotent.
pub fn normalize_source_path(path: &str) -> Result<String, IdentityError> {
    let unified = path.trim().replace('\\', "/");

    let mut collapsed = String::with_capacity(unified.len());
    let mut prev_slash = false;
    for ch in unified.chars() {
        let is_slash = ch == '/';
        if is_slash && prev_slash {
            continue;
        }
        prev_slash = is_slash;
        collapsed.push(ch);
    }

    let mut rest = collapsed.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }

    let normalized = rest.to_lowercase();
    if normalized.is_empty() || normalized == "." || normalized == "/" {
        return Err(IdentityError::InvalidPath {
            path: path.to_string(),
            reason: "path is empty after normalization",
        });
    }
    Ok(normalized)
}

/// Derive the workbook id from a source path. The path is normalized first, so callers may
/// pass either the raw or the already-normalized form.
pub fn assign_workbook_id(path: &str) -> Result<WorkbookId, IdentityError> {
    let normalized = normalize_source_path(path)?;
    Ok(digest_prefix_hex(normalized.as_bytes(), WORKBOOK_ID_LEN))
}

/// Derive the table id from a tag keyword and optional logical name.
pub fn assign_table_id(
    tag_type: &str,
    logical_name: Option<&str>,
) -> Result<TableId, IdentityError> {
    if !is_valid_tag_type(tag_type) {
        return Err(IdentityError::InvalidTagType {
            tag_type: tag_type.to_string(),
        });
    }

    let logical = logical_name.map(normalize_logical_name).unwrap_or_default();
    if logical.is_empty() {
        Ok(tag_type.to_string())
    } else {
        Ok(format!("{tag_type}{LOGICAL_NAME_SEPARATOR}{logical}"))
    }
}

pub fn is_valid_tag_type(tag_type: &str) -> bool {
    !tag_type.is_empty()
        && tag_type
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Lower-case, collapse whitespace runs into `_`, and replace anything outside `[a-z0-9_]`.
pub fn normalize_logical_name(name: &str) -> String {
    let joined = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase();
    joined.chars().map(id_char).collect()
}

/// Split tag text such as `~FI_T: BaseParameters` into `fi_t` and `BaseParameters`.
pub fn parse_tag(tag: &str) -> Result<ParsedTag, IdentityError> {
    let body = tag.trim().trim_start_matches('~').trim();

    let (keyword, logical) = match body.split_once(':') {
        Some((keyword, logical)) => (keyword, Some(logical.trim())),
        None => (body, None),
    };

    let tag_type: String = keyword.trim().to_lowercase().chars().map(id_char).collect();
    if tag_type.is_empty() {
        return Err(IdentityError::InvalidTag {
            tag: tag.to_string(),
            reason: "missing tag keyword",
        });
    }

    Ok(ParsedTag {
        tag_type,
        logical_name: logical.filter(|l| !l.is_empty()).map(str::to_string),
    })
}

pub fn composite_key(workbook_id: &str, table_id: &str) -> String {
    format!("{workbook_id}/{table_id}")
}

/// Inverse of [`composite_key`]. Neither half may be empty.
pub fn split_composite_key(key: &str) -> Option<(&str, &str)> {
    let (workbook_id, table_id) = key.split_once('/')?;
    if workbook_id.is_empty() || table_id.is_empty() {
        return None;
    }
    Some((workbook_id, table_id))
}

fn id_char(ch: char) -> char {
    if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
        ch
    } else {
        '_'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_normalization_unifies_case_and_separators() {
        let variants = [
            "VT_BaseYear.xlsx",
            "./VT_BaseYear.xlsx",
            "vt_baseyear.XLSX",
            "  ./vt_baseyear.xlsx ",
        ];
        for v in variants {
            assert_eq!(normalize_source_path(v).unwrap(), "vt_baseyear.xlsx", "{v}");
        }

        assert_eq!(
            normalize_source_path(r".\SuppXLS\\Scen_Demand.xlsx").unwrap(),
            "suppxls/scen_demand.xlsx"
        );
        assert_eq!(
            normalize_source_path(".//SubRES_Tmpl/SubRES_New.xlsx").unwrap(),
            "subres_tmpl/subres_new.xlsx"
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_source_path(r".\SuppXLS\Trades\ScenTrade.xlsx").unwrap();
        assert_eq!(normalize_source_path(&once).unwrap(), once);
    }

    #[test]
    fn empty_paths_rejected() {
        for p in ["", "   ", "./", "."] {
            let err = normalize_source_path(p).expect_err("empty path should fail");
            assert_eq!(err.code(), error_codes::ID_INVALID_PATH);
        }
    }

    #[test]
    fn workbook_id_is_fixed_width_hex_and_stable() {
        let a = assign_workbook_id("VT_BaseYear.xlsx").unwrap();
        let b = assign_workbook_id("./vt_baseyear.xlsx").unwrap();
        assert_eq!(a.len(), WORKBOOK_ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(a, b);
    }

    #[test]
    fn renaming_workbook_changes_only_workbook_id() {
        let old_wb = assign_workbook_id("VT_BaseYear.xlsx").unwrap();
        let new_wb = assign_workbook_id("VT_BaseYear_2025.xlsx").unwrap();
        assert_ne!(old_wb, new_wb);

        let tag = parse_tag("~FI_T: BaseParameters").unwrap();
        let before = assign_table_id(&tag.tag_type, tag.logical_name.as_deref()).unwrap();
        let after = assign_table_id(&tag.tag_type, tag.logical_name.as_deref()).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn table_id_with_and_without_logical_name() {
        assert_eq!(assign_table_id("fi_process", None).unwrap(), "fi_process");
        assert_eq!(assign_table_id("fi_process", Some("  ")).unwrap(), "fi_process");
        assert_eq!(
            assign_table_id("fi_t", Some("BaseParameters")).unwrap(),
            "fi_t__baseparameters"
        );
        assert_eq!(
            assign_table_id("uc_t", Some("Max  Share-2030")).unwrap(),
            "uc_t__max_share_2030"
        );
    }

    #[test]
    fn malformed_tag_type_is_invalid_identifier() {
        for bad in ["", "FI_T", "fi-t", "fi t", "~fi_t"] {
            let err = assign_table_id(bad, None).expect_err("should reject");
            assert!(matches!(err, IdentityError::InvalidTagType { .. }), "{bad}");
        }
    }

    #[test]
    fn parse_tag_examples() {
        let t = parse_tag("~FI_T: BaseParameters").unwrap();
        assert_eq!(t.tag_type, "fi_t");
        assert_eq!(t.logical_name.as_deref(), Some("BaseParameters"));

        let t = parse_tag("~FI_Process").unwrap();
        assert_eq!(t.tag_type, "fi_process");
        assert_eq!(t.logical_name, None);

        let t = parse_tag("~TFM_INS-TS:").unwrap();
        assert_eq!(t.tag_type, "tfm_ins_ts");
        assert_eq!(t.logical_name, None);

        let t = parse_tag("~UC_T: growth: limits").unwrap();
        assert_eq!(t.logical_name.as_deref(), Some("growth: limits"));

        assert!(parse_tag("~").is_err());
        assert!(parse_tag(": name").is_err());
    }

    #[test]
    fn composite_keys_round_trip() {
        let key = composite_key("abc12345", "fi_process");
        assert_eq!(key, "abc12345/fi_process");
        assert_eq!(split_composite_key(&key), Some(("abc12345", "fi_process")));
        assert_eq!(split_composite_key("abc12345"), None);
        assert_eq!(split_composite_key("/fi_t"), None);
    }
}
