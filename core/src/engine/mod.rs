//! Diff engine for registry snapshots.
//!
//! [`diff_registries`] compares two registries and their artifacts:
//!
//! - `matching`: pairs tables by composite key or by table id
//! - `rows`: keyed or positional row comparison of one table pair
//! - `budget`: the global row-detail budget
//!
//! Tables with equal content hashes are never loaded. Counts are always exact; only the
//! detail listing is bounded.

mod budget;
mod matching;
mod rows;

use crate::canonical::{ParsedTable, parse};
use crate::config::DiffConfig;
use crate::diff::{DiffError, DiffResult, Side, TableDiff, TableRef};
use crate::error_codes;
use crate::progress::{NoProgress, ProgressCallback, ProgressThrottle};
use crate::registry::{Registry, TableMeta};
use crate::store::CsvLoader;
use budget::DetailBudget;
use matching::{Entry, MatchedPair, pair_tables};
use tracing::{debug, info, warn};

/// Compare two snapshots.
///
/// Fails fast, before loading any artifact, when either registry breaks referential
/// integrity. A missing artifact aborts the diff; an unparsable one only marks its table
/// (and the result) incomplete.
pub fn diff_registries(
    old: &Registry,
    new: &Registry,
    old_loader: &dyn CsvLoader,
    new_loader: &dyn CsvLoader,
    config: &DiffConfig,
) -> Result<DiffResult, DiffError> {
    diff_registries_with_progress(old, new, old_loader, new_loader, config, &NoProgress)
}

pub fn diff_registries_with_progress(
    old: &Registry,
    new: &Registry,
    old_loader: &dyn CsvLoader,
    new_loader: &dyn CsvLoader,
    config: &DiffConfig,
    progress: &dyn ProgressCallback,
) -> Result<DiffResult, DiffError> {
    config.validate()?;
    old.check_integrity()
        .map_err(|source| DiffError::CorruptRegistry { side: Side::Old, source })?;
    new.check_integrity()
        .map_err(|source| DiffError::CorruptRegistry { side: Side::New, source })?;

    let mut throttle = ProgressThrottle::new(Some(progress));
    let mut result = DiffResult::empty();
    let pairing = pair_tables(old, new, config.table_match, &mut result.warnings);

    let (unchanged, changed): (Vec<_>, Vec<_>) = pairing
        .matched
        .into_iter()
        .partition(|pair| pair.old.1.csv_sha256 == pair.new.1.csv_sha256);
    info!(
        added = pairing.added.len(),
        removed = pairing.removed.len(),
        unchanged = unchanged.len(),
        changed = changed.len(),
        "matched tables"
    );

    let ctx = TableContext {
        old_loader,
        new_loader,
        config,
    };
    let outcomes = diff_all(&changed, &ctx, &mut throttle);

    let mut budget = DetailBudget::new(config.row_detail_budget);
    for outcome in outcomes {
        let TableOutcome {
            mut diff,
            warnings,
        } = outcome?;
        result.warnings.extend(warnings);
        if !diff.complete {
            result.complete = false;
        }
        budget.spend(&mut diff, &mut result.warnings);

        result.summary.rows_added += diff.rows_added;
        result.summary.rows_removed += diff.rows_removed;
        result.summary.rows_modified += diff.rows_modified;
        result.tables_modified.push(diff);
    }

    result.tables_added = pairing
        .added
        .iter()
        .map(|entry| table_ref(new, entry))
        .collect();
    result.tables_removed = pairing
        .removed
        .iter()
        .map(|entry| table_ref(old, entry))
        .collect();

    result.summary.tables_added = result.tables_added.len();
    result.summary.tables_removed = result.tables_removed.len();
    result.summary.tables_modified = result.tables_modified.len();
    result.summary.tables_unchanged = unchanged.len();
    result.summary.old_total_rows = old.total_rows();
    result.summary.new_total_rows = new.total_rows();
    result.truncated = budget.truncated();
    result.details_omitted = budget.omitted();

    info!(
        tables_modified = result.summary.tables_modified,
        rows_added = result.summary.rows_added,
        rows_removed = result.summary.rows_removed,
        rows_modified = result.summary.rows_modified,
        truncated = result.truncated,
        complete = result.complete,
        "diff complete"
    );
    throttle.report("diff", 1.0);
    Ok(result)
}

struct TableContext<'a> {
    old_loader: &'a dyn CsvLoader,
    new_loader: &'a dyn CsvLoader,
    config: &'a DiffConfig,
}

struct TableOutcome {
    diff: TableDiff,
    warnings: Vec<String>,
}

#[cfg(feature = "parallel")]
fn diff_all(
    pairs: &[MatchedPair<'_>],
    ctx: &TableContext<'_>,
    throttle: &mut ProgressThrottle<'_>,
) -> Vec<Result<TableOutcome, DiffError>> {
    use rayon::prelude::*;

    throttle.report("diff", 0.0);
    pairs.par_iter().map(|pair| diff_table(pair, ctx)).collect()
}

#[cfg(not(feature = "parallel"))]
fn diff_all(
    pairs: &[MatchedPair<'_>],
    ctx: &TableContext<'_>,
    throttle: &mut ProgressThrottle<'_>,
) -> Vec<Result<TableOutcome, DiffError>> {
    let mut outcomes = Vec::with_capacity(pairs.len());
    for (idx, pair) in pairs.iter().enumerate() {
        let outcome = diff_table(pair, ctx);
        let failed = outcome.is_err();
        outcomes.push(outcome);
        if failed {
            break;
        }
        throttle.step("diff", idx + 1, pairs.len());
    }
    outcomes
}

fn diff_table(pair: &MatchedPair<'_>, ctx: &TableContext<'_>) -> Result<TableOutcome, DiffError> {
    let (old_key, old_meta) = pair.old;
    let (new_key, new_meta) = pair.new;
    let old_bytes = load(ctx.old_loader, old_key, old_meta, Side::Old)?;
    let new_bytes = load(ctx.new_loader, new_key, new_meta, Side::New)?;

    let mut diff = TableDiff {
        key: pair.match_key.clone(),
        old_key: old_key.to_string(),
        new_key: new_key.to_string(),
        table_id: new_meta.table_id.clone(),
        tag_type: new_meta.tag_type.clone(),
        old_row_count: old_meta.row_count,
        new_row_count: new_meta.row_count,
        old_hash: old_meta.csv_sha256.clone(),
        new_hash: new_meta.csv_sha256.clone(),
        columns_added: Vec::new(),
        columns_removed: Vec::new(),
        positional: false,
        rows_added: 0,
        rows_removed: 0,
        rows_modified: 0,
        changes: Vec::new(),
        details_omitted: 0,
        complete: true,
    };
    let mut warnings = Vec::new();

    let parsed = parse_side(&old_bytes, Side::Old)
        .and_then(|old_table| Ok((old_table, parse_side(&new_bytes, Side::New)?)));
    match parsed {
        Ok((old_table, new_table)) => {
            let rows = rows::diff_rows(
                &pair.match_key,
                &old_table,
                &new_table,
                &old_meta.primary_keys,
                &new_meta.primary_keys,
                ctx.config,
            );
            diff.positional = rows.positional;
            diff.rows_added = rows.rows_added;
            diff.rows_removed = rows.rows_removed;
            diff.rows_modified = rows.rows_modified;
            diff.changes = rows.changes;
            diff.columns_added = rows.columns_added;
            diff.columns_removed = rows.columns_removed;
            warnings.extend(rows.warnings);
            debug!(
                table = %pair.match_key,
                added = diff.rows_added,
                removed = diff.rows_removed,
                modified = diff.rows_modified,
                positional = diff.positional,
                "diffed table"
            );
        }
        Err(detail) => {
            warn!(table = %pair.match_key, %detail, "malformed artifact");
            diff.complete = false;
            warnings.push(format!(
                "[{}] table '{}': {detail}; table left incomplete",
                error_codes::DIFF_MALFORMED_ARTIFACT,
                pair.match_key
            ));
        }
    }

    Ok(TableOutcome { diff, warnings })
}

fn load(
    loader: &dyn CsvLoader,
    key: &str,
    meta: &TableMeta,
    side: Side,
) -> Result<Vec<u8>, DiffError> {
    loader
        .load(key, meta)
        .map_err(|err| DiffError::MissingArtifact {
            key: key.to_string(),
            side,
            detail: err.to_string(),
        })
}

fn parse_side(bytes: &[u8], side: Side) -> Result<ParsedTable, String> {
    parse(bytes).map_err(|err| format!("malformed {side} artifact: {err}"))
}

fn table_ref(registry: &Registry, (key, meta): &Entry<'_>) -> TableRef {
    TableRef {
        key: key.to_string(),
        workbook_id: meta.workbook_id.clone(),
        table_id: meta.table_id.clone(),
        source_path: registry
            .workbooks
            .get(&meta.workbook_id)
            .map(|wb| wb.source_path.clone()),
        sheet_name: meta.sheet_name.clone(),
        tag: meta.tag.clone(),
        row_count: meta.row_count,
    }
}
