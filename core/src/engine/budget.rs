use crate::diff::TableDiff;
use tracing::warn;

/// Global cap on row-change details, spent across tables in match-key order.
pub(super) struct DetailBudget {
    limit: usize,
    remaining: usize,
    omitted: usize,
    warned: bool,
}

impl DetailBudget {
    pub(super) fn new(limit: usize) -> Self {
        Self {
            limit,
            remaining: limit,
            omitted: 0,
            warned: false,
        }
    }

    /// Trim `table.changes` to what is left of the budget. Counts are never touched.
    pub(super) fn spend(&mut self, table: &mut TableDiff, warnings: &mut Vec<String>) {
        if table.changes.len() > self.remaining {
            table.changes.truncate(self.remaining);
        }
        self.remaining -= table.changes.len();

        if table.complete {
            table.details_omitted = table
                .row_change_count()
                .saturating_sub(table.changes.len());
        }
        self.omitted += table.details_omitted;

        if table.details_omitted > 0 && !self.warned {
            self.warned = true;
            warn!(limit = self.limit, table = %table.key, "row detail budget exhausted");
            warnings.push(format!(
                "row detail budget of {} exhausted at table '{}'; counts remain exact",
                self.limit, table.key
            ));
        }
    }

    pub(super) fn truncated(&self) -> bool {
        self.omitted > 0
    }

    pub(super) fn omitted(&self) -> usize {
        self.omitted
    }
}
