//! A1 cell references for tag positions.

use crate::ids::IdentityError;

/// Sheet bounds of the xlsx format.
pub const MAX_ROWS: u32 = 1_048_576;
pub const MAX_COLS: u32 = 16_384;

/// Convert zero-based (row, col) indices to an A1 reference such as `B5`.
/// Does not check sheet bounds; see [`tag_position_from_index`].
pub fn index_to_address(row: u32, col: u32) -> String {
    let mut col_index = col;
    let mut col_label = String::new();

    loop {
        let rem = (col_index % 26) as u8;
        col_label.push((b'A' + rem) as char);
        if col_index < 26 {
            break;
        }
        col_index = col_index / 26 - 1;
    }

    col_label.chars().rev().collect::<String>() + &(u64::from(row) + 1).to_string()
}

/// Parse an A1 reference into zero-based (row, col) indices.
/// Returns `None` for malformed references.
pub fn address_to_index(a1: &str) -> Option<(u32, u32)> {
    let mut col: u32 = 0;
    let mut row: u32 = 0;
    let mut saw_letter = false;
    let mut saw_digit = false;

    for ch in a1.chars() {
        if ch.is_ascii_alphabetic() {
            if saw_digit {
                return None;
            }
            saw_letter = true;
            let upper = ch.to_ascii_uppercase() as u8;
            col = col
                .checked_mul(26)?
                .checked_add((upper - b'A' + 1) as u32)?;
        } else if ch.is_ascii_digit() {
            saw_digit = true;
            row = row.checked_mul(10)?.checked_add((ch as u8 - b'0') as u32)?;
        } else {
            return None;
        }
    }

    if !saw_letter || !saw_digit || row == 0 || col == 0 {
        return None;
    }

    Some((row - 1, col - 1))
}

/// Validate a tag position and return it in canonical upper-case form.
pub fn canonical_tag_position(position: &str) -> Result<String, IdentityError> {
    let trimmed = position.trim();
    let (row, col) = address_to_index(trimmed)
        .filter(|&(row, col)| row < MAX_ROWS && col < MAX_COLS)
        .ok_or_else(|| IdentityError::InvalidPosition {
            position: position.to_string(),
        })?;
    Ok(index_to_address(row, col))
}

/// A1 reference for zero-based indices supplied by the extractor, within sheet bounds.
pub fn tag_position_from_index(row: u32, col: u32) -> Result<String, IdentityError> {
    if row >= MAX_ROWS || col >= MAX_COLS {
        return Err(IdentityError::InvalidPosition {
            position: format!("(row {row}, col {col})"),
        });
    }
    Ok(index_to_address(row, col))
}
