//! Input validation utilities.
//!
//! Every check here runs before any remote call, so a failure never leaves a side
//! effect on the ledger or the content store.

use crate::{ClientError, ClientResult};
use chrono::NaiveDate;
use medrec_types::Address;

/// Format of a date of birth as entered by a patient.
pub const DATE_OF_BIRTH_FORMAT: &str = "%Y-%m-%d";

/// Returns the trimmed value of a required field.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` with `message` if `value` is empty or whitespace.
pub fn require<'a>(value: &'a str, message: &str) -> ClientResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ClientError::invalid_input(message));
    }
    Ok(trimmed)
}

/// Converts a `YYYY-MM-DD` date of birth into unix seconds at UTC midnight.
///
/// Dates before 1970 yield negative values.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` if `value` is not a valid calendar date in that
/// format.
pub fn parse_date_of_birth(value: &str) -> ClientResult<i64> {
    let date = NaiveDate::parse_from_str(value.trim(), DATE_OF_BIRTH_FORMAT).map_err(|_| {
        ClientError::invalid_input(format!(
            "Date of birth must be YYYY-MM-DD, got '{}'",
            value.trim()
        ))
    })?;

    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .ok_or_else(|| ClientError::invalid_input("Date of birth out of range"))
}

/// Parses an identity entered as text.
///
/// # Errors
///
/// Returns `ClientError::InvalidInput` if `value` is blank (using `missing`) or is not a
/// valid address.
pub fn parse_identity(value: &str, missing: &str) -> ClientResult<Address> {
    let value = require(value, missing)?;
    Address::parse(value).map_err(|e| ClientError::invalid_input(format!("Invalid address: {}", e)))
}
