//! Format checks applied to identify requests before they reach the resolver.

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::{ContactGraphError, Result};
use crate::types::IdentifyRequest;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// Optional leading `+`, no leading zero, at most 16 digits.
const PHONE_PATTERN: &str = r"^[+]?[1-9][0-9]{0,15}$";

static EMAIL_RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
static PHONE_RE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

fn compiled(
    cell: &'static OnceLock<std::result::Result<Regex, regex::Error>>,
    pattern: &str,
) -> Result<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern))
        .as_ref()
        .map_err(|e| ContactGraphError::Config {
            message: format!("invalid validation pattern '{pattern}': {e}"),
        })
}

/// Returns `true` if `email` looks like `local@domain.tld`.
pub fn is_valid_email(email: &str) -> Result<bool> {
    Ok(compiled(&EMAIL_RE, EMAIL_PATTERN)?.is_match(email))
}

/// Returns `true` if `phone_number` is a plausible phone number once
/// spaces, dashes and parentheses are stripped.
pub fn is_valid_phone_number(phone_number: &str) -> Result<bool> {
    let digits: String = phone_number
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')'))
        .collect();
    Ok(compiled(&PHONE_RE, PHONE_PATTERN)?.is_match(&digits))
}

/// Rejects requests that carry no identifier or a malformed one.
///
/// Values are checked, never rewritten: the resolver stores exactly what
/// the caller sent.
pub fn validate_identify_request(request: &IdentifyRequest) -> Result<()> {
    let email = request.email();
    let phone_number = request.phone_number();

    if email.is_none() && phone_number.is_none() {
        return Err(ContactGraphError::validation(
            "At least one of email or phoneNumber must be provided",
        ));
    }

    if let Some(email) = email {
        if !is_valid_email(email)? {
            return Err(ContactGraphError::validation("Invalid email format"));
        }
    }

    if let Some(phone_number) = phone_number {
        if !is_valid_phone_number(phone_number)? {
            return Err(ContactGraphError::validation("Invalid phone number format"));
        }
    }

    Ok(())
}
