use std::fmt;

/// Amounts are integer minor units (cents) so balances never drift.
/// `12.50` is stored as `1250`.
pub type Cents = i64;

/// Render minor units as a decimal string: `-1234` -> `"-12.34"`.
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a user-entered amount into minor units.
///
/// Accepts `"50"`, `"50.5"`, `"50.05"` and the comma form `"50,05"` that
/// till operators commonly type. Digits past the second decimal place are
/// truncated.
pub fn parse_cents(input: &str) -> Result<Cents, ParseCentsError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseCentsError::Empty);
    }

    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let body = body.replace(',', ".");

    let (whole, fraction) = match body.split_once('.') {
        Some((w, f)) => (w, f),
        None => (body.as_str(), ""),
    };
    if fraction.contains('.') {
        return Err(ParseCentsError::InvalidFormat);
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseCentsError::InvalidFormat);
    }
    if whole.is_empty() && fraction.is_empty() {
        return Err(ParseCentsError::InvalidFormat);
    }

    let units: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| ParseCentsError::Overflow)?
    };
    let minor: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().map_err(|_| ParseCentsError::InvalidFormat)? * 10,
        _ => fraction[..2]
            .parse()
            .map_err(|_| ParseCentsError::InvalidFormat)?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(minor))
        .ok_or(ParseCentsError::Overflow)?;
    Ok(if negative { -cents } else { cents })
}

/// Convert an amount into a secondary currency at the given rate,
/// rounding half away from zero to the nearest minor unit.
pub fn convert_at_rate(amount: Cents, rate: f64) -> Cents {
    (amount as f64 * rate).round() as Cents
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCentsError {
    Empty,
    InvalidFormat,
    Overflow,
}

impl fmt::Display for ParseCentsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCentsError::Empty => write!(f, "amount is empty"),
            ParseCentsError::InvalidFormat => write!(f, "invalid money format"),
            ParseCentsError::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for ParseCentsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cents() {
        assert_eq!(format_cents(7000), "70.00");
        assert_eq!(format_cents(5), "0.05");
        assert_eq!(format_cents(0), "0.00");
        assert_eq!(format_cents(-3000), "-30.00");
        assert!(format_cents(i64::MIN + 1).starts_with('-'));
    }

    #[test]
    fn test_parse_cents_accepts_common_forms() {
        assert_eq!(parse_cents("30"), Ok(3000));
        assert_eq!(parse_cents("30.5"), Ok(3050));
        assert_eq!(parse_cents("30,25"), Ok(3025));
        assert_eq!(parse_cents(" .75 "), Ok(75));
        assert_eq!(parse_cents("-40"), Ok(-4000));
        assert_eq!(parse_cents("9.999"), Ok(999));
    }

    #[test]
    fn test_parse_cents_rejects_garbage() {
        assert_eq!(parse_cents(""), Err(ParseCentsError::Empty));
        assert_eq!(parse_cents("1.2.3"), Err(ParseCentsError::InvalidFormat));
        assert_eq!(parse_cents("12a"), Err(ParseCentsError::InvalidFormat));
        assert_eq!(parse_cents("."), Err(ParseCentsError::InvalidFormat));
        assert_eq!(
            parse_cents("999999999999999999999"),
            Err(ParseCentsError::Overflow)
        );
    }

    #[test]
    fn test_convert_at_rate_rounds() {
        assert_eq!(convert_at_rate(10000, 0.0312), 312);
        assert_eq!(convert_at_rate(-10000, 0.0312), -312);
        assert_eq!(convert_at_rate(155, 0.5), 78);
    }
}
