//! Price text normalization.
//!
//! Every retailer's raw price text goes through [`normalize_price`], and so
//! does the price submitted with a basket add.

use std::str::FromStr;

use rust_decimal::Decimal;

use tea_lovers_core::Price;

/// Convert retailer price text into a [`Price`].
///
/// Rules, first match wins:
/// 1. Text that already is a non-negative decimal passes through (`"3.49"`).
/// 2. Without a `£`, a number directly followed by `p` means minor units
///    (`"36p"` and `"85p/100g"` are `0.36` and `0.85`).
/// 3. Otherwise everything but digits and `.` is dropped (`"£1,299.00"`).
///
/// Anything left unparseable yields [`Price::ZERO`] and a warning.
#[must_use]
pub fn normalize_price(raw: &str) -> Price {
    let text = raw.trim();

    if let Ok(amount) = Decimal::from_str(text)
        && !amount.is_sign_negative()
    {
        return Price::new(amount);
    }

    if let Some(pence) = pence_amount(text) {
        return Price::new(pence / Decimal::ONE_HUNDRED);
    }

    if let Some(amount) = parse_digits(text) {
        return Price::new(amount);
    }

    tracing::warn!(raw_price = raw, "Unparseable price text, recording zero");
    Price::ZERO
}

/// The first number immediately followed by a pence marker, in pence.
fn pence_amount(text: &str) -> Option<Decimal> {
    if text.contains('£') {
        return None;
    }
    let (marker, _) = text.char_indices().find(|&(i, c)| {
        matches!(c, 'p' | 'P') && text[..i].ends_with(|d: char| d.is_ascii_digit())
    })?;
    let number = &text[..marker];
    let start = number
        .char_indices()
        .rev()
        .find(|&(_, c)| !(c.is_ascii_digit() || c == '.'))
        .map_or(0, |(i, c)| i + c.len_utf8());
    Decimal::from_str(&number[start..]).ok()
}

/// Parse the digits and decimal points of `text`, ignoring everything else.
fn parse_digits(text: &str) -> Option<Decimal> {
    let kept: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if kept.is_empty() {
        return None;
    }
    Decimal::from_str(&kept).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pounds_with_symbol() {
        assert_eq!(normalize_price("£3.49"), Price::from_pence(349));
    }

    #[test]
    fn test_pence_suffix() {
        assert_eq!(normalize_price("36p"), Price::from_pence(36));
        assert_eq!(normalize_price(" 85P "), Price::from_pence(85));
    }

    #[test]
    fn test_pence_with_trailing_text() {
        assert_eq!(normalize_price("36p each"), Price::from_pence(36));
        assert_eq!(normalize_price("85p/100g"), Price::from_pence(85));
        assert_eq!(normalize_price("Only 49p"), Price::from_pence(49));
    }

    #[test]
    fn test_pound_sign_wins_over_pence_marker() {
        assert_eq!(normalize_price("£2.50pk"), Price::from_pence(250));
    }

    #[test]
    fn test_unparseable_is_zero() {
        assert_eq!(normalize_price("not-a-price"), Price::ZERO);
        assert_eq!(normalize_price(""), Price::ZERO);
    }

    #[test]
    fn test_thousands_separator() {
        assert_eq!(normalize_price("£1,299.00"), Price::from_pence(129_900));
    }

    #[test]
    fn test_canonical_decimal_passes_through() {
        assert_eq!(normalize_price("3.49"), Price::from_pence(349));
        assert_eq!(normalize_price("2"), Price::from_pence(200));
    }

    #[test]
    fn test_surrounding_text_is_stripped() {
        assert_eq!(normalize_price("Now £2.50 each"), Price::from_pence(250));
    }

    #[test]
    fn test_two_prices_in_one_string_is_zero() {
        assert_eq!(normalize_price("Was £3.00 now £2.50"), Price::ZERO);
    }

    #[test]
    fn test_extra_precision_rounds_to_pence() {
        assert_eq!(normalize_price("1.005"), Price::from_pence(100));
        assert_eq!(normalize_price("1.015"), Price::from_pence(102));
    }

    #[test]
    fn test_negative_text_drops_sign() {
        assert_eq!(normalize_price("-1.50"), Price::from_pence(150));
    }
}
