//! Small shared helpers: spreadsheet column letters and BRL amount display.

use rust_decimal::Decimal;

/// Convert a 1-based column number to its spreadsheet letters (1 = A, 27 = AA).
///
/// # Examples
/// ```
/// use dre::utils::column_letter;
///
/// assert_eq!(column_letter(4), "D");
/// assert_eq!(column_letter(52), "AZ");
/// ```
pub fn column_letter(column: u16) -> String {
    let mut letters = Vec::new();
    let mut n = u32::from(column.max(1));
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Format as Brazilian Real: "R$ 1.234,56"
///
/// Uses Brazilian locale conventions (`.` thousands, `,` decimals) and rounds
/// to two places.
///
/// # Examples
/// ```
/// use dre::utils::format_currency;
/// use rust_decimal_macros::dec;
///
/// assert_eq!(format_currency(dec!(1234.56)), "R$ 1.234,56");
/// assert_eq!(format_currency(dec!(-500)), "R$ -500,00");
/// ```
pub fn format_currency(value: Decimal) -> String {
    let is_negative = value < Decimal::ZERO;
    let formatted = format!("{:.2}", value.abs().round_dp(2));
    let (integer_part, decimal_part) = formatted
        .split_once('.')
        .unwrap_or((formatted.as_str(), "00"));

    let with_separators: String = integer_part
        .chars()
        .rev()
        .enumerate()
        .flat_map(|(i, c)| {
            if i > 0 && i % 3 == 0 {
                vec!['.', c]
            } else {
                vec![c]
            }
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    let sign = if is_negative { "-" } else { "" };
    format!("R$ {}{},{}", sign, with_separators, decimal_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_column_letter_single_and_double() {
        assert_eq!(column_letter(1), "A");
        assert_eq!(column_letter(5), "E");
        assert_eq!(column_letter(10), "J");
        assert_eq!(column_letter(26), "Z");
        assert_eq!(column_letter(27), "AA");
        assert_eq!(column_letter(52), "AZ");
        assert_eq!(column_letter(104), "CZ");
    }

    #[test]
    fn test_format_currency_basic() {
        assert_eq!(format_currency(dec!(1234.56)), "R$ 1.234,56");
        assert_eq!(format_currency(dec!(0.99)), "R$ 0,99");
        assert_eq!(format_currency(dec!(1000000)), "R$ 1.000.000,00");
    }

    #[test]
    fn test_format_currency_negative() {
        assert_eq!(format_currency(dec!(-1234.56)), "R$ -1.234,56");
        assert_eq!(format_currency(dec!(-0.01)), "R$ -0,01");
    }

    #[test]
    fn test_format_currency_rounds_repeating_amounts() {
        // 1000 / 36 months
        assert_eq!(format_currency(dec!(1000) / dec!(36)), "R$ 27,78");
    }
}
