// 💰 Price Parser - free-text price → Decimal + currency
//
// Scraped prices arrive as display text: "29,99 zł", "1 299,00 zł", "$45.99",
// "1.299,99". The parser normalises separators, keeps digits and one decimal
// point, and labels the currency from a marker in the text.

use crate::error::ParseError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_LOCAL_MARKER: &str = "zł";
pub const DEFAULT_FALLBACK_CURRENCY: &str = "$";

/// Parsed price pair for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedPrice {
    pub retail: Decimal,
    pub promotional: Decimal,
    pub currency: String,
}

/// Currency labelling rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurrencyRules {
    /// Marker that identifies the local currency, also used as its label
    pub local_marker: String,

    /// Label used when the marker is absent
    pub fallback: String,
}

impl Default for CurrencyRules {
    fn default() -> Self {
        CurrencyRules {
            local_marker: DEFAULT_LOCAL_MARKER.to_string(),
            fallback: DEFAULT_FALLBACK_CURRENCY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PriceParser {
    rules: CurrencyRules,
}

impl PriceParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: CurrencyRules) -> Self {
        PriceParser { rules }
    }

    /// Parse the retail/promotional pair of a scraped record
    ///
    /// - empty promotional → promotional = retail
    /// - empty retail → retail = promotional
    /// - both empty → `ParseError::MissingPrice`
    pub fn parse(
        &self,
        raw_retail: &str,
        raw_promotional: &str,
    ) -> Result<ParsedPrice, ParseError> {
        let retail_text = raw_retail.trim();
        let promo_text = raw_promotional.trim();

        let (retail, promotional) = match (retail_text.is_empty(), promo_text.is_empty()) {
            (true, true) => return Err(ParseError::MissingPrice),
            (false, true) => {
                let retail = parse_amount(retail_text)?;
                (retail, retail)
            }
            (true, false) => {
                let promotional = parse_amount(promo_text)?;
                (promotional, promotional)
            }
            (false, false) => (parse_amount(retail_text)?, parse_amount(promo_text)?),
        };

        // Retail text carries the label; promotional only when retail is missing
        let labelled = if retail_text.is_empty() { promo_text } else { retail_text };

        Ok(ParsedPrice {
            retail,
            promotional,
            currency: self.detect_currency(labelled),
        })
    }

    pub fn detect_currency(&self, raw: &str) -> String {
        if !self.rules.local_marker.is_empty() && raw.contains(&self.rules.local_marker) {
            self.rules.local_marker.clone()
        } else {
            self.rules.fallback.clone()
        }
    }
}

/// Parse a single display price into a Decimal
pub fn parse_amount(raw: &str) -> Result<Decimal, ParseError> {
    let cleaned = clean_price_text(raw);

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return Err(ParseError::NoDigits(raw.to_string()));
    }

    Decimal::from_str(&cleaned).map_err(|_| ParseError::InvalidNumber {
        raw: raw.to_string(),
        cleaned,
    })
}

/// Reduce price text to `digits[.digits]`
///
/// A '.' or ',' counts as a separator only when a digit follows it and it
/// sits between digits or ahead of the first one; punctuation in the
/// surrounding text ("zł.", "szt.", "(ok.)") is dropped.
///
/// Separator rules:
/// - both '.' and ',' present → the right-most one is the decimal point
/// - one kind repeated → thousands separator
/// - one kind once → decimal point
fn clean_price_text(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut kept = String::with_capacity(chars.len());
    let mut seen_digit = false;

    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_digit() {
            seen_digit = true;
            kept.push(c);
        } else if c == '.' || c == ',' {
            let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            let prev_is_digit = i > 0 && chars[i - 1].is_ascii_digit();
            if next_is_digit && (prev_is_digit || !seen_digit) {
                kept.push(c);
            }
        }
    }

    let dots = kept.matches('.').count();
    let commas = kept.matches(',').count();

    let decimal_separator = match (dots, commas) {
        (0, 0) => None,
        (_, 0) if dots == 1 => Some('.'),
        (0, _) if commas == 1 => Some(','),
        (d, c) if d > 0 && c > 0 => {
            let last_dot = kept.rfind('.');
            let last_comma = kept.rfind(',');
            if last_comma > last_dot {
                Some(',')
            } else {
                Some('.')
            }
        }
        _ => None,
    };

    let mut out = String::with_capacity(kept.len());
    let last_separator = decimal_separator.and_then(|sep| kept.rfind(sep));

    for (idx, c) in kept.char_indices() {
        if c.is_ascii_digit() {
            out.push(c);
        } else if Some(idx) == last_separator {
            out.push('.');
        }
    }

    // ".99" → "0.99"
    if out.starts_with('.') {
        out.insert(0, '0');
    }

    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_comma_decimal_separator_with_local_currency() {
        let parser = PriceParser::new();
        let price = parser.parse("29,99 zł", "").unwrap();

        assert_eq!(price.retail, dec("29.99"));
        assert_eq!(price.promotional, dec("29.99"));
        assert_eq!(price.currency, "zł");
    }

    #[test]
    fn test_empty_promotional_equals_retail() {
        let parser = PriceParser::new();
        let price = parser.parse("54,99 zł", "").unwrap();
        assert_eq!(price.promotional, price.retail);
    }

    #[test]
    fn test_empty_retail_falls_back_to_promotional() {
        let parser = PriceParser::new();
        let price = parser.parse("", "19,90 zł").unwrap();

        assert_eq!(price.retail, dec("19.90"));
        assert_eq!(price.promotional, dec("19.90"));
        assert_eq!(price.currency, "zł");
    }

    #[test]
    fn test_both_prices_empty_is_an_error() {
        let parser = PriceParser::new();
        assert_eq!(parser.parse("", "  "), Err(ParseError::MissingPrice));
    }

    #[test]
    fn test_fallback_currency() {
        let parser = PriceParser::new();
        let price = parser.parse("$45.99", "$39.99").unwrap();

        assert_eq!(price.retail, dec("45.99"));
        assert_eq!(price.promotional, dec("39.99"));
        assert_eq!(price.currency, "$");
    }

    #[test]
    fn test_promotional_above_retail_is_accepted() {
        let parser = PriceParser::new();
        let price = parser.parse("10,00 zł", "12,00 zł").unwrap();
        assert!(price.promotional > price.retail);
    }

    #[test]
    fn test_thousands_separators() {
        assert_eq!(parse_amount("1 299,99 zł").unwrap(), dec("1299.99"));
        assert_eq!(parse_amount("1\u{a0}299,99 zł").unwrap(), dec("1299.99"));
        assert_eq!(parse_amount("1.299,99").unwrap(), dec("1299.99"));
        assert_eq!(parse_amount("1,299.99").unwrap(), dec("1299.99"));
        assert_eq!(parse_amount("1,299,000").unwrap(), dec("1299000"));
    }

    #[test]
    fn test_edge_separators() {
        assert_eq!(parse_amount("29. zł").unwrap(), dec("29"));
        assert_eq!(parse_amount(",99").unwrap(), dec("0.99"));
    }

    #[test]
    fn test_trailing_punctuation_is_not_a_separator() {
        let parser = PriceParser::new();

        let price = parser.parse("29,99 zł.", "").unwrap();
        assert_eq!(price.retail, dec("29.99"));
        assert_eq!(price.currency, "zł");

        assert_eq!(parse_amount("Cena: 29,99 zł/szt.").unwrap(), dec("29.99"));
        assert_eq!(parse_amount("54,99 zł (ok.)").unwrap(), dec("54.99"));
        assert_eq!(parse_amount("ok. 1.299,99 zł.").unwrap(), dec("1299.99"));
    }

    #[test]
    fn test_no_digits_is_an_error() {
        assert_eq!(
            parse_amount("brak"),
            Err(ParseError::NoDigits("brak".to_string()))
        );

        let parser = PriceParser::new();
        assert!(matches!(
            parser.parse("zł", ""),
            Err(ParseError::NoDigits(_))
        ));
    }

    #[test]
    fn test_custom_currency_rules() {
        let parser = PriceParser::with_rules(CurrencyRules {
            local_marker: "€".to_string(),
            fallback: "PLN".to_string(),
        });

        assert_eq!(parser.parse("12,50 €", "").unwrap().currency, "€");
        assert_eq!(parser.parse("12,50 zł", "").unwrap().currency, "PLN");
    }
}
