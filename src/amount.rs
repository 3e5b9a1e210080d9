use crate::parser::{inner_str, parse_first, Rule};

/// Posting amount text split into the quantity, an optional `@`/`@@` price
/// and an optional `=`/`==` balance assertion.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AmountParts<'a> {
    pub quantity: &'a str,
    pub price: Option<&'a str>,
    pub assertion: Option<&'a str>,
}

impl<'a> AmountParts<'a> {
    pub fn split(text: &'a str) -> AmountParts<'a> {
        let mut price_at = None;
        let mut assert_at = None;
        let mut quoted = false;

        for (idx, ch) in text.char_indices() {
            match ch {
                '"' => quoted = !quoted,
                '@' if !quoted && price_at.is_none() && assert_at.is_none() => price_at = Some(idx),
                '=' if !quoted && assert_at.is_none() => assert_at = Some(idx),
                _ => {}
            }
        }

        let quantity_end = price_at.or(assert_at).unwrap_or(text.len());
        let price = price_at.map(|start| &text[start..assert_at.unwrap_or(text.len())]);
        let assertion = assert_at.map(|start| &text[start..]);

        AmountParts {
            quantity: strip_cost(text[..quantity_end].trim()),
            price: price.map(|p| p.trim_start_matches('@').trim()).filter(|p| !p.is_empty()),
            assertion: assertion
                .map(|a| a.trim_start_matches(|c| c == '=' || c == '*').trim())
                .filter(|a| !a.is_empty()),
        }
    }

    /// Every commodity mentioned by the quantity, the price and the assertion.
    pub fn commodities(&self) -> Vec<&'a str> {
        [Some(self.quantity), self.price, self.assertion]
            .into_iter()
            .flatten()
            .filter_map(commodity_of)
            .collect()
    }
}

fn strip_cost(quantity: &str) -> &str {
    match quantity.find('{') {
        Some(idx) => quantity[..idx].trim_end(),
        None => quantity,
    }
}

/// Commodity of a single amount such as `-$10`, `10 USD` or `3 "AAPL 2023"`.
/// Quoted commodities take precedence over bare ones.
pub fn commodity_of(amount: &str) -> Option<&str> {
    let token = parse_first(Rule::amount, amount)?;
    let mut found: Option<&str> = None;

    for pair in token.into_inner().filter(|p| p.as_rule() == Rule::commodity) {
        let quoted = pair.as_str().starts_with('"');
        let symbol = inner_str(pair);
        if quoted {
            return Some(symbol);
        }
        found = found.or(Some(symbol));
    }

    found
}

/// Commodity named by a `commodity` or `D` directive argument, which may be a
/// sample amount (`1,000.00 USD`) or a bare symbol (`USD`, `"AAPL 2023"`).
pub fn declared_commodity(text: &str) -> Option<&str> {
    let text = text.trim();
    if let Some(symbol) = commodity_of(text) {
        return Some(symbol);
    }

    let symbol = text.trim_matches('"');
    let bare = text.starts_with('"')
        || !symbol.chars().any(|c| c.is_whitespace() || c.is_ascii_digit());
    Some(symbol).filter(|s| !s.is_empty() && bare)
}

/// All commodities referenced by a posting amount.
pub fn commodities_in(amount: &str) -> Vec<&str> {
    AmountParts::split(amount).commodities()
}

#[cfg(test)]
mod tests {
    use super::{commodities_in, commodity_of, declared_commodity, AmountParts};

    #[test]
    fn split_price_and_assertion() {
        assert_eq!(
            AmountParts::split("10 USD @@ 9.20 EUR == 150 USD"),
            AmountParts {
                quantity: "10 USD",
                price: Some("9.20 EUR"),
                assertion: Some("150 USD"),
            }
        );
        assert_eq!(
            AmountParts::split("= 0"),
            AmountParts {
                quantity: "",
                price: None,
                assertion: Some("0"),
            }
        );
        assert_eq!(AmountParts::split("3 AAPL {120 USD}").quantity, "3 AAPL");
    }

    #[test]
    fn leading_and_trailing_commodities() {
        assert_eq!(commodity_of("-$10.00"), Some("$"));
        assert_eq!(commodity_of("$ -10"), Some("$"));
        assert_eq!(commodity_of("1.000,50€"), Some("€"));
        assert_eq!(commodity_of("10 USD"), Some("USD"));
        assert_eq!(commodity_of("10"), None);
        assert_eq!(commodity_of("USD"), None);
    }

    #[test]
    fn quoted_commodity_wins() {
        assert_eq!(commodity_of(r#"3 "AAPL 2023""#), Some("AAPL 2023"));
        assert_eq!(commodity_of(r#"X 3 "Y Z""#), Some("Y Z"));
    }

    #[test]
    fn all_commodities_of_posting() {
        assert_eq!(commodities_in("10 USD @ 0.92 EUR"), vec!["USD", "EUR"]);
        assert_eq!(commodities_in("5"), Vec::<&str>::new());
    }

    #[test]
    fn commodity_directive_argument() {
        assert_eq!(declared_commodity("1,000.00 USD"), Some("USD"));
        assert_eq!(declared_commodity("EUR"), Some("EUR"));
        assert_eq!(declared_commodity(r#""AAPL 2023""#), Some("AAPL 2023"));
        assert_eq!(declared_commodity("not a symbol"), None);
    }
}
