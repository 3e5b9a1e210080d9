use pest::iterators::Pair;
use pest::Parser;

#[derive(Parser)]
#[grammar = "journal.pest"]
pub struct JournalParser;

/// Parse `input` against `rule` and return the first produced pair, if any.
pub(crate) fn parse_first(rule: Rule, input: &str) -> Option<Pair<'_, Rule>> {
    JournalParser::parse(rule, input).ok()?.next()
}

/// Text of the first direct child of `token` matching `rule`.
pub(crate) fn child_str<'i>(token: &Pair<'i, Rule>, rule: Rule) -> Option<&'i str> {
    token
        .clone()
        .into_inner()
        .find(|pair| pair.as_rule() == rule)
        .map(|pair| pair.as_str())
}

/// Text of the first inner pair of `token`, or the token itself when it has none.
pub(crate) fn inner_str(token: Pair<'_, Rule>) -> &str {
    let whole = token.as_str();
    token.into_inner().next().map(|p| p.as_str()).unwrap_or(whole)
}

#[cfg(test)]
mod tests {
    use super::{child_str, inner_str, parse_first, JournalParser, Rule};
    use anyhow::{anyhow, Result};
    use pest::Parser;

    #[test]
    fn parse_date() -> Result<()> {
        let mut ast = JournalParser::parse(Rule::date, "2024/1/05")?;
        assert_eq!(ast.next().ok_or(anyhow!("empty ast"))?.as_str(), "2024/1/05");
        assert!(JournalParser::parse(Rule::date, "24-01-05").is_err());
        Ok(())
    }

    #[test]
    fn parse_quoted_commodity() -> Result<()> {
        let token = parse_first(Rule::commodity, r#""AAPL 2023""#).ok_or(anyhow!("no token"))?;
        assert_eq!(inner_str(token), "AAPL 2023");
        Ok(())
    }

    #[test]
    fn find_child() -> Result<()> {
        let token = parse_first(Rule::alias_directive, "alias checking = Assets:Bank:Checking")
            .ok_or(anyhow!("no token"))?;
        assert_eq!(child_str(&token, Rule::alias_from), Some("checking "));
        assert_eq!(child_str(&token, Rule::alias_to), Some("Assets:Bank:Checking"));
        Ok(())
    }
}
