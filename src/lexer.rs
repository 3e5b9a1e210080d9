use crate::parser::{child_str, parse_first, Rule};

use anyhow::anyhow;
use pest::iterators::Pair;

use std::convert::TryFrom;

/// Clearing mark of a transaction or posting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Cleared, // '*'
    Pending, // '!'
}

impl Status {
    fn parse(mark: &str) -> Option<Status> {
        match mark {
            "*" => Some(Status::Cleared),
            "!" => Some(Status::Pending),
            _ => None,
        }
    }
}

/// Bracketing of a virtual posting account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtualKind {
    Unbalanced, // (Account)
    Balanced,   // [Account]
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxnHeader<'l> {
    pub date: &'l str,
    pub secondary_date: Option<&'l str>,
    pub status: Option<Status>,
    pub code: Option<&'l str>,
    pub description: &'l str,
    pub comment: Option<&'l str>,
}

impl<'l> TxnHeader<'l> {
    /// Payee is the description, or the part before `|` when the description
    /// is written as `payee | note`.
    pub fn payee(&self) -> Option<&'l str> {
        let payee = match self.description.split_once('|') {
            Some((payee, _)) => payee.trim(),
            None => self.description,
        };
        Some(payee).filter(|p| !p.is_empty())
    }

    pub fn note(&self) -> Option<&'l str> {
        self.description
            .split_once('|')
            .map(|(_, note)| note.trim())
            .filter(|n| !n.is_empty())
    }

    fn parse(token: Pair<'l, Rule>) -> anyhow::Result<TxnHeader<'l>> {
        let date = child_str(&token, Rule::date).ok_or(anyhow!("transaction without date"))?;

        Ok(TxnHeader {
            date,
            secondary_date: child_str(&token, Rule::secondary_date),
            status: child_str(&token, Rule::status).and_then(Status::parse),
            code: child_str(&token, Rule::code).map(str::trim),
            description: child_str(&token, Rule::description).map(str::trim).unwrap_or(""),
            comment: child_str(&token, Rule::comment_text),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Posting<'l> {
    pub status: Option<Status>,
    pub account: &'l str,
    pub virtual_kind: Option<VirtualKind>,
    pub amount: Option<&'l str>,
    pub comment: Option<&'l str>,
}

impl<'l> Posting<'l> {
    fn parse(token: Pair<'l, Rule>) -> anyhow::Result<Posting<'l>> {
        let raw = child_str(&token, Rule::account_text)
            .map(str::trim)
            .ok_or(anyhow!("posting without account"))?;
        let (account, virtual_kind) = strip_virtual(raw);
        if account.is_empty() {
            return Err(anyhow!("posting with an empty account: '{}'", token.as_str()));
        }

        Ok(Posting {
            status: child_str(&token, Rule::status).and_then(Status::parse),
            account,
            virtual_kind,
            amount: child_str(&token, Rule::amount_text)
                .map(str::trim)
                .filter(|a| !a.is_empty()),
            comment: child_str(&token, Rule::comment_text),
        })
    }
}

fn strip_virtual(raw: &str) -> (&str, Option<VirtualKind>) {
    if let Some(inner) = raw.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        return (inner.trim(), Some(VirtualKind::Unbalanced));
    }
    if let Some(inner) = raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
        return (inner.trim(), Some(VirtualKind::Balanced));
    }
    (raw, None)
}

/// Directive keywords, in the order they are offered for completion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    Account,
    Alias,
    ApplyAccount,
    Commodity,
    DecimalMark,
    DefaultCommodity,
    End,
    Include,
    Payee,
    Price,
    Tag,
    Year,
    Periodic,
    Automated,
}

impl DirectiveKind {
    pub const ALL: [DirectiveKind; 14] = [
        DirectiveKind::Account,
        DirectiveKind::Alias,
        DirectiveKind::ApplyAccount,
        DirectiveKind::Commodity,
        DirectiveKind::DecimalMark,
        DirectiveKind::DefaultCommodity,
        DirectiveKind::End,
        DirectiveKind::Include,
        DirectiveKind::Payee,
        DirectiveKind::Price,
        DirectiveKind::Tag,
        DirectiveKind::Year,
        DirectiveKind::Periodic,
        DirectiveKind::Automated,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            DirectiveKind::Account => "account",
            DirectiveKind::Alias => "alias",
            DirectiveKind::ApplyAccount => "apply account",
            DirectiveKind::Commodity => "commodity",
            DirectiveKind::DecimalMark => "decimal-mark",
            DirectiveKind::DefaultCommodity => "D",
            DirectiveKind::End => "end",
            DirectiveKind::Include => "include",
            DirectiveKind::Payee => "payee",
            DirectiveKind::Price => "P",
            DirectiveKind::Tag => "tag",
            DirectiveKind::Year => "year",
            DirectiveKind::Periodic => "~",
            DirectiveKind::Automated => "=",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            DirectiveKind::Account => "Declare an account",
            DirectiveKind::Alias => "Rewrite an account name to another",
            DirectiveKind::ApplyAccount => "Prefix following account names",
            DirectiveKind::Commodity => "Declare a commodity and its display format",
            DirectiveKind::DecimalMark => "Set the decimal mark for amounts",
            DirectiveKind::DefaultCommodity => "Set the default commodity for bare amounts",
            DirectiveKind::End => "End an apply block",
            DirectiveKind::Include => "Include another journal file",
            DirectiveKind::Payee => "Declare a payee",
            DirectiveKind::Price => "Record a market price",
            DirectiveKind::Tag => "Declare a tag",
            DirectiveKind::Year => "Set the year for dates without one",
            DirectiveKind::Periodic => "Periodic transaction rule",
            DirectiveKind::Automated => "Automated posting rule",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive<'l> {
    Account {
        name: &'l str,
        comment: Option<&'l str>,
    },
    Alias {
        from: &'l str,
        to: &'l str,
    },
    ApplyAccount(&'l str),
    Commodity(&'l str),
    DecimalMark(&'l str),
    DefaultCommodity(&'l str),
    End(Option<&'l str>),
    Include(&'l str),
    Payee(&'l str),
    Price {
        date: &'l str,
        commodity: &'l str,
        amount: &'l str,
    },
    Tag(&'l str),
    Year(&'l str),
    Periodic(&'l str),
    Automated(&'l str),
}

impl<'l> Directive<'l> {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Directive::Account { .. } => DirectiveKind::Account,
            Directive::Alias { .. } => DirectiveKind::Alias,
            Directive::ApplyAccount(_) => DirectiveKind::ApplyAccount,
            Directive::Commodity(_) => DirectiveKind::Commodity,
            Directive::DecimalMark(_) => DirectiveKind::DecimalMark,
            Directive::DefaultCommodity(_) => DirectiveKind::DefaultCommodity,
            Directive::End(_) => DirectiveKind::End,
            Directive::Include(_) => DirectiveKind::Include,
            Directive::Payee(_) => DirectiveKind::Payee,
            Directive::Price { .. } => DirectiveKind::Price,
            Directive::Tag(_) => DirectiveKind::Tag,
            Directive::Year(_) => DirectiveKind::Year,
            Directive::Periodic(_) => DirectiveKind::Periodic,
            Directive::Automated(_) => DirectiveKind::Automated,
        }
    }

    fn parse(token: Pair<'l, Rule>) -> anyhow::Result<Directive<'l>> {
        let rule = token.as_rule();
        let text = |r: Rule| {
            child_str(&token, r).map(str::trim).ok_or(anyhow!(format!(
                "invalid next token, expected {:?} in '{}'",
                r,
                token.as_str()
            )))
        };

        let directive = match rule {
            Rule::account_directive => Directive::Account {
                name: text(Rule::account_text)?,
                comment: child_str(&token, Rule::comment_text),
            },
            Rule::alias_directive => Directive::Alias {
                from: text(Rule::alias_from)?,
                to: text(Rule::alias_to)?,
            },
            Rule::apply_account => Directive::ApplyAccount(text(Rule::account_text)?),
            Rule::commodity_directive => Directive::Commodity(text(Rule::amount_text)?),
            Rule::decimal_mark => Directive::DecimalMark(text(Rule::free_text)?),
            Rule::default_commodity => Directive::DefaultCommodity(text(Rule::amount_text)?),
            Rule::end_directive => {
                Directive::End(child_str(&token, Rule::free_text).map(str::trim))
            }
            Rule::include_directive => Directive::Include(text(Rule::free_text)?),
            Rule::payee_directive => Directive::Payee(text(Rule::free_text)?),
            Rule::price_directive => Directive::Price {
                date: text(Rule::date)?,
                commodity: child_str(&token, Rule::commodity)
                    .map(|c| c.trim_matches('"'))
                    .ok_or(anyhow!("price directive without commodity"))?,
                amount: text(Rule::amount_text)?,
            },
            Rule::tag_directive => Directive::Tag(text(Rule::tag_name)?),
            Rule::year_directive => Directive::Year(text(Rule::year_digits)?),
            Rule::periodic => Directive::Periodic(text(Rule::period_expr)?),
            Rule::automated => Directive::Automated(text(Rule::period_expr)?),
            _ => return Err(anyhow!("unexpected directive token: '{}'", token.as_str())),
        };

        Ok(directive)
    }
}

/// One classified journal line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token<'l> {
    Empty,
    Comment { text: &'l str, indented: bool },
    Transaction(TxnHeader<'l>),
    Posting(Posting<'l>),
    Directive(Directive<'l>),
    Unknown(&'l str),
}

impl<'l> TryFrom<Pair<'l, Rule>> for Token<'l> {
    type Error = anyhow::Error;

    fn try_from(pair: Pair<'l, Rule>) -> Result<Self, Self::Error> {
        let token = match pair.as_rule() {
            Rule::empty => Token::Empty,
            Rule::comment_line => Token::Comment {
                text: child_str(&pair, Rule::comment_text).unwrap_or(""),
                indented: false,
            },
            Rule::indented_comment => Token::Comment {
                text: child_str(&pair, Rule::comment_text).unwrap_or(""),
                indented: true,
            },
            Rule::transaction => Token::Transaction(TxnHeader::parse(pair)?),
            Rule::posting => Token::Posting(Posting::parse(pair)?),
            Rule::periodic | Rule::automated => Token::Directive(Directive::parse(pair)?),
            Rule::directive => Token::Directive(Directive::parse(
                pair.into_inner()
                    .next()
                    .ok_or(anyhow!("invalid next token, expected directive"))?,
            )?),
            _ => return Err(anyhow!("unexpected line token: '{}'", pair.as_str())),
        };

        Ok(token)
    }
}

/// Classify one line of journal text. Never fails: anything the grammar
/// rejects is returned as [`Token::Unknown`].
pub fn tokenize_line(line: &str) -> Token<'_> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    match parse_first(Rule::line, line).map(Token::try_from) {
        Some(Ok(token)) => token,
        Some(Err(err)) => {
            log::trace!("unparseable line '{}': {}", line, err);
            Token::Unknown(line)
        }
        None => Token::Unknown(line),
    }
}

/// `name:value` tags inside a comment, in order of appearance.
/// A bare word without a colon is never a tag.
pub fn comment_tags(comment: &str) -> Vec<(&str, &str)> {
    let Some(tags) = parse_first(Rule::tags, comment) else {
        return Vec::new();
    };

    tags.into_inner()
        .filter(|pair| pair.as_rule() == Rule::tag)
        .filter_map(|pair| {
            let name = child_str(&pair, Rule::tag_name)?;
            let value = child_str(&pair, Rule::tag_value).unwrap_or("").trim();
            Some((name, value))
        })
        .collect()
}
