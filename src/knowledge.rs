use crate::{
    account,
    amount::{commodities_in, declared_commodity},
    lexer::{comment_tags, tokenize_line, Directive, Posting, Token, TxnHeader},
    names::{AccountName, CommodityName, PayeeName, TagName},
    template::{PayeeTemplates, TemplateBook, TemplatePosting},
    usage::UsageCounter,
};

use chrono::NaiveDate;
use indexmap::{IndexMap, IndexSet};

use std::path::Path;
use std::sync::Arc;

/// Facts introduced by explicit directives.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Declarations {
    accounts: IndexSet<AccountName>,
    payees: IndexSet<PayeeName>,
    tags: IndexSet<TagName>,
    commodities: IndexSet<CommodityName>,
    aliases: IndexMap<AccountName, AccountName>,
    default_commodity: Option<CommodityName>,
    default_year: Option<i32>,
}

impl Declarations {
    fn absorb(&mut self, other: &Declarations) {
        self.accounts.extend(other.accounts.iter().cloned());
        self.payees.extend(other.payees.iter().cloned());
        self.tags.extend(other.tags.iter().cloned());
        self.commodities.extend(other.commodities.iter().cloned());
        for (from, to) in &other.aliases {
            self.aliases.insert(from.clone(), to.clone());
        }
        if other.default_commodity.is_some() {
            self.default_commodity = other.default_commodity.clone();
        }
        if other.default_year.is_some() {
            self.default_year = other.default_year;
        }
    }
}

/// Entities seen in use, with their occurrence counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Observations {
    accounts: UsageCounter<AccountName>,
    payees: UsageCounter<PayeeName>,
    tags: UsageCounter<TagName>,
    tag_values: IndexMap<TagName, UsageCounter<String>>,
    commodities: UsageCounter<CommodityName>,
    last_date: Option<NaiveDate>,
}

impl Observations {
    fn record_tags(&mut self, comment: &str) {
        for (name, value) in comment_tags(comment) {
            let tag = TagName::from(name);
            self.tags.record(tag.clone());
            let values = self.tag_values.entry(tag).or_default();
            if !value.is_empty() {
                values.record(value.to_string());
            }
        }
    }

    fn record_amount(&mut self, amount: &str) {
        for commodity in commodities_in(amount) {
            self.commodities.record(commodity.into());
        }
    }

    fn see_date(&mut self, date: NaiveDate) {
        self.last_date = self.last_date.max(Some(date));
    }

    fn absorb(&mut self, other: &Observations) {
        self.accounts.absorb(&other.accounts);
        self.payees.absorb(&other.payees);
        self.tags.absorb(&other.tags);
        for (tag, values) in &other.tag_values {
            self.tag_values.entry(tag.clone()).or_default().absorb(values);
        }
        self.commodities.absorb(&other.commodities);
        self.last_date = self.last_date.max(other.last_date);
    }
}

/// Immutable snapshot of everything known about a document or a workspace.
///
/// Cloning is cheap: the three parts are reference counted, and a clone that
/// is later extended copies only the part it changes.
#[derive(Clone, Debug, Default)]
pub struct KnowledgeBase {
    declarations: Arc<Declarations>,
    templates: Arc<TemplateBook>,
    observed: Arc<Observations>,
}

impl PartialEq for KnowledgeBase {
    fn eq(&self, other: &Self) -> bool {
        self.declarations == other.declarations
            && self.templates == other.templates
            && self.observed == other.observed
    }
}

impl KnowledgeBase {
    pub fn declared_accounts(&self) -> &IndexSet<AccountName> {
        &self.declarations.accounts
    }

    pub fn used_accounts(&self) -> impl Iterator<Item = &AccountName> {
        self.observed.accounts.keys()
    }

    /// Declared accounts followed by accounts only seen in postings.
    pub fn accounts(&self) -> Vec<&AccountName> {
        union(self.declarations.accounts.iter(), self.observed.accounts.keys())
    }

    pub fn account_usage(&self) -> &UsageCounter<AccountName> {
        &self.observed.accounts
    }

    /// True if the account or one of its parents is declared.
    pub fn is_account_valid(&self, name: &str) -> bool {
        account::is_valid(name, &self.declarations.accounts)
    }

    pub fn aliases(&self) -> &IndexMap<AccountName, AccountName> {
        &self.declarations.aliases
    }

    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        account::resolve_alias(name, &self.declarations.aliases)
    }

    pub fn declared_payees(&self) -> &IndexSet<PayeeName> {
        &self.declarations.payees
    }

    pub fn payees(&self) -> Vec<&PayeeName> {
        union(self.declarations.payees.iter(), self.observed.payees.keys())
    }

    pub fn payee_usage(&self) -> &UsageCounter<PayeeName> {
        &self.observed.payees
    }

    pub fn declared_tags(&self) -> &IndexSet<TagName> {
        &self.declarations.tags
    }

    pub fn tags(&self) -> Vec<&TagName> {
        union(self.declarations.tags.iter(), self.observed.tags.keys())
    }

    pub fn tag_usage(&self) -> &UsageCounter<TagName> {
        &self.observed.tags
    }

    /// Values observed for `tag`, with their counts.
    pub fn tag_values(&self, tag: &str) -> Option<&UsageCounter<String>> {
        self.observed.tag_values.get(tag)
    }

    pub fn declared_commodities(&self) -> &IndexSet<CommodityName> {
        &self.declarations.commodities
    }

    pub fn commodities(&self) -> Vec<&CommodityName> {
        union(self.declarations.commodities.iter(), self.observed.commodities.keys())
    }

    pub fn commodity_usage(&self) -> &UsageCounter<CommodityName> {
        &self.observed.commodities
    }

    pub fn default_commodity(&self) -> Option<&CommodityName> {
        self.declarations.default_commodity.as_ref()
    }

    pub fn default_year(&self) -> Option<i32> {
        self.declarations.default_year
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observed.last_date
    }

    pub fn templates(&self) -> &TemplateBook {
        &self.templates
    }

    pub fn templates_for(&self, payee: &str) -> Option<&PayeeTemplates> {
        self.templates.get(payee)
    }

    /// Whether both snapshots share the same declaration and template storage.
    pub fn shares_structure_with(&self, other: &KnowledgeBase) -> bool {
        Arc::ptr_eq(&self.declarations, &other.declarations)
            && Arc::ptr_eq(&self.templates, &other.templates)
    }
}

fn union<'a, K, A, B>(first: A, second: B) -> Vec<&'a K>
where
    K: std::hash::Hash + Eq + 'a,
    A: Iterator<Item = &'a K>,
    B: Iterator<Item = &'a K>,
{
    let mut seen: IndexSet<&K> = first.collect();
    seen.extend(second);
    seen.into_iter().collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BuildMode {
    Fresh,
    /// Extending a shared snapshot: templates stay untouched, other parts are
    /// copied on first write.
    Overlay,
}

#[derive(Debug, Default)]
struct OpenTransaction {
    payee: Option<PayeeName>,
    date: Option<NaiveDate>,
    postings: Vec<TemplatePosting>,
}

/// Streams journal lines into a [`KnowledgeBase`].
pub struct KnowledgeBuilder {
    declarations: Arc<Declarations>,
    templates: Arc<TemplateBook>,
    observed: Arc<Observations>,
    mode: BuildMode,
    open: Option<OpenTransaction>,
}

impl Default for KnowledgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeBuilder {
    pub fn new() -> KnowledgeBuilder {
        KnowledgeBuilder {
            declarations: Arc::default(),
            templates: Arc::default(),
            observed: Arc::default(),
            mode: BuildMode::Fresh,
            open: None,
        }
    }

    /// Builder that extends `base` without ever mutating it.
    pub fn overlay(base: &KnowledgeBase) -> KnowledgeBuilder {
        KnowledgeBuilder {
            declarations: Arc::clone(&base.declarations),
            templates: Arc::clone(&base.templates),
            observed: Arc::clone(&base.observed),
            mode: BuildMode::Overlay,
            open: None,
        }
    }

    fn observed(&mut self) -> &mut Observations {
        Arc::make_mut(&mut self.observed)
    }

    fn declarations(&mut self) -> &mut Declarations {
        Arc::make_mut(&mut self.declarations)
    }

    /// Feed a whole text, optionally skipping one zero-based line.
    pub fn feed(&mut self, text: &str, skip_line: Option<usize>) {
        for (number, line) in text.lines().enumerate() {
            if Some(number) == skip_line {
                continue;
            }
            self.feed_line(line);
        }
        self.close_transaction();
    }

    pub fn feed_line(&mut self, line: &str) {
        match tokenize_line(line) {
            Token::Empty => self.close_transaction(),
            Token::Comment { text, indented } => {
                if indented {
                    self.observed().record_tags(text);
                } else {
                    self.close_transaction();
                }
            }
            Token::Transaction(header) => self.open_transaction(&header),
            Token::Posting(posting) => self.posting(&posting),
            Token::Directive(directive) => self.directive(&directive),
            Token::Unknown(text) => {
                if !text.starts_with([' ', '\t']) {
                    self.close_transaction();
                }
            }
        }
    }

    fn open_transaction(&mut self, header: &TxnHeader<'_>) {
        self.close_transaction();

        let date = parse_date(header.date);
        let payee = header.payee().map(PayeeName::from);
        let observed = self.observed();
        if let Some(date) = date {
            observed.see_date(date);
        }
        if let Some(payee) = &payee {
            observed.payees.record(payee.clone());
        }
        if let Some(comment) = header.comment {
            observed.record_tags(comment);
        }

        self.open = Some(OpenTransaction {
            payee,
            date,
            postings: Vec::new(),
        });
    }

    fn posting(&mut self, posting: &Posting<'_>) {
        if self.open.is_none() {
            return;
        }

        let account = AccountName::from(posting.account);
        let observed = self.observed();
        observed.accounts.record(account.clone());
        if let Some(amount) = posting.amount {
            observed.record_amount(amount);
        }
        if let Some(comment) = posting.comment {
            observed.record_tags(comment);
        }

        if let Some(open) = self.open.as_mut() {
            open.postings.push(TemplatePosting {
                account,
                amount: posting.amount.map(str::to_string),
            });
        }
    }

    fn close_transaction(&mut self) {
        let Some(open) = self.open.take() else {
            return;
        };
        if self.mode == BuildMode::Overlay {
            return;
        }
        if let Some(payee) = open.payee {
            Arc::make_mut(&mut self.templates).record(payee, open.postings, open.date);
        }
    }

    fn directive(&mut self, directive: &Directive<'_>) {
        self.close_transaction();

        match directive {
            Directive::Account { name, comment } => {
                self.declare_account(name);
                if let Some(comment) = comment {
                    self.observed().record_tags(comment);
                }
            }
            Directive::Alias { from, to } => {
                // regular expression aliases do not name an account
                if from.starts_with('/') {
                    return;
                }
                let (from, to) = (AccountName::from(*from), AccountName::from(*to));
                if self.declarations.aliases.get(&from) != Some(&to) {
                    self.declarations().aliases.insert(from, to);
                }
            }
            Directive::Commodity(text) | Directive::DefaultCommodity(text) => {
                let Some(symbol) = declared_commodity(text) else {
                    log::debug!("no commodity symbol in '{}'", text);
                    return;
                };
                let symbol = CommodityName::from(symbol);
                if !self.declarations.commodities.contains(&symbol) {
                    self.declarations().commodities.insert(symbol.clone());
                }
                if matches!(directive, Directive::DefaultCommodity(_))
                    && self.declarations.default_commodity.as_ref() != Some(&symbol)
                {
                    self.declarations().default_commodity = Some(symbol);
                }
            }
            Directive::Payee(name) => {
                if !self.declarations.payees.contains(*name) {
                    self.declarations().payees.insert(PayeeName::from(*name));
                }
            }
            Directive::Tag(name) => {
                if !self.declarations.tags.contains(*name) {
                    self.declarations().tags.insert(TagName::from(*name));
                }
            }
            Directive::Price { date, commodity, amount } => {
                let observed = self.observed();
                observed.commodities.record(CommodityName::from(*commodity));
                observed.record_amount(amount);
                if let Some(date) = parse_date(date) {
                    observed.see_date(date);
                }
            }
            Directive::Year(year) => {
                let year = year.parse::<i32>().ok();
                if year.is_some() && self.declarations.default_year != year {
                    self.declarations().default_year = year;
                }
            }
            Directive::Periodic(_) | Directive::Automated(_) => {
                self.open = Some(OpenTransaction::default());
            }
            Directive::ApplyAccount(_)
            | Directive::End(_)
            | Directive::Include(_)
            | Directive::DecimalMark(_) => {}
        }
    }

    fn declare_account(&mut self, name: &str) {
        if !self.declarations.accounts.contains(name) {
            self.declarations().accounts.insert(AccountName::from(name));
        }
    }

    /// Fold a complete snapshot into this builder.
    pub fn absorb(&mut self, other: &KnowledgeBase) {
        self.close_transaction();
        if *other.declarations != Declarations::default() {
            self.declarations().absorb(&other.declarations);
        }
        if self.mode == BuildMode::Fresh && !other.templates.is_empty() {
            Arc::make_mut(&mut self.templates).absorb(&other.templates);
        }
        self.observed().absorb(&other.observed);
    }

    pub fn finish(mut self) -> KnowledgeBase {
        self.close_transaction();
        KnowledgeBase {
            declarations: self.declarations,
            templates: self.templates,
            observed: self.observed,
        }
    }
}

/// Dates written as `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYY.MM.DD`, with one or
/// two digit month and day.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let mut parts = text.split(['-', '/', '.']);
    let year = parts.next()?.parse::<i32>().ok()?;
    let month = parts.next()?.parse::<u32>().ok()?;
    let day = parts.next()?.parse::<u32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Build a knowledge base from one document's text.
pub fn parse_content(text: &str, path: Option<&Path>) -> KnowledgeBase {
    let mut builder = KnowledgeBuilder::new();
    builder.feed(text, None);
    let knowledge = builder.finish();

    if let Some(path) = path {
        log::debug!(
            "parsed {}: {} accounts, {} payees, {} templates",
            path.display(),
            knowledge.accounts().len(),
            knowledge.payees().len(),
            knowledge.templates().len()
        );
    }

    knowledge
}

#[cfg(test)]
mod tests {
    use super::{parse_content, parse_date, KnowledgeBuilder};
    use anyhow::{anyhow, Result};
    use chrono::NaiveDate;

    const JOURNAL: &str = r#"; personal journal
account Assets:Bank:Checking  ; type:A
account Expenses
alias checking = Assets:Bank:Checking
commodity 1,000.00 USD
D $1.00
payee Landlord
tag trip
Y2024

2024-01-03 * Grocery Store | weekly  ; trip:home
    Expenses:Food:Groceries     42.10 USD
    Assets:Bank:Checking

2024-01-10 Grocery Store
    Assets:Bank:Checking       -38.00 USD
    Expenses:Food:Groceries     38.00 USD  ; trip:cabin, receipt:

2024-01-05 Landlord
    Expenses:Rent   1200 USD
    Assets:Bank:Checking

~ monthly
    Expenses:Subscriptions   10 EUR
    Assets:Bank:Checking
"#;

    #[test]
    fn declarations_are_separate_from_usage() -> Result<()> {
        let kb = parse_content(JOURNAL, None);

        assert_eq!(
            kb.declared_accounts().iter().map(|a| a.as_str()).collect::<Vec<_>>(),
            vec!["Assets:Bank:Checking", "Expenses"]
        );
        assert_eq!(
            kb.used_accounts().map(|a| a.as_str()).collect::<Vec<_>>(),
            vec![
                "Expenses:Food:Groceries",
                "Assets:Bank:Checking",
                "Expenses:Rent",
                "Expenses:Subscriptions"
            ]
        );
        assert_eq!(kb.account_usage().count("Assets:Bank:Checking"), 4);
        assert_eq!(kb.account_usage().count("Expenses"), 0);
        assert!(kb.is_account_valid("Expenses:Food:Groceries"));
        assert!(!kb.is_account_valid("Income:Salary"));
        assert_eq!(kb.resolve_alias("checking"), "Assets:Bank:Checking");
        assert_eq!(kb.default_year(), Some(2024));
        assert_eq!(kb.default_commodity().map(|c| c.as_str()), Some("$"));

        let commodities: Vec<&str> = kb.commodities().iter().map(|c| c.as_str()).collect();
        assert_eq!(commodities, vec!["USD", "$", "EUR"]);
        assert_eq!(kb.commodity_usage().count("USD"), 4);

        assert_eq!(kb.payee_usage().count("Grocery Store"), 2);
        assert_eq!(
            kb.payees().iter().map(|p| p.as_str()).collect::<Vec<_>>(),
            vec!["Landlord", "Grocery Store"]
        );
        assert_eq!(kb.last_date(), NaiveDate::from_ymd_opt(2024, 1, 10));

        Ok(())
    }

    #[test]
    fn tags_and_values() -> Result<()> {
        let kb = parse_content(JOURNAL, None);

        assert_eq!(kb.tag_usage().count("trip"), 2);
        assert_eq!(kb.tag_usage().count("receipt"), 1);
        assert_eq!(kb.tag_usage().count("type"), 1);
        let trips = kb.tag_values("trip").ok_or(anyhow!("no trip values"))?;
        assert_eq!(trips.keys().cloned().collect::<Vec<_>>(), vec!["home", "cabin"]);
        assert!(kb.tag_values("receipt").ok_or(anyhow!("no receipt entry"))?.is_empty());
        Ok(())
    }

    #[test]
    fn templates_per_payee() -> Result<()> {
        let kb = parse_content(JOURNAL, None);

        let grocery = kb.templates_for("Grocery Store").ok_or(anyhow!("no template"))?;
        assert_eq!(grocery.len(), 1);
        let best = grocery.best().ok_or(anyhow!("no best template"))?;
        assert_eq!(best.uses(), 2);
        assert_eq!(best.postings()[0].account.as_str(), "Assets:Bank:Checking");
        assert_eq!(best.postings()[1].amount.as_deref(), Some("38.00 USD"));

        // periodic rules have no payee and leave no template behind
        assert_eq!(kb.templates().len(), 2);
        Ok(())
    }

    #[test]
    fn parsing_is_idempotent() {
        assert_eq!(parse_content(JOURNAL, None), parse_content(JOURNAL, None));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let kb = parse_content(
            "2024-13-45 Nowhere\n  Assets:Cash  1\n!!! garbage\n  Expenses:Misc  2\n",
            None,
        );
        assert_eq!(kb.account_usage().count("Assets:Cash"), 1);
        assert_eq!(kb.account_usage().count("Expenses:Misc"), 0);
        assert_eq!(kb.last_date(), None);
        assert_eq!(kb.payee_usage().count("Nowhere"), 1);
    }

    #[test]
    fn orphan_postings_are_ignored() {
        let kb = parse_content("commodity USD\n  format 1,000.00 USD\n", None);
        assert_eq!(kb.used_accounts().count(), 0);
    }

    #[test]
    fn absorbing_adds_usage() {
        let cafe = |date: &str, amount: &str| {
            let text = format!("{} Cafe\n  Expenses:Coffee  {}\n  Assets:Cash\n", date, amount);
            parse_content(&text, None)
        };
        let left = cafe("2024-01-01", "3 USD");
        let right = cafe("2024-02-01", "4 USD");

        let mut builder = KnowledgeBuilder::new();
        builder.absorb(&left);
        builder.absorb(&right);
        let kb = builder.finish();

        assert_eq!(kb.account_usage().count("Expenses:Coffee"), 2);
        assert_eq!(kb.last_date(), NaiveDate::from_ymd_opt(2024, 2, 1));
        let cafe = kb.templates_for("Cafe").and_then(|t| t.best()).map(|t| t.uses());
        assert_eq!(cafe, Some(2));
    }

    #[test]
    fn dates_in_every_separator() {
        assert_eq!(parse_date("2024/2/9"), NaiveDate::from_ymd_opt(2024, 2, 9));
        assert_eq!(parse_date("2024.02.09"), NaiveDate::from_ymd_opt(2024, 2, 9));
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date("2024-02"), None);
    }
}
