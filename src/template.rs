use crate::names::{AccountName, PayeeName};

use chrono::NaiveDate;
use indexmap::IndexMap;

use std::collections::VecDeque;

/// Number of most recent transactions remembered per payee for recency ranking.
pub const TEMPLATE_HISTORY: usize = 50;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplatePosting {
    pub account: AccountName,
    pub amount: Option<String>,
}

/// A recurring combination of posting accounts seen for one payee.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionTemplate {
    postings: Vec<TemplatePosting>,
    last_date: Option<NaiveDate>,
    uses: u32,
}

impl TransactionTemplate {
    pub fn postings(&self) -> &[TemplatePosting] {
        &self.postings
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    pub fn uses(&self) -> u32 {
        self.uses
    }

    fn refresh(&mut self, postings: &[TemplatePosting], date: Option<NaiveDate>) {
        if date >= self.last_date {
            self.postings = postings.to_vec();
            self.last_date = date.or(self.last_date);
        }
    }

    /// Snippet body: the payee followed by one posting per line, with one
    /// numbered placeholder per posting amount, defaulting to the last amount seen.
    pub fn snippet(&self, payee: &str, indent: &str) -> String {
        let mut out = escape_snippet(payee);
        let mut placeholder = 0;

        for posting in &self.postings {
            out.push('\n');
            out.push_str(indent);
            out.push_str(&escape_snippet(posting.account.as_str()));
            if let Some(amount) = &posting.amount {
                placeholder += 1;
                out.push_str(&format!("  ${{{}:{}}}", placeholder, escape_snippet(amount)));
            }
        }

        out
    }

    /// Plain text rendering of the postings, used as documentation.
    pub fn preview(&self, indent: &str) -> String {
        self.postings
            .iter()
            .map(|posting| match &posting.amount {
                Some(amount) => format!("{}{}  {}", indent, posting.account, amount),
                None => format!("{}{}", indent, posting.account),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn escape_snippet(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '$' | '}') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// All templates of one payee, deduplicated by their sorted account list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PayeeTemplates {
    templates: IndexMap<Vec<AccountName>, TransactionTemplate>,
    recent: VecDeque<usize>,
}

impl PayeeTemplates {
    pub fn record(&mut self, postings: Vec<TemplatePosting>, date: Option<NaiveDate>) {
        let mut key: Vec<AccountName> = postings.iter().map(|p| p.account.clone()).collect();
        key.sort();

        let entry = self.templates.entry(key);
        let idx = entry.index();
        match entry {
            indexmap::map::Entry::Occupied(mut occupied) => {
                let template = occupied.get_mut();
                template.uses = template.uses.saturating_add(1);
                template.refresh(&postings, date);
            }
            indexmap::map::Entry::Vacant(vacant) => {
                vacant.insert(TransactionTemplate {
                    postings,
                    last_date: date,
                    uses: 1,
                });
            }
        }

        self.remember(idx);
    }

    fn remember(&mut self, idx: usize) {
        self.recent.push_back(idx);
        while self.recent.len() > TEMPLATE_HISTORY {
            self.recent.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransactionTemplate> {
        self.templates.values()
    }

    /// Lifetime uses weighted against appearances in the recency ring; a
    /// transaction seen just now weighs as much as one more lifetime use.
    fn rank(&self, idx: usize) -> u64 {
        let lifetime = self.templates[idx].uses as u64 * TEMPLATE_HISTORY as u64;
        let recency: u64 = self
            .recent
            .iter()
            .rev()
            .enumerate()
            .filter(|&(_, &entry)| entry == idx)
            .map(|(age, _)| (TEMPLATE_HISTORY - age) as u64)
            .sum();
        lifetime + recency
    }

    /// Templates from most to least relevant. Ties keep first-seen order.
    pub fn ranked(&self) -> Vec<&TransactionTemplate> {
        let mut order: Vec<(usize, u64)> = (0..self.templates.len())
            .map(|idx| (idx, self.rank(idx)))
            .collect();
        order.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        order.into_iter().map(|(idx, _)| &self.templates[idx]).collect()
    }

    pub fn best(&self) -> Option<&TransactionTemplate> {
        self.ranked().into_iter().next()
    }

    fn absorb(&mut self, other: &PayeeTemplates) {
        let mut remap = Vec::with_capacity(other.templates.len());

        for (key, template) in &other.templates {
            let entry = self.templates.entry(key.clone());
            remap.push(entry.index());
            match entry {
                indexmap::map::Entry::Occupied(mut occupied) => {
                    let existing = occupied.get_mut();
                    existing.uses = existing.uses.saturating_add(template.uses);
                    existing.refresh(&template.postings, template.last_date);
                }
                indexmap::map::Entry::Vacant(vacant) => {
                    vacant.insert(template.clone());
                }
            }
        }

        for &idx in &other.recent {
            self.remember(remap[idx]);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateBook {
    payees: IndexMap<PayeeName, PayeeTemplates>,
}

impl TemplateBook {
    pub fn record(
        &mut self,
        payee: PayeeName,
        postings: Vec<TemplatePosting>,
        date: Option<NaiveDate>,
    ) {
        if postings.is_empty() {
            return;
        }
        self.payees.entry(payee).or_default().record(postings, date);
    }

    pub fn get(&self, payee: &str) -> Option<&PayeeTemplates> {
        self.payees.get(payee)
    }

    pub fn payees(&self) -> impl Iterator<Item = &PayeeName> {
        self.payees.keys()
    }

    pub fn len(&self) -> usize {
        self.payees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payees.is_empty()
    }

    pub fn absorb(&mut self, other: &TemplateBook) {
        for (payee, templates) in &other.payees {
            self.payees.entry(payee.clone()).or_default().absorb(templates);
        }
    }
}
