use crate::names::AccountName;

use indexmap::{IndexMap, IndexSet};

pub const SEPARATOR: char = ':';

impl AccountName {
    /// Colon-delimited segments, e.g. `Assets`, `Bank`, `Cash`.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.as_str().split(SEPARATOR)
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    pub fn leaf(&self) -> &str {
        self.segments().last().unwrap_or("")
    }

    /// `Assets`, `Assets:Bank`, `Assets:Bank:Cash` for `Assets:Bank:Cash`.
    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        prefixes(self.as_str())
    }
}

pub fn prefixes(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices(SEPARATOR)
        .map(move |(idx, _)| &name[..idx])
        .chain(std::iter::once(name))
}

/// An account is valid when it, or any of its parent accounts, is declared.
pub fn is_valid(name: &str, declared: &IndexSet<AccountName>) -> bool {
    prefixes(name).any(|prefix| declared.contains(prefix))
}

/// Single-hop alias lookup. Cycles are left in place, so `A -> B -> A`
/// resolves `A` to `B` and `B` to `A`.
pub fn resolve_alias<'a>(
    name: &'a str,
    aliases: &'a IndexMap<AccountName, AccountName>,
) -> &'a str {
    aliases.get(name).map(AccountName::as_str).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use crate::account::{is_valid, resolve_alias};
    use crate::names::AccountName;
    use indexmap::{IndexMap, IndexSet};

    #[test]
    fn hierarchy() {
        let account = AccountName::new("Assets:Bank:Cash");
        assert_eq!(account.depth(), 3);
        assert_eq!(account.leaf(), "Cash");
        assert_eq!(
            account.prefixes().collect::<Vec<_>>(),
            vec!["Assets", "Assets:Bank", "Assets:Bank:Cash"]
        );
    }

    #[test]
    fn valid_through_declared_parent() {
        let mut declared: IndexSet<AccountName> = IndexSet::new();
        assert!(!is_valid("Assets:Bank:Cash", &declared));

        declared.insert("Assets".into());
        assert!(is_valid("Assets:Bank:Cash", &declared));

        declared.clear();
        declared.insert("Assets:Bank".into());
        assert!(is_valid("Assets:Bank:Cash", &declared));
        assert!(!is_valid("Assets:Brokerage", &declared));

        declared.clear();
        declared.insert("Assets:Bank:Cash".into());
        assert!(is_valid("Assets:Bank:Cash", &declared));
        assert!(!is_valid("Assets:Bank", &declared));
    }

    #[test]
    fn alias_cycles_are_single_hop() {
        let mut aliases: IndexMap<AccountName, AccountName> = IndexMap::new();
        aliases.insert("A".into(), "B".into());
        aliases.insert("B".into(), "A".into());

        assert_eq!(resolve_alias("A", &aliases), "B");
        assert_eq!(resolve_alias("B", &aliases), "A");
        assert_eq!(resolve_alias("C", &aliases), "C");
    }
}
