use std::borrow::Borrow;
use std::fmt;

/// Declares a nominal wrapper around `String` for one kind of journal entity.
///
/// Each wrapper has the same runtime representation as `String`, but an
/// `AccountName` can not be passed where a `PayeeName` is expected.
macro_rules! entity_name {
    ($($kind:ident => $doc:literal),* $(,)?) => {
        camelpaste::paste! {
            $(
                #[doc = $doc]
                #[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
                #[repr(transparent)]
                pub struct [<$kind Name>](String);

                impl [<$kind Name>] {
                    pub fn new(name: impl Into<String>) -> Self {
                        Self(name.into())
                    }

                    pub fn as_str(&self) -> &str {
                        &self.0
                    }

                    pub fn into_inner(self) -> String {
                        self.0
                    }
                }

                impl Borrow<str> for [<$kind Name>] {
                    fn borrow(&self) -> &str {
                        &self.0
                    }
                }

                impl AsRef<str> for [<$kind Name>] {
                    fn as_ref(&self) -> &str {
                        &self.0
                    }
                }

                impl fmt::Display for [<$kind Name>] {
                    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str(&self.0)
                    }
                }

                impl From<&str> for [<$kind Name>] {
                    fn from(s: &str) -> Self {
                        Self(s.to_string())
                    }
                }

                impl From<String> for [<$kind Name>] {
                    fn from(s: String) -> Self {
                        Self(s)
                    }
                }
            )*
        }
    };
}

entity_name! {
    Account => "Colon-delimited hierarchical account name, e.g. `Assets:Bank:Checking`.",
    Payee => "Payee part of a transaction description.",
    Tag => "Tag name found in a comment as `name:` or `name:value`.",
    Commodity => "Commodity symbol such as `USD` or `$`, stored without surrounding quotes.",
}
