/// One symbolic value accepted by an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameEntry<T: 'static> {
    pub name: &'static str,
    pub alias: Option<&'static str>,
    pub value: T,
    pub description: &'static str,
}

/// Outcome of [`NameTable::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameLookup<T> {
    Found(T),
    /// The input designates a value that used to be accepted. Carries its canonical name.
    Retired(&'static str),
    Unknown,
}

/// An ordered table of symbolic names for the values of an option.
///
/// Names are matched case-insensitively and may be abbreviated: the input selects the first
/// entry, in table order, of which it is a prefix of the name or of the alias.
#[derive(Debug, Clone, Copy)]
pub struct NameTable<T: 'static> {
    entries: &'static [NameEntry<T>],
    retired: &'static [(&'static str, &'static str)],
}

fn is_abbreviation(input: &str, candidate: &str) -> bool {
    input.len() <= candidate.len()
        && candidate.as_bytes()[..input.len()].eq_ignore_ascii_case(input.as_bytes())
}

impl<T: Copy + PartialEq> NameTable<T> {
    pub const fn new(entries: &'static [NameEntry<T>]) -> Self {
        NameTable {
            entries,
            retired: &[],
        }
    }

    /// Adds names, as `(name, alias)` pairs, that are still recognized but no longer accepted.
    /// They are only checked when no regular entry matched.
    pub const fn with_retired(self, retired: &'static [(&'static str, &'static str)]) -> Self {
        NameTable {
            entries: self.entries,
            retired,
        }
    }

    pub fn entries(&self) -> &'static [NameEntry<T>] {
        self.entries
    }

    pub fn resolve(&self, input: &str) -> NameLookup<T> {
        let found = self.entries.iter().find(|entry| {
            is_abbreviation(input, entry.name)
                || entry.alias.map_or(false, |alias| is_abbreviation(input, alias))
        });
        if let Some(entry) = found {
            return NameLookup::Found(entry.value);
        }
        self.retired
            .iter()
            .find(|(name, alias)| is_abbreviation(input, name) || is_abbreviation(input, alias))
            .map_or(NameLookup::Unknown, |&(name, _)| NameLookup::Retired(name))
    }

    /// Canonical name of a value.
    pub fn name_of(&self, value: T) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|entry| entry.value == value)
            .map(|entry| entry.name)
    }

    /// Two lines per entry, the name then the alias, used in help texts.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for entry in self.entries {
            out.push_str(&format!("    {:<25}\t{}\n", entry.name, entry.description));
            if let Some(alias) = entry.alias {
                out.push_str(&format!("    {:<25}\talias\n", alias));
            }
        }
        out
    }
}
