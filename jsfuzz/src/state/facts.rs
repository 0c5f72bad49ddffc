use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

/// A value recorded for a name, valid from `line` onward until superseded by a
/// later fact for the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fact<T> {
    pub line: usize,
    pub value: T,
}

/// Per-name fact lists, each kept sorted by line.
///
/// Several facts may share a line: they model a name whose runtime value is
/// ambiguous at that point (for example a variable re-assigned inside a loop
/// body). Exact duplicates are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactTable<T> {
    entries: BTreeMap<String, Vec<Fact<T>>>,
}

impl<T> Default for FactTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

/// The facts of `facts` holding at `line`: every entry sharing the greatest
/// line that is `<= line`.
pub fn facts_at_line<T>(facts: &[Fact<T>], line: usize) -> &[Fact<T>] {
    let end = facts.partition_point(|fact| fact.line <= line);
    let Some(latest) = end.checked_sub(1).map(|i| facts[i].line) else {
        return &[];
    };
    let start = facts.partition_point(|fact| fact.line < latest);
    &facts[start..end]
}

impl<T: Clone + PartialEq> FactTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Fact<T>])> {
        self.entries
            .iter()
            .map(|(name, facts)| (name.as_str(), facts.as_slice()))
    }

    pub fn facts(&self, name: &str) -> &[Fact<T>] {
        self.entries.get(name).map_or(&[], Vec::as_slice)
    }

    /// Records `value` for `name` from `line` onward.
    pub fn insert(&mut self, name: impl Into<String>, line: usize, value: T) {
        let facts = self.entries.entry(name.into()).or_default();
        let at = facts.partition_point(|fact| fact.line <= line);
        if facts[..at]
            .iter()
            .rev()
            .take_while(|fact| fact.line == line)
            .any(|fact| fact.value == value)
        {
            return;
        }
        facts.insert(at, Fact { line, value });
    }

    /// Replaces whatever holds at `line` for `name` with a single fact.
    pub fn set(&mut self, name: impl Into<String>, line: usize, value: T) {
        let name = name.into();
        if let Some(facts) = self.entries.get_mut(&name) {
            facts.retain(|fact| fact.line != line);
        }
        self.insert(name, line, value);
    }

    pub fn remove_name(&mut self, name: &str) -> Option<Vec<Fact<T>>> {
        self.entries.remove(name)
    }

    pub fn retain_names(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|name, _| keep(name));
    }

    /// The values holding for `name` at `line`.
    pub fn at_line(&self, name: &str, line: usize) -> &[Fact<T>] {
        facts_at_line(self.facts(name), line)
    }

    /// Adds `delta` to every fact line `>= from`.
    pub fn shift_from(&mut self, from: usize, delta: isize) {
        for facts in self.entries.values_mut() {
            for fact in facts.iter_mut().filter(|fact| fact.line >= from) {
                fact.line = fact.line.saturating_add_signed(delta);
            }
        }
    }

    /// Drops every fact whose line lies in `lines`, and every name left empty.
    pub fn remove_range(&mut self, lines: Range<usize>) {
        for facts in self.entries.values_mut() {
            facts.retain(|fact| !lines.contains(&fact.line));
        }
        self.entries.retain(|_, facts| !facts.is_empty());
    }

    /// Renames every key through `rename`. Keys that collide after renaming
    /// have their fact lists merged.
    pub fn rename_keys(&mut self, mut rename: impl FnMut(&str) -> String) {
        let entries = std::mem::take(&mut self.entries);
        for (name, facts) in entries {
            let renamed = rename(&name);
            for fact in facts {
                self.insert(renamed.clone(), fact.line, fact.value);
            }
        }
    }

    /// Copies the facts whose line lies in `lines`, re-based so that
    /// `lines.start` becomes line 0.
    pub fn extract_range(&self, lines: Range<usize>) -> FactTable<T> {
        let mut extracted = FactTable::new();
        for (name, facts) in &self.entries {
            for fact in facts.iter().filter(|fact| lines.contains(&fact.line)) {
                extracted.insert(name.clone(), fact.line - lines.start, fact.value.clone());
            }
        }
        extracted
    }

    /// Inserts every fact of `other`, shifted down by `offset` lines.
    pub fn merge_shifted(&mut self, other: &FactTable<T>, offset: usize) {
        for (name, facts) in &other.entries {
            for fact in facts {
                self.insert(name.clone(), fact.line + offset, fact.value.clone());
            }
        }
    }

    /// Records, at `line`, every value holding at `at` in `other`.
    pub fn import_at_line(&mut self, other: &FactTable<T>, at: usize, line: usize) {
        for (name, facts) in &other.entries {
            for fact in facts_at_line(facts, at) {
                self.insert(name.clone(), line, fact.value.clone());
            }
        }
    }

    pub fn max_line(&self) -> Option<usize> {
        self.entries
            .values()
            .filter_map(|facts| facts.last().map(|fact| fact.line))
            .max()
    }

    pub fn is_sorted(&self) -> bool {
        self.entries
            .values()
            .all(|facts| facts.windows(2).all(|pair| pair[0].line <= pair[1].line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(facts: &[Fact<u8>]) -> Vec<u8> {
        facts.iter().map(|fact| fact.value).collect()
    }

    #[test]
    fn latest_line_wins_and_keeps_ambiguity() {
        let mut table = FactTable::new();
        table.insert("a", 3, 1u8);
        table.insert("a", 1, 0);
        table.insert("a", 3, 2);
        table.insert("a", 3, 2);
        assert!(table.is_sorted());
        assert_eq!(table.facts("a").len(), 3);
        assert!(table.at_line("a", 0).is_empty());
        assert_eq!(values(table.at_line("a", 2)), vec![0]);
        assert_eq!(values(table.at_line("a", 10)), vec![1, 2]);
    }

    #[test]
    fn shift_and_remove() {
        let mut table = FactTable::new();
        table.insert("a", 1, 0u8);
        table.insert("a", 4, 1);
        table.insert("b", 2, 2);
        table.shift_from(2, 3);
        assert_eq!(table.facts("a")[1].line, 7);
        assert_eq!(table.facts("b")[0].line, 5);
        table.remove_range(5..6);
        assert!(!table.contains("b"));
        assert_eq!(table.max_line(), Some(7));
    }

    #[test]
    fn rename_merges_collisions() {
        let mut table = FactTable::new();
        table.insert("x", 2, 0u8);
        table.insert("y", 1, 1);
        table.rename_keys(|_| "z".to_string());
        assert_eq!(table.len(), 1);
        assert_eq!(values(table.facts("z")), vec![1, 0]);
    }

    #[test]
    fn extract_and_merge_back() {
        let mut table = FactTable::new();
        table.insert("a", 1, 0u8);
        table.insert("a", 3, 1);
        let extracted = table.extract_range(2..4);
        assert_eq!(extracted.facts("a"), &[Fact { line: 1, value: 1 }]);
        let mut other = FactTable::new();
        other.merge_shifted(&extracted, 10);
        assert_eq!(other.facts("a")[0].line, 11);
    }
}
