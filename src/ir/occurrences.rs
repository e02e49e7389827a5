//! Occurrence index: symbol-name and file-path lookups over the flat occurrence list
//! (SPEC_FULL.md §4.C). Built once per snapshot, read-only afterward.

use std::collections::HashMap;

use super::Occurrence;

#[derive(Debug, Default)]
pub struct OccurrenceIndex {
    all: Vec<Occurrence>,
    by_symbol: HashMap<String, Vec<usize>>,
    by_file: HashMap<String, Vec<usize>>,
}

impl OccurrenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, occurrence: Occurrence) {
        let idx = self.all.len();
        self.by_symbol
            .entry(occurrence.symbol_id.to_string())
            .or_default()
            .push(idx);
        self.by_file
            .entry(occurrence.file_path.to_string())
            .or_default()
            .push(idx);
        self.all.push(occurrence);
    }

    pub fn extend(&mut self, occurrences: impl IntoIterator<Item = Occurrence>) {
        for occ in occurrences {
            self.insert(occ);
        }
    }

    pub fn by_symbol(&self, symbol_id: &str) -> impl Iterator<Item = &Occurrence> {
        self.by_symbol
            .get(symbol_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.all[i])
    }

    pub fn by_file(&self, file_path: &str) -> impl Iterator<Item = &Occurrence> {
        self.by_file
            .get(file_path)
            .into_iter()
            .flatten()
            .map(move |&i| &self.all[i])
    }

    /// Mutable view over one file's occurrences, keyed the same way as [`Self::by_file`].
    /// Used by post-parse analyses (e.g. type narrowing) that enrich an occurrence already
    /// in the index rather than inserting a new one.
    pub fn by_file_mut(&mut self, file_path: &str) -> impl Iterator<Item = &mut Occurrence> {
        let indices = self.by_file.get(file_path).cloned().unwrap_or_default();
        self.all
            .iter_mut()
            .enumerate()
            .filter(move |(i, _)| indices.contains(i))
            .map(|(_, occ)| occ)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Occurrence> {
        self.all.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::OccurrenceRoles;
    use crate::types::Span;

    #[test]
    fn lookup_by_symbol_and_file_are_independent() {
        let mut index = OccurrenceIndex::new();
        index.insert(Occurrence::new("a.foo", "a.py", Span::default(), OccurrenceRoles::DEFINITION));
        index.insert(Occurrence::new("a.bar", "a.py", Span::default(), OccurrenceRoles::DEFINITION));
        index.insert(Occurrence::new("a.foo", "b.py", Span::default(), OccurrenceRoles::REFERENCE));

        assert_eq!(index.by_symbol("a.foo").count(), 2);
        assert_eq!(index.by_file("a.py").count(), 2);
        assert_eq!(index.by_file("b.py").count(), 1);
        assert_eq!(index.len(), 3);
    }
}
