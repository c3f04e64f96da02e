use crate::ast::FunctionId;
use std::borrow::Cow;
use std::collections::HashMap;

/// Read access to user-entered formulas, addressed by stable id.
///
/// Formula text returned here must already use `x` as the bound variable.
pub trait FunctionRegistry {
    fn formula(&self, id: FunctionId) -> Option<Cow<'_, str>>;
}

impl FunctionRegistry for HashMap<FunctionId, String> {
    fn formula(&self, id: FunctionId) -> Option<Cow<'_, str>> {
        self.get(&id).map(|formula| Cow::Borrowed(formula.as_str()))
    }
}

/// Which axis a formula is plotted against.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Axis {
    /// `y = f(x)`, written with `x`.
    #[default]
    X,
    /// `x = f(y)`, written with `y`.
    Y,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionEntry {
    pub id: FunctionId,
    pub formula: String,
    pub axis: Axis,
}

impl FunctionEntry {
    /// The formula with its own axis letter swapped to `x`.
    ///
    /// For a `Y` formula `x` and `y` trade places, so a stray `x` ends up as
    /// a `y` the lexer rejects.
    pub fn canonical_formula(&self) -> Cow<'_, str> {
        match self.axis {
            Axis::X => Cow::Borrowed(self.formula.as_str()),
            Axis::Y => Cow::Owned(
                self.formula
                    .chars()
                    .map(|c| match c {
                        'y' => 'x',
                        'Y' => 'X',
                        'x' => 'y',
                        'X' => 'Y',
                        other => other,
                    })
                    .collect(),
            ),
        }
    }
}

/// Ordered collection of formulas. Ids are handed out in increasing order
/// and never reused.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<FunctionEntry>,
    next_id: FunctionId,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, formula: impl Into<String>, axis: Axis) -> FunctionId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(FunctionEntry {
            id,
            formula: formula.into(),
            axis,
        });
        id
    }

    pub fn get(&self, id: FunctionId) -> Option<&FunctionEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn get_mut(&mut self, id: FunctionId) -> Option<&mut FunctionEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    /// Replaces the text of an entry. Returns `false` if there is no such id.
    pub fn set_formula(&mut self, id: FunctionId, formula: impl Into<String>) -> bool {
        match self.get_mut(id) {
            Some(entry) => {
                entry.formula = formula.into();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: FunctionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != id);
        self.entries.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[FunctionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FunctionRegistry for Registry {
    fn formula(&self, id: FunctionId) -> Option<Cow<'_, str>> {
        self.get(id).map(FunctionEntry::canonical_formula)
    }
}
