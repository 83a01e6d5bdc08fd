//! Data-driven row model built once from the catalog.
//!
//! Every command entry becomes an editable row with its own [`ControlId`];
//! spacers become rows without a control. Event handling looks rows up by
//! identity instead of holding references into the UI.

use crate::catalog::{Catalog, Entry};
use crate::dispatch::ControlId;
use tui_input::Input;

/// What a row shows.
#[derive(Debug, Clone)]
pub enum RowKind {
    /// Editable command text with a send control.
    Command(Input),
    /// Blank space.
    Spacer,
}

#[derive(Debug, Clone)]
pub struct Row {
    /// Identity of the send control. `None` for spacers.
    pub control: Option<ControlId>,
    pub kind: RowKind,
}

impl Row {
    /// Current text of a command row.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            RowKind::Command(input) => Some(input.value()),
            RowKind::Spacer => None,
        }
    }

    /// Whether the row holds something sendable.
    pub fn has_command(&self) -> bool {
        self.text().is_some_and(|t| !t.trim().is_empty())
    }
}

/// One catalog section as rows.
#[derive(Debug, Clone)]
pub struct Page {
    pub name: String,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, Default)]
pub struct RowModel {
    pages: Vec<Page>,
}

impl RowModel {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut next_id = 0;
        let pages = catalog
            .sections()
            .iter()
            .map(|section| Page {
                name: section.name.clone(),
                rows: section
                    .entries
                    .iter()
                    .map(|entry| match entry {
                        Entry::Command(text) => {
                            let control = ControlId(next_id);
                            next_id += 1;
                            Row {
                                control: Some(control),
                                kind: RowKind::Command(Input::new(text.clone())),
                            }
                        }
                        Entry::Spacer => Row {
                            control: None,
                            kind: RowKind::Spacer,
                        },
                    })
                    .collect(),
            })
            .collect();

        Self { pages }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    /// Row at `page`/`row`.
    pub fn row(&self, page: usize, row: usize) -> Option<&Row> {
        self.pages.get(page)?.rows.get(row)
    }

    /// Editable input of the command row at `page`/`row`.
    pub fn input_mut(&mut self, page: usize, row: usize) -> Option<&mut Input> {
        match &mut self.pages.get_mut(page)?.rows.get_mut(row)?.kind {
            RowKind::Command(input) => Some(input),
            RowKind::Spacer => None,
        }
    }

    /// Find a row by control identity.
    pub fn find(&self, control: ControlId) -> Option<&Row> {
        self.pages
            .iter()
            .flat_map(|page| page.rows.iter())
            .find(|row| row.control == Some(control))
    }

    /// Index of the first command row of `page`.
    pub fn first_command(&self, page: usize) -> Option<usize> {
        self.pages
            .get(page)?
            .rows
            .iter()
            .position(|row| row.control.is_some())
    }

    /// Next command row after (or before) `from`, skipping spacers. Stays put
    /// at either end.
    pub fn step(&self, page: usize, from: usize, forward: bool) -> Option<usize> {
        let rows = &self.pages.get(page)?.rows;
        let found = if forward {
            rows.iter()
                .enumerate()
                .skip(from + 1)
                .find(|(_, row)| row.control.is_some())
                .map(|(i, _)| i)
        } else {
            rows.iter()
                .enumerate()
                .take(from)
                .rev()
                .find(|(_, row)| row.control.is_some())
                .map(|(i, _)| i)
        };
        found.or(Some(from))
    }
}
