//! Section-state tracking in front of a [`Backend`].
//!
//! Values are held per open section and only reach the backend when that
//! section closes, so close hooks can still read and extend them. A section's
//! open event is deferred until something has to be written for it or for one
//! of its descendants; parents are always announced before their children.

use crate::backend::Backend;
use crate::error::SectionStateError;
use crate::schema::Schema;
use crate::value::{ArrayValue, Datum, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// When a value is handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachingLevel {
    /// Held until the owning section closes.
    #[default]
    Cache,
    /// Written immediately, still readable by close hooks.
    Forward,
    /// Held for close hooks, never written.
    Ignore,
}

/// Which quantities may reach the backend.
#[derive(Debug, Clone, Default)]
pub struct QuantityFilter {
    keep: HashSet<String>,
    skip: HashSet<String>,
}

impl QuantityFilter {
    /// An empty `keep` set keeps everything not skipped.
    pub fn new<K, S>(keep: K, skip: S) -> Self
    where
        K: IntoIterator<Item = String>,
        S: IntoIterator<Item = String>,
    {
        Self {
            keep: keep.into_iter().collect(),
            skip: skip.into_iter().collect(),
        }
    }

    pub fn allows(&self, quantity: &str) -> bool {
        !self.skip.contains(quantity) && (self.keep.is_empty() || self.keep.contains(quantity))
    }
}

#[derive(Debug, Clone)]
pub struct BufferedValue {
    pub name: String,
    pub datum: Datum,
    pub unit: Option<String>,
    pub level: CachingLevel,
    forwarded: bool,
}

#[derive(Debug)]
pub struct OpenSection {
    pub name: String,
    pub index: usize,
    pub parent: Option<usize>,
    announced: bool,
    values: Vec<BufferedValue>,
    children: HashMap<String, usize>,
}

impl OpenSection {
    pub fn values(&self) -> &[BufferedValue] {
        &self.values
    }
}

pub struct CachingBackend<B> {
    backend: B,
    schema: Arc<Schema>,
    overrides: HashMap<String, CachingLevel>,
    filter: QuantityFilter,
    stack: Vec<OpenSection>,
    next_index: usize,
}

impl<B: Backend> CachingBackend<B> {
    /// Wraps `backend` with nothing open, schema caching levels and no filter.
    pub fn new(backend: B, schema: Arc<Schema>) -> Self {
        Self {
            backend,
            schema,
            overrides: HashMap::new(),
            filter: QuantityFilter::default(),
            stack: Vec::new(),
            next_index: 0,
        }
    }

    /// Caching levels replacing the schema's for the named quantities.
    pub fn with_overrides(mut self, overrides: HashMap<String, CachingLevel>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn with_filter(mut self, filter: QuantityFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Unwraps the backend. Sections still open are not closed.
    pub fn into_inner(self) -> B {
        self.backend
    }

    /// Effective caching level of a quantity after filters and overrides.
    pub fn level_of(&self, quantity: &str) -> CachingLevel {
        if !self.filter.allows(quantity) {
            return CachingLevel::Ignore;
        }
        self.overrides
            .get(quantity)
            .copied()
            .or_else(|| self.schema.quantity(quantity).map(|q| q.caching))
            .unwrap_or_default()
    }

    /// Opens a section under the innermost open one and returns its index.
    ///
    /// An open sibling of the same name at the top of the stack is closed first.
    pub fn open(&mut self, name: &str) -> usize {
        if self.stack.last().is_some_and(|top| top.name == name) {
            log::debug!("implicitly closing previous `{name}` before reopening it");
            self.close_top();
        }
        let index = self.next_index;
        self.next_index += 1;
        let parent = self.stack.last_mut().map(|top| {
            *top.children.entry(name.to_string()).or_insert(0) += 1;
            top.index
        });
        self.stack.push(OpenSection {
            name: name.to_string(),
            index,
            parent,
            announced: false,
            values: Vec::new(),
            children: HashMap::new(),
        });
        index
    }

    /// Flushes the section's values, then closes it.
    ///
    /// Sections opened inside it and still open are closed first (innermost
    /// first); that still succeeds but is reported as `ClosedOutOfOrder`.
    pub fn close(&mut self, name: &str, index: usize) -> Result<(), SectionStateError> {
        let Some(pos) = self.stack.iter().rposition(|s| s.index == index) else {
            return Err(if index < self.next_index {
                SectionStateError::AlreadyClosed {
                    name: name.to_string(),
                    index,
                }
            } else {
                SectionStateError::NeverOpened {
                    name: name.to_string(),
                    index,
                }
            });
        };
        if self.stack[pos].name != name {
            return Err(SectionStateError::NameMismatch {
                requested: name.to_string(),
                open: self.stack[pos].name.clone(),
                index,
            });
        }
        let forced = self.stack.len() - 1 - pos;
        while self.stack.len() > pos {
            self.close_top();
        }
        if forced > 0 {
            return Err(SectionStateError::ClosedOutOfOrder {
                name: name.to_string(),
                index,
                forced,
            });
        }
        Ok(())
    }

    /// Closes everything still open, innermost first, and returns what was closed.
    pub fn close_all(&mut self) -> Vec<(String, usize)> {
        let mut closed = Vec::with_capacity(self.stack.len());
        while let Some(top) = self.stack.last() {
            closed.push((top.name.clone(), top.index));
            self.close_top();
        }
        closed
    }

    /// Stores a scalar in the innermost open section the schema places it in.
    ///
    /// # Arguments
    ///
    /// * `name` - Quantity name; quantities missing from the schema go to the
    ///   innermost open section
    /// * `value` - The parsed value
    /// * `unit` - Unit of `value`, when it differs from the schema's
    ///
    /// # Returns
    ///
    /// The index of the section that received the value. Whether the backend
    /// sees it now, on close, or never depends on the quantity's caching level.
    ///
    /// # Errors
    ///
    /// [`SectionStateError::NoOpenParent`] when the schema parent is not open.
    pub fn add_value(
        &mut self,
        name: &str,
        value: Value,
        unit: Option<&str>,
    ) -> Result<usize, SectionStateError> {
        self.add_datum(name, Datum::Scalar(value), unit)
    }

    /// Array counterpart of [`CachingBackend::add_value`].
    pub fn add_array_value(
        &mut self,
        name: &str,
        values: ArrayValue,
        unit: Option<&str>,
    ) -> Result<usize, SectionStateError> {
        self.add_datum(name, Datum::Array(values), unit)
    }

    /// Stores a value in the innermost open section the schema places it in,
    /// returning that section's index.
    pub fn add_datum(
        &mut self,
        name: &str,
        datum: Datum,
        unit: Option<&str>,
    ) -> Result<usize, SectionStateError> {
        let pos = self.target_position(name)?;
        self.push_value(pos, name, datum, unit);
        Ok(self.stack[pos].index)
    }

    /// Stores a value in a specific open section.
    pub fn add_datum_to(
        &mut self,
        index: usize,
        name: &str,
        datum: Datum,
        unit: Option<&str>,
    ) -> Result<(), SectionStateError> {
        let Some(pos) = self.stack.iter().rposition(|s| s.index == index) else {
            return Err(SectionStateError::NoOpenParent {
                quantity: name.to_string(),
                section: format!("#{index}"),
            });
        };
        self.push_value(pos, name, datum, unit);
        Ok(())
    }

    pub fn section(&self, index: usize) -> Option<&OpenSection> {
        self.stack.iter().rev().find(|s| s.index == index)
    }

    /// Open sections, outermost first.
    pub fn open_sections(&self) -> &[OpenSection] {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Values named `name` buffered in section `index`, oldest first.
    pub fn values(&self, index: usize, name: &str) -> Vec<&Datum> {
        self.section(index)
            .map(|s| {
                s.values
                    .iter()
                    .filter(|v| v.name == name)
                    .map(|v| &v.datum)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_value(&self, index: usize, name: &str) -> bool {
        self.section(index)
            .is_some_and(|s| s.values.iter().any(|v| v.name == name))
    }

    /// Most recent value named `name` in any open section, innermost first.
    pub fn latest(&self, name: &str) -> Option<&Datum> {
        self.stack
            .iter()
            .rev()
            .find_map(|s| s.values.iter().rev().find(|v| v.name == name))
            .map(|v| &v.datum)
    }

    /// How many `child` sections have been opened directly inside `index`.
    pub fn child_count(&self, index: usize, child: &str) -> usize {
        self.section(index)
            .and_then(|s| s.children.get(child).copied())
            .unwrap_or(0)
    }

    fn target_position(&self, quantity: &str) -> Result<usize, SectionStateError> {
        match self.schema.parent_of(quantity) {
            Some(parent) => self
                .stack
                .iter()
                .rposition(|s| s.name == parent)
                .ok_or_else(|| SectionStateError::NoOpenParent {
                    quantity: quantity.to_string(),
                    section: parent.to_string(),
                }),
            None => self
                .stack
                .len()
                .checked_sub(1)
                .ok_or_else(|| SectionStateError::NoOpenParent {
                    quantity: quantity.to_string(),
                    section: "<any>".to_string(),
                }),
        }
    }

    fn push_value(&mut self, pos: usize, name: &str, datum: Datum, unit: Option<&str>) {
        let level = self.level_of(name);
        let unit = unit
            .or_else(|| self.schema.unit_of(name))
            .map(str::to_string);
        let forwarded = level == CachingLevel::Forward;
        if forwarded {
            self.announce(pos);
            write(&mut self.backend, name, &datum, self.stack[pos].index);
        }
        self.stack[pos].values.push(BufferedValue {
            name: name.to_string(),
            datum,
            unit,
            level,
            forwarded,
        });
    }

    /// Forwards deferred open events for the section at `pos` and its ancestors.
    fn announce(&mut self, pos: usize) {
        for section in self.stack[..=pos].iter_mut() {
            if !section.announced {
                self.backend
                    .open_section_with_gindex(&section.name, section.index);
                section.announced = true;
            }
        }
    }

    fn close_top(&mut self) {
        let Some(top) = self.stack.len().checked_sub(1) else {
            return;
        };
        self.announce(top);
        let Some(section) = self.stack.pop() else {
            return;
        };
        for value in &section.values {
            if !value.forwarded && value.level != CachingLevel::Ignore {
                write(&mut self.backend, &value.name, &value.datum, section.index);
            }
        }
        self.backend.close_section(&section.name, section.index);
    }
}

fn write<B: Backend>(backend: &mut B, name: &str, datum: &Datum, index: usize) {
    match datum {
        Datum::Scalar(value) => backend.add_value(name, value, index),
        Datum::Array(values) => backend.add_array_values(name, values, index),
    }
}
