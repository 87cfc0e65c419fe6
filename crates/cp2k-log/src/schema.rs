//! The fixed metainfo: which sections exist, which quantities they hold and how
//! each quantity is typed and cached.

use crate::caching::CachingLevel;
use crate::error::SchemaError;
use crate::value::ValueKind;
use serde::Deserialize;
use std::collections::HashMap;

const BUILTIN: &str = include_str!("../metainfo/cp2k.meta.json");

#[derive(Debug, Clone, Deserialize)]
pub struct SectionDef {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuantityDef {
    pub name: String,
    pub kind: ValueKind,
    #[serde(default)]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub caching: CachingLevel,
    pub parent: String,
}

#[derive(Deserialize)]
struct SchemaFile {
    sections: Vec<SectionDef>,
    quantities: Vec<QuantityDef>,
}

/// Read-only lookup from names to definitions. Loaded once before a parse.
#[derive(Debug, Clone)]
pub struct Schema {
    sections: HashMap<String, SectionDef>,
    quantities: HashMap<String, QuantityDef>,
}

impl Schema {
    /// The metainfo compiled into the crate.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_json(BUILTIN)
    }

    /// Loads metainfo from its JSON form.
    ///
    /// # Errors
    ///
    /// A [`SchemaError`] for malformed JSON or for a section or quantity whose
    /// parent section is not defined.
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = serde_json::from_str(json)?;
        let sections: HashMap<_, _> = file
            .sections
            .into_iter()
            .map(|s| (s.name.clone(), s))
            .collect();

        for section in sections.values() {
            if let Some(parent) = &section.parent
                && !sections.contains_key(parent)
            {
                return Err(SchemaError::UnknownSectionParent {
                    section: section.name.clone(),
                    parent: parent.clone(),
                });
            }
        }

        let mut quantities = HashMap::with_capacity(file.quantities.len());
        for quantity in file.quantities {
            if !sections.contains_key(&quantity.parent) {
                return Err(SchemaError::UnknownParent {
                    quantity: quantity.name,
                    section: quantity.parent,
                });
            }
            quantities.insert(quantity.name.clone(), quantity);
        }

        Ok(Self {
            sections,
            quantities,
        })
    }

    pub fn quantity(&self, name: &str) -> Option<&QuantityDef> {
        self.quantities.get(name)
    }

    pub fn section(&self, name: &str) -> Option<&SectionDef> {
        self.sections.get(name)
    }

    pub fn is_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Section a quantity belongs in, if the quantity is known.
    pub fn parent_of(&self, quantity: &str) -> Option<&str> {
        self.quantities.get(quantity).map(|q| q.parent.as_str())
    }

    pub fn unit_of(&self, quantity: &str) -> Option<&str> {
        self.quantities.get(quantity)?.unit.as_deref()
    }

    pub fn quantity_names(&self) -> impl Iterator<Item = &str> {
        self.quantities.keys().map(String::as_str)
    }
}
