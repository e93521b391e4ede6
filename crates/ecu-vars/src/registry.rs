//! Variable registry - the ordered container for register definitions
//!
//! Registration order is the order the ECU is programmed in, and therefore
//! the order values appear in every register read.

use std::collections::HashSet;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::decode::{decode_register, DecodeReport};
use crate::definition::VariableDefinition;
use crate::error::{VarError, VarResult};

/// Metadata about a definition file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// On-disk layout of a definition file
#[derive(Debug, Serialize, Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    meta: Option<RegistryMeta>,
    #[serde(default)]
    variables: Vec<VariableDefinition>,
}

/// Ordered, validated set of variable definitions
#[derive(Debug, Default)]
pub struct VariableRegistry {
    definitions: Vec<VariableDefinition>,
    meta: RegistryMeta,
    /// Last decoded physical value per definition
    last_values: RwLock<Vec<Option<f64>>>,
}

impl VariableRegistry {
    /// Build a registry, validating every definition
    pub fn new(definitions: Vec<VariableDefinition>) -> VarResult<Self> {
        let mut seen = HashSet::new();
        for def in &definitions {
            def.validate()?;
            if !seen.insert(def.name.as_str()) {
                return Err(VarError::DuplicateName(def.name.clone()));
            }
        }

        let last_values = RwLock::new(vec![None; definitions.len()]);
        Ok(Self {
            definitions,
            meta: RegistryMeta::default(),
            last_values,
        })
    }

    /// Load definitions from a file (YAML, or JSON by `.json` extension)
    pub fn from_file(path: impl AsRef<Path>) -> VarResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_yaml(&content),
        }
    }

    /// Load definitions from YAML string
    pub fn from_yaml(yaml: &str) -> VarResult<Self> {
        let file: DefinitionFile = serde_yaml::from_str(yaml)?;
        Self::from_definition_file(file)
    }

    /// Load definitions from JSON string
    pub fn from_json(json: &str) -> VarResult<Self> {
        let file: DefinitionFile = serde_json::from_str(json)?;
        Self::from_definition_file(file)
    }

    fn from_definition_file(file: DefinitionFile) -> VarResult<Self> {
        let mut registry = Self::new(file.variables)?;
        registry.meta = file.meta.unwrap_or_default();
        Ok(registry)
    }

    pub fn meta(&self) -> &RegistryMeta {
        &self.meta
    }

    /// Definitions in registration order
    pub fn definitions(&self) -> &[VariableDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&VariableDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Total register bytes a complete read must carry
    pub fn total_width(&self) -> usize {
        self.definitions.iter().map(|d| d.width()).sum()
    }

    /// Decode a register buffer and remember the values that were decoded
    pub fn decode(&self, data: &[u8]) -> DecodeReport {
        let report = decode_register(&self.definitions, data);
        let mut last = self.last_values.write();
        for value in &report.values {
            last[value.index] = Some(value.value);
        }
        report
    }

    /// Most recent decoded value of a variable
    pub fn last_value(&self, name: &str) -> Option<f64> {
        let index = self.definitions.iter().position(|d| d.name == name)?;
        self.last_values.read()[index]
    }
}
