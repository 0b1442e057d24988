use crate::types::ValueType;
use anyhow::Context;
use serde_derive::{Deserialize, Serialize};
use std::path::Path;

/* Named root type */
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TypeDef {
    pub name: String,
    #[serde(rename = "type", with = "serde_yml::with::singleton_map_recursive")]
    pub value_type: ValueType,
}

/* Generation options shared by every type of a schema file */
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SchemaOptions {
    /* Also produce serializers and size estimators taking a runtime field mask,
       next to the plain ones */
    #[serde(default)]
    pub with_mask: bool,
}

/* Schema file: a list of named types plus generation options */
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct SchemaFile {
    #[serde(default)]
    pub options: SchemaOptions,
    #[serde(default)]
    pub types: Vec<TypeDef>,
}

impl SchemaFile {
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        serde_yml::from_str(content).context("failed to parse schema YAML")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read schema file {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("in schema file {}", path.display()))
    }

    /* Find a type definition by name */
    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|def| def.name == name)
    }
}
