//! Runtime field-mask values.
//!
//! A mask mirrors the shape of the value it governs: tuples and records carry
//! one entry per element (`Recurse`), every other shape is governed by a single
//! leaf action.

use crate::types::{Field, Shape, ValueType};
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

/// What to do with one addressable field.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum MaskAction {
    Copy,
    Skip,
    SetNull,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum MaskValue {
    Copy,
    Skip,
    SetNull,
    Recurse(Vec<MaskValue>),
}

impl From<MaskAction> for MaskValue {
    fn from(action: MaskAction) -> Self {
        match action {
            MaskAction::Copy => MaskValue::Copy,
            MaskAction::Skip => MaskValue::Skip,
            MaskAction::SetNull => MaskValue::SetNull,
        }
    }
}

impl MaskValue {
    /// Leaf action of this entry; `None` for `Recurse`.
    pub fn action(&self) -> Option<MaskAction> {
        match self {
            MaskValue::Copy => Some(MaskAction::Copy),
            MaskValue::Skip => Some(MaskAction::Skip),
            MaskValue::SetNull => Some(MaskAction::SetNull),
            MaskValue::Recurse(_) => None,
        }
    }

    pub fn is(&self, action: MaskAction) -> bool {
        self.action() == Some(action)
    }

    /// Entry for child `index`. A leaf applies to all of its children.
    pub fn project(&self, index: usize) -> MaskValue {
        match self {
            MaskValue::Recurse(entries) => entries.get(index).cloned().unwrap_or(MaskValue::Copy),
            leaf => leaf.clone(),
        }
    }

    /// Mask with `Copy` everywhere except the listed fields.
    pub fn fields<'a>(
        fields: &[Field],
        overrides: impl IntoIterator<Item = (&'a str, MaskValue)>,
    ) -> MaskValue {
        let mut entries = vec![MaskValue::Copy; fields.len()];
        for (name, mask) in overrides {
            if let Some(idx) = fields.iter().position(|f| f.name == name) {
                entries[idx] = mask;
            }
        }
        MaskValue::Recurse(entries)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaskError {
    #[error("set-null applied to non-nullable type {value_type} at {path}")]
    SetNullOnNonNullable { value_type: String, path: String },

    #[error("mask at {path} has {found} entries but {value_type} has {expected}")]
    ArityMismatch {
        value_type: String,
        path: String,
        expected: usize,
        found: usize,
    },

    #[error("mask at {path} recurses into {value_type}, which is not addressable")]
    NotAddressable { value_type: String, path: String },
}

impl ValueType {
    /// Type of the output produced when serializing a value of this type under
    /// `mask`: skipped fields disappear, everything else is kept. Returns `None`
    /// when the whole value is skipped.
    pub fn masked(&self, mask: &MaskValue) -> Option<ValueType> {
        match mask {
            MaskValue::Skip => None,
            MaskValue::Copy | MaskValue::SetNull => Some(self.clone()),
            MaskValue::Recurse(_) => {
                let shape = match &self.shape {
                    Shape::Tup(elements) => Shape::Tup(
                        elements
                            .iter()
                            .enumerate()
                            .filter_map(|(i, ty)| ty.masked(&mask.project(i)))
                            .collect(),
                    ),
                    Shape::Rec(fields) => Shape::Rec(
                        fields
                            .iter()
                            .enumerate()
                            .filter_map(|(i, field)| {
                                field.value_type.masked(&mask.project(i)).map(|value_type| Field {
                                    name: field.name.clone(),
                                    value_type,
                                })
                            })
                            .collect(),
                    ),
                    Shape::Usr { name, underlying } => Shape::Usr {
                        name: name.clone(),
                        underlying: Box::new(underlying.masked(mask)?),
                    },
                    other => other.clone(),
                };
                Some(ValueType {
                    shape,
                    nullable: self.nullable,
                })
            }
        }
    }

    /// Checks that `mask` is well formed for this type. The generators assume
    /// this has been done by the caller.
    pub fn check_mask(&self, mask: &MaskValue) -> Result<(), MaskError> {
        self.check_mask_at(mask, "<root>")
    }

    fn check_mask_at(&self, mask: &MaskValue, path: &str) -> Result<(), MaskError> {
        match mask {
            MaskValue::Copy | MaskValue::Skip => Ok(()),
            MaskValue::SetNull if self.nullable => Ok(()),
            MaskValue::SetNull => Err(MaskError::SetNullOnNonNullable {
                value_type: self.to_string(),
                path: path.to_string(),
            }),
            MaskValue::Recurse(entries) => {
                let children: Vec<(String, &ValueType)> = match &self.shape {
                    Shape::Usr { underlying, .. } => return underlying.check_mask_at(mask, path),
                    Shape::Tup(elements) => elements
                        .iter()
                        .enumerate()
                        .map(|(i, ty)| (i.to_string(), ty))
                        .collect(),
                    Shape::Rec(fields) => fields
                        .iter()
                        .map(|f| (f.name.clone(), &f.value_type))
                        .collect(),
                    _ => {
                        return Err(MaskError::NotAddressable {
                            value_type: self.to_string(),
                            path: path.to_string(),
                        });
                    }
                };
                if children.len() != entries.len() {
                    return Err(MaskError::ArityMismatch {
                        value_type: self.to_string(),
                        path: path.to_string(),
                        expected: children.len(),
                        found: entries.len(),
                    });
                }
                for ((name, ty), entry) in children.into_iter().zip(entries) {
                    ty.check_mask_at(entry, &format!("{path}.{name}"))?;
                }
                Ok(())
            }
        }
    }
}
