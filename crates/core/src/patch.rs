#![forbid(unsafe_code)]

use crate::record::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// A single field-level operation in jsonpatch wire shape.
///
/// Paths address exactly one column: `/title`, `/work_id`. Nested paths are
/// rejected at application time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatchError {
    InvalidPath { path: String },
    MissingPath { path: String },
    TestFailed { path: String },
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath { path } => write!(f, "invalid patch path: {path}"),
            Self::MissingPath { path } => write!(f, "patch path does not exist: {path}"),
            Self::TestFailed { path } => write!(f, "patch test failed at {path}"),
        }
    }
}

impl std::error::Error for PatchError {}

pub fn column_path(column: &str) -> String {
    format!("/{column}")
}

fn column_of(path: &str) -> Result<&str, PatchError> {
    let column = path.strip_prefix('/').ok_or_else(|| PatchError::InvalidPath {
        path: path.to_string(),
    })?;
    if column.is_empty() || column.contains('/') {
        return Err(PatchError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(column)
}

/// An ordered sequence of operations transforming one record into another.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<PatchOp>,
}

impl Patch {
    pub fn new(ops: Vec<PatchOp>) -> Self {
        Self { ops }
    }

    pub fn ops(&self) -> &[PatchOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn push(&mut self, op: PatchOp) {
        self.ops.push(op);
    }

    /// Rewrites the value carried by the first `add`, `replace`, or `test`
    /// operation addressing `path`. Returns false when no such operation
    /// exists.
    pub fn set_value_at(&mut self, path: &str, value: Value) -> bool {
        for op in &mut self.ops {
            match op {
                PatchOp::Add { path: p, value: v }
                | PatchOp::Replace { path: p, value: v }
                | PatchOp::Test { path: p, value: v }
                    if p == path =>
                {
                    *v = value;
                    return true;
                }
                _ => {}
            }
        }
        false
    }

    /// Computes the minimal ordered operation sequence transforming `before`
    /// into `after`. `None` stands for the empty baseline of a creation.
    ///
    /// Columns only in `before` become `remove`, changed columns become
    /// `replace`, columns only in `after` become `add`, all in column order.
    pub fn diff(before: Option<&Record>, after: &Record) -> Self {
        let empty = Record::new();
        let before = before.unwrap_or(&empty);

        let mut columns: BTreeSet<&str> = before.columns().collect();
        columns.extend(after.columns());

        let mut ops = Vec::new();
        for column in columns {
            match (before.get(column), after.get(column)) {
                (Some(_), None) => ops.push(PatchOp::Remove {
                    path: column_path(column),
                }),
                (Some(old), Some(new)) if old != new => ops.push(PatchOp::Replace {
                    path: column_path(column),
                    value: new.clone(),
                }),
                (None, Some(new)) => ops.push(PatchOp::Add {
                    path: column_path(column),
                    value: new.clone(),
                }),
                _ => {}
            }
        }

        Self { ops }
    }

    /// Applies the operations in order to a copy of `target`.
    ///
    /// The original is never touched, so a failure partway leaves no partial
    /// application behind. `remove`, `replace`, `test`, and the source side
    /// of `move`/`copy` require the path to exist.
    pub fn apply(&self, target: &Record) -> Result<Record, PatchError> {
        let mut out = target.clone();
        for op in &self.ops {
            match op {
                PatchOp::Add { path, value } => {
                    out.set(column_of(path)?, value.clone());
                }
                PatchOp::Remove { path } => {
                    let column = column_of(path)?;
                    if out.remove(column).is_none() {
                        return Err(PatchError::MissingPath { path: path.clone() });
                    }
                }
                PatchOp::Replace { path, value } => {
                    let column = column_of(path)?;
                    if !out.contains(column) {
                        return Err(PatchError::MissingPath { path: path.clone() });
                    }
                    out.set(column, value.clone());
                }
                PatchOp::Move { from, path } => {
                    let source = column_of(from)?;
                    let Some(value) = out.remove(source) else {
                        return Err(PatchError::MissingPath { path: from.clone() });
                    };
                    out.set(column_of(path)?, value);
                }
                PatchOp::Copy { from, path } => {
                    let source = column_of(from)?;
                    let Some(value) = out.get(source).cloned() else {
                        return Err(PatchError::MissingPath { path: from.clone() });
                    };
                    out.set(column_of(path)?, value);
                }
                PatchOp::Test { path, value } => {
                    let column = column_of(path)?;
                    if out.get(column) != Some(value) {
                        return Err(PatchError::TestFailed { path: path.clone() });
                    }
                }
            }
        }
        Ok(out)
    }
}
