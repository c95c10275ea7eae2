use crate::value::MapValue;

/// One queued write against a single document.
///
/// Operations are created when queued on a [`WriteBatch`](super::WriteBatch)
/// or [`Transaction`](super::Transaction) and consumed once at commit time.
#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    /// Full insert or replace of the document at `path`.
    Create { path: String, data: MapValue },
    /// Overwrite of the document at `path`; with `merge` only the top-level
    /// keys of `data` are written.
    Update {
        path: String,
        data: MapValue,
        merge: bool,
    },
    Delete { path: String },
}

impl Operation {
    pub fn create(path: impl Into<String>, data: MapValue) -> Self {
        Operation::Create {
            path: path.into(),
            data,
        }
    }

    pub fn update(path: impl Into<String>, data: MapValue, merge: bool) -> Self {
        Operation::Update {
            path: path.into(),
            data,
            merge,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Operation::Delete { path: path.into() }
    }

    /// Fully-qualified path of the targeted document.
    pub fn path(&self) -> &str {
        match self {
            Operation::Create { path, .. }
            | Operation::Update { path, .. }
            | Operation::Delete { path } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Create { .. } => "create",
            Operation::Update { .. } => "update",
            Operation::Delete { .. } => "delete",
        }
    }
}
