use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered modulation class names. Index `i` is the `i`-th class directory of
/// the training partition in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassIndex {
    names: Vec<String>,
}

impl ClassIndex {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Reads the class directories of a partition.
    pub fn discover(partition_dir: &Path) -> Result<Self> {
        let names = class_directories(partition_dir)?;
        if names.is_empty() {
            return Err(Error::EmptyPartition(partition_dir.to_path_buf()));
        }

        Ok(Self { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }
}

/// Sorted names of the subdirectories of `partition_dir`.
pub(crate) fn class_directories(partition_dir: &Path) -> Result<Vec<String>> {
    if !partition_dir.is_dir() {
        return Err(Error::MissingPartition(partition_dir.to_path_buf()));
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(partition_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    Ok(names)
}
