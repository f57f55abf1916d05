// SPDX-License-Identifier: Apache-2.0

use crate::Area;

/// A fence: a named, possibly rectilinear area. Cells whose `region` names
/// this fence must be placed inside it, and no other cell may be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub area: Area,
}

impl Region {
    pub fn new(name: impl AsRef<str>, area: impl Into<Area>) -> Self {
        Region {
            name: name.as_ref().to_string(),
            area: area.into(),
        }
    }
}
