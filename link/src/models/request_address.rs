use serde::{Deserialize, Serialize};
use std::fmt;

/// Addresses one status variable (or method) on a module of a remote system.
///
/// Also used as the Binding Store key: equality and hashing cover all four
/// components, so two addresses only share a value slot when they are
/// identical. The display form is `sys|Mod_idx|name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestAddress {
    /// System ID
    pub sys: String,

    /// Module class name
    #[serde(rename = "mod")]
    pub module: String,

    /// 1-based module index
    pub index: u32,

    /// Status variable or method name
    pub name: String,
}

impl RequestAddress {
    pub fn new(
        sys: impl Into<String>,
        module: impl Into<String>,
        index: u32,
        name: impl Into<String>,
    ) -> Self {
        Self {
            sys: sys.into(),
            module: module.into(),
            index,
            name: name.into(),
        }
    }

    /// `Mod_idx` form of the module part.
    pub fn module_id(&self) -> String {
        format!("{}_{}", self.module, self.index)
    }
}

impl fmt::Display for RequestAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}_{}|{}", self.sys, self.module, self.index, self.name)
    }
}
