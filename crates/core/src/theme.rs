// Copyright 2024 Paul Adamson
// Licensed under the Apache License, Version 2.0

//! Theme modules: named containers of styling variables.
//!
//! A theme module is a named set of `variable -> value` entries consumed by
//! a rendering or styling layer. Two variants share the read-only interface:
//!
//! - [`StaticThemeModule`] is frozen at construction
//! - [`DynamicThemeModule`] may be mutated at runtime
//!
//! [`ThemeModule`] is the sum of the two. Obtaining the dynamic capability
//! is an explicit check ([`ThemeModule::as_dynamic`]), never a cast; a
//! static module reports the conversion as unsupported.
//!
//! Presence and value are distinct: a key stored with `Value::Null` is
//! *defined but empty*, while an absent key is *not defined*.
//! [`has_var`](ThemeModule::has_var) answers presence,
//! [`get_var`](ThemeModule::get_var) answers value.

use serde_json::Value;
use std::collections::HashMap;
use themelink_runtime::{Error, Result};

/// Named variable store frozen at construction.
#[derive(Debug, Clone)]
pub struct StaticThemeModule {
    name: String,
    vars: HashMap<String, Value>,
}

impl StaticThemeModule {
    /// Creates a module with the given name and variables.
    pub fn new(name: impl Into<String>, vars: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            vars,
        }
    }

    /// Name of the module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of a variable, or `None` if it is not defined.
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Checks if a variable is defined in the module; variables with a null
    /// value are treated as defined.
    pub fn has_var(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }
}

/// Named variable store that supports runtime mutation.
#[derive(Debug, Clone)]
pub struct DynamicThemeModule {
    name: String,
    vars: HashMap<String, Value>,
}

impl DynamicThemeModule {
    /// Creates an empty module with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_vars(name, HashMap::new())
    }

    /// Creates a module pre-populated with variables.
    pub fn with_vars(name: impl Into<String>, vars: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            vars,
        }
    }

    /// Name of the module.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value of a variable, or `None` if it is not defined.
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Checks if a variable is defined in the module; variables with a null
    /// value are treated as defined.
    pub fn has_var(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// Updates the value of a variable.
    ///
    /// Passing `None` removes the variable from the module rather than
    /// storing a null entry; an empty-but-defined variable is written with
    /// `Some(Value::Null)`. There is no existence check: updating a
    /// variable that was never defined inserts it.
    pub fn update_var(&mut self, key: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                self.vars.insert(key.to_string(), value);
            }
            None => {
                self.vars.remove(key);
            }
        }
    }
}

/// A theme module of either mutability.
#[derive(Debug, Clone)]
pub enum ThemeModule {
    /// Variables frozen at construction.
    Static(StaticThemeModule),
    /// Variables mutable at runtime.
    Dynamic(DynamicThemeModule),
}

impl ThemeModule {
    /// Name of the module.
    pub fn name(&self) -> &str {
        match self {
            ThemeModule::Static(module) => module.name(),
            ThemeModule::Dynamic(module) => module.name(),
        }
    }

    /// Returns the value of a variable, or `None` if it is not defined.
    pub fn get_var(&self, key: &str) -> Option<&Value> {
        match self {
            ThemeModule::Static(module) => module.get_var(key),
            ThemeModule::Dynamic(module) => module.get_var(key),
        }
    }

    /// Checks if a variable is defined in the module; variables with a null
    /// value are treated as defined.
    pub fn has_var(&self, key: &str) -> bool {
        match self {
            ThemeModule::Static(module) => module.has_var(key),
            ThemeModule::Dynamic(module) => module.has_var(key),
        }
    }

    /// Returns whether this module is a dynamic module.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, ThemeModule::Dynamic(_))
    }

    /// Returns the dynamic capability of this module.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnsupportedOperation`] when the module is not
    /// dynamic; no implicit conversion exists.
    pub fn as_dynamic(&self) -> Result<&DynamicThemeModule> {
        match self {
            ThemeModule::Dynamic(module) => Ok(module),
            ThemeModule::Static(_) => Err(Error::UnsupportedOperation(
                "no dynamic conversion exists for this module",
            )),
        }
    }

    /// Mutable counterpart of [`as_dynamic`](Self::as_dynamic).
    pub fn as_dynamic_mut(&mut self) -> Result<&mut DynamicThemeModule> {
        match self {
            ThemeModule::Dynamic(module) => Ok(module),
            ThemeModule::Static(_) => Err(Error::UnsupportedOperation(
                "no dynamic conversion exists for this module",
            )),
        }
    }
}

impl From<StaticThemeModule> for ThemeModule {
    fn from(module: StaticThemeModule) -> Self {
        ThemeModule::Static(module)
    }
}

impl From<DynamicThemeModule> for ThemeModule {
    fn from(module: DynamicThemeModule) -> Self {
        ThemeModule::Dynamic(module)
    }
}
