//! Module and Global Variables
//!
//! The module is the unit of compilation and the owner of every arena:
//! types, values (constants, arguments, globals and instructions), basic
//! blocks and functions. All other objects are referred to by handles
//! that stay valid for the module's lifetime.

use log::debug;
use rcg_common::{CodegenError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use crate::blocks::BlockData;
use crate::function::FunctionData;
use crate::values::{GlobalData, ValueData, ValueKind};
use crate::{Function, Type, TypeRegistry, Value};

/// Linkage types for global symbols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Linkage {
    External,            // Visible to other modules
    AvailableExternally,
    LinkOnceAny,
    LinkOnceOdr,
    WeakAny,
    WeakOdr,
    Appending,
    Internal,            // Only visible within this module (static)
    Private,             // Not visible in the symbol table
    ExternalWeak,
    Common,
}

impl Linkage {
    pub const ALL: [Linkage; 11] = [
        Linkage::External, Linkage::AvailableExternally, Linkage::LinkOnceAny,
        Linkage::LinkOnceOdr, Linkage::WeakAny, Linkage::WeakOdr, Linkage::Appending,
        Linkage::Internal, Linkage::Private, Linkage::ExternalWeak, Linkage::Common,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Linkage::External => "external",
            Linkage::AvailableExternally => "available_externally",
            Linkage::LinkOnceAny => "linkonce",
            Linkage::LinkOnceOdr => "linkonce_odr",
            Linkage::WeakAny => "weak",
            Linkage::WeakOdr => "weak_odr",
            Linkage::Appending => "appending",
            Linkage::Internal => "internal",
            Linkage::Private => "private",
            Linkage::ExternalWeak => "extern_weak",
            Linkage::Common => "common",
        }
    }

    /// Symbols other modules may reference
    pub fn is_externally_visible(self) -> bool {
        !matches!(self, Linkage::Internal | Linkage::Private)
    }
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Linkage {
    type Err = CodegenError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Linkage::ALL
            .into_iter()
            .find(|linkage| linkage.name() == s)
            .ok_or_else(|| CodegenError::argument(format!("unknown linkage '{s}'")))
    }
}

/// IR Module - represents a complete compilation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub(crate) name: String,
    /// Every type used by the module
    pub types: TypeRegistry,
    pub(crate) values: Vec<ValueData>,
    pub(crate) blocks: Vec<BlockData>,
    pub(crate) functions: Vec<FunctionData>,
    pub(crate) function_names: HashMap<String, Function>,
    pub(crate) globals: Vec<Value>,
    pub(crate) global_names: HashMap<String, Value>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        debug!("Creating module '{name}'");
        Self {
            name: name.to_string(),
            types: TypeRegistry::new(),
            values: Vec::new(),
            blocks: Vec::new(),
            functions: Vec::new(),
            function_names: HashMap::new(),
            globals: Vec::new(),
            global_names: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a module-level variable holding a `value_type`
    ///
    /// The returned value is a pointer to the storage. Re-adding an existing
    /// name returns the existing global when the types agree.
    pub fn add_global(&mut self, value_type: Type, name: &str) -> Result<Value> {
        if !self.types.is_sized(value_type) {
            return Err(CodegenError::argument(format!(
                "global '{name}' has unsized type {}",
                self.types.display(value_type)
            )));
        }
        if let Some(&existing) = self.global_names.get(name) {
            let existing_type = self.global_data(existing)?.value_type;
            if existing_type == value_type {
                return Ok(existing);
            }
            return Err(CodegenError::type_conflict(
                name,
                format!(
                    "global already declared as {}, requested {}",
                    self.types.display(existing_type),
                    self.types.display(value_type)
                ),
            ));
        }

        let ty = self.types.pointer(value_type);
        let global = self.push_value(
            ty,
            ValueKind::Global(GlobalData {
                value_type,
                initializer: None,
                linkage: Linkage::External,
                is_constant: false,
            }),
        );
        self.values[global.index()].name = Some(name.to_string());
        self.globals.push(global);
        self.global_names.insert(name.to_string(), global);
        debug!("Declared global '{name}' of type {}", self.types.display(value_type));
        Ok(global)
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.global_names.get(name).copied()
    }

    /// Globals in declaration order
    pub fn globals(&self) -> impl Iterator<Item = Value> + '_ {
        self.globals.iter().copied()
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    pub(crate) fn global_data(&self, global: Value) -> Result<&GlobalData> {
        match &self.values[global.index()].kind {
            ValueKind::Global(data) => Ok(data),
            _ => Err(CodegenError::argument("value is not a global variable")),
        }
    }

    fn global_data_mut(&mut self, global: Value) -> Result<&mut GlobalData> {
        match &mut self.values[global.index()].kind {
            ValueKind::Global(data) => Ok(data),
            _ => Err(CodegenError::argument("value is not a global variable")),
        }
    }

    /// Type of the storage a global points to
    pub fn global_value_type(&self, global: Value) -> Result<Type> {
        Ok(self.global_data(global)?.value_type)
    }

    pub fn initializer(&self, global: Value) -> Result<Option<Value>> {
        Ok(self.global_data(global)?.initializer)
    }

    /// Set the initial contents; must be a constant of the global's value type
    pub fn set_initializer(&mut self, global: Value, init: Value) -> Result<()> {
        let value_type = self.global_data(global)?.value_type;
        let init_data = &self.values[init.index()];
        if !init_data.is_constant() {
            return Err(CodegenError::argument("global initializer must be a constant"));
        }
        if init_data.ty != value_type {
            return Err(CodegenError::type_mismatch(
                self.types.display(value_type).to_string(),
                self.types.display(init_data.ty).to_string(),
            ));
        }
        self.global_data_mut(global)?.initializer = Some(init);
        Ok(())
    }

    pub fn global_linkage(&self, global: Value) -> Result<Linkage> {
        Ok(self.global_data(global)?.linkage)
    }

    pub fn set_global_linkage(&mut self, global: Value, linkage: Linkage) -> Result<()> {
        self.global_data_mut(global)?.linkage = linkage;
        Ok(())
    }

    pub fn is_global_constant(&self, global: Value) -> Result<bool> {
        Ok(self.global_data(global)?.is_constant)
    }

    pub fn set_global_constant(&mut self, global: Value, is_constant: bool) -> Result<()> {
        self.global_data_mut(global)?.is_constant = is_constant;
        Ok(())
    }

    /// Drop a global from the module; its handle must no longer be used
    pub fn remove_global(&mut self, global: Value) -> Result<()> {
        self.global_data(global)?;
        if let Some(name) = self.values[global.index()].name.clone() {
            self.global_names.remove(&name);
            debug!("Removed global '{name}'");
        }
        self.globals.retain(|&g| g != global);
        Ok(())
    }

    /// Internal constant global holding a NUL-terminated string
    pub fn global_string(&mut self, name: &str, text: &str) -> Result<Value> {
        let init = self.const_string(text, true)?;
        let ty = self.values[init.index()].ty;
        let global = self.add_global(ty, name)?;
        self.set_initializer(global, init)?;
        self.set_global_linkage(global, Linkage::Internal)?;
        self.set_global_constant(global, true)?;
        Ok(global)
    }
}
