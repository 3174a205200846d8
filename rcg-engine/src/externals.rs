//! Host functions callable from IR
//!
//! A call to a function that only has a declaration is resolved here by
//! name. The default table carries a handful of C library routines.

use log::debug;
use rcg_common::{CodegenError, Result};
use std::collections::HashMap;
use crate::GenericValue;

/// Host implementation of an external symbol
pub type ExternalFn = Box<dyn Fn(&[GenericValue]) -> Result<GenericValue> + Send + Sync>;

/// Symbol table of host functions
pub struct Externals {
    table: HashMap<String, ExternalFn>,
}

impl Default for Externals {
    fn default() -> Self {
        let mut externals = Externals::empty();
        for name in ["abs", "labs", "llabs"] {
            externals.register(name, |args| {
                let arg = single(name, args)?;
                match arg {
                    GenericValue::Int { bits, .. } => {
                        let value = arg.to_i64().unwrap_or_default();
                        Ok(GenericValue::from_int(value.wrapping_abs(), bits))
                    }
                    other => Err(bad_argument(name, &other)),
                }
            });
        }
        let unary: [(&str, fn(f64) -> f64); 10] = [
            ("fabs", f64::abs),
            ("sin", f64::sin),
            ("cos", f64::cos),
            ("tan", f64::tan),
            ("sqrt", f64::sqrt),
            ("exp", f64::exp),
            ("log", f64::ln),
            ("floor", f64::floor),
            ("ceil", f64::ceil),
            ("round", f64::round),
        ];
        for (name, op) in unary {
            externals.register(name, move |args| {
                let x = double(name, single(name, args)?)?;
                Ok(GenericValue::Double(op(x)))
            });
        }
        externals.register("pow", |args| match args {
            [base, exponent] => Ok(GenericValue::Double(
                double("pow", *base)?.powf(double("pow", *exponent)?),
            )),
            _ => Err(arity("pow", 2, args.len())),
        });
        externals
    }
}

impl Externals {
    /// Table without any host functions
    pub fn empty() -> Self {
        Self { table: HashMap::new() }
    }

    /// Add or replace a host function
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[GenericValue]) -> Result<GenericValue> + Send + Sync + 'static,
    {
        debug!("Registering external '{name}'");
        self.table.insert(name.to_string(), Box::new(function));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.table.keys().map(String::as_str)
    }

    pub fn call(&self, name: &str, args: &[GenericValue]) -> Result<GenericValue> {
        let function = self
            .table
            .get(name)
            .ok_or_else(|| CodegenError::execution(format!("unresolved external function '{name}'")))?;
        function(args)
    }
}

fn arity(name: &str, expected: usize, found: usize) -> CodegenError {
    CodegenError::execution(format!("external '{name}' expects {expected} arguments, got {found}"))
}

fn bad_argument(name: &str, arg: &GenericValue) -> CodegenError {
    CodegenError::execution(format!("external '{name}' cannot take {arg:?}"))
}

fn single(name: &str, args: &[GenericValue]) -> Result<GenericValue> {
    match args {
        [arg] => Ok(*arg),
        _ => Err(arity(name, 1, args.len())),
    }
}

fn double(name: &str, arg: GenericValue) -> Result<f64> {
    match arg {
        GenericValue::Double(v) => Ok(v),
        GenericValue::Float(v) => Ok(f64::from(v)),
        other => Err(bad_argument(name, &other)),
    }
}
