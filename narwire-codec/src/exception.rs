// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{CodecError, Result};
use crate::value::Value;

/// An error raised on the other end of the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteException {
    pub module: String,
    pub type_name: String,
    pub args: Vec<Value>,
    pub message: String,
    pub traceback: Vec<String>,
}

impl RemoteException {
    /// The message is derived from `args` the way a fresh exception object
    /// renders itself: empty without args, the single argument as text, or
    /// the tuple of all arguments.
    pub fn new(module: impl Into<String>, type_name: impl Into<String>, args: Vec<Value>) -> Self {
        let message = match args.as_slice() {
            [] => String::new(),
            [Value::String(s)] => s.clone(),
            [arg] => arg.to_string(),
            args => {
                let items: Vec<String> = args.iter().map(Value::to_string).collect();
                format!("({})", items.join(", "))
            }
        };
        RemoteException {
            module: module.into(),
            type_name: type_name.into(),
            args,
            message,
            traceback: Vec::new(),
        }
    }

    pub fn with_traceback(mut self, traceback: Vec<String>) -> Self {
        self.traceback = traceback;
        self
    }

    /// `module.Type`, or just `Type` for builtins.
    pub fn qualified_name(&self) -> String {
        if self.module == BUILTINS {
            self.type_name.clone()
        } else {
            format!("{}.{}", self.module, self.type_name)
        }
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())?;
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteException {}

pub const BUILTINS: &str = "builtins";

const BUILTIN_EXCEPTIONS: &[&str] = &[
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "ConnectionError",
    "Exception",
    "FileExistsError",
    "FileNotFoundError",
    "IndexError",
    "KeyError",
    "LookupError",
    "NotImplementedError",
    "OSError",
    "OverflowError",
    "PermissionError",
    "RuntimeError",
    "StopIteration",
    "TimeoutError",
    "TypeError",
    "ValueError",
    "ZeroDivisionError",
];

pub type ConstructFn =
    Arc<dyn Fn(Vec<Value>) -> std::result::Result<RemoteException, String> + Send + Sync>;

/// Exception classes a decoder is allowed to rebuild, keyed by
/// `(module, type)`.
///
/// Both ends must agree on the registered classes and on the arguments
/// their constructors take. An exception sent by a peer whose class is not
/// registered here fails to decode with [`CodecError::UnknownException`].
#[derive(Clone)]
pub struct ExceptionRegistry {
    constructors: BTreeMap<(String, String), ConstructFn>,
}

impl ExceptionRegistry {
    pub fn empty() -> Self {
        ExceptionRegistry {
            constructors: BTreeMap::new(),
        }
    }

    /// Register a class whose constructor validates `args`. An `Err`
    /// carries the reason the arguments were rejected.
    pub fn register<F>(&mut self, module: &str, type_name: &str, construct: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> std::result::Result<RemoteException, String> + Send + Sync + 'static,
    {
        self.constructors.insert(
            (module.to_owned(), type_name.to_owned()),
            Arc::new(construct),
        );
        self
    }

    /// Register a class that accepts any arguments.
    pub fn register_class(&mut self, module: &str, type_name: &str) -> &mut Self {
        let (m, t) = (module.to_owned(), type_name.to_owned());
        self.register(module, type_name, move |args| {
            Ok(RemoteException::new(m.clone(), t.clone(), args))
        })
    }

    pub fn contains(&self, module: &str, type_name: &str) -> bool {
        self.constructors
            .contains_key(&(module.to_owned(), type_name.to_owned()))
    }

    pub fn construct(&self, module: &str, type_name: &str, args: Vec<Value>) -> Result<RemoteException> {
        let key = (module.to_owned(), type_name.to_owned());
        let construct = self
            .constructors
            .get(&key)
            .ok_or_else(|| CodecError::UnknownException {
                module: module.to_owned(),
                type_name: type_name.to_owned(),
            })?;
        construct(args).map_err(|reason| CodecError::ExceptionConstruction {
            module: module.to_owned(),
            type_name: type_name.to_owned(),
            reason,
        })
    }
}

/// Knows the common builtin exception classes.
impl Default for ExceptionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        for name in BUILTIN_EXCEPTIONS {
            registry.register_class(BUILTINS, name);
        }
        registry
    }
}

impl fmt::Debug for ExceptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}
