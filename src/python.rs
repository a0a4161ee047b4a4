//! Embedded Python engine
//!
//! Every handle runs against its own globals dictionary, which plays the role
//! of the interpreter's persistent namespace. The dictionary is owned by the
//! thread that created the handle.

use crate::engine::{Engine, EngineFactory, EngineValue};
use crate::error::EngineError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyDict, PyFloat, PyList, PyLong, PyString, PyTuple};
use std::marker::PhantomData;
use std::path::PathBuf;

fn engine_error(py: Python<'_>, err: &PyErr) -> EngineError {
    let type_name = err
        .get_type_bound(py)
        .name()
        .map_or_else(|_| "Exception".to_string(), |n| n.to_string());
    EngineError::new(format!("{type_name}: {}", err.value_bound(py)))
}

fn to_engine_value(value: &Bound<'_, PyAny>) -> Result<EngineValue, EngineError> {
    let py = value.py();
    if value.is_none() {
        return Ok(EngineValue::None);
    }
    if let Ok(b) = value.downcast::<PyBool>() {
        return Ok(EngineValue::Bool(b.is_true()));
    }
    if value.is_instance_of::<PyLong>() {
        return value
            .extract::<i64>()
            .map(EngineValue::Int)
            .map_err(|e| engine_error(py, &e));
    }
    if let Ok(f) = value.downcast::<PyFloat>() {
        return Ok(EngineValue::Float(f.value()));
    }
    if let Ok(s) = value.downcast::<PyString>() {
        return s
            .to_str()
            .map(|s| EngineValue::Str(s.to_string()))
            .map_err(|e| engine_error(py, &e));
    }
    if let Ok(list) = value.downcast::<PyList>() {
        return list
            .iter()
            .map(|item| to_engine_value(&item))
            .collect::<Result<_, _>>()
            .map(EngineValue::List);
    }
    if let Ok(tuple) = value.downcast::<PyTuple>() {
        return tuple
            .iter()
            .map(|item| to_engine_value(&item))
            .collect::<Result<_, _>>()
            .map(EngineValue::List);
    }
    Ok(EngineValue::Other(value.get_type().to_string()))
}

pub struct PythonEngine {
    globals: Py<PyDict>,
    // Keeps the handle on its creating thread.
    _thread_bound: PhantomData<*const ()>,
}

impl Engine for PythonEngine {
    fn eval(&mut self, statement: &str) -> Result<(), EngineError> {
        Python::with_gil(|py| {
            py.run_bound(statement, Some(self.globals.bind(py)), None)
                .map_err(|e| engine_error(py, &e))
        })
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), EngineError> {
        Python::with_gil(|py| {
            self.globals
                .bind(py)
                .set_item(name, value)
                .map_err(|e| engine_error(py, &e))
        })
    }

    fn get_value(&mut self, name: &str) -> Result<EngineValue, EngineError> {
        Python::with_gil(|py| {
            let value = self
                .globals
                .bind(py)
                .get_item(name)
                .map_err(|e| engine_error(py, &e))?
                .ok_or_else(|| EngineError::new(format!("NameError: name '{name}' is not defined")))?;
            to_engine_value(&value)
        })
    }

    fn unbind(&mut self, name: &str) -> Result<(), EngineError> {
        Python::with_gil(|py| {
            self.globals
                .bind(py)
                .del_item(name)
                .map_err(|e| engine_error(py, &e))
        })
    }

    fn close(&mut self) -> Result<(), EngineError> {
        Python::with_gil(|py| self.globals.bind(py).clear());
        Ok(())
    }
}

/// Creates [`PythonEngine`] handles, adding `search_paths` to `sys.path`
#[derive(Debug, Clone, Default)]
pub struct PythonEngineFactory {
    search_paths: Vec<PathBuf>,
}

impl PythonEngineFactory {
    #[must_use]
    pub const fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }
}

impl EngineFactory for PythonEngineFactory {
    fn create(&self) -> Result<Box<dyn Engine>, EngineError> {
        Python::with_gil(|py| {
            let sys_path = py
                .import_bound("sys")
                .and_then(|sys| sys.getattr("path"))
                .map_err(|e| engine_error(py, &e))?;
            for path in &self.search_paths {
                let path = path.to_string_lossy();
                let present = sys_path
                    .contains(&*path)
                    .map_err(|e| engine_error(py, &e))?;
                if !present {
                    sys_path
                        .call_method1("insert", (0, &*path))
                        .map_err(|e| engine_error(py, &e))?;
                }
            }

            let engine: Box<dyn Engine> = Box::new(PythonEngine {
                globals: PyDict::new_bound(py).unbind(),
                _thread_bound: PhantomData,
            });
            Ok(engine)
        })
    }
}
