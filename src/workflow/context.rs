//! Workflow context
//!
//! String-keyed bag of JSON values flowing through a saga run. A step's
//! output lands here so later steps and compensations can read it.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

use super::error::WorkflowError;

/// Mutable context shared by the steps of one saga run.
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    values: HashMap<String, serde_json::Value>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a serializable value under `key`, replacing any prior value.
    pub fn put<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), WorkflowError> {
        self.values
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Read a typed value. Missing key is an error; use `get_opt` when
    /// the key may legitimately be absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, WorkflowError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| WorkflowError::MissingContext(key.to_string()))?;
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Read a typed value if present.
    pub fn get_opt<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WorkflowError> {
        match self.values.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Raw snapshot of the context, for diagnostics.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}
