//! Declarative annotation binding for provider-side settings.
//!
//! A provider describes which annotations it reads once, at construction
//! time, as a table of `{key, default, setter}` rows, then binds each
//! workload's annotations against it.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Writes one parsed annotation value into the target.
pub type Setter<T> = Box<dyn Fn(&mut T, &str) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Error)]
pub enum BindError {
    #[error("annotation '{0}' is required")]
    Missing(String),

    #[error("annotation '{key}' has invalid value '{value}': {cause:#}")]
    Invalid {
        key: String,
        value: String,
        cause: anyhow::Error,
    },
}

struct Binding<T> {
    key: String,
    default: Option<String>,
    setter: Setter<T>,
}

/// Ordered set of annotation bindings for a settings type `T`.
pub struct AnnotationTable<T> {
    bindings: Vec<Binding<T>>,
}

impl<T: Default> AnnotationTable<T> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Bind `key`; binding fails when the annotation is absent.
    pub fn required<F>(self, key: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut T, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(key.into(), None, Box::new(setter))
    }

    /// Bind `key`, feeding `default` to the setter when it is absent.
    pub fn optional<F>(self, key: impl Into<String>, default: impl Into<String>, setter: F) -> Self
    where
        F: Fn(&mut T, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.push(key.into(), Some(default.into()), Box::new(setter))
    }

    /// Annotation keys this table reads, without prefix.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|b| b.key.as_str())
    }

    /// Build a `T` from `annotations`, looking keys up under `prefix`.
    pub fn bind(&self, annotations: &HashMap<String, String>, prefix: &str) -> Result<T, BindError> {
        let mut target = T::default();
        for binding in &self.bindings {
            let key = format!("{prefix}{}", binding.key);
            let value = match (annotations.get(&key), &binding.default) {
                (Some(value), _) => value.as_str(),
                (None, Some(default)) => default.as_str(),
                (None, None) => return Err(BindError::Missing(key)),
            };
            (binding.setter)(&mut target, value).map_err(|cause| BindError::Invalid {
                key,
                value: value.to_string(),
                cause,
            })?;
        }
        Ok(target)
    }

    fn push(mut self, key: String, default: Option<String>, setter: Setter<T>) -> Self {
        self.bindings.push(Binding {
            key,
            default,
            setter,
        });
        self
    }
}

impl<T: Default> Default for AnnotationTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for AnnotationTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.bindings.iter().map(|b| (&b.key, &b.default)))
            .finish()
    }
}
