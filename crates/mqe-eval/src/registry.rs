use std::collections::BTreeMap;

use crate::error::{EvalError, Result};
use crate::function::MetricFunction;

/// Functions by name.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    functions: BTreeMap<String, MetricFunction>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names must be non-empty and unique.
    pub fn register(&mut self, function: MetricFunction) -> Result<()> {
        let name = function.name();
        if name.is_empty() {
            return Err(EvalError::Registration(
                "function name must not be empty".to_string(),
            ));
        }
        if self.functions.contains_key(name) {
            return Err(EvalError::Registration(format!(
                "function `{name}` is already registered"
            )));
        }
        self.functions.insert(name.to_string(), function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MetricFunction> {
        self.functions.get(name)
    }

    /// Registered names in sorted order.
    pub fn all(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn constant(name: &str) -> MetricFunction {
        MetricFunction::new(name, 0, Some(0), false, |_, _, _| Ok(Value::Scalar(1.0)))
    }

    #[test]
    fn names_are_unique_and_sorted() {
        let mut registry = Registry::new();
        registry.register(constant("b")).unwrap();
        registry.register(constant("a")).unwrap();
        assert!(matches!(
            registry.register(constant("a")),
            Err(EvalError::Registration(_))
        ));
        assert!(matches!(
            registry.register(constant("")),
            Err(EvalError::Registration(_))
        ));
        assert_eq!(registry.all(), vec!["a", "b"]);
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());
    }
}
