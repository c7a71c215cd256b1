//! Named functions referenced from annotations as `$(name)`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::value::{DefaultValue, FieldValue};

/// Produces a default for the field whose name is passed in.
pub type DefaultFunc = Arc<dyn Fn(&str) -> DefaultValue + Send + Sync>;

/// Checks a field's current value; receives the value and the field name.
pub type TestFunc = Arc<dyn for<'a> Fn(&FieldValue<'a>, &str) -> bool + Send + Sync>;

/// Two independent tables: default providers and test predicates.
///
/// Registering a name again replaces the earlier function. There is no
/// removal; build a fresh registry (or [`Tagfig::reset`](crate::Tagfig::reset))
/// instead.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    defaults: HashMap<String, DefaultFunc>,
    tests: HashMap<String, TestFunc>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_default_func<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&str) -> DefaultValue + Send + Sync + 'static,
    {
        tracing::debug!(name, "registered default func");
        self.defaults.insert(name.to_string(), Arc::new(f));
    }

    pub fn register_test_func<F>(&mut self, name: &str, f: F)
    where
        F: for<'a> Fn(&FieldValue<'a>, &str) -> bool + Send + Sync + 'static,
    {
        tracing::debug!(name, "registered test func");
        self.tests.insert(name.to_string(), Arc::new(f));
    }

    pub fn default_func(&self, name: &str) -> Option<&DefaultFunc> {
        self.defaults.get(name)
    }

    pub fn test_func(&self, name: &str) -> Option<&TestFunc> {
        self.tests.get(name)
    }

    pub fn clear(&mut self) {
        self.defaults.clear();
        self.tests.clear();
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut defaults: Vec<_> = self.defaults.keys().collect();
        let mut tests: Vec<_> = self.tests.keys().collect();
        defaults.sort();
        tests.sort();
        f.debug_struct("FunctionRegistry")
            .field("defaults", &defaults)
            .field("tests", &tests)
            .finish()
    }
}
