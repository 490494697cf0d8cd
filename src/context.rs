use crate::error::ConfigError;
use crate::value::{Function, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Arc<Frame>>,
}

/// Name → value environment for template expressions.
///
/// Contexts form a persistent scope chain: [`Context::child`] adds a frame on
/// top of a shared parent instead of copying it, so a loop body can bind its
/// variable without the parent or any sibling iteration seeing it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    frame: Arc<Frame>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` in this context's own frame. Other handles to the same
    /// frame (children already created, clones) are unaffected.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        Arc::make_mut(&mut self.frame)
            .bindings
            .insert(name.into(), value.into());
    }

    pub fn set_function<F>(&mut self, name: &str, call: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.set_var(name, Function::new(name, call));
    }

    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_var(name, value);
        self
    }

    /// A new context where `name` is bound to `value` and every other name
    /// resolves through `self`.
    pub fn child(&self, name: impl Into<String>, value: impl Into<Value>) -> Context {
        let mut bindings = HashMap::with_capacity(1);
        bindings.insert(name.into(), value.into());
        Context {
            frame: Arc::new(Frame {
                bindings,
                parent: Some(Arc::clone(&self.frame)),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut frame = Some(&self.frame);
        while let Some(current) = frame {
            if let Some(value) = current.bindings.get(name) {
                return Some(value);
            }
            frame = current.parent.as_ref();
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        match value {
            serde_json::Value::Object(map) => Ok(Self::from(map)),
            _ => Err(ConfigError::ContextNotObject),
        }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Context {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Context::new();
        for (name, value) in iter {
            context.set_var(name, value);
        }
        context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn child_shadows_without_touching_parent() {
        let parent = Context::new().with_var("x", 1).with_var("y", 2);
        let child = parent.child("x", 10);
        assert_eq!(child.get("x"), Some(&Value::from(10)));
        assert_eq!(child.get("y"), Some(&Value::from(2)));
        assert_eq!(parent.get("x"), Some(&Value::from(1)));
    }

    #[test]
    fn siblings_do_not_see_each_other() {
        let parent = Context::new();
        let a = parent.child("a", 1);
        let b = parent.child("b", 2);
        assert!(!a.contains("b"));
        assert!(!b.contains("a"));
        assert!(!parent.contains("a"));
    }

    #[test]
    fn setting_on_a_parent_after_branching_is_copy_on_write() {
        let mut parent = Context::new().with_var("x", 1);
        let child = parent.child("y", 2);
        parent.set_var("x", 5);
        assert_eq!(child.get("x"), Some(&Value::from(1)));
        assert_eq!(parent.get("x"), Some(&Value::from(5)));
    }

    #[test]
    fn json_objects_become_contexts() {
        let ctx = Context::from_json(json!({ "name": "Mark", "xs": [1, 2] })).unwrap();
        assert_eq!(ctx.get("name"), Some(&Value::from("Mark")));
        assert!(Context::from_json(json!([1])).is_err());
    }
}
