// smartquery -- an embeddable expression language
// Copyright (C) 2021  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::collections::HashMap;

use log::warn;

use crate::value::Value;

/// A stack of name→value frames forming the lexical scopes.
///
/// Reads walk from the innermost frame outwards and return the first hit;
/// plain writes always target the innermost frame. The bottom frame holds
/// the built-in functions, the frame above it the names supplied by the
/// host, and lambda calls push one frame per call.
#[derive(Debug)]
pub struct ScopedNames {
    scopes: Vec<HashMap<String, Value>>,
}

impl ScopedNames {
    pub fn new(globals: HashMap<String, Value>) -> Self {
        Self {
            scopes: vec![globals],
        }
    }

    pub fn push_scope(&mut self, frame: HashMap<String, Value>) {
        self.scopes.push(frame);
    }

    /// Remove and return the innermost frame. The outermost frame stays.
    pub fn pop_scope(&mut self) -> Option<HashMap<String, Value>> {
        if self.scopes.len() == 1 {
            warn!("trying to pop outermost scope");
            return None;
        }
        self.scopes.pop()
    }

    /// Innermost-first lookup.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    /// Bind in the innermost frame, shadowing any outer binding.
    pub fn set(&mut self, name: &str, value: Value) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), value);
    }

    /// Replace an existing binding in the scope where lookup finds it.
    /// Returns false when the name is bound nowhere.
    pub fn update(&mut self, name: &str, value: Value) -> bool {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(slot) = scope.get_mut(name) {
                *slot = value;
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_outer() {
        let mut globals = HashMap::new();
        globals.insert("x".to_string(), Value::from(1));
        let mut names = ScopedNames::new(globals);
        names.push_scope(HashMap::new());
        names.set("x", Value::from(2));
        assert_eq!(names.lookup("x"), Some(Value::from(2)));
        names.pop_scope();
        assert_eq!(names.lookup("x"), Some(Value::from(1)));
    }

    #[test]
    fn update_hits_the_defining_scope() {
        let mut globals = HashMap::new();
        globals.insert("x".to_string(), Value::from(1));
        let mut names = ScopedNames::new(globals);
        names.push_scope(HashMap::new());
        assert!(names.update("x", Value::from(5)));
        names.pop_scope();
        assert_eq!(names.lookup("x"), Some(Value::from(5)));
        assert!(!names.update("missing", Value::Null));
    }

    #[test]
    fn outermost_scope_stays_put() {
        let mut names = ScopedNames::new(HashMap::new());
        assert!(names.pop_scope().is_none());
        names.set("x", Value::from(1));
        assert_eq!(names.lookup("x"), Some(Value::from(1)));
    }
}
