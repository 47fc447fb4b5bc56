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

use crate::error::{Error, ErrorInfo, EvalResult};
use crate::scope::ScopedNames;
use crate::value::Value;

/// Node budget used when the host does not pick one.
pub const DEFAULT_MAX_OPS: usize = 100;

/// Mutable state of one evaluation: the scope stack and the op budget.
///
/// States are cheap and single-use; hosts wanting concurrent evaluations
/// create one per evaluation.
#[derive(Debug)]
pub struct VmState {
    pub names: ScopedNames,
    ops_evaluated: usize,
    max_ops: usize,
}

impl VmState {
    pub fn new(names: ScopedNames, max_ops: usize) -> Self {
        Self {
            names,
            ops_evaluated: 0,
            max_ops,
        }
    }

    pub fn ops_evaluated(&self) -> usize {
        self.ops_evaluated
    }

    /// Account for one AST node about to be evaluated. Every node entry
    /// goes through here, so no subtree can dodge the budget.
    pub fn tick(&mut self) -> EvalResult<()> {
        self.ops_evaluated += 1;
        if self.ops_evaluated >= self.max_ops {
            Err(Error::new(ErrorInfo::OpsLimitExceeded(self.max_ops)))
        } else {
            Ok(())
        }
    }

    /// Run `f` inside a fresh scope frame, popping it again no matter how
    /// `f` exits. Lambda calls go through here.
    pub fn in_scope<R>(
        &mut self,
        frame: HashMap<String, Value>,
        f: impl FnOnce(&mut VmState) -> R,
    ) -> R {
        self.names.push_scope(frame);
        let result = f(self);
        self.names.pop_scope();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_is_enforced() {
        let mut state = VmState::new(ScopedNames::new(HashMap::new()), 3);
        assert!(state.tick().is_ok());
        assert!(state.tick().is_ok());
        let err = state.tick().unwrap_err();
        assert_eq!(err.info(), &ErrorInfo::OpsLimitExceeded(3));
    }

    #[test]
    fn scope_is_popped_on_error_too() {
        let mut state = VmState::new(ScopedNames::new(HashMap::new()), 100);
        let result: EvalResult<()> = state.in_scope(HashMap::new(), |state| {
            state.names.set("tmp", Value::from(1));
            Err(Error::new(ErrorInfo::DivisionByZero))
        });
        assert!(result.is_err());
        assert_eq!(state.names.lookup("tmp"), None);
    }
}
