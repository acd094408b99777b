//! Recursive tree interpretation with per-individual resource ceilings.
//!
//! An [`ExecContext`] is built once per individual and reused for every
//! fitness case, so node and time budgets cover the individual's whole
//! evaluation, including nested ADF and module calls.

use crate::error::{EvalError, EvalResult, ResourceKind};
use crate::gp::context::CallStack;
use crate::gp::individual::Individual;
use crate::gp::tree::{Tree, child_index_in};
use crate::gp::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Nodes executed between two wall-clock checks.
const TIME_CHECK_INTERVAL: u64 = 256;

/// Ceilings on one individual's evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Maximum primitive executions, or unbounded.
    pub max_nodes: Option<u64>,
    /// Maximum wall-clock time, or unbounded.
    pub max_time: Option<Duration>,
    /// Maximum nesting of tree invocations.
    pub max_call_depth: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_nodes: None,
            max_time: None,
            max_call_depth: 64,
        }
    }
}

/// Evaluation state threaded through every primitive execution.
#[derive(Debug)]
pub struct ExecContext<'a> {
    individual: &'a Individual,
    tree_index: usize,
    inputs: Vec<Value>,
    limits: ExecutionLimits,
    executed: u64,
    started: Instant,
    frames: Vec<Vec<Value>>,
    call_stack: CallStack,
}

impl<'a> ExecContext<'a> {
    /// Create a context with tree 0 of `individual` active.
    #[must_use]
    pub fn new(individual: &'a Individual, limits: ExecutionLimits) -> Self {
        Self {
            individual,
            tree_index: 0,
            inputs: Vec::new(),
            limits,
            executed: 0,
            started: Instant::now(),
            frames: Vec::new(),
            call_stack: CallStack::with_capacity(32),
        }
    }

    /// Bind the input slots read by variables.
    pub fn set_inputs(&mut self, inputs: &[Value]) {
        self.inputs.clear();
        self.inputs.extend_from_slice(inputs);
    }

    /// Value bound to input `slot`.
    #[must_use]
    pub fn input(&self, slot: usize) -> Option<Value> {
        self.inputs.get(slot).copied()
    }

    /// Individual being evaluated.
    #[must_use]
    pub fn individual(&self) -> &'a Individual {
        self.individual
    }

    /// Index of the tree designated active.
    #[must_use]
    pub fn active_tree_index(&self) -> usize {
        self.tree_index
    }

    /// Tree designated active, if the index is valid.
    #[must_use]
    pub fn active_tree(&self) -> Option<&'a Tree> {
        self.individual.trees.get(self.tree_index)
    }

    /// Designate tree `index` as the one [`Tree::interpret`] accepts.
    pub fn set_active_tree(&mut self, index: usize) {
        self.tree_index = index;
    }

    /// Interpret the active tree.
    ///
    /// # Errors
    ///
    /// See [`Tree::interpret`]; also fails if the active index names no tree.
    pub fn run(&mut self) -> EvalResult<Value> {
        let tree = self.active_tree().ok_or(EvalError::InvalidTarget {
            name: "active tree".to_string(),
            index: self.tree_index,
        })?;
        tree.interpret(self)
    }

    /// Primitive executions so far.
    #[must_use]
    pub fn nodes_executed(&self) -> u64 {
        self.executed
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Path from the executing tree's root to the executing node.
    #[must_use]
    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    /// Argument `index` of the innermost invocation frame.
    #[must_use]
    pub fn frame_argument(&self, index: usize) -> Option<Value> {
        self.frames.last().and_then(|frame| frame.get(index).copied())
    }

    /// Account for one primitive execution.
    fn charge(&mut self) -> EvalResult<()> {
        self.executed += 1;
        if let Some(max) = self.limits.max_nodes
            && self.executed > max
        {
            return Err(EvalError::ResourceExceeded(ResourceKind::NodesExecuted));
        }
        if let Some(max) = self.limits.max_time
            && self.executed.is_multiple_of(TIME_CHECK_INTERVAL)
            && self.started.elapsed() > max
        {
            return Err(EvalError::ResourceExceeded(ResourceKind::ElapsedTime));
        }
        Ok(())
    }

    /// Call tree `index` of the individual with already evaluated arguments.
    ///
    /// # Errors
    ///
    /// Fails if the target does not exist, the invocation nesting ceiling is
    /// crossed, or the callee fails.
    pub fn invoke_tree(
        &mut self,
        name: &str,
        index: usize,
        arguments: Vec<Value>,
    ) -> EvalResult<Value> {
        let individual = self.individual;
        let callee = individual
            .trees
            .get(index)
            .ok_or_else(|| EvalError::InvalidTarget {
                name: name.to_string(),
                index,
            })?;
        let previous_tree = self.tree_index;
        self.tree_index = index;
        let result = self.call(callee, arguments);
        self.tree_index = previous_tree;
        result
    }

    /// Call a module tree with already evaluated arguments.
    ///
    /// # Errors
    ///
    /// Fails if the invocation nesting ceiling is crossed or the module fails.
    pub fn invoke_module(&mut self, module: &Tree, arguments: Vec<Value>) -> EvalResult<Value> {
        self.call(module, arguments)
    }

    fn call(&mut self, callee: &Tree, arguments: Vec<Value>) -> EvalResult<Value> {
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(EvalError::ResourceExceeded(ResourceKind::CallDepth));
        }
        if callee.is_empty() {
            return Err(EvalError::EmptyTree);
        }
        let caller_stack = std::mem::take(&mut self.call_stack);
        self.frames.push(arguments);
        let result = execute_node(callee, 0, self);
        self.frames.pop();
        self.call_stack = caller_stack;
        result
    }
}

/// Lazy view of the children of the executing node.
///
/// Children are only executed when a primitive asks for them, so `IF` runs
/// just the taken branch.
pub struct Arguments<'e, 'a> {
    context: &'e mut ExecContext<'a>,
    tree: &'e Tree,
    index: usize,
}

impl fmt::Debug for Arguments<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("node", &self.index)
            .field("arity", &self.arity())
            .finish_non_exhaustive()
    }
}

impl<'a> Arguments<'_, 'a> {
    /// Number of arguments of the executing node.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.tree.node(self.index).arity()
    }

    /// Execute argument `argument` and return its value.
    ///
    /// # Errors
    ///
    /// Fails if `argument` is not below the arity or the child fails.
    pub fn eval(&mut self, argument: usize) -> EvalResult<Value> {
        let arity = self.arity();
        if argument >= arity {
            return Err(EvalError::ArgumentOutOfRange { argument, arity });
        }
        let child = child_index_in(self.tree.nodes(), self.index, argument);
        execute_node(self.tree, child, self.context)
    }

    /// Execution context.
    pub fn context(&mut self) -> &mut ExecContext<'a> {
        self.context
    }
}

impl Tree {
    /// Execute this tree from its root.
    ///
    /// The tree must be the one designated active in `context`.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::EmptyTree`] or [`EvalError::InactiveTree`] on
    /// misuse, and [`EvalError::ResourceExceeded`] when a ceiling is crossed.
    pub fn interpret(&self, context: &mut ExecContext<'_>) -> EvalResult<Value> {
        if self.is_empty() {
            return Err(EvalError::EmptyTree);
        }
        match context.active_tree() {
            Some(active) if std::ptr::eq(active, self) => {}
            _ => return Err(EvalError::InactiveTree),
        }
        context.call_stack.clear();
        execute_node(self, 0, context)
    }
}

pub(crate) fn execute_node(
    tree: &Tree,
    index: usize,
    context: &mut ExecContext<'_>,
) -> EvalResult<Value> {
    context.charge()?;
    context.call_stack.push(index);
    let primitive = &tree.node(index).primitive;
    let result = {
        let mut arguments = Arguments {
            context: &mut *context,
            tree,
            index,
        };
        primitive.execute(&mut arguments)
    };
    context.call_stack.pop();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::primitive::{Op, Primitive};
    use std::sync::Arc;

    fn op(op: Op) -> Arc<Primitive> {
        Arc::new(Primitive::Operator(op))
    }

    fn var(slot: usize) -> Arc<Primitive> {
        Arc::new(Primitive::variable(format!("D{slot}"), slot, None))
    }

    fn individual(trees: Vec<Tree>) -> Individual {
        Individual::new(trees)
    }

    #[test]
    fn test_interpret_boolean_tree() {
        let tree = Tree::from_preorder(vec![op(Op::And), var(0), op(Op::Not), var(1)], 0, 0).unwrap();
        let ind = individual(vec![tree]);
        let mut ctx = ExecContext::new(&ind, ExecutionLimits::default());
        ctx.set_inputs(&[Value::Bool(true), Value::Bool(false)]);
        assert_eq!(ctx.run(), Ok(Value::Bool(true)));
        ctx.set_inputs(&[Value::Bool(true), Value::Bool(true)]);
        assert_eq!(ctx.run(), Ok(Value::Bool(false)));
        assert_eq!(ctx.nodes_executed(), 8);
    }

    #[test]
    fn test_if_is_lazy() {
        // IF(D0, D1, D2) with only D0 and D1 bound: the else branch must never run.
        let tree = Tree::from_preorder(vec![op(Op::If), var(0), var(1), var(2)], 0, 0).unwrap();
        let ind = individual(vec![tree]);
        let mut ctx = ExecContext::new(&ind, ExecutionLimits::default());
        ctx.set_inputs(&[Value::Bool(true), Value::Int(5)]);
        assert_eq!(ctx.run(), Ok(Value::Int(5)));
        ctx.set_inputs(&[Value::Bool(false), Value::Int(5)]);
        assert_eq!(ctx.run(), Err(EvalError::UnboundInput(2)));
    }

    #[test]
    fn test_inactive_and_empty_trees_rejected() {
        let main = Tree::from_preorder(vec![var(0)], 0, 0).unwrap();
        let other = main.clone();
        let ind = individual(vec![main]);
        let mut ctx = ExecContext::new(&ind, ExecutionLimits::default());
        assert_eq!(other.interpret(&mut ctx), Err(EvalError::InactiveTree));

        let empty = individual(vec![Tree::new(0, 0)]);
        let mut ctx = ExecContext::new(&empty, ExecutionLimits::default());
        assert_eq!(ctx.run(), Err(EvalError::EmptyTree));
    }

    #[test]
    fn test_node_ceiling_spans_fitness_cases() {
        let tree = Tree::from_preorder(vec![op(Op::Or), var(0), var(1)], 0, 0).unwrap();
        let ind = individual(vec![tree]);
        let limits = ExecutionLimits {
            max_nodes: Some(7),
            ..ExecutionLimits::default()
        };
        let mut ctx = ExecContext::new(&ind, limits);
        ctx.set_inputs(&[Value::Bool(false), Value::Bool(true)]);
        assert!(ctx.run().is_ok());
        assert!(ctx.run().is_ok());
        assert_eq!(
            ctx.run(),
            Err(EvalError::ResourceExceeded(ResourceKind::NodesExecuted))
        );
    }

    #[test]
    fn test_time_ceiling_checked_every_interval() {
        // 300 nested NOTs over D0: one run crosses the first time check.
        let mut primitives = vec![op(Op::Not); 300];
        primitives.push(var(0));
        let tree = Tree::from_preorder(primitives, 0, 0).unwrap();
        let ind = individual(vec![tree]);
        let limits = ExecutionLimits {
            max_time: Some(Duration::ZERO),
            ..ExecutionLimits::default()
        };
        let mut ctx = ExecContext::new(&ind, limits);
        ctx.set_inputs(&[Value::Bool(true)]);
        let err = (0..1000).find_map(|_| ctx.run().err());
        assert_eq!(
            err,
            Some(EvalError::ResourceExceeded(ResourceKind::ElapsedTime))
        );
        assert!(ctx.nodes_executed().is_multiple_of(TIME_CHECK_INTERVAL));

        let unlimited = ExecutionLimits {
            max_time: None,
            ..limits
        };
        let mut ctx = ExecContext::new(&ind, unlimited);
        ctx.set_inputs(&[Value::Bool(true)]);
        assert_eq!(ctx.run(), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_arguments_debug_names_node() {
        let tree = Tree::from_preorder(vec![op(Op::Or), var(0), var(1)], 0, 0).unwrap();
        let ind = individual(vec![tree.clone()]);
        let mut ctx = ExecContext::new(&ind, ExecutionLimits::default());
        let args = Arguments {
            context: &mut ctx,
            tree: &tree,
            index: 0,
        };
        assert_eq!(format!("{args:?}"), "Arguments { node: 0, arity: 2, .. }");
    }

    #[test]
    fn test_adf_invocation_binds_arguments() {
        // main: ADF1(D0, NOT(D1)); ADF1: XOR(ARG0, ARG1)
        let adf = Arc::new(Primitive::adf("ADF1", 1, None, vec![None, None]));
        let main = Tree::from_preorder(vec![adf, var(0), op(Op::Not), var(1)], 0, 0).unwrap();
        let body = Tree::from_preorder(
            vec![
                op(Op::Xor),
                Arc::new(Primitive::argument_at(0, None)),
                Arc::new(Primitive::argument_at(1, None)),
            ],
            1,
            2,
        )
        .unwrap();
        let ind = individual(vec![main, body]);
        let mut ctx = ExecContext::new(&ind, ExecutionLimits::default());
        ctx.set_inputs(&[Value::Bool(true), Value::Bool(true)]);
        assert_eq!(ctx.run(), Ok(Value::Bool(true)));
        assert_eq!(ctx.active_tree_index(), 0);
        assert!(ctx.call_stack().is_empty());
    }

    #[test]
    fn test_recursive_invocation_hits_call_depth() {
        let selfcall = Arc::new(Primitive::adf("SELF", 0, None, vec![]));
        let tree = Tree::from_preorder(vec![selfcall], 0, 0).unwrap();
        let ind = individual(vec![tree]);
        let limits = ExecutionLimits {
            max_call_depth: 4,
            ..ExecutionLimits::default()
        };
        let mut ctx = ExecContext::new(&ind, limits);
        assert_eq!(
            ctx.run(),
            Err(EvalError::ResourceExceeded(ResourceKind::CallDepth))
        );
    }
}
