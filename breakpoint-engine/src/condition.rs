// Breakpoint conditions
//
// Expression evaluation is opaque to the engine. An evaluator compiles the
// condition text once and the compiled form is evaluated against the top
// frame of the triggering thread on every hit.

use crate::error::EvaluationError;
use crate::types::StackFrame;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait CompiledCondition: Send + Sync + fmt::Debug {
    async fn evaluate(&self, frame: &StackFrame) -> Result<bool, EvaluationError>;
}

pub trait ConditionEvaluator: Send + Sync {
    fn compile(&self, expression: &str) -> Result<Arc<dyn CompiledCondition>, EvaluationError>;
}

/// Compiled condition cached per engine, keyed by expression text.
/// Compile failures are cached too so a bad condition is reported once per hit
/// without recompiling.
#[derive(Debug, Default)]
pub(crate) struct ConditionCache {
    cached: Option<(String, Result<Arc<dyn CompiledCondition>, EvaluationError>)>,
}

impl ConditionCache {
    pub(crate) fn get(
        &mut self,
        evaluator: &dyn ConditionEvaluator,
        expression: &str,
    ) -> Result<Arc<dyn CompiledCondition>, EvaluationError> {
        match &self.cached {
            Some((text, compiled)) if text == expression => compiled.clone(),
            _ => {
                let compiled = evaluator.compile(expression);
                self.cached = Some((expression.to_string(), compiled.clone()));
                compiled
            }
        }
    }
}

/// Evaluator that only understands the literals `true` and `false`.
///
/// Used where no expression language is wired in; any other condition fails to
/// compile, which makes the breakpoint stop with the error attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantEvaluator;

#[derive(Debug)]
struct Constant(bool);

#[async_trait]
impl CompiledCondition for Constant {
    async fn evaluate(&self, _frame: &StackFrame) -> Result<bool, EvaluationError> {
        Ok(self.0)
    }
}

impl ConditionEvaluator for ConstantEvaluator {
    fn compile(&self, expression: &str) -> Result<Arc<dyn CompiledCondition>, EvaluationError> {
        match expression.trim() {
            "true" => Ok(Arc::new(Constant(true))),
            "false" => Ok(Arc::new(Constant(false))),
            other => Err(EvaluationError::Compile {
                expression: other.to_string(),
                message: "expression evaluation is not available".to_string(),
            }),
        }
    }
}
