//! Even-N parity: the reference problem the engine is exercised on.
//!
//! Programs see N boolean inputs `D0..D{N-1}` and must return true exactly
//! when an even number of them are true. The function set is
//! {AND, OR, NAND, NOR}. With an ADF the result-producing branch may also call
//! `ADF0`, a two-argument boolean function evolved in tree 1 over the same
//! operators and its arguments `ARG0`, `ARG1`.

use crate::error::EvalResult;
use crate::gp::{
    ExecContext, ExecutionLimits, Individual, Op, Primitive, PrimitiveSet, PrimitiveSetError,
    PrimitiveSuperSet, Problem, TreeLayout, Value, ValueType,
};

/// Largest supported input count.
pub const MAX_PARITY_BITS: u32 = 16;

const BOOL: Option<ValueType> = Some(ValueType::Bool);
const FUNCTIONS: [Op; 4] = [Op::And, Op::Or, Op::Nand, Op::Nor];

/// Even-N parity problem.
#[derive(Debug, Clone)]
pub struct EvenParity {
    bits: u32,
    with_adf: bool,
    sets: PrimitiveSuperSet,
}

impl EvenParity {
    /// Build the problem for `bits` inputs, optionally with one two-argument ADF.
    ///
    /// # Errors
    ///
    /// Propagates primitive registration failures.
    ///
    /// # Panics
    ///
    /// Panics unless `1 <= bits <= MAX_PARITY_BITS`.
    pub fn new(bits: u32, with_adf: bool) -> Result<Self, PrimitiveSetError> {
        assert!(
            (1..=MAX_PARITY_BITS).contains(&bits),
            "parity needs 1 to {MAX_PARITY_BITS} inputs, got {bits}"
        );
        let mut main = PrimitiveSet::new().with_root_type(BOOL);
        for op in FUNCTIONS {
            main.insert(Primitive::Operator(op), 1.0)?;
        }
        for slot in 0..bits {
            main.insert(Primitive::variable(format!("D{slot}"), slot as usize, BOOL), 1.0)?;
        }

        let mut sets = PrimitiveSuperSet::new();
        if with_adf {
            main.insert(Primitive::adf("ADF0", 1, BOOL, vec![BOOL, BOOL]), 1.0)?;

            let mut adf = PrimitiveSet::new().with_root_type(BOOL);
            for op in FUNCTIONS {
                adf.insert(Primitive::Operator(op), 1.0)?;
            }
            adf.insert(Primitive::argument(BOOL), 1.0)?;
            sets.push(main);
            sets.push(adf);
        } else {
            sets.push(main);
        }

        Ok(Self {
            bits,
            with_adf,
            sets,
        })
    }

    /// Number of inputs.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Whether individuals carry an ADF.
    #[must_use]
    pub fn with_adf(&self) -> bool {
        self.with_adf
    }

    /// Number of fitness cases, one per input combination.
    #[must_use]
    pub fn cases(&self) -> u32 {
        1 << self.bits
    }

    /// Expected output for fitness case `case`.
    #[must_use]
    pub fn expected(case: u32) -> bool {
        case.count_ones() % 2 == 0
    }

    /// Fitness cases `individual` classifies correctly.
    ///
    /// One execution context serves every case, so the limits bound the
    /// whole evaluation.
    ///
    /// # Errors
    ///
    /// Returns the first interpretation error.
    pub fn correct_cases(
        &self,
        individual: &Individual,
        limits: &ExecutionLimits,
    ) -> EvalResult<u32> {
        let mut context = ExecContext::new(individual, *limits);
        let mut inputs = Vec::with_capacity(self.bits as usize);
        let mut correct = 0;
        for case in 0..self.cases() {
            inputs.clear();
            inputs.extend((0..self.bits).map(|bit| Value::Bool((case >> bit) & 1 == 1)));
            context.set_inputs(&inputs);
            if context.run()?.as_bool() == Self::expected(case) {
                correct += 1;
            }
        }
        Ok(correct)
    }
}

impl Problem for EvenParity {
    fn primitives(&self) -> &PrimitiveSuperSet {
        &self.sets
    }

    fn layout(&self) -> Vec<TreeLayout> {
        let mut layout = vec![TreeLayout {
            primitive_set_index: 0,
            number_arguments: 0,
        }];
        if self.with_adf {
            layout.push(TreeLayout {
                primitive_set_index: 1,
                number_arguments: 2,
            });
        }
        layout
    }

    fn evaluate(&self, individual: &Individual, limits: &ExecutionLimits) -> EvalResult<f64> {
        let correct = self.correct_cases(individual, limits)?;
        Ok(f64::from(correct) / f64::from(self.cases()))
    }

    fn target_fitness(&self) -> Option<f64> {
        Some(1.0)
    }
}
