//! IR interpreter behind the execution engine interface
//!
//! Functions are evaluated straight from the module: each call gets a frame
//! mapping instructions to their results, phi nodes are resolved on block
//! entry from the edge just taken, and memory comes from [`Memory`].

use log::{debug, trace, warn};
use rcg_common::{CodegenError, Result};
use rcg_ir::{
    mask, sign_extend, BinaryOp, Block, CastOp, FloatPredicate, Function, GlobalData, InstKind,
    IntPredicate, Module, Type, TypeData, TypeRegistry, Value, ValueKind,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::eval::{float_binary, int_binary, int_compare, int_resize};
use crate::memory::{Memory, Pointer, Val};
use crate::target::{self, Arch};
use crate::{Externals, GenericValue};

/// Something that can run a function of a module
pub trait ExecutionEngine {
    fn run_function(
        &mut self,
        module: &Module,
        function: Function,
        args: &[GenericValue],
    ) -> Result<GenericValue>;

    /// Look `name` up in `module` and run it
    fn run_named(&mut self, module: &Module, name: &str, args: &[GenericValue]) -> Result<GenericValue> {
        let function = module
            .function(name)
            .ok_or_else(|| CodegenError::argument(format!("no function named '{name}'")))?;
        self.run_function(module, function, args)
    }
}

/// Limits for a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    pub max_call_depth: usize,
    pub max_steps: u64,
    /// Value nodes live memory may hold at once; a cell of an aggregate
    /// type counts one node per element plus one for itself
    pub max_cells: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 512,
            max_steps: 10_000_000,
            max_cells: 1 << 24,
        }
    }
}

/// Execution engine that evaluates IR directly
pub struct Interpreter {
    target: Arch,
    options: EngineOptions,
    externals: Externals,
}

impl Interpreter {
    /// Engine with default limits; the target must already be initialized
    pub fn new() -> Result<Self> {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Result<Self> {
        let target = target::initialized().ok_or_else(|| {
            CodegenError::invalid_state("no target initialized; call target::init first")
        })?;
        debug!("Creating interpreter for {target} with {options:?}");
        Ok(Self {
            target,
            options,
            externals: Externals::default(),
        })
    }

    pub fn target(&self) -> Arch {
        self.target
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn externals(&self) -> &Externals {
        &self.externals
    }

    /// Host function table, for registering extra externals
    pub fn externals_mut(&mut self) -> &mut Externals {
        &mut self.externals
    }
}

impl ExecutionEngine for Interpreter {
    fn run_function(
        &mut self,
        module: &Module,
        function: Function,
        args: &[GenericValue],
    ) -> Result<GenericValue> {
        if module.is_removed(function) {
            return Err(CodegenError::invalid_state("cannot run a removed function"));
        }
        let name = module.function_name(function);
        let fn_ty = module.function_type(function);
        let params = module.types.param_types(fn_ty).unwrap_or(&[]);
        let var_arg = module.types.is_var_arg(fn_ty);
        if args.len() < params.len() || (!var_arg && args.len() != params.len()) {
            return Err(CodegenError::argument(format!(
                "'{name}' expects {} arguments, got {}",
                params.len(),
                args.len()
            )));
        }

        let mut values = Vec::with_capacity(args.len());
        for (index, &arg) in args.iter().enumerate() {
            let value = match params.get(index) {
                Some(&ty) => coerce(&module.types, arg, ty).ok_or_else(|| {
                    CodegenError::argument(format!(
                        "argument {index} of '{name}': cannot pass {arg:?} as {}",
                        module.types.display(ty)
                    ))
                })?,
                None => unboxed(arg),
            };
            values.push(value);
        }

        debug!("Running '{name}' with {} arguments", values.len());
        let mut machine = Machine {
            module,
            externals: &self.externals,
            options: self.options,
            memory: Memory::new(self.options.max_cells),
            globals: HashMap::new(),
            steps: 0,
            depth: 0,
        };
        let result = machine.call(function, values)?;
        debug!("'{name}' finished after {} steps", machine.steps);
        boxed(&result)
    }
}

/// Convert a boxed argument to the runtime shape of `ty`
fn coerce(types: &TypeRegistry, value: GenericValue, ty: Type) -> Option<Val> {
    Some(match (types.data(ty), value) {
        (TypeData::Int(bits), GenericValue::Int { value, .. }) => Val::Int {
            bits: *bits,
            value: mask(*bits, value),
        },
        (TypeData::F32, GenericValue::Float(v)) => Val::F32(v),
        (TypeData::F32, GenericValue::Double(v)) => Val::F32(v as f32),
        (TypeData::F64, GenericValue::Double(v)) => Val::F64(v),
        (TypeData::F64, GenericValue::Float(v)) => Val::F64(f64::from(v)),
        (TypeData::Pointer(_), GenericValue::Pointer(address)) => Val::Ptr(Pointer::from_address(address)),
        (TypeData::Void, _) => Val::Void,
        _ => return None,
    })
}

/// Runtime shape of a var-arg argument, which has no declared type
fn unboxed(value: GenericValue) -> Val {
    match value {
        GenericValue::Int { bits, value } => Val::Int { bits, value },
        GenericValue::Float(v) => Val::F32(v),
        GenericValue::Double(v) => Val::F64(v),
        GenericValue::Pointer(address) => Val::Ptr(Pointer::from_address(address)),
        GenericValue::Void => Val::Void,
    }
}

fn boxed(value: &Val) -> Result<GenericValue> {
    Ok(match value {
        Val::Int { bits, value } => GenericValue::Int { bits: *bits, value: *value },
        Val::F32(v) => GenericValue::Float(*v),
        Val::F64(v) => GenericValue::Double(*v),
        Val::Ptr(None) => GenericValue::Pointer(0),
        Val::Ptr(Some(pointer)) => GenericValue::Pointer(pointer.address()),
        Val::Void => GenericValue::Void,
        Val::Agg(_) => {
            return Err(CodegenError::execution("aggregate values cannot cross the engine boundary"))
        }
    })
}

enum Flow {
    Jump(Block),
    Return(Val),
}

type Frame = HashMap<Value, Val>;

/// State of one top-level run
struct Machine<'a> {
    module: &'a Module,
    externals: &'a Externals,
    options: EngineOptions,
    memory: Memory,
    globals: HashMap<Value, Pointer>,
    steps: u64,
    depth: usize,
}

impl Machine<'_> {
    fn call(&mut self, function: Function, args: Vec<Val>) -> Result<Val> {
        let module = self.module;
        if module.is_removed(function) {
            return Err(CodegenError::execution("call to a removed function"));
        }
        if module.is_declaration(function) {
            return self.call_external(function, args);
        }
        if self.depth >= self.options.max_call_depth {
            return Err(CodegenError::execution(format!(
                "call depth limit of {} exceeded in '{}'",
                self.options.max_call_depth,
                module.function_name(function)
            )));
        }

        self.depth += 1;
        let mark = self.memory.mark();
        let result = self.execute(function, args);
        self.memory.release_frame(mark);
        self.depth -= 1;
        result
    }

    fn call_external(&mut self, function: Function, args: Vec<Val>) -> Result<Val> {
        let module = self.module;
        let name = module.function_name(function);
        if !self.externals.contains(name) {
            warn!("No host implementation for external '{name}'");
        }
        let boxed_args = args.iter().map(boxed).collect::<Result<Vec<_>>>()?;
        trace!("external {name}({boxed_args:?})");
        let result = self.externals.call(name, &boxed_args)?;
        let ret = module.return_type(function);
        coerce(&module.types, result, ret).ok_or_else(|| {
            CodegenError::execution(format!(
                "external '{name}' returned {result:?}, expected {}",
                module.types.display(ret)
            ))
        })
    }

    fn execute(&mut self, function: Function, args: Vec<Val>) -> Result<Val> {
        let module = self.module;
        let name = module.function_name(function);
        let mut frame: Frame = module.params(function).iter().copied().zip(args).collect();
        let mut block = module
            .entry_block(function)
            .ok_or_else(|| CodegenError::execution(format!("'{name}' has no body")))?;
        let mut previous: Option<Block> = None;

        loop {
            let mut cursor = module.first_instruction(block);

            // every phi reads the values live on the incoming edge
            let mut merged = Vec::new();
            while let Some(inst) = cursor {
                let Some(InstKind::Phi { incoming }) = module.instruction(inst) else {
                    break;
                };
                let from = previous.ok_or_else(|| {
                    CodegenError::execution(format!("phi in entry block of '{name}'"))
                })?;
                let &(_, value) = incoming.iter().find(|(pred, _)| *pred == from).ok_or_else(|| {
                    CodegenError::execution(format!(
                        "phi in '{}' has no entry for predecessor '{}'",
                        module.block_label(block),
                        module.block_label(from)
                    ))
                })?;
                merged.push((inst, self.operand(&frame, value)?));
                cursor = module.next_instruction(inst);
            }
            frame.extend(merged);

            let flow = loop {
                let inst = cursor.ok_or_else(|| {
                    CodegenError::execution(format!(
                        "block '{}' of '{name}' has no terminator",
                        module.block_label(block)
                    ))
                })?;
                self.tick()?;
                let kind = module
                    .instruction(inst)
                    .ok_or_else(|| CodegenError::invalid_state("non-instruction linked in a block"))?;
                trace!("{name}: {} (%{})", kind.opcode_name(), inst.index());

                match kind {
                    InstKind::Branch { dest } => break Flow::Jump(*dest),
                    InstKind::CondBranch { cond, then_dest, else_dest } => {
                        let taken = self.operand(&frame, *cond)?.as_bool()?;
                        break Flow::Jump(if taken { *then_dest } else { *else_dest });
                    }
                    InstKind::Switch { value, default, cases } => {
                        let (_, scrutinee) = self.operand(&frame, *value)?.as_int()?;
                        let mut dest = *default;
                        for &(key, target) in cases {
                            if self.operand(&frame, key)?.as_int()?.1 == scrutinee {
                                dest = target;
                                break;
                            }
                        }
                        break Flow::Jump(dest);
                    }
                    InstKind::Return(value) => {
                        let result = match value {
                            Some(value) => self.operand(&frame, *value)?,
                            None => Val::Void,
                        };
                        break Flow::Return(result);
                    }
                    InstKind::Unreachable => {
                        return Err(CodegenError::execution(format!(
                            "reached unreachable in '{name}'"
                        )))
                    }
                    InstKind::Phi { .. } => {
                        return Err(CodegenError::execution(format!(
                            "phi after a non-phi instruction in '{}'",
                            module.block_label(block)
                        )))
                    }
                    other => {
                        let result = self.evaluate(&frame, inst, other)?;
                        frame.insert(inst, result);
                    }
                }
                cursor = module.next_instruction(inst);
            };

            match flow {
                Flow::Jump(next) => {
                    previous = Some(block);
                    block = next;
                }
                Flow::Return(value) => return Ok(value),
            }
        }
    }

    fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        if self.steps > self.options.max_steps {
            return Err(CodegenError::execution(format!(
                "step limit of {} exceeded",
                self.options.max_steps
            )));
        }
        Ok(())
    }

    fn evaluate(&mut self, frame: &Frame, inst: Value, kind: &InstKind) -> Result<Val> {
        let module = self.module;
        let ty = module.type_of(inst);
        match kind {
            InstKind::Binary { op, lhs, rhs } => {
                binary(*op, self.operand(frame, *lhs)?, self.operand(frame, *rhs)?)
            }
            InstKind::ICmp { pred, lhs, rhs } => {
                icmp(*pred, self.operand(frame, *lhs)?, self.operand(frame, *rhs)?)
            }
            InstKind::FCmp { pred, lhs, rhs } => {
                fcmp(*pred, self.operand(frame, *lhs)?, self.operand(frame, *rhs)?)
            }
            InstKind::Alloca { allocated, count } => {
                let count = match count {
                    Some(count) => {
                        let (bits, value) = self.operand(frame, *count)?.as_int()?;
                        usize::try_from(sign_extend(bits, value)).map_err(|_| {
                            CodegenError::execution("negative array allocation size")
                        })?
                    }
                    None => 1,
                };
                let pointer = self.memory.allocate(&module.types, *allocated, count, true)?;
                Ok(Val::Ptr(Some(pointer)))
            }
            InstKind::Load { ptr } => {
                let ptr = self.operand(frame, *ptr)?;
                self.memory.load(ptr.as_pointer()?)
            }
            InstKind::Store { value, ptr } => {
                let value = self.operand(frame, *value)?;
                let ptr = self.operand(frame, *ptr)?;
                self.memory.store(ptr.as_pointer()?, value)?;
                Ok(Val::Void)
            }
            InstKind::GetElementPtr { base, indices } => self.gep(frame, *base, indices),
            InstKind::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|&arg| self.operand(frame, arg))
                    .collect::<Result<Vec<_>>>()?;
                self.call(*callee, args)
            }
            InstKind::Cast { op, value } => cast(&module.types, *op, self.operand(frame, *value)?, ty),
            InstKind::ExtractValue { aggregate, index } => {
                let lanes = self.operand(frame, *aggregate)?.into_lanes()?;
                lane(lanes, u64::from(*index))
            }
            InstKind::InsertValue { aggregate, element, index } => {
                let lanes = self.operand(frame, *aggregate)?.into_lanes()?;
                let element = self.operand(frame, *element)?;
                replace_lane(lanes, u64::from(*index), element)
            }
            InstKind::ExtractElement { vector, index } => {
                let lanes = self.operand(frame, *vector)?.into_lanes()?;
                let (_, index) = self.operand(frame, *index)?.as_int()?;
                lane(lanes, index)
            }
            InstKind::InsertElement { vector, element, index } => {
                let lanes = self.operand(frame, *vector)?.into_lanes()?;
                let element = self.operand(frame, *element)?;
                let (_, index) = self.operand(frame, *index)?.as_int()?;
                replace_lane(lanes, index, element)
            }
            InstKind::ShuffleVector { lhs, rhs, mask } => {
                let mut pool = self.operand(frame, *lhs)?.into_lanes()?;
                pool.extend(self.operand(frame, *rhs)?.into_lanes()?);
                let selected = self
                    .operand(frame, *mask)?
                    .into_lanes()?
                    .iter()
                    .map(|pick| lane_ref(&pool, pick.as_int()?.1))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Val::Agg(selected))
            }
            InstKind::Select { cond, then_value, else_value } => select(
                self.operand(frame, *cond)?,
                self.operand(frame, *then_value)?,
                self.operand(frame, *else_value)?,
            ),
            terminator => Err(CodegenError::invalid_state(format!(
                "'{}' is not a value-producing instruction",
                terminator.opcode_name()
            ))),
        }
    }

    /// Walk `indices` from `base`: the first one steps between cells, the rest descend
    fn gep(&mut self, frame: &Frame, base: Value, indices: &[Value]) -> Result<Val> {
        let base = self.operand(frame, base)?;
        let mut pointer = base
            .as_pointer()?
            .cloned()
            .ok_or_else(|| CodegenError::execution("getelementptr on a null pointer"))?;
        let mut indices = indices.iter();
        if let Some(&first) = indices.next() {
            let offset = self.signed_operand(frame, first)?;
            match pointer.path.last_mut() {
                Some(last) => *last = element_index(*last as i64 + offset)?,
                None => pointer.index += offset,
            }
        }
        for &index in indices {
            let index = self.signed_operand(frame, index)?;
            pointer.path.push(element_index(index)?);
        }
        Ok(Val::Ptr(Some(pointer)))
    }

    fn signed_operand(&mut self, frame: &Frame, value: Value) -> Result<i64> {
        let (bits, value) = self.operand(frame, value)?.as_int()?;
        Ok(sign_extend(bits, value))
    }

    fn operand(&mut self, frame: &Frame, value: Value) -> Result<Val> {
        let module = self.module;
        match module.value(value).kind() {
            ValueKind::Argument { .. } | ValueKind::Instruction(_) => {
                frame.get(&value).cloned().ok_or_else(|| {
                    CodegenError::execution(format!("value %{} used before it is defined", value.index()))
                })
            }
            _ => self.constant(value),
        }
    }

    fn constant(&mut self, value: Value) -> Result<Val> {
        let module = self.module;
        let data = module.value(value);
        let ty = data.ty();
        Ok(match data.kind() {
            ValueKind::ConstInt(bits_value) => Val::Int {
                bits: module.types.int_width(ty).unwrap_or(64),
                value: *bits_value,
            },
            ValueKind::ConstFloat(v) => match module.types.data(ty) {
                TypeData::F32 => Val::F32(*v as f32),
                _ => Val::F64(*v),
            },
            ValueKind::ConstNull => Val::Ptr(None),
            ValueKind::Undef => {
                self.memory.check_zero(&module.types, ty)?;
                Val::zero(&module.types, ty)
            }
            ValueKind::ConstAggregate(elements) => Val::Agg(
                elements
                    .iter()
                    .map(|&element| self.constant(element))
                    .collect::<Result<Vec<_>>>()?,
            ),
            ValueKind::ConstString(bytes) => Val::Agg(
                bytes
                    .iter()
                    .map(|&byte| Val::Int { bits: 8, value: u64::from(byte) })
                    .collect(),
            ),
            ValueKind::Global(global) => Val::Ptr(Some(self.global(value, global)?)),
            ValueKind::Argument { .. } | ValueKind::Instruction(_) => {
                return Err(CodegenError::execution(format!(
                    "value %{} is not a constant",
                    value.index()
                )))
            }
        })
    }

    /// Storage for a global, created with its initializer on first use
    fn global(&mut self, global: Value, data: &GlobalData) -> Result<Pointer> {
        if let Some(pointer) = self.globals.get(&global) {
            return Ok(pointer.clone());
        }
        let module = self.module;
        if !module.globals().any(|g| g == global) {
            return Err(CodegenError::execution(format!(
                "use of removed global %{}",
                global.index()
            )));
        }
        let pointer = self.memory.allocate(&module.types, data.value_type(), 1, false)?;
        self.globals.insert(global, pointer.clone());
        if let Some(init) = data.initializer() {
            let init = self.constant(init)?;
            self.memory.store(Some(&pointer), init)?;
        }
        debug!("Materialized global '{}'", module.name_of(global).unwrap_or("?"));
        Ok(pointer)
    }
}

fn element_index(index: i64) -> Result<usize> {
    usize::try_from(index)
        .map_err(|_| CodegenError::execution(format!("negative element index {index}")))
}

fn lane(lanes: Vec<Val>, index: u64) -> Result<Val> {
    let count = lanes.len();
    usize::try_from(index)
        .ok()
        .and_then(|i| lanes.into_iter().nth(i))
        .ok_or_else(|| lane_error(index, count))
}

fn lane_ref(lanes: &[Val], index: u64) -> Result<Val> {
    usize::try_from(index)
        .ok()
        .and_then(|i| lanes.get(i))
        .cloned()
        .ok_or_else(|| lane_error(index, lanes.len()))
}

fn replace_lane(mut lanes: Vec<Val>, index: u64, element: Val) -> Result<Val> {
    let count = lanes.len();
    let slot = usize::try_from(index)
        .ok()
        .and_then(|i| lanes.get_mut(i))
        .ok_or_else(|| lane_error(index, count))?;
    *slot = element;
    Ok(Val::Agg(lanes))
}

fn lane_error(index: u64, count: usize) -> CodegenError {
    CodegenError::execution(format!("element index {index} out of range for {count} elements"))
}

/// Apply `op` to each pair of lanes
fn lanewise(lhs: Vec<Val>, rhs: Vec<Val>, op: impl Fn(Val, Val) -> Result<Val>) -> Result<Val> {
    if lhs.len() != rhs.len() {
        return Err(CodegenError::execution("vector operands differ in length"));
    }
    lhs.into_iter()
        .zip(rhs)
        .map(|(a, b)| op(a, b))
        .collect::<Result<Vec<_>>>()
        .map(Val::Agg)
}

fn binary(op: BinaryOp, lhs: Val, rhs: Val) -> Result<Val> {
    match (lhs, rhs) {
        (Val::Int { bits, value: a }, Val::Int { value: b, .. }) => Ok(Val::Int {
            bits,
            value: int_binary(op, bits, a, b)?,
        }),
        (Val::F32(a), Val::F32(b)) => {
            Ok(Val::F32(float_binary(op, f64::from(a), f64::from(b))? as f32))
        }
        (Val::F64(a), Val::F64(b)) => Ok(Val::F64(float_binary(op, a, b)?)),
        (Val::Agg(a), Val::Agg(b)) => lanewise(a, b, |x, y| binary(op, x, y)),
        (a, b) => Err(CodegenError::execution(format!("cannot apply {op} to {a:?} and {b:?}"))),
    }
}

fn icmp(pred: IntPredicate, lhs: Val, rhs: Val) -> Result<Val> {
    match (lhs, rhs) {
        (Val::Int { bits, value: a }, Val::Int { value: b, .. }) => {
            Ok(Val::bool(int_compare(pred, bits, a, b)))
        }
        (Val::Ptr(a), Val::Ptr(b)) => Ok(Val::bool(match pred {
            IntPredicate::Eq => a == b,
            IntPredicate::Ne => a != b,
            _ => {
                let address = |p: &Option<Pointer>| p.as_ref().map_or(0, Pointer::address);
                let (x, y) = (address(&a), address(&b));
                pred.evaluate(x, y, x as i64, y as i64)
            }
        })),
        (Val::Agg(a), Val::Agg(b)) => lanewise(a, b, |x, y| icmp(pred, x, y)),
        (a, b) => Err(CodegenError::execution(format!("cannot compare {a:?} and {b:?}"))),
    }
}

fn fcmp(pred: FloatPredicate, lhs: Val, rhs: Val) -> Result<Val> {
    match (lhs, rhs) {
        (Val::F32(a), Val::F32(b)) => Ok(Val::bool(pred.evaluate(f64::from(a), f64::from(b)))),
        (Val::F64(a), Val::F64(b)) => Ok(Val::bool(pred.evaluate(a, b))),
        (Val::Agg(a), Val::Agg(b)) => lanewise(a, b, |x, y| fcmp(pred, x, y)),
        (a, b) => Err(CodegenError::execution(format!("cannot compare {a:?} and {b:?}"))),
    }
}

fn select(cond: Val, then_value: Val, else_value: Val) -> Result<Val> {
    match cond {
        Val::Agg(mask) => {
            let (then_lanes, else_lanes) = (then_value.into_lanes()?, else_value.into_lanes()?);
            if mask.len() != then_lanes.len() || mask.len() != else_lanes.len() {
                return Err(CodegenError::execution("select operands differ in length"));
            }
            mask.iter()
                .zip(then_lanes.into_iter().zip(else_lanes))
                .map(|(bit, (a, b))| Ok(if bit.as_bool()? { a } else { b }))
                .collect::<Result<Vec<_>>>()
                .map(Val::Agg)
        }
        cond => Ok(if cond.as_bool()? { then_value } else { else_value }),
    }
}

fn float_of(value: &Val) -> Result<f64> {
    match *value {
        Val::F32(v) => Ok(f64::from(v)),
        Val::F64(v) => Ok(v),
        ref other => Err(CodegenError::execution(format!("expected a float, found {other:?}"))),
    }
}

fn float_as(target: &TypeData, value: f64) -> Val {
    match target {
        TypeData::F32 => Val::F32(value as f32),
        _ => Val::F64(value),
    }
}

fn cast(types: &TypeRegistry, op: CastOp, value: Val, ty: Type) -> Result<Val> {
    if let Val::Agg(lanes) = value {
        if types.length(ty) != Some(lanes.len() as u64) {
            return Err(CodegenError::execution(format!(
                "unsupported {op} to {}",
                types.display(ty)
            )));
        }
        let element = types.element_type(ty).unwrap_or(ty);
        return lanes
            .into_iter()
            .map(|lane| cast(types, op, lane, element))
            .collect::<Result<Vec<_>>>()
            .map(Val::Agg);
    }

    let target = types.data(ty);
    Ok(match (op, value, target) {
        (CastOp::Trunc | CastOp::ZExt | CastOp::SExt, Val::Int { bits, value }, TypeData::Int(to)) => {
            Val::Int { bits: *to, value: int_resize(op, bits, *to, value) }
        }
        // out-of-range conversions saturate
        (CastOp::FpToUi, value, TypeData::Int(to)) => Val::Int {
            bits: *to,
            value: mask(*to, float_of(&value)? as u64),
        },
        (CastOp::FpToSi, value, TypeData::Int(to)) => Val::Int {
            bits: *to,
            value: mask(*to, float_of(&value)? as i64 as u64),
        },
        (CastOp::UiToFp, Val::Int { value, .. }, _) => float_as(target, value as f64),
        (CastOp::SiToFp, Val::Int { bits, value }, _) => {
            float_as(target, sign_extend(bits, value) as f64)
        }
        (CastOp::FpExt | CastOp::FpTrunc, value, _) => float_as(target, float_of(&value)?),
        (CastOp::BitCast, value, _) => bitcast(value, target)?,
        (op, value, _) => {
            return Err(CodegenError::execution(format!(
                "cannot apply {op} to {value:?}"
            )))
        }
    })
}

/// Reinterpret the bits of a scalar; widths were checked when the cast was built
fn bitcast(value: Val, target: &TypeData) -> Result<Val> {
    Ok(match (value, target) {
        (Val::Int { value, .. }, TypeData::Int(to)) => Val::Int { bits: *to, value },
        (Val::Int { value, .. }, TypeData::F32) => Val::F32(f32::from_bits(value as u32)),
        (Val::Int { value, .. }, TypeData::F64) => Val::F64(f64::from_bits(value)),
        (Val::F32(v), TypeData::Int(to)) => Val::Int { bits: *to, value: u64::from(v.to_bits()) },
        (Val::F64(v), TypeData::Int(to)) => Val::Int { bits: *to, value: v.to_bits() },
        (value @ (Val::F32(_) | Val::F64(_)), TypeData::F32 | TypeData::F64) => value,
        (value @ Val::Ptr(_), TypeData::Pointer(_)) => value,
        (value, target) => {
            return Err(CodegenError::execution(format!(
                "unsupported bitcast of {value:?} to {target:?}"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rcg_common::ErrorKind;
    use rcg_ir::Builder;

    fn engine() -> Interpreter {
        target::init(Arch::X86_64).unwrap();
        Interpreter::new().unwrap()
    }

    #[test]
    fn test_options_default_and_serde() {
        let options = EngineOptions::default();
        assert_eq!(options.max_call_depth, 512);
        assert_eq!(options.max_steps, 10_000_000);
        assert_eq!(options.max_cells, 1 << 24);

        let parsed: EngineOptions = serde_json::from_str(r#"{"max_steps": 10}"#).unwrap();
        assert_eq!(parsed, EngineOptions { max_steps: 10, ..EngineOptions::default() });
    }

    #[test]
    fn test_arity_and_coercion() {
        let mut module = Module::new("arity");
        let i8_ty = module.types.i8();
        let f = module.declare_function("id", i8_ty, &[i8_ty], false).unwrap();
        let entry = module.append_block(f, "entry");
        let param = module.params(f)[0];
        Builder::at_end(&mut module, entry).ret(param).unwrap();

        let mut engine = engine();
        let err = engine.run_function(&module, f, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);

        let err = engine.run_function(&module, f, &[1.5f64.into()]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Argument);

        let result = engine.run_function(&module, f, &[GenericValue::from(257i32)]).unwrap();
        assert_eq!(result.to_u64(), Some(1));
    }

    #[test]
    fn test_runaway_loop_hits_step_limit() {
        let mut module = Module::new("spin");
        let void = module.types.void();
        let f = module.declare_function("spin", void, &[], false).unwrap();
        let entry = module.append_block(f, "entry");
        Builder::at_end(&mut module, entry).br(entry).unwrap();

        target::init(Arch::X86_64).unwrap();
        let mut engine = Interpreter::with_options(EngineOptions { max_steps: 100, ..Default::default() }).unwrap();
        let err = engine.run_function(&module, f, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_oversized_allocations_fail() {
        let mut module = Module::new("big");
        let i32_ty = module.types.i32();
        let i64_ty = module.types.i64();
        let big = module.declare_function("big", i32_ty, &[i64_ty], false).unwrap();
        let entry = module.append_block(big, "entry");
        let count = module.params(big)[0];
        let zero = module.const_int(i32_ty, 0).unwrap();
        let mut builder = Builder::at_end(&mut module, entry);
        builder.array_alloca(i32_ty, count).unwrap();
        builder.ret(zero).unwrap();

        let row = module.types.array(i32_ty, 1 << 40).unwrap();
        let wide = module.declare_function("wide", i32_ty, &[], false).unwrap();
        let entry = module.append_block(wide, "entry");
        let mut builder = Builder::at_end(&mut module, entry);
        builder.alloca(row).unwrap();
        builder.ret(zero).unwrap();

        let mut engine = engine();
        let err = engine.run_function(&module, big, &[GenericValue::from(1i64 << 60)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        let err = engine.run_function(&module, wide, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);

        let result = engine.run_function(&module, big, &[GenericValue::from(8i64)]).unwrap();
        assert_eq!(result.to_u64(), Some(0));

        let options = EngineOptions { max_cells: 4, ..Default::default() };
        let mut engine = Interpreter::with_options(options).unwrap();
        let err = engine.run_function(&module, big, &[GenericValue::from(8i64)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_unbounded_recursion_hits_depth_limit() {
        let mut module = Module::new("deep");
        let void = module.types.void();
        let f = module.declare_function("deep", void, &[], false).unwrap();
        let entry = module.append_block(f, "entry");
        let mut builder = Builder::at_end(&mut module, entry);
        builder.call(f, &[]).unwrap();
        builder.ret_void().unwrap();

        target::init(Arch::X86_64).unwrap();
        let options = EngineOptions { max_call_depth: 16, ..Default::default() };
        let mut engine = Interpreter::with_options(options).unwrap();
        let err = engine.run_function(&module, f, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_traps() {
        let mut module = Module::new("traps");
        let i32_ty = module.types.i32();
        let div = module.declare_function("div", i32_ty, &[i32_ty, i32_ty], false).unwrap();
        let entry = module.append_block(div, "entry");
        let (a, b) = (module.params(div)[0], module.params(div)[1]);
        let mut builder = Builder::at_end(&mut module, entry);
        let q = builder.sdiv(a, b).unwrap();
        builder.ret(q).unwrap();

        let void = module.types.void();
        let dead = module.declare_function("dead", void, &[], false).unwrap();
        let entry = module.append_block(dead, "entry");
        Builder::at_end(&mut module, entry).unreachable().unwrap();

        let open = module.declare_function("open", void, &[], false).unwrap();
        module.append_block(open, "entry");

        let mut engine = engine();
        let err = engine
            .run_function(&module, div, &[7i32.into(), 0i32.into()])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert_eq!(engine.run_function(&module, dead, &[]).unwrap_err().kind(), ErrorKind::Execution);
        assert_eq!(engine.run_function(&module, open, &[]).unwrap_err().kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_global_initializer_and_store() {
        let mut module = Module::new("globals");
        let i32_ty = module.types.i32();
        let counter = module.add_global(i32_ty, "counter").unwrap();
        let forty = module.const_int(i32_ty, 40).unwrap();
        module.set_initializer(counter, forty).unwrap();

        let bump = module.declare_function("bump", i32_ty, &[], false).unwrap();
        let entry = module.append_block(bump, "entry");
        let mut builder = Builder::at_end(&mut module, entry);
        let two = builder.module_mut().const_int(i32_ty, 2).unwrap();
        let old = builder.load(counter).unwrap();
        let new = builder.add(old, two).unwrap();
        builder.store(new, counter).unwrap();
        let again = builder.load(counter).unwrap();
        builder.ret(again).unwrap();

        let mut engine = engine();
        assert_eq!(engine.run_function(&module, bump, &[]).unwrap().to_i64(), Some(42));
        // each run starts from the initializer
        assert_eq!(engine.run_function(&module, bump, &[]).unwrap().to_i64(), Some(42));
    }
}
