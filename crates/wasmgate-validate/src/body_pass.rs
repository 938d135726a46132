//! The per-function type checker: a value stack plus a control-frame stack,
//! walked directly over the function's raw operator bytes.
//!
//! Frames track `unreachable` so that code after an unconditional branch can
//! elide its pops and pushes entirely, rather than threading an
//! `Option<ValueType>` "any type" placeholder through the whole stack as the
//! full polymorphic-stack algorithm does. This is a deliberately simplified
//! model: it rejects strictly less code than the full algorithm would (some
//! unreachable code with mismatched-but-never-executed types), but it never
//! accepts anything the full algorithm would reject.

extern crate alloc;

use alloc::vec::Vec;

use wasmgate_decode::BinaryReader;
use wasmgate_ir::{FuncIdx, FunctionDef, Instruction, Module};
use wasmgate_types::{Mutability, ResultType, ValueType};

use crate::error::{Error, IndexKind};

#[derive(Debug, Clone, Copy, PartialEq)]
enum FrameKind {
    Function,
    Block,
    Loop,
    IfThen,
    IfElse,
}

struct Frame {
    kind: FrameKind,
    /// The type a branch to this frame's label must carry: the block's
    /// result type for `block`/`if`, but the *parameter* type (always none,
    /// here) for `loop`, since branching to a loop re-enters at its start.
    branch_arg: ResultType,
    /// What this frame leaves on the stack when it completes normally.
    result: ResultType,
    /// Value-stack height at frame entry; `end`/`else` truncate back to this
    /// before pushing their result.
    height: usize,
    unreachable: bool,
}

struct Checker<'a> {
    func: u32,
    module: &'a Module,
    locals: &'a [ValueType],
    values: Vec<ValueType>,
    control: Vec<Frame>,
}

impl<'a> Checker<'a> {
    fn local_type(&self, local: u32) -> Option<ValueType> {
        self.locals.get(local as usize).copied()
    }

    fn current(&self) -> &Frame {
        self.control.last().expect("control stack never empties mid-body")
    }

    fn current_mut(&mut self) -> &mut Frame {
        self.control.last_mut().expect("control stack never empties mid-body")
    }

    fn push(&mut self, ty: ValueType) {
        self.values.push(ty);
    }

    fn pop(&mut self, offset: usize) -> Result<ValueType, Error> {
        if self.current().unreachable && self.values.len() <= self.current().height {
            // Stack is polymorphic past this point; synthesize nothing and
            // let the caller skip the type check.
            return Err(Error::StackUnderflow { func: self.func, offset });
        }
        self.values.pop().ok_or(Error::StackUnderflow { func: self.func, offset })
    }

    /// Pop a value and require it to match `expected`, unless the current
    /// frame is unreachable and the stack has already been drained to its
    /// entry height (in which case the pop is elided, per the simplified
    /// model).
    fn pop_expect(&mut self, expected: ValueType, offset: usize) -> Result<(), Error> {
        if self.current().unreachable && self.values.len() <= self.current().height {
            return Ok(());
        }
        match self.pop(offset) {
            Ok(actual) if actual == expected => Ok(()),
            Ok(actual) => Err(Error::TypeMismatch {
                func: self.func,
                offset,
                expected,
                actual,
            }),
            Err(e) => Err(e),
        }
    }

    fn push_frame(&mut self, kind: FrameKind, branch_arg: ResultType, result: ResultType) {
        self.control.push(Frame {
            kind,
            branch_arg,
            result,
            height: self.values.len(),
            unreachable: false,
        });
    }

    /// Set the current frame unreachable and drop every value pushed since
    /// entry: nothing past an unconditional branch is typed.
    fn set_unreachable(&mut self) {
        let height = self.current().height;
        self.values.truncate(height);
        self.current_mut().unreachable = true;
    }

    /// The frame `depth` labels away from the innermost (0 = innermost).
    fn frame_at_depth(&self, depth: u32, offset: usize) -> Result<&Frame, Error> {
        let len = self.control.len();
        let idx = depth as usize;
        if idx >= len {
            return Err(Error::BadBodyIndex {
                func: self.func,
                offset,
                kind: IndexKind::Label,
                index: depth,
            });
        }
        Ok(&self.control[len - 1 - idx])
    }
}

pub fn validate_body(module: &Module, func_idx: FuncIdx, def: &FunctionDef, errors: &mut Vec<Error>) {
    let func = func_idx.as_u32();
    let Some(ty) = module.func_type(func_idx) else {
        errors.push(Error::BadBodyIndex {
            func,
            offset: 0,
            kind: IndexKind::Type,
            index: def.type_idx.as_u32(),
        });
        return;
    };

    let mut locals = Vec::with_capacity(ty.params().len() + def.locals.len());
    locals.extend_from_slice(ty.params());
    locals.extend_from_slice(&def.locals);

    let mut checker = Checker {
        func,
        module,
        locals: &locals,
        values: Vec::new(),
        control: Vec::new(),
    };
    checker.push_frame(FrameKind::Function, ResultType::None, ty.result());

    let bytes = module.function_body_bytes(def);
    let mut reader = BinaryReader::new(bytes);

    while !checker.control.is_empty() {
        let offset = reader.original_position();
        if reader.eof() {
            errors.push(Error::UnterminatedFunction { func });
            return;
        }
        let instr = match reader.read_instruction() {
            Ok(i) => i,
            Err(source) => {
                errors.push(Error::Decode { func, offset, source });
                return;
            }
        };
        if let Err(e) = step(&mut checker, &instr, offset) {
            errors.push(e);
            return;
        }
    }

    if !reader.eof() {
        errors.push(Error::TrailingBytes {
            func,
            offset: reader.original_position(),
        });
    }
}

fn step(c: &mut Checker, instr: &Instruction, offset: usize) -> Result<(), Error> {
    if let Some(sig) = instr.simple_signature() {
        for &pop in sig.pops.iter().rev() {
            c.pop_expect(pop, offset)?;
        }
        if let Some(push) = sig.push {
            // MemorySize/MemoryGrow additionally require a memory.
            if matches!(instr, Instruction::MemorySize | Instruction::MemoryGrow) && c.module.total_mems() == 0 {
                return Err(Error::NoMemory { func: c.func, offset });
            }
            c.push(push);
        }
        return Ok(());
    }

    if let Some((memarg, ty, is_store)) = instr.memory_access() {
        if c.module.total_mems() == 0 {
            return Err(Error::NoMemory { func: c.func, offset });
        }
        let natural = instr.natural_alignment_log2().unwrap_or(0);
        if memarg.align > natural {
            return Err(Error::AlignmentTooLarge { func: c.func, offset });
        }
        if is_store {
            c.pop_expect(ty, offset)?;
            c.pop_expect(ValueType::I32, offset)?;
        } else {
            c.pop_expect(ValueType::I32, offset)?;
            c.push(ty);
        }
        return Ok(());
    }

    match instr {
        Instruction::Unreachable => c.set_unreachable(),
        Instruction::Nop => {}

        Instruction::Block { result } => c.push_frame(FrameKind::Block, *result, *result),
        Instruction::Loop { result } => c.push_frame(FrameKind::Loop, ResultType::None, *result),
        Instruction::If { result } => {
            c.pop_expect(ValueType::I32, offset)?;
            c.push_frame(FrameKind::IfThen, *result, *result);
        }
        Instruction::Else => {
            let frame = c.control.pop().expect("non-empty, checked by the driving loop");
            if frame.kind != FrameKind::IfThen {
                return Err(Error::ElseWithoutIf { func: c.func, offset });
            }
            if !frame.unreachable {
                if let Some(expected) = frame.result.as_value() {
                    c.pop_expect(expected, offset)?;
                }
                if c.values.len() != frame.height {
                    return Err(Error::StackNotEmpty { func: c.func, offset });
                }
            }
            c.values.truncate(frame.height);
            c.control.push(Frame {
                kind: FrameKind::IfElse,
                branch_arg: frame.branch_arg,
                result: frame.result,
                height: frame.height,
                unreachable: false,
            });
        }
        Instruction::End => {
            if c.current().kind == FrameKind::IfThen && c.current().result != ResultType::None {
                // An `if` that never saw an `else` has an implicit empty
                // else branch; that branch only type-checks against a
                // `none` result, so a non-`none` result here is an error
                // regardless of whether the `then` arm produced one.
                return Err(Error::IfWithoutElse { func: c.func, offset });
            }
            let frame = c.control.pop().expect("non-empty, checked by the driving loop");
            if !frame.unreachable {
                if let Some(expected) = frame.result.as_value() {
                    c.pop_expect(expected, offset)?;
                }
                if c.values.len() != frame.height {
                    return Err(Error::StackNotEmpty { func: c.func, offset });
                }
            }
            c.values.truncate(frame.height);
            if let Some(value) = frame.result.as_value() {
                c.push(value);
            }
        }

        Instruction::Br { depth } => {
            let arg = c.frame_at_depth(depth.as_u32(), offset)?.branch_arg;
            if let Some(expected) = arg.as_value() {
                c.pop_expect(expected, offset)?;
            }
            c.set_unreachable();
        }
        Instruction::BrIf { depth } => {
            c.pop_expect(ValueType::I32, offset)?;
            let arg = c.frame_at_depth(depth.as_u32(), offset)?.branch_arg;
            if let Some(expected) = arg.as_value() {
                if c.current().unreachable && c.values.len() <= c.current().height {
                    // Polymorphic: nothing real to peek, so nothing to push
                    // back either: pushing a synthetic value here would
                    // desynchronize the drained-stack check for every
                    // instruction after this one.
                } else {
                    // br_if leaves its argument on the stack for fallthrough,
                    // so peek rather than pop permanently: pop then push back.
                    c.pop_expect(expected, offset)?;
                    c.push(expected);
                }
            }
        }
        Instruction::BrTableOp { table } => {
            c.pop_expect(ValueType::I32, offset)?;
            let default_arg = c.frame_at_depth(table.default.as_u32(), offset)?.branch_arg;
            for target in &table.targets {
                let arg = c.frame_at_depth(target.as_u32(), offset)?.branch_arg;
                if arg != default_arg {
                    return Err(Error::BranchTargetMismatch { func: c.func, offset });
                }
            }
            if let Some(expected) = default_arg.as_value() {
                c.pop_expect(expected, offset)?;
            }
            c.set_unreachable();
        }
        Instruction::Return => {
            let arg = c.control[0].result;
            if let Some(expected) = arg.as_value() {
                c.pop_expect(expected, offset)?;
            }
            c.set_unreachable();
        }

        Instruction::Drop => {
            if c.current().unreachable && c.values.len() <= c.current().height {
                // Polymorphic: nothing to drop, nothing to type-check.
            } else {
                c.pop(offset)?;
            }
        }
        Instruction::Select => {
            c.pop_expect(ValueType::I32, offset)?;
            if c.current().unreachable && c.values.len() <= c.current().height {
                // Polymorphic: both operand types are unknowable here.
            } else {
                let a = c.pop(offset)?;
                c.pop_expect(a, offset)?;
                c.push(a);
            }
        }

        Instruction::LocalGet { local } => {
            let ty = c.local_type(local.as_u32()).ok_or(Error::BadBodyIndex {
                func: c.func,
                offset,
                kind: IndexKind::Local,
                index: local.as_u32(),
            })?;
            c.push(ty);
        }
        Instruction::LocalSet { local } => {
            let ty = c.local_type(local.as_u32()).ok_or(Error::BadBodyIndex {
                func: c.func,
                offset,
                kind: IndexKind::Local,
                index: local.as_u32(),
            })?;
            c.pop_expect(ty, offset)?;
        }
        Instruction::LocalTee { local } => {
            let ty = c.local_type(local.as_u32()).ok_or(Error::BadBodyIndex {
                func: c.func,
                offset,
                kind: IndexKind::Local,
                index: local.as_u32(),
            })?;
            c.pop_expect(ty, offset)?;
            c.push(ty);
        }
        Instruction::GlobalGet { global } => {
            let ty = c.module.global_type(*global).ok_or(Error::BadBodyIndex {
                func: c.func,
                offset,
                kind: IndexKind::Global,
                index: global.as_u32(),
            })?;
            c.push(ty.value);
        }
        Instruction::GlobalSet { global } => {
            let ty = c.module.global_type(*global).ok_or(Error::BadBodyIndex {
                func: c.func,
                offset,
                kind: IndexKind::Global,
                index: global.as_u32(),
            })?;
            if ty.mutability != Mutability::Var {
                return Err(Error::GlobalNotMutable { func: c.func, offset });
            }
            c.pop_expect(ty.value, offset)?;
        }

        Instruction::Call { func: callee } => {
            let ty = c.module.func_type(*callee).ok_or(Error::BadBodyIndex {
                func: c.func,
                offset,
                kind: IndexKind::Func,
                index: callee.as_u32(),
            })?;
            for &param in ty.params().iter().rev() {
                c.pop_expect(param, offset)?;
            }
            if let Some(result) = ty.result().as_value() {
                c.push(result);
            }
        }
        Instruction::CallIndirect { ty, table } => {
            if (table.as_u32() as usize) >= c.module.total_tables() {
                return Err(Error::NoTable { func: c.func, offset });
            }
            let func_ty = c.module.types.get(ty.as_u32() as usize).ok_or(Error::BadBodyIndex {
                func: c.func,
                offset,
                kind: IndexKind::Type,
                index: ty.as_u32(),
            })?;
            c.pop_expect(ValueType::I32, offset)?;
            for &param in func_ty.params().iter().rev() {
                c.pop_expect(param, offset)?;
            }
            if let Some(result) = func_ty.result().as_value() {
                c.push(result);
            }
        }

        Instruction::I32Const { .. } => c.push(ValueType::I32),
        Instruction::I64Const { .. } => c.push(ValueType::I64),
        Instruction::F32Const { .. } => c.push(ValueType::F32),
        Instruction::F64Const { .. } => c.push(ValueType::F64),

        _ => unreachable!("every opcode is covered by simple_signature, memory_access, or an explicit arm above"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmgate_decode::decode_module;
    use wasmgate_ir::TypeIdx;
    use wasmgate_types::FunctionType;

    fn build(code: &[u8], ty: FunctionType) -> Module {
        let mut module = Module::new();
        module.types.push(ty);
        module.code.extend_from_slice(code);
        module.funcs.push(FunctionDef {
            type_idx: TypeIdx::from_u32(0),
            locals: Vec::new(),
            code_offset: 0,
            code_len: code.len() as u32,
        });
        module
    }

    #[test]
    fn const_plus_end_type_checks() {
        let module = build(
            &[0x41, 0x2a, 0x0b],
            FunctionType::new(Vec::new(), ResultType::Value(ValueType::I32)),
        );
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn mismatched_result_type_is_rejected() {
        let module = build(
            &[0x41, 0x2a, 0x0b],
            FunctionType::new(Vec::new(), ResultType::Value(ValueType::F64)),
        );
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(matches!(errors[0], Error::TypeMismatch { .. }));
    }

    #[test]
    fn leftover_operand_at_function_end_is_rejected() {
        // i32.const 1; end. Type is [] -> [], so the i32 left on the stack
        // must be rejected even though nothing asked to consume it.
        let module = build(&[0x41, 0x01, 0x0b], FunctionType::new(Vec::new(), ResultType::None));
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(matches!(errors[0], Error::StackNotEmpty { .. }), "{errors:?}");
    }

    #[test]
    fn leftover_operand_at_block_end_is_rejected() {
        // block: i32.const 1; end. The block's declared result is none, so
        // the i32 left above the block's entry height must be rejected.
        let module = build(
            &[0x02, 0x40, 0x41, 0x01, 0x0b, 0x0b],
            FunctionType::new(Vec::new(), ResultType::None),
        );
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(matches!(errors[0], Error::StackNotEmpty { .. }), "{errors:?}");
    }

    #[test]
    fn stack_underflow_is_rejected() {
        let module = build(&[0x6a, 0x0b], FunctionType::new(Vec::new(), ResultType::None));
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(matches!(errors[0], Error::StackUnderflow { .. }));
    }

    #[test]
    fn unreachable_code_elides_type_checks() {
        // unreachable; i32.add: would underflow an empty stack if reachable.
        let module = build(&[0x00, 0x6a, 0x0b], FunctionType::new(Vec::new(), ResultType::None));
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn drop_after_unreachable_does_not_underflow() {
        // unreachable; drop: the dropped value is polymorphic, not an error.
        let module = build(&[0x00, 0x1a, 0x0b], FunctionType::new(Vec::new(), ResultType::None));
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn br_if_after_unreachable_does_not_desync_later_checks() {
        // block (result i32): unreachable; br_if 0; f64.add; end. Everything
        // past `unreachable` is polymorphic, so the f64.add that follows must
        // not be type-checked against a spuriously re-pushed i32. The block's
        // result falls through as the function's own result.
        let module = build(
            &[0x02, 0x7f, 0x00, 0x0d, 0x00, 0xa3, 0x0b, 0x0b],
            FunctionType::new(Vec::new(), ResultType::Value(ValueType::I32)),
        );
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn if_without_else_producing_a_value_is_rejected() {
        // i32.const 1; if (result i32) i32.const 2 end: missing else, non-nullary.
        let module = build(
            &[0x41, 0x01, 0x04, 0x7f, 0x41, 0x02, 0x0b, 0x0b],
            FunctionType::new(Vec::new(), ResultType::Value(ValueType::I32)),
        );
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(matches!(errors[0], Error::IfWithoutElse { .. }));
    }

    #[test]
    fn if_without_else_with_empty_result_is_accepted() {
        // i32.const 1; if i32.const 2 drop end: missing else, but result is none.
        let module = build(
            &[0x41, 0x01, 0x04, 0x40, 0x41, 0x02, 0x1a, 0x0b, 0x0b],
            FunctionType::new(Vec::new(), ResultType::None),
        );
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn branch_out_of_range_is_rejected() {
        let module = build(&[0x0c, 0x05, 0x0b], FunctionType::new(Vec::new(), ResultType::None));
        let mut errors = Vec::new();
        validate_body(&module, FuncIdx::from_u32(0), &module.funcs[0], &mut errors);
        assert!(matches!(errors[0], Error::BadBodyIndex { kind: IndexKind::Label, .. }));
    }

    #[test]
    fn decode_module_round_trip_still_type_checks() {
        let ty = FunctionType::new(alloc::vec![ValueType::I32], ResultType::Value(ValueType::I32));
        let module = build(&[0x20, 0x00, 0x0b], ty);
        let bytes = wasmgate_encode::encode_module(&module);
        let decoded = decode_module(&bytes).unwrap();
        let mut errors = Vec::new();
        validate_body(&decoded, FuncIdx::from_u32(0), &decoded.funcs[0], &mut errors);
        assert!(errors.is_empty(), "{errors:?}");
    }
}
