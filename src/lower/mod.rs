//! Lower: turn each method's operand-stack bytecode into a typed, stack-free
//! TIR body. The simulation itself lives in `sim`; this module drives it per
//! method and resolves legacy `jsr`/`ret` subroutines by inlining before the
//! simulator runs.

pub mod fold;
pub mod sim;
pub mod tir;

use log::debug;

use crate::code::{AddressedInstruction, Instruction, InstructionStream, ValueKind};
use crate::error::{TranspileError, Unsupported};
use crate::model::{MethodModel, ProgramModel};

/// Lower every method body in the program. Per-method all-or-nothing: the
/// first failure aborts the build.
pub fn lower_program(program: &mut ProgramModel) -> Result<(), TranspileError> {
    let names: Vec<String> = program.classes.keys().cloned().collect();
    for name in names {
        let mut bodies = Vec::new();
        {
            let class = &program.classes[&name];
            for (mi, method) in class.methods.iter().enumerate() {
                if method.is_abstract() || method.is_native() || method.instructions.is_empty() {
                    continue;
                }
                let stream = inline_subroutines(&name, method)?;
                let body = sim::lower_method(program, class, method, &stream)?;
                bodies.push((mi, body));
            }
        }
        debug!("lowered {} method bodies in {}", bodies.len(), name);
        let class = program.classes.get_mut(&name).expect("class exists");
        for (mi, body) in bodies {
            class.methods[mi].tir = Some(body);
        }
    }
    Ok(())
}

/// Replace every `jsr` call site with a clone of the subroutine body whose
/// `ret` becomes a plain goto back to the call site's continuation. The
/// original subroutine bodies are dropped afterwards; recursion is rejected.
pub fn inline_subroutines(
    class_name: &str,
    method: &MethodModel,
) -> Result<InstructionStream, TranspileError> {
    let stream = &method.instructions;
    if !stream
        .iter()
        .any(|i| matches!(i.instruction, Instruction::Jsr { .. }))
    {
        return Ok(stream.clone());
    }

    let unsupported = |offset: u32, recursive: bool| -> TranspileError {
        if recursive {
            Unsupported::RecursiveSubroutine {
                class: class_name.to_string(),
                method: method.name.clone(),
                offset,
            }
            .into()
        } else {
            Unsupported::IrregularSubroutine {
                class: class_name.to_string(),
                method: method.name.clone(),
                offset,
            }
            .into()
        }
    };

    let mut result = stream.clone();
    // Fresh offsets for clones live past everything already in the stream.
    let mut next_offset = stream.iter().map(|i| i.offset).max().unwrap_or(0) + 16;
    // For each emitted clone: its offset range and the chain of subroutine
    // entries it was inlined through, for recursion detection.
    let mut clones: Vec<(u32, u32, Vec<u32>)> = Vec::new();
    let mut sub_ranges: Vec<(u32, u32)> = Vec::new();

    // Iterate until no live jsr remains; nested subroutines re-introduce
    // them inside the clones. Call sites inside an already-discovered
    // subroutine body are skipped: that body is dropped at the end, so
    // inlining them would only manufacture orphan clones.
    while let Some(site) = result.iter().position(|i| {
        matches!(i.instruction, Instruction::Jsr { .. })
            && !sub_ranges
                .iter()
                .any(|&(start, end)| i.offset >= start && i.offset < end)
    }) {
        let (site_offset, target) = match result[site].instruction {
            Instruction::Jsr { target } => (result[site].offset, target),
            _ => unreachable!(),
        };
        let chain: Vec<u32> = clones
            .iter()
            .find(|(start, end, _)| site_offset >= *start && site_offset < *end)
            .map(|(_, _, chain)| chain.clone())
            .unwrap_or_default();
        if chain.contains(&target) {
            return Err(unsupported(site_offset, true));
        }

        let continuation = result
            .get(site + 1)
            .map(|i| i.offset)
            .ok_or_else(|| unsupported(site_offset, false))?;

        let body = subroutine_body(stream, target).ok_or_else(|| unsupported(target, false))?;
        let (body_start, body_end) = (body.first().unwrap().offset, {
            let last = body.last().unwrap();
            last.offset + 1
        });
        sub_ranges.push((body_start, body_end));

        // Map original body offsets to clone offsets.
        let base = next_offset;
        let offset_of = |orig: u32| base + (orig - body_start);
        next_offset += body_end - body_start + 16;

        let mut clone = Vec::with_capacity(body.len());
        for (bi, insn) in body.iter().enumerate() {
            let new_offset = offset_of(insn.offset);
            let new_insn = match &insn.instruction {
                // Entry stores the pushed return address; nothing to store
                // once inlined.
                Instruction::Store {
                    kind: ValueKind::Reference,
                    ..
                } if bi == 0 => Instruction::Nop,
                Instruction::Pop { .. } if bi == 0 => Instruction::Nop,
                Instruction::Ret { .. } => Instruction::Goto {
                    target: continuation,
                },
                other => {
                    let mut mapped = other.clone();
                    remap_targets(&mut mapped, body_start, body_end, &offset_of);
                    mapped
                }
            };
            clone.push(AddressedInstruction {
                offset: new_offset,
                instruction: new_insn,
            });
        }

        // The call site becomes a jump into the clone; the clone is appended.
        result[site].instruction = Instruction::Goto { target: base };
        let clone_end = base + (body_end - body_start);
        result.extend(clone);
        let mut new_chain = chain;
        new_chain.push(target);
        clones.push((base, clone_end, new_chain));
    }

    // Drop the now-unreachable original subroutine bodies.
    result.retain(|i| {
        !sub_ranges
            .iter()
            .any(|&(start, end)| i.offset >= start && i.offset < end)
    });
    Ok(result)
}

/// The linear body of a subroutine: from its entry up to and including the
/// `ret` that ends it. Compilers emit subroutines as contiguous ranges.
fn subroutine_body(stream: &InstructionStream, entry: u32) -> Option<Vec<AddressedInstruction>> {
    let start = stream.iter().position(|i| i.offset == entry)?;
    let mut body = Vec::new();
    for insn in &stream[start..] {
        body.push(insn.clone());
        if matches!(insn.instruction, Instruction::Ret { .. }) {
            return Some(body);
        }
    }
    None
}

/// Rewrite branch targets that stay inside the cloned range; targets outside
/// the subroutine keep their absolute offsets.
fn remap_targets(insn: &mut Instruction, start: u32, end: u32, offset_of: &impl Fn(u32) -> u32) {
    let map = |t: &mut u32| {
        if *t >= start && *t < end {
            *t = offset_of(*t);
        }
    };
    match insn {
        // Jsr targets always name a subroutine entry in the original stream
        // and are deliberately left unmapped; a self-target is how recursion
        // gets detected.
        Instruction::IfZero { target, .. }
        | Instruction::IfIntCmp { target, .. }
        | Instruction::IfRefCmp { target, .. }
        | Instruction::IfNull { target, .. }
        | Instruction::Goto { target } => map(target),
        Instruction::TableSwitch {
            default, targets, ..
        } => {
            map(default);
            for t in targets {
                map(t);
            }
        }
        Instruction::LookupSwitch { default, pairs } => {
            map(default);
            for (_, t) in pairs {
                map(t);
            }
        }
        _ => {}
    }
}
