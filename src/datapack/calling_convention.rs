// This module implements the frame-stack calling convention of the datapack target. Every
// activation that has arguments or persistent locals owns one compound on the frame stack:
// argument i lives in field a<i> and frame local i in field l<i>. A caller builds the callee's
// frame in a scratch compound, appends it to the stack and invokes the callee; callers only
// push when the callee takes arguments, which is known from the call site alone, so recursion
// needs no lookahead. A callee without arguments but with frame locals pushes an empty frame in
// its prologue. Whoever owns a frame, the callee pops it on every return, which keeps pushes and
// pops balanced on every path. The module also derives mangling tags from signatures and the
// macro literal export wrappers use to pack external parameters.

//! Frame-stack calling convention.

use crate::core::error::{CompileError, CompileResult};
use crate::core::value_assignment::Location;
use crate::ir::Slot;
use crate::tree::{Kind, Signature};

/// Frame requirements of one function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub arg_count: usize,
    pub frame_size: usize,
}

impl FrameLayout {
    pub fn new(arg_count: usize, frame_size: usize) -> Self {
        Self { arg_count, frame_size }
    }

    /// The function runs with its own frame on top of the stack.
    pub fn needs_frame(&self) -> bool {
        self.arg_count + self.frame_size > 0
    }

    /// No caller pushes a frame for this function, so its prologue does.
    pub fn pushes_own_frame(&self) -> bool {
        self.arg_count == 0 && self.frame_size > 0
    }

    /// Whether a call passing `arg_count` arguments pushes a frame.
    pub fn caller_pushes(arg_count: usize) -> bool {
        arg_count > 0
    }
}

pub fn argument_field(index: usize) -> String {
    format!("a{index}")
}

pub fn local_field(index: usize) -> String {
    format!("l{index}")
}

/// Frame field of `slot`, for sites that cannot read a register.
pub fn frame_field(slot: Slot, location: Location) -> CompileResult<String> {
    match location {
        Location::Argument(i) => Ok(argument_field(i)),
        Location::Local(i) => Ok(local_field(i)),
        Location::Register(_) => Err(CompileError::RegisterAtFrameSite { slot }),
        Location::None => Err(CompileError::UnplacedSlot { slot }),
    }
}

/// Macro placeholder substituting a frame field.
pub fn placeholder(field: &str) -> String {
    format!("$({field})")
}

/// Signature part of an internal unit name: argument kind letters, `_`, return letter.
pub fn mangle_tag(signature: &Signature) -> String {
    let mut tag: String = signature.args.iter().map(|kind| kind.tag()).collect();
    if tag.is_empty() {
        tag.push('v');
    }
    tag.push('_');
    tag.push(signature.ret.tag());
    tag
}

/// Compound literal an export's macro line stores into the next frame.
pub fn export_frame_literal(params: &[String], kinds: &[Kind]) -> String {
    let fields: Vec<String> = params
        .iter()
        .zip(kinds)
        .enumerate()
        .map(|(i, (param, kind))| {
            let value = placeholder(param);
            match kind {
                Kind::String => format!("{}:\"{}\"", argument_field(i), value),
                _ => format!("{}:{}", argument_field(i), value),
            }
        })
        .collect();
    format!("{{{}}}", fields.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::register_file::ScratchReg;

    #[test]
    fn test_frame_ownership() {
        let leaf = FrameLayout::new(0, 0);
        assert!(!leaf.needs_frame());
        assert!(!leaf.pushes_own_frame());

        let counter = FrameLayout::new(0, 2);
        assert!(counter.needs_frame());
        assert!(counter.pushes_own_frame());

        let fact = FrameLayout::new(1, 1);
        assert!(fact.needs_frame());
        assert!(!fact.pushes_own_frame());
        assert!(FrameLayout::caller_pushes(fact.arg_count));
        assert!(!FrameLayout::caller_pushes(0));
    }

    #[test]
    fn test_frame_fields() {
        assert_eq!(frame_field(Slot::arg(1), Location::Argument(1)).unwrap(), "a1");
        assert_eq!(frame_field(Slot::local(4), Location::Local(0)).unwrap(), "l0");
        assert!(matches!(
            frame_field(Slot::local(2), Location::Register(ScratchReg::R0)),
            Err(CompileError::RegisterAtFrameSite { .. })
        ));
        assert!(matches!(
            frame_field(Slot::local(2), Location::None),
            Err(CompileError::UnplacedSlot { .. })
        ));
    }

    #[test]
    fn test_mangle_tag() {
        assert_eq!(mangle_tag(&Signature::new(vec![], Kind::Empty)), "v_e");
        let signature = Signature::new(vec![Kind::Number, Kind::String], Kind::Compound);
        assert_eq!(mangle_tag(&signature), "ns_c");
    }

    #[test]
    fn test_export_literal_quotes_strings() {
        let params = vec!["x".to_string(), "who".to_string()];
        let literal = export_frame_literal(&params, &[Kind::Number, Kind::String]);
        assert_eq!(literal, "{a0:$(x),a1:\"$(who)\"}");
    }
}
