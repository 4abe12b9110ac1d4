#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]

mod backend;
mod branch;
mod c;
mod elf;
mod pe;
mod target;
mod xbyak;

use std::io::{Result as IoResult, Seek, Write};

use forge_ir::{Op, Program};
use tracing::debug;

pub use self::{
	backend::{Backend, emit},
	c::CSource,
	elf::{ElfArmeabi, ElfX64, ElfX86},
	pe::{WinX64, WinX86},
	target::{ParseTargetError, Target},
	xbyak::XbyakSource,
};

/// Cells in the tape of every emitted program.
pub const TAPE_SIZE: u32 = 0x10000;

/// Emits `program` for `target` into `sink`.
///
/// Binary targets backpatch forward branches, so the sink has to be
/// seekable; textual targets only append.
#[tracing::instrument(skip(sink, program))]
pub fn emit_target<W: Write + Seek>(
	sink: &mut W,
	program: &Program,
	target: Target,
) -> IoResult<()> {
	debug!("emitting {} ops", program.len());

	match target {
		Target::C => {
			let breakpoints = has_breakpoints(program);
			emit(&mut CSource::new(&mut *sink, breakpoints), program)
		}
		Target::XbyakC => emit(&mut XbyakSource::new(&mut *sink), program),
		Target::WinX86 => emit(&mut WinX86::new(&mut *sink), program),
		Target::WinX64 => emit(&mut WinX64::new(&mut *sink), program),
		Target::ElfX86 => emit(&mut ElfX86::new(&mut *sink), program),
		Target::ElfX64 => emit(&mut ElfX64::new(&mut *sink), program),
		Target::ElfArmeabi => emit(&mut ElfArmeabi::new(&mut *sink), program),
	}
}

fn has_breakpoints(program: &Program) -> bool {
	program.iter().any(|op| matches!(op, Op::BreakPoint))
}
