use std::collections::BTreeMap;

use forge_ir::{Op, Program};
use logos::Logos as _;
use tracing::debug;

use super::{CompileError, token::Token};

/// Knobs for [`lower`].
#[derive(Debug, Clone, Copy)]
pub struct LowerOptions {
	/// Recognise loop idioms (clear, transfer, pointer search) and fold
	/// constant assignments. Off means plain run fusion only.
	pub idioms: bool,
	/// Prepend one breakpoint before the first op.
	pub top_break_point: bool,
}

impl LowerOptions {
	#[must_use]
	pub const fn new() -> Self {
		Self {
			idioms: true,
			top_break_point: false,
		}
	}
}

impl Default for LowerOptions {
	fn default() -> Self {
		Self::new()
	}
}

/// Scans `source` and lowers it into IR.
///
/// The source is raw bytes: anything outside the alphabet is a comment
/// and ignored, without any encoding requirement, so the source does not
/// have to be trimmed first. The same source and options always produce
/// the same listing.
#[tracing::instrument(skip_all, fields(source_len = source.len()))]
pub fn lower(source: &[u8], options: LowerOptions) -> Result<Program, CompileError> {
	let mut lowerer = Lowerer::new(options);

	for (token, span) in Token::lexer(source).spanned() {
		let Ok(token) = token else { continue };

		lowerer.push(token, span.start)?;
	}

	let program = lowerer.finish()?;

	debug!("lowered {} bytes into {} ops", source.len(), program.len());

	Ok(program)
}

/// A `[` that has been emitted but not yet closed.
struct OpenBracket {
	/// Index of the placeholder [`Op::LoopStart`].
	index: usize,
	/// Byte offset of the `[` in the source, for diagnostics.
	offset: usize,
}

struct Lowerer {
	ops: Vec<Op>,
	open: Vec<OpenBracket>,
	idioms: bool,
}

impl Lowerer {
	fn new(options: LowerOptions) -> Self {
		let mut ops = Vec::new();
		if options.top_break_point {
			ops.push(Op::BreakPoint);
		}

		Self {
			ops,
			open: Vec::new(),
			idioms: options.idioms,
		}
	}

	fn push(&mut self, token: Token, offset: usize) -> Result<(), CompileError> {
		match token {
			Token::Increment => self.add(1),
			Token::Decrement => self.add(-1),
			Token::MoveRight => self.move_ptr(1),
			Token::MoveLeft => self.move_ptr(-1),
			Token::Output => self.ops.push(Op::Putchar),
			Token::Input => self.ops.push(Op::Getchar),
			Token::Break => self.ops.push(Op::BreakPoint),
			Token::LoopStart => {
				self.open.push(OpenBracket {
					index: self.ops.len(),
					offset,
				});
				self.ops.push(Op::LoopStart { end: 0 });
			}
			Token::LoopEnd => self.close(offset)?,
		}

		Ok(())
	}

	/// Emits `Add(value)`, fusing with a trailing `Add` and folding into a
	/// trailing `Assign`. A run that cancels out disappears entirely.
	fn add(&mut self, value: i8) {
		match self.ops.last_mut() {
			Some(Op::Add(prev)) => {
				let folded = prev.wrapping_add(value);
				if folded == 0 {
					self.ops.pop();
				} else {
					*prev = folded;
				}
			}
			Some(Op::Assign(prev)) if self.idioms => {
				*prev = prev.wrapping_add_signed(value);
			}
			_ => {
				if value != 0 {
					self.ops.push(Op::Add(value));
				}
			}
		}
	}

	fn move_ptr(&mut self, delta: i32) {
		match self.ops.last_mut() {
			Some(Op::MovePtr(prev)) => {
				let folded = prev.wrapping_add(delta);
				if folded == 0 {
					self.ops.pop();
				} else {
					*prev = folded;
				}
			}
			_ => {
				if delta != 0 {
					self.ops.push(Op::MovePtr(delta));
				}
			}
		}
	}

	/// Emits `Assign(value)`; consecutive assignments keep only the last.
	fn assign(&mut self, value: u8) {
		if let Some(Op::Assign(prev)) = self.ops.last_mut() {
			*prev = value;
		} else {
			self.ops.push(Op::Assign(value));
		}
	}

	fn close(&mut self, offset: usize) -> Result<(), CompileError> {
		let Some(open) = self.open.pop() else {
			return Err(CompileError::Syntax { offset });
		};

		let start = open.index;

		let rewrite = if self.idioms {
			rewrite_loop(&self.ops[start + 1..])
		} else {
			None
		};

		match rewrite {
			Some(rewrite) => {
				self.ops.truncate(start);
				self.apply_rewrite(rewrite);
			}
			None => {
				let end = self.ops.len();
				self.ops.push(Op::LoopEnd { start });
				self.ops[start] = Op::LoopStart { end };
			}
		}

		Ok(())
	}

	fn apply_rewrite(&mut self, rewrite: Rewrite) {
		match rewrite {
			Rewrite::InfLoop => self.ops.push(Op::InfLoop),
			Rewrite::Clear => self.assign(0),
			Rewrite::SearchZero(stride) => self.ops.push(Op::SearchZero(stride)),
			Rewrite::Transfer(changes) => {
				for (offset, factor) in changes {
					self.ops.push(match factor {
						1 => Op::AddVar(offset),
						-1 => Op::SubVar(offset),
						_ => Op::AddMulVar { offset, factor },
					});
				}
				self.assign(0);
			}
		}
	}

	fn finish(self) -> Result<Program, CompileError> {
		if let Some(open) = self.open.first() {
			return Err(CompileError::Syntax {
				offset: open.offset,
			});
		}

		Ok(Program::from_ops(self.ops)?)
	}
}

enum Rewrite {
	/// `[]`: hangs on a non-zero cell.
	InfLoop,
	/// `[-]` / `[+]`: zero the cell.
	Clear,
	/// `[>]`-alikes: scan for a zero cell.
	SearchZero(i32),
	/// Transfer loop: weighted adds at other offsets, then zero the cell.
	Transfer(Vec<(i32, i8)>),
}

fn rewrite_loop(body: &[Op]) -> Option<Rewrite> {
	match body {
		[] => Some(Rewrite::InfLoop),
		[Op::Add(1 | -1)] => Some(Rewrite::Clear),
		[Op::MovePtr(stride)] => Some(Rewrite::SearchZero(*stride)),
		_ => transfer_rewrite(body).map(Rewrite::Transfer),
	}
}

/// Matches a body of only `MovePtr`/`Add` that returns the pointer to its
/// start and decrements the current cell by exactly one per iteration.
/// Net changes are keyed by offset, so the emission order is stable.
fn transfer_rewrite(body: &[Op]) -> Option<Vec<(i32, i8)>> {
	let mut position = 0i32;
	let mut changes = BTreeMap::new();

	for op in body {
		match *op {
			Op::MovePtr(delta) => position = position.checked_add(delta)?,
			Op::Add(value) => {
				let slot = changes.entry(position).or_insert(0i8);
				*slot = slot.wrapping_add(value);
			}
			_ => return None,
		}
	}

	if position != 0 || changes.remove(&0)? != -1 {
		return None;
	}

	Some(
		changes
			.into_iter()
			.filter(|&(.., factor)| factor != 0)
			.collect(),
	)
}

#[cfg(test)]
mod tests {
	use forge_ir::Op;

	use super::{LowerOptions, lower};

	fn ops(source: &str) -> Vec<Op> {
		lower(source.as_bytes(), LowerOptions::new())
			.unwrap()
			.ops()
			.to_vec()
	}

	#[test]
	fn fuses_runs() {
		assert_eq!(ops("+++++"), [Op::Add(5)]);
		assert_eq!(ops("+++--"), [Op::Add(1)]);
		assert_eq!(ops(">>><"), [Op::MovePtr(2)]);
	}

	#[test]
	fn cancelling_runs_vanish() {
		assert_eq!(ops("+-"), []);
		assert_eq!(ops("><><"), []);
		assert_eq!(ops(""), []);
	}

	#[test]
	fn add_wraps_mod_256() {
		let source = "+".repeat(300);

		assert_eq!(ops(&source), [Op::Add(44)]);
	}

	#[test]
	fn ignores_comment_bytes() {
		assert_eq!(ops("abc + def + ghi!"), [Op::Add(2)]);
	}

	#[test]
	fn non_utf8_bytes_are_comments_too() {
		let source = b"\xff\xfe++\xc3(>\x80+++++\xf0[<+>-]\xed\xa0\x80<.";

		assert_eq!(
			lower(source, LowerOptions::new()).unwrap().ops(),
			[
				Op::Add(2),
				Op::MovePtr(1),
				Op::Add(5),
				Op::AddVar(-1),
				Op::Assign(0),
				Op::MovePtr(-1),
				Op::Putchar,
			]
		);
	}

	#[test]
	fn clear_loops_become_assign() {
		assert_eq!(ops("[-]"), [Op::Assign(0)]);
		assert_eq!(ops("[+]"), [Op::Assign(0)]);
	}

	#[test]
	fn assign_then_add_folds() {
		assert_eq!(ops("[-]+++"), [Op::Assign(3)]);
	}

	#[test]
	fn consecutive_assigns_keep_the_last() {
		assert_eq!(ops("[-][-]"), [Op::Assign(0)]);
		assert_eq!(ops("[-]++[+]"), [Op::Assign(0)]);
	}

	#[test]
	fn move_only_loops_become_search_zero() {
		assert_eq!(ops("[>]"), [Op::SearchZero(1)]);
		assert_eq!(ops("[<]"), [Op::SearchZero(-1)]);
		assert_eq!(ops("[<<<]"), [Op::SearchZero(-3)]);
	}

	#[test]
	fn move_loops_become_add_var() {
		assert_eq!(ops("[->+<]"), [Op::AddVar(1), Op::Assign(0)]);
		assert_eq!(ops("[-<->]"), [Op::SubVar(-1), Op::Assign(0)]);
	}

	#[test]
	fn multiply_loops_become_add_mul_var() {
		assert_eq!(
			ops("[->++<]"),
			[
				Op::AddMulVar {
					offset: 1,
					factor: 2
				},
				Op::Assign(0)
			]
		);
	}

	#[test]
	fn copy_loops_fan_out_in_offset_order() {
		assert_eq!(
			ops("[->>+<+<]"),
			[Op::AddVar(1), Op::AddVar(2), Op::Assign(0)]
		);
	}

	#[test]
	fn transfer_with_cancelled_target_still_clears() {
		assert_eq!(ops("[->+<>-<]"), [Op::Assign(0)]);
	}

	#[test]
	fn multiply_scenario_lowers_to_straight_line() {
		assert_eq!(
			ops("++>+++++[<+>-]<."),
			[
				Op::Add(2),
				Op::MovePtr(1),
				Op::Add(5),
				Op::AddVar(-1),
				Op::Assign(0),
				Op::MovePtr(-1),
				Op::Putchar,
			]
		);
	}

	#[test]
	fn empty_loop_becomes_inf_loop() {
		assert_eq!(ops("+[]"), [Op::Add(1), Op::InfLoop]);
	}

	#[test]
	fn loop_decrementing_by_two_stays_a_loop() {
		assert_eq!(
			ops("[--]"),
			[
				Op::LoopStart { end: 2 },
				Op::Add(-2),
				Op::LoopEnd { start: 0 }
			]
		);
	}

	#[test]
	fn io_loops_stay_loops() {
		assert_eq!(
			ops("[.-]"),
			[
				Op::LoopStart { end: 3 },
				Op::Putchar,
				Op::Add(-1),
				Op::LoopEnd { start: 0 }
			]
		);
	}

	#[test]
	fn nested_multiply_keeps_outer_loop() {
		assert_eq!(
			ops("+++[>+++[>++<-]<-]"),
			[
				Op::Add(3),
				Op::LoopStart { end: 8 },
				Op::MovePtr(1),
				Op::Add(3),
				Op::AddMulVar {
					offset: 1,
					factor: 2
				},
				Op::Assign(0),
				Op::MovePtr(-1),
				Op::Add(-1),
				Op::LoopEnd { start: 1 },
			]
		);
	}

	#[test]
	fn breakpoints_lower_in_place() {
		assert_eq!(
			ops("#+#"),
			[Op::BreakPoint, Op::Add(1), Op::BreakPoint]
		);
	}

	#[test]
	fn top_break_point_prepends_one() {
		let options = LowerOptions {
			top_break_point: true,
			..LowerOptions::new()
		};

		assert_eq!(
			lower(b"+", options).unwrap().ops(),
			[Op::BreakPoint, Op::Add(1)]
		);
	}

	#[test]
	fn without_idioms_loops_lower_verbatim() {
		let options = LowerOptions {
			idioms: false,
			..LowerOptions::new()
		};

		assert_eq!(
			lower(b"[-]", options).unwrap().ops(),
			[
				Op::LoopStart { end: 2 },
				Op::Add(-1),
				Op::LoopEnd { start: 0 }
			]
		);
	}

	#[test]
	fn unmatched_close_reports_byte_offset() {
		let err = lower(b"ab]", LowerOptions::new()).unwrap_err();

		assert_eq!(err.to_string(), "unmatched bracket at byte 2");
	}

	#[test]
	fn unmatched_open_reports_byte_offset() {
		let err = lower(b"++[", LowerOptions::new()).unwrap_err();

		assert_eq!(err.to_string(), "unmatched bracket at byte 2");
	}

	#[test]
	fn outermost_unmatched_open_wins() {
		let err = lower(b"[[]", LowerOptions::new()).unwrap_err();

		assert_eq!(err.to_string(), "unmatched bracket at byte 0");
	}

	#[test]
	fn lowering_is_deterministic() {
		let source = b"++[>+++[->++<]<-]>>[-]<,.#";

		assert_eq!(
			lower(source, LowerOptions::new()).unwrap(),
			lower(source, LowerOptions::new()).unwrap()
		);
	}
}
