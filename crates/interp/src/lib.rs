#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]

mod error;

use std::{
	hint,
	io::{ErrorKind, Read, Write},
};

use forge_ir::{Op, Program};
use tracing::{debug, trace};

pub use self::error::RuntimeError;

/// Executes a lowered program against a freshly zeroed tape.
///
/// The input and output streams are injected so tests can run fully
/// in-memory; the binary hands in locked stdio.
pub struct Interpreter<R, W> {
	input: R,
	output: W,
	flush_writes: bool,
}

impl<R: Read, W: Write> Interpreter<R, W> {
	pub const fn new(input: R, output: W) -> Self {
		Self {
			input,
			output,
			flush_writes: false,
		}
	}

	/// Flush the output stream after every written byte instead of only at
	/// input requests and exit.
	#[must_use]
	pub fn flush_writes(mut self, flush: bool) -> Self {
		self.flush_writes = flush;
		self
	}

	/// Runs `program` to completion on a zeroed tape of `heap_size` cells,
	/// then writes a trailing newline, matching the emitted executables.
	#[tracing::instrument(skip_all, fields(ops = program.len(), heap_size))]
	pub fn run(&mut self, program: &Program, heap_size: usize) -> Result<(), RuntimeError> {
		let mut tape = vec![0u8; heap_size];
		let mut ptr = 0usize;
		let mut pc = 0usize;

		let ops = program.ops();

		while let Some(op) = ops.get(pc) {
			match *op {
				Op::MovePtr(delta) => ptr = offset(ptr, delta, heap_size)?,
				Op::Add(value) => tape[ptr] = tape[ptr].wrapping_add_signed(value),
				Op::Assign(value) => tape[ptr] = value,
				Op::Putchar => self.put(tape[ptr])?,
				Op::Getchar => self.get(&mut tape[ptr])?,
				Op::LoopStart { end } | Op::IfStart { end } => {
					if tape[ptr] == 0 {
						pc = end;
					}
				}
				Op::LoopEnd { start } => {
					if tape[ptr] != 0 {
						pc = start;
					}
				}
				Op::IfEnd => {}
				Op::SearchZero(stride) => {
					while tape[ptr] != 0 {
						ptr = offset(ptr, stride, heap_size)?;
					}
				}
				Op::AddVar(delta) => {
					let target = offset(ptr, delta, heap_size)?;
					tape[target] = tape[target].wrapping_add(tape[ptr]);
				}
				Op::SubVar(delta) => {
					let target = offset(ptr, delta, heap_size)?;
					tape[target] = tape[target].wrapping_sub(tape[ptr]);
				}
				Op::AddMulVar { offset: delta, factor } => {
					let target = offset(ptr, delta, heap_size)?;
					tape[target] =
						tape[target].wrapping_add(tape[ptr].wrapping_mul(factor as u8));
				}
				Op::InfLoop => {
					if tape[ptr] != 0 {
						trace!("entering infinite loop");
						loop {
							hint::spin_loop();
						}
					}
				}
				Op::BreakPoint => {
					debug!(pc, ptr, cell = tape[ptr], "breakpoint");
				}
			}

			pc += 1;
		}

		self.output.write_all(b"\n")?;
		self.output.flush()?;

		Ok(())
	}

	fn put(&mut self, value: u8) -> Result<(), RuntimeError> {
		self.output.write_all(&[value])?;
		if self.flush_writes {
			self.output.flush()?;
		}

		Ok(())
	}

	/// Reads one byte into `cell`; end of input leaves it unchanged.
	fn get(&mut self, cell: &mut u8) -> Result<(), RuntimeError> {
		self.output.flush()?;

		let mut byte = 0u8;
		match self.input.read_exact(std::slice::from_mut(&mut byte)) {
			Ok(()) => *cell = byte,
			Err(e) if e.kind() == ErrorKind::UnexpectedEof => {}
			Err(e) => return Err(e.into()),
		}

		Ok(())
	}
}

fn offset(ptr: usize, delta: i32, heap_size: usize) -> Result<usize, RuntimeError> {
	let target = ptr as i64 + i64::from(delta);

	if (0..heap_size as i64).contains(&target) {
		Ok(target as usize)
	} else {
		Err(RuntimeError::OutOfBounds {
			position: target,
			heap_size,
		})
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use forge_compiler::{LowerOptions, lower};

	use super::{Interpreter, RuntimeError};

	const HELLO_WORLD: &str = "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]\
		>>.>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.";

	fn run_with_input(source: &str, input: &[u8]) -> Vec<u8> {
		run_with_options(source, input, LowerOptions::new())
	}

	fn run_with_options(source: &str, input: &[u8], options: LowerOptions) -> Vec<u8> {
		let program = lower(source.as_bytes(), options).unwrap();
		let mut output = Vec::new();

		Interpreter::new(Cursor::new(input.to_vec()), &mut output)
			.run(&program, 65536)
			.unwrap();

		output
	}

	fn run(source: &str) -> Vec<u8> {
		run_with_input(source, &[])
	}

	/// The single-step reference: no IR, bracket jumps found by scanning.
	fn run_naive(source: &str, input: &[u8]) -> Vec<u8> {
		let code: Vec<char> = source
			.chars()
			.filter(|c| "+-><.,[]".contains(*c))
			.collect();
		let mut tape = vec![0u8; 65536];
		let mut ptr = 0usize;
		let mut pc = 0usize;
		let mut output = Vec::new();
		let mut input = input.iter().copied();

		while pc < code.len() {
			match code[pc] {
				'+' => tape[ptr] = tape[ptr].wrapping_add(1),
				'-' => tape[ptr] = tape[ptr].wrapping_sub(1),
				'>' => ptr += 1,
				'<' => ptr -= 1,
				'.' => output.push(tape[ptr]),
				',' => {
					if let Some(byte) = input.next() {
						tape[ptr] = byte;
					}
				}
				'[' => {
					if tape[ptr] == 0 {
						let mut depth = 1;
						while depth > 0 {
							pc += 1;
							match code[pc] {
								'[' => depth += 1,
								']' => depth -= 1,
								_ => {}
							}
						}
					}
				}
				']' => {
					if tape[ptr] != 0 {
						let mut depth = 1;
						while depth > 0 {
							pc -= 1;
							match code[pc] {
								'[' => depth += 1,
								']' => depth -= 1,
								_ => {}
							}
						}
					}
				}
				_ => unreachable!(),
			}

			pc += 1;
		}

		output
	}

	#[test]
	fn move_loop_transfers_and_restores_pointer() {
		assert_eq!(run(">>>+++++[->+<].>."), [0, 5, b'\n']);
	}

	#[test]
	fn clear_loop_zeroes_only_the_current_cell() {
		assert_eq!(run(">+>+>+>+[-].<.<.<.<."), [0, 1, 1, 1, 0, b'\n']);
	}

	#[test]
	fn eof_leaves_the_cell_unchanged() {
		assert_eq!(run_with_input(",.,.,.", b"AB"), *b"AB\0\n");
	}

	#[test]
	fn eof_preserves_earlier_writes() {
		assert_eq!(run_with_input("+++,.", b""), [3, b'\n']);
	}

	#[test]
	fn nested_multiply_loops() {
		assert_eq!(run("+++[>+++[>++<-]<-].>.>."), [0, 0, 18, b'\n']);
	}

	#[test]
	fn multiply_scenario_prints_seven() {
		assert_eq!(run("++>+++++[<+>-]<."), [7, b'\n']);
	}

	#[test]
	fn cell_arithmetic_wraps() {
		let source = format!("{}.", "+".repeat(300));

		assert_eq!(run(&source), [44, b'\n']);
	}

	#[test]
	fn search_zero_stops_on_first_zero_cell() {
		assert_eq!(run("++>+>+<<[>]<.<.<."), [1, 1, 2, b'\n']);
	}

	#[test]
	fn hello_world() {
		assert_eq!(run(HELLO_WORLD), *b"Hello World!\n\n");
	}

	#[test]
	fn move_left_from_zero_is_out_of_bounds() {
		let program = lower(b"<", LowerOptions::new()).unwrap();
		let mut output = Vec::new();

		let err = Interpreter::new(Cursor::new(Vec::new()), &mut output)
			.run(&program, 65536)
			.unwrap_err();

		assert!(matches!(
			err,
			RuntimeError::OutOfBounds {
				position: -1,
				heap_size: 65536
			}
		));
	}

	#[test]
	fn pointer_past_the_heap_is_out_of_bounds() {
		let program = lower(b">>>>", LowerOptions::new()).unwrap();
		let mut output = Vec::new();

		let err = Interpreter::new(Cursor::new(Vec::new()), &mut output)
			.run(&program, 4)
			.unwrap_err();

		assert!(matches!(
			err,
			RuntimeError::OutOfBounds {
				position: 4,
				heap_size: 4
			}
		));
	}

	#[test]
	fn search_zero_is_bounds_checked() {
		let program = lower(b"+[<]", LowerOptions::new()).unwrap();
		let mut output = Vec::new();

		let err = Interpreter::new(Cursor::new(Vec::new()), &mut output)
			.run(&program, 65536)
			.unwrap_err();

		assert!(matches!(err, RuntimeError::OutOfBounds { position: -1, .. }));
	}

	#[test]
	fn transfer_targets_are_bounds_checked() {
		let program = lower(b"+[-<+>]", LowerOptions::new()).unwrap();
		let mut output = Vec::new();

		let err = Interpreter::new(Cursor::new(Vec::new()), &mut output)
			.run(&program, 65536)
			.unwrap_err();

		assert!(matches!(err, RuntimeError::OutOfBounds { position: -1, .. }));
	}

	#[test]
	fn matches_single_step_execution() {
		let corpus: &[(&str, &[u8])] = &[
			(HELLO_WORLD, b""),
			("++>+++++[<+>-]<.", b""),
			("+++[>+++[>++<-]<-].>.>.", b""),
			(",[.,]", b"brainforge\0"),
			(",.,.,.", b"AB"),
			(">+>+>+>+[-].<.<.<.<.", b""),
			("++[>++[-]+<-]>.", b""),
		];

		for &(source, input) in corpus {
			let mut expected = run_naive(source, input);
			expected.push(b'\n');

			assert_eq!(
				run_with_input(source, input),
				expected,
				"optimized output diverged for {source:?}"
			);

			let fusion_only = LowerOptions {
				idioms: false,
				..LowerOptions::new()
			};
			assert_eq!(
				run_with_options(source, input, fusion_only),
				expected,
				"fusion-only output diverged for {source:?}"
			);
		}
	}
}
