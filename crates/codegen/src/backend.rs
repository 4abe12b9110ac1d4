use std::io::Result as IoResult;

use forge_ir::{Op, Program};

/// One code generation backend: a header, a footer, and one hook per op.
///
/// The control-flow hooks come with default bodies built from the loop
/// primitives: `if` brackets fall back to loop brackets, a zero search is
/// a loop around one pointer move, `inf_loop` an empty loop. Backends
/// override those when the target has a better rendition (the C backend
/// turns a unit search into `memchr`). The cell-transfer hooks
/// (`add_var`, `sub_var`, `add_mul_var`) read the current cell at run
/// time, which no combination of the other hooks can express, so every
/// backend implements them itself.
pub trait Backend {
	fn header(&mut self) -> IoResult<()>;

	fn footer(&mut self) -> IoResult<()>;

	fn move_ptr(&mut self, delta: i32) -> IoResult<()>;

	fn add(&mut self, value: i8) -> IoResult<()>;

	fn assign(&mut self, value: u8) -> IoResult<()>;

	fn putchar(&mut self) -> IoResult<()>;

	fn getchar(&mut self) -> IoResult<()>;

	fn loop_start(&mut self) -> IoResult<()>;

	fn loop_end(&mut self) -> IoResult<()>;

	fn if_start(&mut self) -> IoResult<()> {
		self.loop_start()
	}

	fn if_end(&mut self) -> IoResult<()> {
		self.loop_end()
	}

	fn search_zero(&mut self, stride: i32) -> IoResult<()> {
		self.loop_start()?;
		self.move_ptr(stride)?;
		self.loop_end()
	}

	/// `tape[p + offset] += tape[p]`.
	fn add_var(&mut self, offset: i32) -> IoResult<()>;

	/// `tape[p + offset] -= tape[p]`.
	fn sub_var(&mut self, offset: i32) -> IoResult<()>;

	/// `tape[p + offset] += tape[p] * factor`.
	fn add_mul_var(&mut self, offset: i32, factor: i8) -> IoResult<()>;

	fn inf_loop(&mut self) -> IoResult<()> {
		self.loop_start()?;
		self.loop_end()
	}

	fn breakpoint(&mut self) -> IoResult<()>;
}

/// Drives `backend` over the whole program in op order.
pub fn emit<B: Backend + ?Sized>(backend: &mut B, program: &Program) -> IoResult<()> {
	backend.header()?;

	for op in program {
		match *op {
			Op::MovePtr(delta) => backend.move_ptr(delta)?,
			Op::Add(value) => backend.add(value)?,
			Op::Assign(value) => backend.assign(value)?,
			Op::Putchar => backend.putchar()?,
			Op::Getchar => backend.getchar()?,
			Op::LoopStart { .. } => backend.loop_start()?,
			Op::LoopEnd { .. } => backend.loop_end()?,
			Op::IfStart { .. } => backend.if_start()?,
			Op::IfEnd => backend.if_end()?,
			Op::SearchZero(stride) => backend.search_zero(stride)?,
			Op::AddVar(offset) => backend.add_var(offset)?,
			Op::SubVar(offset) => backend.sub_var(offset)?,
			Op::AddMulVar { offset, factor } => backend.add_mul_var(offset, factor)?,
			Op::InfLoop => backend.inf_loop()?,
			Op::BreakPoint => backend.breakpoint()?,
		}
	}

	backend.footer()
}
