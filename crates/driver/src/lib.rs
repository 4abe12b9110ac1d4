#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]

mod error;
mod options;

use std::{
	borrow::Cow,
	fs,
	io::{self, BufWriter, Read, Seek, Write},
	path::Path,
};

use forge_codegen::emit_target;
use forge_compiler::{LowerOptions, lower};
use forge_interp::Interpreter;
use forge_ir::Program;
use tracing::{debug, info};

pub use forge_codegen::Target;
pub use self::{
	error::Error,
	options::{DEFAULT_HEAP_SIZE, Options},
};

/// Which pipeline the compiled IR is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileKind {
	/// IR for the interpreter; the optimize level decides how far
	/// lowering goes.
	Ir,
	/// IR for a code generation backend; always fully lowered.
	Jit,
}

/// The toolchain facade: holds one source buffer and, after [`compile`],
/// the IR lowered from it. Re-loading drops the previous program.
///
/// The buffer is raw bytes: anything outside the brainfuck alphabet is
/// comment content with no encoding requirement, so Latin-1 prose or
/// outright binary filler around the program is fine.
///
/// [`compile`]: Brainfuck::compile
#[derive(Debug, Default)]
pub struct Brainfuck {
	source: Vec<u8>,
	program: Option<Program>,
}

impl Brainfuck {
	#[must_use]
	pub const fn new() -> Self {
		Self {
			source: Vec::new(),
			program: None,
		}
	}

	pub fn load(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
		let path = path.as_ref();
		self.source = fs::read(path)?;
		self.program = None;

		info!("loaded {} bytes from {}", self.source.len(), path.display());

		Ok(())
	}

	pub fn load_reader(&mut self, mut reader: impl Read) -> io::Result<()> {
		let mut source = Vec::new();
		reader.read_to_end(&mut source)?;

		self.source = source;
		self.program = None;

		Ok(())
	}

	pub fn load_source(&mut self, source: impl Into<Vec<u8>>) {
		self.source = source.into();
		self.program = None;
	}

	/// Drops every byte outside the brainfuck alphabet (plus `#`).
	/// Idempotent; compilation does the same filtering on its own.
	pub fn trim(&mut self) {
		self.source.retain(|byte| b"+-><.,[]#".contains(byte));
	}

	/// The source as text, with any non-UTF-8 comment bytes replaced.
	/// After [`trim`](Brainfuck::trim) the buffer is pure ASCII, so the
	/// minify output is exact.
	#[must_use]
	pub fn source(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.source)
	}

	pub fn compile(&mut self, kind: CompileKind, options: &Options) -> Result<(), Error> {
		let idioms = match kind {
			CompileKind::Jit => true,
			CompileKind::Ir => options.optimize_level >= 1,
		};

		let program = lower(
			&self.source,
			LowerOptions {
				idioms,
				top_break_point: options.top_break_point,
			},
		)?;

		debug!("compiled {} ops for {kind:?}", program.len());
		self.program = Some(program);

		Ok(())
	}

	#[must_use]
	pub fn program(&self) -> Option<&Program> {
		self.program.as_ref()
	}

	pub fn dump_ir(&self, sink: &mut impl Write) -> Result<(), Error> {
		self.compiled()?.dump(sink)?;

		Ok(())
	}

	/// Interprets the compiled program against process stdio.
	pub fn execute(&self, heap_size: usize) -> Result<(), Error> {
		self.execute_with_stdio(heap_size, false)
	}

	pub fn execute_with_stdio(&self, heap_size: usize, flush_writes: bool) -> Result<(), Error> {
		let stdin = io::stdin().lock();
		let stdout = BufWriter::new(io::stdout().lock());

		self.execute_with(heap_size, stdin, stdout, flush_writes)
	}

	/// Interprets the compiled program with injected streams.
	pub fn execute_with<R: Read, W: Write>(
		&self,
		heap_size: usize,
		input: R,
		output: W,
		flush_writes: bool,
	) -> Result<(), Error> {
		let program = self.compiled()?;

		Interpreter::new(input, output)
			.flush_writes(flush_writes)
			.run(program, heap_size)?;

		Ok(())
	}

	/// Emits the compiled program for `target` into `sink`.
	pub fn emit<W: Write + Seek>(&self, sink: &mut W, target: Target) -> Result<(), Error> {
		emit_target(sink, self.compiled()?, target)?;

		Ok(())
	}

	fn compiled(&self) -> Result<&Program, Error> {
		self.program.as_ref().ok_or(Error::NotCompiled)
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use super::{Brainfuck, CompileKind, Error, Options, Target};

	fn compiled(source: &str) -> Brainfuck {
		let mut bf = Brainfuck::new();
		bf.load_source(source);
		bf.compile(CompileKind::Ir, &Options::default()).unwrap();
		bf
	}

	#[test]
	fn trim_keeps_only_the_alphabet() {
		let mut bf = Brainfuck::new();
		bf.load_source("say +hello+ > to the # world, [-].");
		bf.trim();

		assert_eq!(bf.source(), "++>#,[-].");
	}

	#[test]
	fn trim_is_idempotent() {
		let mut bf = Brainfuck::new();
		bf.load_source("leave [>+<-] alone. really!");
		bf.trim();
		let once = bf.source().into_owned();
		bf.trim();

		assert_eq!(bf.source(), once);
	}

	#[test]
	fn non_utf8_comment_bytes_are_tolerated() {
		let mut bf = Brainfuck::new();
		bf.load_source(*b"\xff\xfe binary art \x80\x81 ++>+++++[<+>-]<. \xf5");
		bf.trim();

		assert_eq!(bf.source(), "++>+++++[<+>-]<.");

		bf.compile(CompileKind::Ir, &Options::default()).unwrap();
		let mut output = Vec::new();
		bf.execute_with(65536, Cursor::new(Vec::new()), &mut output, false)
			.unwrap();

		assert_eq!(output, [7, b'\n']);
	}

	#[test]
	fn execute_runs_against_injected_stdio() {
		let bf = compiled("++>+++++[<+>-]<.");
		let mut output = Vec::new();

		bf.execute_with(65536, Cursor::new(Vec::new()), &mut output, false)
			.unwrap();

		assert_eq!(output, [7, b'\n']);
	}

	#[test]
	fn execute_before_compile_is_an_error() {
		let mut bf = Brainfuck::new();
		bf.load_source("+");

		assert!(matches!(
			bf.execute_with(16, Cursor::new(Vec::new()), Vec::new(), false),
			Err(Error::NotCompiled)
		));
	}

	#[test]
	fn reloading_invalidates_the_program() {
		let mut bf = compiled("+.");
		bf.load_source("-.");

		assert!(bf.program().is_none());
	}

	#[test]
	fn syntax_errors_surface_from_compile() {
		let mut bf = Brainfuck::new();
		bf.load_source("+[");

		let err = bf
			.compile(CompileKind::Ir, &Options::default())
			.unwrap_err();

		assert_eq!(err.to_string(), "unmatched bracket at byte 1");
	}

	#[test]
	fn dump_ir_lists_one_op_per_line() {
		let bf = compiled("+[>]");
		let mut out = Vec::new();

		bf.dump_ir(&mut out).unwrap();

		assert_eq!(String::from_utf8(out).unwrap(), "Add 1\nSearchZero 1\n");
	}

	#[test]
	fn optimize_level_zero_skips_idioms() {
		let mut bf = Brainfuck::new();
		bf.load_source("[-]");

		let options = Options {
			optimize_level: 0,
			..Options::default()
		};
		bf.compile(CompileKind::Ir, &options).unwrap();
		assert_eq!(bf.program().unwrap().len(), 3);

		// A Jit compile always lowers in full.
		bf.compile(CompileKind::Jit, &options).unwrap();
		assert_eq!(bf.program().unwrap().len(), 1);
	}

	#[test]
	fn emit_writes_through_the_seekable_sink() {
		let bf = compiled("+.");
		let mut sink = Cursor::new(Vec::new());

		bf.emit(&mut sink, Target::ElfX64).unwrap();

		assert_eq!(&sink.into_inner()[..4], b"\x7fELF");
	}

	#[test]
	fn emit_c_matches_the_interpreter_shape() {
		let bf = compiled(",.");
		let mut sink = Cursor::new(Vec::new());

		bf.emit(&mut sink, Target::C).unwrap();
		let source = String::from_utf8(sink.into_inner()).unwrap();

		assert!(source.contains("if (c != EOF)"));
		assert!(source.contains("putchar('\\n');"));
	}
}
