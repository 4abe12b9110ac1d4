use std::io::{Result as IoResult, Write};

use super::backend::Backend;

const INDENT: &str = "  ";

/// Transpiles the program to a self-contained C source file.
pub struct CSource<W> {
	w: W,
	level: usize,
	breakpoints: bool,
}

impl<W: Write> CSource<W> {
	/// `breakpoints` controls whether the `debugbreak` helper is emitted;
	/// programs without breakpoints do not need it.
	pub const fn new(w: W, breakpoints: bool) -> Self {
		Self {
			w,
			level: 0,
			breakpoints,
		}
	}

	fn indent(&mut self) -> IoResult<()> {
		for _ in 0..self.level {
			self.w.write_all(INDENT.as_bytes())?;
		}

		Ok(())
	}
}

impl<W: Write> Backend for CSource<W> {
	fn header(&mut self) -> IoResult<()> {
		self.w.write_all(
			b"#include <stdio.h>\n\
			#include <stdlib.h>\n\
			#include <string.h>\n",
		)?;

		if self.breakpoints {
			self.w.write_all(
				b"\n\
				#if defined(_MSC_VER)\n\
				#  include <intrin.h>\n\
				#  define debugbreak()  __debugbreak()\n\
				#elif defined(__i386__) || defined(__x86_64__)\n\
				#  define debugbreak()  __asm__ volatile (\"int3\")\n\
				#elif defined(__arm__)\n\
				#  define debugbreak()  __asm__ volatile (\".inst 0xe7f001f0\")\n\
				#else\n\
				#  include <signal.h>\n\
				#  define debugbreak()  raise(SIGTRAP)\n\
				#endif\n",
			)?;
		}

		write!(
			self.w,
			"\n#define MEMORY_SIZE 65536\n\n\
			int\n\
			main(void)\n\
			{{\n\
			{INDENT}unsigned char memory[MEMORY_SIZE] = {{0}};\n\
			{INDENT}unsigned char *p = memory;\n\n"
		)?;
		self.level += 1;

		Ok(())
	}

	fn footer(&mut self) -> IoResult<()> {
		write!(
			self.w,
			"{INDENT}putchar('\\n');\n\n{INDENT}return EXIT_SUCCESS;\n}}\n"
		)
	}

	fn move_ptr(&mut self, delta: i32) -> IoResult<()> {
		self.indent()?;
		match delta {
			1 => self.w.write_all(b"p++;\n"),
			-1 => self.w.write_all(b"p--;\n"),
			_ if delta > 0 => writeln!(self.w, "p += {delta};"),
			_ => writeln!(self.w, "p -= {};", -i64::from(delta)),
		}
	}

	fn add(&mut self, value: i8) -> IoResult<()> {
		self.indent()?;
		match value {
			1 => self.w.write_all(b"(*p)++;\n"),
			-1 => self.w.write_all(b"(*p)--;\n"),
			_ if value > 0 => writeln!(self.w, "*p += {value};"),
			_ => writeln!(self.w, "*p -= {};", -i32::from(value)),
		}
	}

	fn assign(&mut self, value: u8) -> IoResult<()> {
		self.indent()?;
		writeln!(self.w, "*p = {value};")
	}

	fn putchar(&mut self) -> IoResult<()> {
		self.indent()?;
		self.w.write_all(b"putchar(*p);\n")
	}

	fn getchar(&mut self) -> IoResult<()> {
		self.indent()?;
		self.w
			.write_all(b"{ int c = getchar(); if (c != EOF) *p = (unsigned char) c; }\n")
	}

	fn loop_start(&mut self) -> IoResult<()> {
		self.indent()?;
		self.w.write_all(b"while (*p) {\n")?;
		self.level += 1;

		Ok(())
	}

	fn loop_end(&mut self) -> IoResult<()> {
		self.level -= 1;
		self.indent()?;
		self.w.write_all(b"}\n")
	}

	fn if_start(&mut self) -> IoResult<()> {
		self.indent()?;
		self.w.write_all(b"if (*p) {\n")?;
		self.level += 1;

		Ok(())
	}

	fn search_zero(&mut self, stride: i32) -> IoResult<()> {
		self.indent()?;
		match stride {
			1 => self.w.write_all(b"p = memchr(p, 0, sizeof(memory));\n"),
			-1 => self.w.write_all(b"for (; *p; p--);\n"),
			_ if stride > 0 => writeln!(self.w, "for (; *p; p += {stride});"),
			_ => writeln!(self.w, "for (; *p; p -= {});", -i64::from(stride)),
		}
	}

	fn add_var(&mut self, offset: i32) -> IoResult<()> {
		self.indent()?;
		writeln!(self.w, "*(p {}) += *p;", signed_offset(offset))
	}

	fn sub_var(&mut self, offset: i32) -> IoResult<()> {
		self.indent()?;
		writeln!(self.w, "*(p {}) -= *p;", signed_offset(offset))
	}

	fn add_mul_var(&mut self, offset: i32, factor: i8) -> IoResult<()> {
		self.indent()?;
		writeln!(
			self.w,
			"*(p {}) += *p * {factor};",
			signed_offset(offset)
		)
	}

	fn inf_loop(&mut self) -> IoResult<()> {
		self.indent()?;
		self.w.write_all(b"if (*p) {\n")?;
		self.level += 1;
		self.indent()?;
		self.w.write_all(b"for (;;);\n")?;
		self.level -= 1;
		self.indent()?;
		self.w.write_all(b"}\n")
	}

	fn breakpoint(&mut self) -> IoResult<()> {
		self.indent()?;
		self.w.write_all(b"debugbreak();\n")
	}
}

fn signed_offset(offset: i32) -> String {
	if offset >= 0 {
		format!("+ {offset}")
	} else {
		format!("- {}", -i64::from(offset))
	}
}
