use std::io::{Result as IoResult, Write};

use super::backend::Backend;

const INDENT: &str = "  ";

/// Emits a C++ program that rebuilds the compiled code at runtime through
/// an Xbyak code generator, one builder call per instruction.
pub struct XbyakSource<W> {
	w: W,
	level: usize,
}

impl<W: Write> XbyakSource<W> {
	pub const fn new(w: W) -> Self {
		Self { w, level: 0 }
	}

	fn line(&mut self, line: &str) -> IoResult<()> {
		for _ in 0..self.level {
			self.w.write_all(INDENT.as_bytes())?;
		}
		self.w.write_all(line.as_bytes())?;
		self.w.write_all(b"\n")
	}
}

/// `byte [rbx ± offset]` as Xbyak spells it.
fn cell(offset: i32) -> String {
	if offset == 0 {
		"byte [rbx]".to_owned()
	} else if offset > 0 {
		format!("byte [rbx + {offset}]")
	} else {
		format!("byte [rbx - {}]", -i64::from(offset))
	}
}

impl<W: Write> Backend for XbyakSource<W> {
	fn header(&mut self) -> IoResult<()> {
		self.w.write_all(
			b"#include <cstddef>\n\
			#include <cstdio>\n\
			#include <cstdlib>\n\
			\n\
			#include <xbyak/xbyak.h>\n\
			\n\
			#define MEMORY_SIZE 65536\n\
			\n\
			static unsigned char memory[MEMORY_SIZE];\n\
			\n\
			class BrainfuckGenerator : public Xbyak::CodeGenerator\n\
			{\n\
			public:\n",
		)?;

		self.level = 1;
		self.line("BrainfuckGenerator() : Xbyak::CodeGenerator(1 << 20)")?;
		self.line("{")?;

		self.level = 2;
		self.line("push(rbx);")?;
		self.line("sub(rsp, 0x20);")?;
		self.line("mov(rbx, reinterpret_cast<std::size_t>(memory));")
	}

	fn footer(&mut self) -> IoResult<()> {
		self.line("mov(edi, 0x0a);")?;
		self.line("mov(ecx, edi);")?;
		self.line("mov(rax, reinterpret_cast<std::size_t>(std::putchar));")?;
		self.line("call(rax);")?;
		self.line("add(rsp, 0x20);")?;
		self.line("pop(rbx);")?;
		self.line("ret();")?;

		self.level = 1;
		self.line("}")?;
		self.level = 0;

		self.w.write_all(
			b"};\n\
			\n\
			int\n\
			main(void)\n\
			{\n\
			\x20\x20BrainfuckGenerator generator;\n\
			\x20\x20generator.getCode<void (*)()>()();\n\
			\n\
			\x20\x20return EXIT_SUCCESS;\n\
			}\n",
		)
	}

	fn move_ptr(&mut self, delta: i32) -> IoResult<()> {
		match delta {
			1 => self.line("inc(rbx);"),
			-1 => self.line("dec(rbx);"),
			_ if delta > 0 => self.line(&format!("add(rbx, {delta});")),
			_ => self.line(&format!("sub(rbx, {});", -i64::from(delta))),
		}
	}

	fn add(&mut self, value: i8) -> IoResult<()> {
		match value {
			1 => self.line("inc(byte [rbx]);"),
			-1 => self.line("dec(byte [rbx]);"),
			_ if value > 0 => self.line(&format!("add(byte [rbx], {value});")),
			_ => self.line(&format!("sub(byte [rbx], {});", -i32::from(value))),
		}
	}

	fn assign(&mut self, value: u8) -> IoResult<()> {
		self.line(&format!("mov(byte [rbx], {value});"))
	}

	fn putchar(&mut self) -> IoResult<()> {
		// The first integer argument lands in edi (System V) or ecx
		// (Windows); fill both.
		self.line("movzx(edi, byte [rbx]);")?;
		self.line("mov(ecx, edi);")?;
		self.line("mov(rax, reinterpret_cast<std::size_t>(std::putchar));")?;
		self.line("call(rax);")
	}

	fn getchar(&mut self) -> IoResult<()> {
		self.line("mov(rax, reinterpret_cast<std::size_t>(std::getchar));")?;
		self.line("call(rax);")?;
		self.line("inLocalLabel();")?;
		self.line("cmp(eax, -1);")?;
		self.line("je(\".skip\");")?;
		self.line("mov(byte [rbx], al);")?;
		self.line("L(\".skip\");")?;
		self.line("outLocalLabel();")
	}

	fn loop_start(&mut self) -> IoResult<()> {
		self.line("inLocalLabel();")?;
		self.line("L(\".start\");")?;
		self.line("cmp(byte [rbx], 0);")?;
		self.line("jz(\".end\", T_NEAR);")?;
		self.level += 1;

		Ok(())
	}

	fn loop_end(&mut self) -> IoResult<()> {
		self.line("jmp(\".start\", T_NEAR);")?;
		self.level -= 1;
		self.line("L(\".end\");")?;
		self.line("outLocalLabel();")
	}

	fn if_start(&mut self) -> IoResult<()> {
		self.line("inLocalLabel();")?;
		self.line("cmp(byte [rbx], 0);")?;
		self.line("jz(\".end\", T_NEAR);")?;
		self.level += 1;

		Ok(())
	}

	fn if_end(&mut self) -> IoResult<()> {
		self.level -= 1;
		self.line("L(\".end\");")?;
		self.line("outLocalLabel();")
	}

	fn add_var(&mut self, offset: i32) -> IoResult<()> {
		self.line("mov(al, byte [rbx]);")?;
		self.line(&format!("add({}, al);", cell(offset)))
	}

	fn sub_var(&mut self, offset: i32) -> IoResult<()> {
		self.line("mov(al, byte [rbx]);")?;
		self.line(&format!("sub({}, al);", cell(offset)))
	}

	fn add_mul_var(&mut self, offset: i32, factor: i8) -> IoResult<()> {
		if factor > 0 {
			self.line(&format!("mov(al, {factor});"))?;
			self.line("mul(byte [rbx]);")?;
			self.line(&format!("add({}, al);", cell(offset)))
		} else {
			self.line(&format!("mov(al, {});", -i32::from(factor)))?;
			self.line("mul(byte [rbx]);")?;
			self.line(&format!("sub({}, al);", cell(offset)))
		}
	}

	fn breakpoint(&mut self) -> IoResult<()> {
		self.line("int3();")
	}
}
