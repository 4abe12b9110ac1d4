use std::io::{Error as IoError, Result as IoResult, Seek, SeekFrom, Write};

use forge_utils::WriteLe as _;

use super::{ELFOSABI_ARM_AEABI, EM_ARM, Elf32Spec, HEADER32_SIZE, finish32};
use crate::Backend;

const TEXT_ADDR: u32 = 0x0001_0000;
const BSS_ADDR: u32 = 0x0021_0000;

/// Largest immediate accepted by the ldrb/strb offset field.
const MAX_VAR_OFFSET: i32 = 4095;

/// Static ARM EABI Linux executable using `svc #0` syscalls. The data
/// pointer lives in r1 (the buffer argument of read and write); r2 stays 1
/// for the transfer length, r8/r9/r6 are scratch.
pub struct ElfArmeabi<W> {
	w: W,
	loops: Vec<u64>,
}

impl<W: Write + Seek> ElfArmeabi<W> {
	pub const fn new(w: W) -> Self {
		Self { w, loops: Vec::new() }
	}

	fn word(&mut self, instruction: u32) -> IoResult<()> {
		self.w.write_u32_le(instruction)
	}

	/// `ldrb r8, [r1, #offset]` / `strb r8, [r1, #offset]` with the sign
	/// folded into the U bit.
	fn cell_at(load: bool, offset: i32) -> u32 {
		let base = match (load, offset >= 0) {
			(true, true) => 0xe5d1_8000,
			(true, false) => 0xe551_8000,
			(false, true) => 0xe5c1_8000,
			(false, false) => 0xe541_8000,
		};

		base | (offset.unsigned_abs() & 0xfff)
	}

	fn check_var_offset(offset: i32) -> IoResult<()> {
		if offset.unsigned_abs() > MAX_VAR_OFFSET as u32 {
			return Err(IoError::other(format!(
				"cell offset {offset} does not fit an ARM load/store immediate"
			)));
		}

		Ok(())
	}
}

impl<W: Write + Seek> Backend for ElfArmeabi<W> {
	fn header(&mut self) -> IoResult<()> {
		self.w.write_zeros(HEADER32_SIZE as usize)?;

		// ldr r1, [pc]; b past the constant; then the tape address itself.
		self.word(0xe59f_1000)?;
		self.word(0xea00_0000)?;
		self.word(BSS_ADDR)?;
		// mov r2, #1
		self.word(0xe3a0_2001)
	}

	fn footer(&mut self) -> IoResult<()> {
		self.assign(b'\n')?;
		self.putchar()?;

		// mov r7, #1 (sys_exit); mov r0, #0; svc #0
		self.word(0xe3a0_7001)?;
		self.word(0xe3a0_0000)?;
		self.word(0xef00_0000)?;

		finish32(
			&mut self.w,
			&Elf32Spec {
				machine: EM_ARM,
				osabi: ELFOSABI_ARM_AEABI,
				text_addr: TEXT_ADDR,
				bss_addr: BSS_ADDR,
			},
		)
	}

	fn move_ptr(&mut self, delta: i32) -> IoResult<()> {
		let magnitude = delta.unsigned_abs();

		if magnitude <= 0xff {
			// add/sub r1, r1, #delta
			let base = if delta >= 0 { 0xe281_1000 } else { 0xe241_1000 };
			self.word(base | magnitude)
		} else {
			// The stride does not fit an immediate: load it from a
			// constant pool word right after the instruction.
			self.word(0xe59f_8000)?; // ldr r8, [pc]
			self.word(0xea00_0000)?; // b past the constant
			self.word(magnitude)?;
			// add/sub r1, r1, r8
			self.word(if delta >= 0 { 0xe081_1008 } else { 0xe041_1008 })
		}
	}

	fn add(&mut self, value: i8) -> IoResult<()> {
		// ldrb r8, [r1]
		self.word(0xe5d1_8000)?;
		// add/sub r8, r8, #value
		let base = if value >= 0 { 0xe288_8000 } else { 0xe248_8000 };
		self.word(base | u32::from(value.unsigned_abs()))?;
		// strb r8, [r1]
		self.word(0xe5c1_8000)
	}

	fn assign(&mut self, value: u8) -> IoResult<()> {
		// mov r8, #value; strb r8, [r1]
		self.word(0xe3a0_8000 | u32::from(value))?;
		self.word(0xe5c1_8000)
	}

	fn putchar(&mut self) -> IoResult<()> {
		// mov r7, #4 (sys_write); mov r0, #1 (stdout); svc #0
		self.word(0xe3a0_7004)?;
		self.word(0xe3a0_0001)?;
		self.word(0xef00_0000)
	}

	fn getchar(&mut self) -> IoResult<()> {
		// mov r7, #3 (sys_read); mov r0, #0 (stdin); svc #0
		self.word(0xe3a0_7003)?;
		self.word(0xe3a0_0000)?;
		self.word(0xef00_0000)
	}

	fn loop_start(&mut self) -> IoResult<()> {
		self.loops.push(self.w.stream_position()?);

		// ldrb r8, [r1]; cmp r8, #0; beq placeholder
		self.word(0xe5d1_8000)?;
		self.word(0xe358_0000)?;
		self.word(0x0a00_0000)
	}

	fn loop_end(&mut self) -> IoResult<()> {
		let site = self
			.loops
			.pop()
			.ok_or_else(|| IoError::other("loop end emitted without a matching start"))?;

		let here = self.w.stream_position()?;
		let offset = ((here - site) / 4) as i32;

		// b back to the ldrb; the pipeline offset of two words is baked in.
		self.word(0xea00_0000 | (0x00ff_ffff & (-(offset + 2)) as u32))?;

		let after = self.w.stream_position()?;
		self.w.seek(SeekFrom::Start(site + 8))?;
		self.word(0x0a00_0000 | (0x00ff_ffff & (offset - 3) as u32))?;
		self.w.seek(SeekFrom::Start(after))?;

		Ok(())
	}

	fn if_start(&mut self) -> IoResult<()> {
		self.loop_start()?;
		// ldrb r9, [r1]
		self.word(0xe5d1_9000)
	}

	fn if_end(&mut self) -> IoResult<()> {
		let site = self
			.loops
			.pop()
			.ok_or_else(|| IoError::other("if end emitted without a matching start"))?;

		let here = self.w.stream_position()?;
		let offset = ((here - site) / 4) as i32;

		self.w.seek(SeekFrom::Start(site + 8))?;
		self.word(0x0a00_0000 | (0x00ff_ffff & (offset - 4) as u32))?;
		self.w.seek(SeekFrom::Start(here))?;

		Ok(())
	}

	fn add_var(&mut self, offset: i32) -> IoResult<()> {
		Self::check_var_offset(offset)?;

		// ldrb r9, [r1]; ldrb r8, [r1, #offset]; add r8, r8, r9; strb back
		self.word(0xe5d1_9000)?;
		self.word(Self::cell_at(true, offset))?;
		self.word(0xe088_8009)?;
		self.word(Self::cell_at(false, offset))
	}

	fn sub_var(&mut self, offset: i32) -> IoResult<()> {
		Self::check_var_offset(offset)?;

		self.word(0xe5d1_9000)?;
		self.word(Self::cell_at(true, offset))?;
		// sub r8, r8, r9
		self.word(0xe048_8009)?;
		self.word(Self::cell_at(false, offset))
	}

	fn add_mul_var(&mut self, offset: i32, factor: i8) -> IoResult<()> {
		Self::check_var_offset(offset)?;

		self.word(0xe5d1_9000)?;
		self.word(Self::cell_at(true, offset))?;
		// mov r6, #|factor|; mul r6, r9, r6; add/sub r8, r8, r6
		self.word(0xe3a0_6000 | u32::from(factor.unsigned_abs()))?;
		self.word(0xe006_0699)?;
		self.word(if factor > 0 { 0xe088_8006 } else { 0xe048_8006 })?;
		self.word(Self::cell_at(false, offset))
	}

	fn breakpoint(&mut self) -> IoResult<()> {
		// The canonical undefined instruction Linux maps to SIGTRAP.
		self.word(0xe7f0_01f0)
	}
}
