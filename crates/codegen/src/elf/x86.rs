use std::io::{Result as IoResult, Seek, Write};

use forge_utils::WriteLe as _;

use super::{ELFOSABI_LINUX, EM_386, Elf32Spec, HEADER32_SIZE, finish32};
use crate::{Backend, branch};

const TEXT_ADDR: u32 = 0x0404_8000;
const BSS_ADDR: u32 = 0x0424_8000;

/// `cmp byte ptr [ecx], 0`.
const CMP_CELL: [u8; 3] = [0x80, 0x39, 0x00];

/// Static x86 Linux executable using `int 0x80` syscalls. The data pointer
/// lives in ecx, which is also the buffer argument of read and write.
pub struct ElfX86<W> {
	w: W,
	loops: Vec<u64>,
}

impl<W: Write + Seek> ElfX86<W> {
	pub const fn new(w: W) -> Self {
		Self { w, loops: Vec::new() }
	}
}

impl<W: Write + Seek> Backend for ElfX86<W> {
	fn header(&mut self) -> IoResult<()> {
		self.w.write_zeros(HEADER32_SIZE as usize)?;

		// mov ecx, BSS_ADDR
		self.w.write_u8(0xb9)?;
		self.w.write_u32_le(BSS_ADDR)
	}

	fn footer(&mut self) -> IoResult<()> {
		self.assign(b'\n')?;
		self.putchar()?;

		// mov eax, 1 (sys_exit)
		self.w.write_u8(0xb8)?;
		self.w.write_u32_le(1)?;
		// mov ebx, 0
		self.w.write_u8(0xbb)?;
		self.w.write_u32_le(0)?;
		// int 0x80
		self.w.write_all(&[0xcd, 0x80])?;

		finish32(
			&mut self.w,
			&Elf32Spec {
				machine: EM_386,
				osabi: ELFOSABI_LINUX,
				text_addr: TEXT_ADDR,
				bss_addr: BSS_ADDR,
			},
		)
	}

	fn move_ptr(&mut self, delta: i32) -> IoResult<()> {
		match delta {
			1 => self.w.write_u8(0x41), // inc ecx
			-1 => self.w.write_u8(0x49), // dec ecx
			_ if delta > 0 => {
				// add ecx, delta
				self.w.write_all(&[0x81, 0xc1])?;
				self.w.write_i32_le(delta)
			}
			_ => {
				// sub ecx, -delta
				self.w.write_all(&[0x81, 0xe9])?;
				self.w.write_i32_le(-delta)
			}
		}
	}

	fn add(&mut self, value: i8) -> IoResult<()> {
		match value {
			1 => self.w.write_all(&[0xfe, 0x01]), // inc byte ptr [ecx]
			-1 => self.w.write_all(&[0xfe, 0x09]), // dec byte ptr [ecx]
			_ if value > 0 => self.w.write_all(&[0x80, 0x01, value as u8]),
			_ => self.w.write_all(&[0x80, 0x29, value.unsigned_abs()]),
		}
	}

	fn assign(&mut self, value: u8) -> IoResult<()> {
		// mov byte ptr [ecx], value
		self.w.write_all(&[0xc6, 0x01, value])
	}

	fn putchar(&mut self) -> IoResult<()> {
		// mov eax, 4 (sys_write)
		self.w.write_u8(0xb8)?;
		self.w.write_u32_le(4)?;
		// mov edx, 1
		self.w.write_u8(0xba)?;
		self.w.write_u32_le(1)?;
		// mov ebx, 1 (stdout)
		self.w.write_u8(0xbb)?;
		self.w.write_u32_le(1)?;
		// int 0x80
		self.w.write_all(&[0xcd, 0x80])
	}

	fn getchar(&mut self) -> IoResult<()> {
		// mov eax, 3 (sys_read)
		self.w.write_u8(0xb8)?;
		self.w.write_u32_le(3)?;
		// mov edx, 1
		self.w.write_u8(0xba)?;
		self.w.write_u32_le(1)?;
		// mov ebx, 0 (stdin)
		self.w.write_u8(0xbb)?;
		self.w.write_u32_le(0)?;
		// int 0x80
		self.w.write_all(&[0xcd, 0x80])
	}

	fn loop_start(&mut self) -> IoResult<()> {
		branch::start_loop(&mut self.w, &mut self.loops, CMP_CELL)
	}

	fn loop_end(&mut self) -> IoResult<()> {
		branch::end_loop(&mut self.w, &mut self.loops)
	}

	fn if_end(&mut self) -> IoResult<()> {
		branch::end_if(&mut self.w, &mut self.loops)
	}

	fn add_var(&mut self, offset: i32) -> IoResult<()> {
		// mov al, byte ptr [ecx]
		self.w.write_all(&[0x8a, 0x01])?;
		// add byte ptr [ecx + offset], al
		self.write_var_target(0x00, offset)
	}

	fn sub_var(&mut self, offset: i32) -> IoResult<()> {
		self.w.write_all(&[0x8a, 0x01])?;
		// sub byte ptr [ecx + offset], al
		self.write_var_target(0x28, offset)
	}

	fn add_mul_var(&mut self, offset: i32, factor: i8) -> IoResult<()> {
		// mov al, |factor|; mul byte ptr [ecx]
		self.w.write_all(&[0xb0, factor.unsigned_abs()])?;
		self.w.write_all(&[0xf6, 0x21])?;

		let opcode = if factor > 0 { 0x00 } else { 0x28 };
		self.write_var_target(opcode, offset)
	}

	fn inf_loop(&mut self) -> IoResult<()> {
		self.if_start()?;
		self.w.write_all(&[0xeb, 0xfe])?;
		self.if_end()
	}

	fn breakpoint(&mut self) -> IoResult<()> {
		self.w.write_u8(0xcc)
	}
}

impl<W: Write + Seek> ElfX86<W> {
	fn write_var_target(&mut self, opcode: u8, offset: i32) -> IoResult<()> {
		if !(-128..=127).contains(&offset) {
			self.w.write_all(&[opcode, 0x81])?;
			self.w.write_i32_le(offset)
		} else {
			self.w.write_all(&[opcode, 0x41, offset as u8])
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use forge_compiler::{LowerOptions, lower};

	use super::{HEADER32_SIZE, TEXT_ADDR};
	use crate::{ElfX86, emit};

	fn build(source: &str) -> Vec<u8> {
		let program = lower(source.as_bytes(), LowerOptions::new()).unwrap();
		let mut out = Cursor::new(Vec::new());

		emit(&mut ElfX86::new(&mut out), &program).unwrap();

		out.into_inner()
	}

	#[test]
	fn valid_executable_headers() {
		let image = build("");

		assert_eq!(&image[..4], b"\x7fELF");
		assert_eq!(image[4], 1); // ELFCLASS32
		assert_eq!(u16::from_le_bytes([image[18], image[19]]), 3); // EM_386

		let entry = u32::from_le_bytes(image[24..28].try_into().unwrap());
		assert_eq!(entry, TEXT_ADDR + HEADER32_SIZE);

		assert_eq!(u16::from_le_bytes([image[44], image[45]]), 2); // e_phnum
		assert_eq!(u16::from_le_bytes([image[48], image[49]]), 4); // e_shnum
	}

	#[test]
	fn empty_program_still_prints_a_newline() {
		let image = build("");
		let code = HEADER32_SIZE as usize;

		// mov ecx, bss; mov byte ptr [ecx], '\n'; then the write syscall.
		assert_eq!(image[code], 0xb9);
		assert_eq!(&image[code + 5..code + 8], &[0xc6, 0x01, 0x0a]);
		assert_eq!(image[code + 8], 0xb8);
	}
}
