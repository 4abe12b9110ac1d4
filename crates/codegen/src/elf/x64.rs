use std::io::{Result as IoResult, Seek, Write};

use forge_utils::WriteLe as _;

use super::{ELFOSABI_LINUX, EM_X86_64, Elf64Spec, HEADER64_SIZE, finish64};
use crate::{Backend, branch};

const TEXT_ADDR: u64 = 0x0404_8000;
const BSS_ADDR: u64 = 0x0424_8000;

/// `cmp byte ptr [rsi], 0`.
const CMP_CELL: [u8; 3] = [0x80, 0x3e, 0x00];

/// Static x86-64 Linux executable. The data pointer lives in rsi so it
/// doubles as the buffer argument of the read/write syscalls; edx stays 1
/// (the transfer length) for the whole program.
pub struct ElfX64<W> {
	w: W,
	loops: Vec<u64>,
}

impl<W: Write + Seek> ElfX64<W> {
	pub const fn new(w: W) -> Self {
		Self { w, loops: Vec::new() }
	}
}

impl<W: Write + Seek> Backend for ElfX64<W> {
	fn header(&mut self) -> IoResult<()> {
		// Headers are back-filled once the code size is known.
		self.w.write_zeros(HEADER64_SIZE as usize)?;

		// movabs rsi, BSS_ADDR
		self.w.write_all(&[0x48, 0xbe])?;
		self.w.write_u64_le(BSS_ADDR)?;
		// mov edx, 1
		self.w.write_u8(0xba)?;
		self.w.write_u32_le(1)
	}

	fn footer(&mut self) -> IoResult<()> {
		self.assign(b'\n')?;
		self.putchar()?;

		// mov eax, 0x3c (sys_exit)
		self.w.write_u8(0xb8)?;
		self.w.write_u32_le(0x3c)?;
		// xor edi, edi
		self.w.write_all(&[0x31, 0xff])?;
		// syscall
		self.w.write_all(&[0x0f, 0x05])?;

		finish64(
			&mut self.w,
			&Elf64Spec {
				machine: EM_X86_64,
				osabi: ELFOSABI_LINUX,
				text_addr: TEXT_ADDR,
				bss_addr: BSS_ADDR,
			},
		)
	}

	fn move_ptr(&mut self, delta: i32) -> IoResult<()> {
		if delta > 0 {
			if delta > 127 {
				// add rsi, delta
				self.w.write_all(&[0x48, 0x81, 0xc6])?;
				self.w.write_i32_le(delta)
			} else if delta > 1 {
				self.w.write_all(&[0x48, 0x83, 0xc6])?;
				self.w.write_u8(delta as u8)
			} else {
				// inc rsi
				self.w.write_all(&[0x48, 0xff, 0xc6])
			}
		} else if delta < -127 {
			// sub rsi, -delta
			self.w.write_all(&[0x48, 0x81, 0xee])?;
			self.w.write_i32_le(-delta)
		} else if delta < -1 {
			self.w.write_all(&[0x48, 0x83, 0xee])?;
			self.w.write_u8(-delta as u8)
		} else {
			// dec rsi
			self.w.write_all(&[0x48, 0xff, 0xce])
		}
	}

	fn add(&mut self, value: i8) -> IoResult<()> {
		if value > 0 {
			if value > 1 {
				// add byte ptr [rsi], value
				self.w.write_all(&[0x80, 0x06, value as u8])
			} else {
				// inc byte ptr [rsi]
				self.w.write_all(&[0xfe, 0x06])
			}
		} else if value < -1 {
			// sub byte ptr [rsi], -value
			self.w.write_all(&[0x80, 0x2e, value.unsigned_abs()])
		} else {
			// dec byte ptr [rsi]
			self.w.write_all(&[0xfe, 0x0e])
		}
	}

	fn assign(&mut self, value: u8) -> IoResult<()> {
		// mov byte ptr [rsi], value
		self.w.write_all(&[0xc6, 0x06, value])
	}

	fn putchar(&mut self) -> IoResult<()> {
		// mov rax, 1 (sys_write)
		self.w.write_all(&[0x48, 0xc7, 0xc0])?;
		self.w.write_u32_le(1)?;
		// mov edi, 1 (stdout)
		self.w.write_u8(0xbf)?;
		self.w.write_u32_le(1)?;
		// syscall
		self.w.write_all(&[0x0f, 0x05])
	}

	fn getchar(&mut self) -> IoResult<()> {
		// mov rax, 0 (sys_read); a read of zero bytes leaves the cell as-is
		self.w.write_all(&[0x48, 0xc7, 0xc0])?;
		self.w.write_u32_le(0)?;
		// xor edi, edi (stdin)
		self.w.write_all(&[0x31, 0xff])?;
		// syscall
		self.w.write_all(&[0x0f, 0x05])
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
		// mov al, byte ptr [rsi]
		self.w.write_all(&[0x8a, 0x06])?;
		// add byte ptr [rsi + offset], al
		self.write_var_target(0x00, offset)
	}

	fn sub_var(&mut self, offset: i32) -> IoResult<()> {
		self.w.write_all(&[0x8a, 0x06])?;
		// sub byte ptr [rsi + offset], al
		self.write_var_target(0x28, offset)
	}

	fn add_mul_var(&mut self, offset: i32, factor: i8) -> IoResult<()> {
		// mov al, |factor|; mul byte ptr [rsi]
		self.w.write_all(&[0xb0, factor.unsigned_abs()])?;
		self.w.write_all(&[0xf6, 0x26])?;

		let opcode = if factor > 0 { 0x00 } else { 0x28 };
		self.write_var_target(opcode, offset)
	}

	fn inf_loop(&mut self) -> IoResult<()> {
		self.if_start()?;
		// jmp to itself
		self.w.write_all(&[0xeb, 0xfe])?;
		self.if_end()
	}

	fn breakpoint(&mut self) -> IoResult<()> {
		self.w.write_u8(0xcc)
	}
}

impl<W: Write + Seek> ElfX64<W> {
	/// `op byte ptr [rsi + offset], al` with a disp8 when it fits.
	fn write_var_target(&mut self, opcode: u8, offset: i32) -> IoResult<()> {
		if !(-128..=127).contains(&offset) {
			self.w.write_all(&[opcode, 0x86])?;
			self.w.write_i32_le(offset)
		} else {
			self.w.write_all(&[opcode, 0x46, offset as u8])
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Cursor;

	use forge_compiler::{LowerOptions, lower};

	use super::{BSS_ADDR, HEADER64_SIZE, TEXT_ADDR};
	use crate::{ElfX64, emit};

	fn build(source: &str, options: LowerOptions) -> Vec<u8> {
		let program = lower(source.as_bytes(), options).unwrap();
		let mut out = Cursor::new(Vec::new());

		emit(&mut ElfX64::new(&mut out), &program).unwrap();

		out.into_inner()
	}

	#[test]
	fn valid_executable_headers() {
		let image = build("", LowerOptions::new());

		assert_eq!(&image[..4], b"\x7fELF");
		assert_eq!(image[4], 2); // ELFCLASS64
		assert_eq!(image[5], 1); // little-endian
		assert_eq!(u16::from_le_bytes([image[16], image[17]]), 2); // ET_EXEC
		assert_eq!(u16::from_le_bytes([image[18], image[19]]), 62); // EM_X86_64

		let entry = u64::from_le_bytes(image[24..32].try_into().unwrap());
		assert_eq!(entry, TEXT_ADDR + u64::from(HEADER64_SIZE));

		assert_eq!(u16::from_le_bytes([image[56], image[57]]), 2); // e_phnum
		assert_eq!(u16::from_le_bytes([image[60], image[61]]), 4); // e_shnum
	}

	#[test]
	fn bss_segment_maps_the_tape() {
		let image = build("", LowerOptions::new());

		// Second program header starts at 64 + 56.
		let phdr = &image[120..176];
		assert_eq!(u32::from_le_bytes(phdr[..4].try_into().unwrap()), 1); // PT_LOAD
		assert_eq!(
			u64::from_le_bytes(phdr[16..24].try_into().unwrap()),
			BSS_ADDR
		);
		assert_eq!(
			u64::from_le_bytes(phdr[40..48].try_into().unwrap()),
			0x10000
		); // p_memsz
	}

	#[test]
	fn loop_branches_backpatch() {
		let options = LowerOptions {
			idioms: false,
			..LowerOptions::new()
		};
		let image = build("[-]", options);

		// Prologue: movabs rsi + mov edx = 15 bytes of code.
		let code = HEADER64_SIZE as usize + 15;
		assert_eq!(
			&image[code..code + 13],
			&[
				0x80, 0x3e, 0x00, // cmp byte ptr [rsi], 0
				0x0f, 0x84, 0x02, 0x00, 0x00, 0x00, // je +2 (past the loop)
				0xfe, 0x0e, // dec byte ptr [rsi]
				0xeb, 0xf5, // jmp -11 (back to the cmp)
			]
		);
	}

	#[test]
	fn transfer_ops_use_short_displacements() {
		let image = build("+[->+<]", LowerOptions::new());
		let code = HEADER64_SIZE as usize + 15;

		// inc, then AddVar(1): mov al, [rsi]; add [rsi + 1], al; then Assign(0).
		assert_eq!(
			&image[code..code + 9],
			&[0xfe, 0x06, 0x8a, 0x06, 0x00, 0x46, 0x01, 0xc6, 0x06]
		);
	}
}
