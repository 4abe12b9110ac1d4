//! Minimal static ELF emission: Ehdr at offset 0, two PT_LOAD program
//! headers (R+X code, R+W tape), code straight after the headers, then the
//! section string table and four section headers so the output is a valid
//! object for binutils as well as the kernel loader.

mod armeabi;
mod x64;
mod x86;

use std::io::{Result as IoResult, Seek, SeekFrom, Write};

use forge_utils::WriteLe as _;

use super::TAPE_SIZE;
pub use self::{armeabi::ElfArmeabi, x64::ElfX64, x86::ElfX86};

const ET_EXEC: u16 = 2;
const EV_CURRENT: u32 = 1;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;
const SHT_NULL: u32 = 0;
const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_NOBITS: u32 = 8;
const SHF_WRITE: u64 = 1;
const SHF_ALLOC: u64 = 2;
const SHF_EXECINSTR: u64 = 4;

pub(crate) const ELFOSABI_LINUX: u8 = 3;
pub(crate) const ELFOSABI_ARM_AEABI: u8 = 0x40;
pub(crate) const EM_386: u16 = 3;
pub(crate) const EM_ARM: u16 = 40;
pub(crate) const EM_X86_64: u16 = 62;

/// `\0 .text \0 .shstrtbl \0 .bss \0`; name offsets 1, 7 and 17.
const SHSTRTAB: &[u8; 22] = b"\0.text\0.shstrtbl\0.bss\0";

const EHDR32_SIZE: u32 = 52;
const PHDR32_SIZE: u32 = 32;
const SHDR32_SIZE: u32 = 40;
pub(crate) const HEADER32_SIZE: u32 = EHDR32_SIZE + 2 * PHDR32_SIZE;
const FOOTER32_SIZE: u32 = 4 * SHDR32_SIZE;

const EHDR64_SIZE: u32 = 64;
const PHDR64_SIZE: u32 = 56;
const SHDR64_SIZE: u32 = 64;
pub(crate) const HEADER64_SIZE: u32 = EHDR64_SIZE + 2 * PHDR64_SIZE;
const FOOTER64_SIZE: u32 = 4 * SHDR64_SIZE;

/// File offset recorded for the tape segment; nothing is stored there.
const BSS_FILE_OFFSET: u32 = 0x1000;

pub(crate) struct Elf32Spec {
	pub machine: u16,
	pub osabi: u8,
	pub text_addr: u32,
	pub bss_addr: u32,
}

/// Appends the section table and back-fills the ELF and program headers
/// once the code size is known.
pub(crate) fn finish32<W: Write + Seek>(w: &mut W, spec: &Elf32Spec) -> IoResult<()> {
	let code_size = w.stream_position()? as u32 - HEADER32_SIZE;
	let strtab_len = SHSTRTAB.len() as u32;

	w.write_all(SHSTRTAB)?;

	write_shdr32(w, 0, SHT_NULL, 0, 0, 0, 0, 0)?;
	write_shdr32(
		w,
		7,
		SHT_STRTAB,
		0,
		0,
		HEADER32_SIZE + code_size,
		strtab_len,
		1,
	)?;
	write_shdr32(
		w,
		1,
		SHT_PROGBITS,
		SHF_EXECINSTR | SHF_ALLOC,
		spec.text_addr + HEADER32_SIZE,
		HEADER32_SIZE,
		code_size,
		4,
	)?;
	write_shdr32(
		w,
		17,
		SHT_NOBITS,
		SHF_ALLOC | SHF_WRITE,
		spec.bss_addr,
		BSS_FILE_OFFSET,
		TAPE_SIZE,
		0x10,
	)?;

	w.seek(SeekFrom::Start(0))?;

	write_ident(w, 1, spec.osabi)?;
	w.write_u16_le(ET_EXEC)?;
	w.write_u16_le(spec.machine)?;
	w.write_u32_le(EV_CURRENT)?;
	w.write_u32_le(spec.text_addr + HEADER32_SIZE)?; // e_entry
	w.write_u32_le(EHDR32_SIZE)?; // e_phoff
	w.write_u32_le(HEADER32_SIZE + strtab_len + code_size)?; // e_shoff
	w.write_u32_le(0)?; // e_flags
	w.write_u16_le(EHDR32_SIZE as u16)?;
	w.write_u16_le(PHDR32_SIZE as u16)?;
	w.write_u16_le(2)?; // e_phnum
	w.write_u16_le(SHDR32_SIZE as u16)?;
	w.write_u16_le(4)?; // e_shnum
	w.write_u16_le(1)?; // e_shstrndx

	let load_size = HEADER32_SIZE + strtab_len + FOOTER32_SIZE + code_size;
	write_phdr32(w, PF_R | PF_X, 0, spec.text_addr, load_size, load_size, 0x100)?;
	write_phdr32(
		w,
		PF_R | PF_W,
		BSS_FILE_OFFSET,
		spec.bss_addr,
		0,
		TAPE_SIZE,
		0x20_0000,
	)?;

	w.seek(SeekFrom::End(0))?;

	Ok(())
}

pub(crate) struct Elf64Spec {
	pub machine: u16,
	pub osabi: u8,
	pub text_addr: u64,
	pub bss_addr: u64,
}

pub(crate) fn finish64<W: Write + Seek>(w: &mut W, spec: &Elf64Spec) -> IoResult<()> {
	let code_size = w.stream_position()? as u32 - HEADER64_SIZE;
	let strtab_len = SHSTRTAB.len() as u32;

	w.write_all(SHSTRTAB)?;

	write_shdr64(w, 0, SHT_NULL, 0, 0, 0, 0, 0)?;
	write_shdr64(
		w,
		7,
		SHT_STRTAB,
		0,
		0,
		(HEADER64_SIZE + code_size).into(),
		strtab_len.into(),
		1,
	)?;
	write_shdr64(
		w,
		1,
		SHT_PROGBITS,
		SHF_EXECINSTR | SHF_ALLOC,
		spec.text_addr + u64::from(HEADER64_SIZE),
		HEADER64_SIZE.into(),
		code_size.into(),
		4,
	)?;
	write_shdr64(
		w,
		17,
		SHT_NOBITS,
		SHF_ALLOC | SHF_WRITE,
		spec.bss_addr,
		BSS_FILE_OFFSET.into(),
		TAPE_SIZE.into(),
		0x10,
	)?;

	w.seek(SeekFrom::Start(0))?;

	write_ident(w, 2, spec.osabi)?;
	w.write_u16_le(ET_EXEC)?;
	w.write_u16_le(spec.machine)?;
	w.write_u32_le(EV_CURRENT)?;
	w.write_u64_le(spec.text_addr + u64::from(HEADER64_SIZE))?; // e_entry
	w.write_u64_le(EHDR64_SIZE.into())?; // e_phoff
	w.write_u64_le((HEADER64_SIZE + strtab_len + code_size).into())?; // e_shoff
	w.write_u32_le(0)?; // e_flags
	w.write_u16_le(EHDR64_SIZE as u16)?;
	w.write_u16_le(PHDR64_SIZE as u16)?;
	w.write_u16_le(2)?; // e_phnum
	w.write_u16_le(SHDR64_SIZE as u16)?;
	w.write_u16_le(4)?; // e_shnum
	w.write_u16_le(1)?; // e_shstrndx

	let load_size = u64::from(HEADER64_SIZE + strtab_len + FOOTER64_SIZE + code_size);
	write_phdr64(w, PF_R | PF_X, 0, spec.text_addr, load_size, load_size, 0x100)?;
	write_phdr64(
		w,
		PF_R | PF_W,
		BSS_FILE_OFFSET.into(),
		spec.bss_addr,
		0,
		TAPE_SIZE.into(),
		0x20_0000,
	)?;

	w.seek(SeekFrom::End(0))?;

	Ok(())
}

fn write_ident<W: Write>(w: &mut W, class: u8, osabi: u8) -> IoResult<()> {
	w.write_all(&[0x7f, b'E', b'L', b'F'])?;
	w.write_u8(class)?;
	w.write_u8(1)?; // ELFDATA2LSB
	w.write_u8(EV_CURRENT as u8)?;
	w.write_u8(osabi)?;
	w.write_zeros(8) // ABI version and padding
}

fn write_phdr32<W: Write>(
	w: &mut W,
	flags: u32,
	offset: u32,
	vaddr: u32,
	filesz: u32,
	memsz: u32,
	align: u32,
) -> IoResult<()> {
	w.write_u32_le(PT_LOAD)?;
	w.write_u32_le(offset)?;
	w.write_u32_le(vaddr)?;
	w.write_u32_le(vaddr)?; // p_paddr
	w.write_u32_le(filesz)?;
	w.write_u32_le(memsz)?;
	w.write_u32_le(flags)?;
	w.write_u32_le(align)
}

fn write_phdr64<W: Write>(
	w: &mut W,
	flags: u32,
	offset: u64,
	vaddr: u64,
	filesz: u64,
	memsz: u64,
	align: u64,
) -> IoResult<()> {
	w.write_u32_le(PT_LOAD)?;
	w.write_u32_le(flags)?;
	w.write_u64_le(offset)?;
	w.write_u64_le(vaddr)?;
	w.write_u64_le(vaddr)?; // p_paddr
	w.write_u64_le(filesz)?;
	w.write_u64_le(memsz)?;
	w.write_u64_le(align)
}

#[allow(clippy::too_many_arguments)]
fn write_shdr32<W: Write>(
	w: &mut W,
	name: u32,
	sh_type: u32,
	flags: u64,
	addr: u32,
	offset: u32,
	size: u32,
	addralign: u32,
) -> IoResult<()> {
	w.write_u32_le(name)?;
	w.write_u32_le(sh_type)?;
	w.write_u32_le(flags as u32)?;
	w.write_u32_le(addr)?;
	w.write_u32_le(offset)?;
	w.write_u32_le(size)?;
	w.write_u32_le(0)?; // sh_link
	w.write_u32_le(0)?; // sh_info
	w.write_u32_le(addralign)?;
	w.write_u32_le(0) // sh_entsize
}

#[allow(clippy::too_many_arguments)]
fn write_shdr64<W: Write>(
	w: &mut W,
	name: u32,
	sh_type: u32,
	flags: u64,
	addr: u64,
	offset: u64,
	size: u64,
	addralign: u64,
) -> IoResult<()> {
	w.write_u32_le(name)?;
	w.write_u32_le(sh_type)?;
	w.write_u64_le(flags)?;
	w.write_u64_le(addr)?;
	w.write_u64_le(offset)?;
	w.write_u64_le(size)?;
	w.write_u32_le(0)?; // sh_link
	w.write_u32_le(0)?; // sh_info
	w.write_u64_le(addralign)?;
	w.write_u64_le(0) // sh_entsize
}
