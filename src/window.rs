/// Host-side copy of the device memory.
///
/// A raw dump is the memory as is: byte N of the file is the byte at
/// address N, no header, no checksum.

use std::io::{
	self,
	Read,
	Write,
};

use crate::chip::ChipType;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MemoryWindow {
	data: Vec<u8>,
}

impl MemoryWindow {
	pub fn new(capacity: usize) -> Self {
		MemoryWindow {
			data: vec![0u8; capacity],
		}
	}

	pub fn for_chip(chip: ChipType) -> Self {
		Self::new(chip.capacity())
	}

	pub fn capacity(&self) -> usize {
		self.data.len()
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.data
	}

	pub fn as_mut_bytes(&mut self) -> &mut [u8] {
		&mut self.data
	}

	pub fn get(&self, address: usize) -> Option<u8> {
		self.data.get(address).cloned()
	}

	/// Replaces the dump contents with up to `capacity` bytes from `reader`;
	/// returns how many bytes were read. Bytes past a short dump are kept.
	pub fn load_dump<R: Read>(&mut self, reader: R) -> io::Result<usize> {
		let dump = read_dump(reader, self.capacity())?;
		self.data[..dump.len()].copy_from_slice(&dump);
		Ok(dump.len())
	}

	pub fn write_dump<W: Write>(&self, mut writer: W) -> io::Result<()> {
		writer.write_all(&self.data)?;
		writer.flush()
	}
}

/// reads a dump, ignoring everything past `capacity` bytes
pub fn read_dump<R: Read>(reader: R, capacity: usize) -> io::Result<Vec<u8>> {
	let mut buf = Vec::with_capacity(capacity);
	reader.take(capacity as u64).read_to_end(&mut buf)?;
	Ok(buf)
}

/// `<chip>_<unix seconds>.bin`
pub fn dump_file_name(chip: ChipType, unix_seconds: u64) -> String {
	format!("{}_{}.bin", chip, unix_seconds)
}
