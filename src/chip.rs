/// 24Cxx serial EEPROM family.

use std::fmt;
use std::str;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AddressWidth {
	One,
	Two,
}

impl AddressWidth {
	pub fn bytes(&self) -> usize {
		match self {
			AddressWidth::One => 1,
			AddressWidth::Two => 2,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChipType {
	C24C01,
	C24C02,
	C24C04,
	C24C08,
	C24C16,
	C24C32,
	C24C64,
	C24C128,
	C24C256,
	C24C512,
}

impl ChipType {
	pub const ALL: [ChipType; 10] = [
		ChipType::C24C01,
		ChipType::C24C02,
		ChipType::C24C04,
		ChipType::C24C08,
		ChipType::C24C16,
		ChipType::C24C32,
		ChipType::C24C64,
		ChipType::C24C128,
		ChipType::C24C256,
		ChipType::C24C512,
	];

	pub const NAMES: [&'static str; 10] = [
		"24C01", "24C02", "24C04", "24C08", "24C16",
		"24C32", "24C64", "24C128", "24C256", "24C512",
	];

	pub fn name(&self) -> &'static str {
		Self::NAMES[*self as usize]
	}

	/// size in bytes
	pub fn capacity(&self) -> usize {
		match self {
			ChipType::C24C01 => 128,
			ChipType::C24C02 => 256,
			ChipType::C24C04 => 512,
			ChipType::C24C08 => 1024,
			ChipType::C24C16 => 2048,
			ChipType::C24C32 => 4096,
			ChipType::C24C64 => 8192,
			ChipType::C24C128 => 16384,
			ChipType::C24C256 => 32768,
			ChipType::C24C512 => 65536,
		}
	}

	pub fn page_size(&self) -> usize {
		match self {
			ChipType::C24C01 | ChipType::C24C02 => 8,
			ChipType::C24C04 | ChipType::C24C08 | ChipType::C24C16 => 16,
			ChipType::C24C32 | ChipType::C24C64 => 32,
			ChipType::C24C128 | ChipType::C24C256 => 64,
			ChipType::C24C512 => 128,
		}
	}

	/// memory address bytes sent after the slave address
	pub fn address_width(&self) -> AddressWidth {
		match self {
			ChipType::C24C01 | ChipType::C24C02 | ChipType::C24C04
			| ChipType::C24C08 | ChipType::C24C16 => AddressWidth::One,
			_ => AddressWidth::Two,
		}
	}

	/// low slave address bits used as upper memory address bits
	pub fn block_select_bits(&self) -> u8 {
		match self {
			ChipType::C24C04 => 1,
			ChipType::C24C08 => 2,
			ChipType::C24C16 => 3,
			_ => 0,
		}
	}

	/// write cycle time (tWR): device ignores the bus for this long after a write
	pub fn write_cycle(&self) -> Duration {
		// datasheets give 5 ms max for most vendors; some older parts need 10 ms
		Duration::from_millis(10)
	}

	/// whole memory reachable with one memory address byte and one slave address
	pub fn is_single_byte_addressed(&self) -> bool {
		self.address_width() == AddressWidth::One && self.block_select_bits() == 0
	}

	pub fn pages(&self) -> usize {
		self.capacity() / self.page_size()
	}
}

impl Default for ChipType {
	fn default() -> Self {
		ChipType::C24C02
	}
}

impl fmt::Display for ChipType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.name())
	}
}

impl str::FromStr for ChipType {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let upper = s.to_ascii_uppercase();
		let name = if upper.starts_with("AT") { &upper[2..] } else { &upper[..] };
		match Self::NAMES.iter().position(|n| *n == name) {
			Some(index) => Ok(Self::ALL[index]),
			None => bail!("unknown chip type {:?} (expected one of {})", s, Self::NAMES.join(", ")),
		}
	}
}
