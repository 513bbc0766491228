/// Text views of memory contents.

use std::fmt::Write;
use std::str;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ViewMode {
	Hex,
	Bit,
	Both,
}

impl ViewMode {
	pub const NAMES: [&'static str; 3] = ["hex", "bit", "both"];

	fn bytes_per_line(&self) -> usize {
		match self {
			ViewMode::Hex => 16,
			ViewMode::Bit => 4,
			ViewMode::Both => 4,
		}
	}
}

impl Default for ViewMode {
	fn default() -> Self {
		ViewMode::Hex
	}
}

impl str::FromStr for ViewMode {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"hex" => Ok(ViewMode::Hex),
			"bit" => Ok(ViewMode::Bit),
			"both" => Ok(ViewMode::Both),
			_ => bail!("unknown view mode {:?} (expected one of {})", s, Self::NAMES.join(", ")),
		}
	}
}

/// Renders `data` as it is stored starting at `base`; one line per row,
/// each prefixed with the address of its first byte.
pub fn render(data: &[u8], base: usize, mode: ViewMode) -> String {
	let mut out = String::new();
	let per_line = mode.bytes_per_line();
	for (row, line) in data.chunks(per_line).enumerate() {
		let _ = write!(out, "{:04x}:", base + row * per_line);
		for (i, b) in line.iter().enumerate() {
			if mode == ViewMode::Hex && i == 8 {
				out.push(' ');
			}
			let _ = match mode {
				ViewMode::Hex => write!(out, " {:02x}", b),
				ViewMode::Bit => write!(out, " {:08b}", b),
				ViewMode::Both => write!(out, " {:02x}={:08b}", b, b),
			};
		}
		out.push('\n');
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hex_rows() {
		let data: Vec<u8> = (0..20).collect();
		let text = render(&data, 0x10, ViewMode::Hex);
		let lines: Vec<_> = text.lines().collect();
		assert_eq!(lines.len(), 2);
		assert_eq!(lines[0], "0010: 00 01 02 03 04 05 06 07  08 09 0a 0b 0c 0d 0e 0f");
		assert_eq!(lines[1], "0020: 10 11 12 13");
	}

	#[test]
	fn bit_and_both_rows() {
		assert_eq!(render(&[0xa5, 0x01], 0, ViewMode::Bit), "0000: 10100101 00000001\n");
		assert_eq!(render(&[0xff], 0xfc, ViewMode::Both), "00fc: ff=11111111\n");
	}

	#[test]
	fn parse_modes() {
		assert_eq!("both".parse::<ViewMode>().unwrap(), ViewMode::Both);
		assert!("octal".parse::<ViewMode>().is_err());
	}
}
