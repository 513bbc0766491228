/// Driver for 24Cxx serial EEPROMs addressed with a single memory address
/// byte (24C01, 24C02).
///
/// Random read: START, slave+W, word address, repeated START, slave+R,
/// data..., STOP. Byte/page write: START, slave+W, word address, data...,
/// STOP; afterwards the device is busy for the write cycle time and
/// doesn't acknowledge anything.
///
/// A page write must not cross a page boundary: the column counter wraps
/// around inside the page and overwrites bytes sent earlier in the same
/// transaction.

use std::cmp;
use std::time::Duration;

use failure::Fail;

use crate::bus::{
	Bus,
	BusError,
	BusExt,
	Framing,
	SlaveAddress,
};
use crate::chip::{
	AddressWidth,
	ChipType,
};
use crate::delay::Delay;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// value of an erased cell
pub const ERASED: u8 = 0xff;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ErrorKind {
	BusNack,
	Timeout,
	UsageError,
}

#[derive(Clone, PartialEq, Eq, Debug, Fail)]
pub enum EepromError {
	#[fail(display = "{}", _0)]
	Bus(#[cause] BusError),
	#[fail(display = "invalid request: {}", _0)]
	Usage(String),
	#[fail(display = "write at 0x{:02x} failed after {} committed bytes: {}", address, committed, cause)]
	PartialWrite {
		address: usize,
		// bytes from `address` onwards that were written completely
		committed: usize,
		#[cause]
		cause: BusError,
	},
}

impl EepromError {
	pub fn kind(&self) -> ErrorKind {
		match self {
			EepromError::Usage(_) => ErrorKind::UsageError,
			EepromError::Bus(cause) | EepromError::PartialWrite { cause, .. } => match cause {
				BusError::Timeout(_) => ErrorKind::Timeout,
				BusError::Nack(_) | BusError::Transport(_) => ErrorKind::BusNack,
			},
		}
	}

	pub fn committed(&self) -> usize {
		match self {
			EepromError::PartialWrite { committed, .. } => *committed,
			_ => 0,
		}
	}
}

impl From<BusError> for EepromError {
	fn from(e: BusError) -> Self {
		EepromError::Bus(e)
	}
}

macro_rules! ensure_usage {
	($cond:expr, $($fmt:tt)*) => {
		if !($cond) {
			return Err(EepromError::Usage(format!($($fmt)*)));
		}
	};
}

/// Splits `length` bytes starting at `address` into `(start, len)` chunks
/// that each stay inside one page.
#[derive(Clone, Debug)]
pub struct PageChunks {
	address: usize,
	remaining: usize,
	page_size: usize,
}

impl Iterator for PageChunks {
	type Item = (usize, usize);

	fn next(&mut self) -> Option<Self::Item> {
		if 0 == self.remaining {
			return None;
		}
		let page_offset = self.address % self.page_size;
		let len = cmp::min(self.remaining, self.page_size - page_offset);
		let chunk = (self.address, len);
		self.address += len;
		self.remaining -= len;
		Some(chunk)
	}
}

pub fn page_chunks(address: usize, length: usize, page_size: usize) -> PageChunks {
	assert!(page_size > 0);
	PageChunks {
		address,
		remaining: length,
		page_size,
	}
}

#[derive(Clone, Copy)]
enum Payload<'d> {
	Data(&'d [u8]),
	Fill(u8),
}

pub struct Eeprom<B: Bus, D: Delay> {
	bus: B,
	delay: D,
	chip: ChipType,
	address: SlaveAddress,
	timeout: Duration,
	write_cycle: Duration,
}

impl<B: Bus, D: Delay> Eeprom<B, D> {
	pub fn new(bus: B, delay: D, chip: ChipType, address: SlaveAddress) -> Result<Self, EepromError> {
		ensure_usage!(chip.is_single_byte_addressed(),
			"{} needs more than a single memory address byte", chip);

		Ok(Eeprom {
			bus,
			delay,
			chip,
			address,
			timeout: DEFAULT_TIMEOUT,
			write_cycle: chip.write_cycle(),
		})
	}

	pub fn chip(&self) -> ChipType {
		self.chip
	}

	pub fn capacity(&self) -> usize {
		self.chip.capacity()
	}

	pub fn page_size(&self) -> usize {
		self.chip.page_size()
	}

	/// slave address of the device; can be changed between operations
	pub fn address(&self) -> SlaveAddress {
		self.address
	}

	pub fn set_address(&mut self, address: SlaveAddress) {
		debug!("EEPROM slave address {} -> {}", self.address, address);
		self.address = address;
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	pub fn set_timeout(&mut self, timeout: Duration) {
		self.timeout = timeout;
	}

	pub fn write_cycle(&self) -> Duration {
		self.write_cycle
	}

	pub fn set_write_cycle(&mut self, write_cycle: Duration) {
		self.write_cycle = write_cycle;
	}

	pub fn bus(&self) -> &B {
		&self.bus
	}

	pub fn bus_mut(&mut self) -> &mut B {
		&mut self.bus
	}

	pub fn delay(&self) -> &D {
		&self.delay
	}

	/// startup check
	pub fn init(&mut self) -> bool {
		let available = self.probe();
		if available {
			info!("{} at {} responding", self.chip, self.address);
		} else {
			warn!("{} at {} not responding", self.chip, self.address);
		}
		available
	}

	/// whether the device acknowledges a one-byte read
	pub fn probe(&mut self) -> bool {
		let (slave, timeout) = (self.address, self.timeout);
		let mut dummy = [0u8; 1];
		let res = self.bus.claim().and_then(|mut bus| {
			bus.receive(slave, &mut dummy, Framing::COMPLETE, timeout)
		});
		match res {
			Ok(()) => true,
			Err(e) => {
				debug!("probe {}: {}", slave, e);
				false
			},
		}
	}

	fn encode_address(&self, address: usize, frame: &mut Vec<u8>) {
		match self.chip.address_width() {
			AddressWidth::One => {
				frame.push(address as u8);
			},
			AddressWidth::Two => {
				frame.push((address >> 8) as u8);
				frame.push(address as u8);
			},
		}
	}

	// validates a transfer; returns the length cut down to the end of the memory
	fn fit(&self, address: usize, length: usize) -> Result<usize, EepromError> {
		let capacity = self.capacity();
		ensure_usage!(length > 0, "zero-length transfer at 0x{:02x}", address);
		ensure_usage!(address < capacity,
			"address 0x{:x} outside of {} ({} bytes)", address, self.chip, capacity);

		// capacity is one past the largest address byte; compute the end in u64
		let end = address as u64 + length as u64;
		if end > capacity as u64 {
			let fitted = capacity - address;
			warn!("transfer of {} bytes at 0x{:02x} truncated to {} bytes", length, address, fitted);
			Ok(fitted)
		} else {
			Ok(length)
		}
	}

	fn random_read(&mut self, address: usize, target: &mut [u8]) -> Result<(), BusError> {
		let mut frame = Vec::with_capacity(2);
		self.encode_address(address, &mut frame);
		let (slave, timeout) = (self.address, self.timeout);

		trace!("{}: read {} bytes at 0x{:02x}", slave, target.len(), address);
		let mut bus = self.bus.claim()?;
		bus.transmit(slave, &frame, Framing::ADDRESS_PHASE, timeout)?;
		bus.receive(slave, target, Framing::DATA_PHASE, timeout)
	}

	// one write transaction; the bus is released before returning
	fn program_page(&mut self, address: usize, data: &[u8]) -> Result<(), BusError> {
		let mut frame = Vec::with_capacity(2 + data.len());
		self.encode_address(address, &mut frame);
		frame.extend_from_slice(data);
		let (slave, timeout) = (self.address, self.timeout);

		trace!("{}: write {} bytes at 0x{:02x}", slave, data.len(), address);
		let mut bus = self.bus.claim()?;
		bus.transmit(slave, &frame, Framing::COMPLETE, timeout)
	}

	fn program(&mut self, address: usize, length: usize, payload: Payload) -> Result<usize, EepromError> {
		let length = self.fit(address, length)?;
		let page_size = self.page_size();
		let fill = match payload {
			Payload::Fill(value) => vec![value; page_size],
			Payload::Data(_) => Vec::new(),
		};

		let mut committed = 0usize;
		for (start, len) in page_chunks(address, length, page_size) {
			let chunk = match payload {
				Payload::Data(data) => &data[committed..committed + len],
				Payload::Fill(_) => &fill[..len],
			};
			if let Err(cause) = self.program_page(start, chunk) {
				warn!("write of {} bytes at 0x{:02x} aborted at 0x{:02x}: {}", length, address, start, cause);
				return Err(EepromError::PartialWrite {
					address,
					committed,
					cause,
				});
			}
			self.delay.delay(self.write_cycle);
			committed += len;
		}
		Ok(committed)
	}

	pub fn read_byte(&mut self, address: usize) -> Result<u8, EepromError> {
		self.fit(address, 1)?;
		let mut data = [0u8; 1];
		self.random_read(address, &mut data)?;
		Ok(data[0])
	}

	/// Sequential read filling `target`; returns the number of bytes read,
	/// which is smaller than `target.len()` if the range runs past the end.
	pub fn read_bytes(&mut self, address: usize, target: &mut [u8]) -> Result<usize, EepromError> {
		let length = self.fit(address, target.len())?;
		self.random_read(address, &mut target[..length])?;
		Ok(length)
	}

	/// Like `read_bytes`, allocating the buffer after the range was fitted
	/// to the device.
	pub fn read_vec(&mut self, address: usize, length: usize) -> Result<Vec<u8>, EepromError> {
		let length = self.fit(address, length)?;
		let mut data = vec![0u8; length];
		self.random_read(address, &mut data)?;
		Ok(data)
	}

	pub fn write_byte(&mut self, address: usize, value: u8) -> Result<(), EepromError> {
		self.fit(address, 1)?;
		let res = self.program_page(address, &[value]);
		// a lost ACK doesn't mean the device isn't busy writing
		self.delay.delay(self.write_cycle);
		res?;
		Ok(())
	}

	/// Writes `data` page by page, waiting for the write cycle after each
	/// page. Returns the number of bytes written (see `read_bytes` for
	/// truncation); on failure `EepromError::PartialWrite` tells how many
	/// bytes were committed.
	pub fn write_bytes(&mut self, address: usize, data: &[u8]) -> Result<usize, EepromError> {
		self.program(address, data.len(), Payload::Data(data))
	}

	/// fill range with 0xff
	pub fn erase_range(&mut self, address: usize, length: usize) -> Result<usize, EepromError> {
		debug!("erase {} bytes at 0x{:02x}", length, address);
		self.program(address, length, Payload::Fill(ERASED))
	}

	pub fn erase_all(&mut self) -> Result<(), EepromError> {
		let page_size = self.page_size();
		let mut committed = 0usize;
		for page in 0..self.chip.pages() {
			match self.program(page * page_size, page_size, Payload::Fill(ERASED)) {
				Ok(written) => committed += written,
				Err(EepromError::PartialWrite { committed: in_page, cause, .. }) => {
					return Err(EepromError::PartialWrite {
						address: 0,
						committed: committed + in_page,
						cause,
					});
				},
				Err(e) => return Err(e),
			}
		}
		debug!("erased {} bytes", committed);
		Ok(())
	}
}
