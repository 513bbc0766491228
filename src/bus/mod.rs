/// Two-wire (I²C) bus transport consumed by the EEPROM driver.
///
/// A transaction starts with a START condition and ends either with a
/// STOP or by keeping the bus for a repeated START. A 24Cxx random read
/// needs the latter: the memory address is written, then the data is read
/// after a repeated START without giving up the bus in between.

use std::fmt;
use std::ops::{
	Deref,
	DerefMut,
};
use std::str;
use std::time::Duration;

use failure::Fail;

pub mod linux;
pub mod sim;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Begin {
	Start,
	Restart,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum End {
	Stop,
	// keep the bus; next transfer begins with `Begin::Restart`
	AwaitRestart,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Framing {
	pub begin: Begin,
	pub end: End,
}

impl Framing {
	/// START ... STOP
	pub const COMPLETE: Framing = Framing { begin: Begin::Start, end: End::Stop };
	/// START ... (repeated START follows)
	pub const ADDRESS_PHASE: Framing = Framing { begin: Begin::Start, end: End::AwaitRestart };
	/// repeated START ... STOP
	pub const DATA_PHASE: Framing = Framing { begin: Begin::Restart, end: End::Stop };
}

/// 7-bit slave address; on the wire it is shifted left by one with the
/// R/W flag in bit 0.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlaveAddress(u8);

impl SlaveAddress {
	/// first address of the 24Cxx family (A2..A0 = 0)
	pub const EEPROM_BASE: SlaveAddress = SlaveAddress(0x50);
	/// last address of the 24Cxx family (A2..A0 = 7)
	pub const EEPROM_MAX: SlaveAddress = SlaveAddress(0x57);

	pub fn new(address: u8) -> crate::AResult<Self> {
		ensure!(address <= 0x7f, "I2C slave address 0x{:02x} doesn't fit in 7 bits", address);
		Ok(SlaveAddress(address))
	}

	pub fn from_framed(framed: u8) -> Self {
		SlaveAddress(framed >> 1)
	}

	pub fn seven_bit(&self) -> u8 {
		self.0
	}

	// 8-bit form used in the address byte of a transfer (R/W bit cleared)
	pub fn framed(&self) -> u8 {
		self.0 << 1
	}

	pub fn is_eeprom_range(&self) -> bool {
		*self >= Self::EEPROM_BASE && *self <= Self::EEPROM_MAX
	}
}

impl Default for SlaveAddress {
	fn default() -> Self {
		Self::EEPROM_BASE
	}
}

impl fmt::Debug for SlaveAddress {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "SlaveAddress(0x{:02x})", self.0)
	}
}

impl fmt::Display for SlaveAddress {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "0x{:02x}", self.0)
	}
}

impl str::FromStr for SlaveAddress {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let value = with_context!(("invalid I2C slave address: {:?}", s), {
			if s.starts_with("0x") || s.starts_with("0X") {
				Ok(u8::from_str_radix(&s[2..], 16)?)
			} else {
				Ok(s.parse::<u8>()?)
			}
		})?;
		SlaveAddress::new(value)
	}
}

#[derive(Clone, PartialEq, Eq, Debug, Fail)]
pub enum BusError {
	#[fail(display = "device {} did not acknowledge", _0)]
	Nack(SlaveAddress),
	#[fail(display = "transaction with device {} timed out", _0)]
	Timeout(SlaveAddress),
	#[fail(display = "bus transport failure: {}", _0)]
	Transport(String),
}

/// Capability the driver needs from a bus.
///
/// `acquire`/`release` bracket exclusive use of a bus that might be shared
/// with other users; they are never held across a write-cycle delay.
pub trait Bus {
	fn acquire(&mut self) -> Result<(), BusError>;
	fn release(&mut self);

	fn transmit(&mut self, address: SlaveAddress, data: &[u8], framing: Framing, timeout: Duration) -> Result<(), BusError>;
	fn receive(&mut self, address: SlaveAddress, target: &mut [u8], framing: Framing, timeout: Duration) -> Result<(), BusError>;
}

impl<'a, B: ?Sized + Bus> Bus for &'a mut B {
	fn acquire(&mut self) -> Result<(), BusError> {
		B::acquire(*self)
	}
	fn release(&mut self) {
		B::release(*self)
	}

	fn transmit(&mut self, address: SlaveAddress, data: &[u8], framing: Framing, timeout: Duration) -> Result<(), BusError> {
		B::transmit(*self, address, data, framing, timeout)
	}
	fn receive(&mut self, address: SlaveAddress, target: &mut [u8], framing: Framing, timeout: Duration) -> Result<(), BusError> {
		B::receive(*self, address, target, framing, timeout)
	}
}

/// Bus ownership for the lifetime of the value; released on drop.
pub struct Claimed<'a, B: ?Sized + Bus + 'a>(&'a mut B);

impl<'a, B: ?Sized + Bus> Drop for Claimed<'a, B> {
	fn drop(&mut self) {
		self.0.release();
	}
}

impl<'a, B: ?Sized + Bus> Deref for Claimed<'a, B> {
	type Target = B;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

impl<'a, B: ?Sized + Bus> DerefMut for Claimed<'a, B> {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.0
	}
}

pub trait BusExt: Bus {
	fn claim(&mut self) -> Result<Claimed<'_, Self>, BusError> {
		self.acquire()?;
		Ok(Claimed(self))
	}
}

impl<B: ?Sized + Bus> BusExt for B {
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slave_address_framing() {
		let a = SlaveAddress::new(0x50).unwrap();
		assert_eq!(a.framed(), 0xa0);
		assert_eq!(SlaveAddress::from_framed(0xae).seven_bit(), 0x57);
		assert!(a.is_eeprom_range());
		assert!(!SlaveAddress::new(0x58).unwrap().is_eeprom_range());
		assert!(SlaveAddress::new(0x80).is_err());
	}

	#[test]
	fn slave_address_parse() {
		assert_eq!("0x51".parse::<SlaveAddress>().unwrap().seven_bit(), 0x51);
		assert_eq!("80".parse::<SlaveAddress>().unwrap().seven_bit(), 80);
		assert!("0x1ff".parse::<SlaveAddress>().is_err());
		assert!("0x80".parse::<SlaveAddress>().is_err());
		assert!("eeprom".parse::<SlaveAddress>().is_err());
		assert_eq!(SlaveAddress::EEPROM_MAX.to_string(), "0x57");
	}

	#[test]
	fn claim_releases_on_drop() {
		let mut bus = sim::SimulatedEeprom::new(SlaveAddress::EEPROM_BASE, 256, 8);
		{
			let claimed = bus.claim().unwrap();
			assert!(claimed.is_held());
		}
		assert!(!bus.is_held());
		assert_eq!(bus.acquisitions(), 1);
	}
}
