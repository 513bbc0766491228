/// Simulated 24Cxx device behind an in-memory bus.
///
/// Behaves like the real chip where it matters for the driver: the first
/// byte of a write sets the internal address pointer, further bytes are
/// stored with the column counter wrapping inside the current page, and
/// reads auto-increment the pointer (wrapping at the end of the memory).
/// Every transfer is logged, and a single transaction can be made to fail.

use std::time::Duration;

use super::{
	Begin,
	Bus,
	BusError,
	End,
	Framing,
	SlaveAddress,
};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Direction {
	Transmit,
	Receive,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Transfer {
	pub direction: Direction,
	pub address: SlaveAddress,
	pub framing: Framing,
	/// bytes sent, or bytes returned for a receive
	pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
pub struct SimulatedEeprom {
	address: SlaveAddress,
	memory: Vec<u8>,
	page_size: usize,
	pointer: usize,
	held: bool,
	awaiting_restart: bool,
	acquisitions: usize,
	transactions: usize,
	log: Vec<Transfer>,
	fault: Option<(usize, BusError)>,
}

impl SimulatedEeprom {
	pub fn new(address: SlaveAddress, capacity: usize, page_size: usize) -> Self {
		assert!(capacity > 0 && page_size > 0 && capacity % page_size == 0);
		SimulatedEeprom {
			address,
			memory: vec![0xff; capacity],
			page_size,
			pointer: 0,
			held: false,
			awaiting_restart: false,
			acquisitions: 0,
			transactions: 0,
			log: Vec::new(),
			fault: None,
		}
	}

	pub fn memory(&self) -> &[u8] {
		&self.memory
	}

	pub fn memory_mut(&mut self) -> &mut [u8] {
		&mut self.memory
	}

	/// slave address the device answers to
	pub fn device_address(&self) -> SlaveAddress {
		self.address
	}

	pub fn set_device_address(&mut self, address: SlaveAddress) {
		self.address = address;
	}

	pub fn is_held(&self) -> bool {
		self.held
	}

	pub fn acquisitions(&self) -> usize {
		self.acquisitions
	}

	/// number of transactions started (each START, not counting repeated STARTs)
	pub fn transactions(&self) -> usize {
		self.transactions
	}

	pub fn log(&self) -> &[Transfer] {
		&self.log
	}

	/// transmitted transfers carrying data after the memory address
	pub fn data_writes(&self) -> Vec<&Transfer> {
		self.log.iter()
			.filter(|t| t.direction == Direction::Transmit && t.data.len() > 1)
			.collect()
	}

	/// make the `nth` transaction (1-based, counted from now) fail with `error`
	pub fn fail_transaction(&mut self, nth: usize, error: BusError) {
		assert!(nth > 0);
		self.fault = Some((self.transactions + nth, error));
	}

	fn begin(&mut self, address: SlaveAddress, framing: Framing) -> Result<(), BusError> {
		if !self.held {
			return Err(BusError::Transport("bus used without being acquired".into()));
		}
		match framing.begin {
			Begin::Start => {
				self.transactions += 1;
				self.awaiting_restart = false;
			},
			Begin::Restart => {
				if !self.awaiting_restart {
					return Err(BusError::Transport("repeated START outside of a transaction".into()));
				}
				self.awaiting_restart = false;
			},
		}

		let fault_due = match &self.fault {
			Some((nth, _)) => *nth == self.transactions && framing.begin == Begin::Start,
			None => false,
		};
		if fault_due {
			if let Some((_, error)) = self.fault.take() {
				return Err(error);
			}
		}

		if address != self.address {
			return Err(BusError::Nack(address));
		}
		Ok(())
	}

	fn finish(&mut self, framing: Framing) {
		self.awaiting_restart = framing.end == End::AwaitRestart;
	}

	fn store(&mut self, data: &[u8]) {
		let page_base = self.pointer - self.pointer % self.page_size;
		let mut column = self.pointer % self.page_size;
		for b in data {
			self.memory[page_base + column] = *b;
			column = (column + 1) % self.page_size;
		}
		self.pointer = page_base + column;
	}
}

impl Bus for SimulatedEeprom {
	fn acquire(&mut self) -> Result<(), BusError> {
		if self.held {
			return Err(BusError::Transport("bus already acquired".into()));
		}
		self.held = true;
		self.acquisitions += 1;
		Ok(())
	}

	fn release(&mut self) {
		self.held = false;
		self.awaiting_restart = false;
	}

	fn transmit(&mut self, address: SlaveAddress, data: &[u8], framing: Framing, _timeout: Duration) -> Result<(), BusError> {
		self.begin(address, framing)?;
		self.log.push(Transfer {
			direction: Direction::Transmit,
			address,
			framing,
			data: data.to_vec(),
		});

		if let Some((&word_address, payload)) = data.split_first() {
			self.pointer = word_address as usize % self.memory.len();
			self.store(payload);
		}
		self.finish(framing);
		Ok(())
	}

	fn receive(&mut self, address: SlaveAddress, target: &mut [u8], framing: Framing, _timeout: Duration) -> Result<(), BusError> {
		self.begin(address, framing)?;
		for t in target.iter_mut() {
			*t = self.memory[self.pointer];
			self.pointer = (self.pointer + 1) % self.memory.len();
		}
		self.log.push(Transfer {
			direction: Direction::Receive,
			address,
			framing,
			data: target.to_vec(),
		});
		self.finish(framing);
		Ok(())
	}
}
