/// Linux `i2c-dev` transport (`/dev/i2c-N`).
///
/// The kernel only keeps the bus between messages of a single `I2C_RDWR`
/// ioctl, so a transfer ending in `End::AwaitRestart` is queued and sent
/// together with the transfers following it, up to the one ending with STOP.

use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use libc::{
	EIO,
	ENXIO,
	EREMOTEIO,
	ETIMEDOUT,
	LOCK_EX,
	LOCK_UN,
	c_ulong,
	flock,
	ioctl,
};

use super::{
	Begin,
	Bus,
	BusError,
	End,
	Framing,
	SlaveAddress,
};

const I2C_TIMEOUT: c_ulong = 0x0702; // in units of 10 ms
const I2C_RDWR: c_ulong = 0x0707;

const I2C_M_RD: u16 = 0x0001;

#[repr(C)]
struct I2cMsg {
	addr: u16,
	flags: u16,
	len: u16,
	buf: *mut u8,
}

#[repr(C)]
struct I2cRdwrIoctlData {
	msgs: *mut I2cMsg,
	nmsgs: u32,
}

// kernel limit for messages in one I2C_RDWR call
const MAX_MESSAGES: usize = 42;

fn timeout_units(timeout: Duration) -> c_ulong {
	let ms = timeout.as_millis();
	let units = (ms + 9) / 10;
	if units == 0 { 1 } else { units as c_ulong }
}

fn map_os_error(address: SlaveAddress, e: io::Error) -> BusError {
	match e.raw_os_error() {
		// adapters report a missing ACK with one of these
		Some(ENXIO) | Some(EREMOTEIO) | Some(EIO) => BusError::Nack(address),
		Some(ETIMEDOUT) => BusError::Timeout(address),
		_ => BusError::Transport(e.to_string()),
	}
}

pub struct I2cDev {
	file: fs::File,
	path: String,
	timeout: Option<Duration>,
	// write transfers waiting for a repeated START
	pending: Vec<(SlaveAddress, Vec<u8>)>,
	locked: bool,
}

impl I2cDev {
	pub fn path(&self) -> &str {
		&self.path
	}

	fn set_timeout(&mut self, timeout: Duration) -> Result<(), BusError> {
		if self.timeout == Some(timeout) {
			return Ok(());
		}
		let res = unsafe { ioctl(self.file.as_raw_fd(), I2C_TIMEOUT as _, timeout_units(timeout)) };
		if res < 0 {
			return Err(BusError::Transport(format!("couldn't set timeout: {}", io::Error::last_os_error())));
		}
		self.timeout = Some(timeout);
		Ok(())
	}

	fn rdwr(&mut self, address: SlaveAddress, msgs: &mut [I2cMsg]) -> Result<(), BusError> {
		let mut data = I2cRdwrIoctlData {
			msgs: msgs.as_mut_ptr(),
			nmsgs: msgs.len() as u32,
		};
		let res = unsafe { ioctl(self.file.as_raw_fd(), I2C_RDWR as _, &mut data as *mut I2cRdwrIoctlData) };
		if res < 0 {
			let e = io::Error::last_os_error();
			debug!("{}: I2C_RDWR with {} failed: {}", self.path, address, e);
			return Err(map_os_error(address, e));
		}
		Ok(())
	}

	// START must not interrupt queued transfers, a repeated START needs one
	fn check_begin(&mut self, framing: Framing) -> Result<(), BusError> {
		match framing.begin {
			Begin::Start => {
				if !self.pending.is_empty() {
					self.pending.clear();
					return Err(BusError::Transport("START while a transaction awaits a repeated START".into()));
				}
			},
			Begin::Restart => {
				if self.pending.is_empty() {
					return Err(BusError::Transport("repeated START outside of a transaction".into()));
				}
			},
		}
		ensure_bus(self.pending.len() < MAX_MESSAGES, "too many messages in one transaction")
	}

	fn pending_messages(&mut self) -> Vec<I2cMsg> {
		self.pending.iter_mut().map(|(address, data)| I2cMsg {
			addr: address.seven_bit() as u16,
			flags: 0,
			len: data.len() as u16,
			buf: data.as_mut_ptr(),
		}).collect()
	}
}

fn ensure_bus(cond: bool, msg: &str) -> Result<(), BusError> {
	if cond { Ok(()) } else { Err(BusError::Transport(msg.into())) }
}

impl Drop for I2cDev {
	fn drop(&mut self) {
		if self.locked {
			self.release();
		}
	}
}

impl Bus for I2cDev {
	fn acquire(&mut self) -> Result<(), BusError> {
		// other processes using the same adapter through this crate are serialized
		let res = unsafe { flock(self.file.as_raw_fd(), LOCK_EX) };
		if res != 0 {
			return Err(BusError::Transport(format!("couldn't lock {}: {}", self.path, io::Error::last_os_error())));
		}
		self.locked = true;
		Ok(())
	}

	fn release(&mut self) {
		if !self.pending.is_empty() {
			warn!("{}: released bus with {} unsent transfers", self.path, self.pending.len());
			self.pending.clear();
		}
		let res = unsafe { flock(self.file.as_raw_fd(), LOCK_UN) };
		if res != 0 {
			warn!("{}: couldn't unlock: {}", self.path, io::Error::last_os_error());
		}
		self.locked = false;
	}

	fn transmit(&mut self, address: SlaveAddress, data: &[u8], framing: Framing, timeout: Duration) -> Result<(), BusError> {
		ensure_bus(data.len() <= u16::max_value() as usize, "transfer too long")?;
		self.check_begin(framing)?;
		self.pending.push((address, data.to_vec()));
		if framing.end == End::AwaitRestart {
			return Ok(());
		}

		self.set_timeout(timeout)?;
		let mut msgs = self.pending_messages();
		let res = self.rdwr(address, &mut msgs);
		drop(msgs);
		self.pending.clear();
		res
	}

	fn receive(&mut self, address: SlaveAddress, target: &mut [u8], framing: Framing, timeout: Duration) -> Result<(), BusError> {
		ensure_bus(target.len() <= u16::max_value() as usize, "transfer too long")?;
		if framing.end == End::AwaitRestart {
			self.pending.clear();
			return Err(BusError::Transport("reads can't be continued by a repeated START".into()));
		}
		self.check_begin(framing)?;

		self.set_timeout(timeout)?;
		let mut msgs = self.pending_messages();
		msgs.push(I2cMsg {
			addr: address.seven_bit() as u16,
			flags: I2C_M_RD,
			len: target.len() as u16,
			buf: target.as_mut_ptr(),
		});
		let res = self.rdwr(address, &mut msgs);
		drop(msgs);
		self.pending.clear();
		res
	}
}

// TODO: probe I2C_FUNCS and refuse adapters without I2C_FUNC_I2C
pub fn open_i2c_dev(path: &str) -> crate::AResult<I2cDev> {
	with_context!(("couldn't open I2C bus {}", path), {
		let file = fs::OpenOptions::new()
			.read(true)
			.write(true)
			.open(path)?;

		Ok(I2cDev {
			file,
			path: path.to_string(),
			timeout: None,
			pending: Vec::new(),
			locked: false,
		})
	})
}
