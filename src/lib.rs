#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

macro_rules! with_context {
	(( $fmt:tt $($t:tt)* ), $e:expr) => {{
		use failure::Error;

		match (|| { $e })() {
			Ok(v) => Ok(v),
			Err(e) => {
				let e: Error = e;
				let msg = format!(concat!($fmt, ": {}") $($t)*, e);
				Err(Error::from(e.context(msg)))
			}
		}
	}};

	($msg:expr, $e:expr) => {
		with_context!(("{}", $msg), $e)
	};
}

pub type AResult<T> = Result<T, failure::Error>;

pub mod bus;
pub mod chip;
pub mod delay;
pub mod eeprom;
pub mod hexdump;
pub mod progress;
pub mod window;

pub use self::chip::ChipType;
pub use self::eeprom::{
	Eeprom,
	EepromError,
	ErrorKind,
};
pub use self::progress::{
	Operation,
	OperationKind,
	State,
	StepOutcome,
};
pub use self::window::MemoryWindow;
