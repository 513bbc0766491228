use std::thread;
use std::time::{
	Duration,
	Instant,
};

/// sleep for at least `duration`, even if woken up early
pub fn reliable_sleep(mut duration: Duration) {
	loop {
		let now = Instant::now();
		thread::sleep(duration);
		let elapsed = now.elapsed();
		if elapsed >= duration {
			return;
		}
		duration -= elapsed;
	}
}

/// Blocking wait used for the EEPROM write cycle.
pub trait Delay {
	fn delay(&mut self, duration: Duration);
}

impl<'a, D: ?Sized + Delay> Delay for &'a mut D {
	fn delay(&mut self, duration: Duration) {
		D::delay(*self, duration)
	}
}

#[derive(Clone, Copy, Default, Debug)]
pub struct StdDelay;

impl Delay for StdDelay {
	fn delay(&mut self, duration: Duration) {
		reliable_sleep(duration);
	}
}

/// Doesn't wait; only counts the requested delays. For simulated devices.
#[derive(Clone, Copy, Default, Debug)]
pub struct NoDelay {
	pub calls: usize,
	pub total: Duration,
}

impl Delay for NoDelay {
	fn delay(&mut self, duration: Duration) {
		self.calls += 1;
		self.total += duration;
	}
}
