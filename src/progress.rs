/// Full read and full erase broken into small steps.
///
/// `Operation::advance` is meant to be called once per tick of a polling
/// loop (a UI redraw, for example). It does nothing until the step interval
/// has passed since the last step, then moves a single chunk over the bus.
/// One call therefore blocks for at most one transaction plus one write
/// cycle, and the bus is free between steps.
///
/// A failed chunk ends the operation; nothing is retried or resumed.

use std::cmp;
use std::time::{
	Duration,
	Instant,
};

use crate::bus::Bus;
use crate::delay::Delay;
use crate::eeprom::{
	Eeprom,
	EepromError,
};
use crate::window::MemoryWindow;

pub const READ_CHUNK: usize = 16;
pub const READ_INTERVAL: Duration = Duration::from_millis(30);
pub const ERASE_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum OperationKind {
	Read,
	Erase,
}

impl OperationKind {
	pub fn default_interval(&self) -> Duration {
		match self {
			OperationKind::Read => READ_INTERVAL,
			OperationKind::Erase => ERASE_INTERVAL,
		}
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum State {
	Idle,
	Running,
	Completed,
	Failed,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StepOutcome {
	/// no operation started
	Idle,
	/// step interval not over yet; nothing happened
	StillRunning { cursor: usize, total: usize },
	Progress { cursor: usize, total: usize },
	Done,
	Failed(EepromError),
}

#[derive(Clone, PartialEq, Eq, Debug)]
enum Phase {
	Idle,
	Running,
	Completed,
	Failed(EepromError),
}

#[derive(Clone, Debug)]
pub struct Operation {
	kind: Option<OperationKind>,
	phase: Phase,
	total: usize,
	cursor: usize,
	chunk_size: usize,
	last_step: Option<Instant>,
	interval: Option<Duration>,
}

impl Default for Operation {
	fn default() -> Self {
		Operation {
			kind: None,
			phase: Phase::Idle,
			total: 0,
			cursor: 0,
			chunk_size: 0,
			last_step: None,
			interval: None,
		}
	}
}

impl Operation {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn kind(&self) -> Option<OperationKind> {
		self.kind
	}

	pub fn state(&self) -> State {
		match self.phase {
			Phase::Idle => State::Idle,
			Phase::Running => State::Running,
			Phase::Completed => State::Completed,
			Phase::Failed(_) => State::Failed,
		}
	}

	pub fn is_running(&self) -> bool {
		self.phase == Phase::Running
	}

	pub fn total(&self) -> usize {
		self.total
	}

	/// bytes transferred successfully so far
	pub fn cursor(&self) -> usize {
		self.cursor
	}

	pub fn chunk_size(&self) -> usize {
		self.chunk_size
	}

	pub fn last_error(&self) -> Option<&EepromError> {
		match &self.phase {
			Phase::Failed(e) => Some(e),
			_ => None,
		}
	}

	/// `None` without a started operation
	pub fn percent(&self) -> Option<usize> {
		if 0 == self.total {
			return None;
		}
		Some(self.cursor * 100 / self.total)
	}

	/// minimum time between two steps
	pub fn min_interval(&self) -> Duration {
		match (self.interval, self.kind) {
			(Some(interval), _) => interval,
			(None, Some(kind)) => kind.default_interval(),
			(None, None) => Duration::from_millis(0),
		}
	}

	/// overrides the per-kind step interval (kept across operations)
	pub fn set_min_interval(&mut self, interval: Duration) {
		self.interval = Some(interval);
	}

	fn start(&mut self, kind: OperationKind, total: usize, chunk_size: usize, now: Instant) -> Result<(), EepromError> {
		if self.is_running() {
			return Err(EepromError::Usage(format!("{:?} operation still running", self.kind)));
		}
		if 0 == total {
			return Err(EepromError::Usage("empty operation".into()));
		}

		self.kind = Some(kind);
		self.phase = Phase::Running;
		self.total = total;
		self.cursor = 0;
		self.chunk_size = chunk_size;
		self.last_step = Some(now);
		debug!("{:?} of {} bytes started ({} byte steps every {:?})", kind, total, chunk_size, self.min_interval());
		Ok(())
	}

	/// Reads the first `total` bytes of the device into the window passed
	/// to `advance`.
	pub fn start_read<B: Bus, D: Delay>(&mut self, eeprom: &Eeprom<B, D>, total: usize, now: Instant) -> Result<(), EepromError> {
		let capacity = eeprom.capacity();
		let total = if total > capacity {
			warn!("read of {} bytes truncated to {} bytes", total, capacity);
			capacity
		} else {
			total
		};
		self.start(OperationKind::Read, total, READ_CHUNK, now)
	}

	pub fn start_erase<B: Bus, D: Delay>(&mut self, eeprom: &Eeprom<B, D>, now: Instant) -> Result<(), EepromError> {
		self.start(OperationKind::Erase, eeprom.capacity(), eeprom.page_size(), now)
	}

	/// back to idle; bytes already transferred stay transferred
	pub fn cancel(&mut self) {
		if self.is_running() {
			info!("{:?} cancelled at {}/{} bytes", self.kind, self.cursor, self.total);
		}
		let interval = self.interval;
		*self = Operation {
			interval,
			..Operation::default()
		};
	}

	/// time left until the next step is due
	pub fn until_due(&self, now: Instant) -> Duration {
		match self.last_step {
			Some(last) => {
				let elapsed = now.checked_duration_since(last).unwrap_or_default();
				self.min_interval().checked_sub(elapsed).unwrap_or_default()
			},
			None => Duration::from_millis(0),
		}
	}

	fn is_due(&self, now: Instant) -> bool {
		match self.last_step {
			Some(last) => match now.checked_duration_since(last) {
				Some(elapsed) => elapsed >= self.min_interval(),
				None => false,
			},
			None => true,
		}
	}

	fn complete(&mut self) -> StepOutcome {
		info!("{:?} of {} bytes completed", self.kind, self.total);
		self.phase = Phase::Completed;
		StepOutcome::Done
	}

	fn fail(&mut self, e: EepromError) -> StepOutcome {
		warn!("{:?} failed at {}/{} bytes: {}", self.kind, self.cursor, self.total, e);
		self.phase = Phase::Failed(e.clone());
		StepOutcome::Failed(e)
	}

	/// Runs one step if it is due. The step transferring the last chunk
	/// completes the operation and returns `StepOutcome::Done`.
	pub fn advance<B: Bus, D: Delay>(&mut self, eeprom: &mut Eeprom<B, D>, window: &mut MemoryWindow, now: Instant) -> StepOutcome {
		match &self.phase {
			Phase::Idle => return StepOutcome::Idle,
			Phase::Completed => return StepOutcome::Done,
			Phase::Failed(e) => return StepOutcome::Failed(e.clone()),
			Phase::Running => (),
		}

		if !self.is_due(now) {
			return StepOutcome::StillRunning {
				cursor: self.cursor,
				total: self.total,
			};
		}
		if self.cursor >= self.total {
			return self.complete();
		}

		let len = cmp::min(self.chunk_size, self.total - self.cursor);
		let res = match self.kind {
			Some(OperationKind::Read) => {
				let end = self.cursor + len;
				if end > window.capacity() {
					Err(EepromError::Usage(format!("memory window of {} bytes too small for {} bytes", window.capacity(), self.total)))
				} else {
					eeprom.read_bytes(self.cursor, &mut window.as_mut_bytes()[self.cursor..end])
				}
			},
			Some(OperationKind::Erase) => eeprom.erase_range(self.cursor, len),
			None => Err(EepromError::Usage("running operation without kind".into())),
		};

		match res {
			Ok(transferred) => {
				self.cursor += transferred;
				self.last_step = Some(now);
				trace!("{:?}: {}/{} bytes", self.kind, self.cursor, self.total);
				if self.cursor >= self.total {
					self.complete()
				} else {
					StepOutcome::Progress {
						cursor: self.cursor,
						total: self.total,
					}
				}
			},
			Err(e) => self.fail(e),
		}
	}

	/// Drives the started operation to the end, sleeping between steps.
	/// `report` is called after every step that moved data.
	pub fn run<B, D, S, F>(&mut self, eeprom: &mut Eeprom<B, D>, window: &mut MemoryWindow, sleeper: &mut S, mut report: F) -> Result<(), EepromError>
	where
		B: Bus,
		D: Delay,
		S: Delay,
		F: FnMut(&Operation),
	{
		loop {
			let now = Instant::now();
			match self.advance(eeprom, window, now) {
				StepOutcome::Idle => return Ok(()),
				StepOutcome::StillRunning { .. } => sleeper.delay(self.until_due(now)),
				StepOutcome::Progress { .. } => report(self),
				StepOutcome::Done => {
					report(self);
					return Ok(());
				},
				StepOutcome::Failed(e) => return Err(e),
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::bus::sim::{
		Direction,
		SimulatedEeprom,
	};
	use crate::bus::{
		BusError,
		SlaveAddress,
	};
	use crate::chip::ChipType;
	use crate::delay::NoDelay;
	use crate::eeprom::ErrorKind;

	fn driver() -> Eeprom<SimulatedEeprom, NoDelay> {
		let mut dev = SimulatedEeprom::new(SlaveAddress::EEPROM_BASE, 256, 8);
		for (i, b) in dev.memory_mut().iter_mut().enumerate() {
			*b = i as u8 ^ 0x3c;
		}
		Eeprom::new(dev, NoDelay::default(), ChipType::C24C02, SlaveAddress::EEPROM_BASE).unwrap()
	}

	fn ms(n: u64) -> Duration {
		Duration::from_millis(n)
	}

	#[test]
	fn throttled_advance_changes_nothing() {
		let mut ee = driver();
		let mut window = MemoryWindow::new(256);
		let mut op = Operation::new();
		let t0 = Instant::now();
		op.start_read(&ee, 255, t0).unwrap();

		assert_eq!(op.advance(&mut ee, &mut window, t0 + ms(29)), StepOutcome::StillRunning { cursor: 0, total: 255 });
		assert_eq!(op.cursor(), 0);
		assert_eq!(op.state(), State::Running);
		assert_eq!(ee.bus().acquisitions(), 0);
		assert_eq!(op.until_due(t0 + ms(10)), ms(20));
	}

	#[test]
	fn read_255_bytes_in_16_steps() {
		let mut ee = driver();
		let mut window = MemoryWindow::new(256);
		let mut op = Operation::new();
		let t0 = Instant::now();
		op.start_read(&ee, 255, t0).unwrap();

		for step in 1..=15u64 {
			let now = t0 + READ_INTERVAL * step as u32;
			assert_eq!(
				op.advance(&mut ee, &mut window, now),
				StepOutcome::Progress { cursor: 16 * step as usize, total: 255 },
			);
			// not due again within the same tick
			assert_eq!(
				op.advance(&mut ee, &mut window, now + ms(1)),
				StepOutcome::StillRunning { cursor: 16 * step as usize, total: 255 },
			);
		}
		assert_eq!(op.percent(), Some(240 * 100 / 255));
		assert_eq!(op.advance(&mut ee, &mut window, t0 + READ_INTERVAL * 16), StepOutcome::Done);
		assert_eq!(op.state(), State::Completed);
		assert_eq!(op.cursor(), 255);
		assert_eq!(op.percent(), Some(100));

		let last = ee.bus().log().iter().rev().find(|t| t.direction == Direction::Receive).unwrap();
		assert_eq!(last.data.len(), 15);
		assert_eq!(&window.as_bytes()[..255], &ee.bus().memory()[..255]);
		assert_eq!(window.as_bytes()[255], 0);
	}

	#[test]
	fn erase_fails_on_third_page() {
		let mut ee = driver();
		let mut window = MemoryWindow::new(256);
		let mut op = Operation::new();
		let t0 = Instant::now();
		op.start_erase(&ee, t0).unwrap();
		assert_eq!(op.chunk_size(), 8);
		ee.bus_mut().fail_transaction(3, BusError::Nack(SlaveAddress::EEPROM_BASE));

		assert_eq!(op.advance(&mut ee, &mut window, t0 + ms(50)), StepOutcome::Progress { cursor: 8, total: 256 });
		assert_eq!(op.advance(&mut ee, &mut window, t0 + ms(100)), StepOutcome::Progress { cursor: 16, total: 256 });
		match op.advance(&mut ee, &mut window, t0 + ms(150)) {
			StepOutcome::Failed(e) => assert_eq!(e.kind(), ErrorKind::BusNack),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(op.state(), State::Failed);
		assert_eq!(op.cursor(), 16);
		assert!(op.last_error().is_some());

		// failed operations stay failed and don't touch the bus
		match op.advance(&mut ee, &mut window, t0 + ms(500)) {
			StepOutcome::Failed(_) => (),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(ee.bus().transactions(), 3);
		assert!(ee.bus().memory()[..16].iter().all(|&b| b == 0xff));
		assert_eq!(ee.bus().memory()[16], 16 ^ 0x3c);
	}

	#[test]
	fn read_timeout_fails_operation() {
		let mut ee = driver();
		let mut window = MemoryWindow::new(256);
		let mut op = Operation::new();
		let t0 = Instant::now();
		op.start_read(&ee, 64, t0).unwrap();
		ee.bus_mut().fail_transaction(2, BusError::Timeout(SlaveAddress::EEPROM_BASE));

		assert_eq!(op.advance(&mut ee, &mut window, t0 + ms(30)), StepOutcome::Progress { cursor: 16, total: 64 });
		match op.advance(&mut ee, &mut window, t0 + ms(60)) {
			StepOutcome::Failed(e) => assert_eq!(e.kind(), ErrorKind::Timeout),
			other => panic!("unexpected {:?}", other),
		}
		assert_eq!(op.state(), State::Failed);
		assert_eq!(op.cursor(), 16);
		assert_eq!(op.last_error().map(|e| e.kind()), Some(ErrorKind::Timeout));
		assert!(!ee.bus().is_held());
	}

	#[test]
	fn erase_whole_device() {
		let mut ee = driver();
		let mut window = MemoryWindow::new(256);
		let mut op = Operation::new();
		let t0 = Instant::now();
		op.start_erase(&ee, t0).unwrap();

		let mut steps = 0;
		loop {
			steps += 1;
			match op.advance(&mut ee, &mut window, t0 + ERASE_INTERVAL * steps) {
				StepOutcome::Progress { .. } => (),
				StepOutcome::Done => break,
				other => panic!("unexpected {:?}", other),
			}
		}
		assert_eq!(steps, 32);
		assert!(ee.bus().memory().iter().all(|&b| b == 0xff));
		assert_eq!(ee.delay().calls, 32);
	}

	#[test]
	fn cancel_returns_to_idle() {
		let mut ee = driver();
		let mut window = MemoryWindow::new(256);
		let mut op = Operation::new();
		let t0 = Instant::now();
		op.start_erase(&ee, t0).unwrap();
		op.advance(&mut ee, &mut window, t0 + ms(50));
		op.cancel();

		assert_eq!(op.state(), State::Idle);
		assert_eq!(op.percent(), None);
		assert_eq!(op.advance(&mut ee, &mut window, t0 + ms(100)), StepOutcome::Idle);
		// no rollback
		assert!(ee.bus().memory()[..8].iter().all(|&b| b == 0xff));
		assert_eq!(ee.bus().transactions(), 1);
	}

	#[test]
	fn one_operation_at_a_time() {
		let ee = driver();
		let mut op = Operation::new();
		let t0 = Instant::now();
		assert_eq!(op.start_read(&ee, 0, t0).unwrap_err().kind(), ErrorKind::UsageError);
		op.start_read(&ee, 64, t0).unwrap();
		assert_eq!(op.start_erase(&ee, t0).unwrap_err().kind(), ErrorKind::UsageError);
		assert_eq!(op.kind(), Some(OperationKind::Read));
		assert_eq!(op.percent(), Some(0));
	}

	#[test]
	fn oversized_read_is_truncated() {
		let ee = driver();
		let mut op = Operation::new();
		op.start_read(&ee, 1000, Instant::now()).unwrap();
		assert_eq!(op.total(), 256);
	}

	#[test]
	fn small_window_fails_read() {
		let mut ee = driver();
		let mut window = MemoryWindow::new(8);
		let mut op = Operation::new();
		op.set_min_interval(ms(0));
		let t0 = Instant::now();
		op.start_read(&ee, 32, t0).unwrap();
		match op.advance(&mut ee, &mut window, t0) {
			StepOutcome::Failed(e) => assert_eq!(e.kind(), ErrorKind::UsageError),
			other => panic!("unexpected {:?}", other),
		}
	}

	#[test]
	fn run_to_completion() {
		let mut ee = driver();
		let mut window = MemoryWindow::new(256);
		let mut op = Operation::new();
		op.set_min_interval(ms(0));
		op.start_read(&ee, 256, Instant::now()).unwrap();

		let mut reports = Vec::new();
		let mut sleeper = NoDelay::default();
		op.run(&mut ee, &mut window, &mut sleeper, |op| reports.push(op.cursor())).unwrap();
		assert_eq!(reports.len(), 16);
		assert_eq!(reports.last(), Some(&256));
		assert_eq!(window.as_bytes(), ee.bus().memory());
	}
}
