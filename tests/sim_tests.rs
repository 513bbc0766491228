extern crate i2c_24cxx_prog;

use std::time::{
	Duration,
	Instant,
};

use i2c_24cxx_prog::bus::sim::SimulatedEeprom;
use i2c_24cxx_prog::bus::{
	BusError,
	SlaveAddress,
};
use i2c_24cxx_prog::delay::NoDelay;
use i2c_24cxx_prog::*;

fn eeprom(chip: ChipType) -> Eeprom<SimulatedEeprom, NoDelay> {
	let address = SlaveAddress::EEPROM_BASE;
	let bus = SimulatedEeprom::new(address, chip.capacity(), chip.page_size());
	Eeprom::new(bus, NoDelay::default(), chip, address).unwrap()
}

#[test]
fn write_then_read_back() {
	let mut dev = eeprom(ChipType::C24C02);
	let data: Vec<u8> = (0..40).map(|i| (i * 7) as u8).collect();
	assert_eq!(dev.write_bytes(0x13, &data).unwrap(), 40);

	let mut back = vec![0u8; 40];
	assert_eq!(dev.read_bytes(0x13, &mut back).unwrap(), 40);
	assert_eq!(back, data);
	assert_eq!(dev.read_byte(0x12).unwrap(), 0xff);
	assert_eq!(dev.read_byte(0x13 + 40).unwrap(), 0xff);
	assert!(!dev.bus().is_held());
}

#[test]
fn writes_split_at_page_boundaries() {
	let mut dev = eeprom(ChipType::C24C02);
	// 0x06..0x07, 0x08..0x0f, 0x10..0x11
	dev.write_bytes(0x06, &[0xaa; 12]).unwrap();
	let writes = dev.bus().data_writes();
	let layout: Vec<(u8, usize)> = writes.iter().map(|t| (t.data[0], t.data.len() - 1)).collect();
	assert_eq!(layout, vec![(0x06, 2), (0x08, 8), (0x10, 2)]);
	assert_eq!(dev.delay().calls, 3);
	assert_eq!(dev.delay().total, Duration::from_millis(30));
}

#[test]
fn erase_all_fills_memory() {
	let mut dev = eeprom(ChipType::C24C01);
	for b in dev.bus_mut().memory_mut() {
		*b = 0x5a;
	}
	dev.erase_all().unwrap();
	assert!(dev.bus().memory().iter().all(|&b| b == 0xff));
	assert_eq!(dev.bus().data_writes().len(), ChipType::C24C01.pages());
}

#[test]
fn failing_page_reports_committed_bytes() {
	let mut dev = eeprom(ChipType::C24C02);
	dev.bus_mut().fail_transaction(3, BusError::Nack(SlaveAddress::EEPROM_BASE));
	let err = dev.write_bytes(0x00, &[0x11; 40]).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::BusNack);
	assert_eq!(err.committed(), 16);
	assert_eq!(&dev.bus().memory()[0..16], &[0x11; 16][..]);
	assert!(dev.bus().memory()[16..].iter().all(|&b| b == 0xff));
	assert!(!dev.bus().is_held());
}

#[test]
fn set_address_then_probe() {
	let mut dev = eeprom(ChipType::C24C02);
	assert!(dev.init());

	let other = SlaveAddress::new(0x53).unwrap();
	dev.set_address(other);
	assert!(!dev.probe());

	dev.bus_mut().set_device_address(other);
	assert!(dev.probe());
	assert_eq!(dev.read_byte(0).unwrap(), 0xff);
}

#[test]
fn out_of_range_is_a_usage_error() {
	let mut dev = eeprom(ChipType::C24C02);
	let err = dev.read_byte(256).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::UsageError);
	assert_eq!(dev.bus().transactions(), 0);

	let mut buf = [0u8; 8];
	assert_eq!(dev.read_bytes(252, &mut buf).unwrap(), 4);
}

#[test]
fn progressive_read_fills_window() {
	let mut dev = eeprom(ChipType::C24C02);
	for (i, b) in dev.bus_mut().memory_mut().iter_mut().enumerate() {
		*b = i as u8;
	}
	let mut window = MemoryWindow::for_chip(ChipType::C24C02);
	let mut op = Operation::new();

	let start = Instant::now();
	op.start_read(&dev, 255, start).unwrap();
	assert_eq!(op.state(), State::Running);

	let mut steps = 0;
	let mut now = start;
	loop {
		now += Duration::from_millis(30);
		match op.advance(&mut dev, &mut window, now) {
			StepOutcome::Progress { .. } => steps += 1,
			StepOutcome::Done => {
				steps += 1;
				break;
			},
			other => panic!("unexpected step {:?}", other),
		}
	}
	assert_eq!(steps, 16);
	assert_eq!(op.state(), State::Completed);
	assert_eq!(op.cursor(), 255);
	assert_eq!(&window.as_bytes()[..255], &dev.bus().memory()[..255]);
	assert_eq!(window.get(255), Some(0));
}

#[test]
fn progressive_erase_runs_to_completion() {
	let mut dev = eeprom(ChipType::C24C02);
	for b in dev.bus_mut().memory_mut() {
		*b = 0;
	}
	let mut window = MemoryWindow::for_chip(ChipType::C24C02);
	let mut op = Operation::new();
	op.start_erase(&dev, Instant::now()).unwrap();
	op.set_min_interval(Duration::from_millis(0));

	let mut reports = 0;
	op.run(&mut dev, &mut window, &mut NoDelay::default(), |_| reports += 1).unwrap();
	assert_eq!(op.state(), State::Completed);
	assert_eq!(op.percent(), Some(100));
	assert_eq!(reports, 32);
	assert!(dev.bus().memory().iter().all(|&b| b == 0xff));
}
