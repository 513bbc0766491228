#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate i2c_24cxx_prog;
use i2c_24cxx_prog::*;

use std::fs;
use std::io::{
	self,
	Write,
};
use std::path::{
	Path,
	PathBuf,
};
use std::process::exit;
use std::time::{
	Duration,
	Instant,
	SystemTime,
	UNIX_EPOCH,
};

use i2c_24cxx_prog::bus::{
	Bus,
	SlaveAddress,
};
use i2c_24cxx_prog::delay::StdDelay;
use i2c_24cxx_prog::hexdump::{
	ViewMode,
	render,
};

type Device<B> = Eeprom<B, StdDelay>;

fn get_param<T>(matches: &clap::ArgMatches, name: &str) -> AResult<T>
where
	T: std::str::FromStr,
	failure::Error: From<<T as std::str::FromStr>::Err>,
{
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	param.parse::<T>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

// decimal or 0x-prefixed hex
fn parse_number(s: &str) -> AResult<usize> {
	in_context(format!("invalid number {:?}", s), || {
		if s.starts_with("0x") || s.starts_with("0X") {
			Ok(usize::from_str_radix(&s[2..], 16)?)
		} else {
			Ok(s.parse::<usize>()?)
		}
	})
}

fn in_context<F, R>(msg: String, f: F) -> AResult<R>
where
	F: FnOnce() -> AResult<R>,
{
	f().map_err(|e| e.context(msg).into())
}

fn get_number(matches: &clap::ArgMatches, name: &str) -> AResult<usize> {
	match matches.value_of(name) {
		Some(p) => parse_number(p),
		None => bail!("missing parameter {}", name),
	}
}

fn get_bytes(matches: &clap::ArgMatches, name: &str) -> AResult<Vec<u8>> {
	let mut bytes = Vec::new();
	for s in matches.values_of(name).into_iter().flatten() {
		let value = parse_number(s)?;
		ensure!(value <= 0xff, "not a byte value: {}", s);
		bytes.push(value as u8);
	}
	ensure!(!bytes.is_empty(), "no data given");
	Ok(bytes)
}

fn print_progress(op: &Operation) {
	if let (Some(kind), Some(percent)) = (op.kind(), op.percent()) {
		eprint!("\r{:?}: {:3}% ({}/{} bytes)", kind, percent, op.cursor(), op.total());
		if !op.is_running() {
			eprintln!("");
		}
	}
}

fn read_window<B: Bus>(eeprom: &mut Device<B>) -> AResult<MemoryWindow> {
	let mut window = MemoryWindow::for_chip(eeprom.chip());
	let capacity = eeprom.capacity();
	let mut op = Operation::new();
	op.start_read(eeprom, capacity, Instant::now())?;
	if let Err(e) = op.run(eeprom, &mut window, &mut StdDelay, print_progress) {
		eprintln!("");
		bail!("read failed at 0x{:02x}: {}", op.cursor(), e);
	}
	Ok(window)
}

fn probe<B: Bus>(eeprom: &mut Device<B>) -> AResult<()> {
	ensure!(eeprom.init(), "no response from {} at {}", eeprom.chip(), eeprom.address());
	println!("{} at {} responding", eeprom.chip(), eeprom.address());
	Ok(())
}

fn scan<B: Bus>(eeprom: &mut Device<B>) -> AResult<()> {
	let configured = eeprom.address();
	let mut found = 0;
	for a in SlaveAddress::EEPROM_BASE.seven_bit()..=SlaveAddress::EEPROM_MAX.seven_bit() {
		let address = SlaveAddress::new(a)?;
		eeprom.set_address(address);
		if eeprom.probe() {
			println!("{}", address);
			found += 1;
		}
	}
	eeprom.set_address(configured);
	if 0 == found {
		warn!("no device responding in {}..={}", SlaveAddress::EEPROM_BASE, SlaveAddress::EEPROM_MAX);
	}
	Ok(())
}

fn read<B: Bus>(eeprom: &mut Device<B>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_number(sub_m, "ADDRESS")?;
	let length = get_number(sub_m, "LENGTH")?;
	let view: ViewMode = get_param(sub_m, "view")?;

	if 1 == length {
		let value = eeprom.read_byte(address)?;
		print!("{}", render(&[value], address, view));
	} else {
		let data = eeprom.read_vec(address, length)?;
		print!("{}", render(&data, address, view));
	}
	Ok(())
}

fn write<B: Bus>(eeprom: &mut Device<B>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_number(sub_m, "ADDRESS")?;
	let data = get_bytes(sub_m, "DATA")?;

	let written = if 1 == data.len() {
		eeprom.write_byte(address, data[0])?;
		1
	} else {
		eeprom.write_bytes(address, &data)?
	};

	let mut back = vec![0u8; written];
	eeprom.read_bytes(address, &mut back)?;
	ensure!(back[..] == data[..written], "verify failed at 0x{:02x}: read back {:02x?}", address, back);
	println!("wrote {} bytes at 0x{:02x}", written, address);
	Ok(())
}

fn read_all<B: Bus>(eeprom: &mut Device<B>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let view: ViewMode = get_param(sub_m, "view")?;
	let window = read_window(eeprom)?;
	print!("{}", render(window.as_bytes(), 0, view));
	Ok(())
}

fn save<B: Bus>(eeprom: &mut Device<B>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let path = match sub_m.value_of("FILE") {
		Some(file) => PathBuf::from(file),
		None => {
			let dir = Path::new(sub_m.value_of("dir").unwrap_or("."));
			in_context(format!("couldn't create directory {}", dir.display()), || {
				fs::create_dir_all(dir)?;
				Ok(())
			})?;
			let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
			dir.join(window::dump_file_name(eeprom.chip(), now))
		},
	};

	let window = read_window(eeprom)?;
	in_context(format!("couldn't write dump {}", path.display()), || {
		window.write_dump(fs::File::create(&path)?)?;
		Ok(())
	})?;
	println!("saved {} bytes to {}", window.capacity(), path.display());
	Ok(())
}

fn load<B: Bus>(eeprom: &mut Device<B>, sub_m: &clap::ArgMatches) -> AResult<()> {
	let path = match sub_m.value_of("FILE") {
		Some(file) => PathBuf::from(file),
		None => bail!("missing parameter FILE"),
	};
	let dump = in_context(format!("couldn't read dump {}", path.display()), || {
		Ok(window::read_dump(fs::File::open(&path)?, eeprom.capacity())?)
	})?;
	ensure!(!dump.is_empty(), "dump {} is empty", path.display());
	if dump.len() < eeprom.capacity() {
		warn!("dump has {} bytes, {} has {}; rest stays untouched", dump.len(), eeprom.chip(), eeprom.capacity());
	}

	eeprom.write_bytes(0, &dump)?;

	let mut back = vec![0u8; dump.len()];
	eeprom.read_bytes(0, &mut back)?;
	if let Some(address) = (0..dump.len()).find(|&i| back[i] != dump[i]) {
		bail!("verify failed at 0x{:02x}: expected {:02x}, EEPROM has {:02x}", address, dump[address], back[address]);
	}
	println!("loaded {} bytes from {}", dump.len(), path.display());
	Ok(())
}

fn erase<B: Bus>(eeprom: &mut Device<B>, sub_m: &clap::ArgMatches) -> AResult<()> {
	if sub_m.is_present("ADDRESS") {
		let address = get_number(sub_m, "ADDRESS")?;
		let length = get_number(sub_m, "LENGTH")?;
		let erased = eeprom.erase_range(address, length)?;
		println!("erased {} bytes at 0x{:02x}", erased, address);
		return Ok(());
	}

	let mut window = MemoryWindow::for_chip(eeprom.chip());
	let mut op = Operation::new();
	op.start_erase(eeprom, Instant::now())?;
	if let Err(e) = op.run(eeprom, &mut window, &mut StdDelay, print_progress) {
		eprintln!("");
		bail!("erase failed, memory from 0x{:02x} on is indeterminate: {}", op.cursor(), e);
	}
	println!("erased {} bytes", op.cursor());
	Ok(())
}

fn run_command<B: Bus>(mut eeprom: Device<B>, matches: &clap::ArgMatches) -> AResult<()> {
	match matches.subcommand() {
		("probe", _) => {
			probe(&mut eeprom)
		}
		("scan", _) => {
			scan(&mut eeprom)
		}
		("read", Some(sub_m)) => {
			read(&mut eeprom, sub_m)
		}
		("write", Some(sub_m)) => {
			write(&mut eeprom, sub_m)
		}
		("read_all", Some(sub_m)) => {
			read_all(&mut eeprom, sub_m)
		}
		("save", Some(sub_m)) => {
			save(&mut eeprom, sub_m)
		}
		("load", Some(sub_m)) => {
			load(&mut eeprom, sub_m)
		}
		("erase", Some(sub_m)) => {
			erase(&mut eeprom, sub_m)
		}
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg bus: -b --bus +takes_value default_value("/dev/i2c-1") "I2C bus device")
		(@arg address: -a --address +takes_value default_value("0x50") "7-bit slave address of the EEPROM")
		(@arg chip: -c --chip +takes_value default_value("24C02") possible_values(&ChipType::NAMES) "EEPROM type")
		(@arg timeout: -t --timeout +takes_value default_value("100") "bus transaction timeout in milliseconds")
		(@arg simulate: --simulate "use a simulated EEPROM instead of the bus")
		(@subcommand probe =>
			(about: "check whether the EEPROM responds")
		)
		(@subcommand scan =>
			(about: "list responding 24Cxx slave addresses (0x50..0x57)")
		)
		(@subcommand read =>
			(about: "read bytes")
			(@arg view: -v --view +takes_value default_value("hex") possible_values(&ViewMode::NAMES) "display mode")
			(@arg ADDRESS: +required "memory address")
			(@arg LENGTH: default_value("1") "number of bytes")
		)
		(@subcommand write =>
			(about: "write bytes (page by page) and verify them")
			(@arg ADDRESS: +required "memory address")
			(@arg DATA: +required ... "byte values")
		)
		(@subcommand read_all =>
			(about: "read the whole EEPROM and display it")
			(@arg view: -v --view +takes_value default_value("hex") possible_values(&ViewMode::NAMES) "display mode")
		)
		(@subcommand save =>
			(about: "save the whole EEPROM as raw dump")
			(@arg dir: -d --dir +takes_value default_value(".") "directory for generated file names")
			(@arg FILE: "dump file (default: <chip>_<timestamp>.bin)")
		)
		(@subcommand load =>
			(about: "write a raw dump to the EEPROM and verify it")
			(@arg FILE: +required "dump file")
		)
		(@subcommand erase =>
			(about: "fill the whole EEPROM (or a range) with 0xff")
			(@arg ADDRESS: requires("LENGTH") "first address of range")
			(@arg LENGTH: "number of bytes")
		)
	).get_matches();

	let chip: ChipType = get_param(&matches, "chip")?;
	let address: SlaveAddress = get_param(&matches, "address")?;
	let timeout = Duration::from_millis(get_param(&matches, "timeout")?);
	if !address.is_eeprom_range() {
		warn!("slave address {} outside of the 24Cxx range {}..={}", address, SlaveAddress::EEPROM_BASE, SlaveAddress::EEPROM_MAX);
	}

	if matches.is_present("simulate") {
		let bus = bus::sim::SimulatedEeprom::new(address, chip.capacity(), chip.page_size());
		info!("using simulated {} at {}", chip, bus.device_address());
		let mut eeprom = Eeprom::new(bus, StdDelay, chip, address)?;
		eeprom.set_timeout(timeout);
		run_command(eeprom, &matches)
	} else {
		let path = matches.value_of("bus").unwrap_or("/dev/i2c-1");
		let bus = bus::linux::open_i2c_dev(path)?;
		debug!("{}: {} at {}", bus.path(), chip, address);
		let mut eeprom = Eeprom::new(bus, StdDelay, chip, address)?;
		eeprom.set_timeout(timeout);
		run_command(eeprom, &matches)
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		let _ = io::stdout().flush();
		error!("Error: {}", e);
		exit(1);
	}
}
