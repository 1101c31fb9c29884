#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate sqi_sram_bitbang;
use sqi_sram_bitbang::*;

use std::io::{
	self,
	Read,
	Write,
};
use std::process::exit;

use sqi_sram_bitbang::gpio::{
	SysfsPin,
	open_pin,
};
use sqi_sram_bitbang::spi::{
	BusyWait,
	SoftSpi,
	WORD_BITS,
};
use sqi_sram_bitbang::sram::{
	OpMode,
	SerialRam,
};

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
fn get_number(matches: &clap::ArgMatches, name: &str) -> AResult<u64> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => bail!("missing parameter {}", name),
	};
	let parsed = if param.starts_with("0x") || param.starts_with("0X") {
		u64::from_str_radix(&param[2..], 16)
	} else {
		u64::from_str_radix(param, 10)
	};
	match parsed {
		Ok(v) => Ok(v),
		Err(e) => bail!("invalid parameter {}: {}", name, e),
	}
}

fn get_address(matches: &clap::ArgMatches, name: &str) -> AResult<u16> {
	let value = get_number(matches, name)?;
	ensure!(value <= 0xffff, "address out of range: 0x{:x}", value);
	Ok(value as u16)
}

struct Wiring {
	ram: SerialRam<SysfsPin, BusyWait>,
	quad_capable: bool,
}

fn open_bus(matches: &clap::ArgMatches) -> AResult<Wiring> {
	let frequency = get_number(matches, "frequency")?;
	ensure!(frequency > 0 && frequency <= u32::max_value() as u64, "bad frequency: {}", frequency);
	let timing = BusyWait::new(frequency as u32);

	let mode = get_number(matches, "spi_mode")?;
	ensure!(mode < 4, "SPI mode must be 0..=3, got {}", mode);

	let sclk = open_pin(get_number(matches, "sclk")? as u32)?;
	let mosi = open_pin(get_number(matches, "mosi")? as u32)?;
	let miso = open_pin(get_number(matches, "miso")? as u32)?;
	let chip_select = open_pin(get_number(matches, "cs")? as u32)?;

	let quad_capable = match (matches.is_present("sio2"), matches.is_present("sio3")) {
		(true, true) => true,
		(false, false) => false,
		_ => bail!("quad wiring needs both --sio2 and --sio3"),
	};

	let mut spi = if quad_capable {
		let sio2 = open_pin(get_number(matches, "sio2")? as u32)?;
		let sio3 = open_pin(get_number(matches, "sio3")? as u32)?;
		SoftSpi::with_quad_lanes([mosi, miso, sio2, sio3], sclk, timing)
	} else {
		SoftSpi::new(mosi, miso, sclk, timing)
	};
	spi.configure_format(WORD_BITS, mode as u8);
	spi.configure_frequency(frequency as u32);

	Ok(Wiring {
		ram: SerialRam::new(spi, chip_select),
		quad_capable,
	})
}

fn want_quad(wiring: &Wiring, sub_m: &clap::ArgMatches) -> AResult<bool> {
	if !sub_m.is_present("quad") {
		return Ok(false);
	}
	ensure!(wiring.quad_capable, "--quad needs quad wiring (--sio2/--sio3)");
	Ok(true)
}

fn read_mode(matches: &clap::ArgMatches) -> AResult<()> {
	let mut wiring = open_bus(matches)?;
	println!("mode register: 0x{:02x}", wiring.ram.read_mode_register());
	Ok(())
}

fn set_mode(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let mode: OpMode = get_param(sub_m, "MODE")?;
	let mut wiring = open_bus(matches)?;
	wiring.ram.set_op_mode(mode);
	info!("operation mode set to {:?}", mode);
	Ok(())
}

fn enter_quad(matches: &clap::ArgMatches) -> AResult<()> {
	let mut wiring = open_bus(matches)?;
	wiring.ram.enter_quad_io();
	Ok(())
}

fn reset_io(matches: &clap::ArgMatches) -> AResult<()> {
	let mut wiring = open_bus(matches)?;
	wiring.ram.reset_io();
	Ok(())
}

fn read_memory(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_address(sub_m, "ADDRESS")?;
	let length = get_number(sub_m, "LENGTH")? as usize;
	let mut wiring = open_bus(matches)?;
	let quad = want_quad(&wiring, sub_m)?;

	let mut data = vec![0u8; length];
	if quad {
		wiring.ram.quad_read(address, &mut data);
	} else {
		wiring.ram.read(address, &mut data);
	}

	io::stdout().write_all(&data)?;
	Ok(())
}

fn write_memory(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_address(sub_m, "ADDRESS")?;
	let mut wiring = open_bus(matches)?;
	let quad = want_quad(&wiring, sub_m)?;

	let mut data = Vec::new();
	io::stdin().read_to_end(&mut data)?;
	ensure!(data.len() <= 0x1_0000, "data longer than the 64 KiB address space");

	if quad {
		wiring.ram.quad_write(address, &data);
	} else {
		wiring.ram.write(address, &data);
	}
	info!("wrote {} bytes at 0x{:04x}", data.len(), address);
	Ok(())
}

fn dump_memory(matches: &clap::ArgMatches, sub_m: &clap::ArgMatches) -> AResult<()> {
	let address = get_address(sub_m, "ADDRESS")?;
	let length = get_number(sub_m, "LENGTH")? as usize;
	let mut wiring = open_bus(matches)?;
	let quad = want_quad(&wiring, sub_m)?;

	let mut data = vec![0u8; length];
	if quad {
		wiring.ram.quad_read(address, &mut data);
	} else {
		wiring.ram.read(address, &mut data);
	}

	for i in 0..data.len() {
		if 0 == i % 16 {
			print!("{:08x} ", address as usize + i);
		} else if 0 == i % 8 {
			print!(" ");
		}
		print!(" {:02x}", data[i]);
		if 15 == i % 16 {
			println!();
		}
	}
	if 0 != data.len() % 16 {
		println!();
	}
	Ok(())
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg mosi: --mosi +takes_value +required "GPIO number for MOSI / SIO0")
		(@arg miso: --miso +takes_value +required "GPIO number for MISO / SIO1")
		(@arg sclk: --sclk +takes_value +required "GPIO number for the serial clock")
		(@arg cs: --cs +takes_value +required "GPIO number for chip-select (active low)")
		(@arg sio2: --sio2 +takes_value "GPIO number for SIO2 (quad wiring)")
		(@arg sio3: --sio3 +takes_value "GPIO number for SIO3 / HOLD# (quad wiring)")
		(@arg frequency: --frequency +takes_value default_value("100000") "target clock frequency in Hz")
		(@arg spi_mode: --("spi-mode") +takes_value default_value("0") "SPI clock mode (0..=3)")
		(@subcommand mode =>
			(about: "read the chip's mode register")
		)
		(@subcommand set_mode =>
			(about: "set the chip's operation mode")
			(@arg MODE: +required "BYTE, SEQ or PAGE")
		)
		(@subcommand enter_quad =>
			(about: "switch the chip to quad I/O")
		)
		(@subcommand reset_io =>
			(about: "switch the chip back to standard SPI I/O")
		)
		(@subcommand read =>
			(about: "read memory as binary to stdout")
			(@arg quad: -q --quad "use quad framing (chip must be in quad I/O mode)")
			(@arg ADDRESS: +required "start address (decimal or 0x hex)")
			(@arg LENGTH: +required "number of bytes to read")
		)
		(@subcommand write =>
			(about: "write binary data from stdin to memory")
			(@arg quad: -q --quad "use quad framing (chip must be in quad I/O mode)")
			(@arg ADDRESS: +required "start address (decimal or 0x hex)")
		)
		(@subcommand dump =>
			(about: "read memory and hex-dump it")
			(@arg quad: -q --quad "use quad framing (chip must be in quad I/O mode)")
			(@arg ADDRESS: +required "start address (decimal or 0x hex)")
			(@arg LENGTH: +required "number of bytes to dump")
		)
	).get_matches();

	match matches.subcommand() {
		("mode", _) => read_mode(&matches),
		("set_mode", Some(sub_m)) => set_mode(&matches, sub_m),
		("enter_quad", _) => enter_quad(&matches),
		("reset_io", _) => reset_io(&matches),
		("read", Some(sub_m)) => read_memory(&matches, sub_m),
		("write", Some(sub_m)) => write_memory(&matches, sub_m),
		("dump", Some(sub_m)) => dump_memory(&matches, sub_m),
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
