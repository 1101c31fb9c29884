/// Command protocol for serial SRAM chips in the Microchip 23LC style
/// (64 KiB address space, SQI capable).
///
/// Chip pinout:
///
/// ```text
///    __ __
/// 1-|  U  |-8     1 - CS            8 - VCC
/// 2-|     |-7     2 - SIO1 (MISO)   7 - SIO3 / HOLD#
/// 3-|     |-6     3 - SIO2          6 - SCK
/// 4-|_____|-5     4 - VSS           5 - SIO0 (MOSI)
/// ```
///
/// Instructions:
/// - 0x01: write MODE register
/// - 0x02: write to memory address (16-bit address, high byte first)
/// - 0x03: read from memory address
/// - 0x05: read MODE register
///
/// The MODE register selects the operation mode (byte/sequential/page) or
/// switches the I/O protocol (0x3B dual, 0x38 quad, 0xFF back to standard
/// SPI). All of these are opaque payload bytes to the transfer engine.
///
/// Reads clock data out by sending dummy bytes; a quad read additionally
/// emits one dummy byte between the address and the payload.

use std::str;

use crate::spi::{
	DigitalPin,
	Direction,
	SoftSpi,
	Timing,
};

// chip commands
const WRITE_MODE_REGISTER: u8 = 0x01; // "WRMR"
const WRITE_MEMORY: u8        = 0x02;
const READ_MEMORY: u8         = 0x03;
const READ_MODE_REGISTER: u8  = 0x05; // "RDMR"

// MODE register values switching the I/O protocol
const ENTER_DUAL_IO: u8 = 0x3b;
const ENTER_QUAD_IO: u8 = 0x38;
const RESET_IO: u8      = 0xff; // back to standard SPI

/// Operation mode stored in the chip's MODE register.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum OpMode {
	Byte = 0x00,
	Sequential = 0x40,
	Page = 0x80,
}

impl str::FromStr for OpMode {
	type Err = ::failure::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"byte" => Ok(OpMode::Byte),
			"seq" | "sequential" => Ok(OpMode::Sequential),
			"page" => Ok(OpMode::Page),
			_ => bail!("unknown operation mode {:?} (expected BYTE, SEQ or PAGE)", s),
		}
	}
}

/// One serial SRAM chip behind a bit-banged engine.
///
/// Owns the engine and the (active low) chip-select line; every operation
/// brackets its word transfers with a select/deselect pair, and streaming
/// reads/writes release the chip on drop.
pub struct SerialRam<P: DigitalPin, T: Timing> {
	spi: SoftSpi<P, T>,
	chip_select: P,
}

impl<P: DigitalPin, T: Timing> SerialRam<P, T> {
	pub fn new(spi: SoftSpi<P, T>, mut chip_select: P) -> Self {
		chip_select.set_direction(Direction::Output);
		chip_select.write(true); // deasserted
		SerialRam { spi, chip_select }
	}

	fn select(&mut self) {
		self.chip_select.write(false);
	}

	fn deselect(&mut self) {
		self.chip_select.write(true);
	}

	fn send_address(&mut self, address: u16) {
		self.spi.transfer_word((address >> 8) as u8);
		self.spi.transfer_word(address as u8);
	}

	fn send_address_quad(&mut self, address: u16) {
		self.spi.transfer_quad_write((address >> 8) as u8);
		self.spi.transfer_quad_write(address as u8);
	}

	pub fn read_mode_register(&mut self) -> u8 {
		self.select();
		self.spi.transfer_word(READ_MODE_REGISTER);
		let value = self.spi.transfer_word(0x00);
		self.deselect();
		value
	}

	pub fn write_mode_register(&mut self, value: u8) {
		self.select();
		self.spi.transfer_word(WRITE_MODE_REGISTER);
		self.spi.transfer_word(value);
		self.deselect();
	}

	pub fn set_op_mode(&mut self, mode: OpMode) {
		self.write_mode_register(mode as u8);
	}

	/// Switch the chip to quad I/O. Mode-register commands themselves keep
	/// using single-wire framing; only memory access changes protocol.
	pub fn enter_quad_io(&mut self) {
		debug!("entering quad I/O mode");
		self.write_mode_register(ENTER_QUAD_IO);
	}

	pub fn enter_dual_io(&mut self) {
		debug!("entering dual I/O mode");
		self.write_mode_register(ENTER_DUAL_IO);
	}

	pub fn reset_io(&mut self) {
		debug!("resetting to standard SPI I/O");
		self.write_mode_register(RESET_IO);
	}

	pub fn reader(&mut self, address: u16) -> RamReader<P, T> {
		self.select();
		self.spi.transfer_word(READ_MEMORY);
		self.send_address(address);
		RamReader { ram: self }
	}

	pub fn read(&mut self, address: u16, target: &mut [u8]) {
		self.reader(address).read(target);
	}

	pub fn writer(&mut self, address: u16) -> RamWriter<P, T> {
		self.select();
		self.spi.transfer_word(WRITE_MEMORY);
		self.send_address(address);
		RamWriter { ram: self }
	}

	pub fn write(&mut self, address: u16, data: &[u8]) {
		self.writer(address).write(data);
	}

	/// Requires the chip to be in quad I/O mode and quad lane wiring.
	pub fn quad_reader(&mut self, address: u16) -> QuadRamReader<P, T> {
		self.select();
		self.spi.transfer_quad_write(READ_MEMORY);
		self.send_address_quad(address);
		// the chip emits one dummy byte before the payload
		self.spi.transfer_quad_read();
		QuadRamReader { ram: self }
	}

	pub fn quad_read(&mut self, address: u16, target: &mut [u8]) {
		self.quad_reader(address).read(target);
	}

	pub fn quad_writer(&mut self, address: u16) -> QuadRamWriter<P, T> {
		self.select();
		self.spi.transfer_quad_write(WRITE_MEMORY);
		self.send_address_quad(address);
		QuadRamWriter { ram: self }
	}

	pub fn quad_write(&mut self, address: u16, data: &[u8]) {
		self.quad_writer(address).write(data);
	}
}

/// Streaming single-wire read; holds the chip selected until dropped.
pub struct RamReader<'a, P: DigitalPin + 'a, T: Timing + 'a> {
	ram: &'a mut SerialRam<P, T>,
}

impl<'a, P: DigitalPin, T: Timing> RamReader<'a, P, T> {
	pub fn read_byte(&mut self) -> u8 {
		// a dummy word clocks the next payload byte out of the chip
		self.ram.spi.transfer_word(0x00)
	}

	pub fn read(&mut self, target: &mut [u8]) {
		for t in target.iter_mut() {
			*t = self.read_byte();
		}
	}
}

impl<'a, P: DigitalPin, T: Timing> Drop for RamReader<'a, P, T> {
	fn drop(&mut self) {
		self.ram.deselect();
	}
}

impl<'a, P: DigitalPin, T: Timing> Iterator for RamReader<'a, P, T> {
	type Item = u8;

	fn next(&mut self) -> Option<Self::Item> {
		Some(self.read_byte())
	}
}

/// Streaming single-wire write; holds the chip selected until dropped.
pub struct RamWriter<'a, P: DigitalPin + 'a, T: Timing + 'a> {
	ram: &'a mut SerialRam<P, T>,
}

impl<'a, P: DigitalPin, T: Timing> RamWriter<'a, P, T> {
	pub fn write_byte(&mut self, data: u8) {
		self.ram.spi.transfer_word(data);
	}

	pub fn write(&mut self, data: &[u8]) {
		for &b in data {
			self.write_byte(b);
		}
	}
}

impl<'a, P: DigitalPin, T: Timing> Drop for RamWriter<'a, P, T> {
	fn drop(&mut self) {
		self.ram.deselect();
	}
}

/// Streaming quad read; holds the chip selected until dropped.
pub struct QuadRamReader<'a, P: DigitalPin + 'a, T: Timing + 'a> {
	ram: &'a mut SerialRam<P, T>,
}

impl<'a, P: DigitalPin, T: Timing> QuadRamReader<'a, P, T> {
	pub fn read_byte(&mut self) -> u8 {
		self.ram.spi.transfer_quad_read()
	}

	pub fn read(&mut self, target: &mut [u8]) {
		for t in target.iter_mut() {
			*t = self.read_byte();
		}
	}
}

impl<'a, P: DigitalPin, T: Timing> Drop for QuadRamReader<'a, P, T> {
	fn drop(&mut self) {
		self.ram.deselect();
	}
}

impl<'a, P: DigitalPin, T: Timing> Iterator for QuadRamReader<'a, P, T> {
	type Item = u8;

	fn next(&mut self) -> Option<Self::Item> {
		Some(self.read_byte())
	}
}

/// Streaming quad write; holds the chip selected until dropped.
pub struct QuadRamWriter<'a, P: DigitalPin + 'a, T: Timing + 'a> {
	ram: &'a mut SerialRam<P, T>,
}

impl<'a, P: DigitalPin, T: Timing> QuadRamWriter<'a, P, T> {
	pub fn write_byte(&mut self, data: u8) {
		self.ram.spi.transfer_quad_write(data);
	}

	pub fn write(&mut self, data: &[u8]) {
		for &b in data {
			self.write_byte(b);
		}
	}
}

impl<'a, P: DigitalPin, T: Timing> Drop for QuadRamWriter<'a, P, T> {
	fn drop(&mut self) {
		self.ram.deselect();
	}
}

#[cfg(test)]
mod test {
	use std::cell::RefCell;
	use std::collections::VecDeque;
	use std::rc::Rc;

	use super::*;

	struct NoDelay;

	impl Timing for NoDelay {
		fn set_frequency(&mut self, _hz: u32) {}
		fn sleep_half_period(&mut self) {}
	}

	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	enum Io {
		Spi,
		Sdi,
		Sqi,
	}

	#[derive(Clone, Copy, PartialEq, Eq, Debug)]
	enum Phase {
		Command,
		ModeWrite,
		AddressHigh { write: bool },
		AddressLow { write: bool, high: u8 },
		WriteData,
		ReadData,
		ReadMode,
	}

	/// Pin-level model of the SRAM chip, for clock mode 0 and SQI.
	///
	/// Samples master data on rising clock edges and presents its own
	/// output on falling edges, so the master (which samples before the
	/// rising edge in mode 0, and right after rising edges in quad reads)
	/// always sees stable data.
	struct SimChip {
		memory: Vec<u8>,
		mode_register: u8,
		io: Io,
		selected: bool,
		sclk: bool,
		// master-driven lane levels (0 = MOSI, 1 = MISO)
		lanes: [bool; 4],
		// chip-driven lane levels
		drive: [bool; 4],
		phase: Phase,
		shift_in: u8,
		bits_in: u8,
		nibble_pending: Option<u8>,
		out_bits: VecDeque<bool>,
		out_nibbles: VecDeque<u8>,
		address: u16,
	}

	impl SimChip {
		fn new() -> Self {
			SimChip {
				memory: vec![0u8; 0x1_0000],
				mode_register: OpMode::Sequential as u8, // power-on default
				io: Io::Spi,
				selected: false,
				sclk: false,
				lanes: [false; 4],
				drive: [false; 4],
				phase: Phase::Command,
				shift_in: 0,
				bits_in: 0,
				nibble_pending: None,
				out_bits: VecDeque::new(),
				out_nibbles: VecDeque::new(),
				address: 0,
			}
		}

		fn set_cs(&mut self, level: bool) {
			let selected = !level;
			if selected && !self.selected {
				// fresh transaction
				self.phase = Phase::Command;
				self.shift_in = 0;
				self.bits_in = 0;
				self.nibble_pending = None;
				self.out_bits.clear();
				self.out_nibbles.clear();
			}
			self.selected = selected;
		}

		fn clock(&mut self, level: bool) {
			if self.sclk == level {
				return;
			}
			self.sclk = level;
			if !self.selected {
				return;
			}
			if level {
				self.on_rising();
			} else {
				self.on_falling();
			}
		}

		fn master_writes(&self) -> bool {
			match self.phase {
				Phase::ReadData | Phase::ReadMode => false,
				_ => true,
			}
		}

		fn on_rising(&mut self) {
			match self.io {
				Io::Spi => {
					let bit = self.lanes[0] as u8;
					self.shift_in = (self.shift_in << 1) | bit;
					self.bits_in += 1;
					if self.bits_in == 8 {
						self.bits_in = 0;
						let byte = self.shift_in;
						self.on_byte(byte);
					}
				},
				Io::Sqi => {
					if !self.master_writes() {
						return;
					}
					let mut nib = 0u8;
					for l in 0..4 {
						nib |= (self.lanes[l] as u8) << l;
					}
					match self.nibble_pending.take() {
						None => self.nibble_pending = Some(nib),
						Some(high) => self.on_byte(high << 4 | nib),
					}
				},
				Io::Sdi => unimplemented!("dual I/O not modelled"),
			}
		}

		fn on_falling(&mut self) {
			match self.io {
				Io::Spi => {
					if !self.refill_bits() {
						return;
					}
					let bit = self.out_bits.pop_front().unwrap();
					self.drive[1] = bit;
				},
				Io::Sqi => {
					if self.phase != Phase::ReadData {
						return;
					}
					if self.out_nibbles.is_empty() {
						let byte = self.next_read_byte();
						self.out_nibbles.push_back(byte >> 4);
						self.out_nibbles.push_back(byte & 0x0f);
					}
					let nib = self.out_nibbles.pop_front().unwrap();
					for l in 0..4 {
						self.drive[l] = 0 != nib & (1 << l);
					}
				},
				Io::Sdi => unimplemented!("dual I/O not modelled"),
			}
		}

		// returns false if the chip has nothing to say in this phase
		fn refill_bits(&mut self) -> bool {
			if !self.out_bits.is_empty() {
				return true;
			}
			let byte = match self.phase {
				Phase::ReadData => self.next_read_byte(),
				Phase::ReadMode => self.mode_register,
				_ => return false,
			};
			for bit in (0..8).rev() {
				self.out_bits.push_back(0 != byte & (1 << bit));
			}
			true
		}

		fn next_read_byte(&mut self) -> u8 {
			let byte = self.memory[self.address as usize];
			self.address = self.address.wrapping_add(1);
			byte
		}

		fn on_byte(&mut self, byte: u8) {
			match self.phase {
				Phase::Command => match byte {
					WRITE_MODE_REGISTER => self.phase = Phase::ModeWrite,
					READ_MODE_REGISTER => self.phase = Phase::ReadMode,
					WRITE_MEMORY => self.phase = Phase::AddressHigh { write: true },
					READ_MEMORY => self.phase = Phase::AddressHigh { write: false },
					_ => panic!("sim chip got unknown command 0x{:02x}", byte),
				},
				Phase::ModeWrite => {
					match byte {
						ENTER_QUAD_IO => self.io = Io::Sqi,
						ENTER_DUAL_IO => self.io = Io::Sdi,
						RESET_IO => self.io = Io::Spi,
						value => self.mode_register = value,
					}
					self.phase = Phase::Command;
				},
				Phase::AddressHigh { write } => {
					self.phase = Phase::AddressLow { write, high: byte };
				},
				Phase::AddressLow { write, high } => {
					self.address = (high as u16) << 8 | byte as u16;
					if write {
						self.phase = Phase::WriteData;
					} else {
						self.phase = Phase::ReadData;
						if self.io == Io::Sqi {
							// dummy byte preceding the quad payload
							self.out_nibbles.push_back(0x0f);
							self.out_nibbles.push_back(0x0f);
						}
					}
				},
				Phase::WriteData => {
					self.memory[self.address as usize] = byte;
					self.address = self.address.wrapping_add(1);
				},
				// dummy traffic from the master while it clocks data out
				Phase::ReadData | Phase::ReadMode => {},
			}
		}
	}

	#[derive(Clone, Copy)]
	enum SimLine {
		Cs,
		Sclk,
		Sio(usize),
	}

	struct SimPin {
		line: SimLine,
		chip: Rc<RefCell<SimChip>>,
	}

	impl DigitalPin for SimPin {
		fn set_direction(&mut self, _direction: Direction) {}

		fn write(&mut self, level: bool) {
			let mut chip = self.chip.borrow_mut();
			match self.line {
				SimLine::Cs => chip.set_cs(level),
				SimLine::Sclk => chip.clock(level),
				SimLine::Sio(l) => chip.lanes[l] = level,
			}
		}

		fn read(&mut self) -> bool {
			let chip = self.chip.borrow();
			match self.line {
				SimLine::Cs => !chip.selected,
				SimLine::Sclk => chip.sclk,
				SimLine::Sio(l) => chip.drive[l],
			}
		}
	}

	fn sim_ram() -> (SerialRam<SimPin, NoDelay>, Rc<RefCell<SimChip>>) {
		let chip = Rc::new(RefCell::new(SimChip::new()));
		let pin = |line| SimPin { line, chip: chip.clone() };
		let spi = SoftSpi::with_quad_lanes(
			[
				pin(SimLine::Sio(0)),
				pin(SimLine::Sio(1)),
				pin(SimLine::Sio(2)),
				pin(SimLine::Sio(3)),
			],
			pin(SimLine::Sclk),
			NoDelay,
		);
		let ram = SerialRam::new(spi, pin(SimLine::Cs));
		(ram, chip)
	}

	#[test]
	fn mode_register_round_trip() {
		let (mut ram, chip) = sim_ram();

		assert_eq!(ram.read_mode_register(), OpMode::Sequential as u8);

		ram.set_op_mode(OpMode::Page);
		assert_eq!(chip.borrow().mode_register, 0x80);
		assert_eq!(ram.read_mode_register(), 0x80);

		// chip released between transactions
		assert!(!chip.borrow().selected);
	}

	#[test]
	fn write_then_read_back() {
		let (mut ram, chip) = sim_ram();
		let data = b"serial ram";

		ram.write(0x1234, data);
		assert_eq!(&chip.borrow().memory[0x1234..0x1234 + data.len()], &data[..]);

		let mut readback = vec![0u8; data.len()];
		ram.read(0x1234, &mut readback);
		assert_eq!(&readback[..], &data[..]);
	}

	#[test]
	fn reader_streams_sequentially() {
		let (mut ram, _chip) = sim_ram();
		let data: Vec<u8> = (0u8..8).map(|i| i * 3).collect();
		ram.write(0xfff0, &data);

		let streamed: Vec<u8> = ram.reader(0xfff0).take(8).collect();
		assert_eq!(streamed, data);
	}

	#[test]
	fn sequential_write_wraps_address_space() {
		let (mut ram, chip) = sim_ram();
		ram.write(0xfffe, &[0x11, 0x22, 0x33]);

		let chip = chip.borrow();
		assert_eq!(chip.memory[0xfffe], 0x11);
		assert_eq!(chip.memory[0xffff], 0x22);
		assert_eq!(chip.memory[0x0000], 0x33);
	}

	#[test]
	fn quad_end_to_end() {
		let (mut ram, chip) = sim_ram();

		ram.enter_quad_io();
		assert_eq!(chip.borrow().io, Io::Sqi);

		// full transaction at the top of the address space
		ram.quad_write(0xffff, &[0x04]);
		assert_eq!(chip.borrow().memory[0xffff], 0x04);

		let mut readback = [0u8; 1];
		ram.quad_read(0xffff, &mut readback);
		assert_eq!(readback, [0x04]);
	}

	#[test]
	fn quad_streams_multiple_bytes() {
		let (mut ram, chip) = sim_ram();
		let data = b"\xde\xad\xbe\xef";

		ram.enter_quad_io();
		ram.quad_write(0x0100, data);

		let mut readback = [0u8; 4];
		ram.quad_read(0x0100, &mut readback);
		assert_eq!(&readback[..], &data[..]);

		// chip released between transactions
		assert!(!chip.borrow().selected);
	}

	#[test]
	fn protocol_selectors_do_not_clobber_mode_register() {
		let (mut ram, chip) = sim_ram();
		ram.enter_dual_io();

		let chip = chip.borrow();
		assert_eq!(chip.io, Io::Sdi);
		assert_eq!(chip.mode_register, OpMode::Sequential as u8);
	}

	#[test]
	fn parse_op_mode() {
		assert_eq!("byte".parse::<OpMode>().unwrap(), OpMode::Byte);
		assert_eq!("SEQ".parse::<OpMode>().unwrap(), OpMode::Sequential);
		assert_eq!("Sequential".parse::<OpMode>().unwrap(), OpMode::Sequential);
		assert_eq!("PAGE".parse::<OpMode>().unwrap(), OpMode::Page);
		assert!("quad".parse::<OpMode>().is_err());
	}
}
