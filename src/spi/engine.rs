use super::hardware::{
	DigitalPin,
	Direction,
	Timing,
};

/// Word width of the engine. Only 8-bit words are supported.
pub const WORD_BITS: u8 = 8;

enum Lanes<P> {
	Single {
		mosi: P,
		miso: P,
	},
	// lane index == SIOn; lane 0 doubles as MOSI, lane 1 as MISO
	Quad([P; 4]),
}

/// Bit-banged SPI master over three (or six) GPIO lines.
///
/// Every transfer is fully synchronous and runs to completion; the only
/// blocking is the timed wait between clock edges. The clock line is left
/// at the mode-derived idle level between transfers.
pub struct SoftSpi<P: DigitalPin, T: Timing> {
	lanes: Lanes<P>,
	sclk: P,
	timing: T,
	polarity: bool,
	phase: bool,
	clock_level: bool,
}

impl<P: DigitalPin, T: Timing> SoftSpi<P, T> {
	/// Single-wire wiring: data-out, data-in, clock.
	pub fn new(mosi: P, miso: P, sclk: P, timing: T) -> Self {
		let mut spi = SoftSpi {
			lanes: Lanes::Single { mosi, miso },
			sclk,
			timing,
			polarity: false,
			phase: false,
			clock_level: false,
		};
		spi.init_directions();
		spi.configure_format(WORD_BITS, 0);
		spi
	}

	/// Quad wiring: four data lanes (SIO0..SIO3) plus clock.
	///
	/// Single-wire transfers keep working on this wiring, using lane 0 as
	/// data-out and lane 1 as data-in.
	pub fn with_quad_lanes(lanes: [P; 4], sclk: P, timing: T) -> Self {
		let mut spi = SoftSpi {
			lanes: Lanes::Quad(lanes),
			sclk,
			timing,
			polarity: false,
			phase: false,
			clock_level: false,
		};
		spi.init_directions();
		spi.configure_format(WORD_BITS, 0);
		spi
	}

	fn init_directions(&mut self) {
		self.sclk.set_direction(Direction::Output);
		match &mut self.lanes {
			Lanes::Single { mosi, miso } => {
				mosi.set_direction(Direction::Output);
				miso.set_direction(Direction::Input);
			},
			Lanes::Quad(lanes) => {
				lanes[0].set_direction(Direction::Output);
				lanes[1].set_direction(Direction::Input);
				// park the spare lanes high: SIO3 doubles as HOLD# on
				// the target chip
				lanes[2].set_direction(Direction::Output);
				lanes[2].write(true);
				lanes[3].set_direction(Direction::Output);
				lanes[3].write(true);
			},
		}
	}

	/// Set word width and clock mode (`polarity = mode bit 1`,
	/// `phase = mode bit 0`); drives the clock to the new idle level.
	pub fn configure_format(&mut self, bits: u8, mode: u8) {
		assert!(bits == WORD_BITS, "only 8-bit words are supported");
		assert!(mode < 4, "SPI mode selector out of range: {}", mode);
		self.polarity = 0 != mode & 0x02;
		self.phase = 0 != mode & 0x01;
		self.clock_level = self.polarity;
		self.sclk.write(self.polarity);
	}

	/// Target clock frequency; only used to derive the half-period delay.
	pub fn configure_frequency(&mut self, hz: u32) {
		self.timing.set_frequency(hz);
	}

	fn toggle_clock(&mut self) {
		self.clock_level = !self.clock_level;
		self.sclk.write(self.clock_level);
	}

	fn write_data_out(&mut self, level: bool) {
		match &mut self.lanes {
			Lanes::Single { mosi, .. } => mosi.write(level),
			Lanes::Quad(lanes) => lanes[0].write(level),
		}
	}

	fn read_data_in(&mut self) -> bool {
		match &mut self.lanes {
			Lanes::Single { miso, .. } => miso.read(),
			Lanes::Quad(lanes) => lanes[1].read(),
		}
	}

	fn quad_lanes(&mut self) -> &mut [P; 4] {
		match &mut self.lanes {
			Lanes::Quad(lanes) => lanes,
			Lanes::Single { .. } => {
				panic!("quad transfer without quad lane wiring")
			},
		}
	}

	/// Clock one word out while clocking one word in, MSB first.
	///
	/// Phase 0 samples data-in before the leading clock edge of each bit,
	/// phase 1 after it; either way the clock ends at the idle level.
	pub fn transfer_word(&mut self, value: u8) -> u8 {
		let mut received = 0u8;

		for bit in (0..WORD_BITS).rev() {
			let bit_mask = 1u8 << bit;
			self.write_data_out(0 != value & bit_mask);

			if !self.phase {
				if self.read_data_in() {
					received |= bit_mask;
				}
			}

			self.toggle_clock(); // leading edge
			self.timing.sleep_half_period();

			if self.phase {
				if self.read_data_in() {
					received |= bit_mask;
				}
			}

			self.toggle_clock(); // trailing edge, back to idle
			self.timing.sleep_half_period();
		}

		received
	}

	/// Clock one byte out over all four lanes: upper nibble first, lane L
	/// carrying bit 4+L on the first pulse and bit L on the second.
	///
	/// Two full clock pulses per byte, independent of the configured
	/// phase/polarity.
	pub fn transfer_quad_write(&mut self, value: u8) {
		{
			let lanes = self.quad_lanes();
			for lane in lanes.iter_mut() {
				lane.set_direction(Direction::Output);
			}
			for (l, lane) in lanes.iter_mut().enumerate() {
				lane.write(0 != value & (1 << (4 + l)));
			}
		}

		self.toggle_clock(); // edge 1
		self.timing.sleep_half_period();
		self.toggle_clock(); // edge 2
		self.timing.sleep_half_period();

		{
			let lanes = self.quad_lanes();
			for (l, lane) in lanes.iter_mut().enumerate() {
				lane.write(0 != value & (1 << l));
			}
		}

		self.toggle_clock(); // edge 3
		self.timing.sleep_half_period();
		self.toggle_clock(); // edge 4, back to idle
		self.timing.sleep_half_period();
	}

	/// Clock one byte in over all four lanes.
	///
	/// Four clock edges per byte; the upper nibble is sampled immediately
	/// after edge 1 and the lower nibble after edge 3. The asymmetry
	/// against the write path (which drives before edges 1 and 3) is part
	/// of the observed wire protocol and is kept as-is.
	pub fn transfer_quad_read(&mut self) -> u8 {
		for lane in self.quad_lanes().iter_mut() {
			lane.set_direction(Direction::Input);
		}

		let mut received = 0u8;

		self.toggle_clock(); // edge 1
		{
			let lanes = self.quad_lanes();
			for (l, lane) in lanes.iter_mut().enumerate() {
				if lane.read() {
					received |= 1 << (4 + l);
				}
			}
		}
		self.timing.sleep_half_period();

		self.toggle_clock(); // edge 2
		self.timing.sleep_half_period();

		self.toggle_clock(); // edge 3
		{
			let lanes = self.quad_lanes();
			for (l, lane) in lanes.iter_mut().enumerate() {
				if lane.read() {
					received |= 1 << l;
				}
			}
		}
		self.timing.sleep_half_period();

		self.toggle_clock(); // edge 4, back to idle
		self.timing.sleep_half_period();

		received
	}
}
