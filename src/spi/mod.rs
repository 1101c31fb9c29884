/// Software-emulated (bit-banged) SPI master.
///
/// No hardware SPI peripheral is involved: the clock and data lines are
/// plain GPIOs driven one edge at a time. Two framings are supported:
///
/// - standard single-wire SPI: 8-bit words, MSB first, all four clock
///   modes (CPOL/CPHA derived from a mode selector 0..=3)
/// - quad I/O (SQI): one byte per two clock pulses, one nibble across the
///   four data lanes per pulse, upper nibble first
///
/// Chip-select is not handled here; the caller owns it and must keep the
/// chip selected for the whole multi-word transaction.

mod engine;
mod hardware;

pub use self::engine::{
	SoftSpi,
	WORD_BITS,
};

pub use self::hardware::{
	BusyWait,
	DigitalPin,
	Direction,
	Timing,
	reliable_sleep,
};
