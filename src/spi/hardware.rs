use std::thread;
use std::time::{
	Duration,
	Instant,
};

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

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	Input,
	Output,
}

/// One physical GPIO line.
///
/// Pin I/O is infallible by contract: a hardware fault is not observable
/// at this layer, so there is nothing to propagate.
pub trait DigitalPin {
	fn set_direction(&mut self, direction: Direction);
	fn write(&mut self, level: bool);
	fn read(&mut self) -> bool;
}

/// Timing policy between clock edges.
///
/// Kept separate from the protocol logic so a busy/sleep wait can be
/// swapped for a hardware timer without touching the transfer loops.
pub trait Timing {
	fn set_frequency(&mut self, hz: u32);

	// delay for (at least) half a clock period
	fn sleep_half_period(&mut self);
}

pub struct BusyWait {
	half_period: Duration,
}

impl BusyWait {
	pub fn new(hz: u32) -> Self {
		let mut timing = BusyWait {
			half_period: Duration::from_secs(0),
		};
		timing.set_frequency(hz);
		timing
	}
}

impl Timing for BusyWait {
	fn set_frequency(&mut self, hz: u32) {
		assert!(hz > 0, "target clock frequency must be non-zero");
		self.half_period = Duration::from_secs_f64(0.5 / hz as f64);
	}

	fn sleep_half_period(&mut self) {
		reliable_sleep(self.half_period);
	}
}
