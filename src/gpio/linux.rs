use std::fs;
use std::io;
use std::os::unix::fs::FileExt;
use std::thread;
use std::time::Duration;

use crate::spi::{
	DigitalPin,
	Direction,
};

const GPIO_ROOT: &str = "/sys/class/gpio";

/// GPIO line via the Linux sysfs interface.
///
/// Opening (export + value file) is fallible; pin I/O afterwards is
/// treated as infallible, as the protocol layers have no error channel
/// for it. The pin is unexported again on drop (best effort).
pub struct SysfsPin {
	number: u32,
	value: fs::File,
}

fn export(number: u32) -> io::Result<()> {
	match fs::write(format!("{}/export", GPIO_ROOT), format!("{}", number)) {
		Ok(()) => Ok(()),
		// EBUSY: pin already exported, which is fine for us
		Err(ref e) if e.raw_os_error() == Some(libc::EBUSY) => Ok(()),
		Err(e) => Err(e),
	}
}

pub fn open_pin(number: u32) -> io::Result<SysfsPin> {
	export(number)?;

	let value_path = format!("{}/gpio{}/value", GPIO_ROOT, number);

	// after export udev may still be fixing up permissions; retry briefly
	let mut last_error = None;
	for _ in 0..10 {
		match fs::OpenOptions::new().read(true).write(true).open(&value_path) {
			Ok(value) => {
				debug!("exported GPIO {}", number);
				return Ok(SysfsPin { number, value });
			},
			Err(e) => {
				last_error = Some(e);
				thread::sleep(Duration::from_millis(50));
			},
		}
	}
	Err(last_error.expect("retry loop ran at least once"))
}

impl DigitalPin for SysfsPin {
	fn set_direction(&mut self, direction: Direction) {
		let value = match direction {
			Direction::Input => "in",
			Direction::Output => "out",
		};
		fs::write(
			format!("{}/gpio{}/direction", GPIO_ROOT, self.number),
			value,
		).expect("GPIO direction write must not fail after export");
	}

	fn write(&mut self, level: bool) {
		let data: &[u8] = if level { b"1" } else { b"0" };
		self.value.write_at(data, 0)
			.expect("GPIO value write must not fail after export");
	}

	fn read(&mut self) -> bool {
		let mut buf = [0u8; 1];
		self.value.read_at(&mut buf, 0)
			.expect("GPIO value read must not fail after export");
		buf[0] == b'1'
	}
}

impl Drop for SysfsPin {
	fn drop(&mut self) {
		if let Err(e) = fs::write(
			format!("{}/unexport", GPIO_ROOT),
			format!("{}", self.number),
		) {
			debug!("failed to unexport GPIO {}: {}", self.number, e);
		}
	}
}
