mod linux;

// OS-specific. for now linux only.
pub use self::linux::{
	SysfsPin,
	open_pin,
};
