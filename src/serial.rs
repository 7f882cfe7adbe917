//! Serial console used for early boot debugging and kernel logging.
//!
//! On the real target this drives the PL011 UART that QEMU's `virt`
//! machine (and the Raspberry Pi family) exposes; `logger` is the only
//! caller that matters once the kernel is up. Host builds (`cargo test`)
//! have no UART to talk to, so `_print` falls back to the process's own
//! stdout.

use core::fmt;
#[cfg(not(target_arch = "aarch64"))]
use spin::Mutex;

/// Initialize the serial console. Must run before the first log line.
pub fn init() {
    #[cfg(target_arch = "aarch64")]
    crate::arch::aarch64::serial::init();
}

/// Set the MMIO base address of the UART, once the device tree has told
/// us where it actually lives.
pub fn set_base(base: u64) {
    #[cfg(target_arch = "aarch64")]
    crate::arch::aarch64::serial::set_base(base);
    #[cfg(not(target_arch = "aarch64"))]
    let _ = base;
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    crate::arch::without_interrupts(|| {
        write_args(args);
    });
}

#[cfg(target_arch = "aarch64")]
fn write_args(args: fmt::Arguments) {
    use core::fmt::Write;

    struct Uart;
    impl fmt::Write for Uart {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            crate::arch::aarch64::serial::write_bytes(s.as_bytes());
            Ok(())
        }
    }

    let _ = Uart.write_fmt(args);
}

#[cfg(not(target_arch = "aarch64"))]
static HOST_SINK: Mutex<()> = Mutex::new(());

#[cfg(not(target_arch = "aarch64"))]
fn write_args(args: fmt::Arguments) {
    use std::io::Write;
    let _guard = HOST_SINK.lock();
    let _ = write!(std::io::stdout(), "{args}");
}

/// Non-blocking read of one byte, if any is waiting.
pub fn read_byte() -> Option<u8> {
    #[cfg(target_arch = "aarch64")]
    {
        if crate::arch::aarch64::serial::data_available() {
            Some(crate::arch::aarch64::serial::read_byte())
        } else {
            None
        }
    }
    #[cfg(not(target_arch = "aarch64"))]
    {
        None
    }
}

/// Alias kept for call sites that treat this as a syscall-style probe.
pub fn try_read_byte() -> Option<u8> {
    read_byte()
}

/// Print to the serial console.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*))
    };
}

/// Print to the serial console with a trailing newline.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($fmt:expr) => ($crate::serial_print!(concat!($fmt, "\n")));
    ($fmt:expr, $($arg:tt)*) => ($crate::serial_print!(
        concat!($fmt, "\n"), $($arg)*
    ));
}
