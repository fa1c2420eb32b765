use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{ReadCanceller, Transport};
use crate::DEFAULT_BAUDRATE;

/// Configuration for opening a [`SerialPort`].
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Path of the tty device (e.g. `/dev/ttyUSB0`).
    pub port: PathBuf,
    /// Line speed in baud. Default: 500000.
    pub baudrate: u32,
    /// Read timeout for blocking reads. `None` blocks indefinitely.
    pub read_timeout: Option<Duration>,
}

impl SerialConfig {
    /// Configuration for `port` with default line settings.
    pub fn new(port: impl Into<PathBuf>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: PathBuf::from("/dev/ttyUSB0"),
            baudrate: DEFAULT_BAUDRATE,
            read_timeout: None,
        }
    }
}

/// Serial port transport in raw 8N1 mode without flow control.
///
/// Reads wait in `poll` on the tty and on a private wake pipe, so a
/// [`ReadCanceller`] can abort a read that would otherwise block forever.
pub struct SerialPort {
    file: Option<File>,
    port: PathBuf,
    next_read_size: usize,
    read_timeout: Option<Duration>,
    wakeup: Arc<Wakeup>,
}

/// Self-pipe written by a [`ReadCanceller`]. Never drained, so once woken
/// every later wait sees it readable.
struct Wakeup {
    rx: OwnedFd,
    tx: OwnedFd,
}

impl Wakeup {
    fn new() -> std::io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: `fds` is a writable array of the two descriptors pipe fills in.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(std::io::Error::last_os_error());
        }
        // SAFETY: pipe succeeded, so both descriptors are open and owned by nobody else.
        let (rx, tx) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        set_nonblocking_cloexec(rx.as_raw_fd())?;
        set_nonblocking_cloexec(tx.as_raw_fd())?;
        Ok(Self { rx, tx })
    }

    fn wake(&self) {
        let byte = 1u8;
        // SAFETY: one byte from a valid local into a pipe we own. EAGAIN means the
        // pipe is full, which already wakes every waiter.
        let _ = unsafe { libc::write(self.tx.as_raw_fd(), (&byte as *const u8).cast(), 1) };
    }
}

fn set_nonblocking_cloexec(fd: RawFd) -> std::io::Result<()> {
    // SAFETY: fcntl with integer arguments on a descriptor we own.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

impl SerialPort {
    /// Open `port` at `baudrate`.
    pub fn open(port: impl AsRef<Path>, baudrate: u32) -> Result<Self> {
        Self::open_with_config(&SerialConfig {
            port: port.as_ref().to_path_buf(),
            baudrate,
            read_timeout: None,
        })
    }

    /// Open a port with explicit configuration.
    pub fn open_with_config(config: &SerialConfig) -> Result<Self> {
        let speed = baud_constant(config.baudrate)
            .ok_or(TransportError::UnsupportedBaudrate(config.baudrate))?;
        let wakeup = Wakeup::new()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_CLOEXEC)
            .open(&config.port)
            .map_err(|e| TransportError::Open {
                port: config.port.display().to_string(),
                source: e,
            })?;

        configure_raw(file.as_raw_fd(), speed).map_err(|e| TransportError::Configure {
            port: config.port.display().to_string(),
            source: e,
        })?;

        info!(port = ?config.port, baudrate = config.baudrate, "opened serial port");

        Ok(Self {
            file: Some(file),
            port: config.port.clone(),
            next_read_size: usize::MAX,
            read_timeout: config.read_timeout,
            wakeup: Arc::new(wakeup),
        })
    }

    /// The device path this port was opened from.
    pub fn path(&self) -> &Path {
        &self.port
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or(TransportError::Closed)
    }

    /// Wait until the tty is readable, the timeout lapses, or the read is cancelled.
    fn wait_readable(&self, fd: RawFd) -> Result<()> {
        let millis = match self.read_timeout {
            Some(timeout) => libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX),
            None => -1,
        };
        let mut fds = [
            libc::pollfd {
                fd,
                events: libc::POLLIN,
                revents: 0,
            },
            libc::pollfd {
                fd: self.wakeup.rx.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            },
        ];
        loop {
            // SAFETY: `fds` holds valid pollfds for the duration of the call and both
            // descriptors are owned by this port.
            let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, millis) };
            match rc {
                0 => return Err(std::io::Error::from(ErrorKind::TimedOut).into()),
                rc if rc > 0 => {
                    if fds[1].revents != 0 {
                        debug!(port = ?self.port, "serial read cancelled");
                        return Err(TransportError::Closed);
                    }
                    return Ok(());
                }
                _ => {
                    let err = std::io::Error::last_os_error();
                    if err.kind() != ErrorKind::Interrupted {
                        return Err(err.into());
                    }
                }
            }
        }
    }
}

impl Transport for SerialPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let limit = buf.len().min(self.next_read_size);
        let fd = self.file()?.as_raw_fd();
        self.wait_readable(fd)?;
        let file = self.file()?;
        loop {
            match file.read(&mut buf[..limit]) {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let file = self.file()?;
        let mut offset = 0usize;
        while offset < bytes.len() {
            match file.write(&bytes[offset..]) {
                Ok(0) => return Err(std::io::Error::from(ErrorKind::WriteZero).into()),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err.into()),
            }
        }
        file.flush()?;
        Ok(offset)
    }

    fn set_next_read_size(&mut self, size: usize) {
        self.next_read_size = size;
    }

    fn next_read_size(&self) -> usize {
        self.next_read_size
    }

    fn close(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => {
                drop(file);
                debug!(port = ?self.port, "closed serial port");
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }

    fn source(&self) -> Option<RawFd> {
        self.file.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    fn read_canceller(&self) -> Option<ReadCanceller> {
        let wakeup = Arc::clone(&self.wakeup);
        Some(ReadCanceller::new(move || wakeup.wake()))
    }

    fn label(&self) -> String {
        self.port.display().to_string()
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("port", &self.port)
            .field("open", &self.file.is_some())
            .field("next_read_size", &self.next_read_size)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

fn configure_raw(fd: RawFd, speed: libc::speed_t) -> std::io::Result<()> {
    // SAFETY: termios is plain data; tcgetattr fully initialises it on success.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };

    // SAFETY: `fd` is an open descriptor and `tio` is a valid writable termios.
    if unsafe { libc::tcgetattr(fd, &mut tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `tio` is a valid termios obtained above.
    unsafe { libc::cfmakeraw(&mut tio) };
    tio.c_cflag |= libc::CLOCAL | libc::CREAD;
    tio.c_cflag &= !(libc::CSTOPB | libc::PARENB);
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "macos"))]
    {
        tio.c_cflag &= !libc::CRTSCTS;
    }
    tio.c_cc[libc::VMIN] = 1;
    tio.c_cc[libc::VTIME] = 0;

    // SAFETY: `tio` is a valid termios and `speed` a termios speed constant.
    let rc = unsafe { libc::cfsetispeed(&mut tio, speed) | libc::cfsetospeed(&mut tio, speed) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `fd` is an open descriptor and `tio` a fully initialised termios.
    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tio) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    // SAFETY: `fd` is an open descriptor.
    if unsafe { libc::tcflush(fd, libc::TCIOFLUSH) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    Ok(())
}

/// Map a numeric baud rate onto its termios speed constant.
fn baud_constant(baudrate: u32) -> Option<libc::speed_t> {
    let speed = match baudrate {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        460800 => libc::B460800,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        500000 => libc::B500000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        921600 => libc::B921600,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1000000 => libc::B1000000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        1500000 => libc::B1500000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        2000000 => libc::B2000000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        3000000 => libc::B3000000,
        #[cfg(any(target_os = "linux", target_os = "android"))]
        4000000 => libc::B4000000,
        _ => return None,
    };
    Some(speed)
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use std::ffi::CStr;
    use std::thread;
    use std::time::Instant;

    use super::*;

    /// Open a pseudo-terminal; returns the master side and the slave path.
    fn open_pty() -> (File, PathBuf) {
        let mut name = [0 as libc::c_char; 128];
        // SAFETY: plain libc calls on a descriptor we own; ptsname_r writes into
        // a local buffer of the given length.
        unsafe {
            let master = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
            assert!(master >= 0, "posix_openpt failed");
            assert_eq!(libc::grantpt(master), 0);
            assert_eq!(libc::unlockpt(master), 0);
            assert_eq!(libc::ptsname_r(master, name.as_mut_ptr(), name.len()), 0);
            let path = PathBuf::from(CStr::from_ptr(name.as_ptr()).to_string_lossy().into_owned());
            (File::from_raw_fd(master), path)
        }
    }

    #[test]
    fn write_reaches_peer() {
        let (mut master, path) = open_pty();
        let mut port = SerialPort::open(&path, DEFAULT_BAUDRATE).unwrap();

        assert_eq!(port.write(&[0x08, 0x02, b'h', b'i']).unwrap(), 4);

        let mut buf = [0u8; 4];
        master.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0x08, 0x02, b'h', b'i']);
    }

    #[test]
    fn read_is_limited_to_next_read_size() {
        let (mut master, path) = open_pty();
        let mut port = SerialPort::open(&path, 115200).unwrap();
        master.write_all(b"abcdef").unwrap();

        port.set_next_read_size(2);
        let mut buf = [0u8; 16];
        let n = port.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ab");
    }

    #[test]
    fn read_timeout_expires() {
        let (_master, path) = open_pty();
        let mut port = SerialPort::open_with_config(&SerialConfig {
            port: path,
            baudrate: DEFAULT_BAUDRATE,
            read_timeout: Some(Duration::from_millis(20)),
        })
        .unwrap();

        let mut buf = [0u8; 2];
        let err = port.read(&mut buf).unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == ErrorKind::TimedOut));
    }

    #[test]
    fn read_timeout_can_change_after_open() {
        let (_master, path) = open_pty();
        let mut port = SerialPort::open(&path, DEFAULT_BAUDRATE).unwrap();
        port.set_read_timeout(Some(Duration::from_millis(20)));

        let mut buf = [0u8; 2];
        let err = port.read(&mut buf).unwrap_err();
        assert!(matches!(err, TransportError::Io(e) if e.kind() == ErrorKind::TimedOut));
    }

    #[test]
    fn cancel_wakes_blocked_read() {
        let (_master, path) = open_pty();
        let mut port = SerialPort::open(&path, DEFAULT_BAUDRATE).unwrap();
        let canceller = port.read_canceller().unwrap();

        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            canceller.cancel();
        });
        let started = Instant::now();
        let mut buf = [0u8; 2];
        assert!(matches!(port.read(&mut buf), Err(TransportError::Closed)));
        assert!(started.elapsed() < Duration::from_secs(2));
        waker.join().unwrap();

        // Cancellation is sticky.
        assert!(matches!(port.read(&mut buf), Err(TransportError::Closed)));
    }

    #[test]
    fn close_releases_descriptor() {
        let (_master, path) = open_pty();
        let mut port = SerialPort::open(&path, DEFAULT_BAUDRATE).unwrap();
        assert!(port.source().is_some());

        port.close().unwrap();
        assert!(port.source().is_none());
        assert!(matches!(port.close(), Err(TransportError::Closed)));
        assert!(matches!(port.write(b"x"), Err(TransportError::Closed)));
    }

    #[test]
    fn open_missing_port_fails() {
        let result = SerialPort::open("/dev/adapterlink-does-not-exist", DEFAULT_BAUDRATE);
        assert!(matches!(result, Err(TransportError::Open { .. })));
    }

    #[test]
    fn unsupported_baudrate_rejected_before_open() {
        let result = SerialPort::open("/dev/adapterlink-does-not-exist", 12345);
        assert!(matches!(result, Err(TransportError::UnsupportedBaudrate(12345))));
    }

    #[test]
    fn label_is_port_path() {
        let (_master, path) = open_pty();
        let port = SerialPort::open(&path, DEFAULT_BAUDRATE).unwrap();
        assert_eq!(port.label(), path.display().to_string());
        assert_eq!(port.path(), path.as_path());
    }
}
