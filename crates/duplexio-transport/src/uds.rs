use std::io::{ErrorKind, Read, Write};
use std::net::Shutdown;
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{Available, InputStream, StreamProvider};

/// A connected Unix domain socket with a non-blocking availability probe.
#[derive(Debug)]
pub struct UnixSocketStream {
    inner: UnixStream,
}

impl UnixSocketStream {
    pub fn new(inner: UnixStream) -> Self {
        Self { inner }
    }
}

impl Read for UnixSocketStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for UnixSocketStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl InputStream for UnixSocketStream {
    fn poll_available(&mut self) -> std::io::Result<Available> {
        let fd = self.inner.as_raw_fd();

        let mut pending: libc::c_int = 0;
        // SAFETY: `pending` is a valid writable c_int as FIONREAD requires and
        // `fd` is an open socket descriptor owned by `self.inner`.
        let rc = unsafe { libc::ioctl(fd, libc::FIONREAD as _, &mut pending) };
        if rc < 0 {
            return Err(std::io::Error::last_os_error());
        }
        if pending > 0 {
            return Ok(Available::Bytes(pending as usize));
        }

        // FIONREAD cannot tell an idle socket from a closed one; a
        // non-blocking one-byte peek can.
        let mut probe = [0u8; 1];
        // SAFETY: `probe` is a valid writable buffer of length 1 and `fd` is an
        // open socket descriptor. MSG_PEEK leaves the byte queued.
        let rc = unsafe {
            libc::recv(
                fd,
                probe.as_mut_ptr().cast::<libc::c_void>(),
                probe.len(),
                libc::MSG_PEEK | libc::MSG_DONTWAIT,
            )
        };
        match rc {
            0 => Ok(Available::Eof),
            n if n > 0 => Ok(Available::Bytes(n as usize)),
            _ => {
                let err = std::io::Error::last_os_error();
                match err.kind() {
                    ErrorKind::WouldBlock | ErrorKind::Interrupted => Ok(Available::Idle),
                    _ => Err(err),
                }
            }
        }
    }
}

/// Unix domain socket stream provider.
///
/// Connects to a filesystem-path socket on `connect()`. A provider can also be
/// built around an already connected socket (e.g. one half of
/// [`UnixStream::pair`]); such a provider cannot reconnect once disconnected.
#[derive(Debug)]
pub struct UnixSocketProvider {
    path: Option<PathBuf>,
    stream: Option<UnixSocketStream>,
}

impl UnixSocketProvider {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Create a disconnected provider for the socket at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        Ok(Self {
            path: Some(path),
            stream: None,
        })
    }

    /// Wrap an already connected socket.
    pub fn from_stream(stream: UnixStream) -> Self {
        Self {
            path: None,
            stream: Some(UnixSocketStream::new(stream)),
        }
    }

    /// The configured socket path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl StreamProvider for UnixSocketProvider {
    fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let path = self.path.as_ref().ok_or_else(|| TransportError::Connect {
            target: "<pre-connected socket>".to_string(),
            source: std::io::Error::new(
                ErrorKind::NotConnected,
                "provider was built from a stream and cannot reconnect",
            ),
        })?;

        let stream = UnixStream::connect(path).map_err(|e| TransportError::Connect {
            target: path.display().to_string(),
            source: e,
        })?;
        info!(?path, "connected to unix domain socket");
        self.stream = Some(UnixSocketStream::new(stream));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            match stream.inner.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotConnected => {}
                Err(err) => return Err(err.into()),
            }
            debug!(path = ?self.path, "disconnected unix domain socket");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn input(&mut self) -> Result<&mut dyn InputStream> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(TransportError::NotConnected),
        }
    }

    fn output(&mut self) -> Result<&mut dyn Write> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(TransportError::NotConnected),
        }
    }

    fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_connect_write_and_poll() {
        let dir = std::env::temp_dir().join(format!("duplexio-uds-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("device.sock");
        let _ = std::fs::remove_file(&sock_path);
        let listener = UnixListener::bind(&sock_path).unwrap();

        let device = std::thread::spawn(move || {
            let (mut peer, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            peer.read_exact(&mut buf).unwrap();
            peer.write_all(&buf).unwrap();
            buf
        });

        let mut provider = UnixSocketProvider::new(&sock_path).unwrap();
        assert!(!provider.is_connected());
        provider.connect().unwrap();
        provider.connect().unwrap();
        assert!(provider.is_connected());

        provider.output().unwrap().write_all(b"ping").unwrap();
        assert_eq!(&device.join().unwrap(), b"ping");

        let mut echoed = Vec::new();
        while echoed.len() < 4 {
            let input = provider.input().unwrap();
            if let Available::Bytes(_) = input.poll_available().unwrap() {
                let mut chunk = [0u8; 8];
                let n = input.read(&mut chunk).unwrap();
                echoed.extend_from_slice(&chunk[..n]);
            }
        }
        assert_eq!(echoed, b"ping");

        provider.disconnect().unwrap();
        provider.disconnect().unwrap();
        assert!(matches!(
            provider.input().map(|_| ()),
            Err(TransportError::NotConnected)
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_poll_reports_idle_then_eof() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut provider = UnixSocketProvider::from_stream(left);

        let status = provider.input().unwrap().poll_available().unwrap();
        assert_eq!(status, Available::Idle);

        drop(right);
        let status = provider.input().unwrap().poll_available().unwrap();
        assert_eq!(status, Available::Eof);
    }

    #[test]
    fn test_poll_counts_buffered_bytes() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let mut provider = UnixSocketProvider::from_stream(left);

        right.write_all(&[1, 2, 3, 4, 5]).unwrap();
        let status = provider.input().unwrap().poll_available().unwrap();
        assert_eq!(status, Available::Bytes(5));
    }

    #[test]
    fn test_path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";
        let result = UnixSocketProvider::new(&long_path);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn test_connect_missing_socket_fails() {
        let mut provider = UnixSocketProvider::new("/tmp/duplexio-does-not-exist.sock").unwrap();
        let err = provider.connect().unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }

    #[test]
    fn test_stream_provider_cannot_reconnect() {
        let (left, _right) = UnixStream::pair().unwrap();
        let mut provider = UnixSocketProvider::from_stream(left);
        provider.disconnect().unwrap();
        assert!(matches!(
            provider.connect(),
            Err(TransportError::Connect { .. })
        ));
    }
}
