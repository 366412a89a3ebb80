//! Timeout utilities for I/O operations
//!
//! Provides timeout wrappers for async read/write operations using compio's timeout support.

use compio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use compio::time::timeout;
use std::io;
use std::time::Duration;

/// Execute an async read operation with a timeout.
///
/// # Arguments
///
/// * `duration` - Maximum time to wait
///    - `None`: Block indefinitely (no timeout)
///    - `Some(Duration::ZERO)`: Non-blocking (return immediately if not ready)
///    - `Some(duration)`: Wait up to duration
///
/// # Returns
///
/// * `Ok(result)` if operation completed within timeout
/// * `Err(io::ErrorKind::TimedOut)` if timeout elapsed
/// * `Err(io::ErrorKind::WouldBlock)` if non-blocking and not ready
#[allow(dead_code)]
async fn read_with_timeout<S, B>(
    stream: &mut S,
    buf: B,
    duration: Option<Duration>,
) -> io::Result<compio::buf::BufResult<usize, B>>
where
    S: AsyncRead + Unpin,
    B: compio::buf::IoBufMut,
{
    match duration {
        None => {
            // No timeout, block indefinitely
            Ok(stream.read(buf).await)
        }
        Some(d) if d.is_zero() => {
            // Non-blocking mode - not directly supported by compio
            // Would need to check readiness first, for now treat as error
            Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "Non-blocking mode not yet implemented",
            ))
        }
        Some(d) => {
            // Timeout mode
            match timeout(d, stream.read(buf)).await {
                Ok(result) => Ok(result),
                Err(_elapsed) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "Read operation timed out",
                )),
            }
        }
    }
}

/// Execute an async write operation with a timeout.
///
/// # Arguments
///
/// * `duration` - Maximum time to wait
///    - `None`: Block indefinitely (no timeout)
///    - `Some(Duration::ZERO)`: Non-blocking (return immediately if not ready)
///    - `Some(duration)`: Wait up to duration
///
/// # Returns
///
/// * `Ok(result)` if operation completed within timeout
/// * `Err(io::ErrorKind::TimedOut)` if timeout elapsed
/// * `Err(io::ErrorKind::WouldBlock)` if non-blocking and not ready
#[allow(dead_code)]
async fn write_with_timeout<S, B>(
    stream: &mut S,
    buf: B,
    duration: Option<Duration>,
) -> io::Result<compio::buf::BufResult<usize, B>>
where
    S: AsyncWrite + Unpin,
    B: compio::buf::IoBuf,
{
    match duration {
        None => {
            // No timeout, block indefinitely
            Ok(stream.write(buf).await)
        }
        Some(d) if d.is_zero() => {
            // Non-blocking mode
            Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "Non-blocking mode not yet implemented",
            ))
        }
        Some(d) => {
            // Timeout mode
            match timeout(d, stream.write(buf)).await {
                Ok(result) => Ok(result),
                Err(_elapsed) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "Write operation timed out",
                )),
            }
        }
    }
}

/// Execute an async read_exact operation with a timeout.
///
/// Reads exactly the full buffer or returns an error.
pub async fn read_exact_with_timeout<S, B>(
    stream: &mut S,
    buf: B,
    duration: Option<Duration>,
) -> io::Result<compio::buf::BufResult<(), B>>
where
    S: AsyncRead + Unpin,
    B: compio::buf::IoBufMut,
{
    match duration {
        None => {
            // No timeout, block indefinitely
            Ok(stream.read_exact(buf).await)
        }
        Some(d) if d.is_zero() => {
            // Non-blocking mode
            Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "Non-blocking mode not yet implemented",
            ))
        }
        Some(d) => {
            // Timeout mode
            match timeout(d, stream.read_exact(buf)).await {
                Ok(result) => Ok(result),
                Err(_elapsed) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "Read operation timed out",
                )),
            }
        }
    }
}

/// Execute an async write_all operation with a timeout.
///
/// Writes the entire buffer or returns an error.
pub async fn write_all_with_timeout<S, B>(
    stream: &mut S,
    buf: B,
    duration: Option<Duration>,
) -> io::Result<compio::buf::BufResult<(), B>>
where
    S: AsyncWrite + Unpin,
    B: compio::buf::IoBuf,
{
    match duration {
        None => {
            // No timeout, block indefinitely
            Ok(stream.write_all(buf).await)
        }
        Some(d) if d.is_zero() => {
            // Non-blocking mode
            Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "Non-blocking mode not yet implemented",
            ))
        }
        Some(d) => {
            // Timeout mode
            match timeout(d, stream.write_all(buf)).await {
                Ok(result) => Ok(result),
                Err(_elapsed) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "Write operation timed out",
                )),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    
    // Note: These are compile-time tests to ensure the API is sound
    // Full integration tests would require actual I/O operations
    
    #[test]
    fn test_timeout_types() {
        // Verify Duration handling
        let _infinite: Option<Duration> = None;
        let _nonblocking = Some(Duration::ZERO);
        let _timed = Some(Duration::from_secs(5));
    }
}
