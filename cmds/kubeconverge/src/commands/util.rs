//! Utilities for command handlers.

use std::{
	error::Error,
	io::{self, ErrorKind, Write},
};

/// A writer wrapper that silently handles broken pipe errors.
///
/// Lets `kubeconverge plan . | head` exit cleanly when the reader goes away.
pub struct BrokenPipeGuard<W> {
	inner: W,
}

impl<W> BrokenPipeGuard<W> {
	pub fn new(inner: W) -> Self {
		Self { inner }
	}
}

impl<W: Write> Write for BrokenPipeGuard<W> {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		match self.inner.write(buf) {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(buf.len()),
			other => other,
		}
	}

	fn flush(&mut self) -> io::Result<()> {
		match self.inner.flush() {
			Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
			other => other,
		}
	}
}

/// `outer: inner: root cause` on one line, for table cells and log fields.
pub fn error_chain(error: &dyn Error) -> String {
	let mut message = error.to_string();
	let mut source = error.source();
	while let Some(cause) = source {
		message.push_str(": ");
		message.push_str(&cause.to_string());
		source = cause.source();
	}
	message
}

#[cfg(test)]
mod tests {
	use kubeconverge_engine::{ApiError, ApiOperation, ResourceKind};

	use super::*;

	struct ClosedPipe;

	impl Write for ClosedPipe {
		fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
			Err(io::Error::from(ErrorKind::BrokenPipe))
		}

		fn flush(&mut self) -> io::Result<()> {
			Err(io::Error::from(ErrorKind::BrokenPipe))
		}
	}

	#[test]
	fn test_broken_pipe_is_swallowed() {
		let mut writer = BrokenPipeGuard::new(ClosedPipe);
		assert!(writeln!(writer, "kind: Service").is_ok());
		assert!(writer.flush().is_ok());
	}

	#[test]
	fn test_error_chain() {
		let error = ApiError::new(
			ApiOperation::Replace,
			ResourceKind::Service,
			"web",
			io::Error::other("conflict"),
		);
		assert_eq!(error_chain(&error), "replacing Service/web: conflict");
	}
}
