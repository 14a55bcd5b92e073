use byteorder::{
	LE,
	ReadBytesExt
};

use std::io::{
	self,
	Cursor,
	Read
};

/// Positioned little endian reader over an in-memory buffer.
///
/// Console dumps are parsed through offset tables, so random access is part
/// of the contract. Every read is bounds checked; running off the end of the
/// buffer surfaces as [`io::ErrorKind::UnexpectedEof`] rather than clamping
/// or truncating.
pub struct ByteCursor<'a> {
	inner: Cursor<&'a [u8]>,
}

impl<'a> ByteCursor<'a> {
	pub fn new(buffer: &'a [u8]) -> ByteCursor<'a> {
		ByteCursor {
			inner: Cursor::new(buffer),
		}
	}

	pub fn position(&self) -> u64 {
		self.inner.position()
	}

	pub fn set_position(&mut self, position: u64) {
		self.inner.set_position(position);
	}

	pub fn reset(&mut self) {
		self.inner.set_position(0);
	}

	/// Moves the read position relative to the current one.
	pub fn skip(&mut self, count: i64) {
		let position = self.inner.position() as i64 + count;
		self.inner.set_position(position as u64);
	}

	/// Advances to the next multiple of `alignment` bytes, if not already there.
	pub fn align(&mut self, alignment: u64) {
		let position = self.inner.position();
		let rest = position % alignment;

		if rest != 0 {
			self.inner.set_position(position + alignment - rest);
		}
	}

	pub fn remaining(&self) -> usize {
		let length = self.inner.get_ref().len() as u64;
		length.saturating_sub(self.inner.position()) as usize
	}

	pub fn read_u8(&mut self) -> io::Result<u8> {
		self.inner.read_u8()
	}

	pub fn read_i8(&mut self) -> io::Result<i8> {
		self.inner.read_i8()
	}

	pub fn read_u16(&mut self) -> io::Result<u16> {
		self.inner.read_u16::<LE>()
	}

	pub fn read_i16(&mut self) -> io::Result<i16> {
		self.inner.read_i16::<LE>()
	}

	pub fn read_u24(&mut self) -> io::Result<u32> {
		self.inner.read_u24::<LE>()
	}

	pub fn read_u32(&mut self) -> io::Result<u32> {
		self.inner.read_u32::<LE>()
	}

	pub fn read_i32(&mut self) -> io::Result<i32> {
		self.inner.read_i32::<LE>()
	}

	pub fn read_exact(&mut self, buffer: &mut [u8]) -> io::Result<()> {
		self.inner.read_exact(buffer)
	}

	pub fn read_u16_at(&mut self, offset: u64) -> io::Result<u16> {
		self.set_position(offset);
		self.read_u16()
	}

	pub fn read_u32_at(&mut self, offset: u64) -> io::Result<u32> {
		self.set_position(offset);
		self.read_u32()
	}

	/// Reads the next 16-bit word without advancing.
	pub fn peek_u16(&mut self) -> io::Result<u16> {
		let position = self.inner.position();
		let value = self.read_u16();
		self.inner.set_position(position);
		value
	}

	/// Reads the next 32-bit word without advancing.
	pub fn peek_u32(&mut self) -> io::Result<u32> {
		let position = self.inner.position();
		let value = self.read_u32();
		self.inner.set_position(position);
		value
	}

	/// Reads a 32-bit word at an absolute offset without advancing.
	pub fn peek_u32_at(&mut self, offset: u64) -> io::Result<u32> {
		let position = self.inner.position();
		let value = self.read_u32_at(offset);
		self.inner.set_position(position);
		value
	}
}
