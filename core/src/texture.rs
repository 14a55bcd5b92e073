/// 8-bit RGBA color.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rgba {
	pub r: u8,
	pub g: u8,
	pub b: u8,
	pub a: u8,
}

impl Rgba {
	pub const TRANSPARENT: Rgba = Rgba { r: 0, g: 0, b: 0, a: 0 };
	pub const BLACK: Rgba = Rgba { r: 0, g: 0, b: 0, a: 255 };

	/// Resolves a 15-bit PlayStation color (5-5-5 plus semi-transparency bit).
	///
	/// All-zero channels encode either full transparency (STP clear) or opaque
	/// black (STP set). Any other color gets its channels scaled to 8 bits;
	/// alpha drops to 0x7F only when the caller asked for semi-transparency
	/// and the STP bit agrees.
	pub fn from_tim16(raw: u16, semi_trans: bool) -> Rgba {
		let r = (raw & 31) as u8;
		let g = ((raw >> 5) & 31) as u8;
		let b = ((raw >> 10) & 31) as u8;
		let stp = (raw >> 15) & 1;

		if r == 0 && g == 0 && b == 0 {
			return if stp == 0 { Rgba::TRANSPARENT } else { Rgba::BLACK };
		}

		Rgba {
			r: r << 3,
			g: g << 3,
			b: b << 3,
			a: if semi_trans && stp == 1 { 0x7F } else { 0xFF },
		}
	}

	/// Unpacks a 24-bit truecolor word (low byte red).
	pub fn from_rgb24(raw: u32) -> Rgba {
		Rgba {
			r: raw as u8,
			g: (raw >> 8) as u8,
			b: (raw >> 16) as u8,
			a: 0xFF,
		}
	}
}

/// Owned RGBA raster; the hand-off format for PNG and glTF texture writers.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
	pub width: usize,
	pub height: usize,
	pub pixels: Vec<Rgba>,
}

impl Image {
	pub fn new(width: usize, height: usize) -> Image {
		Image {
			width: width,
			height: height,
			pixels: vec![Rgba::TRANSPARENT; width * height],
		}
	}

	pub fn get(&self, x: usize, y: usize) -> Rgba {
		debug_assert!(x < self.width && y < self.height);
		self.pixels[(y * self.width) + x]
	}

	/// Writes a pixel, ignoring coordinates outside the raster.
	pub fn put(&mut self, x: usize, y: usize, color: Rgba) {
		if x < self.width && y < self.height {
			self.pixels[(y * self.width) + x] = color;
		}
	}

	/// Blits another raster at the given position, clipped to this one.
	pub fn draw_image(&mut self, x: usize, y: usize, other: &Image) {
		for oy in 0..other.height {
			for ox in 0..other.width {
				self.put(x + ox, y + oy, other.get(ox, oy));
			}
		}
	}

	/// Flattens into a row-major RGBA8 byte buffer.
	pub fn into_raw(self) -> Vec<u8> {
		let mut data = Vec::with_capacity(self.pixels.len() * 4);

		for pixel in self.pixels.iter() {
			data.push(pixel.r);
			data.push(pixel.g);
			data.push(pixel.b);
			data.push(pixel.a);
		}

		data
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_all_zero_transparency_rule() {
		assert_eq!(Rgba::TRANSPARENT, Rgba::from_tim16(0x0000, false));
		assert_eq!(Rgba::BLACK, Rgba::from_tim16(0x8000, false));
		assert_eq!(Rgba::BLACK, Rgba::from_tim16(0x8000, true));
	}

	#[test]
	fn test_semi_transparency() {
		// R = 16, STP set
		let color = Rgba::from_tim16(0x8010, true);
		assert_eq!(Rgba { r: 128, g: 0, b: 0, a: 0x7F }, color);

		let opaque = Rgba::from_tim16(0x8010, false);
		assert_eq!(0xFF, opaque.a);

		// STP clear: never semi-transparent
		let plain = Rgba::from_tim16(0x0010, true);
		assert_eq!(0xFF, plain.a);
	}

	#[test]
	#[should_panic]
	fn test_get_rejects_row_overrun() {
		Image::new(4, 4).get(4, 0);
	}

	#[test]
	fn test_blit_clipping() {
		let mut target = Image::new(4, 4);
		let mut patch = Image::new(2, 2);
		patch.put(0, 0, Rgba::BLACK);
		patch.put(1, 1, Rgba::BLACK);

		target.draw_image(3, 3, &patch);
		assert_eq!(Rgba::BLACK, target.get(3, 3));
		assert_eq!(16, target.pixels.len());
	}
}
