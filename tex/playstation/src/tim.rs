use bitflags::bitflags;

use std::io;
use thiserror::Error;

use dwt_core::{
	cursor::ByteCursor,
	texture::{
		Image,
		Rgba
	}
};

use crate::clutmap::{
	texture_page,
	unpack_coords,
	ClutMap,
	NO_CLUT
};

pub const MAGIC: u32 = 16;

bitflags! {
	pub struct Flags: u32 {
		const HAS_CLUT = 8;
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u32)]
pub enum PixelMode {
	Bpp4 = 0,
	Bpp8,
	Bpp16,
	Bpp24,
}

impl PixelMode {
	fn from_flag(flag: u32) -> Option<PixelMode> {
		match flag & 7 {
			0 => Some(PixelMode::Bpp4),
			1 => Some(PixelMode::Bpp8),
			2 => Some(PixelMode::Bpp16),
			3 => Some(PixelMode::Bpp24),
			_ => None,
		}
	}
}

#[derive(Debug, Error)]
pub enum TIMImportError {
	#[error("CLUT id out of range: {0}")]
	ClutId(u32),
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Not a PlayStation texture: {0}")]
	Magic(u32),
	#[error("Misaligned CLUT: image expects X {expected}, map claims X {found}")]
	MisalignedClut {
		expected: u32,
		found: u32,
	},
	#[error("Unsupported pixel mode: {0}")]
	PixelMode(u32),
}

/// A decoded TIM texture.
///
/// Palettes are kept as raw 15-bit colors and resolved on access; pixels are
/// palette indices for 4/8 bpp and raw color words for 16/24 bpp, so the
/// buffer can be re-encoded byte-identically.
#[derive(Clone, Debug, PartialEq)]
pub struct Tim {
	pub mode: PixelMode,
	pub width: u32,
	pub height: u32,
	pub clut_org_x: u32,
	pub clut_org_y: u32,
	pub pixel_org_x: u32,
	pub pixel_org_y: u32,
	pub palettes: Vec<Vec<u16>>,
	pub pixels: Vec<u32>,
	raw_width: u16,
}

impl Tim {
	#[cfg(feature = "import")]
	pub fn read(buffer: &[u8]) -> Result<Tim, TIMImportError> {
		let mut cursor = ByteCursor::new(buffer);

		let magic = cursor.read_u32()?;
		if magic != MAGIC {
			return Err(TIMImportError::Magic(magic));
		}

		let flag = cursor.read_u32()?;
		let mode = PixelMode::from_flag(flag).ok_or(TIMImportError::PixelMode(flag & 7))?;

		let mut clut_org_x = 0;
		let mut clut_org_y = 0;
		let mut palettes = vec![];

		if Flags::from_bits_truncate(flag).contains(Flags::HAS_CLUT) {
			let _size = cursor.read_u32()?;
			clut_org_x = cursor.read_u16()? as u32;
			clut_org_y = cursor.read_u16()? as u32;
			let color_count = cursor.read_u16()? as usize;
			let palette_count = cursor.read_u16()? as usize;

			for _ in 0..palette_count {
				let mut palette = Vec::with_capacity(color_count);
				for _ in 0..color_count {
					palette.push(cursor.read_u16()?);
				}
				palettes.push(palette);
			}
		}

		let _size = cursor.read_u32()?;
		let pixel_org_x = cursor.read_u16()? as u32;
		let pixel_org_y = cursor.read_u16()? as u32;
		let raw_width = cursor.read_u16()?;
		let height = cursor.read_u16()? as u32;

		// the pixel block counts 16-bit framebuffer words, not pixels
		let width = match mode {
			PixelMode::Bpp4 => raw_width as u32 * 4,
			PixelMode::Bpp8 => raw_width as u32 * 2,
			PixelMode::Bpp16 => raw_width as u32,
			PixelMode::Bpp24 => (raw_width as u32 * 16) / 24,
		};

		let mut pixels = Vec::with_capacity((width * height) as usize);

		match mode {
			PixelMode::Bpp4 => {
				for _ in 0..((width * height) / 2) {
					let index = cursor.read_u8()?;
					pixels.push((index & 0x0F) as u32);
					pixels.push((index >> 4) as u32);
				}
			},
			PixelMode::Bpp8 => {
				for _ in 0..(width * height) {
					pixels.push(cursor.read_u8()? as u32);
				}
			},
			PixelMode::Bpp16 => {
				for _ in 0..(width * height) {
					pixels.push(cursor.read_u16()? as u32);
				}
			},
			PixelMode::Bpp24 => {
				for _ in 0..(width * height) {
					pixels.push(cursor.read_u24()?);
				}
			},
		}

		Ok(Tim {
			mode: mode,
			width: width,
			height: height,
			clut_org_x: clut_org_x,
			clut_org_y: clut_org_y,
			pixel_org_x: pixel_org_x,
			pixel_org_y: pixel_org_y,
			palettes: palettes,
			pixels: pixels,
			raw_width: raw_width,
		})
	}

	/// Resolves one pixel against a palette by index.
	pub fn get_color(&self, clut_id: u32, x: u32, y: u32, semi_trans: bool) -> Result<Rgba, TIMImportError> {
		let pixel = self.pixels[((y * self.width) + x) as usize];

		if self.palettes.is_empty() {
			return Ok(match self.mode {
				PixelMode::Bpp24 => Rgba::from_rgb24(pixel),
				_ => Rgba::from_tim16(pixel as u16, semi_trans),
			});
		}

		let palette = self.palettes.get(clut_id as usize).ok_or(TIMImportError::ClutId(clut_id))?;

		// out of range indices render as transparent, like the hardware
		Ok(match palette.get(pixel as usize) {
			Some(raw) => Rgba::from_tim16(*raw, semi_trans),
			None => Rgba::TRANSPARENT,
		})
	}

	/// Resolves one pixel through the CLUT composite map, using this image's
	/// origin to find its texture page. A claim whose CLUT X does not match
	/// this image's CLUT origin is a hard error: the map was built against a
	/// different palette layout.
	pub fn get_color_mapped(&self, clut_map: &ClutMap, x: u32, y: u32) -> Result<Rgba, TIMImportError> {
		let mut clut_id = 255;

		if !self.palettes.is_empty() {
			let page = texture_page(self.pixel_org_x, self.pixel_org_y);
			let claim = clut_map.lookup(page, x as usize, y as usize);

			if claim == NO_CLUT {
				return Ok(Rgba::TRANSPARENT);
			}

			let (claim_x, claim_y) = unpack_coords(claim);
			if claim_x as u32 != self.clut_org_x {
				return Err(TIMImportError::MisalignedClut {
					expected: self.clut_org_x,
					found: claim_x as u32,
				});
			}

			clut_id = (claim_y as u32).wrapping_sub(self.clut_org_y);
		}

		self.get_color(clut_id, x, y, false)
	}

	/// Renders a region with an explicit palette; coordinates wrap within
	/// the image, which map objects rely on.
	pub fn get_image(&self, clut_id: u32, x: u32, y: u32, width: u32, height: u32, semi_trans: bool)
		-> Result<Image, TIMImportError>
	{
		let mut image = Image::new(width as usize, height as usize);

		for ly in 0..height {
			for lx in 0..width {
				let local_x = ((x + lx) % self.width) as u32;
				let local_y = ((y + ly) % self.height) as u32;
				let color = self.get_color(clut_id, local_x, local_y, semi_trans)?;
				image.put(lx as usize, ly as usize, color);
			}
		}

		Ok(image)
	}

	/// Renders the whole image, resolving palettes through the composite map.
	pub fn get_image_mapped(&self, clut_map: &ClutMap) -> Result<Image, TIMImportError> {
		let mut image = Image::new(self.width as usize, self.height as usize);

		for y in 0..self.height {
			for x in 0..self.width {
				let color = self.get_color_mapped(clut_map, x, y)?;
				image.put(x as usize, y as usize, color);
			}
		}

		Ok(image)
	}

	/// Whether a VRAM texel coordinate falls inside this image's footprint.
	pub fn contains_tex_coord(&self, x: u32, y: u32) -> bool {
		x >= self.pixel_org_x
			&& x < self.pixel_org_x + self.raw_width as u32
			&& y >= self.pixel_org_y
			&& y < self.pixel_org_y + self.height
	}

	/// Re-encodes into the original byte layout.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut data = vec![];

		data.extend_from_slice(&MAGIC.to_le_bytes());

		let mut flag = self.mode as u32;
		if !self.palettes.is_empty() {
			flag |= Flags::HAS_CLUT.bits();
		}
		data.extend_from_slice(&flag.to_le_bytes());

		if let Some(first) = self.palettes.first() {
			let size = 12 + (self.palettes.len() * first.len() * 2) as u32;
			data.extend_from_slice(&size.to_le_bytes());
			data.extend_from_slice(&(self.clut_org_x as u16).to_le_bytes());
			data.extend_from_slice(&(self.clut_org_y as u16).to_le_bytes());
			data.extend_from_slice(&(first.len() as u16).to_le_bytes());
			data.extend_from_slice(&(self.palettes.len() as u16).to_le_bytes());

			for palette in self.palettes.iter() {
				for color in palette.iter() {
					data.extend_from_slice(&color.to_le_bytes());
				}
			}
		}

		let pixel_bytes = match self.mode {
			PixelMode::Bpp4 => self.pixels.len() / 2,
			PixelMode::Bpp8 => self.pixels.len(),
			PixelMode::Bpp16 => self.pixels.len() * 2,
			PixelMode::Bpp24 => self.pixels.len() * 3,
		};

		data.extend_from_slice(&(12 + pixel_bytes as u32).to_le_bytes());
		data.extend_from_slice(&(self.pixel_org_x as u16).to_le_bytes());
		data.extend_from_slice(&(self.pixel_org_y as u16).to_le_bytes());
		data.extend_from_slice(&self.raw_width.to_le_bytes());
		data.extend_from_slice(&(self.height as u16).to_le_bytes());

		match self.mode {
			PixelMode::Bpp4 => {
				for pair in self.pixels.chunks(2) {
					data.push((pair[0] as u8 & 0x0F) | ((pair[1] as u8 & 0x0F) << 4));
				}
			},
			PixelMode::Bpp8 => {
				for pixel in self.pixels.iter() {
					data.push(*pixel as u8);
				}
			},
			PixelMode::Bpp16 => {
				for pixel in self.pixels.iter() {
					data.extend_from_slice(&(*pixel as u16).to_le_bytes());
				}
			},
			PixelMode::Bpp24 => {
				for pixel in self.pixels.iter() {
					data.extend_from_slice(&pixel.to_le_bytes()[0..3]);
				}
			},
		}

		data
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clutmap::pack_coords;

	// 2x1 pixel 8bpp image with a single 2-color palette at CLUT origin (448, 120)
	fn fixture() -> Vec<u8> {
		let mut data = vec![];
		data.extend_from_slice(&16u32.to_le_bytes()); // magic
		data.extend_from_slice(&9u32.to_le_bytes()); // 8bpp, has CLUT

		data.extend_from_slice(&16u32.to_le_bytes()); // clut block size
		data.extend_from_slice(&448u16.to_le_bytes());
		data.extend_from_slice(&120u16.to_le_bytes());
		data.extend_from_slice(&2u16.to_le_bytes()); // colors
		data.extend_from_slice(&1u16.to_le_bytes()); // palettes
		data.extend_from_slice(&0x7FFFu16.to_le_bytes()); // white
		data.extend_from_slice(&0x001Fu16.to_le_bytes()); // red

		data.extend_from_slice(&14u32.to_le_bytes()); // pixel block size
		data.extend_from_slice(&320u16.to_le_bytes()); // pixel org x
		data.extend_from_slice(&0u16.to_le_bytes());
		data.extend_from_slice(&1u16.to_le_bytes()); // one 16-bit word wide
		data.extend_from_slice(&1u16.to_le_bytes());
		data.push(0);
		data.push(1);
		data
	}

	#[test]
	fn test_decode() {
		let tim = Tim::read(&fixture()).unwrap();

		assert_eq!(PixelMode::Bpp8, tim.mode);
		assert_eq!(2, tim.width);
		assert_eq!(1, tim.height);
		assert_eq!(1, tim.palettes.len());
		assert_eq!(vec![0, 1], tim.pixels);

		assert_eq!(Rgba { r: 248, g: 248, b: 248, a: 255 }, tim.get_color(0, 0, 0, false).unwrap());
		assert_eq!(Rgba { r: 248, g: 0, b: 0, a: 255 }, tim.get_color(0, 1, 0, false).unwrap());
	}

	#[test]
	fn test_round_trip() {
		let data = fixture();
		let tim = Tim::read(&data).unwrap();
		assert_eq!(data, tim.to_bytes());
	}

	#[test]
	fn test_bad_magic() {
		let data = [0u8; 8];
		assert!(matches!(Tim::read(&data), Err(TIMImportError::Magic(0))));
	}

	#[test]
	fn test_mapped_lookup() {
		let tim = Tim::read(&fixture()).unwrap();

		// image sits at VRAM x 320 -> page 5
		let mut map = ClutMap::new();
		map.page(5).set(0, 0, pack_coords(448, 120));

		let color = tim.get_color_mapped(&map, 0, 0).unwrap();
		assert_eq!(Rgba { r: 248, g: 248, b: 248, a: 255 }, color);

		// unclaimed texels resolve transparent
		assert_eq!(Rgba::TRANSPARENT, tim.get_color_mapped(&map, 1, 0).unwrap());
	}

	#[test]
	fn test_misaligned_clut_is_fatal() {
		let tim = Tim::read(&fixture()).unwrap();

		let mut map = ClutMap::new();
		map.page(5).set(0, 0, pack_coords(64, 120));

		assert!(matches!(
			tim.get_color_mapped(&map, 0, 0),
			Err(TIMImportError::MisalignedClut { expected: 448, found: 64 })
		));
	}
}
