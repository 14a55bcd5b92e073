use std::io;
use thiserror::Error;

use dwt_core::{
	cursor::ByteCursor,
	texture::{
		Image,
		Rgba
	}
};

pub const TILE_DIM: usize = 128;
pub const PALETTE_LEN: usize = 256;

/// Tile id marking an empty cell in a map's background grid.
pub const NO_TILE: u32 = 0xFFFF_FFFF;

#[derive(Debug, Error)]
pub enum TFSImportError {
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Palette id out of range: {0}")]
	PaletteId(u32),
}

/// One 128x128 8bpp background tile.
#[derive(Clone, Debug, PartialEq)]
pub struct TfsTile {
	pub pos_x: u16,
	pub pos_y: u16,
	pub data: Vec<u8>,
}

impl TfsTile {
	#[cfg(feature = "import")]
	fn read(cursor: &mut ByteCursor) -> Result<TfsTile, TFSImportError> {
		let pos_x = cursor.read_u16()?;
		let pos_y = cursor.read_u16()?;

		let mut data = vec![0; TILE_DIM * TILE_DIM];
		cursor.read_exact(&mut data)?;

		Ok(TfsTile {
			pos_x: pos_x,
			pos_y: pos_y,
			data: data,
		})
	}

	/// Renders the tile with a 256-entry raw palette.
	pub fn get_image(&self, palette: &[u16]) -> Image {
		let mut image = Image::new(TILE_DIM, TILE_DIM);

		for y in 0..TILE_DIM {
			for x in 0..TILE_DIM {
				let index = self.data[(y * TILE_DIM) + x] as usize;
				let color = match palette.get(index) {
					Some(raw) => Rgba::from_tim16(*raw, false),
					None => Rgba::TRANSPARENT,
				};
				image.put(x, y, color);
			}
		}

		image
	}
}

/// A background tile sheet: shared palettes plus a run of 128x128 tiles.
/// The companion MAP file declares how the tiles lay out on screen.
#[derive(Clone, Debug, PartialEq)]
pub struct Tfs {
	pub width: u16,
	pub height: u16,
	pub palettes: Vec<Vec<u16>>,
	pub tiles: Vec<TfsTile>,
}

impl Tfs {
	#[cfg(feature = "import")]
	pub fn read(buffer: &[u8]) -> Result<Tfs, TFSImportError> {
		let mut cursor = ByteCursor::new(buffer);

		let width = cursor.read_u16()?;
		let height = cursor.read_u16()?;
		let palette_count = cursor.read_u32()? as usize;

		// tile count is not stored, it follows from the file size
		let tile_size = 4 + TILE_DIM * TILE_DIM;
		let tile_count = palette_count
			.checked_mul(PALETTE_LEN * 2)
			.and_then(|palette_bytes| buffer.len().checked_sub(8 + palette_bytes))
			.ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?
			/ tile_size;

		let mut palettes = Vec::with_capacity(palette_count);
		for _ in 0..palette_count {
			let mut palette = Vec::with_capacity(PALETTE_LEN);
			for _ in 0..PALETTE_LEN {
				palette.push(cursor.read_u16()?);
			}
			palettes.push(palette);
		}

		let mut tiles = Vec::with_capacity(tile_count);
		for _ in 0..tile_count {
			tiles.push(TfsTile::read(&mut cursor)?);
		}

		Ok(Tfs {
			width: width,
			height: height,
			palettes: palettes,
			tiles: tiles,
		})
	}

	/// Composites the declared tilemap into one image. Tiles are consumed in
	/// declaration order; [`NO_TILE`] cells stay transparent and consume none.
	pub fn compose(&self, grid_width: u32, grid_height: u32, grid: &[u32], palette_id: u32)
		-> Result<Image, TFSImportError>
	{
		let palette = self
			.palettes
			.get(palette_id as usize)
			.ok_or(TFSImportError::PaletteId(palette_id))?;

		let mut image = Image::new(grid_width as usize * TILE_DIM, grid_height as usize * TILE_DIM);
		let mut tile_id = 0;

		for h in 0..(grid_height as usize) {
			for w in 0..(grid_width as usize) {
				if grid[(h * grid_width as usize) + w] == NO_TILE {
					continue;
				}

				if let Some(tile) = self.tiles.get(tile_id) {
					image.draw_image(w * TILE_DIM, h * TILE_DIM, &tile.get_image(palette));
				}
				tile_id += 1;
			}
		}

		Ok(image)
	}

	/// Renders every palette variant of the tilemap.
	pub fn compose_all(&self, grid_width: u32, grid_height: u32, grid: &[u32])
		-> Result<Vec<Image>, TFSImportError>
	{
		let mut images = vec![];

		for i in 0..(self.palettes.len() as u32) {
			images.push(self.compose(grid_width, grid_height, grid, i)?);
		}

		Ok(images)
	}
}
