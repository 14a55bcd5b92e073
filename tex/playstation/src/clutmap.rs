use std::collections::BTreeMap;

/// Sentinel for texels no triangle has claimed a palette for.
pub const NO_CLUT: u32 = 0xFFFF_FFFF;

pub const PAGE_DIM: usize = 256;
pub const BLOCK_DIM: usize = 8;

/// Packs framebuffer CLUT coordinates into one 32-bit cell value.
pub fn pack_coords(x: u16, y: u16) -> u32 {
	x as u32 | (y as u32) << 16
}

pub fn unpack_coords(value: u32) -> (u16, u16) {
	(value as u16, (value >> 16) as u16)
}

/// Texture page index for a VRAM position (64-word columns, 256-line rows).
pub fn texture_page(x: u32, y: u32) -> u32 {
	(x / 64) + ((y / 256) * 16)
}

/// One 256x256 texture page worth of claimed CLUT coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct ClutPage {
	cells: Vec<u32>,
}

impl ClutPage {
	fn new() -> ClutPage {
		ClutPage {
			cells: vec![NO_CLUT; PAGE_DIM * PAGE_DIM],
		}
	}

	pub fn get(&self, x: usize, y: usize) -> u32 {
		debug_assert!(x < PAGE_DIM && y < PAGE_DIM);
		self.cells[(y * PAGE_DIM) + x]
	}

	pub fn set(&mut self, x: usize, y: usize, value: u32) {
		if x < PAGE_DIM && y < PAGE_DIM {
			self.cells[(y * PAGE_DIM) + x] = value;
		}
	}

	/// Quantizes claims to the hardware's 8x8 block granularity: every block
	/// takes the majority vote over its non-empty texels, ties going to the
	/// value seen first. Unclaimed blocks stay at [`NO_CLUT`].
	fn resolve_blocks(&mut self) {
		for block_y in 0..(PAGE_DIM / BLOCK_DIM) {
			for block_x in 0..(PAGE_DIM / BLOCK_DIM) {
				let mut counts: Vec<(u32, u32)> = vec![];

				for y in 0..BLOCK_DIM {
					for x in 0..BLOCK_DIM {
						let value = self.get(block_x * BLOCK_DIM + x, block_y * BLOCK_DIM + y);
						if value == NO_CLUT {
							continue;
						}

						match counts.iter_mut().find(|c| c.0 == value) {
							Some(entry) => entry.1 += 1,
							None => counts.push((value, 1)),
						}
					}
				}

				let mut best = (NO_CLUT, 0);
				for entry in counts.iter() {
					if entry.1 > best.1 {
						best = *entry;
					}
				}

				for y in 0..BLOCK_DIM {
					for x in 0..BLOCK_DIM {
						self.set(block_x * BLOCK_DIM + x, block_y * BLOCK_DIM + y, best.0);
					}
				}
			}
		}
	}
}

/// Derived per-page raster of which palette applies to which texture region.
///
/// The TIM format records palette origins but not which palette a given
/// region was authored against; that association only exists in the faces
/// referencing the texture. Rasterizing every face's UV footprint here
/// recovers it.
#[derive(Clone, Debug, Default)]
pub struct ClutMap {
	pub pages: BTreeMap<u32, ClutPage>,
}

impl ClutMap {
	pub fn new() -> ClutMap {
		ClutMap {
			pages: BTreeMap::new(),
		}
	}

	/// Returns the page raster for an id, creating it empty on first use.
	pub fn page(&mut self, id: u32) -> &mut ClutPage {
		self.pages.entry(id).or_insert_with(ClutPage::new)
	}

	/// Claimed cell value, or [`NO_CLUT`] for untouched pages.
	pub fn lookup(&self, page: u32, x: usize, y: usize) -> u32 {
		match self.pages.get(&page) {
			Some(p) => p.get(x, y),
			None => NO_CLUT,
		}
	}

	/// Rasterizes a face's UV triangle onto its page, stamping the CLUT
	/// coordinates the face claims.
	pub fn stamp_triangle(&mut self, page_id: u32, uvs: [(u8, u8); 3], clut_x: u16, clut_y: u16) {
		let value = pack_coords(clut_x, clut_y);
		let page = self.page(page_id);

		let ax = uvs[0].0 as i32;
		let ay = uvs[0].1 as i32;
		let bx = uvs[1].0 as i32;
		let by = uvs[1].1 as i32;
		let cx = uvs[2].0 as i32;
		let cy = uvs[2].1 as i32;

		let min_x = ax.min(bx).min(cx);
		let max_x = ax.max(bx).max(cx);
		let min_y = ay.min(by).min(cy);
		let max_y = ay.max(by).max(cy);

		let edge = |px: i32, py: i32, qx: i32, qy: i32, x: i32, y: i32| (qx - px) * (y - py) - (qy - py) * (x - px);

		for y in min_y..=max_y {
			for x in min_x..=max_x {
				let e0 = edge(ax, ay, bx, by, x, y);
				let e1 = edge(bx, by, cx, cy, x, y);
				let e2 = edge(cx, cy, ax, ay, x, y);

				// accept either winding
				if (e0 >= 0 && e1 >= 0 && e2 >= 0) || (e0 <= 0 && e1 <= 0 && e2 <= 0) {
					page.set(x as usize, y as usize, value);
				}
			}
		}
	}

	/// Applies a ChangeTexture animation event: copies a claimed rectangle
	/// from its source to its destination on every page. X coordinates and
	/// widths count 4-texel units, per the original event encoding.
	pub fn copy_region(&mut self, src_x: u8, src_y: u8, dest_x: u8, dest_y: u8, width: u8, height: u8) {
		for page in self.pages.values_mut() {
			let mut copy = vec![NO_CLUT; (width as usize * 4) * height as usize];

			for y in 0..(height as usize) {
				for x in 0..(width as usize * 4) {
					let sx = src_x as usize * 4 + x;
					let sy = src_y as usize + y;

					if sx < PAGE_DIM && sy < PAGE_DIM {
						copy[(y * width as usize * 4) + x] = page.get(sx, sy);
					}
				}
			}

			for y in 0..(height as usize) {
				for x in 0..(width as usize * 4) {
					page.set(dest_x as usize * 4 + x, dest_y as usize + y, copy[(y * width as usize * 4) + x]);
				}
			}
		}
	}

	/// Runs the 8x8 block vote on every page. Call once all faces are
	/// stamped and all texture events applied.
	pub fn resolve_blocks(&mut self) {
		for page in self.pages.values_mut() {
			page.resolve_blocks();
		}
	}
}
