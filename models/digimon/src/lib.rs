pub mod anim;
pub mod mmd;
pub mod node;
pub mod tmd;

use std::io;
use thiserror::Error;

use dwt_core::cursor::ByteCursor;
use dwt_textures_playstation::clutmap::ClutMap;

use crate::anim::{
	Animation,
	TextureEvent
};
use crate::mmd::{
	MmdAnimation,
	MmdHeader,
	MMDImportError
};
use crate::node::{
	NodeEntry,
	NodeImportError
};
use crate::tmd::{
	Mesh,
	TMDImportError
};

#[derive(Debug, Error)]
pub enum ModelImportError {
	#[error("Animation decode failed")]
	Animation {
		#[from]
		source: MMDImportError,
	},
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Mesh decode failed")]
	Mesh {
		#[from]
		source: TMDImportError,
	},
	#[error("Skeleton decode failed")]
	Skeleton {
		#[from]
		source: NodeImportError,
	},
}

/// A fully decoded model: meshes, skeleton, and the raw animation bank.
/// Animations stay in stream form; [`Animation::bake`] samples them.
#[derive(Clone, Debug, Default)]
pub struct Model {
	pub name: String,
	pub meshes: Vec<Mesh>,
	pub skeleton: Vec<NodeEntry>,
	pub animations: Vec<MmdAnimation>,
}

impl Model {
	/// Builds a model from a bare mesh container.
	#[cfg(feature = "import")]
	pub fn from_tmd(buffer: &[u8], skeleton: Vec<NodeEntry>) -> Result<Model, ModelImportError> {
		Ok(Model {
			name: String::new(),
			meshes: tmd::read_tmd(buffer)?,
			skeleton: skeleton,
			animations: vec![],
		})
	}

	/// Builds a model from a mesh+animation container. The animation bank is
	/// only meaningful against a skeleton; without one it is left empty.
	#[cfg(feature = "import")]
	pub fn from_mmd(buffer: &[u8], skeleton: Vec<NodeEntry>) -> Result<Model, ModelImportError> {
		let mut cursor = ByteCursor::new(buffer);
		let header = MmdHeader::read(&mut cursor)?;

		let block = |offset: u32| {
			buffer
				.get(offset as usize..)
				.ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
		};

		let meshes = tmd::read_tmd(block(header.tmd_offset)?)?;

		let animations = if skeleton.is_empty() {
			vec![]
		} else {
			mmd::read_animations(block(header.mtn_offset)?, skeleton.len())?
		};

		Ok(Model {
			name: String::new(),
			meshes: meshes,
			skeleton: skeleton,
			animations: animations,
		})
	}

	/// Bakes every non-empty animation in the bank.
	pub fn bake_animations(&self) -> Vec<Animation> {
		self.animations.iter().map(Animation::bake).collect()
	}

	/// Lowest texture page any textured face references, if any are textured.
	pub fn texture_page(&self) -> Option<u32> {
		self.textured_faces().map(|face| face.texture.page as u32).min()
	}

	/// Lowest CLUT X any textured face claims.
	pub fn clut_x(&self) -> Option<u32> {
		self.textured_faces().map(|face| face.clut.x as u32).min()
	}

	/// Lowest CLUT Y any textured face claims.
	pub fn clut_y(&self) -> Option<u32> {
		self.textured_faces().map(|face| face.clut.y as u32).min()
	}

	fn textured_faces(&self) -> impl Iterator<Item = &tmd::Face> {
		self.meshes
			.iter()
			.flat_map(|mesh| mesh.faces.iter())
			.filter(|face| face.textured)
	}

	/// Stamps every textured face's UV footprint onto the composite map.
	/// Texture events from baked animations are applied separately with
	/// [`apply_texture_events`], then the caller resolves the blocks.
	pub fn apply_clut(&self, clut_map: &mut ClutMap) {
		for face in self.textured_faces() {
			let uvs = match face.uvs {
				Some(uvs) => uvs,
				None => continue,
			};

			clut_map.stamp_triangle(
				face.texture.page as u32,
				[(uvs[0].u, uvs[0].v), (uvs[1].u, uvs[1].v), (uvs[2].u, uvs[2].v)],
				face.clut.x,
				face.clut.y,
			);
		}
	}
}

/// Replays animation texture patches against the composite map, so palette
/// claims follow the texels they were authored for.
pub fn apply_texture_events(clut_map: &mut ClutMap, events: &[TextureEvent]) {
	for event in events {
		clut_map.copy_region(
			event.src_x,
			event.src_y,
			event.dest_x,
			event.dest_y,
			event.width,
			event.height,
		);
	}
}

/// Reads a model from disk, with an optional side-car skeleton file. The
/// container kind follows the file extension; `.MMD` carries animation,
/// anything else is treated as a bare mesh.
#[cfg(feature = "import")]
pub fn read_model(mesh_path: &str, node_path: Option<&str>) -> Result<Model, ModelImportError> {
	use std::fs;
	use std::path::Path;

	let skeleton = match node_path {
		Some(path) => node::read_nodes(&fs::read(path)?)?,
		None => vec![],
	};

	let path = Path::new(mesh_path);
	let buffer = fs::read(path)?;

	let animated = path
		.extension()
		.map(|ext| ext.eq_ignore_ascii_case("mmd"))
		.unwrap_or(false);

	let mut model = if animated {
		Model::from_mmd(&buffer, skeleton)?
	} else {
		Model::from_tmd(&buffer, skeleton)?
	};

	model.name = path
		.file_name()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_default();

	Ok(model)
}

#[cfg(test)]
mod tests {
	use super::*;
	use dwt_textures_playstation::clutmap::{
		pack_coords,
		NO_CLUT
	};

	// single textured triangle covering UV (0,0)-(15,0)-(0,15), page 1,
	// CLUT at (448, 120)
	fn textured_tmd() -> Vec<u8> {
		let mut data = vec![];
		data.extend_from_slice(&tmd::MAGIC.to_le_bytes());
		data.extend_from_slice(&0u32.to_le_bytes());
		data.extend_from_slice(&1u32.to_le_bytes());

		data.extend_from_slice(&28u32.to_le_bytes()); // vert_top
		data.extend_from_slice(&3u32.to_le_bytes());
		data.extend_from_slice(&52u32.to_le_bytes()); // normal_top
		data.extend_from_slice(&1u32.to_le_bytes());
		data.extend_from_slice(&60u32.to_le_bytes()); // primitive_top
		data.extend_from_slice(&1u32.to_le_bytes());
		data.extend_from_slice(&0i32.to_le_bytes());

		for _ in 0..4 {
			// 3 vertices and 1 normal, all zero
			data.extend_from_slice(&[0; 8]);
		}

		data.extend_from_slice(&[0x07, 0x01]);
		data.push(0); // flag
		data.push(0x24); // polygon, tri, flat, textured
		data.extend_from_slice(&[0, 0]); // uv0
		data.extend_from_slice(&((448u16 >> 4) | (120u16 << 6)).to_le_bytes());
		data.extend_from_slice(&[15, 0]); // uv1
		data.extend_from_slice(&1u16.to_le_bytes()); // page 1
		data.extend_from_slice(&[0, 15]); // uv2
		data.extend_from_slice(&[0, 0]);
		data.extend_from_slice(&0u16.to_le_bytes()); // normal
		for v in [0u16, 1, 2] {
			data.extend_from_slice(&v.to_le_bytes());
		}

		data
	}

	#[test]
	fn test_from_tmd_minima() {
		let model = Model::from_tmd(&textured_tmd(), vec![]).unwrap();

		assert_eq!(Some(1), model.texture_page());
		assert_eq!(Some(448), model.clut_x());
		assert_eq!(Some(120), model.clut_y());
	}

	#[test]
	fn test_untextured_model_has_no_minima() {
		let model = Model {
			name: String::new(),
			meshes: vec![],
			skeleton: vec![],
			animations: vec![],
		};

		assert_eq!(None, model.texture_page());
		assert_eq!(None, model.clut_x());
	}

	#[test]
	fn test_apply_clut_stamps_faces() {
		let model = Model::from_tmd(&textured_tmd(), vec![]).unwrap();

		let mut map = ClutMap::new();
		model.apply_clut(&mut map);
		map.resolve_blocks();

		assert_eq!(pack_coords(448, 120), map.lookup(1, 0, 0));
		assert_eq!(NO_CLUT, map.lookup(1, 64, 64));
	}

	#[test]
	fn test_apply_texture_events_moves_claims() {
		let mut map = ClutMap::new();
		let page = map.page(0);
		for x in 0..4 {
			page.set(x, 0, pack_coords(448, 120));
		}

		let events = [TextureEvent {
			time: 0.0,
			src_x: 0,
			src_y: 0,
			dest_x: 8,
			dest_y: 16,
			width: 1,
			height: 1,
		}];

		apply_texture_events(&mut map, &events);
		assert_eq!(pack_coords(448, 120), map.lookup(0, 32, 16));
	}

	#[test]
	fn test_from_mmd_reads_bank() {
		let mut mtn = vec![];
		mtn.extend_from_slice(&4u32.to_le_bytes()); // one slot at offset 4
		mtn.extend_from_slice(&3u16.to_le_bytes()); // frame count
		// one non-root bone pose, no scale
		for _ in 0..6 {
			mtn.extend_from_slice(&0i16.to_le_bytes());
		}
		mtn.extend_from_slice(&0u16.to_le_bytes()); // terminator

		let tmd = textured_tmd();
		let mut data = vec![];
		data.extend_from_slice(&8u32.to_le_bytes()); // tmd offset
		data.extend_from_slice(&(8 + tmd.len() as u32).to_le_bytes()); // mtn offset
		data.extend(&tmd);
		data.extend(&mtn);

		let skeleton = vec![
			NodeEntry { object: 0, parent: node::NO_PARENT },
			NodeEntry { object: 1, parent: 0 },
		];

		let model = Model::from_mmd(&data, skeleton).unwrap();
		assert_eq!(1, model.meshes.len());
		assert_eq!(1, model.animations.len());
		assert_eq!(3, model.animations[0].frame_count);

		let baked = model.bake_animations();
		assert_eq!(2, baked[0].nodes.len());
	}
}
