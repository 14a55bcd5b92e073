use std::io;
use thiserror::Error;

use dwt_core::cursor::ByteCursor;

use dwt_textures_playstation::tim::{
	Tim,
	TIMImportError
};

use crate::gamedata::MapEntry;

pub const TILE_MAP_DIM: usize = 100;

#[derive(Debug, Error)]
pub enum MAPImportError {
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Embedded texture decode failed")]
	Texture {
		#[from]
		source: TIMImportError,
	},
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position3D<T> {
	pub x: T,
	pub y: T,
	pub z: T,
}

fn read_pos_i32(cursor: &mut ByteCursor) -> io::Result<Position3D<i32>> {
	Ok(Position3D {
		x: cursor.read_i32()?,
		y: cursor.read_i32()?,
		z: cursor.read_i32()?,
	})
}

fn read_pos_i16(cursor: &mut ByteCursor) -> io::Result<Position3D<i16>> {
	Ok(Position3D {
		x: cursor.read_i16()?,
		y: cursor.read_i16()?,
		z: cursor.read_i16()?,
	})
}

fn read_i16_array<const N: usize>(cursor: &mut ByteCursor) -> io::Result<[i16; N]> {
	let mut values = [0; N];
	for slot in values.iter_mut() {
		*slot = cursor.read_i16()?;
	}
	Ok(values)
}

fn read_u16_array<const N: usize>(cursor: &mut ByteCursor) -> io::Result<[u16; N]> {
	let mut values = [0; N];
	for slot in values.iter_mut() {
		*slot = cursor.read_u16()?;
	}
	Ok(values)
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MapLight {
	pub position: Position3D<i32>,
	pub red: u32,
	pub green: u32,
	pub blue: u32,
}

/// Camera, lighting and background-grid setup for one map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapSetup {
	pub camera_origin: Position3D<i32>,
	pub camera_target: Position3D<i32>,
	pub lights: [MapLight; 3],
	pub ambient_red: u32,
	pub ambient_green: u32,
	pub ambient_blue: u32,
	pub viewer_distance: u32,
	pub liked_area: [i32; 4],
	pub disliked_area: [i32; 4],
	pub width: u32,
	pub height: u32,
	/// width*height background cells; [`dwt_textures_playstation::tfs::NO_TILE`]
	/// marks empty ones.
	pub tiles: Vec<u32>,
}

impl MapSetup {
	fn read(cursor: &mut ByteCursor) -> io::Result<MapSetup> {
		let camera_origin = read_pos_i32(cursor)?;
		let camera_target = read_pos_i32(cursor)?;

		let mut lights = [MapLight::default(); 3];
		for light in lights.iter_mut() {
			light.position = read_pos_i32(cursor)?;
			light.red = cursor.read_u32()?;
			light.green = cursor.read_u32()?;
			light.blue = cursor.read_u32()?;
		}

		let ambient_red = cursor.read_u32()?;
		let ambient_green = cursor.read_u32()?;
		let ambient_blue = cursor.read_u32()?;
		let viewer_distance = cursor.read_u32()?;

		let mut liked_area = [0; 4];
		for slot in liked_area.iter_mut() {
			*slot = cursor.read_i32()?;
		}
		let mut disliked_area = [0; 4];
		for slot in disliked_area.iter_mut() {
			*slot = cursor.read_i32()?;
		}

		let width = cursor.read_u32()?;
		let height = cursor.read_u32()?;

		let mut tiles = Vec::with_capacity((width * height) as usize);
		for _ in 0..(width * height) {
			tiles.push(cursor.read_u32()?);
		}

		Ok(MapSetup {
			camera_origin: camera_origin,
			camera_target: camera_target,
			lights: lights,
			ambient_red: ambient_red,
			ambient_green: ambient_green,
			ambient_blue: ambient_blue,
			viewer_distance: viewer_distance,
			liked_area: liked_area,
			disliked_area: disliked_area,
			width: width,
			height: height,
			tiles: tiles,
		})
	}
}

/// A billboard sprite definition: where its pixels sit in VRAM and where it
/// stands in the scene.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MapObject {
	pub uv_x: u16,
	pub uv_y: u16,
	pub width: u16,
	pub height: u16,
	pub pos: Position3D<i16>,
	pub clut: u16,
	pub transparency: u16,
}

impl MapObject {
	fn read(cursor: &mut ByteCursor) -> io::Result<MapObject> {
		Ok(MapObject {
			uv_x: cursor.read_u16()?,
			uv_y: cursor.read_u16()?,
			width: cursor.read_u16()?,
			height: cursor.read_u16()?,
			pos: read_pos_i16(cursor)?,
			clut: cursor.read_u16()?,
			transparency: cursor.read_u16()?,
		})
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MapObjectInstance {
	pub anim_state: [i16; 8],
	pub anim_duration: [i16; 8],
	pub pos_x: u16,
	pub pos_y: u16,
	pub flag: u16,
}

impl MapObjectInstance {
	fn read(cursor: &mut ByteCursor) -> io::Result<MapObjectInstance> {
		Ok(MapObjectInstance {
			anim_state: read_i16_array(cursor)?,
			anim_duration: read_i16_array(cursor)?,
			pos_x: cursor.read_u16()?,
			pos_y: cursor.read_u16()?,
			flag: cursor.read_u16()?,
		})
	}
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapObjects {
	pub objects: Vec<MapObject>,
	pub instances: Vec<MapObjectInstance>,
}

impl MapObjects {
	fn read(cursor: &mut ByteCursor) -> io::Result<MapObjects> {
		let object_count = cursor.read_u16()?;
		let mut objects = Vec::with_capacity(object_count as usize);
		for _ in 0..object_count {
			objects.push(MapObject::read(cursor)?);
		}

		let instance_count = cursor.read_u16()?;
		let mut instances = Vec::with_capacity(instance_count as usize);
		for _ in 0..instance_count {
			instances.push(MapObjectInstance::read(cursor)?);
		}

		Ok(MapObjects {
			objects: objects,
			instances: instances,
		})
	}
}

/// One roaming monster placement. AI and move tables are decoded field by
/// field but carried through without interpretation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapDigimon {
	pub kind: u16,
	pub ai_type: u16,
	pub pos: Position3D<i16>,
	pub rot_x: i16,
	pub rot_y: i16,
	pub rot_z: i16,
	pub tracking_range: u16,
	pub unk2: u16,
	pub script_id: u8,
	pub unk3: u8,
	pub hp: u16,
	pub mp: u16,
	pub max_hp: u16,
	pub max_mp: u16,
	pub offense: u16,
	pub defense: u16,
	pub speed: u16,
	pub brains: u16,
	pub bits: u16,
	pub charge_mode: u16,
	pub unk5: u16,
	pub moves: [u16; 4],
	pub move_weights: [u16; 4],
	pub flee_pos: Position3D<i16>,
	pub waypoint_speed: [i16; 8],
	pub waypoints: Vec<Position3D<i16>>,
}

impl MapDigimon {
	fn read(cursor: &mut ByteCursor) -> io::Result<MapDigimon> {
		let kind = cursor.read_u16()?;
		let ai_type = cursor.read_u16()?;
		let pos = read_pos_i16(cursor)?;
		let rot_x = cursor.read_i16()?;
		let rot_y = cursor.read_i16()?;
		let rot_z = cursor.read_i16()?;
		let tracking_range = cursor.read_u16()?;
		let unk2 = cursor.read_u16()?;
		let script_id = cursor.read_u8()?;
		let unk3 = cursor.read_u8()?;
		let hp = cursor.read_u16()?;
		let mp = cursor.read_u16()?;
		let max_hp = cursor.read_u16()?;
		let max_mp = cursor.read_u16()?;
		let offense = cursor.read_u16()?;
		let defense = cursor.read_u16()?;
		let speed = cursor.read_u16()?;
		let brains = cursor.read_u16()?;
		let bits = cursor.read_u16()?;
		let charge_mode = cursor.read_u16()?;
		let unk5 = cursor.read_u16()?;
		let moves = read_u16_array(cursor)?;
		let move_weights = read_u16_array(cursor)?;
		let flee_pos = read_pos_i16(cursor)?;
		let waypoint_count = cursor.read_u16()?;
		let waypoint_speed = read_i16_array(cursor)?;

		let mut waypoints = Vec::with_capacity(waypoint_count as usize);
		for _ in 0..waypoint_count {
			waypoints.push(read_pos_i16(cursor)?);
		}

		Ok(MapDigimon {
			kind: kind,
			ai_type: ai_type,
			pos: pos,
			rot_x: rot_x,
			rot_y: rot_y,
			rot_z: rot_z,
			tracking_range: tracking_range,
			unk2: unk2,
			script_id: script_id,
			unk3: unk3,
			hp: hp,
			mp: mp,
			max_hp: max_hp,
			max_mp: max_mp,
			offense: offense,
			defense: defense,
			speed: speed,
			brains: brains,
			bits: bits,
			charge_mode: charge_mode,
			unk5: unk5,
			moves: moves,
			move_weights: move_weights,
			flee_pos: flee_pos,
			waypoint_speed: waypoint_speed,
			waypoints: waypoints,
		})
	}
}

/// Spawn points, warp targets and roaming monster placements.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapElements {
	pub spawn_x: [i16; 10],
	pub spawn_y: [i16; 10],
	pub spawn_z: [i16; 10],
	pub spawn_rotation: [i16; 10],
	pub warp_target_map: [u16; 10],
	pub warp_target_spawn: [u16; 10],
	pub digimon: Vec<MapDigimon>,
}

impl MapElements {
	fn read(cursor: &mut ByteCursor) -> io::Result<MapElements> {
		let spawn_x = read_i16_array(cursor)?;
		let spawn_y = read_i16_array(cursor)?;
		let spawn_z = read_i16_array(cursor)?;
		let spawn_rotation = read_i16_array(cursor)?;
		let warp_target_map = read_u16_array(cursor)?;
		let warp_target_spawn = read_u16_array(cursor)?;
		let digimon_count = cursor.read_u16()?;

		let mut digimon = Vec::with_capacity(digimon_count as usize);
		for _ in 0..digimon_count {
			digimon.push(MapDigimon::read(cursor)?);
		}

		Ok(MapElements {
			spawn_x: spawn_x,
			spawn_y: spawn_y,
			spawn_z: spawn_z,
			spawn_rotation: spawn_rotation,
			warp_target_map: warp_target_map,
			warp_target_spawn: warp_target_spawn,
			digimon: digimon,
		})
	}
}

/// A fully decoded level file. The header is a run of offsets whose layout
/// depends on the image and object counts recorded in the map table entry,
/// so decoding needs that entry up front.
#[derive(Clone, Debug, Default)]
pub struct MapFile {
	pub entry: MapEntry,
	pub setup: MapSetup,
	pub images_8bpp: Vec<Tim>,
	pub images_4bpp: Vec<Tim>,
	pub objects: MapObjects,
	pub elements: MapElements,
	pub tile_map: Vec<u8>,
}

impl MapFile {
	#[cfg(feature = "import")]
	pub fn read(buffer: &[u8], entry: MapEntry) -> Result<MapFile, MAPImportError> {
		let mut cursor = ByteCursor::new(buffer);

		let setup_offset = cursor.read_u32()?;

		let mut image_offsets_8bpp = vec![];
		for _ in 0..entry.data.num_map_images {
			image_offsets_8bpp.push(cursor.read_u32()?);
		}

		let mut image_offsets_4bpp = vec![];
		for _ in 0..entry.data.num_map_objects {
			image_offsets_4bpp.push(cursor.read_u32()?);
		}

		let has_objects = entry.data.num_map_images > 0 || entry.data.num_map_objects > 0;
		let object_offset = if has_objects { cursor.read_u32()? } else { 0 };

		let elements_offset = cursor.read_u32()?;
		let tile_map_offset = cursor.read_u32()?;

		cursor.set_position(setup_offset as u64);
		let setup = MapSetup::read(&mut cursor)?;

		let embedded = |offset: u32| {
			buffer
				.get(offset as usize..)
				.ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
		};

		let mut images_8bpp = vec![];
		for offset in image_offsets_8bpp {
			images_8bpp.push(Tim::read(embedded(offset)?)?);
		}

		let mut images_4bpp = vec![];
		for offset in image_offsets_4bpp {
			images_4bpp.push(Tim::read(embedded(offset)?)?);
		}

		let objects = if has_objects {
			cursor.set_position(object_offset as u64);
			MapObjects::read(&mut cursor)?
		} else {
			MapObjects::default()
		};

		cursor.set_position(elements_offset as u64);
		let mut elements = MapElements::read(&mut cursor)?;

		cursor.set_position(tile_map_offset as u64);
		let mut tile_map = vec![0; TILE_MAP_DIM * TILE_MAP_DIM];
		cursor.read_exact(&mut tile_map)?;

		// placements in the file are stale on maps flagged monster-free
		if !entry.data.flags.has_digimon() {
			elements.digimon.clear();
		}

		Ok(MapFile {
			entry: entry,
			setup: setup,
			images_8bpp: images_8bpp,
			images_4bpp: images_4bpp,
			objects: objects,
			elements: elements,
			tile_map: tile_map,
		})
	}

	/// The embedded image whose VRAM footprint covers a texel coordinate.
	/// Later images shadow earlier ones, 4 bpp images shadow 8 bpp ones.
	pub fn image_by_tex_coord(&self, x: u32, y: u32) -> Option<&Tim> {
		let mut found = None;

		for image in self.images_8bpp.iter().chain(self.images_4bpp.iter()) {
			if image.contains_tex_coord(x, y) {
				found = Some(image);
			}
		}

		found
	}
}
