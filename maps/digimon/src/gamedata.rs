use std::io;
use thiserror::Error;

use dwt_core::cursor::ByteCursor;

use dwt_models_digimon::node::{
	self,
	NodeEntry,
	NodeImportError
};

pub const DIGIMON_COUNT: usize = 180;
pub const MAP_ENTRY_COUNT: usize = 255;

/// Size of one texture slot in the ALLTIM chunk file.
pub const TEXTURE_CHUNK_LEN: usize = 0x4800;

/// RAM base the executable's skeleton pointers are relative to.
const SKELETON_BASE: u32 = 0x8009_0000;

const MAP_ENTRY_LEN: u64 = 0x10;
const MAP_NAME_LEN: usize = 28;
const DOOR_SLOTS: usize = 6;

/// Converts a load address from the executable into a file offset.
pub const fn psexe_offset(address: u32) -> u32 {
	(address - 0x90000) & 0x7FFF_FFFF
}

#[derive(Debug, Error)]
pub enum GameDataError {
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Expected game file missing: {0}")]
	MissingFile(String),
	#[error("Skeleton table invalid")]
	Skeleton {
		#[from]
		source: NodeImportError,
	},
	#[error("Executable {0} carries no map tables")]
	UnsupportedVersion(&'static str),
}

/// Fixed file offsets for one release of the game. Only the NTSC-U
/// executable has had its map tables located; the other releases carry
/// zeroed map offsets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VersionData {
	pub psexe_path: &'static str,
	pub alltim_path: &'static str,
	pub name_offset: u32,
	pub para_offset: u32,
	pub skel_offset: u32,
	pub map_entry_offset: u32,
	pub map_name_ptr_offset: u32,
	pub toilet_data_offset: u32,
	pub door_data_offset: u32,
	pub is_pal: bool,
}

pub const SLUS_DATA: VersionData = VersionData {
	psexe_path: "SLUS_010.32",
	alltim_path: "CHDAT/ALLTIM.TIM",
	name_offset: psexe_offset(0x133b44),
	para_offset: psexe_offset(0x12ceb4),
	skel_offset: psexe_offset(0x11ce60),
	map_entry_offset: psexe_offset(0x1292d4),
	map_name_ptr_offset: psexe_offset(0x1291bc),
	toilet_data_offset: psexe_offset(0x122e10),
	door_data_offset: psexe_offset(0x122e60),
	is_pal: false,
};

pub const SLPS_11_DATA: VersionData = VersionData {
	psexe_path: "SLPS_017.97",
	alltim_path: "CHDAT/ALLTIM.TIM",
	name_offset: psexe_offset(0x13d844),
	para_offset: psexe_offset(0x13b344),
	skel_offset: psexe_offset(0x123780),
	map_entry_offset: 0,
	map_name_ptr_offset: 0,
	toilet_data_offset: 0,
	door_data_offset: 0,
	is_pal: false,
};

pub const SLPS_10_DATA: VersionData = VersionData {
	psexe_path: "SLPS_017.97",
	alltim_path: "CHDAT/ALLTIM.TIM",
	name_offset: psexe_offset(0x13ce24),
	para_offset: psexe_offset(0x13a924),
	skel_offset: psexe_offset(0x122e68),
	map_entry_offset: 0,
	map_name_ptr_offset: 0,
	toilet_data_offset: 0,
	door_data_offset: 0,
	is_pal: false,
};

pub const SLPM_DATA: VersionData = VersionData {
	psexe_path: "SLPM_804.02",
	alltim_path: "CHDAT/ALLTIM.TIM",
	name_offset: psexe_offset(0x13e874),
	para_offset: psexe_offset(0x13c32c),
	skel_offset: psexe_offset(0x124728),
	map_entry_offset: 0,
	map_name_ptr_offset: 0,
	toilet_data_offset: 0,
	door_data_offset: 0,
	is_pal: false,
};

pub const SLES02914_DATA: VersionData = VersionData {
	psexe_path: "SLES_029.14",
	alltim_path: "CHDAT/ALLTIM.TIM",
	name_offset: psexe_offset(0x13ac0c),
	para_offset: psexe_offset(0x138b5c),
	skel_offset: psexe_offset(0x122dd4),
	map_entry_offset: 0,
	map_name_ptr_offset: 0,
	toilet_data_offset: 0,
	door_data_offset: 0,
	is_pal: true,
};

pub const SLES03434_DATA: VersionData = VersionData {
	psexe_path: "SLES_034.34",
	alltim_path: "CHDAT/ALLTIM.TIM",
	name_offset: psexe_offset(0x13ae00),
	para_offset: psexe_offset(0x138d50),
	skel_offset: psexe_offset(0x122de4),
	map_entry_offset: 0,
	map_name_ptr_offset: 0,
	toilet_data_offset: 0,
	door_data_offset: 0,
	is_pal: true,
};

pub const SLES03435_DATA: VersionData = VersionData {
	psexe_path: "SLES_034.35",
	alltim_path: "CHDAT/ALLTIM.TIM",
	name_offset: psexe_offset(0x13add8),
	para_offset: psexe_offset(0x138d28),
	skel_offset: psexe_offset(0x122d6c),
	map_entry_offset: 0,
	map_name_ptr_offset: 0,
	toilet_data_offset: 0,
	door_data_offset: 0,
	is_pal: true,
};

pub const SLES03436_DATA: VersionData = VersionData {
	psexe_path: "SLES_034.36",
	alltim_path: "CHDAT/ALLTIM.TIM",
	name_offset: psexe_offset(0x13b7e4),
	para_offset: psexe_offset(0x139734),
	skel_offset: psexe_offset(0x122da0),
	map_entry_offset: 0,
	map_name_ptr_offset: 0,
	toilet_data_offset: 0,
	door_data_offset: 0,
	is_pal: true,
};

pub const SLES03437_DATA: VersionData = VersionData {
	psexe_path: "SLES_034.37",
	alltim_path: "CHDAT/ALLTIM.TIM",
	name_offset: psexe_offset(0x13b314),
	para_offset: psexe_offset(0x139264),
	skel_offset: psexe_offset(0x122da0),
	map_entry_offset: 0,
	map_name_ptr_offset: 0,
	toilet_data_offset: 0,
	door_data_offset: 0,
	is_pal: true,
};

pub const VERSION_DATA: [VersionData; 9] = [
	SLUS_DATA,
	SLPS_11_DATA,
	SLPS_10_DATA,
	SLPM_DATA,
	SLES02914_DATA,
	SLES03434_DATA,
	SLES03435_DATA,
	SLES03436_DATA,
	SLES03437_DATA,
];

/// Per-monster parameter record from the executable. The PAL layout drops
/// the embedded name, everything else matches.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DigimonPara {
	pub name: String,
	pub bone_count: i32,
	pub radius: i16,
	pub height: i16,
	pub kind: u8,
	pub level: u8,
	pub special: [u8; 3],
	pub drop_item: u8,
	pub drop_chance: u8,
	pub moves: [i8; 16],
}

impl DigimonPara {
	/// Record stride in the executable for the given region.
	pub fn record_len(is_pal: bool) -> u64 {
		if is_pal { 32 } else { 52 }
	}

	fn read(cursor: &mut ByteCursor, is_pal: bool) -> io::Result<DigimonPara> {
		let name = if is_pal {
			String::new()
		} else {
			let mut raw = [0; 20];
			cursor.read_exact(&mut raw)?;
			cstr(&raw)
		};

		let bone_count = cursor.read_i32()?;
		let radius = cursor.read_i16()?;
		let height = cursor.read_i16()?;
		let kind = cursor.read_u8()?;
		let level = cursor.read_u8()?;

		let mut special = [0; 3];
		cursor.read_exact(&mut special)?;

		let drop_item = cursor.read_u8()?;
		let drop_chance = cursor.read_u8()?;

		let mut moves = [0i8; 16];
		for slot in moves.iter_mut() {
			*slot = cursor.read_i8()?;
		}
		cursor.skip(1); // padding

		Ok(DigimonPara {
			name: name,
			bone_count: bone_count,
			radius: radius,
			height: height,
			kind: kind,
			level: level,
			special: special,
			drop_item: drop_item,
			drop_chance: drop_chance,
			moves: moves,
		})
	}
}

/// Everything needed to decode one monster's assets: the MMD file name, its
/// skeleton, and its slice of the shared texture chunk file.
#[derive(Clone, Debug, Default)]
pub struct DigimonEntry {
	pub filename: String,
	pub para: DigimonPara,
	pub skeleton: Vec<NodeEntry>,
	pub texture: Vec<u8>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ToiletData {
	pub x1: i16,
	pub y1: i16,
	pub x2: i16,
	pub y2: i16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DoorData {
	pub model_id: [u8; DOOR_SLOTS],
	pub pos_x: [i16; DOOR_SLOTS],
	pub pos_y: [i16; DOOR_SLOTS],
	pub pos_z: [i16; DOOR_SLOTS],
	pub rotation: [i16; DOOR_SLOTS],
}

impl DoorData {
	fn read(cursor: &mut ByteCursor) -> io::Result<DoorData> {
		let mut doors = DoorData::default();

		cursor.read_exact(&mut doors.model_id)?;
		for field in [&mut doors.pos_x, &mut doors.pos_y, &mut doors.pos_z, &mut doors.rotation] {
			for slot in field.iter_mut() {
				*slot = cursor.read_i16()?;
			}
		}

		Ok(doors)
	}
}

/// Packed per-map flag byte: sound id in the low five bits, day/night cycle
/// suppression in bit 6, roaming monsters in bit 7.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MapEntryFlags(pub u8);

impl MapEntryFlags {
	pub fn sound_id(self) -> u8 {
		self.0 & 0x1F
	}

	pub fn has_no_time_cycle(self) -> bool {
		self.0 & 0x40 != 0
	}

	pub fn has_digimon(self) -> bool {
		self.0 & 0x80 != 0
	}
}

/// One 16-byte record of the 255-entry map table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapEntryData {
	pub name: String,
	pub num_map_images: u8,
	pub num_map_objects: u8,
	pub flags: MapEntryFlags,
	pub doors_id: u8,
	pub toilet_id: u8,
	pub loading_name_id: u8,
}

impl MapEntryData {
	fn read(cursor: &mut ByteCursor) -> io::Result<MapEntryData> {
		let mut raw_name = [0; 10];
		cursor.read_exact(&mut raw_name)?;

		Ok(MapEntryData {
			name: cstr(&raw_name),
			num_map_images: cursor.read_u8()?,
			num_map_objects: cursor.read_u8()?,
			flags: MapEntryFlags(cursor.read_u8()?),
			doors_id: cursor.read_u8()?,
			toilet_id: cursor.read_u8()?,
			loading_name_id: cursor.read_u8()?,
		})
	}
}

/// A map table record joined with its display name and optional toilet and
/// door sub-tables.
#[derive(Clone, Debug, Default)]
pub struct MapEntry {
	pub data: MapEntryData,
	pub name: String,
	pub toilet: Option<ToiletData>,
	pub doors: Option<DoorData>,
}

fn cstr(raw: &[u8]) -> String {
	let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
	String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Decodes the monster tables out of an executable image plus the shared
/// texture chunk file.
pub fn digimon_entries(version: &VersionData, psexe: &[u8], alltim: &[u8]) -> Result<Vec<DigimonEntry>, GameDataError> {
	let mut cursor = ByteCursor::new(psexe);
	let mut entries = Vec::with_capacity(DIGIMON_COUNT);

	for i in 0..DIGIMON_COUNT as u64 {
		cursor.set_position(version.name_offset as u64 + i * 8);
		let mut raw_name = [0; 8];
		cursor.read_exact(&mut raw_name)?;

		cursor.set_position(version.para_offset as u64 + i * DigimonPara::record_len(version.is_pal));
		let para = DigimonPara::read(&mut cursor, version.is_pal)?;

		let skel_ptr = cursor.read_u32_at(version.skel_offset as u64 + i * 4)?;
		let skel_start = skel_ptr.wrapping_sub(SKELETON_BASE) as u64;

		cursor.set_position(skel_start);
		let mut raw_skeleton = vec![0; para.bone_count.max(0) as usize * 2];
		cursor.read_exact(&mut raw_skeleton)?;
		let skeleton = node::read_nodes(&raw_skeleton)?;

		let chunk_start = i as usize * TEXTURE_CHUNK_LEN;
		let texture = alltim
			.get(chunk_start..chunk_start + TEXTURE_CHUNK_LEN)
			.ok_or_else(|| GameDataError::MissingFile(version.alltim_path.to_string()))?
			.to_vec();

		entries.push(DigimonEntry {
			filename: cstr(&raw_name),
			para: para,
			skeleton: skeleton,
			texture: texture,
		});
	}

	Ok(entries)
}

/// Decodes the 255-entry map table out of an executable image. Only
/// versions with located map offsets are supported.
pub fn map_entries(version: &VersionData, psexe: &[u8]) -> Result<Vec<MapEntry>, GameDataError> {
	if version.map_entry_offset == 0 {
		return Err(GameDataError::UnsupportedVersion(version.psexe_path));
	}

	let mut cursor = ByteCursor::new(psexe);
	let mut entries = Vec::with_capacity(MAP_ENTRY_COUNT);

	for i in 0..MAP_ENTRY_COUNT as u64 {
		cursor.set_position(version.map_entry_offset as u64 + i * MAP_ENTRY_LEN);
		let data = MapEntryData::read(&mut cursor)?;

		// sub-table ids are 1-based, zero means none
		let toilet = if data.toilet_id != 0 {
			cursor.set_position(version.toilet_data_offset as u64 + (data.toilet_id as u64 - 1) * 8);
			Some(ToiletData {
				x1: cursor.read_i16()?,
				y1: cursor.read_i16()?,
				x2: cursor.read_i16()?,
				y2: cursor.read_i16()?,
			})
		} else {
			None
		};

		let doors = if data.doors_id != 0 {
			cursor.set_position(version.door_data_offset as u64 + (data.doors_id as u64 - 1) * 54);
			Some(DoorData::read(&mut cursor)?)
		} else {
			None
		};

		let name_ptr =
			cursor.read_u32_at(version.map_name_ptr_offset as u64 + data.loading_name_id as u64 * 4)?;

		cursor.set_position(psexe_offset(name_ptr) as u64);
		let mut raw_name = [0; MAP_NAME_LEN];
		cursor.read_exact(&mut raw_name)?;

		entries.push(MapEntry {
			data: data,
			name: cstr(&raw_name).trim_matches(' ').to_string(),
			toilet: toilet,
			doors: doors,
		});
	}

	Ok(entries)
}

/// Works out which release sits in a game directory. The two Japanese
/// revisions share a file name and are told apart by size; otherwise the
/// first executable found wins, defaulting to NTSC-U.
#[cfg(feature = "import")]
pub fn detect_version(parent: &std::path::Path) -> VersionData {
	use std::fs;

	if let Ok(meta) = fs::metadata(parent.join(SLPS_10_DATA.psexe_path)) {
		if meta.len() == 0xAF000 {
			return SLPS_11_DATA;
		}
		if meta.len() == 0xAE000 {
			return SLPS_10_DATA;
		}
	}

	for version in VERSION_DATA {
		if parent.join(version.psexe_path).exists() {
			return version;
		}
	}

	SLUS_DATA
}

#[cfg(feature = "import")]
fn read_game_file(parent: &std::path::Path, name: &str) -> Result<Vec<u8>, GameDataError> {
	let path = parent.join(name);
	if !path.is_file() {
		return Err(GameDataError::MissingFile(name.to_string()));
	}

	Ok(std::fs::read(path)?)
}

/// Loads the monster tables from a game directory.
#[cfg(feature = "import")]
pub fn load_digimon_entries(parent: &std::path::Path) -> Result<Vec<DigimonEntry>, GameDataError> {
	let version = detect_version(parent);
	let psexe = read_game_file(parent, version.psexe_path)?;
	let alltim = read_game_file(parent, version.alltim_path)?;

	digimon_entries(&version, &psexe, &alltim)
}

/// Loads the map table from a game directory.
#[cfg(feature = "import")]
pub fn load_map_entries(parent: &std::path::Path) -> Result<Vec<MapEntry>, GameDataError> {
	let version = detect_version(parent);
	let psexe = read_game_file(parent, version.psexe_path)?;

	map_entries(&version, &psexe)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_psexe_offset() {
		assert_eq!(0xA3B44, psexe_offset(0x133b44));
		assert_eq!(0xA3B44, psexe_offset(0x8013_3b44));
	}

	#[test]
	fn test_flags() {
		let flags = MapEntryFlags(0b1100_0101);
		assert_eq!(5, flags.sound_id());
		assert!(flags.has_no_time_cycle());
		assert!(flags.has_digimon());

		let flags = MapEntryFlags(0b0010_0001);
		assert_eq!(1, flags.sound_id());
		assert!(!flags.has_no_time_cycle());
		assert!(!flags.has_digimon());
	}

	#[test]
	fn test_para_record_layouts() {
		let mut ntsc = vec![];
		ntsc.extend_from_slice(b"Agumon\0\0\0\0\0\0\0\0\0\0\0\0\0\0");
		ntsc.extend_from_slice(&5i32.to_le_bytes());
		ntsc.extend_from_slice(&10i16.to_le_bytes());
		ntsc.extend_from_slice(&20i16.to_le_bytes());
		ntsc.extend(&[1, 2, 3, 4, 5, 6, 7]); // kind level special drop
		ntsc.extend(std::iter::repeat(0u8).take(17)); // moves + padding
		assert_eq!(52, ntsc.len());

		let mut cursor = ByteCursor::new(&ntsc);
		let para = DigimonPara::read(&mut cursor, false).unwrap();
		assert_eq!("Agumon", para.name);
		assert_eq!(5, para.bone_count);
		assert_eq!([3, 4, 5], para.special);
		assert_eq!(7, para.drop_chance);

		let mut cursor = ByteCursor::new(&ntsc[20..]);
		let para = DigimonPara::read(&mut cursor, true).unwrap();
		assert_eq!("", para.name);
		assert_eq!(5, para.bone_count);
	}

	// a tiny fake executable with one real map entry and the rest zeroed
	fn fake_psexe(version: &VersionData) -> Vec<u8> {
		let mut data = vec![0; 0xB0000];

		let entry = version.map_entry_offset as usize;
		data[entry..entry + 7].copy_from_slice(b"MAP0100");
		data[entry + 10] = 0; // images
		data[entry + 11] = 0; // objects
		data[entry + 12] = 0x85; // sound 5, digimon
		data[entry + 13] = 0; // doors
		data[entry + 14] = 1; // toilet 1
		data[entry + 15] = 2; // name id 2

		let toilet = version.toilet_data_offset as usize;
		data[toilet..toilet + 2].copy_from_slice(&7i16.to_le_bytes());

		// name pointers for id 0 (used by zeroed entries) and id 2
		let names = version.map_name_ptr_offset as usize;
		data[names..names + 4].copy_from_slice(&0x90000u32.to_le_bytes());
		data[names + 8..names + 12].copy_from_slice(&0x91000u32.to_le_bytes());
		let text = psexe_offset(0x91000) as usize;
		data[text..text + 12].copy_from_slice(b"  Tropical  ");

		data
	}

	#[test]
	fn test_map_entries() {
		let data = fake_psexe(&SLUS_DATA);
		let entries = map_entries(&SLUS_DATA, &data).unwrap();

		assert_eq!(MAP_ENTRY_COUNT, entries.len());

		let entry = &entries[0];
		assert_eq!("MAP0100", entry.data.name);
		assert_eq!(5, entry.data.flags.sound_id());
		assert!(entry.data.flags.has_digimon());
		assert_eq!("Tropical", entry.name);
		assert_eq!(Some(ToiletData { x1: 7, y1: 0, x2: 0, y2: 0 }), entry.toilet);
		assert!(entry.doors.is_none());
	}

	#[test]
	fn test_map_entries_unsupported_version() {
		assert!(matches!(
			map_entries(&SLPM_DATA, &[]),
			Err(GameDataError::UnsupportedVersion("SLPM_804.02"))
		));
	}

	#[test]
	fn test_digimon_entries() {
		let version = VersionData {
			name_offset: 0x1000,
			para_offset: 0x2000,
			skel_offset: 0x5000,
			..SLUS_DATA
		};

		let mut psexe = vec![0; 0x10000];

		for i in 0..DIGIMON_COUNT {
			let name = version.name_offset as usize + i * 8;
			psexe[name..name + 7].copy_from_slice(b"MMD0000");

			// bone count 2 at the head of each para record
			let para = version.para_offset as usize + i * 52 + 20;
			psexe[para..para + 4].copy_from_slice(&2i32.to_le_bytes());

			// all skeleton pointers share one table at file offset 0x8000
			let skel = version.skel_offset as usize + i * 4;
			psexe[skel..skel + 4].copy_from_slice(&(SKELETON_BASE + 0x8000).to_le_bytes());
		}

		psexe[0x8000] = 0;
		psexe[0x8001] = 0xFF; // root
		psexe[0x8002] = 1;
		psexe[0x8003] = 0;

		let alltim = vec![0xAB; DIGIMON_COUNT * TEXTURE_CHUNK_LEN];
		let entries = digimon_entries(&version, &psexe, &alltim).unwrap();

		assert_eq!(DIGIMON_COUNT, entries.len());
		assert_eq!("MMD0000", entries[0].filename);
		assert_eq!(2, entries[0].skeleton.len());
		assert_eq!(TEXTURE_CHUNK_LEN, entries[0].texture.len());
		assert_eq!(0xAB, entries[0].texture[0]);
	}

	#[test]
	fn test_digimon_entries_truncated_textures() {
		let version = VersionData {
			name_offset: 0x100,
			para_offset: 0x200,
			skel_offset: 0x300,
			..SLUS_DATA
		};

		let mut psexe = vec![0; 0x10000];
		for i in 0..DIGIMON_COUNT {
			let skel = version.skel_offset as usize + i * 4;
			psexe[skel..skel + 4].copy_from_slice(&SKELETON_BASE.to_le_bytes());
		}

		assert!(matches!(
			digimon_entries(&version, &psexe, &[]),
			Err(GameDataError::MissingFile(_))
		));
	}
}
