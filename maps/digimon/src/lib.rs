pub mod gamedata;
pub mod map;

use dwt_core::texture::Image;
use dwt_textures_playstation::tfs::{
	Tfs,
	TFSImportError
};

use crate::map::MapFile;

/// Composites a map's background grid against its companion tile sheet,
/// once per palette variant.
pub fn background_images(map: &MapFile, tfs: &Tfs) -> Result<Vec<Image>, TFSImportError> {
	tfs.compose_all(map.setup.width, map.setup.height, &map.setup.tiles)
}

/// Reads a level file from disk. The map table entry drives the header
/// layout, so it has to come from the executable tables first.
#[cfg(feature = "import")]
pub fn read_map(filepath: &str, entry: gamedata::MapEntry) -> Result<MapFile, map::MAPImportError> {
	let buffer = std::fs::read(filepath)?;
	MapFile::read(&buffer, entry)
}
