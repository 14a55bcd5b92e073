pub mod clutmap;
pub mod tfs;
pub mod tim;

#[cfg(feature = "import")]
use std::fs;

#[cfg(feature = "import")]
pub fn read_tim(filepath: &str) -> Result<tim::Tim, tim::TIMImportError> {
	let input = fs::read(filepath)?;
	tim::Tim::read(input.as_slice())
}

#[cfg(feature = "import")]
pub fn read_tfs(filepath: &str) -> Result<tfs::Tfs, tfs::TFSImportError> {
	let input = fs::read(filepath)?;
	tfs::Tfs::read(input.as_slice())
}
